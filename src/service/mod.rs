//! The subordinate `docling-serve` instance.
//!
//! 1. [`process`]   — spawn, capture output, terminate
//! 2. [`readiness`] — bounded fixed-interval probe of `/docs`

pub mod process;
pub(crate) mod readiness;

use crate::pipeline::relay::RelayClient;
use process::ServiceProcess;
use readiness::{Liveness, Probe};
use tracing::debug;

/// Probe target: the HTTP health endpoint, plus the child when we own one.
pub(crate) struct ServiceProbe<'a> {
    pub(crate) relay: &'a RelayClient,
    pub(crate) process: Option<&'a mut ServiceProcess>,
}

impl Liveness for ServiceProbe<'_> {
    async fn check(&mut self) -> Probe {
        if let Some(process) = self.process.as_deref_mut() {
            if let Some(status) = process.try_exit() {
                return Probe::Exited(process.exit_error(status).await);
            }
        }
        match self.relay.probe().await {
            Some(status) => {
                debug!("Health endpoint answered HTTP {}", status);
                Probe::Ready
            }
            None => Probe::Pending,
        }
    }
}
