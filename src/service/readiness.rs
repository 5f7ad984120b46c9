//! The readiness probe: a counted loop with a fixed sleep.
//!
//! Each attempt asks the target once. If it is ready the loop returns at
//! once; if the target reports that it died the loop returns that error; if
//! it is merely not answering yet the loop sleeps `interval` and tries again.
//! The sleep also follows the final failed attempt, so an exhausted budget
//! waits `max_attempts × interval` in total.

use crate::error::StartupError;
use crate::progress::ProgressCallback;
use std::time::Duration;
use tokio::time::{sleep, Instant};
use tracing::{debug, info};

/// One answer from the thing being probed.
#[derive(Debug)]
pub(crate) enum Probe {
    Ready,
    Pending,
    Exited(StartupError),
}

/// Something the readiness loop can poll.
pub(crate) trait Liveness {
    async fn check(&mut self) -> Probe;
}

/// Poll `target` until ready. Returns the 1-indexed attempt that succeeded.
pub(crate) async fn wait_until_ready<L: Liveness>(
    target: &mut L,
    max_attempts: u32,
    interval: Duration,
    progress: Option<&ProgressCallback>,
) -> Result<u32, StartupError> {
    let start = Instant::now();
    info!("Waiting for service to start...");

    for attempt in 1..=max_attempts {
        if let Some(cb) = progress {
            cb.on_probe(attempt, max_attempts);
        }
        match target.check().await {
            Probe::Ready => {
                info!(
                    "Service is ready after {} attempt(s), {}ms",
                    attempt,
                    start.elapsed().as_millis()
                );
                return Ok(attempt);
            }
            Probe::Exited(err) => return Err(err),
            Probe::Pending => debug!("Attempt {}/{}: not ready", attempt, max_attempts),
        }
        sleep(interval).await;
    }

    Err(StartupError::ReadinessTimeout {
        attempts: max_attempts,
        waited: start.elapsed(),
    })
}
