//! The Service Lifecycle Adapter.
//!
//! ```text
//! Unstarted ──start/attach──▶ Starting ──ready──▶ Ready ──shutdown──▶ Stopped
//!                                 │                 ▲ │
//!                                 │                 └─┘ convert*
//!                                 └──exit/timeout──▶ Failed
//! ```
//!
//! An adapter starts its service at most once. `convert` only talks to the
//! service in `Ready`; in any other state it answers with an error result.

use crate::config::ServiceConfig;
use crate::error::{RelayError, StartupError};
use crate::output::ConversionResult;
use crate::pipeline::relay::RelayClient;
use crate::pipeline::{payload, source};
use crate::request::ConversionRequest;
use crate::service::process::ServiceProcess;
use crate::service::readiness::wait_until_ready;
use crate::service::ServiceProbe;
use serde_json::Value;
use std::fmt;
use std::process::ExitStatus;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Where an [`Adapter`] is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdapterState {
    Unstarted,
    Starting,
    Ready,
    Failed,
    Stopped,
}

impl fmt::Display for AdapterState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            AdapterState::Unstarted => "unstarted",
            AdapterState::Starting => "starting",
            AdapterState::Ready => "ready",
            AdapterState::Failed => "failed",
            AdapterState::Stopped => "stopped",
        })
    }
}

/// Owns one `docling-serve` (spawned or attached) and relays requests to it.
///
/// # Example
/// ```rust,no_run
/// use docling_relay::{Adapter, ConversionRequest, ServiceConfig};
///
/// # #[tokio::main]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let mut adapter = Adapter::launch(ServiceConfig::default()).await?;
/// let request = ConversionRequest::from_url("https://arxiv.org/pdf/2305.03393.pdf")
///     .to_formats(["md"]);
/// let result = adapter.convert(&request).await;
/// println!("{}", serde_json::to_string_pretty(&result)?);
/// adapter.shutdown().await;
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct Adapter {
    config: ServiceConfig,
    relay: RelayClient,
    state: AdapterState,
    process: Option<ServiceProcess>,
}

impl Adapter {
    /// Create an adapter in the `Unstarted` state. Nothing is spawned yet.
    pub fn new(config: ServiceConfig) -> Result<Self, StartupError> {
        let relay = RelayClient::new(&config)?;
        Ok(Self {
            config,
            relay,
            state: AdapterState::Unstarted,
            process: None,
        })
    }

    /// [`Adapter::new`] followed by [`Adapter::start`].
    pub async fn launch(config: ServiceConfig) -> Result<Self, StartupError> {
        let mut adapter = Self::new(config)?;
        adapter.start().await?;
        Ok(adapter)
    }

    pub fn state(&self) -> AdapterState {
        self.state
    }

    pub fn config(&self) -> &ServiceConfig {
        &self.config
    }

    /// PID of the spawned service, if this adapter owns one.
    pub fn pid(&self) -> Option<u32> {
        self.process.as_ref().and_then(ServiceProcess::pid)
    }

    /// Spawn the service and wait for its health endpoint.
    ///
    /// On failure the adapter is `Failed` for good and any child that is
    /// still running is stopped before returning.
    pub async fn start(&mut self) -> Result<(), StartupError> {
        self.ensure_unstarted()?;
        self.state = AdapterState::Starting;
        let started = Instant::now();
        info!(
            "Starting {} {}",
            self.config.program,
            self.config.args.join(" ")
        );

        let mut process = match ServiceProcess::spawn(&self.config) {
            Ok(p) => p,
            Err(e) => return Err(self.fail(e)),
        };
        if let Some(ref cb) = self.config.progress_callback {
            cb.on_spawned(process.pid());
        }

        let outcome = {
            let mut probe = ServiceProbe {
                relay: &self.relay,
                process: Some(&mut process),
            };
            wait_until_ready(
                &mut probe,
                self.config.max_attempts,
                self.config.probe_interval,
                self.config.progress_callback.as_ref(),
            )
            .await
        };

        match outcome {
            Ok(attempts) => {
                self.process = Some(process);
                self.mark_ready(attempts, started);
                Ok(())
            }
            Err(e) => {
                if matches!(e, StartupError::ReadinessTimeout { .. }) {
                    let tail = process.stderr_tail();
                    if !tail.is_empty() {
                        warn!("Last service stderr before timeout:\n{}", tail);
                    }
                }
                process.terminate().await;
                Err(self.fail(e))
            }
        }
    }

    /// Use a service somebody else already started.
    ///
    /// Runs the same readiness probe but spawns nothing; `shutdown` will not
    /// stop the service.
    pub async fn attach(&mut self) -> Result<(), StartupError> {
        self.ensure_unstarted()?;
        self.state = AdapterState::Starting;
        let started = Instant::now();
        info!("Attaching to {}", self.config.base_url());

        let outcome = {
            let mut probe = ServiceProbe {
                relay: &self.relay,
                process: None,
            };
            wait_until_ready(
                &mut probe,
                self.config.max_attempts,
                self.config.probe_interval,
                self.config.progress_callback.as_ref(),
            )
            .await
        };

        match outcome {
            Ok(attempts) => {
                self.mark_ready(attempts, started);
                Ok(())
            }
            Err(e) => Err(self.fail(e)),
        }
    }

    /// Relay one conversion request.
    ///
    /// Never fails: every problem comes back as [`ConversionResult::Error`].
    /// A staged upload is removed before this returns, whatever the outcome.
    pub async fn convert(&self, request: &ConversionRequest) -> ConversionResult {
        match self.try_convert(request).await {
            Ok(result) => ConversionResult::Success(result),
            Err(e) => {
                warn!("Conversion failed: {}", e);
                ConversionResult::error(e.to_string())
            }
        }
    }

    async fn try_convert(&self, request: &ConversionRequest) -> Result<Value, RelayError> {
        if self.state != AdapterState::Ready {
            return Err(RelayError::NotReady {
                state: self.state.to_string(),
            });
        }
        payload::validate_options(request)?;

        let resolved = source::resolve_source(request).await?;
        let result = match payload::build_payload(request, vec![resolved.location()]) {
            Ok(body) => self.relay.convert_source(&body).await,
            Err(e) => Err(e),
        };
        resolved.cleanup();
        result
    }

    /// Stop the spawned service (if any) and refuse further conversions.
    pub async fn shutdown(&mut self) {
        if let Some(mut process) = self.process.take() {
            process.terminate().await;
        }
        if self.state != AdapterState::Failed {
            self.state = AdapterState::Stopped;
        }
    }

    /// Block until the spawned service exits by itself.
    ///
    /// Returns `Ok(None)` straight away for an attached adapter. After the
    /// child exits the adapter is `Stopped`.
    pub async fn wait(&mut self) -> std::io::Result<Option<ExitStatus>> {
        let Some(process) = self.process.as_mut() else {
            return Ok(None);
        };
        let status = process.wait().await?;
        warn!("{} exited ({})", self.config.program, status);
        self.process = None;
        self.state = AdapterState::Stopped;
        Ok(Some(status))
    }

    fn ensure_unstarted(&self) -> Result<(), StartupError> {
        if self.state != AdapterState::Unstarted {
            return Err(StartupError::AlreadyStarted {
                state: self.state.to_string(),
            });
        }
        Ok(())
    }

    fn mark_ready(&mut self, attempts: u32, started: Instant) {
        self.state = AdapterState::Ready;
        let elapsed = started.elapsed();
        info!(
            "Service is ready: {} ({} attempt(s), {}ms)",
            self.config.base_url(),
            attempts,
            elapsed.as_millis()
        );
        if let Some(ref cb) = self.config.progress_callback {
            cb.on_ready(attempts, elapsed);
        }
    }

    fn fail(&mut self, error: StartupError) -> StartupError {
        self.state = AdapterState::Failed;
        warn!("Service failed to start: {}", error);
        if let Some(ref cb) = self.config.progress_callback {
            cb.on_failed(&error);
        }
        error
    }
}

impl Drop for Adapter {
    fn drop(&mut self) {
        if self.process.is_some() {
            // `kill_on_drop` on the child does the actual work.
            debug!("Adapter dropped with a live service; killing it");
        }
    }
}
