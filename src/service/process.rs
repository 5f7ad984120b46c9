//! The `docling-serve` child process.
//!
//! [`ServiceProcess`] owns the tokio [`Child`]. It is spawned with
//! `kill_on_drop`, so whoever owns it (normally the [`crate::Adapter`]) cannot
//! leak the server by forgetting to shut it down.
//!
//! stdout and stderr are piped and drained by two background tasks for the
//! whole life of the child. Each line is logged under the `docling_serve`
//! target and kept in a bounded tail, which becomes the body of
//! [`StartupError::ServiceExited`] if the server dies during startup.

use crate::config::ServiceConfig;
use crate::error::StartupError;
use std::collections::VecDeque;
use std::process::{ExitStatus, Stdio};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::{Child, Command};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Lines kept per stream.
const TAIL_LINES: usize = 200;

/// How long to wait for the drain tasks to reach EOF after the child exits.
const DRAIN_GRACE: Duration = Duration::from_secs(2);

/// Bounded, shared buffer of the most recent output lines.
#[derive(Debug, Clone, Default)]
pub(crate) struct OutputTail(Arc<Mutex<VecDeque<String>>>);

impl OutputTail {
    fn push(&self, line: String) {
        let mut lines = self.0.lock().unwrap_or_else(|p| p.into_inner());
        if lines.len() == TAIL_LINES {
            lines.pop_front();
        }
        lines.push_back(line);
    }

    pub(crate) fn snapshot(&self) -> String {
        let lines = self.0.lock().unwrap_or_else(|p| p.into_inner());
        lines.iter().map(String::as_str).collect::<Vec<_>>().join("\n")
    }
}

/// A running (or recently exited) `docling-serve`.
#[derive(Debug)]
pub struct ServiceProcess {
    child: Child,
    program: String,
    stdout: OutputTail,
    stderr: OutputTail,
    drains: Vec<JoinHandle<()>>,
}

impl ServiceProcess {
    /// Launch `config.program` with `config.args` and the service environment
    /// layered over the current one.
    pub fn spawn(config: &ServiceConfig) -> Result<Self, StartupError> {
        let mut command = Command::new(&config.program);
        command
            .args(&config.args)
            .envs(config.service_env())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let mut child = command.spawn().map_err(|e| StartupError::SpawnFailed {
            program: config.program.clone(),
            source: e,
        })?;

        let stdout = OutputTail::default();
        let stderr = OutputTail::default();
        let mut drains = Vec::with_capacity(2);
        if let Some(out) = child.stdout.take() {
            drains.push(drain(out, stdout.clone(), "stdout"));
        }
        if let Some(err) = child.stderr.take() {
            drains.push(drain(err, stderr.clone(), "stderr"));
        }

        info!(
            "{} started with PID: {}",
            config.program,
            child.id().map_or_else(|| "?".to_string(), |p| p.to_string())
        );

        Ok(Self {
            child,
            program: config.program.clone(),
            stdout,
            stderr,
            drains,
        })
    }

    pub fn pid(&self) -> Option<u32> {
        self.child.id()
    }

    /// Non-blocking exit check.
    pub fn try_exit(&mut self) -> Option<ExitStatus> {
        match self.child.try_wait() {
            Ok(status) => status,
            Err(e) => {
                warn!("Could not poll {} status: {}", self.program, e);
                None
            }
        }
    }

    /// Build the startup error for a child that exited with `status`,
    /// including whatever it printed.
    pub async fn exit_error(&mut self, status: ExitStatus) -> StartupError {
        for handle in self.drains.drain(..) {
            if tokio::time::timeout(DRAIN_GRACE, handle).await.is_err() {
                debug!("Output drain still open after {:?}", DRAIN_GRACE);
            }
        }
        StartupError::ServiceExited {
            status: status.to_string(),
            stdout: self.stdout.snapshot(),
            stderr: self.stderr.snapshot(),
        }
    }

    /// Block until the child exits on its own.
    pub async fn wait(&mut self) -> std::io::Result<ExitStatus> {
        self.child.wait().await
    }

    /// Stop the child and reap it. A child that already exited is only reaped.
    pub async fn terminate(&mut self) {
        if let Some(status) = self.try_exit() {
            debug!("{} already exited ({})", self.program, status);
            return;
        }
        info!("Stopping {}...", self.program);
        if let Err(e) = self.child.start_kill() {
            warn!("Failed to signal {}: {}", self.program, e);
            return;
        }
        match self.child.wait().await {
            Ok(status) => info!("{} stopped ({})", self.program, status),
            Err(e) => warn!("Failed to reap {}: {}", self.program, e),
        }
    }

    pub(crate) fn stderr_tail(&self) -> String {
        self.stderr.snapshot()
    }
}

/// Forward `reader` line by line into `tail` until EOF.
///
/// Lines are decoded lossily; a non-UTF-8 byte must not stop the drain, or
/// the child would eventually block on a full pipe.
fn drain<R>(reader: R, tail: OutputTail, stream: &'static str) -> JoinHandle<()>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut reader = BufReader::new(reader);
        let mut buf = Vec::new();
        loop {
            buf.clear();
            match reader.read_until(b'\n', &mut buf).await {
                Ok(0) => break,
                Ok(_) => {
                    let line = String::from_utf8_lossy(&buf).trim_end().to_string();
                    debug!(target: "docling_serve", stream, "{}", line);
                    tail.push(line);
                }
                Err(e) => {
                    debug!("Stopped reading child {}: {}", stream, e);
                    break;
                }
            }
        }
    })
}
