//! Progress-callback trait for service startup events.
//!
//! Inject an [`Arc<dyn StartupProgressCallback>`] via
//! [`crate::config::ServiceConfigBuilder::progress_callback`] to observe the
//! readiness probe while `docling-serve` boots. Model loading can take tens of
//! seconds on a cold GPU host, so a CLI wants something to show meanwhile.
//!
//! # Example
//!
//! ```rust
//! use docling_relay::{ServiceConfig, StartupProgressCallback};
//! use std::sync::Arc;
//!
//! struct PrintAttempts;
//!
//! impl StartupProgressCallback for PrintAttempts {
//!     fn on_probe(&self, attempt: u32, max_attempts: u32) {
//!         eprintln!("waiting for docling-serve ({attempt}/{max_attempts})");
//!     }
//! }
//!
//! let config = ServiceConfig::builder()
//!     .progress_callback(Arc::new(PrintAttempts))
//!     .build()
//!     .unwrap();
//! ```

use crate::error::StartupError;
use std::sync::Arc;
use std::time::Duration;

/// Called by the adapter as it launches and probes the service.
///
/// All methods have default no-op implementations so callers only override
/// what they care about.
pub trait StartupProgressCallback: Send + Sync {
    /// Called once the child process is running (spawn mode only).
    fn on_spawned(&self, pid: Option<u32>) {
        let _ = pid;
    }

    /// Called before each health probe.
    ///
    /// # Arguments
    /// * `attempt`      — 1-indexed probe number
    /// * `max_attempts` — the configured attempt budget
    fn on_probe(&self, attempt: u32, max_attempts: u32) {
        let _ = (attempt, max_attempts);
    }

    /// Called when the health endpoint answered.
    fn on_ready(&self, attempts: u32, elapsed: Duration) {
        let _ = (attempts, elapsed);
    }

    /// Called when startup failed for good.
    fn on_failed(&self, error: &StartupError) {
        let _ = error;
    }
}

/// A no-op implementation for callers that don't need startup events.
pub struct NoopProgressCallback;

impl StartupProgressCallback for NoopProgressCallback {}

/// Convenience alias matching the type stored in [`crate::config::ServiceConfig`].
pub type ProgressCallback = Arc<dyn StartupProgressCallback>;
