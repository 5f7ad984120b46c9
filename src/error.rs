//! Error types for the docling-relay library.
//!
//! Two distinct error types reflect two distinct failure modes:
//!
//! * [`StartupError`] — **Fatal**: the subordinate `docling-serve` process
//!   could not be spawned, died while we were waiting for it, or never became
//!   healthy. The adapter moves to its terminal `Failed` state.
//!
//! * [`RelayError`] — **Non-fatal**: a single conversion call failed (no
//!   source given, connection refused, non-2xx status, garbage body). It never
//!   escapes [`crate::Adapter::convert`]; it is folded into
//!   [`crate::ConversionResult::Error`] so the next call can still succeed.

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Fatal errors raised while bringing the subordinate service up.
#[derive(Debug, Error)]
pub enum StartupError {
    // ── Lifecycle errors ──────────────────────────────────────────────────
    /// `start` or `attach` was called on an adapter that already left `Unstarted`.
    #[error("Adapter was already started (state: {state})")]
    AlreadyStarted { state: String },

    // ── Process errors ────────────────────────────────────────────────────
    /// The service executable could not be launched at all.
    #[error("Failed to spawn '{program}': {source}\nIs docling-serve installed and on PATH?")]
    SpawnFailed {
        program: String,
        #[source]
        source: std::io::Error,
    },

    /// The child exited before its health endpoint answered.
    #[error("docling-serve exited during startup ({status})\nSTDOUT:\n{stdout}\nSTDERR:\n{stderr}")]
    ServiceExited {
        status: String,
        stdout: String,
        stderr: String,
    },

    /// The attempt budget ran out without a single health response.
    #[error("docling-serve did not become ready after {attempts} attempts ({waited:?})")]
    ReadinessTimeout { attempts: u32, waited: Duration },

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// The HTTP client could not be constructed.
    #[error("Failed to build HTTP client: {0}")]
    HttpClient(String),
}

/// A non-fatal error for a single conversion call.
///
/// Converted to `{"error": "<message>"}` by the adapter; the message is this
/// type's `Display` output.
#[derive(Debug, Error)]
pub enum RelayError {
    // ── Configuration errors (no network I/O performed) ───────────────────
    /// Neither an upload nor a URL was supplied.
    #[error("Either file upload or file URL must be specified")]
    MissingSource,

    /// Both an upload and a URL were supplied.
    #[error("Specify either a file upload or a file URL, not both")]
    ConflictingSource,

    /// An option value was rejected before sending.
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// `convert` was called while the adapter was not `Ready`.
    #[error("Adapter is not ready (state: {state})")]
    NotReady { state: String },

    // ── Upload errors ─────────────────────────────────────────────────────
    /// The uploaded bytes could not be persisted to the scratch directory.
    #[error("Failed to stage upload at '{path}': {source}")]
    UploadFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── Transport errors ──────────────────────────────────────────────────
    /// Connection refused, DNS failure, client-side timeout, …
    #[error("Request to {url} failed: {reason}")]
    Transport { url: String, reason: String },

    /// The service answered with a non-2xx status.
    #[error("docling-serve returned HTTP {status} for {url}: {body}")]
    Status {
        url: String,
        status: u16,
        body: String,
    },

    /// The response body was not valid JSON.
    #[error("docling-serve returned a malformed response from {url}: {reason}")]
    MalformedResponse { url: String, reason: String },
}

/// An unrecognised value for one of the closed option sets.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("Unknown {kind} '{value}' (expected one of: {expected})")]
pub struct UnknownOption {
    pub kind: &'static str,
    pub value: String,
    pub expected: String,
}

impl UnknownOption {
    pub(crate) fn new<'a>(
        kind: &'static str,
        value: &str,
        expected: impl IntoIterator<Item = &'a str>,
    ) -> Self {
        Self {
            kind,
            value: value.to_string(),
            expected: expected.into_iter().collect::<Vec<_>>().join(", "),
        }
    }
}
