//! Stages of a single conversion call.
//!
//! ## Data Flow
//!
//! ```text
//! source ──▶ payload ──▶ relay ──▶ (cleanup)
//! (upload/URL) (JSON body)  (HTTP POST)
//! ```
//!
//! 1. [`source`]  — stage an upload in a scoped temp dir, or pass a URL through
//! 2. [`payload`] — map request options onto the service's JSON schema
//! 3. [`relay`]   — the HTTP client; also owns the `/docs` liveness probe

pub mod payload;
pub mod relay;
pub mod source;
