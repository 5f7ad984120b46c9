//! # docling-relay
//!
//! Run [docling-serve](https://github.com/docling-project/docling-serve) as a
//! subprocess and forward conversion requests to its REST API.
//!
//! The conversion itself happens inside docling-serve. This crate owns the
//! plumbing around it: launching the server with the right environment,
//! waiting until it answers, staging uploaded files where it can read them,
//! shaping the request body, and making sure the child process and any
//! scratch files go away afterwards.
//!
//! ## Lifecycle
//!
//! ```text
//!  Adapter::start ─ spawn `docling-serve run` (DOCLING_SERVE_* env)
//!        │
//!        ├─ poll GET /docs every interval, up to N attempts
//!        │      child exited?  → StartupError::ServiceExited
//!        │      budget spent?  → StartupError::ReadinessTimeout
//!        ▼
//!  Adapter::convert ─ stage upload / pass URL ─ POST /v1alpha/convert/source
//!        │                                  └─ JSON verbatim, or {"error": …}
//!        ▼
//!  Adapter::shutdown ─ stop and reap the child
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use docling_relay::{Adapter, ConversionRequest, FileUpload, ServiceConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut adapter = Adapter::launch(ServiceConfig::default()).await?;
//!
//!     let upload = FileUpload::from_path("report.pdf").await?;
//!     let result = adapter
//!         .convert(&ConversionRequest::from_upload(upload).to_formats(["md"]))
//!         .await;
//!
//!     match result.error_message() {
//!         None => println!("{}", serde_json::to_string_pretty(&result)?),
//!         Some(e) => eprintln!("conversion failed: {e}"),
//!     }
//!
//!     adapter.shutdown().await;
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `docling-relay` binary (clap + anyhow + tracing-subscriber + indicatif) |

// ── Modules ──────────────────────────────────────────────────────────────

pub mod adapter;
pub mod config;
pub mod error;
pub mod output;
pub mod pipeline;
pub mod progress;
pub mod request;
pub mod service;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use adapter::{Adapter, AdapterState};
pub use config::{ServiceConfig, ServiceConfigBuilder, CONVERT_SOURCE_PATH, HEALTH_PATH};
pub use error::{RelayError, StartupError, UnknownOption};
pub use output::ConversionResult;
pub use progress::{NoopProgressCallback, ProgressCallback, StartupProgressCallback};
pub use request::{
    ConversionRequest, FileUpload, ImageExportMode, OcrEngine, PageRange, PdfBackend, TableMode,
};
