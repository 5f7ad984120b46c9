//! The value every conversion call resolves to.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Outcome of [`crate::Adapter::convert`].
///
/// Serialises to exactly one of two shapes: the service's JSON response
/// verbatim, or `{"error": "<description>"}`. The adapter does not look
/// inside a successful response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ConversionResult {
    /// Error descriptor. Listed first so `{"error": ...}` deserialises here.
    Error { error: String },
    /// Whatever `docling-serve` answered with.
    Success(Value),
}

impl ConversionResult {
    pub fn error(message: impl Into<String>) -> Self {
        Self::Error {
            error: message.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success(_))
    }

    /// The error message, if this is an error.
    pub fn error_message(&self) -> Option<&str> {
        match self {
            Self::Error { error } => Some(error),
            Self::Success(_) => None,
        }
    }

    /// Convert into a `Result`, for callers that prefer `?`.
    pub fn into_result(self) -> Result<Value, String> {
        match self {
            Self::Success(v) => Ok(v),
            Self::Error { error } => Err(error),
        }
    }

    /// The JSON a platform handler would return to its caller.
    pub fn to_json(&self) -> Value {
        match self {
            Self::Success(v) => v.clone(),
            Self::Error { error } => serde_json::json!({ "error": error }),
        }
    }
}
