//! HTTP side of the adapter: the liveness probe and the conversion call.
//!
//! This is the only stage with network I/O. The conversion call is made once;
//! a failure comes back as a [`RelayError`] for the adapter to fold into
//! `{"error": ...}`. Retrying a multi-minute conversion on the caller's behalf
//! is not this layer's decision.

use crate::config::ServiceConfig;
use crate::error::{RelayError, StartupError};
use crate::pipeline::payload::ConvertSourcePayload;
use reqwest::header::ACCEPT;
use serde_json::Value;
use std::error::Error as _;
use std::time::{Duration, Instant};
use tracing::{debug, info};

/// Longest slice of an error response body kept in [`RelayError::Status`].
const MAX_ERROR_BODY: usize = 512;

/// Client bound to one service instance.
#[derive(Debug, Clone)]
pub struct RelayClient {
    http: reqwest::Client,
    health_url: String,
    convert_url: String,
    probe_timeout: Duration,
    request_timeout: Option<Duration>,
}

impl RelayClient {
    pub fn new(config: &ServiceConfig) -> Result<Self, StartupError> {
        let http = reqwest::Client::builder()
            .build()
            .map_err(|e| StartupError::HttpClient(e.to_string()))?;
        Ok(Self {
            http,
            health_url: config.health_url(),
            convert_url: config.convert_url(),
            probe_timeout: config.probe_timeout,
            request_timeout: config.request_timeout,
        })
    }

    pub fn convert_url(&self) -> &str {
        &self.convert_url
    }

    /// `GET /docs`. Returns the status of any response, `None` if unreachable.
    ///
    /// A 404 or 500 still proves the server accepted the connection, which is
    /// all the readiness probe asks.
    pub async fn probe(&self) -> Option<u16> {
        match self
            .http
            .get(&self.health_url)
            .timeout(self.probe_timeout)
            .send()
            .await
        {
            Ok(resp) => Some(resp.status().as_u16()),
            Err(e) => {
                debug!("Health probe failed: {}", error_chain(&e));
                None
            }
        }
    }

    /// `POST /v1alpha/convert/source` with `payload`, returning the JSON body.
    pub async fn convert_source(&self, payload: &ConvertSourcePayload) -> Result<Value, RelayError> {
        let url = self.convert_url.clone();
        info!(
            "Sending request to docling-serve with {} file(s)",
            payload.files.len()
        );
        let start = Instant::now();

        let mut request = self
            .http
            .post(&url)
            .header(ACCEPT, "application/json")
            .json(payload);
        if let Some(timeout) = self.request_timeout {
            request = request.timeout(timeout);
        }

        let response = request.send().await.map_err(|e| RelayError::Transport {
            url: url.clone(),
            reason: if e.is_timeout() {
                format!("timed out after {:?}", start.elapsed())
            } else {
                error_chain(&e)
            },
        })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(RelayError::Status {
                url,
                status: status.as_u16(),
                body: truncate(&body, MAX_ERROR_BODY),
            });
        }

        let result = response
            .json::<Value>()
            .await
            .map_err(|e| RelayError::MalformedResponse {
                url: url.clone(),
                reason: error_chain(&e),
            })?;

        info!("Conversion answered in {}ms", start.elapsed().as_millis());
        Ok(result)
    }
}

/// `Display` of `err` followed by each `source()`, joined with `": "`.
///
/// reqwest's top-level message ("error sending request for url …") hides the
/// useful part ("Connection refused") one or two levels down.
fn error_chain(err: &reqwest::Error) -> String {
    let mut msg = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        let text = cause.to_string();
        if !msg.contains(&text) {
            msg.push_str(": ");
            msg.push_str(&text);
        }
        source = cause.source();
    }
    msg
}

fn truncate(s: &str, max: usize) -> String {
    if s.len() <= max {
        return s.to_string();
    }
    let mut end = max;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}\u{2026}", &s[..end])
}
