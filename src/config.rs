//! Configuration for launching and talking to `docling-serve`.
//!
//! Everything the adapter needs to know about the subordinate service lives
//! in [`ServiceConfig`], built via its [`ServiceConfigBuilder`]: which command
//! to run, the environment it is started with, where it listens, how long
//! to wait for it, and the client-side timeouts used against it.

use crate::error::StartupError;
use crate::progress::ProgressCallback;
use std::fmt;
use std::time::Duration;

/// Path of the liveness probe. Any HTTP response counts as alive.
pub const HEALTH_PATH: &str = "/docs";

/// Path of the synchronous conversion endpoint.
pub const CONVERT_SOURCE_PATH: &str = "/v1alpha/convert/source";

/// Configuration for the subordinate conversion service.
///
/// Built via [`ServiceConfig::builder()`] or using [`ServiceConfig::default()`].
///
/// # Example
/// ```rust
/// use docling_relay::ServiceConfig;
/// use std::time::Duration;
///
/// let config = ServiceConfig::builder()
///     .port(5002)
///     .num_workers(4)
///     .probe_interval(Duration::from_secs(2))
///     .max_attempts(60)
///     .build()
///     .unwrap();
/// assert_eq!(config.base_url(), "http://localhost:5002");
/// ```
#[derive(Clone)]
pub struct ServiceConfig {
    /// Executable to launch. Default: `docling-serve`.
    pub program: String,

    /// Arguments passed to `program`. Default: `["run"]`.
    pub args: Vec<String>,

    /// Host the service is reached on. Default: `localhost`.
    ///
    /// Only used to build request URLs; the service binds wherever its own
    /// defaults say.
    pub host: String,

    /// Listen port, exported as `DOCLING_SERVE_PORT`. Default: 5001.
    pub port: u16,

    /// Longest synchronous conversion the service will hold a request open
    /// for, exported as `DOCLING_SERVE_MAX_SYNC_WAIT`. Default: 600 s.
    pub max_sync_wait_secs: u64,

    /// Execution engine, exported as `DOCLING_SERVE_ENG_KIND`. Default: `local`.
    pub engine_kind: String,

    /// Local engine worker count, exported as
    /// `DOCLING_SERVE_ENG_LOC_NUM_WORKERS`. Default: 2.
    pub num_workers: u32,

    /// GPU selection, exported as `CUDA_VISIBLE_DEVICES` when set. Default: `"0"`.
    pub cuda_visible_devices: Option<String>,

    /// Extra environment pairs appended after the ones above.
    pub extra_env: Vec<(String, String)>,

    /// Health probes before giving up. Default: 30.
    pub max_attempts: u32,

    /// Sleep between failed probes. Default: 1 s.
    pub probe_interval: Duration,

    /// Client timeout for a single health probe. Default: 5 s.
    pub probe_timeout: Duration,

    /// Client timeout for a conversion call. Default: none.
    ///
    /// The service enforces `max_sync_wait_secs` on its side regardless.
    pub request_timeout: Option<Duration>,

    /// Startup observer. Default: none.
    pub progress_callback: Option<ProgressCallback>,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            program: "docling-serve".to_string(),
            args: vec!["run".to_string()],
            host: "localhost".to_string(),
            port: 5001,
            max_sync_wait_secs: 600,
            engine_kind: "local".to_string(),
            num_workers: 2,
            cuda_visible_devices: Some("0".to_string()),
            extra_env: Vec::new(),
            max_attempts: 30,
            probe_interval: Duration::from_secs(1),
            probe_timeout: Duration::from_secs(5),
            request_timeout: None,
            progress_callback: None,
        }
    }
}

impl fmt::Debug for ServiceConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceConfig")
            .field("program", &self.program)
            .field("args", &self.args)
            .field("host", &self.host)
            .field("port", &self.port)
            .field("max_sync_wait_secs", &self.max_sync_wait_secs)
            .field("engine_kind", &self.engine_kind)
            .field("num_workers", &self.num_workers)
            .field("cuda_visible_devices", &self.cuda_visible_devices)
            .field("extra_env", &self.extra_env)
            .field("max_attempts", &self.max_attempts)
            .field("probe_interval", &self.probe_interval)
            .field("probe_timeout", &self.probe_timeout)
            .field("request_timeout", &self.request_timeout)
            .field(
                "progress_callback",
                &self.progress_callback.as_ref().map(|_| "<dyn StartupProgressCallback>"),
            )
            .finish()
    }
}

impl ServiceConfig {
    /// Create a new builder for `ServiceConfig`.
    pub fn builder() -> ServiceConfigBuilder {
        ServiceConfigBuilder {
            config: Self::default(),
        }
    }

    /// `http://{host}:{port}`
    pub fn base_url(&self) -> String {
        format!("http://{}:{}", self.host, self.port)
    }

    pub fn health_url(&self) -> String {
        format!("{}{}", self.base_url(), HEALTH_PATH)
    }

    pub fn convert_url(&self) -> String {
        format!("{}{}", self.base_url(), CONVERT_SOURCE_PATH)
    }

    /// Environment variables layered over the parent environment when the
    /// service is spawned, in the order they are applied.
    pub fn service_env(&self) -> Vec<(String, String)> {
        let mut env = vec![
            ("DOCLING_SERVE_PORT".to_string(), self.port.to_string()),
            (
                "DOCLING_SERVE_MAX_SYNC_WAIT".to_string(),
                self.max_sync_wait_secs.to_string(),
            ),
            ("DOCLING_SERVE_ENG_KIND".to_string(), self.engine_kind.clone()),
            (
                "DOCLING_SERVE_ENG_LOC_NUM_WORKERS".to_string(),
                self.num_workers.to_string(),
            ),
        ];
        if let Some(ref devices) = self.cuda_visible_devices {
            env.push(("CUDA_VISIBLE_DEVICES".to_string(), devices.clone()));
        }
        // Python buffers stdout when it is a pipe; we want crash output promptly.
        env.push(("PYTHONUNBUFFERED".to_string(), "1".to_string()));
        env.extend(self.extra_env.iter().cloned());
        env
    }

    /// Upper bound on how long an exhausted readiness probe waits.
    ///
    /// Saturates at [`Duration::MAX`].
    pub fn startup_budget(&self) -> Duration {
        self.probe_interval
            .checked_mul(self.max_attempts)
            .unwrap_or(Duration::MAX)
    }
}

/// Builder for [`ServiceConfig`].
#[derive(Debug)]
pub struct ServiceConfigBuilder {
    config: ServiceConfig,
}

impl ServiceConfigBuilder {
    pub fn program(mut self, program: impl Into<String>) -> Self {
        self.config.program = program.into();
        self
    }

    /// Replace the argument list.
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.config.args = args.into_iter().map(Into::into).collect();
        self
    }

    pub fn host(mut self, host: impl Into<String>) -> Self {
        self.config.host = host.into();
        self
    }

    pub fn port(mut self, port: u16) -> Self {
        self.config.port = port;
        self
    }

    pub fn max_sync_wait_secs(mut self, secs: u64) -> Self {
        self.config.max_sync_wait_secs = secs;
        self
    }

    pub fn engine_kind(mut self, kind: impl Into<String>) -> Self {
        self.config.engine_kind = kind.into();
        self
    }

    pub fn num_workers(mut self, n: u32) -> Self {
        self.config.num_workers = n.max(1);
        self
    }

    /// `None` leaves `CUDA_VISIBLE_DEVICES` as inherited from the parent.
    pub fn cuda_visible_devices(mut self, devices: Option<String>) -> Self {
        self.config.cuda_visible_devices = devices;
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.config.extra_env.push((key.into(), value.into()));
        self
    }

    pub fn max_attempts(mut self, n: u32) -> Self {
        self.config.max_attempts = n.max(1);
        self
    }

    pub fn probe_interval(mut self, interval: Duration) -> Self {
        self.config.probe_interval = interval;
        self
    }

    pub fn probe_timeout(mut self, timeout: Duration) -> Self {
        self.config.probe_timeout = timeout;
        self
    }

    pub fn request_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.config.request_timeout = timeout;
        self
    }

    pub fn progress_callback(mut self, cb: ProgressCallback) -> Self {
        self.config.progress_callback = Some(cb);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<ServiceConfig, StartupError> {
        let c = &self.config;
        if c.program.trim().is_empty() {
            return Err(StartupError::InvalidConfig(
                "Service program must not be empty".into(),
            ));
        }
        if c.host.trim().is_empty() {
            return Err(StartupError::InvalidConfig(
                "Service host must not be empty".into(),
            ));
        }
        if c.port == 0 {
            return Err(StartupError::InvalidConfig(
                "Service port must be a fixed, non-zero port".into(),
            ));
        }
        if c.probe_timeout.is_zero() {
            return Err(StartupError::InvalidConfig(
                "Probe timeout must be greater than zero".into(),
            ));
        }
        Ok(self.config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lookup<'a>(env: &'a [(String, String)], key: &str) -> Option<&'a str> {
        env.iter()
            .rev()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    #[test]
    fn defaults_match_reference_deployment() {
        let c = ServiceConfig::default();
        assert_eq!(c.program, "docling-serve");
        assert_eq!(c.args, vec!["run"]);
        assert_eq!(c.base_url(), "http://localhost:5001");
        assert_eq!(c.health_url(), "http://localhost:5001/docs");
        assert_eq!(
            c.convert_url(),
            "http://localhost:5001/v1alpha/convert/source"
        );
        assert_eq!(c.max_attempts, 30);
        assert_eq!(c.probe_interval, Duration::from_secs(1));
        assert_eq!(c.startup_budget(), Duration::from_secs(30));
    }

    #[test]
    fn service_env_exports_all_controls() {
        let env = ServiceConfig::default().service_env();
        assert_eq!(lookup(&env, "DOCLING_SERVE_PORT"), Some("5001"));
        assert_eq!(lookup(&env, "DOCLING_SERVE_MAX_SYNC_WAIT"), Some("600"));
        assert_eq!(lookup(&env, "DOCLING_SERVE_ENG_KIND"), Some("local"));
        assert_eq!(lookup(&env, "DOCLING_SERVE_ENG_LOC_NUM_WORKERS"), Some("2"));
        assert_eq!(lookup(&env, "CUDA_VISIBLE_DEVICES"), Some("0"));
        assert_eq!(lookup(&env, "PYTHONUNBUFFERED"), Some("1"));
    }

    #[test]
    fn service_env_omits_cuda_when_unset_and_appends_extras() {
        let c = ServiceConfig::builder()
            .cuda_visible_devices(None)
            .env("DOCLING_SERVE_ENABLE_UI", "false")
            .build()
            .unwrap();
        let env = c.service_env();
        assert_eq!(lookup(&env, "CUDA_VISIBLE_DEVICES"), None);
        assert_eq!(
            env.last().map(|(k, v)| (k.as_str(), v.as_str())),
            Some(("DOCLING_SERVE_ENABLE_UI", "false"))
        );
    }

    #[test]
    fn builder_clamps_counts() {
        let c = ServiceConfig::builder()
            .max_attempts(0)
            .num_workers(0)
            .build()
            .unwrap();
        assert_eq!(c.max_attempts, 1);
        assert_eq!(c.num_workers, 1);
    }

    #[test]
    fn startup_budget_saturates() {
        let c = ServiceConfig::builder()
            .probe_interval(Duration::MAX)
            .max_attempts(2)
            .build()
            .unwrap();
        assert_eq!(c.startup_budget(), Duration::MAX);
    }

    #[test]
    fn builder_rejects_port_zero() {
        let err = ServiceConfig::builder().port(0).build().unwrap_err();
        assert!(matches!(err, StartupError::InvalidConfig(_)));
    }

    #[test]
    fn builder_rejects_empty_program() {
        let err = ServiceConfig::builder().program("  ").build().unwrap_err();
        assert!(err.to_string().contains("program"));
    }

    #[test]
    fn debug_hides_callback() {
        let c = ServiceConfig::builder()
            .progress_callback(std::sync::Arc::new(crate::progress::NoopProgressCallback))
            .build()
            .unwrap();
        let dbg = format!("{c:?}");
        assert!(dbg.contains("<dyn StartupProgressCallback>"));
    }
}
