//! End-to-end tests against a fake docling-serve.
//!
//! The fake is a small axum app on an ephemeral loopback port that answers
//! `/docs` and records every `/v1alpha/convert/source` call. Where a child
//! process is needed, `sleep` stands in for the real server so the lifecycle
//! (spawn, probe, terminate) is exercised without Python.

use axum::{
    extract::State,
    http::{header::ACCEPT, HeaderMap, StatusCode},
    routing::{get, post},
    Json, Router,
};
use docling_relay::{
    Adapter, AdapterState, ConversionRequest, ConversionResult, FileUpload, ServiceConfig,
    StartupError, StartupProgressCallback, TableMode,
};
use serde_json::{json, Value};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio_test::{assert_err, assert_ok};

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("docling_relay=debug")
        .with_test_writer()
        .try_init();
}

// ── Fake service ─────────────────────────────────────────────────────────

/// One observed conversion call.
#[derive(Debug, Clone)]
struct Call {
    body: Value,
    accept: Option<String>,
    /// For each entry of `files` that looks like a local path: did it exist
    /// while the request was in flight?
    staged_files_existed: Vec<bool>,
}

#[derive(Clone)]
struct FakeState {
    calls: Arc<Mutex<Vec<Call>>>,
    reply_status: StatusCode,
    reply_body: Value,
}

struct FakeService {
    addr: SocketAddr,
    calls: Arc<Mutex<Vec<Call>>>,
}

impl FakeService {
    async fn start(reply_status: StatusCode, reply_body: Value) -> Self {
        let calls = Arc::new(Mutex::new(Vec::new()));
        let state = FakeState {
            calls: calls.clone(),
            reply_status,
            reply_body,
        };
        let app = Router::new()
            .route("/docs", get(|| async { "<html>Swagger UI</html>" }))
            .route("/v1alpha/convert/source", post(convert))
            .with_state(state);

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        Self { addr, calls }
    }

    async fn ok() -> Self {
        Self::start(
            StatusCode::OK,
            json!({"document": {"md_content": "# Converted"}, "status": "success"}),
        )
        .await
    }

    fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    fn config(&self) -> ServiceConfig {
        ServiceConfig::builder()
            .host("127.0.0.1")
            .port(self.addr.port())
            .max_attempts(20)
            .probe_interval(Duration::from_millis(50))
            .probe_timeout(Duration::from_secs(1))
            .build()
            .unwrap()
    }

    /// An adapter attached to this fake, already `Ready`.
    async fn attached(&self) -> Adapter {
        let mut adapter = Adapter::new(self.config()).unwrap();
        assert_ok!(adapter.attach().await);
        adapter
    }
}

async fn convert(
    State(state): State<FakeState>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> (StatusCode, Json<Value>) {
    let staged_files_existed = body["files"]
        .as_array()
        .map(|files| {
            files
                .iter()
                .filter_map(Value::as_str)
                .filter(|f| !f.starts_with("http"))
                .map(|f| PathBuf::from(f).is_file())
                .collect()
        })
        .unwrap_or_default();

    state.calls.lock().unwrap().push(Call {
        body,
        accept: headers
            .get(ACCEPT)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string),
        staged_files_existed,
    });
    (state.reply_status, Json(state.reply_body.clone()))
}

fn staged_path(call: &Call) -> PathBuf {
    PathBuf::from(call.body["files"][0].as_str().unwrap())
}

// ── Relay ────────────────────────────────────────────────────────────────

#[tokio::test]
async fn url_source_is_forwarded_verbatim() {
    init_tracing();
    let fake = FakeService::ok().await;
    let adapter = fake.attached().await;

    let url = "https://arxiv.org/pdf/2305.03393.pdf?download=1";
    let result = adapter
        .convert(&ConversionRequest::from_url(url).to_formats(["md"]))
        .await;

    assert_eq!(
        result,
        ConversionResult::Success(
            json!({"document": {"md_content": "# Converted"}, "status": "success"})
        )
    );
    let calls = fake.calls();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].body["files"], json!([url]));
    assert_eq!(calls[0].accept.as_deref(), Some("application/json"));
}

#[tokio::test]
async fn default_options_reach_the_service() {
    let fake = FakeService::ok().await;
    let adapter = fake.attached().await;

    let _ = adapter
        .convert(&ConversionRequest::from_url("https://example.org/a.pdf"))
        .await;

    let body = &fake.calls()[0].body;
    assert_eq!(body["image_export_mode"], "embedded");
    assert_eq!(body["do_ocr"], true);
    assert_eq!(body["force_ocr"], false);
    assert_eq!(body["ocr_engine"], "easyocr");
    assert_eq!(body["pdf_backend"], "dlparse_v4");
    assert_eq!(body["table_mode"], "fast");
    assert_eq!(body["abort_on_error"], false);
}

#[tokio::test]
async fn upload_is_staged_during_call_and_removed_after() {
    init_tracing();
    let fake = FakeService::ok().await;
    let adapter = fake.attached().await;

    let upload = FileUpload::new("reports/q3 summary.pdf", b"%PDF-1.7 fake".to_vec());
    let result = adapter
        .convert(&ConversionRequest::from_upload(upload).table_mode(TableMode::Accurate))
        .await;
    assert!(result.is_success(), "got: {result:?}");

    let calls = fake.calls();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].staged_files_existed, vec![true]);
    assert_eq!(calls[0].body["table_mode"], "accurate");

    let path = staged_path(&calls[0]);
    assert_eq!(path.file_name().unwrap(), "q3 summary.pdf");
    assert!(!path.exists(), "staged file survived: {}", path.display());
    assert!(!path.parent().unwrap().exists(), "staging dir survived");
}

#[tokio::test]
async fn upload_is_removed_after_service_error() {
    let fake = FakeService::start(
        StatusCode::INTERNAL_SERVER_ERROR,
        json!({"detail": "Conversion failed"}),
    )
    .await;
    let adapter = fake.attached().await;

    let result = adapter
        .convert(&ConversionRequest::from_upload(FileUpload::new(
            "doc.pdf",
            b"%PDF".to_vec(),
        )))
        .await;

    let msg = result.error_message().expect("error result");
    assert!(msg.contains("500"), "got: {msg}");
    assert!(msg.contains("Conversion failed"), "got: {msg}");

    let calls = fake.calls();
    assert_eq!(calls[0].staged_files_existed, vec![true]);
    assert!(!staged_path(&calls[0]).exists());
}

#[tokio::test]
async fn missing_source_makes_no_request() {
    let fake = FakeService::ok().await;
    let adapter = fake.attached().await;

    let result = adapter.convert(&ConversionRequest::default()).await;

    assert_eq!(
        result.to_json(),
        json!({"error": "Either file upload or file URL must be specified"})
    );
    assert!(fake.calls().is_empty());
}

#[tokio::test]
async fn both_sources_make_no_request() {
    let fake = FakeService::ok().await;
    let adapter = fake.attached().await;

    let request = ConversionRequest {
        file: Some(FileUpload::new("a.pdf", b"%PDF".to_vec())),
        ..ConversionRequest::from_url("https://example.org/a.pdf")
    };
    let result = adapter.convert(&request).await;

    assert!(!result.is_success());
    assert!(fake.calls().is_empty());
}

#[tokio::test]
async fn invalid_timeout_rejected_before_staging() {
    let fake = FakeService::ok().await;
    let adapter = fake.attached().await;

    let result = adapter
        .convert(
            &ConversionRequest::from_upload(FileUpload::new("a.pdf", b"%PDF".to_vec()))
                .document_timeout(-1.0),
        )
        .await;

    assert!(result.error_message().unwrap().contains("document_timeout"));
    assert!(fake.calls().is_empty());
}

#[tokio::test]
async fn zero_timeout_is_sent_as_unset() {
    let fake = FakeService::ok().await;
    let adapter = fake.attached().await;

    let result = adapter
        .convert(&ConversionRequest::from_url("https://example.org/a.pdf").document_timeout(0.0))
        .await;

    assert!(result.is_success(), "got: {result:?}");
    let calls = fake.calls();
    assert_eq!(calls.len(), 1);
    assert!(calls[0].body.get("document_timeout").is_none());
}

/// Answers `GET /docs`, then hangs up on anything else without replying.
async fn start_hang_up_service() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        loop {
            let Ok((mut socket, _)) = listener.accept().await else {
                break;
            };
            tokio::spawn(async move {
                let mut buf = [0u8; 4096];
                let n = socket.read(&mut buf).await.unwrap_or(0);
                if buf[..n].starts_with(b"GET") {
                    let _ = socket
                        .write_all(b"HTTP/1.1 200 OK\r\nContent-Length: 0\r\nConnection: close\r\n\r\n")
                        .await;
                }
            });
        }
    });
    addr
}

#[tokio::test]
async fn dropped_connection_yields_error_result() {
    let addr = start_hang_up_service().await;
    let config = ServiceConfig::builder()
        .host("127.0.0.1")
        .port(addr.port())
        .max_attempts(5)
        .probe_interval(Duration::from_millis(20))
        .build()
        .unwrap();
    let mut adapter = Adapter::new(config).unwrap();
    assert_ok!(adapter.attach().await);

    let result = adapter
        .convert(&ConversionRequest::from_upload(FileUpload::new(
            "doc.pdf",
            b"%PDF".to_vec(),
        )))
        .await;

    let json = result.to_json();
    let msg = json["error"].as_str().expect("error descriptor");
    assert!(msg.contains("/v1alpha/convert/source"), "got: {msg}");
    assert_eq!(json.as_object().unwrap().len(), 1);
}

#[tokio::test]
async fn attach_to_nothing_fails_and_refuses_conversion() {
    let port = {
        let l = TcpListener::bind("127.0.0.1:0").await.unwrap();
        l.local_addr().unwrap().port()
    };
    let config = ServiceConfig::builder()
        .host("127.0.0.1")
        .port(port)
        .max_attempts(2)
        .probe_interval(Duration::from_millis(1))
        .probe_timeout(Duration::from_millis(200))
        .build()
        .unwrap();
    let mut adapter = Adapter::new(config).unwrap();
    assert_err!(adapter.attach().await);
    assert_eq!(adapter.state(), AdapterState::Failed);

    let result = adapter
        .convert(&ConversionRequest::from_url("https://example.org/a.pdf"))
        .await;
    assert!(result.error_message().unwrap().contains("failed"));
}

#[tokio::test]
async fn convert_after_shutdown_is_refused() {
    let fake = FakeService::ok().await;
    let mut adapter = fake.attached().await;

    adapter.shutdown().await;
    assert_eq!(adapter.state(), AdapterState::Stopped);

    let result = adapter
        .convert(&ConversionRequest::from_url("https://example.org/a.pdf"))
        .await;
    assert!(result.error_message().unwrap().contains("stopped"));
    assert!(fake.calls().is_empty());
}

// ── Lifecycle with a child process ───────────────────────────────────────

/// Remembers the PID reported when the child is spawned.
#[derive(Default)]
struct PidRecorder(Mutex<Option<u32>>);

impl PidRecorder {
    fn pid(&self) -> Option<u32> {
        *self.0.lock().unwrap()
    }
}

impl StartupProgressCallback for PidRecorder {
    fn on_spawned(&self, pid: Option<u32>) {
        *self.0.lock().unwrap() = pid;
    }
}

#[cfg(unix)]
#[tokio::test]
async fn spawned_child_is_probed_and_terminated() {
    init_tracing();
    let fake = FakeService::ok().await;
    let mut config = fake.config();
    config.program = "sleep".into();
    config.args = vec!["60".into()];

    let mut adapter = Adapter::new(config).unwrap();
    assert_ok!(adapter.start().await);
    assert_eq!(adapter.state(), AdapterState::Ready);
    let pid = adapter.pid().expect("child pid");

    let result = adapter
        .convert(&ConversionRequest::from_url("https://example.org/a.pdf"))
        .await;
    assert!(result.is_success());

    adapter.shutdown().await;
    assert_eq!(adapter.state(), AdapterState::Stopped);
    assert!(adapter.pid().is_none());
    #[cfg(target_os = "linux")]
    assert!(
        !std::path::Path::new(&format!("/proc/{pid}")).exists(),
        "child {pid} still running"
    );
}

#[cfg(unix)]
#[tokio::test]
async fn child_exit_during_startup_reports_stderr() {
    // Nothing listens on the probe port, so only the exit check can end the loop.
    let port = {
        let l = TcpListener::bind("127.0.0.1:0").await.unwrap();
        l.local_addr().unwrap().port()
    };
    let config = ServiceConfig::builder()
        .program("sh")
        .args(["-c", "echo 'ModuleNotFoundError: docling' >&2; exit 3"])
        .host("127.0.0.1")
        .port(port)
        .max_attempts(50)
        .probe_interval(Duration::from_millis(50))
        .probe_timeout(Duration::from_millis(200))
        .build()
        .unwrap();

    let mut adapter = Adapter::new(config).unwrap();
    let err = adapter.start().await.unwrap_err();

    match err {
        StartupError::ServiceExited { stderr, .. } => {
            assert!(stderr.contains("ModuleNotFoundError"), "stderr: {stderr}");
        }
        other => panic!("unexpected: {other:?}"),
    }
    assert_eq!(adapter.state(), AdapterState::Failed);
}

#[cfg(unix)]
#[tokio::test]
async fn silent_child_times_out_and_is_killed() {
    let port = {
        let l = TcpListener::bind("127.0.0.1:0").await.unwrap();
        l.local_addr().unwrap().port()
    };
    let recorder = Arc::new(PidRecorder::default());
    let config = ServiceConfig::builder()
        .program("sleep")
        .args(["60"])
        .host("127.0.0.1")
        .port(port)
        .max_attempts(3)
        .probe_interval(Duration::from_millis(20))
        .probe_timeout(Duration::from_millis(200))
        .progress_callback(recorder.clone())
        .build()
        .unwrap();

    let mut adapter = Adapter::new(config).unwrap();
    let err = adapter.start().await.unwrap_err();

    assert!(matches!(
        err,
        StartupError::ReadinessTimeout { attempts: 3, .. }
    ));
    assert_eq!(adapter.state(), AdapterState::Failed);
    assert!(adapter.pid().is_none());

    let pid = recorder.pid().expect("child was spawned");
    #[cfg(target_os = "linux")]
    assert!(
        !std::path::Path::new(&format!("/proc/{pid}")).exists(),
        "child {pid} still running after timeout"
    );
}

#[cfg(unix)]
#[tokio::test]
async fn second_start_is_rejected() {
    let fake = FakeService::ok().await;
    let mut config = fake.config();
    config.program = "sleep".into();
    config.args = vec!["60".into()];

    let mut adapter = Adapter::new(config).unwrap();
    assert_ok!(adapter.start().await);
    let pid = adapter.pid();

    let err = adapter.start().await.unwrap_err();
    assert!(matches!(err, StartupError::AlreadyStarted { .. }));
    assert!(err.to_string().contains("ready"));
    assert_eq!(adapter.pid(), pid, "no second child");

    adapter.shutdown().await;
}
