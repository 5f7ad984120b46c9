//! CLI binary for docling-relay.
//!
//! A thin shim over the library crate that maps CLI flags to
//! `ServiceConfig` / `ConversionRequest` and prints the result JSON.

use anyhow::{Context, Result};
use clap::Parser;
use docling_relay::{
    Adapter, ConversionRequest, FileUpload, ImageExportMode, OcrEngine, PageRange, PdfBackend,
    ProgressCallback, ServiceConfig, StartupError, StartupProgressCallback, TableMode,
};
use indicatif::{ProgressBar, ProgressStyle};
use std::io;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;
use tracing_subscriber::EnvFilter;

// ── ANSI colour helpers (no extra deps) ──────────────────────────────────────

fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
}
fn red(s: &str) -> String {
    format!("\x1b[31m{s}\x1b[0m")
}
fn dim(s: &str) -> String {
    format!("\x1b[2m{s}\x1b[0m")
}
fn bold(s: &str) -> String {
    format!("\x1b[1m{s}\x1b[0m")
}
fn cyan(s: &str) -> String {
    format!("\x1b[36m{s}\x1b[0m")
}

// ── CLI startup callback using indicatif ─────────────────────────────────────

/// Spinner shown while docling-serve loads its models.
struct CliStartupCallback {
    bar: ProgressBar,
}

impl CliStartupCallback {
    fn new() -> Arc<Self> {
        let bar = ProgressBar::new_spinner();
        let style = ProgressStyle::with_template(
            "{spinner:.cyan} {prefix:.bold}  {msg}  ⏱ {elapsed_precise}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_spinner())
        .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"]);

        bar.set_style(style);
        bar.set_prefix("Starting");
        bar.set_message("docling-serve…");
        bar.enable_steady_tick(Duration::from_millis(80));

        Arc::new(Self { bar })
    }
}

impl StartupProgressCallback for CliStartupCallback {
    fn on_spawned(&self, pid: Option<u32>) {
        if let Some(pid) = pid {
            self.bar
                .println(format!("{} docling-serve started with PID {}", cyan("◆"), pid));
        }
    }

    fn on_probe(&self, attempt: u32, max_attempts: u32) {
        self.bar.set_prefix("Waiting");
        self.bar
            .set_message(format!("health check {attempt}/{max_attempts}"));
    }

    fn on_ready(&self, attempts: u32, elapsed: Duration) {
        self.bar.finish_and_clear();
        eprintln!(
            "{} docling-serve ready  {}",
            green("✔"),
            dim(&format!(
                "{:.1}s, {} probe(s)",
                elapsed.as_secs_f64(),
                attempts
            )),
        );
    }

    fn on_failed(&self, error: &StartupError) {
        self.bar.finish_and_clear();
        let summary = error.to_string();
        let first = summary.lines().next().unwrap_or_default();
        eprintln!("{} {}", red("✘"), bold(first));
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Spawn docling-serve, convert a remote PDF to JSON, shut down
  docling-relay --file-url https://arxiv.org/pdf/2305.03393.pdf --to-format json

  # Convert a local upload to Markdown with accurate tables
  docling-relay --file report.pdf --to-format md --table-mode accurate -o report.json

  # Smoke-test an already running service
  docling-relay --attach --file-url https://arxiv.org/pdf/2305.03393.pdf --from-format pdf

  # Keep the service up after a test conversion (Ctrl+C to stop)
  docling-relay --serve --file-url https://arxiv.org/pdf/2305.03393.pdf

  # OCR a scanned document in German and English, pages 1-3 only
  docling-relay --file scan.pdf --force-ocr --ocr-engine tesseract \
      --ocr-lang deu,eng --page-range 1-3

SERVICE ENVIRONMENT (exported to docling-serve):
  DOCLING_SERVE_PORT                 --port
  DOCLING_SERVE_MAX_SYNC_WAIT        --max-sync-wait
  DOCLING_SERVE_ENG_KIND             local
  DOCLING_SERVE_ENG_LOC_NUM_WORKERS  --workers
  CUDA_VISIBLE_DEVICES               --cuda-visible-devices ("" leaves it inherited)

OUTPUT:
  The result is printed as JSON: docling-serve's response verbatim, or
  {"error": "<description>"}. The exit code is 1 for an error result.
"#;

/// Launch docling-serve and relay a conversion request to it.
#[derive(Parser, Debug)]
#[command(
    name = "docling-relay",
    version,
    about = "Launch docling-serve and relay a conversion request to it",
    long_about = "Spawn docling-serve as a subprocess (or attach to a running one), wait for \
its health endpoint, forward one conversion request to /v1alpha/convert/source, and print \
the JSON response. Uploaded files are staged in a temporary directory that is removed \
afterwards.",
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    // ── Source ───────────────────────────────────────────────────────────
    /// Local file to upload.
    #[arg(long, env = "DOCLING_RELAY_FILE", conflicts_with = "file_url")]
    file: Option<PathBuf>,

    /// Remote document URL, passed to the service unchanged.
    #[arg(long, env = "DOCLING_RELAY_FILE_URL")]
    file_url: Option<String>,

    // ── Conversion options ───────────────────────────────────────────────
    /// Input format(s) to convert from (repeatable or comma-separated).
    #[arg(long = "from-format", value_delimiter = ',')]
    from_formats: Vec<String>,

    /// Output format(s) to convert to (repeatable or comma-separated).
    #[arg(long = "to-format", value_delimiter = ',')]
    to_formats: Vec<String>,

    /// Image export mode: placeholder, embedded, referenced.
    #[arg(long, default_value_t = ImageExportMode::Embedded)]
    image_export_mode: ImageExportMode,

    /// Disable OCR.
    #[arg(long)]
    no_ocr: bool,

    /// Force OCR even where text can be extracted.
    #[arg(long)]
    force_ocr: bool,

    /// OCR engine: easyocr, ocrmac, rapidocr, tesserocr, tesseract.
    #[arg(long, default_value_t = OcrEngine::Easyocr)]
    ocr_engine: OcrEngine,

    /// OCR language code(s) (repeatable or comma-separated).
    #[arg(long, value_delimiter = ',')]
    ocr_lang: Vec<String>,

    /// PDF backend: pypdfium2, dlparse_v1, dlparse_v2, dlparse_v4.
    #[arg(long, default_value_t = PdfBackend::DlparseV4)]
    pdf_backend: PdfBackend,

    /// Table mode: fast, accurate.
    #[arg(long, default_value_t = TableMode::Fast)]
    table_mode: TableMode,

    /// Page range to convert: 5 or 3-15 (repeatable).
    #[arg(long)]
    page_range: Vec<PageRange>,

    /// Per-document processing timeout in seconds.
    #[arg(long)]
    document_timeout: Option<f64>,

    /// Abort on the first conversion error.
    #[arg(long)]
    abort_on_error: bool,

    // ── Service ──────────────────────────────────────────────────────────
    /// Service executable.
    #[arg(long, env = "DOCLING_RELAY_PROGRAM", default_value = "docling-serve")]
    program: String,

    /// Argument passed to the service executable (repeatable).
    #[arg(long = "arg", default_value = "run", allow_hyphen_values = true)]
    args: Vec<String>,

    /// Extra KEY=VALUE environment for the service (repeatable).
    #[arg(long = "env", value_parser = parse_env_pair)]
    env: Vec<(String, String)>,

    /// Host the service is reached on.
    #[arg(long, env = "DOCLING_RELAY_HOST", default_value = "localhost")]
    host: String,

    /// Service listen port.
    #[arg(long, env = "DOCLING_RELAY_PORT", default_value_t = 5001)]
    port: u16,

    /// Local engine worker count.
    #[arg(long, env = "DOCLING_RELAY_WORKERS", default_value_t = 2)]
    workers: u32,

    /// Longest synchronous conversion the service will wait on, in seconds.
    #[arg(long, env = "DOCLING_RELAY_MAX_SYNC_WAIT", default_value_t = 600)]
    max_sync_wait: u64,

    /// GPU selection for the service ("" to inherit).
    #[arg(long, env = "DOCLING_RELAY_CUDA_VISIBLE_DEVICES", default_value = "0")]
    cuda_visible_devices: String,

    /// Health probes before giving up.
    #[arg(long, env = "DOCLING_RELAY_STARTUP_ATTEMPTS", default_value_t = 30)]
    startup_attempts: u32,

    /// Milliseconds between health probes.
    #[arg(long, env = "DOCLING_RELAY_STARTUP_INTERVAL_MS", default_value_t = 1000)]
    startup_interval_ms: u64,

    /// Client-side timeout for the conversion call, in seconds.
    #[arg(long, env = "DOCLING_RELAY_REQUEST_TIMEOUT")]
    request_timeout: Option<u64>,

    // ── Modes ────────────────────────────────────────────────────────────
    /// Use an already running service instead of spawning one.
    #[arg(long, conflicts_with = "serve")]
    attach: bool,

    /// Keep the spawned service running until Ctrl+C.
    #[arg(long)]
    serve: bool,

    // ── Output ───────────────────────────────────────────────────────────
    /// Write the result JSON to this file instead of stdout.
    #[arg(short, long, env = "DOCLING_RELAY_OUTPUT")]
    output: Option<PathBuf>,

    /// Disable the startup spinner.
    #[arg(long, env = "DOCLING_RELAY_NO_PROGRESS")]
    no_progress: bool,

    /// Enable DEBUG-level tracing logs (includes docling-serve output).
    #[arg(short, long, env = "DOCLING_RELAY_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, env = "DOCLING_RELAY_QUIET")]
    quiet: bool,
}

impl Cli {
    fn has_source(&self) -> bool {
        self.file.is_some() || self.file_url.is_some()
    }
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // The spinner covers startup feedback; keep INFO lines from tearing it.
    let show_progress = !cli.quiet && !cli.no_progress;
    let filter = if cli.verbose {
        "debug"
    } else if cli.quiet || show_progress {
        "error"
    } else {
        "info"
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(io::stderr)
        .init();

    // ── Build config ─────────────────────────────────────────────────────
    let progress: Option<ProgressCallback> = if show_progress {
        Some(CliStartupCallback::new() as Arc<dyn StartupProgressCallback>)
    } else {
        None
    };
    let config = build_config(&cli, progress)?;
    let base_url = config.base_url();

    // Read the upload before spawning anything, so a typo fails fast.
    let request = build_request(&cli).await?;

    // ── Start or attach ──────────────────────────────────────────────────
    let mut adapter = Adapter::new(config).context("Invalid service configuration")?;
    if cli.attach {
        adapter
            .attach()
            .await
            .with_context(|| format!("No docling-serve answering at {base_url}"))?;
    } else {
        adapter
            .start()
            .await
            .context("docling-serve failed to start")?;
    }

    // ── Relay ────────────────────────────────────────────────────────────
    let mut exit = ExitCode::SUCCESS;
    if cli.has_source() || !cli.serve {
        let result = adapter.convert(&request).await;
        let json = serde_json::to_string_pretty(&result).context("Failed to serialise result")?;

        match cli.output {
            Some(ref path) => tokio::fs::write(path, json.as_bytes())
                .await
                .with_context(|| format!("Failed to write {}", path.display()))?,
            None => println!("{json}"),
        }

        if let Some(msg) = result.error_message() {
            if !cli.quiet {
                eprintln!("{} {}", red("✘"), msg);
            }
            exit = ExitCode::from(1);
        } else if !cli.quiet {
            eprintln!(
                "{} Conversion complete  {}",
                green("✔"),
                dim(&format!("{} bytes of JSON", json.len()))
            );
        }
    }

    // ── Serve ────────────────────────────────────────────────────────────
    if cli.serve {
        if !cli.quiet {
            eprintln!("{} Service URL: {}", cyan("◆"), bold(&base_url));
            eprintln!("  API docs:    {base_url}/docs");
            eprintln!("  {}", dim("Press Ctrl+C to stop the service."));
        }
        tokio::select! {
            signal = tokio::signal::ctrl_c() => {
                signal.context("Failed to listen for Ctrl+C")?;
                if !cli.quiet {
                    eprintln!("Stopping service...");
                }
            }
            waited = adapter.wait() => match waited {
                Ok(Some(status)) => {
                    eprintln!("{} docling-serve exited ({status})", red("✘"));
                    exit = ExitCode::from(1);
                }
                Ok(None) => {}
                Err(e) => warn!("Lost track of docling-serve: {}", e),
            },
        }
    }

    adapter.shutdown().await;
    Ok(exit)
}

/// Map CLI args to `ServiceConfig`.
fn build_config(cli: &Cli, progress: Option<ProgressCallback>) -> Result<ServiceConfig> {
    let cuda = match cli.cuda_visible_devices.trim() {
        "" => None,
        devices => Some(devices.to_string()),
    };

    let mut builder = ServiceConfig::builder()
        .program(&cli.program)
        .args(&cli.args)
        .host(&cli.host)
        .port(cli.port)
        .num_workers(cli.workers)
        .max_sync_wait_secs(cli.max_sync_wait)
        .cuda_visible_devices(cuda)
        .max_attempts(cli.startup_attempts)
        .probe_interval(Duration::from_millis(cli.startup_interval_ms))
        .request_timeout(cli.request_timeout.map(Duration::from_secs));

    for (key, value) in &cli.env {
        builder = builder.env(key, value);
    }
    if let Some(cb) = progress {
        builder = builder.progress_callback(cb);
    }

    builder.build().context("Invalid configuration")
}

/// Map CLI args to `ConversionRequest`.
async fn build_request(cli: &Cli) -> Result<ConversionRequest> {
    let file = match cli.file {
        Some(ref path) => Some(
            FileUpload::from_path(path)
                .await
                .with_context(|| format!("Failed to read {}", path.display()))?,
        ),
        None => None,
    };

    let mut request = ConversionRequest {
        file,
        file_url: cli.file_url.clone(),
        ..ConversionRequest::default()
    }
    .from_formats(&cli.from_formats)
    .to_formats(&cli.to_formats)
    .image_export_mode(cli.image_export_mode)
    .do_ocr(!cli.no_ocr)
    .force_ocr(cli.force_ocr)
    .ocr_engine(cli.ocr_engine)
    .ocr_lang(&cli.ocr_lang)
    .pdf_backend(cli.pdf_backend)
    .table_mode(cli.table_mode)
    .page_range(cli.page_range.iter().copied())
    .abort_on_error(cli.abort_on_error);

    if let Some(secs) = cli.document_timeout {
        request = request.document_timeout(secs);
    }

    Ok(request)
}

/// Parse `KEY=VALUE` for `--env`.
fn parse_env_pair(s: &str) -> Result<(String, String), String> {
    let (key, value) = s
        .split_once('=')
        .ok_or_else(|| format!("expected KEY=VALUE, got '{s}'"))?;
    if key.trim().is_empty() {
        return Err(format!("empty variable name in '{s}'"));
    }
    Ok((key.trim().to_string(), value.to_string()))
}
