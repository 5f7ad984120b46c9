//! Conversion request types.
//!
//! [`ConversionRequest`] is a flat record of everything a caller can ask
//! `docling-serve` for. Only the source is mandatory, and it must be exactly
//! one of an uploaded file or a remote URL; every other field has the same
//! default the service itself documents.
//!
//! The closed option sets ([`ImageExportMode`], [`OcrEngine`], [`PdfBackend`],
//! [`TableMode`]) serialise to the service's wire names and parse from them
//! via [`FromStr`], so a CLI can accept `--ocr-engine rapidocr` verbatim.

use crate::error::UnknownOption;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::str::FromStr;

// ── Source ───────────────────────────────────────────────────────────────

/// A file handed to the adapter as bytes, to be staged on disk for the service.
#[derive(Clone, PartialEq, Eq)]
pub struct FileUpload {
    /// Name the upload arrived with. Only its final path component is used.
    pub name: String,
    pub bytes: Vec<u8>,
}

impl FileUpload {
    pub fn new(name: impl Into<String>, bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            name: name.into(),
            bytes: bytes.into(),
        }
    }

    /// Read a local file into an upload named after it.
    pub async fn from_path(path: impl AsRef<Path>) -> std::io::Result<Self> {
        let path = path.as_ref();
        let bytes = tokio::fs::read(path).await?;
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        Ok(Self { name, bytes })
    }
}

impl fmt::Debug for FileUpload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FileUpload")
            .field("name", &self.name)
            .field("len", &self.bytes.len())
            .finish()
    }
}

// ── Request ──────────────────────────────────────────────────────────────

/// Options for one conversion call.
///
/// # Example
/// ```rust
/// use docling_relay::{ConversionRequest, OcrEngine, TableMode};
///
/// let request = ConversionRequest::from_url("https://arxiv.org/pdf/2305.03393.pdf")
///     .to_formats(["md", "json"])
///     .ocr_engine(OcrEngine::Rapidocr)
///     .table_mode(TableMode::Accurate);
/// assert!(request.do_ocr);
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct ConversionRequest {
    /// Uploaded document. Mutually exclusive with `file_url`.
    pub file: Option<FileUpload>,
    /// Remote document passed to the service unchanged.
    pub file_url: Option<String>,
    /// Input format identifiers. Empty means "let the service detect".
    pub from_formats: Vec<String>,
    /// Output format identifiers. Empty means the service default.
    pub to_formats: Vec<String>,
    /// Default: [`ImageExportMode::Embedded`].
    pub image_export_mode: ImageExportMode,
    /// Default: true.
    pub do_ocr: bool,
    /// Default: false.
    pub force_ocr: bool,
    /// Default: [`OcrEngine::Easyocr`].
    pub ocr_engine: OcrEngine,
    pub ocr_lang: Vec<String>,
    /// Default: [`PdfBackend::DlparseV4`].
    pub pdf_backend: PdfBackend,
    /// Default: [`TableMode::Fast`].
    pub table_mode: TableMode,
    pub page_range: Vec<PageRange>,
    /// Per-document processing timeout in seconds, enforced by the service.
    pub document_timeout: Option<f64>,
    /// Default: false.
    pub abort_on_error: bool,
}

impl Default for ConversionRequest {
    fn default() -> Self {
        Self {
            file: None,
            file_url: None,
            from_formats: Vec::new(),
            to_formats: Vec::new(),
            image_export_mode: ImageExportMode::default(),
            do_ocr: true,
            force_ocr: false,
            ocr_engine: OcrEngine::default(),
            ocr_lang: Vec::new(),
            pdf_backend: PdfBackend::default(),
            table_mode: TableMode::default(),
            page_range: Vec::new(),
            document_timeout: None,
            abort_on_error: false,
        }
    }
}

fn collect_strings<I, S>(items: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    items.into_iter().map(Into::into).collect()
}

impl ConversionRequest {
    /// A request for an uploaded file with default options.
    pub fn from_upload(file: FileUpload) -> Self {
        Self {
            file: Some(file),
            ..Self::default()
        }
    }

    /// A request for a remote document with default options.
    pub fn from_url(url: impl Into<String>) -> Self {
        Self {
            file_url: Some(url.into()),
            ..Self::default()
        }
    }

    pub fn from_formats<I, S>(mut self, formats: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.from_formats = collect_strings(formats);
        self
    }

    pub fn to_formats<I, S>(mut self, formats: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.to_formats = collect_strings(formats);
        self
    }

    pub fn image_export_mode(mut self, mode: ImageExportMode) -> Self {
        self.image_export_mode = mode;
        self
    }

    pub fn do_ocr(mut self, v: bool) -> Self {
        self.do_ocr = v;
        self
    }

    pub fn force_ocr(mut self, v: bool) -> Self {
        self.force_ocr = v;
        self
    }

    pub fn ocr_engine(mut self, engine: OcrEngine) -> Self {
        self.ocr_engine = engine;
        self
    }

    pub fn ocr_lang<I, S>(mut self, langs: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.ocr_lang = collect_strings(langs);
        self
    }

    pub fn pdf_backend(mut self, backend: PdfBackend) -> Self {
        self.pdf_backend = backend;
        self
    }

    pub fn table_mode(mut self, mode: TableMode) -> Self {
        self.table_mode = mode;
        self
    }

    pub fn page_range(mut self, ranges: impl IntoIterator<Item = PageRange>) -> Self {
        self.page_range = ranges.into_iter().collect();
        self
    }

    pub fn document_timeout(mut self, secs: f64) -> Self {
        self.document_timeout = Some(secs);
        self
    }

    pub fn abort_on_error(mut self, v: bool) -> Self {
        self.abort_on_error = v;
        self
    }
}

// ── Page ranges ──────────────────────────────────────────────────────────

/// An inclusive, 1-indexed page range. Serialises as `[start, end]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageRange(pub u32, pub u32);

impl PageRange {
    pub fn new(start: u32, end: u32) -> Result<Self, String> {
        if start < 1 {
            return Err(format!("Pages are 1-indexed, minimum is 1 (got {start})"));
        }
        if start > end {
            return Err(format!(
                "Invalid page range '{start}-{end}': start must be <= end"
            ));
        }
        Ok(Self(start, end))
    }

    pub fn single(page: u32) -> Result<Self, String> {
        Self::new(page, page)
    }
}

impl FromStr for PageRange {
    type Err = String;

    /// Accepts `"5"` or `"3-15"`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let parse = |p: &str| {
            p.trim()
                .parse::<u32>()
                .map_err(|_| format!("Invalid page number: '{}'", p.trim()))
        };
        match s.split_once('-') {
            Some((start, end)) => Self::new(parse(start)?, parse(end)?),
            None => Self::single(parse(s)?),
        }
    }
}

impl fmt::Display for PageRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.0, self.1)
    }
}

// ── Closed option sets ───────────────────────────────────────────────────

/// How pictures are represented in the converted document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImageExportMode {
    Placeholder,
    /// Images inlined as base64. (default)
    #[default]
    Embedded,
    Referenced,
}

impl ImageExportMode {
    pub const ALL: [Self; 3] = [Self::Placeholder, Self::Embedded, Self::Referenced];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Placeholder => "placeholder",
            Self::Embedded => "embedded",
            Self::Referenced => "referenced",
        }
    }
}

/// OCR engine the service should use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OcrEngine {
    #[default]
    Easyocr,
    Ocrmac,
    Rapidocr,
    Tesserocr,
    Tesseract,
}

impl OcrEngine {
    pub const ALL: [Self; 5] = [
        Self::Easyocr,
        Self::Ocrmac,
        Self::Rapidocr,
        Self::Tesserocr,
        Self::Tesseract,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Easyocr => "easyocr",
            Self::Ocrmac => "ocrmac",
            Self::Rapidocr => "rapidocr",
            Self::Tesserocr => "tesserocr",
            Self::Tesseract => "tesseract",
        }
    }
}

/// PDF parsing backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum PdfBackend {
    #[serde(rename = "pypdfium2")]
    Pypdfium2,
    #[serde(rename = "dlparse_v1")]
    DlparseV1,
    #[serde(rename = "dlparse_v2")]
    DlparseV2,
    #[default]
    #[serde(rename = "dlparse_v4")]
    DlparseV4,
}

impl PdfBackend {
    pub const ALL: [Self; 4] = [
        Self::Pypdfium2,
        Self::DlparseV1,
        Self::DlparseV2,
        Self::DlparseV4,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pypdfium2 => "pypdfium2",
            Self::DlparseV1 => "dlparse_v1",
            Self::DlparseV2 => "dlparse_v2",
            Self::DlparseV4 => "dlparse_v4",
        }
    }
}

/// Table structure model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TableMode {
    #[default]
    Fast,
    Accurate,
}

impl TableMode {
    pub const ALL: [Self; 2] = [Self::Fast, Self::Accurate];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Fast => "fast",
            Self::Accurate => "accurate",
        }
    }
}

/// Shared `FromStr`/`Display` for the option enums, keyed on `ALL` and `as_str`.
macro_rules! wire_name_impls {
    ($ty:ty, $kind:literal) => {
        impl FromStr for $ty {
            type Err = UnknownOption;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                let needle = s.trim().to_ascii_lowercase();
                <$ty>::ALL
                    .iter()
                    .copied()
                    .find(|v| v.as_str() == needle)
                    .ok_or_else(|| {
                        UnknownOption::new($kind, s, <$ty>::ALL.iter().map(|v| v.as_str()))
                    })
            }
        }

        impl fmt::Display for $ty {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }
    };
}

wire_name_impls!(ImageExportMode, "image export mode");
wire_name_impls!(OcrEngine, "OCR engine");
wire_name_impls!(PdfBackend, "PDF backend");
wire_name_impls!(TableMode, "table mode");
