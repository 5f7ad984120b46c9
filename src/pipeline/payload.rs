//! Map a [`ConversionRequest`] onto the `/v1alpha/convert/source` body.
//!
//! Optional fields are omitted rather than sent as `null` or `[]` so the
//! service applies its own defaults for anything the caller left unset.

use crate::error::RelayError;
use crate::request::{
    ConversionRequest, ImageExportMode, OcrEngine, PageRange, PdfBackend, TableMode,
};
use serde::Serialize;

/// Request body for `POST /v1alpha/convert/source`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConvertSourcePayload {
    pub files: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub from_formats: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub to_formats: Vec<String>,
    pub image_export_mode: ImageExportMode,
    pub do_ocr: bool,
    pub force_ocr: bool,
    pub ocr_engine: OcrEngine,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub ocr_lang: Vec<String>,
    pub pdf_backend: PdfBackend,
    pub table_mode: TableMode,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub page_range: Vec<PageRange>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub document_timeout: Option<f64>,
    pub abort_on_error: bool,
}

/// Build the payload for `request`, with `files` already resolved.
pub fn build_payload(
    request: &ConversionRequest,
    files: Vec<String>,
) -> Result<ConvertSourcePayload, RelayError> {
    if files.is_empty() {
        return Err(RelayError::MissingSource);
    }
    validate_options(request)?;

    Ok(ConvertSourcePayload {
        files,
        from_formats: non_blank(&request.from_formats),
        to_formats: non_blank(&request.to_formats),
        image_export_mode: request.image_export_mode,
        do_ocr: request.do_ocr,
        force_ocr: request.force_ocr,
        ocr_engine: request.ocr_engine,
        ocr_lang: non_blank(&request.ocr_lang),
        pdf_backend: request.pdf_backend,
        table_mode: request.table_mode,
        page_range: request.page_range.clone(),
        document_timeout: request.document_timeout.filter(|t| *t != 0.0),
        abort_on_error: request.abort_on_error,
    })
}

/// Reject option values the service would refuse anyway.
///
/// A zero `document_timeout` means "unset" and is dropped from the payload
/// instead. Cheap enough to run before any upload is staged.
pub fn validate_options(request: &ConversionRequest) -> Result<(), RelayError> {
    if let Some(t) = request.document_timeout {
        if !t.is_finite() || t < 0.0 {
            return Err(RelayError::InvalidRequest(format!(
                "document_timeout must be a non-negative number of seconds, got {t}"
            )));
        }
    }
    for range in &request.page_range {
        PageRange::new(range.0, range.1).map_err(RelayError::InvalidRequest)?;
    }
    Ok(())
}

fn non_blank(items: &[String]) -> Vec<String> {
    items
        .iter()
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn url_request_with_defaults() {
        let req = ConversionRequest::from_url("https://example.org/doc.pdf").to_formats(["json"]);
        let payload = build_payload(&req, vec!["https://example.org/doc.pdf".into()]).unwrap();
        let body = serde_json::to_value(&payload).unwrap();

        assert_eq!(
            body,
            json!({
                "files": ["https://example.org/doc.pdf"],
                "to_formats": ["json"],
                "image_export_mode": "embedded",
                "do_ocr": true,
                "force_ocr": false,
                "ocr_engine": "easyocr",
                "pdf_backend": "dlparse_v4",
                "table_mode": "fast",
                "abort_on_error": false
            })
        );
        let obj = body.as_object().unwrap();
        for absent in ["from_formats", "ocr_lang", "page_range", "document_timeout"] {
            assert!(!obj.contains_key(absent), "{absent} should be omitted");
        }
    }

    #[test]
    fn every_option_is_forwarded() {
        let req = ConversionRequest::from_url("https://example.org/scan.pdf")
            .from_formats(["pdf"])
            .to_formats(["md", "json"])
            .image_export_mode(ImageExportMode::Placeholder)
            .do_ocr(true)
            .force_ocr(true)
            .ocr_engine(OcrEngine::Tesseract)
            .ocr_lang(["eng", "deu"])
            .pdf_backend(PdfBackend::Pypdfium2)
            .table_mode(TableMode::Accurate)
            .page_range([PageRange(1, 3), PageRange(7, 9)])
            .document_timeout(120.5)
            .abort_on_error(true);
        let body = serde_json::to_value(
            build_payload(&req, vec!["https://example.org/scan.pdf".into()]).unwrap(),
        )
        .unwrap();

        assert_eq!(body["from_formats"], json!(["pdf"]));
        assert_eq!(body["to_formats"], json!(["md", "json"]));
        assert_eq!(body["image_export_mode"], "placeholder");
        assert_eq!(body["force_ocr"], true);
        assert_eq!(body["ocr_engine"], "tesseract");
        assert_eq!(body["ocr_lang"], json!(["eng", "deu"]));
        assert_eq!(body["pdf_backend"], "pypdfium2");
        assert_eq!(body["table_mode"], "accurate");
        assert_eq!(body["page_range"], json!([[1, 3], [7, 9]]));
        assert_eq!(body["document_timeout"], 120.5);
        assert_eq!(body["abort_on_error"], true);
    }

    #[test]
    fn blank_list_entries_are_dropped() {
        let req = ConversionRequest::from_url("u").to_formats(["", "  "]);
        let body = serde_json::to_value(build_payload(&req, vec!["u".into()]).unwrap()).unwrap();
        assert!(body.get("to_formats").is_none());
    }

    #[test]
    fn empty_files_rejected() {
        let err = build_payload(&ConversionRequest::default(), vec![]).unwrap_err();
        assert!(matches!(err, RelayError::MissingSource));
    }

    #[test]
    fn negative_or_non_finite_timeout_rejected() {
        for bad in [-5.0, f64::NAN, f64::INFINITY] {
            let req = ConversionRequest::from_url("u").document_timeout(bad);
            let err = build_payload(&req, vec!["u".into()]).unwrap_err();
            assert!(matches!(err, RelayError::InvalidRequest(_)), "accepted {bad}");
        }
    }

    #[test]
    fn zero_timeout_is_omitted() {
        let req = ConversionRequest::from_url("u").document_timeout(0.0);
        let body = serde_json::to_value(build_payload(&req, vec!["u".into()]).unwrap()).unwrap();
        assert!(body.get("document_timeout").is_none());
    }

    #[test]
    fn hand_built_page_ranges_are_checked() {
        for bad in [PageRange(0, 0), PageRange(9, 2)] {
            let req = ConversionRequest::from_url("u").page_range([bad]);
            let err = build_payload(&req, vec!["u".into()]).unwrap_err();
            assert!(matches!(err, RelayError::InvalidRequest(_)), "accepted {bad}");
        }
    }
}
