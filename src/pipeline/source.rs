//! Source resolution: turn a request's upload-or-URL into the string the
//! service is told to fetch.
//!
//! Uploads are written into a fresh [`TempDir`] so the service (running on
//! the same host) can open them by path. The directory lives exactly as long
//! as the [`ResolvedSource`]: [`ResolvedSource::cleanup`] removes it and logs
//! any failure, and dropping the value removes it on every other path,
//! including unwinding.

use crate::error::RelayError;
use crate::request::{ConversionRequest, FileUpload};
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use tracing::{info, warn};

/// Name used when an upload's own name has no usable final component.
const FALLBACK_UPLOAD_NAME: &str = "upload";

/// The resolved source — either a pass-through URL or a staged upload.
#[derive(Debug)]
pub enum ResolvedSource {
    /// Input was a URL; nothing touched the file system.
    Remote(String),
    /// Input was an upload, persisted at `path` inside `temp_dir`.
    Staged { path: PathBuf, temp_dir: TempDir },
}

impl ResolvedSource {
    /// The entry for the payload's `files` list.
    pub fn location(&self) -> String {
        match self {
            ResolvedSource::Remote(url) => url.clone(),
            ResolvedSource::Staged { path, .. } => path.to_string_lossy().into_owned(),
        }
    }

    /// The scratch directory, if one was created.
    pub fn temp_dir(&self) -> Option<&Path> {
        match self {
            ResolvedSource::Remote(_) => None,
            ResolvedSource::Staged { temp_dir, .. } => Some(temp_dir.path()),
        }
    }

    /// Remove the scratch directory. Failures are logged, never returned.
    pub fn cleanup(self) {
        if let ResolvedSource::Staged { temp_dir, .. } = self {
            let dir = temp_dir.path().to_path_buf();
            match temp_dir.close() {
                Ok(()) => info!("Temporary files cleaned: {}", dir.display()),
                Err(e) => warn!("Failed to clean temporary files {}: {}", dir.display(), e),
            }
        }
    }
}

/// Resolve the request's source.
///
/// Exactly one of `file` / `file_url` must be set. Nothing is written to disk
/// unless validation passes.
pub async fn resolve_source(request: &ConversionRequest) -> Result<ResolvedSource, RelayError> {
    match (&request.file, &request.file_url) {
        (Some(_), Some(_)) => Err(RelayError::ConflictingSource),
        (None, None) => Err(RelayError::MissingSource),
        (None, Some(url)) => {
            if url.trim().is_empty() {
                return Err(RelayError::MissingSource);
            }
            info!("Using URL: {}", url);
            Ok(ResolvedSource::Remote(url.clone()))
        }
        (Some(upload), None) => stage_upload(upload).await,
    }
}

/// Write an upload into a new temporary directory.
async fn stage_upload(upload: &FileUpload) -> Result<ResolvedSource, RelayError> {
    let temp_dir = TempDir::new().map_err(|e| RelayError::UploadFailed {
        path: std::env::temp_dir(),
        source: e,
    })?;
    let path = temp_dir.path().join(upload_file_name(&upload.name));

    // On error `temp_dir` drops here and takes the directory with it.
    tokio::fs::write(&path, &upload.bytes)
        .await
        .map_err(|e| RelayError::UploadFailed {
            path: path.clone(),
            source: e,
        })?;

    info!("File uploaded: {} -> {}", upload.name, path.display());
    Ok(ResolvedSource::Staged { path, temp_dir })
}

/// Final path component of `name`, so an upload can never escape its directory.
fn upload_file_name(name: &str) -> String {
    // Normalise Windows separators before asking `Path` for the last component.
    let normalised = name.replace('\\', "/");
    Path::new(&normalised)
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .filter(|n| !n.trim().is_empty())
        .unwrap_or_else(|| FALLBACK_UPLOAD_NAME.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn upload_names_are_confined() {
        assert_eq!(upload_file_name("report.pdf"), "report.pdf");
        assert_eq!(upload_file_name("/tmp/cog/inputs/report.pdf"), "report.pdf");
        assert_eq!(upload_file_name("../../etc/passwd"), "passwd");
        assert_eq!(upload_file_name("C:\\Users\\me\\scan.png"), "scan.png");
        assert_eq!(upload_file_name(""), FALLBACK_UPLOAD_NAME);
        assert_eq!(upload_file_name(".."), FALLBACK_UPLOAD_NAME);
        assert_eq!(upload_file_name("dir/"), "dir");
    }

    #[tokio::test]
    async fn missing_source_is_rejected() {
        let err = resolve_source(&ConversionRequest::default()).await.unwrap_err();
        assert!(matches!(err, RelayError::MissingSource));
    }

    #[tokio::test]
    async fn blank_url_counts_as_missing() {
        let err = resolve_source(&ConversionRequest::from_url("  "))
            .await
            .unwrap_err();
        assert!(matches!(err, RelayError::MissingSource));
    }

    #[tokio::test]
    async fn both_sources_are_rejected() {
        let mut req = ConversionRequest::from_url("https://example.org/doc.pdf");
        req.file = Some(FileUpload::new("doc.pdf", b"%PDF".to_vec()));
        let err = resolve_source(&req).await.unwrap_err();
        assert!(matches!(err, RelayError::ConflictingSource));
    }

    #[tokio::test]
    async fn url_passes_through_without_temp_dir() {
        let src = resolve_source(&ConversionRequest::from_url("https://example.org/doc.pdf"))
            .await
            .unwrap();
        assert_eq!(src.location(), "https://example.org/doc.pdf");
        assert!(src.temp_dir().is_none());
    }

    #[tokio::test]
    async fn upload_is_staged_and_cleaned() {
        let req = ConversionRequest::from_upload(FileUpload::new("nested/doc.pdf", b"%PDF-1.4".to_vec()));
        let src = resolve_source(&req).await.unwrap();

        let dir = src.temp_dir().unwrap().to_path_buf();
        let path = PathBuf::from(src.location());
        assert_eq!(path.parent(), Some(dir.as_path()));
        assert_eq!(path.file_name().unwrap(), "doc.pdf");
        assert_eq!(std::fs::read(&path).unwrap(), b"%PDF-1.4");

        src.cleanup();
        assert!(!dir.exists());
    }

    #[tokio::test]
    async fn dropping_staged_source_removes_dir() {
        let req = ConversionRequest::from_upload(FileUpload::new("a.docx", b"PK".to_vec()));
        let src = resolve_source(&req).await.unwrap();
        let dir = src.temp_dir().unwrap().to_path_buf();
        drop(src);
        assert!(!dir.exists());
    }

    #[test]
    fn cleanup_tolerates_already_removed_dir() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("x");
        std::fs::remove_dir_all(temp_dir.path()).unwrap();
        // Must log and return, not panic.
        ResolvedSource::Staged { path, temp_dir }.cleanup();
    }
}
