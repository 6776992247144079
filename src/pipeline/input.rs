//! Input resolution: turn a user-supplied path or URL into an [`UploadedFile`].
//!
//! This is the interface boundary where the upload constraints are enforced:
//! the declared MIME type must be one of [`ACCEPTED_MIME_TYPES`] and the size
//! must not exceed [`MAX_UPLOAD_BYTES`]. Both are checked from metadata
//! (file system metadata, or `Content-Type` / `Content-Length` headers)
//! before the body is read.

use crate::error::AnalysisError;
use crate::model::{UploadedFile, ACCEPTED_MIME_TYPES, MAX_UPLOAD_BYTES};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info};

/// Check if the input string looks like a URL.
pub fn is_url(input: &str) -> bool {
    input.starts_with("http://") || input.starts_with("https://")
}

/// Declared MIME type for a file name, from its extension.
pub fn mime_from_extension(name: &str) -> Option<&'static str> {
    let ext = Path::new(name).extension()?.to_str()?.to_ascii_lowercase();
    match ext.as_str() {
        "pdf" => Some("application/pdf"),
        "jpg" | "jpeg" => Some("image/jpeg"),
        "png" => Some("image/png"),
        "webp" => Some("image/webp"),
        _ => None,
    }
}

/// Whether `mime_type` may be uploaded.
pub fn is_accepted(mime_type: &str) -> bool {
    ACCEPTED_MIME_TYPES.contains(&mime_type)
}

/// Reject sizes above the upload ceiling.
pub fn check_size(size: u64) -> Result<(), AnalysisError> {
    if size > MAX_UPLOAD_BYTES {
        return Err(AnalysisError::FileTooLarge {
            size,
            limit: MAX_UPLOAD_BYTES,
        });
    }
    Ok(())
}

/// Resolve the input string to an in-memory [`UploadedFile`].
///
/// If the input is a URL, download it. Otherwise read the local file.
pub async fn resolve_input(input: &str, timeout_secs: u64) -> Result<UploadedFile, AnalysisError> {
    if is_url(input) {
        download_url(input, timeout_secs).await
    } else {
        read_local(Path::new(input)).await
    }
}

/// Read a local file after validating its type and size.
pub async fn read_local(path: &Path) -> Result<UploadedFile, AnalysisError> {
    let read_err = |source: std::io::Error| AnalysisError::FileReadFailure {
        path: path.to_path_buf(),
        source,
    };

    let metadata = tokio::fs::metadata(path).await.map_err(read_err)?;
    if !metadata.is_file() {
        return Err(read_err(std::io::Error::new(
            std::io::ErrorKind::InvalidInput,
            "not a regular file",
        )));
    }

    let name = file_name(path);
    let mime_type = declared_mime(&name)?;
    check_size(metadata.len())?;

    let bytes = tokio::fs::read(path).await.map_err(read_err)?;
    // The file may have grown since `metadata`.
    check_size(bytes.len() as u64)?;

    debug!("Read {} ({}, {} bytes)", path.display(), mime_type, bytes.len());
    Ok(UploadedFile::new(name, mime_type, bytes))
}

/// Download a URL into memory, refusing bodies above the upload ceiling.
async fn download_url(url: &str, timeout_secs: u64) -> Result<UploadedFile, AnalysisError> {
    info!("Downloading plan from: {}", url);

    let failed = |reason: String| AnalysisError::DownloadFailed {
        url: url.to_string(),
        reason,
    };

    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(timeout_secs))
        .build()
        .map_err(|e| failed(e.to_string()))?;

    let mut response = client.get(url).send().await.map_err(|e| {
        if e.is_timeout() {
            failed(format!("timed out after {timeout_secs}s"))
        } else {
            failed(e.to_string())
        }
    })?;

    if !response.status().is_success() {
        return Err(failed(format!("HTTP {}", response.status())));
    }

    let name = extract_filename(url);
    let header_mime = response
        .headers()
        .get(reqwest::header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.split(';').next().unwrap_or("").trim().to_ascii_lowercase())
        .filter(|v| is_accepted(v));
    let mime_type = match header_mime {
        Some(m) => m,
        None => declared_mime(&name)?.to_string(),
    };

    if let Some(len) = response.content_length() {
        check_size(len)?;
    }

    let mut bytes = Vec::new();
    while let Some(chunk) = response.chunk().await.map_err(|e| failed(e.to_string()))? {
        bytes.extend_from_slice(&chunk);
        check_size(bytes.len() as u64)?;
    }

    info!("Downloaded {} bytes ({})", bytes.len(), mime_type);
    Ok(UploadedFile::new(name, mime_type, bytes))
}

fn declared_mime(name: &str) -> Result<&'static str, AnalysisError> {
    match mime_from_extension(name) {
        Some(m) => Ok(m),
        None => Err(AnalysisError::UnsupportedFileType {
            mime_type: Path::new(name)
                .extension()
                .and_then(|e| e.to_str())
                .map(|e| format!("unknown (.{e})"))
                .unwrap_or_else(|| "application/octet-stream".to_string()),
        }),
    }
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| PathBuf::from(path).display().to_string())
}

/// Extract a reasonable filename from the URL.
fn extract_filename(url: &str) -> String {
    if let Ok(parsed) = reqwest::Url::parse(url) {
        if let Some(mut segments) = parsed.path_segments() {
            if let Some(last) = segments.next_back() {
                if !last.is_empty() && last.contains('.') {
                    return last.to_string();
                }
            }
        }
    }

    "download".to_string()
}
