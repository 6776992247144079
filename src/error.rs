//! Error types for the edgequake-landcover library.
//!
//! Every failure of the two user actions (select a file, run an analysis)
//! is an [`AnalysisError`]. Variants are grouped by [`ErrorKind`], which
//! decides what the user is shown:
//!
//! * **Input**: the file was refused before any processing (too large,
//!   wrong type). The specific message is shown.
//! * **Normalization**: the file could not be turned into an image
//!   payload. A generic "failed to process file" message is shown.
//! * **Classification**: the model call failed or returned something
//!   unusable. A generic "analysis failed" message is shown.
//! * **Startup**: missing credentials or a broken configuration. Fatal;
//!   the process must not start.
//!
//! The `Display` text of each variant carries the technical detail and is
//! meant for logs, never for the end user.

use std::path::PathBuf;
use thiserror::Error;

/// All errors returned by the edgequake-landcover library.
#[derive(Debug, Error)]
pub enum AnalysisError {
    // ── Input errors ──────────────────────────────────────────────────────
    /// The file exceeds the upload ceiling.
    #[error("File is {size} bytes; the limit is {limit} bytes")]
    FileTooLarge { size: u64, limit: u64 },

    /// The declared MIME type is neither a PDF nor an image.
    #[error("Unsupported file type '{mime_type}'\nSupported: PDF, JPEG, PNG, WebP.")]
    UnsupportedFileType { mime_type: String },

    // ── Normalization errors ──────────────────────────────────────────────
    /// The file could not be read from disk.
    #[error("Failed to read '{path}': {source}")]
    FileReadFailure {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A URL input could not be downloaded.
    #[error("Failed to download '{url}': {reason}\nCheck your internet connection.")]
    DownloadFailed { url: String, reason: String },

    /// pdfium could not parse the document.
    #[error("PDF is corrupt: {detail}")]
    PdfCorrupt { detail: String },

    /// The document parsed but has no pages.
    #[error("PDF has no pages")]
    PdfEmpty,

    /// pdfium failed while rendering or the raster could not be encoded.
    #[error("Rasterisation of page 1 failed: {detail}")]
    RasterisationFailed { detail: String },

    /// Could not bind to a pdfium library.
    #[error(
        "Failed to bind to pdfium library: {0}\n\n\
Install pdfium from https://github.com/bblanchon/pdfium-binaries/releases\n\
and either place it on the system library path or set\n\
PDFIUM_LIB_PATH=/path/to/libpdfium.\n"
    )]
    PdfiumBindingFailed(String),

    // ── Classification errors ─────────────────────────────────────────────
    /// The model reply is not JSON, or not a JSON array.
    #[error("Model response is not a JSON array: {detail}")]
    InvalidResponseFormat { detail: String },

    /// The model reply contained no usable entries.
    #[error("Model response contained no valid classification entries ({rejected} rejected)")]
    EmptyResult { rejected: usize },

    /// Transport or service-level failure of the model call.
    #[error("Classification request failed: {message}")]
    ClassificationFailed { message: String },

    /// The model call did not answer within the configured timeout.
    #[error("Classification timed out after {secs}s")]
    ClassificationTimeout { secs: u64 },

    // ── Startup errors ────────────────────────────────────────────────────
    /// The required credential is absent from the environment.
    #[error("Environment variable {var} is not set.\nExport it before starting: export {var}=...")]
    MissingApiKey { var: String },

    /// An edgequake-llm provider could not be created.
    #[error("LLM provider '{provider}' is not configured.\n{hint}")]
    ProviderNotConfigured { provider: String, hint: String },

    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Coarse grouping of [`AnalysisError`] variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Input,
    Normalization,
    Classification,
    Startup,
}

impl AnalysisError {
    /// The group this error belongs to.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::FileTooLarge { .. } | Self::UnsupportedFileType { .. } => ErrorKind::Input,
            Self::FileReadFailure { .. }
            | Self::DownloadFailed { .. }
            | Self::PdfCorrupt { .. }
            | Self::PdfEmpty
            | Self::RasterisationFailed { .. }
            | Self::PdfiumBindingFailed(_)
            | Self::Internal(_) => ErrorKind::Normalization,
            Self::InvalidResponseFormat { .. }
            | Self::EmptyResult { .. }
            | Self::ClassificationFailed { .. }
            | Self::ClassificationTimeout { .. } => ErrorKind::Classification,
            Self::MissingApiKey { .. } | Self::ProviderNotConfigured { .. } | Self::InvalidConfig(_) => {
                ErrorKind::Startup
            }
        }
    }

    /// Message suitable for showing to the end user.
    ///
    /// Normalization and classification failures collapse to one generic
    /// sentence each; the detail is only available through `Display`.
    pub fn user_message(&self) -> String {
        match self.kind() {
            ErrorKind::Input => match self {
                Self::FileTooLarge { limit, .. } => {
                    format!("File is too large. The maximum size is {} MB.", limit / (1024 * 1024))
                }
                _ => "Unsupported file type. Please upload a PDF, JPEG, PNG or WebP file.".to_string(),
            },
            ErrorKind::Normalization => "Failed to process the file. Please try another file.".to_string(),
            ErrorKind::Classification => "Analysis failed. Please try another file.".to_string(),
            ErrorKind::Startup => self.to_string(),
        }
    }
}
