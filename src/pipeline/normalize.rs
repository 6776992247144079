//! File normalization: [`UploadedFile`] → [`NormalizedImage`].
//!
//! | Declared type     | Result                                                 |
//! |-------------------|--------------------------------------------------------|
//! | `application/pdf` | page 1 rendered at 2× native size, JPEG q95            |
//! | `image/*`         | original bytes and MIME type, untouched                |
//! | anything else     | [`AnalysisError::UnsupportedFileType`]                 |
//!
//! The size ceiling is checked first, before the bytes are looked at.

use crate::error::AnalysisError;
use crate::model::{NormalizedImage, UploadedFile, PDF_MIME};
use crate::pipeline::{encode, input, render};
use tracing::{debug, info};

pub use encode::JPEG_QUALITY;
pub use render::RENDER_SCALE;

/// Turn an uploaded file into the single image payload sent to the model.
///
/// The returned image carries `file.id()` as its `source` so callers can tell
/// whether it still belongs to the current selection.
pub async fn normalize(file: UploadedFile) -> Result<NormalizedImage, AnalysisError> {
    input::check_size(file.size())?;

    let source = file.id();
    let mime_type = file.mime_type().to_string();

    if mime_type == PDF_MIME {
        info!("Normalizing PDF '{}' ({} bytes)", file.name(), file.size());
        let page = render::render_first_page(file.into_bytes()).await?;
        let dimensions = (page.image.width(), page.image.height());

        let bytes = tokio::task::spawn_blocking(move || encode::encode_jpeg(&page.image))
            .await
            .map_err(|e| AnalysisError::Internal(format!("Encode task panicked: {}", e)))?
            .map_err(|e| AnalysisError::RasterisationFailed {
                detail: format!("JPEG encoding failed: {}", e),
            })?;

        return Ok(NormalizedImage {
            source,
            mime_type: encode::JPEG_MIME.to_string(),
            bytes,
            dimensions: Some(dimensions),
        });
    }

    if mime_type.starts_with("image/") {
        debug!("Passing image '{}' through as {}", file.name(), mime_type);
        return Ok(NormalizedImage {
            source,
            mime_type,
            bytes: file.into_bytes(),
            dimensions: None,
        });
    }

    Err(AnalysisError::UnsupportedFileType { mime_type })
}
