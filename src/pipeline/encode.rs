//! Image encoding: rendered RGB raster → JPEG bytes.
//!
//! JPEG rather than PNG: a 2× render of an A1 masterplan is several thousand
//! pixels on each side and colour-filled regions compress far better as JPEG.
//! At quality 95 the legend swatches and hatch patterns survive intact, which
//! is what the classifier relies on.

use image::codecs::jpeg::JpegEncoder;
use image::RgbImage;
use tracing::debug;

/// JPEG quality on the encoder's 1–100 scale (0.95).
pub const JPEG_QUALITY: u8 = 95;

/// MIME type of every rendered page.
pub const JPEG_MIME: &str = "image/jpeg";

/// Encode a rendered page as JPEG at [`JPEG_QUALITY`].
pub fn encode_jpeg(img: &RgbImage) -> Result<Vec<u8>, image::ImageError> {
    let mut buf = Vec::new();
    let mut encoder = JpegEncoder::new_with_quality(&mut buf, JPEG_QUALITY);
    encoder.encode_image(img)?;

    debug!(
        "Encoded {}x{} raster → {} bytes JPEG",
        img.width(),
        img.height(),
        buf.len()
    );
    Ok(buf)
}
