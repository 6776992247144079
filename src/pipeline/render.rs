//! PDF rasterisation: render page 1 of a PDF to an RGB raster via pdfium.
//!
//! ## Why spawn_blocking?
//!
//! The `pdfium-render` crate wraps the pdfium C++ library, which uses
//! thread-local state internally and is not safe to call from async contexts.
//! `tokio::task::spawn_blocking` moves the work onto a dedicated thread pool
//! thread so the Tokio worker threads never stall during rendering.
//!
//! ## Why a fixed scale factor?
//!
//! Masterplans arrive at every paper size. Rendering at exactly 2× the page's
//! native size keeps hatching and legend swatches legible for the model while
//! the JPEG stays small enough to send inline. It is not configurable: the
//! same file must always produce the same pixels.

use crate::error::AnalysisError;
use image::RgbImage;
use pdfium_render::prelude::*;
use serde::Serialize;
use tracing::{debug, info};

/// Linear scale applied to the page's native dimensions.
pub const RENDER_SCALE: f32 = 2.0;

/// Environment variable pointing at an explicit pdfium library.
pub const PDFIUM_LIB_ENV: &str = "PDFIUM_LIB_PATH";

/// The rasterised first page.
#[derive(Debug)]
pub struct RenderedPage {
    pub image: RgbImage,
    /// Native page size in PDF points.
    pub native_size: (f32, f32),
    /// Total pages in the document (only page 1 is rendered).
    pub page_count: usize,
}

/// Page count and first-page size, read without rendering.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PdfInfo {
    pub page_count: usize,
    /// Native size of page 1 in points; `None` for an empty document.
    pub first_page_size: Option<(f32, f32)>,
}

/// Bind to the pdfium library.
///
/// Resolution order: `PDFIUM_LIB_PATH`, a library next to the working
/// directory, then the system library path.
pub fn bind_pdfium() -> Result<Pdfium, AnalysisError> {
    let bindings = match std::env::var(PDFIUM_LIB_ENV) {
        Ok(path) if !path.is_empty() => Pdfium::bind_to_library(&path),
        _ => Pdfium::bind_to_library(Pdfium::pdfium_platform_library_name_at_path("./"))
            .or_else(|_| Pdfium::bind_to_system_library()),
    }
    .map_err(|e| AnalysisError::PdfiumBindingFailed(e.to_string()))?;

    Ok(Pdfium::new(bindings))
}

/// Rasterise page 1 of an in-memory PDF at [`RENDER_SCALE`].
pub async fn render_first_page(bytes: Vec<u8>) -> Result<RenderedPage, AnalysisError> {
    tokio::task::spawn_blocking(move || render_first_page_blocking(&bytes))
        .await
        .map_err(|e| AnalysisError::Internal(format!("Render task panicked: {}", e)))?
}

/// Blocking implementation of [`render_first_page`].
pub fn render_first_page_blocking(bytes: &[u8]) -> Result<RenderedPage, AnalysisError> {
    let pdfium = bind_pdfium()?;
    let document = load(&pdfium, bytes)?;

    let pages = document.pages();
    let page_count = require_pages(pages.len() as usize)?;
    info!("PDF loaded: {} pages, rendering page 1", page_count);

    let page = pages.get(0).map_err(|e| AnalysisError::RasterisationFailed {
        detail: format!("{:?}", e),
    })?;
    let native_size = (page.width().value, page.height().value);

    let render_config = PdfRenderConfig::new().scale_page_by_factor(RENDER_SCALE);
    let bitmap = page
        .render_with_config(&render_config)
        .map_err(|e| AnalysisError::RasterisationFailed {
            detail: format!("{:?}", e),
        })?;

    let image = bitmap.as_image().into_rgb8();
    debug!(
        "Rendered page 1 ({:.0}x{:.0} pt) → {}x{} px",
        native_size.0,
        native_size.1,
        image.width(),
        image.height()
    );

    Ok(RenderedPage {
        image,
        native_size,
        page_count,
    })
}

/// Read page count and first-page size without rendering.
pub async fn inspect_pdf(bytes: Vec<u8>) -> Result<PdfInfo, AnalysisError> {
    tokio::task::spawn_blocking(move || inspect_pdf_blocking(&bytes))
        .await
        .map_err(|e| AnalysisError::Internal(format!("Inspect task panicked: {}", e)))?
}

fn inspect_pdf_blocking(bytes: &[u8]) -> Result<PdfInfo, AnalysisError> {
    let pdfium = bind_pdfium()?;
    let document = load(&pdfium, bytes)?;
    let pages = document.pages();

    let first_page_size = pages
        .get(0)
        .ok()
        .map(|page| (page.width().value, page.height().value));

    Ok(PdfInfo {
        page_count: pages.len() as usize,
        first_page_size,
    })
}

/// A document with no pages has nothing to render.
fn require_pages(page_count: usize) -> Result<usize, AnalysisError> {
    if page_count == 0 {
        return Err(AnalysisError::PdfEmpty);
    }
    Ok(page_count)
}

fn load<'a>(pdfium: &'a Pdfium, bytes: &'a [u8]) -> Result<PdfDocument<'a>, AnalysisError> {
    pdfium
        .load_pdf_from_byte_slice(bytes, None)
        .map_err(|e| AnalysisError::PdfCorrupt {
            detail: format!("{:?}", e),
        })
}
