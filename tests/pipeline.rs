//! Integration tests for the analysis pipeline.
//!
//! The model is replaced by a canned [`VisionModel`], so these run offline.
//! Tests that rasterise PDFs need a pdfium library; they print SKIP and pass
//! when none can be bound (set `PDFIUM_LIB_PATH` or put libpdfium in `./`).

use edgequake_landcover::pipeline::{input, render};
use edgequake_landcover::{
    aggregate, classify, normalize, AnalysisError, AnalyzerConfig, Category, ErrorKind, NormalizedImage,
    UploadId, UploadedFile, VisionModel, VisionRequest, Workspace, WorkspaceError, MAX_UPLOAD_BYTES,
};
use futures::future::{BoxFuture, FutureExt};
use std::io::Write;
use std::sync::{Arc, Mutex};
use tokio_test::{assert_err, assert_ok};

// ── Test helpers ─────────────────────────────────────────────────────────────

/// Replies with a fixed string and records the MIME type it was shown.
struct CannedModel {
    reply: String,
    seen: Mutex<Vec<String>>,
}

impl CannedModel {
    fn new(reply: &str) -> Arc<Self> {
        Arc::new(Self {
            reply: reply.to_string(),
            seen: Mutex::new(Vec::new()),
        })
    }
}

impl VisionModel for CannedModel {
    fn name(&self) -> &str {
        "canned"
    }

    fn generate<'a>(&'a self, request: VisionRequest<'a>) -> BoxFuture<'a, Result<String, AnalysisError>> {
        self.seen.lock().unwrap().push(request.image.mime_type.clone());
        let reply = self.reply.clone();
        async move { Ok(reply) }.boxed()
    }
}

const PLAN_REPLY: &str = r#"[
  {"category": "TREES_AND_SHRUBS", "description": "Tree belt along the northern boundary", "percentage": 35},
  {"category": "GREEN_OPEN_SPACE", "description": "Central lawn and meadow", "percentage": 40},
  {"category": "IMPERMEABLE_SURFACES", "description": "Access road and parking", "percentage": 25}
]"#;

fn png_image() -> NormalizedImage {
    NormalizedImage {
        source: UploadId(1),
        mime_type: "image/png".into(),
        bytes: vec![0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A],
        dimensions: None,
    }
}

/// A syntactically valid PDF with `pages` blank pages of `width × height` pt.
fn blank_pdf(pages: usize, width: u32, height: u32) -> Vec<u8> {
    let mut objects = vec![
        "<< /Type /Catalog /Pages 2 0 R >>".to_string(),
        format!(
            "<< /Type /Pages /Kids [{}] /Count {} >>",
            (0..pages).map(|i| format!("{} 0 R", i + 3)).collect::<Vec<_>>().join(" "),
            pages
        ),
    ];
    for _ in 0..pages {
        objects.push(format!(
            "<< /Type /Page /Parent 2 0 R /MediaBox [0 0 {width} {height}] /Resources << >> >>"
        ));
    }

    let mut pdf = b"%PDF-1.4\n".to_vec();
    let mut offsets = Vec::new();
    for (i, obj) in objects.iter().enumerate() {
        offsets.push(pdf.len());
        pdf.extend_from_slice(format!("{} 0 obj\n{}\nendobj\n", i + 1, obj).as_bytes());
    }
    let xref = pdf.len();
    pdf.extend_from_slice(format!("xref\n0 {}\n0000000000 65535 f \n", objects.len() + 1).as_bytes());
    for off in offsets {
        pdf.extend_from_slice(format!("{off:010} 00000 n \n").as_bytes());
    }
    pdf.extend_from_slice(
        format!(
            "trailer\n<< /Size {} /Root 1 0 R >>\nstartxref\n{}\n%%EOF\n",
            objects.len() + 1,
            xref
        )
        .as_bytes(),
    );
    pdf
}

macro_rules! skip_without_pdfium {
    () => {
        if let Err(e) = render::bind_pdfium() {
            println!("SKIP — pdfium not available: {e}");
            return;
        }
    };
}

fn write_temp(suffix: &str, bytes: &[u8]) -> tempfile::NamedTempFile {
    let mut f = tempfile::Builder::new().suffix(suffix).tempfile().unwrap();
    f.write_all(bytes).unwrap();
    f.flush().unwrap();
    f
}

// ── Classification + aggregation ─────────────────────────────────────────────

#[tokio::test]
async fn masterplan_breakdown_is_sorted_and_totalled() {
    let model = CannedModel::new(PLAN_REPLY);
    let result = assert_ok!(classify(model.as_ref(), &png_image(), &AnalyzerConfig::default()).await);
    let breakdown = aggregate(&result);

    let rows: Vec<(Category, f64)> = breakdown.entries.iter().map(|e| (e.category, e.percentage)).collect();
    assert_eq!(
        rows,
        vec![
            (Category::GreenOpenSpace, 40.0),
            (Category::TreesAndShrubs, 35.0),
            (Category::ImpermeableSurfaces, 25.0),
        ]
    );
    assert_eq!(breakdown.total_percentage, 100.0);
    assert_eq!(*model.seen.lock().unwrap(), vec!["image/png".to_string()]);
}

#[tokio::test]
async fn fenced_reply_is_accepted() {
    let fenced = format!("```json\n{PLAN_REPLY}\n```");
    let model = CannedModel::new(&fenced);
    let result = assert_ok!(classify(model.as_ref(), &png_image(), &AnalyzerConfig::default()).await);
    assert_eq!(result.len(), 3);
}

#[tokio::test]
async fn malformed_entries_are_dropped() {
    let reply = r#"[
        {"category": "TREES_AND_SHRUBS", "description": "hedges", "percentage": 20},
        {"category": "GREEN_OPEN_SPACE", "description": "lawn"},
        {"category": "PERMEABLE_SURFACES", "description": "gravel", "percentage": 30},
        {"category": "IMPERMEABLE_SURFACES", "description": "roads"},
        {"category": "INCIDENTAL_PLAY_AREA", "description": "play lawn", "percentage": 10}
    ]"#;
    let model = CannedModel::new(reply);
    let result = assert_ok!(classify(model.as_ref(), &png_image(), &AnalyzerConfig::default()).await);

    assert_eq!(result.len(), 3);
    let rejected: Vec<usize> = result.rejected.iter().map(|r| r.index).collect();
    assert_eq!(rejected, vec![1, 3]);
}

#[tokio::test]
async fn unknown_category_is_rejected_per_entry() {
    let reply = r#"[
        {"category": "WATER_BODIES", "description": "pond", "percentage": 10},
        {"category": "GREEN_OPEN_SPACE", "description": "lawn", "percentage": 90}
    ]"#;
    let model = CannedModel::new(reply);
    let result = assert_ok!(classify(model.as_ref(), &png_image(), &AnalyzerConfig::default()).await);
    assert_eq!(result.entries.len(), 1);
    assert_eq!(result.entries[0].category, Category::GreenOpenSpace);
}

#[tokio::test]
async fn prose_reply_is_invalid_format() {
    let model = CannedModel::new("The plan shows mostly lawns.");
    let err = assert_err!(classify(model.as_ref(), &png_image(), &AnalyzerConfig::default()).await);
    assert!(matches!(err, AnalysisError::InvalidResponseFormat { .. }));
    assert_eq!(err.kind(), ErrorKind::Classification);
}

#[tokio::test]
async fn empty_array_is_empty_result() {
    let model = CannedModel::new("[]");
    let err = assert_err!(classify(model.as_ref(), &png_image(), &AnalyzerConfig::default()).await);
    assert!(matches!(err, AnalysisError::EmptyResult { .. }));
}

// ── Input limits ─────────────────────────────────────────────────────────────

#[tokio::test]
async fn oversized_file_is_refused_before_reading() {
    let f = tempfile::Builder::new().suffix(".png").tempfile().unwrap();
    f.as_file().set_len(MAX_UPLOAD_BYTES + 1).unwrap();

    let err = assert_err!(input::read_local(f.path()).await);
    assert!(matches!(err, AnalysisError::FileTooLarge { size, .. } if size == MAX_UPLOAD_BYTES + 1));
    assert_eq!(err.user_message(), "File is too large. The maximum size is 10 MB.");
}

#[tokio::test]
async fn file_at_the_limit_is_accepted() {
    let f = tempfile::Builder::new().suffix(".jpg").tempfile().unwrap();
    f.as_file().set_len(MAX_UPLOAD_BYTES).unwrap();

    let file = assert_ok!(input::read_local(f.path()).await);
    assert_eq!(file.size(), MAX_UPLOAD_BYTES);
    assert_eq!(file.mime_type(), "image/jpeg");
}

#[tokio::test]
async fn unsupported_extension_is_refused() {
    let f = write_temp(".docx", b"PK\x03\x04");
    let err = assert_err!(input::read_local(f.path()).await);
    assert_eq!(err.kind(), ErrorKind::Input);
}

// ── Workspace end-to-end ─────────────────────────────────────────────────────

#[tokio::test]
async fn workspace_analyses_an_image_from_disk() {
    let f = write_temp(".png", &png_image().bytes);
    let model = CannedModel::new(PLAN_REPLY);
    let ws = Workspace::with_model(AnalyzerConfig::default(), model.clone());

    let id = assert_ok!(ws.upload(f.path().to_str().unwrap()).await);
    let image = ws.snapshot().image().cloned().unwrap();
    assert_eq!(image.source, id);
    assert_eq!(image.bytes, png_image().bytes);

    let breakdown = assert_ok!(ws.analyze().await);
    assert_eq!(breakdown.entries[0].category, Category::GreenOpenSpace);
    assert_eq!(ws.snapshot().breakdown(), Some(&breakdown));
}

#[tokio::test]
async fn reselecting_clears_the_previous_breakdown() {
    let model = CannedModel::new(PLAN_REPLY);
    let ws = Workspace::with_model(AnalyzerConfig::default(), model);

    assert_ok!(ws.upload_file(UploadedFile::new("a.png", "image/png", png_image().bytes)).await);
    assert_ok!(ws.analyze().await);
    assert!(ws.snapshot().breakdown().is_some());

    assert_ok!(ws.upload_file(UploadedFile::new("b.webp", "image/webp", vec![1, 2, 3])).await);
    let s = ws.snapshot();
    assert!(s.breakdown().is_none());
    assert_eq!(s.image().unwrap().mime_type, "image/webp");
}

#[tokio::test]
async fn oversized_upload_shows_size_message() {
    let model = CannedModel::new(PLAN_REPLY);
    let ws = Workspace::with_model(AnalyzerConfig::default(), model);
    let big = UploadedFile::new("big.png", "image/png", vec![0; MAX_UPLOAD_BYTES as usize + 1]);

    let err = assert_err!(ws.upload_file(big).await);
    assert!(matches!(err, WorkspaceError::Analysis(AnalysisError::FileTooLarge { .. })));
    assert_eq!(
        ws.snapshot().error(),
        Some("File is too large. The maximum size is 10 MB.")
    );
}

// ── PDF normalization (needs pdfium) ─────────────────────────────────────────

#[tokio::test]
async fn pdf_page_is_rendered_at_twice_native_size() {
    skip_without_pdfium!();

    let file = UploadedFile::new("plan.pdf", "application/pdf", blank_pdf(1, 1000, 700)).with_id(UploadId(9));
    let image = assert_ok!(normalize(file).await);

    assert_eq!(image.mime_type, "image/jpeg");
    assert_eq!(image.source, UploadId(9));
    assert_eq!(image.dimensions, Some((2000, 1400)));
    assert_eq!(&image.bytes[..2], &[0xFF, 0xD8]);

    let decoded = image::load_from_memory(&image.bytes).unwrap();
    assert_eq!((decoded.width(), decoded.height()), (2000, 1400));
}

#[tokio::test]
async fn only_the_first_page_is_rendered() {
    skip_without_pdfium!();

    let bytes = blank_pdf(3, 600, 400);
    let info = assert_ok!(render::inspect_pdf(bytes.clone()).await);
    assert_eq!(info.page_count, 3);

    let image = assert_ok!(normalize(UploadedFile::new("multi.pdf", "application/pdf", bytes)).await);
    assert_eq!(image.dimensions, Some((1200, 800)));
}

#[tokio::test]
async fn garbage_pdf_is_a_normalization_error() {
    skip_without_pdfium!();

    let file = UploadedFile::new("broken.pdf", "application/pdf", b"this is not a pdf".to_vec());
    let err = assert_err!(normalize(file).await);
    assert!(matches!(err, AnalysisError::PdfCorrupt { .. }));
    assert_eq!(err.user_message(), "Failed to process the file. Please try another file.");
}

#[tokio::test]
async fn pdf_without_pages_is_a_normalization_error() {
    skip_without_pdfium!();

    let file = UploadedFile::new("empty.pdf", "application/pdf", blank_pdf(0, 100, 100));
    let err = assert_err!(normalize(file).await);
    assert!(matches!(err, AnalysisError::PdfEmpty), "got: {err:?}");
    assert_eq!(err.kind(), ErrorKind::Normalization);
}
