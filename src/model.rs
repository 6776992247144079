//! Data model shared by every pipeline stage.
//!
//! ```text
//! UploadedFile ──normalize──▶ NormalizedImage ──classify──▶ ClassificationResult
//!                                                               │
//!                                                  aggregate ───┘──▶ Breakdown
//! ```

use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Upload ceiling: 10 MiB.
pub const MAX_UPLOAD_BYTES: u64 = 10 * 1024 * 1024;

/// MIME types accepted at the input boundary.
pub const ACCEPTED_MIME_TYPES: [&str; 4] = ["application/pdf", "image/jpeg", "image/png", "image/webp"];

pub const PDF_MIME: &str = "application/pdf";

/// Identifies one file selection within a session.
///
/// Ids are issued in increasing order by [`crate::session::Session::select`].
/// A result carrying an id that is no longer current is stale.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
pub struct UploadId(pub u64);

impl fmt::Display for UploadId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// A user-supplied file, as read from disk or downloaded.
#[derive(Debug, Clone)]
pub struct UploadedFile {
    id: UploadId,
    name: String,
    mime_type: String,
    size: u64,
    bytes: Vec<u8>,
}

impl UploadedFile {
    /// Wrap in-memory bytes. `size` is taken from the buffer length.
    pub fn new(name: impl Into<String>, mime_type: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            id: UploadId::default(),
            name: name.into(),
            mime_type: mime_type.into(),
            size: bytes.len() as u64,
            bytes,
        }
    }

    /// Tag the file with the selection id it belongs to.
    pub fn with_id(mut self, id: UploadId) -> Self {
        self.id = id;
        self
    }

    pub fn id(&self) -> UploadId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn mime_type(&self) -> &str {
        &self.mime_type
    }

    pub fn size(&self) -> u64 {
        self.size
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }

    pub fn is_pdf(&self) -> bool {
        self.mime_type == PDF_MIME
    }
}

/// The single canonical image payload derived from an [`UploadedFile`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NormalizedImage {
    /// Selection this image was derived from.
    pub source: UploadId,
    /// Always an `image/*` type.
    pub mime_type: String,
    pub bytes: Vec<u8>,
    /// Raster size in pixels; only known when we rendered it ourselves.
    pub dimensions: Option<(u32, u32)>,
}

impl NormalizedImage {
    pub fn to_base64(&self) -> String {
        STANDARD.encode(&self.bytes)
    }

    /// `data:<mime>;base64,<payload>`
    pub fn to_data_url(&self) -> String {
        format!("data:{};base64,{}", self.mime_type, self.to_base64())
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

/// The five land-cover categories the model is asked to report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Category {
    TreesAndShrubs,
    GreenOpenSpace,
    PermeableSurfaces,
    ImpermeableSurfaces,
    IncidentalPlayArea,
}

impl Category {
    pub const ALL: [Category; 5] = [
        Category::TreesAndShrubs,
        Category::GreenOpenSpace,
        Category::PermeableSurfaces,
        Category::ImpermeableSurfaces,
        Category::IncidentalPlayArea,
    ];

    /// Wire name, e.g. `TREES_AND_SHRUBS`.
    pub fn as_str(self) -> &'static str {
        match self {
            Category::TreesAndShrubs => "TREES_AND_SHRUBS",
            Category::GreenOpenSpace => "GREEN_OPEN_SPACE",
            Category::PermeableSurfaces => "PERMEABLE_SURFACES",
            Category::ImpermeableSurfaces => "IMPERMEABLE_SURFACES",
            Category::IncidentalPlayArea => "INCIDENTAL_PLAY_AREA",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Returned when a string is not one of the five wire names.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown category '{0}'")]
pub struct UnknownCategory(pub String);

impl FromStr for Category {
    type Err = UnknownCategory;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Category::ALL
            .into_iter()
            .find(|c| c.as_str() == s)
            .ok_or_else(|| UnknownCategory(s.to_string()))
    }
}

/// One `(category, description, percentage)` tuple from the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassificationEntry {
    pub category: Category,
    pub description: String,
    /// Share of site area, nominally 0–100. Not clamped.
    pub percentage: f64,
}

/// Why a response element was dropped during validation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RejectedEntry {
    /// Position in the model's array.
    pub index: usize,
    pub reason: String,
}

/// Validated model output for one analysis request.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ClassificationResult {
    /// Accepted entries, in the order the model returned them.
    pub entries: Vec<ClassificationEntry>,
    /// Elements dropped by validation; diagnostics only.
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub rejected: Vec<RejectedEntry>,
}

impl ClassificationResult {
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Display-ready output of [`crate::pipeline::aggregate::aggregate`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Breakdown {
    /// Entries sorted by percentage, largest first.
    pub entries: Vec<ClassificationEntry>,
    /// Plain sum of all percentages; may differ from 100.
    pub total_percentage: f64,
}
