//! # edgequake-landcover
//!
//! Estimate the land-cover make-up of a landscape masterplan with a Vision
//! Language Model (VLM).
//!
//! A masterplan arrives as a PDF or an image. The crate turns it into a
//! single image, asks a VLM to split the site into five fixed categories
//! (trees & shrubs, green open space, permeable surfaces, impermeable
//! surfaces, incidental play area), validates the reply and orders the
//! shares for display.
//!
//! ## Pipeline Overview
//!
//! ```text
//! PDF / image
//!  │
//!  ├─ 1. Input      read a local file or download a URL (≤ 10 MiB)
//!  ├─ 2. Normalize  PDF page 1 → 2× raster → JPEG q95; images pass through
//!  ├─ 3. Classify   one VLM call, temperature 0.1, JSON schema
//!  ├─ 4. Validate   drop malformed entries, reject empty results
//!  └─ 5. Aggregate  sort by share (stable), sum the total
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use edgequake_landcover::{AnalyzerConfig, Workspace};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // Reads GEMINI_API_KEY; fails fast when it is missing.
//!     let config = AnalyzerConfig::from_env()?;
//!     let workspace = Workspace::new(config)?;
//!
//!     workspace.upload("masterplan.pdf").await?;
//!     let breakdown = workspace.analyze().await?;
//!     for entry in &breakdown.entries {
//!         println!("{:<22} {:>5.1}%", entry.category.label(), entry.percentage);
//!     }
//!     Ok(())
//! }
//! ```
//!
//! The stages are also usable on their own: [`normalize`], [`classify`] and
//! [`aggregate`].
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `landcover` binary (clap + anyhow + tracing-subscriber + indicatif) |
//!
//! ```toml
//! edgequake-landcover = { version = "0.1", default-features = false }
//! ```

// ── Modules ──────────────────────────────────────────────────────────────

pub mod config;
pub mod error;
pub mod model;
pub mod pipeline;
pub mod present;
pub mod progress;
pub mod prompts;
pub mod session;
pub mod workspace;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use config::{AnalyzerConfig, AnalyzerConfigBuilder, Backend};
pub use error::{AnalysisError, ErrorKind};
pub use model::{
    Breakdown, Category, ClassificationEntry, ClassificationResult, NormalizedImage, RejectedEntry, UploadId,
    UploadedFile, MAX_UPLOAD_BYTES,
};
pub use pipeline::aggregate::aggregate;
pub use pipeline::llm::{classify, create_vision_model, VisionModel, VisionRequest};
pub use pipeline::normalize::normalize;
pub use progress::{AnalysisProgressCallback, NoopProgressCallback, ProgressCallback, Stage};
pub use session::{Outcome, Session, SessionError};
pub use workspace::{Workspace, WorkspaceError};
