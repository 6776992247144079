//! Per-user session state with a stale-response guard.
//!
//! A [`Session`] owns everything the user currently sees: the selected file,
//! its normalized image, the last breakdown and the last error. Every
//! selection gets a fresh [`UploadId`]. Normalization and analysis results are
//! tagged with the id they were started for, and are discarded when that id
//! is no longer current.
//!
//! ```text
//! select ──▶ finish_normalization ──▶ begin_analysis ──▶ finish_analysis
//!   │              (id current?)                          (image current?)
//!   └── clears image, breakdown, error
//! ```
//!
//! The record is plain data: all mutation goes through `&mut self`, so each
//! state replacement is a single assignment. Share it behind a mutex (see
//! [`crate::workspace::Workspace`]) and never hold that lock across an await.

use crate::error::AnalysisError;
use crate::model::{Breakdown, NormalizedImage, UploadId};
use thiserror::Error;
use tracing::{debug, warn};

/// Whether a finished step was applied to the session or thrown away.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Applied,
    /// The step belonged to a selection that has since been replaced.
    Stale,
}

/// Rejections from [`Session::begin_analysis`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SessionError {
    #[error("No image is ready to analyse; select a file first")]
    NoImage,

    #[error("An analysis is already running")]
    AnalysisInProgress,
}

#[derive(Debug, Clone, Default)]
pub struct Session {
    next_id: u64,
    current: Option<UploadId>,
    file_name: Option<String>,
    image: Option<NormalizedImage>,
    breakdown: Option<Breakdown>,
    normalizing: bool,
    /// Source of the image being analysed, while a request is in flight.
    analyzing: Option<UploadId>,
    error: Option<String>,
}

impl Session {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start a new selection. Clears the image, breakdown and error of the
    /// previous one and returns the id later results must carry.
    pub fn select(&mut self, file_name: impl Into<String>) -> UploadId {
        self.next_id += 1;
        let id = UploadId(self.next_id);
        let file_name = file_name.into();
        debug!("Selection {id}: '{file_name}'");

        self.current = Some(id);
        self.file_name = Some(file_name);
        self.image = None;
        self.breakdown = None;
        self.error = None;
        self.normalizing = true;
        id
    }

    /// Record the result of normalizing selection `id`.
    pub fn finish_normalization(
        &mut self,
        id: UploadId,
        result: Result<NormalizedImage, &AnalysisError>,
    ) -> Outcome {
        if self.current != Some(id) {
            warn!("Discarding normalization for {id}; the selection has changed");
            return Outcome::Stale;
        }

        self.normalizing = false;
        match result {
            Ok(image) => self.image = Some(image),
            Err(e) => self.error = Some(e.user_message()),
        }
        Outcome::Applied
    }

    /// Claim the current image for analysis.
    ///
    /// Returns a copy of the image so the caller can release the session
    /// before awaiting the model.
    pub fn begin_analysis(&mut self) -> Result<NormalizedImage, SessionError> {
        if self.analyzing.is_some() {
            return Err(SessionError::AnalysisInProgress);
        }
        let image = match (&self.image, self.normalizing) {
            (Some(image), false) => image.clone(),
            _ => return Err(SessionError::NoImage),
        };

        self.analyzing = Some(image.source);
        self.error = None;
        Ok(image)
    }

    /// Record the result of analysing the image derived from selection `id`.
    ///
    /// The in-flight flag is always cleared; the result itself is applied
    /// only while that image is still the current one.
    pub fn finish_analysis(&mut self, id: UploadId, result: Result<Breakdown, &AnalysisError>) -> Outcome {
        if self.analyzing == Some(id) {
            self.analyzing = None;
        }

        let still_current = self.image.as_ref().map(|img| img.source) == Some(id);
        if !still_current {
            warn!("Discarding analysis for {id}; the image has changed");
            return Outcome::Stale;
        }

        match result {
            Ok(breakdown) => {
                self.breakdown = Some(breakdown);
                self.error = None;
            }
            Err(e) => {
                self.breakdown = None;
                self.error = Some(e.user_message());
            }
        }
        Outcome::Applied
    }

    pub fn current_id(&self) -> Option<UploadId> {
        self.current
    }

    pub fn file_name(&self) -> Option<&str> {
        self.file_name.as_deref()
    }

    pub fn image(&self) -> Option<&NormalizedImage> {
        self.image.as_ref()
    }

    pub fn breakdown(&self) -> Option<&Breakdown> {
        self.breakdown.as_ref()
    }

    /// Last user-facing error message, if any.
    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn is_normalizing(&self) -> bool {
        self.normalizing
    }

    pub fn is_analyzing(&self) -> bool {
        self.analyzing.is_some()
    }
}
