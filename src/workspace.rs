//! Async orchestration of the two user actions: select a file, analyse it.
//!
//! [`Workspace::upload`] reads and normalizes a file; [`Workspace::analyze`]
//! classifies the current image and aggregates the reply. Both are error
//! boundaries: whatever fails inside is logged, recorded in the [`Session`]
//! as a user-facing message, and returned to the caller.
//!
//! The session lives behind a `std::sync::Mutex` that is only locked for
//! the synchronous bookkeeping between awaits, so a slow model call never
//! blocks a new selection. Results that arrive for a replaced selection are
//! dropped by the session's stale guard and reported as
//! [`WorkspaceError::Superseded`].

use crate::config::AnalyzerConfig;
use crate::error::AnalysisError;
use crate::model::{Breakdown, NormalizedImage, UploadId, UploadedFile};
use crate::pipeline::{aggregate, input, llm, normalize};
use crate::progress::Stage;
use crate::session::{Outcome, Session, SessionError};
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Instant;
use thiserror::Error;
use tracing::{error, info};

/// Errors returned by [`Workspace`] actions.
#[derive(Debug, Error)]
pub enum WorkspaceError {
    #[error(transparent)]
    Session(#[from] SessionError),

    #[error(transparent)]
    Analysis(#[from] AnalysisError),

    /// The action finished after the user selected another file.
    #[error("Selection {0} was replaced before its result arrived")]
    Superseded(UploadId),
}

impl WorkspaceError {
    /// Message suitable for showing to the end user.
    pub fn user_message(&self) -> String {
        match self {
            WorkspaceError::Session(e) => e.to_string(),
            WorkspaceError::Analysis(e) => e.user_message(),
            WorkspaceError::Superseded(_) => "The file was replaced before the result arrived.".to_string(),
        }
    }
}

/// A session plus the model and configuration used to serve it.
///
/// Cheap to clone; clones share the same session.
#[derive(Clone)]
pub struct Workspace {
    session: Arc<Mutex<Session>>,
    model: Arc<dyn llm::VisionModel>,
    config: AnalyzerConfig,
}

impl Workspace {
    /// Resolve the model from `config`. Fails on missing credentials.
    pub fn new(config: AnalyzerConfig) -> Result<Self, AnalysisError> {
        let model = llm::create_vision_model(&config)?;
        Ok(Self::with_model(config, model))
    }

    pub fn with_model(config: AnalyzerConfig, model: Arc<dyn llm::VisionModel>) -> Self {
        Self {
            session: Arc::new(Mutex::new(Session::new())),
            model,
            config,
        }
    }

    pub fn config(&self) -> &AnalyzerConfig {
        &self.config
    }

    /// A copy of the current session state.
    pub fn snapshot(&self) -> Session {
        self.lock().clone()
    }

    fn lock(&self) -> MutexGuard<'_, Session> {
        // Session updates are single assignments; a poisoned lock is still consistent.
        self.session.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Select a local path or URL, read it and normalize it.
    pub async fn upload(&self, path_or_url: &str) -> Result<UploadId, WorkspaceError> {
        let id = self.lock().select(path_or_url);
        let timeout = self.config.download_timeout_secs;

        let result = async {
            let file = self
                .run_stage(Stage::Read, input::resolve_input(path_or_url, timeout))
                .await?;
            self.run_stage(Stage::Normalize, normalize::normalize(file.with_id(id)))
                .await
        }
        .await;

        self.settle_upload(id, result)
    }

    /// Select an already-loaded file and normalize it.
    pub async fn upload_file(&self, file: UploadedFile) -> Result<UploadId, WorkspaceError> {
        let id = self.lock().select(file.name());
        let result = self
            .run_stage(Stage::Normalize, normalize::normalize(file.with_id(id)))
            .await;
        self.settle_upload(id, result)
    }

    fn settle_upload(
        &self,
        id: UploadId,
        result: Result<NormalizedImage, AnalysisError>,
    ) -> Result<UploadId, WorkspaceError> {
        match result {
            Ok(image) => {
                info!("Selection {id} ready ({} bytes, {})", image.len(), image.mime_type);
                match self.lock().finish_normalization(id, Ok(image)) {
                    Outcome::Applied => Ok(id),
                    Outcome::Stale => Err(WorkspaceError::Superseded(id)),
                }
            }
            Err(e) => {
                error!("Selection {id} failed: {e}");
                match self.lock().finish_normalization(id, Err(&e)) {
                    Outcome::Applied => Err(e.into()),
                    Outcome::Stale => Err(WorkspaceError::Superseded(id)),
                }
            }
        }
    }

    /// Classify the current image and aggregate the reply.
    pub async fn analyze(&self) -> Result<Breakdown, WorkspaceError> {
        let image = self.lock().begin_analysis()?;
        let id = image.source;

        let result = self
            .run_stage(Stage::Classify, llm::classify(self.model.as_ref(), &image, &self.config))
            .await
            .map(|r| aggregate::aggregate(&r));

        match result {
            Ok(breakdown) => {
                info!(
                    "Selection {id}: {} categories, total {:.1}%",
                    breakdown.entries.len(),
                    breakdown.total_percentage
                );
                match self.lock().finish_analysis(id, Ok(breakdown.clone())) {
                    Outcome::Applied => Ok(breakdown),
                    Outcome::Stale => Err(WorkspaceError::Superseded(id)),
                }
            }
            Err(e) => {
                error!("Analysis of selection {id} failed: {e}");
                match self.lock().finish_analysis(id, Err(&e)) {
                    Outcome::Applied => Err(e.into()),
                    Outcome::Stale => Err(WorkspaceError::Superseded(id)),
                }
            }
        }
    }

    /// Await `fut`, reporting start, completion or failure of `stage`.
    async fn run_stage<T>(
        &self,
        stage: Stage,
        fut: impl Future<Output = Result<T, AnalysisError>>,
    ) -> Result<T, AnalysisError> {
        let cb = self.config.progress_callback.as_ref();
        if let Some(cb) = cb {
            cb.on_stage_start(stage);
        }
        let start = Instant::now();
        let result = fut.await;
        if let Some(cb) = cb {
            match &result {
                Ok(_) => cb.on_stage_complete(stage, start.elapsed()),
                Err(e) => cb.on_stage_error(stage, &e.to_string()),
            }
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::llm::{VisionModel, VisionRequest};
    use crate::progress::AnalysisProgressCallback;
    use futures::future::{BoxFuture, FutureExt};
    use std::time::Duration;
    use tokio::sync::Notify;

    const REPLY: &str = r#"[
        {"category":"TREES_AND_SHRUBS","description":"tree belt","percentage":35},
        {"category":"GREEN_OPEN_SPACE","description":"lawns","percentage":40},
        {"category":"IMPERMEABLE_SURFACES","description":"roads","percentage":25}
    ]"#;

    /// Replies with `REPLY` once released.
    #[derive(Default)]
    struct Gated {
        started: Notify,
        release: Notify,
    }

    impl VisionModel for Gated {
        fn name(&self) -> &str {
            "gated"
        }

        fn generate<'a>(&'a self, _request: VisionRequest<'a>) -> BoxFuture<'a, Result<String, AnalysisError>> {
            async move {
                self.started.notify_one();
                self.release.notified().await;
                Ok(REPLY.to_string())
            }
            .boxed()
        }
    }

    struct Immediate(&'static str);

    impl VisionModel for Immediate {
        fn name(&self) -> &str {
            "immediate"
        }

        fn generate<'a>(&'a self, _request: VisionRequest<'a>) -> BoxFuture<'a, Result<String, AnalysisError>> {
            let reply = self.0.to_string();
            async move { Ok(reply) }.boxed()
        }
    }

    #[derive(Default)]
    struct Recorder(std::sync::Mutex<Vec<String>>);

    impl AnalysisProgressCallback for Recorder {
        fn on_stage_start(&self, stage: Stage) {
            self.0.lock().unwrap().push(format!("start {}", stage.label()));
        }
        fn on_stage_complete(&self, stage: Stage, _elapsed: Duration) {
            self.0.lock().unwrap().push(format!("done {}", stage.label()));
        }
        fn on_stage_error(&self, stage: Stage, _error: &str) {
            self.0.lock().unwrap().push(format!("error {}", stage.label()));
        }
    }

    fn png(name: &str) -> UploadedFile {
        UploadedFile::new(name, "image/png", vec![0x89, b'P', b'N', b'G'])
    }

    fn workspace(model: Arc<dyn VisionModel>) -> Workspace {
        Workspace::with_model(AnalyzerConfig::default(), model)
    }

    #[tokio::test]
    async fn upload_then_analyze() {
        let ws = workspace(Arc::new(Immediate(REPLY)));
        let id = ws.upload_file(png("plan.png")).await.unwrap();
        let breakdown = ws.analyze().await.unwrap();

        assert_eq!(breakdown.entries[0].category.as_str(), "GREEN_OPEN_SPACE");
        assert_eq!(breakdown.total_percentage, 100.0);

        let s = ws.snapshot();
        assert_eq!(s.current_id(), Some(id));
        assert_eq!(s.breakdown(), Some(&breakdown));
        assert!(!s.is_analyzing());
    }

    #[tokio::test]
    async fn analyze_without_upload_is_rejected() {
        let ws = workspace(Arc::new(Immediate(REPLY)));
        let err = ws.analyze().await.unwrap_err();
        assert!(matches!(err, WorkspaceError::Session(SessionError::NoImage)));
    }

    #[tokio::test]
    async fn unsupported_upload_records_user_message() {
        let ws = workspace(Arc::new(Immediate(REPLY)));
        let file = UploadedFile::new("notes.txt", "text/plain", b"hello".to_vec());
        let err = ws.upload_file(file).await.unwrap_err();
        assert!(matches!(
            err,
            WorkspaceError::Analysis(AnalysisError::UnsupportedFileType { .. })
        ));
        assert_eq!(ws.snapshot().error(), Some(err.user_message().as_str()));
    }

    #[tokio::test]
    async fn invalid_reply_records_generic_message() {
        let ws = workspace(Arc::new(Immediate("I could not read the plan.")));
        ws.upload_file(png("plan.png")).await.unwrap();
        let err = ws.analyze().await.unwrap_err();
        assert!(matches!(
            err,
            WorkspaceError::Analysis(AnalysisError::InvalidResponseFormat { .. })
        ));
        assert_eq!(
            ws.snapshot().error(),
            Some("Analysis failed. Please try another file.")
        );
    }

    #[tokio::test]
    async fn analysis_finishing_after_new_upload_is_discarded() {
        let model = Arc::new(Gated::default());
        let ws = workspace(Arc::clone(&model) as Arc<dyn VisionModel>);
        ws.upload_file(png("first.png")).await.unwrap();

        let pending = tokio::spawn({
            let ws = ws.clone();
            async move { ws.analyze().await }
        });
        model.started.notified().await;

        // A second request while the first is in flight is refused.
        let busy = ws.analyze().await.unwrap_err();
        assert!(matches!(busy, WorkspaceError::Session(SessionError::AnalysisInProgress)));

        let second = ws.upload_file(png("second.png")).await.unwrap();
        model.release.notify_one();

        let err = pending.await.unwrap().unwrap_err();
        assert!(matches!(err, WorkspaceError::Superseded(_)));

        let s = ws.snapshot();
        assert_eq!(s.current_id(), Some(second));
        assert!(s.breakdown().is_none());
        assert!(s.error().is_none());
        assert!(!s.is_analyzing());
    }

    #[tokio::test]
    async fn progress_callback_sees_each_stage() {
        let recorder = Arc::new(Recorder::default());
        let config = AnalyzerConfig::builder()
            .progress_callback(Arc::clone(&recorder) as Arc<dyn AnalysisProgressCallback>)
            .build()
            .unwrap();
        let ws = Workspace::with_model(config, Arc::new(Immediate(REPLY)));

        ws.upload_file(png("plan.png")).await.unwrap();
        ws.analyze().await.unwrap();

        let events = recorder.0.lock().unwrap().clone();
        assert_eq!(
            events,
            vec![
                "start Preparing image",
                "done Preparing image",
                "start Analysing land cover",
                "done Analysing land cover",
            ]
        );
    }

    #[tokio::test]
    async fn missing_file_fails_at_read_stage() {
        let recorder = Arc::new(Recorder::default());
        let config = AnalyzerConfig::builder()
            .progress_callback(Arc::clone(&recorder) as Arc<dyn AnalysisProgressCallback>)
            .build()
            .unwrap();
        let ws = Workspace::with_model(config, Arc::new(Immediate(REPLY)));

        let err = ws.upload("/definitely/not/here.png").await.unwrap_err();
        assert!(matches!(
            err,
            WorkspaceError::Analysis(AnalysisError::FileReadFailure { .. })
        ));
        assert_eq!(
            *recorder.0.lock().unwrap(),
            vec!["start Reading file", "error Reading file"]
        );
        assert_eq!(
            ws.snapshot().error(),
            Some("Failed to process the file. Please try another file.")
        );
    }
}
