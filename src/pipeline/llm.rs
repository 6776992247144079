//! VLM interaction: send the normalized plan to a model and validate the reply.
//!
//! The [`VisionModel`] trait is the seam between the pipeline and the remote
//! service. It takes one prompt plus one inline image and returns the raw
//! reply text; everything after that (fence stripping, JSON parsing,
//! per-entry validation) happens in [`crate::pipeline::validate`] so every
//! backend is held to the same contract.
//!
//! Two backends ship with the crate:
//!
//! * [`crate::pipeline::gemini::GeminiClient`]: native REST client that also
//!   sends the response schema, so the service itself constrains the output.
//! * [`LlmProviderModel`]: any `edgequake-llm` provider. The schema travels
//!   in the prompt and the provider is asked for a JSON object reply.
//!
//! ## No retries
//!
//! A failed call surfaces as [`AnalysisError::ClassificationFailed`] at once.
//! Re-running is the user's decision, not the library's.

use crate::config::{AnalyzerConfig, Backend};
use crate::error::AnalysisError;
use crate::model::{ClassificationResult, NormalizedImage};
use crate::pipeline::gemini::GeminiClient;
use crate::pipeline::validate;
use crate::prompts::{response_schema, CLASSIFICATION_PROMPT};
use edgequake_llm::{ChatMessage, CompletionOptions, ImageData, LLMProvider, ProviderFactory};
use futures::future::{BoxFuture, FutureExt};
use serde_json::Value;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info};

/// Everything a backend needs for one classification call.
#[derive(Debug, Clone)]
pub struct VisionRequest<'a> {
    pub prompt: &'a str,
    pub image: &'a NormalizedImage,
    pub temperature: f32,
    pub max_tokens: usize,
    /// Output schema for backends that can enforce one.
    pub response_schema: Option<Value>,
}

/// A multimodal model that answers one prompt about one image.
pub trait VisionModel: Send + Sync {
    /// Short identifier for logs, e.g. `gemini/gemini-2.5-flash`.
    fn name(&self) -> &str;

    /// Send the request and return the reply text.
    ///
    /// Transport and service failures should be reported as
    /// [`AnalysisError::ClassificationFailed`].
    fn generate<'a>(&'a self, request: VisionRequest<'a>) -> BoxFuture<'a, Result<String, AnalysisError>>;
}

/// Classify a normalized plan image.
///
/// Builds the fixed two-part request (instruction + image), waits at most
/// `config.api_timeout_secs`, then validates the reply. Each call is
/// independent: nothing is cached.
pub async fn classify(
    model: &dyn VisionModel,
    image: &NormalizedImage,
    config: &AnalyzerConfig,
) -> Result<ClassificationResult, AnalysisError> {
    let start = Instant::now();
    let request = VisionRequest {
        prompt: CLASSIFICATION_PROMPT,
        image,
        temperature: config.temperature,
        max_tokens: config.max_tokens,
        response_schema: Some(response_schema()),
    };

    info!(
        "Classifying {} ({} bytes) with {}",
        image.mime_type,
        image.len(),
        model.name()
    );

    let secs = config.api_timeout_secs;
    let text = tokio::time::timeout(Duration::from_secs(secs), model.generate(request))
        .await
        .map_err(|_| AnalysisError::ClassificationTimeout { secs })?
        .map_err(|e| match e {
            AnalysisError::ClassificationFailed { .. } => e,
            other => AnalysisError::ClassificationFailed {
                message: other.to_string(),
            },
        })?;

    debug!("{}: {} chars in {:?}", model.name(), text.len(), start.elapsed());

    validate::parse_response(&text)
}

/// Resolve the model to use, from most-specific to least-specific.
///
/// 1. **Pre-built model** (`config.vision_model`): used as-is; tests and
///    embedders inject their own here.
/// 2. **Gemini**: the native client, requires `api_key`.
/// 3. **Named provider**: created through [`ProviderFactory`], which reads
///    the provider's own API key variable.
pub fn create_vision_model(config: &AnalyzerConfig) -> Result<Arc<dyn VisionModel>, AnalysisError> {
    if let Some(ref model) = config.vision_model {
        return Ok(Arc::clone(model));
    }

    config.require_credentials()?;

    match &config.backend {
        Backend::Gemini => {
            let api_key = config.api_key.clone().unwrap_or_default();
            let client = GeminiClient::new(&config.gemini_base_url, config.model_id(), api_key)?;
            Ok(Arc::new(client))
        }
        Backend::Provider(name) => {
            let provider = ProviderFactory::create_llm_provider(name, config.model_id()).map_err(|e| {
                AnalysisError::ProviderNotConfigured {
                    provider: name.clone(),
                    hint: format!("{e}"),
                }
            })?;
            Ok(Arc::new(LlmProviderModel::new(
                format!("{}/{}", name, config.model_id()),
                provider,
            )))
        }
    }
}

/// [`VisionModel`] over an `edgequake-llm` provider.
pub struct LlmProviderModel {
    name: String,
    provider: Arc<dyn LLMProvider>,
}

impl LlmProviderModel {
    pub fn new(name: impl Into<String>, provider: Arc<dyn LLMProvider>) -> Self {
        Self {
            name: name.into(),
            provider,
        }
    }
}

impl VisionModel for LlmProviderModel {
    fn name(&self) -> &str {
        &self.name
    }

    fn generate<'a>(&'a self, request: VisionRequest<'a>) -> BoxFuture<'a, Result<String, AnalysisError>> {
        async move {
            let messages = vec![ChatMessage::user_with_images(
                request.prompt,
                vec![image_part(request.image)],
            )];
            let options = build_options(&request);

            let response = self
                .provider
                .chat(&messages, Some(&options))
                .await
                .map_err(|e| AnalysisError::ClassificationFailed {
                    message: format!("{}", e),
                })?;

            debug!(
                "{}: {} input tokens, {} output tokens",
                self.name, response.prompt_tokens, response.completion_tokens
            );
            Ok(response.content)
        }
        .boxed()
    }
}

/// Inline image part. Hatching and legend swatches need the high-detail tier.
fn image_part(image: &NormalizedImage) -> ImageData {
    ImageData::new(image.to_base64(), image.mime_type.as_str()).with_detail("high")
}

/// Build `CompletionOptions` from the request.
///
/// A request that carries a schema asks the provider for JSON output.
fn build_options(request: &VisionRequest<'_>) -> CompletionOptions {
    CompletionOptions {
        temperature: Some(request.temperature),
        max_tokens: Some(request.max_tokens),
        response_format: request
            .response_schema
            .as_ref()
            .map(|_| "json_object".to_string()),
        ..Default::default()
    }
}
