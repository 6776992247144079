//! Configuration types for masterplan analysis.
//!
//! All analysis behaviour is controlled through [`AnalyzerConfig`], built via
//! its [`AnalyzerConfigBuilder`] or loaded from the process environment with
//! [`AnalyzerConfig::from_env`].
//!
//! The PDF render scale, the JPEG quality and the upload ceiling are not
//! configurable. They are fixed properties of the normalized payload (see
//! [`crate::pipeline::normalize`]): the same file always yields the same
//! pixels.

use crate::error::AnalysisError;
use crate::pipeline::llm::VisionModel;
use crate::progress::ProgressCallback;
use std::fmt;
use std::sync::Arc;

/// Environment variable holding the Gemini API key.
pub const API_KEY_ENV: &str = "GEMINI_API_KEY";

/// Default Gemini model identifier.
pub const DEFAULT_MODEL: &str = "gemini-2.5-flash";

/// Default model for edgequake-llm providers when none is named.
pub const DEFAULT_PROVIDER_MODEL: &str = "gpt-4.1-nano";

/// Default Gemini REST endpoint (v1beta exposes `responseSchema`).
pub const DEFAULT_GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

/// Which model backend serves classification requests.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Backend {
    /// Native Gemini REST client with a server-side response schema. (default)
    #[default]
    Gemini,
    /// Any provider known to `edgequake_llm::ProviderFactory`
    /// (`openai`, `anthropic`, `ollama`, …). The schema is conveyed by the
    /// prompt only.
    Provider(String),
}

impl Backend {
    /// Parse a provider name; `gemini` (any case) selects the native client.
    pub fn from_name(name: &str) -> Self {
        let name = name.trim();
        if name.is_empty() || name.eq_ignore_ascii_case("gemini") {
            Backend::Gemini
        } else {
            Backend::Provider(name.to_lowercase())
        }
    }

    pub fn name(&self) -> &str {
        match self {
            Backend::Gemini => "gemini",
            Backend::Provider(name) => name,
        }
    }
}

/// Configuration for masterplan analysis.
///
/// # Example
/// ```rust
/// use edgequake_landcover::AnalyzerConfig;
///
/// let config = AnalyzerConfig::builder()
///     .api_key("test-key")
///     .api_timeout_secs(30)
///     .build()
///     .unwrap();
/// assert_eq!(config.temperature, 0.1);
/// ```
#[derive(Clone)]
pub struct AnalyzerConfig {
    /// Model backend. Default: [`Backend::Gemini`].
    pub backend: Backend,

    /// Model identifier, e.g. "gemini-2.5-flash", "gpt-4.1".
    /// If None, uses the backend default (see [`AnalyzerConfig::model_id`]).
    pub model: Option<String>,

    /// Credential for the Gemini backend.
    pub api_key: Option<String>,

    /// Pre-constructed model. Takes precedence over `backend`.
    pub vision_model: Option<Arc<dyn VisionModel>>,

    /// Sampling temperature. Default: 0.1.
    ///
    /// Shares must be comparable across repeated runs on the same plan, so
    /// the model is pushed towards its most likely answer.
    pub temperature: f32,

    /// Maximum tokens the model may generate. Default: 2048.
    pub max_tokens: usize,

    /// Upper bound on one classification call, in seconds. Default: 60.
    pub api_timeout_secs: u64,

    /// Download timeout for URL inputs in seconds. Default: 120.
    pub download_timeout_secs: u64,

    /// Base URL of the Gemini REST API. Default: [`DEFAULT_GEMINI_BASE_URL`].
    pub gemini_base_url: String,

    /// Optional stage progress events.
    pub progress_callback: Option<ProgressCallback>,
}

impl Default for AnalyzerConfig {
    fn default() -> Self {
        Self {
            backend: Backend::default(),
            model: None,
            api_key: None,
            vision_model: None,
            temperature: 0.1,
            max_tokens: 2048,
            api_timeout_secs: 60,
            download_timeout_secs: 120,
            gemini_base_url: DEFAULT_GEMINI_BASE_URL.to_string(),
            progress_callback: None,
        }
    }
}

impl fmt::Debug for AnalyzerConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AnalyzerConfig")
            .field("backend", &self.backend)
            .field("model", &self.model)
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("vision_model", &self.vision_model.as_ref().map(|_| "<dyn VisionModel>"))
            .field("temperature", &self.temperature)
            .field("max_tokens", &self.max_tokens)
            .field("api_timeout_secs", &self.api_timeout_secs)
            .field("download_timeout_secs", &self.download_timeout_secs)
            .field("gemini_base_url", &self.gemini_base_url)
            .finish()
    }
}

impl AnalyzerConfig {
    /// Create a new builder for `AnalyzerConfig`.
    pub fn builder() -> AnalyzerConfigBuilder {
        AnalyzerConfigBuilder {
            config: Self::default(),
        }
    }

    /// The model identifier actually sent to the backend.
    pub fn model_id(&self) -> &str {
        match (&self.model, &self.backend) {
            (Some(m), _) => m,
            (None, Backend::Gemini) => DEFAULT_MODEL,
            (None, Backend::Provider(_)) => DEFAULT_PROVIDER_MODEL,
        }
    }

    /// Load configuration from the process environment.
    ///
    /// | Variable | Meaning |
    /// |----------|---------|
    /// | `GEMINI_API_KEY` | required for the Gemini backend |
    /// | `LANDCOVER_PROVIDER` | backend name, default `gemini` |
    /// | `LANDCOVER_MODEL` | model id |
    /// | `LANDCOVER_API_TIMEOUT` | seconds |
    ///
    /// A missing key is a startup failure: callers must not continue.
    pub fn from_env() -> Result<Self, AnalysisError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// [`from_env`](Self::from_env) over an arbitrary variable source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, AnalysisError> {
        let get = |var: &str| lookup(var).filter(|v| !v.trim().is_empty());

        let mut builder = Self::builder();
        if let Some(provider) = get("LANDCOVER_PROVIDER") {
            builder = builder.backend(Backend::from_name(&provider));
        }
        if let Some(model) = get("LANDCOVER_MODEL") {
            builder = builder.model(model);
        }
        if let Some(secs) = get("LANDCOVER_API_TIMEOUT") {
            let secs = secs.trim().parse::<u64>().map_err(|_| {
                AnalysisError::InvalidConfig(format!("LANDCOVER_API_TIMEOUT must be a number of seconds, got '{secs}'"))
            })?;
            builder = builder.api_timeout_secs(secs);
        }
        if let Some(key) = get(API_KEY_ENV) {
            builder = builder.api_key(key);
        }

        let config = builder.build()?;
        config.require_credentials()?;
        Ok(config)
    }

    /// Fail with [`AnalysisError::MissingApiKey`] if the selected backend
    /// needs a key that is absent.
    pub fn require_credentials(&self) -> Result<(), AnalysisError> {
        if self.vision_model.is_some() {
            return Ok(());
        }
        match self.backend {
            Backend::Gemini if self.api_key.as_deref().map_or(true, |k| k.trim().is_empty()) => {
                Err(AnalysisError::MissingApiKey {
                    var: API_KEY_ENV.to_string(),
                })
            }
            _ => Ok(()),
        }
    }
}

/// Builder for [`AnalyzerConfig`].
#[derive(Debug)]
pub struct AnalyzerConfigBuilder {
    config: AnalyzerConfig,
}

impl AnalyzerConfigBuilder {
    pub fn backend(mut self, backend: Backend) -> Self {
        self.config.backend = backend;
        self
    }

    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.config.model = Some(model.into());
        self
    }

    pub fn api_key(mut self, key: impl Into<String>) -> Self {
        self.config.api_key = Some(key.into());
        self
    }

    pub fn vision_model(mut self, model: Arc<dyn VisionModel>) -> Self {
        self.config.vision_model = Some(model);
        self
    }

    pub fn temperature(mut self, t: f32) -> Self {
        self.config.temperature = t;
        self
    }

    pub fn max_tokens(mut self, n: usize) -> Self {
        self.config.max_tokens = n;
        self
    }

    pub fn api_timeout_secs(mut self, secs: u64) -> Self {
        self.config.api_timeout_secs = secs;
        self
    }

    pub fn download_timeout_secs(mut self, secs: u64) -> Self {
        self.config.download_timeout_secs = secs;
        self
    }

    pub fn gemini_base_url(mut self, url: impl Into<String>) -> Self {
        self.config.gemini_base_url = url.into();
        self
    }

    pub fn progress_callback(mut self, cb: ProgressCallback) -> Self {
        self.config.progress_callback = Some(cb);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<AnalyzerConfig, AnalysisError> {
        let c = &self.config;
        if !(0.0..=2.0).contains(&c.temperature) {
            return Err(AnalysisError::InvalidConfig(format!(
                "Temperature must be 0.0–2.0, got {}",
                c.temperature
            )));
        }
        if c.api_timeout_secs == 0 {
            return Err(AnalysisError::InvalidConfig("API timeout must be ≥ 1s".into()));
        }
        if c.model.as_deref().is_some_and(|m| m.trim().is_empty()) {
            return Err(AnalysisError::InvalidConfig("Model identifier must not be empty".into()));
        }
        if c.max_tokens == 0 {
            return Err(AnalysisError::InvalidConfig("max_tokens must be ≥ 1".into()));
        }
        Ok(self.config)
    }
}
