//! Native Gemini backend over the `generateContent` REST endpoint.
//!
//! Unlike the generic provider path, Gemini accepts a `responseSchema` in the
//! generation config, so the service itself is asked to emit only the JSON
//! array. The reply is still validated afterwards; the schema narrows what
//! the model produces but is not a guarantee.
//!
//! ```text
//! POST {base}/models/{model}:generateContent
//! x-goog-api-key: …
//! {
//!   "contents": [{ "role": "user", "parts": [ {text}, {inlineData} ] }],
//!   "generationConfig": { temperature, maxOutputTokens,
//!                         responseMimeType: "application/json", responseSchema }
//! }
//! ```

use crate::error::AnalysisError;
use crate::pipeline::llm::{VisionModel, VisionRequest};
use futures::future::{BoxFuture, FutureExt};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, warn};

/// Gemini `generateContent` client.
pub struct GeminiClient {
    http: reqwest::Client,
    endpoint: String,
    api_key: String,
    name: String,
}

impl GeminiClient {
    pub fn new(
        base_url: &str,
        model: &str,
        api_key: impl Into<String>,
    ) -> Result<Self, AnalysisError> {
        let http = reqwest::Client::builder()
            .user_agent(concat!("edgequake-landcover/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| AnalysisError::InvalidConfig(format!("HTTP client: {e}")))?;

        Ok(Self {
            http,
            endpoint: format!("{}/models/{}:generateContent", base_url.trim_end_matches('/'), model),
            api_key: api_key.into(),
            name: format!("gemini/{model}"),
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    async fn send(&self, request: VisionRequest<'_>) -> Result<String, AnalysisError> {
        let body = build_request_body(&request);
        let failed = |message: String| AnalysisError::ClassificationFailed { message };

        let response = self
            .http
            .post(&self.endpoint)
            .header("x-goog-api-key", &self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| failed(format!("request to Gemini failed: {e}")))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| failed(format!("reading Gemini response failed: {e}")))?;

        if !status.is_success() {
            return Err(failed(format!("HTTP {}: {}", status, error_message(&text))));
        }

        let parsed: GenerateContentResponse = serde_json::from_str(&text)
            .map_err(|e| failed(format!("unexpected Gemini response body: {e}")))?;

        if let Some(usage) = &parsed.usage_metadata {
            debug!(
                "{}: {} input tokens, {} output tokens",
                self.name,
                usage.prompt_token_count.unwrap_or(0),
                usage.candidates_token_count.unwrap_or(0)
            );
        }

        extract_text(parsed)
    }
}

impl VisionModel for GeminiClient {
    fn name(&self) -> &str {
        &self.name
    }

    fn generate<'a>(&'a self, request: VisionRequest<'a>) -> BoxFuture<'a, Result<String, AnalysisError>> {
        self.send(request).boxed()
    }
}

/// Build the `generateContent` JSON body: prompt part, image part, config.
pub fn build_request_body(request: &VisionRequest<'_>) -> Value {
    let mut generation_config = json!({
        "temperature": request.temperature,
        "maxOutputTokens": request.max_tokens,
        "responseMimeType": "application/json",
    });
    if let Some(schema) = &request.response_schema {
        generation_config["responseSchema"] = schema.clone();
    }

    json!({
        "contents": [{
            "role": "user",
            "parts": [
                { "text": request.prompt },
                {
                    "inlineData": {
                        "mimeType": request.image.mime_type,
                        "data": request.image.to_base64(),
                    }
                }
            ]
        }],
        "generationConfig": generation_config,
    })
}

/// Concatenate the text parts of the first candidate.
pub fn extract_text(response: GenerateContentResponse) -> Result<String, AnalysisError> {
    if let Some(reason) = response.prompt_feedback.and_then(|f| f.block_reason) {
        return Err(AnalysisError::ClassificationFailed {
            message: format!("prompt blocked by Gemini: {reason}"),
        });
    }

    let candidate = response
        .candidates
        .into_iter()
        .next()
        .ok_or_else(|| AnalysisError::ClassificationFailed {
            message: "Gemini returned no candidates".to_string(),
        })?;

    let text: String = candidate
        .content
        .map(|c| c.parts.into_iter().filter_map(|p| p.text).collect())
        .unwrap_or_default();

    if text.trim().is_empty() {
        return Err(AnalysisError::ClassificationFailed {
            message: format!(
                "Gemini returned no text (finish reason: {})",
                candidate.finish_reason.as_deref().unwrap_or("unknown")
            ),
        });
    }

    if let Some(reason) = candidate.finish_reason.as_deref() {
        if reason != "STOP" {
            warn!("Gemini finished with reason {reason}; output may be truncated");
        }
    }

    Ok(text)
}

/// Best-effort `error.message` from a Gemini error body.
fn error_message(body: &str) -> String {
    serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|v| v["error"]["message"].as_str().map(str::to_string))
        .unwrap_or_else(|| body.chars().take(200).collect())
}

// ── Response types (only the fields we read) ────────────────────────────────

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateContentResponse {
    #[serde(default)]
    pub candidates: Vec<Candidate>,
    pub prompt_feedback: Option<PromptFeedback>,
    pub usage_metadata: Option<UsageMetadata>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Candidate {
    pub content: Option<Content>,
    pub finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct Content {
    #[serde(default)]
    pub parts: Vec<Part>,
}

#[derive(Debug, Deserialize)]
pub struct Part {
    pub text: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PromptFeedback {
    pub block_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UsageMetadata {
    pub prompt_token_count: Option<u64>,
    pub candidates_token_count: Option<u64>,
}
