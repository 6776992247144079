//! Response validation: raw model text → [`ClassificationResult`].
//!
//! Asking the model for a schema is a hint, not a guarantee. The reply is
//! checked here element by element, without relying on serde's derive to
//! accept or reject shapes:
//!
//! 1. Trim whitespace and strip one outer ```` ```json ```` fence (some models
//!    add it despite the prompt).
//! 2. Parse as JSON; the top-level value must be an array.
//! 3. Each element must be an object with a string `category` naming one of
//!    the five [`Category`] values, a string `description` and a numeric
//!    `percentage`. Extra fields are ignored.
//! 4. Failing elements are dropped and reported in
//!    [`ClassificationResult::rejected`]; if nothing survives the whole
//!    response is rejected.

use crate::error::AnalysisError;
use crate::model::{Category, ClassificationEntry, ClassificationResult, RejectedEntry};
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;
use tracing::{debug, warn};

static RE_OUTER_FENCES: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)^```[A-Za-z]*[ \t]*\r?\n(.*?)\r?\n?```$").unwrap());

/// Remove a single outer code fence, if present.
pub fn strip_code_fences(input: &str) -> &str {
    let trimmed = input.trim();
    match RE_OUTER_FENCES.captures(trimmed).and_then(|c| c.get(1)) {
        Some(inner) => inner.as_str().trim(),
        None => trimmed,
    }
}

/// Parse and validate the model's reply.
pub fn parse_response(raw: &str) -> Result<ClassificationResult, AnalysisError> {
    let text = strip_code_fences(raw);

    let value: Value = serde_json::from_str(text).map_err(|e| AnalysisError::InvalidResponseFormat {
        detail: e.to_string(),
    })?;

    let elements = match value {
        Value::Array(elements) => elements,
        other => {
            return Err(AnalysisError::InvalidResponseFormat {
                detail: format!("expected a JSON array, got {}", json_type(&other)),
            })
        }
    };

    let mut result = ClassificationResult::default();
    for (index, element) in elements.iter().enumerate() {
        match validate_entry(element) {
            Ok(entry) => result.entries.push(entry),
            Err(reason) => result.rejected.push(RejectedEntry { index, reason }),
        }
    }

    if !result.rejected.is_empty() {
        warn!(
            "Dropped {} of {} malformed classification entries: {}",
            result.rejected.len(),
            elements.len(),
            result
                .rejected
                .iter()
                .map(|r| format!("[{}] {}", r.index, r.reason))
                .collect::<Vec<_>>()
                .join("; ")
        );
    }

    if result.entries.is_empty() {
        return Err(AnalysisError::EmptyResult {
            rejected: result.rejected.len(),
        });
    }

    debug!("Accepted {} classification entries", result.entries.len());
    Ok(result)
}

/// Accept or reject one element of the response array.
pub fn validate_entry(value: &Value) -> Result<ClassificationEntry, String> {
    let Value::Object(obj) = value else {
        return Err(format!("expected an object, got {}", json_type(value)));
    };

    let category = match obj.get("category") {
        Some(Value::String(s)) => s.parse::<Category>().map_err(|e| e.to_string())?,
        Some(other) => return Err(format!("'category' must be a string, got {}", json_type(other))),
        None => return Err("missing 'category'".to_string()),
    };

    let description = match obj.get("description") {
        Some(Value::String(s)) => s.clone(),
        Some(other) => {
            return Err(format!("'description' must be a string, got {}", json_type(other)))
        }
        None => return Err("missing 'description'".to_string()),
    };

    let percentage = match obj.get("percentage") {
        Some(Value::Number(n)) => n
            .as_f64()
            .ok_or_else(|| format!("'percentage' {n} is not representable as f64"))?,
        Some(other) => return Err(format!("'percentage' must be a number, got {}", json_type(other))),
        None => return Err("missing 'percentage'".to_string()),
    };

    Ok(ClassificationEntry {
        category,
        description,
        percentage,
    })
}

fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
