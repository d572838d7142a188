//! Parsing of oracle responses into raw lesion records

use super::types::RawLesion;
use serde_json::Value;
use thiserror::Error;
use tracing::warn;

const PREVIEW_CHARS: usize = 200;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    #[error("Failed to parse JSON: {message}\nResponse: {preview}")]
    InvalidJson { message: String, preview: String },

    #[error("Response is not a JSON array")]
    NotAnArray,
}

fn is_fence_tag_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '_' | '+' | '-')
}

/// Removes a surrounding Markdown code fence, with or without a language tag
pub fn strip_code_fences(response: &str) -> &str {
    let trimmed = response.trim();
    let without_open = match trimmed.strip_prefix("```") {
        Some(rest) => rest.trim_start_matches(is_fence_tag_char),
        None => trimmed,
    };
    let without_close = without_open
        .trim_end()
        .strip_suffix("```")
        .unwrap_or(without_open);
    without_close.trim()
}

/// Parses a response expected to contain exactly one JSON array of objects
///
/// Elements that are not objects are skipped with a warning.
pub fn parse_lesion_array(response: &str) -> Result<Vec<RawLesion>, ParseError> {
    let body = strip_code_fences(response);

    let value: Value = serde_json::from_str(body).map_err(|e| ParseError::InvalidJson {
        message: e.to_string(),
        preview: body.chars().take(PREVIEW_CHARS).collect(),
    })?;

    let Value::Array(items) = value else {
        return Err(ParseError::NotAnArray);
    };

    let total = items.len();
    let lesions: Vec<RawLesion> = items
        .into_iter()
        .filter_map(|item| match item {
            Value::Object(map) => Some(map),
            _ => None,
        })
        .collect();

    if lesions.len() < total {
        warn!(
            "Skipped {} non-object element(s) in oracle response",
            total - lesions.len()
        );
    }

    Ok(lesions)
}
