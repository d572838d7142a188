//! Ollama availability probe

use super::error::BackendError;
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;

#[derive(Debug, Deserialize)]
struct TagsResponse {
    #[serde(default)]
    models: Vec<TagEntry>,
}

#[derive(Debug, Deserialize)]
struct TagEntry {
    name: String,
}

/// Result of probing an Ollama host
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OllamaHealth {
    pub host: String,
    pub models: Vec<String>,
}

impl OllamaHealth {
    /// True when `model` is installed, matching either the exact tag or the
    /// implicit `:latest` tag
    pub fn has_model(&self, model: &str) -> bool {
        self.models
            .iter()
            .any(|m| m == model || m.strip_suffix(":latest") == Some(model))
    }
}

/// Lists the models served by the Ollama instance at `host`
pub async fn check_ollama(host: &str, timeout: Duration) -> Result<OllamaHealth, BackendError> {
    let url = format!("{}/api/tags", host.trim_end_matches('/'));

    let response = reqwest::Client::new()
        .get(&url)
        .timeout(timeout)
        .send()
        .await
        .map_err(|e| {
            if e.is_timeout() {
                BackendError::TimeoutError {
                    seconds: timeout.as_secs(),
                }
            } else {
                BackendError::NetworkError {
                    message: format!("{}: {}", url, e),
                }
            }
        })?;

    let status = response.status();
    if !status.is_success() {
        return Err(BackendError::ApiError {
            message: format!("{} returned {}", url, status),
            status_code: Some(status.as_u16()),
        });
    }

    let tags: TagsResponse = response
        .json()
        .await
        .map_err(|e| BackendError::InvalidResponse {
            message: format!("unexpected /api/tags payload: {}", e),
            raw_response: None,
        })?;

    let models: Vec<String> = tags.models.into_iter().map(|m| m.name).collect();
    debug!("Ollama at {} serves {} model(s)", host, models.len());

    Ok(OllamaHealth {
        host: host.to_string(),
        models,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_has_model_matches_latest_tag() {
        let health = OllamaHealth {
            host: "http://localhost:11434".to_string(),
            models: vec!["llama3.1:8b".to_string(), "mistral:latest".to_string()],
        };

        assert!(health.has_model("llama3.1:8b"));
        assert!(health.has_model("mistral"));
        assert!(health.has_model("mistral:latest"));
        assert!(!health.has_model("qwen2.5:7b"));
    }

    #[test]
    fn test_tags_payload_parses() {
        let payload = r#"{"models":[{"name":"llama3.1:8b","size":1}]}"#;
        let tags: TagsResponse = serde_json::from_str(payload).unwrap();
        assert_eq!(tags.models.len(), 1);
        assert_eq!(tags.models[0].name, "llama3.1:8b");

        let empty: TagsResponse = serde_json::from_str("{}").unwrap();
        assert!(empty.models.is_empty());
    }

    #[tokio::test]
    async fn test_unreachable_host_is_error() {
        let result = check_ollama("http://127.0.0.1:1", Duration::from_secs(2)).await;
        assert!(result.is_err());
    }
}
