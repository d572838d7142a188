//! GenAI-based model client
//!
//! Talks to Ollama by default, or to any other provider the `genai` crate
//! supports, at the host configured in [`TrackerConfig`].

use super::client::LLMClient;
use super::error::BackendError;
use super::types::{ChatMessage, LLMRequest, LLMResponse, MessageRole};
use crate::config::TrackerConfig;
use async_trait::async_trait;
use genai::adapter::AdapterKind;
use genai::chat::{ChatMessage as GenAIChatMessage, ChatOptions, ChatRequest as GenAIChatRequest};
use genai::resolver::{AuthData, Endpoint, ServiceTargetResolver};
use genai::{Client, ModelIden, ServiceTarget};
use std::time::Duration;
use tracing::{debug, error};

/// Model client backed by the `genai` crate
pub struct GenAIClient {
    client: Client,
    model: String,
    provider: AdapterKind,
    host: String,
    timeout: Duration,
}

impl GenAIClient {
    /// Creates a client that sends every request to `host`
    ///
    /// # Arguments
    ///
    /// * `provider` - genai adapter to speak (Ollama for local models)
    /// * `model` - Model name without provider prefix, e.g. `llama3.1:8b`
    /// * `host` - Service base URL, e.g. `http://localhost:11434`
    /// * `timeout` - Per-request timeout
    pub fn new(
        provider: AdapterKind,
        model: String,
        host: String,
        timeout: Duration,
    ) -> Result<Self, BackendError> {
        if !(host.starts_with("http://") || host.starts_with("https://")) {
            return Err(BackendError::ConfigurationError {
                message: format!("host must be an http(s) URL, got '{}'", host),
            });
        }

        let endpoint_url = if host.ends_with('/') {
            host.clone()
        } else {
            format!("{}/", host)
        };

        debug!(
            "Creating GenAI client: provider={}, model={}, endpoint={}",
            provider.as_str(),
            model,
            endpoint_url
        );

        let model_clone = model.clone();
        let resolver = ServiceTargetResolver::from_resolver_fn(
            move |_service_target: ServiceTarget| -> Result<ServiceTarget, genai::resolver::Error> {
                let endpoint = Endpoint::from_owned(endpoint_url.clone());

                let auth = match provider.default_key_env_name() {
                    Some(api_key_var) => AuthData::from_env(api_key_var),
                    None => AuthData::from_single(""),
                };

                Ok(ServiceTarget {
                    endpoint,
                    auth,
                    model: ModelIden::new(provider, &model_clone),
                })
            },
        );

        let client = Client::builder()
            .with_service_target_resolver(resolver)
            .build();

        Ok(Self {
            client,
            model,
            provider,
            host,
            timeout,
        })
    }

    /// Creates a client from the tracker configuration
    pub fn from_config(config: &TrackerConfig) -> Result<Self, BackendError> {
        Self::new(
            config.provider,
            config.model.clone(),
            config.host.clone(),
            Duration::from_secs(config.request_timeout_secs),
        )
    }

    fn convert_message(msg: &ChatMessage) -> GenAIChatMessage {
        match msg.role {
            MessageRole::System => GenAIChatMessage::system(&msg.content),
            MessageRole::User => GenAIChatMessage::user(&msg.content),
            MessageRole::Assistant => GenAIChatMessage::assistant(&msg.content),
        }
    }
}

#[async_trait]
impl LLMClient for GenAIClient {
    async fn chat(&self, request: LLMRequest) -> Result<LLMResponse, BackendError> {
        let start = std::time::Instant::now();

        let messages: Vec<GenAIChatMessage> =
            request.messages.iter().map(Self::convert_message).collect();
        let genai_request = GenAIChatRequest::new(messages);

        let mut options = ChatOptions::default();
        if let Some(temp) = request.temperature {
            options = options.with_temperature(temp as f64);
        }
        if let Some(max_tokens) = request.max_tokens {
            options = options.with_max_tokens(max_tokens);
        }

        let response = match tokio::time::timeout(
            self.timeout,
            self.client
                .exec_chat(&self.model, genai_request, Some(&options)),
        )
        .await
        {
            Ok(Ok(resp)) => resp,
            Ok(Err(e)) => {
                error!("{} API error: {}", self.provider.as_str(), e);
                return Err(BackendError::ApiError {
                    message: format!("{} request failed: {}", self.provider.as_str(), e),
                    status_code: None,
                });
            }
            Err(_) => {
                error!(
                    "{} request timed out after {}s",
                    self.provider.as_str(),
                    self.timeout.as_secs()
                );
                return Err(BackendError::TimeoutError {
                    seconds: self.timeout.as_secs(),
                });
            }
        };

        let content = response.first_text().unwrap_or_default().to_string();

        Ok(LLMResponse::text(content, start.elapsed()))
    }

    fn name(&self) -> &str {
        self.provider.as_str()
    }

    fn model_info(&self) -> Option<String> {
        Some(self.model.clone())
    }
}

impl std::fmt::Debug for GenAIClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GenAIClient")
            .field("provider", &self.provider)
            .field("model", &self.model)
            .field("host", &self.host)
            .field("timeout", &self.timeout)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_genai_client_creation() {
        let client = GenAIClient::new(
            AdapterKind::Ollama,
            "llama3.1:8b".to_string(),
            "http://localhost:11434".to_string(),
            Duration::from_secs(30),
        )
        .unwrap();

        assert_eq!(client.name(), "Ollama");
        assert_eq!(client.model_info(), Some("llama3.1:8b".to_string()));
    }

    #[test]
    fn test_rejects_non_http_host() {
        let result = GenAIClient::new(
            AdapterKind::Ollama,
            "llama3.1:8b".to_string(),
            "localhost:11434".to_string(),
            Duration::from_secs(30),
        );

        assert!(matches!(
            result,
            Err(BackendError::ConfigurationError { .. })
        ));
    }

    #[test]
    fn test_from_config_uses_configured_model() {
        let config = TrackerConfig {
            model: "mistral:7b".to_string(),
            ..TrackerConfig::default()
        };
        let client = GenAIClient::from_config(&config).unwrap();
        assert_eq!(client.model_info(), Some("mistral:7b".to_string()));
    }

    #[test]
    fn test_debug_impl() {
        fn assert_debug<T: std::fmt::Debug>() {}
        assert_debug::<GenAIClient>();
    }
}
