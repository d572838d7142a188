//! Request/response recording for reproducible tracking runs

use super::client::LLMClient;
use super::error::BackendError;
use super::types::{ChatMessage, LLMRequest, LLMResponse};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use tracing::{debug, warn};

/// Recording mode for model interactions
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordingMode {
    /// Record new exchanges and save to disk
    Record,
    /// Replay from recorded exchanges, fail if not found
    Replay,
    /// Replay if recording exists, otherwise record
    Auto,
}

impl RecordingMode {
    /// Parse from string
    pub fn parse(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "record" => Ok(RecordingMode::Record),
            "replay" => Ok(RecordingMode::Replay),
            "auto" => Ok(RecordingMode::Auto),
            _ => anyhow::bail!("Invalid recording mode: {}", s),
        }
    }

    /// Get from environment variable with default
    pub fn from_env(default: RecordingMode) -> RecordingMode {
        std::env::var("ONCOTRACK_RECORDING_MODE")
            .ok()
            .and_then(|s| Self::parse(&s).ok())
            .unwrap_or(default)
    }
}

/// A recorded request-response exchange
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecordedExchange {
    /// Canonical hash of the request (MD5)
    pub request_hash: String,
    /// The original request
    pub request: RecordedRequest,
    /// The recorded response
    pub response: LLMResponse,
    /// Timestamp when recorded (RFC 3339)
    pub recorded_at: String,
}

/// Simplified request for hashing and storage
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RecordedRequest {
    pub messages: Vec<ChatMessage>,
    pub model: Option<String>,
    pub temperature: Option<f32>,
}

impl RecordedRequest {
    pub fn from_llm_request(req: &LLMRequest, model: Option<String>) -> Self {
        Self {
            messages: req.messages.clone(),
            model,
            temperature: req.temperature,
        }
    }

    /// MD5 of the canonical JSON form
    pub fn canonical_hash(&self) -> String {
        let canonical_json = serde_json::to_string(self).unwrap_or_default();
        format!("{:x}", md5::compute(canonical_json.as_bytes()))
    }
}

/// Client wrapper that records or replays interactions
pub struct RecordingLLMClient {
    inner: Arc<dyn LLMClient>,
    mode: RecordingMode,
    recordings_dir: PathBuf,
    cache: Mutex<HashMap<String, LLMResponse>>,
}

impl RecordingLLMClient {
    pub fn new(
        inner: Arc<dyn LLMClient>,
        mode: RecordingMode,
        recordings_dir: PathBuf,
    ) -> Result<Self> {
        std::fs::create_dir_all(&recordings_dir)
            .context("Failed to create recordings directory")?;

        Ok(Self {
            inner,
            mode,
            recordings_dir,
            cache: Mutex::new(HashMap::new()),
        })
    }

    pub fn mode(&self) -> RecordingMode {
        self.mode
    }

    fn recording_path(&self, request_hash: &str) -> PathBuf {
        self.recordings_dir.join(format!("{}.json", request_hash))
    }

    fn load_recording(&self, request_hash: &str) -> Result<Option<LLMResponse>> {
        if let Some(response) = self.cache.lock().unwrap().get(request_hash) {
            return Ok(Some(response.clone()));
        }

        let path = self.recording_path(request_hash);
        if !path.exists() {
            return Ok(None);
        }

        let contents = std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read recording: {}", path.display()))?;

        let exchange: RecordedExchange = serde_json::from_str(&contents)
            .with_context(|| format!("Failed to parse recording: {}", path.display()))?;

        self.cache
            .lock()
            .unwrap()
            .insert(request_hash.to_string(), exchange.response.clone());

        Ok(Some(exchange.response))
    }

    fn save_recording(&self, request: &RecordedRequest, response: &LLMResponse) -> Result<()> {
        let request_hash = request.canonical_hash();

        let exchange = RecordedExchange {
            request_hash: request_hash.clone(),
            request: request.clone(),
            response: response.clone(),
            recorded_at: chrono::Utc::now().to_rfc3339(),
        };

        let path = self.recording_path(&request_hash);
        let contents =
            serde_json::to_string_pretty(&exchange).context("Failed to serialize recording")?;
        std::fs::write(&path, contents)
            .with_context(|| format!("Failed to write recording: {}", path.display()))?;

        self.cache
            .lock()
            .unwrap()
            .insert(request_hash, response.clone());

        Ok(())
    }

    fn discard_recording(&self, request_hash: &str) -> Result<()> {
        self.cache.lock().unwrap().remove(request_hash);

        let path = self.recording_path(request_hash);
        if path.exists() {
            std::fs::remove_file(&path)
                .with_context(|| format!("Failed to remove recording: {}", path.display()))?;
        }
        Ok(())
    }

    async fn record(
        &self,
        recorded_request: &RecordedRequest,
        request: LLMRequest,
    ) -> Result<LLMResponse, BackendError> {
        let response = self.inner.chat(request).await?;
        self.save_recording(recorded_request, &response)
            .map_err(|e| BackendError::Other {
                message: format!("Failed to save recording: {}", e),
            })?;
        Ok(response)
    }
}

#[async_trait::async_trait]
impl LLMClient for RecordingLLMClient {
    async fn chat(&self, request: LLMRequest) -> Result<LLMResponse, BackendError> {
        let recorded_request = RecordedRequest::from_llm_request(&request, self.inner.model_info());
        let request_hash = recorded_request.canonical_hash();

        let load = |hash: &str| {
            self.load_recording(hash).map_err(|e| BackendError::Other {
                message: format!("Failed to load recording: {}", e),
            })
        };

        match self.mode {
            RecordingMode::Replay => load(&request_hash)?.ok_or_else(|| BackendError::Other {
                message: format!(
                    "No recording found for request {} in {}",
                    request_hash,
                    self.recordings_dir.display()
                ),
            }),
            RecordingMode::Record => self.record(&recorded_request, request).await,
            RecordingMode::Auto => {
                if let Some(response) = load(&request_hash)? {
                    debug!("Replaying recorded exchange {}", request_hash);
                    return Ok(response);
                }
                self.record(&recorded_request, request).await
            }
        }
    }

    fn name(&self) -> &str {
        self.inner.name()
    }

    /// Drops a bad exchange from the cache and the recordings directory.
    /// Replay mode leaves recordings untouched.
    fn reject_response(&self, request: &LLMRequest) {
        if self.mode == RecordingMode::Replay {
            return;
        }

        let request_hash =
            RecordedRequest::from_llm_request(request, self.inner.model_info()).canonical_hash();
        debug!("Discarding rejected exchange {}", request_hash);
        if let Err(e) = self.discard_recording(&request_hash) {
            warn!("Failed to discard recording {}: {}", request_hash, e);
        }
        self.inner.reject_response(request);
    }

    fn model_info(&self) -> Option<String> {
        self.inner.model_info()
    }
}
