//! Extraction oracle client
//!
//! Wraps a single model call that turns a report (and, for follow-ups, the
//! previous timepoint's lesions) into raw lesion records. Transport failures
//! and malformed responses are retried up to the configured attempt budget;
//! exhaustion is reported through [`ExtractionOutcome::success`], never as an
//! `Err`.

mod parser;
mod prompt;
mod types;

pub use parser::{parse_lesion_array, strip_code_fences, ParseError};
pub use prompt::{follow_up_request, initial_request};
pub use types::{ExtractionOutcome, PriorLesionSummary, RawLesion};

use crate::config::TrackerConfig;
use crate::llm::{BackendError, LLMClient, LLMRequest};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};

#[derive(Debug, Error)]
enum AttemptError {
    #[error(transparent)]
    Backend(#[from] BackendError),

    #[error(transparent)]
    Parse(#[from] ParseError),
}

/// Calls the oracle with retry and response recovery
pub struct LesionExtractor {
    client: Arc<dyn LLMClient>,
    temperature: f32,
    max_retries: u32,
    retry_delay: Duration,
}

impl LesionExtractor {
    pub fn new(client: Arc<dyn LLMClient>, config: &TrackerConfig) -> Self {
        Self {
            client,
            temperature: config.temperature,
            max_retries: config.max_retries,
            retry_delay: Duration::from_millis(config.retry_delay_ms),
        }
    }

    /// Overrides the pause between attempts
    pub fn with_retry_delay(mut self, retry_delay: Duration) -> Self {
        self.retry_delay = retry_delay;
        self
    }

    pub fn client_name(&self) -> &str {
        self.client.name()
    }

    /// Extracts every lesion from a patient's earliest report
    pub async fn extract_initial(&self, report_text: &str) -> ExtractionOutcome {
        self.extract_with_retry(initial_request(report_text, self.temperature))
            .await
    }

    /// Extracts lesions from a later report, asking the oracle to reuse the
    /// identifiers in `prior` for lesions it judges to be the same
    pub async fn extract_follow_up(
        &self,
        report_text: &str,
        prior: &[PriorLesionSummary],
    ) -> ExtractionOutcome {
        self.extract_with_retry(follow_up_request(report_text, prior, self.temperature))
            .await
    }

    async fn attempt(&self, request: LLMRequest) -> Result<(Vec<RawLesion>, String), AttemptError> {
        let response = self.client.chat(request).await?;
        let raw = response.content.trim().to_string();
        let lesions = parse_lesion_array(&raw)?;
        debug!(
            lesions = lesions.len(),
            elapsed_ms = response.response_time.as_millis() as u64,
            "Oracle response parsed"
        );
        Ok((lesions, raw))
    }

    async fn extract_with_retry(&self, request: LLMRequest) -> ExtractionOutcome {
        let max_attempts = self.max_retries.max(1);
        let mut last_error: Option<AttemptError> = None;

        for attempt in 1..=max_attempts {
            debug!(attempt, max_attempts, client = self.client.name(), "Calling extraction oracle");

            match self.attempt(request.clone()).await {
                Ok((lesions, raw)) => return ExtractionOutcome::succeeded(lesions, raw),
                Err(e) => {
                    warn!(attempt, max_attempts, error = %e, "Extraction attempt failed");
                    if matches!(e, AttemptError::Parse(_)) {
                        self.client.reject_response(&request);
                    }
                    last_error = Some(e);

                    if attempt < max_attempts && !self.retry_delay.is_zero() {
                        tokio::time::sleep(self.retry_delay).await;
                    }
                }
            }
        }

        let reason = last_error.map(|e| e.to_string()).unwrap_or_default();
        ExtractionOutcome::failed(format!(
            "Extraction failed after {} attempts: {}",
            max_attempts, reason
        ))
    }
}

impl std::fmt::Debug for LesionExtractor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LesionExtractor")
            .field("client", &self.client.name())
            .field("temperature", &self.temperature)
            .field("max_retries", &self.max_retries)
            .field("retry_delay", &self.retry_delay)
            .finish()
    }
}
