//! Tracker configuration
//!
//! [`TrackerConfig`] is an explicit value handed to every component at
//! construction. `Default` holds the built-in constants, [`TrackerConfig::from_env`]
//! overlays `ONCOTRACK_*` environment variables, and the CLI overlays its flags
//! last before calling [`TrackerConfig::validate`].

use genai::adapter::AdapterKind;
use std::env;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

pub const DEFAULT_MODEL: &str = "llama3.1:8b";
pub const DEFAULT_HOST: &str = "http://localhost:11434";
const DEFAULT_TEMPERATURE: f32 = 0.0;
const DEFAULT_MAX_RETRIES: u32 = 3;
const DEFAULT_RETRY_DELAY_MS: u64 = 1000;
const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 120;
const DEFAULT_CONCURRENCY: usize = 4;
const DEFAULT_LOG_LEVEL: &str = "info";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid provider: {0}. Valid options: ollama, openai, claude, gemini, grok, groq")]
    InvalidProvider(String),

    #[error("Configuration validation failed: {0}")]
    ValidationFailed(String),

    #[error("Failed to parse {field}: {error}")]
    ParseError { field: String, error: String },
}

#[derive(Debug, Clone, PartialEq)]
pub struct TrackerConfig {
    pub provider: AdapterKind,
    pub model: String,
    pub host: String,
    pub temperature: f32,
    pub max_retries: u32,
    pub retry_delay_ms: u64,
    pub request_timeout_secs: u64,
    pub concurrency: usize,
    pub patient_id_column: String,
    pub date_column: String,
    pub report_column: String,
    pub log_level: String,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            provider: AdapterKind::Ollama,
            model: DEFAULT_MODEL.to_string(),
            host: DEFAULT_HOST.to_string(),
            temperature: DEFAULT_TEMPERATURE,
            max_retries: DEFAULT_MAX_RETRIES,
            retry_delay_ms: DEFAULT_RETRY_DELAY_MS,
            request_timeout_secs: DEFAULT_REQUEST_TIMEOUT_SECS,
            concurrency: DEFAULT_CONCURRENCY,
            patient_id_column: "patient_id".to_string(),
            date_column: "date".to_string(),
            report_column: "report".to_string(),
            log_level: DEFAULT_LOG_LEVEL.to_string(),
        }
    }
}

pub fn parse_provider(s: &str) -> Result<AdapterKind, ConfigError> {
    match s.to_lowercase().as_str() {
        "ollama" => Ok(AdapterKind::Ollama),
        "openai" => Ok(AdapterKind::OpenAI),
        "claude" | "anthropic" => Ok(AdapterKind::Anthropic),
        "gemini" => Ok(AdapterKind::Gemini),
        "grok" | "xai" => Ok(AdapterKind::Xai),
        "groq" => Ok(AdapterKind::Groq),
        _ => Err(ConfigError::InvalidProvider(s.to_string())),
    }
}

fn env_parsed<T>(key: &str) -> Result<Option<T>, ConfigError>
where
    T: FromStr,
    T::Err: fmt::Display,
{
    match env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|e| ConfigError::ParseError {
                field: key.to_string(),
                error: e.to_string(),
            }),
        Err(_) => Ok(None),
    }
}

impl TrackerConfig {
    /// Built-in defaults overlaid with `ONCOTRACK_*` environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();

        if let Ok(provider) = env::var("ONCOTRACK_PROVIDER") {
            config.provider = parse_provider(&provider)?;
        }
        if let Ok(model) = env::var("ONCOTRACK_MODEL") {
            config.model = model;
        }
        if let Some(host) = env::var("ONCOTRACK_HOST")
            .ok()
            .or_else(|| env::var("OLLAMA_HOST").ok())
        {
            config.host = host;
        }
        if let Some(temperature) = env_parsed("ONCOTRACK_TEMPERATURE")? {
            config.temperature = temperature;
        }
        if let Some(max_retries) = env_parsed("ONCOTRACK_MAX_RETRIES")? {
            config.max_retries = max_retries;
        }
        if let Some(delay) = env_parsed("ONCOTRACK_RETRY_DELAY_MS")? {
            config.retry_delay_ms = delay;
        }
        if let Some(timeout) = env_parsed("ONCOTRACK_REQUEST_TIMEOUT")? {
            config.request_timeout_secs = timeout;
        }
        if let Some(concurrency) = env_parsed("ONCOTRACK_CONCURRENCY")? {
            config.concurrency = concurrency;
        }
        if let Ok(column) = env::var("ONCOTRACK_PATIENT_ID_COLUMN") {
            config.patient_id_column = column;
        }
        if let Ok(column) = env::var("ONCOTRACK_DATE_COLUMN") {
            config.date_column = column;
        }
        if let Ok(column) = env::var("ONCOTRACK_REPORT_COLUMN") {
            config.report_column = column;
        }
        if let Ok(level) = env::var("ONCOTRACK_LOG_LEVEL") {
            config.log_level = level.to_lowercase();
        }

        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.model.trim().is_empty() {
            return Err(ConfigError::ValidationFailed(
                "Model name cannot be empty".to_string(),
            ));
        }

        if !(self.host.starts_with("http://") || self.host.starts_with("https://")) {
            return Err(ConfigError::ValidationFailed(format!(
                "Host must be an http(s) URL, got '{}'",
                self.host
            )));
        }

        if !(0.0..=2.0).contains(&self.temperature) {
            return Err(ConfigError::ValidationFailed(format!(
                "Temperature must be between 0.0 and 2.0, got {}",
                self.temperature
            )));
        }

        if self.max_retries == 0 {
            return Err(ConfigError::ValidationFailed(
                "Max retries must be at least 1".to_string(),
            ));
        }
        if self.max_retries > 20 {
            return Err(ConfigError::ValidationFailed(
                "Max retries cannot exceed 20".to_string(),
            ));
        }

        if self.retry_delay_ms > 60_000 {
            return Err(ConfigError::ValidationFailed(
                "Retry delay cannot exceed 60 seconds".to_string(),
            ));
        }

        if self.request_timeout_secs == 0 {
            return Err(ConfigError::ValidationFailed(
                "Request timeout must be at least 1 second".to_string(),
            ));
        }
        if self.request_timeout_secs > 3600 {
            return Err(ConfigError::ValidationFailed(
                "Request timeout cannot exceed 1 hour".to_string(),
            ));
        }

        if self.concurrency == 0 || self.concurrency > 64 {
            return Err(ConfigError::ValidationFailed(format!(
                "Concurrency must be between 1 and 64, got {}",
                self.concurrency
            )));
        }

        for (name, value) in [
            ("patient ID column", &self.patient_id_column),
            ("date column", &self.date_column),
            ("report column", &self.report_column),
        ] {
            if value.trim().is_empty() {
                return Err(ConfigError::ValidationFailed(format!(
                    "The {} name cannot be empty",
                    name
                )));
            }
        }

        match self.log_level.as_str() {
            "trace" | "debug" | "info" | "warn" | "error" => {}
            _ => {
                return Err(ConfigError::ValidationFailed(format!(
                    "Invalid log level: {}. Valid options: trace, debug, info, warn, error",
                    self.log_level
                )))
            }
        }

        Ok(())
    }
}

impl fmt::Display for TrackerConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Oncotrack Configuration:")?;
        writeln!(f, "  Provider: {:?}", self.provider)?;
        writeln!(f, "  Model: {}", self.model)?;
        writeln!(f, "  Host: {}", self.host)?;
        writeln!(f, "  Temperature: {}", self.temperature)?;
        writeln!(f, "  Max Retries: {}", self.max_retries)?;
        writeln!(f, "  Retry Delay: {}ms", self.retry_delay_ms)?;
        writeln!(f, "  Request Timeout: {}s", self.request_timeout_secs)?;
        writeln!(f, "  Concurrency: {}", self.concurrency)?;
        writeln!(
            f,
            "  Columns: {} / {} / {}",
            self.patient_id_column, self.date_column, self.report_column
        )?;
        writeln!(f, "  Log Level: {}", self.log_level)?;
        Ok(())
    }
}
