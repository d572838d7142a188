//! Language model client abstraction layer
//!
//! A trait-based abstraction over chat-style text generation so the
//! extraction oracle can run against GenAI, a scripted mock, or recorded
//! exchanges interchangeably.

mod client;
mod error;
mod genai_client;
mod health;
mod mock;
mod recording;
mod types;

pub use ::genai::adapter::AdapterKind;
pub use client::LLMClient;
pub use error::BackendError;
pub use genai_client::GenAIClient;
pub use health::{check_ollama, OllamaHealth};
pub use mock::{MockLLMClient, MockResponse};
pub use recording::{RecordedExchange, RecordedRequest, RecordingLLMClient, RecordingMode};
pub use types::{ChatMessage, LLMRequest, LLMResponse, MessageRole};
