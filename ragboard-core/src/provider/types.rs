//! Common types for LLM providers.

use async_trait::async_trait;
use futures::stream::BoxStream;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors that can occur when interacting with a provider.
#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("API key is not set ({0})")]
    MissingCredential(String),

    #[error("LLM API error {status}: {body}")]
    Api { status: u16, body: String },

    #[error("Empty choices from LLM")]
    EmptyChoice,

    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("JSON parsing failed: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, ProviderError>;

/// Raw upstream body of a streaming completion, chunked as it arrives.
pub type ByteStream = BoxStream<'static, Result<Vec<u8>>>;

/// Provider trait for chat-completion backends.
#[async_trait]
pub trait Provider: Send + Sync {
    /// One non-streaming, single-turn completion.
    ///
    /// Used for intent classification and SQL synthesis, so it runs with the
    /// low-temperature settings from `LlmConfig` and a bounded wait.
    async fn complete(&self, prompt: &str) -> Result<String>;

    /// Start a streaming completion and hand back the raw event stream.
    async fn stream_chat(&self, messages: Vec<Message>, settings: StreamSettings) -> Result<ByteStream>;
}

/// Model and sampling for one streamed answer.
///
/// `model: None` means the provider's configured model.
#[derive(Debug, Clone, PartialEq)]
pub struct StreamSettings {
    pub model: Option<String>,
    pub temperature: f64,
    pub max_tokens: u32,
}

/// A single message in a chat conversation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub role: String,
    pub content: String,
}

impl Message {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system".to_string(),
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: "assistant".to_string(),
            content: content.into(),
        }
    }
}

/// Chat-completion request body.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompletionRequest {
    pub model: String,
    pub messages: Vec<Message>,
    pub stream: bool,
    pub temperature: f64,
    pub max_tokens: u32,
}

impl CompletionRequest {
    pub fn new(model: impl Into<String>, messages: Vec<Message>) -> Self {
        Self {
            model: model.into(),
            messages,
            stream: false,
            temperature: 0.7,
            max_tokens: 2000,
        }
    }

    pub fn with_sampling(mut self, temperature: f64, max_tokens: u32) -> Self {
        self.temperature = temperature;
        self.max_tokens = max_tokens;
        self
    }

    pub fn streaming(mut self) -> Self {
        self.stream = true;
        self
    }
}

/// Response body of a completion, or one streamed event of it.
///
/// Non-streaming bodies populate `message`; streamed events populate `delta`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CompletionResponse {
    #[serde(default)]
    pub model: String,
    #[serde(default)]
    pub choices: Vec<Choice>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Choice {
    #[serde(default)]
    pub message: Option<ChoiceContent>,
    #[serde(default)]
    pub delta: Option<ChoiceContent>,
    #[serde(default)]
    pub finish_reason: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ChoiceContent {
    #[serde(default)]
    pub content: Option<String>,
}

impl Choice {
    pub fn message_text(&self) -> Option<&str> {
        self.message.as_ref()?.content.as_deref()
    }

    pub fn delta_text(&self) -> Option<&str> {
        self.delta.as_ref()?.content.as_deref()
    }

    /// True once the upstream has reported why generation stopped.
    pub fn is_finished(&self) -> bool {
        self.finish_reason
            .as_deref()
            .is_some_and(|reason| !reason.is_empty())
    }
}
