//! LLM provider abstraction layer.
//!
//! The pipeline talks to the model through the [`Provider`] trait so the
//! classification, synthesis and answer calls can be pointed at any
//! OpenAI-compatible endpoint, or replaced outright in tests.

mod types;
pub mod openai;

// Re-export common types
pub use types::{
    ByteStream,
    Choice,
    ChoiceContent,
    CompletionRequest,
    CompletionResponse,
    Message,
    Provider,
    ProviderError,
    Result,
    StreamSettings,
};

pub use openai::OpenAiCompatProvider;
