use crate::provider::ProviderError;
use crate::sql::SqlError;
use crate::storage::StorageError;
use thiserror::Error;

/// Why a pipeline run did not produce a prompt.
///
/// Every variant means the same thing to the caller: answer the user's
/// message as plain chat. None of them should reach the end user.
#[derive(Debug, Error)]
pub enum RagError {
    #[error("intent is chat, RAG not applicable")]
    IntentIsChat,

    #[error("unknown intent, RAG not applicable")]
    UnknownIntent,

    #[error(transparent)]
    Provider(#[from] ProviderError),

    #[error(transparent)]
    Sql(#[from] SqlError),

    #[error(transparent)]
    Storage(#[from] StorageError),
}

impl RagError {
    /// True when the question simply did not need data.
    pub fn is_chat_signal(&self) -> bool {
        matches!(self, RagError::IntentIsChat)
    }
}

pub type Result<T> = std::result::Result<T, RagError>;
