//! ragboard-core - Retrieval-augmented answers over project-board data
//!
//! Provides the components that turn a chat message into a data-grounded answer:
//! - Intent classification (keyword rules, then the model)
//! - Property catalog discovery from board definitions
//! - SQL synthesis (fixed templates or model-generated) behind a read-only guard
//! - Query execution against the SQLite board database
//! - Prompt composition and streaming answer relay
//!
//! ## Primary API
//!
//! [`ChatService`] answers one chat turn end to end; [`RagPipeline`] exposes
//! the retrieval step on its own.

// Public modules
pub mod catalog;
pub mod chat;
pub mod config;
pub mod error;
pub mod executor;
pub mod intent;
pub mod pipeline;
pub mod prompt;
pub mod provider;
pub mod relay;
pub mod sql;
pub mod storage;

// Public exports
pub use catalog::{CatalogDiscoverer, PropertyCatalog};
pub use chat::{AnswerOverrides, ChatService};
pub use config::{AnswerConfig, Config, ConfigError, LlmConfig, RagConfig, StorageConfig};
pub use error::RagError;
pub use executor::{QueryExecutor, Record, ResultSet};
pub use intent::{Intent, IntentClassifier};
pub use pipeline::RagPipeline;
pub use relay::{relay, write_sse, ChunkReceiver, ChunkSender, RelaySummary, StreamChunk, Termination};
pub use storage::{Storage, StorageError};

// Provider exports
pub use provider::{ByteStream, Message, OpenAiCompatProvider, Provider, ProviderError, StreamSettings};

// SQL exports
pub use sql::{QueryShape, SqlError, SqlSynthesizer, ValidatedSql};
