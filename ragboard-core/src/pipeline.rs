//! Turns a user question into an answer prompt grounded in live board data.
//!
//! # Flow
//!
//! ```text
//! question → intent → catalog → SQL (template | model) → validate → execute
//!                                                                     ↓
//!                                          empty? → fallback query → compose prompt
//! ```
//!
//! Any error returned from [`RagPipeline::prepare`] means "answer as plain
//! chat"; callers never surface it to the user.

use crate::catalog::{CatalogDiscoverer, PropertyCatalog};
use crate::config::Config;
use crate::error::{RagError, Result};
use crate::executor::{QueryExecutor, ResultSet};
use crate::intent::{Intent, IntentClassifier};
use crate::prompt;
use crate::provider::Provider;
use crate::sql::{fallback_sql, validate, LlmSynthesizer, SqlSynthesizer, TemplateSynthesizer};
use crate::storage::{Storage, StorageError};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Orchestrates one retrieval run per question.
///
/// # Examples
///
/// ```no_run
/// use ragboard_core::{Config, OpenAiCompatProvider, RagPipeline};
/// use std::sync::Arc;
///
/// # async fn example() -> Result<(), ragboard_core::RagError> {
/// let config = Config::load_or_default();
/// let provider = Arc::new(OpenAiCompatProvider::new(&config.llm));
/// let pipeline = RagPipeline::new(config, provider);
///
/// let prompt = pipeline.prepare("u1", "查询我的任务").await?;
/// println!("{prompt}");
/// # Ok(())
/// # }
/// ```
pub struct RagPipeline {
    config: Config,
    classifier: IntentClassifier,
    discoverer: CatalogDiscoverer,
    executor: QueryExecutor,
    provider: Arc<dyn Provider>,
}

impl RagPipeline {
    pub fn new(config: Config, provider: Arc<dyn Provider>) -> Self {
        let storage = Storage::new(config.storage.clone());

        Self {
            classifier: IntentClassifier::new(Arc::clone(&provider)),
            discoverer: CatalogDiscoverer::new(storage.clone()),
            executor: QueryExecutor::new(storage),
            provider,
            config,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Picks the synthesis strategy for a question.
    ///
    /// Recognised shapes use a fixed template; everything else goes to the model.
    pub fn synthesizer_for(&self, question: &str) -> Box<dyn SqlSynthesizer> {
        match TemplateSynthesizer::for_question(question, self.config.rag.row_limit) {
            Some(template) => {
                debug!(shape = ?template.shape(), "Using template synthesizer");
                Box::new(template)
            }
            None => {
                debug!("Using model synthesizer");
                Box::new(LlmSynthesizer::new(Arc::clone(&self.provider)))
            }
        }
    }

    /// Discovers the property catalog, degrading to an empty one on failure.
    pub async fn catalog(&self) -> PropertyCatalog {
        match self.discoverer.discover().await {
            Ok(catalog) => catalog,
            Err(e) => {
                warn!(error = %e, "Property catalog discovery failed, continuing without filters");
                PropertyCatalog::default()
            }
        }
    }

    /// Runs the full retrieval flow and returns the composed answer prompt.
    ///
    /// # Errors
    ///
    /// - [`RagError::IntentIsChat`] when the question needs no data
    /// - [`RagError::UnknownIntent`] when no intent could be decided
    /// - provider, SQL or storage errors from the individual stages
    pub async fn prepare(&self, user_id: &str, question: &str) -> Result<String> {
        match self.classifier.classify(question).await? {
            Intent::QueryData => {}
            Intent::Chat => return Err(RagError::IntentIsChat),
            Intent::Unknown => return Err(RagError::UnknownIntent),
        }

        let catalog = self.catalog().await;
        let sql = self
            .synthesizer_for(question)
            .synthesize(question, user_id, &catalog)
            .await?;

        let mut rows = self.executor.execute(&sql).await?;
        if rows.is_empty() {
            rows = self.fallback_rows().await.unwrap_or(rows);
        }

        let data = rows.to_json().map_err(StorageError::from)?;
        info!(user_id, row_count = rows.len(), "RAG context prepared");

        Ok(prompt::compose(question, &data))
    }

    /// Runs the relaxed recent-cards query; `None` when it fails.
    async fn fallback_rows(&self) -> Option<ResultSet> {
        debug!("Primary query returned no rows, running fallback");

        let sql = match validate(fallback_sql(self.config.rag.fallback_limit)) {
            Ok(sql) => sql,
            Err(e) => {
                warn!(error = %e, "Fallback SQL failed validation");
                return None;
            }
        };

        match self.executor.execute(&sql).await {
            Ok(rows) => Some(rows),
            Err(e) => {
                warn!(error = %e, "Fallback query failed, keeping empty result");
                None
            }
        }
    }
}
