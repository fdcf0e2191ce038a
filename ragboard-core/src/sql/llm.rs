//! Model-generated SQL for questions no template covers.

use super::validate::{extract_sql, validate, ValidatedSql};
use super::SqlSynthesizer;
use crate::catalog::PropertyCatalog;
use crate::error::Result;
use crate::provider::Provider;
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, error};

/// Minimal DDL of the two tables the model may query.
pub const SCHEMA_DDL: &str = "\
CREATE TABLE boards (
  id TEXT PRIMARY KEY,
  team_id TEXT,
  title TEXT,
  description TEXT,
  card_properties TEXT,
  create_at INTEGER,
  update_at INTEGER,
  delete_at INTEGER
);

CREATE TABLE blocks (
  id TEXT PRIMARY KEY,
  board_id TEXT,
  parent_id TEXT,
  root_id TEXT,
  type TEXT,
  title TEXT,
  fields TEXT,
  create_at INTEGER,
  update_at INTEGER,
  delete_at INTEGER
);

Notes:
- blocks.type is 'card' for cards; other values include 'view' and 'property'.
- blocks.fields is JSON; card properties live under $.properties.<property id>.
- Date properties are JSON objects whose 'from' field is epoch milliseconds.
- delete_at is 0 for live rows and a timestamp for soft-deleted rows.
";

fn catalog_hints(catalog: &PropertyCatalog) -> String {
    if catalog.is_empty() {
        return String::new();
    }

    let mut hints = String::from("Known property ids:\n");
    let buckets = [
        ("person", &catalog.person_props),
        ("multi-person (JSON array)", &catalog.multi_person_props),
        ("date", &catalog.date_props),
    ];
    for (label, ids) in buckets {
        if !ids.is_empty() {
            hints.push_str(&format!("- {label}: {}\n", ids.join(", ")));
        }
    }
    for (prop_id, options) in &catalog.status_options {
        let labels = options
            .iter()
            .map(|(label, option_id)| format!("{label}={option_id}"))
            .collect::<Vec<_>>()
            .join(", ");
        hints.push_str(&format!("- status {prop_id}: {labels}\n"));
    }
    hints.push('\n');
    hints
}

/// Instruction asking the model for exactly one read-only SELECT.
pub fn generation_prompt(question: &str, user_id: &str, catalog: &PropertyCatalog) -> String {
    format!(
        "You are a text-to-SQL assistant. Using the database structure (DDL) and the user question, \
         write one read-only, safe SQL query.\n\
         Requirements:\n\
         - Produce a single SELECT statement and nothing else: no comments, no explanation, no semicolon.\n\
         - The database is sqlite. Card properties live in blocks.fields under properties, keyed by dynamic \
         property id; read them with json_extract(fields, '$.properties.<propID>').\n\
         - Constrain results to the user: filter cards assigned to user id '{user_id}' through person or \
         multiPerson properties.\n\
         - Always filter delete_at = 0. Cards are blocks with type = 'card'; join boards when the question \
         is about boards.\n\
         - Return only the needed columns, such as card id, title, board_id, status, due date, update time.\n\n\
         Database structure (DDL):\n{SCHEMA_DDL}\n\
         {hints}\
         User question:\n{question}\n\n\
         Output only the final SQL, a single line starting with SELECT, with no other text.",
        hints = catalog_hints(catalog),
    )
}

/// Delegates synthesis to the model and guards the reply.
pub struct LlmSynthesizer {
    provider: Arc<dyn Provider>,
}

impl LlmSynthesizer {
    pub fn new(provider: Arc<dyn Provider>) -> Self {
        Self { provider }
    }
}

#[async_trait]
impl SqlSynthesizer for LlmSynthesizer {
    async fn synthesize(
        &self,
        question: &str,
        user_id: &str,
        catalog: &PropertyCatalog,
    ) -> Result<ValidatedSql> {
        let prompt = generation_prompt(question, user_id, catalog);
        let raw = self.provider.complete(&prompt).await.map_err(|e| {
            error!(error = %e, "SQL generation call failed");
            e
        })?;

        let sql = extract_sql(&raw);
        debug!(raw_output = %raw, extracted_sql = %sql, "SQL generated by model");

        validate(sql.clone()).map_err(|e| {
            error!(error = %e, sql = %sql, "Generated SQL failed validation");
            e.into()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::RagError;
    use crate::provider::{ByteStream, Message, ProviderError, StreamSettings};
    use crate::sql::SqlError;
    use std::sync::Mutex;

    struct EchoProvider {
        reply: String,
        prompts: Mutex<Vec<String>>,
    }

    impl EchoProvider {
        fn new(reply: &str) -> Arc<Self> {
            Arc::new(Self { reply: reply.to_string(), prompts: Mutex::new(Vec::new()) })
        }
    }

    #[async_trait]
    impl Provider for EchoProvider {
        async fn complete(&self, prompt: &str) -> crate::provider::Result<String> {
            self.prompts.lock().unwrap().push(prompt.to_string());
            Ok(self.reply.clone())
        }

        async fn stream_chat(
            &self,
            _messages: Vec<Message>,
            _settings: StreamSettings,
        ) -> crate::provider::Result<ByteStream> {
            Err(ProviderError::EmptyChoice)
        }
    }

    #[test]
    fn test_prompt_carries_schema_identity_and_question() {
        let catalog = PropertyCatalog {
            person_props: vec!["a1".to_string()],
            ..PropertyCatalog::default()
        };
        let prompt = generation_prompt("how many cards per board?", "u42", &catalog);
        assert!(prompt.contains("CREATE TABLE blocks"));
        assert!(prompt.contains("'u42'"));
        assert!(prompt.contains("how many cards per board?"));
        assert!(prompt.contains("- person: a1"));
    }

    #[tokio::test]
    async fn test_fenced_reply_is_extracted_and_validated() {
        let provider = EchoProvider::new("```sql\nSELECT board_id, COUNT(*) AS n FROM blocks WHERE type='card' AND delete_at=0 GROUP BY board_id\n```");
        let synth = LlmSynthesizer::new(provider.clone());
        let sql = synth
            .synthesize("cards per board", "u1", &PropertyCatalog::default())
            .await
            .unwrap();
        assert!(sql.as_str().starts_with("SELECT board_id"));
        assert_eq!(provider.prompts.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_destructive_reply_is_rejected() {
        let synth = LlmSynthesizer::new(EchoProvider::new("DELETE FROM blocks"));
        let err = synth
            .synthesize("clean up", "u1", &PropertyCatalog::default())
            .await
            .unwrap_err();
        assert!(matches!(err, RagError::Sql(SqlError::NotSelect(_))));

        let synth = LlmSynthesizer::new(EchoProvider::new("SELECT * FROM blocks WHERE id IN (SELECT id FROM blocks) OR 1=1; DROP TABLE boards"));
        let err = synth
            .synthesize("everything", "u1", &PropertyCatalog::default())
            .await
            .unwrap_err();
        assert!(matches!(err, RagError::Sql(SqlError::ForbiddenKeyword("DROP"))));
    }
}
