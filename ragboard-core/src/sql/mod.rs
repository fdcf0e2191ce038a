//! Text-to-SQL: synthesis strategies and the read-only guard.
//!
//! Two [`SqlSynthesizer`] implementations exist. [`TemplateSynthesizer`]
//! handles the question shapes recognised by [`QueryShape::detect`] without a
//! model call; [`LlmSynthesizer`] handles everything else. Both return a
//! [`ValidatedSql`], so the executor never sees which one ran.

mod llm;
mod template;
mod validate;

pub use llm::{generation_prompt, LlmSynthesizer, SCHEMA_DDL};
pub use template::{
    assignee_clause, fallback_sql, overdue_clause, status_done_clause, status_open_clause,
    status_progress_clause, TemplateSynthesizer, CARD_COLUMNS,
};
pub use validate::{extract_sql, validate, SqlError, ValidatedSql, FORBIDDEN_KEYWORDS, FORBIDDEN_SEQUENCES};

use crate::catalog::PropertyCatalog;
use crate::error::Result;
use crate::intent::{contains_any, mentions_own_tasks, normalize};
use async_trait::async_trait;

const OPEN_TERMS: [&str; 9] = [
    "代办", "未完成", "待办", "todo", "to-do", "to do", "unfinished", "not done", "pending",
];
const DONE_TERMS: [&str; 4] = ["已完成", "done", "completed", "finished"];
const PROGRESS_TERMS: [&str; 4] = ["进行中", "in progress", "in-progress", "ongoing"];
const OVERDUE_TERMS: [&str; 8] = [
    "逾期", "过期", "过了截止日期", "截止日期已过", "已过期", "overdue", "past due", "expired",
];

/// Produces one read-only statement for a question.
#[async_trait]
pub trait SqlSynthesizer: Send + Sync {
    async fn synthesize(
        &self,
        question: &str,
        user_id: &str,
        catalog: &PropertyCatalog,
    ) -> Result<ValidatedSql>;
}

/// Question shapes answered by a fixed query template.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryShape {
    MyTasks,
    Open,
    Done,
    InProgress,
    Overdue,
}

impl QueryShape {
    /// Matches shapes in precedence order: my-tasks, open, done, in-progress, overdue.
    pub fn detect(question: &str) -> Option<Self> {
        let q = normalize(question);

        if mentions_own_tasks(&q) {
            Some(QueryShape::MyTasks)
        } else if contains_any(&q, &OPEN_TERMS) {
            Some(QueryShape::Open)
        } else if contains_any(&q, &DONE_TERMS) || (q.contains("完成") && !q.contains("未完成")) {
            Some(QueryShape::Done)
        } else if contains_any(&q, &PROGRESS_TERMS) {
            Some(QueryShape::InProgress)
        } else if contains_any(&q, &OVERDUE_TERMS) {
            Some(QueryShape::Overdue)
        } else {
            None
        }
    }
}
