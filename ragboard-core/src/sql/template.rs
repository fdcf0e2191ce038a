//! Fixed query templates over the `blocks` table.
//!
//! Card properties live in `blocks.fields` under `properties.<property id>`,
//! so every predicate is a `json_extract` against an id from the catalog.
//! Empty catalog buckets contribute no predicate at all.

use super::validate::{validate, ValidatedSql};
use super::{QueryShape, SqlSynthesizer};
use crate::catalog::PropertyCatalog;
use crate::error::Result;
use async_trait::async_trait;
use tracing::{debug, error};

/// Columns returned for every card query.
pub const CARD_COLUMNS: &str = "id, title, board_id, fields, update_at";

const DONE_LABELS: [&str; 4] = ["已完成", "完成", "DONE", "COMPLETED"];
const PROGRESS_LABELS: [&str; 4] = ["进行中", "处理中", "IN PROGRESS", "DOING"];

fn quote(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

fn property(prop_id: &str) -> String {
    format!("json_extract(fields, '$.properties.{}')", prop_id.replace('\'', "''"))
}

fn and_any(parts: Vec<String>) -> String {
    if parts.is_empty() {
        String::new()
    } else {
        format!(" AND ({})", parts.join(" OR "))
    }
}

fn in_list(ids: &[&str]) -> String {
    ids.iter().map(|id| quote(id)).collect::<Vec<_>>().join(",")
}

/// Cards assigned to `user_id` through any person or multi-person property.
pub fn assignee_clause(user_id: &str, catalog: &PropertyCatalog) -> String {
    let user = quote(user_id);
    let single = catalog
        .person_props
        .iter()
        .map(|id| format!("{} = {}", property(id), user));
    let multi = catalog.multi_person_props.iter().map(|id| {
        format!(
            "EXISTS (SELECT 1 FROM json_each({}) WHERE value = {})",
            property(id),
            user
        )
    });
    and_any(single.chain(multi).collect())
}

/// Cards whose status is not a done option, or that have no status yet.
///
/// A status property without any done option only admits unset statuses.
pub fn status_open_clause(catalog: &PropertyCatalog) -> String {
    let parts = catalog
        .status_option_ids(&DONE_LABELS)
        .into_iter()
        .map(|(prop_id, done)| {
            let prop = property(prop_id);
            if done.is_empty() {
                format!("({prop} IS NULL)")
            } else {
                format!("({prop} NOT IN ({}) OR {prop} IS NULL)", in_list(&done))
            }
        })
        .collect();
    and_any(parts)
}

fn status_in_clause(catalog: &PropertyCatalog, labels: &[&str]) -> String {
    let parts = catalog
        .status_option_ids(labels)
        .into_iter()
        .filter(|(_, ids)| !ids.is_empty())
        .map(|(prop_id, ids)| format!("{} IN ({})", property(prop_id), in_list(&ids)))
        .collect();
    and_any(parts)
}

pub fn status_done_clause(catalog: &PropertyCatalog) -> String {
    status_in_clause(catalog, &DONE_LABELS)
}

pub fn status_progress_clause(catalog: &PropertyCatalog) -> String {
    status_in_clause(catalog, &PROGRESS_LABELS)
}

/// Cards with a date whose `from` (epoch millis) is in the past and that are not done.
pub fn overdue_clause(catalog: &PropertyCatalog) -> String {
    let dates = catalog
        .date_props
        .iter()
        .map(|id| {
            let from = format!("json_extract({}, '$.from')", property(id));
            format!("({from} IS NOT NULL AND {from} < (strftime('%s','now')*1000))")
        })
        .collect();
    and_any(dates) + &status_open_clause(catalog)
}

/// The relaxed query used when a precise query finds nothing.
pub fn fallback_sql(limit: u32) -> String {
    format!(
        "SELECT {CARD_COLUMNS} FROM blocks WHERE type='card' AND delete_at=0 ORDER BY update_at DESC LIMIT {limit}"
    )
}

/// Builds queries for the shapes in [`QueryShape`].
#[derive(Debug, Clone)]
pub struct TemplateSynthesizer {
    shape: QueryShape,
    row_limit: u32,
}

impl TemplateSynthesizer {
    pub fn new(shape: QueryShape, row_limit: u32) -> Self {
        Self { shape, row_limit }
    }

    /// A template synthesizer when the question has a known shape.
    pub fn for_question(question: &str, row_limit: u32) -> Option<Self> {
        QueryShape::detect(question).map(|shape| Self::new(shape, row_limit))
    }

    pub fn shape(&self) -> QueryShape {
        self.shape
    }

    pub fn build(&self, user_id: &str, catalog: &PropertyCatalog) -> String {
        let filter = match self.shape {
            QueryShape::MyTasks => String::new(),
            QueryShape::Open => status_open_clause(catalog),
            QueryShape::Done => status_done_clause(catalog),
            QueryShape::InProgress => status_progress_clause(catalog),
            QueryShape::Overdue => overdue_clause(catalog),
        };
        format!(
            "SELECT {CARD_COLUMNS} FROM blocks WHERE type='card' AND delete_at=0{}{} ORDER BY update_at DESC LIMIT {}",
            assignee_clause(user_id, catalog),
            filter,
            self.row_limit
        )
    }
}

#[async_trait]
impl SqlSynthesizer for TemplateSynthesizer {
    async fn synthesize(
        &self,
        _question: &str,
        user_id: &str,
        catalog: &PropertyCatalog,
    ) -> Result<ValidatedSql> {
        let sql = self.build(user_id, catalog);
        debug!(shape = ?self.shape, sql = %sql, "Template SQL built");

        validate(sql).map_err(|e| {
            error!(error = %e, "Template SQL failed validation");
            e.into()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::RagError;
    use crate::sql::SqlError;
    use std::collections::BTreeMap;

    fn catalog_with_person(id: &str) -> PropertyCatalog {
        PropertyCatalog {
            person_props: vec![id.to_string()],
            ..PropertyCatalog::default()
        }
    }

    fn full_catalog() -> PropertyCatalog {
        let mut status = BTreeMap::new();
        status.insert("DONE".to_string(), "o-done".to_string());
        status.insert("IN PROGRESS".to_string(), "o-prog".to_string());
        let mut status_options = BTreeMap::new();
        status_options.insert("st".to_string(), status);

        PropertyCatalog {
            person_props: vec!["a1".to_string()],
            multi_person_props: vec!["rv".to_string()],
            status_options,
            date_props: vec!["due".to_string()],
        }
    }

    #[test]
    fn test_assignee_clause_single_person() {
        let clause = assignee_clause("u123", &catalog_with_person("p1"));
        assert_eq!(clause, " AND (json_extract(fields, '$.properties.p1') = 'u123')");
    }

    #[test]
    fn test_assignee_clause_combines_person_kinds() {
        let clause = assignee_clause("u1", &full_catalog());
        assert_eq!(
            clause,
            " AND (json_extract(fields, '$.properties.a1') = 'u1' OR EXISTS (SELECT 1 FROM json_each(json_extract(fields, '$.properties.rv')) WHERE value = 'u1'))"
        );
    }

    #[test]
    fn test_empty_catalog_adds_no_filters() {
        let catalog = PropertyCatalog::default();
        assert_eq!(assignee_clause("u1", &catalog), "");
        assert_eq!(status_open_clause(&catalog), "");
        assert_eq!(status_done_clause(&catalog), "");
        assert_eq!(overdue_clause(&catalog), "");
    }

    #[test]
    fn test_status_clauses() {
        let catalog = full_catalog();
        assert_eq!(
            status_open_clause(&catalog),
            " AND ((json_extract(fields, '$.properties.st') NOT IN ('o-done') OR json_extract(fields, '$.properties.st') IS NULL))"
        );
        assert_eq!(
            status_done_clause(&catalog),
            " AND (json_extract(fields, '$.properties.st') IN ('o-done'))"
        );
        assert_eq!(
            status_progress_clause(&catalog),
            " AND (json_extract(fields, '$.properties.st') IN ('o-prog'))"
        );
    }

    #[test]
    fn test_overdue_requires_past_date_and_open_status() {
        let clause = overdue_clause(&full_catalog());
        assert!(clause.starts_with(" AND ((json_extract(json_extract(fields, '$.properties.due'), '$.from') IS NOT NULL"));
        assert!(clause.contains("< (strftime('%s','now')*1000)"));
        assert!(clause.ends_with("IS NULL))"));
        assert!(clause.contains("NOT IN ('o-done')"));
    }

    #[test]
    fn test_identity_quotes_are_escaped() {
        let clause = assignee_clause("o'brien", &catalog_with_person("p1"));
        assert!(clause.contains("= 'o''brien'"));
    }

    #[tokio::test]
    async fn test_my_tasks_sql() {
        let synth = TemplateSynthesizer::for_question("查询我的任务", 50).unwrap();
        let sql = synth
            .synthesize("查询我的任务", "u1", &catalog_with_person("assignee"))
            .await
            .unwrap();
        assert_eq!(
            sql.as_str(),
            "SELECT id, title, board_id, fields, update_at FROM blocks WHERE type='card' AND delete_at=0 AND (json_extract(fields, '$.properties.assignee') = 'u1') ORDER BY update_at DESC LIMIT 50"
        );
    }

    #[tokio::test]
    async fn test_hostile_property_id_is_rejected_not_repaired() {
        let synth = TemplateSynthesizer::new(QueryShape::MyTasks, 50);
        let err = synth
            .synthesize("my tasks", "u1", &catalog_with_person("x;y"))
            .await
            .unwrap_err();
        assert!(matches!(err, RagError::Sql(SqlError::ForbiddenCharacter(";"))));
    }

    #[test]
    fn test_fallback_sql_is_valid() {
        let sql = validate(fallback_sql(50)).unwrap();
        assert!(sql.as_str().ends_with("ORDER BY update_at DESC LIMIT 50"));
        assert!(sql.as_str().contains("type='card' AND delete_at=0"));
    }
}
