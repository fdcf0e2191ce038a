//! Runs validated statements and materializes rows as JSON records.

use crate::sql::ValidatedSql;
use crate::storage::{Result, Storage};
use rusqlite::types::ValueRef;
use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Number, Value};
use tracing::{debug, error};

/// One row, keyed by column name.
pub type Record = Map<String, Value>;

/// Ordered rows returned by a query.
///
/// Serializes as a plain JSON array of objects. SQLite scalars keep their
/// native type: NULL, INTEGER, REAL and TEXT map to null, integer, number and
/// string. BLOBs are decoded lossily as UTF-8 text.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ResultSet {
    rows: Vec<Record>,
}

impl ResultSet {
    pub fn new(rows: Vec<Record>) -> Self {
        Self { rows }
    }

    pub fn rows(&self) -> &[Record] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }

    pub fn from_json(text: &str) -> serde_json::Result<Self> {
        serde_json::from_str(text)
    }
}

/// Executes read-only statements against the configured database.
#[derive(Debug, Clone)]
pub struct QueryExecutor {
    storage: Storage,
}

impl QueryExecutor {
    pub fn new(storage: Storage) -> Self {
        Self { storage }
    }

    /// Runs a single statement on a fresh connection and collects every row.
    pub async fn execute(&self, sql: &ValidatedSql) -> Result<ResultSet> {
        let statement = sql.as_str().to_owned();
        debug!(sql = %statement, "Executing query");

        let result = self
            .storage
            .with_connection(move |conn| Ok(materialize(conn, &statement)?))
            .await;

        match &result {
            Ok(rows) => debug!(row_count = rows.len(), "Query succeeded"),
            Err(e) => error!(error = %e, sql = %sql, "Query failed"),
        }
        result
    }
}

fn materialize(conn: &Connection, sql: &str) -> rusqlite::Result<ResultSet> {
    let mut stmt = conn.prepare(sql)?;
    let columns: Vec<String> = stmt.column_names().into_iter().map(String::from).collect();

    let mut rows = stmt.query([])?;
    let mut records = Vec::new();
    while let Some(row) = rows.next()? {
        let mut record = Record::new();
        for (idx, column) in columns.iter().enumerate() {
            record.insert(column.clone(), to_json_value(row.get_ref(idx)?));
        }
        records.push(record);
    }

    Ok(ResultSet::new(records))
}

fn to_json_value(value: ValueRef<'_>) -> Value {
    match value {
        ValueRef::Null => Value::Null,
        ValueRef::Integer(n) => Value::Number(n.into()),
        ValueRef::Real(f) => Number::from_f64(f).map(Value::Number).unwrap_or(Value::Null),
        ValueRef::Text(bytes) | ValueRef::Blob(bytes) => {
            Value::String(String::from_utf8_lossy(bytes).into_owned())
        }
    }
}
