//! Short-lived read connections to the board database.

use crate::config::StorageConfig;
use rusqlite::{Connection, OpenFlags};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, error};

const SUPPORTED_ENGINE: &str = "sqlite3";
const DEFAULT_DB_PATH: &str = "./focalboard.db";

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("RAG queries support sqlite3 only, configured engine is {0:?}")]
    UnsupportedEngine(String),

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Blocking task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

pub type Result<T> = std::result::Result<T, StorageError>;

/// Opens one connection per operation and closes it when the operation ends.
///
/// No connection outlives a single query, so nothing here holds a lock longer
/// than one statement takes to run.
#[derive(Debug, Clone)]
pub struct Storage {
    config: StorageConfig,
}

impl Storage {
    pub fn new(config: StorageConfig) -> Self {
        Self { config }
    }

    pub fn db_path(&self) -> &str {
        let path = self.config.db_path.trim();
        if path.is_empty() {
            DEFAULT_DB_PATH
        } else {
            path
        }
    }

    /// Opens a connection with busy-timeout and WAL mode applied.
    ///
    /// Fails fast when the configured engine is not `sqlite3`. The database
    /// file is never created.
    pub fn connect(&self) -> Result<Connection> {
        if !self.config.db_type.eq_ignore_ascii_case(SUPPORTED_ENGINE) {
            error!(db_type = %self.config.db_type, "Unsupported storage engine");
            return Err(StorageError::UnsupportedEngine(self.config.db_type.clone()));
        }

        debug!(db_path = %self.db_path(), "Opening read connection");
        let conn = Connection::open_with_flags(
            self.db_path(),
            OpenFlags::SQLITE_OPEN_READ_WRITE
                | OpenFlags::SQLITE_OPEN_URI
                | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )?;
        conn.busy_timeout(Duration::from_millis(self.config.busy_timeout_ms))?;
        conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get::<_, String>(0))?;

        Ok(conn)
    }

    /// Runs `work` against a fresh connection on the blocking thread pool.
    pub async fn with_connection<T, F>(&self, work: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&Connection) -> Result<T> + Send + 'static,
    {
        let storage = self.clone();
        tokio::task::spawn_blocking(move || {
            let conn = storage.connect()?;
            work(&conn)
        })
        .await?
    }
}
