//! Read-only guard for generated SQL.
//!
//! This is a denylist, not a parser. It rejects some legitimate SELECTs whose
//! string literals contain `--` or `;`, and it cannot prove that smuggling
//! techniques outside the list are excluded. Keep the rules exactly as listed
//! here; a stricter guard would parse the statement and allowlist node types.

use regex::Regex;
use std::fmt;
use std::sync::LazyLock;
use thiserror::Error;

/// Keywords rejected when they appear as a whole word, in this order.
pub const FORBIDDEN_KEYWORDS: [&str; 6] = ["DELETE", "UPDATE", "DROP", "INSERT", "TRUNCATE", "ALTER"];

/// Substrings that allow statement chaining or comment smuggling.
pub const FORBIDDEN_SEQUENCES: [&str; 3] = [";", "--", "/*"];

/// Whole-word matchers for [`FORBIDDEN_KEYWORDS`], in list order.
static KEYWORD_PATTERNS: LazyLock<Vec<(&'static str, Regex)>> = LazyLock::new(|| {
    FORBIDDEN_KEYWORDS
        .iter()
        .map(|keyword| {
            let pattern = Regex::new(&format!(r"\b{keyword}\b")).expect("keyword regex should compile");
            (*keyword, pattern)
        })
        .collect()
});

static FENCED_SQL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)```sql\s*(select.*?)```").expect("fence regex should compile"));

#[derive(Debug, Error)]
pub enum SqlError {
    #[error("generated SQL is empty")]
    Empty,

    #[error("only SELECT is allowed: {0}")]
    NotSelect(String),

    #[error("forbidden keyword in SQL: {0}")]
    ForbiddenKeyword(&'static str),

    #[error("forbidden characters in SQL: {0}")]
    ForbiddenCharacter(&'static str),
}

pub type Result<T> = std::result::Result<T, SqlError>;

/// A statement that passed [`validate`].
///
/// The only way to build one is through validation, and the executor only
/// accepts this type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatedSql(String);

impl ValidatedSql {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ValidatedSql {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for ValidatedSql {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Checks that `sql` is a single, side-effect-free SELECT.
///
/// Rules run in order and the first failure wins:
/// 1. empty input
/// 2. must start with `SELECT` (after trimming, case-insensitive)
/// 3. no whole-word `DELETE`, `UPDATE`, `DROP`, `INSERT`, `TRUNCATE`, `ALTER`
/// 4. no `;`, `--` or `/*`
pub fn validate(sql: impl Into<String>) -> Result<ValidatedSql> {
    let sql = sql.into();
    if sql.is_empty() {
        return Err(SqlError::Empty);
    }

    let upper = sql.trim().to_uppercase();
    if !upper.starts_with("SELECT") {
        return Err(SqlError::NotSelect(sql));
    }

    for (keyword, pattern) in KEYWORD_PATTERNS.iter() {
        if pattern.is_match(&upper) {
            return Err(SqlError::ForbiddenKeyword(*keyword));
        }
    }

    for sequence in FORBIDDEN_SEQUENCES {
        if upper.contains(sequence) {
            return Err(SqlError::ForbiddenCharacter(sequence));
        }
    }

    Ok(ValidatedSql(sql))
}

/// Pulls the statement out of a model reply.
///
/// Prefers a fenced ```` ```sql ```` block, then the first line starting with
/// `SELECT`, then the whole trimmed reply. Trailing semicolons are dropped in
/// the last two cases. The result still has to go through [`validate`].
pub fn extract_sql(raw: &str) -> String {
    let text = raw.trim();

    if let Some(body) = FENCED_SQL.captures(text).and_then(|captures| captures.get(1)) {
        return body.as_str().trim().to_string();
    }

    for line in text.lines() {
        let line = line.trim();
        if line.to_uppercase().starts_with("SELECT") {
            return line.trim_end_matches(';').to_string();
        }
    }

    text.trim_end_matches(';').to_string()
}
