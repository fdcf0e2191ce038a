//! Discovery of dynamic card properties.
//!
//! Boards declare their card properties as a JSON array in
//! `boards.card_properties`. Property ids are generated per board, so the
//! query synthesizer needs this catalog to know which ids hold assignees,
//! statuses and dates.

use crate::storage::{Result, Storage};
use rusqlite::types::ValueRef;
use rusqlite::Connection;
use serde_json::Value;
use std::collections::BTreeMap;
use tracing::debug;

/// Property names that mark a select property as the card status.
const STATUS_PROPERTY_NAMES: [&str; 2] = ["status", "状态"];

/// Snapshot of property definitions across all live boards.
///
/// Built once per pipeline run and read-only afterwards.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PropertyCatalog {
    pub person_props: Vec<String>,
    pub multi_person_props: Vec<String>,
    /// Status property id -> upper-cased option label -> option id
    pub status_options: BTreeMap<String, BTreeMap<String, String>>,
    pub date_props: Vec<String>,
}

/// String field of a property or option object; anything else reads as empty.
fn str_field<'a>(object: &'a Value, key: &str) -> &'a str {
    object.get(key).and_then(Value::as_str).unwrap_or_default()
}

impl PropertyCatalog {
    pub fn is_empty(&self) -> bool {
        self.person_props.is_empty()
            && self.multi_person_props.is_empty()
            && self.status_options.is_empty()
            && self.date_props.is_empty()
    }

    /// Folds one board's `card_properties` JSON into the catalog.
    ///
    /// The board must be a JSON array, otherwise the catalog is left
    /// untouched. Inside it, each property is read on its own: entries that
    /// are not objects, or whose fields have the wrong type, are skipped
    /// without affecting the rest of the board.
    pub fn ingest_board(&mut self, card_properties: &[u8]) -> serde_json::Result<()> {
        let props: Vec<Value> = serde_json::from_slice(card_properties)?;

        for prop in &props {
            let id = str_field(prop, "id");
            if id.is_empty() {
                continue;
            }
            match str_field(prop, "type") {
                "person" => self.person_props.push(id.to_string()),
                "multiPerson" => self.multi_person_props.push(id.to_string()),
                "date" => self.date_props.push(id.to_string()),
                "select" | "multiSelect" if is_status_name(str_field(prop, "name")) => {
                    let options: BTreeMap<String, String> = prop
                        .get("options")
                        .and_then(Value::as_array)
                        .into_iter()
                        .flatten()
                        .map(|opt| (str_field(opt, "value"), str_field(opt, "id")))
                        .filter(|(value, option_id)| !value.is_empty() && !option_id.is_empty())
                        .map(|(value, option_id)| (value.to_uppercase(), option_id.to_string()))
                        .collect();
                    if !options.is_empty() {
                        self.status_options.insert(id.to_string(), options);
                    }
                }
                _ => {}
            }
        }
        Ok(())
    }

    /// Option ids of every status property whose label matches one of `labels`.
    ///
    /// Returns `(status property id, matching option ids)` per status property.
    pub fn status_option_ids(&self, labels: &[&str]) -> Vec<(&str, Vec<&str>)> {
        self.status_options
            .iter()
            .map(|(prop_id, options)| {
                let ids = labels
                    .iter()
                    .filter_map(|label| options.get(&label.to_uppercase()))
                    .map(String::as_str)
                    .collect();
                (prop_id.as_str(), ids)
            })
            .collect()
    }
}

fn is_status_name(name: &str) -> bool {
    STATUS_PROPERTY_NAMES
        .iter()
        .any(|candidate| name.to_lowercase() == *candidate)
}

/// Builds a [`PropertyCatalog`] from the live database.
#[derive(Debug, Clone)]
pub struct CatalogDiscoverer {
    storage: Storage,
}

impl CatalogDiscoverer {
    pub fn new(storage: Storage) -> Self {
        Self { storage }
    }

    /// Reads every non-deleted board and classifies its properties.
    ///
    /// Boards with malformed property JSON are skipped.
    pub async fn discover(&self) -> Result<PropertyCatalog> {
        self.storage.with_connection(|conn| Ok(scan_boards(conn)?)).await
    }
}

fn scan_boards(conn: &Connection) -> rusqlite::Result<PropertyCatalog> {
    let mut stmt = conn.prepare("SELECT id, card_properties FROM boards WHERE delete_at=0")?;
    let mut rows = stmt.query([])?;

    let mut catalog = PropertyCatalog::default();
    while let Some(row) = rows.next()? {
        let board_id: String = row.get(0)?;
        let raw = match row.get_ref(1)? {
            ValueRef::Text(bytes) | ValueRef::Blob(bytes) => bytes,
            _ => continue,
        };
        if let Err(e) = catalog.ingest_board(raw) {
            debug!(board_id = %board_id, error = %e, "Skipping board with malformed card properties");
        }
    }

    debug!(
        person = catalog.person_props.len(),
        multi_person = catalog.multi_person_props.len(),
        status = catalog.status_options.len(),
        date = catalog.date_props.len(),
        "Property catalog discovered"
    );
    Ok(catalog)
}
