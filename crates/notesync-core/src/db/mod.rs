//! Local store for notesync
//!
//! The sync core reaches the local store only through the repository traits
//! defined here; the libSQL implementations are what ships by default.

mod connection;
mod id_mapping_repository;
mod migrations;
mod note_repository;
mod notebook_repository;
mod settings_repository;
mod store;

pub use connection::Database;
pub use id_mapping_repository::{IdMappingRepository, LibSqlIdMappingRepository};
pub use note_repository::{LibSqlNoteRepository, NoteRepository};
pub use notebook_repository::{LibSqlNotebookRepository, NotebookRepository};
pub use settings_repository::{LibSqlSettingsRepository, SettingsRepository};
pub use store::{LibSqlStore, LocalStore};

use libsql::{Row, Value};

use crate::error::{Error, Result};

fn opt_i64(row: &Row, idx: i32) -> Result<Option<i64>> {
    match row.get_value(idx)? {
        Value::Null => Ok(None),
        Value::Integer(value) => Ok(Some(value)),
        other => Err(Error::Database(format!(
            "expected integer in column {idx}, found {other:?}"
        ))),
    }
}

fn opt_text(row: &Row, idx: i32) -> Result<Option<String>> {
    match row.get_value(idx)? {
        Value::Null => Ok(None),
        Value::Text(value) => Ok(Some(value)),
        other => Err(Error::Database(format!(
            "expected text in column {idx}, found {other:?}"
        ))),
    }
}

fn flag(row: &Row, idx: i32) -> Result<bool> {
    Ok(row.get::<i64>(idx)? != 0)
}

fn int_or_null(value: Option<i64>) -> Value {
    value.map_or(Value::Null, Value::Integer)
}

fn text_or_null(value: Option<&str>) -> Value {
    value.map_or(Value::Null, |text| Value::Text(text.to_string()))
}

/// Encode ids as a JSON array so `IN (SELECT value FROM json_each(?))` can take a set
fn id_set(ids: &[i64]) -> Result<String> {
    Ok(serde_json::to_string(ids)?)
}
