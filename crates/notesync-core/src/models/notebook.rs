//! Notebook model

use serde::{Deserialize, Serialize};

/// A named group of notes.
///
/// Remote backends only know a free-text category, which maps to a local
/// notebook by name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notebook {
    /// Local identifier, 0 until inserted
    pub id: i64,
    /// Display name, unique
    pub name: String,
}

impl Notebook {
    /// Create a new notebook that has not been inserted yet
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: 0,
            name: name.into(),
        }
    }
}
