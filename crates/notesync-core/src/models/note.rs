//! Note model

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::task_list::{markdown_to_task_list, task_list_to_markdown, NoteTask};

/// A local note identifier, assigned by the store when the note is first inserted.
///
/// `NoteId(0)` marks a note that has not been stored yet.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct NoteId(pub i64);

impl NoteId {
    /// Identifier used for notes that have not been inserted yet
    pub const UNSAVED: Self = Self(0);

    /// Raw integer value
    #[must_use]
    pub const fn get(self) -> i64 {
        self.0
    }

    /// Whether the store has assigned this id
    #[must_use]
    pub const fn is_saved(self) -> bool {
        self.0 != 0
    }
}

impl fmt::Display for NoteId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for NoteId {
    type Err = std::num::ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(s.trim().parse()?))
    }
}

impl From<i64> for NoteId {
    fn from(value: i64) -> Self {
        Self(value)
    }
}

/// A note in the local store
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Note {
    /// Local identifier
    pub id: NoteId,
    /// Title shown in lists
    pub title: String,
    /// Plain text body (used when `is_list` is false)
    pub content: String,
    /// Whether the body is a task list instead of plain text
    pub is_list: bool,
    /// Task list body (used when `is_list` is true)
    pub task_list: Vec<NoteTask>,
    /// Pinned notes map to remote favorites
    pub is_pinned: bool,
    pub is_archived: bool,
    pub is_hidden: bool,
    /// Soft delete flag ("in the bin")
    pub is_deleted: bool,
    /// When the note was moved to the bin (Unix seconds)
    pub deletion_date: Option<i64>,
    /// Local-only notes are never synced
    pub is_local_only: bool,
    /// Creation timestamp (Unix seconds)
    pub creation_date: i64,
    /// Last modification timestamp (Unix seconds)
    pub modified_date: i64,
    /// Optional notebook reference
    pub notebook_id: Option<i64>,
}

impl Default for Note {
    fn default() -> Self {
        let now = chrono::Utc::now().timestamp();
        Self {
            id: NoteId::UNSAVED,
            title: String::new(),
            content: String::new(),
            is_list: false,
            task_list: Vec::new(),
            is_pinned: false,
            is_archived: false,
            is_hidden: false,
            is_deleted: false,
            deletion_date: None,
            is_local_only: false,
            creation_date: now,
            modified_date: now,
            notebook_id: None,
        }
    }
}

impl Note {
    /// Create a new unsaved plain text note
    #[must_use]
    pub fn new(title: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            content: content.into(),
            ..Self::default()
        }
    }

    /// Create a new unsaved task-list note
    #[must_use]
    pub fn new_list(title: impl Into<String>, tasks: Vec<NoteTask>) -> Self {
        Self {
            title: title.into(),
            is_list: true,
            task_list: tasks,
            ..Self::default()
        }
    }

    /// Body as it is sent to a remote backend.
    ///
    /// Task lists are serialized to a markdown checklist.
    #[must_use]
    pub fn body_for_sync(&self) -> String {
        if self.is_list {
            task_list_to_markdown(&self.task_list)
        } else {
            self.content.clone()
        }
    }

    /// Replace the body with text received from a remote backend.
    ///
    /// When the note is a task list the text is parsed back into tasks and
    /// the plain content is kept as received.
    pub fn apply_synced_body(&mut self, body: &str) {
        self.task_list = if self.is_list {
            markdown_to_task_list(body)
        } else {
            Vec::new()
        };
        self.content = body.to_string();
    }

    /// Whether this note takes part in synchronization
    #[must_use]
    pub const fn is_syncable(&self) -> bool {
        !self.is_local_only && !self.is_deleted
    }
}
