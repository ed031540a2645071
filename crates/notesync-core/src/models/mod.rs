//! Data models for notesync

mod id_mapping;
mod note;
mod notebook;
mod preferences;
mod task_list;

pub use id_mapping::IdMapping;
pub use note::{Note, NoteId};
pub use notebook::Notebook;
pub use preferences::{AppPreferences, BackgroundSync, CloudService, SyncMode};
pub use task_list::{markdown_to_task_list, task_list_to_markdown, NoteTask};
