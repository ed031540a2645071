//! notesync-core - Note synchronization core
//!
//! Reconciles a local libSQL note store with a Nextcloud Notes or WebDAV
//! account. Hosts build a [`sync::SyncManager`] from a
//! [`preferences::PreferenceRepository`] and the local store, then call its
//! operations; everything that touches the remote runs on one worker task.

pub mod db;
pub mod error;
pub mod models;
pub mod preferences;
pub mod sync;
mod util;

pub use error::{Error, Result};
pub use models::{Note, NoteId};
pub use sync::{SyncManager, SyncOutcome};
