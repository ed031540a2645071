//! Note repository implementation

use std::future::Future;

use libsql::params::Params;
use libsql::{Connection, Row, Value};
use tokio::sync::broadcast;

use super::{flag, id_set, int_or_null, opt_i64};
use crate::error::{Error, Result};
use crate::models::{CloudService, Note, NoteId, NoteTask};
use crate::util::unix_timestamp_now;

const NOTE_COLUMNS: &str = "id, title, content, is_list, task_list, is_pinned, is_archived, \
     is_hidden, is_deleted, deletion_date, is_local_only, creation_date, modified_date, notebook_id";

/// Trait for note storage operations used by the sync core
pub trait NoteRepository: Send + Sync {
    /// All notes, including those in the bin
    fn get_all(&self) -> impl Future<Output = Result<Vec<Note>>> + Send;

    /// Notes that are not in the bin
    fn get_non_deleted(&self) -> impl Future<Output = Result<Vec<Note>>> + Send;

    /// Get a note by ID
    fn get_by_id(&self, id: NoteId) -> impl Future<Output = Result<Option<Note>>> + Send;

    /// Syncable notes that have no mapping for `provider` yet
    fn get_non_remote_notes(
        &self,
        provider: CloudService,
    ) -> impl Future<Output = Result<Vec<Note>>> + Send;

    /// Insert a note and return its new id.
    ///
    /// `should_sync` is false for notes pulled from a remote so the insert
    /// does not schedule another push.
    fn insert_note(
        &self,
        note: &Note,
        should_sync: bool,
    ) -> impl Future<Output = Result<NoteId>> + Send;

    /// Overwrite stored notes with the given values
    fn update_notes(&self, notes: &[Note]) -> impl Future<Output = Result<()>> + Send;

    /// Move notes whose `provider` counterpart is missing from `ids_in_use` to the bin
    fn move_remotely_deleted_notes_to_bin(
        &self,
        ids_in_use: &[i64],
        provider: CloudService,
    ) -> impl Future<Output = Result<()>> + Send;

    /// Permanently delete notes, leaving their mappings behind as tombstones
    fn delete_notes(&self, ids: &[NoteId]) -> impl Future<Output = Result<()>> + Send;
}

/// libSQL implementation of `NoteRepository`
#[derive(Clone)]
pub struct LibSqlNoteRepository {
    conn: Connection,
    pending_sync: broadcast::Sender<NoteId>,
}

impl LibSqlNoteRepository {
    /// Create a new repository with the given connection
    pub fn new(conn: Connection) -> Self {
        let (pending_sync, _) = broadcast::channel(64);
        Self { conn, pending_sync }
    }

    /// Receive ids of notes inserted with `should_sync = true`.
    ///
    /// Hosts use this to schedule a push for freshly created notes.
    pub fn subscribe_pending_sync(&self) -> broadcast::Receiver<NoteId> {
        self.pending_sync.subscribe()
    }

    async fn query_notes(&self, filter: &str, params: Vec<Value>) -> Result<Vec<Note>> {
        let sql = format!("SELECT {NOTE_COLUMNS} FROM notes {filter} ORDER BY id");
        let mut rows = self.conn.query(&sql, Params::Positional(params)).await?;

        let mut notes = Vec::new();
        while let Some(row) = rows.next().await? {
            notes.push(Self::parse_note(&row)?);
        }
        Ok(notes)
    }

    /// Parse a note from a database row
    fn parse_note(row: &Row) -> Result<Note> {
        let task_list: String = row.get(4)?;
        let task_list: Vec<NoteTask> = serde_json::from_str(&task_list)?;
        Ok(Note {
            id: NoteId(row.get(0)?),
            title: row.get(1)?,
            content: row.get(2)?,
            is_list: flag(row, 3)?,
            task_list,
            is_pinned: flag(row, 5)?,
            is_archived: flag(row, 6)?,
            is_hidden: flag(row, 7)?,
            is_deleted: flag(row, 8)?,
            deletion_date: opt_i64(row, 9)?,
            is_local_only: flag(row, 10)?,
            creation_date: row.get(11)?,
            modified_date: row.get(12)?,
            notebook_id: opt_i64(row, 13)?,
        })
    }

    /// Column values in `NOTE_COLUMNS` order, without the id
    fn note_values(note: &Note) -> Result<Vec<Value>> {
        Ok(vec![
            Value::Text(note.title.clone()),
            Value::Text(note.content.clone()),
            Value::Integer(i64::from(note.is_list)),
            Value::Text(serde_json::to_string(&note.task_list)?),
            Value::Integer(i64::from(note.is_pinned)),
            Value::Integer(i64::from(note.is_archived)),
            Value::Integer(i64::from(note.is_hidden)),
            Value::Integer(i64::from(note.is_deleted)),
            int_or_null(note.deletion_date),
            Value::Integer(i64::from(note.is_local_only)),
            Value::Integer(note.creation_date),
            Value::Integer(note.modified_date),
            int_or_null(note.notebook_id),
        ])
    }
}

impl NoteRepository for LibSqlNoteRepository {
    async fn get_all(&self) -> Result<Vec<Note>> {
        self.query_notes("", Vec::new()).await
    }

    async fn get_non_deleted(&self) -> Result<Vec<Note>> {
        self.query_notes("WHERE is_deleted = 0", Vec::new()).await
    }

    async fn get_by_id(&self, id: NoteId) -> Result<Option<Note>> {
        let mut notes = self
            .query_notes("WHERE id = ?1", vec![Value::Integer(id.get())])
            .await?;
        Ok(notes.pop())
    }

    async fn get_non_remote_notes(&self, provider: CloudService) -> Result<Vec<Note>> {
        self.query_notes(
            "WHERE is_deleted = 0 AND is_local_only = 0 AND id NOT IN (
                SELECT local_note_id FROM cloud_ids WHERE provider = ?1
            )",
            vec![Value::Text(provider.as_str().to_string())],
        )
        .await
    }

    async fn insert_note(&self, note: &Note, should_sync: bool) -> Result<NoteId> {
        let mut values = Self::note_values(note)?;
        let id = if note.id.is_saved() {
            values.insert(0, Value::Integer(note.id.get()));
            self.conn
                .execute(
                    &format!(
                        "INSERT INTO notes ({NOTE_COLUMNS})
                         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)"
                    ),
                    Params::Positional(values),
                )
                .await?;
            note.id
        } else {
            self.conn
                .execute(
                    "INSERT INTO notes (title, content, is_list, task_list, is_pinned, is_archived,
                        is_hidden, is_deleted, deletion_date, is_local_only, creation_date,
                        modified_date, notebook_id)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)",
                    Params::Positional(values),
                )
                .await?;
            NoteId(self.conn.last_insert_rowid())
        };

        if should_sync {
            // Nobody listening is fine
            let _ = self.pending_sync.send(id);
        }
        Ok(id)
    }

    async fn update_notes(&self, notes: &[Note]) -> Result<()> {
        for note in notes {
            let mut values = Self::note_values(note)?;
            values.push(Value::Integer(note.id.get()));
            let rows = self
                .conn
                .execute(
                    "UPDATE notes SET title = ?1, content = ?2, is_list = ?3, task_list = ?4,
                        is_pinned = ?5, is_archived = ?6, is_hidden = ?7, is_deleted = ?8,
                        deletion_date = ?9, is_local_only = ?10, creation_date = ?11,
                        modified_date = ?12, notebook_id = ?13
                     WHERE id = ?14",
                    Params::Positional(values),
                )
                .await?;

            if rows == 0 {
                return Err(Error::NotFound(format!("note {}", note.id)));
            }
        }
        Ok(())
    }

    async fn move_remotely_deleted_notes_to_bin(
        &self,
        ids_in_use: &[i64],
        provider: CloudService,
    ) -> Result<()> {
        let moved = self
            .conn
            .execute(
                "UPDATE notes SET is_deleted = 1, deletion_date = ?1
                 WHERE is_deleted = 0 AND id IN (
                    SELECT local_note_id FROM cloud_ids
                    WHERE provider = ?2
                      AND remote_note_id IS NOT NULL
                      AND remote_note_id NOT IN (SELECT value FROM json_each(?3))
                 )",
                [
                    Value::Integer(unix_timestamp_now()),
                    Value::Text(provider.as_str().to_string()),
                    Value::Text(id_set(ids_in_use)?),
                ],
            )
            .await?;

        if moved > 0 {
            tracing::info!("Moved {moved} remotely deleted note(s) to the bin");
        }
        Ok(())
    }

    async fn delete_notes(&self, ids: &[NoteId]) -> Result<()> {
        let ids = id_set(&ids.iter().map(|id| id.get()).collect::<Vec<_>>())?;

        self.conn
            .execute(
                "UPDATE cloud_ids SET is_deleted_locally = 1
                 WHERE local_note_id IN (SELECT value FROM json_each(?1))",
                [ids.clone()],
            )
            .await?;
        self.conn
            .execute(
                "DELETE FROM notes WHERE id IN (SELECT value FROM json_each(?1))",
                [ids],
            )
            .await?;
        Ok(())
    }
}
