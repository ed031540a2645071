//! Bundle of the repositories the sync provider works against

use super::{
    Database, IdMappingRepository, LibSqlIdMappingRepository, LibSqlNoteRepository,
    LibSqlNotebookRepository, NoteRepository, NotebookRepository,
};

/// Local store collaborators used by reconciliation
pub trait LocalStore: Send + Sync + 'static {
    type Notes: NoteRepository;
    type Notebooks: NotebookRepository;
    type Mappings: IdMappingRepository;

    fn notes(&self) -> &Self::Notes;
    fn notebooks(&self) -> &Self::Notebooks;
    fn mappings(&self) -> &Self::Mappings;
}

/// libSQL-backed local store sharing one connection
#[derive(Clone)]
pub struct LibSqlStore {
    notes: LibSqlNoteRepository,
    notebooks: LibSqlNotebookRepository,
    mappings: LibSqlIdMappingRepository,
}

impl LibSqlStore {
    #[must_use]
    pub fn new(db: &Database) -> Self {
        let conn = db.connection();
        Self {
            notes: LibSqlNoteRepository::new(conn.clone()),
            notebooks: LibSqlNotebookRepository::new(conn.clone()),
            mappings: LibSqlIdMappingRepository::new(conn.clone()),
        }
    }
}

impl LocalStore for LibSqlStore {
    type Notes = LibSqlNoteRepository;
    type Notebooks = LibSqlNotebookRepository;
    type Mappings = LibSqlIdMappingRepository;

    fn notes(&self) -> &Self::Notes {
        &self.notes
    }

    fn notebooks(&self) -> &Self::Notebooks {
        &self.notebooks
    }

    fn mappings(&self) -> &Self::Mappings {
        &self.mappings
    }
}
