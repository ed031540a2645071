//! Notebook repository implementation

use std::future::Future;

use libsql::Connection;

use crate::error::Result;
use crate::models::Notebook;

/// Trait for notebook storage operations
pub trait NotebookRepository: Send + Sync {
    /// Get a notebook by ID
    fn get_by_id(&self, id: i64) -> impl Future<Output = Result<Option<Notebook>>> + Send;

    /// Get a notebook by its exact name
    fn get_by_name(&self, name: &str) -> impl Future<Output = Result<Option<Notebook>>> + Send;

    /// Insert a notebook and return its id
    fn insert(&self, notebook: &Notebook) -> impl Future<Output = Result<i64>> + Send;
}

/// libSQL implementation of `NotebookRepository`
#[derive(Clone)]
pub struct LibSqlNotebookRepository {
    conn: Connection,
}

impl LibSqlNotebookRepository {
    /// Create a new repository with the given connection
    pub const fn new(conn: Connection) -> Self {
        Self { conn }
    }

    async fn query_one(&self, sql: &str, param: libsql::Value) -> Result<Option<Notebook>> {
        let mut rows = self.conn.query(sql, [param]).await?;
        match rows.next().await? {
            Some(row) => Ok(Some(Notebook {
                id: row.get(0)?,
                name: row.get(1)?,
            })),
            None => Ok(None),
        }
    }
}

impl NotebookRepository for LibSqlNotebookRepository {
    async fn get_by_id(&self, id: i64) -> Result<Option<Notebook>> {
        self.query_one(
            "SELECT id, name FROM notebooks WHERE id = ?1",
            libsql::Value::Integer(id),
        )
        .await
    }

    async fn get_by_name(&self, name: &str) -> Result<Option<Notebook>> {
        self.query_one(
            "SELECT id, name FROM notebooks WHERE name = ?1",
            libsql::Value::Text(name.to_string()),
        )
        .await
    }

    async fn insert(&self, notebook: &Notebook) -> Result<i64> {
        self.conn
            .execute(
                "INSERT INTO notebooks (name) VALUES (?1)",
                [notebook.name.as_str()],
            )
            .await?;
        Ok(self.conn.last_insert_rowid())
    }
}
