//! Identifier mapping store
//!
//! Rows are written only from the sync worker, so the store does no
//! locking of its own.

use std::future::Future;

use libsql::params::Params;
use libsql::{Connection, Row, Value};

use super::{flag, id_set, int_or_null, opt_i64, opt_text, text_or_null};
use crate::error::{Error, Result};
use crate::models::{CloudService, IdMapping, NoteId};

const MAPPING_COLUMNS: &str =
    "mapping_id, local_note_id, remote_note_id, provider, extras, is_deleted_locally, is_being_updated";

/// Trait for local/remote id mapping storage
pub trait IdMappingRepository: Send + Sync {
    fn get_by_local_id_and_provider(
        &self,
        local_note_id: NoteId,
        provider: CloudService,
    ) -> impl Future<Output = Result<Option<IdMapping>>> + Send;

    fn get_by_remote_id(
        &self,
        remote_note_id: i64,
        provider: CloudService,
    ) -> impl Future<Output = Result<Option<IdMapping>>> + Send;

    /// Every mapping row, for inspection
    fn get_all(&self) -> impl Future<Output = Result<Vec<IdMapping>>> + Send;

    /// Insert a new row and return its `mapping_id`
    fn insert(&self, mapping: &IdMapping) -> impl Future<Output = Result<i64>> + Send;

    /// Overwrite the row identified by `mapping.mapping_id`
    fn update(&self, mapping: &IdMapping) -> impl Future<Output = Result<()>> + Send;

    /// Insert or replace the row for `(local_note_id, provider)`
    fn assign_provider_to_note(
        &self,
        mapping: &IdMapping,
    ) -> impl Future<Output = Result<()>> + Send;

    /// Clear the provider association of a note, keeping the row
    fn unassign_provider_from_note(
        &self,
        provider: CloudService,
        local_note_id: NoteId,
    ) -> impl Future<Output = Result<()>> + Send;

    fn delete_by_remote_id(
        &self,
        provider: CloudService,
        remote_note_id: i64,
    ) -> impl Future<Output = Result<()>> + Send;

    /// Remove rows whose local note no longer exists.
    ///
    /// Tombstones (locally deleted with a remote id) are kept until the
    /// remote delete has been propagated.
    fn delete_if_local_id_not_in(
        &self,
        local_note_ids: &[NoteId],
    ) -> impl Future<Output = Result<()>> + Send;

    /// Clear the association of rows whose remote id is missing from `ids_in_use`
    fn unassign_provider_from_remotely_deleted_notes(
        &self,
        ids_in_use: &[i64],
        provider: CloudService,
    ) -> impl Future<Output = Result<()>> + Send;

    /// Flag the mappings of deleted local notes so the next sync deletes them remotely
    fn mark_deleted_locally(
        &self,
        local_note_ids: &[NoteId],
    ) -> impl Future<Output = Result<()>> + Send;

    fn set_being_updated(
        &self,
        mapping_id: i64,
        is_being_updated: bool,
    ) -> impl Future<Output = Result<()>> + Send;
}

/// libSQL implementation of `IdMappingRepository`
#[derive(Clone)]
pub struct LibSqlIdMappingRepository {
    conn: Connection,
}

impl LibSqlIdMappingRepository {
    /// Create a new repository with the given connection
    pub const fn new(conn: Connection) -> Self {
        Self { conn }
    }

    async fn query_mappings(&self, filter: &str, params: Vec<Value>) -> Result<Vec<IdMapping>> {
        let sql = format!("SELECT {MAPPING_COLUMNS} FROM cloud_ids {filter} ORDER BY mapping_id");
        let mut rows = self.conn.query(&sql, Params::Positional(params)).await?;

        let mut mappings = Vec::new();
        while let Some(row) = rows.next().await? {
            mappings.push(Self::parse_mapping(&row)?);
        }
        Ok(mappings)
    }

    fn parse_mapping(row: &Row) -> Result<IdMapping> {
        let provider = match opt_text(row, 3)? {
            Some(name) => Some(CloudService::parse(&name).ok_or_else(|| {
                Error::Database(format!("unknown provider '{name}' in cloud_ids"))
            })?),
            None => None,
        };

        Ok(IdMapping {
            mapping_id: row.get(0)?,
            local_note_id: NoteId(row.get(1)?),
            remote_note_id: opt_i64(row, 2)?,
            provider,
            extras: opt_text(row, 4)?,
            is_deleted_locally: flag(row, 5)?,
            is_being_updated: flag(row, 6)?,
        })
    }

    fn provider_value(provider: Option<CloudService>) -> Value {
        text_or_null(provider.map(CloudService::as_str))
    }
}

impl IdMappingRepository for LibSqlIdMappingRepository {
    async fn get_by_local_id_and_provider(
        &self,
        local_note_id: NoteId,
        provider: CloudService,
    ) -> Result<Option<IdMapping>> {
        let mut found = self
            .query_mappings(
                "WHERE local_note_id = ?1 AND provider = ?2",
                vec![
                    Value::Integer(local_note_id.get()),
                    Self::provider_value(Some(provider)),
                ],
            )
            .await?;
        Ok(found.pop())
    }

    async fn get_by_remote_id(
        &self,
        remote_note_id: i64,
        provider: CloudService,
    ) -> Result<Option<IdMapping>> {
        let mut found = self
            .query_mappings(
                "WHERE remote_note_id = ?1 AND provider = ?2",
                vec![
                    Value::Integer(remote_note_id),
                    Self::provider_value(Some(provider)),
                ],
            )
            .await?;
        Ok(found.pop())
    }

    async fn get_all(&self) -> Result<Vec<IdMapping>> {
        self.query_mappings("", Vec::new()).await
    }

    async fn insert(&self, mapping: &IdMapping) -> Result<i64> {
        self.conn
            .execute(
                "INSERT INTO cloud_ids (local_note_id, remote_note_id, provider, extras,
                    is_deleted_locally, is_being_updated)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                [
                    Value::Integer(mapping.local_note_id.get()),
                    int_or_null(mapping.remote_note_id),
                    Self::provider_value(mapping.provider),
                    text_or_null(mapping.extras.as_deref()),
                    Value::Integer(i64::from(mapping.is_deleted_locally)),
                    Value::Integer(i64::from(mapping.is_being_updated)),
                ],
            )
            .await?;
        Ok(self.conn.last_insert_rowid())
    }

    async fn update(&self, mapping: &IdMapping) -> Result<()> {
        let rows = self
            .conn
            .execute(
                "UPDATE cloud_ids SET local_note_id = ?1, remote_note_id = ?2, provider = ?3,
                    extras = ?4, is_deleted_locally = ?5, is_being_updated = ?6
                 WHERE mapping_id = ?7",
                [
                    Value::Integer(mapping.local_note_id.get()),
                    int_or_null(mapping.remote_note_id),
                    Self::provider_value(mapping.provider),
                    text_or_null(mapping.extras.as_deref()),
                    Value::Integer(i64::from(mapping.is_deleted_locally)),
                    Value::Integer(i64::from(mapping.is_being_updated)),
                    Value::Integer(mapping.mapping_id),
                ],
            )
            .await?;

        if rows == 0 {
            return Err(Error::NotFound(format!("mapping {}", mapping.mapping_id)));
        }
        Ok(())
    }

    async fn assign_provider_to_note(&self, mapping: &IdMapping) -> Result<()> {
        let provider = mapping.provider.ok_or_else(|| {
            Error::InvalidInput("cannot assign a mapping without a provider".to_string())
        })?;

        // A previously unassigned row for this note is superseded
        self.conn
            .execute(
                "DELETE FROM cloud_ids WHERE local_note_id = ?1 AND provider IS NULL",
                [mapping.local_note_id.get()],
            )
            .await?;

        self.conn
            .execute(
                "INSERT INTO cloud_ids (local_note_id, remote_note_id, provider, extras,
                    is_deleted_locally, is_being_updated)
                 VALUES (?1, ?2, ?3, ?4, ?5, 0)
                 ON CONFLICT(local_note_id, provider) DO UPDATE SET
                    remote_note_id = excluded.remote_note_id,
                    extras = excluded.extras,
                    is_deleted_locally = excluded.is_deleted_locally,
                    is_being_updated = 0",
                [
                    Value::Integer(mapping.local_note_id.get()),
                    int_or_null(mapping.remote_note_id),
                    Self::provider_value(Some(provider)),
                    text_or_null(mapping.extras.as_deref()),
                    Value::Integer(i64::from(mapping.is_deleted_locally)),
                ],
            )
            .await?;
        Ok(())
    }

    async fn unassign_provider_from_note(
        &self,
        provider: CloudService,
        local_note_id: NoteId,
    ) -> Result<()> {
        self.conn
            .execute(
                "UPDATE cloud_ids SET remote_note_id = NULL, provider = NULL, is_being_updated = 0
                 WHERE provider = ?1 AND local_note_id = ?2",
                [
                    Self::provider_value(Some(provider)),
                    Value::Integer(local_note_id.get()),
                ],
            )
            .await?;
        Ok(())
    }

    async fn delete_by_remote_id(&self, provider: CloudService, remote_note_id: i64) -> Result<()> {
        self.conn
            .execute(
                "DELETE FROM cloud_ids WHERE provider = ?1 AND remote_note_id = ?2",
                [
                    Self::provider_value(Some(provider)),
                    Value::Integer(remote_note_id),
                ],
            )
            .await?;
        Ok(())
    }

    async fn delete_if_local_id_not_in(&self, local_note_ids: &[NoteId]) -> Result<()> {
        let ids = id_set(&local_note_ids.iter().map(|id| id.get()).collect::<Vec<_>>())?;
        let removed = self
            .conn
            .execute(
                "DELETE FROM cloud_ids
                 WHERE local_note_id NOT IN (SELECT value FROM json_each(?1))
                   AND NOT (is_deleted_locally = 1 AND remote_note_id IS NOT NULL)",
                [ids],
            )
            .await?;

        if removed > 0 {
            tracing::debug!("Removed {removed} orphaned id mapping(s)");
        }
        Ok(())
    }

    async fn unassign_provider_from_remotely_deleted_notes(
        &self,
        ids_in_use: &[i64],
        provider: CloudService,
    ) -> Result<()> {
        self.conn
            .execute(
                "UPDATE cloud_ids SET remote_note_id = NULL, provider = NULL, is_being_updated = 0
                 WHERE provider = ?1
                   AND remote_note_id IS NOT NULL
                   AND remote_note_id NOT IN (SELECT value FROM json_each(?2))",
                [
                    Self::provider_value(Some(provider)),
                    Value::Text(id_set(ids_in_use)?),
                ],
            )
            .await?;
        Ok(())
    }

    async fn mark_deleted_locally(&self, local_note_ids: &[NoteId]) -> Result<()> {
        let ids = id_set(&local_note_ids.iter().map(|id| id.get()).collect::<Vec<_>>())?;
        self.conn
            .execute(
                "UPDATE cloud_ids SET is_deleted_locally = 1
                 WHERE local_note_id IN (SELECT value FROM json_each(?1))",
                [ids],
            )
            .await?;
        Ok(())
    }

    async fn set_being_updated(&self, mapping_id: i64, is_being_updated: bool) -> Result<()> {
        self.conn
            .execute(
                "UPDATE cloud_ids SET is_being_updated = ?1 WHERE mapping_id = ?2",
                [i64::from(is_being_updated), mapping_id],
            )
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Database;
    use pretty_assertions::assert_eq;

    async fn setup() -> (Database, LibSqlIdMappingRepository) {
        let db = Database::open_in_memory().await.unwrap();
        let repo = LibSqlIdMappingRepository::new(db.connection().clone());
        (db, repo)
    }

    fn nextcloud(local: i64, remote: i64, etag: &str) -> IdMapping {
        IdMapping::synced(NoteId(local), remote, CloudService::Nextcloud, Some(etag.to_string()))
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_insert_and_lookup() {
        let (_db, repo) = setup().await;

        let mapping_id = repo.insert(&nextcloud(7, 42, "t1")).await.unwrap();

        let by_local = repo
            .get_by_local_id_and_provider(NoteId(7), CloudService::Nextcloud)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(by_local.mapping_id, mapping_id);
        assert_eq!(by_local.extras.as_deref(), Some("t1"));

        let by_remote = repo
            .get_by_remote_id(42, CloudService::Nextcloud)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(by_remote, by_local);

        assert!(repo
            .get_by_remote_id(42, CloudService::Webdav)
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_remote_id_is_unique_per_provider() {
        let (_db, repo) = setup().await;

        repo.insert(&nextcloud(1, 42, "a")).await.unwrap();
        assert!(repo.insert(&nextcloud(2, 42, "b")).await.is_err());

        let webdav = IdMapping::synced(NoteId(2), 42, CloudService::Webdav, None);
        repo.insert(&webdav).await.unwrap();
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_update_by_mapping_id() {
        let (_db, repo) = setup().await;

        let mapping_id = repo.insert(&nextcloud(7, 42, "t1")).await.unwrap();
        let mut mapping = repo.get_by_remote_id(42, CloudService::Nextcloud).await.unwrap().unwrap();
        mapping.extras = Some("t2".to_string());
        mapping.is_being_updated = true;
        repo.update(&mapping).await.unwrap();

        let all = repo.get_all().await.unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].mapping_id, mapping_id);
        assert_eq!(all[0].extras.as_deref(), Some("t2"));
        assert!(all[0].is_being_updated);

        repo.set_being_updated(mapping_id, false).await.unwrap();
        assert!(!repo.get_all().await.unwrap()[0].is_being_updated);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_assign_provider_upserts_and_replaces_unassigned_row() {
        let (_db, repo) = setup().await;

        repo.assign_provider_to_note(&nextcloud(7, 42, "t1")).await.unwrap();
        repo.assign_provider_to_note(&nextcloud(7, 43, "t2")).await.unwrap();
        let all = repo.get_all().await.unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].remote_note_id, Some(43));

        repo.unassign_provider_from_note(CloudService::Nextcloud, NoteId(7))
            .await
            .unwrap();
        let unassigned = &repo.get_all().await.unwrap()[0];
        assert_eq!(unassigned.provider, None);
        assert_eq!(unassigned.remote_note_id, None);

        repo.assign_provider_to_note(&nextcloud(7, 44, "t3")).await.unwrap();
        let all = repo.get_all().await.unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].remote_note_id, Some(44));
        assert_eq!(all[0].provider, Some(CloudService::Nextcloud));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_delete_if_local_id_not_in_keeps_tombstones() {
        let (_db, repo) = setup().await;

        repo.insert(&nextcloud(1, 10, "a")).await.unwrap();
        repo.insert(&nextcloud(2, 20, "b")).await.unwrap();
        repo.insert(&nextcloud(3, 30, "c")).await.unwrap();
        repo.mark_deleted_locally(&[NoteId(3)]).await.unwrap();

        repo.delete_if_local_id_not_in(&[NoteId(1)]).await.unwrap();

        let remaining = repo
            .get_all()
            .await
            .unwrap()
            .into_iter()
            .map(|m| m.local_note_id)
            .collect::<Vec<_>>();
        assert_eq!(remaining, vec![NoteId(1), NoteId(3)]);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_unassign_remotely_deleted_and_delete_by_remote_id() {
        let (_db, repo) = setup().await;

        repo.insert(&nextcloud(1, 10, "a")).await.unwrap();
        repo.insert(&nextcloud(2, 20, "b")).await.unwrap();
        repo.insert(&IdMapping::synced(NoteId(3), 30, CloudService::Webdav, None))
            .await
            .unwrap();

        repo.unassign_provider_from_remotely_deleted_notes(&[10], CloudService::Nextcloud)
            .await
            .unwrap();

        let all = repo.get_all().await.unwrap();
        assert_eq!(all[0].remote_note_id, Some(10));
        assert_eq!(all[1].remote_note_id, None);
        assert_eq!(all[1].provider, None);
        assert_eq!(all[2].remote_note_id, Some(30));

        repo.delete_by_remote_id(CloudService::Nextcloud, 10).await.unwrap();
        assert_eq!(repo.get_all().await.unwrap().len(), 2);
    }
}
