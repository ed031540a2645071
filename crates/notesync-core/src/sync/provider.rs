//! Provider operations and the reconciliation pass
//!
//! The pass is written once against [`RemoteBackend`]; each service only
//! supplies its network calls.

use std::future::Future;

use super::backend::RemoteBackend;
use super::config::ProviderConfig;
use super::nextcloud::NextcloudBackend;
use super::result::{SyncError, SyncOutcome, SyncResult};
use super::webdav::WebdavBackend;
use super::RemoteNote;
use crate::db::{IdMappingRepository, LocalStore, NoteRepository, NotebookRepository};
use crate::models::{IdMapping, Note, NoteId, Notebook};

/// Operations a sync worker can run against one service
pub trait SyncProvider: Send + Sync + 'static {
    /// Reconcile local and remote notes in one pass
    fn sync(&self, config: &ProviderConfig) -> impl Future<Output = SyncOutcome> + Send;

    fn create_note(
        &self,
        note: &Note,
        config: &ProviderConfig,
    ) -> impl Future<Output = SyncOutcome> + Send;

    fn update_note(
        &self,
        note: &Note,
        config: &ProviderConfig,
    ) -> impl Future<Output = SyncOutcome> + Send;

    /// Delete the remote copy and forget the mapping
    fn delete_note(
        &self,
        note: &Note,
        config: &ProviderConfig,
    ) -> impl Future<Output = SyncOutcome> + Send;

    /// Delete the remote copy but keep the local note, unassigned
    fn move_note_to_bin(
        &self,
        note: &Note,
        config: &ProviderConfig,
    ) -> impl Future<Output = SyncOutcome> + Send;

    /// Recreate a note taken out of the bin
    fn restore_note(
        &self,
        note: &Note,
        config: &ProviderConfig,
    ) -> impl Future<Output = SyncOutcome> + Send;

    fn authenticate(&self, config: &ProviderConfig) -> impl Future<Output = SyncOutcome> + Send;

    fn is_server_compatible(
        &self,
        config: &ProviderConfig,
    ) -> impl Future<Output = SyncOutcome> + Send;
}

/// Reconciliation between a local store and one remote backend
pub struct BackendSyncProvider<B, S> {
    backend: B,
    store: S,
}

impl<B: RemoteBackend, S: LocalStore> BackendSyncProvider<B, S> {
    pub const fn new(backend: B, store: S) -> Self {
        Self { backend, store }
    }

    pub const fn backend(&self) -> &B {
        &self.backend
    }

    pub const fn store(&self) -> &S {
        &self.store
    }

    async fn mapping_for(&self, id: NoteId) -> SyncResult<Option<IdMapping>> {
        Ok(self
            .store
            .mappings()
            .get_by_local_id_and_provider(id, B::SERVICE)
            .await?)
    }

    async fn category_for(&self, note: &Note) -> SyncResult<String> {
        let Some(notebook_id) = note.notebook_id else {
            return Ok(String::new());
        };
        Ok(self
            .store
            .notebooks()
            .get_by_id(notebook_id)
            .await?
            .map(|notebook| notebook.name)
            .unwrap_or_default())
    }

    /// Look up or create the notebook for a remote category
    async fn notebook_for(&self, category: &str) -> SyncResult<Option<i64>> {
        let category = category.trim();
        if category.is_empty() {
            return Ok(None);
        }

        let notebooks = self.store.notebooks();
        if let Some(notebook) = notebooks.get_by_name(category).await? {
            return Ok(Some(notebook.id));
        }
        tracing::debug!("Creating notebook '{category}' for remote category");
        Ok(Some(notebooks.insert(&Notebook::new(category)).await?))
    }

    async fn to_remote(&self, note: &Note, remote_id: i64) -> SyncResult<RemoteNote> {
        Ok(RemoteNote {
            id: remote_id,
            etag: None,
            title: note.title.clone(),
            content: note.body_for_sync(),
            category: self.category_for(note).await?,
            favorite: note.is_pinned,
            modified: note.modified_date,
            read_only: None,
        })
    }

    /// Mapping that must carry a remote id for update, delete and bin operations
    async fn synced_mapping(&self, note: &Note) -> SyncResult<IdMapping> {
        self.mapping_for(note.id)
            .await?
            .filter(|mapping| mapping.remote_note_id.is_some())
            .ok_or_else(|| {
                SyncError::Precondition(format!("Note {} does not exist remotely", note.id))
            })
    }

    async fn try_create(&self, config: &B::Config, note: &Note) -> SyncResult<()> {
        let remote_id = self
            .mapping_for(note.id)
            .await?
            .and_then(|mapping| mapping.remote_note_id)
            .unwrap_or(0);
        if remote_id != 0 {
            return Err(SyncError::Precondition(
                "Cannot create note that already exists".to_string(),
            ));
        }

        let remote = self.to_remote(note, 0).await?;
        let created = self.backend.create(config, &remote).await?;
        self.store
            .mappings()
            .assign_provider_to_note(&IdMapping::synced(
                note.id,
                created.id,
                B::SERVICE,
                created.etag,
            ))
            .await?;
        tracing::debug!("Created note {} as remote {}", note.id, created.id);
        Ok(())
    }

    async fn try_update(&self, config: &B::Config, note: &Note) -> SyncResult<()> {
        let mapping = self.synced_mapping(note).await?;
        self.guarded_push(config, note, &mapping).await
    }

    /// Push with `is_being_updated` held for the duration of the call
    async fn guarded_push(
        &self,
        config: &B::Config,
        note: &Note,
        mapping: &IdMapping,
    ) -> SyncResult<()> {
        let mappings = self.store.mappings();
        mappings.set_being_updated(mapping.mapping_id, true).await?;

        let result = self.push_update(config, note, mapping).await;
        if result.is_err() {
            if let Err(error) = mappings.set_being_updated(mapping.mapping_id, false).await {
                tracing::warn!(
                    "Failed to clear update flag of mapping {}: {error}",
                    mapping.mapping_id
                );
            }
        }
        result
    }

    /// Send a local note over its remote copy and store the new etag
    async fn push_update(
        &self,
        config: &B::Config,
        note: &Note,
        mapping: &IdMapping,
    ) -> SyncResult<()> {
        let remote_id = mapping.remote_note_id.unwrap_or(0);
        let remote = self.to_remote(note, remote_id).await?;
        let updated = self
            .backend
            .update(config, &remote, mapping.extras.as_deref())
            .await?;

        self.store
            .mappings()
            .update(&IdMapping {
                extras: updated.etag,
                is_being_updated: false,
                ..mapping.clone()
            })
            .await?;
        tracing::debug!("Pushed note {} to remote {remote_id}", note.id);
        Ok(())
    }

    async fn try_delete(&self, config: &B::Config, note: &Note) -> SyncResult<()> {
        let mapping = self.synced_mapping(note).await?;
        let remote_id = mapping.remote_note_id.unwrap_or(0);
        self.backend.delete(config, remote_id).await?;
        self.store
            .mappings()
            .delete_by_remote_id(B::SERVICE, remote_id)
            .await?;
        Ok(())
    }

    async fn try_move_to_bin(&self, config: &B::Config, note: &Note) -> SyncResult<()> {
        let mapping = self.synced_mapping(note).await?;
        self.backend
            .delete(config, mapping.remote_note_id.unwrap_or(0))
            .await?;
        self.store
            .mappings()
            .unassign_provider_from_note(B::SERVICE, note.id)
            .await?;
        Ok(())
    }

    async fn try_sync(&self, config: &B::Config) -> SyncResult<()> {
        let notes = self.store.notes();
        let mappings = self.store.mappings();

        let remote_notes = self.backend.list(config).await?;
        let all_ids = notes
            .get_all()
            .await?
            .into_iter()
            .map(|note| note.id)
            .collect::<Vec<_>>();
        let local_notes = notes
            .get_non_deleted()
            .await?
            .into_iter()
            .filter(|note| !note.is_local_only)
            .collect::<Vec<_>>();

        mappings.delete_if_local_id_not_in(&all_ids).await?;

        let mut ids_in_use = Vec::with_capacity(remote_notes.len());
        for remote in remote_notes {
            let Some(mapping) = mappings.get_by_remote_id(remote.id, B::SERVICE).await? else {
                ids_in_use.push(remote.id);
                self.pull_new(&remote).await?;
                continue;
            };

            if mapping.is_pending_remote_delete() {
                self.backend.delete(config, remote.id).await?;
                mappings.delete_by_remote_id(B::SERVICE, remote.id).await?;
                tracing::debug!("Deleted remote note {} removed locally", remote.id);
                continue;
            }

            ids_in_use.push(remote.id);
            if mapping.is_being_updated {
                continue;
            }
            if let Some(local) = local_notes
                .iter()
                .find(|note| note.id == mapping.local_note_id)
            {
                self.resolve(config, local, &remote, &mapping).await?;
            }
        }

        notes
            .move_remotely_deleted_notes_to_bin(&ids_in_use, B::SERVICE)
            .await?;
        mappings
            .unassign_provider_from_remotely_deleted_notes(&ids_in_use, B::SERVICE)
            .await?;

        let unsynced = notes.get_non_remote_notes(B::SERVICE).await?;
        for note in &unsynced {
            self.try_create(config, note).await?;
        }

        tracing::info!(
            "Synced {} remote note(s) with {}, pushed {} new",
            ids_in_use.len(),
            B::SERVICE.as_str(),
            unsynced.len()
        );
        Ok(())
    }

    /// Insert a remote note that has no local counterpart yet
    async fn pull_new(&self, remote: &RemoteNote) -> SyncResult<()> {
        let mut note = Note {
            title: remote.title.clone(),
            is_pinned: remote.favorite,
            creation_date: remote.modified,
            modified_date: remote.modified,
            notebook_id: self.notebook_for(&remote.category).await?,
            ..Note::default()
        };
        note.apply_synced_body(&remote.content);

        let id = self.store.notes().insert_note(&note, false).await?;
        self.store
            .mappings()
            .insert(&IdMapping::synced(
                id,
                remote.id,
                B::SERVICE,
                remote.etag.clone(),
            ))
            .await?;
        tracing::debug!("Pulled remote note {} as {id}", remote.id);
        Ok(())
    }

    /// Whole-note last-writer-wins between a local note and its remote copy
    async fn resolve(
        &self,
        config: &B::Config,
        local: &Note,
        remote: &RemoteNote,
        mapping: &IdMapping,
    ) -> SyncResult<()> {
        if mapping.is_deleted_locally {
            return Ok(());
        }

        if remote.modified < local.modified_date {
            return self.guarded_push(config, local, mapping).await;
        }

        if remote.modified > local.modified_date || remote.favorite != local.is_pinned {
            let mut updated = Note {
                title: remote.title.clone(),
                is_pinned: remote.favorite,
                modified_date: remote.modified,
                notebook_id: self.notebook_for(&remote.category).await?,
                ..local.clone()
            };
            updated.apply_synced_body(&remote.content);

            self.store.notes().update_notes(&[updated]).await?;
            self.store
                .mappings()
                .update(&IdMapping {
                    extras: remote.etag.clone(),
                    ..mapping.clone()
                })
                .await?;
            tracing::debug!("Pulled remote note {} into {}", remote.id, local.id);
        }

        Ok(())
    }
}

impl<B: RemoteBackend, S: LocalStore> SyncProvider for BackendSyncProvider<B, S> {
    async fn sync(&self, config: &ProviderConfig) -> SyncOutcome {
        let Some(config) = B::config(config) else {
            return SyncOutcome::InvalidConfig;
        };
        self.try_sync(config).await.into()
    }

    async fn create_note(&self, note: &Note, config: &ProviderConfig) -> SyncOutcome {
        let Some(config) = B::config(config) else {
            return SyncOutcome::InvalidConfig;
        };
        self.try_create(config, note).await.into()
    }

    async fn update_note(&self, note: &Note, config: &ProviderConfig) -> SyncOutcome {
        let Some(config) = B::config(config) else {
            return SyncOutcome::InvalidConfig;
        };
        self.try_update(config, note).await.into()
    }

    async fn delete_note(&self, note: &Note, config: &ProviderConfig) -> SyncOutcome {
        let Some(config) = B::config(config) else {
            return SyncOutcome::InvalidConfig;
        };
        self.try_delete(config, note).await.into()
    }

    async fn move_note_to_bin(&self, note: &Note, config: &ProviderConfig) -> SyncOutcome {
        let Some(config) = B::config(config) else {
            return SyncOutcome::InvalidConfig;
        };
        self.try_move_to_bin(config, note).await.into()
    }

    async fn restore_note(&self, note: &Note, config: &ProviderConfig) -> SyncOutcome {
        self.create_note(note, config).await
    }

    async fn authenticate(&self, config: &ProviderConfig) -> SyncOutcome {
        let Some(config) = B::config(config) else {
            return SyncOutcome::InvalidConfig;
        };
        self.backend.test_credentials(config).await.into()
    }

    async fn is_server_compatible(&self, config: &ProviderConfig) -> SyncOutcome {
        let Some(config) = B::config(config) else {
            return SyncOutcome::InvalidConfig;
        };
        match self.backend.capabilities(config).await {
            Ok(capabilities) if capabilities.is_supported() => SyncOutcome::Success,
            Ok(_) => SyncOutcome::ServerNotSupported,
            Err(error) => error.into(),
        }
    }
}

/// Provider for whichever built-in service is configured
pub enum CloudProvider<S> {
    Nextcloud(BackendSyncProvider<NextcloudBackend, S>),
    Webdav(BackendSyncProvider<WebdavBackend, S>),
}

impl<S: LocalStore> CloudProvider<S> {
    pub fn nextcloud(store: S) -> SyncResult<Self> {
        Ok(Self::Nextcloud(BackendSyncProvider::new(
            NextcloudBackend::new()?,
            store,
        )))
    }

    pub fn webdav(store: S) -> SyncResult<Self> {
        Ok(Self::Webdav(BackendSyncProvider::new(
            WebdavBackend::new()?,
            store,
        )))
    }
}

macro_rules! dispatch {
    ($self:ident, $provider:ident => $call:expr) => {
        match $self {
            Self::Nextcloud($provider) => $call.await,
            Self::Webdav($provider) => $call.await,
        }
    };
}

impl<S: LocalStore> SyncProvider for CloudProvider<S> {
    async fn sync(&self, config: &ProviderConfig) -> SyncOutcome {
        dispatch!(self, provider => provider.sync(config))
    }

    async fn create_note(&self, note: &Note, config: &ProviderConfig) -> SyncOutcome {
        dispatch!(self, provider => provider.create_note(note, config))
    }

    async fn update_note(&self, note: &Note, config: &ProviderConfig) -> SyncOutcome {
        dispatch!(self, provider => provider.update_note(note, config))
    }

    async fn delete_note(&self, note: &Note, config: &ProviderConfig) -> SyncOutcome {
        dispatch!(self, provider => provider.delete_note(note, config))
    }

    async fn move_note_to_bin(&self, note: &Note, config: &ProviderConfig) -> SyncOutcome {
        dispatch!(self, provider => provider.move_note_to_bin(note, config))
    }

    async fn restore_note(&self, note: &Note, config: &ProviderConfig) -> SyncOutcome {
        dispatch!(self, provider => provider.restore_note(note, config))
    }

    async fn authenticate(&self, config: &ProviderConfig) -> SyncOutcome {
        dispatch!(self, provider => provider.authenticate(config))
    }

    async fn is_server_compatible(&self, config: &ProviderConfig) -> SyncOutcome {
        dispatch!(self, provider => provider.is_server_compatible(config))
    }
}
