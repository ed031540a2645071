//! Local/remote identifier mapping model

use serde::{Deserialize, Serialize};

use super::{CloudService, NoteId};

/// Associates one local note with its counterpart on one provider.
///
/// A mapping moves through these states:
///
/// - synced: `provider` and `remote_note_id` set
/// - locally deleted: `is_deleted_locally` set, remote delete pending
/// - unassigned: `provider` and `remote_note_id` cleared (note moved to bin
///   or deleted remotely)
///
/// `is_being_updated` is a transient guard held while an update call is in
/// flight.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdMapping {
    /// Row identifier, 0 until inserted
    pub mapping_id: i64,
    pub local_note_id: NoteId,
    /// `None` once the remote counterpart is gone or was never created
    pub remote_note_id: Option<i64>,
    /// `None` once the provider association is cleared
    pub provider: Option<CloudService>,
    /// Opaque version token (HTTP etag)
    pub extras: Option<String>,
    pub is_deleted_locally: bool,
    pub is_being_updated: bool,
}

impl IdMapping {
    /// Mapping for a note that exists on `provider` as `remote_note_id`
    #[must_use]
    pub const fn synced(
        local_note_id: NoteId,
        remote_note_id: i64,
        provider: CloudService,
        extras: Option<String>,
    ) -> Self {
        Self {
            mapping_id: 0,
            local_note_id,
            remote_note_id: Some(remote_note_id),
            provider: Some(provider),
            extras,
            is_deleted_locally: false,
            is_being_updated: false,
        }
    }

    /// Whether the next sync should delete the remote counterpart
    #[must_use]
    pub const fn is_pending_remote_delete(&self) -> bool {
        self.is_deleted_locally && self.remote_note_id.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_synced_mapping() {
        let mapping = IdMapping::synced(NoteId(7), 42, CloudService::Nextcloud, Some("t1".into()));
        assert_eq!(mapping.remote_note_id, Some(42));
        assert_eq!(mapping.provider, Some(CloudService::Nextcloud));
        assert!(!mapping.is_pending_remote_delete());
    }

    #[test]
    fn test_pending_remote_delete_needs_remote_id() {
        let mut mapping = IdMapping::synced(NoteId(1), 3, CloudService::Webdav, None);
        mapping.is_deleted_locally = true;
        assert!(mapping.is_pending_remote_delete());

        mapping.remote_note_id = None;
        assert!(!mapping.is_pending_remote_delete());
    }
}
