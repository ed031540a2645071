//! Synchronization with remote note services
//!
//! [`SyncManager`] is the entry point: it gates every request on the
//! current preferences and connectivity, then hands it to a single worker
//! task that runs the [`SyncProvider`] for the configured service.

mod backend;
mod config;
mod connectivity;
mod manager;
mod nextcloud;
mod provider;
mod result;
mod webdav;


pub use backend::{RemoteBackend, ServerCapabilities, MIN_SUPPORTED_VERSION};
pub use config::{AuthHeaders, NextcloudConfig, ProviderConfig, WebdavConfig};
pub use connectivity::{ConnectivityChecker, StaticConnectivity};
pub use manager::SyncManager;
pub use nextcloud::{NextcloudBackend, NextcloudNote};
pub use provider::{BackendSyncProvider, CloudProvider, SyncProvider};
pub use result::{SyncError, SyncOutcome, SyncResult};
pub use webdav::{WebdavBackend, WebdavNote};

use crate::models::{CloudService, SyncMode};
use crate::preferences::PreferenceSnapshot;

/// Backend-neutral view of a note on a remote service
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RemoteNote {
    /// Remote id, 0 until the note has been created remotely
    pub id: i64,
    pub etag: Option<String>,
    pub title: String,
    pub content: String,
    /// Notebook name, empty for none
    pub category: String,
    pub favorite: bool,
    /// Last modification (Unix seconds)
    pub modified: i64,
    pub read_only: Option<bool>,
}

/// Live sync settings derived from preferences
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncPrefs {
    pub enabled: bool,
    pub provider: Option<CloudService>,
    pub mode: SyncMode,
    pub config: Option<ProviderConfig>,
}

impl SyncPrefs {
    #[must_use]
    pub fn from_snapshot(snapshot: &PreferenceSnapshot) -> Self {
        let app = snapshot.app;
        match app.cloud_service {
            CloudService::Disabled => Self {
                enabled: false,
                provider: None,
                mode: app.sync_mode,
                config: None,
            },
            service => Self {
                enabled: true,
                provider: Some(service),
                mode: app.sync_mode,
                config: ProviderConfig::from_credentials(service, &snapshot.credentials),
            },
        }
    }
}
