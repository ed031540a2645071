//! Reactive preference store
//!
//! Holds app preferences and sync credentials in a `watch` channel so the
//! sync manager can recompute its settings on every change. When backed by
//! a [`LibSqlSettingsRepository`] each write is persisted before it is
//! published.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::watch;

use crate::db::{LibSqlSettingsRepository, SettingsRepository};
use crate::error::Result;
use crate::models::{AppPreferences, BackgroundSync, CloudService, SyncMode};

/// Storage keys for sync credentials
pub mod keys {
    pub const NEXTCLOUD_INSTANCE_URL: &str = "NEXTCLOUD_INSTANCE_URL";
    pub const NEXTCLOUD_USERNAME: &str = "NEXTCLOUD_USERNAME";
    pub const NEXTCLOUD_PASSWORD: &str = "NEXTCLOUD_PASSWORD";
    pub const WEBDAV_INSTANCE_URL: &str = "WEBDAV_INSTANCE_URL";
    pub const WEBDAV_USERNAME: &str = "WEBDAV_USERNAME";
    pub const WEBDAV_PASSWORD: &str = "WEBDAV_PASSWORD";

    pub const ALL: [&str; 6] = [
        NEXTCLOUD_INSTANCE_URL,
        NEXTCLOUD_USERNAME,
        NEXTCLOUD_PASSWORD,
        WEBDAV_INSTANCE_URL,
        WEBDAV_USERNAME,
        WEBDAV_PASSWORD,
    ];
}

/// Current preferences plus credential strings
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PreferenceSnapshot {
    pub app: AppPreferences,
    pub credentials: HashMap<String, String>,
}

/// Preference store shared between the host and the sync manager
#[derive(Clone)]
pub struct PreferenceRepository {
    state: Arc<watch::Sender<PreferenceSnapshot>>,
    settings: Option<LibSqlSettingsRepository>,
}

impl PreferenceRepository {
    /// Preferences that live only for the lifetime of the process
    #[must_use]
    pub fn in_memory(initial: PreferenceSnapshot) -> Self {
        let (state, _) = watch::channel(initial);
        Self {
            state: Arc::new(state),
            settings: None,
        }
    }

    /// Load preferences and credentials from the settings table
    pub async fn load(settings: LibSqlSettingsRepository) -> Result<Self> {
        let app = settings.load_preferences().await?;

        let mut credentials = HashMap::new();
        for key in keys::ALL {
            if let Some(value) = settings.get_value(key).await? {
                credentials.insert(key.to_string(), value);
            }
        }

        let (state, _) = watch::channel(PreferenceSnapshot { app, credentials });
        Ok(Self {
            state: Arc::new(state),
            settings: Some(settings),
        })
    }

    /// Receive the current snapshot and every later change
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<PreferenceSnapshot> {
        self.state.subscribe()
    }

    #[must_use]
    pub fn get_app_preferences(&self) -> AppPreferences {
        self.state.borrow().app
    }

    /// Read a stored credential.
    ///
    /// Values are kept as given; encryption at rest is up to the host.
    #[must_use]
    pub fn get_encrypted_string(&self, key: &str) -> Option<String> {
        self.state.borrow().credentials.get(key).cloned()
    }

    /// Store several credentials and publish them together
    pub async fn put_encrypted_strings(&self, entries: &[(&str, &str)]) -> Result<()> {
        let entries = entries
            .iter()
            .map(|(key, value)| ((*key).to_string(), (*value).to_string()))
            .collect::<Vec<_>>();

        if let Some(settings) = &self.settings {
            settings.put_values(&entries).await?;
        }

        self.state.send_if_modified(|snapshot| {
            let mut changed = false;
            for (key, value) in entries {
                if snapshot.credentials.get(&key) != Some(&value) {
                    snapshot.credentials.insert(key, value);
                    changed = true;
                }
            }
            changed
        });
        Ok(())
    }

    pub async fn set_cloud_service(&self, cloud_service: CloudService) -> Result<()> {
        self.update_app(|app| app.cloud_service = cloud_service).await
    }

    pub async fn set_sync_mode(&self, sync_mode: SyncMode) -> Result<()> {
        self.update_app(|app| app.sync_mode = sync_mode).await
    }

    pub async fn set_background_sync(&self, background_sync: BackgroundSync) -> Result<()> {
        self.update_app(|app| app.background_sync = background_sync).await
    }

    async fn update_app(&self, change: impl FnOnce(&mut AppPreferences)) -> Result<()> {
        let mut app = self.get_app_preferences();
        change(&mut app);

        if let Some(settings) = &self.settings {
            settings.save_preferences(&app).await?;
        }

        self.state.send_if_modified(|snapshot| {
            if snapshot.app == app {
                false
            } else {
                snapshot.app = app;
                true
            }
        });
        Ok(())
    }
}
