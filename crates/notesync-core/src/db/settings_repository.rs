//! Settings repository implementation

use std::future::Future;

use libsql::Connection;

use crate::error::Result;
use crate::models::{AppPreferences, BackgroundSync, CloudService, SyncMode};

const CLOUD_SERVICE_KEY: &str = "cloud_service";
const SYNC_MODE_KEY: &str = "sync_mode";
const BACKGROUND_SYNC_KEY: &str = "background_sync";

/// Trait for key/value settings storage
pub trait SettingsRepository: Send + Sync {
    /// Load app preferences, falling back to defaults for missing or unknown values
    fn load_preferences(&self) -> impl Future<Output = Result<AppPreferences>> + Send;

    /// Persist app preferences
    fn save_preferences(
        &self,
        preferences: &AppPreferences,
    ) -> impl Future<Output = Result<()>> + Send;

    /// Read a raw value
    fn get_value(&self, key: &str) -> impl Future<Output = Result<Option<String>>> + Send;

    /// Write several raw values in one transaction
    fn put_values(&self, entries: &[(String, String)]) -> impl Future<Output = Result<()>> + Send;
}

/// libSQL implementation of `SettingsRepository`
#[derive(Clone)]
pub struct LibSqlSettingsRepository {
    conn: Connection,
}

impl LibSqlSettingsRepository {
    /// Create a new repository with the given connection
    pub const fn new(conn: Connection) -> Self {
        Self { conn }
    }

    async fn set_setting(&self, key: &str, value: &str) -> Result<()> {
        self.conn
            .execute(
                "INSERT OR REPLACE INTO settings (key, value) VALUES (?1, ?2)",
                [key, value],
            )
            .await?;
        Ok(())
    }
}

impl SettingsRepository for LibSqlSettingsRepository {
    async fn load_preferences(&self) -> Result<AppPreferences> {
        let mut preferences = AppPreferences::default();

        if let Some(value) = self.get_value(CLOUD_SERVICE_KEY).await? {
            match CloudService::parse(&value) {
                Some(service) => preferences.cloud_service = service,
                None => tracing::warn!("Ignoring unknown cloud service '{value}'"),
            }
        }

        if let Some(mode) = self
            .get_value(SYNC_MODE_KEY)
            .await?
            .as_deref()
            .and_then(SyncMode::parse)
        {
            preferences.sync_mode = mode;
        }

        if let Some(background) = self
            .get_value(BACKGROUND_SYNC_KEY)
            .await?
            .as_deref()
            .and_then(BackgroundSync::parse)
        {
            preferences.background_sync = background;
        }

        Ok(preferences)
    }

    async fn save_preferences(&self, preferences: &AppPreferences) -> Result<()> {
        self.put_values(&[
            (
                CLOUD_SERVICE_KEY.to_string(),
                preferences.cloud_service.as_str().to_string(),
            ),
            (
                SYNC_MODE_KEY.to_string(),
                preferences.sync_mode.as_str().to_string(),
            ),
            (
                BACKGROUND_SYNC_KEY.to_string(),
                preferences.background_sync.as_str().to_string(),
            ),
        ])
        .await
    }

    async fn get_value(&self, key: &str) -> Result<Option<String>> {
        let mut rows = self
            .conn
            .query("SELECT value FROM settings WHERE key = ?1", [key])
            .await?;

        match rows.next().await? {
            Some(row) => Ok(Some(row.get(0)?)),
            None => Ok(None),
        }
    }

    async fn put_values(&self, entries: &[(String, String)]) -> Result<()> {
        self.conn.execute("BEGIN TRANSACTION", ()).await?;

        for (key, value) in entries {
            if let Err(e) = self.set_setting(key, value).await {
                self.conn.execute("ROLLBACK", ()).await.ok();
                return Err(e);
            }
        }

        if let Err(e) = self.conn.execute("COMMIT", ()).await {
            self.conn.execute("ROLLBACK", ()).await.ok();
            return Err(e.into());
        }
        Ok(())
    }
}
