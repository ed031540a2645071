//! Sync-related application preferences

use serde::{Deserialize, Serialize};

/// Which cloud backend notes are synced with
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum CloudService {
    /// Sync turned off
    #[default]
    Disabled,
    /// Nextcloud Notes REST API
    Nextcloud,
    /// Plain WebDAV collection
    Webdav,
}

impl CloudService {
    /// Stable name used in storage
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Disabled => "disabled",
            Self::Nextcloud => "nextcloud",
            Self::Webdav => "webdav",
        }
    }

    /// Parse a stored name, `None` for unknown values
    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "disabled" => Some(Self::Disabled),
            "nextcloud" => Some(Self::Nextcloud),
            "webdav" => Some(Self::Webdav),
            _ => None,
        }
    }
}

/// Network condition required before sync may run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum SyncMode {
    /// Any available network
    #[default]
    Always,
    /// Unmetered networks only
    Wifi,
}

impl SyncMode {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Always => "always",
            Self::Wifi => "wifi",
        }
    }

    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "always" => Some(Self::Always),
            "wifi" => Some(Self::Wifi),
            _ => None,
        }
    }
}

/// Whether a periodic background sync should run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum BackgroundSync {
    #[default]
    Enabled,
    Disabled,
}

impl BackgroundSync {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Enabled => "enabled",
            Self::Disabled => "disabled",
        }
    }

    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "enabled" | "true" | "on" => Some(Self::Enabled),
            "disabled" | "false" | "off" => Some(Self::Disabled),
            _ => None,
        }
    }
}

/// Preferences that drive synchronization
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct AppPreferences {
    pub cloud_service: CloudService,
    pub sync_mode: SyncMode,
    pub background_sync: BackgroundSync,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_preferences_default() {
        let prefs = AppPreferences::default();
        assert_eq!(prefs.cloud_service, CloudService::Disabled);
        assert_eq!(prefs.sync_mode, SyncMode::Always);
        assert_eq!(prefs.background_sync, BackgroundSync::Enabled);
    }

    #[test]
    fn test_cloud_service_parse_round_trips_names() {
        for service in [CloudService::Disabled, CloudService::Nextcloud, CloudService::Webdav] {
            assert_eq!(CloudService::parse(service.as_str()), Some(service));
        }
        assert_eq!(CloudService::parse(" NextCloud "), Some(CloudService::Nextcloud));
        assert_eq!(CloudService::parse("dropbox"), None);
    }

    #[test]
    fn test_serde_uses_lowercase_names() {
        let json = serde_json::to_string(&SyncMode::Wifi).unwrap();
        assert_eq!(json, "\"wifi\"");
    }
}
