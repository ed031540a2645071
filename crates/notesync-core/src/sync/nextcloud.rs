//! Nextcloud Notes REST API backend

use serde::{Deserialize, Serialize};

use super::backend::{
    authorized, etag_header, http_client, quoted_etag, RemoteBackend, ServerCapabilities,
};
use super::config::{NextcloudConfig, ProviderConfig};
use super::result::{ensure_success, SyncError, SyncResult};
use super::RemoteNote;
use crate::models::CloudService;

const NOTES_PATH: &str = "index.php/apps/notes/api/v1/notes";
const CAPABILITIES_PATH: &str = "ocs/v2.php/cloud/capabilities";

/// Note as exchanged with the Nextcloud Notes API
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NextcloudNote {
    #[serde(default, skip_serializing)]
    pub id: i64,
    #[serde(default, skip_serializing)]
    pub etag: Option<String>,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub category: String,
    #[serde(default)]
    pub favorite: bool,
    #[serde(default)]
    pub modified: i64,
    #[serde(default, skip_serializing)]
    pub readonly: Option<bool>,
}

impl From<NextcloudNote> for RemoteNote {
    fn from(note: NextcloudNote) -> Self {
        Self {
            id: note.id,
            etag: note.etag,
            title: note.title,
            content: note.content,
            category: note.category,
            favorite: note.favorite,
            modified: note.modified,
            read_only: note.readonly,
        }
    }
}

impl From<&RemoteNote> for NextcloudNote {
    fn from(note: &RemoteNote) -> Self {
        Self {
            id: note.id,
            etag: note.etag.clone(),
            title: note.title.clone(),
            content: note.content.clone(),
            category: note.category.clone(),
            favorite: note.favorite,
            modified: note.modified,
            readonly: note.read_only,
        }
    }
}

#[derive(Debug, Deserialize)]
struct CapabilitiesEnvelope {
    ocs: CapabilitiesOcs,
}

#[derive(Debug, Deserialize)]
struct CapabilitiesOcs {
    data: CapabilitiesData,
}

#[derive(Debug, Deserialize)]
struct CapabilitiesData {
    capabilities: Capabilities,
}

#[derive(Debug, Deserialize)]
struct Capabilities {
    notes: Option<ServerCapabilities>,
}

/// Client for the Nextcloud Notes app
#[derive(Clone)]
pub struct NextcloudBackend {
    client: reqwest::Client,
}

impl NextcloudBackend {
    pub fn new() -> SyncResult<Self> {
        Ok(Self {
            client: http_client()?,
        })
    }

    #[must_use]
    pub const fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }

    fn notes_url(config: &NextcloudConfig) -> String {
        format!("{}{NOTES_PATH}", config.remote_address())
    }

    fn note_url(config: &NextcloudConfig, remote_id: i64) -> String {
        format!("{}/{remote_id}", Self::notes_url(config))
    }

    fn request(
        &self,
        method: reqwest::Method,
        url: &str,
        config: &NextcloudConfig,
    ) -> reqwest::RequestBuilder {
        authorized(
            self.client.request(method, url),
            config.authentication_headers(),
        )
        .header(reqwest::header::ACCEPT, "application/json")
    }

    /// Decode a single note, falling back to the `ETag` header for its version
    async fn read_note(response: reqwest::Response) -> SyncResult<RemoteNote> {
        let response = ensure_success(response).await?;
        let header_etag = etag_header(&response);
        let mut note = RemoteNote::from(response.json::<NextcloudNote>().await?);
        if note.etag.is_none() {
            note.etag = header_etag;
        }
        Ok(note)
    }
}

impl RemoteBackend for NextcloudBackend {
    type Config = NextcloudConfig;

    const SERVICE: CloudService = CloudService::Nextcloud;

    fn config(config: &ProviderConfig) -> Option<&Self::Config> {
        match config {
            ProviderConfig::Nextcloud(config) => Some(config),
            ProviderConfig::Webdav(_) => None,
        }
    }

    async fn list(&self, config: &NextcloudConfig) -> SyncResult<Vec<RemoteNote>> {
        let response = self
            .request(reqwest::Method::GET, &Self::notes_url(config), config)
            .send()
            .await?;
        let notes = ensure_success(response)
            .await?
            .json::<Vec<NextcloudNote>>()
            .await?;
        Ok(notes.into_iter().map(RemoteNote::from).collect())
    }

    async fn get(&self, config: &NextcloudConfig, remote_id: i64) -> SyncResult<RemoteNote> {
        let response = self
            .request(
                reqwest::Method::GET,
                &Self::note_url(config, remote_id),
                config,
            )
            .send()
            .await?;
        Self::read_note(response).await
    }

    async fn create(&self, config: &NextcloudConfig, note: &RemoteNote) -> SyncResult<RemoteNote> {
        let response = self
            .request(reqwest::Method::POST, &Self::notes_url(config), config)
            .json(&NextcloudNote::from(note))
            .send()
            .await?;
        let created = Self::read_note(response).await?;
        if created.id == 0 {
            return Err(SyncError::InvalidPayload(
                "created note has no id".to_string(),
            ));
        }
        Ok(created)
    }

    async fn update(
        &self,
        config: &NextcloudConfig,
        note: &RemoteNote,
        etag: Option<&str>,
    ) -> SyncResult<RemoteNote> {
        let mut request = self
            .request(reqwest::Method::PUT, &Self::note_url(config, note.id), config)
            .json(&NextcloudNote::from(note));
        if let Some(etag) = etag {
            request = request.header(reqwest::header::IF_MATCH, quoted_etag(etag));
        }
        Self::read_note(request.send().await?).await
    }

    async fn delete(&self, config: &NextcloudConfig, remote_id: i64) -> SyncResult<()> {
        let response = self
            .request(
                reqwest::Method::DELETE,
                &Self::note_url(config, remote_id),
                config,
            )
            .send()
            .await?;
        ensure_success(response).await?;
        Ok(())
    }

    async fn capabilities(&self, config: &NextcloudConfig) -> SyncResult<ServerCapabilities> {
        let url = format!("{}{CAPABILITIES_PATH}", config.remote_address());
        let response = self
            .request(reqwest::Method::GET, &url, config)
            .header("OCS-APIRequest", "true")
            .send()
            .await?;
        let envelope = ensure_success(response)
            .await?
            .json::<CapabilitiesEnvelope>()
            .await?;

        // Servers without the notes app omit the entry entirely
        envelope
            .ocs
            .data
            .capabilities
            .notes
            .ok_or(SyncError::ServerNotSupported)
    }

    async fn test_credentials(&self, config: &NextcloudConfig) -> SyncResult<()> {
        let response = self
            .request(reqwest::Method::GET, &Self::notes_url(config), config)
            .query(&[("exclude", "content,title,category,favorite,modified")])
            .send()
            .await?;
        ensure_success(response).await?;
        Ok(())
    }
}
