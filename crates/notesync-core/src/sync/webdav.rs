//! WebDAV backend
//!
//! Notes are stored as one JSON document per note under `notes/`, named
//! after the note id (`notes/42.json`). Versions are the server's etags.

use reqwest::{Method, StatusCode};
use serde::{Deserialize, Serialize};

use super::backend::{authorized, etag_header, http_client, quoted_etag, unquote_etag, RemoteBackend};
use super::config::{ProviderConfig, WebdavConfig};
use super::result::{ensure_success, status_error, SyncError, SyncResult};
use super::RemoteNote;
use crate::models::CloudService;

const NOTES_DIR: &str = "notes/";

/// PUTs tried when another writer claims the chosen id first
const CREATE_ATTEMPTS: usize = 5;

const PROPFIND_BODY: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<d:propfind xmlns:d="DAV:">
  <d:prop>
    <d:getetag/>
  </d:prop>
</d:propfind>"#;

/// Note document stored on the WebDAV server
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WebdavNote {
    #[serde(default)]
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
    #[serde(default, rename = "readOnly", skip_serializing)]
    pub read_only: Option<bool>,
}

impl From<WebdavNote> for RemoteNote {
    fn from(note: WebdavNote) -> Self {
        Self {
            id: note.id,
            etag: note.etag,
            title: note.title,
            content: note.content,
            category: note.category,
            favorite: note.favorite,
            modified: note.modified,
            read_only: note.read_only,
        }
    }
}

impl From<&RemoteNote> for WebdavNote {
    fn from(note: &RemoteNote) -> Self {
        Self {
            id: note.id,
            etag: note.etag.clone(),
            title: note.title.clone(),
            content: note.content.clone(),
            category: note.category.clone(),
            favorite: note.favorite,
            modified: note.modified,
            read_only: note.read_only,
        }
    }
}

/// A note document found by PROPFIND
#[derive(Debug, Clone, PartialEq, Eq)]
struct DavEntry {
    id: i64,
    etag: Option<String>,
}

/// Client for note documents on a WebDAV share
#[derive(Clone)]
pub struct WebdavBackend {
    client: reqwest::Client,
}

impl WebdavBackend {
    pub fn new() -> SyncResult<Self> {
        Ok(Self {
            client: http_client()?,
        })
    }

    #[must_use]
    pub const fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }

    fn collection_url(config: &WebdavConfig) -> String {
        format!("{}{NOTES_DIR}", config.remote_address())
    }

    fn note_url(config: &WebdavConfig, remote_id: i64) -> String {
        format!("{}{remote_id}.json", Self::collection_url(config))
    }

    fn request(&self, method: Method, url: &str, config: &WebdavConfig) -> reqwest::RequestBuilder {
        authorized(
            self.client.request(method, url),
            config.authentication_headers(),
        )
    }

    async fn propfind(
        &self,
        config: &WebdavConfig,
        url: &str,
        depth: &str,
    ) -> SyncResult<reqwest::Response> {
        Ok(self
            .request(dav_method(b"PROPFIND")?, url, config)
            .header("Depth", depth)
            .header(reqwest::header::CONTENT_TYPE, "application/xml")
            .body(PROPFIND_BODY)
            .send()
            .await?)
    }

    /// Note documents in the collection; empty when the collection does not exist yet
    async fn list_entries(&self, config: &WebdavConfig) -> SyncResult<Vec<DavEntry>> {
        let response = self
            .propfind(config, &Self::collection_url(config), "1")
            .await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(Vec::new());
        }
        let text = ensure_success(response).await?.text().await?;
        parse_multistatus(&text)
    }

    async fn ensure_collection(&self, config: &WebdavConfig) -> SyncResult<()> {
        let response = self
            .request(dav_method(b"MKCOL")?, &Self::collection_url(config), config)
            .send()
            .await?;

        match response.status() {
            StatusCode::CREATED | StatusCode::OK | StatusCode::METHOD_NOT_ALLOWED => Ok(()),
            StatusCode::UNAUTHORIZED => Err(SyncError::Unauthorized),
            status => {
                // The following PUT reports the real failure if the collection is missing
                tracing::warn!("MKCOL {NOTES_DIR} returned {status}");
                Ok(())
            }
        }
    }

    /// Fetch a document; `etag` overrides the response header when already known
    async fn fetch(
        &self,
        config: &WebdavConfig,
        remote_id: i64,
        etag: Option<String>,
    ) -> SyncResult<RemoteNote> {
        let response = self
            .request(Method::GET, &Self::note_url(config, remote_id), config)
            .send()
            .await?;
        let response = ensure_success(response).await?;
        let header_etag = etag_header(&response);

        let document = response.text().await?;
        let mut note = serde_json::from_str::<WebdavNote>(&document).map_err(|e| {
            SyncError::InvalidPayload(format!("{remote_id}.json is not a note: {e}"))
        })?;
        note.id = remote_id;
        note.etag = etag.or(header_etag);
        Ok(note.into())
    }

    /// PUT a document and return the stored note with its new etag
    async fn put(
        &self,
        config: &WebdavConfig,
        note: &RemoteNote,
        precondition: (reqwest::header::HeaderName, String),
    ) -> SyncResult<RemoteNote> {
        let response = self
            .request(Method::PUT, &Self::note_url(config, note.id), config)
            .header(precondition.0, precondition.1)
            .json(&WebdavNote::from(note))
            .send()
            .await?;
        let response = ensure_success(response).await?;

        match etag_header(&response) {
            Some(etag) => Ok(RemoteNote {
                etag: Some(etag),
                ..note.clone()
            }),
            None => self.fetch(config, note.id, None).await,
        }
    }
}

impl RemoteBackend for WebdavBackend {
    type Config = WebdavConfig;

    const SERVICE: CloudService = CloudService::Webdav;

    fn config(config: &ProviderConfig) -> Option<&Self::Config> {
        match config {
            ProviderConfig::Webdav(config) => Some(config),
            ProviderConfig::Nextcloud(_) => None,
        }
    }

    async fn list(&self, config: &WebdavConfig) -> SyncResult<Vec<RemoteNote>> {
        let entries = self.list_entries(config).await?;

        let mut notes = Vec::with_capacity(entries.len());
        for entry in entries {
            notes.push(self.fetch(config, entry.id, entry.etag).await?);
        }
        Ok(notes)
    }

    async fn get(&self, config: &WebdavConfig, remote_id: i64) -> SyncResult<RemoteNote> {
        self.fetch(config, remote_id, None).await
    }

    async fn create(&self, config: &WebdavConfig, note: &RemoteNote) -> SyncResult<RemoteNote> {
        self.ensure_collection(config).await?;

        let entries = self.list_entries(config).await?;
        let mut candidate = next_remote_id(&entries, chrono::Utc::now().timestamp_millis());

        for _ in 0..CREATE_ATTEMPTS {
            let attempt = RemoteNote {
                id: candidate,
                ..note.clone()
            };
            match self
                .put(
                    config,
                    &attempt,
                    (reqwest::header::IF_NONE_MATCH, "*".to_string()),
                )
                .await
            {
                Err(SyncError::Api { status: 412, .. }) => {
                    tracing::debug!("Remote id {candidate} was taken, trying the next one");
                    candidate += 1;
                }
                result => return result,
            }
        }

        Err(SyncError::Api {
            status: StatusCode::PRECONDITION_FAILED.as_u16(),
            message: format!("No free note id after {CREATE_ATTEMPTS} attempts"),
        })
    }

    async fn update(
        &self,
        config: &WebdavConfig,
        note: &RemoteNote,
        etag: Option<&str>,
    ) -> SyncResult<RemoteNote> {
        if note.id == 0 {
            return Err(SyncError::Precondition(
                "Cannot update a note that has no remote id".to_string(),
            ));
        }

        // Without a known etag the document must at least exist already
        let precondition = etag.map_or_else(|| "*".to_string(), quoted_etag);
        self.put(config, note, (reqwest::header::IF_MATCH, precondition))
            .await
    }

    async fn delete(&self, config: &WebdavConfig, remote_id: i64) -> SyncResult<()> {
        let response = self
            .request(Method::DELETE, &Self::note_url(config, remote_id), config)
            .send()
            .await?;

        match response.status() {
            StatusCode::NOT_FOUND => Ok(()),
            status if status.is_success() => Ok(()),
            status => {
                let body = response.text().await.unwrap_or_default();
                Err(status_error(status, &body))
            }
        }
    }

    async fn test_credentials(&self, config: &WebdavConfig) -> SyncResult<()> {
        let response = self
            .propfind(config, config.remote_address(), "0")
            .await?;
        ensure_success(response).await?;
        Ok(())
    }
}

/// Id for a new document: the creation time in milliseconds, or above every
/// listed id when that is larger. Ids freed by deletions are never handed out again.
fn next_remote_id(entries: &[DavEntry], now_millis: i64) -> i64 {
    let above_listed = entries.iter().map(|entry| entry.id).max().unwrap_or(0) + 1;
    above_listed.max(now_millis)
}

fn dav_method(name: &'static [u8]) -> SyncResult<Method> {
    Method::from_bytes(name).map_err(|e| SyncError::InvalidPayload(e.to_string()))
}

/// Collect `<id>.json` entries from a PROPFIND multistatus document
fn parse_multistatus(xml: &str) -> SyncResult<Vec<DavEntry>> {
    let doc = roxmltree::Document::parse(xml)
        .map_err(|e| SyncError::InvalidPayload(format!("PROPFIND response: {e}")))?;

    let mut entries = Vec::new();
    for response in doc.descendants().filter(|n| n.has_tag_name("response")) {
        let href = response
            .descendants()
            .find(|n| n.has_tag_name("href"))
            .and_then(|n| n.text())
            .unwrap_or("");

        let Some(id) = href
            .rsplit('/')
            .find(|segment| !segment.is_empty())
            .and_then(|name| name.strip_suffix(".json"))
            .and_then(|stem| stem.parse::<i64>().ok())
        else {
            continue;
        };

        let etag = response
            .descendants()
            .find(|n| n.has_tag_name("getetag"))
            .and_then(|n| n.text())
            .map(unquote_etag)
            .filter(|etag| !etag.is_empty());

        entries.push(DavEntry { id, etag });
    }

    Ok(entries)
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::prelude::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    const LISTING: &str = r#"<?xml version="1.0"?>
<d:multistatus xmlns:d="DAV:">
  <d:response>
    <d:href>/notes/</d:href>
    <d:propstat><d:prop><d:getetag>"dir"</d:getetag></d:prop></d:propstat>
  </d:response>
  <d:response>
    <d:href>/notes/1.json</d:href>
    <d:propstat><d:prop><d:getetag>"e1"</d:getetag></d:prop></d:propstat>
  </d:response>
  <d:response>
    <d:href>/notes/3.json</d:href>
    <d:propstat><d:prop><d:getetag>W/"e3"</d:getetag></d:prop></d:propstat>
  </d:response>
  <d:response>
    <d:href>/notes/readme.txt</d:href>
    <d:propstat><d:prop><d:getetag>"x"</d:getetag></d:prop></d:propstat>
  </d:response>
</d:multistatus>"#;

    fn config(server: &MockServer) -> WebdavConfig {
        WebdavConfig::new(server.base_url(), "bob", "hunter2")
    }

    #[test]
    fn test_parse_multistatus_keeps_numbered_json_documents() {
        let entries = parse_multistatus(LISTING).unwrap();
        assert_eq!(
            entries,
            vec![
                DavEntry {
                    id: 1,
                    etag: Some("e1".to_string())
                },
                DavEntry {
                    id: 3,
                    etag: Some("e3".to_string())
                },
            ]
        );
    }

    #[test]
    fn test_parse_multistatus_rejects_garbage() {
        assert!(matches!(
            parse_multistatus("<not-closed"),
            Err(SyncError::InvalidPayload(_))
        ));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_list_fetches_each_document() {
        let server = MockServer::start_async().await;
        let propfind = server
            .mock_async(|when, then| {
                when.path("/notes/").header("depth", "1");
                then.status(207)
                    .header("content-type", "application/xml")
                    .body(LISTING);
            })
            .await;
        for (id, title) in [(1, "First"), (3, "Third")] {
            server
                .mock_async(move |when, then| {
                    when.method(GET).path(format!("/notes/{id}.json"));
                    then.status(200).json_body(json!({
                        "id": id,
                        "title": title,
                        "content": "",
                        "category": "",
                        "favorite": false,
                        "modified": 5
                    }));
                })
                .await;
        }

        let notes = WebdavBackend::new()
            .unwrap()
            .list(&config(&server))
            .await
            .unwrap();

        propfind.assert_async().await;
        assert_eq!(notes.len(), 2);
        assert_eq!(notes[0].title, "First");
        assert_eq!(notes[0].etag.as_deref(), Some("e1"));
        assert_eq!(notes[1].id, 3);
        assert_eq!(notes[1].etag.as_deref(), Some("e3"));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_list_missing_collection_is_empty() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.path("/notes/").header("depth", "1");
                then.status(404);
            })
            .await;

        let notes = WebdavBackend::new()
            .unwrap()
            .list(&config(&server))
            .await
            .unwrap();
        assert!(notes.is_empty());
    }

    fn listing(ids: &[i64]) -> String {
        let responses = ids
            .iter()
            .map(|id| {
                format!(
                    "<d:response><d:href>/notes/{id}.json</d:href>\
                     <d:propstat><d:prop><d:getetag>\"e{id}\"</d:getetag></d:prop></d:propstat>\
                     </d:response>"
                )
            })
            .collect::<String>();
        format!(r#"<?xml version="1.0"?><d:multistatus xmlns:d="DAV:">{responses}</d:multistatus>"#)
    }

    async fn mock_listing(server: &MockServer, ids: &[i64]) {
        let body = listing(ids);
        server
            .mock_async(move |when, then| {
                when.path("/notes/").header("depth", "1");
                then.status(207).body(body);
            })
            .await;
    }

    #[test]
    fn test_next_remote_id_never_reuses_freed_ids() {
        let only_first = [DavEntry { id: 1, etag: None }];
        assert_eq!(next_remote_id(&only_first, 5_000), 5_000);

        let ahead_of_clock = [DavEntry {
            id: 9_000,
            etag: None,
        }];
        assert_eq!(next_remote_id(&ahead_of_clock, 5_000), 9_001);
        assert_eq!(next_remote_id(&[], 5_000), 5_000);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_create_skips_id_of_deleted_document() {
        let server = MockServer::start_async().await;
        // 2.json was deleted, only 1.json is left
        mock_listing(&server, &[1]).await;
        let put = server
            .mock_async(|when, then| {
                when.method(PUT)
                    .path_matches(regex::Regex::new(r"^/notes/\d+\.json$").unwrap())
                    .header("if-none-match", "*")
                    .header("authorization", "Basic Ym9iOmh1bnRlcjI=")
                    .json_body_partial(r#"{"title":"Fresh"}"#);
                then.status(201).header("etag", "\"new\"");
            })
            .await;

        let before = chrono::Utc::now().timestamp_millis();
        let note = RemoteNote {
            title: "Fresh".to_string(),
            ..RemoteNote::default()
        };
        let created = WebdavBackend::new()
            .unwrap()
            .create(&config(&server), &note)
            .await
            .unwrap();

        put.assert_async().await;
        assert_ne!(created.id, 2);
        assert!(created.id >= before);
        assert_eq!(created.etag.as_deref(), Some("new"));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_create_moves_past_listed_ids_and_taken_ids() {
        const HIGHEST: i64 = 99_999_999_999_999;

        let server = MockServer::start_async().await;
        mock_listing(&server, &[1, HIGHEST]).await;
        let taken = server
            .mock_async(|when, then| {
                when.method(PUT)
                    .path(format!("/notes/{}.json", HIGHEST + 1))
                    .header("if-none-match", "*");
                then.status(412);
            })
            .await;
        let put = server
            .mock_async(|when, then| {
                when.method(PUT)
                    .path(format!("/notes/{}.json", HIGHEST + 2))
                    .header("if-none-match", "*")
                    .json_body_partial(format!(r#"{{"id":{},"title":"Fresh"}}"#, HIGHEST + 2));
                then.status(201).header("etag", "\"e-new\"");
            })
            .await;

        let note = RemoteNote {
            title: "Fresh".to_string(),
            ..RemoteNote::default()
        };
        let created = WebdavBackend::new()
            .unwrap()
            .create(&config(&server), &note)
            .await
            .unwrap();

        taken.assert_async().await;
        put.assert_async().await;
        assert_eq!(created.id, HIGHEST + 2);
        assert_eq!(created.etag.as_deref(), Some("e-new"));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_list_takes_id_from_file_name() {
        let server = MockServer::start_async().await;
        mock_listing(&server, &[6]).await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/notes/6.json");
                then.status(200)
                    .json_body(json!({ "title": "Hand written", "modified": 3 }));
            })
            .await;

        let notes = WebdavBackend::new()
            .unwrap()
            .list(&config(&server))
            .await
            .unwrap();

        assert_eq!(notes.len(), 1);
        assert_eq!(notes[0].id, 6);
        assert_eq!(notes[0].title, "Hand written");
        assert_eq!(notes[0].etag.as_deref(), Some("e6"));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_update_without_etag_header_refetches() {
        let server = MockServer::start_async().await;
        let put = server
            .mock_async(|when, then| {
                when.method(PUT)
                    .path("/notes/3.json")
                    .header("if-match", "\"e3\"");
                then.status(204);
            })
            .await;
        let get = server
            .mock_async(|when, then| {
                when.method(GET).path("/notes/3.json");
                then.status(200).header("etag", "\"e3b\"").json_body(json!({
                    "id": 3,
                    "title": "Third",
                    "content": "edited",
                    "category": "",
                    "favorite": false,
                    "modified": 9
                }));
            })
            .await;

        let note = RemoteNote {
            id: 3,
            title: "Third".to_string(),
            content: "edited".to_string(),
            modified: 9,
            ..RemoteNote::default()
        };
        let updated = WebdavBackend::new()
            .unwrap()
            .update(&config(&server), &note, Some("e3"))
            .await
            .unwrap();

        put.assert_async().await;
        get.assert_async().await;
        assert_eq!(updated.etag.as_deref(), Some("e3b"));
        assert_eq!(updated.content, "edited");
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_delete_treats_missing_document_as_deleted() {
        let server = MockServer::start_async().await;
        let delete = server
            .mock_async(|when, then| {
                when.method(DELETE).path("/notes/8.json");
                then.status(404);
            })
            .await;

        WebdavBackend::new()
            .unwrap()
            .delete(&config(&server), 8)
            .await
            .unwrap();
        delete.assert_async().await;
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_capabilities_are_not_supported() {
        let server = MockServer::start_async().await;
        let error = WebdavBackend::new()
            .unwrap()
            .capabilities(&config(&server))
            .await
            .unwrap_err();
        assert!(matches!(error, SyncError::OperationNotSupported));
    }
}
