//! Capability trait implemented by each cloud backend

use std::future::Future;
use std::time::Duration;

use serde::Deserialize;

use super::config::{AuthHeaders, ProviderConfig};
use super::result::{SyncError, SyncResult};
use super::RemoteNote;
use crate::models::CloudService;

/// Lowest notes API major version the reconciliation logic understands
pub const MIN_SUPPORTED_VERSION: f64 = 1.0;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Network operations of one backend.
///
/// Implementations are stateless between calls apart from their HTTP
/// client; every call receives the account to act on.
pub trait RemoteBackend: Send + Sync + 'static {
    /// Account settings this backend understands
    type Config: Send + Sync;

    /// Service this backend talks to
    const SERVICE: CloudService;

    /// Pick this backend's variant out of a `ProviderConfig`
    fn config(config: &ProviderConfig) -> Option<&Self::Config>;

    fn list(&self, config: &Self::Config) -> impl Future<Output = SyncResult<Vec<RemoteNote>>> + Send;

    fn get(
        &self,
        config: &Self::Config,
        remote_id: i64,
    ) -> impl Future<Output = SyncResult<RemoteNote>> + Send;

    /// Create `note` remotely; the returned note carries the assigned id and etag
    fn create(
        &self,
        config: &Self::Config,
        note: &RemoteNote,
    ) -> impl Future<Output = SyncResult<RemoteNote>> + Send;

    /// Overwrite `note`, sending `etag` as an `If-Match` precondition when known
    fn update(
        &self,
        config: &Self::Config,
        note: &RemoteNote,
        etag: Option<&str>,
    ) -> impl Future<Output = SyncResult<RemoteNote>> + Send;

    fn delete(
        &self,
        config: &Self::Config,
        remote_id: i64,
    ) -> impl Future<Output = SyncResult<()>> + Send;

    fn capabilities(
        &self,
        _config: &Self::Config,
    ) -> impl Future<Output = SyncResult<ServerCapabilities>> + Send {
        async { Err(SyncError::OperationNotSupported) }
    }

    /// Cheapest authenticated request the server answers
    fn test_credentials(&self, config: &Self::Config) -> impl Future<Output = SyncResult<()>> + Send;
}

/// Notes app capabilities advertised by the server
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct ServerCapabilities {
    #[serde(default)]
    pub api_version: Vec<String>,
    #[serde(default)]
    pub version: Option<String>,
}

impl ServerCapabilities {
    /// Whether any advertised API version is at least `MIN_SUPPORTED_VERSION`
    #[must_use]
    pub fn is_supported(&self) -> bool {
        self.api_version
            .iter()
            .filter_map(|version| version.trim().parse::<f64>().ok())
            .any(|version| version >= MIN_SUPPORTED_VERSION)
    }
}

/// HTTP client shared by the built-in backends
pub(crate) fn http_client() -> SyncResult<reqwest::Client> {
    Ok(reqwest::Client::builder().timeout(REQUEST_TIMEOUT).build()?)
}

/// Attach the account's authentication headers
pub(crate) fn authorized(
    request: reqwest::RequestBuilder,
    headers: &AuthHeaders,
) -> reqwest::RequestBuilder {
    headers
        .iter()
        .fold(request, |request, (name, value)| request.header(name, value))
}

/// Read an `ETag` header without its surrounding quotes
pub(crate) fn etag_header(response: &reqwest::Response) -> Option<String> {
    response
        .headers()
        .get(reqwest::header::ETAG)
        .and_then(|value| value.to_str().ok())
        .map(unquote_etag)
        .filter(|etag| !etag.is_empty())
}

pub(crate) fn unquote_etag(etag: &str) -> String {
    etag.trim()
        .trim_start_matches("W/")
        .trim_matches('"')
        .to_string()
}

/// `If-Match` value for a stored etag
pub(crate) fn quoted_etag(etag: &str) -> String {
    format!("\"{}\"", unquote_etag(etag))
}
