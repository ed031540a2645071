//! Sync outcomes and internal sync errors

use std::fmt;

use reqwest::StatusCode;
use serde::Deserialize;
use thiserror::Error;

use crate::util::compact_text;

/// Result of every public sync operation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncOutcome {
    Success,
    SyncingNotEnabled,
    InvalidConfig,
    NoConnectivity,
    Unauthorized,
    ServerNotSupported,
    ApiError { message: String, status: u16 },
    GenericError(String),
    OperationNotSupported,
}

impl SyncOutcome {
    #[must_use]
    pub const fn is_success(&self) -> bool {
        matches!(self, Self::Success)
    }
}

impl fmt::Display for SyncOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Success => write!(f, "Notes synced"),
            Self::SyncingNotEnabled => write!(f, "Syncing is not enabled"),
            Self::InvalidConfig => write!(f, "Sync settings are incomplete or invalid"),
            Self::NoConnectivity => write!(f, "No suitable network connection"),
            Self::Unauthorized => write!(f, "The server rejected the credentials"),
            Self::ServerNotSupported => write!(f, "The server is not supported"),
            Self::ApiError { message, status } => write!(f, "Server error {status}: {message}"),
            Self::GenericError(message) => write!(f, "{message}"),
            Self::OperationNotSupported => write!(f, "The server does not support this operation"),
        }
    }
}

/// Errors raised while talking to a backend or the local store
#[derive(Debug, Error)]
pub enum SyncError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("API error ({status}): {message}")]
    Api { status: u16, message: String },
    #[error("Unauthorized")]
    Unauthorized,
    #[error("Server not supported")]
    ServerNotSupported,
    #[error("Operation not supported")]
    OperationNotSupported,
    #[error("Invalid payload: {0}")]
    InvalidPayload(String),
    #[error("Precondition failed: {0}")]
    Precondition(String),
    #[error("Local store error: {0}")]
    Store(#[from] crate::Error),
    #[error("Sync worker stopped")]
    WorkerStopped,
}

pub type SyncResult<T> = Result<T, SyncError>;

impl From<SyncError> for SyncOutcome {
    fn from(error: SyncError) -> Self {
        match error {
            SyncError::Unauthorized => Self::Unauthorized,
            SyncError::Http(e) if e.status() == Some(StatusCode::UNAUTHORIZED) => {
                Self::Unauthorized
            }
            SyncError::Http(e) if e.status().is_some() => Self::ApiError {
                status: e.status().map_or(0, |status| status.as_u16()),
                message: e.to_string(),
            },
            SyncError::Api { status, message } => Self::ApiError { message, status },
            SyncError::ServerNotSupported => Self::ServerNotSupported,
            SyncError::OperationNotSupported => Self::OperationNotSupported,
            SyncError::Precondition(message) => Self::GenericError(message),
            other => Self::GenericError(other.to_string()),
        }
    }
}

impl<T> From<SyncResult<T>> for SyncOutcome {
    fn from(result: SyncResult<T>) -> Self {
        match result {
            Ok(_) => Self::Success,
            Err(error) => error.into(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    error: Option<String>,
    message: Option<String>,
}

/// Map a non-success response into a `SyncError`
pub(crate) fn status_error(status: StatusCode, body: &str) -> SyncError {
    if status == StatusCode::UNAUTHORIZED {
        return SyncError::Unauthorized;
    }

    let message = serde_json::from_str::<ApiErrorBody>(body)
        .ok()
        .and_then(|payload| payload.message.or(payload.error))
        .map(|message| compact_text(&message))
        .filter(|message| !message.is_empty())
        .or_else(|| {
            let trimmed = compact_text(body);
            (!trimmed.is_empty()).then_some(trimmed)
        })
        .unwrap_or_else(|| {
            status
                .canonical_reason()
                .unwrap_or("Unexpected response")
                .to_string()
        });

    SyncError::Api {
        status: status.as_u16(),
        message,
    }
}

/// Return the response unchanged when successful, otherwise read the body into an error
pub(crate) async fn ensure_success(response: reqwest::Response) -> SyncResult<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(status_error(status, &body))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_unauthorized_status_maps_to_unauthorized() {
        let outcome = SyncOutcome::from(status_error(StatusCode::UNAUTHORIZED, ""));
        assert_eq!(outcome, SyncOutcome::Unauthorized);
    }

    #[test]
    fn test_api_error_prefers_json_message() {
        let error = status_error(StatusCode::BAD_REQUEST, r#"{"message":" bad title "}"#);
        assert_eq!(
            SyncOutcome::from(error),
            SyncOutcome::ApiError {
                message: "bad title".to_string(),
                status: 400
            }
        );
    }

    #[test]
    fn test_api_error_falls_back_to_body_then_reason() {
        let error = status_error(StatusCode::PRECONDITION_FAILED, "etag mismatch");
        assert!(matches!(error, SyncError::Api { status: 412, ref message } if message == "etag mismatch"));

        let error = status_error(StatusCode::INTERNAL_SERVER_ERROR, "   ");
        assert!(
            matches!(error, SyncError::Api { status: 500, ref message } if message == "Internal Server Error")
        );
    }

    #[test]
    fn test_other_errors_become_generic() {
        let outcome = SyncOutcome::from(SyncError::InvalidPayload("missing id".to_string()));
        assert_eq!(
            outcome,
            SyncOutcome::GenericError("Invalid payload: missing id".to_string())
        );
        assert_eq!(
            SyncOutcome::from(SyncError::ServerNotSupported),
            SyncOutcome::ServerNotSupported
        );
        assert!(SyncOutcome::from(Ok::<_, SyncError>(())).is_success());
    }
}
