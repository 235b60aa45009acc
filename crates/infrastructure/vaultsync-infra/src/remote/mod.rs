use crate::auth::AuthError;
use crate::hashing::HashError;
use camino::Utf8Path;
use serde::Deserialize;
use vaultsync_core::{FailureKind, RemoteEntry};

/// HTTP statuses that are always safe to retry.
pub const TRANSIENT_STATUSES: &[u16] = &[429, 500, 502, 503, 504];

/// Drive signals quota exhaustion as 403 with one of these reasons.
pub const RATE_LIMIT_REASONS: &[&str] = &["rateLimitExceeded", "userRateLimitExceeded"];

#[derive(Debug, thiserror::Error)]
pub enum RemoteError {
    #[error("HTTP {status}: {message}")]
    Status {
        status: u16,
        reason: Option<String>,
        message: String,
    },
    #[error("transport error: {message}")]
    Transport { message: String, retryable: bool },
    #[error("unexpected response: {0}")]
    Protocol(String),
    #[error("content mismatch for {id}: expected {expected}, got {actual}")]
    Integrity {
        id: String,
        expected: String,
        actual: String,
    },
    #[error("authentication failed: {0}")]
    Auth(#[from] AuthError),
    #[error("local IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("gave up after {attempts} attempts: {last}")]
    Exhausted {
        attempts: u32,
        last: Box<RemoteError>,
    },
}

#[derive(Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Deserialize)]
struct ErrorBody {
    #[serde(default)]
    message: String,
    #[serde(default)]
    errors: Vec<ErrorDetail>,
}

#[derive(Deserialize)]
struct ErrorDetail {
    #[serde(default)]
    reason: Option<String>,
}

impl RemoteError {
    /// Build a status error from a Drive-style JSON error body. Falls back to the
    /// raw body when it is not JSON.
    pub fn from_status_body(status: u16, body: &str) -> Self {
        match serde_json::from_str::<ErrorEnvelope>(body) {
            Ok(env) => RemoteError::Status {
                status,
                reason: env.error.errors.into_iter().find_map(|e| e.reason),
                message: env.error.message,
            },
            Err(_) => RemoteError::Status {
                status,
                reason: None,
                message: body.trim().chars().take(512).collect(),
            },
        }
    }

    pub fn is_transient(&self) -> bool {
        match self {
            RemoteError::Status { status, reason, .. } => {
                TRANSIENT_STATUSES.contains(status)
                    || (*status == 403
                        && reason
                            .as_deref()
                            .is_some_and(|r| RATE_LIMIT_REASONS.contains(&r)))
            }
            RemoteError::Transport { retryable, .. } => *retryable,
            RemoteError::Integrity { .. } => true,
            RemoteError::Protocol(_)
            | RemoteError::Auth(_)
            | RemoteError::Io(_)
            | RemoteError::Exhausted { .. } => false,
        }
    }

    /// How a per-key failure is reported in the run log.
    pub fn failure_kind(&self) -> FailureKind {
        match self {
            RemoteError::Exhausted { .. } => FailureKind::TransientExhausted,
            RemoteError::Io(_) => FailureKind::LocalIo,
            _ => FailureKind::Permanent,
        }
    }

    pub fn status(&self) -> Option<u16> {
        match self {
            RemoteError::Status { status, .. } => Some(*status),
            RemoteError::Exhausted { last, .. } => last.status(),
            _ => None,
        }
    }
}

impl From<reqwest::Error> for RemoteError {
    fn from(e: reqwest::Error) -> Self {
        if let Some(status) = e.status() {
            return RemoteError::Status {
                status: status.as_u16(),
                reason: None,
                message: e.to_string(),
            };
        }
        if e.is_decode() {
            return RemoteError::Protocol(e.to_string());
        }
        let retryable = e.is_connect() || e.is_timeout() || e.is_request() || e.is_body();
        RemoteError::Transport {
            message: e.to_string(),
            retryable,
        }
    }
}

impl From<HashError> for RemoteError {
    fn from(e: HashError) -> Self {
        match e {
            HashError::Io { source, .. } => RemoteError::Io(source),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteFolder {
    pub id: String,
    pub name: String,
}

/// One page of a folder listing.
#[derive(Debug, Clone, Default)]
pub struct ListPage {
    pub entries: Vec<RemoteEntry>,
    pub next_page_token: Option<String>,
}

/// The remote RPCs the reconciler consumes. Implementations perform a single
/// attempt; retrying is layered on top by [`crate::retry::RetryingRemoteClient`].
#[async_trait::async_trait]
pub trait RemoteStore: Send + Sync {
    /// Non-trashed folders whose name is exactly `name`.
    async fn find_folders(&self, name: &str) -> Result<Vec<RemoteFolder>, RemoteError>;
    async fn create_folder(&self, name: &str) -> Result<RemoteFolder, RemoteError>;
    /// Non-folder, non-trashed children of `folder_id`.
    async fn list_children(
        &self,
        folder_id: &str,
        page_token: Option<&str>,
    ) -> Result<ListPage, RemoteError>;
    async fn create_file(
        &self,
        folder_id: &str,
        name: &str,
        source: &Utf8Path,
    ) -> Result<RemoteEntry, RemoteError>;
    /// Replace content in place; the id is unchanged.
    async fn update_file(&self, file_id: &str, source: &Utf8Path)
        -> Result<RemoteEntry, RemoteError>;
    /// Write the file's bytes to `target`, creating or truncating it.
    async fn download_file(&self, file_id: &str, target: &Utf8Path) -> Result<u64, RemoteError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_drive_error_body() {
        let body = r#"{"error":{"code":403,"message":"User Rate Limit Exceeded","errors":[{"domain":"usageLimits","reason":"userRateLimitExceeded"}]}}"#;
        let err = RemoteError::from_status_body(403, body);
        assert!(err.is_transient());
        match err {
            RemoteError::Status {
                status,
                reason,
                message,
            } => {
                assert_eq!(status, 403);
                assert_eq!(reason.as_deref(), Some("userRateLimitExceeded"));
                assert_eq!(message, "User Rate Limit Exceeded");
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn permission_denied_is_permanent() {
        let body = r#"{"error":{"code":403,"message":"forbidden","errors":[{"reason":"insufficientFilePermissions"}]}}"#;
        let err = RemoteError::from_status_body(403, body);
        assert!(!err.is_transient());
        assert_eq!(err.failure_kind(), FailureKind::Permanent);
    }

    #[test]
    fn classification_of_statuses() {
        for status in [429, 500, 502, 503, 504] {
            assert!(RemoteError::from_status_body(status, "busy").is_transient());
        }
        for status in [400, 401, 404, 409] {
            assert!(!RemoteError::from_status_body(status, "nope").is_transient());
        }
    }

    #[test]
    fn exhausted_maps_to_transient_exhausted() {
        let err = RemoteError::Exhausted {
            attempts: 5,
            last: Box::new(RemoteError::from_status_body(503, "")),
        };
        assert!(!err.is_transient());
        assert_eq!(err.failure_kind(), FailureKind::TransientExhausted);
        assert_eq!(err.status(), Some(503));
    }

    #[test]
    fn local_io_maps_to_local_io() {
        let err = RemoteError::from(std::io::Error::other("disk full"));
        assert_eq!(err.failure_kind(), FailureKind::LocalIo);
    }
}
