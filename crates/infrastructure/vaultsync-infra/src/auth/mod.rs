//! Credential providers. Obtaining and refreshing tokens is done by an outside
//! tool; these only hand an existing bearer token to the Drive client.

use camino::{Utf8Path, Utf8PathBuf};
use serde::Deserialize;

#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("no access token configured")]
    Missing,
    #[error("failed to read token file {path}: {source}")]
    Read {
        path: Utf8PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("token file {path} is not valid JSON: {source}")]
    Parse {
        path: Utf8PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("token file {0} has no `token` or `access_token` field")]
    NoToken(Utf8PathBuf),
}

#[async_trait::async_trait]
pub trait CredentialProvider: Send + Sync {
    async fn access_token(&self) -> Result<String, AuthError>;
}

pub struct StaticTokenProvider {
    token: String,
}

impl StaticTokenProvider {
    pub fn new(token: impl Into<String>) -> Result<Self, AuthError> {
        let token = token.into().trim().to_string();
        if token.is_empty() {
            return Err(AuthError::Missing);
        }
        Ok(Self { token })
    }
}

#[async_trait::async_trait]
impl CredentialProvider for StaticTokenProvider {
    async fn access_token(&self) -> Result<String, AuthError> {
        Ok(self.token.clone())
    }
}

/// Reads an authorized-user JSON file (e.g. `token.json`) on every call, so an
/// external refresher can rotate the token while a run is in progress.
pub struct TokenFileProvider {
    path: Utf8PathBuf,
}

#[derive(Deserialize)]
struct AuthorizedUser {
    token: Option<String>,
    access_token: Option<String>,
}

impl TokenFileProvider {
    pub fn new(path: impl Into<Utf8PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Utf8Path {
        &self.path
    }
}

#[async_trait::async_trait]
impl CredentialProvider for TokenFileProvider {
    async fn access_token(&self) -> Result<String, AuthError> {
        let data = tokio::fs::read_to_string(self.path.as_std_path())
            .await
            .map_err(|source| AuthError::Read {
                path: self.path.clone(),
                source,
            })?;
        let parsed: AuthorizedUser =
            serde_json::from_str(&data).map_err(|source| AuthError::Parse {
                path: self.path.clone(),
                source,
            })?;
        parsed
            .token
            .or(parsed.access_token)
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty())
            .ok_or_else(|| AuthError::NoToken(self.path.clone()))
    }
}
