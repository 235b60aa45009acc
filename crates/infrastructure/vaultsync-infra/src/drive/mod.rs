//! Google Drive v3 REST binding for [`RemoteStore`].

use crate::auth::CredentialProvider;
use crate::remote::{ListPage, RemoteError, RemoteFolder, RemoteStore};
use camino::Utf8Path;
use chrono::{DateTime, Utc};
use futures::StreamExt;
use reqwest::header::{CONTENT_LENGTH, CONTENT_TYPE, LOCATION};
use reqwest::{Body, Client, Method, RequestBuilder, Response};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use tokio::io::AsyncWriteExt;
use tokio_util::io::ReaderStream;
use tracing::debug;
use vaultsync_core::RemoteEntry;

pub const DRIVE_API_BASE: &str = "https://www.googleapis.com/drive/v3";
pub const DRIVE_UPLOAD_BASE: &str = "https://www.googleapis.com/upload/drive/v3";
pub const FOLDER_MIME_TYPE: &str = "application/vnd.google-apps.folder";
/// Files at or below this size go up in one multipart request.
pub const MULTIPART_LIMIT: u64 = 5 * 1024 * 1024;
pub const FILE_FIELDS: &str = "id,name,md5Checksum,modifiedTime,size,mimeType";
const PAGE_SIZE: u32 = 1000;

#[derive(Debug, Clone)]
pub struct DriveEndpoints {
    pub api_base: String,
    pub upload_base: String,
}

impl Default for DriveEndpoints {
    fn default() -> Self {
        Self {
            api_base: DRIVE_API_BASE.to_string(),
            upload_base: DRIVE_UPLOAD_BASE.to_string(),
        }
    }
}

impl DriveEndpoints {
    /// Both endpoints under one base URL, as served by a local mock.
    pub fn local(base: &str) -> Self {
        let base = base.trim_end_matches('/');
        Self {
            api_base: format!("{base}/drive/v3"),
            upload_base: format!("{base}/upload/drive/v3"),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DriveFile {
    id: String,
    name: String,
    md5_checksum: Option<String>,
    modified_time: Option<DateTime<Utc>>,
    /// Int64 values arrive as JSON strings.
    size: Option<String>,
    mime_type: Option<String>,
}

impl From<DriveFile> for RemoteEntry {
    fn from(f: DriveFile) -> Self {
        RemoteEntry {
            id: f.id,
            name: f.name,
            fingerprint: f.md5_checksum.filter(|s| !s.is_empty()),
            modified: f.modified_time,
            size: f.size.and_then(|s| s.parse().ok()),
            mime_type: f.mime_type,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FileList {
    #[serde(default)]
    files: Vec<DriveFile>,
    next_page_token: Option<String>,
}

/// Escape a value for a single-quoted Drive query literal.
pub fn escape_query_literal(value: &str) -> String {
    value.replace('\\', "\\\\").replace('\'', "\\'")
}

pub struct DriveStore {
    client: Client,
    endpoints: DriveEndpoints,
    credentials: Arc<dyn CredentialProvider>,
}

impl DriveStore {
    pub fn new(client: Client, credentials: Arc<dyn CredentialProvider>) -> Self {
        Self::with_endpoints(client, credentials, DriveEndpoints::default())
    }

    pub fn with_endpoints(
        client: Client,
        credentials: Arc<dyn CredentialProvider>,
        endpoints: DriveEndpoints,
    ) -> Self {
        Self {
            client,
            endpoints,
            credentials,
        }
    }

    async fn request(&self, method: Method, url: &str) -> Result<RequestBuilder, RemoteError> {
        let token = self.credentials.access_token().await?;
        Ok(self.client.request(method, url).bearer_auth(token))
    }

    async fn check(resp: Response) -> Result<Response, RemoteError> {
        let status = resp.status();
        if status.is_success() {
            return Ok(resp);
        }
        let body = resp.text().await.unwrap_or_default();
        Err(RemoteError::from_status_body(status.as_u16(), &body))
    }

    async fn send_file(resp: Response) -> Result<RemoteEntry, RemoteError> {
        let file: DriveFile = Self::check(resp).await?.json().await?;
        Ok(file.into())
    }

    fn multipart_body(metadata: &serde_json::Value, content: &[u8]) -> (String, Vec<u8>) {
        let boundary = format!("vaultsync-{}", uuid::Uuid::new_v4().simple());
        let mut body = Vec::with_capacity(content.len() + 512);
        body.extend_from_slice(
            format!(
                "--{boundary}\r\nContent-Type: application/json; charset=UTF-8\r\n\r\n{metadata}\r\n--{boundary}\r\nContent-Type: application/octet-stream\r\n\r\n"
            )
            .as_bytes(),
        );
        body.extend_from_slice(content);
        body.extend_from_slice(format!("\r\n--{boundary}--\r\n").as_bytes());
        (format!("multipart/related; boundary={boundary}"), body)
    }

    /// Open a resumable session and stream the file into it.
    async fn resumable(
        &self,
        method: Method,
        url: &str,
        metadata: serde_json::Value,
        source: &Utf8Path,
        size: u64,
    ) -> Result<RemoteEntry, RemoteError> {
        let init = self
            .request(method, url)
            .await?
            .query(&[("uploadType", "resumable"), ("fields", FILE_FIELDS)])
            .header("X-Upload-Content-Type", "application/octet-stream")
            .header("X-Upload-Content-Length", size)
            .json(&metadata)
            .send()
            .await?;
        let init = Self::check(init).await?;
        let session = init
            .headers()
            .get(LOCATION)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
            .ok_or_else(|| {
                RemoteError::Protocol("resumable session has no Location header".into())
            })?;
        debug!(%source, size, "streaming resumable upload");

        let file = tokio::fs::File::open(source.as_std_path()).await?;
        let resp = self
            .request(Method::PUT, &session)
            .await?
            .header(CONTENT_LENGTH, size)
            .body(Body::wrap_stream(ReaderStream::new(file)))
            .send()
            .await?;
        Self::send_file(resp).await
    }
}

#[async_trait::async_trait]
impl RemoteStore for DriveStore {
    async fn find_folders(&self, name: &str) -> Result<Vec<RemoteFolder>, RemoteError> {
        let q = format!(
            "name = '{}' and mimeType = '{FOLDER_MIME_TYPE}' and trashed = false",
            escape_query_literal(name)
        );
        let url = format!("{}/files", self.endpoints.api_base);
        let resp = self
            .request(Method::GET, &url)
            .await?
            .query(&[
                ("q", q.as_str()),
                ("fields", "files(id,name)"),
                ("spaces", "drive"),
            ])
            .send()
            .await?;
        let list: FileList = Self::check(resp).await?.json().await?;
        Ok(list
            .files
            .into_iter()
            .map(|f| RemoteFolder {
                id: f.id,
                name: f.name,
            })
            .collect())
    }

    async fn create_folder(&self, name: &str) -> Result<RemoteFolder, RemoteError> {
        let url = format!("{}/files", self.endpoints.api_base);
        let resp = self
            .request(Method::POST, &url)
            .await?
            .query(&[("fields", "id,name")])
            .json(&json!({ "name": name, "mimeType": FOLDER_MIME_TYPE }))
            .send()
            .await?;
        let file: DriveFile = Self::check(resp).await?.json().await?;
        Ok(RemoteFolder {
            id: file.id,
            name: file.name,
        })
    }

    async fn list_children(
        &self,
        folder_id: &str,
        page_token: Option<&str>,
    ) -> Result<ListPage, RemoteError> {
        let q = format!(
            "'{}' in parents and mimeType != '{FOLDER_MIME_TYPE}' and trashed = false",
            escape_query_literal(folder_id)
        );
        let fields = format!("nextPageToken, files({FILE_FIELDS})");
        let page_size = PAGE_SIZE.to_string();
        let url = format!("{}/files", self.endpoints.api_base);
        let mut query = vec![
            ("q", q.as_str()),
            ("fields", fields.as_str()),
            ("pageSize", page_size.as_str()),
        ];
        if let Some(token) = page_token {
            query.push(("pageToken", token));
        }
        let resp = self
            .request(Method::GET, &url)
            .await?
            .query(&query)
            .send()
            .await?;
        let list: FileList = Self::check(resp).await?.json().await?;
        Ok(ListPage {
            entries: list.files.into_iter().map(RemoteEntry::from).collect(),
            next_page_token: list.next_page_token.filter(|t| !t.is_empty()),
        })
    }

    async fn create_file(
        &self,
        folder_id: &str,
        name: &str,
        source: &Utf8Path,
    ) -> Result<RemoteEntry, RemoteError> {
        let metadata = json!({ "name": name, "parents": [folder_id] });
        let url = format!("{}/files", self.endpoints.upload_base);
        let size = tokio::fs::metadata(source.as_std_path()).await?.len();
        if size > MULTIPART_LIMIT {
            return self
                .resumable(Method::POST, &url, metadata, source, size)
                .await;
        }

        let content = tokio::fs::read(source.as_std_path()).await?;
        let (content_type, body) = Self::multipart_body(&metadata, &content);
        let resp = self
            .request(Method::POST, &url)
            .await?
            .query(&[("uploadType", "multipart"), ("fields", FILE_FIELDS)])
            .header(CONTENT_TYPE, content_type)
            .body(body)
            .send()
            .await?;
        Self::send_file(resp).await
    }

    async fn update_file(
        &self,
        file_id: &str,
        source: &Utf8Path,
    ) -> Result<RemoteEntry, RemoteError> {
        let url = format!("{}/files/{file_id}", self.endpoints.upload_base);
        let size = tokio::fs::metadata(source.as_std_path()).await?.len();
        if size > MULTIPART_LIMIT {
            return self
                .resumable(Method::PATCH, &url, json!({}), source, size)
                .await;
        }

        let content = tokio::fs::read(source.as_std_path()).await?;
        let resp = self
            .request(Method::PATCH, &url)
            .await?
            .query(&[("uploadType", "media"), ("fields", FILE_FIELDS)])
            .header(CONTENT_TYPE, "application/octet-stream")
            .body(content)
            .send()
            .await?;
        Self::send_file(resp).await
    }

    async fn download_file(&self, file_id: &str, target: &Utf8Path) -> Result<u64, RemoteError> {
        let url = format!("{}/files/{file_id}", self.endpoints.api_base);
        let resp = self
            .request(Method::GET, &url)
            .await?
            .query(&[("alt", "media")])
            .send()
            .await?;
        let resp = Self::check(resp).await?;

        if let Some(parent) = target.parent() {
            if !parent.as_str().is_empty() {
                tokio::fs::create_dir_all(parent.as_std_path()).await?;
            }
        }
        let mut file = tokio::fs::File::create(target.as_std_path()).await?;
        let mut stream = resp.bytes_stream();
        let mut written = 0u64;
        while let Some(chunk) = stream.next().await {
            let chunk = chunk?;
            file.write_all(&chunk).await?;
            written += chunk.len() as u64;
        }
        file.flush().await?;
        Ok(written)
    }
}
