#![allow(dead_code)]

use camino::{Utf8Path, Utf8PathBuf};
use chrono::{DateTime, TimeZone, Utc};
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use vaultsync_core::{IgnorePolicy, RemoteEntry};
use vaultsync_infra::hashing::fingerprint_bytes;
use vaultsync_infra::remote::{ListPage, RemoteError, RemoteFolder, RemoteStore};
use vaultsync_infra::retry::{RetryPolicy, RetryingRemoteClient};
use vaultsync_pipeline::{DefaultSyncEngine, FolderSelector, SyncOptions, SyncRequest};

pub const FOLDER: &str = "Obsidian Vault";
pub const ATTEMPTS: u32 = 5;

pub fn remote_mtime() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 5, 1, 10, 0, 0).unwrap()
}

#[derive(Debug, Clone)]
struct StoredFile {
    folder_id: String,
    name: String,
    data: Vec<u8>,
    /// Native documents carry no checksum.
    native: bool,
}

impl StoredFile {
    fn entry(&self, id: &str) -> RemoteEntry {
        RemoteEntry {
            id: id.to_string(),
            name: self.name.clone(),
            fingerprint: (!self.native).then(|| fingerprint_bytes(&self.data)),
            modified: Some(remote_mtime()),
            size: (!self.native).then_some(self.data.len() as u64),
            mime_type: Some(if self.native {
                "application/vnd.google-apps.document".to_string()
            } else {
                "application/octet-stream".to_string()
            }),
        }
    }
}

#[derive(Debug, Clone)]
struct Fault {
    op: &'static str,
    name: Option<String>,
    status: u16,
    /// `None` fails forever.
    remaining: Option<u32>,
}

#[derive(Default)]
struct State {
    folders: Vec<RemoteFolder>,
    /// Insertion order doubles as listing order.
    files: BTreeMap<u64, StoredFile>,
    next_id: u64,
    faults: Vec<Fault>,
    corrupt_downloads: Option<u32>,
    calls: HashMap<&'static str, u32>,
    page_size: usize,
}

/// In-memory flat-folder store with fault injection.
pub struct MemoryStore {
    state: Mutex<State>,
}

fn file_id(n: u64) -> String {
    format!("file-{n}")
}

fn parse_id(id: &str) -> Option<u64> {
    id.strip_prefix("file-")?.parse().ok()
}

impl MemoryStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            state: Mutex::new(State {
                page_size: 100,
                ..State::default()
            }),
        })
    }

    pub fn set_page_size(&self, n: usize) {
        self.state.lock().unwrap().page_size = n.max(1);
    }

    pub fn add_folder(&self, name: &str) -> String {
        let mut s = self.state.lock().unwrap();
        let id = format!("folder-{}", s.folders.len() + 1);
        s.folders.push(RemoteFolder {
            id: id.clone(),
            name: name.to_string(),
        });
        id
    }

    pub fn folder_count(&self) -> usize {
        self.state.lock().unwrap().folders.len()
    }

    fn insert(&self, folder_id: &str, name: &str, data: &[u8], native: bool) -> String {
        let mut s = self.state.lock().unwrap();
        s.next_id += 1;
        let n = s.next_id;
        s.files.insert(
            n,
            StoredFile {
                folder_id: folder_id.to_string(),
                name: name.to_string(),
                data: data.to_vec(),
                native,
            },
        );
        file_id(n)
    }

    pub fn put_file(&self, folder_id: &str, name: &str, data: &[u8]) -> String {
        self.insert(folder_id, name, data, false)
    }

    pub fn put_native_doc(&self, folder_id: &str, name: &str) -> String {
        self.insert(folder_id, name, b"", true)
    }

    /// Content of the last-listed entry with this name.
    pub fn content(&self, folder_id: &str, name: &str) -> Option<Vec<u8>> {
        let s = self.state.lock().unwrap();
        s.files
            .values()
            .filter(|f| f.folder_id == folder_id && f.name == name)
            .last()
            .map(|f| f.data.clone())
    }

    pub fn id_of(&self, folder_id: &str, name: &str) -> Option<String> {
        let s = self.state.lock().unwrap();
        s.files
            .iter()
            .filter(|(_, f)| f.folder_id == folder_id && f.name == name)
            .last()
            .map(|(n, _)| file_id(*n))
    }

    pub fn names(&self, folder_id: &str) -> Vec<String> {
        let s = self.state.lock().unwrap();
        let mut names: Vec<String> = s
            .files
            .values()
            .filter(|f| f.folder_id == folder_id)
            .map(|f| f.name.clone())
            .collect();
        names.sort();
        names
    }

    /// Fail `op` (optionally only for `name`) with `status`, `times` times or forever.
    pub fn inject(&self, op: &'static str, name: Option<&str>, status: u16, times: Option<u32>) {
        self.state.lock().unwrap().faults.push(Fault {
            op,
            name: name.map(str::to_string),
            status,
            remaining: times,
        });
    }

    /// Serve bytes that do not match the advertised checksum.
    pub fn corrupt_downloads(&self, times: Option<u32>) {
        self.state.lock().unwrap().corrupt_downloads = Some(times.unwrap_or(u32::MAX));
    }

    pub fn calls(&self, op: &str) -> u32 {
        self.state
            .lock()
            .unwrap()
            .calls
            .get(op)
            .copied()
            .unwrap_or(0)
    }

    fn enter(&self, op: &'static str, name: Option<&str>) -> Result<(), RemoteError> {
        let mut s = self.state.lock().unwrap();
        *s.calls.entry(op).or_insert(0) += 1;
        for fault in s.faults.iter_mut() {
            if fault.op != op {
                continue;
            }
            if fault.name.is_some() && fault.name.as_deref() != name {
                continue;
            }
            match fault.remaining {
                Some(0) => continue,
                Some(ref mut n) => *n -= 1,
                None => {}
            }
            return Err(RemoteError::from_status_body(
                fault.status,
                &format!(r#"{{"error":{{"code":{},"message":"injected"}}}}"#, fault.status),
            ));
        }
        Ok(())
    }

    fn name_of(&self, id: &str) -> Option<String> {
        let s = self.state.lock().unwrap();
        parse_id(id)
            .and_then(|n| s.files.get(&n))
            .map(|f| f.name.clone())
    }

    fn not_found(id: &str) -> RemoteError {
        RemoteError::from_status_body(404, &format!("File not found: {id}"))
    }
}

#[async_trait::async_trait]
impl RemoteStore for MemoryStore {
    async fn find_folders(&self, name: &str) -> Result<Vec<RemoteFolder>, RemoteError> {
        self.enter("find_folders", Some(name))?;
        let s = self.state.lock().unwrap();
        Ok(s.folders.iter().filter(|f| f.name == name).cloned().collect())
    }

    async fn create_folder(&self, name: &str) -> Result<RemoteFolder, RemoteError> {
        self.enter("create_folder", Some(name))?;
        let id = self.add_folder(name);
        Ok(RemoteFolder {
            id,
            name: name.to_string(),
        })
    }

    async fn list_children(
        &self,
        folder_id: &str,
        page_token: Option<&str>,
    ) -> Result<ListPage, RemoteError> {
        self.enter("list_children", None)?;
        let s = self.state.lock().unwrap();
        let all: Vec<RemoteEntry> = s
            .files
            .iter()
            .filter(|(_, f)| f.folder_id == folder_id)
            .map(|(n, f)| f.entry(&file_id(*n)))
            .collect();
        let start: usize = match page_token {
            Some(t) => t
                .parse()
                .map_err(|_| RemoteError::from_status_body(400, "bad page token"))?,
            None => 0,
        };
        let end = (start + s.page_size).min(all.len());
        Ok(ListPage {
            entries: all[start.min(all.len())..end].to_vec(),
            next_page_token: (end < all.len()).then(|| end.to_string()),
        })
    }

    async fn create_file(
        &self,
        folder_id: &str,
        name: &str,
        source: &Utf8Path,
    ) -> Result<RemoteEntry, RemoteError> {
        self.enter("create_file", Some(name))?;
        let data = tokio::fs::read(source.as_std_path()).await?;
        let id = self.insert(folder_id, name, &data, false);
        let s = self.state.lock().unwrap();
        let n = parse_id(&id).ok_or_else(|| Self::not_found(&id))?;
        Ok(s.files[&n].entry(&id))
    }

    async fn update_file(
        &self,
        file_id: &str,
        source: &Utf8Path,
    ) -> Result<RemoteEntry, RemoteError> {
        let name = self.name_of(file_id);
        self.enter("update_file", name.as_deref())?;
        let data = tokio::fs::read(source.as_std_path()).await?;
        let mut s = self.state.lock().unwrap();
        let n = parse_id(file_id).ok_or_else(|| Self::not_found(file_id))?;
        let file = s.files.get_mut(&n).ok_or_else(|| Self::not_found(file_id))?;
        file.data = data;
        Ok(file.entry(file_id))
    }

    async fn download_file(&self, file_id: &str, target: &Utf8Path) -> Result<u64, RemoteError> {
        let name = self.name_of(file_id);
        self.enter("download_file", name.as_deref())?;
        let data = {
            let mut s = self.state.lock().unwrap();
            let n = parse_id(file_id).ok_or_else(|| Self::not_found(file_id))?;
            let mut data = s
                .files
                .get(&n)
                .ok_or_else(|| Self::not_found(file_id))?
                .data
                .clone();
            if let Some(left) = s.corrupt_downloads.as_mut() {
                if *left > 0 {
                    *left -= 1;
                    data.extend_from_slice(b"-corrupted");
                }
            }
            data
        };
        tokio::fs::write(target.as_std_path(), &data).await?;
        Ok(data.len() as u64)
    }
}

pub fn default_policy() -> IgnorePolicy {
    IgnorePolicy::new([".DS_Store", "workspace.json", "appearance.json", "app.json", ".log"])
}

pub fn quick_retry() -> RetryPolicy {
    RetryPolicy::new(ATTEMPTS, Duration::from_millis(1))
}

pub fn engine(store: Arc<MemoryStore>) -> DefaultSyncEngine {
    DefaultSyncEngine::new(Arc::new(RetryingRemoteClient::new(store, quick_retry())))
}

pub fn request(root: &Utf8Path) -> SyncRequest {
    SyncRequest {
        local_root: root.to_owned(),
        folder: FolderSelector::Name(FOLDER.to_string()),
        policy: default_policy(),
        options: SyncOptions::default(),
    }
}

pub fn vault() -> (tempfile::TempDir, Utf8PathBuf) {
    let dir = tempfile::tempdir().unwrap();
    let root = Utf8PathBuf::from_path_buf(dir.path().join("vault")).unwrap();
    std::fs::create_dir_all(&root).unwrap();
    (dir, root)
}

pub fn write(root: &Utf8Path, rel: &str, data: &[u8]) {
    let path = root.join(rel);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).unwrap();
    }
    std::fs::write(path, data).unwrap();
}
