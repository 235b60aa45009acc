use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, info};
use vaultsync_core::{IgnorePolicy, RemoteSnapshot, SkipReason, SkippedEntry};
use vaultsync_infra::remote::RemoteFolder;
use vaultsync_infra::retry::RetryingRemoteClient;

use crate::sync::SyncError;

/// Resolves the sync folder and builds the name-keyed remote snapshot.
/// Every request goes through the retrying client.
pub struct RemoteDirectoryIndex {
    client: Arc<RetryingRemoteClient>,
}

impl RemoteDirectoryIndex {
    pub fn new(client: Arc<RetryingRemoteClient>) -> Self {
        Self { client }
    }

    /// The unique folder named `name`, if any.
    pub async fn find_folder(&self, name: &str) -> Result<Option<RemoteFolder>, SyncError> {
        let mut found = self
            .client
            .find_folders(name)
            .await
            .map_err(|e| SyncError::Remote(format!("folder lookup for '{name}' failed: {e}")))?;
        match found.len() {
            0 => Ok(None),
            1 => Ok(found.pop()),
            _ => Err(SyncError::DuplicateFolder {
                name: name.to_string(),
                ids: found.into_iter().map(|f| f.id).collect(),
            }),
        }
    }

    pub async fn ensure_folder(&self, name: &str) -> Result<RemoteFolder, SyncError> {
        if let Some(folder) = self.find_folder(name).await? {
            debug!(id = %folder.id, "using existing folder '{}'", name);
            return Ok(folder);
        }
        let folder = self
            .client
            .create_folder(name)
            .await
            .map_err(|e| SyncError::Remote(format!("creating folder '{name}' failed: {e}")))?;
        info!("Created remote folder '{}' ({})", name, folder.id);
        Ok(folder)
    }

    /// Page through the folder until the listing is exhausted. A name seen on
    /// a later page replaces the earlier entry.
    pub async fn list_entries(
        &self,
        folder_id: &str,
        policy: &IgnorePolicy,
    ) -> Result<RemoteSnapshot, SyncError> {
        let mut snapshot = RemoteSnapshot {
            folder_id: folder_id.to_string(),
            ..RemoteSnapshot::default()
        };
        let mut seen_tokens = HashSet::new();
        let mut page_token: Option<String> = None;
        let mut pages = 0usize;

        loop {
            let page = self
                .client
                .list_children(folder_id, page_token.as_deref())
                .await
                .map_err(|e| SyncError::Remote(format!("listing folder {folder_id}: {e}")))?;
            pages += 1;
            debug!(page = pages, entries = page.entries.len(), "listed page");

            for entry in page.entries {
                if policy.should_skip_path(&entry.name) {
                    snapshot.skipped.push(SkippedEntry {
                        key: entry.name,
                        reason: SkipReason::Ignored,
                    });
                    continue;
                }
                if let Some(previous) = snapshot.entries.insert(entry.name.clone(), entry) {
                    debug!(
                        name = %previous.name,
                        replaced = %previous.id,
                        "duplicate remote name, keeping the later entry"
                    );
                }
            }

            match page.next_page_token {
                Some(token) => {
                    if !seen_tokens.insert(token.clone()) {
                        return Err(SyncError::Remote(format!(
                            "listing folder {folder_id}: page token repeated"
                        )));
                    }
                    page_token = Some(token);
                }
                None => break,
            }
        }

        snapshot.skipped.sort_by(|a, b| a.key.cmp(&b.key));
        snapshot.skipped.dedup_by(|a, b| a.key == b.key);
        info!(
            "Remote folder {} has {} entries ({} ignored) over {} pages",
            folder_id,
            snapshot.entries.len(),
            snapshot.skipped.len(),
            pages
        );
        Ok(snapshot)
    }
}
