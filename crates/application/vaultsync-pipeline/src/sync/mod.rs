use camino::Utf8PathBuf;
use serde::Serialize;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use vaultsync_config::{clamp_concurrency, DEFAULT_MAX_CONCURRENCY};
use vaultsync_core::{IgnorePolicy, OutcomeKind, SyncOutcome};
use vaultsync_infra::remote::RemoteStore;
use vaultsync_infra::retry::{RetryPolicy, RetryingRemoteClient};

pub mod engine;
pub mod execute;
pub mod sink;

/// How the run finds its remote folder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FolderSelector {
    /// Look the folder up by exact name, creating it when absent.
    Name(String),
    /// Use this folder id as-is.
    Id(String),
}

#[derive(Debug, Clone)]
pub struct SyncOptions {
    pub max_concurrency: usize,
    /// Compute and report the partition without transferring anything.
    pub dry_run: bool,
    pub cancel: Option<CancellationToken>,
}

impl Default for SyncOptions {
    fn default() -> Self {
        Self {
            max_concurrency: DEFAULT_MAX_CONCURRENCY,
            dry_run: false,
            cancel: None,
        }
    }
}

impl SyncOptions {
    pub fn concurrency(&self) -> usize {
        clamp_concurrency(self.max_concurrency)
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.as_ref().is_some_and(|c| c.is_cancelled())
    }
}

/// Everything one run needs. Built by the caller, never read from globals.
#[derive(Debug, Clone)]
pub struct SyncRequest {
    pub local_root: Utf8PathBuf,
    pub folder: FolderSelector,
    pub policy: IgnorePolicy,
    pub options: SyncOptions,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SyncStats {
    pub uploaded: u64,
    pub updated: u64,
    pub downloaded: u64,
    pub unchanged: u64,
    pub skipped: u64,
    pub failed: u64,
    pub bytes_uploaded: u64,
    pub bytes_downloaded: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    /// `None` when a dry run found no folder to compare against.
    pub folder_id: Option<String>,
    pub outcomes: Vec<SyncOutcome>,
    pub cancelled: bool,
    pub dry_run: bool,
}

impl RunReport {
    pub fn failed(&self) -> impl Iterator<Item = &SyncOutcome> {
        self.outcomes
            .iter()
            .filter(|o| o.kind == OutcomeKind::Failed)
    }

    /// A run succeeds only when no key failed.
    pub fn is_success(&self) -> bool {
        self.failed().next().is_none()
    }

    pub fn outcome(&self, key: &str) -> Option<&SyncOutcome> {
        self.outcomes.iter().find(|o| o.key == key)
    }

    pub fn keys_with(&self, kind: OutcomeKind) -> Vec<&str> {
        let mut keys: Vec<&str> = self
            .outcomes
            .iter()
            .filter(|o| o.kind == kind)
            .map(|o| o.key.as_str())
            .collect();
        keys.sort_unstable();
        keys
    }

    pub fn stats(&self) -> SyncStats {
        let mut stats = SyncStats::default();
        for o in &self.outcomes {
            match o.kind {
                OutcomeKind::Uploaded => {
                    stats.uploaded += 1;
                    stats.bytes_uploaded += o.bytes;
                }
                OutcomeKind::Updated => {
                    stats.updated += 1;
                    stats.bytes_uploaded += o.bytes;
                }
                OutcomeKind::Downloaded => {
                    stats.downloaded += 1;
                    stats.bytes_downloaded += o.bytes;
                }
                OutcomeKind::Unchanged => stats.unchanged += 1,
                OutcomeKind::Skipped => stats.skipped += 1,
                OutcomeKind::Failed => stats.failed += 1,
            }
        }
        stats
    }
}

/// Run-level errors. Per-key failures are outcomes, not errors.
#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    #[error("Configuration error: {0}")]
    Configuration(String),
    #[error("Found {} folders named '{name}': {}. Pin one with a folder id.", ids.len(), ids.join(", "))]
    DuplicateFolder { name: String, ids: Vec<String> },
    #[error("Remote error: {0}")]
    Remote(String),
    #[error("Local state error: {0}")]
    Local(String),
}

impl SyncError {
    /// Raised before any transfer because the run is misconfigured.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            SyncError::Configuration(_) | SyncError::DuplicateFolder { .. }
        )
    }
}

pub use engine::DefaultSyncEngine;
pub use execute::{DefaultPlanExecutor, PlanExecutor};

/// Convenience constructor for the default engine.
pub fn default_engine(store: Arc<dyn RemoteStore>, policy: RetryPolicy) -> DefaultSyncEngine {
    DefaultSyncEngine::new(Arc::new(RetryingRemoteClient::new(store, policy)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use vaultsync_core::{FailureKind, SkipReason};

    #[test]
    fn report_stats_and_success() {
        let report = RunReport {
            folder_id: Some("f".into()),
            outcomes: vec![
                SyncOutcome::uploaded("a.md", 5),
                SyncOutcome::downloaded("b.md", 7),
                SyncOutcome::unchanged("c.md"),
                SyncOutcome::skipped(".DS_Store", SkipReason::Ignored),
            ],
            cancelled: false,
            dry_run: false,
        };
        assert!(report.is_success());
        let stats = report.stats();
        assert_eq!(stats.uploaded, 1);
        assert_eq!(stats.bytes_uploaded, 5);
        assert_eq!(stats.bytes_downloaded, 7);
        assert_eq!(stats.skipped, 1);

        let mut failed = report.clone();
        failed
            .outcomes
            .push(SyncOutcome::failed("d.md", FailureKind::Permanent, "404"));
        assert!(!failed.is_success());
        assert_eq!(failed.failed().count(), 1);
    }

    #[test]
    fn concurrency_is_clamped() {
        let mut opts = SyncOptions::default();
        assert_eq!(opts.concurrency(), 4);
        opts.max_concurrency = 0;
        assert_eq!(opts.concurrency(), 1);
        opts.max_concurrency = 100;
        assert_eq!(opts.concurrency(), vaultsync_config::MAX_CONCURRENCY);
    }

    #[test]
    fn duplicate_folder_lists_candidates() {
        let err = SyncError::DuplicateFolder {
            name: "Obsidian Vault".into(),
            ids: vec!["a".into(), "b".into()],
        };
        assert!(err.is_configuration());
        let msg = err.to_string();
        assert!(msg.contains("2 folders"));
        assert!(msg.contains("a, b"));
    }
}
