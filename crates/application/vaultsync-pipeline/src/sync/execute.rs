use std::collections::HashSet;
use std::sync::Arc;

use camino::Utf8Path;
use filetime::FileTime;
use futures::stream::{self, StreamExt};
use tracing::{debug, info, warn};
use vaultsync_core::path_utils::SyncPath;
use vaultsync_core::{
    fingerprints_match, DownloadAction, OutcomeKind, RemoteEntry, SkipReason, SyncOutcome,
    SyncPlan, UpdateAction, UploadAction,
};
use vaultsync_infra::hashing;
use vaultsync_infra::remote::RemoteError;
use vaultsync_infra::retry::RetryingRemoteClient;

use crate::io_utils::{partial_path, robust_rename};
use crate::sync::sink::OutcomeSink;
use crate::sync::SyncOptions;

#[derive(Debug, Clone, Default)]
pub struct Execution {
    pub outcomes: Vec<SyncOutcome>,
    pub cancelled: bool,
}

#[async_trait::async_trait]
pub trait PlanExecutor: Send + Sync {
    /// Carry out `plan`: the upload/update pass runs to completion before the
    /// download pass starts. Per-key failures become outcomes.
    async fn execute(
        &self,
        root: &Utf8Path,
        folder_id: &str,
        plan: SyncPlan,
        opts: &SyncOptions,
        sink: &dyn OutcomeSink,
    ) -> Execution;
}

enum Push {
    Upload(UploadAction),
    Update(UpdateAction),
}

impl Push {
    fn key(&self) -> &str {
        match self {
            Push::Upload(a) => &a.key,
            Push::Update(a) => &a.key,
        }
    }
}

fn record(sink: &dyn OutcomeSink, outcomes: &mut Vec<SyncOutcome>, outcome: SyncOutcome) {
    sink.record(&outcome);
    outcomes.push(outcome);
}

fn transfer_failed(key: String, op: &str, e: RemoteError) -> SyncOutcome {
    warn!(%key, op, error = %e, "transfer failed");
    SyncOutcome::failed(key, e.failure_kind(), e.to_string())
}

/// Drive echoes the MD5 of what it stored. A mismatch means the file changed
/// between hashing and upload; the next run picks it up.
fn check_echo(key: &str, sent: &str, stored: &RemoteEntry) {
    if let Some(fp) = stored.fingerprint.as_deref() {
        if !fingerprints_match(fp, sent) {
            warn!(%key, sent, stored = fp, "remote checksum differs from scanned file");
        }
    }
}

pub struct DefaultPlanExecutor {
    client: Arc<RetryingRemoteClient>,
}

impl DefaultPlanExecutor {
    pub fn new(client: Arc<RetryingRemoteClient>) -> Self {
        Self { client }
    }

    async fn push(&self, folder_id: &str, action: Push) -> SyncOutcome {
        match action {
            Push::Upload(a) => match self.client.create_file(folder_id, &a.key, &a.source).await {
                Ok(entry) => {
                    check_echo(&a.key, &a.fingerprint, &entry);
                    debug!(key = %a.key, id = %entry.id, "uploaded");
                    SyncOutcome::uploaded(a.key, a.size)
                }
                Err(e) => transfer_failed(a.key, "upload", e),
            },
            Push::Update(a) => match self.client.update_file(&a.remote_id, &a.source).await {
                Ok(entry) => {
                    check_echo(&a.key, &a.fingerprint, &entry);
                    debug!(key = %a.key, id = %entry.id, "updated in place");
                    SyncOutcome::updated(a.key, a.size)
                }
                Err(e) => transfer_failed(a.key, "update", e),
            },
        }
    }

    /// One download attempt: fetch into `part`, then check the received bytes
    /// against the advertised fingerprint.
    async fn fetch_verified(
        &self,
        action: &DownloadAction,
        part: &Utf8Path,
    ) -> Result<u64, RemoteError> {
        let bytes = self
            .client
            .store()
            .download_file(&action.remote_id, part)
            .await?;
        let path = part.to_owned();
        let actual = tokio::task::spawn_blocking(move || hashing::fingerprint(&path))
            .await
            .map_err(|e| RemoteError::Io(std::io::Error::other(e)))??;
        if !fingerprints_match(&actual, &action.expected_fingerprint) {
            return Err(RemoteError::Integrity {
                id: action.remote_id.clone(),
                expected: action.expected_fingerprint.clone(),
                actual,
            });
        }
        Ok(bytes)
    }

    async fn pull(&self, root: &Utf8Path, action: DownloadAction) -> SyncOutcome {
        use vaultsync_core::FailureKind::LocalIo;

        if !SyncPath::verify_safe(&action.key) {
            return SyncOutcome::failed(action.key, LocalIo, "unsafe remote name");
        }
        let target = root.join(&action.key);
        if !target.starts_with(root) {
            return SyncOutcome::failed(action.key, LocalIo, "target escapes the sync root");
        }
        if let Some(parent) = target.parent() {
            if let Err(e) = tokio::fs::create_dir_all(parent.as_std_path()).await {
                warn!(key = %action.key, error = %e, "cannot create parent directory");
                return SyncOutcome::failed(action.key, LocalIo, e.to_string());
            }
        }

        let part = partial_path(&target);
        let fetched = self
            .client
            .execute("download_file", || self.fetch_verified(&action, &part))
            .await;
        let bytes = match fetched {
            Ok(bytes) => bytes,
            Err(e) => {
                let _ = tokio::fs::remove_file(part.as_std_path()).await;
                return transfer_failed(action.key, "download", e);
            }
        };

        if let Err(e) = robust_rename(&part, &target).await {
            let _ = tokio::fs::remove_file(part.as_std_path()).await;
            warn!(key = %action.key, error = %e, "cannot move download into place");
            return SyncOutcome::failed(action.key, LocalIo, e.to_string());
        }

        if let Some(modified) = action.modified {
            let mtime =
                FileTime::from_unix_time(modified.timestamp(), modified.timestamp_subsec_nanos());
            if let Err(e) = filetime::set_file_mtime(target.as_std_path(), mtime) {
                debug!(key = %action.key, error = %e, "could not set mtime");
            }
        }
        debug!(key = %action.key, bytes, "downloaded");
        SyncOutcome::downloaded(action.key, bytes)
    }
}

#[async_trait::async_trait]
impl PlanExecutor for DefaultPlanExecutor {
    async fn execute(
        &self,
        root: &Utf8Path,
        folder_id: &str,
        plan: SyncPlan,
        opts: &SyncOptions,
        sink: &dyn OutcomeSink,
    ) -> Execution {
        let mut outcomes = Vec::new();
        let concurrency = opts.concurrency();

        for key in plan.unchanged {
            record(sink, &mut outcomes, SyncOutcome::unchanged(key));
        }
        for s in plan.skipped {
            record(sink, &mut outcomes, SyncOutcome::skipped(s.key, s.reason));
        }
        for b in plan.blocked {
            warn!(key = %b.key, reason = %b.reason, "key excluded from both passes");
            record(
                sink,
                &mut outcomes,
                SyncOutcome::failed(b.key, b.failure, b.reason),
            );
        }

        let this = self;
        let pushes: Vec<Push> = plan
            .uploads
            .into_iter()
            .map(Push::Upload)
            .chain(plan.updates.into_iter().map(Push::Update))
            .collect();
        info!(
            "Pass 1/2: {} uploads/updates (concurrency {})",
            pushes.len(),
            concurrency
        );

        let mut failed_pushes: HashSet<String> = HashSet::new();
        {
            let mut results = stream::iter(pushes)
                .map(move |action| async move {
                    if opts.is_cancelled() {
                        return SyncOutcome::skipped(action.key(), SkipReason::Cancelled);
                    }
                    this.push(folder_id, action).await
                })
                .buffer_unordered(concurrency);
            while let Some(outcome) = results.next().await {
                if outcome.kind == OutcomeKind::Failed {
                    failed_pushes.insert(outcome.key.clone());
                }
                record(sink, &mut outcomes, outcome);
            }
        }

        // A key whose upload/update failed keeps its local edit; never pull over it.
        let downloads: Vec<DownloadAction> = plan
            .downloads
            .into_iter()
            .filter(|d| !failed_pushes.contains(&d.key))
            .collect();
        info!("Pass 2/2: {} downloads", downloads.len());
        {
            let mut results = stream::iter(downloads)
                .map(move |action| async move {
                    if opts.is_cancelled() {
                        return SyncOutcome::skipped(action.key, SkipReason::Cancelled);
                    }
                    this.pull(root, action).await
                })
                .buffer_unordered(concurrency);
            while let Some(outcome) = results.next().await {
                record(sink, &mut outcomes, outcome);
            }
        }

        Execution {
            outcomes,
            cancelled: opts.is_cancelled(),
        }
    }
}
