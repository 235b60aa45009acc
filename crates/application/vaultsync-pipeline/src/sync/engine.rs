use std::sync::Arc;

use tracing::{error, info};
use vaultsync_core::diff::diff;
use vaultsync_core::{IgnorePolicy, LocalSnapshot, RemoteSnapshot, SyncOutcome, SyncPlan};
use vaultsync_infra::retry::RetryingRemoteClient;
use vaultsync_scanner::{Scanner, ScannerError};

use crate::index::RemoteDirectoryIndex;
use crate::sync::execute::{DefaultPlanExecutor, PlanExecutor};
use crate::sync::sink::OutcomeSink;
use crate::sync::{FolderSelector, RunReport, SyncError, SyncRequest};

const PLANNED: &str = "planned";

/// The partition for one run together with the folder it was computed against.
#[derive(Debug, Clone)]
pub struct PlannedRun {
    pub folder_id: Option<String>,
    pub local: LocalSnapshot,
    pub remote: RemoteSnapshot,
    pub plan: SyncPlan,
}

pub struct DefaultSyncEngine {
    index: RemoteDirectoryIndex,
    scanner: Arc<Scanner>,
    executor: Box<dyn PlanExecutor>,
}

impl DefaultSyncEngine {
    pub fn new(client: Arc<RetryingRemoteClient>) -> Self {
        let executor = Box::new(DefaultPlanExecutor::new(client.clone()));
        Self::with_components(client, Scanner::default(), executor)
    }

    pub fn with_components(
        client: Arc<RetryingRemoteClient>,
        scanner: Scanner,
        executor: Box<dyn PlanExecutor>,
    ) -> Self {
        Self {
            index: RemoteDirectoryIndex::new(client),
            scanner: Arc::new(scanner),
            executor,
        }
    }

    pub fn index(&self) -> &RemoteDirectoryIndex {
        &self.index
    }

    /// Resolve the folder id. With `create` unset a missing folder is `None`.
    pub async fn resolve_folder(
        &self,
        req: &SyncRequest,
        create: bool,
    ) -> Result<Option<String>, SyncError> {
        match &req.folder {
            FolderSelector::Id(id) if id.trim().is_empty() => {
                Err(SyncError::Configuration("folder id is empty".into()))
            }
            FolderSelector::Id(id) => Ok(Some(id.trim().to_string())),
            FolderSelector::Name(name) if name.trim().is_empty() => {
                Err(SyncError::Configuration("folder name is empty".into()))
            }
            FolderSelector::Name(name) if create => {
                Ok(Some(self.index.ensure_folder(name).await?.id))
            }
            FolderSelector::Name(name) => Ok(self.index.find_folder(name).await?.map(|f| f.id)),
        }
    }

    /// Step 1: Disk only. Walk and hash on the blocking pool.
    pub async fn scan_local_state(&self, req: &SyncRequest) -> Result<LocalSnapshot, SyncError> {
        let scanner = self.scanner.clone();
        let root = req.local_root.clone();
        let policy = req.policy.clone();
        tokio::task::spawn_blocking(move || scanner.scan(&root, &policy))
            .await
            .map_err(|e| SyncError::Local(format!("scan task failed: {e}")))?
            .map_err(scan_error)
    }

    /// Step 2: Network only. List the sync folder.
    pub async fn fetch_remote_state(
        &self,
        folder_id: &str,
        policy: &IgnorePolicy,
    ) -> Result<RemoteSnapshot, SyncError> {
        self.index.list_entries(folder_id, policy).await
    }

    /// Step 3: CPU only. Diff both snapshots into a SyncPlan.
    pub fn compute_plan(&self, local: &LocalSnapshot, remote: &RemoteSnapshot) -> SyncPlan {
        diff(local, remote)
    }

    /// Pure planning step: scan local, list remote, diff. Never creates the
    /// folder; a missing folder compares against an empty snapshot.
    pub async fn plan(&self, req: &SyncRequest) -> Result<PlannedRun, SyncError> {
        let local = self.scan_local_state(req).await?;
        let folder_id = self.resolve_folder(req, false).await?;
        let remote = match &folder_id {
            Some(id) => self.fetch_remote_state(id, &req.policy).await?,
            None => RemoteSnapshot::default(),
        };
        let plan = self.compute_plan(&local, &remote);
        Ok(PlannedRun {
            folder_id,
            local,
            remote,
            plan,
        })
    }

    /// Plan + execute. Honors `dry_run`.
    pub async fn run(
        &self,
        req: &SyncRequest,
        sink: &dyn OutcomeSink,
    ) -> Result<RunReport, SyncError> {
        let result = self.run_inner(req, sink).await;
        if let Err(e) = &result {
            error!("Sync of {} aborted: {}", req.local_root, e);
        }
        result
    }

    async fn run_inner(
        &self,
        req: &SyncRequest,
        sink: &dyn OutcomeSink,
    ) -> Result<RunReport, SyncError> {
        if req.options.dry_run {
            let planned = self.plan(req).await?;
            let outcomes = planned_outcomes(&planned.plan);
            for o in &outcomes {
                sink.record(o);
            }
            return Ok(RunReport {
                folder_id: planned.folder_id,
                outcomes,
                cancelled: false,
                dry_run: true,
            });
        }

        // Scan first so a bad root fails before anything is created remotely.
        let local = self.scan_local_state(req).await?;
        let folder_id = self
            .resolve_folder(req, true)
            .await?
            .ok_or_else(|| SyncError::Remote("folder could not be resolved".into()))?;
        let remote = self.fetch_remote_state(&folder_id, &req.policy).await?;
        let plan = self.compute_plan(&local, &remote);
        info!(
            "Plan: {} uploads, {} updates, {} downloads, {} unchanged",
            plan.uploads.len(),
            plan.updates.len(),
            plan.downloads.len(),
            plan.unchanged.len()
        );

        let execution = self
            .executor
            .execute(&req.local_root, &folder_id, plan, &req.options, sink)
            .await;
        Ok(RunReport {
            folder_id: Some(folder_id),
            outcomes: execution.outcomes,
            cancelled: execution.cancelled,
            dry_run: false,
        })
    }
}

fn scan_error(e: ScannerError) -> SyncError {
    match e {
        ScannerError::RootMissing(_) | ScannerError::RootNotDirectory(_) => {
            SyncError::Configuration(e.to_string())
        }
        ScannerError::Io(_) => SyncError::Local(e.to_string()),
    }
}

/// Outcomes a dry run reports: what the run would do, marked as planned.
pub fn planned_outcomes(plan: &SyncPlan) -> Vec<SyncOutcome> {
    let planned = |mut o: SyncOutcome| {
        o.detail = Some(PLANNED.to_string());
        o
    };
    let mut out = Vec::with_capacity(
        plan.transfer_count() + plan.unchanged.len() + plan.skipped.len() + plan.blocked.len(),
    );
    out.extend(plan.unchanged.iter().map(SyncOutcome::unchanged));
    out.extend(
        plan.skipped
            .iter()
            .map(|s| SyncOutcome::skipped(s.key.clone(), s.reason)),
    );
    out.extend(
        plan.blocked
            .iter()
            .map(|b| SyncOutcome::failed(b.key.clone(), b.failure, b.reason.clone())),
    );
    out.extend(
        plan.uploads
            .iter()
            .map(|a| planned(SyncOutcome::uploaded(a.key.clone(), a.size))),
    );
    out.extend(
        plan.updates
            .iter()
            .map(|a| planned(SyncOutcome::updated(a.key.clone(), a.size))),
    );
    out.extend(
        plan.downloads
            .iter()
            .map(|a| planned(SyncOutcome::downloaded(a.key.clone(), a.size.unwrap_or(0)))),
    );
    out
}
