use camino::{Utf8Path, Utf8PathBuf};
use rayon::prelude::*;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};
use vaultsync_core::path_utils::SyncPath;
use vaultsync_core::{
    BlockedKey, FailureKind, IgnorePolicy, LocalEntry, LocalFingerprint, LocalSnapshot,
    SkipReason, SkippedEntry,
};
use vaultsync_infra::hashing::ContentHasher;
use walkdir::{DirEntry, WalkDir};

#[derive(Debug, thiserror::Error)]
pub enum ScannerError {
    #[error("local root {0} does not exist")]
    RootMissing(Utf8PathBuf),
    #[error("local root {0} is not a directory")]
    RootNotDirectory(Utf8PathBuf),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Clone, Default, serde::Serialize, serde::Deserialize)]
pub struct ScanStats {
    pub files_hashed: u64,
    pub total_files: u64,
    pub bytes_processed: u64,
    pub total_bytes: u64,
}

type ProgressCb = Arc<dyn Fn(ScanStats) + Send + Sync>;

struct Candidate {
    key: String,
    abs_path: Utf8PathBuf,
    size: u64,
}

pub struct Scanner {
    hasher: ContentHasher,
    on_progress: Option<ProgressCb>,
}

impl Default for Scanner {
    fn default() -> Self {
        Self::new(ContentHasher::default())
    }
}

impl Scanner {
    pub fn new(hasher: ContentHasher) -> Self {
        Self {
            hasher,
            on_progress: None,
        }
    }

    pub fn with_progress(mut self, cb: impl Fn(ScanStats) + Send + Sync + 'static) -> Self {
        self.on_progress = Some(Arc::new(cb));
        self
    }

    /// Walk `root` and fingerprint every regular file whose path survives the
    /// ignore policy. Excluded directories are pruned, not descended into.
    /// Symlinks are not followed. A directory that cannot be read does not
    /// fail the scan; it is reported in `walk_errors` under its own key.
    pub fn scan(
        &self,
        root: &Utf8Path,
        policy: &IgnorePolicy,
    ) -> Result<LocalSnapshot, ScannerError> {
        match std::fs::metadata(root) {
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(ScannerError::RootMissing(root.to_owned()))
            }
            Err(e) => return Err(e.into()),
            Ok(meta) if !meta.is_dir() => {
                return Err(ScannerError::RootNotDirectory(root.to_owned()))
            }
            Ok(_) => {}
        }
        info!("Scanning {}", root);

        let Walked {
            candidates,
            skipped,
            walk_errors,
        } = collect_candidates(root, policy);

        let stats = ScanStats {
            total_files: candidates.len() as u64,
            total_bytes: candidates.iter().map(|c| c.size).sum(),
            ..ScanStats::default()
        };
        let hashed = AtomicU64::new(0);
        let processed = AtomicU64::new(0);

        let entries: Vec<LocalEntry> = candidates
            .into_par_iter()
            .map(|c| {
                let fingerprint = match self.hasher.fingerprint(&c.abs_path) {
                    Ok(fp) => LocalFingerprint::Ready(fp),
                    Err(e) => {
                        warn!("Cannot hash {}: {}", c.abs_path, e);
                        LocalFingerprint::Unreadable(e.to_string())
                    }
                };
                let files_hashed = hashed.fetch_add(1, Ordering::Relaxed) + 1;
                let bytes = processed.fetch_add(c.size, Ordering::Relaxed) + c.size;
                if let Some(cb) = &self.on_progress {
                    cb(ScanStats {
                        files_hashed,
                        bytes_processed: bytes,
                        ..stats.clone()
                    });
                }
                LocalEntry {
                    rel_path: c.key,
                    abs_path: c.abs_path,
                    size: c.size,
                    fingerprint,
                }
            })
            .collect();

        debug!(
            files = entries.len(),
            skipped = skipped.len(),
            walk_errors = walk_errors.len(),
            "local scan complete"
        );
        Ok(LocalSnapshot {
            entries: entries
                .into_iter()
                .map(|e| (e.rel_path.clone(), e))
                .collect(),
            skipped,
            walk_errors,
        })
    }
}

fn relative_key(root: &Utf8Path, entry: &DirEntry) -> Option<String> {
    let path = Utf8Path::from_path(entry.path())?;
    let rel = path.strip_prefix(root).ok()?;
    Some(SyncPath::normalize(rel.as_str()))
}

struct Walked {
    candidates: Vec<Candidate>,
    skipped: Vec<SkippedEntry>,
    walk_errors: Vec<BlockedKey>,
}

/// Key of the path a walk error refers to; `.` stands for the root itself.
fn walk_error_key(root: &Utf8Path, err: &walkdir::Error) -> String {
    err.path()
        .and_then(Utf8Path::from_path)
        .and_then(|p| p.strip_prefix(root).ok())
        .map(|rel| SyncPath::normalize(rel.as_str()))
        .filter(|key| !key.is_empty())
        .unwrap_or_else(|| ".".to_string())
}

fn collect_candidates(root: &Utf8Path, policy: &IgnorePolicy) -> Walked {
    let mut skipped = Vec::new();
    let mut walk_errors = Vec::new();
    let mut walked = Vec::new();
    {
        let walker = WalkDir::new(root).into_iter().filter_entry(|e| {
            if e.depth() == 0 {
                return true;
            }
            let name = e.file_name().to_string_lossy();
            if !policy.should_skip(&name) {
                return true;
            }
            if let Some(key) = relative_key(root, e) {
                let reason = if e.file_type().is_dir() {
                    SkipReason::IgnoredDirectory
                } else {
                    SkipReason::Ignored
                };
                debug!(%key, %reason, "excluded");
                skipped.push(SkippedEntry { key, reason });
            }
            false
        });

        for entry in walker {
            match entry {
                Ok(e) if e.file_type().is_file() => walked.push(e),
                Ok(_) => {}
                Err(err) => {
                    let key = walk_error_key(root, &err);
                    warn!(%key, "Walk error under {}: {}", root, err);
                    walk_errors.push(BlockedKey {
                        key,
                        failure: FailureKind::LocalIo,
                        reason: format!("cannot read local path: {err}"),
                    });
                }
            }
        }
    }

    let mut candidates = Vec::with_capacity(walked.len());
    for e in walked {
        let Some(key) = relative_key(root, &e) else {
            warn!("Skipping non UTF-8 path {}", e.path().display());
            continue;
        };
        let Some(abs_path) = Utf8Path::from_path(e.path()).map(Utf8Path::to_owned) else {
            continue;
        };
        // A file that cannot be stat'ed still goes to the hasher, which
        // reports it as unreadable.
        let size = e.metadata().map(|m| m.len()).unwrap_or(0);
        candidates.push(Candidate {
            key,
            abs_path,
            size,
        });
    }
    skipped.sort_by(|a, b| a.key.cmp(&b.key));
    walk_errors.sort_by(|a, b| a.key.cmp(&b.key));
    Walked {
        candidates,
        skipped,
        walk_errors,
    }
}
