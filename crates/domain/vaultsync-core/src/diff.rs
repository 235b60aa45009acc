use crate::path_utils::SyncPath;
use crate::{
    fingerprints_match, BlockedKey, DownloadAction, FailureKind, LocalFingerprint, LocalSnapshot,
    RemoteSnapshot, SkipReason, SkippedEntry, SyncPlan, UpdateAction, UploadAction,
};
use std::collections::HashSet;

/// Partition both snapshots into the upload/update pass and the download pass.
///
/// Every key present locally is claimed by the upload/update pass. Because that
/// pass commits before the download pass runs, a claimed key can never need a
/// download afterwards: either it was unchanged, or the remote now holds the
/// local bytes. The download pass therefore only sees remote-only keys, which is
/// how "local wins" falls out of the ordering.
pub fn diff(local: &LocalSnapshot, remote: &RemoteSnapshot) -> SyncPlan {
    let mut plan = SyncPlan::default();
    plan.skipped.extend(local.skipped.iter().cloned());
    plan.skipped.extend(remote.skipped.iter().cloned());
    plan.blocked.extend(local.walk_errors.iter().cloned());

    let mut claimed: HashSet<&str> = HashSet::new();
    claimed.extend(local.walk_errors.iter().map(|w| w.key.as_str()));

    for (key, local_entry) in &local.entries {
        claimed.insert(key.as_str());

        let local_fp = match &local_entry.fingerprint {
            LocalFingerprint::Ready(fp) => fp,
            LocalFingerprint::Unreadable(msg) => {
                plan.blocked.push(BlockedKey {
                    key: key.clone(),
                    failure: FailureKind::LocalIo,
                    reason: format!("cannot hash local file: {msg}"),
                });
                continue;
            }
        };

        match remote.entries.get(key) {
            None => plan.uploads.push(UploadAction {
                key: key.clone(),
                source: local_entry.abs_path.clone(),
                size: local_entry.size,
                fingerprint: local_fp.clone(),
            }),
            Some(remote_entry) => match remote_entry.fingerprint.as_deref() {
                // A native document has no bytes to compare with and cannot be
                // overwritten with file content, so the local copy is not
                // pushed. It stays skipped on both sides.
                None => plan.skipped.push(SkippedEntry {
                    key: key.clone(),
                    reason: SkipReason::NoRemoteFingerprint,
                }),
                Some(remote_fp) if fingerprints_match(local_fp, remote_fp) => {
                    plan.unchanged.push(key.clone());
                }
                Some(remote_fp) => plan.updates.push(UpdateAction {
                    key: key.clone(),
                    remote_id: remote_entry.id.clone(),
                    source: local_entry.abs_path.clone(),
                    size: local_entry.size,
                    fingerprint: local_fp.clone(),
                    remote_fingerprint: remote_fp.to_string(),
                }),
            },
        }
    }

    for (key, remote_entry) in &remote.entries {
        if claimed.contains(key.as_str()) {
            continue;
        }

        let Some(expected) = remote_entry.fingerprint.as_ref() else {
            plan.skipped.push(SkippedEntry {
                key: key.clone(),
                reason: SkipReason::NoRemoteFingerprint,
            });
            continue;
        };

        if let Some(unread) = local
            .walk_errors
            .iter()
            .find(|w| is_below(key, &w.key))
        {
            plan.blocked.push(BlockedKey {
                key: key.clone(),
                failure: FailureKind::LocalIo,
                reason: format!("local path {} could not be read", unread.key),
            });
            continue;
        }

        if !SyncPath::verify_safe(key) {
            plan.blocked.push(BlockedKey {
                key: key.clone(),
                failure: FailureKind::LocalIo,
                reason: format!("remote name is not a safe relative path: {key}"),
            });
            continue;
        }

        plan.downloads.push(DownloadAction {
            key: key.clone(),
            remote_id: remote_entry.id.clone(),
            expected_fingerprint: expected.clone(),
            size: remote_entry.size,
            modified: remote_entry.modified,
        });
    }

    plan
}

/// Whether `key` is `dir` itself or lies under it. `.` is the root.
fn is_below(key: &str, dir: &str) -> bool {
    dir == "."
        || key == dir
        || key
            .strip_prefix(dir)
            .is_some_and(|rest| rest.starts_with('/'))
}
