use camino::Utf8PathBuf;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

pub mod diff;
pub mod ignore;
pub mod path_utils;

pub use ignore::IgnorePolicy;

/// Lowercase hex MD5 of a file's bytes.
pub type Fingerprint = String;

/// Compare two fingerprints. Drive reports lowercase hex, but nothing guarantees it.
pub fn fingerprints_match(a: &str, b: &str) -> bool {
    a.eq_ignore_ascii_case(b)
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case", tag = "state", content = "value")]
pub enum LocalFingerprint {
    Ready(Fingerprint),
    /// The file could not be read while hashing; carries the IO error message.
    Unreadable(String),
}

impl LocalFingerprint {
    pub fn ready(&self) -> Option<&str> {
        match self {
            LocalFingerprint::Ready(fp) => Some(fp),
            LocalFingerprint::Unreadable(_) => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LocalEntry {
    /// POSIX-style path relative to the sync root. Also the remote name.
    pub rel_path: String,
    pub abs_path: Utf8PathBuf,
    pub size: u64,
    pub fingerprint: LocalFingerprint,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RemoteEntry {
    pub id: String,
    pub name: String,
    /// Absent for native Google document types.
    pub fingerprint: Option<Fingerprint>,
    pub modified: Option<DateTime<Utc>>,
    pub size: Option<u64>,
    pub mime_type: Option<String>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    Ignored,
    IgnoredDirectory,
    NoRemoteFingerprint,
    Cancelled,
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SkipReason::Ignored => "ignored",
            SkipReason::IgnoredDirectory => "ignored directory",
            SkipReason::NoRemoteFingerprint => "remote item has no content fingerprint",
            SkipReason::Cancelled => "cancelled",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SkippedEntry {
    pub key: String,
    pub reason: SkipReason,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct LocalSnapshot {
    pub entries: BTreeMap<String, LocalEntry>,
    pub skipped: Vec<SkippedEntry>,
    /// Paths the walk could not enter. What lies below them is unknown.
    #[serde(default)]
    pub walk_errors: Vec<BlockedKey>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct RemoteSnapshot {
    pub folder_id: String,
    pub entries: BTreeMap<String, RemoteEntry>,
    pub skipped: Vec<SkippedEntry>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum OutcomeKind {
    Uploaded,
    Updated,
    Unchanged,
    Downloaded,
    Skipped,
    Failed,
}

impl OutcomeKind {
    pub fn is_transfer(self) -> bool {
        matches!(
            self,
            OutcomeKind::Uploaded | OutcomeKind::Updated | OutcomeKind::Downloaded
        )
    }
}

impl fmt::Display for OutcomeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            OutcomeKind::Uploaded => "uploaded",
            OutcomeKind::Updated => "updated",
            OutcomeKind::Unchanged => "unchanged",
            OutcomeKind::Downloaded => "downloaded",
            OutcomeKind::Skipped => "skipped",
            OutcomeKind::Failed => "failed",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// Every attempt hit a transient status and the retry budget ran out.
    TransientExhausted,
    Permanent,
    LocalIo,
}

/// One entry of the per-run result log.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SyncOutcome {
    pub key: String,
    pub kind: OutcomeKind,
    pub failure: Option<FailureKind>,
    pub detail: Option<String>,
    pub bytes: u64,
}

impl SyncOutcome {
    fn new(key: impl Into<String>, kind: OutcomeKind) -> Self {
        Self {
            key: key.into(),
            kind,
            failure: None,
            detail: None,
            bytes: 0,
        }
    }

    pub fn uploaded(key: impl Into<String>, bytes: u64) -> Self {
        Self {
            bytes,
            ..Self::new(key, OutcomeKind::Uploaded)
        }
    }

    pub fn updated(key: impl Into<String>, bytes: u64) -> Self {
        Self {
            bytes,
            ..Self::new(key, OutcomeKind::Updated)
        }
    }

    pub fn downloaded(key: impl Into<String>, bytes: u64) -> Self {
        Self {
            bytes,
            ..Self::new(key, OutcomeKind::Downloaded)
        }
    }

    pub fn unchanged(key: impl Into<String>) -> Self {
        Self::new(key, OutcomeKind::Unchanged)
    }

    pub fn skipped(key: impl Into<String>, reason: SkipReason) -> Self {
        Self {
            detail: Some(reason.to_string()),
            ..Self::new(key, OutcomeKind::Skipped)
        }
    }

    pub fn failed(key: impl Into<String>, failure: FailureKind, detail: impl Into<String>) -> Self {
        Self {
            failure: Some(failure),
            detail: Some(detail.into()),
            ..Self::new(key, OutcomeKind::Failed)
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct SyncPlan {
    pub uploads: Vec<UploadAction>,
    pub updates: Vec<UpdateAction>,
    pub downloads: Vec<DownloadAction>,
    pub unchanged: Vec<String>,
    pub skipped: Vec<SkippedEntry>,
    pub blocked: Vec<BlockedKey>,
}

impl SyncPlan {
    pub fn is_noop(&self) -> bool {
        self.uploads.is_empty() && self.updates.is_empty() && self.downloads.is_empty()
    }

    pub fn transfer_count(&self) -> usize {
        self.uploads.len() + self.updates.len() + self.downloads.len()
    }
}

#[derive(Debug, Clone)]
pub struct UploadAction {
    pub key: String,
    pub source: Utf8PathBuf,
    pub size: u64,
    pub fingerprint: Fingerprint,
}

#[derive(Debug, Clone)]
pub struct UpdateAction {
    pub key: String,
    pub remote_id: String,
    pub source: Utf8PathBuf,
    pub size: u64,
    pub fingerprint: Fingerprint,
    pub remote_fingerprint: Fingerprint,
}

#[derive(Debug, Clone)]
pub struct DownloadAction {
    pub key: String,
    pub remote_id: String,
    pub expected_fingerprint: Fingerprint,
    pub size: Option<u64>,
    pub modified: Option<DateTime<Utc>>,
}

/// A key that cannot take part in either pass.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BlockedKey {
    pub key: String,
    pub failure: FailureKind,
    pub reason: String,
}
