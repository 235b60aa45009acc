use std::fs;
use std::io::Write;
use std::time::Duration;

use camino::{Utf8Path, Utf8PathBuf};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use vaultsync_core::IgnorePolicy;

use crate::ignore_file::merged_patterns;
use crate::{
    clamp_concurrency, CONFIG_FILE_NAME, DEFAULT_FOLDER_NAME, DEFAULT_MAX_CONCURRENCY,
    DEFAULT_RETRY_ATTEMPTS, DEFAULT_RETRY_BASE_DELAY_MS,
};

const QUALIFIER: &str = "com";
const ORG: &str = "vaultsync";
const APP: &str = "vaultsync";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not determine config directory")]
    NoConfigDir,
    #[error("config path is not valid UTF-8: {0}")]
    NonUtf8Path(String),
    #[error("failed to read {path}: {source}")]
    Read {
        path: Utf8PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse {path}: {source}")]
    Parse {
        path: Utf8PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("failed to write {path}: {source}")]
    Write {
        path: Utf8PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid setting: {0}")]
    Invalid(String),
}

/// Persisted run settings. Every field is optional on disk; command-line flags
/// override whatever is loaded here.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncSettings {
    pub local_root: Option<Utf8PathBuf>,
    pub folder_name: String,
    pub folder_id: Option<String>,
    pub ignore_file: Option<Utf8PathBuf>,
    pub excludes: Vec<String>,
    pub max_concurrency: usize,
    pub retry_attempts: u32,
    pub retry_base_delay_ms: u64,
    pub requests_per_second: Option<u32>,
    pub token_file: Option<Utf8PathBuf>,
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            local_root: None,
            folder_name: DEFAULT_FOLDER_NAME.to_string(),
            folder_id: None,
            ignore_file: None,
            excludes: Vec::new(),
            max_concurrency: DEFAULT_MAX_CONCURRENCY,
            retry_attempts: DEFAULT_RETRY_ATTEMPTS,
            retry_base_delay_ms: DEFAULT_RETRY_BASE_DELAY_MS,
            requests_per_second: None,
            token_file: None,
        }
    }
}

/// `<config dir>/vaultsync.json`, creating the directory if needed.
pub fn default_config_path() -> Result<Utf8PathBuf, ConfigError> {
    let dirs = ProjectDirs::from(QUALIFIER, ORG, APP).ok_or(ConfigError::NoConfigDir)?;
    let dir = Utf8PathBuf::from_path_buf(dirs.config_dir().to_path_buf())
        .map_err(|p| ConfigError::NonUtf8Path(p.to_string_lossy().into_owned()))?;
    if !dir.exists() {
        fs::create_dir_all(&dir).map_err(|source| ConfigError::Write {
            path: dir.clone(),
            source,
        })?;
    }
    Ok(dir.join(CONFIG_FILE_NAME))
}

impl SyncSettings {
    pub fn load(path: &Utf8Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_owned(),
            source,
        })?;
        let settings: SyncSettings =
            serde_json::from_str(&content).map_err(|source| ConfigError::Parse {
                path: path.to_owned(),
                source,
            })?;
        settings.validate()?;
        Ok(settings)
    }

    /// Missing file means defaults. A file that exists but does not parse is
    /// still an error.
    pub fn load_or_default(path: &Utf8Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Ok(Self::default());
        }
        Self::load(path)
    }

    pub fn save(&self, path: &Utf8Path) -> Result<(), ConfigError> {
        let json = serde_json::to_string_pretty(self).map_err(|e| {
            ConfigError::Invalid(format!("cannot serialize settings: {e}"))
        })?;
        atomic_write(path, json.as_bytes()).map_err(|source| ConfigError::Write {
            path: path.to_owned(),
            source,
        })
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.folder_id.is_none() && self.folder_name.trim().is_empty() {
            return Err(ConfigError::Invalid(
                "folder_name must not be empty when no folder_id is set".into(),
            ));
        }
        if matches!(&self.folder_id, Some(id) if id.trim().is_empty()) {
            return Err(ConfigError::Invalid("folder_id must not be empty".into()));
        }
        if self.retry_attempts == 0 {
            return Err(ConfigError::Invalid("retry_attempts must be at least 1".into()));
        }
        if self.requests_per_second == Some(0) {
            return Err(ConfigError::Invalid(
                "requests_per_second must be at least 1".into(),
            ));
        }
        Ok(())
    }

    pub fn concurrency(&self) -> usize {
        clamp_concurrency(self.max_concurrency)
    }

    pub fn retry_base_delay(&self) -> Duration {
        Duration::from_millis(self.retry_base_delay_ms)
    }

    /// Built-in excludes, then `excludes`, then the ignore file if one is set.
    pub fn ignore_policy(&self) -> Result<IgnorePolicy, ConfigError> {
        let patterns = merged_patterns(&self.excludes, self.ignore_file.as_deref())?;
        Ok(IgnorePolicy::new(patterns))
    }
}

fn atomic_write(path: &Utf8Path, contents: &[u8]) -> std::io::Result<()> {
    let tmp_path = Utf8PathBuf::from(format!("{path}.tmp"));
    if let Some(parent) = path.parent() {
        if !parent.as_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }

    let mut file = fs::File::create(&tmp_path)?;
    file.write_all(contents)?;
    file.sync_all()?;
    drop(file);

    match fs::rename(&tmp_path, path) {
        Ok(()) => {}
        Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
            fs::remove_file(path).ok();
            fs::rename(&tmp_path, path)?;
        }
        Err(e) => {
            fs::remove_file(&tmp_path).ok();
            return Err(e);
        }
    }

    if let Some(parent) = path.parent() {
        if let Ok(dir) = fs::File::open(parent) {
            let _ = dir.sync_all();
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_path(dir: &tempfile::TempDir, name: &str) -> Utf8PathBuf {
        Utf8PathBuf::from_path_buf(dir.path().join(name)).unwrap()
    }

    #[test]
    fn missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let settings = SyncSettings::load_or_default(&temp_path(&dir, "absent.json")).unwrap();
        assert_eq!(settings, SyncSettings::default());
        assert_eq!(settings.folder_name, DEFAULT_FOLDER_NAME);
        assert_eq!(settings.concurrency(), DEFAULT_MAX_CONCURRENCY);
    }

    #[test]
    fn partial_file_fills_in_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = temp_path(&dir, CONFIG_FILE_NAME);
        fs::write(&path, r#"{ "folder_id": "abc", "max_concurrency": 99 }"#).unwrap();

        let settings = SyncSettings::load(&path).unwrap();
        assert_eq!(settings.folder_id.as_deref(), Some("abc"));
        assert_eq!(settings.retry_attempts, DEFAULT_RETRY_ATTEMPTS);
        assert_eq!(settings.concurrency(), crate::MAX_CONCURRENCY);
    }

    #[test]
    fn save_then_load_keeps_every_field() {
        let dir = tempfile::tempdir().unwrap();
        let path = temp_path(&dir, "nested/vaultsync.json");
        let settings = SyncSettings {
            local_root: Some("/home/me/vault".into()),
            excludes: vec!["drafts".into()],
            requests_per_second: Some(8),
            token_file: Some("/home/me/token.json".into()),
            ..SyncSettings::default()
        };
        settings.save(&path).unwrap();
        assert!(!Utf8PathBuf::from(format!("{path}.tmp")).exists());
        assert_eq!(SyncSettings::load(&path).unwrap(), settings);
    }

    #[test]
    fn malformed_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = temp_path(&dir, CONFIG_FILE_NAME);
        fs::write(&path, "{ not json").unwrap();
        assert!(matches!(
            SyncSettings::load_or_default(&path),
            Err(ConfigError::Parse { .. })
        ));
    }

    #[test]
    fn zero_attempts_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = temp_path(&dir, CONFIG_FILE_NAME);
        fs::write(&path, r#"{ "retry_attempts": 0 }"#).unwrap();
        assert!(matches!(
            SyncSettings::load(&path),
            Err(ConfigError::Invalid(_))
        ));
    }

    #[test]
    fn ignore_policy_merges_all_sources() {
        let dir = tempfile::tempdir().unwrap();
        let ignore = temp_path(&dir, ".vaultsyncignore");
        fs::write(&ignore, "# local only\ntemplates\n").unwrap();
        let settings = SyncSettings {
            excludes: vec!["drafts".into()],
            ignore_file: Some(ignore),
            ..SyncSettings::default()
        };

        let policy = settings.ignore_policy().unwrap();
        assert!(policy.should_skip(".DS_Store"));
        assert!(policy.should_skip("debug.log"));
        assert!(policy.should_skip("drafts"));
        assert!(policy.should_skip("templates"));
        assert!(!policy.should_skip("notes.md"));
    }

    #[test]
    fn missing_ignore_file_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let settings = SyncSettings {
            ignore_file: Some(temp_path(&dir, "nope")),
            ..SyncSettings::default()
        };
        assert!(matches!(
            settings.ignore_policy(),
            Err(ConfigError::Read { .. })
        ));
    }
}
