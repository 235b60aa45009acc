//! Central configuration constants for runtime limits and defaults.

pub mod ignore_file;
pub mod settings;

pub use settings::{default_config_path, ConfigError, SyncSettings};

/// Remote folder used when neither a name nor an id is configured.
pub const DEFAULT_FOLDER_NAME: &str = "ObsidianVaultGoogleDrive";

/// Default number of concurrent transfers per pass.
pub const DEFAULT_MAX_CONCURRENCY: usize = 4;

/// Minimum allowed concurrent transfers.
pub const MIN_CONCURRENCY: usize = 1;

/// Maximum allowed concurrent transfers.
pub const MAX_CONCURRENCY: usize = 16;

/// Attempts per remote call, including the first.
pub const DEFAULT_RETRY_ATTEMPTS: u32 = 5;

/// Backoff base; attempt `i` sleeps `base * 2^i`.
pub const DEFAULT_RETRY_BASE_DELAY_MS: u64 = 1000;

pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 300;

/// Editor state and OS clutter that never leaves the machine.
pub const DEFAULT_EXCLUDES: &[&str] = &[
    ".DS_Store",
    "workspace.json",
    "appearance.json",
    "app.json",
    ".log",
];

pub const CONFIG_FILE_NAME: &str = "vaultsync.json";

/// Convenience function to clamp a concurrency value into allowed range.
pub fn clamp_concurrency(v: usize) -> usize {
    v.clamp(MIN_CONCURRENCY, MAX_CONCURRENCY)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clamp_keeps_values_in_range() {
        assert_eq!(clamp_concurrency(0), 1);
        assert_eq!(clamp_concurrency(4), 4);
        assert_eq!(clamp_concurrency(64), 16);
    }
}
