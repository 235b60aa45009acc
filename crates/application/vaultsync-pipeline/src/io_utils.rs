use camino::Utf8Path;
use std::time::Duration;
use tracing::debug;
use vaultsync_core::ignore::PART_SUFFIX;

/// Rename with a short backoff. Scanners and editors briefly hold handles on
/// freshly written files on some platforms.
pub async fn robust_rename(from: &Utf8Path, to: &Utf8Path) -> std::io::Result<()> {
    let mut attempt = 0u32;
    let max_attempts = 6u32;
    let mut backoff = Duration::from_millis(50);

    loop {
        match tokio::fs::rename(from.as_std_path(), to.as_std_path()).await {
            Ok(()) => return Ok(()),
            Err(e) => {
                attempt += 1;
                if attempt >= max_attempts {
                    return Err(e);
                }
                debug!(%from, %to, attempt, error = %e, "rename failed, retrying");
                tokio::time::sleep(backoff).await;
                backoff = std::cmp::min(backoff * 2, Duration::from_millis(1000));
            }
        }
    }
}

/// Sibling temp path a download streams into before it is renamed over `target`.
pub fn partial_path(target: &Utf8Path) -> camino::Utf8PathBuf {
    let name = target.file_name().unwrap_or("download");
    target.with_file_name(format!("{name}{PART_SUFFIX}"))
}
