use crate::context::CliContext;
use anyhow::{Context, Result};
use camino::Utf8PathBuf;
use humansize::{format_size, DECIMAL};
use indicatif::{ProgressBar, ProgressStyle};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use vaultsync_core::{FailureKind, IgnorePolicy, LocalSnapshot, RemoteSnapshot, SyncOutcome};
use vaultsync_pipeline::{FolderSelector, RunReport, ScanStats, SyncOptions};
use vaultsync_scanner::Scanner;

fn spinner() -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::default_spinner()
            .template("{spinner:.green} {msg}")
            .unwrap(),
    );
    pb.enable_steady_tick(Duration::from_millis(100));
    pb
}

fn progress_scanner(pb: &ProgressBar) -> Scanner {
    let pb = pb.clone();
    Scanner::default().with_progress(move |stats: ScanStats| {
        pb.set_message(format!(
            "Hashed {}/{} files ({})",
            stats.files_hashed,
            stats.total_files,
            format_size(stats.bytes_processed, DECIMAL)
        ));
    })
}

fn describe(folder: &FolderSelector) -> String {
    match folder {
        FolderSelector::Name(name) => format!("'{name}'"),
        FolderSelector::Id(id) => format!("id {id}"),
    }
}

fn failure_label(kind: FailureKind) -> &'static str {
    match kind {
        FailureKind::TransientExhausted => "retries exhausted",
        FailureKind::Permanent => "rejected",
        FailureKind::LocalIo => "local I/O",
    }
}

pub fn format_outcome(o: &SyncOutcome) -> String {
    let mut line = format!("{:>10}  {}", o.kind.to_string(), o.key);
    if o.kind.is_transfer() {
        line.push_str(&format!(" ({})", format_size(o.bytes, DECIMAL)));
    }
    match (o.failure, o.detail.as_deref()) {
        (Some(kind), Some(detail)) => {
            line.push_str(&format!(" [{}: {}]", failure_label(kind), detail))
        }
        (None, Some(detail)) => line.push_str(&format!(" [{detail}]")),
        _ => {}
    }
    line
}

pub async fn cmd_scan(
    path: Utf8PathBuf,
    policy: IgnorePolicy,
    output: Option<Utf8PathBuf>,
) -> Result<LocalSnapshot> {
    println!(":: Scanning directory: {}", path);

    let pb = spinner();
    let scanner = progress_scanner(&pb);
    let root = path.clone();
    let snapshot = tokio::task::spawn_blocking(move || scanner.scan(&root, &policy)).await??;
    pb.finish_with_message("Scan complete.");

    let json = serde_json::to_string_pretty(&snapshot)?;
    if let Some(out) = output {
        std::fs::write(&out, json).with_context(|| format!("Failed to write {out}"))?;
        println!(":: Saved snapshot to {}", out);
    } else {
        println!("{}", json);
    }
    Ok(snapshot)
}

/// Scan, diff and (unless `dry_run`) transfer. Ctrl-C stops new transfers;
/// the ones in flight finish.
pub async fn cmd_sync(ctx: &CliContext, dry_run: bool) -> Result<RunReport> {
    let root = ctx.local_root()?;
    println!(":: Synchronizing...");
    println!("   Local:  {}", root);
    println!("   Folder: {}", describe(&ctx.folder_selector()));
    if dry_run {
        println!("   Mode:   dry run, nothing is transferred");
    }

    let pb = spinner();
    let engine = ctx.engine(progress_scanner(&pb))?;
    let cancel = CancellationToken::new();
    let options = SyncOptions {
        max_concurrency: ctx.settings.concurrency(),
        dry_run,
        cancel: Some(cancel.clone()),
    };
    let req = ctx.request(root, options)?;

    let ctrl_c = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            cancel.cancel();
        }
    });

    let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel::<SyncOutcome>();
    let engine_handle = tokio::spawn(async move { engine.run(&req, &tx).await });

    let mut seen = 0u64;
    while let Some(outcome) = rx.recv().await {
        seen += 1;
        pb.println(format_outcome(&outcome));
        pb.set_message(format!("{} keys done", seen));
    }

    let result = engine_handle.await.context("Sync task failed")?;
    ctrl_c.abort();
    let report = result?;
    pb.finish_with_message(if report.dry_run {
        "Plan complete."
    } else {
        "Sync complete."
    });

    let stats = report.stats();
    println!(
        "\n:: {}",
        if report.dry_run { "Plan Result" } else { "Sync Result" }
    );
    if let Some(id) = &report.folder_id {
        println!("   Folder id:  {}", id);
    }
    println!(
        "   Uploaded:   {} ({})",
        stats.uploaded + stats.updated,
        format_size(stats.bytes_uploaded, DECIMAL)
    );
    println!(
        "   Downloaded: {} ({})",
        stats.downloaded,
        format_size(stats.bytes_downloaded, DECIMAL)
    );
    println!("   Unchanged:  {}", stats.unchanged);
    println!("   Skipped:    {}", stats.skipped);
    println!("   Failed:     {}", stats.failed);
    if report.cancelled {
        println!("   Status:     Cancelled");
    }
    Ok(report)
}

/// Print the remote snapshot. A missing folder is an error; `ls` never creates it.
pub async fn cmd_ls(ctx: &CliContext) -> Result<RemoteSnapshot> {
    let engine = ctx.engine(Scanner::default())?;
    let req = ctx.request(Utf8PathBuf::new(), SyncOptions::default())?;
    let folder = describe(&req.folder);
    let folder_id = engine
        .resolve_folder(&req, false)
        .await?
        .with_context(|| format!("Remote folder {folder} does not exist"))?;
    let remote = engine.fetch_remote_state(&folder_id, &req.policy).await?;

    println!(":: Remote folder {} ({} files)", folder_id, remote.entries.len());
    for entry in remote.entries.values() {
        let modified = entry
            .modified
            .map(|m| m.format("%Y-%m-%d %H:%M").to_string())
            .unwrap_or_else(|| "-".into());
        println!(
            "{:<32}  {:>10}  {:<16}  {}",
            entry.fingerprint.as_deref().unwrap_or("-"),
            entry
                .size
                .map(|s| format_size(s, DECIMAL))
                .unwrap_or_else(|| "-".into()),
            modified,
            entry.name
        );
    }
    for skipped in &remote.skipped {
        println!("   skipped {} ({})", skipped.key, skipped.reason);
    }
    Ok(remote)
}

/// Resolve the sync folder, creating it by name if needed, and print its id.
pub async fn cmd_folder(ctx: &CliContext) -> Result<String> {
    let engine = ctx.engine(Scanner::default())?;
    let req = ctx.request(Utf8PathBuf::new(), SyncOptions::default())?;
    let id = engine
        .resolve_folder(&req, true)
        .await?
        .context("Remote folder could not be resolved")?;
    println!("{}", id);
    Ok(id)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn outcome_lines_carry_size_and_reason() {
        let line = format_outcome(&SyncOutcome::uploaded("notes/a.md", 2_000));
        assert_eq!(line, "  uploaded  notes/a.md (2 kB)");

        let line = format_outcome(&SyncOutcome::failed(
            "b.md",
            FailureKind::TransientExhausted,
            "503",
        ));
        assert_eq!(line, "    failed  b.md [retries exhausted: 503]");

        let line = format_outcome(&SyncOutcome::unchanged("c.md"));
        assert_eq!(line, " unchanged  c.md");
    }
}
