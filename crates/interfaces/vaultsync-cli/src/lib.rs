pub mod commands;
pub mod context;

use camino::Utf8PathBuf;
use clap::Args;

/// Options shared by every command that talks to Drive or reads the vault.
#[derive(Args, Clone, Debug, Default)]
pub struct RunArgs {
    /// Local vault directory
    #[arg(long, env = "VAULTSYNC_ROOT")]
    pub root: Option<Utf8PathBuf>,
    /// Remote folder name (looked up, created on first sync)
    #[arg(long)]
    pub folder: Option<String>,
    /// Remote folder id; wins over any folder name
    #[arg(long, env = "VAULTSYNC_FOLDER_ID")]
    pub folder_id: Option<String>,
    /// Settings file (defaults to the per-user config directory)
    #[arg(long, env = "VAULTSYNC_CONFIG")]
    pub config: Option<Utf8PathBuf>,
    /// Extra exclude patterns, one per line
    #[arg(long)]
    pub ignore_file: Option<Utf8PathBuf>,
    /// Concurrent transfers per pass
    #[arg(short, long)]
    pub threads: Option<usize>,
    /// OAuth access token
    #[arg(long, env = "VAULTSYNC_TOKEN", hide_env_values = true)]
    pub token: Option<String>,
    /// JSON file holding `access_token`, re-read on every request
    #[arg(long, env = "VAULTSYNC_TOKEN_FILE")]
    pub token_file: Option<Utf8PathBuf>,
    /// Cap on Drive requests per second
    #[arg(long)]
    pub requests_per_second: Option<u32>,
    #[arg(long, env = "VAULTSYNC_API_BASE", hide = true)]
    pub api_base: Option<String>,
}
