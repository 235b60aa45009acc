use camino::Utf8PathBuf;
use clap::{Parser, Subcommand};
use tracing::Level;
use tracing_subscriber::{EnvFilter, FmtSubscriber};
use vaultsync_cli::context::{load_settings, CliContext};
use vaultsync_cli::{commands, RunArgs};

#[derive(Parser)]
#[command(author, version, about)]
struct Cli {
    #[arg(short, long, global = true)]
    verbose: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Reconcile the local vault with its Drive folder
    Sync {
        #[command(flatten)]
        args: RunArgs,
        /// Report what would happen without transferring anything
        #[arg(long)]
        dry_run: bool,
    },
    /// Same as `sync --dry-run`
    Plan {
        #[command(flatten)]
        args: RunArgs,
    },
    /// List the remote folder
    Ls {
        #[command(flatten)]
        args: RunArgs,
    },
    /// Hash a local directory and print the snapshot as JSON
    Scan {
        path: Utf8PathBuf,
        #[arg(short, long)]
        output: Option<Utf8PathBuf>,
        #[arg(long, env = "VAULTSYNC_CONFIG")]
        config: Option<Utf8PathBuf>,
        #[arg(long)]
        ignore_file: Option<Utf8PathBuf>,
    },
    /// Resolve the remote folder, creating it if needed, and print its id
    Folder {
        #[command(flatten)]
        args: RunArgs,
    },
}

fn init_logging(verbose: bool) {
    let builder = FmtSubscriber::builder().with_writer(std::io::stderr);
    if std::env::var_os("RUST_LOG").is_some() {
        let subscriber = builder.with_env_filter(EnvFilter::from_default_env()).finish();
        tracing::subscriber::set_global_default(subscriber).expect("default subscriber");
        return;
    }
    let level = if verbose { Level::DEBUG } else { Level::WARN };
    let subscriber = builder.with_max_level(level).finish();
    tracing::subscriber::set_global_default(subscriber).expect("default subscriber");
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match cli.command {
        Commands::Sync { args, dry_run } => {
            let ctx = CliContext::from_args(&args)?;
            let report = commands::cmd_sync(&ctx, dry_run).await?;
            let failed = report.stats().failed;
            if failed > 0 {
                anyhow::bail!("{} keys failed to sync", failed);
            }
            if report.cancelled {
                anyhow::bail!("Sync was cancelled");
            }
        }
        Commands::Plan { args } => {
            let ctx = CliContext::from_args(&args)?;
            commands::cmd_sync(&ctx, true).await?;
        }
        Commands::Ls { args } => {
            let ctx = CliContext::from_args(&args)?;
            commands::cmd_ls(&ctx).await?;
        }
        Commands::Scan {
            path,
            output,
            config,
            ignore_file,
        } => {
            let settings = load_settings(&RunArgs {
                config,
                ignore_file,
                ..RunArgs::default()
            })?;
            commands::cmd_scan(path, settings.ignore_policy()?, output).await?;
        }
        Commands::Folder { args } => {
            let ctx = CliContext::from_args(&args)?;
            commands::cmd_folder(&ctx).await?;
        }
    }

    Ok(())
}
