use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use camino::Utf8PathBuf;
use vaultsync_config::{default_config_path, SyncSettings, DEFAULT_REQUEST_TIMEOUT_SECS};
use vaultsync_infra::auth::{
    AuthError, CredentialProvider, StaticTokenProvider, TokenFileProvider,
};
use vaultsync_infra::drive::{DriveEndpoints, DriveStore};
use vaultsync_infra::net::{http_client, request_limiter};
use vaultsync_infra::retry::{RetryPolicy, RetryingRemoteClient};
use vaultsync_pipeline::sync::DefaultPlanExecutor;
use vaultsync_pipeline::{DefaultSyncEngine, FolderSelector, SyncOptions, SyncRequest};
use vaultsync_scanner::Scanner;

use crate::RunArgs;

/// Load the settings file and lay the command-line flags over it.
pub fn load_settings(args: &RunArgs) -> Result<SyncSettings> {
    let mut settings = match &args.config {
        Some(path) => SyncSettings::load(path)
            .with_context(|| format!("Failed to load settings from {path}"))?,
        None => {
            let path = default_config_path().context("Could not determine config directory")?;
            SyncSettings::load_or_default(&path)
                .with_context(|| format!("Failed to load settings from {path}"))?
        }
    };

    if let Some(root) = &args.root {
        settings.local_root = Some(root.clone());
    }
    if let Some(name) = &args.folder {
        settings.folder_name = name.clone();
        settings.folder_id = None;
    }
    if let Some(id) = &args.folder_id {
        settings.folder_id = Some(id.clone());
    }
    if let Some(path) = &args.ignore_file {
        settings.ignore_file = Some(path.clone());
    }
    if let Some(threads) = args.threads {
        settings.max_concurrency = threads;
    }
    if let Some(path) = &args.token_file {
        settings.token_file = Some(path.clone());
    }
    if let Some(rps) = args.requests_per_second {
        settings.requests_per_second = Some(rps);
    }
    settings.validate().context("Invalid settings")?;
    Ok(settings)
}

/// Everything a remote command needs, resolved once.
pub struct CliContext {
    pub settings: SyncSettings,
    credentials: Arc<dyn CredentialProvider>,
    endpoints: DriveEndpoints,
}

impl CliContext {
    pub fn from_args(args: &RunArgs) -> Result<Self> {
        let settings = load_settings(args)?;
        let credentials: Arc<dyn CredentialProvider> = match (&args.token, &settings.token_file) {
            (Some(token), _) => Arc::new(StaticTokenProvider::new(token.clone())?),
            (None, Some(path)) => Arc::new(TokenFileProvider::new(path.clone())),
            (None, None) => {
                return Err(AuthError::Missing)
                    .context("Pass --token or --token-file, or set token_file in the settings")
            }
        };
        let endpoints = args
            .api_base
            .as_deref()
            .map(DriveEndpoints::local)
            .unwrap_or_default();
        Ok(Self {
            settings,
            credentials,
            endpoints,
        })
    }

    pub fn folder_selector(&self) -> FolderSelector {
        match &self.settings.folder_id {
            Some(id) => FolderSelector::Id(id.clone()),
            None => FolderSelector::Name(self.settings.folder_name.clone()),
        }
    }

    pub fn local_root(&self) -> Result<Utf8PathBuf> {
        self.settings
            .local_root
            .clone()
            .context("No local directory: pass --root or set local_root in the settings")
    }

    pub fn client(&self) -> Result<Arc<RetryingRemoteClient>> {
        let http = http_client(Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS))
            .context("Failed to build HTTP client")?;
        let store =
            DriveStore::with_endpoints(http, self.credentials.clone(), self.endpoints.clone());
        let policy = RetryPolicy::new(
            self.settings.retry_attempts,
            self.settings.retry_base_delay(),
        );
        let client = RetryingRemoteClient::new(Arc::new(store), policy)
            .with_limiter(request_limiter(self.settings.requests_per_second));
        Ok(Arc::new(client))
    }

    pub fn engine(&self, scanner: Scanner) -> Result<DefaultSyncEngine> {
        let client = self.client()?;
        let executor = Box::new(DefaultPlanExecutor::new(client.clone()));
        Ok(DefaultSyncEngine::with_components(client, scanner, executor))
    }

    /// A request for `root`. Commands that never touch the local tree pass an
    /// empty path.
    pub fn request(&self, root: Utf8PathBuf, options: SyncOptions) -> Result<SyncRequest> {
        let policy = self
            .settings
            .ignore_policy()
            .context("Failed to load ignore patterns")?;
        Ok(SyncRequest {
            local_root: root,
            folder: self.folder_selector(),
            policy,
            options,
        })
    }
}
