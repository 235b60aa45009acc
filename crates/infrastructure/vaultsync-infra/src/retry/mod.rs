use crate::net::RequestLimiter;
use crate::remote::{ListPage, RemoteError, RemoteFolder, RemoteStore};
use camino::Utf8Path;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};
use vaultsync_core::RemoteEntry;

pub const DEFAULT_MAX_ATTEMPTS: u32 = 5;
pub const DEFAULT_BASE_DELAY: Duration = Duration::from_secs(1);

/// Classification of a single remote call.
#[derive(Debug)]
pub enum CallOutcome<T> {
    Success(T),
    Retryable(RemoteError),
    Permanent(RemoteError),
}

impl<T> CallOutcome<T> {
    pub fn classify(result: Result<T, RemoteError>) -> Self {
        match result {
            Ok(v) => CallOutcome::Success(v),
            Err(e) if e.is_transient() => CallOutcome::Retryable(e),
            Err(e) => CallOutcome::Permanent(e),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts including the first.
    pub max_attempts: u32,
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            base_delay: DEFAULT_BASE_DELAY,
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, base_delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay,
        }
    }

    /// Sleep after the failed attempt with zero-based index `attempt`.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = 1u32.checked_shl(attempt).unwrap_or(u32::MAX);
        self.base_delay.saturating_mul(factor)
    }
}

/// Wraps a [`RemoteStore`] so every RPC goes through the same bounded
/// exponential backoff and optional request pacing.
pub struct RetryingRemoteClient {
    store: Arc<dyn RemoteStore>,
    policy: RetryPolicy,
    limiter: Option<Arc<RequestLimiter>>,
}

impl RetryingRemoteClient {
    pub fn new(store: Arc<dyn RemoteStore>, policy: RetryPolicy) -> Self {
        Self {
            store,
            policy,
            limiter: None,
        }
    }

    pub fn with_limiter(mut self, limiter: Option<Arc<RequestLimiter>>) -> Self {
        self.limiter = limiter;
        self
    }

    pub fn policy(&self) -> RetryPolicy {
        self.policy
    }

    /// Run `call` until it succeeds, fails permanently, or the attempt budget
    /// is spent. No sleep follows the final attempt.
    pub async fn execute<T, F, Fut>(&self, operation: &str, mut call: F) -> Result<T, RemoteError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, RemoteError>>,
    {
        let max_attempts = self.policy.max_attempts.max(1);
        let mut attempt = 0u32;
        loop {
            if let Some(limiter) = &self.limiter {
                limiter.until_ready().await;
            }
            let err = match CallOutcome::classify(call().await) {
                CallOutcome::Success(v) => return Ok(v),
                CallOutcome::Permanent(e) => {
                    debug!(operation, attempt, error = %e, "permanent failure");
                    return Err(e);
                }
                CallOutcome::Retryable(e) => e,
            };

            attempt += 1;
            if attempt >= max_attempts {
                warn!(operation, attempts = attempt, error = %err, "retry budget exhausted");
                return Err(RemoteError::Exhausted {
                    attempts: attempt,
                    last: Box::new(err),
                });
            }

            let delay = self.policy.delay_for(attempt - 1);
            warn!(
                operation,
                attempt,
                delay_ms = delay.as_millis() as u64,
                error = %err,
                "transient failure, retrying"
            );
            tokio::time::sleep(delay).await;
        }
    }

    pub async fn find_folders(&self, name: &str) -> Result<Vec<RemoteFolder>, RemoteError> {
        self.execute("find_folders", || self.store.find_folders(name))
            .await
    }

    pub async fn create_folder(&self, name: &str) -> Result<RemoteFolder, RemoteError> {
        self.execute("create_folder", || self.store.create_folder(name))
            .await
    }

    pub async fn list_children(
        &self,
        folder_id: &str,
        page_token: Option<&str>,
    ) -> Result<ListPage, RemoteError> {
        self.execute("list_children", || {
            self.store.list_children(folder_id, page_token)
        })
        .await
    }

    pub async fn create_file(
        &self,
        folder_id: &str,
        name: &str,
        source: &Utf8Path,
    ) -> Result<RemoteEntry, RemoteError> {
        self.execute("create_file", || {
            self.store.create_file(folder_id, name, source)
        })
        .await
    }

    pub async fn update_file(
        &self,
        file_id: &str,
        source: &Utf8Path,
    ) -> Result<RemoteEntry, RemoteError> {
        self.execute("update_file", || self.store.update_file(file_id, source))
            .await
    }

    /// The wrapped store. Downloads are not wrapped here: callers verify the
    /// content inside their own [`Self::execute`] closure so a mismatch is retried.
    pub fn store(&self) -> &Arc<dyn RemoteStore> {
        &self.store
    }
}
