use governor::clock::DefaultClock;
use governor::middleware::NoOpMiddleware;
use governor::state::{InMemoryState, NotKeyed};
use governor::{Quota, RateLimiter};
use reqwest::Client;
use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;

pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(300);

pub type RequestLimiter = RateLimiter<NotKeyed, InMemoryState, DefaultClock, NoOpMiddleware>;

pub fn default_http_client() -> reqwest::Result<Client> {
    http_client(DEFAULT_REQUEST_TIMEOUT)
}

pub fn http_client(request_timeout: Duration) -> reqwest::Result<Client> {
    Client::builder()
        .user_agent(concat!("vaultsync/", env!("CARGO_PKG_VERSION")))
        .connect_timeout(CONNECT_TIMEOUT)
        .timeout(request_timeout)
        .build()
}

/// Client-side request pacing. `None` when unlimited or zero.
pub fn request_limiter(requests_per_second: Option<u32>) -> Option<Arc<RequestLimiter>> {
    requests_per_second
        .and_then(NonZeroU32::new)
        .map(|nz| Arc::new(RateLimiter::direct(Quota::per_second(nz))))
}
