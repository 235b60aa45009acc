pub mod auth;
pub mod drive;
pub mod hashing;
pub mod net;
pub mod remote;
pub mod retry;

// Re-exports for convenience
pub use auth::{AuthError, CredentialProvider, StaticTokenProvider, TokenFileProvider};
pub use drive::{DriveEndpoints, DriveStore};
pub use hashing::{ContentHasher, HashError};
pub use remote::{ListPage, RemoteError, RemoteFolder, RemoteStore};
pub use retry::{RetryPolicy, RetryingRemoteClient};
