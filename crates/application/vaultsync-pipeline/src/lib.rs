mod io_utils;
pub mod index;
pub mod sync;

// Re-export core engine components
pub use index::RemoteDirectoryIndex;
pub use sync::{
    default_engine, DefaultSyncEngine, FolderSelector, RunReport, SyncError, SyncOptions,
    SyncRequest, SyncStats,
};
pub use sync::sink::{CollectingSink, NoopSink, OutcomeSink};

// Re-export scanner types often needed by consumers
pub use vaultsync_scanner::ScanStats;
