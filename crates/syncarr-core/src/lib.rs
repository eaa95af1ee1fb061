pub mod discovery;
pub mod matcher;
pub mod metadata;
pub mod refresh;
pub mod retry;
pub mod sync;
pub mod transfer;

pub use discovery::ContentDiscovery;
pub use matcher::{match_items, ContentMatcher, FileIndex};
pub use metadata::{
    consistency_report, differences, needs_sync, ratings_equal, reconcile_watch_state, ConsistencyReport, FieldDiff,
    MetadataSyncer, WatchSync,
};
pub use refresh::{Clock, ManualClock, RefreshCoordinator, RefreshError, RefreshReport, RefreshSettings, RefreshState, TokioClock};
pub use retry::RetryPolicy;
pub use sync::{SshTransferFactory, SyncOrchestrator, SyncedFileSet, TransferFactory, TransferLayer};
pub use transfer::{
    select_backend, RemoteSession, RemoteShell, SkipReason, TransferBackend, TransferError, TransferOutcome, Transferrer,
};
