use serde::Serialize;
use std::time::Duration;

/// Counters for one sync cycle.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SyncStats {
    pub items_discovered: usize,
    pub files_transferred: usize,
    pub files_skipped: usize,
    pub files_failed: usize,
    pub bytes_transferred: u64,
    pub orphans_deleted: usize,
    pub matches: usize,
    pub metadata_synced: usize,
    pub metadata_skipped: usize,
    pub metadata_errors: usize,
    pub watch_states_synced: usize,
    pub refresh_timed_out: bool,
    pub duration: Duration,
}

impl SyncStats {
    pub fn total_errors(&self) -> usize {
        self.files_failed + self.metadata_errors
    }
}
