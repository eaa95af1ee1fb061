use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Per-item viewing progress on one catalog.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct WatchState {
    pub watched: bool,
    pub view_count: u64,
    pub last_viewed_at: Option<DateTime<Utc>>,
    /// Resume position in milliseconds.
    pub view_offset_ms: u64,
}

impl WatchState {
    /// True when this side was viewed strictly after `other`, or `other` has no timestamp.
    pub fn viewed_after(&self, other: &WatchState) -> bool {
        match (self.last_viewed_at, other.last_viewed_at) {
            (_, None) => true,
            (Some(mine), Some(theirs)) => mine > theirs,
            (None, Some(_)) => false,
        }
    }
}
