pub mod de;
pub mod enhanced;
pub mod item;
pub mod library;
pub mod stats;
pub mod watch_state;

pub use enhanced::{EnhancedItem, ItemKind, ItemMatch};
pub use item::{CatalogItem, Episode, ItemFields, MediaPart, RatingKey, Series, TagSet, Work};
pub use library::{Activity, Library, LibraryType};
pub use stats::SyncStats;
pub use watch_state::WatchState;
