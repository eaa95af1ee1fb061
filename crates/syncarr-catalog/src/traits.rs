use async_trait::async_trait;
use syncarr_models::{Activity, CatalogItem, Library, RatingKey};

use crate::error::CatalogError;

/// Tag-valued fields the catalog lets us write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TagField {
    Label,
    Genre,
    Collection,
}

impl TagField {
    pub fn as_param(self) -> &'static str {
        match self {
            TagField::Label => "label",
            TagField::Genre => "genre",
            TagField::Collection => "collection",
        }
    }
}

/// Plain-text fields with a direct-write path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextField {
    Title,
    Summary,
}

impl TextField {
    pub fn as_param(self) -> &'static str {
        match self {
            TextField::Title => "title",
            TextField::Summary => "summary",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ServerIdentity {
    pub machine_identifier: String,
    pub version: String,
}

/// Typed access to one media catalog server.
#[async_trait]
pub trait CatalogClient: Send + Sync {
    /// Short name for logs ("source", "destination").
    fn name(&self) -> &str;

    /// Reachability check.
    async fn identity(&self) -> Result<ServerIdentity, CatalogError>;

    async fn list_libraries(&self) -> Result<Vec<Library>, CatalogError>;

    /// Items in `library_id` carrying `tag`, filtered server-side. Records may be abbreviated.
    async fn list_items_with_tag(&self, library_id: &str, tag: &str) -> Result<Vec<CatalogItem>, CatalogError>;

    /// Every top-level item in the library, unfiltered.
    async fn list_library_content(&self, library: &Library) -> Result<Vec<CatalogItem>, CatalogError>;

    async fn get_item_detail(&self, key: &RatingKey) -> Result<CatalogItem, CatalogError>;

    async fn get_episodes(&self, series_key: &RatingKey) -> Result<Vec<CatalogItem>, CatalogError>;

    /// Add `values` to a tag field and lock it.
    async fn set_field(
        &self,
        key: &RatingKey,
        library_id: &str,
        media_type: u8,
        field: TagField,
        values: &[String],
    ) -> Result<(), CatalogError>;

    async fn remove_tags(
        &self,
        key: &RatingKey,
        library_id: &str,
        media_type: u8,
        field: TagField,
        values: &[String],
    ) -> Result<(), CatalogError>;

    async fn set_text_field(
        &self,
        key: &RatingKey,
        library_id: &str,
        media_type: u8,
        field: TextField,
        value: &str,
    ) -> Result<(), CatalogError>;

    /// Rating on the 0-10 scale.
    async fn set_rating(&self, key: &RatingKey, rating: f64) -> Result<(), CatalogError>;

    async fn set_watch_state(&self, key: &RatingKey, watched: bool) -> Result<(), CatalogError>;

    async fn trigger_scan(&self, library_id: &str) -> Result<(), CatalogError>;

    async fn trigger_metadata_refresh(&self, library_id: &str) -> Result<(), CatalogError>;

    async fn list_activities(&self) -> Result<Vec<Activity>, CatalogError>;
}
