use serde::Serialize;

use crate::item::{CatalogItem, RatingKey};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ItemKind {
    Work,
    Series,
    Episode,
}

impl ItemKind {
    /// Numeric type code the catalog's update endpoints are scoped by.
    pub fn media_type_code(self) -> u8 {
        match self {
            ItemKind::Work => 1,
            ItemKind::Series => 2,
            ItemKind::Episode => 4,
        }
    }
}

/// A catalog item plus the library it was found in. Never mutated after discovery.
#[derive(Debug, Clone, PartialEq)]
pub struct EnhancedItem {
    item: CatalogItem,
    library_id: String,
    kind: ItemKind,
}

impl EnhancedItem {
    pub fn new(item: CatalogItem, library_id: impl Into<String>) -> Self {
        let kind = match &item {
            CatalogItem::Work(_) => ItemKind::Work,
            CatalogItem::Series(_) => ItemKind::Series,
            CatalogItem::Episode(_) => ItemKind::Episode,
        };
        Self {
            item,
            library_id: library_id.into(),
            kind,
        }
    }

    pub fn item(&self) -> &CatalogItem {
        &self.item
    }

    pub fn library_id(&self) -> &str {
        &self.library_id
    }

    pub fn kind(&self) -> ItemKind {
        self.kind
    }

    pub fn key(&self) -> &RatingKey {
        self.item.key()
    }

    pub fn media_type_code(&self) -> u8 {
        self.kind.media_type_code()
    }
}

/// A source item paired with the destination item sharing a backing-file base name.
#[derive(Debug, Clone, PartialEq)]
pub struct ItemMatch {
    pub file_name: String,
    pub source: EnhancedItem,
    pub dest: EnhancedItem,
}
