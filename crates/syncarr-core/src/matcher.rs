use anyhow::{Context, Result};
use std::collections::HashMap;
use syncarr_catalog::CatalogClient;
use syncarr_models::{EnhancedItem, ItemMatch};
use tracing::{debug, info, instrument, warn};

use crate::discovery::hydrate_all;

/// Destination items keyed by backing-file base name.
#[derive(Debug, Default)]
pub struct FileIndex {
    by_name: HashMap<String, EnhancedItem>,
}

impl FileIndex {
    /// Later insertions replace earlier ones for the same file name.
    pub fn insert(&mut self, item: EnhancedItem) {
        let names: Vec<String> = item.item().file_names().map(str::to_string).collect();
        for name in names {
            self.by_name.insert(name, item.clone());
        }
    }

    pub fn get(&self, file_name: &str) -> Option<&EnhancedItem> {
        self.by_name.get(file_name)
    }

    pub fn len(&self) -> usize {
        self.by_name.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_name.is_empty()
    }
}

impl FromIterator<EnhancedItem> for FileIndex {
    fn from_iter<I: IntoIterator<Item = EnhancedItem>>(iter: I) -> Self {
        let mut index = FileIndex::default();
        for item in iter {
            index.insert(item);
        }
        index
    }
}

/// Pair each source item with the destination item sharing its first known file name.
///
/// Unmatched source items are left out.
pub fn match_items(index: &FileIndex, sources: &[EnhancedItem]) -> Vec<ItemMatch> {
    sources
        .iter()
        .filter_map(|source| {
            let found = source
                .item()
                .file_names()
                .find_map(|name| index.get(name).map(|dest| (name, dest)));
            match found {
                Some((name, dest)) => Some(ItemMatch {
                    file_name: name.to_string(),
                    source: source.clone(),
                    dest: dest.clone(),
                }),
                None => {
                    debug!(title = %source.item().display_title(), "No destination item shares a file name");
                    None
                }
            }
        })
        .collect()
}

pub struct ContentMatcher<'a> {
    dest: &'a dyn CatalogClient,
}

impl<'a> ContentMatcher<'a> {
    pub fn new(dest: &'a dyn CatalogClient) -> Self {
        Self { dest }
    }

    /// Index every destination library's full content.
    pub async fn build_index(&self) -> Result<FileIndex> {
        let libraries = self
            .dest
            .list_libraries()
            .await
            .context("Failed to list destination libraries")?;

        let mut index = FileIndex::default();
        for library in &libraries {
            let items = match self.dest.list_library_content(library).await {
                Ok(items) => items,
                Err(e) => {
                    warn!(library_id = %library.key, error = %e, "Failed to list destination library, skipping");
                    continue;
                }
            };
            for item in hydrate_all(self.dest, items, &library.key).await {
                index.insert(item);
            }
        }
        debug!(files = index.len(), "Destination file index built");
        Ok(index)
    }

    #[instrument(skip_all, fields(sources = sources.len()))]
    pub async fn match_all(&self, sources: &[EnhancedItem]) -> Result<Vec<ItemMatch>> {
        let index = self.build_index().await?;
        let matches = match_items(&index, sources);
        info!(
            operation = "matching_complete",
            sources = sources.len(),
            matches = matches.len(),
            unmatched = sources.len() - matches.len(),
            "Content matching complete"
        );
        Ok(matches)
    }
}
