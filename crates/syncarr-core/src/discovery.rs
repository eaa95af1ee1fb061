use anyhow::{Context, Result};
use syncarr_catalog::{CatalogClient, CatalogError};
use syncarr_models::{CatalogItem, EnhancedItem, Library};
use tracing::{debug, info, instrument, warn};

/// Re-fetch an abbreviated list record as complete records.
///
/// Works and series get a detail fetch; a series additionally yields its
/// episodes (already complete as returned by the leaves endpoint). Episodes
/// from list endpoints are passed through as-is.
pub(crate) async fn hydrate(
    client: &dyn CatalogClient,
    item: CatalogItem,
    library_id: &str,
) -> Result<Vec<EnhancedItem>, CatalogError> {
    match item {
        CatalogItem::Episode(_) => Ok(vec![EnhancedItem::new(item, library_id)]),
        CatalogItem::Work(_) => {
            let full = client.get_item_detail(item.key()).await?;
            Ok(vec![EnhancedItem::new(full, library_id)])
        }
        CatalogItem::Series(_) => {
            let full = client.get_item_detail(item.key()).await?;
            let episodes = match client.get_episodes(full.key()).await {
                Ok(episodes) => episodes,
                Err(e) => {
                    warn!(
                        catalog = client.name(),
                        series = %full.display_title(),
                        error = %e,
                        "Failed to fetch episodes, keeping series record only"
                    );
                    Vec::new()
                }
            };
            let mut out = Vec::with_capacity(episodes.len() + 1);
            out.push(EnhancedItem::new(full, library_id));
            out.extend(episodes.into_iter().map(|ep| EnhancedItem::new(ep, library_id)));
            Ok(out)
        }
    }
}

/// Hydrate every item of one library, dropping (and logging) the ones that fail.
pub(crate) async fn hydrate_all(
    client: &dyn CatalogClient,
    items: Vec<CatalogItem>,
    library_id: &str,
) -> Vec<EnhancedItem> {
    let mut out = Vec::with_capacity(items.len());
    for item in items {
        let title = item.display_title();
        match hydrate(client, item, library_id).await {
            Ok(hydrated) => out.extend(hydrated),
            Err(e) => warn!(
                catalog = client.name(),
                library_id,
                title = %title,
                error = %e,
                "Failed to hydrate item, skipping"
            ),
        }
    }
    out
}

/// Finds source items carrying the sync marker.
pub struct ContentDiscovery<'a> {
    source: &'a dyn CatalogClient,
    marker: String,
}

impl<'a> ContentDiscovery<'a> {
    pub fn new(source: &'a dyn CatalogClient, marker: impl Into<String>) -> Self {
        Self {
            source,
            marker: marker.into(),
        }
    }

    #[instrument(skip(self), fields(marker = %self.marker))]
    pub async fn discover(&self) -> Result<Vec<EnhancedItem>> {
        let libraries = self
            .source
            .list_libraries()
            .await
            .context("Failed to list source libraries")?;

        let mut discovered = Vec::new();
        for library in &libraries {
            let matches = self.tagged_items(library).await;
            debug!(
                library_id = %library.key,
                library = %library.title,
                matches = matches.len(),
                "Library filtered by marker"
            );
            discovered.extend(hydrate_all(self.source, matches, &library.key).await);
        }

        info!(
            operation = "discovery_complete",
            libraries = libraries.len(),
            items = discovered.len(),
            "Content discovery complete"
        );
        Ok(discovered)
    }

    /// Server-side filter, falling back to a full listing filtered locally.
    async fn tagged_items(&self, library: &Library) -> Vec<CatalogItem> {
        match self.source.list_items_with_tag(&library.key, &self.marker).await {
            Ok(items) => items,
            Err(e) => {
                warn!(
                    library_id = %library.key,
                    error = %e,
                    "Server-side marker filter failed, filtering client-side"
                );
                match self.source.list_library_content(library).await {
                    Ok(items) => items
                        .into_iter()
                        .filter(|item| item.labels().contains_ignore_case(&self.marker))
                        .collect(),
                    Err(e) => {
                        warn!(
                            library_id = %library.key,
                            error = %e,
                            "Failed to list library content, skipping library"
                        );
                        Vec::new()
                    }
                }
            }
        }
    }
}
