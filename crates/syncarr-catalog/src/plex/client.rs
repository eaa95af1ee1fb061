use anyhow::Result;
use async_trait::async_trait;
use syncarr_config::PlexServerConfig;
use syncarr_models::{Activity, CatalogItem, Library, LibraryType, RatingKey};
use tracing::debug;
use urlencoding::encode;

use super::api::{parse_activities, parse_items, parse_libraries, PlexHttpClient};
use crate::error::CatalogError;
use crate::traits::{CatalogClient, ServerIdentity, TagField, TextField};

const LIBRARY_IDENTIFIER: &str = "com.plexapp.plugins.library";

pub struct PlexCatalogClient {
    name: String,
    http: PlexHttpClient,
}

impl PlexCatalogClient {
    pub fn new(name: &str, server: &PlexServerConfig, requests_per_second: f64) -> Result<Self> {
        Ok(Self {
            name: name.to_string(),
            http: PlexHttpClient::new(&server.base_url(), &server.token, requests_per_second)?,
        })
    }

    pub fn base_url(&self) -> &str {
        self.http.base_url()
    }

    async fn list_by_type(&self, library_id: &str, type_code: u8) -> Result<Vec<CatalogItem>, CatalogError> {
        let path = format!("/library/sections/{}/all?type={}", encode(library_id), type_code);
        let container = self.http.get_container(&path).await?;
        Ok(parse_items(container, "list_library_content"))
    }
}

/// Query prefix shared by every field-update request.
fn update_path(key: &RatingKey, library_id: &str, media_type: u8) -> String {
    format!(
        "/library/sections/{}/all?type={}&id={}&includeExternalMedia=1",
        encode(library_id),
        media_type,
        encode(key.as_str())
    )
}

fn set_tags_path(key: &RatingKey, library_id: &str, media_type: u8, field: TagField, values: &[String]) -> String {
    let param = field.as_param();
    let mut path = update_path(key, library_id, media_type);
    for (i, value) in values.iter().enumerate() {
        path.push_str(&format!("&{}%5B{}%5D.tag.tag={}", param, i, encode(value)));
    }
    path.push_str(&format!("&{}.locked=1", param));
    path
}

fn remove_tags_path(key: &RatingKey, library_id: &str, media_type: u8, field: TagField, values: &[String]) -> String {
    let joined = values.iter().map(|v| encode(v).into_owned()).collect::<Vec<_>>().join(",");
    format!(
        "{}&{}%5B%5D.tag.tag-={}",
        update_path(key, library_id, media_type),
        field.as_param(),
        joined
    )
}

#[async_trait]
impl CatalogClient for PlexCatalogClient {
    fn name(&self) -> &str {
        &self.name
    }

    async fn identity(&self) -> Result<ServerIdentity, CatalogError> {
        let container = self.http.get_container("/identity").await?;
        Ok(ServerIdentity {
            machine_identifier: container
                .get("machineIdentifier")
                .and_then(|v| v.as_str())
                .unwrap_or_default()
                .to_string(),
            version: container
                .get("version")
                .and_then(|v| v.as_str())
                .unwrap_or_default()
                .to_string(),
        })
    }

    async fn list_libraries(&self) -> Result<Vec<Library>, CatalogError> {
        let container = self.http.get_container("/library/sections").await?;
        let libraries = parse_libraries(container);
        debug!(catalog = %self.name, count = libraries.len(), "Plex list_libraries");
        Ok(libraries)
    }

    async fn list_items_with_tag(&self, library_id: &str, tag: &str) -> Result<Vec<CatalogItem>, CatalogError> {
        let path = format!("/library/sections/{}/all?label={}", encode(library_id), encode(tag));
        let container = self.http.get_container(&path).await?;
        Ok(parse_items(container, "list_items_with_tag"))
    }

    async fn list_library_content(&self, library: &Library) -> Result<Vec<CatalogItem>, CatalogError> {
        match library.kind {
            LibraryType::Movie => self.list_by_type(&library.key, 1).await,
            LibraryType::Show => self.list_by_type(&library.key, 2).await,
            LibraryType::Other(_) => {
                let mut items = self.list_by_type(&library.key, 1).await?;
                items.extend(self.list_by_type(&library.key, 2).await?);
                Ok(items)
            }
        }
    }

    async fn get_item_detail(&self, key: &RatingKey) -> Result<CatalogItem, CatalogError> {
        let path = format!("/library/metadata/{}", encode(key.as_str()));
        let container = self.http.get_container(&path).await?;
        parse_items(container, "get_item_detail")
            .into_iter()
            .next()
            .ok_or_else(|| CatalogError::NotFound(key.to_string()))
    }

    async fn get_episodes(&self, series_key: &RatingKey) -> Result<Vec<CatalogItem>, CatalogError> {
        let path = format!("/library/metadata/{}/allLeaves", encode(series_key.as_str()));
        let container = self.http.get_container(&path).await?;
        Ok(parse_items(container, "get_episodes"))
    }

    async fn set_field(
        &self,
        key: &RatingKey,
        library_id: &str,
        media_type: u8,
        field: TagField,
        values: &[String],
    ) -> Result<(), CatalogError> {
        self.http
            .put(&set_tags_path(key, library_id, media_type, field, values))
            .await
    }

    async fn remove_tags(
        &self,
        key: &RatingKey,
        library_id: &str,
        media_type: u8,
        field: TagField,
        values: &[String],
    ) -> Result<(), CatalogError> {
        if values.is_empty() {
            return Ok(());
        }
        self.http
            .put(&remove_tags_path(key, library_id, media_type, field, values))
            .await
    }

    async fn set_text_field(
        &self,
        key: &RatingKey,
        library_id: &str,
        media_type: u8,
        field: TextField,
        value: &str,
    ) -> Result<(), CatalogError> {
        let param = field.as_param();
        let path = format!(
            "{}&{}.value={}&{}.locked=1",
            update_path(key, library_id, media_type),
            param,
            encode(value),
            param
        );
        self.http.put(&path).await
    }

    async fn set_rating(&self, key: &RatingKey, rating: f64) -> Result<(), CatalogError> {
        let path = format!(
            "/:/rate?key={}&rating={}&identifier={}",
            encode(key.as_str()),
            rating,
            LIBRARY_IDENTIFIER
        );
        self.http.put(&path).await
    }

    async fn set_watch_state(&self, key: &RatingKey, watched: bool) -> Result<(), CatalogError> {
        let action = if watched { "scrobble" } else { "unscrobble" };
        let path = format!(
            "/:/{}?key={}&identifier={}",
            action,
            encode(key.as_str()),
            LIBRARY_IDENTIFIER
        );
        self.http.get(&path).await
    }

    async fn trigger_scan(&self, library_id: &str) -> Result<(), CatalogError> {
        self.http
            .get(&format!("/library/sections/{}/refresh", encode(library_id)))
            .await
    }

    async fn trigger_metadata_refresh(&self, library_id: &str) -> Result<(), CatalogError> {
        self.http
            .get(&format!("/library/sections/{}/refresh?force=1", encode(library_id)))
            .await
    }

    async fn list_activities(&self) -> Result<Vec<Activity>, CatalogError> {
        let container = self.http.get_container("/activities").await?;
        Ok(parse_activities(container))
    }
}
