use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::collections::BTreeSet;
use std::fmt;
use std::path::Path;

use crate::de;
use crate::watch_state::WatchState;

/// Server-assigned identity of a catalog item, normalized to a string.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Default)]
#[serde(transparent)]
pub struct RatingKey(String);

impl RatingKey {
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for RatingKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for RatingKey {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl<'de> Deserialize<'de> for RatingKey {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        match Value::deserialize(deserializer)? {
            Value::String(s) => Ok(Self(s)),
            Value::Number(n) => Ok(Self(n.to_string())),
            other => Err(serde::de::Error::custom(format!(
                "rating key must be a string or integer, got {}",
                other
            ))),
        }
    }
}

/// One on-disk file backing an item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaPart {
    pub file: String,
    #[serde(default, deserialize_with = "de::flexible_u64")]
    pub size: u64,
}

impl MediaPart {
    /// Base name of the file, the cross-catalog identity used by the matcher.
    pub fn file_name(&self) -> Option<&str> {
        Path::new(&self.file)
            .file_name()
            .and_then(|n| n.to_str())
            .filter(|n| !n.is_empty())
    }
}

/// Unordered, duplicate-free tag collection (labels, genres, collections).
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
#[serde(transparent)]
pub struct TagSet(BTreeSet<String>);

impl TagSet {
    pub fn contains(&self, tag: &str) -> bool {
        self.0.contains(tag)
    }

    /// Case-insensitive membership, used when filtering by marker client-side.
    pub fn contains_ignore_case(&self, tag: &str) -> bool {
        self.0.iter().any(|t| t.eq_ignore_ascii_case(tag))
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Tags present here but not in `other`.
    pub fn difference<'a>(&'a self, other: &'a TagSet) -> impl Iterator<Item = &'a str> {
        self.0.difference(&other.0).map(String::as_str)
    }
}

impl<S: Into<String>> FromIterator<S> for TagSet {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        Self(iter.into_iter().map(Into::into).collect())
    }
}

impl<'de> Deserialize<'de> for TagSet {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = Option::<Value>::deserialize(deserializer)?;
        let mut tags = BTreeSet::new();
        if let Some(Value::Array(entries)) = value {
            for entry in entries {
                let tag = match &entry {
                    Value::String(s) => Some(s.as_str()),
                    Value::Object(map) => map.get("tag").and_then(|t| t.as_str()),
                    _ => None,
                };
                if let Some(tag) = tag {
                    tags.insert(tag.to_string());
                }
            }
        }
        Ok(Self(tags))
    }
}

/// Fields every item kind carries.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ItemFields {
    pub key: RatingKey,
    pub title: String,
    pub original_title: String,
    pub year: Option<i32>,
    pub summary: String,
    pub tagline: String,
    pub content_rating: String,
    pub rating: Option<f64>,
    pub audience_rating: Option<f64>,
    pub user_rating: Option<f64>,
    pub thumb: String,
    pub art: String,
    pub labels: TagSet,
    pub genres: TagSet,
    pub collections: TagSet,
    pub guids: Vec<String>,
    pub parts: Vec<MediaPart>,
    pub watch: WatchState,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct Work {
    pub fields: ItemFields,
    pub studio: String,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct Series {
    pub fields: ItemFields,
    pub studio: String,
    pub network: String,
    pub episode_count: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct Episode {
    pub fields: ItemFields,
    pub series_key: Option<RatingKey>,
    pub series_title: String,
    pub season: Option<u32>,
    pub episode: Option<u32>,
}

/// A catalog entry. Call sites dispatch on the variant, never on payload shape.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(try_from = "RawItem")]
pub enum CatalogItem {
    Work(Work),
    Series(Series),
    Episode(Episode),
}

impl CatalogItem {
    pub fn fields(&self) -> &ItemFields {
        match self {
            CatalogItem::Work(w) => &w.fields,
            CatalogItem::Series(s) => &s.fields,
            CatalogItem::Episode(e) => &e.fields,
        }
    }

    pub fn key(&self) -> &RatingKey {
        &self.fields().key
    }

    pub fn title(&self) -> &str {
        &self.fields().title
    }

    pub fn labels(&self) -> &TagSet {
        &self.fields().labels
    }

    pub fn parts(&self) -> &[MediaPart] {
        &self.fields().parts
    }

    pub fn watch_state(&self) -> &WatchState {
        &self.fields().watch
    }

    /// Backing-file base names in declaration order.
    pub fn file_names(&self) -> impl Iterator<Item = &str> {
        self.parts().iter().filter_map(MediaPart::file_name)
    }

    /// Human-readable label for logs: "Show - S01E02 - Title" for episodes.
    pub fn display_title(&self) -> String {
        match self {
            CatalogItem::Episode(e) if !e.series_title.is_empty() => match (e.season, e.episode) {
                (Some(s), Some(n)) => format!("{} - S{:02}E{:02} - {}", e.series_title, s, n, e.fields.title),
                _ => format!("{} - {}", e.series_title, e.fields.title),
            },
            other => match other.fields().year {
                Some(year) => format!("{} ({})", other.title(), year),
                None => other.title().to_string(),
            },
        }
    }
}

/// Wire shape of `MediaContainer.Metadata[]` entries.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawItem {
    #[serde(rename = "type", default)]
    kind: String,
    rating_key: RatingKey,
    #[serde(default, deserialize_with = "de::lenient_string")]
    title: String,
    #[serde(default, deserialize_with = "de::lenient_string")]
    original_title: String,
    #[serde(default, deserialize_with = "de::flexible_opt_i32")]
    year: Option<i32>,
    #[serde(default, deserialize_with = "de::lenient_string")]
    summary: String,
    #[serde(default, deserialize_with = "de::lenient_string")]
    tagline: String,
    #[serde(default, deserialize_with = "de::lenient_string")]
    content_rating: String,
    #[serde(default, deserialize_with = "de::lenient_string")]
    studio: String,
    #[serde(default, deserialize_with = "de::lenient_string")]
    network: String,
    #[serde(default, deserialize_with = "de::flexible_rating")]
    rating: Option<f64>,
    #[serde(default, deserialize_with = "de::flexible_rating")]
    audience_rating: Option<f64>,
    #[serde(default, deserialize_with = "de::flexible_rating")]
    user_rating: Option<f64>,
    #[serde(default, deserialize_with = "de::lenient_string")]
    thumb: String,
    #[serde(default, deserialize_with = "de::lenient_string")]
    art: String,
    #[serde(default, deserialize_with = "de::flexible_u64")]
    view_count: u64,
    #[serde(default, deserialize_with = "de::unix_timestamp")]
    last_viewed_at: Option<DateTime<Utc>>,
    #[serde(default, deserialize_with = "de::flexible_u64")]
    view_offset: u64,
    #[serde(default, deserialize_with = "de::flexible_opt_u32")]
    leaf_count: Option<u32>,
    #[serde(default)]
    grandparent_rating_key: Option<RatingKey>,
    #[serde(default, deserialize_with = "de::lenient_string")]
    grandparent_title: String,
    #[serde(default, deserialize_with = "de::flexible_opt_u32")]
    parent_index: Option<u32>,
    #[serde(default, deserialize_with = "de::flexible_opt_u32")]
    index: Option<u32>,
    #[serde(rename = "Label", default)]
    labels: TagSet,
    #[serde(rename = "Genre", default)]
    genres: TagSet,
    #[serde(rename = "Collection", default)]
    collections: TagSet,
    #[serde(rename = "Guid", default, deserialize_with = "de::flexible_guids")]
    guids: Vec<String>,
    #[serde(rename = "Media", default)]
    media: Vec<RawMedia>,
}

#[derive(Debug, Deserialize)]
struct RawMedia {
    #[serde(rename = "Part", default)]
    parts: Vec<MediaPart>,
}

impl TryFrom<RawItem> for CatalogItem {
    type Error = String;

    fn try_from(raw: RawItem) -> Result<Self, Self::Error> {
        let fields = ItemFields {
            key: raw.rating_key,
            title: raw.title,
            original_title: raw.original_title,
            year: raw.year,
            summary: raw.summary,
            tagline: raw.tagline,
            content_rating: raw.content_rating,
            rating: raw.rating,
            audience_rating: raw.audience_rating,
            user_rating: raw.user_rating,
            thumb: raw.thumb,
            art: raw.art,
            labels: raw.labels,
            genres: raw.genres,
            collections: raw.collections,
            guids: raw.guids,
            parts: raw
                .media
                .into_iter()
                .flat_map(|m| m.parts)
                .filter(|p| !p.file.is_empty())
                .collect(),
            watch: WatchState {
                watched: raw.view_count > 0,
                view_count: raw.view_count,
                last_viewed_at: raw.last_viewed_at,
                view_offset_ms: raw.view_offset,
            },
        };

        match raw.kind.as_str() {
            "movie" => Ok(CatalogItem::Work(Work { fields, studio: raw.studio })),
            "show" => Ok(CatalogItem::Series(Series {
                fields,
                studio: raw.studio,
                network: raw.network,
                episode_count: raw.leaf_count,
            })),
            "episode" => Ok(CatalogItem::Episode(Episode {
                fields,
                series_key: raw.grandparent_rating_key,
                series_title: raw.grandparent_title,
                season: raw.parent_index,
                episode: raw.index,
            })),
            other => Err(format!("unsupported item type '{}'", other)),
        }
    }
}
