//! In-memory catalog used by the engine's tests.

use async_trait::async_trait;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Mutex, MutexGuard};
use syncarr_models::{
    Activity, CatalogItem, Episode, ItemFields, Library, LibraryType, MediaPart, RatingKey, Series, Work,
};

use crate::error::CatalogError;
use crate::traits::{CatalogClient, ServerIdentity, TagField, TextField};

/// A write the engine issued against the catalog.
#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    SetField { key: String, field: TagField, values: Vec<String> },
    RemoveTags { key: String, field: TagField, values: Vec<String> },
    SetText { key: String, field: TextField, value: String },
    SetRating { key: String, rating: f64 },
    SetWatchState { key: String, watched: bool },
    TriggerScan(String),
    TriggerRefresh(String),
}

#[derive(Default)]
struct FakeState {
    libraries: Vec<Library>,
    tagged: HashMap<String, Vec<CatalogItem>>,
    content: HashMap<String, Vec<CatalogItem>>,
    details: HashMap<RatingKey, CatalogItem>,
    episodes: HashMap<RatingKey, Vec<CatalogItem>>,
    activities: VecDeque<Vec<Activity>>,
    activity_polls: usize,
    failing_scans: HashSet<String>,
    failing_refreshes: HashSet<String>,
    fail_tag_filter: bool,
    fail_writes: bool,
    unreachable: bool,
    calls: Vec<Call>,
}

pub struct FakeCatalog {
    name: String,
    state: Mutex<FakeState>,
}

fn status_error(path: &str, status: u16) -> CatalogError {
    CatalogError::Status {
        method: "GET".to_string(),
        path: path.to_string(),
        status,
        body: "fake failure".to_string(),
    }
}

impl FakeCatalog {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            state: Mutex::new(FakeState::default()),
        }
    }

    fn state(&self) -> MutexGuard<'_, FakeState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn with_library(self, key: &str, kind: LibraryType) -> Self {
        self.state().libraries.push(Library {
            key: key.to_string(),
            kind,
            title: format!("Library {}", key),
        });
        self
    }

    /// Items the server-side label filter returns for `library`.
    pub fn with_tagged(self, library: &str, items: Vec<CatalogItem>) -> Self {
        self.state().tagged.entry(library.to_string()).or_default().extend(items);
        self
    }

    /// Full unfiltered content of `library`.
    pub fn with_content(self, library: &str, items: Vec<CatalogItem>) -> Self {
        self.state().content.entry(library.to_string()).or_default().extend(items);
        self
    }

    /// Full record returned by `get_item_detail`.
    pub fn with_detail(self, item: CatalogItem) -> Self {
        self.state().details.insert(item.key().clone(), item);
        self
    }

    pub fn with_episodes(self, series_key: &str, items: Vec<CatalogItem>) -> Self {
        self.state().episodes.insert(RatingKey::from(series_key), items);
        self
    }

    /// Successive `list_activities` responses; the last one repeats.
    pub fn with_activity_script(self, script: Vec<Vec<Activity>>) -> Self {
        self.state().activities = script.into();
        self
    }

    pub fn failing_scan(self, library: &str) -> Self {
        self.state().failing_scans.insert(library.to_string());
        self
    }

    pub fn failing_refresh(self, library: &str) -> Self {
        self.state().failing_refreshes.insert(library.to_string());
        self
    }

    pub fn failing_tag_filter(self) -> Self {
        self.state().fail_tag_filter = true;
        self
    }

    pub fn failing_writes(self) -> Self {
        self.state().fail_writes = true;
        self
    }

    pub fn unreachable(self) -> Self {
        self.state().unreachable = true;
        self
    }

    pub fn calls(&self) -> Vec<Call> {
        self.state().calls.clone()
    }

    pub fn activity_polls(&self) -> usize {
        self.state().activity_polls
    }

    fn record_write(&self, call: Call) -> Result<(), CatalogError> {
        let mut state = self.state();
        if state.fail_writes {
            return Err(status_error("/write", 500));
        }
        state.calls.push(call);
        Ok(())
    }
}

/// An in-progress library scan for `library`.
pub fn scan_activity(library: &str, progress: f64) -> Activity {
    Activity {
        kind: "library.update.section".to_string(),
        title: "Scanning".to_string(),
        progress: Some(progress),
        library_section_id: Some(library.to_string()),
    }
}

fn fields(key: &str, title: &str, files: &[&str]) -> ItemFields {
    ItemFields {
        key: RatingKey::from(key),
        title: title.to_string(),
        parts: files
            .iter()
            .map(|f| MediaPart {
                file: f.to_string(),
                size: 1024,
            })
            .collect(),
        ..ItemFields::default()
    }
}

pub fn work(key: &str, title: &str, files: &[&str]) -> CatalogItem {
    CatalogItem::Work(Work {
        fields: fields(key, title, files),
        studio: String::new(),
    })
}

pub fn series(key: &str, title: &str) -> CatalogItem {
    CatalogItem::Series(Series {
        fields: fields(key, title, &[]),
        ..Series::default()
    })
}

pub fn episode(key: &str, title: &str, files: &[&str]) -> CatalogItem {
    CatalogItem::Episode(Episode {
        fields: fields(key, title, files),
        ..Episode::default()
    })
}

#[async_trait]
impl CatalogClient for FakeCatalog {
    fn name(&self) -> &str {
        &self.name
    }

    async fn identity(&self) -> Result<ServerIdentity, CatalogError> {
        if self.state().unreachable {
            return Err(status_error("/identity", 503));
        }
        Ok(ServerIdentity {
            machine_identifier: format!("fake-{}", self.name),
            version: "1.0".to_string(),
        })
    }

    async fn list_libraries(&self) -> Result<Vec<Library>, CatalogError> {
        Ok(self.state().libraries.clone())
    }

    async fn list_items_with_tag(&self, library_id: &str, _tag: &str) -> Result<Vec<CatalogItem>, CatalogError> {
        let state = self.state();
        if state.fail_tag_filter {
            return Err(status_error("/library/sections/all?label", 400));
        }
        Ok(state.tagged.get(library_id).cloned().unwrap_or_default())
    }

    async fn list_library_content(&self, library: &Library) -> Result<Vec<CatalogItem>, CatalogError> {
        Ok(self.state().content.get(&library.key).cloned().unwrap_or_default())
    }

    async fn get_item_detail(&self, key: &RatingKey) -> Result<CatalogItem, CatalogError> {
        self.state()
            .details
            .get(key)
            .cloned()
            .ok_or_else(|| CatalogError::NotFound(key.to_string()))
    }

    async fn get_episodes(&self, series_key: &RatingKey) -> Result<Vec<CatalogItem>, CatalogError> {
        Ok(self.state().episodes.get(series_key).cloned().unwrap_or_default())
    }

    async fn set_field(
        &self,
        key: &RatingKey,
        _library_id: &str,
        _media_type: u8,
        field: TagField,
        values: &[String],
    ) -> Result<(), CatalogError> {
        self.record_write(Call::SetField {
            key: key.to_string(),
            field,
            values: values.to_vec(),
        })
    }

    async fn remove_tags(
        &self,
        key: &RatingKey,
        _library_id: &str,
        _media_type: u8,
        field: TagField,
        values: &[String],
    ) -> Result<(), CatalogError> {
        self.record_write(Call::RemoveTags {
            key: key.to_string(),
            field,
            values: values.to_vec(),
        })
    }

    async fn set_text_field(
        &self,
        key: &RatingKey,
        _library_id: &str,
        _media_type: u8,
        field: TextField,
        value: &str,
    ) -> Result<(), CatalogError> {
        self.record_write(Call::SetText {
            key: key.to_string(),
            field,
            value: value.to_string(),
        })
    }

    async fn set_rating(&self, key: &RatingKey, rating: f64) -> Result<(), CatalogError> {
        self.record_write(Call::SetRating {
            key: key.to_string(),
            rating,
        })
    }

    async fn set_watch_state(&self, key: &RatingKey, watched: bool) -> Result<(), CatalogError> {
        self.record_write(Call::SetWatchState {
            key: key.to_string(),
            watched,
        })
    }

    async fn trigger_scan(&self, library_id: &str) -> Result<(), CatalogError> {
        let mut state = self.state();
        if state.failing_scans.contains(library_id) {
            return Err(status_error("/library/sections/refresh", 500));
        }
        state.calls.push(Call::TriggerScan(library_id.to_string()));
        Ok(())
    }

    async fn trigger_metadata_refresh(&self, library_id: &str) -> Result<(), CatalogError> {
        let mut state = self.state();
        if state.failing_refreshes.contains(library_id) {
            return Err(status_error("/library/sections/refresh?force=1", 500));
        }
        state.calls.push(Call::TriggerRefresh(library_id.to_string()));
        Ok(())
    }

    async fn list_activities(&self) -> Result<Vec<Activity>, CatalogError> {
        let mut state = self.state();
        state.activity_polls += 1;
        let next = if state.activities.len() > 1 {
            state.activities.pop_front()
        } else {
            state.activities.front().cloned()
        };
        Ok(next.unwrap_or_default())
    }
}
