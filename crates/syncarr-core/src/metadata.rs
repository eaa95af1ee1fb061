//! Field-level comparison of matched items and one-directional correction of
//! the destination, plus bidirectional watch-state reconciliation.

use anyhow::{anyhow, Result};
use std::fmt;
use syncarr_catalog::{CatalogClient, TagField, TextField};
use syncarr_models::{CatalogItem, EnhancedItem, ItemFields, ItemKind, ItemMatch, TagSet, WatchState};
use tracing::{debug, info, warn};

#[cfg(test)]
mod tests;

/// Largest rating gap, in tenths, still treated as equal.
const RATING_TOLERANCE_TENTHS: f64 = 2.0;

/// One field on which source and destination disagree.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldDiff {
    Kind { source: ItemKind, dest: ItemKind },
    Text { field: &'static str, source: String, dest: String },
    /// Long or opaque values (summary, artwork) reported without content.
    Changed(&'static str),
    Year { source: Option<i32>, dest: Option<i32> },
    UserRating { source: f64, dest: f64 },
    Tags { field: TagField, source: TagSet, dest: TagSet },
}

impl FieldDiff {
    pub fn field(&self) -> &'static str {
        match self {
            FieldDiff::Kind { .. } => "kind",
            FieldDiff::Text { field, .. } | FieldDiff::Changed(field) => *field,
            FieldDiff::Year { .. } => "year",
            FieldDiff::UserRating { .. } => "user_rating",
            FieldDiff::Tags { field, .. } => field.as_param(),
        }
    }
}

fn join_tags(tags: &TagSet) -> String {
    tags.iter().collect::<Vec<_>>().join(", ")
}

impl fmt::Display for FieldDiff {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldDiff::Kind { source, dest } => write!(f, "item kinds differ: {:?} vs {:?}", source, dest),
            FieldDiff::Text { field, source, dest } => write!(f, "{} differs: '{}' vs '{}'", field, source, dest),
            FieldDiff::Changed(field) => write!(f, "{} differs", field),
            FieldDiff::Year { source, dest } => write!(f, "year differs: {:?} vs {:?}", source, dest),
            FieldDiff::UserRating { source, dest } => write!(f, "user rating differs: {:.1} vs {:.1}", source, dest),
            FieldDiff::Tags { field, source, dest } => write!(
                f,
                "{} differ: [{}] vs [{}]",
                field.as_param(),
                join_tags(source),
                join_tags(dest)
            ),
        }
    }
}

/// Ratings are equal when they are within 0.2 after rounding to tenths.
/// A missing rating counts as 0.
pub fn ratings_equal(source: Option<f64>, dest: Option<f64>) -> bool {
    let gap = (source.unwrap_or(0.0) - dest.unwrap_or(0.0)) * 10.0;
    gap.abs().round() <= RATING_TOLERANCE_TENTHS
}

fn compare_text(out: &mut Vec<FieldDiff>, field: &'static str, source: &str, dest: &str) {
    if source != dest {
        out.push(FieldDiff::Text {
            field,
            source: source.to_string(),
            dest: dest.to_string(),
        });
    }
}

fn compare_opaque(out: &mut Vec<FieldDiff>, field: &'static str, source: &str, dest: &str) {
    if source != dest {
        out.push(FieldDiff::Changed(field));
    }
}

fn compare_tags(out: &mut Vec<FieldDiff>, field: TagField, source: &TagSet, dest: &TagSet) {
    if source != dest {
        out.push(FieldDiff::Tags {
            field,
            source: source.clone(),
            dest: dest.clone(),
        });
    }
}

/// Fields shared by every kind.
fn compare_core(out: &mut Vec<FieldDiff>, s: &ItemFields, d: &ItemFields) {
    compare_text(out, "title", &s.title, &d.title);
    if s.year != d.year {
        out.push(FieldDiff::Year {
            source: s.year,
            dest: d.year,
        });
    }
    compare_opaque(out, "summary", &s.summary, &d.summary);
    if !ratings_equal(s.user_rating, d.user_rating) {
        out.push(FieldDiff::UserRating {
            source: s.user_rating.unwrap_or(0.0),
            dest: d.user_rating.unwrap_or(0.0),
        });
    }
    compare_opaque(out, "thumb", &s.thumb, &d.thumb);
    compare_opaque(out, "art", &s.art, &d.art);
}

/// Descriptive fields and tag sets of works and series.
fn compare_descriptive(out: &mut Vec<FieldDiff>, s: &ItemFields, d: &ItemFields) {
    compare_core(out, s, d);
    compare_text(out, "original_title", &s.original_title, &d.original_title);
    compare_text(out, "content_rating", &s.content_rating, &d.content_rating);
    compare_text(out, "tagline", &s.tagline, &d.tagline);
    compare_tags(out, TagField::Genre, &s.genres, &d.genres);
    compare_tags(out, TagField::Label, &s.labels, &d.labels);
    compare_tags(out, TagField::Collection, &s.collections, &d.collections);
}

/// Every field on which `dest` differs from `source`. View counts are left to
/// watch-state reconciliation.
pub fn differences(source: &EnhancedItem, dest: &EnhancedItem) -> Vec<FieldDiff> {
    let mut out = Vec::new();
    match (source.item(), dest.item()) {
        (CatalogItem::Work(s), CatalogItem::Work(d)) => {
            compare_descriptive(&mut out, &s.fields, &d.fields);
            compare_text(&mut out, "studio", &s.studio, &d.studio);
        }
        (CatalogItem::Series(s), CatalogItem::Series(d)) => {
            compare_descriptive(&mut out, &s.fields, &d.fields);
            compare_text(&mut out, "studio", &s.studio, &d.studio);
            compare_text(&mut out, "network", &s.network, &d.network);
        }
        (CatalogItem::Episode(s), CatalogItem::Episode(d)) => {
            compare_core(&mut out, &s.fields, &d.fields);
        }
        _ => out.push(FieldDiff::Kind {
            source: source.kind(),
            dest: dest.kind(),
        }),
    }
    out
}

pub fn needs_sync(source: &EnhancedItem, dest: &EnhancedItem) -> bool {
    !differences(source, dest).is_empty()
}

/// Which side, if any, should take the other's watch state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchSync {
    ToDestination,
    ToSource,
    None,
}

/// Decide the watch-state direction for one matched pair.
///
/// One side watched: it wins when its last view is newer or the other side
/// never recorded one. Both watched: the higher view count wins, then the more
/// recent view. Anything else is left alone.
pub fn reconcile_watch_state(source: &WatchState, dest: &WatchState) -> WatchSync {
    match (source.watched, dest.watched) {
        (true, false) if source.viewed_after(dest) => WatchSync::ToDestination,
        (false, true) if dest.viewed_after(source) => WatchSync::ToSource,
        (true, true) => {
            if source.view_count > dest.view_count {
                WatchSync::ToDestination
            } else if dest.view_count > source.view_count {
                WatchSync::ToSource
            } else {
                match (source.last_viewed_at, dest.last_viewed_at) {
                    (Some(s), Some(d)) if s > d => WatchSync::ToDestination,
                    (Some(s), Some(d)) if d > s => WatchSync::ToSource,
                    (Some(_), None) => WatchSync::ToDestination,
                    (None, Some(_)) => WatchSync::ToSource,
                    _ => WatchSync::None,
                }
            }
        }
        _ => WatchSync::None,
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConsistencyReport {
    pub is_consistent: bool,
    pub issues: Vec<String>,
}

/// Watch-state discrepancies between the two sides, for diagnostics.
pub fn consistency_report(source: &WatchState, dest: &WatchState) -> ConsistencyReport {
    let mut issues = Vec::new();
    if source.watched != dest.watched {
        issues.push(format!(
            "watched flag differs: source={} dest={}",
            source.watched, dest.watched
        ));
    }
    if source.view_count.abs_diff(dest.view_count) > 1 {
        issues.push(format!(
            "view counts differ: source={} dest={}",
            source.view_count, dest.view_count
        ));
    }
    ConsistencyReport {
        is_consistent: issues.is_empty(),
        issues,
    }
}

/// What syncing one match did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MatchOutcome {
    /// Destination fields were written.
    pub metadata_synced: bool,
    pub watch: WatchSync,
}

pub struct MetadataSyncer<'a> {
    source: &'a dyn CatalogClient,
    dest: &'a dyn CatalogClient,
    dry_run: bool,
}

impl<'a> MetadataSyncer<'a> {
    pub fn new(source: &'a dyn CatalogClient, dest: &'a dyn CatalogClient) -> Self {
        Self {
            source,
            dest,
            dry_run: false,
        }
    }

    pub fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    /// Compare, correct the destination when needed, then reconcile watch state.
    pub async fn sync_match(&self, m: &ItemMatch) -> Result<MatchOutcome> {
        let mut errors = Vec::new();

        let diffs = differences(&m.source, &m.dest);
        let metadata_synced = if diffs.is_empty() {
            debug!(file = %m.file_name, "Metadata already in sync");
            false
        } else {
            debug!(
                file = %m.file_name,
                differences = %diffs.iter().map(ToString::to_string).collect::<Vec<_>>().join("; "),
                "Metadata differs"
            );
            match self.apply(&m.source, &m.dest).await {
                Ok(()) => true,
                Err(e) => {
                    errors.push(e.to_string());
                    false
                }
            }
        };

        let watch = match self.sync_watch_state(m).await {
            Ok(direction) => direction,
            Err(e) => {
                errors.push(e.to_string());
                WatchSync::None
            }
        };

        let report = consistency_report(m.source.item().watch_state(), m.dest.item().watch_state());
        if !report.is_consistent {
            debug!(file = %m.file_name, issues = ?report.issues, "Watch state inconsistency");
        }

        if errors.is_empty() {
            Ok(MatchOutcome { metadata_synced, watch })
        } else {
            Err(anyhow!("{}: {}", m.file_name, errors.join("; ")))
        }
    }

    /// Push rating, labels and genres from `source` to `dest`. Each write is
    /// attempted; failures are combined into one error.
    pub async fn apply(&self, source: &EnhancedItem, dest: &EnhancedItem) -> Result<()> {
        let s = source.item().fields();
        let d = dest.item().fields();
        let mut errors = Vec::new();

        if let Some(rating) = s.user_rating.filter(|r| *r > 0.0) {
            if !ratings_equal(s.user_rating, d.user_rating) {
                if let Err(e) = self.push_rating(dest, rating).await {
                    errors.push(format!("rating: {}", e));
                }
            }
        }

        for (field, wanted, current) in [
            (TagField::Label, &s.labels, &d.labels),
            (TagField::Genre, &s.genres, &d.genres),
        ] {
            if wanted != current {
                if let Err(e) = self.push_tags(dest, field, wanted, current).await {
                    errors.push(format!("{}: {}", field.as_param(), e));
                }
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(anyhow!("Failed to update {}: {}", dest.key(), errors.join("; ")))
        }
    }

    async fn push_rating(&self, dest: &EnhancedItem, rating: f64) -> Result<()> {
        if self.dry_run {
            info!(key = %dest.key(), rating, dry_run = true, "Would set rating");
            return Ok(());
        }
        self.dest.set_rating(dest.key(), rating).await?;
        debug!(key = %dest.key(), rating, "Rating updated");
        Ok(())
    }

    /// Make the destination's tag set equal to `wanted`.
    async fn push_tags(&self, dest: &EnhancedItem, field: TagField, wanted: &TagSet, current: &TagSet) -> Result<()> {
        let add: Vec<String> = wanted.iter().map(str::to_string).collect();
        let remove: Vec<String> = current.difference(wanted).map(str::to_string).collect();

        if self.dry_run {
            info!(
                key = %dest.key(),
                field = field.as_param(),
                set = ?add,
                remove = ?remove,
                dry_run = true,
                "Would update tags"
            );
            return Ok(());
        }

        if !add.is_empty() {
            self.dest
                .set_field(dest.key(), dest.library_id(), dest.media_type_code(), field, &add)
                .await?;
        }
        if !remove.is_empty() {
            self.dest
                .remove_tags(dest.key(), dest.library_id(), dest.media_type_code(), field, &remove)
                .await?;
        }
        debug!(key = %dest.key(), field = field.as_param(), added = add.len(), removed = remove.len(), "Tags updated");
        Ok(())
    }

    pub async fn sync_watch_state(&self, m: &ItemMatch) -> Result<WatchSync> {
        let source_state = m.source.item().watch_state();
        let dest_state = m.dest.item().watch_state();
        let direction = reconcile_watch_state(source_state, dest_state);

        let (client, key, watched, direction_label) = match direction {
            WatchSync::None => return Ok(direction),
            WatchSync::ToDestination => (self.dest, m.dest.key(), source_state.watched, "source_to_destination"),
            WatchSync::ToSource => (self.source, m.source.key(), dest_state.watched, "destination_to_source"),
        };

        if self.dry_run {
            info!(
                operation = "watched_state_sync",
                file = %m.file_name,
                direction = direction_label,
                watched,
                dry_run = true,
                "Would sync watched state"
            );
            return Ok(direction);
        }

        if let Err(e) = client.set_watch_state(key, watched).await {
            warn!(file = %m.file_name, direction = direction_label, error = %e, "Failed to sync watched state");
            return Err(e.into());
        }
        info!(
            operation = "watched_state_sync",
            file = %m.file_name,
            direction = direction_label,
            watched,
            source_views = source_state.view_count,
            dest_views = dest_state.view_count,
            "Watched state synced"
        );
        Ok(direction)
    }

    /// Direct title write. Not used by the default pipeline.
    pub async fn set_title(&self, dest: &EnhancedItem, title: &str) -> Result<()> {
        self.set_text(dest, TextField::Title, title).await
    }

    /// Direct summary write. Not used by the default pipeline.
    pub async fn set_summary(&self, dest: &EnhancedItem, summary: &str) -> Result<()> {
        self.set_text(dest, TextField::Summary, summary).await
    }

    async fn set_text(&self, dest: &EnhancedItem, field: TextField, value: &str) -> Result<()> {
        if self.dry_run {
            info!(key = %dest.key(), field = field.as_param(), dry_run = true, "Would update text field");
            return Ok(());
        }
        self.dest
            .set_text_field(dest.key(), dest.library_id(), dest.media_type_code(), field, value)
            .await?;
        Ok(())
    }
}
