use super::*;
use chrono::{Duration, TimeZone, Utc};
use syncarr_catalog::testing::{Call, FakeCatalog};
use syncarr_models::{Episode, RatingKey, Series, Work};

fn fields(key: &str) -> ItemFields {
    ItemFields {
        key: RatingKey::from(key),
        title: "Heat".to_string(),
        year: Some(1995),
        summary: "A crew of thieves.".to_string(),
        content_rating: "R".to_string(),
        user_rating: Some(8.0),
        ..ItemFields::default()
    }
}

fn work_with(key: &str, edit: impl FnOnce(&mut ItemFields)) -> EnhancedItem {
    let mut f = fields(key);
    edit(&mut f);
    EnhancedItem::new(
        CatalogItem::Work(Work {
            fields: f,
            studio: "Warner".to_string(),
        }),
        "1",
    )
}

fn tags(values: &[&str]) -> TagSet {
    values.iter().copied().collect()
}

fn watch(watched: bool, view_count: u64, hours_ago: Option<i64>) -> WatchState {
    let base = Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap();
    WatchState {
        watched,
        view_count,
        last_viewed_at: hours_ago.map(|h| base - Duration::hours(h)),
        view_offset_ms: 0,
    }
}

fn matched(source: EnhancedItem, dest: EnhancedItem) -> ItemMatch {
    ItemMatch {
        file_name: "Heat.mkv".to_string(),
        source,
        dest,
    }
}

#[test]
fn test_rating_tolerance() {
    assert!(ratings_equal(Some(7.2), Some(7.4)));
    assert!(!ratings_equal(Some(7.2), Some(7.5)));
    assert!(ratings_equal(Some(8.0), Some(8.1)));
    assert!(ratings_equal(None, Some(0.1)));
    assert!(!ratings_equal(None, Some(5.0)));
}

#[test]
fn test_identical_items_do_not_need_sync() {
    let source = work_with("1", |_| {});
    let dest = work_with("2", |_| {});
    assert!(differences(&source, &dest).is_empty());
    assert!(!needs_sync(&source, &dest));
}

#[test]
fn test_tag_sets_compare_as_sets() {
    let source = work_with("1", |f| f.labels = tags(&["b", "a", "a"]));
    let dest = work_with("2", |f| f.labels = tags(&["a", "b"]));
    assert!(!needs_sync(&source, &dest));

    let extra = work_with("3", |f| f.labels = tags(&["a", "b", "c"]));
    let swapped = work_with("4", |f| f.labels = tags(&["a", "c"]));
    assert!(needs_sync(&source, &extra));
    assert!(needs_sync(&source, &swapped));

    let diffs = differences(&source, &swapped);
    assert_eq!(diffs.len(), 1);
    assert_eq!(diffs[0].field(), "label");
}

#[test]
fn test_each_field_difference_is_named() {
    let source = work_with("1", |f| f.genres = tags(&["Crime"]));
    let dest = work_with("2", |f| {
        f.title = "Heat (1995)".to_string();
        f.summary = "Different".to_string();
        f.user_rating = Some(6.0);
        f.year = Some(1996);
    });

    let names: Vec<&str> = differences(&source, &dest).iter().map(FieldDiff::field).collect();
    assert_eq!(names, vec!["title", "year", "summary", "user_rating", "genre"]);
}

#[test]
fn test_series_compare_network() {
    let series = |network: &str| {
        EnhancedItem::new(
            CatalogItem::Series(Series {
                fields: fields("7"),
                network: network.to_string(),
                ..Series::default()
            }),
            "2",
        )
    };
    let diffs = differences(&series("HBO"), &series("AMC"));
    assert_eq!(diffs.len(), 1);
    assert_eq!(diffs[0].to_string(), "network differs: 'HBO' vs 'AMC'");
}

#[test]
fn test_episodes_ignore_descriptive_tags() {
    let episode = |labels: &[&str]| {
        EnhancedItem::new(
            CatalogItem::Episode(Episode {
                fields: ItemFields {
                    labels: tags(labels),
                    ..fields("9")
                },
                ..Episode::default()
            }),
            "2",
        )
    };
    assert!(!needs_sync(&episode(&["x"]), &episode(&[])));
}

#[test]
fn test_kind_mismatch_differs() {
    let source = work_with("1", |_| {});
    let dest = EnhancedItem::new(CatalogItem::Series(Series::default()), "2");
    assert_eq!(
        differences(&source, &dest),
        vec![FieldDiff::Kind {
            source: ItemKind::Work,
            dest: ItemKind::Series
        }]
    );
}

#[test]
fn test_higher_view_count_wins_when_both_watched() {
    let source = watch(true, 3, Some(1));
    let dest = watch(true, 1, Some(5));
    assert_eq!(reconcile_watch_state(&source, &dest), WatchSync::ToDestination);
    assert_eq!(reconcile_watch_state(&dest, &source), WatchSync::ToSource);
}

#[test]
fn test_equal_counts_break_on_recency() {
    assert_eq!(
        reconcile_watch_state(&watch(true, 2, Some(1)), &watch(true, 2, Some(3))),
        WatchSync::ToDestination
    );
    assert_eq!(
        reconcile_watch_state(&watch(true, 2, Some(3)), &watch(true, 2, Some(3))),
        WatchSync::None
    );
}

#[test]
fn test_single_watched_side_needs_newer_timestamp() {
    assert_eq!(
        reconcile_watch_state(&watch(true, 1, Some(1)), &watch(false, 0, None)),
        WatchSync::ToDestination
    );
    assert_eq!(
        reconcile_watch_state(&watch(true, 1, Some(5)), &watch(false, 0, Some(1))),
        WatchSync::None
    );
    assert_eq!(
        reconcile_watch_state(&watch(false, 0, None), &watch(true, 1, Some(1))),
        WatchSync::ToSource
    );
    assert_eq!(
        reconcile_watch_state(&watch(false, 0, None), &watch(false, 0, None)),
        WatchSync::None
    );
}

#[test]
fn test_consistency_report() {
    let report = consistency_report(&watch(true, 5, None), &watch(false, 1, None));
    assert!(!report.is_consistent);
    assert_eq!(report.issues.len(), 2);

    assert!(consistency_report(&watch(true, 2, None), &watch(true, 1, None)).is_consistent);
}

#[tokio::test]
async fn test_watch_state_pushed_to_destination() {
    let source_catalog = FakeCatalog::new("source");
    let dest_catalog = FakeCatalog::new("destination");
    let m = matched(
        work_with("1", |f| f.watch = watch(true, 3, Some(1))),
        work_with("2", |f| f.watch = watch(true, 1, Some(10))),
    );

    let outcome = MetadataSyncer::new(&source_catalog, &dest_catalog)
        .sync_match(&m)
        .await
        .unwrap();

    assert!(!outcome.metadata_synced);
    assert_eq!(outcome.watch, WatchSync::ToDestination);
    assert_eq!(
        dest_catalog.calls(),
        vec![Call::SetWatchState {
            key: "2".to_string(),
            watched: true
        }]
    );
    assert!(source_catalog.calls().is_empty());
}

#[tokio::test]
async fn test_apply_pushes_rating_labels_and_genres() {
    let source_catalog = FakeCatalog::new("source");
    let dest_catalog = FakeCatalog::new("destination");
    let m = matched(
        work_with("1", |f| {
            f.user_rating = Some(9.0);
            f.labels = tags(&["sync", "keep"]);
            f.genres = tags(&["Crime"]);
        }),
        work_with("2", |f| {
            f.user_rating = Some(4.0);
            f.labels = tags(&["sync", "stale"]);
            f.genres = tags(&["Crime"]);
        }),
    );

    let outcome = MetadataSyncer::new(&source_catalog, &dest_catalog)
        .sync_match(&m)
        .await
        .unwrap();

    assert!(outcome.metadata_synced);
    assert_eq!(
        dest_catalog.calls(),
        vec![
            Call::SetRating {
                key: "2".to_string(),
                rating: 9.0
            },
            Call::SetField {
                key: "2".to_string(),
                field: TagField::Label,
                values: vec!["keep".to_string(), "sync".to_string()],
            },
            Call::RemoveTags {
                key: "2".to_string(),
                field: TagField::Label,
                values: vec!["stale".to_string()],
            },
        ]
    );
}

#[tokio::test]
async fn test_apply_failures_are_combined() {
    let source_catalog = FakeCatalog::new("source");
    let dest_catalog = FakeCatalog::new("destination").failing_writes();
    let source = work_with("1", |f| {
        f.user_rating = Some(9.0);
        f.labels = tags(&["a"]);
        f.genres = tags(&["Drama"]);
    });
    let dest = work_with("2", |_| {});

    let err = MetadataSyncer::new(&source_catalog, &dest_catalog)
        .apply(&source, &dest)
        .await
        .unwrap_err()
        .to_string();

    assert!(err.contains("rating"));
    assert!(err.contains("label"));
    assert!(err.contains("genre"));
}

#[tokio::test]
async fn test_dry_run_writes_nothing() {
    let source_catalog = FakeCatalog::new("source");
    let dest_catalog = FakeCatalog::new("destination");
    let m = matched(
        work_with("1", |f| {
            f.labels = tags(&["new"]);
            f.watch = watch(true, 1, Some(1));
        }),
        work_with("2", |_| {}),
    );

    let outcome = MetadataSyncer::new(&source_catalog, &dest_catalog)
        .with_dry_run(true)
        .sync_match(&m)
        .await
        .unwrap();

    assert!(outcome.metadata_synced);
    assert_eq!(outcome.watch, WatchSync::ToDestination);
    assert!(dest_catalog.calls().is_empty());
}

#[tokio::test]
async fn test_title_and_summary_extension_points() {
    let source_catalog = FakeCatalog::new("source");
    let dest_catalog = FakeCatalog::new("destination");
    let dest = work_with("2", |_| {});
    let syncer = MetadataSyncer::new(&source_catalog, &dest_catalog);

    syncer.set_title(&dest, "Heat").await.unwrap();
    syncer.set_summary(&dest, "Crew").await.unwrap();

    assert_eq!(
        dest_catalog.calls(),
        vec![
            Call::SetText {
                key: "2".to_string(),
                field: TextField::Title,
                value: "Heat".to_string()
            },
            Call::SetText {
                key: "2".to_string(),
                field: TextField::Summary,
                value: "Crew".to_string()
            },
        ]
    );
}
