use super::*;
use crate::refresh::ManualClock;
use crate::transfer::fakes::{FakeShell, ScriptedBackend};
use crate::transfer::RawTransfer;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use syncarr_catalog::testing::{work, Call, FakeCatalog};
use syncarr_models::{CatalogItem, ItemFields, LibraryType, MediaPart, RatingKey, Work};
use tempfile::TempDir;
use tokio::sync::oneshot;

struct FakeTransfers {
    shell: Arc<FakeShell>,
    opened: AtomicUsize,
    backend_failures: u32,
}

impl FakeTransfers {
    fn new(shell: Arc<FakeShell>) -> Self {
        Self {
            shell,
            opened: AtomicUsize::new(0),
            backend_failures: 0,
        }
    }

    /// The first `n` backend calls fail; retries are disabled.
    fn failing_backend(mut self, n: u32) -> Self {
        self.backend_failures = n;
        self
    }
}

#[async_trait]
impl TransferFactory for Arc<FakeTransfers> {
    async fn open(&self) -> Result<TransferLayer> {
        self.opened.fetch_add(1, Ordering::SeqCst);
        let (backend, _) = ScriptedBackend::new(self.backend_failures, RawTransfer::Copied);
        let transferrer = Transferrer::new(Box::new(backend), self.shell.clone()).with_retry(RetryPolicy::none());
        Ok(TransferLayer::new(transferrer))
    }
}

fn config(local_root: &Path) -> Config {
    let vars: HashMap<&str, String> = [
        ("SOURCE_PLEX_HOST", "source.local".to_string()),
        ("SOURCE_PLEX_TOKEN", "s-token".to_string()),
        ("DEST_PLEX_HOST", "dest.local".to_string()),
        ("DEST_PLEX_TOKEN", "d-token".to_string()),
        ("SYNC_LABEL", "sync".to_string()),
        ("SOURCE_REPLACE_FROM", "/data/media".to_string()),
        ("SOURCE_REPLACE_TO", local_root.to_string_lossy().into_owned()),
        ("DEST_ROOT_DIR", "/dest".to_string()),
    ]
    .into_iter()
    .collect();
    Config::from_lookup(move |key| vars.get(key).cloned()).unwrap()
}

fn rated_work(key: &str, title: &str, file: &str, rating: f64) -> CatalogItem {
    CatalogItem::Work(Work {
        fields: ItemFields {
            key: RatingKey::from(key),
            title: title.to_string(),
            user_rating: Some(rating),
            parts: vec![MediaPart {
                file: file.to_string(),
                size: 0,
            }],
            ..ItemFields::default()
        },
        studio: String::new(),
    })
}

fn write_file(root: &Path, rel: &str, len: usize) {
    let path = root.join(rel);
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    std::fs::write(path, vec![0u8; len]).unwrap();
}

fn source_catalog() -> FakeCatalog {
    FakeCatalog::new("source")
        .with_library("1", LibraryType::Movie)
        .with_tagged("1", vec![work("10", "Heat", &[]), work("11", "Gone", &[])])
        .with_detail(rated_work("10", "Heat", "/data/media/Movies/Heat/Heat.mkv", 9.0))
        .with_detail(rated_work("11", "Gone", "/data/media/Movies/Gone/Gone.mkv", 7.0))
}

fn dest_catalog() -> FakeCatalog {
    FakeCatalog::new("destination")
        .with_library("5", LibraryType::Movie)
        .with_content("5", vec![work("50", "Heat", &[])])
        .with_detail(rated_work("50", "Heat", "/dest/Movies/Heat/Heat.mkv", 5.0))
}

#[test]
fn test_orphans_are_listed_files_not_synced() {
    let mut synced = SyncedFileSet::new();
    synced.record("/dest/a.mkv");
    let listing: HashSet<String> = ["/dest/a.mkv", "/dest/b.mkv"].iter().map(|s| s.to_string()).collect();

    assert_eq!(synced.orphans(&listing), vec!["/dest/b.mkv".to_string()]);
}

#[tokio::test]
async fn test_full_cycle() {
    let local = TempDir::new().unwrap();
    write_file(local.path(), "Movies/Heat/Heat.mkv", 2048);
    write_file(local.path(), "Movies/Heat/Heat.en.srt", 10);

    let shell = Arc::new(
        FakeShell::default()
            .with_file("/dest/Movies/Heat/Heat.mkv", 2048)
            .with_file("/dest/Old/old.mkv", 5),
    );
    let transfers = Arc::new(FakeTransfers::new(shell.clone()));
    let dest = Arc::new(dest_catalog());

    let orchestrator = SyncOrchestrator::new(Arc::new(source_catalog()), dest.clone(), config(local.path()))
        .with_transfers(Box::new(transfers.clone()))
        .with_clock(Arc::new(ManualClock::new()));

    let stats = orchestrator.run_sync_cycle().await.unwrap();

    assert_eq!(stats.items_discovered, 2);
    // Heat.mkv has the same size remotely; Gone.mkv is missing locally.
    assert_eq!(stats.files_skipped, 2);
    assert_eq!(stats.files_transferred, 1);
    assert_eq!(stats.bytes_transferred, 10);
    assert_eq!(stats.files_failed, 0);
    assert_eq!(stats.orphans_deleted, 1);
    assert_eq!(shell.deleted(), vec!["/dest/Old/old.mkv".to_string()]);
    assert_eq!(stats.matches, 1);
    assert_eq!(stats.metadata_synced, 1);
    assert_eq!(stats.metadata_errors, 0);
    assert!(!stats.refresh_timed_out);
    assert_eq!(transfers.opened.load(Ordering::SeqCst), 1);

    assert_eq!(
        dest.calls(),
        vec![
            Call::TriggerScan("5".to_string()),
            Call::TriggerRefresh("5".to_string()),
            Call::SetRating {
                key: "50".to_string(),
                rating: 9.0
            },
        ]
    );
}

#[tokio::test]
async fn test_unreachable_destination_aborts_before_discovery() {
    let local = TempDir::new().unwrap();
    let transfers = Arc::new(FakeTransfers::new(Arc::new(FakeShell::default())));
    let orchestrator = SyncOrchestrator::new(
        Arc::new(source_catalog()),
        Arc::new(dest_catalog().unreachable()),
        config(local.path()),
    )
    .with_transfers(Box::new(transfers.clone()));

    let err = orchestrator.run_sync_cycle().await.unwrap_err();

    assert!(err.to_string().contains("unreachable"));
    assert_eq!(transfers.opened.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_without_transfers_only_metadata_is_synced() {
    let local = TempDir::new().unwrap();
    let dest = Arc::new(dest_catalog());
    let orchestrator = SyncOrchestrator::new(Arc::new(source_catalog()), dest.clone(), config(local.path()));

    let stats = orchestrator.run_sync_cycle().await.unwrap();

    assert_eq!(stats.files_transferred + stats.files_skipped, 0);
    assert_eq!(stats.matches, 1);
    assert!(!dest
        .calls()
        .iter()
        .any(|c| matches!(c, Call::TriggerScan(_))));
}

#[tokio::test]
async fn test_no_scan_trigger_is_run_fatal() {
    let local = TempDir::new().unwrap();
    let dest = Arc::new(dest_catalog().failing_scan("5"));
    let orchestrator = SyncOrchestrator::new(Arc::new(source_catalog()), dest.clone(), config(local.path()))
        .with_transfers(Box::new(Arc::new(FakeTransfers::new(Arc::new(FakeShell::default())))))
        .with_clock(Arc::new(ManualClock::new()));

    let err = orchestrator.run_sync_cycle().await.unwrap_err();

    assert!(format!("{:#}", err).contains("No destination library accepted a scan request"));
    assert!(!dest
        .calls()
        .iter()
        .any(|c| matches!(c, Call::SetRating { .. })));
}

/// Fires the shutdown signal on the `stop_after`th sleep.
struct StopAfterSleeps {
    sleeps: AtomicUsize,
    stop_after: usize,
    stop: Mutex<Option<oneshot::Sender<()>>>,
}

#[async_trait]
impl Clock for StopAfterSleeps {
    fn now(&self) -> Instant {
        Instant::now()
    }

    async fn sleep(&self, _duration: Duration) {
        let n = self.sleeps.fetch_add(1, Ordering::SeqCst) + 1;
        if n == self.stop_after {
            if let Some(stop) = self.stop.lock().unwrap().take() {
                let _ = stop.send(());
            }
        }
        tokio::task::yield_now().await;
    }
}

#[tokio::test]
async fn test_continuous_mode_survives_failed_cycles_until_shutdown() {
    let local = TempDir::new().unwrap();
    let (tx, rx) = oneshot::channel();
    let clock = Arc::new(StopAfterSleeps {
        sleeps: AtomicUsize::new(0),
        stop_after: 2,
        stop: Mutex::new(Some(tx)),
    });
    let orchestrator = SyncOrchestrator::new(
        Arc::new(source_catalog()),
        Arc::new(dest_catalog().unreachable()),
        config(local.path()),
    )
    .with_clock(clock.clone());

    orchestrator
        .run_continuous(Duration::from_secs(3600), async {
            let _ = rx.await;
        })
        .await
        .unwrap();

    assert_eq!(clock.sleeps.load(Ordering::SeqCst), 2);
}

fn orchestrator_with(transfers: FakeTransfers, source: FakeCatalog, local: &Path) -> SyncOrchestrator {
    SyncOrchestrator::new(Arc::new(source), Arc::new(dest_catalog()), config(local))
        .with_transfers(Box::new(Arc::new(transfers)))
        .with_clock(Arc::new(ManualClock::new()))
}

#[tokio::test]
async fn test_empty_discovery_leaves_destination_untouched() {
    let local = TempDir::new().unwrap();
    let shell = Arc::new(
        FakeShell::default()
            .with_file("/dest/Movies/Heat/Heat.mkv", 2048)
            .with_file("/dest/Movies/Gone/Gone.mkv", 1024),
    );
    let transfers = Arc::new(FakeTransfers::new(shell.clone()));
    let source = FakeCatalog::new("source")
        .with_library("1", LibraryType::Movie)
        .with_tagged("1", Vec::new());
    let dest = Arc::new(dest_catalog());
    let orchestrator = SyncOrchestrator::new(Arc::new(source), dest.clone(), config(local.path()))
        .with_transfers(Box::new(transfers.clone()))
        .with_clock(Arc::new(ManualClock::new()));

    let stats = orchestrator.run_sync_cycle().await.unwrap();

    assert_eq!(stats.items_discovered, 0);
    assert_eq!(stats.orphans_deleted, 0);
    assert!(shell.deleted().is_empty());
    assert_eq!(transfers.opened.load(Ordering::SeqCst), 0);
    assert!(dest.calls().is_empty());
}

#[tokio::test]
async fn test_failed_transfer_is_counted_and_kept_off_orphan_list() {
    let local = TempDir::new().unwrap();
    write_file(local.path(), "Movies/Heat/Heat.mkv", 2048);
    let shell = Arc::new(
        FakeShell::default()
            .with_file("/dest/Movies/Heat/Heat.mkv", 1000)
            .with_file("/dest/Old/old.mkv", 5),
    );
    let transfers = FakeTransfers::new(shell.clone()).failing_backend(1);
    let orchestrator = orchestrator_with(transfers, source_catalog(), local.path());

    let stats = orchestrator.run_sync_cycle().await.unwrap();

    assert_eq!(stats.files_failed, 1);
    assert_eq!(stats.files_transferred, 0);
    // Gone.mkv is missing locally.
    assert_eq!(stats.files_skipped, 1);
    assert_eq!(stats.orphans_deleted, 1);
    assert_eq!(shell.deleted(), vec!["/dest/Old/old.mkv".to_string()]);
    assert_eq!(stats.matches, 1);
}

#[tokio::test]
async fn test_listing_failure_skips_cleanup_without_failing_run() {
    let local = TempDir::new().unwrap();
    write_file(local.path(), "Movies/Heat/Heat.mkv", 2048);
    let shell = Arc::new(
        FakeShell::default()
            .with_file("/dest/Old/old.mkv", 5)
            .failing_listing(),
    );
    let orchestrator = orchestrator_with(FakeTransfers::new(shell.clone()), source_catalog(), local.path());

    let stats = orchestrator.run_sync_cycle().await.unwrap();

    assert_eq!(stats.files_transferred, 1);
    assert_eq!(stats.orphans_deleted, 0);
    assert!(shell.deleted().is_empty());
    assert_eq!(stats.matches, 1);
}

#[tokio::test]
async fn test_delete_failure_does_not_stop_remaining_deletions() {
    let local = TempDir::new().unwrap();
    let shell = Arc::new(
        FakeShell::default()
            .with_file("/dest/Old/a.mkv", 5)
            .with_file("/dest/Old/b.mkv", 5)
            .with_file("/dest/Old/c.mkv", 5)
            .failing_delete("/dest/Old/a.mkv"),
    );
    let orchestrator = orchestrator_with(FakeTransfers::new(shell.clone()), source_catalog(), local.path());

    let stats = orchestrator.run_sync_cycle().await.unwrap();

    assert_eq!(stats.orphans_deleted, 2);
    assert_eq!(
        shell.deleted(),
        vec!["/dest/Old/b.mkv".to_string(), "/dest/Old/c.mkv".to_string()]
    );
}

#[tokio::test]
async fn test_sibling_episodes_are_transferred_once() {
    let local = TempDir::new().unwrap();
    write_file(local.path(), "TV/Show/Show.S01E01.mkv", 10);
    write_file(local.path(), "TV/Show/Show.S01E02.mkv", 12);
    let source = FakeCatalog::new("source")
        .with_library("1", LibraryType::Movie)
        .with_tagged("1", vec![work("20", "Pilot", &[]), work("21", "Second", &[])])
        .with_detail(rated_work("20", "Pilot", "/data/media/TV/Show/Show.S01E01.mkv", 8.0))
        .with_detail(rated_work("21", "Second", "/data/media/TV/Show/Show.S01E02.mkv", 8.0));
    let shell = Arc::new(FakeShell::default());
    let orchestrator = orchestrator_with(FakeTransfers::new(shell.clone()), source, local.path());

    let stats = orchestrator.run_sync_cycle().await.unwrap();

    assert_eq!(stats.files_transferred, 2);
    assert_eq!(stats.files_skipped, 0);
    assert_eq!(stats.bytes_transferred, 22);
}
