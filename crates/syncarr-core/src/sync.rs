use anyhow::{Context, Result};
use async_trait::async_trait;
use std::collections::HashSet;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use syncarr_catalog::CatalogClient;
use syncarr_config::{Config, PerformanceConfig, SshConfig, TransferMethod};
use syncarr_models::{EnhancedItem, ItemMatch, SyncStats};
use tracing::{debug, error, info, instrument, warn};

use crate::discovery::ContentDiscovery;
use crate::matcher::ContentMatcher;
use crate::metadata::{MetadataSyncer, WatchSync};
use crate::refresh::{Clock, RefreshCoordinator, RefreshSettings, TokioClock};
use crate::retry::RetryPolicy;
use crate::transfer::{
    companion_files, select_backend, RemoteSession, SshTarget, TransferOutcome, Transferrer,
};

#[cfg(test)]
mod tests;

const PROGRESS_EVERY: usize = 100;
const TRANSFER_RETRY_DELAY: Duration = Duration::from_secs(5);

/// Destination paths this run transferred or found already present.
#[derive(Debug, Default)]
pub struct SyncedFileSet {
    paths: HashSet<String>,
}

impl SyncedFileSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, path: impl Into<String>) {
        self.paths.insert(path.into());
    }

    pub fn contains(&self, path: &str) -> bool {
        self.paths.contains(path)
    }

    pub fn len(&self) -> usize {
        self.paths.len()
    }

    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }

    /// Files in `listing` this run did not produce, sorted.
    pub fn orphans(&self, listing: &HashSet<String>) -> Vec<String> {
        let mut orphans: Vec<String> = listing
            .iter()
            .filter(|path| !self.paths.contains(path.as_str()))
            .cloned()
            .collect();
        orphans.sort();
        orphans
    }
}

/// The transfer layer for one run. `close` releases the remote session.
pub struct TransferLayer {
    transferrer: Transferrer,
    session: Option<Arc<RemoteSession>>,
}

impl TransferLayer {
    pub fn new(transferrer: Transferrer) -> Self {
        Self {
            transferrer,
            session: None,
        }
    }

    pub fn with_session(mut self, session: Arc<RemoteSession>) -> Self {
        self.session = Some(session);
        self
    }

    pub fn transferrer(&self) -> &Transferrer {
        &self.transferrer
    }

    pub async fn close(self) {
        if let Some(session) = self.session {
            session.close().await;
        }
    }
}

/// Opens the transfer layer at the start of each run.
#[async_trait]
pub trait TransferFactory: Send + Sync {
    async fn open(&self) -> Result<TransferLayer>;
}

/// SSH to the destination host, with the backend picked by probe or config.
pub struct SshTransferFactory {
    host: String,
    ssh: SshConfig,
    method: TransferMethod,
    performance: PerformanceConfig,
    runtime_dir: PathBuf,
    dry_run: bool,
}

impl SshTransferFactory {
    pub fn from_config(config: &Config, runtime_dir: &Path) -> Self {
        Self {
            host: config.destination.host.clone(),
            ssh: config.ssh.clone(),
            method: config.transfer_method,
            performance: config.performance.clone(),
            runtime_dir: runtime_dir.to_path_buf(),
            dry_run: config.dry_run,
        }
    }
}

#[async_trait]
impl TransferFactory for SshTransferFactory {
    async fn open(&self) -> Result<TransferLayer> {
        let target = SshTarget::from_config(&self.host, &self.ssh);
        let session = Arc::new(
            RemoteSession::open(target, &self.runtime_dir)
                .await
                .with_context(|| format!("Failed to open SSH session to {}", self.host))?,
        );

        let backend = match select_backend(self.method, session.clone(), &self.performance).await {
            Ok(backend) => backend,
            Err(e) => {
                session.close().await;
                return Err(e).context("Failed to select transfer backend");
            }
        };

        let transferrer = Transferrer::new(backend, session.clone())
            .with_retry(RetryPolicy {
                max_retries: self.performance.transfer_retries,
                base_delay: TRANSFER_RETRY_DELAY,
            })
            .with_dry_run(self.dry_run)
            .with_max_concurrent(self.performance.max_concurrent_transfers);

        Ok(TransferLayer::new(transferrer).with_session(session))
    }
}

pub struct SyncOrchestrator {
    source: Arc<dyn CatalogClient>,
    dest: Arc<dyn CatalogClient>,
    config: Config,
    transfers: Option<Box<dyn TransferFactory>>,
    clock: Arc<dyn Clock>,
    refresh_settings: RefreshSettings,
    force_full_sync: bool,
}

impl SyncOrchestrator {
    pub fn new(source: Arc<dyn CatalogClient>, dest: Arc<dyn CatalogClient>, config: Config) -> Self {
        let force_full_sync = config.force_full_sync;
        Self {
            source,
            dest,
            config,
            transfers: None,
            clock: Arc::new(TokioClock),
            refresh_settings: RefreshSettings::default(),
            force_full_sync,
        }
    }

    /// Without a transfer factory the run is metadata-only.
    pub fn with_transfers(mut self, factory: Box<dyn TransferFactory>) -> Self {
        self.transfers = Some(factory);
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_refresh_settings(mut self, settings: RefreshSettings) -> Self {
        self.refresh_settings = settings;
        self
    }

    pub fn set_force_full_sync(&mut self, force: bool) {
        self.force_full_sync = force;
    }

    #[instrument(skip(self), fields(label = %self.config.sync_label))]
    pub async fn run_sync_cycle(&self) -> Result<SyncStats> {
        let start = Instant::now();
        let mut stats = SyncStats::default();

        info!(
            operation = "sync_start",
            transfers = self.transfers.is_some(),
            dry_run = self.config.dry_run,
            force_full_sync = self.force_full_sync,
            "Starting sync cycle"
        );

        let identity = self
            .dest
            .identity()
            .await
            .context("Destination catalog is unreachable")?;
        debug!(
            machine_identifier = %identity.machine_identifier,
            version = %identity.version,
            "Destination catalog reachable"
        );

        let items = ContentDiscovery::new(self.source.as_ref(), self.config.sync_label.as_str())
            .discover()
            .await?;
        stats.items_discovered = items.len();

        // An empty discovery must never reach orphan cleanup: it would wipe the destination.
        if items.is_empty() {
            stats.duration = start.elapsed();
            warn!(
                operation = "sync_complete",
                label = %self.config.sync_label,
                "No items found for synchronization"
            );
            return Ok(stats);
        }

        match &self.transfers {
            Some(factory) => {
                let layer = factory.open().await?;
                let synced = self.transfer_items(layer.transferrer(), &items, &mut stats).await;
                self.cleanup_orphans(layer.transferrer(), &synced, &mut stats).await;
                layer.close().await;

                let report = RefreshCoordinator::new(self.dest.clone(), self.clock.clone())
                    .with_settings(self.refresh_settings.clone())
                    .run()
                    .await
                    .context("Destination library refresh failed")?;
                stats.refresh_timed_out = report.refresh_timed_out;
            }
            None => info!("SSH not configured, syncing metadata only"),
        }

        let matches = ContentMatcher::new(self.dest.as_ref()).match_all(&items).await?;
        stats.matches = matches.len();
        self.sync_metadata(&matches, &mut stats).await;

        stats.duration = start.elapsed();
        info!(
            operation = "sync_complete",
            items = stats.items_discovered,
            transferred = stats.files_transferred,
            skipped = stats.files_skipped,
            failed = stats.files_failed,
            orphans_deleted = stats.orphans_deleted,
            matches = stats.matches,
            metadata_synced = stats.metadata_synced,
            metadata_errors = stats.metadata_errors,
            duration_ms = stats.duration.as_millis() as u64,
            "Sync cycle complete"
        );
        Ok(stats)
    }

    /// Copy every backing file and its companions. Item-level failures are counted, not returned.
    async fn transfer_items(&self, transferrer: &Transferrer, items: &[EnhancedItem], stats: &mut SyncStats) -> SyncedFileSet {
        let mut synced = SyncedFileSet::new();
        let total = items.len();

        for (i, item) in items.iter().enumerate() {
            for part in item.item().parts() {
                let local = match self.config.paths.to_local(&part.file) {
                    Ok(local) => PathBuf::from(local),
                    Err(e) => {
                        warn!(file = %part.file, error = %e, "Cannot map source path, skipping");
                        stats.files_failed += 1;
                        continue;
                    }
                };

                self.transfer_file(transferrer, &local, &mut synced, stats).await;
                for companion in companion_files(&local).await {
                    self.transfer_file(transferrer, &companion, &mut synced, stats).await;
                }
            }

            if (i + 1) % PROGRESS_EVERY == 0 {
                info!(
                    completed = i + 1,
                    total,
                    transferred = stats.files_transferred,
                    skipped = stats.files_skipped,
                    failed = stats.files_failed,
                    "Transfer progress"
                );
            }
        }
        synced
    }

    async fn transfer_file(&self, transferrer: &Transferrer, local: &Path, synced: &mut SyncedFileSet, stats: &mut SyncStats) {
        let dest = match self.config.paths.to_dest(&local.to_string_lossy()) {
            Ok(dest) => dest,
            Err(e) => {
                warn!(file = %local.display(), error = %e, "Cannot map destination path, skipping");
                stats.files_failed += 1;
                return;
            }
        };
        // Sibling episodes share a name prefix and sweep each other up as companions.
        if synced.contains(&dest) {
            return;
        }

        match transferrer.transfer(local, &dest).await {
            Ok(TransferOutcome::Skipped(_)) => {
                stats.files_skipped += 1;
                synced.record(dest);
            }
            Ok(TransferOutcome::Completed { bytes, .. }) => {
                stats.files_transferred += 1;
                stats.bytes_transferred += bytes;
                synced.record(dest);
            }
            Err(e) if e.is_local_missing() => {
                warn!(file = %local.display(), "Local file missing, skipping");
                stats.files_skipped += 1;
            }
            Err(e) => {
                error!(file = %local.display(), dest = %dest, error = %e, "Transfer failed");
                stats.files_failed += 1;
                // Keep a failed file's destination off the orphan list.
                synced.record(dest);
            }
        }
    }

    /// Delete destination files this run did not produce. Failures are logged only.
    async fn cleanup_orphans(&self, transferrer: &Transferrer, synced: &SyncedFileSet, stats: &mut SyncStats) {
        let Some(root) = self.config.paths.dest_root.as_deref().filter(|r| !r.is_empty()) else {
            warn!("DEST_ROOT_DIR not set, skipping orphan cleanup");
            return;
        };

        let listing = match transferrer.list_tree(root).await {
            Ok(listing) => listing,
            Err(e) => {
                warn!(root, error = %e, "Failed to list destination files, skipping orphan cleanup");
                return;
            }
        };

        let orphans = synced.orphans(&listing);
        info!(
            root,
            listed = listing.len(),
            expected = synced.len(),
            orphans = orphans.len(),
            "Orphan cleanup"
        );
        for path in orphans {
            match transferrer.delete(&path).await {
                Ok(()) => stats.orphans_deleted += 1,
                Err(e) => warn!(path = %path, error = %e, "Failed to delete orphaned file"),
            }
        }
    }

    async fn sync_metadata(&self, matches: &[ItemMatch], stats: &mut SyncStats) {
        let syncer = MetadataSyncer::new(self.source.as_ref(), self.dest.as_ref()).with_dry_run(self.config.dry_run);
        let total = matches.len();

        for (i, m) in matches.iter().enumerate() {
            if m.dest.key().is_empty() {
                warn!(file = %m.file_name, "Destination item has no key, skipping");
                stats.metadata_errors += 1;
                continue;
            }

            match syncer.sync_match(m).await {
                Ok(outcome) => {
                    if outcome.metadata_synced {
                        stats.metadata_synced += 1;
                    } else {
                        stats.metadata_skipped += 1;
                    }
                    if outcome.watch != WatchSync::None {
                        stats.watch_states_synced += 1;
                    }
                }
                Err(e) => {
                    warn!(file = %m.file_name, error = %e, "Metadata sync failed");
                    stats.metadata_errors += 1;
                }
            }

            if (i + 1) % PROGRESS_EVERY == 0 {
                info!(completed = i + 1, total, "Metadata sync progress");
            }
        }
    }

    /// Run a cycle now, then every `interval`, until `shutdown` resolves.
    ///
    /// A failed cycle is logged and the loop waits for the next tick. Cycles
    /// never overlap.
    pub async fn run_continuous<F>(&self, interval: Duration, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()>,
    {
        tokio::pin!(shutdown);
        info!(interval_secs = interval.as_secs(), "Starting continuous sync");

        loop {
            tokio::select! {
                biased;
                _ = &mut shutdown => {
                    info!("Shutdown requested, stopping sync");
                    return Ok(());
                }
                result = self.run_sync_cycle() => match result {
                    Ok(stats) => info!(
                        operation = "scheduled_sync_complete",
                        items_synced = stats.files_transferred + stats.metadata_synced,
                        errors = stats.total_errors(),
                        duration_ms = stats.duration.as_millis() as u64,
                        "Scheduled sync completed"
                    ),
                    Err(e) => error!(
                        operation = "scheduled_sync_error",
                        error = %e,
                        "Scheduled sync failed"
                    ),
                }
            }

            debug!(next_run_in_secs = interval.as_secs(), "Waiting for next sync cycle");
            tokio::select! {
                biased;
                _ = &mut shutdown => {
                    info!("Shutdown requested, stopping sync");
                    return Ok(());
                }
                _ = self.clock.sleep(interval) => {}
            }
        }
    }
}
