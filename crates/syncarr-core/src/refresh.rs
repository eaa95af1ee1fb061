//! Destination library rescan and metadata refresh.
//!
//! [`RefreshCoordinator`] is a polling state machine: it waits out scans that
//! were already running, triggers a rescan of every destination library, waits
//! for the scans to finish, then triggers a forced metadata refresh and waits
//! for that too. Time is read and spent through a [`Clock`] so tests can run
//! the whole sequence without sleeping.

use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use syncarr_catalog::{CatalogClient, CatalogError};
use syncarr_models::Activity;
use thiserror::Error;
use tracing::{debug, info, instrument, warn};

#[async_trait]
pub trait Clock: Send + Sync {
    fn now(&self) -> Instant;
    async fn sleep(&self, duration: Duration);
}

/// Wall-clock time and tokio timers.
#[derive(Debug, Default, Clone, Copy)]
pub struct TokioClock;

#[async_trait]
impl Clock for TokioClock {
    fn now(&self) -> Instant {
        Instant::now()
    }

    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

/// A clock that only moves when slept on.
#[derive(Debug)]
pub struct ManualClock {
    start: Instant,
    offset: Mutex<Duration>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
            offset: Mutex::new(Duration::ZERO),
        }
    }

    /// Total time slept so far.
    pub fn elapsed(&self) -> Duration {
        *self.offset.lock().unwrap_or_else(|p| p.into_inner())
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Clock for ManualClock {
    fn now(&self) -> Instant {
        self.start + self.elapsed()
    }

    async fn sleep(&self, duration: Duration) {
        *self.offset.lock().unwrap_or_else(|p| p.into_inner()) += duration;
        tokio::task::yield_now().await;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshState {
    Idle,
    WaitingForExistingScans,
    ScansTriggered,
    WaitingForScanCompletion,
    RefreshTriggered,
    WaitingForRefreshCompletion,
    Done,
    TimedOut,
}

#[derive(Debug, Clone)]
pub struct RefreshSettings {
    pub existing_scan_poll: Duration,
    pub existing_scan_wait: Duration,
    pub poll_interval: Duration,
    pub progress_log_interval: Duration,
    pub scan_timeout: Duration,
    pub refresh_timeout: Duration,
}

impl Default for RefreshSettings {
    fn default() -> Self {
        Self {
            existing_scan_poll: Duration::from_secs(10),
            existing_scan_wait: Duration::from_secs(5 * 60),
            poll_interval: Duration::from_secs(5),
            progress_log_interval: Duration::from_secs(30),
            scan_timeout: Duration::from_secs(10 * 60),
            refresh_timeout: Duration::from_secs(30 * 60),
        }
    }
}

/// Conditions that end the run.
#[derive(Debug, Error)]
pub enum RefreshError {
    #[error("Failed to list destination libraries: {0}")]
    Libraries(#[source] CatalogError),

    #[error("No destination library accepted a scan request")]
    NoScansTriggered,

    #[error("No destination library accepted a metadata refresh request")]
    NoRefreshTriggered,

    #[error("Library scan did not finish within {0:?}")]
    ScanTimeout(Duration),
}

#[derive(Debug, Clone)]
pub struct RefreshReport {
    pub scanned_libraries: Vec<String>,
    pub refreshed_libraries: Vec<String>,
    /// The refresh wait gave up; the run still proceeds.
    pub refresh_timed_out: bool,
    pub elapsed: Duration,
    pub transitions: Vec<RefreshState>,
}

impl RefreshReport {
    pub fn final_state(&self) -> RefreshState {
        self.transitions.last().copied().unwrap_or(RefreshState::Idle)
    }
}

struct Machine {
    history: Vec<RefreshState>,
}

impl Machine {
    fn new() -> Self {
        Self {
            history: vec![RefreshState::Idle],
        }
    }

    fn advance(&mut self, next: RefreshState) {
        debug!(from = ?self.history.last(), to = ?next, "Refresh state transition");
        self.history.push(next);
    }
}

/// Scans in flight, restricted to `libraries` when given. Activities that do
/// not name a library count for every library.
fn active_scans<'a>(activities: &'a [Activity], libraries: Option<&HashSet<String>>) -> Vec<&'a Activity> {
    activities
        .iter()
        .filter(|a| a.is_library_scan())
        .filter(|a| match (libraries, &a.library_section_id) {
            (Some(libraries), Some(id)) => libraries.contains(id),
            _ => true,
        })
        .collect()
}

fn mean_progress(activities: &[&Activity]) -> f64 {
    let values: Vec<f64> = activities.iter().filter_map(|a| a.progress).collect();
    if values.is_empty() {
        0.0
    } else {
        values.iter().sum::<f64>() / values.len() as f64
    }
}

#[derive(Clone, Copy)]
enum Phase {
    Scan,
    Refresh,
}

impl Phase {
    fn as_str(self) -> &'static str {
        match self {
            Phase::Scan => "scan",
            Phase::Refresh => "refresh",
        }
    }
}

pub struct RefreshCoordinator {
    client: Arc<dyn CatalogClient>,
    clock: Arc<dyn Clock>,
    settings: RefreshSettings,
}

impl RefreshCoordinator {
    pub fn new(client: Arc<dyn CatalogClient>, clock: Arc<dyn Clock>) -> Self {
        Self {
            client,
            clock,
            settings: RefreshSettings::default(),
        }
    }

    pub fn with_settings(mut self, settings: RefreshSettings) -> Self {
        self.settings = settings;
        self
    }

    #[instrument(skip(self), fields(catalog = self.client.name()))]
    pub async fn run(&self) -> Result<RefreshReport, RefreshError> {
        let started = self.clock.now();
        let mut machine = Machine::new();

        let libraries = self
            .client
            .list_libraries()
            .await
            .map_err(RefreshError::Libraries)?;

        machine.advance(RefreshState::WaitingForExistingScans);
        self.wait_for_existing_scans().await;

        let mut scanned = Vec::new();
        for library in &libraries {
            match self.client.trigger_scan(&library.key).await {
                Ok(()) => {
                    info!(
                        operation = "library_scan_triggered",
                        library_id = %library.key,
                        library = %library.title,
                        "Library scan triggered"
                    );
                    scanned.push(library.key.clone());
                }
                Err(e) => warn!(library_id = %library.key, error = %e, "Failed to trigger library scan"),
            }
        }
        if scanned.is_empty() {
            return Err(RefreshError::NoScansTriggered);
        }
        machine.advance(RefreshState::ScansTriggered);

        machine.advance(RefreshState::WaitingForScanCompletion);
        let scanned_set: HashSet<String> = scanned.iter().cloned().collect();
        if !self
            .wait_until_idle(&scanned_set, self.settings.scan_timeout, Phase::Scan)
            .await
        {
            machine.advance(RefreshState::TimedOut);
            return Err(RefreshError::ScanTimeout(self.settings.scan_timeout));
        }
        info!(
            operation = "library_scan_completed",
            libraries = scanned.len(),
            duration_ms = (self.clock.now() - started).as_millis() as u64,
            "Library scans completed"
        );

        let mut refreshed = Vec::new();
        for library in &libraries {
            match self.client.trigger_metadata_refresh(&library.key).await {
                Ok(()) => {
                    info!(library_id = %library.key, "Metadata refresh triggered");
                    refreshed.push(library.key.clone());
                }
                Err(e) => warn!(library_id = %library.key, error = %e, "Failed to trigger metadata refresh"),
            }
        }
        if refreshed.is_empty() {
            return Err(RefreshError::NoRefreshTriggered);
        }
        machine.advance(RefreshState::RefreshTriggered);

        machine.advance(RefreshState::WaitingForRefreshCompletion);
        let refreshed_set: HashSet<String> = refreshed.iter().cloned().collect();
        let refresh_timed_out = !self
            .wait_until_idle(&refreshed_set, self.settings.refresh_timeout, Phase::Refresh)
            .await;
        if refresh_timed_out {
            warn!(
                timeout_secs = self.settings.refresh_timeout.as_secs(),
                "Metadata refresh still running after timeout, continuing"
            );
            machine.advance(RefreshState::TimedOut);
        } else {
            info!(libraries = refreshed.len(), "Metadata refresh completed");
            machine.advance(RefreshState::Done);
        }

        Ok(RefreshReport {
            scanned_libraries: scanned,
            refreshed_libraries: refreshed,
            refresh_timed_out,
            elapsed: self.clock.now() - started,
            transitions: machine.history,
        })
    }

    /// Best effort: gives up after `existing_scan_wait` and lets the run proceed.
    async fn wait_for_existing_scans(&self) {
        let started = self.clock.now();
        loop {
            match self.client.list_activities().await {
                Ok(activities) => {
                    let active = active_scans(&activities, None);
                    if active.is_empty() {
                        return;
                    }
                    info!(active = active.len(), "Waiting for running library scans to finish");
                }
                Err(e) => warn!(error = %e, "Failed to read destination activities"),
            }
            if self.clock.now() - started >= self.settings.existing_scan_wait {
                warn!(
                    wait_secs = self.settings.existing_scan_wait.as_secs(),
                    "Existing scans still running, proceeding anyway"
                );
                return;
            }
            self.clock.sleep(self.settings.existing_scan_poll).await;
        }
    }

    /// Poll until no scan for `libraries` is running. False on timeout.
    async fn wait_until_idle(&self, libraries: &HashSet<String>, timeout: Duration, phase: Phase) -> bool {
        let started = self.clock.now();
        let mut last_progress_log = started;
        loop {
            self.clock.sleep(self.settings.poll_interval).await;
            let now = self.clock.now();

            match self.client.list_activities().await {
                Ok(activities) => {
                    let active = active_scans(&activities, Some(libraries));
                    if active.is_empty() {
                        return true;
                    }
                    if now - last_progress_log >= self.settings.progress_log_interval {
                        info!(
                            phase = phase.as_str(),
                            active = active.len(),
                            progress = mean_progress(&active),
                            elapsed_secs = (now - started).as_secs(),
                            "Waiting for library activity"
                        );
                        last_progress_log = now;
                    }
                }
                Err(e) => warn!(phase = phase.as_str(), error = %e, "Failed to read destination activities"),
            }

            if now - started >= timeout {
                return false;
            }
        }
    }
}
