//! File replication to the destination host.
//!
//! [`Transferrer`] owns the transfer decision (skip when sizes match, create
//! the remote directory, retry, log) and delegates byte movement to a
//! [`TransferBackend`]. Remote file operations go through a [`RemoteShell`],
//! normally the run's [`RemoteSession`].

pub mod companions;
pub mod direct;
pub mod error;
pub mod rsync;
pub mod session;

#[cfg(test)]
pub(crate) mod fakes;

use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use syncarr_config::{PerformanceConfig, TransferMethod};
use tracing::{error, info, warn};

use crate::retry::RetryPolicy;

pub use companions::companion_files;
pub use direct::DirectCopyBackend;
pub use error::TransferError;
pub use rsync::{rsync_available, RsyncBackend};
pub use session::{RemoteSession, SshTarget};

const BYTES_PER_MB: f64 = 1024.0 * 1024.0;

/// File operations on the destination host.
#[async_trait]
pub trait RemoteShell: Send + Sync {
    /// Size in bytes, or `None` when the file does not exist.
    async fn file_size(&self, path: &str) -> Result<Option<u64>, TransferError>;
    async fn delete(&self, path: &str) -> Result<(), TransferError>;
    /// Every regular file under `root`; a missing root is empty.
    async fn list_tree(&self, root: &str) -> Result<HashSet<String>, TransferError>;
    async fn mkdir_all(&self, dir: &str) -> Result<(), TransferError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RawTransfer {
    Copied,
    /// The backend inspected the file and found nothing to move.
    UpToDate,
}

/// Moves one local file to a destination path.
#[async_trait]
pub trait TransferBackend: Send + Sync {
    fn name(&self) -> &'static str;
    async fn transfer(&self, local: &Path, dest: &str) -> Result<RawTransfer, TransferError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    IdenticalSize,
    UpToDate,
    DryRun,
}

impl SkipReason {
    pub fn as_str(self) -> &'static str {
        match self {
            SkipReason::IdenticalSize => "identical_size",
            SkipReason::UpToDate => "delta_up_to_date",
            SkipReason::DryRun => "dry_run",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum TransferOutcome {
    Skipped(SkipReason),
    Completed { bytes: u64, elapsed: Duration },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileJob {
    pub local: PathBuf,
    pub dest: String,
}

fn parent_dir(path: &str) -> Option<&str> {
    path.rsplit_once('/')
        .map(|(parent, _)| parent)
        .filter(|parent| !parent.is_empty())
}

fn rate_mbps(bytes: u64, elapsed: Duration) -> f64 {
    let secs = elapsed.as_secs_f64();
    if secs > 0.0 {
        bytes as f64 / BYTES_PER_MB / secs
    } else {
        0.0
    }
}

pub struct Transferrer {
    backend: Box<dyn TransferBackend>,
    shell: Arc<dyn RemoteShell>,
    retry: RetryPolicy,
    dry_run: bool,
    max_concurrent: usize,
}

impl Transferrer {
    pub fn new(backend: Box<dyn TransferBackend>, shell: Arc<dyn RemoteShell>) -> Self {
        Self {
            backend,
            shell,
            retry: RetryPolicy::default(),
            dry_run: false,
            max_concurrent: 1,
        }
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    pub fn with_max_concurrent(mut self, max_concurrent: usize) -> Self {
        self.max_concurrent = max_concurrent.max(1);
        self
    }

    pub fn backend_name(&self) -> &'static str {
        self.backend.name()
    }

    /// Copy `local` to `dest` unless the destination already has a file of the same size.
    ///
    /// Equal size is treated as "already synced" without comparing content.
    pub async fn transfer(&self, local: &Path, dest: &str) -> Result<TransferOutcome, TransferError> {
        let metadata = match tokio::fs::metadata(local).await {
            Ok(metadata) => metadata,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(TransferError::LocalMissing(local.to_path_buf()));
            }
            Err(source) => {
                return Err(TransferError::LocalIo {
                    path: local.to_path_buf(),
                    source,
                })
            }
        };
        let size = metadata.len();
        let size_mb = size as f64 / BYTES_PER_MB;

        match self.shell.file_size(dest).await {
            Ok(Some(remote)) if remote == size => {
                info!(
                    operation = "transfer_skipped",
                    source = %local.display(),
                    dest,
                    size_mb,
                    reason = SkipReason::IdenticalSize.as_str(),
                    "Transfer skipped"
                );
                return Ok(TransferOutcome::Skipped(SkipReason::IdenticalSize));
            }
            Ok(_) => {}
            Err(e) => warn!(dest, error = %e, "Could not read destination size, transferring anyway"),
        }

        if self.dry_run {
            info!(
                operation = "transfer_skipped",
                source = %local.display(),
                dest,
                size_mb,
                reason = SkipReason::DryRun.as_str(),
                "Dry run: would transfer"
            );
            return Ok(TransferOutcome::Skipped(SkipReason::DryRun));
        }

        if let Some(dir) = parent_dir(dest) {
            if let Err(e) = self.shell.mkdir_all(dir).await {
                warn!(dir, error = %e, "Failed to create destination directory");
            }
        }

        info!(
            operation = "transfer_started",
            backend = self.backend.name(),
            source = %local.display(),
            dest,
            size_mb,
            "Transfer started"
        );

        let started = Instant::now();
        let result = self
            .retry
            .run("transfer", || self.backend.transfer(local, dest))
            .await;

        match result {
            Ok(RawTransfer::UpToDate) => {
                info!(
                    operation = "transfer_skipped",
                    source = %local.display(),
                    dest,
                    size_mb,
                    reason = SkipReason::UpToDate.as_str(),
                    "Transfer skipped"
                );
                Ok(TransferOutcome::Skipped(SkipReason::UpToDate))
            }
            Ok(RawTransfer::Copied) => {
                let elapsed = started.elapsed();
                info!(
                    operation = "transfer_completed",
                    source = %local.display(),
                    dest,
                    size_mb,
                    duration_ms = elapsed.as_millis() as u64,
                    rate_mbps = rate_mbps(size, elapsed),
                    "Transfer completed"
                );
                Ok(TransferOutcome::Completed { bytes: size, elapsed })
            }
            Err(e) => {
                error!(
                    operation = "dead_letter",
                    source = %local.display(),
                    dest,
                    attempts = self.retry.max_retries + 1,
                    error = %e,
                    "Transfer failed after retries"
                );
                Err(e)
            }
        }
    }

    /// Run a batch with up to `max_concurrent` transfers in flight.
    pub async fn transfer_many(&self, jobs: Vec<FileJob>) -> Vec<(FileJob, Result<TransferOutcome, TransferError>)> {
        stream::iter(jobs)
            .map(|job| async move {
                let result = self.transfer(&job.local, &job.dest).await;
                (job, result)
            })
            .buffer_unordered(self.max_concurrent)
            .collect()
            .await
    }

    pub async fn list_tree(&self, root: &str) -> Result<HashSet<String>, TransferError> {
        self.shell.list_tree(root).await
    }

    /// Delete a destination file; a dry run only logs.
    pub async fn delete(&self, path: &str) -> Result<(), TransferError> {
        if self.dry_run {
            info!(operation = "orphan_deleted", path, dry_run = true, "Dry run: would delete");
            return Ok(());
        }
        self.shell.delete(path).await?;
        info!(operation = "orphan_deleted", path, "Deleted orphaned file");
        Ok(())
    }
}

/// Pick the backend for this run. An explicit method wins; `auto` prefers rsync.
pub async fn select_backend(
    method: TransferMethod,
    session: Arc<RemoteSession>,
    performance: &PerformanceConfig,
) -> Result<Box<dyn TransferBackend>, TransferError> {
    let delta = || -> Box<dyn TransferBackend> {
        Box::new(RsyncBackend::new(session.clone(), performance.enable_compression))
    };
    let direct = || -> Box<dyn TransferBackend> {
        Box::new(DirectCopyBackend::new(session.clone(), performance.transfer_buffer_size))
    };

    let backend = match method {
        TransferMethod::Rsync => {
            if !rsync_available().await {
                return Err(TransferError::Unavailable(
                    "TRANSFER_METHOD=rsync but rsync is not installed".to_string(),
                ));
            }
            delta()
        }
        TransferMethod::Scp => direct(),
        TransferMethod::Auto => {
            if rsync_available().await {
                delta()
            } else {
                direct()
            }
        }
    };
    info!(backend = backend.name(), "Selected transfer backend");
    Ok(backend)
}
