use crate::output::Output;
use color_eyre::eyre::eyre;
use color_eyre::Result;
use std::sync::Arc;
use syncarr_catalog::{CatalogClient, PlexCatalogClient};
use syncarr_config::{Config, PathManager};
use syncarr_core::{SshTransferFactory, SyncOrchestrator};
use tracing::{error, info, warn};

pub async fn run_sync(
    config: Config,
    paths: &PathManager,
    oneshot: bool,
    force_full_sync: bool,
    output: &Output,
) -> Result<()> {
    let interval = config.interval;
    let orchestrator = build_orchestrator(config, paths, force_full_sync)?;

    if oneshot {
        return run_oneshot(&orchestrator, output).await;
    }

    orchestrator
        .run_continuous(interval, shutdown_signal())
        .await
        .map_err(|e| eyre!("{:#}", e))?;
    output.success("Sync service stopped");
    Ok(())
}

fn build_orchestrator(config: Config, paths: &PathManager, force_full_sync: bool) -> Result<SyncOrchestrator> {
    let rate = config.performance.plex_api_rate_limit;
    let source: Arc<dyn CatalogClient> = Arc::new(
        PlexCatalogClient::new("source", &config.source, rate).map_err(|e| eyre!("{:#}", e))?,
    );
    let dest: Arc<dyn CatalogClient> = Arc::new(
        PlexCatalogClient::new("destination", &config.destination, rate).map_err(|e| eyre!("{:#}", e))?,
    );

    let transfers = if config.transfers_enabled() {
        Some(SshTransferFactory::from_config(&config, paths.runtime_dir()))
    } else {
        warn!("SSH is not configured; file transfer, cleanup and library refresh are disabled");
        None
    };

    let force = force_full_sync || config.force_full_sync;
    let mut orchestrator = SyncOrchestrator::new(source, dest, config);
    if let Some(factory) = transfers {
        orchestrator = orchestrator.with_transfers(Box::new(factory));
    }
    orchestrator.set_force_full_sync(force);
    Ok(orchestrator)
}

async fn run_oneshot(orchestrator: &SyncOrchestrator, output: &Output) -> Result<()> {
    tokio::select! {
        result = orchestrator.run_sync_cycle() => match result {
            Ok(stats) => {
                output.stats(&stats);
                if stats.total_errors() > 0 {
                    output.warn(format!("Sync finished with {} errors", stats.total_errors()));
                } else {
                    output.success("Sync completed");
                }
                Ok(())
            }
            Err(e) => {
                let message = format!("{:#}", e);
                error!(operation = "sync_failed", error = %message, "Sync cycle failed");
                output.error(format!("Sync failed: {}", message));
                Err(eyre!("Sync operation failed: {}", message))
            }
        },
        _ = shutdown_signal() => {
            info!("Shutdown requested, abandoning sync cycle");
            Err(eyre!("Sync interrupted"))
        }
    }
}

/// Resolves on Ctrl-C, or SIGTERM on Unix.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "Failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!(signal = "SIGINT", "Received shutdown signal"),
        _ = terminate => info!(signal = "SIGTERM", "Received shutdown signal"),
    }
}
