// Local crates
use crate::{
    archiver::archiver::{Archiver, TarGzArchiver},
    helpers::{load_config::Config, shutdown::Shutdown},
    metrics::http::start_metrics_server,
    tracker::models::{Tracker, TrackerConfig},
};

// External crates
use anyhow::{Context, Result};
use std::path::PathBuf;
use tokio_util::sync::CancellationToken;
use tracing::instrument;

/// Track the configured files until shutdown is triggered, then stop the
/// tracker and archive what was staged.
///
/// Returns once archiving is done. Startup and archiving failures are
/// returned; failures inside monitoring tasks only show up in the logs.
#[instrument(name = "runtime::run", target = "runtime::runtime", level = "info", skip_all)]
pub async fn run_log_tracker(cfg: Config, shutdown: Shutdown) -> Result<()> {
    let shutdown_rx = shutdown.subscribe();
    let cancel = CancellationToken::new();

    if cfg.metrics.enabled {
        let addr = cfg.metrics.listen_addr;
        let metrics_cancel = cancel.child_token();
        tokio::spawn(async move {
            if let Err(e) = start_metrics_server(addr, metrics_cancel).await {
                tracing::error!(error = %e, "Metrics server failed");
            }
        });
    }

    let mut tracker = Tracker::new(TrackerConfig::from(&cfg.tracker));
    if let Err(e) = tracker.start().await {
        cancel.cancel();
        return Err(e).context("Failed to start tracker");
    }

    Shutdown::wait(shutdown_rx).await;
    tracing::info!("Shutting down...");

    tracker.stop().await.context("Failed to stop tracker")?;
    cancel.cancel();

    for snapshot in tracker.snapshot().await {
        tracing::info!(
            file = %snapshot.path.display(),
            destination = %snapshot.destination.display(),
            cursor = snapshot.cursor,
            cycles = snapshot.cycles,
            captured_bytes = snapshot.captured_bytes,
            truncations = snapshot.truncations,
            "Source summary"
        );
    }

    let staged = staged_destinations(tracker.destinations());
    let archiver = TarGzArchiver::new(&cfg.archiver.output_path, cfg.archiver.compression_level);
    let output_path = archiver.output_path().to_path_buf();

    // Async is pure overhead for the archive write, run it on the blocking pool.
    let result = tokio::task::spawn_blocking(move || archiver.archive(&staged))
        .await
        .context("Archiving task panicked")?;

    if let Err(e) = result {
        tracing::error!(
            error = %e,
            archive = %output_path.display(),
            "Archiving failed"
        );
        return Err(e).context("Archiving failed");
    }

    tracing::info!(archive = %output_path.display(), "Log tracker shut down cleanly");

    Ok(())
}

/// Destinations are created on first write, so a source that never received
/// new content has nothing to archive.
fn staged_destinations(mut destinations: Vec<PathBuf>) -> Vec<PathBuf> {
    destinations.sort();
    destinations.dedup();
    destinations.retain(|path| {
        let exists = path.exists();
        if !exists {
            tracing::info!(
                destination = %path.display(),
                "No content captured for this source, leaving it out of the archive"
            );
        }
        exists
    });
    destinations
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn staged_destinations_skip_missing_and_duplicates() {
        let dir = TempDir::new().unwrap();
        let a = dir.path().join("a.txt");
        let b = dir.path().join("b.txt");
        fs::write(&a, b"x").unwrap();

        let staged = staged_destinations(vec![b, a.clone(), a.clone()]);
        assert_eq!(staged, vec![a]);
    }
}
