// Local crates
use crate::metrics::metrics::WATCHED_SOURCES;
use crate::tracker::{
    errors::TrackerError,
    models::{MonitorHandle, SourceSnapshot, Tracker, TrackerConfig, TrackerState, WatchedSource},
    monitor::monitor_source,
};

// External crates
use futures::future::join_all;
use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::instrument;

impl Tracker {
    /// Create a tracker in the `Created` state. Nothing is opened until
    /// `start`.
    pub fn new(config: TrackerConfig) -> Self {
        Self {
            config,
            state: TrackerState::Created,
            sources: HashMap::new(),
            cancel: CancellationToken::new(),
            monitors: Vec::new(),
        }
    }

    pub fn state(&self) -> TrackerState {
        self.state
    }

    /// Open every configured file and launch one monitoring task per file.
    ///
    /// Either every source is registered and monitored, or none is: on the
    /// first failure the handles opened so far are closed, no task has been
    /// spawned and the tracker stays `Created`.
    #[instrument(
        name = "tracker::start",
        target = "tracker::tracker",
        level = "info",
        skip_all,
        fields(sources = self.config.files.len())
    )]
    pub async fn start(&mut self) -> Result<(), TrackerError> {
        if self.state != TrackerState::Created {
            return Err(TrackerError::InvalidState {
                action: "start",
                state: self.state,
            });
        }

        tokio::fs::create_dir_all(&self.config.staging_dir)
            .await
            .map_err(|source| TrackerError::StagingDir {
                path: self.config.staging_dir.clone(),
                source,
            })?;

        let sources = self.register_sources().await?;

        for source in sources.values() {
            let join = tokio::spawn(monitor_source(
                Arc::clone(source),
                self.config.poll_interval,
                self.cancel.child_token(),
            ));
            self.monitors.push(MonitorHandle {
                path: source.path().to_path_buf(),
                join,
            });
        }

        WATCHED_SOURCES.add(sources.len() as i64);
        self.sources = sources;
        self.state = TrackerState::Running;

        tracing::info!(
            sources = self.sources.len(),
            staging_dir = %self.config.staging_dir.display(),
            poll_interval_ms = self.config.poll_interval.as_millis() as u64,
            "Tracker started"
        );
        Ok(())
    }

    /// Open every configured file. Dropping the partial map on error closes
    /// whatever was opened before the failure.
    async fn register_sources(&self) -> Result<HashMap<PathBuf, Arc<WatchedSource>>, TrackerError> {
        let mut sources = HashMap::with_capacity(self.config.files.len());
        let mut destinations = HashSet::new();

        for path in &self.config.files {
            if sources.contains_key(path) {
                return Err(TrackerError::DuplicateSource(path.clone()));
            }

            let source = match WatchedSource::register(
                path.clone(),
                &self.config.staging_dir,
                self.config.line_mode,
            )
            .await
            {
                Ok(source) => source,
                Err(e) => {
                    tracing::error!(
                        file = %path.display(),
                        error = %e,
                        opened = sources.len(),
                        "Failed to register watched source, closing already opened files"
                    );
                    return Err(e);
                }
            };

            match source.feeds_itself().await {
                Ok(false) => {}
                Ok(true) => {
                    tracing::error!(
                        file = %path.display(),
                        staging_dir = %self.config.staging_dir.display(),
                        "Watched file would be its own staging file"
                    );
                    return Err(TrackerError::DestinationIsSource(path.clone()));
                }
                Err(source) => {
                    return Err(TrackerError::Metadata {
                        path: path.clone(),
                        source,
                    });
                }
            }

            if !destinations.insert(source.destination().to_path_buf()) {
                tracing::warn!(
                    file = %path.display(),
                    destination = %source.destination().display(),
                    "Another watched file shares this base name, both append to the same staging file"
                );
            }

            sources.insert(path.clone(), Arc::new(source));
        }

        Ok(sources)
    }

    /// Cancel every monitoring task, wait for all of them to exit, then close
    /// every source handle. After this returns no destination is written.
    #[instrument(
        name = "tracker::stop",
        target = "tracker::tracker",
        level = "info",
        skip_all
    )]
    pub async fn stop(&mut self) -> Result<(), TrackerError> {
        if self.state != TrackerState::Running {
            return Err(TrackerError::InvalidState {
                action: "stop",
                state: self.state,
            });
        }

        self.state = TrackerState::Stopping;
        self.cancel.cancel();

        let monitors = std::mem::take(&mut self.monitors);
        let (paths, joins): (Vec<_>, Vec<_>) =
            monitors.into_iter().map(|m| (m.path, m.join)).unzip();

        for (path, result) in paths.iter().zip(join_all(joins).await) {
            if let Err(e) = result {
                tracing::error!(
                    file = %path.display(),
                    error = %e,
                    "Monitoring task ended abnormally"
                );
            }
        }

        let mut released = 0;
        for source in self.sources.values() {
            if source.release().await {
                released += 1;
            }
        }

        WATCHED_SOURCES.sub(self.sources.len() as i64);
        self.state = TrackerState::Stopped;

        tracing::info!(released, "Tracker stopped");
        Ok(())
    }

    /// Staging file paths of every registered source, in no particular order.
    pub fn destinations(&self) -> Vec<PathBuf> {
        self.sources
            .values()
            .map(|source| source.destination().to_path_buf())
            .collect()
    }

    /// Per-source cursor and counters, each read under that source's guard.
    pub async fn snapshot(&self) -> Vec<SourceSnapshot> {
        let mut snapshots = Vec::with_capacity(self.sources.len());
        for source in self.sources.values() {
            snapshots.push(source.snapshot().await);
        }
        snapshots
    }
}
