// Local crates
use crate::metrics::metrics::{CAPTURED_BYTES_TOTAL, CHECK_CYCLES_TOTAL, TRUNCATIONS_TOTAL};
use crate::tracker::{
    errors::{CycleError, TrackerError},
    models::{CycleOutcome, SourceCounters, SourceSnapshot, SourceState, WatchedSource},
    reader::{LineMode, scan_new_lines},
};

// External crates
use std::io::SeekFrom;
use std::path::{Path, PathBuf};
use std::sync::atomic::Ordering;
use tokio::fs::{File, OpenOptions};
use tokio::io::{AsyncSeekExt, AsyncWriteExt};
use tokio::sync::Mutex;
use tracing::instrument;

/// Staging file path for `path`: its base name placed under `staging_dir`.
pub fn destination_for(path: &Path, staging_dir: &Path) -> Result<PathBuf, TrackerError> {
    path.file_name()
        .map(|name| staging_dir.join(name))
        .ok_or_else(|| TrackerError::InvalidPath(path.to_path_buf()))
}

impl WatchedSource {
    /// Open `path` and position the cursor at its current end, so content
    /// that existed before registration is never replayed.
    #[instrument(
        name = "tracker::source::register",
        target = "tracker::source",
        level = "debug",
        skip_all,
        fields(file = %path.display())
    )]
    pub async fn register(
        path: PathBuf,
        staging_dir: &Path,
        line_mode: LineMode,
    ) -> Result<Self, TrackerError> {
        let destination = destination_for(&path, staging_dir)?;

        let handle = File::open(&path).await.map_err(|source| TrackerError::Open {
            path: path.clone(),
            source,
        })?;
        let cursor = handle
            .metadata()
            .await
            .map_err(|source| TrackerError::Metadata {
                path: path.clone(),
                source,
            })?
            .len();

        tracing::debug!(
            destination = %destination.display(),
            cursor,
            "Registered watched source"
        );

        Ok(Self {
            path,
            destination,
            line_mode,
            state: Mutex::new(SourceState {
                handle: Some(handle),
                cursor,
            }),
            counters: SourceCounters::default(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn destination(&self) -> &Path {
        &self.destination
    }

    /// Whether the destination resolves to the source file itself, which
    /// would feed every captured line back into the source.
    pub async fn feeds_itself(&self) -> std::io::Result<bool> {
        let source = tokio::fs::canonicalize(&self.path).await?;
        let destination = match tokio::fs::canonicalize(&self.destination).await {
            Ok(resolved) => resolved,
            Err(_) => match (self.destination.parent(), self.destination.file_name()) {
                (Some(dir), Some(name)) => tokio::fs::canonicalize(dir).await?.join(name),
                _ => self.destination.clone(),
            },
        };
        Ok(source == destination)
    }

    pub(crate) fn label(&self) -> String {
        self.path.display().to_string()
    }

    /// Relay everything appended since the last cycle into the destination.
    ///
    /// The source's guard is held for the whole cycle. On error the cursor
    /// is left where it was.
    pub async fn check_cycle(&self) -> Result<CycleOutcome, CycleError> {
        let mut state = self.state.lock().await;

        self.counters.cycles.fetch_add(1, Ordering::Relaxed);
        CHECK_CYCLES_TOTAL
            .with_label_values(&[self.label().as_str()])
            .inc();

        let SourceState { handle, cursor } = &mut *state;
        let file = handle.as_mut().ok_or(CycleError::Closed)?;

        let size = file.metadata().await.map_err(CycleError::Stat)?.len();

        // The file shrank: it was truncated or rewritten, start over.
        if size < *cursor {
            tracing::warn!(
                file = %self.path.display(),
                previous_cursor = *cursor,
                size,
                "Watched file shrank, re-reading from the start"
            );
            *cursor = 0;
            self.counters.truncations.fetch_add(1, Ordering::Relaxed);
            TRUNCATIONS_TOTAL
                .with_label_values(&[self.label().as_str()])
                .inc();
        }

        file.seek(SeekFrom::Start(*cursor))
            .await
            .map_err(CycleError::Seek)?;

        let capture = scan_new_lines(file, self.line_mode)
            .await
            .map_err(CycleError::Read)?;

        if capture.is_idle() {
            return Ok(CycleOutcome::Idle);
        }

        if capture.data.is_empty() {
            *cursor += capture.scanned;
            return Ok(CycleOutcome::Skipped {
                scanned: capture.scanned,
            });
        }

        self.append_to_destination(&capture.data).await?;

        let written = capture.data.len() as u64;
        *cursor += capture.scanned;
        self.counters
            .captured_bytes
            .fetch_add(written, Ordering::Relaxed);
        CAPTURED_BYTES_TOTAL
            .with_label_values(&[self.label().as_str()])
            .inc_by(written);

        tracing::debug!(
            file = %self.path.display(),
            lines = capture.lines,
            scanned = capture.scanned,
            written,
            cursor = *cursor,
            "Relayed new lines to staging file"
        );

        Ok(CycleOutcome::Appended {
            scanned: capture.scanned,
            written,
        })
    }

    /// Open, append, flush and close the destination within one call.
    async fn append_to_destination(&self, data: &[u8]) -> Result<(), CycleError> {
        let mut output = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.destination)
            .await
            .map_err(|source| CycleError::OpenDestination {
                path: self.destination.clone(),
                source,
            })?;

        let write_err = |source| CycleError::Write {
            path: self.destination.clone(),
            source,
        };
        output.write_all(data).await.map_err(write_err)?;
        output.flush().await.map_err(write_err)?;

        Ok(())
    }

    /// Drop the read handle. Returns whether a handle was still open.
    pub(crate) async fn release(&self) -> bool {
        self.state.lock().await.handle.take().is_some()
    }

    pub async fn snapshot(&self) -> SourceSnapshot {
        let state = self.state.lock().await;

        SourceSnapshot {
            path: self.path.clone(),
            destination: self.destination.clone(),
            cursor: state.cursor,
            cycles: self.counters.cycles.load(Ordering::Relaxed),
            captured_bytes: self.counters.captured_bytes.load(Ordering::Relaxed),
            truncations: self.counters.truncations.load(Ordering::Relaxed),
            handle_open: state.handle.is_some(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::io::Write;
    use tempfile::TempDir;

    struct Fixture {
        dir: TempDir,
        source: PathBuf,
        staging: PathBuf,
    }

    fn fixture(initial: &[u8]) -> Fixture {
        let dir = TempDir::new().unwrap();
        let source = dir.path().join("app.log");
        let staging = dir.path().join("staging");
        fs::create_dir(&staging).unwrap();
        fs::write(&source, initial).unwrap();
        Fixture {
            dir,
            source,
            staging,
        }
    }

    fn append(path: &Path, data: &[u8]) {
        let mut f = fs::OpenOptions::new().append(true).open(path).unwrap();
        f.write_all(data).unwrap();
    }

    #[test]
    fn destination_uses_base_name() {
        let dest = destination_for(Path::new("/var/log/app/a.txt"), Path::new("/tmp/stage")).unwrap();
        assert_eq!(dest, PathBuf::from("/tmp/stage/a.txt"));
    }

    #[test]
    fn destination_rejects_paths_without_file_name() {
        let err = destination_for(Path::new("/"), Path::new("/tmp")).unwrap_err();
        assert!(matches!(err, TrackerError::InvalidPath(_)));
    }

    #[tokio::test]
    async fn register_starts_at_end_of_existing_content() {
        let fx = fixture(b"old line\n");
        let source = WatchedSource::register(fx.source.clone(), &fx.staging, LineMode::Joined)
            .await
            .unwrap();

        assert_eq!(source.snapshot().await.cursor, 9);
        assert_eq!(source.check_cycle().await.unwrap(), CycleOutcome::Idle);
        assert!(!source.destination().exists());
    }

    #[tokio::test]
    async fn source_inside_staging_dir_feeds_itself() {
        let fx = fixture(b"");
        let inside = WatchedSource::register(fx.source.clone(), fx.dir.path(), LineMode::Joined)
            .await
            .unwrap();
        assert!(inside.feeds_itself().await.unwrap());

        let apart = WatchedSource::register(fx.source.clone(), &fx.staging, LineMode::Joined)
            .await
            .unwrap();
        assert!(!apart.feeds_itself().await.unwrap());
    }

    #[tokio::test]
    async fn register_fails_for_missing_file() {
        let fx = fixture(b"");
        let err = WatchedSource::register(fx.source.with_extension("missing"), &fx.staging, LineMode::Joined)
            .await
            .unwrap_err();
        assert!(matches!(err, TrackerError::Open { .. }));
    }

    #[tokio::test]
    async fn appended_lines_reach_destination() {
        let fx = fixture(b"");
        let source = WatchedSource::register(fx.source.clone(), &fx.staging, LineMode::Joined)
            .await
            .unwrap();

        append(&fx.source, b"first\n\nsecond\n");
        let outcome = source.check_cycle().await.unwrap();
        assert_eq!(
            outcome,
            CycleOutcome::Appended {
                scanned: 14,
                written: 11
            }
        );
        assert_eq!(fs::read(source.destination()).unwrap(), b"firstsecond");

        append(&fx.source, b"third\n");
        source.check_cycle().await.unwrap();
        assert_eq!(fs::read(source.destination()).unwrap(), b"firstsecondthird");

        let snapshot = source.snapshot().await;
        assert_eq!(snapshot.cursor, 20);
        assert_eq!(snapshot.captured_bytes, 16);
        assert_eq!(snapshot.cycles, 2);
    }

    #[tokio::test]
    async fn empty_lines_move_cursor_without_writing() {
        let fx = fixture(b"");
        let source = WatchedSource::register(fx.source.clone(), &fx.staging, LineMode::Joined)
            .await
            .unwrap();

        append(&fx.source, b"\n\n");
        assert_eq!(
            source.check_cycle().await.unwrap(),
            CycleOutcome::Skipped { scanned: 2 }
        );
        assert!(!source.destination().exists());
        assert_eq!(source.snapshot().await.cursor, 2);
    }

    #[tokio::test]
    async fn truncation_rereads_from_start() {
        let fx = fixture(b"a long line that will vanish\n");
        let source = WatchedSource::register(fx.source.clone(), &fx.staging, LineMode::Joined)
            .await
            .unwrap();

        fs::write(&fx.source, b"fresh\n").unwrap();
        source.check_cycle().await.unwrap();

        assert_eq!(fs::read(source.destination()).unwrap(), b"fresh");
        let snapshot = source.snapshot().await;
        assert_eq!(snapshot.cursor, 6);
        assert_eq!(snapshot.truncations, 1);
    }

    #[tokio::test]
    async fn preserve_mode_keeps_line_breaks() {
        let fx = fixture(b"");
        let source = WatchedSource::register(fx.source.clone(), &fx.staging, LineMode::PreserveBreaks)
            .await
            .unwrap();

        append(&fx.source, b"one\ntwo\n");
        source.check_cycle().await.unwrap();
        assert_eq!(fs::read(source.destination()).unwrap(), b"one\ntwo\n");
    }

    #[tokio::test]
    async fn destination_failure_leaves_cursor_untouched() {
        let fx = fixture(b"");
        // A directory where the staging file should go makes the open fail.
        let source = WatchedSource::register(fx.source.clone(), &fx.staging, LineMode::Joined)
            .await
            .unwrap();
        fs::create_dir(source.destination()).unwrap();

        append(&fx.source, b"lost?\n");
        let err = source.check_cycle().await.unwrap_err();
        assert_eq!(err.stage(), "open_destination");
        assert_eq!(source.snapshot().await.cursor, 0);

        fs::remove_dir(source.destination()).unwrap();
        source.check_cycle().await.unwrap();
        assert_eq!(fs::read(source.destination()).unwrap(), b"lost?");
    }

    #[tokio::test]
    async fn released_source_reports_closed() {
        let fx = fixture(b"");
        let source = WatchedSource::register(fx.source.clone(), &fx.staging, LineMode::Joined)
            .await
            .unwrap();

        assert!(source.release().await);
        assert!(!source.release().await);
        assert!(matches!(
            source.check_cycle().await.unwrap_err(),
            CycleError::Closed
        ));
    }
}
