// Local crates
use crate::tracker::reader::LineMode;

// External crates
use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::AtomicU64;
use std::time::Duration;
use tokio::fs::File;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Default interval between two check cycles of the same source.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Runtime settings of a `Tracker`.
#[derive(Debug, Clone)]
pub struct TrackerConfig {
    /// Files to watch, in configuration order.
    pub files: Vec<PathBuf>,
    pub poll_interval: Duration,
    /// Directory receiving one staging file per source.
    pub staging_dir: PathBuf,
    pub line_mode: LineMode,
}

impl TrackerConfig {
    /// Watch `files` with the default interval, staging into the system
    /// temporary directory.
    pub fn new(files: Vec<PathBuf>) -> Self {
        Self {
            files,
            poll_interval: DEFAULT_POLL_INTERVAL,
            staging_dir: std::env::temp_dir(),
            line_mode: LineMode::default(),
        }
    }
}

/// Lifecycle of a `Tracker`.
///
/// ```text
/// Created -> Running -> Stopping -> Stopped
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackerState {
    Created,
    Running,
    Stopping,
    Stopped,
}

impl fmt::Display for TrackerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Created => "created",
            Self::Running => "running",
            Self::Stopping => "stopping",
            Self::Stopped => "stopped",
        };
        f.write_str(name)
    }
}

/// Tails a fixed set of files, relaying appended lines into per-source
/// staging files.
///
/// Every source gets its own monitoring task and its own guard, so a slow
/// or stuck source never holds up the others.
#[derive(Debug)]
pub struct Tracker {
    pub(crate) config: TrackerConfig,
    pub(crate) state: TrackerState,
    pub(crate) sources: HashMap<PathBuf, Arc<WatchedSource>>,
    pub(crate) cancel: CancellationToken,
    pub(crate) monitors: Vec<MonitorHandle>,
}

/// One watched file. The path and destination never change after
/// registration; everything a check cycle mutates sits behind `state`.
#[derive(Debug)]
pub struct WatchedSource {
    pub(crate) path: PathBuf,
    pub(crate) destination: PathBuf,
    pub(crate) line_mode: LineMode,
    pub(crate) state: Mutex<SourceState>,
    pub(crate) counters: SourceCounters,
}

/// Mutable part of a `WatchedSource`, only touched while its guard is held.
#[derive(Debug)]
pub(crate) struct SourceState {
    /// `None` once the tracker has released the handle.
    pub(crate) handle: Option<File>,
    pub(crate) cursor: u64,
}

#[derive(Debug, Default)]
pub(crate) struct SourceCounters {
    pub(crate) cycles: AtomicU64,
    pub(crate) captured_bytes: AtomicU64,
    pub(crate) truncations: AtomicU64,
}

/// Point-in-time view of one source, see `Tracker::snapshot`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceSnapshot {
    pub path: PathBuf,
    pub destination: PathBuf,
    pub cursor: u64,
    /// Check cycles run so far, failed ones included.
    pub cycles: u64,
    pub captured_bytes: u64,
    pub truncations: u64,
    pub handle_open: bool,
}

/// What a single check cycle did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleOutcome {
    /// Nothing new past the cursor.
    Idle,
    /// Only empty lines were found; the cursor moved, the destination did not.
    Skipped { scanned: u64 },
    /// `written` bytes were appended to the destination.
    Appended { scanned: u64, written: u64 },
}

/// Control handle of one running monitoring task.
#[derive(Debug)]
pub(crate) struct MonitorHandle {
    pub(crate) path: PathBuf,
    pub(crate) join: JoinHandle<()>,
}
