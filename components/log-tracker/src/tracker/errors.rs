// Local crates
use crate::tracker::models::TrackerState;

// External crates
use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Failures of the synchronous `Tracker` lifecycle calls. These are the only
/// tracker errors that reach the caller.
#[derive(Debug, Error)]
pub enum TrackerError {
    #[error("failed to open watched file {}", path.display())]
    Open {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to read metadata of watched file {}", path.display())]
    Metadata {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to prepare staging directory {}", path.display())]
    StagingDir {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("watched path {} has no file name to derive a destination from", .0.display())]
    InvalidPath(PathBuf),

    #[error("watched path {} is configured more than once", .0.display())]
    DuplicateSource(PathBuf),

    #[error("watched path {} lives in the staging directory and would be its own staging file", .0.display())]
    DestinationIsSource(PathBuf),

    #[error("cannot {action} a tracker that is {state}")]
    InvalidState {
        action: &'static str,
        state: TrackerState,
    },
}

/// Failures inside a single check cycle. Monitoring tasks log these and wait
/// for the next tick, they never cross back to the caller.
#[derive(Debug, Error)]
pub enum CycleError {
    #[error("source handle already released")]
    Closed,

    #[error("failed to get file stats")]
    Stat(#[source] io::Error),

    #[error("seek failed")]
    Seek(#[source] io::Error),

    #[error("read failed")]
    Read(#[source] io::Error),

    #[error("failed to open output file {}", path.display())]
    OpenDestination {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("write to {} failed", path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

impl CycleError {
    /// Short name of the stage that failed, used as a metrics label.
    pub fn stage(&self) -> &'static str {
        match self {
            Self::Closed => "closed",
            Self::Stat(_) => "stat",
            Self::Seek(_) => "seek",
            Self::Read(_) => "read",
            Self::OpenDestination { .. } => "open_destination",
            Self::Write { .. } => "write",
        }
    }
}
