// Local crates
use crate::metrics::metrics::{ARCHIVE_DURATION_SECONDS, observe_duration};

// External crates
use flate2::{Compression, write::GzEncoder};
use std::fs::File;
use std::io::{self, BufWriter};
use std::path::{Path, PathBuf};
use std::time::Instant;
use thiserror::Error;
use tracing::instrument;

/// Default gzip level used when none is configured.
pub const DEFAULT_COMPRESSION_LEVEL: u32 = 6;

#[derive(Debug, Error)]
pub enum ArchiveError {
    #[error("failed to create archive {}", path.display())]
    Create {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to open {} for archiving", path.display())]
    Open {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to add {} to the archive", path.display())]
    Append {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("{} has no file name to use as an archive entry", .0.display())]
    InvalidEntry(PathBuf),

    #[error("failed to finish archive {}", path.display())]
    Finish {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Bundles finished staging files into a single container.
pub trait Archiver {
    /// Copy the full contents of every file in `files` into the container.
    /// The first file that cannot be read or written aborts the whole run.
    fn archive(&self, files: &[PathBuf]) -> Result<(), ArchiveError>;
}

/// Writes a gzip-compressed tar archive, one entry per file named after the
/// file's base name.
#[derive(Debug, Clone)]
pub struct TarGzArchiver {
    output_path: PathBuf,
    compression: Compression,
}

impl TarGzArchiver {
    pub fn new(output_path: impl Into<PathBuf>, compression_level: u32) -> Self {
        Self {
            output_path: output_path.into(),
            compression: Compression::new(compression_level),
        }
    }

    pub fn output_path(&self) -> &Path {
        &self.output_path
    }

    fn append_entry<W: io::Write>(
        builder: &mut tar::Builder<W>,
        path: &Path,
    ) -> Result<(), ArchiveError> {
        let name = path
            .file_name()
            .ok_or_else(|| ArchiveError::InvalidEntry(path.to_path_buf()))?;

        let mut file = File::open(path).map_err(|source| ArchiveError::Open {
            path: path.to_path_buf(),
            source,
        })?;

        builder
            .append_file(name, &mut file)
            .map_err(|source| ArchiveError::Append {
                path: path.to_path_buf(),
                source,
            })
    }
}

impl Archiver for TarGzArchiver {
    // Blocking I/O all the way down, callers on a runtime should go through
    // `spawn_blocking`.
    #[instrument(
        name = "archiver::archive",
        target = "archiver::archiver",
        level = "info",
        skip_all,
        fields(output = %self.output_path.display(), files = files.len())
    )]
    fn archive(&self, files: &[PathBuf]) -> Result<(), ArchiveError> {
        let start = Instant::now();

        let output = File::create(&self.output_path).map_err(|source| ArchiveError::Create {
            path: self.output_path.clone(),
            source,
        })?;

        let mut builder = tar::Builder::new(GzEncoder::new(BufWriter::new(output), self.compression));

        for path in files {
            Self::append_entry(&mut builder, path)?;
            tracing::debug!(file = %path.display(), "Added staging file to archive");
        }

        let finish_err = |source| ArchiveError::Finish {
            path: self.output_path.clone(),
            source,
        };
        let encoder = builder.into_inner().map_err(finish_err)?;
        let mut writer = encoder.finish().map_err(finish_err)?;
        io::Write::flush(&mut writer).map_err(finish_err)?;

        observe_duration(&ARCHIVE_DURATION_SECONDS, start);
        tracing::info!(path = %self.output_path.display(), entries = files.len(), "Archive created");
        Ok(())
    }
}
