//! Tails a fixed set of text files, relays newly appended lines into one
//! append-only staging file per source and bundles the staging files into a
//! gzip-compressed tar archive on shutdown.
//!
//! ```text
//! source files -> Tracker (one task per file) -> staging files -> TarGzArchiver -> .tar.gz
//! ```

pub mod archiver;
pub mod cli;
pub mod helpers;
pub mod instrumentation;
pub mod metrics;
pub mod runtime;
pub mod tracker;
