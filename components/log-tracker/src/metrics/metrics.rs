// External crates
use lazy_static::lazy_static;
use prometheus::{
    Histogram, IntCounterVec, IntGauge, register_histogram, register_int_counter_vec,
    register_int_gauge,
};
use std::time::Instant;

/// Helper to observe histogram duration
pub fn observe_duration(hist: &Histogram, start: Instant) {
    let elapsed = start.elapsed().as_secs_f64();
    hist.observe(elapsed);
}

lazy_static! {
    // ======== Tail Tracker Metrics ========

    /// Check cycles completed per source, failed cycles included
    pub static ref CHECK_CYCLES_TOTAL: IntCounterVec = register_int_counter_vec!(
        "logtracker_check_cycles_total",
        "Number of check cycles run against a watched source",
        &["source"]
    ).unwrap();

    pub static ref CAPTURED_BYTES_TOTAL: IntCounterVec = register_int_counter_vec!(
        "logtracker_captured_bytes_total",
        "Bytes appended to a source's staging file",
        &["source"]
    ).unwrap();

    pub static ref CYCLE_ERRORS_TOTAL: IntCounterVec = register_int_counter_vec!(
        "logtracker_cycle_errors_total",
        "Check cycles abandoned because of an I/O error, by failing stage",
        &["source", "stage"]
    ).unwrap();

    /// Times a source shrank under the tracker and its cursor was reset
    pub static ref TRUNCATIONS_TOTAL: IntCounterVec = register_int_counter_vec!(
        "logtracker_truncations_total",
        "Number of cursor resets caused by a source shrinking",
        &["source"]
    ).unwrap();

    pub static ref WATCHED_SOURCES: IntGauge = register_int_gauge!(
        "logtracker_watched_sources",
        "Number of sources with a running monitoring task"
    ).unwrap();

    // ======== Archiver Metrics ========

    pub static ref ARCHIVE_DURATION_SECONDS: Histogram = register_histogram!(
        "logtracker_archive_duration_seconds",
        "Time spent bundling staging files into the archive (seconds)",
        vec![0.001, 0.01, 0.05, 0.1, 0.5, 1.0, 5.0]
    ).unwrap();
}
