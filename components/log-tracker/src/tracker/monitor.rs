// Local crates
use crate::metrics::metrics::CYCLE_ERRORS_TOTAL;
use crate::tracker::models::WatchedSource;

// External crates
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{self, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::instrument;

/// Run check cycles for `source` every `period` until `cancel` fires.
///
/// The first cycle runs one period after the task starts. Cancellation wins
/// when it is ready together with a tick; a cycle already in flight is
/// finished before the task returns.
#[instrument(
    name = "tracker::monitor",
    target = "tracker::monitor",
    level = "debug",
    skip_all,
    fields(file = %source.path().display())
)]
pub(crate) async fn monitor_source(
    source: Arc<WatchedSource>,
    period: Duration,
    cancel: CancellationToken,
) {
    let mut ticker = time::interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    tracing::debug!(period_ms = period.as_millis() as u64, "Monitoring task started");

    loop {
        tokio::select! {
            biased;

            _ = cancel.cancelled() => {
                break;
            },

            _ = ticker.tick() => {
                if let Err(e) = source.check_cycle().await {
                    CYCLE_ERRORS_TOTAL
                        .with_label_values(&[source.label().as_str(), e.stage()])
                        .inc();
                    tracing::error!(
                        file = %source.path().display(),
                        stage = e.stage(),
                        error = %e,
                        cause = ?std::error::Error::source(&e),
                        "Check cycle failed"
                    );
                }
            }
        }
    }

    tracing::debug!("Monitoring task exited");
}
