// External crates
use anyhow::{Context, Result};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::instrument;

/// Process-wide shutdown broadcaster.
///
/// - Each component calls `.subscribe()` to get its own receiver.
/// - Calling `.trigger()` sends the shutdown signal to every receiver.
#[derive(Debug, Clone)]
pub struct Shutdown {
    tx: broadcast::Sender<()>,
}

impl Default for Shutdown {
    fn default() -> Self {
        Self::new()
    }
}

impl Shutdown {
    /// A small buffer is enough, only one message is ever sent.
    #[instrument(name = "shutdown::new", target = "helpers::shutdown", level = "trace")]
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(4);
        Self { tx }
    }

    #[instrument(
        name = "shutdown::subscribe",
        target = "helpers::shutdown",
        level = "trace",
        skip_all
    )]
    pub fn subscribe(&self) -> broadcast::Receiver<()> {
        self.tx.subscribe()
    }

    /// Notify every subscriber. Triggering twice is harmless.
    #[instrument(
        name = "shutdown::trigger",
        target = "helpers::shutdown",
        level = "trace",
        skip_all
    )]
    pub fn trigger(&self) {
        tracing::trace!(
            subscribers = self.tx.receiver_count(),
            "Shutdown triggered, notifying subscribers"
        );
        let _ = self.tx.send(());
    }

    /// Block until `trigger` fires on `rx`. A receiver that lagged or whose
    /// sender is gone counts as shut down as well.
    pub async fn wait(mut rx: broadcast::Receiver<()>) {
        let _ = rx.recv().await;
        tracing::trace!("Shutdown signal received");
    }

    /// Spawn a task that triggers shutdown on Ctrl-C (SIGINT) or SIGTERM.
    pub fn listen_for_signals(&self) -> Result<JoinHandle<()>> {
        let shutdown = self.clone();

        #[cfg(unix)]
        let mut sigterm = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .context("Failed to install SIGTERM handler")?;

        Ok(tokio::spawn(async move {
            #[cfg(unix)]
            let terminate = async {
                sigterm.recv().await;
            };
            #[cfg(not(unix))]
            let terminate = std::future::pending::<()>();

            tokio::select! {
                res = tokio::signal::ctrl_c() => {
                    if let Err(e) = res {
                        tracing::error!(error = %e, "Failed to listen for Ctrl-C, shutting down");
                    } else {
                        tracing::info!("Ctrl-C received, broadcasting shutdown");
                    }
                },
                _ = terminate => {
                    tracing::info!("SIGTERM received, broadcasting shutdown");
                },
            }

            shutdown.trigger();
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn trigger_reaches_every_subscriber() {
        let shutdown = Shutdown::new();
        let first = shutdown.subscribe();
        let second = shutdown.subscribe();

        shutdown.trigger();

        tokio::time::timeout(Duration::from_secs(1), async {
            Shutdown::wait(first).await;
            Shutdown::wait(second).await;
        })
        .await
        .unwrap();
    }

    #[tokio::test]
    async fn dropped_sender_releases_waiters() {
        let shutdown = Shutdown::new();
        let rx = shutdown.subscribe();
        drop(shutdown);

        tokio::time::timeout(Duration::from_secs(1), Shutdown::wait(rx))
            .await
            .unwrap();
    }
}
