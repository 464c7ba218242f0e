//! Shutdown coordination.

use crate::error::Result;
use crate::types::Event;
use std::sync::atomic::Ordering;
use std::time::Duration;

use super::MyrientDownloader;

/// How long shutdown waits for the active item to notice cancellation
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(30);

impl MyrientDownloader {
    /// Gracefully shut down the downloader
    ///
    /// This method performs a graceful shutdown sequence:
    /// 1. Stops accepting queue edits
    /// 2. Cancels the active item (transfers stop at the next chunk, extraction at the next entry)
    /// 3. Waits for the drain run to stop, with a timeout (30 seconds)
    /// 4. Persists the queue
    /// 5. Emits [`Event::Shutdown`]
    ///
    /// Partially processed files stay in the staging directory and the
    /// interrupted item stays at the head of the queue.
    pub async fn shutdown(&self) -> Result<()> {
        tracing::info!("Initiating graceful shutdown");

        // 1. Stop accepting new items
        self.queue_state.accepting_new.store(false, Ordering::SeqCst);

        // 2. Signal cancellation to the running pipeline
        self.cancel.cancel();
        tracing::info!("Signaled cancellation to the active item");

        // 3. Wait for the drain run to stop with timeout
        match tokio::time::timeout(SHUTDOWN_TIMEOUT, self.wait_for_drain()).await {
            Ok(()) => tracing::info!("Queue processor stopped"),
            Err(_) => {
                tracing::warn!("Timeout waiting for queue processor, proceeding with shutdown")
            }
        }

        // 4. Persist final state
        if let Err(e) = self.persist_queue().await {
            tracing::error!(error = %e, "Failed to persist queue during shutdown");
            // Continue with shutdown even if persistence fails
        } else {
            tracing::info!("Queue persisted");
        }

        // 5. Emit shutdown event
        self.emit_event(Event::Shutdown);

        tracing::info!("Graceful shutdown complete");
        Ok(())
    }

    /// Whether shutdown has been requested
    pub fn is_shutting_down(&self) -> bool {
        self.cancel.is_cancelled()
    }

    async fn wait_for_drain(&self) {
        while self.is_processing() {
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
    }
}
