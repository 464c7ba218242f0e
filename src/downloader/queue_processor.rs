//! Queue processor: drains the queue one item at a time.

use crate::error::{Error, Result};
use crate::pipeline::ItemOutcome;
use crate::types::Event;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use super::MyrientDownloader;

/// Clears the draining flag when the drain run ends, however it ends
struct DrainGuard(Arc<AtomicBool>);

impl Drop for DrainGuard {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

impl MyrientDownloader {
    /// Start draining the queue in a background task
    ///
    /// The returned handle resolves to the number of items processed, or
    /// [`Error::QueueBusy`] if another drain run was already active.
    pub fn start_queue_processor(&self) -> tokio::task::JoinHandle<Result<usize>> {
        let downloader = self.clone();
        tokio::spawn(async move { downloader.process_queue().await })
    }

    /// Drain the queue, returning once it is empty or shutdown was requested
    ///
    /// Items run strictly one after another. After each item (completed or
    /// abandoned) the head is dequeued and the queue persisted. When shutdown
    /// interrupts an item, that item stays at the head so the next run resumes it.
    pub async fn process_queue(&self) -> Result<usize> {
        if self
            .queue_state
            .draining
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Err(Error::QueueBusy);
        }
        let _guard = DrainGuard(self.queue_state.draining.clone());

        let mut processed = 0usize;
        loop {
            if self.cancel.is_cancelled() {
                tracing::info!(processed, "queue drain interrupted by shutdown");
                return Ok(processed);
            }

            let Some((item, remaining)) = self.head().await else {
                break;
            };

            // Position counter restarts with every drain run
            let position = format!("{}/{}", processed + 1, processed + remaining);
            // Settings changed between drains apply from here on
            let runner = self.runner.with_config(Arc::new(self.config().await))?;
            let outcome = runner.process(&item, &position).await;

            if self.cancel.is_cancelled() {
                tracing::info!(%item, "item interrupted, keeping it queued");
                return Ok(processed);
            }

            if let ItemOutcome::Abandoned { stage, reason } = &outcome {
                tracing::debug!(%item, %stage, %reason, "item abandoned");
            }

            processed += 1;
            if let Err(e) = self.finish_head(&item).await {
                tracing::error!(%item, error = %e, "failed to persist queue");
            }
        }

        tracing::info!(processed, "queue drained");
        self.emit_event(Event::QueueDrained { processed });
        Ok(processed)
    }
}
