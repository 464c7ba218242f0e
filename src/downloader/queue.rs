//! Queue editing and persistence.

use crate::error::{Error, Result};
use crate::types::{Event, QueueItem};
use std::sync::atomic::Ordering;

use super::MyrientDownloader;

impl MyrientDownloader {
    /// Add an item to the end of the queue
    ///
    /// Returns `Ok(false)` when the same `(name, catalog)` pair is already queued.
    ///
    /// # Errors
    ///
    /// [`Error::QueueBusy`] while the queue is being drained,
    /// [`Error::ShuttingDown`] after shutdown started, and persistence errors.
    pub async fn add_to_queue(&self, item: QueueItem) -> Result<bool> {
        self.ensure_editable()?;

        let mut queue = self.queue_state.queue.lock().await;
        if !queue.enqueue(item.clone()) {
            return Ok(false);
        }
        queue.persist(&self.queue_state.queue_path)?;
        drop(queue);

        tracing::debug!(%item, "queued");
        self.emit_event(Event::Queued { item });
        Ok(true)
    }

    /// Remove an item from the queue without processing it
    ///
    /// Returns `Ok(false)` when the item was not queued.
    pub async fn remove_from_queue(&self, item: &QueueItem) -> Result<bool> {
        self.ensure_editable()?;

        let mut queue = self.queue_state.queue.lock().await;
        if !queue.remove(item) {
            return Ok(false);
        }
        queue.persist(&self.queue_state.queue_path)?;
        drop(queue);

        tracing::debug!(%item, "removed from queue");
        self.emit_event(Event::Removed { item: item.clone() });
        Ok(true)
    }

    /// Snapshot of the queue in processing order
    pub async fn queued_items(&self) -> Vec<QueueItem> {
        self.queue_state.queue.lock().await.items().to_vec()
    }

    /// Whether a drain run is active
    pub fn is_processing(&self) -> bool {
        self.queue_state.draining.load(Ordering::SeqCst)
    }

    /// Write the current queue to the configured queue file
    pub async fn persist_queue(&self) -> Result<()> {
        let queue = self.queue_state.queue.lock().await;
        queue.persist(&self.queue_state.queue_path)
    }

    /// Pop the head item after it finished and persist the remainder
    pub(crate) async fn finish_head(&self, item: &QueueItem) -> Result<()> {
        let mut queue = self.queue_state.queue.lock().await;
        if queue.peek_front() == Some(item) {
            queue.dequeue_front();
        } else {
            queue.remove(item);
        }
        queue.persist(&self.queue_state.queue_path)
    }

    /// Head item and the current queue length
    pub(crate) async fn head(&self) -> Option<(QueueItem, usize)> {
        let queue = self.queue_state.queue.lock().await;
        queue.peek_front().cloned().map(|item| (item, queue.len()))
    }

    pub(super) fn ensure_editable(&self) -> Result<()> {
        if !self.queue_state.accepting_new.load(Ordering::SeqCst) {
            return Err(Error::ShuttingDown);
        }
        if self.is_processing() {
            return Err(Error::QueueBusy);
        }
        Ok(())
    }
}
