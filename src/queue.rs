//! Ordered, persisted queue of pending items
//!
//! The queue is a plain FIFO list. It is written to disk as a JSON array of
//! `[display_name, catalog_index]` pairs through a temporary file and a rename,
//! so a crash mid-write leaves the previous file intact.

use crate::error::Result;
use crate::types::QueueItem;
use std::path::Path;
use tracing::{debug, warn};

/// FIFO list of [`QueueItem`]s without duplicates
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DownloadQueue {
    items: Vec<QueueItem>,
}

impl DownloadQueue {
    /// Empty queue
    pub fn new() -> Self {
        Self::default()
    }

    /// Append `item` unless an equal pair is already queued
    ///
    /// Returns `false` when the item was already present.
    pub fn enqueue(&mut self, item: QueueItem) -> bool {
        if self.contains(&item) {
            debug!(%item, "already queued");
            return false;
        }
        self.items.push(item);
        true
    }

    /// The item that will be processed next
    pub fn peek_front(&self) -> Option<&QueueItem> {
        self.items.first()
    }

    /// Remove and return the head item
    pub fn dequeue_front(&mut self) -> Option<QueueItem> {
        if self.items.is_empty() {
            None
        } else {
            Some(self.items.remove(0))
        }
    }

    /// Remove `item` wherever it sits; returns whether it was present
    pub fn remove(&mut self, item: &QueueItem) -> bool {
        let before = self.items.len();
        self.items.retain(|queued| queued != item);
        self.items.len() < before
    }

    /// Whether an equal pair is queued
    pub fn contains(&self, item: &QueueItem) -> bool {
        self.items.contains(item)
    }

    /// Number of queued items
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Whether nothing is queued
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Queued items in processing order
    pub fn items(&self) -> &[QueueItem] {
        &self.items
    }

    /// Write the queue to `path` atomically
    pub fn persist(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)?;
        }

        let json = serde_json::to_vec_pretty(&self.items)?;
        let mut tmp_name = path.as_os_str().to_owned();
        tmp_name.push(".tmp");
        let tmp = std::path::PathBuf::from(tmp_name);

        std::fs::write(&tmp, json)?;
        std::fs::rename(&tmp, path)?;
        debug!(?path, items = self.items.len(), "queue persisted");
        Ok(())
    }

    /// Load a queue from `path`
    ///
    /// A missing file yields an empty queue. An unreadable or corrupt file also
    /// yields an empty queue, with a warning.
    pub fn restore(path: &Path) -> Self {
        let content = match std::fs::read(path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Self::new(),
            Err(e) => {
                warn!(?path, error = %e, "could not read queue file, starting empty");
                return Self::new();
            }
        };

        match serde_json::from_slice::<Vec<QueueItem>>(&content) {
            Ok(items) => {
                let mut queue = Self::new();
                for item in items {
                    queue.enqueue(item);
                }
                debug!(?path, items = queue.len(), "queue restored");
                queue
            }
            Err(e) => {
                warn!(?path, error = %e, "queue file is corrupt, starting empty");
                Self::new()
            }
        }
    }
}
