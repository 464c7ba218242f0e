//! Core downloader implementation split into focused submodules.
//!
//! The `MyrientDownloader` struct and its methods are organized by domain:
//! - [`queue`] - Queue editing and persistence
//! - [`queue_processor`] - Serial queue draining
//! - [`config_ops`] - Runtime settings updates
//! - [`lifecycle`] - Shutdown coordination

mod config_ops;
mod lifecycle;
mod queue;
mod queue_processor;

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
pub(crate) mod test_helpers;
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests;

use crate::config::Config;
use crate::error::{Error, Result};
use crate::pipeline::WorkflowRunner;
use crate::platform::{self, DecryptorPlatform};
use crate::queue::DownloadQueue;
use crate::split::Splitter;
use crate::types::Event;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::AtomicBool;
use tokio_util::sync::CancellationToken;

/// Queue and drain state
#[derive(Clone)]
pub(crate) struct QueueState {
    /// Pending items in processing order (protected by Mutex)
    pub(crate) queue: Arc<tokio::sync::Mutex<DownloadQueue>>,
    /// Set while a drain run is active; queue edits are rejected meanwhile
    pub(crate) draining: Arc<AtomicBool>,
    /// Flag to indicate whether new items are accepted (set to false during shutdown)
    pub(crate) accepting_new: Arc<AtomicBool>,
    /// Queue file, fixed for the downloader's lifetime
    pub(crate) queue_path: PathBuf,
}

/// Main downloader instance (cloneable - all fields are Arc-wrapped)
#[derive(Clone)]
pub struct MyrientDownloader {
    /// Event broadcast channel sender (multiple subscribers supported)
    pub(crate) event_tx: tokio::sync::broadcast::Sender<Event>,
    /// Configuration; settings updates land here and apply from the next item
    pub(crate) config: Arc<tokio::sync::RwLock<Config>>,
    /// Queue and drain state
    pub(crate) queue_state: QueueState,
    /// Pipeline runner shared by every item
    pub(crate) runner: WorkflowRunner,
    /// Cancelled on shutdown; observed by transfers, extraction and the tool
    pub(crate) cancel: CancellationToken,
}

impl MyrientDownloader {
    /// Create a new MyrientDownloader instance
    ///
    /// This initializes all core components:
    /// - Creates the staging and license directories
    /// - Restores the persisted queue
    /// - Selects the decryptor conventions for the host OS
    /// - Sets up the event broadcast channel
    pub async fn new(config: Config) -> Result<Self> {
        Self::with_platform(config, platform::for_host()).await
    }

    /// Like [`new`](Self::new) with explicit decryptor conventions
    pub async fn with_platform(
        config: Config,
        platform: Arc<dyn DecryptorPlatform>,
    ) -> Result<Self> {
        for dir in [&config.staging_dir, &config.license_dir] {
            tokio::fs::create_dir_all(dir).await.map_err(|e| {
                Error::Io(std::io::Error::new(
                    e.kind(),
                    format!("Failed to create directory '{}': {}", dir.display(), e),
                ))
            })?;
        }

        if let Err(e) = config.validate() {
            // Surface the problem now; affected items are abandoned when they run
            tracing::warn!(error = %e, "configuration has problems");
        }

        let queue = DownloadQueue::restore(&config.queue_path);
        tracing::info!(items = queue.len(), "queue restored");

        // Create broadcast channel with buffer size of 1000 events
        let (event_tx, _rx) = tokio::sync::broadcast::channel(1000);

        let cancel = CancellationToken::new();
        let runner = WorkflowRunner::new(
            event_tx.clone(),
            Arc::new(config.clone()),
            platform,
            cancel.clone(),
        )?;

        Ok(Self {
            event_tx,
            queue_state: QueueState {
                queue: Arc::new(tokio::sync::Mutex::new(queue)),
                draining: Arc::new(AtomicBool::new(false)),
                accepting_new: Arc::new(AtomicBool::new(true)),
                queue_path: config.queue_path.clone(),
            },
            config: Arc::new(tokio::sync::RwLock::new(config)),
            runner,
            cancel,
        })
    }

    /// Replace the FAT32 splitter used by every pipeline
    pub fn with_splitter(mut self, splitter: Splitter) -> Self {
        self.runner = self.runner.with_splitter(splitter);
        self
    }

    /// Subscribe to downloader events
    ///
    /// Each subscriber receives every event emitted after it subscribed. A slow
    /// subscriber that falls more than 1000 events behind misses the oldest ones.
    pub fn subscribe(&self) -> tokio::sync::broadcast::Receiver<Event> {
        self.event_tx.subscribe()
    }

    /// Snapshot of the current configuration
    pub async fn config(&self) -> Config {
        self.config.read().await.clone()
    }

    /// Emit an event to all subscribers
    pub(crate) fn emit_event(&self, event: Event) {
        // No subscribers is fine
        self.event_tx.send(event).ok();
    }
}
