//! # myrient-dl
//!
//! Queued acquisition pipeline for catalog software archives.
//!
//! Items picked from a remote catalog are queued and processed strictly one at a
//! time. Each item is downloaded (resuming partial files), unpacked, and, depending
//! on its catalog, decrypted with an external tool, split into FAT32-sized parts,
//! and moved into the catalog's output directory.
//!
//! ## Quick Start
//!
//! ```no_run
//! use myrient_dl::{CatalogProfile, Config, MyrientDownloader, QueueItem};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Config {
//!         catalogs: vec![CatalogProfile {
//!             name: "PS3".to_string(),
//!             index: 0,
//!             url: "https://myrient.erista.me/files/Redump/Sony - PlayStation 3".to_string(),
//!             output_dir: "MyrientDownloads/PS3".into(),
//!             file_extension: ".iso".to_string(),
//!             requires_decryption: true,
//!             requires_pkg_handling: false,
//!             has_multiple_extensions: false,
//!         }],
//!         decryptor_path: myrient_dl::platform::locate_decryptor(),
//!         ..Default::default()
//!     };
//!
//!     let downloader = MyrientDownloader::new(config).await?;
//!
//!     // Subscribe to events
//!     let mut events = downloader.subscribe();
//!     tokio::spawn(async move {
//!         while let Ok(event) = events.recv().await {
//!             println!("{}", event.message());
//!         }
//!     });
//!
//!     downloader
//!         .add_to_queue(QueueItem::new("Some Game (USA).zip", 0))
//!         .await?;
//!     downloader.process_queue().await?;
//!
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]

/// Catalog listings, search and listing caches
pub mod catalog;
/// Configuration types
pub mod config;
/// Core downloader implementation (decomposed into focused submodules)
pub mod downloader;
/// Error types
pub mod error;
/// Zip extraction
pub mod extraction;
/// Filesystem operation executor
pub mod fsops;
/// Per-catalog processing pipelines
pub mod pipeline;
/// Decryption tool conventions per host OS
pub mod platform;
/// Persisted download queue
pub mod queue;
/// Retry logic with exponential backoff
pub mod retry;
/// FAT32 file splitting
pub mod split;
/// External tool invocation
pub mod tool;
/// Resumable HTTP transfers
pub mod transfer;
/// Core types and events
pub mod types;
/// Utility functions
pub mod utils;

// Re-export commonly used types
pub use catalog::{CatalogEntry, ListingCache};
pub use config::{CatalogProfile, Config, IsoOptions, PkgOptions, RetryConfig};
pub use downloader::MyrientDownloader;
pub use error::{DownloadError, Error, Result, ToolError};
pub use pipeline::{ItemOutcome, Pipeline};
pub use platform::{DecryptorPlatform, UnixDecryptor, WindowsDecryptor};
pub use split::{FAT32_MAX_FILE_SIZE, Splitter};
pub use types::{Event, Operation, QueueItem, Stage};

/// Helper function to run the downloader with graceful signal handling.
///
/// Waits for a termination signal and then calls the downloader's `shutdown()` method,
/// which interrupts the active item and persists the queue.
///
/// - **Unix:** listens for SIGTERM and SIGINT, with fallbacks if signal registration fails.
/// - **Windows/other:** listens for Ctrl+C via `tokio::signal::ctrl_c()`.
///
/// # Example
///
/// ```no_run
/// use myrient_dl::{MyrientDownloader, Config, run_with_shutdown};
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let config = Config::default();
///     let downloader = MyrientDownloader::new(config).await?;
///     let drain = downloader.start_queue_processor();
///
///     // Run with automatic signal handling
///     run_with_shutdown(downloader).await?;
///     drain.await??;
///
///     Ok(())
/// }
/// ```
pub async fn run_with_shutdown(downloader: MyrientDownloader) -> Result<()> {
    wait_for_signal().await;
    downloader.shutdown().await
}

#[cfg(unix)]
async fn wait_for_signal() {
    use tokio::signal::unix::{SignalKind, signal};

    // Set up signal handlers - these may fail in restricted environments (containers, tests)
    let sigterm_result = signal(SignalKind::terminate());
    let sigint_result = signal(SignalKind::interrupt());

    match (sigterm_result, sigint_result) {
        (Ok(mut sigterm), Ok(mut sigint)) => {
            tokio::select! {
                _ = sigterm.recv() => {
                    tracing::info!("Received SIGTERM signal");
                }
                _ = sigint.recv() => {
                    tracing::info!("Received SIGINT signal (Ctrl+C)");
                }
            }
        }
        (Err(e), _) => {
            tracing::warn!(error = %e, "Could not register SIGTERM handler, waiting for SIGINT only");
            if let Ok(mut sigint) = signal(SignalKind::interrupt()) {
                sigint.recv().await;
                tracing::info!("Received SIGINT signal (Ctrl+C)");
            } else {
                tracing::error!("Could not register any signal handlers, using ctrl_c fallback");
                tokio::signal::ctrl_c().await.ok();
            }
        }
        (_, Err(e)) => {
            tracing::warn!(error = %e, "Could not register SIGINT handler, waiting for SIGTERM only");
            if let Ok(mut sigterm) = signal(SignalKind::terminate()) {
                sigterm.recv().await;
                tracing::info!("Received SIGTERM signal");
            } else {
                tracing::error!("Could not register any signal handlers, using ctrl_c fallback");
                tokio::signal::ctrl_c().await.ok();
            }
        }
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => {
            tracing::info!("Received Ctrl+C signal");
        }
        Err(e) => {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C signal");
        }
    }
}
