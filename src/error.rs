//! Error types for myrient-dl
//!
//! This module provides the error taxonomy for the acquisition pipeline:
//! - Network failures, retried until attempts run out
//! - Archive, tool and missing-artifact failures that abandon a single queue item
//! - Configuration, persistence and queue-state errors surfaced to the caller
//!
//! Filesystem operation failures have no variant here: the operation executor
//! reports them per operation and never turns them into an [`Error`].

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for myrient-dl operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for myrient-dl
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error with context about which setting is invalid
    #[error("configuration error: {message}")]
    Config {
        /// Human-readable error message describing the configuration issue
        message: String,
        /// The configuration key that caused the error (e.g., "staging_dir")
        key: Option<String>,
    },

    /// Transfer-level failure (bad status, truncated body, stalled stream)
    #[error("download error: {0}")]
    Download(#[from] DownloadError),

    /// Network error reported by the HTTP client
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    /// Archive could not be read or an entry could not be written
    #[error("extraction failed for {archive}: {reason}")]
    Extraction {
        /// The archive that failed to extract
        archive: PathBuf,
        /// The reason extraction failed
        reason: String,
    },

    /// External decryption tool failure
    #[error("tool error: {0}")]
    Tool(#[from] ToolError),

    /// An intermediate artifact a pipeline stage depends on does not exist
    #[error("missing {what}: {path}")]
    MissingArtifact {
        /// What was expected (e.g., "decrypted ISO")
        what: String,
        /// Where it was expected
        path: PathBuf,
    },

    /// Queue item refers to a catalog index with no profile
    #[error("no catalog configured for index {0}")]
    UnknownCatalog(usize),

    /// Queue mutation attempted while the queue is being drained
    #[error("queue is being processed; edits are only allowed while idle")]
    QueueBusy,

    /// Operation stopped by a cancellation request
    #[error("operation cancelled")]
    Cancelled,

    /// Shutdown in progress
    #[error("shutdown in progress")]
    ShuttingDown,

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error (queue file, config file, listing cache)
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Transfer-level errors raised by the resumable downloader
#[derive(Debug, Error)]
pub enum DownloadError {
    /// Server answered with a status other than 200/206
    #[error("unexpected HTTP status {status} for {url}")]
    UnexpectedStatus {
        /// The HTTP status code received
        status: u16,
        /// The requested URL
        url: String,
    },

    /// Response stream ended before the advertised total was received
    #[error("transfer truncated at {received} of {total} bytes")]
    Truncated {
        /// Bytes present on disk when the stream ended
        received: u64,
        /// Total bytes the server advertised
        total: u64,
    },

    /// No chunk arrived within the configured chunk timeout
    #[error("no data received for {seconds}s")]
    Stalled {
        /// The chunk timeout that elapsed
        seconds: u64,
    },

    /// Neither Content-Range nor Content-Length was present
    #[error("server did not report a size for {url}")]
    MissingLength {
        /// The requested URL
        url: String,
    },

    /// The local partial file is longer than the remote content
    #[error("local file has {local} bytes but {url} has only {remote}")]
    LocalLarger {
        /// Bytes on disk
        local: u64,
        /// Size reported by the server
        remote: u64,
        /// The requested URL
        url: String,
    },
}

/// External tool failures
#[derive(Debug, Error)]
pub enum ToolError {
    /// The binary could not be started
    #[error("failed to start {program}: {reason}")]
    SpawnFailed {
        /// The program that failed to start
        program: PathBuf,
        /// The underlying spawn error
        reason: String,
    },

    /// The tool exited with a non-zero status
    #[error("command exited with code {code:?}: {}", command.join(" "))]
    NonZeroExit {
        /// Exit code, `None` when terminated by a signal
        code: Option<i32>,
        /// Full argument vector, program first
        command: Vec<String>,
    },
}
