//! Core types for myrient-dl

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

use crate::utils::{format_eta, format_speed};

/// One pending acquisition: a catalog filename plus the catalog it belongs to
///
/// Identity is the `(display_name, catalog_index)` pair. Serialized as a
/// two-element JSON array so the queue file reads `[["Game (USA).zip", 0], ...]`.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "(String, usize)", into = "(String, usize)")]
pub struct QueueItem {
    /// Filename as listed by the catalog, extension included
    pub display_name: String,
    /// Index of the owning [`CatalogProfile`](crate::config::CatalogProfile)
    pub catalog_index: usize,
}

impl QueueItem {
    /// Create a new queue item
    pub fn new(display_name: impl Into<String>, catalog_index: usize) -> Self {
        Self {
            display_name: display_name.into(),
            catalog_index,
        }
    }
}

impl From<(String, usize)> for QueueItem {
    fn from((display_name, catalog_index): (String, usize)) -> Self {
        Self {
            display_name,
            catalog_index,
        }
    }
}

impl From<QueueItem> for (String, usize) {
    fn from(item: QueueItem) -> Self {
        (item.display_name, item.catalog_index)
    }
}

impl fmt::Display for QueueItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} [catalog {}]", self.display_name, self.catalog_index)
    }
}

/// A filesystem step executed by [`fsops::execute`](crate::fsops::execute)
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Operation {
    /// Rename within the same filesystem
    Rename {
        /// Current path
        src: PathBuf,
        /// New path
        dst: PathBuf,
    },
    /// Move a file or directory, possibly across volumes
    Move {
        /// Current path
        src: PathBuf,
        /// Destination path (full path, not a directory to move into)
        dst: PathBuf,
    },
    /// Delete a file, or a directory recursively
    Remove {
        /// Path to delete
        path: PathBuf,
    },
}

impl Operation {
    /// Short lowercase name used in progress messages
    pub fn kind(&self) -> &'static str {
        match self {
            Operation::Rename { .. } => "rename",
            Operation::Move { .. } => "move",
            Operation::Remove { .. } => "remove",
        }
    }
}

/// Pipeline stage, used to report where an item was abandoned
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    /// Network transfer
    Download,
    /// Archive extraction
    Extract,
    /// Key retrieval and external decryption
    Decrypt,
    /// FAT32 splitting
    Split,
    /// Final filesystem operations
    Finalize,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Download => "download",
            Stage::Extract => "extract",
            Stage::Decrypt => "decrypt",
            Stage::Split => "split",
            Stage::Finalize => "finalize",
        };
        f.write_str(name)
    }
}

/// Event emitted while the queue is edited and drained
///
/// Item-scoped events carry the queue position label (`"2/5"`) of the item
/// being processed. Every event renders to a progress line via [`Event::message`].
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    /// Item added to the queue
    Queued {
        /// The added item
        item: QueueItem,
    },

    /// Item removed from the queue by the user
    Removed {
        /// The removed item
        item: QueueItem,
    },

    /// Item processing started
    ItemStarted {
        /// Queue position label
        position: String,
        /// Base name of the item
        name: String,
        /// Resolved download URL
        url: String,
    },

    /// Transfer progress
    Downloading {
        /// Queue position label
        position: String,
        /// Base name of the item
        name: String,
        /// Progress percentage (0.0 to 100.0)
        percent: f32,
        /// Throughput of the current attempt in bytes per second
        speed_bps: u64,
        /// Estimated seconds remaining (0 when unknown)
        eta_secs: f64,
    },

    /// Transfer finished (or was already complete)
    DownloadComplete {
        /// Queue position label
        position: String,
        /// Base name of the item
        name: String,
        /// Downloaded file
        path: PathBuf,
    },

    /// Extraction progress
    Extracting {
        /// Queue position label
        position: String,
        /// Base name of the item
        name: String,
        /// Fraction of uncompressed bytes written (0.0 to 100.0)
        percent: f32,
    },

    /// Extraction finished
    ExtractComplete {
        /// Queue position label
        position: String,
        /// Base name of the item
        name: String,
        /// Number of files written
        files: usize,
    },

    /// Decryption tool started
    Decrypting {
        /// Queue position label
        position: String,
        /// Base name of the item
        name: String,
    },

    /// One line of output from the external tool
    ToolOutput {
        /// The output line, without its newline
        line: String,
    },

    /// One part of a split finished
    Splitting {
        /// File being split
        file: PathBuf,
        /// 1-based index of the completed part
        part: u64,
        /// Total number of parts
        total: u64,
    },

    /// Filesystem operation progress or failure
    FileOperation {
        /// Queue position label
        position: String,
        /// Executor message
        message: String,
    },

    /// Item fully processed
    Complete {
        /// Queue position label
        position: String,
        /// Base name of the item
        name: String,
    },

    /// Item given up on; partial files are left in place
    Abandoned {
        /// Queue position label
        position: String,
        /// Base name of the item
        name: String,
        /// Stage that failed
        stage: Stage,
        /// Human-readable reason
        reason: String,
    },

    /// Queue emptied; controls may be re-enabled
    QueueDrained {
        /// Items processed in this run
        processed: usize,
    },

    /// Downloader is shutting down
    Shutdown,
}

impl Event {
    /// Human-readable progress line for this event
    pub fn message(&self) -> String {
        match self {
            Event::Queued { item } => format!("Queued {}", item),
            Event::Removed { item } => format!("Removed {}", item),
            Event::ItemStarted { position, url, .. } => {
                format!("({}) Downloading from: {}", position, url)
            }
            Event::Downloading {
                position,
                name,
                percent,
                speed_bps,
                eta_secs,
            } => format!(
                "({}) {}: {:.0}% at {}, {}",
                position,
                name,
                percent,
                format_speed(*speed_bps as f64),
                format_eta(*eta_secs)
            ),
            Event::DownloadComplete { position, name, .. } => {
                format!("({}) Download finished for {}", position, name)
            }
            Event::Extracting {
                position,
                name,
                percent,
            } => format!("({}) Unzipping {}.zip: {:.0}%", position, name, percent),
            Event::ExtractComplete {
                position,
                name,
                files,
            } => format!("({}) Extracted {} file(s) from {}.zip", position, files, name),
            Event::Decrypting { position, name } => {
                format!("({}) Decrypting ISO for {}...", position, name)
            }
            Event::ToolOutput { line } => line.clone(),
            Event::Splitting { file, part, total } => format!(
                "Splitting {}: part {}/{} complete",
                file.display(),
                part,
                total
            ),
            Event::FileOperation { position, message } => format!("({}) {}", position, message),
            Event::Complete { position, name } => format!("({}) {} ready!", position, name),
            Event::Abandoned {
                position,
                name,
                stage,
                reason,
            } => format!(
                "({}) Giving up on {} during {}: {}",
                position, name, stage, reason
            ),
            Event::QueueDrained { processed } => {
                format!("Queue finished, {} item(s) processed", processed)
            }
            Event::Shutdown => "Shutting down".to_string(),
        }
    }
}
