//! Zip archive extraction
//!
//! Catalog downloads are zip archives. Anything else passed to the extractor
//! is left alone and reported as "nothing extracted" rather than as an error,
//! so callers can hand it every download without checking the type first.

use crate::error::{Error, Result};
use crate::utils::has_suffix;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::task::spawn_blocking;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

type ProgressFn = Arc<dyn Fn(f32) + Send + Sync>;

/// Zip extractor with cancellation and per-entry progress
///
/// Progress is the share of uncompressed bytes written so far, reported after
/// each entry as a percentage.
#[derive(Clone)]
pub struct ZipExtractor {
    cancel: CancellationToken,
    progress: Option<ProgressFn>,
}

impl std::fmt::Debug for ZipExtractor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ZipExtractor")
            .field("cancelled", &self.cancel.is_cancelled())
            .finish()
    }
}

impl ZipExtractor {
    /// Create an extractor observing `cancel`
    pub fn new(cancel: CancellationToken) -> Self {
        Self {
            cancel,
            progress: None,
        }
    }

    /// Attach a progress callback receiving percentages
    pub fn with_progress(mut self, progress: impl Fn(f32) + Send + Sync + 'static) -> Self {
        self.progress = Some(Arc::new(progress));
        self
    }

    /// Whether `path` looks like a zip archive (case-insensitive `.zip`)
    pub fn is_zip(path: &Path) -> bool {
        has_suffix(path, ".zip")
    }

    /// Extract `archive` into `dest` on a blocking thread
    ///
    /// Returns the extracted file paths in archive order. Directory entries only
    /// create directories and are not listed.
    pub async fn extract(&self, archive: &Path, dest: &Path) -> Result<Vec<PathBuf>> {
        let this = self.clone();
        let archive_owned = archive.to_path_buf();
        let dest_owned = dest.to_path_buf();

        spawn_blocking(move || this.extract_blocking(&archive_owned, &dest_owned))
            .await
            .map_err(|e| Error::Extraction {
                archive: archive.to_path_buf(),
                reason: format!("extraction task panicked: {}", e),
            })?
    }

    /// Synchronous extraction; used directly by [`extract`](Self::extract)'s worker
    pub fn extract_blocking(&self, archive: &Path, dest: &Path) -> Result<Vec<PathBuf>> {
        if !Self::is_zip(archive) {
            debug!(?archive, "not a zip archive, nothing to extract");
            return Ok(Vec::new());
        }

        info!(?archive, ?dest, "extracting archive");

        let file = std::fs::File::open(archive)?;
        let mut zip = zip::ZipArchive::new(file).map_err(|e| Error::Extraction {
            archive: archive.to_path_buf(),
            reason: format!("failed to open zip archive: {}", e),
        })?;

        let mut total: u64 = 0;
        for i in 0..zip.len() {
            let entry = zip.by_index(i).map_err(|e| entry_error(archive, e))?;
            total += entry.size();
        }

        std::fs::create_dir_all(dest)?;

        let mut extracted = Vec::new();
        let mut written: u64 = 0;

        for i in 0..zip.len() {
            if self.cancel.is_cancelled() {
                info!(?archive, extracted = extracted.len(), "extraction cancelled");
                return Err(Error::Cancelled);
            }

            let mut entry = zip.by_index(i).map_err(|e| entry_error(archive, e))?;
            let Some(relative) = entry.enclosed_name().map(Path::to_path_buf) else {
                warn!(?archive, name = entry.name(), "skipping entry with unsafe path");
                continue;
            };
            let out_path = dest.join(relative);

            if entry.is_dir() {
                std::fs::create_dir_all(&out_path)?;
            } else {
                if let Some(parent) = out_path.parent() {
                    std::fs::create_dir_all(parent)?;
                }
                let mut out = std::fs::File::create(&out_path)?;
                std::io::copy(&mut entry, &mut out).map_err(|e| Error::Extraction {
                    archive: archive.to_path_buf(),
                    reason: format!("failed to write {}: {}", out_path.display(), e),
                })?;
                debug!(path = ?out_path, size = entry.size(), "extracted entry");
                extracted.push(out_path);
            }

            written += entry.size();
            self.report(written, total);
        }

        info!(?archive, files = extracted.len(), "extraction complete");
        Ok(extracted)
    }

    fn report(&self, written: u64, total: u64) {
        if let Some(callback) = &self.progress {
            let percent = if total == 0 {
                100.0
            } else {
                (written as f64 / total as f64 * 100.0) as f32
            };
            callback(percent);
        }
    }
}

fn entry_error(archive: &Path, e: zip::result::ZipError) -> Error {
    Error::Extraction {
        archive: archive.to_path_buf(),
        reason: format!("failed to read zip entry: {}", e),
    }
}
