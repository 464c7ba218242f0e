//! FAT32 file splitting
//!
//! Files at or above the FAT32 per-file limit are cut into consecutive parts of
//! exactly `chunk_size` bytes (the last part holds the remainder). Parts are
//! written next to the source file; concatenating them in order reproduces the
//! source byte for byte.

use crate::error::Result;
use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Largest file a FAT32 volume can hold (2^32 - 1 bytes)
pub const FAT32_MAX_FILE_SIZE: u64 = 4_294_967_295;

/// How split parts are named
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SplitNaming {
    /// `<stem>.pkg.66600`, `<stem>.pkg.66601`, ...
    Pkg,
    /// `<stem>.iso.0`, `<stem>.iso.1`, ...
    Iso,
}

impl SplitNaming {
    /// Path of part `index` (0-based) for `source`
    pub fn part_path(&self, source: &Path, index: u64) -> PathBuf {
        let stem = source
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        let name = match self {
            SplitNaming::Pkg => format!("{}.pkg.666{:02}", stem, index),
            SplitNaming::Iso => format!("{}.iso.{}", stem, index),
        };
        source.with_file_name(name)
    }
}

/// Naming plus what happens to the source once every part is written
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SplitPolicy {
    /// Part naming scheme
    pub naming: SplitNaming,
    /// Delete the source after a complete split
    pub delete_source: bool,
}

impl SplitPolicy {
    /// Package splitting: the source is deleted after the split
    pub fn pkg() -> Self {
        Self {
            naming: SplitNaming::Pkg,
            delete_source: true,
        }
    }

    /// Disc image splitting: the caller decides what to do with the source
    pub fn iso() -> Self {
        Self {
            naming: SplitNaming::Iso,
            delete_source: false,
        }
    }

    /// Keep the source file even if the policy would delete it
    pub fn retain_source(mut self, retain: bool) -> Self {
        if retain {
            self.delete_source = false;
        }
        self
    }
}

/// Result of a split request
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SplitOutcome {
    /// File was under the threshold; carries the untouched input path
    Unsplit(PathBuf),
    /// Parts written, in byte order
    Split(Vec<PathBuf>),
}

impl SplitOutcome {
    /// All resulting paths: the original for `Unsplit`, the parts otherwise
    pub fn paths(&self) -> Vec<PathBuf> {
        match self {
            SplitOutcome::Unsplit(path) => vec![path.clone()],
            SplitOutcome::Split(parts) => parts.clone(),
        }
    }

    /// Whether any splitting happened
    pub fn was_split(&self) -> bool {
        matches!(self, SplitOutcome::Split(_))
    }
}

/// Number of parts a file of `file_size` bytes splits into
pub fn part_count(file_size: u64, chunk_size: u64) -> u64 {
    file_size.div_ceil(chunk_size)
}

/// Splits files that exceed a size threshold
#[derive(Clone, Copy, Debug)]
pub struct Splitter {
    threshold: u64,
    chunk_size: u64,
}

impl Default for Splitter {
    fn default() -> Self {
        Self {
            threshold: FAT32_MAX_FILE_SIZE,
            chunk_size: FAT32_MAX_FILE_SIZE,
        }
    }
}

impl Splitter {
    /// Splitter with a custom threshold; parts are `threshold` bytes long
    pub fn with_threshold(threshold: u64) -> Self {
        let threshold = threshold.max(1);
        Self {
            threshold,
            chunk_size: threshold,
        }
    }

    /// Size at or above which files are split
    pub fn threshold(&self) -> u64 {
        self.threshold
    }

    /// Whether a file of this size would be split
    pub fn needs_split(&self, file_size: u64) -> bool {
        file_size >= self.threshold
    }

    /// Split `path` according to `policy`, reporting each finished part
    ///
    /// `on_part` receives `(part, total)` with `part` 1-based. This is blocking
    /// I/O; async callers run it on `spawn_blocking`.
    pub fn split(
        &self,
        path: &Path,
        policy: SplitPolicy,
        mut on_part: impl FnMut(u64, u64),
    ) -> Result<SplitOutcome> {
        let file_size = std::fs::metadata(path)?.len();
        if !self.needs_split(file_size) {
            debug!(?path, file_size, "file under split threshold, leaving as is");
            return Ok(SplitOutcome::Unsplit(path.to_path_buf()));
        }

        let total = part_count(file_size, self.chunk_size);
        info!(?path, file_size, parts = total, "splitting file");

        let mut reader = BufReader::new(File::open(path)?);
        let mut parts = Vec::with_capacity(total as usize);

        for index in 0..total {
            let part_path = policy.naming.part_path(path, index);
            let mut writer = BufWriter::new(File::create(&part_path)?);
            let copied = std::io::copy(&mut (&mut reader).take(self.chunk_size), &mut writer)?;
            writer.flush()?;

            if copied == 0 {
                // Source shrank underneath us; drop the empty part
                std::fs::remove_file(&part_path)?;
                break;
            }

            parts.push(part_path);
            on_part(index + 1, total);
        }

        if policy.delete_source {
            std::fs::remove_file(path)?;
            debug!(?path, "removed source after split");
        }

        Ok(SplitOutcome::Split(parts))
    }
}
