//! Utility functions for path manipulation and human-readable formatting

use std::path::{Path, PathBuf};

/// Maximum number of suffixes tried when resolving a destination collision
const MAX_RENAME_ATTEMPTS: u32 = 9999;

/// Strip the final extension from a catalog filename
///
/// A leading dot is not treated as an extension separator, so `.hidden` is
/// returned unchanged.
///
/// # Examples
///
/// ```
/// use myrient_dl::utils::base_name;
///
/// assert_eq!(base_name("Game (USA).zip"), "Game (USA)");
/// assert_eq!(base_name("Game.v1.02.zip"), "Game.v1.02");
/// assert_eq!(base_name("README"), "README");
/// ```
pub fn base_name(display_name: &str) -> &str {
    match display_name.rfind('.') {
        Some(idx) if idx > 0 => &display_name[..idx],
        _ => display_name,
    }
}

/// Case-insensitive suffix check used for extension matching
pub fn has_suffix(path: &Path, suffix: &str) -> bool {
    if suffix.is_empty() {
        return false;
    }
    path.file_name()
        .map(|name| {
            name.to_string_lossy()
                .to_lowercase()
                .ends_with(&suffix.to_lowercase())
        })
        .unwrap_or(false)
}

/// Find a free destination by appending `_1`, `_2`, ... to the final component
///
/// Returns `path` itself when nothing exists there yet.
///
/// # Examples
///
/// ```no_run
/// use myrient_dl::utils::unique_suffixed_path;
/// use std::path::Path;
///
/// // If /games/Title exists, returns /games/Title_1 (then _2, ...)
/// let dest = unique_suffixed_path(Path::new("/games/Title"));
/// ```
pub fn unique_suffixed_path(path: &Path) -> PathBuf {
    if !path.exists() {
        return path.to_path_buf();
    }

    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();

    for i in 1..=MAX_RENAME_ATTEMPTS {
        let candidate = path.with_file_name(format!("{}_{}", name, i));
        if !candidate.exists() {
            return candidate;
        }
    }

    // Every suffix is taken; fall back to the last candidate and let the move report the clash
    path.with_file_name(format!("{}_{}", name, MAX_RENAME_ATTEMPTS))
}

/// Format a throughput as `"x.xx MB/s"` above one MiB per second, else `"x.xx KB/s"`
pub fn format_speed(bytes_per_sec: f64) -> String {
    const MIB: f64 = 1024.0 * 1024.0;
    if bytes_per_sec > MIB {
        format!("{:.2} MB/s", bytes_per_sec / MIB)
    } else {
        format!("{:.2} KB/s", bytes_per_sec / 1024.0)
    }
}

/// Format a remaining time as minutes and seconds, or fractional seconds under a minute
pub fn format_eta(seconds: f64) -> String {
    if seconds >= 60.0 {
        let whole = seconds as u64;
        format!("{} minutes {} seconds remaining", whole / 60, whole % 60)
    } else {
        format!("{:.2} seconds remaining", seconds)
    }
}
