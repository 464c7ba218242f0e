//! Catalog listings: cached entries, search and item URLs

use crate::config::CatalogProfile;
use crate::error::Result;
use crate::utils::base_name;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// One file offered by a catalog
///
/// Cached as a `[filename, size]` pair; `size` is the human-readable size the
/// catalog lists (e.g. "1.2 GiB").
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "(String, String)", into = "(String, String)")]
pub struct CatalogEntry {
    /// File name, extension included
    pub filename: String,
    /// Size as displayed by the catalog
    pub size: String,
}

impl CatalogEntry {
    /// Create an entry
    pub fn new(filename: impl Into<String>, size: impl Into<String>) -> Self {
        Self {
            filename: filename.into(),
            size: size.into(),
        }
    }

    /// Name shown to users: the filename without its extension
    pub fn display_name(&self) -> &str {
        base_name(&self.filename)
    }
}

impl From<(String, String)> for CatalogEntry {
    fn from((filename, size): (String, String)) -> Self {
        Self { filename, size }
    }
}

impl From<CatalogEntry> for (String, String) {
    fn from(entry: CatalogEntry) -> Self {
        (entry.filename, entry.size)
    }
}

/// Keep entries whose filename contains every whitespace-separated word of `query`
///
/// Matching ignores case. An empty query keeps everything.
pub fn search<'a>(entries: &'a [CatalogEntry], query: &str) -> Vec<&'a CatalogEntry> {
    let words: Vec<String> = query.split_whitespace().map(str::to_lowercase).collect();
    entries
        .iter()
        .filter(|entry| {
            let name = entry.filename.to_lowercase();
            words.iter().all(|word| name.contains(word.as_str()))
        })
        .collect()
}

/// Download URL of `filename` within `catalog`
pub fn item_url(catalog: &CatalogProfile, filename: &str) -> String {
    format!(
        "{}/{}",
        catalog.url.trim_end_matches('/'),
        urlencoding::encode(filename)
    )
}

/// On-disk cache of catalog listings, one JSON file per catalog
#[derive(Clone, Debug)]
pub struct ListingCache {
    dir: PathBuf,
}

impl ListingCache {
    /// Cache rooted at `dir`
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// `<dir>/<name>_list.json` with the name lowercased and spaces replaced by underscores
    pub fn path_for(&self, catalog_name: &str) -> PathBuf {
        let stem = catalog_name.replace(' ', "_").to_lowercase();
        self.dir.join(format!("{}_list.json", stem))
    }

    /// Cached entries for a catalog, or `None` when there is no usable cache
    pub fn load(&self, catalog_name: &str) -> Option<Vec<CatalogEntry>> {
        let path = self.path_for(catalog_name);
        let content = std::fs::read(&path).ok()?;
        match serde_json::from_slice::<Vec<CatalogEntry>>(&content) {
            Ok(entries) if !entries.is_empty() => {
                debug!(?path, entries = entries.len(), "using cached listing");
                Some(entries)
            }
            Ok(_) => None,
            Err(e) => {
                warn!(?path, error = %e, "listing cache is corrupt, ignoring it");
                None
            }
        }
    }

    /// Replace the cache for a catalog
    pub fn save(&self, catalog_name: &str, entries: &[CatalogEntry]) -> Result<()> {
        std::fs::create_dir_all(&self.dir)?;
        let path = self.path_for(catalog_name);
        std::fs::write(&path, serde_json::to_vec(entries)?)?;
        debug!(?path, entries = entries.len(), "listing cache updated");
        Ok(())
    }

    /// Directory holding the cache files
    pub fn dir(&self) -> &Path {
        &self.dir
    }
}
