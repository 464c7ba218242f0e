//! Configuration types for myrient-dl

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// A remote catalog and how its downloads are post-processed
///
/// The capability flags are checked in declaration order when a pipeline is
/// selected; a catalog with more than one flag set uses the first one.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogProfile {
    /// Display name (e.g., "PS3")
    pub name: String,

    /// Index referenced by queue items
    pub index: usize,

    /// Base URL of the catalog listing; item URLs are `<url>/<encoded filename>`
    pub url: String,

    /// Final output directory for this catalog
    pub output_dir: PathBuf,

    /// Extension of the payload file inside each archive (e.g., ".iso")
    #[serde(default)]
    pub file_extension: String,

    /// Downloads are encrypted disc images that need a key and the decryption tool
    #[serde(default)]
    pub requires_decryption: bool,

    /// Downloads contain installable packages plus license files
    #[serde(default)]
    pub requires_pkg_handling: bool,

    /// Downloads contain several files that must stay together
    #[serde(default)]
    pub has_multiple_extensions: bool,
}

/// Options for the encrypted disc image pipeline
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct IsoOptions {
    /// Decrypt the image when a key is available (default: true)
    #[serde(default = "default_true")]
    pub decrypt: bool,

    /// Keep the encrypted image next to the decrypted one (default: false)
    #[serde(default)]
    pub keep_encrypted: bool,

    /// Split images over the FAT32 limit (default: true)
    #[serde(default = "default_true")]
    pub split: bool,

    /// Keep the unsplit image after splitting (default: false)
    #[serde(default)]
    pub keep_unsplit: bool,

    /// Move the key file to the output directory instead of deleting it (default: false)
    #[serde(default)]
    pub keep_key: bool,
}

impl Default for IsoOptions {
    fn default() -> Self {
        Self {
            decrypt: true,
            keep_encrypted: false,
            split: true,
            keep_unsplit: false,
            keep_key: false,
        }
    }
}

/// Options for the package pipeline
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PkgOptions {
    /// Split packages over the FAT32 limit (default: true)
    #[serde(default = "default_true")]
    pub split: bool,

    /// Keep the unsplit package after splitting (default: false)
    #[serde(default)]
    pub keep_unsplit: bool,
}

impl Default for PkgOptions {
    fn default() -> Self {
        Self {
            split: true,
            keep_unsplit: false,
        }
    }
}

/// Retry configuration for transient transfer failures
///
/// The delay before retry `i` (0-indexed) is
/// `initial_delay * (backoff_multiplier^i + U[0, 1))` when jitter is enabled,
/// capped at `max_delay`. With the defaults this is `2^i + U[0, 1)` seconds.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Total number of attempts including the first one (default: 10)
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Base delay unit (default: 1 second)
    #[serde(default = "default_initial_delay", with = "duration_serde")]
    pub initial_delay: Duration,

    /// Maximum delay between retries (default: 300 seconds)
    #[serde(default = "default_max_delay", with = "duration_serde")]
    pub max_delay: Duration,

    /// Multiplier for exponential backoff (default: 2.0)
    #[serde(default = "default_backoff_multiplier")]
    pub backoff_multiplier: f64,

    /// Add random jitter to delays (default: true)
    #[serde(default = "default_true")]
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            initial_delay: default_initial_delay(),
            max_delay: default_max_delay(),
            backoff_multiplier: default_backoff_multiplier(),
            jitter: true,
        }
    }
}

/// Main configuration for [`MyrientDownloader`](crate::MyrientDownloader)
///
/// Loaded from and saved to JSON. Every field has a default so a partial file
/// (or `Config::default()`) works; only `catalogs` is meaningfully empty.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Catalog profiles, keyed by their `index`
    #[serde(default)]
    pub catalogs: Vec<CatalogProfile>,

    /// Staging directory for in-flight downloads and extraction (default: "processing")
    #[serde(default = "default_staging_dir")]
    pub staging_dir: PathBuf,

    /// Shared directory for package license files (default: "MyrientDownloads/exdata")
    #[serde(default = "default_license_dir")]
    pub license_dir: PathBuf,

    /// Persisted queue file (default: "queue.json")
    #[serde(default = "default_queue_path")]
    pub queue_path: PathBuf,

    /// Directory holding catalog listing caches (default: ".")
    #[serde(default = "default_listing_cache_dir")]
    pub listing_cache_dir: PathBuf,

    /// Path to the decryption binary (validated by the settings collaborator)
    #[serde(default)]
    pub decryptor_path: Option<PathBuf>,

    /// Location of key archives, one `<base name>.zip` per disc image
    #[serde(default = "default_key_archive_url")]
    pub key_archive_url: String,

    /// Retry behavior for transfers
    #[serde(default)]
    pub retry: RetryConfig,

    /// Abort a transfer attempt when no chunk arrives within this time (default: 60 seconds)
    #[serde(default = "default_chunk_timeout", with = "duration_serde")]
    pub chunk_timeout: Duration,

    /// User-Agent sent with every request
    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    /// Disc image pipeline options
    #[serde(default)]
    pub iso: IsoOptions,

    /// Package pipeline options
    #[serde(default)]
    pub pkg: PkgOptions,

    /// Report item URLs without downloading or touching the disk (default: false)
    #[serde(default)]
    pub dry_run: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            catalogs: Vec::new(),
            staging_dir: default_staging_dir(),
            license_dir: default_license_dir(),
            queue_path: default_queue_path(),
            listing_cache_dir: default_listing_cache_dir(),
            decryptor_path: None,
            key_archive_url: default_key_archive_url(),
            retry: RetryConfig::default(),
            chunk_timeout: default_chunk_timeout(),
            user_agent: default_user_agent(),
            iso: IsoOptions::default(),
            pkg: PkgOptions::default(),
            dry_run: false,
        }
    }
}

impl Config {
    /// Load a configuration from a JSON file
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| Error::Config {
            message: format!("failed to read {}: {}", path.display(), e),
            key: None,
        })?;
        let config: Config = serde_json::from_str(&content)?;
        Ok(config)
    }

    /// Write the configuration back as pretty-printed JSON
    pub fn save(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }

    /// Look up a catalog by its index
    pub fn catalog(&self, index: usize) -> Option<&CatalogProfile> {
        self.catalogs.iter().find(|c| c.index == index)
    }

    /// Update a catalog's output directory
    pub fn set_output_dir(&mut self, index: usize, output_dir: PathBuf) -> Result<()> {
        let catalog = self
            .catalogs
            .iter_mut()
            .find(|c| c.index == index)
            .ok_or(Error::UnknownCatalog(index))?;
        catalog.output_dir = output_dir;
        Ok(())
    }

    /// Update (or clear) the decryption binary path
    pub fn set_decryptor_path(&mut self, path: Option<PathBuf>) {
        self.decryptor_path = path;
    }

    /// Check the configuration for inconsistencies
    ///
    /// Catalog indices must be unique and catalog URLs must parse. A catalog that
    /// requires decryption needs a decryptor path when decryption is enabled.
    pub fn validate(&self) -> Result<()> {
        let mut seen = HashSet::new();
        for catalog in &self.catalogs {
            if !seen.insert(catalog.index) {
                return Err(Error::Config {
                    message: format!("duplicate catalog index {}", catalog.index),
                    key: Some("catalogs".to_string()),
                });
            }
            url::Url::parse(&catalog.url).map_err(|e| Error::Config {
                message: format!("invalid URL for catalog {}: {}", catalog.name, e),
                key: Some("catalogs.url".to_string()),
            })?;
        }

        let needs_decryptor = self.iso.decrypt && self.catalogs.iter().any(|c| c.requires_decryption);
        if needs_decryptor && self.decryptor_path.is_none() {
            return Err(Error::Config {
                message: "decryption is enabled but no decryptor binary is configured".to_string(),
                key: Some("decryptor_path".to_string()),
            });
        }

        Ok(())
    }
}

fn default_true() -> bool {
    true
}

fn default_staging_dir() -> PathBuf {
    PathBuf::from("processing")
}

fn default_license_dir() -> PathBuf {
    PathBuf::from("MyrientDownloads/exdata")
}

fn default_queue_path() -> PathBuf {
    PathBuf::from("queue.json")
}

fn default_listing_cache_dir() -> PathBuf {
    PathBuf::from(".")
}

fn default_key_archive_url() -> String {
    "https://myrient.erista.me/files/Redump/Sony%20-%20PlayStation%203%20-%20Disc%20Keys%20TXT"
        .to_string()
}

fn default_max_attempts() -> u32 {
    10
}

fn default_initial_delay() -> Duration {
    Duration::from_secs(1)
}

fn default_max_delay() -> Duration {
    Duration::from_secs(300)
}

fn default_backoff_multiplier() -> f64 {
    2.0
}

fn default_chunk_timeout() -> Duration {
    Duration::from_secs(60)
}

fn default_user_agent() -> String {
    concat!("myrient-dl/", env!("CARGO_PKG_VERSION")).to_string()
}

// Duration serialization helper (whole seconds)
mod duration_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_secs())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = u64::deserialize(deserializer)?;
        Ok(Duration::from_secs(secs))
    }
}
