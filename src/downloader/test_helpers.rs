//! Shared test helpers for creating MyrientDownloader instances in tests.

use crate::config::{CatalogProfile, Config, RetryConfig};
use crate::downloader::MyrientDownloader;
use crate::types::Event;
use std::io::Write;
use std::time::Duration;
use tempfile::{TempDir, tempdir};

/// Catalog profile for a plain catalog served under `base_url`
pub(crate) fn plain_catalog(base_url: &str, dir: &TempDir, index: usize) -> CatalogProfile {
    CatalogProfile {
        name: format!("Catalog {}", index),
        index,
        url: format!("{}/files/c{}", base_url, index),
        output_dir: dir.path().join(format!("out{}", index)),
        file_extension: ".bin".to_string(),
        requires_decryption: false,
        requires_pkg_handling: false,
        has_multiple_extensions: false,
    }
}

/// Configuration rooted in `dir` with fast retries and two catalogs
pub(crate) fn test_config(base_url: &str, dir: &TempDir) -> Config {
    Config {
        catalogs: vec![plain_catalog(base_url, dir, 0), plain_catalog(base_url, dir, 1)],
        staging_dir: dir.path().join("staging"),
        license_dir: dir.path().join("exdata"),
        queue_path: dir.path().join("queue.json"),
        listing_cache_dir: dir.path().to_path_buf(),
        retry: RetryConfig {
            max_attempts: 2,
            initial_delay: Duration::from_millis(10),
            max_delay: Duration::from_millis(20),
            backoff_multiplier: 2.0,
            jitter: false,
        },
        ..Config::default()
    }
}

/// Helper to create a dry-run MyrientDownloader rooted in a temp dir.
/// Returns the downloader and the tempdir (which must be kept alive).
pub(crate) async fn create_test_downloader() -> (MyrientDownloader, TempDir) {
    let temp_dir = tempdir().unwrap();
    let mut config = test_config("http://127.0.0.1:9", &temp_dir);
    config.dry_run = true;
    let downloader = MyrientDownloader::new(config).await.unwrap();
    (downloader, temp_dir)
}

/// Collect every event currently buffered in `rx`
pub(crate) fn drain_events(rx: &mut tokio::sync::broadcast::Receiver<Event>) -> Vec<Event> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

/// Items currently stored in the queue file under `dir`
pub(crate) fn saved_queue(dir: &TempDir) -> Vec<crate::types::QueueItem> {
    let content = std::fs::read_to_string(dir.path().join("queue.json")).unwrap();
    serde_json::from_str(&content).unwrap()
}

/// Build an in-memory zip archive from `(name, content)` pairs
pub(crate) fn zip_bytes(entries: &[(&str, &[u8])]) -> Vec<u8> {
    let mut zip = ::zip::ZipWriter::new(std::io::Cursor::new(Vec::new()));
    let options =
        ::zip::write::FileOptions::default().compression_method(::zip::CompressionMethod::Stored);
    for (name, data) in entries {
        zip.start_file(*name, options).unwrap();
        zip.write_all(data).unwrap();
    }
    zip.finish().unwrap().into_inner()
}
