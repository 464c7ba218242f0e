//! Test configuration helpers

use myrient_dl::{CatalogProfile, Config, RetryConfig};
use std::path::Path;
use std::time::Duration;

/// Catalog profile served by the mock server under `/files/<slug>`
pub fn catalog(server_uri: &str, root: &Path, index: usize, slug: &str) -> CatalogProfile {
    CatalogProfile {
        name: slug.to_string(),
        index,
        url: format!("{}/files/{}", server_uri, slug),
        output_dir: root.join("out").join(slug),
        file_extension: String::new(),
        requires_decryption: false,
        requires_pkg_handling: false,
        has_multiple_extensions: false,
    }
}

/// Configuration rooted in `root` with fast retries
pub fn test_config(root: &Path, catalogs: Vec<CatalogProfile>) -> Config {
    Config {
        catalogs,
        staging_dir: root.join("processing"),
        license_dir: root.join("exdata"),
        queue_path: root.join("queue.json"),
        listing_cache_dir: root.to_path_buf(),
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
