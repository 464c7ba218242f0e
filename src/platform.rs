//! Host conventions for the disc image decryption tool
//!
//! The Windows and Unix builds of the decryptor take different arguments and
//! write their output under different names. [`DecryptorPlatform`] captures
//! those differences; [`for_host`] picks the implementation for the running OS.

use crate::error::{Error, Result};
use std::fmt::Debug;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Platform-specific invocation details of the decryption tool
pub trait DecryptorPlatform: Send + Sync + Debug {
    /// Short name used in logs
    fn name(&self) -> &'static str;

    /// Expected file name of the binary (compared case-insensitively)
    fn binary_name(&self) -> &'static str;

    /// Arguments (program excluded) that decrypt `iso` with the hex `key`
    fn decrypt_args(&self, iso: &Path, key: &str) -> Vec<String>;

    /// Where the tool writes the decrypted image for `<staging>/<base>.iso`
    fn decrypted_output(&self, staging: &Path, base: &str) -> PathBuf;

    /// The tool waits for a keypress on exit and needs a newline on stdin
    fn needs_stdin_newline(&self) -> bool;
}

/// Windows build: `--iso <iso> --dk <key> --tc <threads>`
#[derive(Clone, Debug)]
pub struct WindowsDecryptor {
    threads: usize,
}

impl WindowsDecryptor {
    /// Use half of the available cores, at least one
    pub fn new() -> Self {
        let cores = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(2);
        Self::with_threads(cores / 2)
    }

    /// Fixed thread count
    pub fn with_threads(threads: usize) -> Self {
        Self {
            threads: threads.max(1),
        }
    }
}

impl Default for WindowsDecryptor {
    fn default() -> Self {
        Self::new()
    }
}

impl DecryptorPlatform for WindowsDecryptor {
    fn name(&self) -> &'static str {
        "windows"
    }

    fn binary_name(&self) -> &'static str {
        "ps3dec.exe"
    }

    fn decrypt_args(&self, iso: &Path, key: &str) -> Vec<String> {
        vec![
            "--iso".to_string(),
            iso.to_string_lossy().into_owned(),
            "--dk".to_string(),
            key.to_string(),
            "--tc".to_string(),
            self.threads.to_string(),
        ]
    }

    fn decrypted_output(&self, staging: &Path, base: &str) -> PathBuf {
        staging.join(format!("{}.iso_decrypted.iso", base))
    }

    fn needs_stdin_newline(&self) -> bool {
        true
    }
}

/// Linux and macOS build: `d key <key> <iso>`
#[derive(Clone, Copy, Debug, Default)]
pub struct UnixDecryptor;

impl DecryptorPlatform for UnixDecryptor {
    fn name(&self) -> &'static str {
        "unix"
    }

    fn binary_name(&self) -> &'static str {
        "ps3dec"
    }

    fn decrypt_args(&self, iso: &Path, key: &str) -> Vec<String> {
        vec![
            "d".to_string(),
            "key".to_string(),
            key.to_string(),
            iso.to_string_lossy().into_owned(),
        ]
    }

    fn decrypted_output(&self, staging: &Path, base: &str) -> PathBuf {
        staging.join(format!("{}.iso.dec", base))
    }

    fn needs_stdin_newline(&self) -> bool {
        false
    }
}

/// Conventions for the OS this binary was built for
pub fn for_host() -> Arc<dyn DecryptorPlatform> {
    if cfg!(windows) {
        Arc::new(WindowsDecryptor::new())
    } else {
        Arc::new(UnixDecryptor)
    }
}

/// Check that `path` is an existing file named like the platform's decryptor
pub fn validate_decryptor(path: &Path, platform: &dyn DecryptorPlatform) -> Result<()> {
    if !path.is_file() {
        return Err(Error::Config {
            message: format!("decryptor binary not found at {}", path.display()),
            key: Some("decryptor_path".to_string()),
        });
    }

    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_lowercase())
        .unwrap_or_default();
    if name != platform.binary_name() {
        return Err(Error::Config {
            message: format!(
                "expected a binary named {}, got {}",
                platform.binary_name(),
                path.display()
            ),
            key: Some("decryptor_path".to_string()),
        });
    }

    Ok(())
}

/// Search PATH for the decryptor binary
pub fn locate_decryptor() -> Option<PathBuf> {
    ["ps3dec", "PS3Dec"]
        .into_iter()
        .find_map(|name| which::which(name).ok())
}
