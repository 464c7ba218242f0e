//! Runtime settings updates: output directories and the decryptor path.

use crate::error::Result;
use crate::platform;
use std::path::{Path, PathBuf};

use super::MyrientDownloader;

impl MyrientDownloader {
    /// Change where a catalog's finished files are placed
    ///
    /// The new directory applies from the next drain run.
    ///
    /// # Errors
    ///
    /// [`Error::QueueBusy`](crate::Error::QueueBusy) while the queue is being
    /// drained, [`Error::UnknownCatalog`](crate::Error::UnknownCatalog) when no
    /// catalog has `index`.
    pub async fn set_output_dir(&self, index: usize, output_dir: PathBuf) -> Result<()> {
        self.ensure_editable()?;

        let mut config = self.config.write().await;
        config.set_output_dir(index, output_dir.clone())?;
        drop(config);

        tracing::info!(catalog = index, output_dir = %output_dir.display(), "output directory changed");
        Ok(())
    }

    /// Set or clear the decryptor binary
    ///
    /// A new path must name an existing file with the platform's binary name.
    pub async fn set_decryptor_path(&self, path: Option<PathBuf>) -> Result<()> {
        self.ensure_editable()?;

        if let Some(path) = &path {
            platform::validate_decryptor(path, self.runner.platform())?;
        }
        self.config.write().await.set_decryptor_path(path.clone());

        tracing::info!(decryptor_path = ?path, "decryptor path changed");
        Ok(())
    }

    /// Write the current configuration to `path`
    pub async fn save_config(&self, path: &Path) -> Result<()> {
        self.config.read().await.save(path)
    }
}
