//! Per-item workflows
//!
//! Each queue item runs through one [`Pipeline`], chosen once from its
//! catalog's capability flags:
//! 1. Download - resumable transfer of the catalog archive into staging
//! 2. Extract - unpack the archive
//! 3. Decrypt / Split - catalog-specific processing
//! 4. Finalize - ordered filesystem operations into the output directory
//!
//! A pipeline never returns an error to the queue. Failures become
//! [`ItemOutcome::Abandoned`] and leave partial files where they are.

use crate::catalog::item_url;
use crate::config::{CatalogProfile, Config};
use crate::error::{Error, Result};
use crate::extraction::ZipExtractor;
use crate::fsops::{self, OperationReport};
use crate::platform::DecryptorPlatform;
use crate::split::{SplitOutcome, SplitPolicy, Splitter};
use crate::transfer::HttpTransfer;
use crate::types::{Event, Operation, QueueItem, Stage};
use crate::utils::base_name;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

mod multi_file;
mod plain;
mod ps3_iso;
mod psn_pkg;

/// Workflow applied to an item, derived from its catalog
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Pipeline {
    /// Download, extract, move files with the catalog extension
    Plain,
    /// Download, extract, fetch key, decrypt, split, move
    Ps3Iso,
    /// Download, extract, split packages, move licenses
    PsnPkg,
    /// Download, extract into a folder, move the folder
    MultiFile,
}

impl Pipeline {
    /// Pick the pipeline for a catalog
    ///
    /// Flags are checked in order: decryption, package handling, multiple
    /// extensions. A catalog with none of them uses [`Pipeline::Plain`].
    pub fn select(catalog: &CatalogProfile) -> Self {
        if catalog.requires_decryption {
            Pipeline::Ps3Iso
        } else if catalog.requires_pkg_handling {
            Pipeline::PsnPkg
        } else if catalog.has_multiple_extensions {
            Pipeline::MultiFile
        } else {
            Pipeline::Plain
        }
    }
}

/// How an item ended
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ItemOutcome {
    /// Every stage ran; finalize failures are reported but do not change this
    Completed,
    /// Processing stopped at `stage`
    Abandoned {
        /// Stage that failed
        stage: Stage,
        /// Why
        reason: String,
    },
}

/// State threaded through one pipeline run
#[derive(Clone, Debug)]
pub struct WorkflowContext {
    /// The queue item being processed
    pub item: QueueItem,
    /// Its catalog profile
    pub catalog: CatalogProfile,
    /// Display name without its final extension
    pub base: String,
    /// Queue position label, e.g. "2/5"
    pub position: String,
    /// Resolved download URL
    pub url: String,
    /// Current stage, reported on abandonment
    pub stage: Stage,
    /// Downloaded archive
    pub archive: Option<PathBuf>,
    /// Files written by extraction
    pub extracted: Vec<PathBuf>,
    /// Payload after decryption/renaming
    pub artifact: Option<PathBuf>,
    /// Disc key file, when one was found
    pub key_file: Option<PathBuf>,
    /// Split parts, empty when nothing was split
    pub parts: Vec<PathBuf>,
}

impl WorkflowContext {
    /// Fresh context for `item` at `position`
    pub fn new(item: QueueItem, catalog: CatalogProfile, position: impl Into<String>) -> Self {
        let base = base_name(&item.display_name).to_string();
        let url = item_url(&catalog, &item.display_name);
        Self {
            item,
            catalog,
            base,
            position: position.into(),
            url,
            stage: Stage::Download,
            archive: None,
            extracted: Vec::new(),
            artifact: None,
            key_file: None,
            parts: Vec::new(),
        }
    }
}

/// Runs pipelines for queue items and broadcasts their progress
#[derive(Clone)]
pub struct WorkflowRunner {
    event_tx: broadcast::Sender<Event>,
    config: Arc<Config>,
    transfer: HttpTransfer,
    platform: Arc<dyn DecryptorPlatform>,
    splitter: Splitter,
    cancel: CancellationToken,
}

impl WorkflowRunner {
    /// Create a runner; fails only when the HTTP client cannot be built
    pub fn new(
        event_tx: broadcast::Sender<Event>,
        config: Arc<Config>,
        platform: Arc<dyn DecryptorPlatform>,
        cancel: CancellationToken,
    ) -> Result<Self> {
        let transfer = HttpTransfer::new(&config, cancel.clone())?;
        Ok(Self {
            event_tx,
            config,
            transfer,
            platform,
            splitter: Splitter::default(),
            cancel,
        })
    }

    /// Replace the FAT32 splitter (smaller thresholds keep tests fast)
    pub fn with_splitter(mut self, splitter: Splitter) -> Self {
        self.splitter = splitter;
        self
    }

    /// Same runner over a newer configuration snapshot
    pub(crate) fn with_config(&self, config: Arc<Config>) -> Result<Self> {
        let transfer = HttpTransfer::new(&config, self.cancel.clone())?;
        Ok(Self {
            config,
            transfer,
            ..self.clone()
        })
    }

    /// Configuration snapshot this runner uses
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Process one item to completion or abandonment
    pub async fn process(&self, item: &QueueItem, position: &str) -> ItemOutcome {
        let Some(catalog) = self.config.catalog(item.catalog_index).cloned() else {
            let reason = Error::UnknownCatalog(item.catalog_index).to_string();
            warn!(%item, "no catalog for item");
            self.emit(Event::Abandoned {
                position: position.to_string(),
                name: base_name(&item.display_name).to_string(),
                stage: Stage::Download,
                reason: reason.clone(),
            });
            return ItemOutcome::Abandoned {
                stage: Stage::Download,
                reason,
            };
        };

        let mut ctx = WorkflowContext::new(item.clone(), catalog, position);
        self.emit(Event::ItemStarted {
            position: ctx.position.clone(),
            name: ctx.base.clone(),
            url: ctx.url.clone(),
        });

        if self.config.dry_run {
            info!(url = %ctx.url, "dry run, skipping download");
            self.emit(Event::Complete {
                position: ctx.position.clone(),
                name: ctx.base.clone(),
            });
            return ItemOutcome::Completed;
        }

        let pipeline = Pipeline::select(&ctx.catalog);
        info!(item = %ctx.item, ?pipeline, position = %ctx.position, "processing item");

        let result = match pipeline {
            Pipeline::Plain => plain::run(self, &mut ctx).await,
            Pipeline::Ps3Iso => ps3_iso::run(self, &mut ctx).await,
            Pipeline::PsnPkg => psn_pkg::run(self, &mut ctx).await,
            Pipeline::MultiFile => multi_file::run(self, &mut ctx).await,
        };

        match result {
            Ok(()) => {
                info!(item = %ctx.item, "item complete");
                self.emit(Event::Complete {
                    position: ctx.position.clone(),
                    name: ctx.base.clone(),
                });
                ItemOutcome::Completed
            }
            Err(e) => {
                tracing::error!(item = %ctx.item, stage = %ctx.stage, error = %e, "abandoning item");
                let reason = e.to_string();
                self.emit(Event::Abandoned {
                    position: ctx.position.clone(),
                    name: ctx.base.clone(),
                    stage: ctx.stage,
                    reason: reason.clone(),
                });
                ItemOutcome::Abandoned {
                    stage: ctx.stage,
                    reason,
                }
            }
        }
    }

    pub(crate) fn emit(&self, event: Event) {
        // No subscribers is fine
        self.event_tx.send(event).ok();
    }

    pub(crate) fn event_sender(&self) -> broadcast::Sender<Event> {
        self.event_tx.clone()
    }

    pub(crate) fn staging_dir(&self) -> &Path {
        &self.config.staging_dir
    }

    pub(crate) fn platform(&self) -> &dyn DecryptorPlatform {
        self.platform.as_ref()
    }

    pub(crate) fn splitter(&self) -> Splitter {
        self.splitter
    }

    pub(crate) fn cancel_token(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Download the item archive into staging, resuming a partial file
    pub(crate) async fn download_archive(&self, ctx: &mut WorkflowContext) -> Result<PathBuf> {
        ctx.stage = Stage::Download;
        let dest = self.staging_dir().join(&ctx.item.display_name);
        let url = ctx.url.clone();
        let path = self.fetch_with_progress(ctx, &url, &dest).await?;

        self.emit(Event::DownloadComplete {
            position: ctx.position.clone(),
            name: ctx.base.clone(),
            path: path.clone(),
        });
        ctx.archive = Some(path.clone());
        Ok(path)
    }

    /// Fetch any URL into `dest`, reporting progress under the item's name
    pub(crate) async fn fetch_with_progress(
        &self,
        ctx: &WorkflowContext,
        url: &str,
        dest: &Path,
    ) -> Result<PathBuf> {
        let event_tx = self.event_tx.clone();
        let position = ctx.position.clone();
        let name = ctx.base.clone();
        let transfer = self.transfer.clone().with_progress(move |p| {
            event_tx
                .send(Event::Downloading {
                    position: position.clone(),
                    name: name.clone(),
                    percent: p.percent,
                    speed_bps: p.speed_bps,
                    eta_secs: p.eta_secs,
                })
                .ok();
        });
        transfer.fetch(url, dest).await
    }

    /// Extract `archive` into `dest`, reporting progress
    pub(crate) async fn extract(
        &self,
        ctx: &mut WorkflowContext,
        archive: &Path,
        dest: &Path,
    ) -> Result<Vec<PathBuf>> {
        ctx.stage = Stage::Extract;
        let event_tx = self.event_tx.clone();
        let position = ctx.position.clone();
        let name = ctx.base.clone();
        let extractor = ZipExtractor::new(self.cancel.clone()).with_progress(move |percent| {
            event_tx
                .send(Event::Extracting {
                    position: position.clone(),
                    name: name.clone(),
                    percent,
                })
                .ok();
        });

        let files = extractor.extract(archive, dest).await?;
        self.emit(Event::ExtractComplete {
            position: ctx.position.clone(),
            name: ctx.base.clone(),
            files: files.len(),
        });
        Ok(files)
    }

    /// Split `path` on a blocking thread, reporting each finished part
    pub(crate) async fn split(
        &self,
        ctx: &mut WorkflowContext,
        path: &Path,
        policy: SplitPolicy,
    ) -> Result<SplitOutcome> {
        ctx.stage = Stage::Split;
        let splitter = self.splitter;
        let event_tx = self.event_tx.clone();
        let owned = path.to_path_buf();

        let outcome = tokio::task::spawn_blocking(move || {
            splitter.split(&owned, policy, |part, total| {
                event_tx
                    .send(Event::Splitting {
                        file: owned.clone(),
                        part,
                        total,
                    })
                    .ok();
            })
        })
        .await
        .map_err(|e| Error::Io(std::io::Error::other(format!("split task panicked: {}", e))))??;

        if let SplitOutcome::Split(parts) = &outcome {
            debug!(?path, parts = parts.len(), "split finished");
            ctx.parts = parts.clone();
        }
        Ok(outcome)
    }

    /// Run the final operations; failures are reported, never fatal
    pub(crate) async fn finalize(
        &self,
        ctx: &mut WorkflowContext,
        operations: Vec<Operation>,
    ) -> OperationReport {
        ctx.stage = Stage::Finalize;
        let position = ctx.position.clone();
        let report = fsops::execute(&operations, |message| {
            self.emit(Event::FileOperation {
                position: position.clone(),
                message,
            })
        })
        .await;

        if !report.is_success() {
            warn!(
                item = %ctx.item,
                failed = report.failures.len(),
                attempted = report.attempted,
                "some file operations failed"
            );
        }
        report
    }
}

/// `<dir>/<file name of path>`
pub(crate) fn into_dir(dir: &Path, path: &Path) -> PathBuf {
    match path.file_name() {
        Some(name) => dir.join(name),
        None => dir.to_path_buf(),
    }
}

/// Remove the downloaded archive as the last operation, if it is still there
pub(crate) fn remove_archive(ctx: &WorkflowContext, operations: &mut Vec<Operation>) {
    if let Some(archive) = &ctx.archive
        && archive.exists()
    {
        operations.push(Operation::Remove {
            path: archive.clone(),
        });
    }
}

#[cfg(test)]
mod tests;
