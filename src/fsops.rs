//! Ordered filesystem operations
//!
//! Pipelines finish by handing a list of [`Operation`]s to [`execute`]. Every
//! operation is attempted in order; a failure is reported and the remaining
//! operations still run. Nothing here returns an [`Error`](crate::Error).

use crate::types::Operation;
use std::future::Future;
use std::io;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use tokio::fs;
use tracing::{debug, warn};

/// A failed operation and the reason it failed
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OperationFailure {
    /// The operation that failed
    pub operation: Operation,
    /// Error message
    pub error: String,
}

/// Summary of an [`execute`] run
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct OperationReport {
    /// Number of operations attempted (always the full list)
    pub attempted: usize,
    /// Number of operations that succeeded
    pub succeeded: usize,
    /// Failures in execution order
    pub failures: Vec<OperationFailure>,
}

impl OperationReport {
    /// Whether every operation succeeded
    pub fn is_success(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Run `operations` in order, reporting progress lines to `sink`
pub async fn execute(operations: &[Operation], mut sink: impl FnMut(String)) -> OperationReport {
    let mut report = OperationReport::default();

    for operation in operations {
        report.attempted += 1;
        sink(describe(operation));

        match apply(operation).await {
            Ok(()) => {
                report.succeeded += 1;
                debug!(?operation, "filesystem operation done");
                sink(format!("Performed {} operation", operation.kind()));
            }
            Err(e) => {
                warn!(?operation, error = %e, "filesystem operation failed");
                sink(format!("Error during {}: {}", operation.kind(), e));
                report.failures.push(OperationFailure {
                    operation: operation.clone(),
                    error: e.to_string(),
                });
            }
        }
    }

    report
}

fn describe(operation: &Operation) -> String {
    match operation {
        Operation::Rename { src, dst } => {
            format!("Renaming {} to {}", src.display(), dst.display())
        }
        Operation::Move { src, dst } => {
            format!("Moving {} to {}", src.display(), dst.display())
        }
        Operation::Remove { path } => format!("Removing {}", path.display()),
    }
}

async fn apply(operation: &Operation) -> io::Result<()> {
    match operation {
        Operation::Rename { src, dst } => {
            prepare_destination(dst).await?;
            fs::rename(src, dst).await
        }
        Operation::Move { src, dst } => move_path(src, dst).await,
        Operation::Remove { path } => remove_path(path).await,
    }
}

/// Create the destination's parent and clear a file already sitting there
async fn prepare_destination(dst: &Path) -> io::Result<()> {
    if let Some(parent) = dst.parent()
        && !parent.as_os_str().is_empty()
    {
        fs::create_dir_all(parent).await?;
    }
    if let Ok(meta) = fs::symlink_metadata(dst).await
        && meta.is_file()
    {
        fs::remove_file(dst).await?;
    }
    Ok(())
}

async fn move_path(src: &Path, dst: &Path) -> io::Result<()> {
    // Fail before touching the destination when there is nothing to move
    fs::symlink_metadata(src).await?;
    prepare_destination(dst).await?;

    match fs::rename(src, dst).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::CrossesDevices => {
            debug!(?src, ?dst, "cross-device move, copying");
            copy_recursive(src.to_path_buf(), dst.to_path_buf()).await?;
            remove_path(src).await
        }
        Err(e) => Err(e),
    }
}

fn copy_recursive(src: PathBuf, dst: PathBuf) -> Pin<Box<dyn Future<Output = io::Result<()>> + Send>> {
    Box::pin(async move {
        let meta = fs::metadata(&src).await?;
        if meta.is_dir() {
            fs::create_dir_all(&dst).await?;
            let mut entries = fs::read_dir(&src).await?;
            while let Some(entry) = entries.next_entry().await? {
                copy_recursive(entry.path(), dst.join(entry.file_name())).await?;
            }
        } else {
            fs::copy(&src, &dst).await?;
        }
        Ok(())
    })
}

async fn remove_path(path: &Path) -> io::Result<()> {
    let meta = fs::symlink_metadata(path).await?;
    if meta.is_dir() {
        fs::remove_dir_all(path).await
    } else {
        fs::remove_file(path).await
    }
}
