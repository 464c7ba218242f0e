//! Plain catalogs: the archive holds one payload file with the catalog extension

use super::{WorkflowContext, WorkflowRunner, into_dir, remove_archive};
use crate::error::{Error, Result};
use crate::extraction::ZipExtractor;
use crate::types::Operation;
use crate::utils::has_suffix;

pub(super) async fn run(runner: &WorkflowRunner, ctx: &mut WorkflowContext) -> Result<()> {
    let archive = runner.download_archive(ctx).await?;
    if !ZipExtractor::is_zip(&archive) {
        return Err(Error::MissingArtifact {
            what: "zip archive".to_string(),
            path: archive,
        });
    }

    let staging = runner.staging_dir().to_path_buf();
    ctx.extracted = runner.extract(ctx, &archive, &staging).await?;

    let ext = ctx.catalog.file_extension.clone();
    let output = ctx.catalog.output_dir.clone();
    let mut operations = Vec::new();

    for file in &ctx.extracted {
        if ext.is_empty() {
            // No payload extension configured: keep every extracted file as named
            operations.push(Operation::Move {
                src: file.clone(),
                dst: into_dir(&output, file),
            });
        } else if has_suffix(file, &ext) {
            let renamed = staging.join(format!("{}{}", ctx.base, ext));
            operations.push(Operation::Rename {
                src: file.clone(),
                dst: renamed.clone(),
            });
            operations.push(Operation::Move {
                src: renamed.clone(),
                dst: into_dir(&output, &renamed),
            });
        }
    }

    remove_archive(ctx, &mut operations);
    runner.finalize(ctx, operations).await;
    Ok(())
}
