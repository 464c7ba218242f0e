//! Multi-file catalogs: everything in the archive stays together in one folder

use super::{WorkflowContext, WorkflowRunner, remove_archive};
use crate::error::{Error, Result};
use crate::extraction::ZipExtractor;
use crate::types::Operation;
use crate::utils::unique_suffixed_path;

pub(super) async fn run(runner: &WorkflowRunner, ctx: &mut WorkflowContext) -> Result<()> {
    let archive = runner.download_archive(ctx).await?;
    if !ZipExtractor::is_zip(&archive) {
        return Err(Error::MissingArtifact {
            what: "zip archive".to_string(),
            path: archive,
        });
    }

    let folder = runner.staging_dir().join(&ctx.base);
    ctx.extracted = runner.extract(ctx, &archive, &folder).await?;

    let dst = unique_suffixed_path(&ctx.catalog.output_dir.join(&ctx.base));
    let mut operations = vec![Operation::Move {
        src: folder.clone(),
        dst: dst.clone(),
    }];
    ctx.artifact = Some(dst);

    remove_archive(ctx, &mut operations);
    runner.finalize(ctx, operations).await;
    Ok(())
}
