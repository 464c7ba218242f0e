//! Package catalogs: installable packages plus their license files

use super::{WorkflowContext, WorkflowRunner, into_dir, remove_archive};
use crate::error::{Error, Result};
use crate::extraction::ZipExtractor;
use crate::split::{SplitOutcome, SplitPolicy};
use crate::types::Operation;
use crate::utils::has_suffix;
use tracing::debug;

pub(super) async fn run(runner: &WorkflowRunner, ctx: &mut WorkflowContext) -> Result<()> {
    let options = runner.config().pkg.clone();
    let license_dir = runner.config().license_dir.clone();
    let staging = runner.staging_dir().to_path_buf();

    let archive = runner.download_archive(ctx).await?;
    if !ZipExtractor::is_zip(&archive) {
        return Err(Error::MissingArtifact {
            what: "zip archive".to_string(),
            path: archive,
        });
    }
    ctx.extracted = runner.extract(ctx, &archive, &staging).await?;
    tokio::fs::create_dir_all(&license_dir).await?;

    let output = ctx.catalog.output_dir.clone();
    let mut operations = Vec::new();

    for file in ctx.extracted.clone() {
        if has_suffix(&file, ".pkg") {
            let pkg = staging.join(format!("{}.pkg", ctx.base));
            if file != pkg {
                debug!(from = ?file, to = ?pkg, "renaming package");
                tokio::fs::rename(&file, &pkg).await?;
            }
            ctx.artifact = Some(pkg.clone());

            if !options.split {
                operations.push(Operation::Move {
                    dst: into_dir(&output, &pkg),
                    src: pkg,
                });
                continue;
            }

            let policy = SplitPolicy::pkg().retain_source(options.keep_unsplit);
            match runner.split(ctx, &pkg, policy).await? {
                SplitOutcome::Split(parts) => {
                    for part in parts {
                        let dst = into_dir(&output, &part);
                        operations.push(Operation::Move { src: part, dst });
                    }
                    if options.keep_unsplit {
                        operations.push(Operation::Move {
                            dst: into_dir(&output, &pkg),
                            src: pkg,
                        });
                    }
                }
                SplitOutcome::Unsplit(pkg) => {
                    operations.push(Operation::Move {
                        dst: into_dir(&output, &pkg),
                        src: pkg,
                    });
                }
            }
        } else if has_suffix(&file, ".rap") {
            operations.push(Operation::Move {
                dst: into_dir(&license_dir, &file),
                src: file,
            });
        }
    }

    remove_archive(ctx, &mut operations);
    runner.finalize(ctx, operations).await;
    Ok(())
}
