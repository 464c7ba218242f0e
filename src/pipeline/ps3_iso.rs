//! Encrypted disc images: key retrieval, external decryption and FAT32 splitting

use super::{WorkflowContext, WorkflowRunner, into_dir, remove_archive};
use crate::error::{Error, Result};
use crate::split::{SplitOutcome, SplitPolicy};
use crate::tool::ToolRunner;
use crate::types::{Event, Operation, Stage};
use crate::utils::has_suffix;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Disc keys are 128-bit values written as 32 hex characters
const KEY_HEX_LEN: usize = 32;

pub(super) async fn run(runner: &WorkflowRunner, ctx: &mut WorkflowContext) -> Result<()> {
    let options = runner.config().iso.clone();
    let staging = runner.staging_dir().to_path_buf();

    let archive = runner.download_archive(ctx).await?;
    ctx.extracted = runner.extract(ctx, &archive, &staging).await?;

    let iso = ctx
        .extracted
        .iter()
        .find(|f| has_suffix(f, ".iso"))
        .cloned()
        .ok_or_else(|| Error::MissingArtifact {
            what: "ISO image".to_string(),
            path: archive.clone(),
        })?;

    let key_path = staging.join(format!("{}.dkey", ctx.base));
    if !key_path.is_file() && (options.decrypt || options.keep_key) {
        fetch_key(runner, ctx, &staging).await?;
    }
    ctx.key_file = key_path.is_file().then(|| key_path.clone());

    let mut artifact = iso.clone();
    if options.decrypt {
        match ctx.key_file.clone() {
            Some(key_file) => {
                artifact = decrypt(runner, ctx, &iso, &key_file, options.keep_encrypted).await?;
            }
            None => warn!(item = %ctx.item, "no disc key available, keeping encrypted image"),
        }
    }
    ctx.artifact = Some(artifact.clone());

    let output = ctx.catalog.output_dir.clone();
    let mut operations = Vec::new();

    let size = tokio::fs::metadata(&artifact).await?.len();
    let split = options.split && runner.splitter().needs_split(size);
    let outcome = if split {
        runner.split(ctx, &artifact, SplitPolicy::iso()).await?
    } else {
        SplitOutcome::Unsplit(artifact.clone())
    };

    match outcome {
        SplitOutcome::Split(parts) => {
            for part in parts {
                let dst = into_dir(&output, &part);
                operations.push(Operation::Move { src: part, dst });
            }
            if !options.keep_unsplit {
                operations.push(Operation::Remove {
                    path: artifact.clone(),
                });
            }
        }
        SplitOutcome::Unsplit(path) => {
            let dst = into_dir(&output, &path);
            operations.push(Operation::Move { src: path, dst });
        }
    }

    if let Some(key_file) = &ctx.key_file {
        if options.keep_key {
            operations.push(Operation::Move {
                src: key_file.clone(),
                dst: into_dir(&output, key_file),
            });
        } else {
            operations.push(Operation::Remove {
                path: key_file.clone(),
            });
        }
    }

    remove_archive(ctx, &mut operations);
    runner.finalize(ctx, operations).await;
    Ok(())
}

/// Download and unpack `<base>.zip` from the key archive into staging
///
/// A missing key is not fatal: the image is then kept encrypted. Cancellation
/// still stops the item.
async fn fetch_key(runner: &WorkflowRunner, ctx: &mut WorkflowContext, staging: &Path) -> Result<()> {
    ctx.stage = Stage::Decrypt;
    let url = format!(
        "{}/{}.zip",
        runner.config().key_archive_url.trim_end_matches('/'),
        urlencoding::encode(&ctx.base)
    );
    let key_zip = staging.join(format!("{}_dkey.zip", ctx.base));
    info!(%url, "fetching disc key");

    let result = async {
        runner.fetch_with_progress(ctx, &url, &key_zip).await?;
        runner.extract(ctx, &key_zip, staging).await?;
        tokio::fs::remove_file(&key_zip).await?;
        Ok::<_, Error>(())
    }
    .await;

    match result {
        Err(Error::Cancelled) => Err(Error::Cancelled),
        Err(e) => {
            warn!(item = %ctx.item, error = %e, "could not retrieve disc key");
            Ok(())
        }
        Ok(()) => Ok(()),
    }
}

/// Run the decryptor and put its output under the final name
async fn decrypt(
    runner: &WorkflowRunner,
    ctx: &mut WorkflowContext,
    iso: &Path,
    key_file: &Path,
    keep_encrypted: bool,
) -> Result<PathBuf> {
    ctx.stage = Stage::Decrypt;

    let program = runner
        .config()
        .decryptor_path
        .clone()
        .ok_or_else(|| Error::Config {
            message: "no decryptor binary configured".to_string(),
            key: Some("decryptor_path".to_string()),
        })?;

    let key = read_key(key_file).await?;
    let platform = runner.platform();
    let args = platform.decrypt_args(iso, &key);

    runner.emit(Event::Decrypting {
        position: ctx.position.clone(),
        name: ctx.base.clone(),
    });

    let event_tx = runner.event_sender();
    ToolRunner::new(runner.cancel_token().clone())
        .with_stdin_newline(platform.needs_stdin_newline())
        .with_output(move |line| {
            event_tx
                .send(Event::ToolOutput {
                    line: line.to_string(),
                })
                .ok();
        })
        .run(&program, &args)
        .await?;

    let staging = runner.staging_dir();
    let decrypted = platform.decrypted_output(staging, &ctx.base);
    if !decrypted.is_file() {
        return Err(Error::MissingArtifact {
            what: "decrypted ISO".to_string(),
            path: decrypted,
        });
    }

    if !keep_encrypted {
        tokio::fs::remove_file(iso).await?;
    }

    let final_name = if keep_encrypted {
        format!("{}.iso.dec", ctx.base)
    } else {
        format!("{}.iso", ctx.base)
    };
    let final_path = staging.join(final_name);

    if final_path != decrypted {
        if final_path.is_file() {
            tokio::fs::remove_file(&final_path).await?;
        }
        tokio::fs::rename(&decrypted, &final_path).await?;
    }
    debug!(path = ?final_path, "decrypted image ready");
    Ok(final_path)
}

/// First 32 characters of the key file, surrounding whitespace ignored
async fn read_key(key_file: &Path) -> Result<String> {
    let content = tokio::fs::read_to_string(key_file).await?;
    Ok(content.trim().chars().take(KEY_HEX_LEN).collect())
}
