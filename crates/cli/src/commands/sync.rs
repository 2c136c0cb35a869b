//! sync command - Sync a directory with a bucket/prefix
//!
//! One-directional: local directory → bucket/prefix, or bucket/prefix →
//! local directory. The plan compares sizes and whole-second modification
//! times only; same-size files whose times fall in the same second are
//! treated as already synced even if their content differs (no
//! content-hash comparison is performed).

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use clap::Args;
use futures::TryStreamExt as _;
use serde::Serialize;

use gs_core::{Error, ParsedPath, parse_path};
use gs_gcs::batch::{MAX_BATCH_SIZE, bulk_delete};
use gs_gcs::download::{DownloadOptions, download_to_file};
use gs_gcs::scheduler::ConcurrentScheduler;
use gs_gcs::sync::{SyncAction, SyncPlanner, walk_local_tree};
use gs_gcs::upload::{UploadOptions, upload_file};
use gs_gcs::ObjectEntry;

use crate::commands::{Context, build_context};
use crate::exit_code::ExitCode;
use crate::output::{Formatter, OutputConfig};

/// Sync a directory with a bucket/prefix
#[derive(Args, Debug)]
pub struct SyncArgs {
    /// Source (local directory or gs://bucket[/prefix])
    pub source: String,

    /// Destination (gs://bucket[/prefix] or local directory)
    pub target: String,

    /// Number of parallel transfers
    #[arg(short = 'P', long)]
    pub jobs: Option<usize>,

    /// Show what would be transferred without doing it
    #[arg(short = 'n', long)]
    pub dry_run: bool,

    /// When pushing, remove remote objects with no local counterpart
    #[arg(long)]
    pub delete: bool,
}

#[derive(Debug, Serialize)]
struct SyncOutput {
    source: String,
    target: String,
    transferred: usize,
    skipped: usize,
    removed: usize,
    dry_run: bool,
}

/// Execute the sync command
pub async fn execute(args: SyncArgs, output_config: OutputConfig) -> ExitCode {
    let formatter = Formatter::new(output_config);

    let source = parse_path(&args.source);
    let target = parse_path(&args.target);

    let context = match build_context(&formatter) {
        Ok(c) => c,
        Err(code) => return code,
    };

    let outcome = match (source, target) {
        (Ok(ParsedPath::Local(dir)), Ok(ParsedPath::Remote(url))) => {
            push(&context, &formatter, &args, Path::new(&dir), &url.bucket, &url.key).await
        }
        (Ok(ParsedPath::Remote(url)), Ok(ParsedPath::Local(dir))) => {
            pull(&context, &formatter, &args, &url.bucket, &url.key, Path::new(&dir)).await
        }
        _ => {
            formatter.error("Expected a local directory and a gs:// URL, or vice versa");
            return ExitCode::UsageError;
        }
    };

    match outcome {
        Ok((transferred, skipped, removed)) => {
            if formatter.is_json() {
                formatter.json(&SyncOutput {
                    source: args.source.clone(),
                    target: args.target.clone(),
                    transferred,
                    skipped,
                    removed,
                    dry_run: args.dry_run,
                });
            } else {
                formatter.success(&format!(
                    "Sync complete: {transferred} transferred, {skipped} skipped, {removed} removed"
                ));
            }
            ExitCode::Success
        }
        Err(e) => {
            formatter.error(&format!("Sync failed: {e}"));
            ExitCode::from_error(&e)
        }
    }
}

async fn list_remote_index(
    context: &Context,
    bucket: &str,
    prefix: &str,
) -> Result<Vec<ObjectEntry>, Error> {
    gs_gcs::list_objects(
        context.client.clone(),
        bucket,
        Some(prefix).filter(|p| !p.is_empty()),
        None,
        None,
    )
    .try_collect()
    .await
}

async fn pull(
    context: &Context,
    formatter: &Formatter,
    args: &SyncArgs,
    bucket: &str,
    prefix: &str,
    dest: &Path,
) -> Result<(usize, usize, usize), Error> {
    let remote = list_remote_index(context, bucket, prefix).await?;
    let local = walk_local_tree(dest)?;
    let plan = SyncPlanner::plan_pull(&remote, &local, bucket, prefix, dest);

    let mut downloads: Vec<(String, PathBuf)> = Vec::new();
    let mut skipped = 0;
    for action in plan {
        match action {
            SyncAction::Download { key, local, .. } => downloads.push((key, local)),
            SyncAction::Skip { key, reason } => {
                tracing::debug!(key, reason, "sync: skipping");
                skipped += 1;
            }
            SyncAction::Upload { .. } => unreachable!("pull plans never upload"),
        }
    }

    if args.dry_run {
        for (key, local) in &downloads {
            formatter.println(&format!("Would copy gs://{bucket}/{key} to {}", local.display()));
        }
        return Ok((downloads.len(), skipped, 0));
    }

    let scheduler =
        ConcurrentScheduler::new(args.jobs.unwrap_or_else(ConcurrentScheduler::default_width));
    let transferred = downloads.len();
    let actions: Vec<_> = downloads
        .into_iter()
        .map(|(key, local)| {
            let client = context.client.clone();
            let bucket = bucket.to_string();
            async move {
                if let Some(parent) = local.parent() {
                    tokio::fs::create_dir_all(parent).await?;
                }
                download_to_file(&client, &bucket, &key, &local, DownloadOptions::default()).await
            }
        })
        .collect();
    scheduler.run(actions).await?;
    Ok((transferred, skipped, 0))
}

async fn push(
    context: &Context,
    formatter: &Formatter,
    args: &SyncArgs,
    src: &Path,
    bucket: &str,
    prefix: &str,
) -> Result<(usize, usize, usize), Error> {
    let local = walk_local_tree(src)?;
    let remote_entries = list_remote_index(context, bucket, prefix).await?;
    let remote: HashMap<String, ObjectEntry> = remote_entries
        .into_iter()
        .filter(|e| !e.is_prefix)
        .map(|e| (e.name.clone(), e))
        .collect();

    let plan = SyncPlanner::plan_push(&local, &remote, src, bucket, prefix);

    let mut uploads: Vec<(PathBuf, String)> = Vec::new();
    let mut skipped = 0;
    for action in plan {
        match action {
            SyncAction::Upload { local, key, .. } => uploads.push((local, key)),
            SyncAction::Skip { key, reason } => {
                tracing::debug!(key, reason, "sync: skipping");
                skipped += 1;
            }
            SyncAction::Download { .. } => unreachable!("push plans never download"),
        }
    }

    let extras = if args.delete {
        SyncPlanner::remote_extras(&local, &remote, prefix)
    } else {
        Vec::new()
    };

    if args.dry_run {
        for (local, key) in &uploads {
            formatter.println(&format!("Would copy {} to gs://{bucket}/{key}", local.display()));
        }
        for key in &extras {
            formatter.println(&format!("Would remove gs://{bucket}/{key}"));
        }
        return Ok((uploads.len(), skipped, extras.len()));
    }

    let scheduler =
        ConcurrentScheduler::new(args.jobs.unwrap_or_else(ConcurrentScheduler::default_width));
    let transferred = uploads.len();
    let actions: Vec<_> = uploads
        .into_iter()
        .map(|(local, key)| {
            let client = context.client.clone();
            let cache = context.cache.clone();
            let bucket = bucket.to_string();
            async move {
                let options = UploadOptions {
                    content_type: mime_guess::from_path(&local)
                        .first()
                        .map(|m| m.essence_str().to_string()),
                    ..Default::default()
                };
                upload_file(&client, cache.as_ref(), &local, &bucket, &key, options)
                    .await
                    .map(|_| ())
            }
        })
        .collect();
    scheduler.run(actions).await?;

    let removed = extras.len();
    if !extras.is_empty() {
        let delete_actions: Vec<_> = extras
            .chunks(MAX_BATCH_SIZE)
            .map(|chunk| {
                let client = context.client.clone();
                let bucket = bucket.to_string();
                let keys = chunk.to_vec();
                async move { bulk_delete(&client, &bucket, &keys).await }
            })
            .collect();
        scheduler.run(delete_actions).await?;
    }

    Ok((transferred, skipped, removed))
}
