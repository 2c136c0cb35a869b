//! rm command - Delete objects from buckets
//!
//! Single deletes per object, or `--recursive` to enumerate a prefix and
//! delete in concurrent batches of up to 100 per wire call.

use clap::Args;
use futures::TryStreamExt as _;
use serde::Serialize;

use gs_core::parse_gs_url;
use gs_gcs::batch::{MAX_BATCH_SIZE, bulk_delete};
use gs_gcs::scheduler::ConcurrentScheduler;

use crate::commands::{Context, build_context};
use crate::exit_code::ExitCode;
use crate::output::{Formatter, OutputConfig};

/// Delete objects from buckets
#[derive(Args, Debug)]
pub struct RmArgs {
    /// Objects to delete (gs://bucket/key), or prefixes with --recursive
    #[arg(required = true)]
    pub paths: Vec<String>,

    /// Delete every object under the given prefix
    #[arg(short, long)]
    pub recursive: bool,

    /// Number of parallel delete batches
    #[arg(short = 'P', long)]
    pub jobs: Option<usize>,
}

#[derive(Debug, Serialize)]
struct RmOutput {
    deleted: usize,
}

/// Execute the rm command
pub async fn execute(args: RmArgs, output_config: OutputConfig) -> ExitCode {
    let formatter = Formatter::new(output_config);

    let urls = match args.paths.iter().map(|p| parse_gs_url(p)).collect::<Result<Vec<_>, _>>() {
        Ok(urls) => urls,
        Err(e) => {
            formatter.error(&format!("{e} (all rm paths must start with gs://)"));
            return ExitCode::UsageError;
        }
    };

    let context = match build_context(&formatter) {
        Ok(c) => c,
        Err(code) => return code,
    };

    let mut deleted = 0usize;
    for url in &urls {
        if args.recursive {
            match delete_prefix(&context, &formatter, &url.bucket, &url.key, args.jobs).await {
                Ok(count) => deleted += count,
                Err(code) => return code,
            }
        } else {
            formatter.println(&format!("Deleting {url}"));
            match context.client.delete_object(&url.bucket, &url.key).await {
                Ok(()) => deleted += 1,
                Err(e) if e.is_not_found() => {
                    formatter.error(&format!(
                        "{url} not found. Did you mean \"gs rm --recursive\" to delete all objects under the prefix?"
                    ));
                    return ExitCode::NotFound;
                }
                Err(e) => {
                    formatter.error(&format!("Failed to delete {url}: {e}"));
                    return ExitCode::from_error(&e);
                }
            }
        }
    }

    if formatter.is_json() {
        formatter.json(&RmOutput { deleted });
    } else {
        formatter.success(&format!("Deleted {deleted} object(s)"));
    }
    ExitCode::Success
}

/// Enumerate a prefix and delete its objects in concurrent wire batches
async fn delete_prefix(
    context: &Context,
    formatter: &Formatter,
    bucket: &str,
    prefix: &str,
    jobs: Option<usize>,
) -> Result<usize, ExitCode> {
    let stream = gs_gcs::list_objects(
        context.client.clone(),
        bucket,
        Some(prefix).filter(|p| !p.is_empty()),
        None,
        None,
    );
    let keys: Vec<String> = match stream.map_ok(|entry| entry.name).try_collect().await {
        Ok(keys) => keys,
        Err(e) => {
            formatter.error(&format!("Failed to list gs://{bucket}/{prefix}: {e}"));
            return Err(ExitCode::from_error(&e));
        }
    };
    if keys.is_empty() {
        return Ok(0);
    }

    let scheduler =
        ConcurrentScheduler::new(jobs.unwrap_or_else(ConcurrentScheduler::default_width));
    let batches: Vec<Vec<String>> = keys
        .chunks(MAX_BATCH_SIZE)
        .map(|chunk| chunk.to_vec())
        .collect();

    let actions: Vec<_> = batches
        .into_iter()
        .map(|batch| {
            let client = context.client.clone();
            let bucket = bucket.to_string();
            async move {
                let count = batch.len();
                bulk_delete(&client, &bucket, &batch).await?;
                Ok(count)
            }
        })
        .collect();

    match scheduler.run(actions).await {
        Ok(counts) => {
            let total: usize = counts.iter().sum();
            formatter.println(&format!("Deleted {total} object(s) under gs://{bucket}/{prefix}"));
            Ok(total)
        }
        Err(e) => {
            formatter.error(&format!("Recursive delete failed: {e}"));
            Err(ExitCode::from_error(&e))
        }
    }
}
