//! rb command - Permanently delete an empty bucket

use clap::Args;
use serde::Serialize;

use crate::commands::build_context;
use crate::exit_code::ExitCode;
use crate::output::{Formatter, OutputConfig};

/// Permanently delete an empty bucket
#[derive(Args, Debug)]
pub struct RbArgs {
    /// Name of the bucket to delete
    pub bucket: String,
}

#[derive(Debug, Serialize)]
struct RbOutput {
    bucket: String,
    deleted: bool,
}

/// Execute the rb command
pub async fn execute(args: RbArgs, output_config: OutputConfig) -> ExitCode {
    let formatter = Formatter::new(output_config);

    let bucket = args.bucket.trim_start_matches("gs://").trim_end_matches('/');
    if bucket.is_empty() {
        formatter.error("Bucket name cannot be empty");
        return ExitCode::UsageError;
    }

    let context = match build_context(&formatter) {
        Ok(c) => c,
        Err(code) => return code,
    };

    formatter.println(&format!("Deleting bucket gs://{bucket}"));
    match context.client.delete_bucket(bucket).await {
        Ok(()) => {
            if formatter.is_json() {
                formatter.json(&RbOutput {
                    bucket: bucket.to_string(),
                    deleted: true,
                });
            } else {
                formatter.success(&format!("Deleted bucket gs://{bucket}"));
            }
            ExitCode::Success
        }
        Err(e) => {
            formatter.error(&format!("Failed to delete bucket '{bucket}': {e}"));
            ExitCode::from_error(&e)
        }
    }
}
