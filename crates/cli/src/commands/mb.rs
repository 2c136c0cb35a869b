//! mb command - Create a new bucket

use clap::Args;
use serde::Serialize;

use crate::commands::{build_context, require_project};
use crate::exit_code::ExitCode;
use crate::output::{Formatter, OutputConfig};

/// Create a new bucket
#[derive(Args, Debug)]
pub struct MbArgs {
    /// Name of the bucket to create
    pub bucket: String,

    /// Bucket location (e.g. US, EU, us-central1)
    #[arg(long)]
    pub location: Option<String>,

    /// Storage class (e.g. STANDARD, NEARLINE, COLDLINE)
    #[arg(long)]
    pub storage_class: Option<String>,
}

#[derive(Debug, Serialize)]
struct MbOutput {
    bucket: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    location: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    storage_class: Option<String>,
}

/// Execute the mb command
pub async fn execute(args: MbArgs, output_config: OutputConfig) -> ExitCode {
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
    let project = match require_project(&context.config, &formatter) {
        Ok(p) => p,
        Err(code) => return code,
    };

    tracing::info!(bucket, "Creating bucket");
    match context
        .client
        .create_bucket(
            &project,
            bucket,
            args.location.as_deref(),
            args.storage_class.as_deref(),
        )
        .await
    {
        Ok(created) => {
            if formatter.is_json() {
                formatter.json(&MbOutput {
                    bucket: created.name,
                    location: created.location,
                    storage_class: created.storage_class,
                });
            } else {
                formatter.success(&format!("Created bucket gs://{bucket}"));
            }
            ExitCode::Success
        }
        Err(e) => {
            formatter.error(&format!("Failed to create bucket '{bucket}': {e}"));
            ExitCode::from_error(&e)
        }
    }
}
