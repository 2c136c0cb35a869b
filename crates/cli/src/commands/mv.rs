//! mv command - Move files to, from, or between buckets
//!
//! A copy followed by deletion of the remote sources. Local sources are
//! left in place.

use clap::Args;

use gs_core::{ParsedPath, parse_path};

use crate::commands::{build_context, cp};
use crate::exit_code::ExitCode;
use crate::output::{Formatter, OutputConfig};

/// Move files to, from, or between buckets
#[derive(Args, Debug)]
pub struct MvArgs {
    /// Source paths followed by the destination
    #[arg(required = true, num_args = 2..)]
    pub paths: Vec<String>,

    /// Set the content type when uploading (guessed by default)
    #[arg(long)]
    pub content_type: Option<String>,
}

/// Execute the mv command
pub async fn execute(args: MvArgs, output_config: OutputConfig) -> ExitCode {
    let formatter = Formatter::new(output_config);

    let Some((_, sources)) = args.paths.split_last() else {
        formatter.error("mv needs at least one source and a destination");
        return ExitCode::UsageError;
    };
    let remote_sources: Vec<String> = sources
        .iter()
        .filter(|s| matches!(parse_path(s), Ok(ParsedPath::Remote(_))))
        .cloned()
        .collect();

    let copy_args = cp::CpArgs {
        paths: args.paths.clone(),
        content_type: args.content_type,
        metadata: Vec::new(),
    };
    let code = cp::execute(copy_args, output_config).await;
    if code != ExitCode::Success {
        return code;
    }

    // Sources only disappear after every copy landed
    let context = match build_context(&formatter) {
        Ok(c) => c,
        Err(code) => return code,
    };
    for source in &remote_sources {
        let Ok(ParsedPath::Remote(url)) = parse_path(source) else {
            continue;
        };
        if let Err(e) = context.client.delete_object(&url.bucket, &url.key).await {
            formatter.error(&format!("Failed to delete {url}: {e}"));
            return ExitCode::from_error(&e);
        }
        formatter.println(&format!("Deleted {url}"));
    }

    ExitCode::Success
}
