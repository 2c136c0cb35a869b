//! ls command - List buckets or objects
//!
//! With no path, lists the project's buckets. With a path, lists objects
//! and virtual directories under the prefix, one `/` level at a time.

use clap::Args;
use comfy_table::{ContentArrangement, Table, presets};
use futures::TryStreamExt as _;
use serde::Serialize;

use gs_core::parse_path;

use crate::commands::{build_context, require_project};
use crate::exit_code::ExitCode;
use crate::output::{Formatter, OutputConfig};

/// List buckets or objects in a bucket/prefix
#[derive(Args, Debug)]
pub struct LsArgs {
    /// Path to list (gs://bucket[/prefix]); omit to list buckets
    pub path: Option<String>,

    /// Limit the listing to this many results from the top
    #[arg(long)]
    pub max_results: Option<u64>,

    /// Limit name columns to this width
    #[arg(long, default_value = "64")]
    pub width: usize,
}

#[derive(Debug, Serialize)]
struct BucketRow {
    name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    created: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    location: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    storage_class: Option<String>,
}

#[derive(Debug, Serialize)]
struct ObjectRow {
    name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    size_bytes: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    updated: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    content_type: Option<String>,
    is_prefix: bool,
}

/// Execute the ls command
pub async fn execute(args: LsArgs, output_config: OutputConfig) -> ExitCode {
    let formatter = Formatter::new(output_config);

    let context = match build_context(&formatter) {
        Ok(c) => c,
        Err(code) => return code,
    };

    match args.path.as_deref() {
        None => list_buckets(&context, &formatter, args.width).await,
        Some(path) => list_objects(&context, &formatter, path, &args).await,
    }
}

async fn list_buckets(
    context: &super::Context,
    formatter: &Formatter,
    width: usize,
) -> ExitCode {
    let project = match require_project(&context.config, formatter) {
        Ok(p) => p,
        Err(code) => return code,
    };

    let buckets = match context.client.list_buckets(&project).await {
        Ok(b) => b,
        Err(e) => {
            formatter.error(&format!("Failed to list buckets: {e}"));
            return ExitCode::from_error(&e);
        }
    };

    let rows: Vec<BucketRow> = buckets
        .iter()
        .map(|b| BucketRow {
            name: b.name.clone(),
            created: b.time_created.map(format_time),
            location: b.location.clone(),
            storage_class: b.storage_class.clone(),
        })
        .collect();

    if formatter.is_json() {
        formatter.json(&rows);
        return ExitCode::Success;
    }

    let mut table = new_table(["NAME", "CREATED", "LOCATION", "CLASS"]);
    for row in &rows {
        table.add_row([
            formatter.style_name(&truncate(&row.name, width)),
            formatter.style_date(row.created.as_deref().unwrap_or("")),
            row.location.clone().unwrap_or_default(),
            row.storage_class.clone().unwrap_or_default(),
        ]);
    }
    formatter.println(&table.to_string());
    ExitCode::Success
}

async fn list_objects(
    context: &super::Context,
    formatter: &Formatter,
    path: &str,
    args: &LsArgs,
) -> ExitCode {
    // Accept both gs://bucket/prefix and bare bucket/prefix
    let normalized = if path.starts_with("gs://") {
        path.to_string()
    } else {
        format!("gs://{path}")
    };
    let url = match parse_path(&normalized) {
        Ok(gs_core::ParsedPath::Remote(url)) => url,
        _ => {
            formatter.error(&format!("Invalid path: '{path}'"));
            return ExitCode::UsageError;
        }
    };

    // A trailing wildcard is implied by prefix listing
    let prefix = url.key.trim_end_matches('*');

    let stream = gs_gcs::list_objects(
        context.client.clone(),
        &url.bucket,
        Some(prefix).filter(|p| !p.is_empty()),
        Some("/"),
        args.max_results,
    );

    let entries: Vec<gs_gcs::ObjectEntry> = match stream.try_collect().await {
        Ok(entries) => entries,
        Err(e) => {
            formatter.error(&format!("Failed to list gs://{}: {e}", url.bucket));
            return ExitCode::from_error(&e);
        }
    };

    let rows: Vec<ObjectRow> = entries
        .iter()
        .map(|entry| ObjectRow {
            name: entry.name.clone(),
            size_bytes: entry.size,
            updated: entry.updated.map(format_time),
            content_type: entry.content_type.clone(),
            is_prefix: entry.is_prefix,
        })
        .collect();

    if formatter.is_json() {
        formatter.json(&rows);
        return ExitCode::Success;
    }

    let mut table = new_table(["NAME", "SIZE", "UPDATED", "TYPE"]);
    for row in &rows {
        let name = truncate(&row.name, args.width);
        let name = if row.is_prefix {
            formatter.style_dir(&name)
        } else {
            name
        };
        table.add_row([
            name,
            formatter.style_size(
                &row.size_bytes
                    .map(|s| humansize::format_size(s, humansize::BINARY))
                    .unwrap_or_default(),
            ),
            formatter.style_date(row.updated.as_deref().unwrap_or("")),
            row.content_type.clone().unwrap_or_default(),
        ]);
    }
    formatter.println(&table.to_string());
    ExitCode::Success
}

fn new_table<const N: usize>(header: [&str; N]) -> Table {
    let mut table = Table::new();
    table.load_preset(presets::NOTHING);
    table.set_content_arrangement(ContentArrangement::Dynamic);
    table.set_header(header.to_vec());
    table
}

fn format_time(ts: jiff::Timestamp) -> String {
    ts.strftime("%Y-%m-%d %H:%M:%S").to_string()
}

fn truncate(text: &str, width: usize) -> String {
    if text.chars().count() <= width {
        text.to_string()
    } else {
        let cut: String = text.chars().take(width.saturating_sub(1)).collect();
        format!("{cut}…")
    }
}
