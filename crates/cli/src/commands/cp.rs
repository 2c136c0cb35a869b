//! cp command - Copy files to, from, or between buckets
//!
//! Local → remote uploads (resumable for large files), remote → local
//! downloads (resumable via staging files), and remote → remote
//! server-side copies. `-` reads standard input or writes standard output.

use std::path::{Path, PathBuf};

use clap::Args;
use serde::Serialize;

use gs_core::{Error, GsUrl, ParsedPath, parse_path};
use gs_gcs::download::{DownloadOptions, download_to_file, download_to_writer};
use gs_gcs::upload::{UploadOptions, upload_file, upload_reader};

use crate::commands::{Context, build_context, transfer_progress};
use crate::exit_code::ExitCode;
use crate::output::{Formatter, OutputConfig};

/// Copy files to, from, or between buckets
#[derive(Args, Debug)]
#[command(after_help = "\
Examples:
  gs cp report.csv gs://my-bucket/reports/
  gs cp gs://my-bucket/x .
  gs cp gs://my-bucket/foo gs://my-other-bucket/bar
  cat my-file | gs cp - gs://my-bucket/my-file
  gs cp gs://my-bucket/my-file.json - | jq .")]
pub struct CpArgs {
    /// Source paths followed by the destination
    #[arg(required = true, num_args = 2..)]
    pub paths: Vec<String>,

    /// Set the content type when uploading (guessed by default)
    #[arg(long)]
    pub content_type: Option<String>,

    /// Attach custom metadata when uploading (repeatable)
    #[arg(long = "metadata", value_name = "KEY=VALUE")]
    pub metadata: Vec<String>,
}

#[derive(Debug, Serialize)]
struct CpOutput {
    transfers: Vec<TransferRecord>,
}

#[derive(Debug, Serialize)]
struct TransferRecord {
    from: String,
    to: String,
}

/// Execute the cp command
pub async fn execute(args: CpArgs, output_config: OutputConfig) -> ExitCode {
    let formatter = Formatter::new(output_config);

    let (sources, dest) = match args.paths.split_last() {
        Some((dest, sources)) if !sources.is_empty() => (sources.to_vec(), dest.clone()),
        _ => {
            formatter.error("cp needs at least one source and a destination");
            return ExitCode::UsageError;
        }
    };

    let parsed_sources: Vec<ParsedPath> = match sources.iter().map(|s| parse_path(s)).collect() {
        Ok(p) => p,
        Err(e) => {
            formatter.error(&format!("Invalid source path: {e}"));
            return ExitCode::UsageError;
        }
    };
    let parsed_dest = match parse_path(&dest) {
        Ok(p) => p,
        Err(e) => {
            formatter.error(&format!("Invalid destination path: {e}"));
            return ExitCode::UsageError;
        }
    };

    let metadata = match parse_metadata(&args.metadata) {
        Ok(m) => m,
        Err(message) => {
            formatter.error(&message);
            return ExitCode::UsageError;
        }
    };

    let context = match build_context(&formatter) {
        Ok(c) => c,
        Err(code) => return code,
    };

    let all_sources_remote = parsed_sources.iter().all(ParsedPath::is_remote);
    let any_source_remote = parsed_sources.iter().any(ParsedPath::is_remote);

    let result = match (&parsed_dest, all_sources_remote, any_source_remote) {
        (ParsedPath::Remote(dest_url), true, _) => {
            remote_copy(&context, &formatter, &parsed_sources, dest_url).await
        }
        (ParsedPath::Local(dest_path), true, _) => {
            download(&context, &formatter, &parsed_sources, dest_path).await
        }
        (ParsedPath::Remote(dest_url), false, false) => {
            upload(
                &context,
                &formatter,
                &sources,
                dest_url,
                args.content_type.as_deref(),
                metadata,
            )
            .await
        }
        _ => {
            formatter.error(
                "cp copies local files to a bucket, bucket objects to a local path, \
                 or objects between buckets; mixing directions is not supported",
            );
            return ExitCode::UsageError;
        }
    };

    match result {
        Ok(transfers) => {
            if formatter.is_json() {
                formatter.json(&CpOutput { transfers });
            }
            ExitCode::Success
        }
        Err(e) => {
            formatter.error(&e.to_string());
            ExitCode::from_error(&e)
        }
    }
}

async fn upload(
    context: &Context,
    formatter: &Formatter,
    sources: &[String],
    dest: &GsUrl,
    content_type: Option<&str>,
    metadata: Option<serde_json::Value>,
) -> Result<Vec<TransferRecord>, Error> {
    let mut transfers = Vec::new();
    for source in sources {
        let target = upload_target(source, dest, sources.len())?;
        formatter.println(&format!("Copying {source} to {target}"));

        let (bar, progress) = transfer_progress(formatter, source);
        let options = UploadOptions {
            content_type: effective_content_type(source, content_type),
            metadata: metadata.clone(),
            progress,
        };

        let result = if source == "-" {
            upload_reader(
                &context.client,
                tokio::io::stdin(),
                &target.bucket,
                &target.key,
                options,
            )
            .await
        } else {
            upload_file(
                &context.client,
                context.cache.as_ref(),
                Path::new(source),
                &target.bucket,
                &target.key,
                options,
            )
            .await
        };
        if let Some(bar) = bar {
            bar.finish_and_clear();
        }
        result?;

        transfers.push(TransferRecord {
            from: source.clone(),
            to: target.to_string(),
        });
    }
    Ok(transfers)
}

async fn download(
    context: &Context,
    formatter: &Formatter,
    sources: &[ParsedPath],
    dest: &str,
) -> Result<Vec<TransferRecord>, Error> {
    let mut transfers = Vec::new();
    for source in sources {
        let ParsedPath::Remote(url) = source else {
            unreachable!("callers verified all sources are remote");
        };
        let target = download_target(url, dest, sources.len());

        let (bar, progress) = transfer_progress(formatter, &url.to_string());
        let options = DownloadOptions { progress };

        let result = if dest == "-" {
            download_to_writer(
                &context.client,
                &url.bucket,
                &url.key,
                tokio::io::stdout(),
                options,
            )
            .await
        } else {
            formatter.println(&format!("Copying {url} to {}", target.display()));
            download_to_file(&context.client, &url.bucket, &url.key, &target, options).await
        };
        if let Some(bar) = bar {
            bar.finish_and_clear();
        }
        result?;

        transfers.push(TransferRecord {
            from: url.to_string(),
            to: if dest == "-" {
                "-".to_string()
            } else {
                target.display().to_string()
            },
        });
    }
    Ok(transfers)
}

async fn remote_copy(
    context: &Context,
    formatter: &Formatter,
    sources: &[ParsedPath],
    dest: &GsUrl,
) -> Result<Vec<TransferRecord>, Error> {
    let mut transfers = Vec::new();
    for source in sources {
        let ParsedPath::Remote(src) = source else {
            unreachable!("callers verified all sources are remote");
        };
        let target = if dest.is_prefix_like() || sources.len() > 1 {
            dest.child(object_basename(&src.key))
        } else {
            dest.clone()
        };
        formatter.println(&format!("Copying {src} to {target}"));
        context.client.copy_object(src, &target).await?;
        transfers.push(TransferRecord {
            from: src.to_string(),
            to: target.to_string(),
        });
    }
    Ok(transfers)
}

/// Destination key for one uploaded source
fn upload_target(source: &str, dest: &GsUrl, source_count: usize) -> Result<GsUrl, Error> {
    if source == "-" {
        if dest.is_prefix_like() {
            return Err(Error::InvalidPath(
                "uploading from stdin requires a full destination key".to_string(),
            ));
        }
        return Ok(dest.clone());
    }
    if dest.is_prefix_like() || source_count > 1 {
        let name = Path::new(source)
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .ok_or_else(|| Error::InvalidPath(format!("'{source}' has no file name")))?;
        Ok(dest.child(&name))
    } else {
        Ok(dest.clone())
    }
}

/// Destination path for one downloaded object
fn download_target(url: &GsUrl, dest: &str, source_count: usize) -> PathBuf {
    let dest_path = PathBuf::from(dest);
    if dest_path.is_dir() || source_count > 1 {
        dest_path.join(object_basename(&url.key))
    } else {
        dest_path
    }
}

fn object_basename(key: &str) -> &str {
    key.rsplit('/').next().unwrap_or(key)
}

fn effective_content_type(source: &str, explicit: Option<&str>) -> Option<String> {
    if let Some(ct) = explicit {
        return Some(ct.to_string());
    }
    if source == "-" {
        return None;
    }
    mime_guess::from_path(source)
        .first()
        .map(|m| m.essence_str().to_string())
}

fn parse_metadata(pairs: &[String]) -> Result<Option<serde_json::Value>, String> {
    if pairs.is_empty() {
        return Ok(None);
    }
    let mut map = serde_json::Map::new();
    for pair in pairs {
        let Some((key, value)) = pair.split_once('=') else {
            return Err(format!("--metadata expects KEY=VALUE, got '{pair}'"));
        };
        map.insert(key.to_string(), serde_json::Value::String(value.to_string()));
    }
    Ok(Some(serde_json::json!({ "metadata": map })))
}
