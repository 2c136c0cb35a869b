//! Command implementations
//!
//! One module per subcommand; each exposes
//! `execute(args, output_config) -> ExitCode`.

mod completions;
mod configure;
mod cp;
mod ls;
mod mb;
mod mv;
mod rb;
mod rm;
mod sync;

use std::sync::Arc;

use clap::Subcommand;
use indicatif::{ProgressBar, ProgressStyle};

use gs_core::{Config, ConfigManager, FileSessionCache};
use gs_gcs::{ProgressFn, ReqwestTransport, StorageClient, resolve_token_provider};

use crate::exit_code::ExitCode;
use crate::output::{Formatter, OutputConfig};

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// List buckets or objects in a bucket/prefix
    Ls(ls::LsArgs),

    /// Copy files to, from, or between buckets
    Cp(cp::CpArgs),

    /// Move files to, from, or between buckets
    Mv(mv::MvArgs),

    /// Delete objects from buckets
    Rm(rm::RmArgs),

    /// Sync a directory with a bucket/prefix
    Sync(sync::SyncArgs),

    /// Create a new bucket
    Mb(mb::MbArgs),

    /// Permanently delete an empty bucket
    Rb(rb::RbArgs),

    /// Set configuration options, including credentials
    Configure(configure::ConfigureArgs),

    /// Generate shell completions
    Completions(completions::CompletionsArgs),
}

/// Dispatch a parsed subcommand
pub async fn execute(command: Commands, output_config: OutputConfig) -> ExitCode {
    match command {
        Commands::Ls(args) => ls::execute(args, output_config).await,
        Commands::Cp(args) => cp::execute(args, output_config).await,
        Commands::Mv(args) => mv::execute(args, output_config).await,
        Commands::Rm(args) => rm::execute(args, output_config).await,
        Commands::Sync(args) => sync::execute(args, output_config).await,
        Commands::Mb(args) => mb::execute(args, output_config).await,
        Commands::Rb(args) => rb::execute(args, output_config).await,
        Commands::Configure(args) => configure::execute(args, output_config),
        Commands::Completions(args) => completions::execute(args),
    }
}

/// Everything a command needs to talk to the service
pub(crate) struct Context {
    pub client: StorageClient,
    pub cache: Arc<FileSessionCache>,
    pub config: Config,
}

/// Build the client stack from persisted configuration
pub(crate) fn build_context(formatter: &Formatter) -> Result<Context, ExitCode> {
    let manager = match ConfigManager::new() {
        Ok(m) => m,
        Err(e) => {
            formatter.error(&format!("Failed to resolve config directory: {e}"));
            return Err(ExitCode::GeneralError);
        }
    };
    let config = match manager.load() {
        Ok(c) => c,
        Err(e) => {
            formatter.error(&format!("Failed to load configuration: {e}"));
            return Err(ExitCode::GeneralError);
        }
    };

    let transport = match ReqwestTransport::new() {
        Ok(t) => Arc::new(t),
        Err(e) => {
            formatter.error(&format!("Failed to build HTTP client: {e}"));
            return Err(ExitCode::NetworkError);
        }
    };
    let tokens = resolve_token_provider(config.access_token.as_deref());
    let client = StorageClient::new(transport, tokens);
    let cache = Arc::new(FileSessionCache::new(manager.sessions_path()));

    Ok(Context {
        client,
        cache,
        config,
    })
}

/// Project for bucket-level operations, or a usage error
pub(crate) fn require_project(config: &Config, formatter: &Formatter) -> Result<String, ExitCode> {
    match config.effective_project() {
        Some(project) => Ok(project),
        None => {
            formatter.error(
                "No project configured. Run \"gs configure --project NAME\" or set GOOGLE_CLOUD_PROJECT.",
            );
            Err(ExitCode::UsageError)
        }
    }
}

/// A byte progress bar wired into the engine's progress callback
pub(crate) fn transfer_progress(formatter: &Formatter, label: &str) -> (Option<ProgressBar>, Option<ProgressFn>) {
    if !formatter.progress_enabled() {
        return (None, None);
    }
    let bar = ProgressBar::new(0);
    bar.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} {msg} [{bar:40.cyan/blue}] {bytes}/{total_bytes}")
            .expect("Valid template")
            .progress_chars("#>-"),
    );
    bar.set_message(label.to_string());
    let callback_bar = bar.clone();
    let callback: ProgressFn = Arc::new(move |done, total| {
        if let Some(total) = total {
            callback_bar.set_length(total);
        }
        callback_bar.set_position(done);
    });
    (Some(bar), Some(callback))
}
