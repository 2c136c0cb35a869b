//! configure command - Set configuration options
//!
//! Writes `config.toml` under the config directory. Token acquisition
//! itself stays opaque to the rest of the tool: commands only ever see "a
//! bearer token".

use clap::Args;
use serde::Serialize;

use gs_core::ConfigManager;

use crate::exit_code::ExitCode;
use crate::output::{Formatter, OutputConfig};

/// Set configuration options, including credentials
#[derive(Args, Debug)]
pub struct ConfigureArgs {
    /// Default project for bucket operations
    #[arg(long)]
    pub project: Option<String>,

    /// Path to a service-account key file (JSON)
    #[arg(long)]
    pub credentials: Option<String>,

    /// Static bearer token (overrides other credential sources)
    #[arg(long)]
    pub token: Option<String>,

    /// Print the current configuration and exit
    #[arg(long)]
    pub show: bool,
}

#[derive(Debug, Serialize)]
struct ConfigureOutput {
    config_path: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    project: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    credentials_file: Option<String>,
    token_configured: bool,
}

/// Execute the configure command
pub fn execute(args: ConfigureArgs, output_config: OutputConfig) -> ExitCode {
    let formatter = Formatter::new(output_config);

    let manager = match ConfigManager::new() {
        Ok(m) => m,
        Err(e) => {
            formatter.error(&format!("Failed to resolve config directory: {e}"));
            return ExitCode::GeneralError;
        }
    };
    let mut config = match manager.load() {
        Ok(c) => c,
        Err(e) => {
            formatter.error(&format!("Failed to load configuration: {e}"));
            return ExitCode::GeneralError;
        }
    };

    let changing = args.project.is_some() || args.credentials.is_some() || args.token.is_some();
    if changing {
        if let Some(project) = args.project {
            config.project = Some(project);
        }
        if let Some(credentials) = args.credentials {
            if !std::path::Path::new(&credentials).is_file() {
                formatter.warning(&format!("Credentials file '{credentials}' does not exist yet"));
            }
            config.credentials_file = Some(credentials);
        }
        if let Some(token) = args.token {
            config.access_token = Some(token);
        }
        if let Err(e) = manager.save(&config) {
            formatter.error(&format!("Failed to save configuration: {e}"));
            return ExitCode::GeneralError;
        }
    } else if !args.show {
        formatter.warning("Nothing to configure; pass --project, --credentials, or --token");
        return ExitCode::UsageError;
    }

    let output = ConfigureOutput {
        config_path: manager.config_path().display().to_string(),
        project: config.project.clone(),
        credentials_file: config.credentials_file.clone(),
        token_configured: config.access_token.is_some(),
    };

    if formatter.is_json() {
        formatter.json(&output);
    } else if changing {
        formatter.success(&format!("Configuration saved to {}", output.config_path));
    } else {
        formatter.println(&format!("Configuration file: {}", output.config_path));
        formatter.println(&format!(
            "Project: {}",
            output.project.as_deref().unwrap_or("(not set)")
        ));
        formatter.println(&format!(
            "Credentials file: {}",
            output.credentials_file.as_deref().unwrap_or("(not set)")
        ));
        formatter.println(&format!(
            "Static token: {}",
            if output.token_configured { "configured" } else { "(not set)" }
        ));
    }
    ExitCode::Success
}
