//! Bearer-token acquisition
//!
//! The engine only ever needs "a valid bearer token"; where it comes from
//! is opaque. Providers: a static token (config file or
//! `GS_ACCESS_TOKEN`), or the instance metadata endpoint when running on a
//! cloud VM. Tokens are fetched once and cached for the process lifetime.

use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use tokio::sync::OnceCell;

use gs_core::{Error, Result};

/// Environment variable consulted by [`resolve_token_provider`]
pub const TOKEN_ENV_VAR: &str = "GS_ACCESS_TOKEN";

const METADATA_TOKEN_URL: &str =
    "http://metadata.google.internal/computeMetadata/v1/instance/service-accounts/default/token";

/// Supplies a bearer token on demand
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait TokenProvider: Send + Sync {
    async fn bearer_token(&self) -> Result<String>;
}

/// Fixed token from config or environment
pub struct StaticTokenProvider {
    token: String,
}

impl StaticTokenProvider {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
        }
    }
}

#[async_trait]
impl TokenProvider for StaticTokenProvider {
    async fn bearer_token(&self) -> Result<String> {
        Ok(self.token.clone())
    }
}

#[derive(Debug, Deserialize)]
struct MetadataTokenResponse {
    access_token: String,
}

/// Fetches a token from the instance metadata service, caching it for the
/// process lifetime.
pub struct MetadataTokenProvider {
    url: String,
    cached: OnceCell<String>,
}

impl MetadataTokenProvider {
    pub fn new() -> Self {
        Self::with_url(METADATA_TOKEN_URL)
    }

    pub fn with_url(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            cached: OnceCell::new(),
        }
    }

    async fn fetch(&self) -> Result<String> {
        let response = reqwest::Client::new()
            .get(&self.url)
            .header("Metadata-Flavor", "Google")
            .send()
            .await
            .map_err(|e| Error::Auth(format!("metadata token request: {e}")))?;
        if !response.status().is_success() {
            return Err(Error::Auth(format!(
                "metadata token request returned {}",
                response.status()
            )));
        }
        let token: MetadataTokenResponse = response
            .json()
            .await
            .map_err(|e| Error::Auth(format!("metadata token response: {e}")))?;
        Ok(token.access_token)
    }
}

impl Default for MetadataTokenProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl TokenProvider for MetadataTokenProvider {
    async fn bearer_token(&self) -> Result<String> {
        self.cached
            .get_or_try_init(|| self.fetch())
            .await
            .cloned()
    }
}

/// Pick a provider: explicit token from config, then `GS_ACCESS_TOKEN`,
/// then the instance metadata service.
pub fn resolve_token_provider(config_token: Option<&str>) -> Arc<dyn TokenProvider> {
    if let Some(token) = config_token.filter(|t| !t.is_empty()) {
        return Arc::new(StaticTokenProvider::new(token));
    }
    if let Ok(token) = std::env::var(TOKEN_ENV_VAR)
        && !token.is_empty()
    {
        return Arc::new(StaticTokenProvider::new(token));
    }
    Arc::new(MetadataTokenProvider::new())
}
