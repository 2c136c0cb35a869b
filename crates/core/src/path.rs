//! Path parsing for gs:// URLs and local paths
//!
//! Command arguments are either local filesystem paths (including `-` for
//! stdin/stdout) or `gs://bucket[/key]` URLs.

use crate::error::{Error, Result};

/// A parsed `gs://bucket/key` URL
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GsUrl {
    pub bucket: String,
    /// Object key or prefix; empty when the URL names a bare bucket
    pub key: String,
}

impl GsUrl {
    pub fn new(bucket: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            bucket: bucket.into(),
            key: key.into(),
        }
    }

    /// The key with any trailing `/` kept; joining helper for prefixes
    pub fn child(&self, name: &str) -> GsUrl {
        let key = if self.key.is_empty() || self.key.ends_with('/') {
            format!("{}{}", self.key, name)
        } else {
            format!("{}/{}", self.key, name)
        };
        GsUrl::new(&self.bucket, key)
    }

    /// Whether the key is empty or ends in `/`, i.e. addresses a prefix
    pub fn is_prefix_like(&self) -> bool {
        self.key.is_empty() || self.key.ends_with('/')
    }
}

impl std::fmt::Display for GsUrl {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.key.is_empty() {
            write!(f, "gs://{}", self.bucket)
        } else {
            write!(f, "gs://{}/{}", self.bucket, self.key)
        }
    }
}

/// A command argument: remote URL or local path
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParsedPath {
    Remote(GsUrl),
    Local(String),
}

impl ParsedPath {
    pub fn is_remote(&self) -> bool {
        matches!(self, ParsedPath::Remote(_))
    }
}

/// Parse an argument into a remote URL or local path.
///
/// Anything starting with `gs://` is remote; everything else (including `-`)
/// is local.
pub fn parse_path(input: &str) -> Result<ParsedPath> {
    if let Some(rest) = input.strip_prefix("gs://") {
        if rest.is_empty() {
            return Err(Error::InvalidPath(
                "expected gs://bucket[/key]".to_string(),
            ));
        }
        let (bucket, key) = match rest.split_once('/') {
            Some((b, k)) => (b, k),
            None => (rest, ""),
        };
        if bucket.is_empty() {
            return Err(Error::InvalidPath(format!("missing bucket in '{input}'")));
        }
        Ok(ParsedPath::Remote(GsUrl::new(bucket, key)))
    } else if input.is_empty() {
        Err(Error::InvalidPath("empty path".to_string()))
    } else {
        Ok(ParsedPath::Local(input.to_string()))
    }
}

/// Parse a path that must be remote
pub fn parse_gs_url(input: &str) -> Result<GsUrl> {
    match parse_path(input)? {
        ParsedPath::Remote(url) => Ok(url),
        ParsedPath::Local(p) => Err(Error::InvalidPath(format!(
            "'{p}' is not a gs:// URL"
        ))),
    }
}
