//! Error types shared across the gs crates
//!
//! One error enum covers the whole surface: transport failures, remote HTTP
//! status errors, checksum mismatches, batch sub-request failures, and the
//! local config/path/IO categories the CLI needs.

use thiserror::Error;

/// Result alias used throughout the workspace
pub type Result<T> = std::result::Result<T, Error>;

/// Errors produced by the gs client and CLI
#[derive(Debug, Error)]
pub enum Error {
    /// Remote returned a non-success HTTP status; body is preserved for the caller
    #[error("HTTP {status}: {body}")]
    Http { status: u16, body: String },

    /// Transport-level failure (DNS, connect, reset, timeout)
    #[error("Network error: {0}")]
    Network(String),

    /// Object or bucket does not exist
    #[error("Not found: {0}")]
    NotFound(String),

    /// Computed digest does not match the remote-reported digest.
    ///
    /// Always fatal for the affected transfer. On the upload side the remote
    /// object has already been deleted by the time this is returned.
    #[error("Checksum mismatch for gs://{bucket}/{key} (expected {expected}, computed {computed})")]
    ChecksumMismatch {
        bucket: String,
        key: String,
        expected: String,
        computed: String,
    },

    /// A sub-request inside a batch call failed; identifies the offender
    #[error("Batch sub-request {index} ({method} {url}) failed with status {status}")]
    Batch {
        index: usize,
        method: String,
        url: String,
        status: u16,
    },

    /// Malformed batch wire payload
    #[error("Invalid batch payload: {0}")]
    BatchCodec(String),

    /// Authentication / token acquisition failure
    #[error("Authentication error: {0}")]
    Auth(String),

    /// Configuration load/save failure
    #[error("Configuration error: {0}")]
    Config(String),

    /// Path could not be parsed as a local path or gs:// URL
    #[error("Invalid path: {0}")]
    InvalidPath(String),

    /// Local filesystem failure
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON (de)serialization failure
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Anything that does not fit the categories above
    #[error("{0}")]
    General(String),
}

impl Error {
    /// Whether this error is a transient transport condition worth retrying
    /// at the HTTP layer. Whole actions are never retried above transport.
    pub fn is_retryable(&self) -> bool {
        match self {
            Error::Http { status, .. } => *status >= 500 || *status == 429,
            Error::Network(_) => true,
            Error::Io(e) => matches!(
                e.kind(),
                std::io::ErrorKind::ConnectionReset
                    | std::io::ErrorKind::ConnectionRefused
                    | std::io::ErrorKind::TimedOut
                    | std::io::ErrorKind::Interrupted
            ),
            _ => false,
        }
    }

    /// Whether the remote reported 404 for the addressed resource
    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::NotFound(_)) || matches!(self, Error::Http { status: 404, .. })
    }
}
