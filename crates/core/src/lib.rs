//! gs-core: Core library for the gs object storage CLI
//!
//! This crate provides the pieces the transfer engine and CLI share:
//! - Error taxonomy
//! - Configuration management
//! - gs:// path parsing
//! - Transport retry with backoff
//! - The persisted single-slot upload-session cache
//!
//! It is independent of any HTTP client or remote protocol, so the engine
//! crate can be tested against stub collaborators.

pub mod config;
pub mod error;
pub mod path;
pub mod retry;
pub mod sessions;

pub use config::{Config, ConfigManager};
pub use error::{Error, Result};
pub use path::{GsUrl, ParsedPath, parse_gs_url, parse_path};
pub use retry::{RetryBuilder, RetryConfig, is_retryable_error, retry_with_backoff};
pub use sessions::{FileSessionCache, MemorySessionCache, SessionCache, UploadSessionRecord};
