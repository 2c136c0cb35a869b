//! Output configuration and formatting

mod formatter;

pub use formatter::Formatter;

/// Global output flags, threaded into every command
#[derive(Debug, Clone, Copy, Default)]
pub struct OutputConfig {
    /// Strict JSON on stdout, no colors or progress
    pub json: bool,
    /// Suppress non-error output
    pub quiet: bool,
    /// Disable ANSI styling
    pub no_color: bool,
}
