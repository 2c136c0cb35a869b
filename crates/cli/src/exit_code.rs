//! Process exit codes
//!
//! Stable numeric codes so scripts can branch on failure categories.

use gs_core::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ExitCode {
    Success = 0,
    GeneralError = 1,
    UsageError = 2,
    NotFound = 3,
    NetworkError = 4,
    ChecksumError = 5,
}

impl ExitCode {
    /// Map an engine error to its exit category
    pub fn from_error(error: &Error) -> Self {
        match error {
            Error::NotFound(_) => ExitCode::NotFound,
            Error::Network(_) | Error::Http { .. } => ExitCode::NetworkError,
            Error::ChecksumMismatch { .. } => ExitCode::ChecksumError,
            Error::InvalidPath(_) => ExitCode::UsageError,
            _ => ExitCode::GeneralError,
        }
    }

    pub fn code(self) -> u8 {
        self as u8
    }
}

impl From<ExitCode> for std::process::ExitCode {
    fn from(code: ExitCode) -> Self {
        std::process::ExitCode::from(code.code())
    }
}
