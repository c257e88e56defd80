//! Exit codes for CLI operations following Unix conventions.
//!
//! # Exit Code Semantics
//!
//! - `0`: Success
//! - `1`: General error
//! - `2`: Blocking error, the segment must be treated as absent
//! - `3-125`: Specific recoverable errors
//! - `126-255`: Reserved by shell

use crate::error::CodecError;

/// Standard exit codes for CLI operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ExitCode {
    /// Operation succeeded (code 0)
    Success = 0,

    /// Unspecified error occurred (code 1)
    GeneralError = 1,

    /// Corrupt segment or model blob (code 2)
    BlockingError = 2,

    /// Field or model not found (code 3)
    NotFound = 3,

    /// File I/O error (code 5)
    IoError = 5,

    /// Configuration error (code 6)
    ConfigError = 6,

    /// Model cannot be used for a field (code 7)
    ModelError = 7,
}

impl From<ExitCode> for i32 {
    fn from(code: ExitCode) -> i32 {
        code as i32
    }
}

impl ExitCode {
    /// Maps a codec error to the exit code scripts should branch on.
    pub fn from_error(error: &CodecError) -> Self {
        match error {
            CodecError::Corruption { .. } => ExitCode::BlockingError,

            CodecError::FieldNotFound { .. }
            | CodecError::ModelNotFound { .. }
            | CodecError::OutOfBounds { .. }
            | CodecError::NoVector { .. } => ExitCode::NotFound,

            CodecError::ModelNotTrained { .. }
            | CodecError::ModelMismatch { .. }
            | CodecError::InvalidModel { .. } => ExitCode::ModelError,

            CodecError::Io { .. } => ExitCode::IoError,
            CodecError::InvalidConfig { .. } => ExitCode::ConfigError,

            _ => ExitCode::GeneralError,
        }
    }

    #[must_use]
    pub fn is_blocking(&self) -> bool {
        matches!(self, ExitCode::BlockingError)
    }

    #[must_use]
    pub fn is_success(&self) -> bool {
        matches!(self, ExitCode::Success)
    }

    pub fn description(&self) -> &str {
        match self {
            ExitCode::Success => "Success",
            ExitCode::GeneralError => "General error",
            ExitCode::BlockingError => "Blocking error - segment is corrupt",
            ExitCode::NotFound => "Not found",
            ExitCode::IoError => "I/O error",
            ExitCode::ConfigError => "Configuration error",
            ExitCode::ModelError => "Model error",
        }
    }
}
