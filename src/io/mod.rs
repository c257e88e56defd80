//! Output handling for the CLI: exit codes and the JSON envelope.

pub mod exit_code;
pub mod format;

pub use exit_code::ExitCode;
pub use format::{ErrorDetails, JsonResponse, OutputFormat};
