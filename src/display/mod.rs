//! Terminal display utilities for CLI output.

pub mod tables;

pub use tables::{TableBuilder, create_directory_table, create_models_table};
