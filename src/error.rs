//! Error types for the vector segment codec
//!
//! One structured error enum covers the write path, the read path and the
//! model store. Every variant carries enough context (field, ordinal,
//! offsets, dimensions, model id) to diagnose a failure without looking at
//! raw bytes.

use std::path::PathBuf;
use thiserror::Error;

/// Main error type for codec operations
#[derive(Error, Debug)]
pub enum CodecError {
    /// Footer, header or directory failed validation
    #[error("Corrupt segment data in {context}: {reason}")]
    Corruption { context: String, reason: String },

    /// Model errors
    #[error("Model '{model_id}' not found in the model store")]
    ModelNotFound { model_id: String },

    #[error("Model '{model_id}' is not trained (state: {state})")]
    ModelNotTrained { model_id: String, state: String },

    #[error("Model '{model_id}' cannot be used for field '{field}': {detail}")]
    ModelMismatch {
        model_id: String,
        field: String,
        detail: String,
    },

    #[error("Model '{model_id}' has invalid parameters: {reason}")]
    InvalidModel { model_id: String, reason: String },

    /// Writer contract violations
    #[error("Out-of-order document {doc} for field '{field}': {reason}")]
    OrderingViolation {
        field: String,
        doc: u32,
        reason: String,
    },

    #[error("Field '{field}' is already registered in this segment")]
    DuplicateField { field: String },

    #[error("Segment writer is closed (state: {state})")]
    WriterClosed { state: String },

    #[error("Field writer for '{field}' has already been finished")]
    FieldSealed { field: String },

    #[error("Field '{field}' was aborted: {reason}")]
    FieldAborted { field: String, reason: String },

    #[error("Invalid definition for field '{field}': {reason}")]
    InvalidField { field: String, reason: String },

    #[error("Vector dimension mismatch for field '{field}': expected {expected}, got {actual}")]
    DimensionMismatch {
        field: String,
        expected: usize,
        actual: usize,
    },

    #[error("Invalid vector for field '{field}' at document {doc}: {reason}")]
    InvalidVector {
        field: String,
        doc: u32,
        reason: String,
    },

    /// Read-side misuse
    #[error("Field '{field}' not found in segment")]
    FieldNotFound { field: String },

    #[error("Document {doc} is out of bounds for field '{field}' (limit: {limit})")]
    OutOfBounds { field: String, doc: u32, limit: u32 },

    #[error("Document {doc} has no vector in field '{field}'")]
    NoVector { field: String, doc: u32 },

    /// File system errors
    #[error("I/O error on '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Configuration errors
    #[error("Invalid configuration: {reason}")]
    InvalidConfig { reason: String },
}

impl CodecError {
    pub fn corruption(context: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Corruption {
            context: context.into(),
            reason: reason.into(),
        }
    }

    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Errors raised while resolving or applying a model. Any of these
    /// aborts the segment being built.
    pub fn is_model_error(&self) -> bool {
        matches!(
            self,
            Self::ModelNotFound { .. }
                | Self::ModelNotTrained { .. }
                | Self::ModelMismatch { .. }
                | Self::InvalidModel { .. }
        )
    }

    /// A corrupt segment is treated exactly like a missing one.
    pub fn is_corruption(&self) -> bool {
        matches!(self, Self::Corruption { .. })
    }

    /// Get a stable status code for this error type.
    ///
    /// Returns a string identifier that can be used in JSON output
    /// for programmatic error handling.
    pub fn status_code(&self) -> String {
        match self {
            Self::Corruption { .. } => "CORRUPTION",
            Self::ModelNotFound { .. } => "MODEL_NOT_FOUND",
            Self::ModelNotTrained { .. } => "MODEL_NOT_TRAINED",
            Self::ModelMismatch { .. } => "MODEL_MISMATCH",
            Self::InvalidModel { .. } => "INVALID_MODEL",
            Self::OrderingViolation { .. } => "ORDERING_VIOLATION",
            Self::DuplicateField { .. } => "DUPLICATE_FIELD",
            Self::WriterClosed { .. } => "WRITER_CLOSED",
            Self::FieldSealed { .. } => "FIELD_SEALED",
            Self::FieldAborted { .. } => "FIELD_ABORTED",
            Self::InvalidField { .. } => "INVALID_FIELD",
            Self::DimensionMismatch { .. } => "DIMENSION_MISMATCH",
            Self::InvalidVector { .. } => "INVALID_VECTOR",
            Self::FieldNotFound { .. } => "FIELD_NOT_FOUND",
            Self::OutOfBounds { .. } => "OUT_OF_BOUNDS",
            Self::NoVector { .. } => "NO_VECTOR",
            Self::Io { .. } => "IO_ERROR",
            Self::Serialization(_) => "SERIALIZATION_ERROR",
            Self::InvalidConfig { .. } => "CONFIG_ERROR",
        }
        .to_string()
    }

    /// Get recovery suggestions for this error
    pub fn recovery_suggestions(&self) -> Vec<&'static str> {
        match self {
            Self::Corruption { .. } => vec![
                "Treat the segment as missing and rebuild it from source documents",
                "Check for disk errors or an interrupted flush",
            ],
            Self::ModelNotFound { .. } => vec![
                "Verify the model id and the configured model directory",
                "Train and persist the model before building segments that reference it",
            ],
            Self::ModelNotTrained { .. } => {
                vec!["Wait for training to complete, or retrain the model if it failed"]
            }
            Self::ModelMismatch { .. } => vec![
                "Use a model trained with the same dimension and space type as the field",
                "Rebuild the segment if the model was replaced after the segment was written",
            ],
            Self::InvalidModel { .. } => vec!["Retrain the model; its parameters are malformed"],
            Self::OrderingViolation { .. } => {
                vec!["Add vectors in the order documents were assigned to the segment"]
            }
            Self::DuplicateField { .. } => vec!["Register each vector field once per segment"],
            Self::WriterClosed { .. } | Self::FieldSealed { .. } => {
                vec!["Start a new segment writer for further documents"]
            }
            Self::FieldAborted { .. } => vec![
                "Fix the rejected vector and rebuild the segment from scratch",
            ],
            Self::InvalidField { .. } => vec![
                "Field names must be 1 to 65535 bytes",
                "Field dimensions must be between 1 and 16000",
            ],
            Self::DimensionMismatch { .. } | Self::InvalidVector { .. } => vec![
                "Ensure all vectors for a field come from the same embedding model",
                "Reject NaN and infinite components before indexing",
            ],
            Self::FieldNotFound { .. } => vec!["Check the field name against the segment directory"],
            Self::OutOfBounds { .. } | Self::NoVector { .. } => {
                vec!["Use document ordinals local to this segment"]
            }
            Self::Io { .. } => vec![
                "Check that the path exists and you have read/write permissions",
                "Check available disk space",
            ],
            Self::Serialization(_) => vec!["The data may be corrupted; rebuild it"],
            Self::InvalidConfig { .. } => vec!["Check .knn/settings.toml and KNN_* variables"],
        }
    }
}

pub type CodecResult<T> = Result<T, CodecError>;
