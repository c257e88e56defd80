//! Model templates: trained quantization/clustering artifacts.
//!
//! A model is trained elsewhere and persisted independently of any segment.
//! Segments only keep a [`ModelReference`] (id plus SHA-256 of the parameter
//! blob); the parameters themselves are resolved through a [`ModelStore`].

mod algorithm;
mod store;

pub use algorithm::{AlgorithmFamily, ModelParameters, PQ_MAX_CENTROIDS};
pub use store::{
    FsModelRepository, MemoryModelRepository, ModelRepository, ModelStore, StoredModel,
    validate_model_id,
};

use std::fmt;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::{CodecError, CodecResult};
use crate::vector::{SpaceType, VectorDimension};

/// Size of a parameter-blob digest in bytes.
pub const DIGEST_LEN: usize = 32;

/// SHA-256 digest of a model's parameter blob.
pub type BlobDigest = [u8; DIGEST_LEN];

/// Computes the digest recorded in metadata and in segment directories.
pub fn blob_digest(blob: &[u8]) -> BlobDigest {
    let mut hasher = Sha256::new();
    hasher.update(blob);
    let mut digest = [0u8; DIGEST_LEN];
    digest.copy_from_slice(&hasher.finalize());
    digest
}

/// Lower-case hex rendering of a digest.
pub fn digest_hex(digest: &BlobDigest) -> String {
    digest.iter().map(|b| format!("{b:02x}")).collect()
}

/// Training lifecycle of a model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModelState {
    Created,
    Training,
    Trained,
    Failed,
}

impl fmt::Display for ModelState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Created => "created",
            Self::Training => "training",
            Self::Trained => "trained",
            Self::Failed => "failed",
        })
    }
}

/// Metadata persisted alongside every model, trained or not.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelMetadata {
    pub model_id: String,
    pub dimension: VectorDimension,
    pub space_type: SpaceType,
    pub family: AlgorithmFamily,
    pub state: ModelState,

    #[serde(default)]
    pub description: String,

    /// RFC 3339 creation time
    pub created_at: String,

    /// Training failure message, empty unless `state` is `failed`
    #[serde(default)]
    pub error: String,

    /// Hex SHA-256 of the parameter blob, absent until trained
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params_digest: Option<String>,
}

impl ModelMetadata {
    /// Metadata for a model that has been registered but not trained yet.
    pub fn new(
        model_id: impl Into<String>,
        dimension: VectorDimension,
        space_type: SpaceType,
        family: AlgorithmFamily,
    ) -> Self {
        Self {
            model_id: model_id.into(),
            dimension,
            space_type,
            family,
            state: ModelState::Created,
            description: String::new(),
            created_at: chrono::Utc::now().to_rfc3339(),
            error: String::new(),
            params_digest: None,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_state(mut self, state: ModelState) -> Self {
        self.state = state;
        self
    }

    #[must_use]
    pub fn is_trained(&self) -> bool {
        self.state == ModelState::Trained
    }
}

/// Weak relation from a field to the model that encoded it.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ModelReference {
    pub model_id: String,
    pub digest: BlobDigest,
}

impl ModelReference {
    pub fn digest_hex(&self) -> String {
        digest_hex(&self.digest)
    }
}

impl fmt::Display for ModelReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let hex = self.digest_hex();
        write!(f, "{}@{}", self.model_id, &hex[..12])
    }
}

/// A trained model, ready to transform vectors.
///
/// Templates are immutable once built and are shared as `Arc<ModelTemplate>`.
#[derive(Debug, Clone, PartialEq)]
pub struct ModelTemplate {
    metadata: ModelMetadata,
    parameters: ModelParameters,
    digest: BlobDigest,
}

impl ModelTemplate {
    /// Builds a trained template from freshly estimated parameters.
    ///
    /// This is the hand-off point from a trainer: the metadata is marked
    /// trained and stamped with the digest of the encoded parameters.
    pub fn trained(mut metadata: ModelMetadata, parameters: ModelParameters) -> CodecResult<Self> {
        metadata.state = ModelState::Trained;
        metadata.family = parameters.family();
        metadata.error.clear();

        let blob = encode_parameters(&metadata.model_id, &parameters)?;
        let digest = blob_digest(&blob);
        metadata.params_digest = Some(digest_hex(&digest));

        Self::validated(metadata, parameters, digest)
    }

    /// Rebuilds a template from persisted metadata and parameter blob.
    pub fn from_parts(metadata: ModelMetadata, blob: &[u8]) -> CodecResult<Self> {
        if !metadata.is_trained() {
            return Err(CodecError::ModelNotTrained {
                model_id: metadata.model_id.clone(),
                state: metadata.state.to_string(),
            });
        }

        let digest = blob_digest(blob);
        if metadata.params_digest.as_deref() != Some(digest_hex(&digest).as_str()) {
            return Err(CodecError::corruption(
                format!("model '{}'", metadata.model_id),
                "parameter blob digest does not match metadata",
            ));
        }

        let config = bincode::config::standard();
        let (parameters, _): (ModelParameters, usize) =
            bincode::serde::decode_from_slice(blob, config).map_err(|e| {
                CodecError::InvalidModel {
                    model_id: metadata.model_id.clone(),
                    reason: format!("failed to decode parameters: {e}"),
                }
            })?;

        if parameters.family() != metadata.family {
            return Err(CodecError::InvalidModel {
                model_id: metadata.model_id.clone(),
                reason: format!(
                    "metadata declares family {} but parameters are {}",
                    metadata.family,
                    parameters.family()
                ),
            });
        }

        Self::validated(metadata, parameters, digest)
    }

    fn validated(
        metadata: ModelMetadata,
        parameters: ModelParameters,
        digest: BlobDigest,
    ) -> CodecResult<Self> {
        parameters
            .validate(metadata.dimension.get())
            .map_err(|reason| CodecError::InvalidModel {
                model_id: metadata.model_id.clone(),
                reason,
            })?;

        Ok(Self {
            metadata,
            parameters,
            digest,
        })
    }

    pub fn model_id(&self) -> &str {
        &self.metadata.model_id
    }

    pub fn metadata(&self) -> &ModelMetadata {
        &self.metadata
    }

    pub fn parameters(&self) -> &ModelParameters {
        &self.parameters
    }

    pub fn dimension(&self) -> VectorDimension {
        self.metadata.dimension
    }

    pub fn space_type(&self) -> SpaceType {
        self.metadata.space_type
    }

    pub fn digest(&self) -> &BlobDigest {
        &self.digest
    }

    /// Encodes the parameters into the opaque blob that is persisted.
    pub fn parameter_blob(&self) -> CodecResult<Vec<u8>> {
        encode_parameters(self.model_id(), &self.parameters)
    }

    pub fn reference(&self) -> ModelReference {
        ModelReference {
            model_id: self.metadata.model_id.clone(),
            digest: self.digest,
        }
    }

    /// Size in bytes of one transformed vector.
    #[must_use]
    pub fn code_size(&self) -> usize {
        self.parameters.code_size(self.dimension().get())
    }

    /// Fails with `ModelMismatch` unless the field agrees on dimension and metric.
    pub fn check_compatible(
        &self,
        field: &str,
        dimension: VectorDimension,
        space_type: SpaceType,
    ) -> CodecResult<()> {
        let detail = if dimension != self.dimension() {
            format!(
                "dimension mismatch: field has {dimension}, model has {}",
                self.dimension()
            )
        } else if space_type != self.space_type() {
            format!(
                "space type mismatch: field uses {space_type}, model uses {}",
                self.space_type()
            )
        } else {
            return Ok(());
        };

        Err(CodecError::ModelMismatch {
            model_id: self.model_id().to_string(),
            field: field.to_string(),
            detail,
        })
    }

    /// Transforms a raw vector into the model's code.
    ///
    /// Pure and deterministic for a given parameter blob.
    pub fn apply(&self, raw: &[f32]) -> CodecResult<Vec<u8>> {
        let mut code = Vec::with_capacity(self.code_size());
        self.apply_into(raw, &mut code)?;
        Ok(code)
    }

    /// Appends the code for `raw` to `out`.
    pub fn apply_into(&self, raw: &[f32], out: &mut Vec<u8>) -> CodecResult<()> {
        self.dimension().validate_vector(self.model_id(), raw)?;
        self.parameters.encode_into(self.space_type(), raw, out);
        Ok(())
    }

    /// Approximate inverse of `apply`.
    pub fn reconstruct(&self, code: &[u8]) -> CodecResult<Vec<f32>> {
        self.parameters
            .reconstruct(self.dimension().get(), code)
            .map_err(|reason| CodecError::InvalidModel {
                model_id: self.model_id().to_string(),
                reason,
            })
    }
}

fn encode_parameters(model_id: &str, parameters: &ModelParameters) -> CodecResult<Vec<u8>> {
    bincode::serde::encode_to_vec(parameters, bincode::config::standard()).map_err(|e| {
        CodecError::Serialization(format!("failed to encode parameters of model '{model_id}': {e}"))
    })
}
