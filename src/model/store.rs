//! Model template store.
//!
//! The store is an explicit, injectable object: writers and readers receive
//! it rather than reaching for process-wide state, so several stores can live
//! in one process and tests can swap the backing repository.
//!
//! Loaded templates are cached as `Arc<ModelTemplate>`. Templates are
//! immutable, so a cached instance can be shared across any number of field
//! writers without locking.

use std::collections::HashMap;
use std::fmt;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use dashmap::DashMap;
use parking_lot::RwLock;
use tempfile::NamedTempFile;
use tracing::{debug, info};

use crate::config::ModelSettings;
use crate::error::{CodecError, CodecResult};
use crate::model::{ModelMetadata, ModelReference, ModelTemplate, digest_hex};
use crate::vector::{SpaceType, VectorDimension};

/// Longest accepted model id.
const MAX_MODEL_ID_LEN: usize = 128;

const METADATA_EXTENSION: &str = "json";
const PARAMS_EXTENSION: &str = "params";

/// A model as persisted: metadata plus the parameter blob once trained.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredModel {
    pub metadata: ModelMetadata,
    pub blob: Option<Vec<u8>>,
}

/// Backing storage for model artifacts.
pub trait ModelRepository: Send + Sync + fmt::Debug {
    /// Returns `Ok(None)` when no model with this id exists.
    fn fetch(&self, model_id: &str) -> CodecResult<Option<StoredModel>>;

    fn save(&self, model: &StoredModel) -> CodecResult<()>;

    /// Returns whether a model was removed.
    fn delete(&self, model_id: &str) -> CodecResult<bool>;

    /// Metadata of every stored model, sorted by id.
    fn list(&self) -> CodecResult<Vec<ModelMetadata>>;
}

/// Checks that a model id is safe to use as a file stem.
pub fn validate_model_id(model_id: &str) -> CodecResult<()> {
    let reason = if model_id.is_empty() {
        "model id cannot be empty"
    } else if model_id.len() > MAX_MODEL_ID_LEN {
        "model id is longer than 128 bytes"
    } else if !model_id
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
    {
        "model id may only contain ASCII letters, digits, '-' and '_'"
    } else {
        return Ok(());
    };

    Err(CodecError::InvalidModel {
        model_id: model_id.to_string(),
        reason: reason.to_string(),
    })
}

/// In-process repository, mainly for tests and embedders.
#[derive(Debug, Default)]
pub struct MemoryModelRepository {
    models: RwLock<HashMap<String, StoredModel>>,
}

impl MemoryModelRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ModelRepository for MemoryModelRepository {
    fn fetch(&self, model_id: &str) -> CodecResult<Option<StoredModel>> {
        Ok(self.models.read().get(model_id).cloned())
    }

    fn save(&self, model: &StoredModel) -> CodecResult<()> {
        self.models
            .write()
            .insert(model.metadata.model_id.clone(), model.clone());
        Ok(())
    }

    fn delete(&self, model_id: &str) -> CodecResult<bool> {
        Ok(self.models.write().remove(model_id).is_some())
    }

    fn list(&self) -> CodecResult<Vec<ModelMetadata>> {
        let mut all: Vec<ModelMetadata> = self
            .models
            .read()
            .values()
            .map(|m| m.metadata.clone())
            .collect();
        all.sort_by(|a, b| a.model_id.cmp(&b.model_id));
        Ok(all)
    }
}

/// Directory-backed repository.
///
/// Each model is two files: `<id>.json` with metadata and `<id>.params`
/// with the parameter blob. Both are written to a temp file and renamed
/// into place, so a reader never sees a half-written artifact.
#[derive(Debug, Clone)]
pub struct FsModelRepository {
    dir: PathBuf,
}

impl FsModelRepository {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn metadata_path(&self, model_id: &str) -> PathBuf {
        self.dir.join(format!("{model_id}.{METADATA_EXTENSION}"))
    }

    fn params_path(&self, model_id: &str) -> PathBuf {
        self.dir.join(format!("{model_id}.{PARAMS_EXTENSION}"))
    }

    fn write_atomically(&self, path: &Path, bytes: &[u8]) -> CodecResult<()> {
        let mut temp = NamedTempFile::new_in(&self.dir).map_err(|e| CodecError::io(&self.dir, e))?;
        temp.write_all(bytes)
            .and_then(|()| temp.as_file().sync_all())
            .map_err(|e| CodecError::io(temp.path(), e))?;
        temp.persist(path)
            .map_err(|e| CodecError::io(path, e.error))?;
        Ok(())
    }

    fn read_metadata(&self, path: &Path) -> CodecResult<ModelMetadata> {
        let json = fs::read_to_string(path).map_err(|e| CodecError::io(path, e))?;
        serde_json::from_str(&json).map_err(|e| {
            CodecError::corruption(path.display().to_string(), format!("invalid metadata: {e}"))
        })
    }
}

impl ModelRepository for FsModelRepository {
    fn fetch(&self, model_id: &str) -> CodecResult<Option<StoredModel>> {
        let metadata_path = self.metadata_path(model_id);
        if !metadata_path.exists() {
            return Ok(None);
        }

        let metadata = self.read_metadata(&metadata_path)?;
        if metadata.model_id != model_id {
            return Err(CodecError::corruption(
                metadata_path.display().to_string(),
                format!(
                    "metadata describes model '{}' but is stored as '{model_id}'",
                    metadata.model_id
                ),
            ));
        }

        let blob = if metadata.is_trained() {
            let params_path = self.params_path(model_id);
            let bytes = fs::read(&params_path).map_err(|e| CodecError::io(&params_path, e))?;
            Some(bytes)
        } else {
            None
        };

        Ok(Some(StoredModel { metadata, blob }))
    }

    fn save(&self, model: &StoredModel) -> CodecResult<()> {
        let model_id = &model.metadata.model_id;
        fs::create_dir_all(&self.dir).map_err(|e| CodecError::io(&self.dir, e))?;

        // Blob first: metadata that claims "trained" must never point at a missing blob.
        if let Some(blob) = &model.blob {
            self.write_atomically(&self.params_path(model_id), blob)?;
        }

        let json = serde_json::to_string_pretty(&model.metadata)
            .map_err(|e| CodecError::Serialization(format!("failed to encode metadata: {e}")))?;
        self.write_atomically(&self.metadata_path(model_id), json.as_bytes())
    }

    fn delete(&self, model_id: &str) -> CodecResult<bool> {
        let metadata_path = self.metadata_path(model_id);
        if !metadata_path.exists() {
            return Ok(false);
        }
        fs::remove_file(&metadata_path).map_err(|e| CodecError::io(&metadata_path, e))?;

        let params_path = self.params_path(model_id);
        if params_path.exists() {
            fs::remove_file(&params_path).map_err(|e| CodecError::io(&params_path, e))?;
        }
        Ok(true)
    }

    fn list(&self) -> CodecResult<Vec<ModelMetadata>> {
        if !self.dir.exists() {
            return Ok(Vec::new());
        }

        let entries = fs::read_dir(&self.dir).map_err(|e| CodecError::io(&self.dir, e))?;
        let mut all = Vec::new();
        for entry in entries {
            let path = entry.map_err(|e| CodecError::io(&self.dir, e))?.path();
            if path.extension().and_then(|e| e.to_str()) == Some(METADATA_EXTENSION) {
                all.push(self.read_metadata(&path)?);
            }
        }
        all.sort_by(|a, b| a.model_id.cmp(&b.model_id));
        Ok(all)
    }
}

/// Loads model templates by id, with a shared cache.
pub struct ModelStore {
    repository: Arc<dyn ModelRepository>,
    cache: DashMap<String, Arc<ModelTemplate>>,
    cache_enabled: bool,
}

impl ModelStore {
    pub fn new(repository: impl ModelRepository + 'static) -> Self {
        Self {
            repository: Arc::new(repository),
            cache: DashMap::new(),
            cache_enabled: true,
        }
    }

    pub fn in_memory() -> Self {
        Self::new(MemoryModelRepository::new())
    }

    /// Store backed by a model directory on disk.
    pub fn open(dir: impl Into<PathBuf>) -> Self {
        Self::new(FsModelRepository::new(dir))
    }

    pub fn from_settings(settings: &ModelSettings) -> Self {
        Self::open(&settings.model_dir).with_cache(settings.cache_enabled)
    }

    pub fn with_cache(mut self, enabled: bool) -> Self {
        self.cache_enabled = enabled;
        self
    }

    /// Loads a trained template.
    ///
    /// Fails with `ModelNotFound` if the id is unknown and `ModelNotTrained`
    /// unless the model finished training.
    pub fn load(&self, model_id: &str) -> CodecResult<Arc<ModelTemplate>> {
        validate_model_id(model_id)?;

        if let Some(cached) = self.cache.get(model_id) {
            debug!("Model '{model_id}' served from cache");
            return Ok(Arc::clone(cached.value()));
        }

        let stored = self
            .repository
            .fetch(model_id)?
            .ok_or_else(|| CodecError::ModelNotFound {
                model_id: model_id.to_string(),
            })?;

        if !stored.metadata.is_trained() {
            return Err(CodecError::ModelNotTrained {
                model_id: model_id.to_string(),
                state: stored.metadata.state.to_string(),
            });
        }

        let blob = stored.blob.ok_or_else(|| {
            CodecError::corruption(
                format!("model '{model_id}'"),
                "trained model has no parameter blob",
            )
        })?;
        let template = Arc::new(ModelTemplate::from_parts(stored.metadata, &blob)?);

        info!(
            "Loaded model '{}' ({}, dim={}, space={})",
            model_id,
            template.metadata().family,
            template.dimension(),
            template.space_type()
        );

        if self.cache_enabled {
            self.cache
                .insert(model_id.to_string(), Arc::clone(&template));
        }
        Ok(template)
    }

    /// Loads a template and checks it fits the field being built.
    pub fn load_for_field(
        &self,
        model_id: &str,
        field: &str,
        dimension: VectorDimension,
        space_type: SpaceType,
    ) -> CodecResult<Arc<ModelTemplate>> {
        let template = self.load(model_id)?;
        template.check_compatible(field, dimension, space_type)?;
        Ok(template)
    }

    /// Resolves a segment's model reference, checking the parameter digest.
    pub fn resolve(&self, field: &str, reference: &ModelReference) -> CodecResult<Arc<ModelTemplate>> {
        let template = self.load(&reference.model_id)?;
        if template.digest() != &reference.digest {
            return Err(CodecError::ModelMismatch {
                model_id: reference.model_id.clone(),
                field: field.to_string(),
                detail: format!(
                    "segment was built with parameters {} but the store holds {}",
                    reference.digest_hex(),
                    digest_hex(template.digest())
                ),
            });
        }
        Ok(template)
    }

    /// Metadata for any model, trained or not.
    pub fn metadata(&self, model_id: &str) -> CodecResult<ModelMetadata> {
        validate_model_id(model_id)?;
        self.repository
            .fetch(model_id)?
            .map(|stored| stored.metadata)
            .ok_or_else(|| CodecError::ModelNotFound {
                model_id: model_id.to_string(),
            })
    }

    /// Persists a trained template, replacing any previous version.
    pub fn put(&self, template: &ModelTemplate) -> CodecResult<()> {
        validate_model_id(template.model_id())?;
        let stored = StoredModel {
            metadata: template.metadata().clone(),
            blob: Some(template.parameter_blob()?),
        };
        self.repository.save(&stored)?;
        self.evict(template.model_id());
        Ok(())
    }

    /// Records a model that has not finished training.
    pub fn register(&self, metadata: ModelMetadata) -> CodecResult<()> {
        validate_model_id(&metadata.model_id)?;
        if metadata.is_trained() {
            return Err(CodecError::InvalidModel {
                model_id: metadata.model_id,
                reason: "trained models must be stored with their parameters via put()"
                    .to_string(),
            });
        }
        let model_id = metadata.model_id.clone();
        self.repository.save(&StoredModel {
            metadata,
            blob: None,
        })?;
        self.evict(&model_id);
        Ok(())
    }

    pub fn delete(&self, model_id: &str) -> CodecResult<bool> {
        validate_model_id(model_id)?;
        self.evict(model_id);
        self.repository.delete(model_id)
    }

    pub fn list(&self) -> CodecResult<Vec<ModelMetadata>> {
        self.repository.list()
    }

    pub fn evict(&self, model_id: &str) {
        self.cache.remove(model_id);
    }

    pub fn clear_cache(&self) {
        self.cache.clear();
    }

    #[must_use]
    pub fn cached_count(&self) -> usize {
        self.cache.len()
    }
}

impl fmt::Debug for ModelStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModelStore")
            .field("repository", &self.repository)
            .field("cached", &self.cache.len())
            .field("cache_enabled", &self.cache_enabled)
            .finish()
    }
}
