#![allow(dead_code)]

use std::path::PathBuf;
use std::sync::Arc;

use knn_codec::config::CodecSettings;
use knn_codec::{
    AlgorithmFamily, ModelMetadata, ModelParameters, ModelStore, ModelTemplate, SpaceType,
    VectorDimension,
};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tempfile::TempDir;

/// Scratch directory holding segment files and a model directory.
pub struct TestWorkspace {
    pub dir: TempDir,
}

impl TestWorkspace {
    pub fn new() -> Self {
        Self {
            dir: TempDir::new().expect("Failed to create temp dir"),
        }
    }

    pub fn segment_path(&self, name: &str) -> PathBuf {
        self.dir
            .path()
            .join(CodecSettings::default().segment_file_name(name))
    }

    pub fn model_dir(&self) -> PathBuf {
        self.dir.path().join("models")
    }

    pub fn model_store(&self) -> Arc<ModelStore> {
        Arc::new(ModelStore::open(self.model_dir()))
    }
}

/// Deterministic pseudo-random vectors in `[-1, 1)`.
pub fn random_vectors(seed: u64, count: usize, dim: usize) -> Vec<Vec<f32>> {
    let mut rng = StdRng::seed_from_u64(seed);
    (0..count)
        .map(|_| (0..dim).map(|_| rng.random_range(-1.0f32..1.0)).collect())
        .collect()
}

pub fn f32_bytes(vector: &[f32]) -> Vec<u8> {
    vector.iter().flat_map(|v| v.to_le_bytes()).collect()
}

pub fn metadata(id: &str, dim: usize, space: SpaceType, family: AlgorithmFamily) -> ModelMetadata {
    ModelMetadata::new(id, VectorDimension::new(dim).unwrap(), space, family)
}

/// IVF model whose centroids are the first `k` random vectors.
pub fn ivf_model(id: &str, dim: usize, space: SpaceType, k: usize) -> ModelTemplate {
    let centroids = random_vectors(7, k, dim);
    ModelTemplate::trained(
        metadata(id, dim, space, AlgorithmFamily::Ivf),
        ModelParameters::Ivf { centroids },
    )
    .unwrap()
}

/// PQ model with `m` sub-quantizers of 16 centroids each.
pub fn pq_model(id: &str, dim: usize, space: SpaceType, m: usize) -> ModelTemplate {
    let sub_dim = dim / m;
    let codebooks = (0..m)
        .map(|i| random_vectors(100 + i as u64, 16, sub_dim))
        .collect();
    ModelTemplate::trained(
        metadata(id, dim, space, AlgorithmFamily::Pq),
        ModelParameters::Pq { codebooks },
    )
    .unwrap()
}

pub fn sq8_model(id: &str, dim: usize, space: SpaceType) -> ModelTemplate {
    ModelTemplate::trained(
        metadata(id, dim, space, AlgorithmFamily::Sq8),
        ModelParameters::Sq8 {
            min: vec![-1.0; dim],
            max: vec![1.0; dim],
        },
    )
    .unwrap()
}
