//! Model families and their build-time transforms.
//!
//! A trained model turns a raw f32 vector into a fixed-size code. The
//! transforms here are pure: they never touch the parameters they read,
//! so one model can serve any number of field writers at once.
//!
//! # Code layouts
//! - IVF: cluster id (u32, 1-based) followed by the f32 residual against
//!   that centroid, all little-endian.
//! - PQ: one byte per sub-quantizer, the index of the nearest sub-centroid.
//! - SQ8: one byte per dimension, linear between the per-dimension min/max.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::vector::{
    BYTES_PER_F32, ClusterId, SpaceType, assign_to_nearest_centroid, l2_squared,
};

/// Maximum number of centroids in one PQ sub-codebook (codes are one byte).
pub const PQ_MAX_CENTROIDS: usize = 256;

/// Number of quantization levels for SQ8.
const SQ8_LEVELS: f32 = 255.0;

/// Algorithm family tag stored in model metadata.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlgorithmFamily {
    Ivf,
    Pq,
    Sq8,
}

impl fmt::Display for AlgorithmFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Ivf => "ivf",
            Self::Pq => "pq",
            Self::Sq8 => "sq8",
        })
    }
}

/// Trained parameters of a model, serialized as the opaque parameter blob.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ModelParameters {
    /// Coarse quantizer: vectors are stored relative to their nearest centroid.
    Ivf { centroids: Vec<Vec<f32>> },

    /// Product quantizer: `codebooks[m][k]` is centroid `k` of sub-space `m`.
    Pq { codebooks: Vec<Vec<Vec<f32>>> },

    /// 8-bit scalar quantizer with per-dimension ranges.
    Sq8 { min: Vec<f32>, max: Vec<f32> },
}

impl ModelParameters {
    #[must_use]
    pub fn family(&self) -> AlgorithmFamily {
        match self {
            Self::Ivf { .. } => AlgorithmFamily::Ivf,
            Self::Pq { .. } => AlgorithmFamily::Pq,
            Self::Sq8 { .. } => AlgorithmFamily::Sq8,
        }
    }

    /// Checks that the parameters are well-formed for `dimension`.
    pub fn validate(&self, dimension: usize) -> Result<(), String> {
        match self {
            Self::Ivf { centroids } => {
                if centroids.is_empty() {
                    return Err("IVF model has no centroids".to_string());
                }
                for (i, centroid) in centroids.iter().enumerate() {
                    if centroid.len() != dimension {
                        return Err(format!(
                            "centroid {i} has dimension {}, expected {dimension}",
                            centroid.len()
                        ));
                    }
                    if centroid.iter().any(|v| !v.is_finite()) {
                        return Err(format!("centroid {i} has non-finite components"));
                    }
                }
            }
            Self::Pq { codebooks } => {
                let m = codebooks.len();
                if m == 0 || dimension % m != 0 {
                    return Err(format!(
                        "{m} sub-quantizers do not evenly divide dimension {dimension}"
                    ));
                }
                let sub_dim = dimension / m;
                for (i, codebook) in codebooks.iter().enumerate() {
                    if codebook.is_empty() || codebook.len() > PQ_MAX_CENTROIDS {
                        return Err(format!(
                            "sub-quantizer {i} has {} centroids, expected 1..={PQ_MAX_CENTROIDS}",
                            codebook.len()
                        ));
                    }
                    if codebook.iter().any(|c| c.len() != sub_dim) {
                        return Err(format!(
                            "sub-quantizer {i} has centroids whose dimension is not {sub_dim}"
                        ));
                    }
                }
            }
            Self::Sq8 { min, max } => {
                if min.len() != dimension || max.len() != dimension {
                    return Err(format!(
                        "SQ8 ranges have {}/{} entries, expected {dimension}",
                        min.len(),
                        max.len()
                    ));
                }
                for (i, (lo, hi)) in min.iter().zip(max.iter()).enumerate() {
                    if !lo.is_finite() || !hi.is_finite() || lo > hi {
                        return Err(format!("invalid SQ8 range [{lo}, {hi}] for dimension {i}"));
                    }
                }
            }
        }
        Ok(())
    }

    /// Number of bytes one encoded vector occupies.
    #[must_use]
    pub fn code_size(&self, dimension: usize) -> usize {
        match self {
            Self::Ivf { .. } => BYTES_PER_F32 + dimension * BYTES_PER_F32,
            Self::Pq { codebooks } => codebooks.len(),
            Self::Sq8 { .. } => dimension,
        }
    }

    /// Appends the code for `vector` to `out`.
    ///
    /// The caller guarantees `vector` has the model's dimension and that the
    /// parameters passed `validate`.
    pub fn encode_into(&self, space: SpaceType, vector: &[f32], out: &mut Vec<u8>) {
        match self {
            Self::Ivf { centroids } => {
                let cluster = assign_to_nearest_centroid(vector, centroids, space)
                    .unwrap_or_else(|| ClusterId::from_index(0));
                let centroid = &centroids[cluster.index()];
                out.extend_from_slice(&cluster.to_bytes());
                for (value, center) in vector.iter().zip(centroid.iter()) {
                    out.extend_from_slice(&(value - center).to_le_bytes());
                }
            }
            Self::Pq { codebooks } => {
                let sub_dim = vector.len() / codebooks.len();
                for (sub_vector, codebook) in vector.chunks_exact(sub_dim).zip(codebooks.iter()) {
                    let code = nearest_sub_centroid(sub_vector, codebook);
                    out.push(code as u8);
                }
            }
            Self::Sq8 { min, max } => {
                for ((value, lo), hi) in vector.iter().zip(min.iter()).zip(max.iter()) {
                    out.push(quantize_scalar(*value, *lo, *hi));
                }
            }
        }
    }

    /// Approximate inverse of `encode_into`.
    pub fn reconstruct(&self, dimension: usize, code: &[u8]) -> Result<Vec<f32>, String> {
        let expected = self.code_size(dimension);
        if code.len() != expected {
            return Err(format!(
                "code has {} bytes, expected {expected}",
                code.len()
            ));
        }

        match self {
            Self::Ivf { centroids } => {
                let id_bytes: [u8; 4] = code[..4].try_into().map_err(|_| "truncated code")?;
                let cluster = ClusterId::from_bytes(id_bytes)
                    .filter(|id| id.index() < centroids.len())
                    .ok_or_else(|| format!("invalid cluster id {}", u32::from_le_bytes(id_bytes)))?;
                let centroid = &centroids[cluster.index()];
                Ok(code[4..]
                    .chunks_exact(BYTES_PER_F32)
                    .zip(centroid.iter())
                    .map(|(bytes, center)| {
                        f32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]) + center
                    })
                    .collect())
            }
            Self::Pq { codebooks } => {
                let mut vector = Vec::with_capacity(dimension);
                for (m, (&index, codebook)) in code.iter().zip(codebooks.iter()).enumerate() {
                    let centroid = codebook.get(index as usize).ok_or_else(|| {
                        format!("code {index} out of range for sub-quantizer {m}")
                    })?;
                    vector.extend_from_slice(centroid);
                }
                Ok(vector)
            }
            Self::Sq8 { min, max } => Ok(code
                .iter()
                .zip(min.iter().zip(max.iter()))
                .map(|(&q, (lo, hi))| lo + (q as f32 / SQ8_LEVELS) * (hi - lo))
                .collect()),
        }
    }
}

/// Nearest sub-centroid by L2, independent of the field metric.
fn nearest_sub_centroid(sub_vector: &[f32], codebook: &[Vec<f32>]) -> usize {
    let mut best = 0;
    let mut best_distance = f32::INFINITY;
    for (i, centroid) in codebook.iter().enumerate() {
        let d = l2_squared(sub_vector, centroid);
        if d < best_distance {
            best_distance = d;
            best = i;
        }
    }
    best
}

fn quantize_scalar(value: f32, lo: f32, hi: f32) -> u8 {
    let range = hi - lo;
    if range <= 0.0 {
        return 0;
    }
    let scaled = ((value - lo) / range * SQ8_LEVELS).round();
    scaled.clamp(0.0, SQ8_LEVELS) as u8
}
