//! Metric kernels used by model transforms.
//!
//! All kernels expect slices of equal length; callers validate dimensions
//! before reaching this module.

use crate::vector::types::{ClusterId, SpaceType};

/// Epsilon for floating-point comparisons.
const EPSILON: f32 = 1e-10;

/// Computes cosine similarity between two vectors.
///
/// Returns a value in `[-1, 1]`; zero vectors have similarity 0.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    debug_assert_eq!(a.len(), b.len(), "Vectors must have same dimension");

    let dot_product = inner_product(a, b);
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if norm_a < EPSILON || norm_b < EPSILON {
        0.0
    } else {
        dot_product / (norm_a * norm_b)
    }
}

pub fn inner_product(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b.iter()).map(|(x, y)| x * y).sum()
}

/// Squared euclidean distance.
pub fn l2_squared(a: &[f32], b: &[f32]) -> f32 {
    a.iter()
        .zip(b.iter())
        .map(|(x, y)| {
            let d = x - y;
            d * d
        })
        .sum()
}

pub fn l1_distance(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b.iter()).map(|(x, y)| (x - y).abs()).sum()
}

pub fn linf_distance(a: &[f32], b: &[f32]) -> f32 {
    a.iter()
        .zip(b.iter())
        .map(|(x, y)| (x - y).abs())
        .fold(0.0, f32::max)
}

/// Distance under `space` where smaller always means closer.
///
/// Similarity metrics are negated so callers can minimize uniformly.
pub fn distance(space: SpaceType, a: &[f32], b: &[f32]) -> f32 {
    match space {
        SpaceType::L2 => l2_squared(a, b),
        SpaceType::Cosine => 1.0 - cosine_similarity(a, b),
        SpaceType::InnerProduct => -inner_product(a, b),
        SpaceType::L1 => l1_distance(a, b),
        SpaceType::LInf => linf_distance(a, b),
    }
}

/// Index of the centroid closest to `vector` under `space`.
///
/// Ties resolve to the lowest index so the result is deterministic.
/// Returns `None` only when `centroids` is empty.
pub fn nearest_centroid<'a, I>(vector: &[f32], centroids: I, space: SpaceType) -> Option<usize>
where
    I: IntoIterator<Item = &'a [f32]>,
{
    let mut best: Option<(usize, f32)> = None;

    for (i, centroid) in centroids.into_iter().enumerate() {
        let d = distance(space, vector, centroid);
        match best {
            Some((_, best_distance)) if d >= best_distance => {}
            _ => best = Some((i, d)),
        }
    }

    best.map(|(i, _)| i)
}

/// Assigns a vector to the nearest centroid, as a 1-based `ClusterId`.
pub fn assign_to_nearest_centroid(
    vector: &[f32],
    centroids: &[Vec<f32>],
    space: SpaceType,
) -> Option<ClusterId> {
    nearest_centroid(vector, centroids.iter().map(Vec::as_slice), space).map(ClusterId::from_index)
}
