//! Type-safe wrappers for vector field metadata.
//!
//! Newtypes keep document ordinals, cluster ids and dimensions from being
//! mixed up with the raw integers that end up in the on-disk format.

use std::fmt;
use std::num::NonZeroU32;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{CodecError, CodecResult};

/// Largest dimensionality a vector field may declare.
pub const MAX_DIMENSION: usize = 16_000;

/// Number of bytes per f32 value.
pub const BYTES_PER_F32: usize = 4;

/// Document ordinal local to one segment.
///
/// Ordinals start at zero, so this wraps a plain u32 rather than NonZeroU32.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DocOrdinal(u32);

impl DocOrdinal {
    #[must_use]
    pub const fn new(ordinal: u32) -> Self {
        Self(ordinal)
    }

    #[must_use]
    pub const fn get(&self) -> u32 {
        self.0
    }

    /// Converts to little-endian bytes for storage.
    #[must_use]
    pub fn to_bytes(&self) -> [u8; 4] {
        self.0.to_le_bytes()
    }

    #[must_use]
    pub fn from_bytes(bytes: [u8; 4]) -> Self {
        Self(u32::from_le_bytes(bytes))
    }
}

impl From<u32> for DocOrdinal {
    fn from(ordinal: u32) -> Self {
        Self(ordinal)
    }
}

impl fmt::Display for DocOrdinal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Type-safe wrapper for IVF cluster ids.
///
/// Clusters are identified by non-zero ids; id `n` refers to centroid `n - 1`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ClusterId(NonZeroU32);

impl ClusterId {
    /// Returns `None` if the provided id is zero.
    #[must_use]
    pub fn new(id: u32) -> Option<Self> {
        NonZeroU32::new(id).map(Self)
    }

    /// Cluster id for the centroid at `index` in a centroid list.
    #[must_use]
    pub fn from_index(index: usize) -> Self {
        Self(NonZeroU32::MIN.saturating_add(index as u32))
    }

    #[must_use]
    pub fn get(&self) -> u32 {
        self.0.get()
    }

    /// Position of the centroid in the centroid list.
    #[must_use]
    pub fn index(&self) -> usize {
        (self.0.get() - 1) as usize
    }

    #[must_use]
    pub fn to_bytes(&self) -> [u8; 4] {
        self.0.get().to_le_bytes()
    }

    /// Returns `None` if the bytes represent zero.
    #[must_use]
    pub fn from_bytes(bytes: [u8; 4]) -> Option<Self> {
        Self::new(u32::from_le_bytes(bytes))
    }
}

/// Type-safe wrapper for vector dimensions.
///
/// Valid dimensions are in `1..=MAX_DIMENSION`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "usize", into = "usize")]
pub struct VectorDimension(usize);

impl VectorDimension {
    /// Returns `None` if the dimension is zero or above `MAX_DIMENSION`.
    #[must_use]
    pub fn new(dim: usize) -> Option<Self> {
        (1..=MAX_DIMENSION).contains(&dim).then_some(Self(dim))
    }

    #[must_use]
    pub const fn get(&self) -> usize {
        self.0
    }

    /// Size of one raw f32 vector of this dimension.
    #[must_use]
    pub const fn raw_byte_size(&self) -> usize {
        self.0 * BYTES_PER_F32
    }

    /// Validates that a vector destined for `field` has this dimension.
    pub fn validate_vector(&self, field: &str, vector: &[f32]) -> CodecResult<()> {
        if vector.len() != self.0 {
            return Err(CodecError::DimensionMismatch {
                field: field.to_string(),
                expected: self.0,
                actual: vector.len(),
            });
        }
        Ok(())
    }
}

impl TryFrom<usize> for VectorDimension {
    type Error = String;

    fn try_from(dim: usize) -> Result<Self, Self::Error> {
        Self::new(dim).ok_or_else(|| format!("dimension must be in 1..={MAX_DIMENSION}, got {dim}"))
    }
}

impl From<VectorDimension> for usize {
    fn from(dim: VectorDimension) -> Self {
        dim.0
    }
}

impl fmt::Display for VectorDimension {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Similarity metric of a vector field.
///
/// The discriminant is the tag written to the field directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum SpaceType {
    #[serde(rename = "l2")]
    L2 = 0,
    #[serde(rename = "cosinesimil")]
    Cosine = 1,
    #[serde(rename = "innerproduct")]
    InnerProduct = 2,
    #[serde(rename = "l1")]
    L1 = 3,
    #[serde(rename = "linf")]
    LInf = 4,
}

impl SpaceType {
    pub const ALL: [SpaceType; 5] = [
        SpaceType::L2,
        SpaceType::Cosine,
        SpaceType::InnerProduct,
        SpaceType::L1,
        SpaceType::LInf,
    ];

    #[must_use]
    pub const fn tag(self) -> u8 {
        self as u8
    }

    #[must_use]
    pub fn from_tag(tag: u8) -> Option<Self> {
        Self::ALL.into_iter().find(|space| space.tag() == tag)
    }

    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::L2 => "l2",
            Self::Cosine => "cosinesimil",
            Self::InnerProduct => "innerproduct",
            Self::L1 => "l1",
            Self::LInf => "linf",
        }
    }
}

impl fmt::Display for SpaceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for SpaceType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lowered = s.to_ascii_lowercase();
        match lowered.as_str() {
            "cosine" => Ok(Self::Cosine),
            "ip" | "dot" => Ok(Self::InnerProduct),
            _ => Self::ALL
                .into_iter()
                .find(|space| space.name() == lowered)
                .ok_or_else(|| format!("unknown space type '{s}'")),
        }
    }
}
