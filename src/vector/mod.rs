//! Vector primitives shared by the codec and the model store.
//!
//! Newtypes for ordinals and dimensions, the space-type tag written to the
//! field directory, and the metric kernels model transforms rely on.

mod distance;
mod types;

pub use distance::{
    assign_to_nearest_centroid, cosine_similarity, distance, inner_product, l1_distance,
    l2_squared, linf_distance, nearest_centroid,
};
pub use types::{BYTES_PER_F32, ClusterId, DocOrdinal, MAX_DIMENSION, SpaceType, VectorDimension};
