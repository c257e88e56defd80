//! Segment-level vector codec for an approximate nearest-neighbor index.
//!
//! Vector fields are written per segment by a [`SegmentWriter`], optionally
//! compressed through a trained [`ModelTemplate`], sealed with a checksummed
//! footer and read back through a memory-mapped [`SegmentReader`].

pub mod codec;
pub mod config;
pub mod display;
pub mod error;
pub mod io;
pub mod model;
pub mod vector;

// Explicit exports for better API clarity
pub use codec::{
    FieldAccessor, FieldEntry, FieldVectorWriter, Footer, FormatVersion, SegmentReader,
    SegmentSummary, SegmentWriter, WriterState,
};
pub use config::Settings;
pub use error::{CodecError, CodecResult};
pub use model::{
    AlgorithmFamily, FsModelRepository, MemoryModelRepository, ModelMetadata, ModelParameters,
    ModelReference, ModelRepository, ModelState, ModelStore, ModelTemplate,
};
pub use vector::{DocOrdinal, SpaceType, VectorDimension};
