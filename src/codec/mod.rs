//! Segment vector codec: writers, reader and the on-disk format they share.

pub mod field_writer;
pub mod footer;
pub mod format;
pub mod reader;
pub mod segment_writer;

pub use field_writer::{FieldVectorWriter, MAX_FIELD_NAME_LEN};
pub use footer::{
    ChecksumWriter, FOOTER_LEN, FOOTER_MAGIC, Footer, read_and_validate_footer, write_footer,
};
pub use format::{FieldEntry, FormatVersion, HEADER_LEN, HEADER_MAGIC, SegmentHeader};
pub use reader::{FieldAccessor, SegmentReader};
pub use segment_writer::{SegmentSummary, SegmentWriter, WriterState};
