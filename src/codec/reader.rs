//! Read side of the segment vector format.
//!
//! A `SegmentReader` only exists once the footer, header and field directory
//! have been validated, so every accessor it hands out can slice the file
//! view without re-checking it.

use std::collections::HashMap;
use std::fs::File;
use std::ops::Deref;
use std::path::Path;
use std::sync::Arc;

use memmap2::Mmap;
use rayon::prelude::*;
use tracing::{debug, info, warn};

use crate::codec::footer::{FOOTER_LEN, Footer, read_and_validate_footer};
use crate::codec::format::{
    DOC_ID_BYTES, FieldEntry, FormatVersion, HEADER_LEN, SegmentHeader, decode_directory,
    validate_layout,
};
use crate::error::{CodecError, CodecResult};
use crate::model::{ModelReference, ModelStore, ModelTemplate};
use crate::vector::{BYTES_PER_F32, DocOrdinal, SpaceType, VectorDimension};

/// Backing storage of an opened segment.
enum SegmentBytes {
    Mapped(Mmap),
    Owned(Vec<u8>),
}

impl Deref for SegmentBytes {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        match self {
            Self::Mapped(mmap) => &mmap[..],
            Self::Owned(bytes) => bytes.as_slice(),
        }
    }
}

/// Validated, immutable view of a sealed segment.
///
/// Safe to share across query threads; no accessor allocates beyond the
/// accessor itself.
pub struct SegmentReader {
    source: String,
    bytes: SegmentBytes,
    header: SegmentHeader,
    footer: Footer,
    entries: Vec<FieldEntry>,
    by_name: HashMap<String, usize>,
}

impl SegmentReader {
    /// Memory-maps and validates a segment file.
    ///
    /// Any validation failure is returned as `Corruption`; callers should
    /// treat such a segment as absent.
    pub fn open(path: impl AsRef<Path>) -> CodecResult<Self> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|e| CodecError::io(path, e))?;
        let len = file.metadata().map_err(|e| CodecError::io(path, e))?.len();

        let bytes = if len == 0 {
            SegmentBytes::Owned(Vec::new())
        } else {
            // SAFETY: segment files are immutable once published by rename;
            // nothing writes to them while they are mapped.
            let mmap = unsafe { Mmap::map(&file) }.map_err(|e| CodecError::io(path, e))?;
            SegmentBytes::Mapped(mmap)
        };

        Self::validate(path.display().to_string(), bytes)
    }

    /// Validates a segment held in memory.
    pub fn from_bytes(bytes: Vec<u8>) -> CodecResult<Self> {
        Self::validate("<memory>".to_string(), SegmentBytes::Owned(bytes))
    }

    fn validate(source: String, bytes: SegmentBytes) -> CodecResult<Self> {
        match Self::parse(&source, &bytes) {
            Ok((header, footer, entries)) => {
                let by_name = entries
                    .iter()
                    .enumerate()
                    .map(|(i, e)| (e.name.clone(), i))
                    .collect();
                info!(
                    "Opened segment {source} ({}, {} fields, {} bytes)",
                    header.version,
                    entries.len(),
                    bytes.len()
                );
                Ok(Self {
                    source,
                    bytes,
                    header,
                    footer,
                    entries,
                    by_name,
                })
            }
            Err(e) => {
                warn!("Rejected segment {source}: {e}");
                Err(e)
            }
        }
    }

    fn parse(
        source: &str,
        data: &[u8],
    ) -> CodecResult<(SegmentHeader, Footer, Vec<FieldEntry>)> {
        let footer = read_and_validate_footer(data, source)?;

        if data.len() < HEADER_LEN + FOOTER_LEN {
            return Err(CodecError::corruption(
                source,
                format!("file has {} bytes, too small to hold a header", data.len()),
            ));
        }
        let header = SegmentHeader::from_bytes(&data[..HEADER_LEN], source)?;
        if header.version != footer.version {
            return Err(CodecError::corruption(
                source,
                format!(
                    "header version {} disagrees with footer version {}",
                    header.version, footer.version
                ),
            ));
        }

        let body_end = (data.len() - FOOTER_LEN) as u64;
        let data_start = header.data_start();
        if data_start > body_end {
            return Err(CodecError::corruption(
                source,
                format!(
                    "directory of {} bytes runs past the end of the file",
                    header.directory_len
                ),
            ));
        }

        let directory = &data[HEADER_LEN..data_start as usize];
        let entries = decode_directory(header.version, directory, header.field_count, source)?;
        validate_layout(&entries, data_start, body_end, source)?;

        debug!("Segment {source}: directory holds {} fields", entries.len());
        Ok((header, footer, entries))
    }

    /// Name the segment was opened from, used in error context.
    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn version(&self) -> FormatVersion {
        self.header.version
    }

    pub fn footer(&self) -> Footer {
        self.footer
    }

    /// Total file length in bytes.
    #[must_use]
    pub fn file_len(&self) -> usize {
        self.bytes.len()
    }

    /// Field names in directory order.
    pub fn field_names(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|e| e.name.as_str())
    }

    pub fn entries(&self) -> &[FieldEntry] {
        &self.entries
    }

    /// Random access to one field's vectors.
    pub fn get_field(&self, name: &str) -> CodecResult<FieldAccessor<'_>> {
        let index = self
            .by_name
            .get(name)
            .copied()
            .ok_or_else(|| CodecError::FieldNotFound {
                field: name.to_string(),
            })?;
        Ok(self.accessor(&self.entries[index]))
    }

    fn accessor<'a>(&'a self, entry: &'a FieldEntry) -> FieldAccessor<'a> {
        // Bounds were checked by validate_layout when the reader was built.
        let start = entry.offset as usize;
        let payload = &self.bytes[start..start + entry.length as usize];
        let (layout, vectors) = match self.header.version {
            FormatVersion::V1 => (DocLayout::Dense, payload),
            FormatVersion::V2 => {
                let (doc_table, vectors) =
                    payload.split_at(entry.doc_table_len(FormatVersion::V2) as usize);
                (DocLayout::Sparse { doc_table }, vectors)
            }
        };
        FieldAccessor {
            entry,
            layout,
            payload,
            vectors,
        }
    }

    /// Recomputes the digest of every field in parallel.
    ///
    /// The footer checksum already covers the whole file; this catches a
    /// field whose payload was replaced together with a recomputed footer.
    pub fn verify_fields(&self) -> CodecResult<()> {
        self.entries
            .par_iter()
            .try_for_each(|entry| self.accessor(entry).verify())
    }
}

impl std::fmt::Debug for SegmentReader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SegmentReader")
            .field("source", &self.source)
            .field("version", &self.header.version)
            .field("len", &self.bytes.len())
            .field("fields", &self.entries.len())
            .finish()
    }
}

/// How document ordinals map to vector slots.
#[derive(Debug, Clone, Copy)]
enum DocLayout<'a> {
    /// v1: slot == ordinal
    Dense,
    /// v2: sorted little-endian u32 table, one entry per slot
    Sparse { doc_table: &'a [u8] },
}

impl DocLayout<'_> {
    fn doc_at(&self, slot: usize) -> DocOrdinal {
        match self {
            Self::Dense => DocOrdinal::new(slot as u32),
            Self::Sparse { doc_table } => {
                let at = slot * DOC_ID_BYTES;
                let b = &doc_table[at..at + DOC_ID_BYTES];
                DocOrdinal::from_bytes([b[0], b[1], b[2], b[3]])
            }
        }
    }
}

/// Read-only view of one field inside a `SegmentReader`.
#[derive(Debug, Clone, Copy)]
pub struct FieldAccessor<'a> {
    entry: &'a FieldEntry,
    layout: DocLayout<'a>,
    payload: &'a [u8],
    vectors: &'a [u8],
}

impl<'a> FieldAccessor<'a> {
    pub fn name(&self) -> &'a str {
        &self.entry.name
    }

    pub fn entry(&self) -> &'a FieldEntry {
        self.entry
    }

    pub fn dimension(&self) -> VectorDimension {
        self.entry.dimension
    }

    pub fn space_type(&self) -> SpaceType {
        self.entry.space_type
    }

    pub fn model_reference(&self) -> Option<&'a ModelReference> {
        self.entry.model.as_ref()
    }

    /// Bytes per stored vector.
    #[must_use]
    pub fn stride(&self) -> usize {
        self.entry.stride as usize
    }

    /// Number of documents with a vector.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entry.vector_count as usize
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Highest document ordinal with a vector.
    #[must_use]
    pub fn max_doc(&self) -> Option<DocOrdinal> {
        self.len().checked_sub(1).map(|last| self.layout.doc_at(last))
    }

    /// Stored bytes for `doc`, borrowed from the file view.
    ///
    /// Ordinals past the last document fail with `OutOfBounds`; ordinals
    /// inside the range that were skipped at write time fail with `NoVector`.
    pub fn vector_at(&self, doc: u32) -> CodecResult<&'a [u8]> {
        let slot = self.slot_of(doc)?;
        let stride = self.stride();
        Ok(&self.vectors[slot * stride..(slot + 1) * stride])
    }

    pub fn contains(&self, doc: u32) -> bool {
        self.slot_of(doc).is_ok()
    }

    fn slot_of(&self, doc: u32) -> CodecResult<usize> {
        let out_of_bounds = |limit: u32| CodecError::OutOfBounds {
            field: self.entry.name.clone(),
            doc,
            limit,
        };

        let Some(max_doc) = self.max_doc() else {
            return Err(out_of_bounds(0));
        };
        if doc > max_doc.get() {
            return Err(out_of_bounds(max_doc.get().saturating_add(1)));
        }

        match self.layout {
            DocLayout::Dense => Ok(doc as usize),
            DocLayout::Sparse { .. } => {
                let (mut lo, mut hi) = (0usize, self.len());
                while lo < hi {
                    let mid = lo + (hi - lo) / 2;
                    let found = self.layout.doc_at(mid).get();
                    if found == doc {
                        return Ok(mid);
                    }
                    if found < doc {
                        lo = mid + 1;
                    } else {
                        hi = mid;
                    }
                }
                Err(CodecError::NoVector {
                    field: self.entry.name.clone(),
                    doc,
                })
            }
        }
    }

    /// All `(doc, bytes)` pairs in ordinal order.
    pub fn iter(&self) -> impl Iterator<Item = (DocOrdinal, &'a [u8])> + use<'a> {
        let this = *self;
        (0..this.len()).map(move |slot| {
            let stride = this.stride();
            (
                this.layout.doc_at(slot),
                &this.vectors[slot * stride..(slot + 1) * stride],
            )
        })
    }

    /// Decodes the raw f32 vector of `doc`. Only valid for fields stored
    /// without a model; model codes need `resolve_model` and `reconstruct`.
    pub fn vector_f32_at(&self, doc: u32) -> CodecResult<Vec<f32>> {
        if let Some(reference) = self.model_reference() {
            return Err(CodecError::ModelMismatch {
                model_id: reference.model_id.clone(),
                field: self.entry.name.clone(),
                detail: "field stores model codes, not raw vectors".to_string(),
            });
        }
        let bytes = self.vector_at(doc)?;
        Ok(bytes
            .chunks_exact(BYTES_PER_F32)
            .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
            .collect())
    }

    /// Loads the model this field was built with, if any.
    ///
    /// Fails with `ModelMismatch` if the store now holds different
    /// parameters under the same id, or a model of another shape.
    pub fn resolve_model(&self, store: &ModelStore) -> CodecResult<Option<Arc<ModelTemplate>>> {
        let Some(reference) = self.model_reference() else {
            return Ok(None);
        };

        let template = store.resolve(&self.entry.name, reference)?;
        template.check_compatible(&self.entry.name, self.dimension(), self.space_type())?;
        if template.code_size() != self.stride() {
            return Err(CodecError::ModelMismatch {
                model_id: reference.model_id.clone(),
                field: self.entry.name.clone(),
                detail: format!(
                    "model codes are {} bytes but the field stores {}",
                    template.code_size(),
                    self.stride()
                ),
            });
        }
        Ok(Some(template))
    }

    /// Checks the payload against the digest recorded in the directory.
    /// Fields written as v1 carry no digest and always pass.
    pub fn verify(&self) -> CodecResult<()> {
        let Some(expected) = self.entry.digest else {
            return Ok(());
        };
        let actual = crc32fast::hash(self.payload);
        if actual != expected {
            return Err(CodecError::corruption(
                format!("field '{}'", self.entry.name),
                format!("payload digest mismatch: stored={expected:#010x}, computed={actual:#010x}"),
            ));
        }
        Ok(())
    }
}
