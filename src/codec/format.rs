//! On-disk layout of segment vector files.
//!
//! ```text
//! [header][field directory][field payload]*[footer]
//! ```
//!
//! # Header (16 bytes, little-endian)
//! - magic: `b"KNNS"`
//! - format version: u32
//! - field count: u32
//! - directory length in bytes: u32
//!
//! # Directory entry, version 1
//! name_len u16, name, dimension u32, space tag u8, offset u64, length u64.
//! Payload is `count × dimension` raw f32 values for dense ordinals `0..count`.
//!
//! # Directory entry, version 2
//! name_len u16, name, dimension u32, space tag u8, offset u64, length u64,
//! vector count u32, stride u32, payload CRC32 u32, model flag u8 and, when
//! the flag is 1, model id (u16 length + bytes) and the 32-byte blob digest.
//! Payload is the doc-ordinal table (`count × u32`) followed by
//! `count × stride` bytes of vector data.
//!
//! Offsets are absolute positions in the file.

use std::collections::HashSet;
use std::fmt;

use crate::error::{CodecError, CodecResult};
use crate::model::{DIGEST_LEN, ModelReference};
use crate::vector::{SpaceType, VectorDimension};

/// Magic bytes identifying a segment vector file.
pub const HEADER_MAGIC: &[u8; 4] = b"KNNS";

/// Size of the header in bytes.
pub const HEADER_LEN: usize = 16;

/// Number of bytes per doc ordinal in the v2 doc table.
pub const DOC_ID_BYTES: usize = 4;

/// On-disk format versions this build can read.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum FormatVersion {
    /// Dense raw f32 vectors, no per-field digest, no models.
    V1,
    /// Doc-ordinal table, per-field digest, stride and optional model reference.
    V2,
}

impl FormatVersion {
    /// Format written by default.
    pub const CURRENT: FormatVersion = FormatVersion::V2;

    #[must_use]
    pub const fn get(self) -> u32 {
        match self {
            Self::V1 => 1,
            Self::V2 => 2,
        }
    }

    #[must_use]
    pub fn from_u32(version: u32) -> Option<Self> {
        match version {
            1 => Some(Self::V1),
            2 => Some(Self::V2),
            _ => None,
        }
    }

    /// Whether fields may carry model-transformed codes.
    #[must_use]
    pub const fn supports_models(self) -> bool {
        matches!(self, Self::V2)
    }

    /// Whether fields may skip document ordinals.
    #[must_use]
    pub const fn supports_sparse_docs(self) -> bool {
        matches!(self, Self::V2)
    }
}

impl fmt::Display for FormatVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "v{}", self.get())
    }
}

/// Parsed file header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SegmentHeader {
    pub version: FormatVersion,
    pub field_count: u32,
    pub directory_len: u32,
}

impl SegmentHeader {
    pub fn to_bytes(&self) -> [u8; HEADER_LEN] {
        let mut bytes = [0u8; HEADER_LEN];
        bytes[0..4].copy_from_slice(HEADER_MAGIC);
        bytes[4..8].copy_from_slice(&self.version.get().to_le_bytes());
        bytes[8..12].copy_from_slice(&self.field_count.to_le_bytes());
        bytes[12..16].copy_from_slice(&self.directory_len.to_le_bytes());
        bytes
    }

    pub fn from_bytes(data: &[u8], context: &str) -> CodecResult<Self> {
        let mut reader = ByteReader::new(data, context);
        let magic = reader.take(4)?;
        if magic != HEADER_MAGIC {
            return Err(CodecError::corruption(
                context,
                format!("bad header magic: expected KNNS, got {magic:?}"),
            ));
        }

        let raw_version = reader.read_u32()?;
        let version = FormatVersion::from_u32(raw_version).ok_or_else(|| {
            CodecError::corruption(context, format!("unsupported header version {raw_version}"))
        })?;

        Ok(Self {
            version,
            field_count: reader.read_u32()?,
            directory_len: reader.read_u32()?,
        })
    }

    /// First byte after the field directory.
    #[must_use]
    pub fn data_start(&self) -> u64 {
        HEADER_LEN as u64 + u64::from(self.directory_len)
    }
}

/// Directory record for one vector field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldEntry {
    pub name: String,
    pub dimension: VectorDimension,
    pub space_type: SpaceType,
    /// Absolute offset of the field payload
    pub offset: u64,
    /// Payload length in bytes
    pub length: u64,
    pub vector_count: u32,
    /// Bytes per stored vector
    pub stride: u32,
    /// CRC32 of the payload, absent in v1 files
    pub digest: Option<u32>,
    pub model: Option<ModelReference>,
}

impl FieldEntry {
    /// End of the payload (exclusive).
    #[must_use]
    pub fn end(&self) -> u64 {
        self.offset + self.length
    }

    /// Bytes of the doc-ordinal table that precedes the vectors.
    #[must_use]
    pub fn doc_table_len(&self, version: FormatVersion) -> u64 {
        match version {
            FormatVersion::V1 => 0,
            FormatVersion::V2 => u64::from(self.vector_count) * DOC_ID_BYTES as u64,
        }
    }
}

/// Encodes the directory block for `entries`.
pub fn encode_directory(version: FormatVersion, entries: &[FieldEntry]) -> Vec<u8> {
    let mut buf = Vec::with_capacity(entries.len() * 64);

    for entry in entries {
        write_string(&mut buf, &entry.name);
        buf.extend_from_slice(&(entry.dimension.get() as u32).to_le_bytes());
        buf.push(entry.space_type.tag());
        buf.extend_from_slice(&entry.offset.to_le_bytes());
        buf.extend_from_slice(&entry.length.to_le_bytes());

        if version == FormatVersion::V2 {
            buf.extend_from_slice(&entry.vector_count.to_le_bytes());
            buf.extend_from_slice(&entry.stride.to_le_bytes());
            buf.extend_from_slice(&entry.digest.unwrap_or_default().to_le_bytes());
            match &entry.model {
                Some(reference) => {
                    buf.push(1);
                    write_string(&mut buf, &reference.model_id);
                    buf.extend_from_slice(&reference.digest);
                }
                None => buf.push(0),
            }
        }
    }

    buf
}

/// Decodes `field_count` directory entries that must fill `data` exactly.
pub fn decode_directory(
    version: FormatVersion,
    data: &[u8],
    field_count: u32,
    context: &str,
) -> CodecResult<Vec<FieldEntry>> {
    let mut reader = ByteReader::new(data, context);
    let mut entries = Vec::with_capacity(field_count.min(1024) as usize);

    for _ in 0..field_count {
        let entry = match version {
            FormatVersion::V1 => decode_entry_v1(&mut reader)?,
            FormatVersion::V2 => decode_entry_v2(&mut reader)?,
        };
        entries.push(entry);
    }

    if reader.remaining() != 0 {
        return Err(CodecError::corruption(
            context,
            format!("{} trailing bytes after field directory", reader.remaining()),
        ));
    }

    Ok(entries)
}

fn decode_common(
    reader: &mut ByteReader<'_>,
) -> CodecResult<(String, VectorDimension, SpaceType, u64, u64)> {
    let name = reader.read_string()?;
    let raw_dimension = reader.read_u32()?;
    let dimension = VectorDimension::new(raw_dimension as usize).ok_or_else(|| {
        reader.corrupt(format!("field '{name}' has invalid dimension {raw_dimension}"))
    })?;
    let tag = reader.read_u8()?;
    let space_type = SpaceType::from_tag(tag)
        .ok_or_else(|| reader.corrupt(format!("field '{name}' has unknown space tag {tag}")))?;
    let offset = reader.read_u64()?;
    let length = reader.read_u64()?;
    Ok((name, dimension, space_type, offset, length))
}

fn decode_entry_v1(reader: &mut ByteReader<'_>) -> CodecResult<FieldEntry> {
    let (name, dimension, space_type, offset, length) = decode_common(reader)?;

    let stride = dimension.raw_byte_size() as u64;
    if length % stride != 0 {
        return Err(reader.corrupt(format!(
            "field '{name}' length {length} is not a multiple of vector size {stride}"
        )));
    }
    let vector_count = u32::try_from(length / stride)
        .map_err(|_| reader.corrupt(format!("field '{name}' holds too many vectors")))?;

    Ok(FieldEntry {
        name,
        dimension,
        space_type,
        offset,
        length,
        vector_count,
        stride: stride as u32,
        digest: None,
        model: None,
    })
}

fn decode_entry_v2(reader: &mut ByteReader<'_>) -> CodecResult<FieldEntry> {
    let (name, dimension, space_type, offset, length) = decode_common(reader)?;
    let vector_count = reader.read_u32()?;
    let stride = reader.read_u32()?;
    let digest = reader.read_u32()?;

    let model = match reader.read_u8()? {
        0 => None,
        1 => {
            let model_id = reader.read_string()?;
            let mut digest = [0u8; DIGEST_LEN];
            digest.copy_from_slice(reader.take(DIGEST_LEN)?);
            Some(ModelReference { model_id, digest })
        }
        flag => {
            return Err(reader.corrupt(format!("field '{name}' has invalid model flag {flag}")));
        }
    };

    if stride == 0 {
        return Err(reader.corrupt(format!("field '{name}' has zero stride")));
    }
    if model.is_none() && stride as usize != dimension.raw_byte_size() {
        return Err(reader.corrupt(format!(
            "field '{name}' stores raw vectors with stride {stride}, expected {}",
            dimension.raw_byte_size()
        )));
    }

    let expected = u64::from(vector_count) * (DOC_ID_BYTES as u64 + u64::from(stride));
    if length != expected {
        return Err(reader.corrupt(format!(
            "field '{name}' length {length} does not match {vector_count} vectors of {stride} bytes"
        )));
    }

    Ok(FieldEntry {
        name,
        dimension,
        space_type,
        offset,
        length,
        vector_count,
        stride,
        digest: Some(digest),
        model,
    })
}

/// Checks that payloads are unique by name, lie inside `data_start..body_end`
/// and never overlap.
pub fn validate_layout(
    entries: &[FieldEntry],
    data_start: u64,
    body_end: u64,
    context: &str,
) -> CodecResult<()> {
    let mut names = HashSet::with_capacity(entries.len());
    for entry in entries {
        if !names.insert(entry.name.as_str()) {
            return Err(CodecError::corruption(
                context,
                format!("field '{}' appears twice in the directory", entry.name),
            ));
        }
        let end = entry.offset.checked_add(entry.length);
        if entry.offset < data_start || end.is_none_or(|end| end > body_end) {
            return Err(CodecError::corruption(
                context,
                format!(
                    "field '{}' payload [{}, +{}) lies outside the data region [{data_start}, {body_end})",
                    entry.name, entry.offset, entry.length
                ),
            ));
        }
    }

    let mut spans: Vec<(u64, u64, &str)> = entries
        .iter()
        .map(|e| (e.offset, e.end(), e.name.as_str()))
        .collect();
    spans.sort_unstable();
    for pair in spans.windows(2) {
        let (_, prev_end, prev_name) = pair[0];
        let (next_start, _, next_name) = pair[1];
        if next_start < prev_end {
            return Err(CodecError::corruption(
                context,
                format!("payloads of fields '{prev_name}' and '{next_name}' overlap"),
            ));
        }
    }

    Ok(())
}

fn write_string(buf: &mut Vec<u8>, value: &str) {
    let bytes = value.as_bytes();
    debug_assert!(bytes.len() <= u16::MAX as usize);
    buf.extend_from_slice(&(bytes.len() as u16).to_le_bytes());
    buf.extend_from_slice(bytes);
}

/// Bounds-checked little-endian cursor; truncation is reported as corruption.
struct ByteReader<'a> {
    data: &'a [u8],
    pos: usize,
    context: &'a str,
}

impl<'a> ByteReader<'a> {
    fn new(data: &'a [u8], context: &'a str) -> Self {
        Self {
            data,
            pos: 0,
            context,
        }
    }

    fn corrupt(&self, reason: String) -> CodecError {
        CodecError::corruption(self.context, reason)
    }

    fn remaining(&self) -> usize {
        self.data.len() - self.pos
    }

    fn take(&mut self, len: usize) -> CodecResult<&'a [u8]> {
        let slice = self
            .data
            .get(self.pos..self.pos.saturating_add(len))
            .ok_or_else(|| self.corrupt(format!("truncated data at offset {}", self.pos)))?;
        self.pos += len;
        Ok(slice)
    }

    fn read_u8(&mut self) -> CodecResult<u8> {
        Ok(self.take(1)?[0])
    }

    fn read_u16(&mut self) -> CodecResult<u16> {
        let b = self.take(2)?;
        Ok(u16::from_le_bytes([b[0], b[1]]))
    }

    fn read_u32(&mut self) -> CodecResult<u32> {
        let b = self.take(4)?;
        Ok(u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
    }

    fn read_u64(&mut self) -> CodecResult<u64> {
        let mut bytes = [0u8; 8];
        bytes.copy_from_slice(self.take(8)?);
        Ok(u64::from_le_bytes(bytes))
    }

    fn read_string(&mut self) -> CodecResult<String> {
        let len = self.read_u16()? as usize;
        let bytes = self.take(len)?;
        std::str::from_utf8(bytes)
            .map(str::to_owned)
            .map_err(|e| self.corrupt(format!("invalid UTF-8 in name: {e}")))
    }
}
