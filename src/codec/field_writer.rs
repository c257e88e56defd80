//! Per-field vector encoder used during a segment flush.

use std::io::{self, Write};
use std::sync::Arc;

use tracing::debug;

use crate::codec::format::{FieldEntry, FormatVersion};
use crate::error::{CodecError, CodecResult};
use crate::model::{ModelReference, ModelTemplate};
use crate::vector::{DocOrdinal, SpaceType, VectorDimension};

/// Maximum length of a field name in bytes (stored with a u16 prefix).
pub const MAX_FIELD_NAME_LEN: usize = u16::MAX as usize;

#[derive(Debug, Clone, PartialEq, Eq)]
enum FieldState {
    Accepting,
    Sealed { length: u64, digest: u32 },
    Failed(String),
}

/// Buffers the vectors of one field until the segment is flushed.
///
/// Vectors must arrive in strictly increasing document order. When a model
/// template is attached every vector is transformed before it is buffered,
/// so the buffer always holds exactly the bytes that will reach disk.
///
/// Any rejected vector poisons the writer: the field can no longer be
/// finished and the segment flush that owns it aborts.
#[derive(Debug)]
pub struct FieldVectorWriter {
    name: String,
    dimension: VectorDimension,
    space_type: SpaceType,
    model: Option<Arc<ModelTemplate>>,
    format: FormatVersion,
    stride: usize,
    doc_table: Vec<u8>,
    data: Vec<u8>,
    vector_count: u32,
    last_doc: Option<DocOrdinal>,
    state: FieldState,
}

impl FieldVectorWriter {
    /// Creates a writer for one field.
    ///
    /// The model, if any, must be trained for the same dimension and space
    /// type as the field. Format v1 cannot carry model codes.
    pub fn new(
        name: impl Into<String>,
        dimension: VectorDimension,
        space_type: SpaceType,
        model: Option<Arc<ModelTemplate>>,
        format: FormatVersion,
    ) -> CodecResult<Self> {
        let name = name.into();
        if name.is_empty() || name.len() > MAX_FIELD_NAME_LEN {
            return Err(CodecError::InvalidField {
                field: name,
                reason: format!("field name must be 1..={MAX_FIELD_NAME_LEN} bytes"),
            });
        }

        let stride = match &model {
            Some(template) => {
                if !format.supports_models() {
                    return Err(CodecError::ModelMismatch {
                        model_id: template.model_id().to_string(),
                        field: name,
                        detail: format!("format {format} cannot store model-transformed vectors"),
                    });
                }
                template.check_compatible(&name, dimension, space_type)?;
                template.code_size()
            }
            None => dimension.raw_byte_size(),
        };

        Ok(Self {
            name,
            dimension,
            space_type,
            model,
            format,
            stride,
            doc_table: Vec::new(),
            data: Vec::new(),
            vector_count: 0,
            last_doc: None,
            state: FieldState::Accepting,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn dimension(&self) -> VectorDimension {
        self.dimension
    }

    pub fn space_type(&self) -> SpaceType {
        self.space_type
    }

    pub fn model(&self) -> Option<&Arc<ModelTemplate>> {
        self.model.as_ref()
    }

    pub fn model_reference(&self) -> Option<ModelReference> {
        self.model.as_ref().map(|m| m.reference())
    }

    /// Bytes stored per vector.
    #[must_use]
    pub fn stride(&self) -> usize {
        self.stride
    }

    #[must_use]
    pub fn vector_count(&self) -> u32 {
        self.vector_count
    }

    /// The highest document accepted so far.
    #[must_use]
    pub fn last_doc(&self) -> Option<DocOrdinal> {
        self.last_doc
    }

    #[must_use]
    pub fn is_sealed(&self) -> bool {
        matches!(self.state, FieldState::Sealed { .. })
    }

    #[must_use]
    pub fn is_failed(&self) -> bool {
        matches!(self.state, FieldState::Failed(_))
    }

    /// Validates, transforms and buffers the vector of `doc`.
    pub fn add_vector(&mut self, doc: u32, raw: &[f32]) -> CodecResult<()> {
        match &self.state {
            FieldState::Accepting => {}
            FieldState::Sealed { .. } => {
                return Err(CodecError::FieldSealed {
                    field: self.name.clone(),
                });
            }
            FieldState::Failed(reason) => {
                return Err(CodecError::FieldAborted {
                    field: self.name.clone(),
                    reason: reason.clone(),
                });
            }
        }

        let doc = DocOrdinal::new(doc);
        let result = self.append(doc, raw);
        if let Err(e) = &result {
            debug!("Field '{}' rejected document {doc}: {e}", self.name);
            self.state = FieldState::Failed(e.to_string());
        }
        result
    }

    fn append(&mut self, doc: DocOrdinal, raw: &[f32]) -> CodecResult<()> {
        self.dimension.validate_vector(&self.name, raw)?;
        if let Some(position) = raw.iter().position(|v| !v.is_finite()) {
            return Err(CodecError::InvalidVector {
                field: self.name.clone(),
                doc: doc.get(),
                reason: format!("component {position} is {}", raw[position]),
            });
        }
        self.check_order(doc)?;

        let before = self.data.len();
        match &self.model {
            Some(template) => template.apply_into(raw, &mut self.data)?,
            None => {
                self.data.reserve(self.stride);
                for value in raw {
                    self.data.extend_from_slice(&value.to_le_bytes());
                }
            }
        }
        debug_assert_eq!(self.data.len() - before, self.stride);

        if self.format.supports_sparse_docs() {
            self.doc_table.extend_from_slice(&doc.to_bytes());
        }
        self.vector_count += 1;
        self.last_doc = Some(doc);
        Ok(())
    }

    fn check_order(&self, doc: DocOrdinal) -> CodecResult<()> {
        if let Some(last) = self.last_doc {
            if doc <= last {
                let reason = if doc == last {
                    "duplicate document ordinal".to_string()
                } else {
                    format!("ordinals must increase, previous was {last}")
                };
                return Err(CodecError::OrderingViolation {
                    field: self.name.clone(),
                    doc: doc.get(),
                    reason,
                });
            }
        }

        if !self.format.supports_sparse_docs() && doc.get() != self.vector_count {
            return Err(CodecError::OrderingViolation {
                field: self.name.clone(),
                doc: doc.get(),
                reason: format!(
                    "format {} requires dense ordinals, expected {}",
                    self.format, self.vector_count
                ),
            });
        }
        Ok(())
    }

    /// Seals the buffer and returns `(byte_length, crc32_digest)` of the payload.
    ///
    /// Calling `add_vector` or `finish` afterwards fails with `FieldSealed`.
    pub fn finish(&mut self) -> CodecResult<(u64, u32)> {
        match &self.state {
            FieldState::Accepting => Ok(self.seal()),
            FieldState::Sealed { .. } => Err(CodecError::FieldSealed {
                field: self.name.clone(),
            }),
            FieldState::Failed(reason) => Err(CodecError::FieldAborted {
                field: self.name.clone(),
                reason: reason.clone(),
            }),
        }
    }

    /// Like `finish`, but returns the existing result for an already sealed field.
    pub(crate) fn ensure_finished(&mut self) -> CodecResult<(u64, u32)> {
        match self.state {
            FieldState::Sealed { length, digest } => Ok((length, digest)),
            _ => self.finish(),
        }
    }

    fn seal(&mut self) -> (u64, u32) {
        let mut hasher = crc32fast::Hasher::new();
        hasher.update(&self.doc_table);
        hasher.update(&self.data);
        let digest = hasher.finalize();
        let length = (self.doc_table.len() + self.data.len()) as u64;

        debug!(
            "Sealed field '{}': {} vectors, stride={}, {} bytes, digest={digest:#010x}",
            self.name, self.vector_count, self.stride, length
        );
        self.state = FieldState::Sealed { length, digest };
        (length, digest)
    }

    /// Directory entry for this field placed at `offset`. Only valid once sealed.
    pub(crate) fn entry(&self, offset: u64) -> FieldEntry {
        let digest = match self.state {
            FieldState::Sealed { digest, .. } => Some(digest),
            _ => None,
        };
        FieldEntry {
            name: self.name.clone(),
            dimension: self.dimension,
            space_type: self.space_type,
            offset,
            length: (self.doc_table.len() + self.data.len()) as u64,
            vector_count: self.vector_count,
            stride: self.stride as u32,
            digest: digest.filter(|_| self.format == FormatVersion::V2),
            model: self.model_reference(),
        }
    }

    pub(crate) fn write_payload(&self, sink: &mut impl Write) -> io::Result<()> {
        sink.write_all(&self.doc_table)?;
        sink.write_all(&self.data)
    }
}
