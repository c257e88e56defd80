//! Multi-field segment writer.
//!
//! Owns every field writer of one segment and lays their payloads out in
//! registration order behind a single header and field directory. The
//! footer is only written after every field finished successfully, so a
//! failed flush never leaves a file a reader would accept.

use std::fmt;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tempfile::NamedTempFile;
use tracing::{debug, info, warn};

use crate::codec::field_writer::FieldVectorWriter;
use crate::codec::footer::{ChecksumWriter, FOOTER_LEN};
use crate::codec::format::{
    FieldEntry, FormatVersion, HEADER_LEN, SegmentHeader, encode_directory,
};
use crate::config::CodecSettings;
use crate::error::{CodecError, CodecResult};
use crate::model::ModelStore;
use crate::vector::{SpaceType, VectorDimension};

/// Lifecycle of a segment writer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriterState {
    /// Accepting fields and vectors
    Open,
    /// `flush` in progress
    Flushing,
    /// File sealed with a valid footer and published
    Sealed,
    /// Flush, publication or model resolution failed; nothing was published
    Failed,
}

impl fmt::Display for WriterState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Open => "open",
            Self::Flushing => "flushing",
            Self::Sealed => "sealed",
            Self::Failed => "failed",
        })
    }
}

/// Result of a successful flush.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SegmentSummary {
    pub segment_name: String,
    pub format: FormatVersion,
    /// Total file size including the footer
    pub total_bytes: u64,
    /// Checksum stored in the footer
    pub checksum: u32,
    /// Directory entries in file order
    pub fields: Vec<FieldEntry>,
}

impl SegmentSummary {
    #[must_use]
    pub fn vector_count(&self) -> u64 {
        self.fields.iter().map(|f| u64::from(f.vector_count)).sum()
    }
}

/// Builds exactly one segment vector file.
///
/// ```text
/// Open --begin_field*--> Open --flush--> Flushing --> Sealed
///                                                 \-> Failed
/// ```
pub struct SegmentWriter {
    segment_name: String,
    format: FormatVersion,
    models: Option<Arc<ModelStore>>,
    fields: Vec<FieldVectorWriter>,
    state: WriterState,
}

impl SegmentWriter {
    pub fn new(segment_name: impl Into<String>) -> Self {
        Self {
            segment_name: segment_name.into(),
            format: FormatVersion::CURRENT,
            models: None,
            fields: Vec::new(),
            state: WriterState::Open,
        }
    }

    /// Writer configured from the `[codec]` settings section.
    pub fn from_settings(
        segment_name: impl Into<String>,
        settings: &CodecSettings,
    ) -> CodecResult<Self> {
        Ok(Self::new(segment_name).with_format(settings.format_version()?))
    }

    /// Store used to resolve model ids passed to `begin_field`.
    pub fn with_models(mut self, models: Arc<ModelStore>) -> Self {
        self.models = Some(models);
        self
    }

    pub fn with_format(mut self, format: FormatVersion) -> Self {
        self.format = format;
        self
    }

    pub fn segment_name(&self) -> &str {
        &self.segment_name
    }

    pub fn format(&self) -> FormatVersion {
        self.format
    }

    pub fn state(&self) -> WriterState {
        self.state
    }

    pub fn field_names(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(FieldVectorWriter::name)
    }

    /// Registers a new field and returns its writer.
    ///
    /// A model id is resolved through the attached store, which must hold a
    /// trained template matching `dimension` and `space_type`. Model failures
    /// abort the whole segment.
    pub fn begin_field(
        &mut self,
        name: &str,
        dimension: usize,
        space_type: SpaceType,
        model_id: Option<&str>,
    ) -> CodecResult<&mut FieldVectorWriter> {
        self.ensure_open()?;

        if self.fields.iter().any(|f| f.name() == name) {
            return Err(CodecError::DuplicateField {
                field: name.to_string(),
            });
        }

        let dim = VectorDimension::new(dimension).ok_or_else(|| CodecError::InvalidField {
            field: name.to_string(),
            reason: format!("invalid dimension {dimension}"),
        })?;

        let created = match model_id {
            Some(model_id) => self
                .resolve_model(model_id, name, dim, space_type)
                .and_then(|template| {
                    FieldVectorWriter::new(name, dim, space_type, Some(template), self.format)
                }),
            None => FieldVectorWriter::new(name, dim, space_type, None, self.format),
        };

        let writer = match created {
            Ok(writer) => writer,
            Err(e) if e.is_model_error() => {
                warn!(
                    "Segment '{}' aborted: field '{name}' cannot use its model: {e}",
                    self.segment_name
                );
                self.state = WriterState::Failed;
                return Err(e);
            }
            Err(e) => return Err(e),
        };

        debug!(
            "Segment '{}': field '{name}' registered (dim={dim}, space={space_type}, stride={})",
            self.segment_name,
            writer.stride()
        );

        self.fields.push(writer);
        let index = self.fields.len() - 1;
        Ok(&mut self.fields[index])
    }

    fn resolve_model(
        &self,
        model_id: &str,
        field: &str,
        dimension: VectorDimension,
        space_type: SpaceType,
    ) -> CodecResult<Arc<crate::model::ModelTemplate>> {
        let store = self
            .models
            .as_ref()
            .ok_or_else(|| CodecError::ModelNotFound {
                model_id: model_id.to_string(),
            })?;
        store.load_for_field(model_id, field, dimension, space_type)
    }

    /// Writer of a field registered earlier.
    pub fn field_mut(&mut self, name: &str) -> Option<&mut FieldVectorWriter> {
        self.fields.iter_mut().find(|f| f.name() == name)
    }

    fn ensure_open(&self) -> CodecResult<()> {
        if self.state != WriterState::Open {
            return Err(CodecError::WriterClosed {
                state: self.state.to_string(),
            });
        }
        Ok(())
    }

    /// Finishes every field in registration order and writes the sealed file
    /// to `sink`. Terminal: the writer accepts nothing afterwards.
    pub fn flush<W: Write>(&mut self, sink: W) -> CodecResult<SegmentSummary> {
        self.ensure_open()?;
        self.state = WriterState::Flushing;

        match self.write_segment(sink) {
            Ok(summary) => {
                self.state = WriterState::Sealed;
                info!(
                    "Sealed segment '{}' ({}, {} fields, {} vectors, {} bytes, checksum={:#010x})",
                    summary.segment_name,
                    summary.format,
                    summary.fields.len(),
                    summary.vector_count(),
                    summary.total_bytes,
                    summary.checksum
                );
                Ok(summary)
            }
            Err(e) => {
                self.state = WriterState::Failed;
                warn!("Flush of segment '{}' aborted: {e}", self.segment_name);
                Err(e)
            }
        }
    }

    /// Flushes into a temporary file next to `path` and renames it into place
    /// once the footer is written. On failure `path` is left untouched.
    pub fn flush_to_path(&mut self, path: impl AsRef<Path>) -> CodecResult<SegmentSummary> {
        let path = path.as_ref();
        self.ensure_open()?;

        let parent = match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        let mut temp = NamedTempFile::new_in(&parent).map_err(|e| CodecError::io(&parent, e))?;

        let summary = self.flush(BufWriter::new(&mut temp))?;

        if let Err(e) = publish(temp, path) {
            self.state = WriterState::Failed;
            warn!("Segment '{}' was not published: {e}", self.segment_name);
            return Err(e);
        }

        debug!("Published segment '{}' at {}", self.segment_name, path.display());
        Ok(summary)
    }

    fn write_segment<W: Write>(&mut self, sink: W) -> CodecResult<SegmentSummary> {
        for field in &mut self.fields {
            field.ensure_finished()?;
        }

        // Entry sizes do not depend on offsets, so a first pass sizes the directory.
        let sizing: Vec<FieldEntry> = self.fields.iter().map(|f| f.entry(0)).collect();
        let directory_len = encode_directory(self.format, &sizing).len();
        let directory_len = u32::try_from(directory_len).map_err(|_| {
            CodecError::Serialization(format!(
                "field directory of segment '{}' exceeds 4 GiB",
                self.segment_name
            ))
        })?;
        let field_count = u32::try_from(self.fields.len()).map_err(|_| {
            CodecError::Serialization(format!("too many fields in '{}'", self.segment_name))
        })?;

        let header = SegmentHeader {
            version: self.format,
            field_count,
            directory_len,
        };

        let mut offset = header.data_start();
        let mut entries = Vec::with_capacity(self.fields.len());
        for field in &self.fields {
            let entry = field.entry(offset);
            debug!(
                "Field '{}' laid out at [{}, {})",
                entry.name,
                entry.offset,
                entry.end()
            );
            offset = entry.end();
            entries.push(entry);
        }
        let directory = encode_directory(self.format, &entries);
        debug_assert_eq!(directory.len(), directory_len as usize);

        let io_err = |e| CodecError::io(&self.segment_name, e);
        let mut out = ChecksumWriter::new(sink);
        out.write_all(&header.to_bytes()).map_err(io_err)?;
        out.write_all(&directory).map_err(io_err)?;
        for field in &self.fields {
            field.write_payload(&mut out).map_err(io_err)?;
        }
        debug_assert_eq!(out.position(), offset);
        debug_assert!(out.position() >= HEADER_LEN as u64);

        let body_len = out.position();
        let (_, footer) = out.finish(self.format).map_err(io_err)?;

        Ok(SegmentSummary {
            segment_name: self.segment_name.clone(),
            format: self.format,
            total_bytes: body_len + FOOTER_LEN as u64,
            checksum: footer.checksum,
            fields: entries,
        })
    }
}

/// Syncs a finished temp file and renames it onto `path`.
fn publish(temp: NamedTempFile, path: &Path) -> CodecResult<()> {
    temp.as_file()
        .sync_all()
        .map_err(|e| CodecError::io(temp.path(), e))?;
    temp.persist(path)
        .map_err(|e| CodecError::io(path, e.error))?;
    Ok(())
}

impl fmt::Debug for SegmentWriter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SegmentWriter")
            .field("segment_name", &self.segment_name)
            .field("format", &self.format)
            .field("fields", &self.fields.len())
            .field("state", &self.state)
            .finish()
    }
}
