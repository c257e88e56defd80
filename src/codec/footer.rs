//! Segment footer: the trailing integrity block of every vector file.
//!
//! # Layout (16 bytes, little-endian)
//! - magic: u32 (`FOOTER_MAGIC`)
//! - format version: u32
//! - checksum: u64, CRC32 of every byte before the footer (upper 32 bits zero)
//!
//! The footer is validated before any other byte of the file is trusted.

use std::io::{self, Write};

use crate::codec::format::FormatVersion;
use crate::error::{CodecError, CodecResult};

/// Magic number opening the footer.
pub const FOOTER_MAGIC: u32 = 0xC028_93E8;

/// Size of the footer in bytes.
pub const FOOTER_LEN: usize = 16;

/// Parsed footer of a sealed segment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Footer {
    pub version: FormatVersion,
    pub checksum: u32,
}

impl Footer {
    fn to_bytes(self) -> [u8; FOOTER_LEN] {
        let mut bytes = [0u8; FOOTER_LEN];
        bytes[0..4].copy_from_slice(&FOOTER_MAGIC.to_le_bytes());
        bytes[4..8].copy_from_slice(&self.version.get().to_le_bytes());
        bytes[8..16].copy_from_slice(&u64::from(self.checksum).to_le_bytes());
        bytes
    }
}

/// Sink wrapper that checksums and counts everything written through it.
///
/// The only way to append the footer is `finish`, which consumes the
/// wrapper, so nothing can be written after the footer.
pub struct ChecksumWriter<W: Write> {
    inner: W,
    hasher: crc32fast::Hasher,
    written: u64,
}

impl<W: Write> ChecksumWriter<W> {
    pub fn new(inner: W) -> Self {
        Self {
            inner,
            hasher: crc32fast::Hasher::new(),
            written: 0,
        }
    }

    /// Bytes written so far.
    #[must_use]
    pub fn position(&self) -> u64 {
        self.written
    }

    /// CRC32 of the bytes written so far.
    #[must_use]
    pub fn checksum(&self) -> u32 {
        self.hasher.clone().finalize()
    }

    /// Appends the footer and flushes the sink.
    pub fn finish(mut self, version: FormatVersion) -> io::Result<(W, Footer)> {
        let footer = Footer {
            version,
            checksum: self.checksum(),
        };
        write_footer(&mut self.inner, footer)?;
        self.inner.flush()?;
        Ok((self.inner, footer))
    }
}

impl<W: Write> Write for ChecksumWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let n = self.inner.write(buf)?;
        self.hasher.update(&buf[..n]);
        self.written += n as u64;
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

/// Writes a footer carrying the checksum of everything already in `sink`.
pub fn write_footer(sink: &mut impl Write, footer: Footer) -> io::Result<()> {
    sink.write_all(&footer.to_bytes())
}

/// Validates the trailing footer of a complete file image.
///
/// Fails with `Corruption` if the file is too short, the magic is absent,
/// the version is unsupported or the checksum does not match.
pub fn read_and_validate_footer(data: &[u8], context: &str) -> CodecResult<Footer> {
    if data.len() < FOOTER_LEN {
        return Err(CodecError::corruption(
            context,
            format!(
                "file has {} bytes, too small to contain a footer",
                data.len()
            ),
        ));
    }

    let footer_start = data.len() - FOOTER_LEN;
    let trailer = &data[footer_start..];

    let magic = u32::from_le_bytes([trailer[0], trailer[1], trailer[2], trailer[3]]);
    if magic != FOOTER_MAGIC {
        return Err(CodecError::corruption(
            context,
            format!("footer magic mismatch: expected {FOOTER_MAGIC:#010x}, got {magic:#010x}"),
        ));
    }

    let raw_version = u32::from_le_bytes([trailer[4], trailer[5], trailer[6], trailer[7]]);
    let version = FormatVersion::from_u32(raw_version).ok_or_else(|| {
        CodecError::corruption(context, format!("unsupported format version {raw_version}"))
    })?;

    let mut checksum_bytes = [0u8; 8];
    checksum_bytes.copy_from_slice(&trailer[8..16]);
    let stored = u64::from_le_bytes(checksum_bytes);
    let computed = crc32fast::hash(&data[..footer_start]);
    if stored != u64::from(computed) {
        return Err(CodecError::corruption(
            context,
            format!("checksum mismatch: stored={stored:#018x}, computed={computed:#010x}"),
        ));
    }

    Ok(Footer {
        version,
        checksum: computed,
    })
}
