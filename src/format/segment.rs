//! Segment framing.
//!
//! A container is a sequence of segments. Every segment starts with a 32-byte
//! header:
//!
//! ```text
//! Bytes  0-15: Segment id (ASCII, NUL padded), e.g. "ZISRAWSUBBLOCK"
//! Bytes 16-23: Allocated size of the data part (i64, multiple of 32)
//! Bytes 24-31: Used size of the data part (i64, <= allocated)
//! ```
//!
//! The data part follows immediately. The next segment starts at
//! `offset + 32 + allocated`.
//!
//! Writing is append-only: [`SegmentWriter`] only ever writes past the end of
//! what it has already written. The single exception is the file header,
//! which [`SegmentWriter::commit_header`] rewrites in place once every other
//! segment has been flushed.

use std::io::{Seek, SeekFrom, Write};

use bytes::Bytes;

use crate::error::{ContainerError, IoError};
use crate::io::{read_i64_le, RangeReader};

// =============================================================================
// Constants
// =============================================================================

/// Size of a segment header in bytes
pub const SEGMENT_HEADER_SIZE: usize = 32;

/// Segment data parts are padded to this alignment
pub const SEGMENT_ALIGNMENT: u64 = 32;

/// Length of the id field
const SEGMENT_ID_LEN: usize = 16;

// =============================================================================
// SegmentKind
// =============================================================================

/// The kind of a segment, derived from its 16-byte id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SegmentKind {
    FileHeader,
    Directory,
    SubBlock,
    Metadata,
    Attachment,
    AttachmentDirectory,
    /// A segment that was abandoned; its space is skipped
    Deleted,
}

impl SegmentKind {
    /// The id string written to disk.
    pub const fn id(self) -> &'static str {
        match self {
            SegmentKind::FileHeader => "ZISRAWFILE",
            SegmentKind::Directory => "ZISRAWDIRECTORY",
            SegmentKind::SubBlock => "ZISRAWSUBBLOCK",
            SegmentKind::Metadata => "ZISRAWMETADATA",
            SegmentKind::Attachment => "ZISRAWATTACH",
            SegmentKind::AttachmentDirectory => "ZISRAWATTDIR",
            SegmentKind::Deleted => "DELETED",
        }
    }

    const ALL: [SegmentKind; 7] = [
        SegmentKind::FileHeader,
        SegmentKind::Directory,
        SegmentKind::SubBlock,
        SegmentKind::Metadata,
        SegmentKind::Attachment,
        SegmentKind::AttachmentDirectory,
        SegmentKind::Deleted,
    ];

    /// Identify a segment from its raw id field.
    pub fn from_id_bytes(bytes: &[u8]) -> Option<Self> {
        let end = bytes.iter().position(|&b| b == 0).unwrap_or(bytes.len());
        let id = &bytes[..end];
        Self::ALL.into_iter().find(|k| k.id().as_bytes() == id)
    }

    fn id_bytes(self) -> [u8; SEGMENT_ID_LEN] {
        let mut out = [0u8; SEGMENT_ID_LEN];
        let id = self.id().as_bytes();
        out[..id.len()].copy_from_slice(id);
        out
    }
}

/// Round `len` up to the segment alignment.
#[inline]
pub fn aligned_size(len: u64) -> u64 {
    len.div_ceil(SEGMENT_ALIGNMENT) * SEGMENT_ALIGNMENT
}

// =============================================================================
// SegmentHeader
// =============================================================================

/// A parsed segment header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SegmentHeader {
    pub kind: SegmentKind,
    pub allocated_size: u64,
    pub used_size: u64,
}

impl SegmentHeader {
    pub fn new(kind: SegmentKind, used_size: u64, allocated_size: u64) -> Self {
        Self {
            kind,
            allocated_size,
            used_size,
        }
    }

    /// Parse a header found at `offset` in a stream of `stream_size` bytes.
    ///
    /// # Errors
    /// `CorruptContainer` if the id is unknown, the sizes are negative or
    /// inconsistent, or the used size runs past the end of the stream.
    pub fn parse(bytes: &[u8], offset: u64, stream_size: u64) -> Result<Self, ContainerError> {
        if bytes.len() < SEGMENT_HEADER_SIZE {
            return Err(ContainerError::corrupt(format!(
                "segment header at {} is truncated",
                offset
            )));
        }

        let kind = SegmentKind::from_id_bytes(&bytes[..SEGMENT_ID_LEN]).ok_or_else(|| {
            ContainerError::corrupt(format!(
                "unknown segment id {:?} at offset {}",
                String::from_utf8_lossy(&bytes[..SEGMENT_ID_LEN]).trim_end_matches('\0'),
                offset
            ))
        })?;

        let allocated = read_i64_le(&bytes[16..24]);
        let used = read_i64_le(&bytes[24..32]);
        if allocated < 0 || used < 0 {
            return Err(ContainerError::corrupt(format!(
                "negative segment size at offset {}",
                offset
            )));
        }

        let allocated_size = allocated as u64;
        // A used size of 0 means the whole allocation is in use
        let used_size = if used == 0 { allocated_size } else { used as u64 };
        if used_size > allocated_size {
            return Err(ContainerError::corrupt(format!(
                "segment at {} uses {} bytes but allocates only {}",
                offset, used_size, allocated_size
            )));
        }

        let data_start = offset + SEGMENT_HEADER_SIZE as u64;
        let remaining = stream_size.saturating_sub(data_start);
        if used_size > remaining {
            return Err(ContainerError::corrupt(format!(
                "segment at {} declares {} bytes but only {} remain",
                offset, used_size, remaining
            )));
        }

        Ok(Self {
            kind,
            allocated_size,
            used_size,
        })
    }

    pub fn to_bytes(&self) -> [u8; SEGMENT_HEADER_SIZE] {
        let mut out = [0u8; SEGMENT_HEADER_SIZE];
        out[..SEGMENT_ID_LEN].copy_from_slice(&self.kind.id_bytes());
        out[16..24].copy_from_slice(&(self.allocated_size as i64).to_le_bytes());
        out[24..32].copy_from_slice(&(self.used_size as i64).to_le_bytes());
        out
    }

    /// Total on-disk footprint including the header.
    pub fn total_size(&self) -> u64 {
        SEGMENT_HEADER_SIZE as u64 + self.allocated_size
    }
}

// =============================================================================
// Segment
// =============================================================================

/// A segment read from the container.
#[derive(Debug, Clone)]
pub struct Segment {
    /// Offset of the segment header in the stream
    pub offset: u64,
    pub header: SegmentHeader,
    /// The used part of the data area
    pub data: Bytes,
}

impl Segment {
    pub fn kind(&self) -> SegmentKind {
        self.header.kind
    }

    /// Offset of the first data byte.
    pub fn data_offset(&self) -> u64 {
        self.offset + SEGMENT_HEADER_SIZE as u64
    }
}

// =============================================================================
// SegmentReader
// =============================================================================

/// Reads segments through a [`RangeReader`]. Pure byte access; interpreting
/// segment contents is left to the callers.
pub struct SegmentReader<R> {
    reader: R,
}

impl<R: RangeReader> SegmentReader<R> {
    pub fn new(reader: R) -> Self {
        Self { reader }
    }

    pub fn reader(&self) -> &R {
        &self.reader
    }

    pub fn stream_size(&self) -> u64 {
        self.reader.size()
    }

    /// Read `len` bytes at `offset`. Reads past the end of the stream mean the
    /// container is truncated.
    pub fn read_range(&self, offset: u64, len: usize) -> Result<Bytes, ContainerError> {
        self.reader
            .read_exact_at(offset, len)
            .map_err(|e| match e {
                IoError::RangeOutOfBounds { .. } => {
                    ContainerError::corrupt(format!("truncated container: {}", e))
                }
                other => ContainerError::Io(other),
            })
    }

    /// Read and validate the segment header at `offset`.
    pub fn read_header(&self, offset: u64) -> Result<SegmentHeader, ContainerError> {
        let bytes = self.read_range(offset, SEGMENT_HEADER_SIZE)?;
        SegmentHeader::parse(&bytes, offset, self.stream_size())
    }

    /// Read the segment (header and used data) at `offset`.
    pub fn read_segment(&self, offset: u64) -> Result<Segment, ContainerError> {
        let header = self.read_header(offset)?;
        let data = self.read_range(offset + SEGMENT_HEADER_SIZE as u64, header.used_size as usize)?;
        Ok(Segment {
            offset,
            header,
            data,
        })
    }

    /// Read the segment at `offset` and check that it is of the expected kind.
    pub fn read_segment_of(
        &self,
        offset: u64,
        kind: SegmentKind,
    ) -> Result<Segment, ContainerError> {
        let segment = self.read_segment(offset)?;
        if segment.kind() != kind {
            return Err(ContainerError::corrupt(format!(
                "expected {} segment at offset {}, found {}",
                kind.id(),
                offset,
                segment.kind().id()
            )));
        }
        Ok(segment)
    }

    /// Walk segment headers from `start` to the end of the stream.
    pub fn headers_from(&self, start: u64) -> SegmentHeaders<'_, R> {
        SegmentHeaders {
            reader: self,
            offset: start,
            done: false,
        }
    }
}

/// Iterator over `(offset, header)` pairs, used by the directory scan.
///
/// Stops at the end of the stream; a header that cannot be parsed is yielded
/// as an error once and ends the walk.
pub struct SegmentHeaders<'a, R> {
    reader: &'a SegmentReader<R>,
    offset: u64,
    done: bool,
}

impl<R: RangeReader> Iterator for SegmentHeaders<'_, R> {
    type Item = Result<(u64, SegmentHeader), ContainerError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done || self.offset + SEGMENT_HEADER_SIZE as u64 > self.reader.stream_size() {
            return None;
        }

        match self.reader.read_header(self.offset) {
            Ok(header) => {
                let offset = self.offset;
                self.offset += header.total_size();
                Some(Ok((offset, header)))
            }
            Err(e) => {
                self.done = true;
                Some(Err(e))
            }
        }
    }
}

// =============================================================================
// SegmentWriter
// =============================================================================

/// Append-only segment writer.
pub struct SegmentWriter<W> {
    inner: W,
    position: u64,
}

impl<W: Write + Seek> SegmentWriter<W> {
    /// Start writing at the beginning of `inner`.
    pub fn new(mut inner: W) -> Result<Self, IoError> {
        inner.seek(SeekFrom::Start(0))?;
        Ok(Self { inner, position: 0 })
    }

    /// Offset at which the next segment will start.
    pub fn position(&self) -> u64 {
        self.position
    }

    /// Append a segment and return its offset.
    pub fn append_segment(&mut self, kind: SegmentKind, data: &[u8]) -> Result<u64, IoError> {
        self.append_segment_with_allocation(kind, data, 0)
    }

    /// Append a segment whose data area is at least `min_allocated` bytes.
    pub fn append_segment_with_allocation(
        &mut self,
        kind: SegmentKind,
        data: &[u8],
        min_allocated: u64,
    ) -> Result<u64, IoError> {
        let used = data.len() as u64;
        let allocated = aligned_size(used.max(min_allocated));
        let header = SegmentHeader::new(kind, used, allocated);

        let offset = self.position;
        self.inner.write_all(&header.to_bytes())?;
        self.inner.write_all(data)?;

        let padding = (allocated - used) as usize;
        if padding > 0 {
            self.inner.write_all(&vec![0u8; padding])?;
        }

        self.position += header.total_size();
        Ok(offset)
    }

    /// Rewrite the data area of the file header segment at offset 0.
    ///
    /// `data` must fit in the header's allocation. This is the commit point
    /// of a container: everything else must already be flushed.
    pub fn commit_header(&mut self, data: &[u8]) -> Result<(), IoError> {
        self.inner
            .seek(SeekFrom::Start(SEGMENT_HEADER_SIZE as u64))?;
        self.inner.write_all(data)?;
        self.inner.flush()?;
        self.inner.seek(SeekFrom::Start(self.position))?;
        Ok(())
    }

    pub fn flush(&mut self) -> Result<(), IoError> {
        self.inner.flush()?;
        Ok(())
    }

    pub fn get_ref(&self) -> &W {
        &self.inner
    }

    pub fn get_mut(&mut self) -> &mut W {
        &mut self.inner
    }

    pub fn into_inner(self) -> W {
        self.inner
    }
}
