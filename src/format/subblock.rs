//! Subblock segments.
//!
//! ```text
//! Bytes  0-3:  Metadata size (i32)
//! Bytes  4-7:  Attachment size (i32)
//! Bytes  8-15: Data size (i64)
//! Bytes 16-  : DV directory entry, padded so that the payload starts at
//!              max(256, 16 + entry size)
//! Then:        metadata XML, pixel payload, attachment bytes
//! ```
//!
//! The embedded entry duplicates the one in the directory segment. It is what
//! a directory scan uses when the directory segment is missing or damaged.

use bytes::Bytes;

use crate::error::ContainerError;
use crate::format::entry::{SubBlockEntry, DIMENSION_ENTRY_SIZE, DV_FIXED_SIZE};
use crate::io::{read_i32_le, read_i64_le};

/// Size of the sizes block before the embedded entry
const SIZES_LEN: usize = 16;

/// Minimum offset of the payload within the segment data
const MIN_PAYLOAD_OFFSET: usize = 256;

/// Enough bytes to parse the embedded entry of any well-formed subblock.
pub const SUBBLOCK_PREFIX_LEN: usize = SIZES_LEN + DV_FIXED_SIZE + 32 * DIMENSION_ENTRY_SIZE;

/// Parts of a subblock segment.
#[derive(Debug, Clone)]
pub struct SubBlockSegment {
    pub entry: SubBlockEntry,
    /// Per-subblock XML (often empty)
    pub metadata: Bytes,
    /// Compressed or raw pixel payload
    pub data: Bytes,
    /// Per-subblock attachment (often empty)
    pub attachment: Bytes,
}

fn payload_offset(entry_len: usize) -> usize {
    MIN_PAYLOAD_OFFSET.max(SIZES_LEN + entry_len)
}

/// Serialize the data area of a `ZISRAWSUBBLOCK` segment.
pub fn encode_subblock_segment(
    entry: &SubBlockEntry,
    metadata: &[u8],
    data: &[u8],
    attachment: &[u8],
) -> Vec<u8> {
    let entry_bytes = entry.to_bytes();
    let start = payload_offset(entry_bytes.len());

    let mut out = Vec::with_capacity(start + metadata.len() + data.len() + attachment.len());
    out.extend_from_slice(&(metadata.len() as i32).to_le_bytes());
    out.extend_from_slice(&(attachment.len() as i32).to_le_bytes());
    out.extend_from_slice(&(data.len() as i64).to_le_bytes());
    out.extend_from_slice(&entry_bytes);
    out.resize(start, 0);
    out.extend_from_slice(metadata);
    out.extend_from_slice(data);
    out.extend_from_slice(attachment);
    out
}

/// Parse only the embedded entry, from at least the first
/// [`SUBBLOCK_PREFIX_LEN`] bytes of the segment data (or all of it if shorter).
///
/// The entry's file position is replaced by `segment_offset`.
pub fn parse_subblock_entry(
    prefix: &[u8],
    segment_offset: u64,
) -> Result<SubBlockEntry, ContainerError> {
    if prefix.len() < SIZES_LEN {
        return Err(ContainerError::corrupt(format!(
            "subblock segment at {} is truncated",
            segment_offset
        )));
    }
    let (mut entry, _) = SubBlockEntry::parse(&prefix[SIZES_LEN..])?;
    entry.file_position = segment_offset;
    Ok(entry)
}

/// Parse the full data area of a subblock segment found at `segment_offset`.
pub fn parse_subblock_segment(
    data: Bytes,
    segment_offset: u64,
) -> Result<SubBlockSegment, ContainerError> {
    if data.len() < SIZES_LEN {
        return Err(ContainerError::corrupt(format!(
            "subblock segment at {} is truncated",
            segment_offset
        )));
    }

    let metadata_len = read_i32_le(&data[0..4]);
    let attachment_len = read_i32_le(&data[4..8]);
    let data_len = read_i64_le(&data[8..16]);
    if metadata_len < 0 || attachment_len < 0 || data_len < 0 {
        return Err(ContainerError::corrupt(format!(
            "negative part size in subblock segment at {}",
            segment_offset
        )));
    }

    let (mut entry, entry_len) = SubBlockEntry::parse(&data[SIZES_LEN..])?;
    entry.file_position = segment_offset;

    let start = payload_offset(entry_len);
    let metadata_end = start + metadata_len as usize;
    let data_end = metadata_end + data_len as usize;
    let attachment_end = data_end + attachment_len as usize;
    if attachment_end > data.len() {
        return Err(ContainerError::corrupt(format!(
            "subblock segment at {} declares {} bytes but holds {}",
            segment_offset,
            attachment_end,
            data.len()
        )));
    }

    Ok(SubBlockSegment {
        entry,
        metadata: data.slice(start..metadata_end),
        data: data.slice(metadata_end..data_end),
        attachment: data.slice(data_end..attachment_end),
    })
}
