//! Attachments and the attachment directory.
//!
//! # `A1` entry (128 bytes)
//!
//! ```text
//! Bytes   0-1:   Schema "A1"
//! Bytes   2-11:  Reserved
//! Bytes  12-19:  File position of the attachment segment (i64)
//! Bytes  20-23:  File part (i32)
//! Bytes  24-39:  Content GUID
//! Bytes  40-47:  Content file type (ASCII, NUL padded), e.g. "JPG"
//! Bytes  48-127: Name (UTF-8, NUL padded)
//! ```
//!
//! # Attachment segment
//!
//! ```text
//! Bytes   0-7:   Data size (i64)
//! Bytes   8-15:  Spare
//! Bytes  16-143: A1 entry
//! Bytes 144-255: Spare
//! Then:          attachment bytes
//! ```
//!
//! # Attachment directory segment
//!
//! ```text
//! Bytes   0-3:   Entry count (i32)
//! Bytes   4-255: Spare
//! Then:          A1 entries
//! ```

use bytes::Bytes;
use serde::Serialize;

use crate::error::ContainerError;
use crate::io::{read_i32_le, read_i64_le};

/// Size of an `A1` entry
pub const ATTACHMENT_ENTRY_SIZE: usize = 128;

/// Longest content type that fits an entry
pub const MAX_CONTENT_TYPE_LEN: usize = 8;

/// Longest name (in bytes) that fits an entry
pub const MAX_NAME_LEN: usize = 80;

const A1_SCHEMA: &[u8; 2] = b"A1";
const ATTACHMENT_HEADER_SIZE: usize = 256;
const ATTACHMENT_ENTRY_OFFSET: usize = 16;

/// Describes one attachment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AttachmentEntry {
    /// Offset of the `ZISRAWATTACH` segment
    pub file_position: u64,
    pub file_part: i32,
    #[serde(skip)]
    pub content_guid: [u8; 16],
    pub content_type: String,
    pub name: String,
}

impl AttachmentEntry {
    pub fn to_bytes(&self) -> [u8; ATTACHMENT_ENTRY_SIZE] {
        let mut out = [0u8; ATTACHMENT_ENTRY_SIZE];
        out[0..2].copy_from_slice(A1_SCHEMA);
        out[12..20].copy_from_slice(&(self.file_position as i64).to_le_bytes());
        out[20..24].copy_from_slice(&self.file_part.to_le_bytes());
        out[24..40].copy_from_slice(&self.content_guid);
        copy_padded(&mut out[40..48], &self.content_type);
        copy_padded(&mut out[48..128], &self.name);
        out
    }

    pub fn parse(bytes: &[u8]) -> Result<Self, ContainerError> {
        if bytes.len() < ATTACHMENT_ENTRY_SIZE {
            return Err(ContainerError::corrupt("attachment entry truncated"));
        }
        if &bytes[0..2] != A1_SCHEMA {
            return Err(ContainerError::corrupt("unknown attachment entry schema"));
        }
        let file_position = read_i64_le(&bytes[12..20]);
        if file_position < 0 {
            return Err(ContainerError::corrupt("negative attachment file position"));
        }
        let mut content_guid = [0u8; 16];
        content_guid.copy_from_slice(&bytes[24..40]);

        Ok(Self {
            file_position: file_position as u64,
            file_part: read_i32_le(&bytes[20..24]),
            content_guid,
            content_type: read_padded(&bytes[40..48]),
            name: read_padded(&bytes[48..128]),
        })
    }
}

fn copy_padded(dst: &mut [u8], value: &str) {
    let src = value.as_bytes();
    let len = src.len().min(dst.len());
    dst[..len].copy_from_slice(&src[..len]);
}

fn read_padded(bytes: &[u8]) -> String {
    let end = bytes.iter().position(|&b| b == 0).unwrap_or(bytes.len());
    String::from_utf8_lossy(&bytes[..end]).into_owned()
}

// =============================================================================
// Attachment segment
// =============================================================================

/// Serialize the data area of a `ZISRAWATTACH` segment.
pub fn encode_attachment_segment(entry: &AttachmentEntry, data: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(ATTACHMENT_HEADER_SIZE + data.len());
    out.extend_from_slice(&(data.len() as i64).to_le_bytes());
    out.extend_from_slice(&[0u8; 8]);
    out.extend_from_slice(&entry.to_bytes());
    out.resize(ATTACHMENT_HEADER_SIZE, 0);
    out.extend_from_slice(data);
    out
}

/// Parse an attachment segment into its entry and payload.
pub fn parse_attachment_segment(data: Bytes) -> Result<(AttachmentEntry, Bytes), ContainerError> {
    if data.len() < ATTACHMENT_HEADER_SIZE {
        return Err(ContainerError::corrupt("attachment segment truncated"));
    }
    let size = read_i64_le(&data[0..8]);
    if size < 0 || ATTACHMENT_HEADER_SIZE as u64 + size as u64 > data.len() as u64 {
        return Err(ContainerError::corrupt(format!(
            "attachment segment declares {} bytes but holds {}",
            size,
            data.len() - ATTACHMENT_HEADER_SIZE
        )));
    }
    let entry = AttachmentEntry::parse(
        &data[ATTACHMENT_ENTRY_OFFSET..ATTACHMENT_ENTRY_OFFSET + ATTACHMENT_ENTRY_SIZE],
    )?;
    let payload = data.slice(ATTACHMENT_HEADER_SIZE..ATTACHMENT_HEADER_SIZE + size as usize);
    Ok((entry, payload))
}

// =============================================================================
// Attachment directory
// =============================================================================

/// Serialize the data area of a `ZISRAWATTDIR` segment.
pub fn encode_attachment_directory(entries: &[AttachmentEntry]) -> Vec<u8> {
    let mut out =
        Vec::with_capacity(ATTACHMENT_HEADER_SIZE + entries.len() * ATTACHMENT_ENTRY_SIZE);
    out.extend_from_slice(&(entries.len() as i32).to_le_bytes());
    out.resize(ATTACHMENT_HEADER_SIZE, 0);
    for entry in entries {
        out.extend_from_slice(&entry.to_bytes());
    }
    out
}

pub fn parse_attachment_directory(data: &[u8]) -> Result<Vec<AttachmentEntry>, ContainerError> {
    if data.len() < ATTACHMENT_HEADER_SIZE {
        return Err(ContainerError::corrupt("attachment directory truncated"));
    }
    let count = read_i32_le(&data[0..4]);
    if count < 0 {
        return Err(ContainerError::corrupt("negative attachment count"));
    }
    let needed = ATTACHMENT_HEADER_SIZE as u64 + count as u64 * ATTACHMENT_ENTRY_SIZE as u64;
    if needed > data.len() as u64 {
        return Err(ContainerError::corrupt(format!(
            "attachment directory declares {} entries but holds {} bytes",
            count,
            data.len()
        )));
    }

    data[ATTACHMENT_HEADER_SIZE..needed as usize]
        .chunks_exact(ATTACHMENT_ENTRY_SIZE)
        .map(AttachmentEntry::parse)
        .collect()
}
