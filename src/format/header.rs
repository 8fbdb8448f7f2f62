//! File header segment.
//!
//! The first segment of every container is a `ZISRAWFILE` segment with a
//! 512-byte data area:
//!
//! ```text
//! Bytes   0-3:  Major version (u32, = 1)
//! Bytes   4-7:  Minor version (u32, = 0)
//! Bytes   8-15: Reserved
//! Bytes  16-31: Primary file GUID
//! Bytes  32-47: File GUID
//! Bytes  48-51: File part (u32)
//! Bytes  52-59: Directory segment position (u64, 0 = none)
//! Bytes  60-67: Metadata segment position (u64, 0 = none)
//! Bytes  68-71: Update pending (u32, non-zero while a writer is active)
//! Bytes  72-79: Attachment directory position (u64, 0 = none)
//! Bytes  80-83: Pyramid factor (u32, 0 = default of 2)
//! Bytes 84-511: Reserved
//! ```

use crate::error::ContainerError;
use crate::io::{read_u32_le, read_u64_le};

/// Size of the header data area
pub const FILE_HEADER_DATA_SIZE: usize = 512;

/// Supported major version
pub const MAJOR_VERSION: u32 = 1;

/// Minor version written by this crate
pub const MINOR_VERSION: u32 = 0;

/// Downsample between consecutive pyramid levels when none is declared
pub const DEFAULT_PYRAMID_FACTOR: u32 = 2;

/// Parsed file header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileHeader {
    pub major: u32,
    pub minor: u32,
    pub primary_file_guid: [u8; 16],
    pub file_guid: [u8; 16],
    pub file_part: u32,
    pub directory_position: u64,
    pub metadata_position: u64,
    pub update_pending: bool,
    pub attachment_directory_position: u64,
    pub pyramid_factor: u32,
}

impl FileHeader {
    /// Header written when a writer starts: nothing committed yet.
    pub fn provisional(pyramid_factor: u32) -> Self {
        Self {
            major: MAJOR_VERSION,
            minor: MINOR_VERSION,
            primary_file_guid: [0; 16],
            file_guid: [0; 16],
            file_part: 0,
            directory_position: 0,
            metadata_position: 0,
            update_pending: true,
            attachment_directory_position: 0,
            pyramid_factor,
        }
    }

    /// A container is readable only once a writer has committed the directory.
    pub fn is_finalized(&self) -> bool {
        !self.update_pending && self.directory_position != 0
    }

    /// Downsample between consecutive pyramid levels.
    pub fn effective_pyramid_factor(&self) -> u32 {
        if self.pyramid_factor < 2 {
            DEFAULT_PYRAMID_FACTOR
        } else {
            self.pyramid_factor
        }
    }

    pub fn parse(data: &[u8]) -> Result<Self, ContainerError> {
        if data.len() < 84 {
            return Err(ContainerError::corrupt(format!(
                "file header too small: {} bytes",
                data.len()
            )));
        }

        let major = read_u32_le(&data[0..4]);
        if major != MAJOR_VERSION {
            return Err(ContainerError::corrupt(format!(
                "unsupported major version {}",
                major
            )));
        }

        let mut primary_file_guid = [0u8; 16];
        primary_file_guid.copy_from_slice(&data[16..32]);
        let mut file_guid = [0u8; 16];
        file_guid.copy_from_slice(&data[32..48]);

        Ok(Self {
            major,
            minor: read_u32_le(&data[4..8]),
            primary_file_guid,
            file_guid,
            file_part: read_u32_le(&data[48..52]),
            directory_position: read_u64_le(&data[52..60]),
            metadata_position: read_u64_le(&data[60..68]),
            update_pending: read_u32_le(&data[68..72]) != 0,
            attachment_directory_position: read_u64_le(&data[72..80]),
            pyramid_factor: read_u32_le(&data[80..84]),
        })
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = vec![0u8; FILE_HEADER_DATA_SIZE];
        out[0..4].copy_from_slice(&self.major.to_le_bytes());
        out[4..8].copy_from_slice(&self.minor.to_le_bytes());
        out[16..32].copy_from_slice(&self.primary_file_guid);
        out[32..48].copy_from_slice(&self.file_guid);
        out[48..52].copy_from_slice(&self.file_part.to_le_bytes());
        out[52..60].copy_from_slice(&self.directory_position.to_le_bytes());
        out[60..68].copy_from_slice(&self.metadata_position.to_le_bytes());
        out[68..72].copy_from_slice(&(self.update_pending as u32).to_le_bytes());
        out[72..80].copy_from_slice(&self.attachment_directory_position.to_le_bytes());
        out[80..84].copy_from_slice(&self.pyramid_factor.to_le_bytes());
        out
    }
}
