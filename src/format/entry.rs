//! Subblock directory entries and the directory segment.
//!
//! # `DV` entry layout
//!
//! ```text
//! Bytes  0-1:  Schema "DV"
//! Bytes  2-5:  Pixel type (i32)
//! Bytes  6-13: File position of the subblock segment (i64)
//! Bytes 14-17: File part (i32)
//! Bytes 18-21: Compression (i32)
//! Byte     22: Pyramid level (u8)
//! Bytes 23-27: Spare
//! Bytes 28-31: Dimension count (i32)
//! Then per dimension, 20 bytes:
//!   0-3 name, 4-7 start (i32), 8-11 size (i32),
//!   12-15 start coordinate (f32), 16-19 stored size (i32)
//! ```
//!
//! X and Y carry the level-local rectangle. Every other dimension carries its
//! index as `start` with a size of 1.
//!
//! # Directory segment layout
//!
//! ```text
//! Bytes   0-3:   Entry count (i32)
//! Bytes   4-127: Reserved
//! Then the entries, then a CRC-32 (u32) over the entry bytes.
//! ```

use crate::coordinate::{Coordinate, Dimension};
use crate::error::ContainerError;
use crate::geometry::IntRect;
use crate::io::{read_i32_le, read_i64_le};
use crate::pixel::PixelType;

/// Fixed part of a `DV` entry
pub const DV_FIXED_SIZE: usize = 32;

/// Size of one dimension record inside a `DV` entry
pub const DIMENSION_ENTRY_SIZE: usize = 20;

/// Fixed header of the directory segment
pub const DIRECTORY_HEADER_SIZE: usize = 128;

/// Upper bound on dimension records in one entry
const MAX_DIMENSION_ENTRIES: i32 = 32;

/// Largest pixel area one subblock may declare
pub const MAX_SUBBLOCK_PIXELS: u64 = 1 << 30;

const DV_SCHEMA: &[u8; 2] = b"DV";

/// A directory entry: where one subblock lives and what it contains.
#[derive(Debug, Clone, PartialEq)]
pub struct SubBlockEntry {
    pub coordinate: Coordinate,
    /// Pyramid level (0 = full resolution)
    pub level: u8,
    /// Pixel rectangle in level-local coordinates
    pub rect: IntRect,
    pub pixel_type: PixelType,
    /// Compression identifier (see [`crate::codec`])
    pub compression: i32,
    /// Offset of the `ZISRAWSUBBLOCK` segment
    pub file_position: u64,
    pub file_part: i32,
}

impl SubBlockEntry {
    /// Size of the serialized entry.
    pub fn encoded_len(&self) -> usize {
        DV_FIXED_SIZE + (2 + self.coordinate.len()) * DIMENSION_ENTRY_SIZE
    }

    /// Serialize as a `DV` entry.
    pub fn to_bytes(&self) -> Vec<u8> {
        let dimension_count = 2 + self.coordinate.len();
        let mut out = Vec::with_capacity(self.encoded_len());

        out.extend_from_slice(DV_SCHEMA);
        out.extend_from_slice(&self.pixel_type.id().to_le_bytes());
        out.extend_from_slice(&(self.file_position as i64).to_le_bytes());
        out.extend_from_slice(&self.file_part.to_le_bytes());
        out.extend_from_slice(&self.compression.to_le_bytes());
        out.push(self.level);
        out.extend_from_slice(&[0u8; 5]);
        out.extend_from_slice(&(dimension_count as i32).to_le_bytes());

        write_dimension(&mut out, 'X', self.rect.x, self.rect.w as i32);
        write_dimension(&mut out, 'Y', self.rect.y, self.rect.h as i32);
        for (dimension, index) in self.coordinate.iter() {
            write_dimension(&mut out, dimension.letter(), index, 1);
        }

        out
    }

    /// Parse a `DV` entry, returning it and the number of bytes consumed.
    pub fn parse(bytes: &[u8]) -> Result<(Self, usize), ContainerError> {
        if bytes.len() < DV_FIXED_SIZE {
            return Err(ContainerError::corrupt("directory entry truncated"));
        }
        if &bytes[0..2] != DV_SCHEMA {
            return Err(ContainerError::corrupt(format!(
                "unknown directory entry schema {:?}",
                String::from_utf8_lossy(&bytes[0..2])
            )));
        }

        let pixel_type = PixelType::from_id(read_i32_le(&bytes[2..6]))?;
        let file_position = read_i64_le(&bytes[6..14]);
        if file_position < 0 {
            return Err(ContainerError::corrupt("negative subblock file position"));
        }
        let file_part = read_i32_le(&bytes[14..18]);
        let compression = read_i32_le(&bytes[18..22]);
        let level = bytes[22];
        let dimension_count = read_i32_le(&bytes[28..32]);
        if !(0..=MAX_DIMENSION_ENTRIES).contains(&dimension_count) {
            return Err(ContainerError::corrupt(format!(
                "implausible dimension count {}",
                dimension_count
            )));
        }

        let total = DV_FIXED_SIZE + dimension_count as usize * DIMENSION_ENTRY_SIZE;
        if bytes.len() < total {
            return Err(ContainerError::corrupt("directory entry dimensions truncated"));
        }

        let mut coordinate = Coordinate::new();
        let mut x = None;
        let mut y = None;

        for i in 0..dimension_count as usize {
            let rec = &bytes[DV_FIXED_SIZE + i * DIMENSION_ENTRY_SIZE..][..DIMENSION_ENTRY_SIZE];
            let letter = rec[0] as char;
            let start = read_i32_le(&rec[4..8]);
            let size = read_i32_le(&rec[8..12]);

            match letter {
                'X' | 'Y' => {
                    if size < 0 {
                        return Err(ContainerError::corrupt(format!(
                            "negative {} extent in directory entry",
                            letter
                        )));
                    }
                    if letter == 'X' {
                        x = Some((start, size as u32));
                    } else {
                        y = Some((start, size as u32));
                    }
                }
                other => {
                    let dimension = Dimension::from_letter(other).ok_or_else(|| {
                        ContainerError::corrupt(format!("unknown dimension '{}'", other))
                    })?;
                    coordinate = coordinate.with(dimension, start);
                }
            }
        }

        let ((x, w), (y, h)) = match (x, y) {
            (Some(x), Some(y)) => (x, y),
            _ => {
                return Err(ContainerError::corrupt(
                    "directory entry lacks X or Y dimension",
                ))
            }
        };

        if w as u64 * h as u64 > MAX_SUBBLOCK_PIXELS {
            return Err(ContainerError::corrupt(format!(
                "directory entry declares {}x{} pixels",
                w, h
            )));
        }

        Ok((
            SubBlockEntry {
                coordinate,
                level,
                rect: IntRect::new(x, y, w, h),
                pixel_type,
                compression,
                file_position: file_position as u64,
                file_part,
            },
            total,
        ))
    }
}

fn write_dimension(out: &mut Vec<u8>, letter: char, start: i32, size: i32) {
    let mut name = [0u8; 4];
    name[0] = letter as u8;
    out.extend_from_slice(&name);
    out.extend_from_slice(&start.to_le_bytes());
    out.extend_from_slice(&size.to_le_bytes());
    out.extend_from_slice(&(start as f32).to_le_bytes());
    out.extend_from_slice(&size.to_le_bytes());
}

// =============================================================================
// Directory segment
// =============================================================================

/// Serialize the data area of a `ZISRAWDIRECTORY` segment.
pub fn encode_directory_segment<'a>(
    entries: impl IntoIterator<Item = &'a SubBlockEntry>,
) -> Vec<u8> {
    let mut body = Vec::new();
    let mut count: i32 = 0;
    for entry in entries {
        body.extend_from_slice(&entry.to_bytes());
        count += 1;
    }

    let mut out = Vec::with_capacity(DIRECTORY_HEADER_SIZE + body.len() + 4);
    out.extend_from_slice(&count.to_le_bytes());
    out.extend_from_slice(&[0u8; DIRECTORY_HEADER_SIZE - 4]);
    out.extend_from_slice(&body);
    out.extend_from_slice(&crc32fast::hash(&body).to_le_bytes());
    out
}

/// Parse the data area of a `ZISRAWDIRECTORY` segment, verifying its checksum.
pub fn parse_directory_segment(data: &[u8]) -> Result<Vec<SubBlockEntry>, ContainerError> {
    if data.len() < DIRECTORY_HEADER_SIZE + 4 {
        return Err(ContainerError::corrupt("directory segment truncated"));
    }

    let count = read_i32_le(&data[0..4]);
    if count < 0 {
        return Err(ContainerError::corrupt("negative directory entry count"));
    }

    let mut entries = Vec::with_capacity((count as usize).min(1 << 16));
    let mut pos = DIRECTORY_HEADER_SIZE;
    let body_end = data.len() - 4;

    for _ in 0..count {
        let (entry, consumed) = SubBlockEntry::parse(&data[pos..body_end])?;
        entries.push(entry);
        pos += consumed;
    }

    let stored_crc = u32::from_le_bytes([data[pos], data[pos + 1], data[pos + 2], data[pos + 3]]);
    let actual_crc = crc32fast::hash(&data[DIRECTORY_HEADER_SIZE..pos]);
    if stored_crc != actual_crc {
        return Err(ContainerError::corrupt(format!(
            "directory checksum mismatch: stored {:08x}, computed {:08x}",
            stored_crc, actual_crc
        )));
    }

    Ok(entries)
}
