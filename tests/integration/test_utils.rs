//! Test utilities for integration tests.
//!
//! Pixel buffer generators, a range reader that counts requests, and helpers
//! to build containers in memory or on disk.

use std::io::Cursor;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use bytes::Bytes;

use zisraw::error::IoError;
use zisraw::format::FileHeader;
use zisraw::io::{MemoryRangeReader, RangeReader};
use zisraw::{Container, ContainerWriter, OpenOptions, PixelBuffer, PixelType, WriterOptions};

// =============================================================================
// Pixel Buffers
// =============================================================================

/// A Gray8 buffer filled with `value`.
pub fn gray8(width: u32, height: u32, value: u8) -> PixelBuffer {
    PixelBuffer::from_vec(
        PixelType::Gray8,
        width,
        height,
        vec![value; (width * height) as usize],
    )
    .unwrap()
}

/// A buffer of `pixel_type` whose bytes follow a fixed pseudo-random pattern.
pub fn pattern(pixel_type: PixelType, width: u32, height: u32, seed: u32) -> PixelBuffer {
    let len = PixelBuffer::expected_len(pixel_type, width, height).unwrap();
    let mut state = seed.wrapping_mul(2_654_435_761).wrapping_add(1);
    let mut data = Vec::with_capacity(len);
    for _ in 0..len {
        state ^= state << 13;
        state ^= state >> 17;
        state ^= state << 5;
        data.push((state >> 24) as u8);
    }
    if pixel_type == PixelType::Gray32Float {
        // Keep every float finite and in [0, 1]
        for chunk in data.chunks_exact_mut(4) {
            let value = u16::from_le_bytes([chunk[0], chunk[1]]) as f32 / u16::MAX as f32;
            chunk.copy_from_slice(&value.to_le_bytes());
        }
    }
    PixelBuffer::from_vec(pixel_type, width, height, data).unwrap()
}

/// A Gray16 horizontal ramp.
pub fn gray16_ramp(width: u32, height: u32) -> PixelBuffer {
    let mut data = Vec::with_capacity((width * height * 2) as usize);
    for _ in 0..height {
        for x in 0..width {
            data.extend_from_slice(&((x * 257) as u16).to_le_bytes());
        }
    }
    PixelBuffer::from_vec(PixelType::Gray16, width, height, data).unwrap()
}

// =============================================================================
// Containers
// =============================================================================

/// Build a finalized container in memory.
pub fn build_container<F>(options: WriterOptions, fill: F) -> Vec<u8>
where
    F: FnOnce(&mut ContainerWriter<Cursor<Vec<u8>>>),
{
    let mut writer = ContainerWriter::new(Cursor::new(Vec::new()), options).unwrap();
    fill(&mut writer);
    writer.finalize().unwrap();
    writer.get_ref().get_ref().clone()
}

/// Open in-memory container bytes.
pub fn open_bytes(bytes: Vec<u8>) -> Container<MemoryRangeReader> {
    Container::from_reader(MemoryRangeReader::new(bytes), OpenOptions::default()).unwrap()
}

/// Build and finalize a container at `path`.
pub fn write_file<F>(path: &Path, options: WriterOptions, fill: F)
where
    F: FnOnce(&mut ContainerWriter<std::io::BufWriter<std::fs::File>>),
{
    let mut writer = ContainerWriter::create_with(path, options).unwrap();
    fill(&mut writer);
    writer.finalize().unwrap();
}

/// Parse the file header of container bytes.
pub fn file_header(bytes: &[u8]) -> FileHeader {
    FileHeader::parse(&bytes[32..]).unwrap()
}

// =============================================================================
// Tracking Reader
// =============================================================================

/// An in-memory range reader that counts read requests.
#[derive(Clone)]
pub struct TrackingReader {
    data: Bytes,
    request_count: Arc<AtomicUsize>,
}

impl TrackingReader {
    pub fn new(data: Vec<u8>) -> Self {
        Self {
            data: Bytes::from(data),
            request_count: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn request_count(&self) -> usize {
        self.request_count.load(Ordering::SeqCst)
    }
}

impl RangeReader for TrackingReader {
    fn read_exact_at(&self, offset: u64, len: usize) -> Result<Bytes, IoError> {
        self.request_count.fetch_add(1, Ordering::SeqCst);
        let end = offset + len as u64;
        if end > self.data.len() as u64 {
            return Err(IoError::RangeOutOfBounds {
                offset,
                requested: len as u64,
                size: self.data.len() as u64,
            });
        }
        Ok(self.data.slice(offset as usize..end as usize))
    }

    fn size(&self) -> u64 {
        self.data.len() as u64
    }

    fn identifier(&self) -> &str {
        "tracking"
    }
}
