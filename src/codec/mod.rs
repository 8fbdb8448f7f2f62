//! Codec registry.
//!
//! Every subblock names its compression with an integer identifier. The
//! registry maps identifiers to a pair of plain function pointers:
//!
//! ```text
//! decode(raw payload, pixel type, width, height) -> packed pixels
//! encode(pixel buffer)                           -> raw payload
//! ```
//!
//! Codecs are pure functions, so a registry can be shared freely between
//! threads. A registry never changes after it is built: extra codecs are
//! registered with [`CodecRegistry::builder`] before opening a container.
//!
//! # Built-in codecs
//!
//! | Id | Name         | Decode | Encode |
//! |----|--------------|--------|--------|
//! | 0  | Uncompressed | yes    | yes    |
//! | 1  | JPEG         | yes    | yes    |
//! | 5  | Zstd0        | yes    | yes    |
//! | 6  | Zstd1        | yes    | yes    |
//!
//! LZW (2) and JPEG-XR (4) have names but no built-in implementation.
//! Subblocks using them fail with [`CodecError::UnsupportedCompression`]
//! unless the caller registers a codec.

mod jpeg;
mod raw;
mod zstandard;

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, OnceLock};

use crate::error::CodecError;
use crate::pixel::{PixelBuffer, PixelType};

pub use jpeg::DEFAULT_JPEG_QUALITY;

// =============================================================================
// Identifiers
// =============================================================================

pub const COMPRESSION_NONE: i32 = 0;
pub const COMPRESSION_JPEG: i32 = 1;
pub const COMPRESSION_LZW: i32 = 2;
pub const COMPRESSION_JPEG_XR: i32 = 4;
pub const COMPRESSION_ZSTD0: i32 = 5;
pub const COMPRESSION_ZSTD1: i32 = 6;

/// Human-readable name of a compression identifier.
pub fn compression_name(id: i32) -> &'static str {
    match id {
        COMPRESSION_NONE => "Uncompressed",
        COMPRESSION_JPEG => "JPEG",
        COMPRESSION_LZW => "LZW",
        COMPRESSION_JPEG_XR => "JPEG-XR",
        COMPRESSION_ZSTD0 => "Zstd0",
        COMPRESSION_ZSTD1 => "Zstd1",
        _ => "Unknown",
    }
}

// =============================================================================
// Codec
// =============================================================================

/// Decode a payload into packed pixels of the given geometry.
pub type DecodeFn = fn(&[u8], PixelType, u32, u32) -> Result<Vec<u8>, CodecError>;

/// Encode a pixel buffer into a payload.
pub type EncodeFn = fn(&PixelBuffer) -> Result<Vec<u8>, CodecError>;

/// A registered codec.
#[derive(Clone, Copy)]
pub struct Codec {
    pub id: i32,
    pub name: &'static str,
    pub decode: DecodeFn,
    /// `None` for decode-only codecs
    pub encode: Option<EncodeFn>,
}

impl fmt::Debug for Codec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Codec")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("encode", &self.encode.is_some())
            .finish()
    }
}

// =============================================================================
// CodecRegistry
// =============================================================================

/// Immutable mapping from compression identifier to codec.
#[derive(Debug, Clone)]
pub struct CodecRegistry {
    codecs: HashMap<i32, Codec>,
}

static GLOBAL_REGISTRY: OnceLock<Arc<CodecRegistry>> = OnceLock::new();

impl CodecRegistry {
    /// The process-wide registry with the built-in codecs.
    pub fn global() -> Arc<CodecRegistry> {
        GLOBAL_REGISTRY
            .get_or_init(|| Arc::new(CodecRegistry::builder().build()))
            .clone()
    }

    /// A builder pre-populated with the built-in codecs.
    pub fn builder() -> CodecRegistryBuilder {
        CodecRegistryBuilder::empty()
            .register(raw::CODEC)
            .register(jpeg::CODEC)
            .register(zstandard::ZSTD0)
            .register(zstandard::ZSTD1)
    }

    pub fn get(&self, id: i32) -> Option<&Codec> {
        self.codecs.get(&id)
    }

    pub fn contains(&self, id: i32) -> bool {
        self.codecs.contains_key(&id)
    }

    /// Registered identifiers, ascending.
    pub fn ids(&self) -> Vec<i32> {
        let mut ids: Vec<i32> = self.codecs.keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    /// Decode `raw` into a buffer of the declared geometry.
    ///
    /// # Errors
    /// `UnsupportedCompression` if nothing is registered for `id`;
    /// `GeometryMismatch` if the codec output has the wrong size;
    /// `Decode` if the geometry does not fit in memory.
    pub fn decode(
        &self,
        id: i32,
        raw: &[u8],
        pixel_type: PixelType,
        width: u32,
        height: u32,
    ) -> Result<PixelBuffer, CodecError> {
        let codec = self
            .get(id)
            .ok_or(CodecError::UnsupportedCompression(id))?;

        let expected = decoded_len(pixel_type, width, height)?;
        let data = (codec.decode)(raw, pixel_type, width, height)?;
        let actual = data.len();
        PixelBuffer::from_vec(pixel_type, width, height, data)
            .ok_or(CodecError::GeometryMismatch { expected, actual })
    }

    /// Encode a buffer with codec `id`.
    pub fn encode(&self, id: i32, buffer: &PixelBuffer) -> Result<Vec<u8>, CodecError> {
        let codec = self
            .get(id)
            .ok_or(CodecError::UnsupportedCompression(id))?;
        let encode = codec.encode.ok_or(CodecError::EncodeNotSupported(id))?;
        encode(buffer)
    }
}

/// Byte length a decoder must produce for this geometry.
pub(crate) fn decoded_len(
    pixel_type: PixelType,
    width: u32,
    height: u32,
) -> Result<usize, CodecError> {
    PixelBuffer::expected_len(pixel_type, width, height).ok_or_else(|| CodecError::Decode {
        message: format!("{}x{} {} exceeds the address space", width, height, pixel_type),
    })
}

/// Builds a [`CodecRegistry`].
#[derive(Debug, Default)]
pub struct CodecRegistryBuilder {
    codecs: HashMap<i32, Codec>,
}

impl CodecRegistryBuilder {
    /// A builder with no codecs at all.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Register a codec, replacing any earlier one with the same identifier.
    pub fn register(mut self, codec: Codec) -> Self {
        self.codecs.insert(codec.id, codec);
        self
    }

    pub fn build(self) -> CodecRegistry {
        CodecRegistry {
            codecs: self.codecs,
        }
    }
}
