//! Zstandard payloads.
//!
//! `Zstd0` is a bare zstd frame. `Zstd1` prefixes the frame with a small
//! header:
//!
//! ```text
//! Byte 0: header size (1 or 3)
//! Byte 1: chunk type (1 = packing flags)       only when size is 3
//! Byte 2: bit 0 set = hi/lo byte packing         only when size is 3
//! ```
//!
//! With hi/lo packing, 16-bit samples are split so that all low bytes come
//! first and all high bytes follow, which compresses noticeably better for
//! microscopy data.

use std::io::Read;

use super::{decoded_len, Codec, COMPRESSION_ZSTD0, COMPRESSION_ZSTD1};
use crate::error::CodecError;
use crate::pixel::{PixelBuffer, PixelType};

/// Compression level used when writing
const ZSTD_LEVEL: i32 = 3;

/// Largest buffer reserved before any data is decompressed
const INITIAL_CAPACITY: usize = 64 << 20;

const CHUNK_TYPE_PACKING: u8 = 1;
const FLAG_HILO: u8 = 0x01;

pub(super) const ZSTD0: Codec = Codec {
    id: COMPRESSION_ZSTD0,
    name: "Zstd0",
    decode: decode_zstd0,
    encode: Some(encode_zstd0),
};

pub(super) const ZSTD1: Codec = Codec {
    id: COMPRESSION_ZSTD1,
    name: "Zstd1",
    decode: decode_zstd1,
    encode: Some(encode_zstd1),
};

/// Decompress at most `expected + 1` bytes.
///
/// The output grows with the data actually in the stream, so a corrupt
/// geometry cannot force a large allocation up front. Overlong output is
/// left for the registry's length check.
fn decompress(raw: &[u8], expected: usize) -> Result<Vec<u8>, CodecError> {
    let decode_error = |e: std::io::Error| CodecError::Decode {
        message: format!("zstd: {}", e),
    };
    let decoder = zstd::stream::read::Decoder::new(raw).map_err(decode_error)?;
    let mut out = Vec::with_capacity(expected.min(INITIAL_CAPACITY));
    decoder
        .take(expected as u64 + 1)
        .read_to_end(&mut out)
        .map_err(decode_error)?;
    Ok(out)
}

fn compress(data: &[u8]) -> Result<Vec<u8>, CodecError> {
    zstd::bulk::compress(data, ZSTD_LEVEL).map_err(|e| CodecError::Encode {
        message: format!("zstd: {}", e),
    })
}

fn decode_zstd0(
    raw: &[u8],
    pixel_type: PixelType,
    width: u32,
    height: u32,
) -> Result<Vec<u8>, CodecError> {
    decompress(raw, decoded_len(pixel_type, width, height)?)
}

fn encode_zstd0(buffer: &PixelBuffer) -> Result<Vec<u8>, CodecError> {
    compress(buffer.data())
}

fn decode_zstd1(
    raw: &[u8],
    pixel_type: PixelType,
    width: u32,
    height: u32,
) -> Result<Vec<u8>, CodecError> {
    let header_size = *raw.first().ok_or_else(|| CodecError::Decode {
        message: "zstd1 payload is empty".to_string(),
    })? as usize;

    let hilo = match header_size {
        1 => false,
        3 if raw.len() >= 3 => {
            if raw[1] != CHUNK_TYPE_PACKING {
                return Err(CodecError::Decode {
                    message: format!("zstd1 unknown chunk type {}", raw[1]),
                });
            }
            raw[2] & FLAG_HILO != 0
        }
        other => {
            return Err(CodecError::Decode {
                message: format!("zstd1 invalid header size {}", other),
            })
        }
    };

    let data = decompress(&raw[header_size..], decoded_len(pixel_type, width, height)?)?;

    if hilo && pixel_type.component_bytes() == 2 {
        Ok(unpack_hilo(&data))
    } else {
        Ok(data)
    }
}

fn encode_zstd1(buffer: &PixelBuffer) -> Result<Vec<u8>, CodecError> {
    if buffer.pixel_type().component_bytes() == 2 {
        let mut out = vec![3, CHUNK_TYPE_PACKING, FLAG_HILO];
        out.extend_from_slice(&compress(&pack_hilo(buffer.data()))?);
        Ok(out)
    } else {
        let mut out = vec![1];
        out.extend_from_slice(&compress(buffer.data())?);
        Ok(out)
    }
}

/// Low bytes first, then high bytes.
fn pack_hilo(data: &[u8]) -> Vec<u8> {
    let half = data.len() / 2;
    let mut out = vec![0u8; data.len()];
    for (i, pair) in data.chunks_exact(2).enumerate() {
        out[i] = pair[0];
        out[half + i] = pair[1];
    }
    out
}

fn unpack_hilo(data: &[u8]) -> Vec<u8> {
    let half = data.len() / 2;
    let mut out = vec![0u8; data.len()];
    for i in 0..half {
        out[2 * i] = data[i];
        out[2 * i + 1] = data[half + i];
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hilo_packing() {
        let data = [0x01, 0xA1, 0x02, 0xA2, 0x03, 0xA3];
        let packed = pack_hilo(&data);
        assert_eq!(packed, vec![0x01, 0x02, 0x03, 0xA1, 0xA2, 0xA3]);
        assert_eq!(unpack_hilo(&packed), data.to_vec());
    }

    #[test]
    fn test_zstd1_header_for_16_bit() {
        let buffer = PixelBuffer::new(PixelType::Gray16, 8, 8);
        let payload = encode_zstd1(&buffer).unwrap();
        assert_eq!(&payload[..3], &[3, CHUNK_TYPE_PACKING, FLAG_HILO]);

        let buffer = PixelBuffer::new(PixelType::Gray8, 8, 8);
        assert_eq!(encode_zstd1(&buffer).unwrap()[0], 1);
    }

    #[test]
    fn test_zstd1_rejects_bad_header() {
        assert!(decode_zstd1(&[], PixelType::Gray8, 1, 1).is_err());
        assert!(decode_zstd1(&[2, 0, 0], PixelType::Gray8, 1, 1).is_err());
    }

    #[test]
    fn test_zstd0_garbage_is_decode_error() {
        let err = decode_zstd0(&[1, 2, 3, 4], PixelType::Gray8, 2, 2).unwrap_err();
        assert!(matches!(err, CodecError::Decode { .. }));
    }
}
