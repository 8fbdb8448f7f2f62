//! Uncompressed payloads: packed pixels, row-major, no padding.

use super::{Codec, COMPRESSION_NONE};
use crate::error::CodecError;
use crate::pixel::{PixelBuffer, PixelType};

pub(super) const CODEC: Codec = Codec {
    id: COMPRESSION_NONE,
    name: "Uncompressed",
    decode,
    encode: Some(encode),
};

fn decode(raw: &[u8], _: PixelType, _: u32, _: u32) -> Result<Vec<u8>, CodecError> {
    Ok(raw.to_vec())
}

fn encode(buffer: &PixelBuffer) -> Result<Vec<u8>, CodecError> {
    Ok(buffer.data().to_vec())
}
