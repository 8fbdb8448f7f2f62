//! JPEG payloads, for 8-bit gray and BGR subblocks.
//!
//! Color subblocks store B, G, R while JPEG works in R, G, B, so components
//! are swapped on both paths.

use std::io::Cursor;

use image::codecs::jpeg::JpegEncoder;
use image::{ExtendedColorType, ImageFormat, ImageReader};

use super::{Codec, COMPRESSION_JPEG};
use crate::error::CodecError;
use crate::pixel::{PixelBuffer, PixelType};

/// Quality used when the writer encodes JPEG subblocks (1-100).
pub const DEFAULT_JPEG_QUALITY: u8 = 90;

pub(super) const CODEC: Codec = Codec {
    id: COMPRESSION_JPEG,
    name: "JPEG",
    decode,
    encode: Some(encode),
};

fn unsupported(pixel_type: PixelType) -> CodecError {
    CodecError::UnsupportedPixelType {
        codec: "JPEG",
        pixel_type: pixel_type.name(),
    }
}

fn swap_red_blue(data: &mut [u8]) {
    for px in data.chunks_exact_mut(3) {
        px.swap(0, 2);
    }
}

fn decode(
    raw: &[u8],
    pixel_type: PixelType,
    width: u32,
    height: u32,
) -> Result<Vec<u8>, CodecError> {
    let reader = ImageReader::with_format(Cursor::new(raw), ImageFormat::Jpeg);
    let img = reader.decode().map_err(|e| CodecError::Decode {
        message: e.to_string(),
    })?;

    if img.width() != width || img.height() != height {
        return Err(CodecError::Decode {
            message: format!(
                "JPEG is {}x{}, subblock declares {}x{}",
                img.width(),
                img.height(),
                width,
                height
            ),
        });
    }

    match pixel_type {
        PixelType::Gray8 => Ok(img.to_luma8().into_raw()),
        PixelType::Bgr24 => {
            let mut data = img.to_rgb8().into_raw();
            swap_red_blue(&mut data);
            Ok(data)
        }
        other => Err(unsupported(other)),
    }
}

fn encode(buffer: &PixelBuffer) -> Result<Vec<u8>, CodecError> {
    let (data, color) = match buffer.pixel_type() {
        PixelType::Gray8 => (buffer.data().to_vec(), ExtendedColorType::L8),
        PixelType::Bgr24 => {
            let mut rgb = buffer.data().to_vec();
            swap_red_blue(&mut rgb);
            (rgb, ExtendedColorType::Rgb8)
        }
        other => return Err(unsupported(other)),
    };

    let mut output = Vec::new();
    let mut encoder = JpegEncoder::new_with_quality(&mut output, DEFAULT_JPEG_QUALITY);
    encoder
        .encode(&data, buffer.width(), buffer.height(), color)
        .map_err(|e| CodecError::Encode {
            message: e.to_string(),
        })?;

    Ok(output)
}
