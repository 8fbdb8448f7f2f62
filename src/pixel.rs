//! Pixel types and packed pixel buffers.

use serde::Serialize;

use crate::error::ContainerError;
use crate::io::{read_f32_le, read_u16_le};

/// Pixel layout of a subblock.
///
/// The numeric identifiers are the ones stored in directory entries.
/// Color types store components in B, G, R order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum PixelType {
    Gray8,
    Gray16,
    Gray32Float,
    Bgr24,
    Bgr48,
    Bgra32,
}

impl PixelType {
    /// Identifier stored on disk.
    pub const fn id(self) -> i32 {
        match self {
            PixelType::Gray8 => 0,
            PixelType::Gray16 => 1,
            PixelType::Gray32Float => 2,
            PixelType::Bgr24 => 3,
            PixelType::Bgr48 => 4,
            PixelType::Bgra32 => 9,
        }
    }

    pub fn from_id(id: i32) -> Result<Self, ContainerError> {
        match id {
            0 => Ok(PixelType::Gray8),
            1 => Ok(PixelType::Gray16),
            2 => Ok(PixelType::Gray32Float),
            3 => Ok(PixelType::Bgr24),
            4 => Ok(PixelType::Bgr48),
            9 => Ok(PixelType::Bgra32),
            other => Err(ContainerError::UnsupportedPixelType(other)),
        }
    }

    pub const fn name(self) -> &'static str {
        match self {
            PixelType::Gray8 => "Gray8",
            PixelType::Gray16 => "Gray16",
            PixelType::Gray32Float => "Gray32Float",
            PixelType::Bgr24 => "Bgr24",
            PixelType::Bgr48 => "Bgr48",
            PixelType::Bgra32 => "Bgra32",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        [
            PixelType::Gray8,
            PixelType::Gray16,
            PixelType::Gray32Float,
            PixelType::Bgr24,
            PixelType::Bgr48,
            PixelType::Bgra32,
        ]
        .into_iter()
        .find(|p| p.name().eq_ignore_ascii_case(name))
    }

    /// Number of components per pixel.
    pub const fn components(self) -> usize {
        match self {
            PixelType::Gray8 | PixelType::Gray16 | PixelType::Gray32Float => 1,
            PixelType::Bgr24 | PixelType::Bgr48 => 3,
            PixelType::Bgra32 => 4,
        }
    }

    /// Bytes per component.
    pub const fn component_bytes(self) -> usize {
        match self {
            PixelType::Gray8 | PixelType::Bgr24 | PixelType::Bgra32 => 1,
            PixelType::Gray16 | PixelType::Bgr48 => 2,
            PixelType::Gray32Float => 4,
        }
    }

    pub const fn bytes_per_pixel(self) -> usize {
        self.components() * self.component_bytes()
    }

    /// Bits per component, as declared in metadata.
    pub const fn bit_count(self) -> u32 {
        (self.component_bytes() * 8) as u32
    }

    /// Largest representable component value.
    ///
    /// Float data is treated as normalized to `[0, 1]`.
    pub const fn max_value(self) -> f32 {
        match self.component_bytes() {
            1 => u8::MAX as f32,
            2 => u16::MAX as f32,
            _ => 1.0,
        }
    }

    pub const fn is_color(self) -> bool {
        self.components() > 1
    }
}

impl std::fmt::Display for PixelType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// A packed, row-major pixel buffer (no row padding).
#[derive(Debug, Clone, PartialEq)]
pub struct PixelBuffer {
    pixel_type: PixelType,
    width: u32,
    height: u32,
    data: Vec<u8>,
}

impl PixelBuffer {
    /// A zero-filled buffer.
    ///
    /// # Panics
    /// Panics if the byte length does not fit in `usize`.
    pub fn new(pixel_type: PixelType, width: u32, height: u32) -> Self {
        let Some(len) = Self::expected_len(pixel_type, width, height) else {
            panic!("{}x{} {} buffer exceeds the address space", width, height, pixel_type);
        };
        Self {
            pixel_type,
            width,
            height,
            data: vec![0; len],
        }
    }

    /// Wrap existing bytes. Returns `None` if the length does not match the
    /// geometry.
    pub fn from_vec(
        pixel_type: PixelType,
        width: u32,
        height: u32,
        data: Vec<u8>,
    ) -> Option<Self> {
        if Some(data.len()) != Self::expected_len(pixel_type, width, height) {
            return None;
        }
        Some(Self {
            pixel_type,
            width,
            height,
            data,
        })
    }

    /// Byte length of a buffer with this geometry, or `None` if it does not
    /// fit in `usize`.
    pub fn expected_len(pixel_type: PixelType, width: u32, height: u32) -> Option<usize> {
        (width as usize)
            .checked_mul(height as usize)?
            .checked_mul(pixel_type.bytes_per_pixel())
    }

    pub fn pixel_type(&self) -> PixelType {
        self.pixel_type
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    /// Bytes per row.
    pub fn stride(&self) -> usize {
        self.width as usize * self.pixel_type.bytes_per_pixel()
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn data_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }

    pub fn into_vec(self) -> Vec<u8> {
        self.data
    }

    pub fn row(&self, y: u32) -> &[u8] {
        let stride = self.stride();
        let start = y as usize * stride;
        &self.data[start..start + stride]
    }

    /// Read one component as a float in the pixel type's native scale.
    ///
    /// # Panics
    /// Panics if the position is outside the buffer.
    #[inline]
    pub fn sample(&self, x: u32, y: u32, component: usize) -> f32 {
        let bpp = self.pixel_type.bytes_per_pixel();
        let cb = self.pixel_type.component_bytes();
        let offset = y as usize * self.stride() + x as usize * bpp + component * cb;
        match self.pixel_type {
            PixelType::Gray8 | PixelType::Bgr24 | PixelType::Bgra32 => self.data[offset] as f32,
            PixelType::Gray16 | PixelType::Bgr48 => read_u16_le(&self.data[offset..]) as f32,
            PixelType::Gray32Float => read_f32_le(&self.data[offset..]),
        }
    }

    /// Copy `src` into this buffer with its top-left corner at `(dst_x, dst_y)`,
    /// clipping whatever falls outside. Nothing is written if the pixel types
    /// differ.
    ///
    /// Returns the number of pixels written.
    pub fn blit(&mut self, src: &PixelBuffer, dst_x: i64, dst_y: i64) -> u64 {
        if self.pixel_type != src.pixel_type {
            return 0;
        }

        let bpp = self.pixel_type.bytes_per_pixel();

        let x0 = dst_x.max(0);
        let y0 = dst_y.max(0);
        let x1 = (dst_x + src.width as i64).min(self.width as i64);
        let y1 = (dst_y + src.height as i64).min(self.height as i64);
        if x0 >= x1 || y0 >= y1 {
            return 0;
        }

        let run = (x1 - x0) as usize * bpp;
        let src_x = (x0 - dst_x) as usize;
        let dst_stride = self.stride();
        let src_stride = src.stride();

        for y in y0..y1 {
            let sy = (y - dst_y) as usize;
            let s = sy * src_stride + src_x * bpp;
            let d = y as usize * dst_stride + x0 as usize * bpp;
            self.data[d..d + run].copy_from_slice(&src.data[s..s + run]);
        }

        (x1 - x0) as u64 * (y1 - y0) as u64
    }
}
