//! Region requests and their results.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::coordinate::Coordinate;
use crate::geometry::IntRect;
use crate::metadata::ChannelDisplaySetting;
use crate::pixel::{PixelBuffer, PixelType};

/// Which pyramid level a request reads from.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum LevelSelection {
    /// Read this level; the region is in level-local coordinates.
    Level(u8),
    /// Output scale relative to full resolution, in `(0, 1]`; the region is
    /// in level-0 coordinates.
    Zoom(f64),
}

/// A composite request.
#[derive(Debug, Clone)]
pub struct RegionRequest {
    /// Plane selection; channel and mosaic indices are ignored
    pub plane: Coordinate,
    pub level: LevelSelection,
    pub region: IntRect,
    /// `None` for every channel in the plane
    pub channels: Option<Vec<i32>>,
    /// Per-channel overrides of the stored display settings
    pub display_settings: HashMap<i32, ChannelDisplaySetting>,
    /// `Bgr24` or `Bgr48`
    pub output: PixelType,
    pub cancel: Option<Arc<AtomicBool>>,
}

impl RegionRequest {
    /// Level 0, all channels, the default plane, 8-bit output.
    pub fn new(region: IntRect) -> Self {
        Self {
            plane: Coordinate::new(),
            level: LevelSelection::Level(0),
            region,
            channels: None,
            display_settings: HashMap::new(),
            output: PixelType::Bgr24,
            cancel: None,
        }
    }

    pub fn plane(mut self, plane: Coordinate) -> Self {
        self.plane = plane;
        self
    }

    pub fn level(mut self, level: u8) -> Self {
        self.level = LevelSelection::Level(level);
        self
    }

    pub fn zoom(mut self, zoom: f64) -> Self {
        self.level = LevelSelection::Zoom(zoom);
        self
    }

    pub fn channels(mut self, channels: impl Into<Vec<i32>>) -> Self {
        self.channels = Some(channels.into());
        self
    }

    pub fn display_setting(mut self, channel: i32, setting: ChannelDisplaySetting) -> Self {
        self.display_settings.insert(channel, setting);
        self
    }

    pub fn output(mut self, output: PixelType) -> Self {
        self.output = output;
        self
    }

    /// Abort the request with `Cancelled` once `flag` is set.
    pub fn cancel_flag(mut self, flag: Arc<AtomicBool>) -> Self {
        self.cancel = Some(flag);
        self
    }

    pub(crate) fn is_cancelled(&self) -> bool {
        self.cancel
            .as_ref()
            .is_some_and(|flag| flag.load(Ordering::Relaxed))
    }
}

/// Result of a composite request.
#[derive(Debug, Clone, PartialEq)]
pub struct CompositeRaster {
    pixels: PixelBuffer,
    level: u8,
    source_region: IntRect,
}

impl CompositeRaster {
    pub(crate) fn new(pixels: PixelBuffer, level: u8, source_region: IntRect) -> Self {
        Self {
            pixels,
            level,
            source_region,
        }
    }

    /// The pyramid level that was read.
    pub fn level(&self) -> u8 {
        self.level
    }

    /// The region read at that level, in level-local coordinates.
    pub fn source_region(&self) -> IntRect {
        self.source_region
    }

    pub fn width(&self) -> u32 {
        self.pixels.width()
    }

    pub fn height(&self) -> u32 {
        self.pixels.height()
    }

    pub fn pixel_type(&self) -> PixelType {
        self.pixels.pixel_type()
    }

    pub fn pixels(&self) -> &PixelBuffer {
        &self.pixels
    }

    pub fn into_pixels(self) -> PixelBuffer {
        self.pixels
    }

    /// The raster as 8-bit RGB, row-major.
    pub fn to_rgb8(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.width() as usize * self.height() as usize * 3);
        let max = self.pixel_type().max_value();
        for y in 0..self.height() {
            for x in 0..self.width() {
                for component in [2, 1, 0] {
                    let value = self.pixels.sample(x, y, component) / max * 255.0;
                    out.push(value.round().clamp(0.0, 255.0) as u8);
                }
            }
        }
        out
    }
}
