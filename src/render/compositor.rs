//! Level resolution, stitching and channel blending.

use std::sync::Arc;

use rayon::prelude::*;
use tracing::debug;

use super::request::{CompositeRaster, LevelSelection, RegionRequest};
use super::TileProvider;
use crate::coordinate::{Coordinate, Dimension};
use crate::directory::SubBlockDirectory;
use crate::error::CompositeError;
use crate::format::SubBlockEntry;
use crate::geometry::IntRect;
use crate::metadata::{ChannelDisplaySetting, MetadataManager};
use crate::pixel::{PixelBuffer, PixelType};

/// Largest output raster a single request may produce, in pixels.
pub const MAX_OUTPUT_PIXELS: u64 = 1 << 30;

/// Reads regions of one container.
pub struct Compositor<'a, P> {
    directory: &'a SubBlockDirectory,
    tiles: &'a P,
    metadata: &'a MetadataManager,
    pyramid_factor: u32,
}

/// A level, the region to read there, and the output size.
#[derive(Debug, Clone, Copy, PartialEq)]
struct Resolution {
    level: u8,
    downsample: f64,
    level_region: IntRect,
    output_width: u32,
    output_height: u32,
}

impl<'a, P: TileProvider> Compositor<'a, P> {
    pub fn new(
        directory: &'a SubBlockDirectory,
        tiles: &'a P,
        metadata: &'a MetadataManager,
        pyramid_factor: u32,
    ) -> Self {
        Self {
            directory,
            tiles,
            metadata,
            pyramid_factor: pyramid_factor.max(2),
        }
    }

    /// Downsample of `level` relative to level 0.
    pub fn downsample(&self, level: u8) -> f64 {
        (self.pyramid_factor as f64).powi(level as i32)
    }

    /// Channels that have subblocks in `plane` at any level.
    pub fn channels_in_plane(&self, plane: &Coordinate) -> Vec<i32> {
        self.directory.plane_channels(plane)
    }

    /// Pick the level for `selection` among levels holding subblocks of
    /// `channels` in `plane`.
    ///
    /// For a zoom, this is the coarsest level whose downsample does not exceed
    /// `1 / zoom`; if every level is coarser than that, the finest one.
    pub fn resolve_level(
        &self,
        plane: &Coordinate,
        channels: &[i32],
        selection: LevelSelection,
    ) -> Result<u8, CompositeError> {
        let available = self.directory.plane_levels(plane, channels);

        match selection {
            LevelSelection::Level(level) => {
                let all = self.directory.levels();
                if !all.contains(&level) {
                    return Err(CompositeError::InvalidLevel {
                        level,
                        available: all,
                    });
                }
                if !available.contains(&level) {
                    return Err(CompositeError::EmptyRegion { level });
                }
                Ok(level)
            }
            LevelSelection::Zoom(zoom) => {
                if !(zoom.is_finite() && zoom > 0.0 && zoom <= 1.0) {
                    return Err(CompositeError::InvalidZoom(zoom));
                }
                let max_downsample = 1.0 / zoom * (1.0 + 1e-9);
                let finer = available
                    .iter()
                    .copied()
                    .filter(|&l| self.downsample(l) <= max_downsample)
                    .max();
                match finer.or_else(|| available.first().copied()) {
                    Some(level) => {
                        debug!(zoom, level, "Resolved pyramid level");
                        Ok(level)
                    }
                    None => Err(CompositeError::EmptyRegion { level: 0 }),
                }
            }
        }
    }

    fn resolve(
        &self,
        request: &RegionRequest,
        channels: &[i32],
    ) -> Result<Resolution, CompositeError> {
        let level = self.resolve_level(&request.plane, channels, request.level)?;
        let downsample = self.downsample(level);

        let resolution = match request.level {
            LevelSelection::Level(_) => Resolution {
                level,
                downsample,
                level_region: request.region,
                output_width: request.region.w,
                output_height: request.region.h,
            },
            LevelSelection::Zoom(zoom) => Resolution {
                level,
                downsample,
                level_region: request.region.downscaled(downsample),
                output_width: ((request.region.w as f64 * zoom).round() as u32).max(1),
                output_height: ((request.region.h as f64 * zoom).round() as u32).max(1),
            },
        };

        check_output_size(resolution.output_width, resolution.output_height)?;
        Ok(resolution)
    }

    /// Tiles of `channel` in `plane` intersecting `region` at `level`,
    /// in ascending directory index.
    fn channel_tiles(
        &self,
        plane: &Coordinate,
        channel: i32,
        level: u8,
        region: IntRect,
    ) -> Vec<(usize, &'a SubBlockEntry)> {
        let mut tiles: Vec<(usize, &'a SubBlockEntry)> = self
            .directory
            .query_plane(plane, level, region)
            .filter(|(_, e)| e.coordinate.index(Dimension::C) == channel)
            .collect();
        tiles.sort_unstable_by_key(|(index, _)| *index);
        tiles
    }

    /// Decode tiles in parallel and stitch them in index order.
    ///
    /// Returns `None` when `tiles` is empty and no pixel type is known.
    fn stitch(
        &self,
        channel: i32,
        tiles: &[(usize, &'a SubBlockEntry)],
        region: IntRect,
        fallback_type: Option<PixelType>,
        request: Option<&RegionRequest>,
    ) -> Result<Option<PixelBuffer>, CompositeError> {
        let cancelled = || request.is_some_and(|r| r.is_cancelled());
        if cancelled() {
            return Err(CompositeError::Cancelled);
        }

        let Some(pixel_type) = tiles.first().map(|(_, e)| e.pixel_type).or(fallback_type) else {
            return Ok(None);
        };
        if let Some((_, other)) = tiles.iter().find(|(_, e)| e.pixel_type != pixel_type) {
            return Err(CompositeError::MixedPixelTypes {
                channel,
                first: pixel_type.name(),
                second: other.pixel_type.name(),
            });
        }

        // Collected in request order regardless of which decode finishes first
        let decoded: Vec<Arc<PixelBuffer>> = tiles
            .par_iter()
            .map(|(index, entry)| {
                if cancelled() {
                    return Err(CompositeError::Cancelled);
                }
                self.tiles.decode_tile(*index, entry)
            })
            .collect::<Result<_, _>>()?;

        if cancelled() {
            return Err(CompositeError::Cancelled);
        }

        let mut raster = PixelBuffer::new(pixel_type, region.w, region.h);
        for ((_, entry), tile) in tiles.iter().zip(decoded.iter()) {
            raster.blit(
                tile,
                entry.rect.x as i64 - region.x as i64,
                entry.rect.y as i64 - region.y as i64,
            );
        }
        Ok(Some(raster))
    }

    /// The stitched raster of one channel at one level, in the source pixel
    /// type, without tint or curve.
    ///
    /// Parts of `rect` not covered by any tile are 0.
    ///
    /// # Errors
    /// - `InvalidRegion` for an empty `rect` or one larger than
    ///   [`MAX_OUTPUT_PIXELS`]
    /// - `EmptyRegion` if the channel has no subblocks at `level` in `plane`
    pub fn read_region(
        &self,
        plane: &Coordinate,
        channel: i32,
        level: u8,
        rect: IntRect,
    ) -> Result<PixelBuffer, CompositeError> {
        if rect.is_empty() {
            return Err(CompositeError::InvalidRegion(format!("{} has no area", rect)));
        }
        check_output_size(rect.w, rect.h)?;
        if !self.directory.has_channel_at(plane, channel, level) {
            return Err(CompositeError::EmptyRegion { level });
        }

        let tiles = self.channel_tiles(plane, channel, level, rect);
        let fallback = self.directory.channel_pixel_type(plane, channel, level);
        self.stitch(channel, &tiles, rect, fallback, None)?
            .ok_or(CompositeError::EmptyRegion { level })
    }

    /// Composite a region of several channels into a tinted BGR raster.
    pub fn composite(&self, request: &RegionRequest) -> Result<CompositeRaster, CompositeError> {
        if !matches!(request.output, PixelType::Bgr24 | PixelType::Bgr48) {
            return Err(CompositeError::UnsupportedOutput(request.output.name()));
        }
        if request.region.is_empty() {
            return Err(CompositeError::InvalidRegion(format!(
                "{} has no area",
                request.region
            )));
        }

        let channels = match &request.channels {
            Some(channels) => channels.clone(),
            None => self.channels_in_plane(&request.plane),
        };
        let resolution = self.resolve(request, &channels)?;

        let out_w = resolution.output_width as usize;
        let out_h = resolution.output_height as usize;
        let (x_map, y_map) = sample_maps(request, &resolution);
        let mut accum = vec![0f32; out_w * out_h * 3];
        let mut contributing = 0;

        for &channel in &channels {
            if !self
                .directory
                .has_channel_at(&request.plane, channel, resolution.level)
            {
                continue;
            }
            contributing += 1;

            let tiles = self.channel_tiles(
                &request.plane,
                channel,
                resolution.level,
                resolution.level_region,
            );
            if tiles.is_empty() {
                // Background only
                continue;
            }
            let Some(raster) =
                self.stitch(channel, &tiles, resolution.level_region, None, Some(request))?
            else {
                continue;
            };

            let setting = match request.display_settings.get(&channel) {
                Some(setting) => setting.clone(),
                None => self.display_setting(channel, raster.pixel_type())?,
            };
            let range_max = self
                .metadata
                .declared_intensity_range()
                .unwrap_or(raster.pixel_type().max_value() as f64);

            blend(&mut accum, &raster, &setting, range_max, &x_map, &y_map);
        }

        if contributing == 0 {
            return Err(CompositeError::EmptyRegion {
                level: resolution.level,
            });
        }
        if request.is_cancelled() {
            return Err(CompositeError::Cancelled);
        }

        debug!(
            level = resolution.level,
            downsample = resolution.downsample,
            channels = contributing,
            width = out_w,
            height = out_h,
            "Composited region"
        );

        let pixels = quantize(
            &accum,
            request.output,
            resolution.output_width,
            resolution.output_height,
        );
        Ok(CompositeRaster::new(
            pixels,
            resolution.level,
            resolution.level_region,
        ))
    }

    fn display_setting(
        &self,
        channel: i32,
        pixel_type: PixelType,
    ) -> Result<ChannelDisplaySetting, CompositeError> {
        let stored = self.metadata.display_setting(channel)?;
        Ok(stored.unwrap_or_else(|| {
            let range_max = self
                .metadata
                .declared_intensity_range()
                .unwrap_or(pixel_type.max_value() as f64);
            ChannelDisplaySetting::neutral(range_max)
        }))
    }
}

fn check_output_size(width: u32, height: u32) -> Result<(), CompositeError> {
    if width as u64 * height as u64 > MAX_OUTPUT_PIXELS {
        return Err(CompositeError::InvalidRegion(format!(
            "{}x{} output exceeds {} pixels",
            width, height, MAX_OUTPUT_PIXELS
        )));
    }
    Ok(())
}

/// For each output column and row, the source column and row in the level
/// raster (nearest neighbour).
fn sample_maps(request: &RegionRequest, resolution: &Resolution) -> (Vec<u32>, Vec<u32>) {
    let axis = |out_len: u32,
                region_start: i32,
                region_len: u32,
                level_start: i32,
                level_len: u32| {
        (0..out_len)
            .map(|o| match request.level {
                LevelSelection::Level(_) => o,
                LevelSelection::Zoom(_) => {
                    // Center of the output pixel, in level-0 coordinates
                    let scale = region_len as f64 / out_len as f64;
                    let level0 = region_start as f64 + (o as f64 + 0.5) * scale;
                    let level = (level0 / resolution.downsample).floor() as i64;
                    (level - level_start as i64).clamp(0, level_len as i64 - 1) as u32
                }
            })
            .collect::<Vec<u32>>()
    };

    (
        axis(
            resolution.output_width,
            request.region.x,
            request.region.w,
            resolution.level_region.x,
            resolution.level_region.w,
        ),
        axis(
            resolution.output_height,
            request.region.y,
            request.region.h,
            resolution.level_region.y,
            resolution.level_region.h,
        ),
    )
}

/// Add one channel's contribution, normalized to `[0, 1]` per output component.
fn blend(
    accum: &mut [f32],
    raster: &PixelBuffer,
    setting: &ChannelDisplaySetting,
    range_max: f64,
    x_map: &[u32],
    y_map: &[u32],
) {
    let tint = [
        setting.tint.b as f32 / 255.0,
        setting.tint.g as f32 / 255.0,
        setting.tint.r as f32 / 255.0,
    ];
    let normalize = |value: f32| -> f32 {
        let mapped = setting.curve.evaluate(value as f64) / range_max;
        mapped.clamp(0.0, 1.0) as f32
    };
    let out_w = x_map.len();

    for (oy, &sy) in y_map.iter().enumerate() {
        for (ox, &sx) in x_map.iter().enumerate() {
            let base = (oy * out_w + ox) * 3;
            if raster.pixel_type().is_color() {
                // B, G, R components each through the curve
                for c in 0..3 {
                    accum[base + c] += normalize(raster.sample(sx, sy, c)) * tint[c];
                }
            } else {
                let v = normalize(raster.sample(sx, sy, 0));
                for c in 0..3 {
                    accum[base + c] += v * tint[c];
                }
            }
        }
    }
}

/// Clamp the accumulated values and convert to the output pixel type.
fn quantize(accum: &[f32], output: PixelType, width: u32, height: u32) -> PixelBuffer {
    let max = output.max_value();
    let data = match output {
        PixelType::Bgr48 => accum
            .iter()
            .flat_map(|v| ((v.clamp(0.0, 1.0) * max).round() as u16).to_le_bytes())
            .collect(),
        _ => accum
            .iter()
            .map(|v| (v.clamp(0.0, 1.0) * max).round() as u8)
            .collect(),
    };
    PixelBuffer::from_vec(output, width, height, data)
        .unwrap_or_else(|| PixelBuffer::new(output, width, height))
}
