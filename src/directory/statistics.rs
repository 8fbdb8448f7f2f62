//! Summary statistics over a directory.

use std::collections::BTreeMap;

use serde::Serialize;

use crate::coordinate::Dimension;
use crate::format::SubBlockEntry;
use crate::geometry::IntRect;
use crate::pixel::PixelType;

/// Inclusive index range of one dimension.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DimensionBounds {
    pub dimension: char,
    pub start: i32,
    /// Inclusive
    pub end: i32,
}

impl DimensionBounds {
    /// Number of indices covered.
    pub fn size(&self) -> u32 {
        (self.end as i64 - self.start as i64 + 1) as u32
    }
}

/// Extent of one pyramid level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct LevelStatistics {
    pub level: u8,
    pub subblock_count: usize,
    /// Union of all tile rectangles, in level-local coordinates
    pub bounding_box: IntRect,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DirectoryStatistics {
    pub subblock_count: usize,
    /// Only dimensions used by at least one subblock, in canonical order
    pub dimensions: Vec<DimensionBounds>,
    /// Ascending by level
    pub levels: Vec<LevelStatistics>,
    /// Distinct pixel types, in order of first appearance
    pub pixel_types: Vec<PixelType>,
}

impl DirectoryStatistics {
    pub(super) fn collect<'a>(entries: impl Iterator<Item = &'a SubBlockEntry>) -> Self {
        let mut subblock_count = 0;
        let mut bounds: BTreeMap<Dimension, (i32, i32)> = BTreeMap::new();
        let mut levels: BTreeMap<u8, (usize, IntRect)> = BTreeMap::new();
        let mut pixel_types = Vec::new();

        for entry in entries {
            subblock_count += 1;

            for (dimension, index) in entry.coordinate.iter() {
                bounds
                    .entry(dimension)
                    .and_modify(|(lo, hi)| {
                        *lo = (*lo).min(index);
                        *hi = (*hi).max(index);
                    })
                    .or_insert((index, index));
            }

            let level = levels.entry(entry.level).or_insert((0, IntRect::default()));
            level.0 += 1;
            level.1 = level.1.union(&entry.rect);

            if !pixel_types.contains(&entry.pixel_type) {
                pixel_types.push(entry.pixel_type);
            }
        }

        Self {
            subblock_count,
            dimensions: bounds
                .into_iter()
                .map(|(d, (start, end))| DimensionBounds {
                    dimension: d.letter(),
                    start,
                    end,
                })
                .collect(),
            levels: levels
                .into_iter()
                .map(|(level, (subblock_count, bounding_box))| LevelStatistics {
                    level,
                    subblock_count,
                    bounding_box,
                })
                .collect(),
            pixel_types,
        }
    }

    /// Bounds of `dimension`, if any subblock uses it.
    pub fn bounds(&self, dimension: Dimension) -> Option<DimensionBounds> {
        self.dimensions
            .iter()
            .copied()
            .find(|b| b.dimension == dimension.letter())
    }

    /// Number of distinct indices along `dimension` (1 if unused).
    pub fn size_of(&self, dimension: Dimension) -> u32 {
        self.bounds(dimension).map_or(1, |b| b.size())
    }

    /// Bounding box of level 0, the full-resolution image extent.
    pub fn full_resolution_box(&self) -> Option<IntRect> {
        self.levels
            .iter()
            .find(|l| l.level == 0)
            .map(|l| l.bounding_box)
    }
}
