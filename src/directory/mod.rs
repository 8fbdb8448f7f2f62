//! The subblock directory.
//!
//! Entries live in an arena and are addressed by their integer index, which
//! increases with insertion order. Two indexes sit on top of the arena:
//!
//! - an exact map from `(coordinate, level)` to arena index
//! - a per-level spatial index for region queries (see [`DirectoryQuery`])
//! - per plane and level, the channels that have live entries there
//!
//! Adding an entry whose `(coordinate, level)` is already present supersedes
//! the old entry: the key now points at the new, higher index and the old
//! entry drops out of every query. This gives last-writer-wins both for
//! writers that re-add a tile and for directory scans over files in which a
//! tile was rewritten.
//!
//! A directory opened from a container is frozen; [`SubBlockDirectory::add`]
//! then fails with `ContainerClosed`.

mod index;
mod presence;
mod statistics;

use std::collections::{BTreeMap, HashMap};

use tracing::{debug, trace};

use crate::coordinate::{Coordinate, Dimension};
use crate::error::WriteError;
use crate::format::{SubBlockEntry, MAX_SUBBLOCK_PIXELS};
use crate::geometry::IntRect;
use crate::pixel::PixelType;

use index::LevelIndex;
use presence::PlanePresence;

pub use index::DirectoryQuery;
pub use statistics::{DimensionBounds, DirectoryStatistics, LevelStatistics};

#[derive(Debug, Clone, Default)]
pub struct SubBlockDirectory {
    /// `None` marks a superseded entry
    arena: Vec<Option<SubBlockEntry>>,
    by_key: HashMap<(Coordinate, u8), usize>,
    levels: BTreeMap<u8, LevelIndex>,
    presence: PlanePresence,
    frozen: bool,
}

impl SubBlockDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a directory from entries in storage order.
    ///
    /// Later entries supersede earlier ones with the same key. The level
    /// indexes are sorted once after all entries are in.
    pub fn from_entries(entries: impl IntoIterator<Item = SubBlockEntry>) -> Self {
        let mut directory = Self::new();
        let mut superseded = 0usize;
        for entry in entries {
            let index = directory.arena.len();
            let key = (entry.coordinate, entry.level);
            if let Some(previous) = directory.by_key.insert(key, index) {
                directory.arena[previous] = None;
                superseded += 1;
            }
            directory.arena.push(Some(entry));
        }

        let mut per_level: BTreeMap<u8, Vec<usize>> = BTreeMap::new();
        for (index, entry) in directory.arena.iter().enumerate() {
            let Some(entry) = entry else { continue };
            per_level.entry(entry.level).or_default().push(index);
            directory.presence.add(entry);
        }
        for (level, indices) in per_level {
            let level_index = LevelIndex::build(indices, &directory.arena);
            directory.levels.insert(level, level_index);
        }

        debug!(
            entries = directory.len(),
            superseded,
            levels = directory.levels.len(),
            "Built subblock directory"
        );
        directory
    }

    /// Add an entry and return its index.
    ///
    /// # Errors
    /// - `ContainerClosed` if the directory is frozen
    /// - `InvalidCoordinate` for negative dimension indices, or a rectangle that
    ///   is empty or larger than [`MAX_SUBBLOCK_PIXELS`]
    pub fn add(&mut self, entry: SubBlockEntry) -> Result<usize, WriteError> {
        if self.frozen {
            return Err(WriteError::ContainerClosed);
        }
        entry.coordinate.validate()?;
        if entry.rect.is_empty() {
            return Err(WriteError::InvalidCoordinate(format!(
                "subblock {} has an empty rectangle {}",
                entry.coordinate, entry.rect
            )));
        }
        if entry.rect.area() > MAX_SUBBLOCK_PIXELS {
            return Err(WriteError::InvalidCoordinate(format!(
                "subblock {} rectangle {} exceeds {} pixels",
                entry.coordinate, entry.rect, MAX_SUBBLOCK_PIXELS
            )));
        }
        Ok(self.insert(entry))
    }

    fn insert(&mut self, entry: SubBlockEntry) -> usize {
        let index = self.arena.len();
        let key = (entry.coordinate, entry.level);
        let (level, x, width) = (entry.level, entry.rect.x, entry.rect.w);

        if let Some(previous) = self.by_key.insert(key, index) {
            trace!(
                coordinate = %entry.coordinate,
                level,
                previous,
                index,
                "Superseding directory entry"
            );
            if let Some(old) = self.arena[previous].as_ref() {
                let old_x = old.rect.x;
                if let Some(level_index) = self.levels.get_mut(&old.level) {
                    level_index.remove(previous, old_x, &self.arena);
                }
                self.presence.remove(old);
            }
            self.arena[previous] = None;
        }

        self.presence.add(&entry);
        self.arena.push(Some(entry));
        self.levels
            .entry(level)
            .or_default()
            .insert(index, x, width, &self.arena);

        index
    }

    /// Reject further additions.
    pub fn freeze(&mut self) {
        self.frozen = true;
    }

    pub fn is_frozen(&self) -> bool {
        self.frozen
    }

    /// Number of live entries.
    pub fn len(&self) -> usize {
        self.by_key.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_key.is_empty()
    }

    /// Exact lookup.
    pub fn find(&self, coordinate: &Coordinate, level: u8) -> Option<&SubBlockEntry> {
        self.find_index(coordinate, level)
            .and_then(|i| self.arena[i].as_ref())
    }

    pub fn find_index(&self, coordinate: &Coordinate, level: u8) -> Option<usize> {
        self.by_key.get(&(*coordinate, level)).copied()
    }

    /// Entry at `index`, if it is live.
    pub fn get(&self, index: usize) -> Option<&SubBlockEntry> {
        self.arena.get(index).and_then(|e| e.as_ref())
    }

    /// All live entries whose rectangle intersects `rect` at `level`.
    pub fn query(&self, level: u8, rect: IntRect) -> DirectoryQuery<'_> {
        match self.levels.get(&level) {
            Some(level_index) if !rect.is_empty() => {
                DirectoryQuery::new(&self.arena, level_index.window(&rect, &self.arena), rect)
            }
            _ => DirectoryQuery::empty(rect),
        }
    }

    /// Like [`query`](Self::query), restricted to entries in `plane`
    /// (any channel, any mosaic tile).
    pub fn query_plane(
        &self,
        plane: &Coordinate,
        level: u8,
        rect: IntRect,
    ) -> impl Iterator<Item = (usize, &SubBlockEntry)> + Clone + '_ {
        let plane = *plane;
        self.query(level, rect)
            .filter(move |(_, entry)| entry.coordinate.in_plane(&plane))
    }

    /// Live entries in ascending index order.
    pub fn iter(&self) -> impl Iterator<Item = (usize, &SubBlockEntry)> + '_ {
        self.arena
            .iter()
            .enumerate()
            .filter_map(|(i, e)| e.as_ref().map(|e| (i, e)))
    }

    /// Live entries in ascending index order, without indices.
    pub fn entries(&self) -> impl Iterator<Item = &SubBlockEntry> + '_ {
        self.arena.iter().flatten()
    }

    /// Levels holding at least one live entry, ascending.
    pub fn levels(&self) -> Vec<u8> {
        self.levels
            .iter()
            .filter(|(_, index)| index.len() > 0)
            .map(|(&level, _)| level)
            .collect()
    }

    /// Levels holding live entries of any of `channels` in `plane`, ascending.
    pub fn plane_levels(&self, plane: &Coordinate, channels: &[i32]) -> Vec<u8> {
        self.levels
            .keys()
            .copied()
            .filter(|&level| {
                channels
                    .iter()
                    .any(|&channel| self.presence.contains(plane, channel, level))
            })
            .collect()
    }

    /// Channels with live entries in `plane` at `level`, ascending.
    pub fn channels_at(&self, plane: &Coordinate, level: u8) -> Vec<i32> {
        self.presence.channels_at(plane, level).collect()
    }

    /// Channels with live entries in `plane` at any level, ascending.
    pub fn plane_channels(&self, plane: &Coordinate) -> Vec<i32> {
        let mut channels: Vec<i32> = self
            .levels
            .keys()
            .flat_map(|&level| self.presence.channels_at(plane, level))
            .collect();
        channels.sort_unstable();
        channels.dedup();
        channels
    }

    /// True if `channel` has live entries in `plane` at `level`.
    pub fn has_channel_at(&self, plane: &Coordinate, channel: i32, level: u8) -> bool {
        self.presence.contains(plane, channel, level)
    }

    /// Pixel type of `channel`'s entries in `plane` at `level`.
    pub fn channel_pixel_type(
        &self,
        plane: &Coordinate,
        channel: i32,
        level: u8,
    ) -> Option<PixelType> {
        self.presence.pixel_type(plane, channel, level)
    }

    /// Distinct channel indices (absent channel counts as 0), ascending.
    pub fn channels(&self) -> Vec<i32> {
        let mut channels: Vec<i32> = self
            .entries()
            .map(|e| e.coordinate.index(Dimension::C))
            .collect();
        channels.sort_unstable();
        channels.dedup();
        channels
    }

    pub fn statistics(&self) -> DirectoryStatistics {
        DirectoryStatistics::collect(self.entries())
    }
}
