//! Which channels have live entries in each plane and level.
//!
//! Planes are keyed by the coordinate with the channel and mosaic axes
//! removed, which hashes the same as every coordinate that lies in it.

use std::collections::{BTreeMap, HashMap};

use crate::coordinate::{Coordinate, Dimension};
use crate::format::SubBlockEntry;
use crate::pixel::PixelType;

/// Live entry counts of one channel, per pixel type in first-seen order.
type ChannelCounts = Vec<(PixelType, usize)>;

#[derive(Debug, Clone, Default)]
pub(super) struct PlanePresence {
    planes: HashMap<(Coordinate, u8), BTreeMap<i32, ChannelCounts>>,
}

fn plane_key(coordinate: &Coordinate) -> Coordinate {
    coordinate.without(Dimension::C).without(Dimension::M)
}

impl PlanePresence {
    pub(super) fn add(&mut self, entry: &SubBlockEntry) {
        let counts = self
            .planes
            .entry((plane_key(&entry.coordinate), entry.level))
            .or_default()
            .entry(entry.coordinate.index(Dimension::C))
            .or_default();
        match counts.iter_mut().find(|(t, _)| *t == entry.pixel_type) {
            Some((_, count)) => *count += 1,
            None => counts.push((entry.pixel_type, 1)),
        }
    }

    pub(super) fn remove(&mut self, entry: &SubBlockEntry) {
        let key = (plane_key(&entry.coordinate), entry.level);
        let channel = entry.coordinate.index(Dimension::C);
        let Some(channels) = self.planes.get_mut(&key) else {
            return;
        };
        if let Some(counts) = channels.get_mut(&channel) {
            if let Some(pos) = counts.iter().position(|(t, _)| *t == entry.pixel_type) {
                counts[pos].1 -= 1;
                if counts[pos].1 == 0 {
                    counts.remove(pos);
                }
            }
            if counts.is_empty() {
                channels.remove(&channel);
            }
        }
        if channels.is_empty() {
            self.planes.remove(&key);
        }
    }

    fn channels(&self, plane: &Coordinate, level: u8) -> Option<&BTreeMap<i32, ChannelCounts>> {
        self.planes.get(&(plane_key(plane), level))
    }

    /// Channels with live entries in `plane` at `level`, ascending.
    pub(super) fn channels_at(
        &self,
        plane: &Coordinate,
        level: u8,
    ) -> impl Iterator<Item = i32> + '_ {
        self.channels(plane, level)
            .into_iter()
            .flat_map(|channels| channels.keys().copied())
    }

    pub(super) fn contains(&self, plane: &Coordinate, channel: i32, level: u8) -> bool {
        self.channels(plane, level)
            .is_some_and(|channels| channels.contains_key(&channel))
    }

    /// First pixel type seen among the live entries of `channel`.
    pub(super) fn pixel_type(
        &self,
        plane: &Coordinate,
        channel: i32,
        level: u8,
    ) -> Option<PixelType> {
        self.channels(plane, level)?
            .get(&channel)?
            .first()
            .map(|(t, _)| *t)
    }
}
