//! Per-level spatial index.
//!
//! Each level keeps the arena indices of its live entries sorted by the left
//! edge of their rectangle, plus the widest tile seen. A region query only has
//! to look at entries whose left edge lies in
//! `[region.x - max_width, region.right())`, which two binary searches find.
//! Tiles within a level are close to uniform in size, so that window holds
//! little more than the tiles that actually intersect.

use crate::format::SubBlockEntry;
use crate::geometry::IntRect;

#[derive(Debug, Clone, Default)]
pub(super) struct LevelIndex {
    /// Arena indices, sorted by (rect.x, index)
    sorted: Vec<usize>,
    max_width: u32,
}

impl LevelIndex {
    /// Index the live entries `indices` in one sort.
    pub(super) fn build(mut indices: Vec<usize>, arena: &[Option<SubBlockEntry>]) -> Self {
        indices.sort_unstable_by_key(|&i| sort_key(arena, i));
        let max_width = indices
            .iter()
            .filter_map(|&i| arena[i].as_ref())
            .map(|e| e.rect.w)
            .max()
            .unwrap_or(0);
        Self {
            sorted: indices,
            max_width,
        }
    }

    pub(super) fn insert(
        &mut self,
        index: usize,
        x: i32,
        width: u32,
        arena: &[Option<SubBlockEntry>],
    ) {
        let pos = self
            .sorted
            .partition_point(|&i| sort_key(arena, i) < (x, index));
        self.sorted.insert(pos, index);
        self.max_width = self.max_width.max(width);
    }

    pub(super) fn remove(&mut self, index: usize, x: i32, arena: &[Option<SubBlockEntry>]) {
        let pos = self
            .sorted
            .partition_point(|&i| sort_key(arena, i) < (x, index));
        if self.sorted.get(pos) == Some(&index) {
            self.sorted.remove(pos);
        }
    }

    pub(super) fn len(&self) -> usize {
        self.sorted.len()
    }

    /// The slice of candidates whose left edge may reach into `rect`.
    pub(super) fn window(&self, rect: &IntRect, arena: &[Option<SubBlockEntry>]) -> &[usize] {
        let lo = rect.x as i64 - self.max_width as i64;
        let hi = rect.right();
        let start = self
            .sorted
            .partition_point(|&i| (left_edge(arena, i) as i64) <= lo);
        let end = self
            .sorted
            .partition_point(|&i| (left_edge(arena, i) as i64) < hi);
        if start >= end {
            &[]
        } else {
            &self.sorted[start..end]
        }
    }
}

const NO_CANDIDATES: &[usize] = &[];

fn left_edge(arena: &[Option<SubBlockEntry>], index: usize) -> i32 {
    arena[index].as_ref().map_or(i32::MAX, |e| e.rect.x)
}

fn sort_key(arena: &[Option<SubBlockEntry>], index: usize) -> (i32, usize) {
    (left_edge(arena, index), index)
}

/// Lazy iterator over the entries of one level that intersect a region.
///
/// Finite and cheap to clone; a clone taken before iteration restarts the
/// query from the beginning. Yields `(index, entry)` pairs ordered by the
/// entries' left edge.
#[derive(Debug, Clone)]
pub struct DirectoryQuery<'a> {
    arena: &'a [Option<SubBlockEntry>],
    candidates: std::slice::Iter<'a, usize>,
    rect: IntRect,
}

impl<'a> DirectoryQuery<'a> {
    pub(super) fn new(
        arena: &'a [Option<SubBlockEntry>],
        candidates: &'a [usize],
        rect: IntRect,
    ) -> Self {
        Self {
            arena,
            candidates: candidates.iter(),
            rect,
        }
    }

    pub(super) fn empty(rect: IntRect) -> Self {
        Self {
            arena: &[],
            candidates: NO_CANDIDATES.iter(),
            rect,
        }
    }

    /// The queried region.
    pub fn region(&self) -> IntRect {
        self.rect
    }
}

impl<'a> Iterator for DirectoryQuery<'a> {
    type Item = (usize, &'a SubBlockEntry);

    fn next(&mut self) -> Option<Self::Item> {
        for &index in self.candidates.by_ref() {
            if let Some(entry) = self.arena[index].as_ref() {
                if entry.rect.intersects(&self.rect) {
                    return Some((index, entry));
                }
            }
        }
        None
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (0, Some(self.candidates.len()))
    }
}
