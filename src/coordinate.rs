//! Dimension coordinates.
//!
//! A subblock is addressed by a sparse set of named integer axes. The set of
//! axes is fixed at compile time in [`Dimension::ALL`]; adding a new axis means
//! adding a variant there and giving it a letter in [`Dimension::letter`].
//! Everything else (storage, parsing, the on-disk `DV` entry) follows from that
//! list.
//!
//! Absent dimensions behave as index 0 for equality, hashing and lookups, so
//! `C0T0` and `T0` name the same plane.

use std::fmt;
use std::hash::{Hash, Hasher};
use std::str::FromStr;

use crate::error::CoordinateError;

/// Number of supported dimensions.
pub const DIMENSION_COUNT: usize = 10;

/// A non-spatial image dimension.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Dimension {
    /// Focus plane
    Z,
    /// Channel
    C,
    /// Time point
    T,
    /// Rotation angle
    R,
    /// Illumination direction
    I,
    /// Phase
    H,
    /// View
    V,
    /// Block (acquisition block)
    B,
    /// Scene
    S,
    /// Mosaic tile index
    M,
}

impl Dimension {
    /// All dimensions, in canonical order.
    pub const ALL: [Dimension; DIMENSION_COUNT] = [
        Dimension::Z,
        Dimension::C,
        Dimension::T,
        Dimension::R,
        Dimension::I,
        Dimension::H,
        Dimension::V,
        Dimension::B,
        Dimension::S,
        Dimension::M,
    ];

    /// Single-letter name used in strings and in the `DV` entry.
    pub const fn letter(self) -> char {
        match self {
            Dimension::Z => 'Z',
            Dimension::C => 'C',
            Dimension::T => 'T',
            Dimension::R => 'R',
            Dimension::I => 'I',
            Dimension::H => 'H',
            Dimension::V => 'V',
            Dimension::B => 'B',
            Dimension::S => 'S',
            Dimension::M => 'M',
        }
    }

    pub fn from_letter(letter: char) -> Option<Self> {
        Self::ALL
            .iter()
            .copied()
            .find(|d| d.letter() == letter.to_ascii_uppercase())
    }

    #[inline]
    const fn slot(self) -> usize {
        self as usize
    }
}

/// An immutable mapping from dimension to index.
#[derive(Clone, Copy, Default)]
pub struct Coordinate {
    values: [Option<i32>; DIMENSION_COUNT],
}

impl Coordinate {
    /// A coordinate with no dimension set.
    pub const fn new() -> Self {
        Self {
            values: [None; DIMENSION_COUNT],
        }
    }

    /// Return a copy with `dimension` set to `index`.
    pub fn with(mut self, dimension: Dimension, index: i32) -> Self {
        self.values[dimension.slot()] = Some(index);
        self
    }

    /// Return a copy with `dimension` removed.
    pub fn without(mut self, dimension: Dimension) -> Self {
        self.values[dimension.slot()] = None;
        self
    }

    /// The stored index, if the dimension is present.
    #[inline]
    pub fn get(&self, dimension: Dimension) -> Option<i32> {
        self.values[dimension.slot()]
    }

    /// The index, treating an absent dimension as 0.
    #[inline]
    pub fn index(&self, dimension: Dimension) -> i32 {
        self.values[dimension.slot()].unwrap_or(0)
    }

    pub fn is_present(&self, dimension: Dimension) -> bool {
        self.values[dimension.slot()].is_some()
    }

    /// Present dimensions in canonical order.
    pub fn iter(&self) -> impl Iterator<Item = (Dimension, i32)> + '_ {
        Dimension::ALL
            .iter()
            .filter_map(move |&d| self.get(d).map(|v| (d, v)))
    }

    /// Number of present dimensions.
    pub fn len(&self) -> usize {
        self.values.iter().filter(|v| v.is_some()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Flattened key with absent dimensions as 0.
    pub fn key(&self) -> [i32; DIMENSION_COUNT] {
        let mut key = [0; DIMENSION_COUNT];
        for (slot, value) in key.iter_mut().zip(self.values.iter()) {
            *slot = value.unwrap_or(0);
        }
        key
    }

    /// Reject indices that cannot address a subblock.
    pub fn validate(&self) -> Result<(), CoordinateError> {
        for (dimension, index) in self.iter() {
            if index < 0 {
                return Err(CoordinateError::NegativeIndex {
                    dimension: dimension.letter(),
                    index,
                });
            }
        }
        Ok(())
    }

    /// True if this coordinate lies in `plane`.
    ///
    /// The channel and mosaic axes are free: a plane selection names a
    /// time/Z/scene/... position, and every channel and mosaic tile at that
    /// position belongs to it.
    pub fn in_plane(&self, plane: &Coordinate) -> bool {
        Dimension::ALL
            .iter()
            .filter(|d| !matches!(d, Dimension::C | Dimension::M))
            .all(|&d| self.index(d) == plane.index(d))
    }
}

impl PartialEq for Coordinate {
    fn eq(&self, other: &Self) -> bool {
        self.key() == other.key()
    }
}

impl Eq for Coordinate {}

impl Hash for Coordinate {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.key().hash(state);
    }
}

impl fmt::Debug for Coordinate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Coordinate({})", self)
    }
}

impl fmt::Display for Coordinate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (dimension, index) in self.iter() {
            write!(f, "{}{}", dimension.letter(), index)?;
        }
        Ok(())
    }
}

impl FromStr for Coordinate {
    type Err = CoordinateError;

    /// Parse strings like `C1T0Z12` (case-insensitive letters, optional
    /// separators between groups).
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut coordinate = Coordinate::new();
        let mut chars = s.chars().peekable();

        while let Some(c) = chars.next() {
            if c.is_whitespace() || c == ',' || c == ';' {
                continue;
            }

            let dimension =
                Dimension::from_letter(c).ok_or(CoordinateError::UnknownDimension(c))?;
            if coordinate.is_present(dimension) {
                return Err(CoordinateError::DuplicateDimension(dimension.letter()));
            }

            let mut digits = String::new();
            while let Some(&next) = chars.peek() {
                if next.is_ascii_digit() || (next == '-' && digits.is_empty()) {
                    digits.push(next);
                    chars.next();
                } else {
                    break;
                }
            }

            let index = digits
                .parse::<i32>()
                .map_err(|_| CoordinateError::InvalidIndex {
                    dimension: dimension.letter(),
                    value: digits.clone(),
                })?;
            coordinate = coordinate.with(dimension, index);
        }

        Ok(coordinate)
    }
}
