//! Region reads and multi-channel compositing.
//!
//! # Pipeline
//!
//! ```text
//! RegionRequest
//!      │
//!      ▼
//! ┌─────────────────────────┐
//! │ Level resolution        │  Level(l) as given; Zoom(z) picks the coarsest
//! │                         │  level with downsample <= 1/z
//! └───────────┬─────────────┘
//!             ▼
//! ┌─────────────────────────┐
//! │ Directory query         │  per channel, at the resolved level
//! └───────────┬─────────────┘
//!             ▼
//! ┌─────────────────────────┐
//! │ Decode (rayon)          │  through the TileProvider, results kept in
//! │                         │  request order
//! └───────────┬─────────────┘
//!             ▼
//! ┌─────────────────────────┐
//! │ Stitch                  │  ascending directory index; later tiles
//! │                         │  overwrite earlier ones
//! └───────────┬─────────────┘
//!             ▼
//! ┌─────────────────────────┐
//! │ Curve, tint, blend      │  additive, clamped to the output range
//! └───────────┬─────────────┘
//!             ▼
//!      CompositeRaster
//! ```
//!
//! The compositor only sees the directory, the metadata and a
//! [`TileProvider`]. [`Container`](crate::Container) provides decoded tiles
//! through its [`TileCache`].

mod cache;
mod compositor;
mod request;

use std::sync::Arc;

use crate::error::CompositeError;
use crate::format::SubBlockEntry;
use crate::pixel::PixelBuffer;

pub use cache::{TileCache, DEFAULT_TILE_CACHE_CAPACITY};
pub use compositor::{Compositor, MAX_OUTPUT_PIXELS};
pub use request::{CompositeRaster, LevelSelection, RegionRequest};

/// Source of decoded subblocks.
///
/// Called from rayon worker threads, possibly for several tiles at once.
pub trait TileProvider: Sync {
    /// Decode the subblock at directory `index`.
    fn decode_tile(
        &self,
        index: usize,
        entry: &SubBlockEntry,
    ) -> Result<Arc<PixelBuffer>, CompositeError>;
}
