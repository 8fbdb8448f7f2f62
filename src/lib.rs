//! # zisraw
//!
//! A storage and rendering engine for tiled, multi-dimensional,
//! multi-resolution microscopy containers.
//!
//! A container holds image tiles ("subblocks"), each placed by a
//! [`Coordinate`] over named dimensions (channel, time, focus, scene, mosaic
//! tile and more), a pyramid level, and a pixel rectangle. Next to the tiles
//! it stores an XML metadata document and named attachments.
//!
//! ## Features
//!
//! - **Segment I/O**: append-only writing, range reads through a block cache
//! - **Codecs**: uncompressed, JPEG and zstd built in; more can be registered
//! - **Directory**: exact lookup and spatial region queries per pyramid level
//! - **Compositing**: stitched, tinted, multi-channel region reads at any zoom
//! - **Metadata**: path-addressed access to the XML document, display settings
//!   and pixel scaling
//!
//! ## Architecture
//!
//! - [`io`] - Range readers and the block cache
//! - [`mod@format`] - Segment framing and the on-disk records
//! - [`codec`] - Codec registry
//! - [`directory`] - Subblock directory and its spatial index
//! - [`render`] - Pyramid level resolution and compositing
//! - [`metadata`] - Metadata document and display settings
//! - [`container`] - Read handle and writer
//! - [`config`] - CLI configuration
//!
//! ## Example
//!
//! ```rust,no_run
//! use zisraw::{
//!     Container, ContainerWriter, IntRect, PixelBuffer, PixelType, RegionRequest, SubBlockSpec,
//! };
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let mut writer = ContainerWriter::create("tiles.czi")?;
//! let tile = PixelBuffer::new(PixelType::Gray16, 512, 512);
//! writer.add_subblock(SubBlockSpec::new("C0T0".parse()?, IntRect::new(0, 0, 512, 512)), &tile)?;
//! writer.finalize()?;
//!
//! let container = Container::open("tiles.czi")?;
//! let raster = container.composite(&RegionRequest::new(IntRect::new(0, 0, 512, 512)).zoom(0.5))?;
//! println!("{}x{} from level {}", raster.width(), raster.height(), raster.level());
//! # Ok(())
//! # }
//! ```

pub mod codec;
pub mod config;
pub mod container;
pub mod coordinate;
pub mod directory;
pub mod error;
pub mod format;
pub mod geometry;
pub mod io;
pub mod metadata;
pub mod pixel;
pub mod render;

pub use codec::{compression_name, Codec, CodecRegistry};
pub use container::{
    Container, ContainerWriter, DirectorySource, OpenOptions, SubBlockSpec, WriterOptions,
    WriterState,
};
pub use coordinate::{Coordinate, Dimension};
pub use directory::{DirectoryQuery, DirectoryStatistics, SubBlockDirectory};
pub use error::{
    CodecError, CompositeError, ContainerError, CoordinateError, IoError, MetadataError,
    WriteError,
};
pub use format::{AttachmentEntry, SubBlockEntry};
pub use geometry::IntRect;
pub use metadata::{
    ChannelDisplaySetting, GradationCurve, MetadataDocument, MetadataManager, Rgb, Scaling,
};
pub use pixel::{PixelBuffer, PixelType};
pub use render::{
    CompositeRaster, Compositor, LevelSelection, RegionRequest, TileCache, TileProvider,
};
