//! Command-line configuration for the `zisraw` tool.
//!
//! Every subcommand reads one container. Options can also be set through
//! environment variables with the `ZISRAW_` prefix:
//!
//! - `ZISRAW_BLOCK_SIZE` - Read cache block size in bytes (default: 256KB)
//! - `ZISRAW_CACHE_BLOCKS` - Read cache capacity in blocks (default: 100)
//! - `ZISRAW_CACHE_TILES` - Decoded tile cache in bytes (default: 256MB)
//! - `ZISRAW_SCAN` - Rebuild the directory from subblock segments (default: false)
//!
//! # Example
//!
//! ```text
//! zisraw info slide.czi --json
//! zisraw render slide.czi --region 0,0,4096,4096 --zoom 0.25 -o overview.png
//! zisraw metadata slide.czi --path Metadata/Scaling/Items/Distance[@Id=X]/Value
//! zisraw attachment slide.czi Thumbnail -o thumb.jpg
//! ```

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use crate::container::{DirectorySource, OpenOptions};
use crate::coordinate::Coordinate;
use crate::geometry::IntRect;
use crate::io::{DEFAULT_BLOCK_CACHE_CAPACITY, DEFAULT_BLOCK_SIZE};
use crate::render::{LevelSelection, DEFAULT_TILE_CACHE_CAPACITY, MAX_OUTPUT_PIXELS};

// =============================================================================
// CLI Arguments
// =============================================================================

/// zisraw - inspect and render tiled microscopy containers.
#[derive(Parser, Debug, Clone)]
#[command(name = "zisraw")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

impl Cli {
    pub fn into_command(self) -> Command {
        self.command
    }
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Summarize directory, levels, metadata and attachments.
    Info(InfoConfig),
    /// Composite a region into a PNG.
    Render(RenderConfig),
    /// Print the metadata document or one node of it.
    Metadata(MetadataConfig),
    /// Extract a named attachment.
    Attachment(AttachmentConfig),
}

impl Command {
    pub fn verbose(&self) -> bool {
        match self {
            Command::Info(c) => c.open.verbose,
            Command::Render(c) => c.open.verbose,
            Command::Metadata(c) => c.open.verbose,
            Command::Attachment(c) => c.open.verbose,
        }
    }
}

/// Options shared by every subcommand.
#[derive(Args, Debug, Clone)]
pub struct OpenConfig {
    /// Container file.
    pub path: PathBuf,

    /// Block size in bytes for the read cache.
    #[arg(long, default_value_t = DEFAULT_BLOCK_SIZE, env = "ZISRAW_BLOCK_SIZE")]
    pub block_size: usize,

    /// Number of blocks kept by the read cache.
    #[arg(long, default_value_t = DEFAULT_BLOCK_CACHE_CAPACITY, env = "ZISRAW_CACHE_BLOCKS")]
    pub cache_blocks: usize,

    /// Bytes of decoded tiles to keep.
    #[arg(long, default_value_t = DEFAULT_TILE_CACHE_CAPACITY, env = "ZISRAW_CACHE_TILES")]
    pub cache_tiles: usize,

    /// Ignore the directory segment and scan every subblock instead.
    #[arg(long, default_value_t = false, env = "ZISRAW_SCAN")]
    pub scan: bool,

    /// Enable verbose logging (debug level).
    #[arg(short, long, default_value_t = false)]
    pub verbose: bool,
}

impl OpenConfig {
    pub fn validate(&self) -> Result<(), String> {
        if self.block_size < 1024 || self.block_size > 16 * 1024 * 1024 {
            return Err("block_size must be between 1KB and 16MB".to_string());
        }
        if self.cache_blocks == 0 {
            return Err("cache_blocks must be greater than 0".to_string());
        }
        Ok(())
    }

    pub fn open_options(&self) -> OpenOptions {
        OpenOptions::new()
            .block_cache(self.block_size, self.cache_blocks)
            .tile_cache_capacity(self.cache_tiles)
            .directory_source(if self.scan {
                DirectorySource::Scan
            } else {
                DirectorySource::Segment
            })
    }
}

#[derive(Args, Debug, Clone)]
pub struct InfoConfig {
    #[command(flatten)]
    pub open: OpenConfig,

    /// Print JSON instead of text.
    #[arg(long, default_value_t = false)]
    pub json: bool,
}

impl InfoConfig {
    pub fn validate(&self) -> Result<(), String> {
        self.open.validate()
    }
}

#[derive(Args, Debug, Clone)]
pub struct RenderConfig {
    #[command(flatten)]
    pub open: OpenConfig,

    /// Region as x,y,width,height. Level-local with --level, full resolution
    /// with --zoom.
    #[arg(long)]
    pub region: IntRect,

    /// Pyramid level to read.
    #[arg(long, conflicts_with = "zoom")]
    pub level: Option<u8>,

    /// Output scale in (0, 1]; picks the pyramid level.
    #[arg(long)]
    pub zoom: Option<f64>,

    /// Plane selection, e.g. T0Z3.
    #[arg(long, default_value = "")]
    pub plane: Coordinate,

    /// Channels to blend (comma-separated); all channels if omitted.
    #[arg(long, value_delimiter = ',')]
    pub channels: Option<Vec<i32>>,

    /// Output PNG file.
    #[arg(short, long)]
    pub output: PathBuf,
}

impl RenderConfig {
    pub fn validate(&self) -> Result<(), String> {
        self.open.validate()?;
        if self.region.is_empty() {
            return Err("region must have a non-zero width and height".to_string());
        }
        if let Some(zoom) = self.zoom {
            if !(zoom.is_finite() && zoom > 0.0 && zoom <= 1.0) {
                return Err("zoom must be in (0, 1]".to_string());
            }
        }
        let (w, h) = self.output_size();
        if w as u64 * h as u64 > MAX_OUTPUT_PIXELS {
            return Err(format!("{}x{} output is too large", w, h));
        }
        Ok(())
    }

    pub fn level_selection(&self) -> LevelSelection {
        match (self.level, self.zoom) {
            (_, Some(zoom)) => LevelSelection::Zoom(zoom),
            (Some(level), None) => LevelSelection::Level(level),
            (None, None) => LevelSelection::Level(0),
        }
    }

    /// Size of the rendered image.
    pub fn output_size(&self) -> (u32, u32) {
        match self.zoom {
            Some(zoom) => (
                ((self.region.w as f64 * zoom).round() as u32).max(1),
                ((self.region.h as f64 * zoom).round() as u32).max(1),
            ),
            None => (self.region.w, self.region.h),
        }
    }
}

#[derive(Args, Debug, Clone)]
pub struct MetadataConfig {
    #[command(flatten)]
    pub open: OpenConfig,

    /// Print only the text of this node (e.g. Metadata/Information/Image/SizeX).
    #[arg(long)]
    pub path: Option<String>,
}

impl MetadataConfig {
    pub fn validate(&self) -> Result<(), String> {
        self.open.validate()?;
        if matches!(self.path.as_deref(), Some(p) if p.trim().is_empty()) {
            return Err("path must not be empty".to_string());
        }
        Ok(())
    }
}

#[derive(Args, Debug, Clone)]
pub struct AttachmentConfig {
    #[command(flatten)]
    pub open: OpenConfig,

    /// Attachment name; lists attachments if omitted.
    pub name: Option<String>,

    /// Output file; stdout if omitted.
    #[arg(short, long, requires = "name")]
    pub output: Option<PathBuf>,
}

impl AttachmentConfig {
    pub fn validate(&self) -> Result<(), String> {
        self.open.validate()
    }
}

// =============================================================================
// Tests
// =============================================================================
