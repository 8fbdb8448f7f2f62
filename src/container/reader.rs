//! Read handle for a finalized container.

use std::path::Path;
use std::sync::Arc;

use bytes::Bytes;
use tracing::{debug, trace, warn};

use crate::codec::CodecRegistry;
use crate::coordinate::Coordinate;
use crate::directory::{DirectoryQuery, DirectoryStatistics, SubBlockDirectory};
use crate::error::{CompositeError, ContainerError};
use crate::format::{
    parse_attachment_directory, parse_attachment_segment, parse_directory_segment,
    parse_metadata_segment, parse_subblock_entry, parse_subblock_segment, AttachmentEntry,
    FileHeader, SegmentKind, SegmentReader, SubBlockEntry, SubBlockSegment, SEGMENT_HEADER_SIZE,
    SUBBLOCK_PREFIX_LEN,
};
use crate::geometry::IntRect;
use crate::io::{
    BlockCache, FileRangeReader, RangeReader, DEFAULT_BLOCK_CACHE_CAPACITY, DEFAULT_BLOCK_SIZE,
};
use crate::metadata::MetadataManager;
use crate::pixel::PixelBuffer;
use crate::render::{
    CompositeRaster, Compositor, RegionRequest, TileCache, TileProvider,
    DEFAULT_TILE_CACHE_CAPACITY,
};

/// Where the subblock directory comes from on open.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DirectorySource {
    /// The directory segment named by the file header
    #[default]
    Segment,
    /// Every subblock segment in the file, in file order
    Scan,
}

/// Options for opening a container.
#[derive(Debug, Clone)]
pub struct OpenOptions {
    /// Block size of the read cache, in bytes
    pub block_size: usize,
    /// Number of blocks kept by the read cache
    pub block_cache_capacity: usize,
    /// Bytes of decoded subblocks kept for region reads
    pub tile_cache_capacity: usize,
    pub directory_source: DirectorySource,
    pub codecs: Arc<CodecRegistry>,
}

impl Default for OpenOptions {
    fn default() -> Self {
        Self {
            block_size: DEFAULT_BLOCK_SIZE,
            block_cache_capacity: DEFAULT_BLOCK_CACHE_CAPACITY,
            tile_cache_capacity: DEFAULT_TILE_CACHE_CAPACITY,
            directory_source: DirectorySource::Segment,
            codecs: CodecRegistry::global(),
        }
    }
}

impl OpenOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn block_cache(mut self, block_size: usize, capacity: usize) -> Self {
        self.block_size = block_size;
        self.block_cache_capacity = capacity;
        self
    }

    pub fn tile_cache_capacity(mut self, bytes: usize) -> Self {
        self.tile_cache_capacity = bytes;
        self
    }

    pub fn directory_source(mut self, source: DirectorySource) -> Self {
        self.directory_source = source;
        self
    }

    pub fn codecs(mut self, codecs: Arc<CodecRegistry>) -> Self {
        self.codecs = codecs;
        self
    }
}

/// An open, read-only container.
///
/// The directory is frozen after open. Every method takes `&self`, so a
/// container can be shared between threads behind an `Arc`.
pub struct Container<R: RangeReader> {
    segments: SegmentReader<BlockCache<R>>,
    header: FileHeader,
    directory: SubBlockDirectory,
    metadata: MetadataManager,
    attachments: Vec<AttachmentEntry>,
    codecs: Arc<CodecRegistry>,
    tiles: TileCache,
}

impl Container<FileRangeReader> {
    /// Open the container at `path` with default options.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, ContainerError> {
        Self::open_with(path, OpenOptions::default())
    }

    pub fn open_with(path: impl AsRef<Path>, options: OpenOptions) -> Result<Self, ContainerError> {
        let reader = FileRangeReader::open(path)?;
        Self::from_reader(reader, options)
    }
}

impl<R: RangeReader> Container<R> {
    /// Open a container from any range reader.
    ///
    /// # Errors
    /// `CorruptContainer` if the header, directory, metadata or attachment
    /// directory cannot be parsed, or if the container was never finalized.
    pub fn from_reader(reader: R, options: OpenOptions) -> Result<Self, ContainerError> {
        let cached =
            BlockCache::with_capacity(reader, options.block_size, options.block_cache_capacity);
        let segments = SegmentReader::new(cached);

        let header_segment = segments.read_segment_of(0, SegmentKind::FileHeader)?;
        let header = FileHeader::parse(&header_segment.data)?;
        if !header.is_finalized() {
            return Err(ContainerError::corrupt(
                "container was not finalized (update pending)",
            ));
        }

        let mut directory = match options.directory_source {
            DirectorySource::Segment => {
                let segment =
                    segments.read_segment_of(header.directory_position, SegmentKind::Directory)?;
                SubBlockDirectory::from_entries(parse_directory_segment(&segment.data)?)
            }
            DirectorySource::Scan => scan_directory(&segments, header_segment.header.total_size())?,
        };
        directory.freeze();

        let mut metadata = if header.metadata_position != 0 {
            let segment =
                segments.read_segment_of(header.metadata_position, SegmentKind::Metadata)?;
            MetadataManager::from_xml(&parse_metadata_segment(&segment.data)?)?
        } else {
            MetadataManager::default()
        };
        if let Some(&pixel_type) = directory.statistics().pixel_types.first() {
            metadata.set_pixel_type(pixel_type);
        }

        let attachments = if header.attachment_directory_position != 0 {
            let segment = segments.read_segment_of(
                header.attachment_directory_position,
                SegmentKind::AttachmentDirectory,
            )?;
            parse_attachment_directory(&segment.data)?
        } else {
            Vec::new()
        };

        debug!(
            container = segments.reader().identifier(),
            source = ?options.directory_source,
            subblocks = directory.len(),
            levels = ?directory.levels(),
            attachments = attachments.len(),
            "Opened container"
        );

        Ok(Self {
            segments,
            header,
            directory,
            metadata,
            attachments,
            codecs: options.codecs,
            tiles: TileCache::with_capacity(options.tile_cache_capacity),
        })
    }

    pub fn identifier(&self) -> &str {
        self.segments.reader().identifier()
    }

    pub fn header(&self) -> &FileHeader {
        &self.header
    }

    /// Downsample between consecutive pyramid levels.
    pub fn pyramid_factor(&self) -> u32 {
        self.header.effective_pyramid_factor()
    }

    pub fn directory(&self) -> &SubBlockDirectory {
        &self.directory
    }

    pub fn statistics(&self) -> DirectoryStatistics {
        self.directory.statistics()
    }

    pub fn find(&self, coordinate: &Coordinate, level: u8) -> Option<&SubBlockEntry> {
        self.directory.find(coordinate, level)
    }

    pub fn query(&self, level: u8, rect: IntRect) -> DirectoryQuery<'_> {
        self.directory.query(level, rect)
    }

    pub fn query_plane(
        &self,
        plane: &Coordinate,
        level: u8,
        rect: IntRect,
    ) -> impl Iterator<Item = (usize, &SubBlockEntry)> + Clone + '_ {
        self.directory.query_plane(plane, level, rect)
    }

    /// Read the segment of a subblock without decoding it.
    ///
    /// # Errors
    /// `CorruptContainer` if the segment is missing, truncated, or disagrees
    /// with the directory about geometry or pixel type.
    pub fn read_subblock(&self, entry: &SubBlockEntry) -> Result<SubBlockSegment, ContainerError> {
        let segment = self
            .segments
            .read_segment_of(entry.file_position, SegmentKind::SubBlock)?;
        let subblock = parse_subblock_segment(segment.data, segment.offset)?;

        if subblock.entry.rect.w != entry.rect.w
            || subblock.entry.rect.h != entry.rect.h
            || subblock.entry.pixel_type != entry.pixel_type
        {
            return Err(ContainerError::corrupt(format!(
                "subblock at {} does not match its directory entry",
                entry.file_position
            )));
        }
        Ok(subblock)
    }

    /// Read and decode a subblock.
    pub fn decode_subblock(&self, entry: &SubBlockEntry) -> Result<PixelBuffer, ContainerError> {
        let subblock = self.read_subblock(entry)?;
        let buffer = self.codecs.decode(
            entry.compression,
            &subblock.data,
            entry.pixel_type,
            entry.rect.w,
            entry.rect.h,
        )?;
        Ok(buffer)
    }

    /// Region compositor over this container.
    pub fn compositor(&self) -> Compositor<'_, Self> {
        Compositor::new(&self.directory, self, &self.metadata, self.pyramid_factor())
    }

    pub fn composite(&self, request: &RegionRequest) -> Result<CompositeRaster, CompositeError> {
        self.compositor().composite(request)
    }

    /// Raw stitched pixels of one channel, see [`Compositor::read_region`].
    pub fn read_region(
        &self,
        plane: &Coordinate,
        channel: i32,
        level: u8,
        rect: IntRect,
    ) -> Result<PixelBuffer, CompositeError> {
        self.compositor().read_region(plane, channel, level, rect)
    }

    pub fn metadata(&self) -> &MetadataManager {
        &self.metadata
    }

    /// In-memory changes only; a read handle never writes.
    pub fn metadata_mut(&mut self) -> &mut MetadataManager {
        &mut self.metadata
    }

    pub fn attachments(&self) -> &[AttachmentEntry] {
        &self.attachments
    }

    /// Bytes of the attachment called `name`. With several of the same name,
    /// the last one listed wins.
    pub fn read_attachment(&self, name: &str) -> Result<Bytes, ContainerError> {
        let entry = self
            .attachments
            .iter()
            .rev()
            .find(|a| a.name == name)
            .ok_or_else(|| ContainerError::AttachmentNotFound(name.to_string()))?;

        let segment = self
            .segments
            .read_segment_of(entry.file_position, SegmentKind::Attachment)?;
        let (_, data) = parse_attachment_segment(segment.data)?;
        Ok(data)
    }

    pub fn tile_cache(&self) -> &TileCache {
        &self.tiles
    }
}

impl<R: RangeReader> TileProvider for Container<R> {
    fn decode_tile(
        &self,
        index: usize,
        entry: &SubBlockEntry,
    ) -> Result<Arc<PixelBuffer>, CompositeError> {
        if let Some(buffer) = self.tiles.get(index) {
            trace!(index, "Tile cache hit");
            return Ok(buffer);
        }

        trace!(index, coordinate = %entry.coordinate, "Tile cache miss");
        let buffer = Arc::new(self.decode_subblock(entry)?);
        self.tiles.put(index, buffer.clone());
        Ok(buffer)
    }
}

/// Rebuild the directory from the subblock segments themselves.
///
/// A damaged tail (a header that cannot be parsed, or a segment running past
/// the end of the file) ends the scan with a warning; everything before it is
/// kept.
fn scan_directory<R: RangeReader>(
    segments: &SegmentReader<R>,
    start: u64,
) -> Result<SubBlockDirectory, ContainerError> {
    let mut entries = Vec::new();

    for item in segments.headers_from(start) {
        let (offset, header) = match item {
            Ok(found) => found,
            Err(e) => {
                warn!(error = %e, "Directory scan stopped at damaged segment");
                break;
            }
        };
        if header.kind != SegmentKind::SubBlock {
            continue;
        }

        let prefix_len = (header.used_size as usize).min(SUBBLOCK_PREFIX_LEN);
        let prefix = segments.read_range(offset + SEGMENT_HEADER_SIZE as u64, prefix_len)?;
        match parse_subblock_entry(&prefix, offset) {
            Ok(entry) => entries.push(entry),
            Err(e) => {
                warn!(offset, error = %e, "Skipping unreadable subblock during scan");
            }
        }
    }

    debug!(segments = entries.len(), "Scanned subblock segments");
    Ok(SubBlockDirectory::from_entries(entries))
}
