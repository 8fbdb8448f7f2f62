//! Writer and assembler.
//!
//! A writer appends segments and never rewrites them. The file header is
//! written first with the update-pending flag set, and rewritten by
//! [`ContainerWriter::finalize`] only after the directory, metadata and
//! attachment directory are on disk. Until then the file does not open.
//!
//! ```text
//! create ──► Writing ──add_subblock/add_attachment/set_display_settings──► Writing
//!               │
//!               └──finalize──► Finalized ──any mutation──► ContainerClosed
//! ```

use std::collections::HashSet;
use std::fs::File;
use std::io::{BufWriter, Seek, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, OnceLock};

use parking_lot::Mutex;
use tracing::{debug, info, warn};

use crate::codec::{CodecRegistry, COMPRESSION_NONE};
use crate::coordinate::{Coordinate, Dimension};
use crate::directory::SubBlockDirectory;
use crate::error::WriteError;
use crate::format::attachment::{MAX_CONTENT_TYPE_LEN, MAX_NAME_LEN};
use crate::format::{
    encode_attachment_directory, encode_attachment_segment, encode_directory_segment,
    encode_metadata_segment, encode_subblock_segment, AttachmentEntry, FileHeader, SegmentKind,
    SegmentWriter, SubBlockEntry, DEFAULT_PYRAMID_FACTOR, FILE_HEADER_DATA_SIZE,
};
use crate::geometry::IntRect;
use crate::metadata::{GradationCurve, MetadataManager, Rgb, IMAGE_INFO_PATH};
use crate::pixel::{PixelBuffer, PixelType};

// =============================================================================
// Options
// =============================================================================

/// Options for a new container.
#[derive(Debug, Clone)]
pub struct WriterOptions {
    /// Downsample between consecutive pyramid levels (at least 2)
    pub pyramid_factor: u32,
    /// Compression used when a subblock does not name one
    pub compression: i32,
    pub codecs: Arc<CodecRegistry>,
}

impl Default for WriterOptions {
    fn default() -> Self {
        Self {
            pyramid_factor: DEFAULT_PYRAMID_FACTOR,
            compression: COMPRESSION_NONE,
            codecs: CodecRegistry::global(),
        }
    }
}

impl WriterOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn pyramid_factor(mut self, factor: u32) -> Self {
        self.pyramid_factor = factor;
        self
    }

    pub fn compression(mut self, compression: i32) -> Self {
        self.compression = compression;
        self
    }

    pub fn codecs(mut self, codecs: Arc<CodecRegistry>) -> Self {
        self.codecs = codecs;
        self
    }
}

/// Placement of a subblock.
#[derive(Debug, Clone, PartialEq)]
pub struct SubBlockSpec {
    pub coordinate: Coordinate,
    /// 0 is full resolution
    pub level: u8,
    /// Level-local rectangle; its size must match the pixel buffer
    pub rect: IntRect,
    /// `None` uses [`WriterOptions::compression`]
    pub compression: Option<i32>,
}

impl SubBlockSpec {
    pub fn new(coordinate: Coordinate, rect: IntRect) -> Self {
        Self {
            coordinate,
            level: 0,
            rect,
            compression: None,
        }
    }

    pub fn level(mut self, level: u8) -> Self {
        self.level = level;
        self
    }

    pub fn compression(mut self, compression: i32) -> Self {
        self.compression = Some(compression);
        self
    }
}

/// Lifecycle of a writer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriterState {
    Writing,
    Finalized,
}

// =============================================================================
// Path locks
// =============================================================================

fn open_paths() -> &'static Mutex<HashSet<PathBuf>> {
    static OPEN_PATHS: OnceLock<Mutex<HashSet<PathBuf>>> = OnceLock::new();
    OPEN_PATHS.get_or_init(|| Mutex::new(HashSet::new()))
}

/// Marks a path as open for writing in this process until dropped.
#[derive(Debug)]
struct PathLock {
    path: PathBuf,
}

impl PathLock {
    fn acquire(path: &Path) -> Result<Self, WriteError> {
        let path = lock_key(path);
        if !open_paths().lock().insert(path.clone()) {
            return Err(WriteError::WriteConflict(path.display().to_string()));
        }
        Ok(Self { path })
    }
}

impl Drop for PathLock {
    fn drop(&mut self) {
        open_paths().lock().remove(&self.path);
    }
}

/// Normalize `path` so that different spellings of one file collide.
fn lock_key(path: &Path) -> PathBuf {
    let parent = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    match (parent.canonicalize(), path.file_name()) {
        (Ok(dir), Some(name)) => dir.join(name),
        _ => path.to_path_buf(),
    }
}

// =============================================================================
// ContainerWriter
// =============================================================================

/// Builds a container by appending segments.
pub struct ContainerWriter<W: Write + Seek> {
    segments: SegmentWriter<W>,
    options: WriterOptions,
    directory: SubBlockDirectory,
    metadata: MetadataManager,
    attachments: Vec<AttachmentEntry>,
    state: WriterState,
    identifier: String,
    lock: Option<PathLock>,
}

impl ContainerWriter<BufWriter<File>> {
    /// Create (or truncate) the container at `path`.
    ///
    /// # Errors
    /// `WriteConflict` if another writer in this process holds `path`.
    pub fn create(path: impl AsRef<Path>) -> Result<Self, WriteError> {
        Self::create_with(path, WriterOptions::default())
    }

    pub fn create_with(path: impl AsRef<Path>, options: WriterOptions) -> Result<Self, WriteError> {
        let path = path.as_ref();
        // Before truncating, so a conflicting create leaves the file alone
        let lock = PathLock::acquire(path)?;
        let file = File::create(path)?;

        let mut writer = Self::new(BufWriter::new(file), options)?;
        writer.identifier = path.display().to_string();
        writer.lock = Some(lock);
        Ok(writer)
    }
}

impl<W: Write + Seek> ContainerWriter<W> {
    /// Start a container in `inner`, writing the provisional file header.
    pub fn new(inner: W, options: WriterOptions) -> Result<Self, WriteError> {
        let mut segments = SegmentWriter::new(inner)?;
        let header = FileHeader::provisional(options.pyramid_factor);
        segments.append_segment_with_allocation(
            SegmentKind::FileHeader,
            &header.to_bytes(),
            FILE_HEADER_DATA_SIZE as u64,
        )?;

        Ok(Self {
            segments,
            options,
            directory: SubBlockDirectory::new(),
            metadata: MetadataManager::default(),
            attachments: Vec::new(),
            state: WriterState::Writing,
            identifier: "<stream>".to_string(),
            lock: None,
        })
    }

    pub fn state(&self) -> WriterState {
        self.state
    }

    pub fn directory(&self) -> &SubBlockDirectory {
        &self.directory
    }

    pub fn metadata(&self) -> &MetadataManager {
        &self.metadata
    }

    /// Live metadata document, serialized at finalize.
    pub fn metadata_mut(&mut self) -> Result<&mut MetadataManager, WriteError> {
        self.ensure_writing()?;
        Ok(&mut self.metadata)
    }

    pub fn attachments(&self) -> &[AttachmentEntry] {
        &self.attachments
    }

    fn ensure_writing(&self) -> Result<(), WriteError> {
        match self.state {
            WriterState::Writing => Ok(()),
            WriterState::Finalized => Err(WriteError::ContainerClosed),
        }
    }

    fn check_placement(spec: &SubBlockSpec) -> Result<(), WriteError> {
        spec.coordinate.validate()?;
        if spec.rect.is_empty() {
            return Err(WriteError::InvalidCoordinate(format!(
                "subblock {} has an empty rectangle {}",
                spec.coordinate, spec.rect
            )));
        }
        Ok(())
    }

    /// Encode `buffer` and append it as a subblock. Returns the directory
    /// index.
    ///
    /// Adding a subblock with the same coordinate and level as an earlier
    /// one supersedes it.
    pub fn add_subblock(
        &mut self,
        spec: SubBlockSpec,
        buffer: &PixelBuffer,
    ) -> Result<usize, WriteError> {
        self.ensure_writing()?;
        Self::check_placement(&spec)?;
        if buffer.width() != spec.rect.w || buffer.height() != spec.rect.h {
            return Err(WriteError::InvalidBuffer(format!(
                "{}x{} buffer for rectangle {}",
                buffer.width(),
                buffer.height(),
                spec.rect
            )));
        }

        let compression = spec.compression.unwrap_or(self.options.compression);
        let payload = self.options.codecs.encode(compression, buffer)?;
        self.append_subblock(spec, buffer.pixel_type(), compression, &payload)
    }

    /// Append an already-encoded payload as a subblock.
    ///
    /// The payload is stored as given; it is not decoded or checked.
    pub fn add_compressed_subblock(
        &mut self,
        spec: SubBlockSpec,
        pixel_type: PixelType,
        payload: &[u8],
    ) -> Result<usize, WriteError> {
        self.ensure_writing()?;
        Self::check_placement(&spec)?;
        let compression = spec.compression.unwrap_or(self.options.compression);
        self.append_subblock(spec, pixel_type, compression, payload)
    }

    fn append_subblock(
        &mut self,
        spec: SubBlockSpec,
        pixel_type: PixelType,
        compression: i32,
        payload: &[u8],
    ) -> Result<usize, WriteError> {
        let entry = SubBlockEntry {
            coordinate: spec.coordinate,
            level: spec.level,
            rect: spec.rect,
            pixel_type,
            compression,
            file_position: self.segments.position(),
            file_part: 0,
        };
        let data = encode_subblock_segment(&entry, &[], payload, &[]);
        self.segments.append_segment(SegmentKind::SubBlock, &data)?;

        if self.directory.is_empty() {
            self.metadata.set_pixel_type(pixel_type);
        }
        let index = self.directory.add(entry)?;
        debug!(
            index,
            coordinate = %spec.coordinate,
            level = spec.level,
            bytes = payload.len(),
            "Appended subblock"
        );
        Ok(index)
    }

    /// Append a named attachment. A later attachment with the same name
    /// replaces the earlier one in the attachment directory.
    pub fn add_attachment(
        &mut self,
        name: &str,
        content_type: &str,
        data: &[u8],
    ) -> Result<(), WriteError> {
        self.ensure_writing()?;
        if name.is_empty() || name.len() > MAX_NAME_LEN {
            return Err(WriteError::InvalidAttachment(format!(
                "name must be 1 to {} bytes, got {}",
                MAX_NAME_LEN,
                name.len()
            )));
        }
        if content_type.len() > MAX_CONTENT_TYPE_LEN {
            return Err(WriteError::InvalidAttachment(format!(
                "content type '{}' is longer than {} bytes",
                content_type, MAX_CONTENT_TYPE_LEN
            )));
        }

        let entry = AttachmentEntry {
            file_position: self.segments.position(),
            file_part: 0,
            content_guid: [0; 16],
            content_type: content_type.to_string(),
            name: name.to_string(),
        };
        self.segments
            .append_segment(SegmentKind::Attachment, &encode_attachment_segment(&entry, data))?;

        self.attachments.retain(|a| a.name != name);
        self.attachments.push(entry);
        Ok(())
    }

    /// Store display settings for `channel` in the metadata document.
    ///
    /// Settings may be stored before the first subblock; their range is then
    /// checked again by [`finalize`](Self::finalize).
    ///
    /// # Errors
    /// `InvalidCurve` (as `WriteError::Metadata`) if the curve leaves the
    /// intensity range; prior settings are kept.
    pub fn set_display_settings(
        &mut self,
        channel: i32,
        tint: Rgb,
        curve: &GradationCurve,
    ) -> Result<(), WriteError> {
        self.ensure_writing()?;
        self.metadata.set_display_settings(channel, tint, curve)?;
        Ok(())
    }

    /// Write the directory, metadata and attachment directory, then commit
    /// the file header. The container is readable afterwards.
    ///
    /// # Errors
    /// - `ContainerClosed` if already finalized; nothing is written then
    /// - `InvalidCurve` (as `WriteError::Metadata`) if a display setting
    ///   stored before the pixel type was known leaves the intensity range;
    ///   nothing is written and the writer stays open
    pub fn finalize(&mut self) -> Result<(), WriteError> {
        self.ensure_writing()?;
        self.metadata.check_display_settings()?;
        self.fill_image_information()?;

        let directory_position = self.segments.append_segment(
            SegmentKind::Directory,
            &encode_directory_segment(self.directory.entries()),
        )?;

        let xml = self.metadata.to_xml()?;
        let metadata_position = self
            .segments
            .append_segment(SegmentKind::Metadata, &encode_metadata_segment(&xml))?;

        let attachment_directory_position = if self.attachments.is_empty() {
            0
        } else {
            self.segments.append_segment(
                SegmentKind::AttachmentDirectory,
                &encode_attachment_directory(&self.attachments),
            )?
        };
        self.segments.flush()?;

        let mut header = FileHeader::provisional(self.options.pyramid_factor);
        header.directory_position = directory_position;
        header.metadata_position = metadata_position;
        header.attachment_directory_position = attachment_directory_position;
        header.update_pending = false;
        self.segments.commit_header(&header.to_bytes())?;

        self.state = WriterState::Finalized;
        self.lock = None;
        info!(
            container = %self.identifier,
            subblocks = self.directory.len(),
            attachments = self.attachments.len(),
            bytes = self.segments.position(),
            "Finalized container"
        );
        Ok(())
    }

    /// Fill in image sizes and pixel type the caller did not set.
    fn fill_image_information(&mut self) -> Result<(), WriteError> {
        let stats = self.directory.statistics();
        let mut fields: Vec<(&str, String)> = Vec::new();

        if let Some(bounds) = stats.full_resolution_box() {
            fields.push(("SizeX", bounds.w.to_string()));
            fields.push(("SizeY", bounds.h.to_string()));
        }
        for (name, dimension) in [
            ("SizeC", Dimension::C),
            ("SizeZ", Dimension::Z),
            ("SizeT", Dimension::T),
            ("SizeS", Dimension::S),
            ("SizeM", Dimension::M),
        ] {
            if stats.bounds(dimension).is_some() {
                fields.push((name, stats.size_of(dimension).to_string()));
            }
        }
        if let Some(pixel_type) = stats.pixel_types.first() {
            fields.push(("PixelType", pixel_type.name().to_string()));
            fields.push(("ComponentBitCount", pixel_type.bit_count().to_string()));
        }

        let document = self.metadata.document_mut();
        for (name, value) in fields {
            let path = format!("{}/{}", IMAGE_INFO_PATH, name);
            if document.get_text(&path).is_none() {
                document.set_text(&path, value)?;
            }
        }
        Ok(())
    }

    pub fn get_ref(&self) -> &W {
        self.segments.get_ref()
    }
}

impl<W: Write + Seek> Drop for ContainerWriter<W> {
    fn drop(&mut self) {
        if self.state == WriterState::Writing {
            warn!(
                container = %self.identifier,
                subblocks = self.directory.len(),
                "Container writer dropped without finalize; file is not readable"
            );
        }
    }
}
