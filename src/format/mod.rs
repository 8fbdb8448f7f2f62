//! On-disk structures of the container format.
//!
//! All integers are little-endian. The file is a sequence of 32-byte-aligned
//! segments:
//!
//! ```text
//! +------------------+  offset 0
//! | ZISRAWFILE       |  file header (positions of directory and metadata)
//! +------------------+
//! | ZISRAWSUBBLOCK   |  one per tile, in write order
//! | ...              |
//! | ZISRAWATTACH     |  attachments, interleaved with subblocks
//! +------------------+
//! | ZISRAWDIRECTORY  |  written by finalize
//! | ZISRAWMETADATA   |
//! | ZISRAWATTDIR     |
//! +------------------+
//! ```
//!
//! The header is rewritten last; a file whose header still has the
//! update-pending flag set was never finalized.

pub mod attachment;
pub mod entry;
pub mod header;
pub mod metadata;
pub mod segment;
pub mod subblock;

pub use attachment::{
    encode_attachment_directory, encode_attachment_segment, parse_attachment_directory,
    parse_attachment_segment, AttachmentEntry, ATTACHMENT_ENTRY_SIZE,
};
pub use entry::{
    encode_directory_segment, parse_directory_segment, SubBlockEntry, DIRECTORY_HEADER_SIZE,
    DV_FIXED_SIZE, MAX_SUBBLOCK_PIXELS,
};
pub use header::{FileHeader, DEFAULT_PYRAMID_FACTOR, FILE_HEADER_DATA_SIZE};
pub use metadata::{encode_metadata_segment, parse_metadata_segment};
pub use segment::{
    aligned_size, Segment, SegmentHeader, SegmentKind, SegmentReader, SegmentWriter,
    SEGMENT_HEADER_SIZE,
};
pub use subblock::{
    encode_subblock_segment, parse_subblock_entry, parse_subblock_segment, SubBlockSegment,
    SUBBLOCK_PREFIX_LEN,
};
