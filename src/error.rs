use thiserror::Error;

/// I/O errors that can occur when reading container bytes
#[derive(Debug, Clone, Error)]
pub enum IoError {
    /// Requested range exceeds resource bounds
    #[error("Range out of bounds: requested {requested} bytes at offset {offset}, size is {size}")]
    RangeOutOfBounds {
        offset: u64,
        requested: u64,
        size: u64,
    },

    /// File does not exist
    #[error("File not found: {0}")]
    NotFound(String),

    /// Error from the operating system
    #[error("I/O error: {0}")]
    Io(String),
}

impl From<std::io::Error> for IoError {
    fn from(err: std::io::Error) -> Self {
        IoError::Io(err.to_string())
    }
}

/// Errors raised while parsing the on-disk container structure
#[derive(Debug, Clone, Error)]
pub enum ContainerError {
    /// I/O error while reading the file
    #[error("I/O error: {0}")]
    Io(#[from] IoError),

    /// Bad magic, truncated segment, checksum mismatch or unfinalized file
    #[error("Corrupt container: {reason}")]
    CorruptContainer { reason: String },

    /// Pixel type identifier not known to this engine
    #[error("Unsupported pixel type: {0}")]
    UnsupportedPixelType(i32),

    /// The metadata segment could not be parsed
    #[error("Metadata error: {0}")]
    Metadata(#[from] MetadataError),

    /// A subblock payload could not be decoded
    #[error("Codec error: {0}")]
    Codec(#[from] CodecError),

    /// No attachment with the requested name
    #[error("Attachment not found: {0}")]
    AttachmentNotFound(String),
}

impl ContainerError {
    /// Shorthand for a `CorruptContainer` error.
    pub fn corrupt(reason: impl Into<String>) -> Self {
        ContainerError::CorruptContainer {
            reason: reason.into(),
        }
    }
}

/// Errors from the codec registry
#[derive(Debug, Clone, Error)]
pub enum CodecError {
    /// No codec registered for this compression identifier
    #[error("Unsupported compression: {0}")]
    UnsupportedCompression(i32),

    /// Registered codec cannot encode
    #[error("Compression {0} has no encoder")]
    EncodeNotSupported(i32),

    /// Decoded buffer does not match the declared geometry
    #[error("Geometry mismatch: expected {expected} bytes, got {actual}")]
    GeometryMismatch { expected: usize, actual: usize },

    /// The codec does not handle this pixel type
    #[error("Codec {codec} does not support pixel type {pixel_type}")]
    UnsupportedPixelType {
        codec: &'static str,
        pixel_type: &'static str,
    },

    /// Payload could not be decoded
    #[error("Failed to decode payload: {message}")]
    Decode { message: String },

    /// Pixel data could not be encoded
    #[error("Failed to encode payload: {message}")]
    Encode { message: String },
}

/// Errors from the metadata document and display settings
#[derive(Debug, Clone, Error)]
pub enum MetadataError {
    /// XML could not be parsed
    #[error("Failed to parse metadata XML: {0}")]
    Parse(String),

    /// Document could not be written
    #[error("Failed to serialize metadata XML: {0}")]
    Serialize(String),

    /// Malformed node path
    #[error("Invalid metadata path '{path}': {message}")]
    InvalidPath { path: String, message: String },

    /// Gradation curve rejected; prior settings unchanged
    #[error("Invalid gradation curve: {0}")]
    InvalidCurve(String),

    /// A node holds a value of the wrong shape
    #[error("Invalid value at '{path}': {message}")]
    InvalidValue { path: String, message: String },
}

/// Errors from parsing or validating a dimension coordinate
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CoordinateError {
    /// Dimension letter not recognized
    #[error("Unknown dimension '{0}'")]
    UnknownDimension(char),

    /// Dimension appears twice
    #[error("Dimension {0} specified more than once")]
    DuplicateDimension(char),

    /// Index missing or not an integer
    #[error("Invalid index for dimension {dimension}: '{value}'")]
    InvalidIndex { dimension: char, value: String },

    /// Negative index
    #[error("Negative index {index} for dimension {dimension}")]
    NegativeIndex { dimension: char, index: i32 },
}

/// Errors from region reads and compositing
#[derive(Debug, Clone, Error)]
pub enum CompositeError {
    /// No requested channel has any subblock at the resolved level
    #[error("Region is empty: no channel has subblocks at level {level}")]
    EmptyRegion { level: u8 },

    /// Requested level does not exist for the selection
    #[error("Invalid level {level}: container has levels {available:?}")]
    InvalidLevel { level: u8, available: Vec<u8> },

    /// Zoom outside (0, 1]
    #[error("Invalid zoom {0}: must be in (0, 1]")]
    InvalidZoom(f64),

    /// Region with zero area or too large
    #[error("Invalid region: {0}")]
    InvalidRegion(String),

    /// Output pixel type cannot hold a composite
    #[error("Unsupported output pixel type: {0}")]
    UnsupportedOutput(&'static str),

    /// Tiles of one channel disagree on pixel type
    #[error("Channel {channel} mixes pixel types {first} and {second}")]
    MixedPixelTypes {
        channel: i32,
        first: &'static str,
        second: &'static str,
    },

    /// Caller abandoned the request
    #[error("Region read cancelled")]
    Cancelled,

    /// Display settings could not be read
    #[error("Metadata error: {0}")]
    Metadata(#[from] MetadataError),

    /// A tile failed to decode
    #[error("Codec error: {0}")]
    Codec(#[from] CodecError),

    /// A tile could not be read
    #[error("Container error: {0}")]
    Container(#[from] ContainerError),
}

/// Errors from the writer
#[derive(Debug, Clone, Error)]
pub enum WriteError {
    /// Writer already finalized
    #[error("Container is closed for writing")]
    ContainerClosed,

    /// Another writer holds this container
    #[error("Container is already open for writing: {0}")]
    WriteConflict(String),

    /// Malformed dimension tuple, level or rectangle
    #[error("Invalid coordinate: {0}")]
    InvalidCoordinate(String),

    /// Pixel buffer does not match the declared geometry
    #[error("Invalid pixel buffer: {0}")]
    InvalidBuffer(String),

    /// Attachment name or content type does not fit its entry
    #[error("Invalid attachment: {0}")]
    InvalidAttachment(String),

    /// Underlying write failed
    #[error("I/O error: {0}")]
    Io(#[from] IoError),

    /// Encode failed
    #[error("Codec error: {0}")]
    Codec(#[from] CodecError),

    /// Metadata update failed
    #[error("Metadata error: {0}")]
    Metadata(#[from] MetadataError),

    /// Container structure could not be produced
    #[error("Container error: {0}")]
    Container(#[from] ContainerError),
}

impl From<CoordinateError> for WriteError {
    fn from(err: CoordinateError) -> Self {
        WriteError::InvalidCoordinate(err.to_string())
    }
}

impl From<std::io::Error> for WriteError {
    fn from(err: std::io::Error) -> Self {
        WriteError::Io(IoError::from(err))
    }
}
