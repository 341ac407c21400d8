use thiserror::Error;

/// I/O errors that can occur when reading slide bytes
#[derive(Debug, Clone, Error)]
pub enum IoError {
    /// Error from the local filesystem
    #[error("File error: {0}")]
    File(String),

    /// Requested range exceeds resource bounds
    #[error("Range out of bounds: requested {requested} bytes at offset {offset}, size is {size}")]
    RangeOutOfBounds {
        offset: u64,
        requested: u64,
        size: u64,
    },

    /// File not found
    #[error("File not found: {0}")]
    NotFound(String),
}

impl From<std::io::Error> for IoError {
    fn from(err: std::io::Error) -> Self {
        match err.kind() {
            std::io::ErrorKind::NotFound => IoError::NotFound(err.to_string()),
            _ => IoError::File(err.to_string()),
        }
    }
}

/// Errors related to format detection and validation
#[derive(Debug, Clone, Error)]
pub enum FormatError {
    /// I/O error while reading the file
    #[error("I/O error: {0}")]
    Io(#[from] IoError),

    /// TIFF parsing error
    #[error("TIFF error: {0}")]
    Tiff(#[from] TiffError),

    /// File format is not supported
    #[error("Unsupported format: {reason}")]
    UnsupportedFormat { reason: String },
}

/// Errors that can occur when parsing TIFF files
#[derive(Debug, Clone, Error)]
pub enum TiffError {
    /// I/O error while reading the file
    #[error("I/O error: {0}")]
    Io(#[from] IoError),

    /// Invalid TIFF magic bytes (not II or MM)
    #[error("Invalid TIFF magic bytes: expected 0x4949 (II) or 0x4D4D (MM), got 0x{0:04X}")]
    InvalidMagic(u16),

    /// Invalid TIFF version number
    #[error("Invalid TIFF version: expected 42 (TIFF) or 43 (BigTIFF), got {0}")]
    InvalidVersion(u16),

    /// Invalid BigTIFF offset byte size (must be 8)
    #[error("Invalid BigTIFF offset byte size: expected 8, got {0}")]
    InvalidBigTiffOffsetSize(u16),

    /// File is too small to contain a valid TIFF header
    #[error("File too small: need at least {required} bytes, got {actual}")]
    FileTooSmall { required: u64, actual: u64 },

    /// Invalid IFD offset (points outside file or to invalid location)
    #[error("Invalid IFD offset: {0}")]
    InvalidIfdOffset(u64),

    /// Required tag is missing from IFD
    #[error("Missing required tag: {0}")]
    MissingTag(&'static str),

    /// Tag has unexpected type or count
    #[error("Invalid tag value for {tag}: {message}")]
    InvalidTagValue { tag: &'static str, message: String },

    /// Unsupported compression scheme
    #[error("Unsupported compression: {0} (only uncompressed and JPEG tiles are supported)")]
    UnsupportedCompression(String),

    /// File uses strips instead of tiles
    #[error("Unsupported organization: file uses strips instead of tiles")]
    StripOrganization,

    /// Pixel layout the decoder cannot turn into RGB
    #[error("Unsupported pixel layout: {0}")]
    UnsupportedPixelLayout(String),

    /// Unknown field type in IFD entry
    #[error("Unknown field type: {0}")]
    UnknownFieldType(u16),
}

/// Errors raised while reading levels out of an opened slide
#[derive(Debug, Clone, Error)]
pub enum SlideError {
    /// Format detection or TIFF structure error
    #[error(transparent)]
    Format(#[from] FormatError),

    /// TIFF parsing error while reading tile data
    #[error(transparent)]
    Tiff(#[from] TiffError),

    /// Level index not present in the slide
    #[error("Level {level} out of range (slide has {level_count} levels)")]
    LevelOutOfRange { level: usize, level_count: usize },

    /// Region does not lie inside the level
    #[error("Region {width}x{height} at ({x}, {y}) exceeds level {level} bounds ({level_width}x{level_height})")]
    RegionOutOfBounds {
        level: usize,
        x: u32,
        y: u32,
        width: u32,
        height: u32,
        level_width: u32,
        level_height: u32,
    },

    /// Tile payload could not be decoded
    #[error("Failed to decode tile ({tile_x}, {tile_y}) of level {level}: {message}")]
    Decode {
        level: usize,
        tile_x: u32,
        tile_y: u32,
        message: String,
    },
}

/// Errors that abort processing of one slide
#[derive(Debug, Clone, Error)]
pub enum MaskError {
    /// Source file is corrupt, unsupported, or could not be decoded
    #[error("Unreadable slide: {reason}")]
    UnreadableSlide { reason: String },

    /// Requested level is not present in the slide
    #[error("Level {level} out of range (slide has {level_count} levels)")]
    LevelOutOfRange { level: usize, level_count: usize },

    /// Explicit threshold outside 0..=255
    #[error("Invalid threshold {0}: must be within 0..=255")]
    InvalidThreshold(i64),

    /// Any other parameter outside its accepted domain
    #[error("Invalid parameter {name}: {message}")]
    InvalidParameter { name: &'static str, message: String },

    /// Output file could not be written
    #[error("Failed to write {path}: {reason}")]
    OutputWriteFailure { path: String, reason: String },
}

impl From<SlideError> for MaskError {
    fn from(err: SlideError) -> Self {
        match err {
            SlideError::LevelOutOfRange { level, level_count } => {
                MaskError::LevelOutOfRange { level, level_count }
            }
            other => MaskError::UnreadableSlide {
                reason: other.to_string(),
            },
        }
    }
}

impl From<FormatError> for MaskError {
    fn from(err: FormatError) -> Self {
        MaskError::UnreadableSlide {
            reason: err.to_string(),
        }
    }
}

impl MaskError {
    /// Build an [`MaskError::OutputWriteFailure`] for `path`.
    pub fn write_failure(path: &std::path::Path, reason: impl std::fmt::Display) -> Self {
        MaskError::OutputWriteFailure {
            path: path.display().to_string(),
            reason: reason.to_string(),
        }
    }
}

/// A [`MaskError`] together with the slide it aborted
#[derive(Debug, Clone, Error)]
#[error("{path}: {source}")]
pub struct ProcessError {
    pub path: String,
    #[source]
    pub source: MaskError,
}

impl ProcessError {
    pub fn new(path: impl Into<String>, source: MaskError) -> Self {
        Self {
            path: path.into(),
            source,
        }
    }
}

/// Errors that stop a batch run before any slide is processed
#[derive(Debug, Clone, Error)]
pub enum BatchError {
    /// Configuration file missing or unreadable
    #[error("Failed to read config {path}: {reason}")]
    ConfigRead { path: String, reason: String },

    /// Configuration file is not valid JSON or misses required fields
    #[error("Invalid config {path}: {reason}")]
    ConfigParse { path: String, reason: String },

    /// Configuration parsed but holds unusable values
    #[error("Invalid config: {0}")]
    Invalid(String),

    /// Input or output directory could not be used
    #[error("Directory error for {path}: {reason}")]
    Directory { path: String, reason: String },
}
