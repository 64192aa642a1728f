use thiserror::Error;

/// I/O errors raised while reading slide bytes from storage
#[derive(Debug, Clone, Error)]
pub enum IoError {
    /// File does not exist (or the identifier does not resolve to a file)
    #[error("File not found: {0}")]
    NotFound(String),

    /// Underlying read or open failure
    #[error("Read error on {path}: {message}")]
    Read { path: String, message: String },

    /// Requested range exceeds resource bounds
    #[error("Range out of bounds: requested {requested} bytes at offset {offset}, size is {size}")]
    RangeOutOfBounds {
        offset: u64,
        requested: u64,
        size: u64,
    },
}

impl IoError {
    /// Build an IoError from a std I/O error, keeping "not found" distinguishable.
    pub fn from_std(path: &str, err: std::io::Error) -> Self {
        if err.kind() == std::io::ErrorKind::NotFound {
            IoError::NotFound(path.to_string())
        } else {
            IoError::Read {
                path: path.to_string(),
                message: err.to_string(),
            }
        }
    }
}

/// Errors raised by the image source adapter: opening, parsing and decoding slides.
#[derive(Debug, Clone, Error)]
pub enum SlideError {
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

    /// IFD offset points outside the file, loops, or the IFD is malformed
    #[error("Invalid IFD offset: {0}")]
    InvalidIfdOffset(u64),

    /// Required tag is missing from IFD
    #[error("Missing required tag: {0}")]
    MissingTag(&'static str),

    /// Tag has unexpected type or count
    #[error("Invalid tag value for {tag}: {message}")]
    InvalidTagValue { tag: &'static str, message: String },

    /// Pyramid level uses a compression other than JPEG
    #[error("Unsupported compression: {0} (only JPEG is supported)")]
    UnsupportedCompression(String),

    /// File stores its image in strips instead of tiles
    #[error("Unsupported organization: file uses strips instead of tiles")]
    StripOrganization,

    /// No IFD qualifies as a pyramid level
    #[error("No pyramid levels found")]
    NoPyramidLevels,

    /// Level index outside the pyramid
    #[error("Level {level} out of range (slide has {level_count} levels)")]
    LevelOutOfRange { level: usize, level_count: usize },

    /// A native tile could not be decoded
    #[error("Failed to decode tile ({x}, {y}) at level {level}: {message}")]
    TileDecode {
        level: usize,
        x: u32,
        y: u32,
        message: String,
    },
}

impl SlideError {
    /// Whether this error means the slide file itself is missing.
    pub fn is_not_found(&self) -> bool {
        matches!(self, SlideError::Io(IoError::NotFound(_)))
    }
}

/// Errors surfaced by the tile service
#[derive(Debug, Clone, Error)]
pub enum TileError {
    /// No slide with this identifier exists
    #[error("Slide not found: {slide_id}")]
    SlideNotFound { slide_id: String },

    /// Zoom does not correspond to a native level
    #[error("Invalid zoom level {zoom} (slide has {level_count} levels)")]
    InvalidZoom { zoom: u32, level_count: usize },

    /// Tile lies outside the level's grid
    #[error("Tile ({x}, {y}) at zoom {zoom} is out of bounds ({tiles_x}x{tiles_y} tiles)")]
    OutOfBounds {
        zoom: u32,
        x: u32,
        y: u32,
        tiles_x: u32,
        tiles_y: u32,
    },

    /// Slide could not be opened or its pixels could not be read
    #[error("Slide decode error: {0}")]
    Slide(#[from] SlideError),

    /// Rendered region could not be encoded as JPEG
    #[error("Failed to encode tile: {message}")]
    Encode { message: String },
}

/// Errors raised by the metadata store
#[derive(Debug, Error)]
pub enum StoreError {
    /// Row with this id does not exist
    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: i64 },

    /// Referenced row (folder or slide) does not exist
    #[error("Referenced {entity} {id} does not exist")]
    MissingReference { entity: &'static str, id: i64 },

    /// SQLite failure
    #[error("Database error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// The blocking database task panicked or was cancelled
    #[error("Database task failed: {0}")]
    Task(String),
}
