//! Crate-wide error type.

use std::fmt;

/// Error type for map, codec and store operations.
#[derive(Debug)]
pub enum TileError {
    /// A tile-data token that is not a valid unsigned integer.
    MalformedGrid(String),
    /// Malformed or unsupported TMX content.
    Xml(String),
    /// A decoded map must contain exactly one tileset; holds the count found.
    UnsupportedTileset(usize),
    /// Cell write outside the map extent.
    OutOfBounds { index: i64, len: i64 },
    /// Materialize called with a non-positive extent.
    InvalidRegion { x0: i32, y0: i32, x1: i32, y1: i32 },
    /// Failure in the persistent store.
    Storage(rusqlite::Error),
    /// Property blob (de)serialization error.
    Serialization(serde_json::Error),
    /// I/O error.
    Io(std::io::Error),
}

impl fmt::Display for TileError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TileError::MalformedGrid(tok) => {
                write!(f, "tile data token '{}' is not a valid unsigned integer", tok)
            }
            TileError::Xml(msg) => write!(f, "XML error: {}", msg),
            TileError::UnsupportedTileset(n) => {
                write!(f, "lib only supports 1 tileset, found {}", n)
            }
            TileError::OutOfBounds { index, len } => {
                write!(f, "index {} is out of bounds for this map (0..{})", index, len)
            }
            TileError::InvalidRegion { x0, y0, x1, y1 } => {
                write!(
                    f,
                    "requested map region ({},{})-({},{}) invalid, unable to render map",
                    x0, y0, x1, y1
                )
            }
            TileError::Storage(e) => write!(f, "storage error: {}", e),
            TileError::Serialization(e) => write!(f, "serialization error: {}", e),
            TileError::Io(e) => write!(f, "I/O error: {}", e),
        }
    }
}

impl std::error::Error for TileError {}

impl From<rusqlite::Error> for TileError {
    fn from(e: rusqlite::Error) -> Self {
        TileError::Storage(e)
    }
}

impl From<serde_json::Error> for TileError {
    fn from(e: serde_json::Error) -> Self {
        TileError::Serialization(e)
    }
}

impl From<std::io::Error> for TileError {
    fn from(e: std::io::Error) -> Self {
        TileError::Io(e)
    }
}

impl From<quick_xml::Error> for TileError {
    fn from(e: quick_xml::Error) -> Self {
        TileError::Xml(e.to_string())
    }
}
