//! Map configuration.

/// Settings for a new [`crate::Map`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MapConfig {
    /// Map width in tiles.
    pub width: i32,
    /// Map height in tiles.
    pub height: i32,
    /// Tile width in pixels.
    pub tile_width: i32,
    /// Tile height in pixels.
    pub tile_height: i32,
}

impl Default for MapConfig {
    fn default() -> Self {
        Self {
            width: 100,
            height: 100,
            tile_width: 32,
            tile_height: 32,
        }
    }
}
