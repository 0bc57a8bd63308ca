//! The capability interface shared by the in-memory map and the store.

use crate::error::TileError;
use crate::map::Map;
use crate::properties::Properties;

/// Something we can tile: the in-memory [`Map`] and the persistent
/// [`crate::InfiniteMap`] both implement this, so placement pipelines can
/// program against the interface instead of a concrete backing.
///
/// Every method returns `Result` so the store-backed variant can surface
/// storage failures; the in-memory variant only ever fails on out-of-bounds
/// writes.
pub trait Tileable {
    /// Set a single tile (given src image) at `(x, y, z)`.
    fn set(&mut self, x: i32, y: i32, z: i32, src: &str) -> Result<(), TileError>;

    /// Add an object `o` beginning at `(x, y)` with layers offset by
    /// `zoffset`. Any set properties on tiles in `o` are merged in.
    fn add(&mut self, x: i32, y: i32, zoffset: i32, o: &Map) -> Result<(), TileError>;

    /// Whether placing object `o` beginning at `(x, y, zoffset)` would
    /// avoid overwriting any currently set tile.
    fn fits(&self, x: i32, y: i32, zoffset: i32, o: &Map) -> Result<bool, TileError>;

    /// Properties (if set) of the given src.
    fn properties(&self, src: &str) -> Result<Option<Properties>, TileError>;

    /// Set properties on the given src, replacing any existing bag.
    fn set_properties(&mut self, src: &str, props: &Properties) -> Result<(), TileError>;
}

impl Tileable for Map {
    fn set(&mut self, x: i32, y: i32, z: i32, src: &str) -> Result<(), TileError> {
        Map::set(self, x, y, z, src)
    }

    fn add(&mut self, x: i32, y: i32, zoffset: i32, o: &Map) -> Result<(), TileError> {
        Map::add(self, x, y, zoffset, o);
        Ok(())
    }

    fn fits(&self, x: i32, y: i32, zoffset: i32, o: &Map) -> Result<bool, TileError> {
        Ok(Map::fits(self, x, y, zoffset, o))
    }

    fn properties(&self, src: &str) -> Result<Option<Properties>, TileError> {
        Ok(Map::properties(self, src).cloned())
    }

    fn set_properties(&mut self, src: &str, props: &Properties) -> Result<(), TileError> {
        Map::set_properties(self, src, props.clone());
        Ok(())
    }
}
