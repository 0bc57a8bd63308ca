//! Placement of one map onto another.
//!
//! An "object" map (a tree, a building, ...) carries its content on
//! integer-named layers. Placing it onto a base map at an anchor `(x, y)`
//! walks exactly those written layers, so callers can composite one z-level
//! at a time or whole multi-level objects with a single offset.
//!
//! A negative `zoffset` is the auto sentinel: the base map's occupied
//! z-levels are scanned from highest to lowest and the first level occupied
//! at the anchor becomes the offset (0 when none is).

use log::warn;

use crate::map::Map;

impl Map {
    fn resolve_zoffset(&self, x: i32, y: i32, zoffset: i32) -> i32 {
        if zoffset >= 0 {
            return zoffset;
        }
        for level in self.z_levels().iter().rev() {
            if self.at(x, y, *level).is_some() {
                return *level;
            }
        }
        0
    }

    /// Returns whether copying map `o` in at `(x, y, zoffset)` would avoid
    /// overwriting any existing tile on any layer of this map.
    ///
    /// A placement where any non-empty cell of `o` would land outside this
    /// map's bounds never fits; partially-off-map placements are rejected,
    /// not clipped.
    pub fn fits(&self, x: i32, y: i32, zoffset: i32, o: &Map) -> bool {
        let zoffset = self.resolve_zoffset(x, y, zoffset);

        for layer in &o.layers {
            let z: i32 = match layer.name.parse() {
                Ok(z) => z,
                Err(_) => continue,
            };

            for (index, &tid) in layer.cells.iter().enumerate() {
                if tid == 0 {
                    continue; // nil tile
                }

                // the reverse of index = y * width + x
                let tx = index as i32 % o.width;
                let ty = index as i32 / o.width;

                // check if the object goes off the map
                if tx + x < 0 || tx + x >= self.width || ty + y < 0 || ty + y >= self.height {
                    return false;
                }

                // check if there is a tile there
                if self.at(tx + x, ty + y, z + zoffset).is_some() {
                    return false;
                }
            }
        }

        true
    }

    /// Add the given map `o` starting at `(x, y)`, layers offset by
    /// `zoffset`. `(x, y)` is the top left tile, irrespective of z-layer.
    ///
    /// Only integer-named layers of `o` are considered. Source properties of
    /// placed tiles are merged onto this map's, the incoming object winning
    /// on key conflicts. Cells whose id has no tileset entry are logged and
    /// skipped.
    pub fn add(&mut self, x: i32, y: i32, zoffset: i32, o: &Map) {
        let zoffset = self.resolve_zoffset(x, y, zoffset);

        for layer in &o.layers {
            let z: i32 = match layer.name.parse() {
                Ok(z) => z,
                Err(_) => continue,
            };

            for (index, &tid) in layer.cells.iter().enumerate() {
                if tid == 0 {
                    continue; // nil tile
                }
                let tile = match o.tileset.tile_by_id(tid) {
                    Some(t) => t,
                    None => {
                        // a tile with no tileset entry: data inconsistency,
                        // not worth failing the whole placement over
                        warn!(
                            "layer '{}' cell {} references unknown tile id {}, skipping",
                            layer.name, index, tid
                        );
                        continue;
                    }
                };

                let tx = index as i32 % o.width;
                let ty = index as i32 / o.width;
                let src = tile.image.source.clone();

                if let Err(e) = self.set(tx + x, ty + y, z + zoffset, &src) {
                    warn!("skipping off-map cell during add: {}", e);
                    continue;
                }

                let mut merged = self.properties(&src).cloned().unwrap_or_default();
                if let Some(incoming) = o.properties(&src) {
                    merged.merge(incoming);
                }
                self.set_properties(&src, merged);
            }
        }
    }
}
