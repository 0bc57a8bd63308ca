//! In-memory tile map model.
//!
//! A [`Map`] owns exactly one [`Tileset`], any number of tile layers and
//! image layers, and root-level properties. Tiles are identified by their
//! image source string; writing a cell with an unseen source allocates a
//! new [`Tile`] with the next sequential id. Id 0 is reserved for the nil
//! (empty) tile and is never allocated.

use std::collections::HashMap;

use crate::config::MapConfig;
use crate::error::TileError;
use crate::properties::Properties;

/// An image file referenced from a tile or image layer.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Image {
    pub source: String,
    /// Width in pixels.
    pub width: i32,
    /// Height in pixels.
    pub height: i32,
}

/// A tileset entry: one tile per distinct image source.
#[derive(Clone, Debug, PartialEq)]
pub struct Tile {
    /// Local id, unique within the owning map. Never 0.
    pub id: u32,
    pub image: Image,
    pub properties: Properties,
}

/// The map's single tileset: an ordered tile list plus two derived indices.
///
/// The indices map ids and source strings to positions in `tiles` and are
/// maintained only through [`Tileset::push`] and [`Tileset::reindex`].
#[derive(Clone, Debug, Default)]
pub struct Tileset {
    /// Offset added to local ids when serialized, subtracted when parsed.
    pub first_gid: u32,
    pub name: String,
    /// Tile width in pixels.
    pub tile_width: i32,
    /// Tile height in pixels.
    pub tile_height: i32,
    pub(crate) tiles: Vec<Tile>,
    by_id: HashMap<u32, usize>,
    by_src: HashMap<String, usize>,
}

impl Tileset {
    pub(crate) fn new(name: &str, first_gid: u32) -> Self {
        Self {
            first_gid,
            name: name.to_string(),
            ..Self::default()
        }
    }

    pub fn tiles(&self) -> &[Tile] {
        &self.tiles
    }

    pub fn tile_by_id(&self, id: u32) -> Option<&Tile> {
        self.by_id.get(&id).map(|&i| &self.tiles[i])
    }

    pub fn tile_by_src(&self, src: &str) -> Option<&Tile> {
        self.by_src.get(src).map(|&i| &self.tiles[i])
    }

    fn tile_by_src_mut(&mut self, src: &str) -> Option<&mut Tile> {
        let i = *self.by_src.get(src)?;
        Some(&mut self.tiles[i])
    }

    pub(crate) fn push(&mut self, tile: Tile) {
        let i = self.tiles.len();
        self.by_id.insert(tile.id, i);
        self.by_src.insert(tile.image.source.clone(), i);
        self.tiles.push(tile);
    }

    /// Rebuild both indices from the owning tile list.
    pub(crate) fn reindex(&mut self) {
        self.by_id.clear();
        self.by_src.clear();
        for (i, tile) in self.tiles.iter().enumerate() {
            self.by_id.insert(tile.id, i);
            self.by_src.insert(tile.image.source.clone(), i);
        }
    }
}

/// A dense tile layer. The name of a layer written through [`Map::set`] is
/// the decimal form of its z-level; layers with non-numeric names are inert
/// for composition but still round-trip through the codec.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TileLayer {
    /// Display id, assigned on encode.
    pub id: u32,
    pub name: String,
    /// Width in tiles.
    pub width: i32,
    /// Height in tiles.
    pub height: i32,
    /// Row-major local tile ids, length `width * height`.
    /// Cell `(x, y)` lives at index `y * width + x`; 0 means empty.
    pub(crate) cells: Vec<u32>,
}

impl TileLayer {
    pub fn cells(&self) -> &[u32] {
        &self.cells
    }
}

/// An image overlay layer; opaque to composition.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ImageLayer {
    /// Display id, assigned on encode.
    pub id: u32,
    pub name: String,
    pub image: Image,
}

/// An orthogonal, multi-layer tile map.
#[derive(Clone, Debug)]
pub struct Map {
    /// Always `"orthogonal"`, the only supported mode.
    pub orientation: String,
    /// Width in tiles.
    pub width: i32,
    /// Height in tiles.
    pub height: i32,
    /// Tile width in pixels.
    pub tile_width: i32,
    /// Tile height in pixels.
    pub tile_height: i32,
    pub(crate) root_properties: Properties,
    pub(crate) tileset: Tileset,
    pub(crate) layers: Vec<TileLayer>,
    pub(crate) image_layers: Vec<ImageLayer>,
    /// Next tile id to allocate. Reconstructed on decode as
    /// `max(existing ids) + 1`.
    pub(crate) next_id: u32,
}

impl Map {
    /// Returns a new empty map with one default tileset and no layers.
    pub fn new(cfg: &MapConfig) -> Self {
        let mut tileset = Tileset::new("default", 1);
        tileset.tile_width = cfg.tile_width;
        tileset.tile_height = cfg.tile_height;

        Self {
            orientation: "orthogonal".to_string(),
            width: cfg.width,
            height: cfg.height,
            tile_width: cfg.tile_width,
            tile_height: cfg.tile_height,
            root_properties: Properties::new(),
            tileset,
            layers: Vec::new(),
            image_layers: Vec::new(),
            next_id: 1,
        }
    }

    pub fn tileset(&self) -> &Tileset {
        &self.tileset
    }

    pub fn layers(&self) -> &[TileLayer] {
        &self.layers
    }

    pub fn image_layers(&self) -> &[ImageLayer] {
        &self.image_layers
    }

    /// Properties set on the map itself.
    pub fn map_properties(&self) -> &Properties {
        &self.root_properties
    }

    /// Replace the map's own properties.
    pub fn set_map_properties(&mut self, props: Properties) {
        self.root_properties = props;
    }

    /// Flat cell index for `(x, y)`, or `None` when outside `[0, w*h)`.
    fn cell_index(&self, x: i32, y: i32) -> Option<usize> {
        let index = y as i64 * self.width as i64 + x as i64;
        let len = self.width as i64 * self.height as i64;
        if index < 0 || index >= len {
            return None;
        }
        Some(index as usize)
    }

    fn layer(&self, z: i32) -> Option<&TileLayer> {
        let name = z.to_string();
        self.layers.iter().find(|l| l.name == name)
    }

    /// Find or lazily create the layer named after `z`.
    fn layer_mut(&mut self, z: i32) -> &mut TileLayer {
        let name = z.to_string();
        let idx = match self.layers.iter().position(|l| l.name == name) {
            Some(i) => i,
            None => {
                self.layers.push(TileLayer {
                    id: 0,
                    name,
                    width: self.width,
                    height: self.height,
                    cells: vec![0; (self.width as i64 * self.height as i64).max(0) as usize],
                });
                self.layers.len() - 1
            }
        };
        &mut self.layers[idx]
    }

    /// Register a new tile for `source` with the next sequential id.
    fn new_tile(&mut self, source: &str) -> u32 {
        let id = self.next_id;
        self.next_id += 1;
        self.tileset.push(Tile {
            id,
            image: Image {
                source: source.to_string(),
                width: self.tile_width,
                height: self.tile_height,
            },
            properties: Properties::new(),
        });
        id
    }

    /// Set the tile source for `(x, y, z)`.
    ///
    /// If the source doesn't exist in the tileset it is added. Passing `""`
    /// sets the nil tile (id 0).
    pub fn set(&mut self, x: i32, y: i32, z: i32, source: &str) -> Result<(), TileError> {
        let index = self.cell_index(x, y).ok_or(TileError::OutOfBounds {
            index: y as i64 * self.width as i64 + x as i64,
            len: self.width as i64 * self.height as i64,
        })?;

        let id = if source.is_empty() {
            0
        } else {
            match self.tileset.tile_by_src(source) {
                Some(t) => t.id,
                None => self.new_tile(source),
            }
        };

        self.layer_mut(z).cells[index] = id;
        Ok(())
    }

    /// Properties of the tile at `(x, y, z)`, or `None` when the layer is
    /// missing, the index is out of range, the cell is empty, or the cell's
    /// id has no tileset entry.
    pub fn at(&self, x: i32, y: i32, z: i32) -> Option<&Properties> {
        let index = self.cell_index(x, y)?;
        let layer = self.layer(z)?;
        let id = *layer.cells.get(index)?;
        if id == 0 {
            return None;
        }
        self.tileset.tile_by_id(id).map(|t| &t.properties)
    }

    /// Properties of the tile identified by `source`, or `None`.
    ///
    /// A pure lookup: the nil source `""` and unknown sources report `None`,
    /// and no tile is ever allocated.
    pub fn properties(&self, source: &str) -> Option<&Properties> {
        if source.is_empty() {
            // the nil tile has no properties
            return None;
        }
        self.tileset.tile_by_src(source).map(|t| &t.properties)
    }

    /// Replace (not merge) the properties on the tile identified by `source`,
    /// allocating the tile if the source is unseen. No-op for `""`.
    pub fn set_properties(&mut self, source: &str, props: Properties) {
        if source.is_empty() {
            // cannot set properties on the nil tile
            return;
        }
        if self.tileset.tile_by_src(source).is_none() {
            self.new_tile(source);
        }
        if let Some(tile) = self.tileset.tile_by_src_mut(source) {
            tile.properties = props;
        }
    }

    /// All z-levels (layers named after an integer), sorted low to high.
    pub fn z_levels(&self) -> Vec<i32> {
        let mut levels: Vec<i32> = self
            .layers
            .iter()
            .filter_map(|l| l.name.parse().ok())
            .collect();
        levels.sort_unstable();
        levels
    }

    /// Set (or create) the `"background"` image layer, sized to cover the
    /// whole map in pixels.
    pub fn set_background(&mut self, src: &str) {
        let idx = match self
            .image_layers
            .iter()
            .position(|l| l.name == "background")
        {
            Some(i) => i,
            None => {
                self.image_layers.push(ImageLayer {
                    id: 0,
                    name: "background".to_string(),
                    image: Image::default(),
                });
                self.image_layers.len() - 1
            }
        };

        let layer = &mut self.image_layers[idx];
        layer.image.source = src.to_string();
        layer.image.width = self.tile_width * self.width;
        layer.image.height = self.tile_height * self.height;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn small_map() -> Map {
        Map::new(&MapConfig {
            width: 10,
            height: 10,
            tile_width: 32,
            tile_height: 32,
        })
    }

    #[test]
    fn test_new_map_is_empty() {
        let m = small_map();
        assert_eq!(m.orientation, "orthogonal");
        assert_eq!(m.tileset().first_gid, 1);
        assert!(m.tileset().tiles().is_empty());
        assert!(m.layers().is_empty());
        assert_eq!(m.z_levels(), Vec::<i32>::new());
    }

    #[test]
    fn test_set_allocates_tiles_and_layers() {
        let mut m = small_map();
        m.set(0, 0, 0, "grass.png").unwrap();
        m.set(1, 0, 0, "grass.png").unwrap();
        m.set(0, 0, 3, "water.png").unwrap();

        // one tile per distinct source, sequential ids from 1
        assert_eq!(m.tileset().tiles().len(), 2);
        assert_eq!(m.tileset().tile_by_src("grass.png").unwrap().id, 1);
        assert_eq!(m.tileset().tile_by_src("water.png").unwrap().id, 2);

        // layers created lazily, named after their z-level
        assert_eq!(m.layers().len(), 2);
        assert_eq!(m.z_levels(), vec![0, 3]);
    }

    #[test]
    fn test_grass_and_mushroom_scenario() {
        let mut m = small_map();
        for x in 0..10 {
            for y in 0..10 {
                m.set(x, y, 0, "grass.png").unwrap();
            }
        }
        m.set(1, 2, 1, "mushroom.png").unwrap();

        // the mushroom tile exists with an empty bag
        let props = m.properties("mushroom.png").unwrap();
        assert!(props.is_empty());

        // both grass cells reference the single grass tile's bag
        assert_eq!(m.at(1, 2, 0), m.at(0, 0, 0));
        assert!(m.at(0, 0, 0).is_some());
    }

    #[test]
    fn test_set_out_of_bounds() {
        let mut m = small_map();
        let err = m.set(0, 10, 0, "grass.png").unwrap_err();
        assert!(matches!(err, TileError::OutOfBounds { index: 100, .. }));
        assert!(m.set(-1, 0, 0, "grass.png").is_err());

        // the map is still usable afterwards
        m.set(9, 9, 0, "grass.png").unwrap();
        assert!(m.at(9, 9, 0).is_some());
    }

    #[test]
    fn test_nil_tile() {
        let mut m = small_map();
        m.set(2, 2, 0, "grass.png").unwrap();
        assert!(m.at(2, 2, 0).is_some());

        m.set(2, 2, 0, "").unwrap();
        assert!(m.at(2, 2, 0).is_none());

        // "" never allocates a tile
        assert_eq!(m.tileset().tiles().len(), 1);
        assert!(m.properties("").is_none());
    }

    #[test]
    fn test_at_absent_cases() {
        let m = small_map();
        assert!(m.at(0, 0, 0).is_none()); // no layer
        let mut m = small_map();
        m.set(0, 0, 0, "grass.png").unwrap();
        assert!(m.at(5, 5, 0).is_none()); // empty cell
        assert!(m.at(0, 11, 0).is_none()); // out of range
        assert!(m.at(0, 0, 7).is_none()); // missing layer
    }

    #[test]
    fn test_source_properties_replace_wholesale() {
        let mut m = small_map();
        let mut p1 = Properties::new();
        p1.set_int("a", 1);
        p1.set_int("b", 2);
        m.set_properties("rock.png", p1);

        let mut p2 = Properties::new();
        p2.set_int("b", 9);
        m.set_properties("rock.png", p2.clone());

        // replaced, not merged
        assert_eq!(m.properties("rock.png"), Some(&p2));
        // setting properties on an unseen source allocated its tile
        assert_eq!(m.tileset().tiles().len(), 1);
    }

    #[test]
    fn test_set_background() {
        let mut m = small_map();
        m.set_background("sky.png");
        m.set_background("night.png");

        assert_eq!(m.image_layers().len(), 1);
        let bg = &m.image_layers()[0];
        assert_eq!(bg.image.source, "night.png");
        assert_eq!(bg.image.width, 320);
        assert_eq!(bg.image.height, 320);
    }

    #[test]
    fn test_map_properties() {
        let mut m = small_map();
        let mut p = Properties::new();
        p.set_string("biome", "forest");
        m.set_map_properties(p);
        assert_eq!(m.map_properties().get_string("biome"), Some("forest"));
    }
}
