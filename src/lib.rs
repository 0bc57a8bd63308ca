//! Grid-based multi-layer tile maps in the TMX format.
//!
//! This crate provides:
//! - An in-memory [`Map`] of stacked, integer-named tile layers
//! - Typed per-source [`Properties`] (strings, ints, bools)
//! - TMX read/write with CSV-encoded layer data
//! - Collision-aware placement of one map onto another (`fits` / `add`)
//! - A SQLite-backed [`InfiniteMap`] for out-of-core maps
//! - The [`Tileable`] trait both backings implement
//!
//! ```
//! use tilekit::{Map, MapConfig};
//!
//! let mut map = Map::new(&MapConfig::default());
//! map.set(2, 3, 0, "grass.png")?;
//! assert!(map.at(2, 3, 0).is_some());
//!
//! let mut out = Vec::new();
//! map.encode(&mut out)?;
//! # Ok::<(), tilekit::TileError>(())
//! ```

pub mod codec;
pub mod compose;
pub mod config;
pub mod error;
pub mod infinite;
pub mod map;
pub mod properties;
pub mod tileable;
pub mod tmx;

pub use codec::{decode_grid, encode_grid};
pub use config::MapConfig;
pub use error::TileError;
pub use infinite::InfiniteMap;
pub use map::{Image, ImageLayer, Map, Tile, TileLayer, Tileset};
pub use properties::{Properties, Property, PROP_BOOL, PROP_INT, PROP_STRING};
pub use tileable::Tileable;
