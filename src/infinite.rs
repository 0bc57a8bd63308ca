//! Persistent, spatially-queryable tile store backed by SQLite.
//!
//! An [`InfiniteMap`] holds the same data as a [`Map`] but flushed to disk,
//! so we can hold truly massive maps and write out `.tmx` maps of practical
//! sizes for other systems. Tiles are individual `(x, y, z) -> src` records;
//! per-source properties are stored as a JSON blob keyed by src.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use rand::Rng;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension};

use crate::config::MapConfig;
use crate::error::TileError;
use crate::map::Map;
use crate::properties::Properties;
use crate::tileable::Tileable;

const SQL_UPSERT_TILE: &str = "INSERT INTO tiles (id, x, y, z, src) VALUES (?1, ?2, ?3, ?4, ?5) \
     ON CONFLICT (id) DO UPDATE SET src=excluded.src";
const SQL_UPSERT_PROPS: &str = "INSERT INTO properties (src, data) VALUES (?1, ?2) \
     ON CONFLICT (src) DO UPDATE SET data=excluded.data";

/// SQLite-backed tile store.
///
/// Offers the same placement contract as [`Map`] over out-of-core data.
/// All calls block on the underlying database; nothing runs in the
/// background.
pub struct InfiniteMap {
    filename: PathBuf,
    conn: Connection,
}

impl InfiniteMap {
    /// Create a fresh store under a randomized name in the OS temp dir.
    pub fn create() -> Result<Self, TileError> {
        let mut rng = rand::thread_rng();
        let fname = std::env::temp_dir().join(format!(
            "infmap.{}.sqlite",
            rng.gen_range(0..1_000_000)
        ));
        Self::open(fname)
    }

    /// Open the store at the given database file, creating the file and
    /// its tables if they don't exist.
    pub fn open<P: Into<PathBuf>>(path: P) -> Result<Self, TileError> {
        let filename = path.into();
        let conn = Connection::open(&filename)?;
        let inf = Self { filename, conn };
        inf.init_schema()?;
        Ok(inf)
    }

    /// Open an in-memory store (for testing).
    pub fn open_in_memory() -> Result<Self, TileError> {
        let inf = Self {
            filename: PathBuf::from(":memory:"),
            conn: Connection::open_in_memory()?,
        };
        inf.init_schema()?;
        Ok(inf)
    }

    /// Path to the infinite map data on disk.
    pub fn filename(&self) -> &Path {
        &self.filename
    }

    fn init_schema(&self) -> Result<(), TileError> {
        self.conn.execute(
            "CREATE TABLE IF NOT EXISTS tiles (
                id TEXT PRIMARY KEY,
                x INTEGER NOT NULL,
                y INTEGER NOT NULL,
                z INTEGER NOT NULL,
                src TEXT NOT NULL
            )",
            [],
        )?;
        self.conn.execute(
            "CREATE TABLE IF NOT EXISTS properties (
                src TEXT PRIMARY KEY,
                data TEXT
            )",
            [],
        )?;
        Ok(())
    }

    /// Set the given image src at `(x, y, z)`. Idempotent upsert.
    pub fn set(&self, x: i32, y: i32, z: i32, src: &str) -> Result<(), TileError> {
        self.conn.execute(
            SQL_UPSERT_TILE,
            params![tile_key(x, y, z), x, y, z, src],
        )?;
        Ok(())
    }

    /// The src set at `(x, y, z)`, or `""` if unset.
    pub fn at(&self, x: i32, y: i32, z: i32) -> Result<String, TileError> {
        let src: Option<String> = self
            .conn
            .query_row(
                "SELECT src FROM tiles WHERE x=?1 AND y=?2 AND z=?3 LIMIT 1",
                params![x, y, z],
                |row| row.get(0),
            )
            .optional()?;
        Ok(src.unwrap_or_default())
    }

    /// Materialize the rectangle `(x0,y0)-(x1,y1)` as an in-memory [`Map`],
    /// translating tiles to map-local coordinates and applying every
    /// touched source's stored properties.
    pub fn map(
        &self,
        tile_width: i32,
        tile_height: i32,
        x0: i32,
        y0: i32,
        x1: i32,
        y1: i32,
    ) -> Result<Map, TileError> {
        if x1 <= x0 || y1 <= y0 {
            return Err(TileError::InvalidRegion { x0, y0, x1, y1 });
        }

        let mut tmap = Map::new(&MapConfig {
            width: x1 - x0,
            height: y1 - y0,
            tile_width,
            tile_height,
        });

        let mut srcs: Vec<String> = Vec::new();
        {
            let mut stmt = self.conn.prepare(
                "SELECT x, y, z, src FROM tiles WHERE x>=?1 AND x<?2 AND y>=?3 AND y<?4",
            )?;
            let rows = stmt.query_map(params![x0, x1, y0, y1], |row| {
                Ok((
                    row.get::<_, i32>(0)?,
                    row.get::<_, i32>(1)?,
                    row.get::<_, i32>(2)?,
                    row.get::<_, String>(3)?,
                ))
            })?;

            for row in rows {
                let (x, y, z, src) = row?;
                tmap.set(x - x0, y - y0, z, &src)?;
                if !srcs.contains(&src) {
                    srcs.push(src);
                }
            }
        }

        for (src, props) in query_properties(&self.conn, &srcs)? {
            tmap.set_properties(&src, props);
        }

        Ok(tmap)
    }

    /// Whether writing the object `o` starting at `(x, y, z)` would avoid
    /// overwriting an already set tile.
    ///
    /// This is coarser than [`Map::fits`]: rather than checking only the
    /// object's non-empty cells, one range query reserves the whole box
    /// from `(x, y, z)` spanning the object's width, height and highest
    /// z-level, and map-edge clipping does not apply.
    pub fn fits(&self, x: i32, y: i32, z: i32, o: &Map) -> Result<bool, TileError> {
        // `highest` is a z-layer, eg. 0 means "the first layer"
        let highest = o.z_levels().last().copied().unwrap_or(0);

        let num: i64 = self.conn.query_row(
            "SELECT count(*) FROM tiles \
             WHERE x>=?1 AND x<?2 AND y>=?3 AND y<?4 AND z>=?5 AND z<?6",
            params![x, x + o.width, y, y + o.height, z, z + highest + 1],
            |row| row.get(0),
        )?;

        Ok(num == 0)
    }

    /// Add the given tile object map `o` beginning at `(x, y, zoffset)`.
    ///
    /// All tile upserts run first as one batch; the property merge for every
    /// touched source then runs inside a single transaction (stored bag as
    /// the base, the object's bag winning key conflicts). A failure in the
    /// property step rolls back properties only — tiles may already be
    /// applied. Concurrent `add`s racing on the same source are serialized
    /// only as far as SQLite's isolation goes; one side's merge can be lost.
    pub fn add(&mut self, x: i32, y: i32, zoffset: i32, o: &Map) -> Result<(), TileError> {
        let mut placed: Vec<(i32, i32, i32, String)> = Vec::new();
        let mut incoming: HashMap<String, Properties> = HashMap::new();

        for layer in o.layers() {
            let z: i32 = match layer.name.parse() {
                Ok(z) => z,
                Err(_) => continue,
            };

            for (index, &tid) in layer.cells().iter().enumerate() {
                if tid == 0 {
                    continue; // nil tile
                }
                let tile = match o.tileset().tile_by_id(tid) {
                    Some(t) => t,
                    None => {
                        log::warn!(
                            "layer '{}' cell {} references unknown tile id {}, skipping",
                            layer.name,
                            index,
                            tid
                        );
                        continue;
                    }
                };

                let tx = index as i32 % o.width;
                let ty = index as i32 / o.width;
                let src = tile.image.source.clone();

                placed.push((tx + x, ty + y, z + zoffset, src.clone()));
                incoming
                    .entry(src.clone())
                    .or_insert_with(|| o.properties(&src).cloned().unwrap_or_default());
            }
        }

        // tile batch, outside any transaction
        {
            let mut stmt = self.conn.prepare_cached(SQL_UPSERT_TILE)?;
            for (tx, ty, tz, src) in &placed {
                stmt.execute(params![tile_key(*tx, *ty, *tz), tx, ty, tz, src])?;
            }
        }

        // property read-merge-write, inside one transaction
        let srcs: Vec<String> = incoming.keys().cloned().collect();
        let txn = self.conn.transaction()?;
        {
            let mut existing = query_properties(&txn, &srcs)?;
            let mut stmt = txn.prepare_cached(SQL_UPSERT_PROPS)?;
            for (src, now) in &incoming {
                let mut merged = existing.remove(src).unwrap_or_default();
                merged.merge(now);
                stmt.execute(params![src, serde_json::to_string(&merged)?])?;
            }
        }
        txn.commit()?;
        Ok(())
    }

    /// Properties for a given src.
    ///
    /// Asking for `""` (the nil tile) always returns `None`. Otherwise, if
    /// no properties are set, a fresh empty bag is returned — unlike
    /// [`Map::properties`], which reports unknown sources as `None`.
    pub fn properties(&self, src: &str) -> Result<Option<Properties>, TileError> {
        if src.is_empty() {
            return Ok(None);
        }

        let mut found = query_properties(&self.conn, &[src.to_string()])?;
        Ok(Some(found.remove(src).unwrap_or_default()))
    }

    /// Set properties for the given src. An unconditional overwrite, no
    /// merge.
    pub fn set_properties(&self, src: &str, props: &Properties) -> Result<(), TileError> {
        self.conn.execute(
            SQL_UPSERT_PROPS,
            params![src, serde_json::to_string(props)?],
        )?;
        Ok(())
    }
}

impl Tileable for InfiniteMap {
    fn set(&mut self, x: i32, y: i32, z: i32, src: &str) -> Result<(), TileError> {
        InfiniteMap::set(self, x, y, z, src)
    }

    fn add(&mut self, x: i32, y: i32, zoffset: i32, o: &Map) -> Result<(), TileError> {
        InfiniteMap::add(self, x, y, zoffset, o)
    }

    fn fits(&self, x: i32, y: i32, zoffset: i32, o: &Map) -> Result<bool, TileError> {
        InfiniteMap::fits(self, x, y, zoffset, o)
    }

    fn properties(&self, src: &str) -> Result<Option<Properties>, TileError> {
        InfiniteMap::properties(self, src)
    }

    fn set_properties(&mut self, src: &str, props: &Properties) -> Result<(), TileError> {
        InfiniteMap::set_properties(self, src, props)
    }
}

fn tile_key(x: i32, y: i32, z: i32) -> String {
    format!("{}-{}-{}", x, y, z)
}

/// Load stored property bags for the given sources, keyed by src.
/// Works both inside and outside a transaction.
fn query_properties(
    conn: &Connection,
    srcs: &[String],
) -> Result<HashMap<String, Properties>, TileError> {
    let mut result = HashMap::new();
    if srcs.is_empty() {
        return Ok(result);
    }

    let placeholders = vec!["?"; srcs.len()].join(",");
    let mut stmt = conn.prepare(&format!(
        "SELECT src, data FROM properties WHERE src IN ({})",
        placeholders
    ))?;
    let rows = stmt.query_map(params_from_iter(srcs.iter()), |row| {
        Ok((row.get::<_, String>(0)?, row.get::<_, Option<String>>(1)?))
    })?;

    for row in rows {
        let (src, data) = row?;
        let props = match data {
            Some(blob) => serde_json::from_str(&blob)?,
            None => Properties::new(),
        };
        result.insert(src, props);
    }

    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tree() -> Map {
        let mut o = Map::new(&MapConfig {
            width: 2,
            height: 4,
            tile_width: 32,
            tile_height: 32,
        });
        for z in 0..4 {
            o.set(0, z, z, "trunk.png").unwrap();
        }
        o
    }

    #[test]
    fn test_set_and_at() {
        let inf = InfiniteMap::open_in_memory().unwrap();
        assert_eq!(inf.at(5, 5, 0).unwrap(), "");

        inf.set(5, 5, 0, "grass.png").unwrap();
        assert_eq!(inf.at(5, 5, 0).unwrap(), "grass.png");

        // upsert replaces the src on conflict
        inf.set(5, 5, 0, "dirt.png").unwrap();
        assert_eq!(inf.at(5, 5, 0).unwrap(), "dirt.png");

        // negative coordinates are perfectly fine out here
        inf.set(-3, -7, 2, "void.png").unwrap();
        assert_eq!(inf.at(-3, -7, 2).unwrap(), "void.png");
    }

    #[test]
    fn test_fits_bounding_box() {
        let inf = InfiniteMap::open_in_memory().unwrap();
        let o = tree();

        assert!(inf.fits(0, 0, 0, &o).unwrap());

        // any tile inside the box [x,x+w) x [y,y+h) x [z,z+highest+1)
        // blocks the placement, even where the object has no cell
        inf.set(1, 3, 3, "rock.png").unwrap();
        assert!(!inf.fits(0, 0, 0, &o).unwrap());

        // outside the box is invisible
        assert!(inf.fits(2, 0, 0, &o).unwrap());
        // above the object's highest z-level too
        let inf2 = InfiniteMap::open_in_memory().unwrap();
        inf2.set(0, 0, 4, "rock.png").unwrap();
        assert!(inf2.fits(0, 0, 0, &o).unwrap());
    }

    #[test]
    fn test_add_then_no_longer_fits() {
        let mut inf = InfiniteMap::open_in_memory().unwrap();
        let o = tree();

        assert!(inf.fits(3, 3, 0, &o).unwrap());
        inf.add(3, 3, 0, &o).unwrap();
        assert!(!inf.fits(3, 3, 0, &o).unwrap());

        assert_eq!(inf.at(3, 3, 0).unwrap(), "trunk.png");
        assert_eq!(inf.at(3, 6, 3).unwrap(), "trunk.png");
        assert_eq!(inf.at(4, 3, 0).unwrap(), "");
    }

    #[test]
    fn test_add_merges_properties_incoming_wins() {
        let mut inf = InfiniteMap::open_in_memory().unwrap();
        let mut stored = Properties::new();
        stored.set_string("owner", "store");
        stored.set_int("kept", 1);
        inf.set_properties("trunk.png", &stored).unwrap();

        let mut o = tree();
        let mut obj = Properties::new();
        obj.set_string("owner", "object");
        obj.set_bool("solid", true);
        o.set_properties("trunk.png", obj);

        inf.add(0, 0, 0, &o).unwrap();

        let merged = inf.properties("trunk.png").unwrap().unwrap();
        assert_eq!(merged.get_string("owner"), Some("object"));
        assert_eq!(merged.get_int("kept"), Some(1));
        assert_eq!(merged.get_bool("solid"), Some(true));
    }

    #[test]
    fn test_properties_miss_behavior() {
        let inf = InfiniteMap::open_in_memory().unwrap();
        // the nil tile reports absent
        assert!(inf.properties("").unwrap().is_none());
        // an unset source reports a fresh empty bag, never absent
        let bag = inf.properties("never-seen.png").unwrap().unwrap();
        assert!(bag.is_empty());
    }

    #[test]
    fn test_set_properties_overwrites() {
        let inf = InfiniteMap::open_in_memory().unwrap();
        let mut p1 = Properties::new();
        p1.set_int("a", 1);
        p1.set_int("b", 2);
        inf.set_properties("rock.png", &p1).unwrap();

        let mut p2 = Properties::new();
        p2.set_int("b", 9);
        inf.set_properties("rock.png", &p2).unwrap();

        // no merge: "a" is gone
        assert_eq!(inf.properties("rock.png").unwrap().unwrap(), p2);
    }

    #[test]
    fn test_materialize_matches_in_memory_writes() {
        let inf = InfiniteMap::open_in_memory().unwrap();
        let mut expect = Map::new(&MapConfig {
            width: 10,
            height: 10,
            tile_width: 32,
            tile_height: 32,
        });

        for x in 0..10 {
            for y in 0..10 {
                inf.set(x, y, 0, "grass.png").unwrap();
                expect.set(x, y, 0, "grass.png").unwrap();
            }
        }
        inf.set(1, 2, 1, "mushroom.png").unwrap();
        expect.set(1, 2, 1, "mushroom.png").unwrap();

        let mut shiny = Properties::new();
        shiny.set_bool("glows", true);
        inf.set_properties("mushroom.png", &shiny).unwrap();
        expect.set_properties("mushroom.png", shiny);

        let got = inf.map(32, 32, 0, 0, 10, 10).unwrap();
        assert_eq!(got.width, 10);
        assert_eq!(got.height, 10);
        for z in [0, 1] {
            for x in 0..10 {
                for y in 0..10 {
                    assert_eq!(got.at(x, y, z), expect.at(x, y, z), "cell ({x},{y},{z})");
                }
            }
        }
    }

    #[test]
    fn test_materialize_translates_to_local_coordinates() {
        let inf = InfiniteMap::open_in_memory().unwrap();
        inf.set(100, 200, 0, "grass.png").unwrap();
        inf.set(104, 203, 2, "rock.png").unwrap();
        // outside the region, must not show up
        inf.set(99, 200, 0, "grass.png").unwrap();

        let got = inf.map(32, 32, 100, 200, 105, 204).unwrap();
        assert_eq!(got.width, 5);
        assert_eq!(got.height, 4);
        assert!(got.at(0, 0, 0).is_some());
        assert!(got.at(4, 3, 2).is_some());
        assert!(got.at(1, 0, 0).is_none());
    }

    #[test]
    fn test_materialize_invalid_region() {
        let inf = InfiniteMap::open_in_memory().unwrap();
        assert!(matches!(
            inf.map(32, 32, 5, 0, 5, 10),
            Err(TileError::InvalidRegion { .. })
        ));
        assert!(matches!(
            inf.map(32, 32, 0, 9, 10, 3),
            Err(TileError::InvalidRegion { .. })
        ));
    }

    #[test]
    fn test_open_reopen_persists() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("world.sqlite");

        {
            let inf = InfiniteMap::open(&path).unwrap();
            inf.set(7, 8, 0, "grass.png").unwrap();
            let mut p = Properties::new();
            p.set_int("cost", 3);
            inf.set_properties("grass.png", &p).unwrap();
            assert_eq!(inf.filename(), path.as_path());
        }

        let inf = InfiniteMap::open(&path).unwrap();
        assert_eq!(inf.at(7, 8, 0).unwrap(), "grass.png");
        assert_eq!(
            inf.properties("grass.png").unwrap().unwrap().get_int("cost"),
            Some(3)
        );
    }

    #[test]
    fn test_create_allocates_temp_store() {
        let inf = InfiniteMap::create().unwrap();
        assert!(inf.filename().starts_with(std::env::temp_dir()));
        inf.set(0, 0, 0, "grass.png").unwrap();
        assert_eq!(inf.at(0, 0, 0).unwrap(), "grass.png");
        std::fs::remove_file(inf.filename()).ok();
    }
}
