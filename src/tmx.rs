//! TMX XML encode/decode for the supported subset of the format.
//!
//! We only need a small part of TMX:
//! - one tileset per map (decode rejects anything else)
//! - csv tile data without compression
//! - the orthogonal orientation
//! - string/int/bool properties
//!
//! In memory every layer cell holds a local tile id; on disk it holds the
//! local id plus the tileset's `firstgid` (0 stays 0 either way).

use std::collections::HashMap;
use std::fs::File;
use std::io::{Read, Write};
use std::path::Path;

use quick_xml::events::{BytesEnd, BytesStart, BytesText, Event};
use quick_xml::{Reader, Writer};

use crate::codec::{decode_grid, encode_grid};
use crate::error::TileError;
use crate::map::{Image, ImageLayer, Map, Tile, TileLayer, Tileset};
use crate::properties::{Properties, Property};

impl Map {
    /// Encode the current map as TMX XML to a writer.
    ///
    /// Layers are sorted ascending by their numeric name and assigned
    /// sequential display ids (image layers first) so renderers draw them
    /// in the intended order; this reordering is visible on the map
    /// afterwards.
    pub fn encode<W: Write>(&mut self, w: W) -> Result<(), TileError> {
        // tiled renders layers in order of id, low -> high
        self.image_layers
            .sort_by_key(|l| l.name.parse::<i64>().unwrap_or(0));
        self.layers
            .sort_by_key(|l| l.name.parse::<i64>().unwrap_or(0));
        for (i, l) in self.image_layers.iter_mut().enumerate() {
            l.id = i as u32 + 1;
        }
        let offset = self.image_layers.len() as u32;
        for (i, l) in self.layers.iter_mut().enumerate() {
            l.id = i as u32 + offset + 1;
        }

        let mut writer = Writer::new(w);

        let mut map_el = BytesStart::new("map");
        map_el.push_attribute(("orientation", self.orientation.as_str()));
        map_el.push_attribute(("width", self.width.to_string().as_str()));
        map_el.push_attribute(("height", self.height.to_string().as_str()));
        map_el.push_attribute(("tilewidth", self.tile_width.to_string().as_str()));
        map_el.push_attribute(("tileheight", self.tile_height.to_string().as_str()));
        writer.write_event(Event::Start(map_el))?;

        write_properties(&mut writer, &self.root_properties.to_list())?;
        write_tileset(&mut writer, &self.tileset)?;

        for layer in &self.image_layers {
            let mut el = BytesStart::new("imagelayer");
            el.push_attribute(("id", layer.id.to_string().as_str()));
            el.push_attribute(("name", layer.name.as_str()));
            writer.write_event(Event::Start(el))?;
            write_image(&mut writer, &layer.image)?;
            writer.write_event(Event::End(BytesEnd::new("imagelayer")))?;
        }

        let first_gid = self.tileset.first_gid;
        for layer in &self.layers {
            let mut el = BytesStart::new("layer");
            el.push_attribute(("id", layer.id.to_string().as_str()));
            el.push_attribute(("name", layer.name.as_str()));
            el.push_attribute(("width", layer.width.to_string().as_str()));
            el.push_attribute(("height", layer.height.to_string().as_str()));
            writer.write_event(Event::Start(el))?;

            // shift local ids up to GIDs, nil tiles stay 0
            let gids: Vec<u32> = layer
                .cells()
                .iter()
                .map(|&id| if id == 0 { 0 } else { id + first_gid })
                .collect();

            let mut data_el = BytesStart::new("data");
            data_el.push_attribute(("encoding", "csv"));
            writer.write_event(Event::Start(data_el))?;
            writer.write_event(Event::Text(BytesText::new(&encode_grid(
                layer.width,
                layer.height,
                &gids,
            ))))?;
            writer.write_event(Event::End(BytesEnd::new("data")))?;

            writer.write_event(Event::End(BytesEnd::new("layer")))?;
        }

        writer.write_event(Event::End(BytesEnd::new("map")))?;
        Ok(())
    }

    /// Decode a TMX map from a reader.
    ///
    /// Fails with [`TileError::UnsupportedTileset`] unless the document
    /// holds exactly one tileset.
    pub fn decode<R: Read>(mut r: R) -> Result<Map, TileError> {
        let mut xml = String::new();
        r.read_to_string(&mut xml)?;
        decode_str(&xml)
    }

    /// Decode a TMX map from a file.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Map, TileError> {
        Map::decode(File::open(path)?)
    }

    /// Encode the map and write it to a file.
    pub fn write_file<P: AsRef<Path>>(&mut self, path: P) -> Result<(), TileError> {
        let mut buf = Vec::new();
        self.encode(&mut buf)?;
        std::fs::write(path, buf)?;
        Ok(())
    }
}

fn write_properties<W: Write>(
    writer: &mut Writer<W>,
    list: &[Property],
) -> Result<(), TileError> {
    if list.is_empty() {
        return Ok(());
    }
    writer.write_event(Event::Start(BytesStart::new("properties")))?;
    for p in list {
        let mut el = BytesStart::new("property");
        el.push_attribute(("name", p.name.as_str()));
        el.push_attribute(("value", p.value.as_str()));
        if !p.kind.is_empty() {
            el.push_attribute(("type", p.kind.as_str()));
        }
        writer.write_event(Event::Empty(el))?;
    }
    writer.write_event(Event::End(BytesEnd::new("properties")))?;
    Ok(())
}

fn write_image<W: Write>(writer: &mut Writer<W>, image: &Image) -> Result<(), TileError> {
    let mut el = BytesStart::new("image");
    el.push_attribute(("source", image.source.as_str()));
    el.push_attribute(("width", image.width.to_string().as_str()));
    el.push_attribute(("height", image.height.to_string().as_str()));
    writer.write_event(Event::Empty(el))?;
    Ok(())
}

fn write_tileset<W: Write>(writer: &mut Writer<W>, ts: &Tileset) -> Result<(), TileError> {
    let mut el = BytesStart::new("tileset");
    el.push_attribute(("firstgid", ts.first_gid.to_string().as_str()));
    el.push_attribute(("name", ts.name.as_str()));
    el.push_attribute(("tilewidth", ts.tile_width.to_string().as_str()));
    el.push_attribute(("tileheight", ts.tile_height.to_string().as_str()));
    writer.write_event(Event::Start(el))?;

    for tile in ts.tiles() {
        let mut tile_el = BytesStart::new("tile");
        tile_el.push_attribute(("id", tile.id.to_string().as_str()));
        writer.write_event(Event::Start(tile_el))?;
        write_image(writer, &tile.image)?;
        write_properties(writer, &tile.properties.to_list())?;
        writer.write_event(Event::End(BytesEnd::new("tile")))?;
    }

    writer.write_event(Event::End(BytesEnd::new("tileset")))?;
    Ok(())
}

fn decode_str(xml: &str) -> Result<Map, TileError> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    loop {
        match reader.read_event() {
            Ok(Event::Start(ref e)) if e.name().as_ref() == b"map" => {
                let attrs = parse_attributes(e)?;
                return parse_map(&mut reader, &attrs);
            }
            Ok(Event::Eof) => return Err(TileError::Xml("no <map> element found".to_string())),
            Err(e) => return Err(TileError::Xml(e.to_string())),
            _ => {} // skip comments, declarations, etc.
        }
    }
}

fn parse_map(reader: &mut Reader<&[u8]>, attrs: &HashMap<String, String>) -> Result<Map, TileError> {
    let orientation = attrs
        .get("orientation")
        .cloned()
        .unwrap_or_else(|| "orthogonal".to_string());
    if orientation != "orthogonal" {
        return Err(TileError::Xml(format!(
            "unsupported orientation '{}'",
            orientation
        )));
    }

    let mut tilesets: Vec<Tileset> = Vec::new();
    let mut layers: Vec<TileLayer> = Vec::new();
    let mut image_layers: Vec<ImageLayer> = Vec::new();
    let mut root_properties = Properties::new();

    loop {
        match reader.read_event() {
            Ok(Event::Start(ref e)) => match e.name().as_ref() {
                b"properties" => {
                    root_properties = Properties::from_list(&parse_properties(reader)?);
                }
                b"tileset" => {
                    let attrs = parse_attributes(e)?;
                    tilesets.push(parse_tileset(reader, &attrs)?);
                }
                b"imagelayer" => {
                    let attrs = parse_attributes(e)?;
                    image_layers.push(parse_imagelayer(reader, &attrs)?);
                }
                b"layer" => {
                    let attrs = parse_attributes(e)?;
                    layers.push(parse_layer(reader, &attrs)?);
                }
                _ => {
                    reader
                        .read_to_end(e.name())
                        .map_err(|e| TileError::Xml(e.to_string()))?;
                }
            },
            Ok(Event::Empty(ref e)) => match e.name().as_ref() {
                b"tileset" => {
                    let attrs = parse_attributes(e)?;
                    tilesets.push(tileset_from_attrs(&attrs));
                }
                b"imagelayer" => {
                    let attrs = parse_attributes(e)?;
                    image_layers.push(imagelayer_from_attrs(&attrs));
                }
                _ => {}
            },
            Ok(Event::End(ref e)) if e.name().as_ref() == b"map" => break,
            Ok(Event::Eof) => {
                return Err(TileError::Xml("unexpected EOF inside <map>".to_string()));
            }
            Err(e) => return Err(TileError::Xml(e.to_string())),
            _ => {}
        }
    }

    if tilesets.len() != 1 {
        return Err(TileError::UnsupportedTileset(tilesets.len()));
    }
    let mut tileset = tilesets.remove(0);
    tileset.reindex();

    // on-disk GIDs carry the firstgid offset; in memory we use local ids
    let first_gid = tileset.first_gid;
    for layer in &mut layers {
        for cell in &mut layer.cells {
            if *cell != 0 {
                *cell = cell.saturating_sub(first_gid);
            }
        }
    }

    let next_id = tileset.tiles().iter().map(|t| t.id).max().unwrap_or(0) + 1;

    let mut map = Map::new(&crate::MapConfig {
        width: attr_i32(attrs, "width"),
        height: attr_i32(attrs, "height"),
        tile_width: attr_i32(attrs, "tilewidth"),
        tile_height: attr_i32(attrs, "tileheight"),
    });
    map.orientation = orientation;
    map.root_properties = root_properties;
    map.tileset = tileset;
    map.layers = layers;
    map.image_layers = image_layers;
    map.next_id = next_id;
    Ok(map)
}

fn tileset_from_attrs(attrs: &HashMap<String, String>) -> Tileset {
    let mut ts = Tileset::new(
        attrs.get("name").map(String::as_str).unwrap_or("default"),
        attr_u32(attrs, "firstgid").max(1),
    );
    ts.tile_width = attr_i32(attrs, "tilewidth");
    ts.tile_height = attr_i32(attrs, "tileheight");
    ts
}

fn parse_tileset(
    reader: &mut Reader<&[u8]>,
    attrs: &HashMap<String, String>,
) -> Result<Tileset, TileError> {
    let mut ts = tileset_from_attrs(attrs);

    loop {
        match reader.read_event() {
            Ok(Event::Start(ref e)) => match e.name().as_ref() {
                b"tile" => {
                    let tile_attrs = parse_attributes(e)?;
                    ts.tiles.push(parse_tile(reader, &tile_attrs)?);
                }
                _ => {
                    reader
                        .read_to_end(e.name())
                        .map_err(|e| TileError::Xml(e.to_string()))?;
                }
            },
            Ok(Event::End(ref e)) if e.name().as_ref() == b"tileset" => break,
            Ok(Event::Eof) => {
                return Err(TileError::Xml("unexpected EOF inside <tileset>".to_string()));
            }
            Err(e) => return Err(TileError::Xml(e.to_string())),
            _ => {}
        }
    }

    Ok(ts)
}

fn parse_tile(
    reader: &mut Reader<&[u8]>,
    attrs: &HashMap<String, String>,
) -> Result<Tile, TileError> {
    let mut tile = Tile {
        id: attr_u32(attrs, "id"),
        image: Image::default(),
        properties: Properties::new(),
    };

    loop {
        match reader.read_event() {
            Ok(Event::Empty(ref e)) if e.name().as_ref() == b"image" => {
                tile.image = image_from_attrs(&parse_attributes(e)?);
            }
            Ok(Event::Start(ref e)) => match e.name().as_ref() {
                b"image" => {
                    tile.image = image_from_attrs(&parse_attributes(e)?);
                    reader
                        .read_to_end(e.name())
                        .map_err(|e| TileError::Xml(e.to_string()))?;
                }
                b"properties" => {
                    tile.properties = Properties::from_list(&parse_properties(reader)?);
                }
                _ => {
                    reader
                        .read_to_end(e.name())
                        .map_err(|e| TileError::Xml(e.to_string()))?;
                }
            },
            Ok(Event::End(ref e)) if e.name().as_ref() == b"tile" => break,
            Ok(Event::Eof) => {
                return Err(TileError::Xml("unexpected EOF inside <tile>".to_string()));
            }
            Err(e) => return Err(TileError::Xml(e.to_string())),
            _ => {}
        }
    }

    Ok(tile)
}

fn parse_properties(reader: &mut Reader<&[u8]>) -> Result<Vec<Property>, TileError> {
    let mut list = Vec::new();

    loop {
        match reader.read_event() {
            Ok(Event::Empty(ref e)) if e.name().as_ref() == b"property" => {
                list.push(property_from_attrs(&parse_attributes(e)?));
            }
            Ok(Event::Start(ref e)) if e.name().as_ref() == b"property" => {
                list.push(property_from_attrs(&parse_attributes(e)?));
                reader
                    .read_to_end(e.name())
                    .map_err(|e| TileError::Xml(e.to_string()))?;
            }
            Ok(Event::End(ref e)) if e.name().as_ref() == b"properties" => break,
            Ok(Event::Eof) => {
                return Err(TileError::Xml(
                    "unexpected EOF inside <properties>".to_string(),
                ));
            }
            Err(e) => return Err(TileError::Xml(e.to_string())),
            _ => {}
        }
    }

    Ok(list)
}

fn parse_imagelayer(
    reader: &mut Reader<&[u8]>,
    attrs: &HashMap<String, String>,
) -> Result<ImageLayer, TileError> {
    let mut layer = imagelayer_from_attrs(attrs);

    loop {
        match reader.read_event() {
            Ok(Event::Empty(ref e)) if e.name().as_ref() == b"image" => {
                layer.image = image_from_attrs(&parse_attributes(e)?);
            }
            Ok(Event::End(ref e)) if e.name().as_ref() == b"imagelayer" => break,
            Ok(Event::Eof) => {
                return Err(TileError::Xml(
                    "unexpected EOF inside <imagelayer>".to_string(),
                ));
            }
            Err(e) => return Err(TileError::Xml(e.to_string())),
            _ => {}
        }
    }

    Ok(layer)
}

fn parse_layer(
    reader: &mut Reader<&[u8]>,
    attrs: &HashMap<String, String>,
) -> Result<TileLayer, TileError> {
    let mut cells = Vec::new();

    loop {
        match reader.read_event() {
            Ok(Event::Start(ref e)) if e.name().as_ref() == b"data" => {
                let data_attrs = parse_attributes(e)?;
                if let Some(enc) = data_attrs.get("encoding") {
                    if enc != "csv" {
                        return Err(TileError::Xml(format!(
                            "unsupported tile data encoding '{}'",
                            enc
                        )));
                    }
                }
                cells = decode_grid(&read_text_until_end(reader, b"data")?)?;
            }
            Ok(Event::End(ref e)) if e.name().as_ref() == b"layer" => break,
            Ok(Event::Eof) => {
                return Err(TileError::Xml("unexpected EOF inside <layer>".to_string()));
            }
            Err(e) => return Err(TileError::Xml(e.to_string())),
            _ => {}
        }
    }

    Ok(TileLayer {
        id: attr_u32(attrs, "id"),
        name: attrs.get("name").cloned().unwrap_or_default(),
        width: attr_i32(attrs, "width"),
        height: attr_i32(attrs, "height"),
        cells,
    })
}

/// Collect text content until the closing tag named `end`.
fn read_text_until_end(reader: &mut Reader<&[u8]>, end: &[u8]) -> Result<String, TileError> {
    let mut text = String::new();
    loop {
        match reader.read_event() {
            Ok(Event::Text(ref e)) => {
                text.push_str(&e.unescape().map_err(|e| TileError::Xml(e.to_string()))?);
            }
            Ok(Event::End(ref e)) if e.name().as_ref() == end => return Ok(text),
            Ok(Event::Eof) => return Err(TileError::Xml("unexpected EOF in text".to_string())),
            Err(e) => return Err(TileError::Xml(e.to_string())),
            _ => {}
        }
    }
}

fn image_from_attrs(attrs: &HashMap<String, String>) -> Image {
    Image {
        source: attrs.get("source").cloned().unwrap_or_default(),
        width: attr_i32(attrs, "width"),
        height: attr_i32(attrs, "height"),
    }
}

fn imagelayer_from_attrs(attrs: &HashMap<String, String>) -> ImageLayer {
    ImageLayer {
        id: attr_u32(attrs, "id"),
        name: attrs.get("name").cloned().unwrap_or_default(),
        image: Image::default(),
    }
}

fn property_from_attrs(attrs: &HashMap<String, String>) -> Property {
    Property {
        name: attrs.get("name").cloned().unwrap_or_default(),
        value: attrs.get("value").cloned().unwrap_or_default(),
        kind: attrs.get("type").cloned().unwrap_or_default(),
    }
}

fn attr_i32(attrs: &HashMap<String, String>, key: &str) -> i32 {
    attrs.get(key).and_then(|v| v.parse().ok()).unwrap_or(0)
}

fn attr_u32(attrs: &HashMap<String, String>, key: &str) -> u32 {
    attrs.get(key).and_then(|v| v.parse().ok()).unwrap_or(0)
}

fn parse_attributes(elem: &BytesStart) -> Result<HashMap<String, String>, TileError> {
    let mut attrs = HashMap::new();
    for attr_result in elem.attributes() {
        let attr = attr_result.map_err(|e| TileError::Xml(format!("attribute error: {}", e)))?;
        let key = std::str::from_utf8(attr.key.as_ref())
            .map_err(|e| TileError::Xml(format!("invalid UTF-8 in attribute key: {}", e)))?
            .to_string();
        let value = attr
            .unescape_value()
            .map_err(|e| TileError::Xml(format!("attribute error: {}", e)))?
            .into_owned();
        attrs.insert(key, value);
    }
    Ok(attrs)
}
