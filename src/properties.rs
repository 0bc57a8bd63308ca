//! Typed key/value properties attached to tiles and maps.
//!
//! TMX property lists are flat `name`/`value`/`type` triples; `Properties`
//! wraps them in three typed maps so callers never juggle stringly-typed
//! values. A key lives under exactly one type at a time.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

// Property types, see doc.mapeditor.org/en/stable/reference/tmx-map-format/#properties
pub const PROP_STRING: &str = "string";
pub const PROP_INT: &str = "int";
pub const PROP_BOOL: &str = "bool";

/// A raw TMX property triple as it appears in the XML.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Property {
    pub name: String,
    pub value: String,
    /// One of `string` (default), `int` or `bool`. Other TMX types (float,
    /// color, file, ...) are not used and decode as strings.
    pub kind: String,
}

/// Typed property bag: three disjoint maps keyed by property name.
///
/// Setting a key under one type evicts it from the other two, so each key
/// has exactly one type. The serde derive doubles as the JSON blob format
/// persisted per source by [`crate::InfiniteMap`].
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Properties {
    #[serde(default)]
    strings: HashMap<String, String>,
    #[serde(default)]
    ints: HashMap<String, i64>,
    #[serde(default)]
    bools: HashMap<String, bool>,
}

impl Properties {
    /// Returns an empty properties bag.
    pub fn new() -> Self {
        Self::default()
    }

    /// Merge properties `o` into this bag and return it for chaining.
    ///
    /// Every key of `o` wins on collision, regardless of the type it holds
    /// on either side.
    pub fn merge(&mut self, o: &Properties) -> &mut Self {
        for (k, v) in &o.strings {
            self.set_string(k, v);
        }
        for (k, v) in &o.ints {
            self.set_int(k, *v);
        }
        for (k, v) in &o.bools {
            self.set_bool(k, *v);
        }
        self
    }

    pub fn get_string(&self, key: &str) -> Option<&str> {
        self.strings.get(key).map(String::as_str)
    }

    pub fn set_string(&mut self, key: &str, value: &str) {
        self.strings.insert(key.to_string(), value.to_string());
        self.ints.remove(key);
        self.bools.remove(key);
    }

    pub fn get_int(&self, key: &str) -> Option<i64> {
        self.ints.get(key).copied()
    }

    pub fn set_int(&mut self, key: &str, value: i64) {
        self.ints.insert(key.to_string(), value);
        self.strings.remove(key);
        self.bools.remove(key);
    }

    pub fn get_bool(&self, key: &str) -> Option<bool> {
        self.bools.get(key).copied()
    }

    pub fn set_bool(&mut self, key: &str, value: bool) {
        self.bools.insert(key.to_string(), value);
        self.strings.remove(key);
        self.ints.remove(key);
    }

    /// Number of keys across all three types.
    pub fn len(&self) -> usize {
        self.strings.len() + self.ints.len() + self.bools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Flatten into the raw triples understood by the XML encoder,
    /// sorted by name for deterministic output.
    pub(crate) fn to_list(&self) -> Vec<Property> {
        let mut out = Vec::with_capacity(self.len());
        for (k, v) in &self.ints {
            out.push(Property {
                name: k.clone(),
                value: v.to_string(),
                kind: PROP_INT.to_string(),
            });
        }
        for (k, v) in &self.bools {
            out.push(Property {
                name: k.clone(),
                value: v.to_string(),
                kind: PROP_BOOL.to_string(),
            });
        }
        for (k, v) in &self.strings {
            out.push(Property {
                name: k.clone(),
                value: v.clone(),
                kind: PROP_STRING.to_string(),
            });
        }
        out.sort_by(|a, b| a.name.cmp(&b.name));
        out
    }

    /// Build a bag from raw XML triples. Unparsable int values decode as 0.
    pub(crate) fn from_list(list: &[Property]) -> Self {
        let mut props = Properties::new();
        for p in list {
            match p.kind.as_str() {
                PROP_INT => props.set_int(&p.name, p.value.parse().unwrap_or(0)),
                PROP_BOOL => props.set_bool(&p.name, p.value == "true"),
                // we don't use float, image etc
                _ => props.set_string(&p.name, &p.value),
            }
        }
        props
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_evicts_other_types() {
        let mut p = Properties::new();
        p.set_string("k", "hello");
        p.set_int("k", 7);
        assert_eq!(p.get_string("k"), None);
        assert_eq!(p.get_int("k"), Some(7));

        p.set_bool("k", true);
        assert_eq!(p.get_int("k"), None);
        assert_eq!(p.get_bool("k"), Some(true));
        assert_eq!(p.len(), 1);
    }

    #[test]
    fn test_merge_last_writer_wins_across_types() {
        let mut a = Properties::new();
        a.set_string("shared", "from-a");
        a.set_int("only-a", 1);

        let mut b = Properties::new();
        b.set_bool("shared", true);
        b.set_string("only-b", "x");

        a.merge(&b);

        // b wins the shared key, under b's type
        assert_eq!(a.get_string("shared"), None);
        assert_eq!(a.get_bool("shared"), Some(true));
        // keys unique to either side survive
        assert_eq!(a.get_int("only-a"), Some(1));
        assert_eq!(a.get_string("only-b"), Some("x"));
    }

    #[test]
    fn test_merge_chains() {
        let mut a = Properties::new();
        let mut b = Properties::new();
        b.set_int("n", 3);
        let mut c = Properties::new();
        c.set_int("n", 4);

        a.merge(&b).merge(&c);
        assert_eq!(a.get_int("n"), Some(4));
    }

    #[test]
    fn test_list_round_trip() {
        let mut p = Properties::new();
        p.set_string("name", "tree");
        p.set_int("height", 3);
        p.set_bool("blocking", false);

        let back = Properties::from_list(&p.to_list());
        assert_eq!(back, p);
    }

    #[test]
    fn test_from_list_defaults() {
        let list = vec![
            Property {
                name: "bad-int".into(),
                value: "abc".into(),
                kind: PROP_INT.into(),
            },
            Property {
                name: "untyped".into(),
                value: "v".into(),
                kind: String::new(),
            },
        ];
        let p = Properties::from_list(&list);
        assert_eq!(p.get_int("bad-int"), Some(0));
        assert_eq!(p.get_string("untyped"), Some("v"));
    }

    #[test]
    fn test_json_blob_round_trip() {
        let mut p = Properties::new();
        p.set_int("n", -2);
        p.set_bool("b", true);
        p.set_string("s", "str");

        let blob = serde_json::to_string(&p).unwrap();
        let back: Properties = serde_json::from_str(&blob).unwrap();
        assert_eq!(back, p);
    }
}
