//! The [`Dom`] document value.
//!
//! A `Dom` is a JSON-shaped tree. Objects are stored in a [`BTreeMap`] so
//! that every document has a single canonical form: two DOMs that describe
//! the same data compare equal and diff to an empty patch regardless of the
//! order fields were written in.
//!
//! Integers are canonicalized on construction: any value that fits in `i64`
//! is stored as [`Dom::Int`]; only values above `i64::MAX` use [`Dom::UInt`].
//!
//! Use [`to_dom`] and [`from_dom`] to convert between arbitrary serde types
//! and `Dom`.

use std::collections::BTreeMap;
use std::fmt;

use serde::de::{self, MapAccess, SeqAccess, Visitor};
use serde::ser::{SerializeMap, SerializeSeq};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::DomError;
use crate::path::DomPath;

/// Key-sorted object storage used by [`Dom::Object`].
pub type DomObject = BTreeMap<String, Dom>;

/// A JSON-like document value.
#[derive(Clone, Debug, PartialEq, Default)]
pub enum Dom {
    #[default]
    Null,
    Bool(bool),
    Int(i64),
    UInt(u64),
    Float(f64),
    String(String),
    Array(Vec<Dom>),
    Object(DomObject),
}

impl Dom {
    /// Creates an empty object.
    pub fn object() -> Self {
        Dom::Object(DomObject::new())
    }

    /// Short type name used in diagnostics.
    pub fn kind(&self) -> &'static str {
        match self {
            Dom::Null => "null",
            Dom::Bool(_) => "bool",
            Dom::Int(_) | Dom::UInt(_) => "integer",
            Dom::Float(_) => "float",
            Dom::String(_) => "string",
            Dom::Array(_) => "array",
            Dom::Object(_) => "object",
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Dom::Null)
    }

    pub fn is_object(&self) -> bool {
        matches!(self, Dom::Object(_))
    }

    pub fn is_array(&self) -> bool {
        matches!(self, Dom::Array(_))
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Dom::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Dom::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Dom::Int(v) => Some(*v),
            Dom::UInt(v) => i64::try_from(*v).ok(),
            _ => None,
        }
    }

    pub fn as_u64(&self) -> Option<u64> {
        match self {
            Dom::Int(v) => u64::try_from(*v).ok(),
            Dom::UInt(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Dom::Float(v) => Some(*v),
            Dom::Int(v) => Some(*v as f64),
            Dom::UInt(v) => Some(*v as f64),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&Vec<Dom>> {
        match self {
            Dom::Array(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_array_mut(&mut self) -> Option<&mut Vec<Dom>> {
        match self {
            Dom::Array(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_object(&self) -> Option<&DomObject> {
        match self {
            Dom::Object(map) => Some(map),
            _ => None,
        }
    }

    pub fn as_object_mut(&mut self) -> Option<&mut DomObject> {
        match self {
            Dom::Object(map) => Some(map),
            _ => None,
        }
    }

    /// Looks up an object member by key.
    pub fn get(&self, key: &str) -> Option<&Dom> {
        self.as_object().and_then(|map| map.get(key))
    }

    /// Looks up an object member by key for mutation.
    pub fn get_mut(&mut self, key: &str) -> Option<&mut Dom> {
        self.as_object_mut().and_then(|map| map.get_mut(key))
    }

    /// Inserts an object member, turning `self` into an object first if it
    /// is not one already. Returns the previous value, if any.
    pub fn insert(&mut self, key: impl Into<String>, value: Dom) -> Option<Dom> {
        if !self.is_object() {
            *self = Dom::object();
        }
        match self {
            Dom::Object(map) => map.insert(key.into(), value),
            _ => None,
        }
    }

    /// Removes an object member by key.
    pub fn remove(&mut self, key: &str) -> Option<Dom> {
        self.as_object_mut().and_then(|map| map.remove(key))
    }

    /// Resolves a JSON Pointer against this value.
    pub fn pointer(&self, path: &DomPath) -> Option<&Dom> {
        let mut current = self;
        for token in path.tokens() {
            current = match current {
                Dom::Object(map) => map.get(token.as_str())?,
                Dom::Array(items) => items.get(parse_array_index(token)?)?,
                _ => return None,
            };
        }
        Some(current)
    }

    /// Resolves a JSON Pointer against this value for mutation.
    pub fn pointer_mut(&mut self, path: &DomPath) -> Option<&mut Dom> {
        let mut current = self;
        for token in path.tokens() {
            current = match current {
                Dom::Object(map) => map.get_mut(token.as_str())?,
                Dom::Array(items) => items.get_mut(parse_array_index(token)?)?,
                _ => return None,
            };
        }
        Some(current)
    }

    /// Counts every node in the tree, including `self`.
    pub fn node_count(&self) -> usize {
        1 + match self {
            Dom::Array(items) => items.iter().map(Dom::node_count).sum(),
            Dom::Object(map) => map.values().map(Dom::node_count).sum(),
            _ => 0,
        }
    }
}

/// Parses a pointer token as an array index.
///
/// Leading zeros are rejected as in RFC 6901 (`"0"` is the only index that
/// may start with `0`).
pub(crate) fn parse_array_index(token: &str) -> Option<usize> {
    if token.is_empty() || (token.len() > 1 && token.starts_with('0')) {
        return None;
    }
    if !token.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    token.parse().ok()
}

impl fmt::Display for Dom {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let json = serde_json::Value::from(self.clone());
        if f.alternate() {
            match serde_json::to_string_pretty(&json) {
                Ok(s) => f.write_str(&s),
                Err(_) => Err(fmt::Error),
            }
        } else {
            write!(f, "{json}")
        }
    }
}

// ---------------------------------------------------------------------------
// Constructors
// ---------------------------------------------------------------------------

impl From<bool> for Dom {
    fn from(v: bool) -> Self {
        Dom::Bool(v)
    }
}

impl From<i64> for Dom {
    fn from(v: i64) -> Self {
        Dom::Int(v)
    }
}

impl From<i32> for Dom {
    fn from(v: i32) -> Self {
        Dom::Int(v as i64)
    }
}

impl From<u32> for Dom {
    fn from(v: u32) -> Self {
        Dom::Int(v as i64)
    }
}

impl From<u64> for Dom {
    fn from(v: u64) -> Self {
        match i64::try_from(v) {
            Ok(i) => Dom::Int(i),
            Err(_) => Dom::UInt(v),
        }
    }
}

impl From<f64> for Dom {
    fn from(v: f64) -> Self {
        Dom::Float(v)
    }
}

impl From<f32> for Dom {
    fn from(v: f32) -> Self {
        Dom::Float(v as f64)
    }
}

impl From<&str> for Dom {
    fn from(v: &str) -> Self {
        Dom::String(v.to_owned())
    }
}

impl From<String> for Dom {
    fn from(v: String) -> Self {
        Dom::String(v)
    }
}

impl From<Vec<Dom>> for Dom {
    fn from(v: Vec<Dom>) -> Self {
        Dom::Array(v)
    }
}

impl From<DomObject> for Dom {
    fn from(v: DomObject) -> Self {
        Dom::Object(v)
    }
}

impl<K: Into<String>> FromIterator<(K, Dom)> for Dom {
    fn from_iter<I: IntoIterator<Item = (K, Dom)>>(iter: I) -> Self {
        Dom::Object(iter.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }
}

// ---------------------------------------------------------------------------
// serde_json bridge
// ---------------------------------------------------------------------------

impl From<serde_json::Value> for Dom {
    fn from(value: serde_json::Value) -> Self {
        match value {
            serde_json::Value::Null => Dom::Null,
            serde_json::Value::Bool(b) => Dom::Bool(b),
            serde_json::Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    Dom::Int(i)
                } else if let Some(u) = n.as_u64() {
                    Dom::UInt(u)
                } else {
                    Dom::Float(n.as_f64().unwrap_or_default())
                }
            }
            serde_json::Value::String(s) => Dom::String(s),
            serde_json::Value::Array(items) => {
                Dom::Array(items.into_iter().map(Dom::from).collect())
            }
            serde_json::Value::Object(map) => {
                Dom::Object(map.into_iter().map(|(k, v)| (k, Dom::from(v))).collect())
            }
        }
    }
}

impl From<Dom> for serde_json::Value {
    fn from(value: Dom) -> Self {
        match value {
            Dom::Null => serde_json::Value::Null,
            Dom::Bool(b) => serde_json::Value::Bool(b),
            Dom::Int(i) => serde_json::Value::from(i),
            Dom::UInt(u) => serde_json::Value::from(u),
            // Non-finite floats have no JSON representation.
            Dom::Float(f) => serde_json::Number::from_f64(f)
                .map(serde_json::Value::Number)
                .unwrap_or(serde_json::Value::Null),
            Dom::String(s) => serde_json::Value::String(s),
            Dom::Array(items) => {
                serde_json::Value::Array(items.into_iter().map(serde_json::Value::from).collect())
            }
            Dom::Object(map) => serde_json::Value::Object(
                map.into_iter()
                    .map(|(k, v)| (k, serde_json::Value::from(v)))
                    .collect(),
            ),
        }
    }
}

/// Convert any `T: Serialize` into a [`Dom`].
pub fn to_dom<T: Serialize + ?Sized>(value: &T) -> Result<Dom, DomError> {
    serde_json::to_value(value)
        .map(Dom::from)
        .map_err(|e| DomError::Serialize(e.to_string()))
}

/// Convert a [`Dom`] back into any `T: DeserializeOwned`.
pub fn from_dom<T: de::DeserializeOwned>(dom: Dom) -> Result<T, DomError> {
    serde_json::from_value(serde_json::Value::from(dom))
        .map_err(|e| DomError::Deserialize(e.to_string()))
}

// ---------------------------------------------------------------------------
// Serialize / Deserialize
// ---------------------------------------------------------------------------

impl Serialize for Dom {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Dom::Null => serializer.serialize_unit(),
            Dom::Bool(b) => serializer.serialize_bool(*b),
            Dom::Int(i) => serializer.serialize_i64(*i),
            Dom::UInt(u) => serializer.serialize_u64(*u),
            Dom::Float(f) => serializer.serialize_f64(*f),
            Dom::String(s) => serializer.serialize_str(s),
            Dom::Array(items) => {
                let mut seq = serializer.serialize_seq(Some(items.len()))?;
                for item in items {
                    seq.serialize_element(item)?;
                }
                seq.end()
            }
            Dom::Object(map) => {
                let mut out = serializer.serialize_map(Some(map.len()))?;
                for (k, v) in map {
                    out.serialize_entry(k, v)?;
                }
                out.end()
            }
        }
    }
}

struct DomVisitor;

impl<'de> Visitor<'de> for DomVisitor {
    type Value = Dom;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("a JSON-like value")
    }

    fn visit_bool<E: de::Error>(self, v: bool) -> Result<Dom, E> {
        Ok(Dom::Bool(v))
    }

    fn visit_i64<E: de::Error>(self, v: i64) -> Result<Dom, E> {
        Ok(Dom::Int(v))
    }

    fn visit_u64<E: de::Error>(self, v: u64) -> Result<Dom, E> {
        Ok(Dom::from(v))
    }

    fn visit_f64<E: de::Error>(self, v: f64) -> Result<Dom, E> {
        Ok(Dom::Float(v))
    }

    fn visit_char<E: de::Error>(self, v: char) -> Result<Dom, E> {
        Ok(Dom::String(v.to_string()))
    }

    fn visit_str<E: de::Error>(self, v: &str) -> Result<Dom, E> {
        Ok(Dom::String(v.to_owned()))
    }

    fn visit_string<E: de::Error>(self, v: String) -> Result<Dom, E> {
        Ok(Dom::String(v))
    }

    fn visit_unit<E: de::Error>(self) -> Result<Dom, E> {
        Ok(Dom::Null)
    }

    fn visit_none<E: de::Error>(self) -> Result<Dom, E> {
        Ok(Dom::Null)
    }

    fn visit_some<D: Deserializer<'de>>(self, deserializer: D) -> Result<Dom, D::Error> {
        Dom::deserialize(deserializer)
    }

    fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> Result<Dom, A::Error> {
        let mut items = Vec::with_capacity(seq.size_hint().unwrap_or(0));
        while let Some(item) = seq.next_element()? {
            items.push(item);
        }
        Ok(Dom::Array(items))
    }

    fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> Result<Dom, A::Error> {
        let mut out = DomObject::new();
        while let Some((key, value)) = map.next_entry::<String, Dom>()? {
            out.insert(key, value);
        }
        Ok(Dom::Object(out))
    }
}

impl<'de> Deserialize<'de> for Dom {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_any(DomVisitor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unsigned_values_canonicalize_to_int() {
        assert_eq!(Dom::from(7u64), Dom::Int(7));
        assert_eq!(Dom::from(u64::MAX), Dom::UInt(u64::MAX));
        assert_eq!(Dom::from(7u32), Dom::from(7i64));
    }

    #[test]
    fn json_round_trip_keeps_value() {
        let json = r#"{"b":[1,2.5,"x",null,true],"a":{"nested":18446744073709551615}}"#;
        let dom: Dom = serde_json::from_str(json).unwrap();
        assert_eq!(dom.get("a").unwrap().get("nested"), Some(&Dom::UInt(u64::MAX)));

        let text = serde_json::to_string(&dom).unwrap();
        let again: Dom = serde_json::from_str(&text).unwrap();
        assert_eq!(dom, again);
    }

    #[test]
    fn object_keys_are_sorted() {
        let dom: Dom = serde_json::from_str(r#"{"z":1,"a":2}"#).unwrap();
        assert_eq!(dom.to_string(), r#"{"a":2,"z":1}"#);
    }

    #[test]
    fn to_dom_from_dom_with_struct() {
        #[derive(Debug, PartialEq, Serialize, Deserialize)]
        struct Point {
            x: f32,
            y: i32,
            label: Option<String>,
        }
        let p = Point {
            x: 1.5,
            y: -2,
            label: None,
        };
        let dom = to_dom(&p).unwrap();
        assert_eq!(dom.get("y"), Some(&Dom::Int(-2)));
        assert_eq!(dom.get("label"), Some(&Dom::Null));
        let restored: Point = from_dom(dom).unwrap();
        assert_eq!(restored, p);
    }

    #[test]
    fn from_dom_reports_type_mismatch() {
        let err = from_dom::<u32>(Dom::from("nope")).unwrap_err();
        assert!(matches!(err, DomError::Deserialize(_)));
    }

    #[test]
    fn pointer_walks_objects_and_arrays() {
        let dom: Dom = serde_json::from_str(r#"{"list":[{"v":1},{"v":2}]}"#).unwrap();
        let path = DomPath::parse("/list/1/v").unwrap();
        assert_eq!(dom.pointer(&path), Some(&Dom::Int(2)));

        let leading_zero = DomPath::parse("/list/01/v").unwrap();
        assert_eq!(dom.pointer(&leading_zero), None);
    }

    #[test]
    fn insert_turns_scalar_into_object() {
        let mut dom = Dom::Int(1);
        dom.insert("k", Dom::Bool(true));
        assert_eq!(dom.get("k"), Some(&Dom::Bool(true)));
    }

    #[test]
    fn node_count_counts_every_node() {
        let dom: Dom = serde_json::from_str(r#"{"a":[1,2],"b":null}"#).unwrap();
        assert_eq!(dom.node_count(), 5);
    }
}
