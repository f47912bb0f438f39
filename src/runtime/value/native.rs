//! Rust-side dynamic values
//!
//! `NativeValue` is what callers build and receive; it owns ordinary Rust
//! collections and has no tie to engine memory.

use std::fmt;

use indexmap::IndexMap;
use serde_json::{Map as JsonMap, Number, Value as Json};

use super::raw::ValueType;

/// Map with primitive keys; iteration order is incidental
pub type NativeMap = IndexMap<MapKey, NativeValue>;

/// Dynamically typed value on the Rust side of the boundary
#[derive(Debug, Clone, PartialEq, Default)]
pub enum NativeValue {
    /// Empty value
    #[default]
    Undefined,
    /// Boolean
    Bool(bool),
    /// 32-bit integer
    Int(i32),
    /// Double
    Real(f64),
    /// String; crosses the boundary as UTF-16
    String(String),
    /// String whose code units are not valid UTF-16, carried unchanged
    Utf16(Vec<u16>),
    /// Byte blob
    Bytes(Vec<u8>),
    /// Array
    Array(Vec<NativeValue>),
    /// Map
    Map(NativeMap),
}

/// Map key
///
/// Only primitives can key a map built on this side. Keys of other kinds
/// found in engine-built maps are stringified, see [`MapKey::from_native`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum MapKey {
    Bool(bool),
    Int(i32),
    String(String),
    Utf16(Vec<u16>),
}

impl MapKey {
    /// The key as a value
    pub fn to_native(&self) -> NativeValue {
        match self {
            MapKey::Bool(b) => NativeValue::Bool(*b),
            MapKey::Int(i) => NativeValue::Int(*i),
            MapKey::String(s) => NativeValue::String(s.clone()),
            MapKey::Utf16(units) => NativeValue::Utf16(units.clone()),
        }
    }

    /// Key for a value read from an engine map.
    ///
    /// Undefined keys are dropped; reals, arrays, maps and blobs become their
    /// JSON text.
    pub fn from_native(value: NativeValue) -> Option<Self> {
        match value {
            NativeValue::Undefined => None,
            NativeValue::Bool(b) => Some(MapKey::Bool(b)),
            NativeValue::Int(i) => Some(MapKey::Int(i)),
            NativeValue::String(s) => Some(MapKey::String(s)),
            NativeValue::Utf16(units) => Some(MapKey::Utf16(units)),
            other => Some(MapKey::String(other.to_json().to_string())),
        }
    }

    /// Key text used for JSON objects
    pub fn to_json_key(&self) -> String {
        match self {
            MapKey::Bool(b) => b.to_string(),
            MapKey::Int(i) => i.to_string(),
            MapKey::String(s) => s.clone(),
            MapKey::Utf16(units) => String::from_utf16_lossy(units),
        }
    }
}

impl fmt::Display for MapKey {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        match self {
            MapKey::String(s) => write!(f, "\"{}\"", s),
            MapKey::Utf16(units) => write!(f, "\"{}\"", String::from_utf16_lossy(units)),
            other => write!(f, "{}", other.to_json_key()),
        }
    }
}

impl From<&str> for MapKey {
    fn from(s: &str) -> Self {
        MapKey::String(s.to_string())
    }
}

impl From<String> for MapKey {
    fn from(s: String) -> Self {
        MapKey::String(s)
    }
}

impl From<i32> for MapKey {
    fn from(i: i32) -> Self {
        MapKey::Int(i)
    }
}

impl From<bool> for MapKey {
    fn from(b: bool) -> Self {
        MapKey::Bool(b)
    }
}

impl NativeValue {
    /// Kind this value marshals to
    pub fn value_type(&self) -> ValueType {
        match self {
            NativeValue::Undefined => ValueType::Undefined,
            NativeValue::Bool(_) => ValueType::Bool,
            NativeValue::Int(_) => ValueType::Int,
            NativeValue::Real(_) => ValueType::Real,
            NativeValue::String(_) | NativeValue::Utf16(_) => ValueType::String,
            NativeValue::Bytes(_) => ValueType::Bytes,
            NativeValue::Array(_) => ValueType::Array,
            NativeValue::Map(_) => ValueType::Map,
        }
    }

    pub fn is_undefined(&self) -> bool {
        matches!(self, NativeValue::Undefined)
    }

    /// String from code units; `Utf16` only when they do not decode
    pub fn from_utf16(units: &[u16]) -> Self {
        match String::from_utf16(units) {
            Ok(s) => NativeValue::String(s),
            Err(_) => NativeValue::Utf16(units.to_vec()),
        }
    }

    /// Code units this value marshals to, for either string form
    pub fn to_utf16(&self) -> Option<Vec<u16>> {
        match self {
            NativeValue::String(s) => Some(s.encode_utf16().collect()),
            NativeValue::Utf16(units) => Some(units.clone()),
            _ => None,
        }
    }

    /// Build a map value from key/value pairs; later duplicates win
    pub fn map_from<K, V, I>(pairs: I) -> Self
    where
        K: Into<MapKey>,
        V: Into<NativeValue>,
        I: IntoIterator<Item = (K, V)>,
    {
        NativeValue::Map(
            pairs
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }

    /// Convert from JSON.
    ///
    /// Integral numbers that fit in 32 bits become `Int`, every other number
    /// becomes `Real`.
    pub fn from_json(json: &Json) -> Self {
        match json {
            Json::Null => NativeValue::Undefined,
            Json::Bool(b) => NativeValue::Bool(*b),
            Json::Number(n) => match n.as_i64().and_then(|i| i32::try_from(i).ok()) {
                Some(i) => NativeValue::Int(i),
                None => NativeValue::Real(n.as_f64().unwrap_or(f64::NAN)),
            },
            Json::String(s) => NativeValue::String(s.clone()),
            Json::Array(items) => NativeValue::Array(items.iter().map(Self::from_json).collect()),
            Json::Object(fields) => NativeValue::Map(
                fields
                    .iter()
                    .map(|(k, v)| (MapKey::String(k.clone()), Self::from_json(v)))
                    .collect(),
            ),
        }
    }

    /// Convert to JSON; blobs become arrays of numbers, non-finite reals null.
    /// Unpaired surrogates become U+FFFD, JSON text cannot hold them.
    pub fn to_json(&self) -> Json {
        match self {
            NativeValue::Undefined => Json::Null,
            NativeValue::Bool(b) => Json::Bool(*b),
            NativeValue::Int(i) => Json::Number(Number::from(*i)),
            NativeValue::Real(r) => Number::from_f64(*r).map(Json::Number).unwrap_or(Json::Null),
            NativeValue::String(s) => Json::String(s.clone()),
            NativeValue::Utf16(units) => Json::String(String::from_utf16_lossy(units)),
            NativeValue::Bytes(b) => Json::Array(b.iter().map(|&x| Json::from(x)).collect()),
            NativeValue::Array(items) => Json::Array(items.iter().map(Self::to_json).collect()),
            NativeValue::Map(map) => {
                let mut object = JsonMap::new();
                for (k, v) in map {
                    object.insert(k.to_json_key(), v.to_json());
                }
                Json::Object(object)
            }
        }
    }
}

impl fmt::Display for NativeValue {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        match self {
            NativeValue::Undefined => write!(f, "undefined"),
            NativeValue::Bool(b) => write!(f, "{}", b),
            NativeValue::Int(i) => write!(f, "{}", i),
            NativeValue::Real(r) => write!(f, "{}", r),
            NativeValue::String(s) => write!(f, "\"{}\"", s),
            NativeValue::Utf16(units) => write!(f, "\"{}\"", String::from_utf16_lossy(units)),
            NativeValue::Bytes(b) => write!(f, "bytes[{}]", b.len()),
            NativeValue::Array(items) => {
                write!(
                    f,
                    "[{}]",
                    items
                        .iter()
                        .map(|v| v.to_string())
                        .collect::<Vec<_>>()
                        .join(", ")
                )
            }
            NativeValue::Map(map) => {
                write!(
                    f,
                    "{{{}}}",
                    map.iter()
                        .map(|(k, v)| format!("{}: {}", k, v))
                        .collect::<Vec<_>>()
                        .join(", ")
                )
            }
        }
    }
}

impl From<bool> for NativeValue {
    fn from(b: bool) -> Self {
        NativeValue::Bool(b)
    }
}

impl From<i32> for NativeValue {
    fn from(i: i32) -> Self {
        NativeValue::Int(i)
    }
}

impl From<f64> for NativeValue {
    fn from(r: f64) -> Self {
        NativeValue::Real(r)
    }
}

impl From<&str> for NativeValue {
    fn from(s: &str) -> Self {
        NativeValue::String(s.to_string())
    }
}

impl From<String> for NativeValue {
    fn from(s: String) -> Self {
        NativeValue::String(s)
    }
}

impl From<Vec<u8>> for NativeValue {
    fn from(b: Vec<u8>) -> Self {
        NativeValue::Bytes(b)
    }
}

impl From<&[u8]> for NativeValue {
    fn from(b: &[u8]) -> Self {
        NativeValue::Bytes(b.to_vec())
    }
}

impl From<Vec<NativeValue>> for NativeValue {
    fn from(items: Vec<NativeValue>) -> Self {
        NativeValue::Array(items)
    }
}

impl From<NativeMap> for NativeValue {
    fn from(map: NativeMap) -> Self {
        NativeValue::Map(map)
    }
}

impl From<&Json> for NativeValue {
    fn from(json: &Json) -> Self {
        NativeValue::from_json(json)
    }
}
