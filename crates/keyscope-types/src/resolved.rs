use std::collections::BTreeMap;

use serde::ser::{SerializeMap, SerializeSeq};
use serde::{Serialize, Serializer};

use crate::value::Value;

/// A fully decoded property value, as produced by namespace enumeration.
///
/// Leaves are scalar [`Value`]s or structured values; collections and nested
/// scopes are expanded into [`Resolved::List`] and [`Resolved::Map`].
#[derive(Clone, Debug, PartialEq)]
pub enum Resolved {
    /// No value (an absent nullable property).
    Null,
    /// A scalar leaf.
    Value(Value),
    /// A structured leaf decoded by a codec.
    Structured(serde_json::Value),
    /// A list property.
    List(Vec<Resolved>),
    /// A map property or a nested scope, keyed by child segment.
    Map(BTreeMap<String, Resolved>),
}

impl Resolved {
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    pub fn as_value(&self) -> Option<&Value> {
        match self {
            Self::Value(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[Resolved]> {
        match self {
            Self::List(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_map(&self) -> Option<&BTreeMap<String, Resolved>> {
        match self {
            Self::Map(entries) => Some(entries),
            _ => None,
        }
    }

    /// Look up a child of a map-shaped value.
    pub fn get(&self, key: &str) -> Option<&Resolved> {
        self.as_map().and_then(|entries| entries.get(key))
    }
}

impl From<Value> for Resolved {
    fn from(value: Value) -> Self {
        Self::Value(value)
    }
}

impl<T: Into<Resolved>> From<Option<T>> for Resolved {
    fn from(value: Option<T>) -> Self {
        value.map_or(Self::Null, Into::into)
    }
}

// Serialized as plain JSON-like data for diagnostics: byte blobs become hex
// strings and string sets become sequences.
impl Serialize for Resolved {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Null => serializer.serialize_none(),
            Self::Value(value) => match value {
                Value::I32(v) => serializer.serialize_i32(*v),
                Value::I64(v) => serializer.serialize_i64(*v),
                Value::F32(v) => serializer.serialize_f32(*v),
                Value::F64(v) => serializer.serialize_f64(*v),
                Value::Bool(v) => serializer.serialize_bool(*v),
                Value::Str(v) => serializer.serialize_str(v),
                Value::Bytes(v) => serializer.serialize_str(&hex::encode(v)),
                Value::StrSet(set) => {
                    let mut seq = serializer.serialize_seq(Some(set.len()))?;
                    for item in set {
                        seq.serialize_element(item)?;
                    }
                    seq.end()
                }
            },
            Self::Structured(json) => json.serialize(serializer),
            Self::List(items) => {
                let mut seq = serializer.serialize_seq(Some(items.len()))?;
                for item in items {
                    seq.serialize_element(item)?;
                }
                seq.end()
            }
            Self::Map(entries) => {
                let mut map = serializer.serialize_map(Some(entries.len()))?;
                for (key, value) in entries {
                    map.serialize_entry(key, value)?;
                }
                map.end()
            }
        }
    }
}
