//! Value codecs.
//!
//! A [`Codec`] converts between a property's Rust type and the raw store
//! representation. Decoding receives `None` when the key is absent (or holds
//! a value of the wrong kind) and must produce the property's default.
//! Encoding to `None` means "absent": the key is removed instead of written.

use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;

use keyscope_types::{Resolved, Value};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::warn;

use crate::error::{PropertyError, PropertyResult};

/// A Rust type with a direct scalar store representation.
pub trait StoreValue: Clone + Send + Sync + 'static {
    /// Convert from a stored value, or `None` if the kind does not match.
    fn from_value(value: Value) -> Option<Self>;

    /// Convert into a stored value.
    fn to_value(&self) -> Value;
}

macro_rules! copy_store_value {
    ($ty:ty, $variant:ident) => {
        impl StoreValue for $ty {
            fn from_value(value: Value) -> Option<Self> {
                match value {
                    Value::$variant(v) => Some(v),
                    _ => None,
                }
            }

            fn to_value(&self) -> Value {
                Value::$variant(*self)
            }
        }
    };
}

copy_store_value!(i32, I32);
copy_store_value!(i64, I64);
copy_store_value!(f32, F32);
copy_store_value!(f64, F64);
copy_store_value!(bool, Bool);

impl StoreValue for String {
    fn from_value(value: Value) -> Option<Self> {
        value.into_string()
    }

    fn to_value(&self) -> Value {
        Value::Str(self.clone())
    }
}

impl StoreValue for Vec<u8> {
    fn from_value(value: Value) -> Option<Self> {
        value.into_bytes()
    }

    fn to_value(&self) -> Value {
        Value::Bytes(self.clone())
    }
}

impl StoreValue for BTreeSet<String> {
    fn from_value(value: Value) -> Option<Self> {
        value.into_string_set()
    }

    fn to_value(&self) -> Value {
        Value::StrSet(self.clone())
    }
}

type DecodeFn<V> = dyn Fn(Option<Value>) -> V + Send + Sync;
type EncodeFn<V> = dyn Fn(&V) -> PropertyResult<Option<Value>> + Send + Sync;
type ResolveFn<V> = dyn Fn(&V) -> Resolved + Send + Sync;

/// Decode/encode pair for one property type, plus its diagnostic rendering.
pub struct Codec<V> {
    decode: Arc<DecodeFn<V>>,
    encode: Arc<EncodeFn<V>>,
    resolve: Arc<ResolveFn<V>>,
}

impl<V> Clone for Codec<V> {
    fn clone(&self) -> Self {
        Self {
            decode: Arc::clone(&self.decode),
            encode: Arc::clone(&self.encode),
            resolve: Arc::clone(&self.resolve),
        }
    }
}

impl<V> fmt::Debug for Codec<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Codec")
            .field("type", &std::any::type_name::<V>())
            .finish()
    }
}

impl<V: 'static> Codec<V> {
    /// Build a codec from its three functions.
    pub fn new(
        decode: impl Fn(Option<Value>) -> V + Send + Sync + 'static,
        encode: impl Fn(&V) -> PropertyResult<Option<Value>> + Send + Sync + 'static,
        resolve: impl Fn(&V) -> Resolved + Send + Sync + 'static,
    ) -> Self {
        Self {
            decode: Arc::new(decode),
            encode: Arc::new(encode),
            resolve: Arc::new(resolve),
        }
    }

    /// Decode a raw store value (`None` when absent).
    pub fn decode(&self, raw: Option<Value>) -> V {
        (self.decode)(raw)
    }

    /// Encode a value; `Ok(None)` means the key should be removed.
    pub fn encode(&self, value: &V) -> PropertyResult<Option<Value>> {
        (self.encode)(value)
    }

    /// Render a decoded value for namespace enumeration.
    pub fn resolve(&self, value: &V) -> Resolved {
        (self.resolve)(value)
    }

    /// The value an absent key decodes to.
    pub fn absent(&self) -> V {
        self.decode(None)
    }
}

impl<T: StoreValue> Codec<T> {
    /// A non-nullable scalar that decodes to `default` when absent.
    pub fn scalar(default: T) -> Self {
        Self::new(
            move |raw| raw.and_then(T::from_value).unwrap_or_else(|| default.clone()),
            |value| Ok(Some(value.to_value())),
            |value| Resolved::Value(value.to_value()),
        )
    }
}

impl<T: StoreValue> Codec<Option<T>> {
    /// A nullable scalar: absent decodes to `None`, and `None` removes the key.
    pub fn nullable() -> Self {
        Self::new(
            |raw| raw.and_then(T::from_value),
            |value| Ok(value.as_ref().map(StoreValue::to_value)),
            |value| value.as_ref().map_or(Resolved::Null, |v| Resolved::Value(v.to_value())),
        )
    }
}

fn decode_json<T: DeserializeOwned>(raw: Option<Value>) -> Option<T> {
    let bytes = raw?.into_bytes()?;
    match serde_json::from_slice(&bytes) {
        Ok(value) => Some(value),
        Err(e) => {
            warn!(error = %e, "structured value failed to decode; treating as absent");
            None
        }
    }
}

fn encode_json<T: Serialize>(value: &T) -> PropertyResult<Value> {
    serde_json::to_vec(value)
        .map(Value::Bytes)
        .map_err(|e| PropertyError::Codec(e.to_string()))
}

fn resolve_json<T: Serialize>(value: &T) -> Resolved {
    serde_json::to_value(value).map_or(Resolved::Null, Resolved::Structured)
}

impl<T> Codec<Option<T>>
where
    T: Serialize + DeserializeOwned + Send + Sync + 'static,
{
    /// A nullable structured value stored as JSON bytes.
    pub fn structured() -> Self {
        Self::new(
            decode_json::<T>,
            |value| value.as_ref().map(encode_json).transpose(),
            |value| value.as_ref().map_or(Resolved::Null, resolve_json),
        )
    }
}

impl<T> Codec<T>
where
    T: Serialize + DeserializeOwned + Clone + Send + Sync + 'static,
{
    /// A structured value stored as JSON bytes, `default` when absent.
    pub fn structured_or(default: T) -> Self {
        Self::new(
            move |raw| decode_json(raw).unwrap_or_else(|| default.clone()),
            |value| encode_json(value).map(Some),
            resolve_json,
        )
    }
}
