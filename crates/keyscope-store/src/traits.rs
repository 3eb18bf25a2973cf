use std::collections::BTreeSet;

use keyscope_types::Value;

use crate::error::StoreResult;

/// Synchronous scalar key-value store.
///
/// All implementations must satisfy these invariants:
/// - A single-key `get`/`set`/`remove` is atomic and safe to call
///   concurrently. Nothing spans more than one key.
/// - `get` returns exactly what the last successful `set` stored, or `None`
///   after a `remove` or `clear_all`.
/// - A failed write leaves the previous value in place and returns `Err`.
///
/// There is deliberately no way to iterate keys through this trait; callers
/// that need membership keep their own key-set index entries.
pub trait KvStore: Send + Sync {
    /// Read the raw value stored at `key`.
    fn get(&self, key: &str) -> Option<Value>;

    /// Store `value` at `key`, replacing any previous value.
    fn set(&self, key: &str, value: Value) -> StoreResult<()>;

    /// Remove `key`. Removing a missing key is not an error.
    fn remove(&self, key: &str) -> StoreResult<()>;

    /// Remove every key in `keys`.
    ///
    /// Default implementation calls `remove()` for each key. Backends may
    /// override to batch the removal.
    fn remove_many(&self, keys: &[String]) -> StoreResult<()> {
        keys.iter().try_for_each(|key| self.remove(key))
    }

    /// Whether a value is stored at `key`.
    fn contains(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    /// Remove every key in the store.
    fn clear_all(&self) -> StoreResult<()>;

    // ---------------------------------------------------------------
    // Typed decoding
    // ---------------------------------------------------------------

    fn decode_i32(&self, key: &str, default: i32) -> i32 {
        self.get(key).and_then(|v| v.as_i32()).unwrap_or(default)
    }

    fn decode_i64(&self, key: &str, default: i64) -> i64 {
        self.get(key).and_then(|v| v.as_i64()).unwrap_or(default)
    }

    fn decode_f32(&self, key: &str, default: f32) -> f32 {
        self.get(key).and_then(|v| v.as_f32()).unwrap_or(default)
    }

    fn decode_f64(&self, key: &str, default: f64) -> f64 {
        self.get(key).and_then(|v| v.as_f64()).unwrap_or(default)
    }

    fn decode_bool(&self, key: &str, default: bool) -> bool {
        self.get(key).and_then(|v| v.as_bool()).unwrap_or(default)
    }

    fn decode_string(&self, key: &str) -> Option<String> {
        self.get(key).and_then(Value::into_string)
    }

    fn decode_bytes(&self, key: &str) -> Option<Vec<u8>> {
        self.get(key).and_then(Value::into_bytes)
    }

    fn decode_string_set(&self, key: &str) -> Option<BTreeSet<String>> {
        self.get(key).and_then(Value::into_string_set)
    }
}
