use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::RwLock;

use keyscope_types::Value;

use crate::error::{StoreError, StoreResult};
use crate::traits::KvStore;

/// In-memory, HashMap-based store.
///
/// Intended for tests and embedding. Values live behind a `RwLock` and are
/// cloned on read. The store can be switched read-only to exercise the
/// write-failure paths of its callers.
pub struct MemoryStore {
    values: RwLock<HashMap<String, Value>>,
    read_only: AtomicBool,
}

impl MemoryStore {
    /// Create a new empty store.
    pub fn new() -> Self {
        Self {
            values: RwLock::new(HashMap::new()),
            read_only: AtomicBool::new(false),
        }
    }

    /// Number of stored keys.
    pub fn len(&self) -> usize {
        self.values.read().expect("lock poisoned").len()
    }

    /// Returns `true` if nothing is stored.
    pub fn is_empty(&self) -> bool {
        self.values.read().expect("lock poisoned").is_empty()
    }

    /// Sorted list of every stored key.
    pub fn keys(&self) -> Vec<String> {
        let values = self.values.read().expect("lock poisoned");
        let mut keys: Vec<String> = values.keys().cloned().collect();
        keys.sort();
        keys
    }

    /// Reject (`true`) or accept (`false`) all further writes.
    pub fn set_read_only(&self, read_only: bool) {
        self.read_only.store(read_only, Ordering::SeqCst);
    }

    pub fn is_read_only(&self) -> bool {
        self.read_only.load(Ordering::SeqCst)
    }

    fn check_writable(&self) -> StoreResult<()> {
        if self.is_read_only() {
            return Err(StoreError::ReadOnly);
        }
        Ok(())
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl KvStore for MemoryStore {
    fn get(&self, key: &str) -> Option<Value> {
        self.values.read().expect("lock poisoned").get(key).cloned()
    }

    fn set(&self, key: &str, value: Value) -> StoreResult<()> {
        self.check_writable()?;
        self.values
            .write()
            .expect("lock poisoned")
            .insert(key.to_string(), value);
        Ok(())
    }

    fn remove(&self, key: &str) -> StoreResult<()> {
        self.check_writable()?;
        self.values.write().expect("lock poisoned").remove(key);
        Ok(())
    }

    fn remove_many(&self, keys: &[String]) -> StoreResult<()> {
        self.check_writable()?;
        let mut values = self.values.write().expect("lock poisoned");
        for key in keys {
            values.remove(key);
        }
        Ok(())
    }

    fn contains(&self, key: &str) -> bool {
        self.values.read().expect("lock poisoned").contains_key(key)
    }

    fn clear_all(&self) -> StoreResult<()> {
        self.check_writable()?;
        self.values.write().expect("lock poisoned").clear();
        Ok(())
    }
}

impl std::fmt::Debug for MemoryStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryStore")
            .field("key_count", &self.len())
            .field("read_only", &self.is_read_only())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeSet;

    // -----------------------------------------------------------------------
    // Core CRUD
    // -----------------------------------------------------------------------

    #[test]
    fn set_and_get() {
        let store = MemoryStore::new();
        store.set("i1", Value::I32(6)).unwrap();
        assert_eq!(store.get("i1"), Some(Value::I32(6)));
        assert!(store.contains("i1"));
    }

    #[test]
    fn get_missing_returns_none() {
        let store = MemoryStore::new();
        assert!(store.get("missing").is_none());
        assert!(!store.contains("missing"));
    }

    #[test]
    fn set_replaces_previous_value() {
        let store = MemoryStore::new();
        store.set("s", Value::from("a")).unwrap();
        store.set("s", Value::I64(2)).unwrap();
        assert_eq!(store.get("s"), Some(Value::I64(2)));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn remove_value() {
        let store = MemoryStore::new();
        store.set("i1", Value::I32(6)).unwrap();
        store.remove("i1").unwrap();
        assert!(!store.contains("i1"));
        // Removing again is not an error.
        store.remove("i1").unwrap();
    }

    #[test]
    fn remove_many_values() {
        let store = MemoryStore::new();
        store.set("s1", Value::from("1")).unwrap();
        store.set("s2", Value::from("2")).unwrap();
        store.set("s3", Value::from("3")).unwrap();
        store
            .remove_many(&["s1".to_string(), "s2".to_string()])
            .unwrap();
        assert!(!store.contains("s1"));
        assert!(!store.contains("s2"));
        assert!(store.contains("s3"));
    }

    #[test]
    fn clear_all_removes_everything() {
        let store = MemoryStore::new();
        store.set("a", Value::Bool(true)).unwrap();
        store.set("b", Value::Bool(false)).unwrap();
        store.clear_all().unwrap();
        assert!(store.is_empty());
    }

    // -----------------------------------------------------------------------
    // Typed decoding
    // -----------------------------------------------------------------------

    #[test]
    fn decode_uses_default_when_absent() {
        let store = MemoryStore::new();
        assert_eq!(store.decode_i32("i", -1), -1);
        assert_eq!(store.decode_i64("l", 7), 7);
        assert!(store.decode_bool("b", true));
        assert_eq!(store.decode_string("s"), None);
        assert_eq!(store.decode_bytes("bytes"), None);
        assert_eq!(store.decode_string_set("set"), None);
    }

    #[test]
    fn decode_uses_default_on_kind_mismatch() {
        let store = MemoryStore::new();
        store.set("n", Value::from("not a number")).unwrap();
        assert_eq!(store.decode_i32("n", 3), 3);
        assert_eq!(store.decode_f64("n", 0.5), 0.5);
    }

    #[test]
    fn decode_string_set() {
        let store = MemoryStore::new();
        let set: BTreeSet<String> = ["22", "33"].iter().map(|s| s.to_string()).collect();
        store.set("set", Value::StrSet(set.clone())).unwrap();
        assert_eq!(store.decode_string_set("set"), Some(set));
    }

    // -----------------------------------------------------------------------
    // Read-only mode
    // -----------------------------------------------------------------------

    #[test]
    fn read_only_rejects_writes() {
        let store = MemoryStore::new();
        store.set("kept", Value::I32(1)).unwrap();
        store.set_read_only(true);

        assert!(matches!(
            store.set("kept", Value::I32(2)),
            Err(StoreError::ReadOnly)
        ));
        assert!(matches!(store.remove("kept"), Err(StoreError::ReadOnly)));
        assert!(matches!(store.clear_all(), Err(StoreError::ReadOnly)));
        assert_eq!(store.get("kept"), Some(Value::I32(1)));

        store.set_read_only(false);
        store.set("kept", Value::I32(2)).unwrap();
        assert_eq!(store.get("kept"), Some(Value::I32(2)));
    }

    // -----------------------------------------------------------------------
    // Utilities
    // -----------------------------------------------------------------------

    #[test]
    fn keys_are_sorted() {
        let store = MemoryStore::new();
        store.set("c", Value::I32(1)).unwrap();
        store.set("a", Value::I32(1)).unwrap();
        store.set("b", Value::I32(1)).unwrap();
        assert_eq!(store.keys(), vec!["a", "b", "c"]);
    }

    #[test]
    fn concurrent_writes_to_distinct_keys() {
        use std::sync::Arc;
        use std::thread;

        let store = Arc::new(MemoryStore::new());
        let handles: Vec<_> = (0..8)
            .map(|i| {
                let store = Arc::clone(&store);
                thread::spawn(move || {
                    store.set(&format!("k{i}"), Value::I32(i)).unwrap();
                })
            })
            .collect();
        for h in handles {
            h.join().expect("thread should not panic");
        }
        assert_eq!(store.len(), 8);
        assert_eq!(store.get("k3"), Some(Value::I32(3)));
    }

    #[test]
    fn debug_format() {
        let store = MemoryStore::new();
        store.set("x", Value::I32(0)).unwrap();
        let debug = format!("{store:?}");
        assert!(debug.contains("MemoryStore"));
        assert!(debug.contains("key_count"));
    }
}
