use std::fmt;
use std::sync::Arc;

use keyscope_store::KvStore;
use keyscope_types::{KeyPath, Resolved};
use tracing::debug;

use crate::codec::Codec;
use crate::error::PropertyResult;
use crate::scope;

/// A typed handle to one store key.
///
/// `get` reads the current store value through the codec on every call;
/// there is no caching. `set` writes through immediately. A scoped handle
/// (from [`Property::with_key`]) also keeps the parent indices of its key
/// up to date so the entry can be enumerated.
pub struct Property<V> {
    store: Arc<dyn KvStore>,
    name: String,
    path: KeyPath,
    codec: Codec<V>,
}

impl<V> Clone for Property<V> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            name: self.name.clone(),
            path: self.path.clone(),
            codec: self.codec.clone(),
        }
    }
}

impl<V: Clone + Send + Sync + 'static> Property<V> {
    /// Declare a property named `name`, stored under that same key.
    pub fn new(
        store: Arc<dyn KvStore>,
        name: impl Into<String>,
        codec: Codec<V>,
    ) -> PropertyResult<Self> {
        let name = name.into();
        let path = KeyPath::base(name.clone())?;
        Ok(Self {
            store,
            name,
            path,
            codec,
        })
    }

    /// Store under `key` instead of the declared name.
    ///
    /// Scope segments already applied are kept on top of the new base.
    pub fn stored_as(&self, key: impl Into<String>) -> PropertyResult<Self> {
        let path = self
            .path
            .segments()
            .into_iter()
            .try_fold(KeyPath::base(key)?, |path, segment| path.scope(segment))?;
        Ok(Self {
            path,
            ..self.clone()
        })
    }

    /// A handle to the nested entry `segment` under this property's key.
    ///
    /// Calls chain outward-in: `p.with_key("a")?.with_key("b")?` resolves to
    /// `base$a$b`.
    pub fn with_key(&self, segment: impl Into<String>) -> PropertyResult<Self> {
        Ok(Self {
            path: self.path.scope(segment)?,
            ..self.clone()
        })
    }

    /// The declared field name.
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn path(&self) -> &KeyPath {
        &self.path
    }

    /// The fully resolved store key.
    pub fn key(&self) -> String {
        self.path.resolve()
    }

    pub fn codec(&self) -> &Codec<V> {
        &self.codec
    }

    pub fn store(&self) -> &Arc<dyn KvStore> {
        &self.store
    }

    /// Current value, or the codec default when the key is absent.
    pub fn get(&self) -> V {
        self.codec.decode(self.store.get(&self.key()))
    }

    /// Whether a value is currently stored at this key.
    pub fn is_set(&self) -> bool {
        self.store.contains(&self.key())
    }

    /// Write `value`. A value the codec encodes as absent removes the key.
    pub fn set(&self, value: V) -> PropertyResult<()> {
        let key = self.key();
        match self.codec.encode(&value)? {
            Some(raw) => {
                self.store.set(&key, raw)?;
                scope::link(self.store.as_ref(), &self.path)?;
            }
            None => {
                self.store.remove(&key)?;
                scope::unlink(self.store.as_ref(), &self.path)?;
            }
        }
        debug!(key = %key, "property written");
        Ok(())
    }

    /// Remove the stored value; subsequent reads yield the default.
    pub fn remove(&self) -> PropertyResult<()> {
        self.store.remove(&self.key())?;
        scope::unlink(self.store.as_ref(), &self.path)
    }

    /// The current value rendered for diagnostics.
    pub fn resolve(&self) -> Resolved {
        self.codec.resolve(&self.get())
    }
}

impl<V> fmt::Debug for Property<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Property")
            .field("name", &self.name)
            .field("key", &self.path)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use keyscope_store::{MemoryStore, StoreError};
    use keyscope_types::Value;
    use std::collections::BTreeSet;

    use crate::error::PropertyError;

    fn store() -> Arc<MemoryStore> {
        Arc::new(MemoryStore::new())
    }

    // -----------------------------------------------------------------------
    // Scalars
    // -----------------------------------------------------------------------

    #[test]
    fn reads_default_then_written_value() {
        let store = store();
        let i1 = Property::new(store.clone(), "i1", Codec::scalar(0i32)).unwrap();
        let i2 = Property::new(store.clone(), "i2", Codec::scalar(-1i32)).unwrap();
        assert_eq!(i1.get(), 0);
        assert_eq!(i2.get(), -1);

        i1.set(6).unwrap();
        assert_eq!(i1.get(), 6);
        assert_eq!(store.get("i1"), Some(Value::I32(6)));
    }

    #[test]
    fn nullable_none_removes_key() {
        let store = store();
        let s1 = Property::new(store.clone(), "s1", Codec::<Option<String>>::nullable()).unwrap();
        s1.set(Some("test".into())).unwrap();
        assert!(s1.is_set());
        s1.set(None).unwrap();
        assert!(!store.contains("s1"));
        assert_eq!(s1.get(), None);
    }

    #[test]
    fn string_set_property() {
        let store = store();
        let set1 = Property::new(store, "set1", Codec::<Option<BTreeSet<String>>>::nullable())
            .unwrap();
        let value: BTreeSet<String> = ["1", "2"].iter().map(|s| s.to_string()).collect();
        set1.set(Some(value.clone())).unwrap();
        assert_eq!(set1.get(), Some(value));
    }

    #[test]
    fn stored_as_overrides_key() {
        let store = store();
        let p = Property::new(store.clone(), "counter", Codec::scalar(0i64))
            .unwrap()
            .stored_as("legacy_counter")
            .unwrap();
        p.set(9).unwrap();
        assert_eq!(p.name(), "counter");
        assert_eq!(p.key(), "legacy_counter");
        assert_eq!(store.get("legacy_counter"), Some(Value::I64(9)));
    }

    #[test]
    fn write_failure_leaves_value() {
        let store = store();
        let p = Property::new(store.clone(), "b", Codec::scalar(false)).unwrap();
        p.set(true).unwrap();
        store.set_read_only(true);
        let err = p.set(false).unwrap_err();
        assert!(matches!(err, PropertyError::Store(StoreError::ReadOnly)));
        assert!(p.get());
    }

    #[test]
    fn reserved_name_is_rejected() {
        let store = store();
        let err = Property::new(store, "a$b", Codec::scalar(0i32)).unwrap_err();
        assert!(matches!(err, PropertyError::Key(_)));
    }

    // -----------------------------------------------------------------------
    // Nested keys
    // -----------------------------------------------------------------------

    #[test]
    fn with_key_composes_in_call_order() {
        let store = store();
        let p = Property::new(store.clone(), "tree", Codec::scalar(0i32)).unwrap();
        let leaf = p.with_key("a").unwrap().with_key("b").unwrap();
        assert_eq!(leaf.key(), "tree$a$b");

        leaf.set(5).unwrap();
        assert_eq!(leaf.get(), 5);
        assert_eq!(p.get(), 0);
        assert!(store.decode_string_set("tree$key").unwrap().contains("a"));
        assert!(store.decode_string_set("tree$a$key").unwrap().contains("b"));
    }

    #[test]
    fn with_key_rejects_reserved_segments() {
        let p = Property::new(store(), "tree", Codec::scalar(0i32)).unwrap();
        assert!(p.with_key("key").is_err());
        assert!(p.with_key("x$y").is_err());
        assert!(p.with_key("size").is_ok());
    }

    #[test]
    fn nested_absent_write_unlinks() {
        let store = store();
        let p = Property::new(store.clone(), "user", Codec::<Option<String>>::nullable()).unwrap();
        let leaf = p.with_key("42").unwrap();
        leaf.set(Some("Ann".into())).unwrap();
        leaf.set(None).unwrap();
        assert!(store.is_empty());
    }

    #[test]
    fn stored_as_keeps_scopes() {
        let p = Property::new(store(), "tree", Codec::scalar(0i32))
            .unwrap()
            .with_key("a")
            .unwrap()
            .stored_as("grove")
            .unwrap();
        assert_eq!(p.key(), "grove$a");
    }
}
