use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::{Arc, Mutex, RwLock};

use keyscope_property::{Codec, ListView, MapView, ObservableCell, Property};
use keyscope_store::{KvConfig, KvStore, MemoryStore};
use keyscope_types::Resolved;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, info};

use crate::cache::{describe, Shared, ViewCache};
use crate::enumerate;
use crate::error::{OwnerError, OwnerResult};
use crate::registry::{FieldDescriptor, FieldKind, Registry};

struct OwnerInner {
    id: String,
    store: Arc<dyn KvStore>,
    registry: RwLock<Registry>,
    views: Mutex<ViewCache>,
}

/// The holder of a set of declared, store-backed properties.
///
/// Properties are declared through the factory methods (`int`, `string`,
/// `structured`, ...), which record each field in the owner's registry for
/// [`Owner::enumerate`]. Map, list and cell views are created on first
/// request and memoized per field, so repeated requests return the same
/// in-memory view.
///
/// Cloning an `Owner` is cheap and shares the registry and view cache.
#[derive(Clone)]
pub struct Owner {
    inner: Arc<OwnerInner>,
}

impl Owner {
    /// An owner over an existing store.
    pub fn new(id: impl Into<String>, store: Arc<dyn KvStore>) -> Self {
        Self {
            inner: Arc::new(OwnerInner {
                id: id.into(),
                store,
                registry: RwLock::new(Registry::new()),
                views: Mutex::new(ViewCache::default()),
            }),
        }
    }

    /// An owner over a fresh in-memory store.
    pub fn in_memory(id: impl Into<String>) -> Self {
        Self::new(id, Arc::new(MemoryStore::new()))
    }

    /// An owner over the file store for `id` under `config.root_dir`.
    pub fn open(config: &KvConfig, id: &str) -> OwnerResult<Self> {
        let store = config.open_store(id)?;
        info!(id, path = %store.path().display(), "owner opened");
        Ok(Self::new(id, Arc::new(store)))
    }

    pub fn id(&self) -> &str {
        &self.inner.id
    }

    pub fn store(&self) -> &Arc<dyn KvStore> {
        &self.inner.store
    }

    // ---------------------------------------------------------------
    // Declaration
    // ---------------------------------------------------------------

    /// Declare a field with an explicit codec.
    pub fn property<V: Clone + Send + Sync + 'static>(
        &self,
        name: &str,
        codec: Codec<V>,
    ) -> OwnerResult<Property<V>> {
        let property = Property::new(Arc::clone(&self.inner.store), name, codec)?;
        self.declare(&property);
        Ok(property)
    }

    /// Register an externally built property, e.g. one rebound with
    /// [`Property::stored_as`]. Scoped properties are not fields and are
    /// ignored.
    pub fn declare<V: Clone + Send + Sync + 'static>(&self, property: &Property<V>) {
        self.declare_as(property, FieldKind::Scalar);
    }

    fn declare_as<V: Clone + Send + Sync + 'static>(&self, property: &Property<V>, kind: FieldKind) {
        if !property.path().is_base() {
            return;
        }
        self.inner
            .registry
            .write()
            .expect("lock poisoned")
            .declare(FieldDescriptor::for_property(property, kind));
    }

    pub fn int(&self, name: &str, default: i32) -> OwnerResult<Property<i32>> {
        self.property(name, Codec::scalar(default))
    }

    pub fn long(&self, name: &str, default: i64) -> OwnerResult<Property<i64>> {
        self.property(name, Codec::scalar(default))
    }

    pub fn float(&self, name: &str, default: f32) -> OwnerResult<Property<f32>> {
        self.property(name, Codec::scalar(default))
    }

    pub fn double(&self, name: &str, default: f64) -> OwnerResult<Property<f64>> {
        self.property(name, Codec::scalar(default))
    }

    pub fn bool(&self, name: &str, default: bool) -> OwnerResult<Property<bool>> {
        self.property(name, Codec::scalar(default))
    }

    /// A nullable string.
    pub fn string(&self, name: &str) -> OwnerResult<Property<Option<String>>> {
        self.property(name, Codec::nullable())
    }

    pub fn string_or(&self, name: &str, default: impl Into<String>) -> OwnerResult<Property<String>> {
        self.property(name, Codec::scalar(default.into()))
    }

    /// A nullable string set.
    pub fn string_set(&self, name: &str) -> OwnerResult<Property<Option<BTreeSet<String>>>> {
        self.property(name, Codec::nullable())
    }

    pub fn string_set_or(
        &self,
        name: &str,
        default: BTreeSet<String>,
    ) -> OwnerResult<Property<BTreeSet<String>>> {
        self.property(name, Codec::scalar(default))
    }

    /// A nullable byte blob.
    pub fn bytes(&self, name: &str) -> OwnerResult<Property<Option<Vec<u8>>>> {
        self.property(name, Codec::nullable())
    }

    pub fn bytes_or(&self, name: &str, default: Vec<u8>) -> OwnerResult<Property<Vec<u8>>> {
        self.property(name, Codec::scalar(default))
    }

    /// A nullable structured value, stored as JSON bytes.
    pub fn structured<T>(&self, name: &str) -> OwnerResult<Property<Option<T>>>
    where
        T: Serialize + DeserializeOwned + Clone + Send + Sync + 'static,
    {
        self.property(name, Codec::structured())
    }

    pub fn structured_or<T>(&self, name: &str, default: T) -> OwnerResult<Property<T>>
    where
        T: Serialize + DeserializeOwned + Clone + Send + Sync + 'static,
    {
        self.property(name, Codec::structured_or(default))
    }

    // ---------------------------------------------------------------
    // Memoized views
    // ---------------------------------------------------------------

    fn memoized<T, F>(&self, property_name: &str, key: String, kind: FieldKind, create: F) -> OwnerResult<T>
    where
        T: Clone + Send + Sync + 'static,
        F: FnOnce() -> T,
    {
        let mut views = self.inner.views.lock().expect("lock poisoned");
        if let Some(cached) = views.lookup::<T>(&key) {
            return cached.map_err(|actual| OwnerError::KindMismatch {
                field: property_name.to_string(),
                expected: describe::<T>(kind),
                actual,
            });
        }
        let view = create();
        views.insert(key.clone(), kind, view.clone());
        debug!(owner = %self.inner.id, key = %key, %kind, "view created");
        Ok(view)
    }

    /// The map view for `property`, created on first request.
    pub fn map<V: Clone + Send + Sync + 'static>(
        &self,
        property: &Property<V>,
    ) -> OwnerResult<Shared<MapView<V>>> {
        let view = self.memoized(property.name(), property.key(), FieldKind::Map, || {
            Shared::new(MapView::new(property))
        })?;
        self.declare_as(property, FieldKind::Map);
        Ok(view)
    }

    /// The list view for `property`, created on first request.
    pub fn list<V: Clone + Send + Sync + 'static>(
        &self,
        property: &Property<V>,
    ) -> OwnerResult<Shared<ListView<V>>> {
        let view = self.memoized(property.name(), property.key(), FieldKind::List, || {
            Shared::new(ListView::new(property))
        })?;
        self.declare_as(property, FieldKind::List);
        Ok(view)
    }

    /// The observable cell for `property`, created on first request.
    pub fn cell<V: Clone + Send + Sync + 'static>(
        &self,
        property: &Property<V>,
    ) -> OwnerResult<Arc<ObservableCell<V>>> {
        let cell = self.memoized(property.name(), property.key(), FieldKind::Cell, || {
            Arc::new(ObservableCell::new(property.clone()))
        })?;
        self.declare_as(property, FieldKind::Cell);
        Ok(cell)
    }

    /// Number of memoized views.
    pub fn view_count(&self) -> usize {
        self.inner.views.lock().expect("lock poisoned").len()
    }

    // ---------------------------------------------------------------
    // Namespace
    // ---------------------------------------------------------------

    /// Declared field names and kinds, in declaration order.
    pub fn fields(&self) -> Vec<(String, FieldKind)> {
        self.inner
            .registry
            .read()
            .expect("lock poisoned")
            .iter()
            .map(|f| (f.name().to_string(), f.kind()))
            .collect()
    }

    /// Resolve one declared field, or `None` if no such field is declared.
    pub fn resolve(&self, name: &str) -> Option<Resolved> {
        let registry = self.inner.registry.read().expect("lock poisoned");
        let field = registry.get(name)?;
        Some(enumerate::resolve_field(self.inner.store.as_ref(), field))
    }

    /// Every declared field resolved to its current value, keyed by field
    /// name. Nested scopes are expanded into maps.
    pub fn enumerate(&self) -> BTreeMap<String, Resolved> {
        let registry = self.inner.registry.read().expect("lock poisoned");
        let store = self.inner.store.as_ref();
        let all: BTreeMap<String, Resolved> = registry
            .iter()
            .map(|field| (field.name().to_string(), enumerate::resolve_field(store, field)))
            .collect();
        debug!(owner = %self.inner.id, fields = all.len(), "namespace enumerated");
        all
    }

    /// Remove every key in the owner's store. Every declared property reads
    /// its default afterwards.
    pub fn clear_all(&self) -> OwnerResult<()> {
        self.inner.store.clear_all()?;
        info!(owner = %self.inner.id, "namespace cleared");
        Ok(())
    }
}

impl fmt::Debug for Owner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Owner")
            .field("id", &self.inner.id)
            .field("fields", &self.fields())
            .field("views", &self.view_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use keyscope_types::Value;
    use serde::Deserialize;
    use std::sync::atomic::{AtomicI32, Ordering};
    use tempfile::TempDir;

    #[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
    struct User {
        id: i64,
        name: String,
    }

    fn admin() -> User {
        User {
            id: 0,
            name: "Admin".into(),
        }
    }

    fn set_of(items: &[&str]) -> BTreeSet<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    // -----------------------------------------------------------------------
    // Scalar fields
    // -----------------------------------------------------------------------

    #[test]
    fn scalar_defaults_and_writes() {
        let owner = Owner::in_memory("test");
        let i1 = owner.int("i1", 0).unwrap();
        let i2 = owner.int("i2", -1).unwrap();
        let l2 = owner.long("l2", -1).unwrap();
        let b2 = owner.bool("b2", true).unwrap();
        let f2 = owner.float("f2", -1.0).unwrap();
        let d1 = owner.double("d1", 0.0).unwrap();

        assert_eq!(i1.get(), 0);
        assert_eq!(i2.get(), -1);
        assert_eq!(l2.get(), -1);
        assert!(b2.get());
        assert_eq!(f2.get(), -1.0);

        i2.set(6).unwrap();
        l2.set(3).unwrap();
        d1.set(0.5).unwrap();
        assert_eq!(i2.get(), 6);
        assert_eq!(l2.get(), 3);
        assert_eq!(d1.get(), 0.5);
    }

    #[test]
    fn nullable_and_defaulted_objects() {
        let owner = Owner::in_memory("test");
        let s1 = owner.string("s1").unwrap();
        let s2 = owner.string_or("s2", "").unwrap();
        let set2 = owner.string_set_or("set2", BTreeSet::new()).unwrap();
        let bytes2 = owner.bytes_or("bytes2", vec![0x1a]).unwrap();
        let user1 = owner.structured::<User>("user1").unwrap();
        let user2 = owner.structured_or("user2", admin()).unwrap();

        assert_eq!(s1.get(), None);
        assert_eq!(s2.get(), "");
        assert!(set2.get().is_empty());
        assert_eq!(bytes2.get(), vec![0x1a]);
        assert_eq!(user1.get(), None);
        assert_eq!(user2.get(), admin());

        let dylan = User {
            id: 1,
            name: "DylanCai".into(),
        };
        user1.set(Some(dylan.clone())).unwrap();
        set2.set(set_of(&["22", "33"])).unwrap();
        assert_eq!(user1.get(), Some(dylan));
        assert_eq!(set2.get(), set_of(&["22", "33"]));
    }

    #[test]
    fn raw_store_removal() {
        let owner = Owner::in_memory("test");
        let s1 = owner.string("s1").unwrap();
        let s2 = owner.string("s2").unwrap();
        s1.set(Some("1".into())).unwrap();
        s2.set(Some("2".into())).unwrap();
        owner
            .store()
            .remove_many(&["s1".to_string(), "s2".to_string()])
            .unwrap();
        assert!(!owner.store().contains("s1"));
        assert_eq!(s2.get(), None);
    }

    // -----------------------------------------------------------------------
    // Memoized views
    // -----------------------------------------------------------------------

    #[test]
    fn views_are_memoized_per_field() {
        let owner = Owner::in_memory("test");
        let map1 = owner.int("map1", 0).unwrap();
        let first = owner.map(&map1).unwrap();
        let second = owner.map(&map1).unwrap();
        assert!(first.ptr_eq(&second));
        assert_eq!(owner.view_count(), 1);

        first.lock().put("id1", 1).unwrap();
        assert_eq!(second.lock().get("id1").unwrap(), 1);
    }

    #[test]
    fn conflicting_view_kind_is_rejected() {
        let owner = Owner::in_memory("test");
        let field = owner.int("field", 0).unwrap();
        owner.map(&field).unwrap();
        let err = owner.list(&field).unwrap_err();
        assert!(matches!(err, OwnerError::KindMismatch { ref field, .. } if field == "field"));
    }

    #[test]
    fn map_defaults_and_clear() {
        let owner = Owner::in_memory("test");
        let map2 = owner.map(&owner.int("map2", -1).unwrap()).unwrap();
        let mut map2 = map2.lock();

        assert_eq!(map2.get("id1").unwrap(), -1);
        map2.put("id1", 1).unwrap();
        map2.put("id2", 2).unwrap();
        assert_eq!(map2.get("id2").unwrap(), 2);
        map2.clear().unwrap();
        assert_eq!(map2.get("id1").unwrap(), -1);
        assert_eq!(map2.len(), 0);
    }

    #[test]
    fn map_entry_removal_and_merge() {
        let owner = Owner::in_memory("test");
        let map1 = owner.map(&owner.int("map1", 0).unwrap()).unwrap();
        let mut map1 = map1.lock();
        map1.put("id1", 1).unwrap();
        map1.put("id2", 2).unwrap();

        let mut entries = map1.entries();
        while let Some(entry) = entries.next_entry() {
            if entry.key() == "id1" {
                entry.remove().unwrap();
            }
        }
        assert_eq!(map1.get("id1").unwrap(), 0);
        assert_eq!(map1.get("id2").unwrap(), 2);
        assert_eq!(map1.len(), 1);

        map1.remove_if(|key, _| key == "id2").unwrap();
        assert_eq!(map1.len(), 0);

        map1.put("merge", 1).unwrap();
        map1.merge("merge", 2, |old, new| Some(old + new)).unwrap();
        assert_eq!(map1.get("merge").unwrap(), 3);
    }

    #[test]
    fn cell_notifies_and_resets() {
        let owner = Owner::in_memory("test");
        let flow2 = owner.cell(&owner.int("flow2", -1).unwrap()).unwrap();
        let last = Arc::new(AtomicI32::new(i32::MIN));
        let sink = Arc::clone(&last);
        flow2.subscribe(move |v| sink.store(*v, Ordering::SeqCst));

        assert_eq!(flow2.get_value(), -1);
        flow2.set_value(6).unwrap();
        assert_eq!(flow2.get_value(), 6);
        assert_eq!(last.load(Ordering::SeqCst), 6);

        owner.clear_all().unwrap();
        assert_eq!(flow2.get_value(), -1);
    }

    // -----------------------------------------------------------------------
    // Enumeration
    // -----------------------------------------------------------------------

    #[test]
    fn enumerate_resolves_every_declared_field() {
        let owner = Owner::in_memory("test");
        owner.int("i1", 0).unwrap();
        owner.int("i2", -1).unwrap();
        owner.long("l1", 0).unwrap();
        owner.bool("b2", true).unwrap();
        owner.string("s1").unwrap();
        owner.string_or("s2", "").unwrap();
        owner.bytes_or("bytes2", vec![0x1a]).unwrap();
        owner.structured::<User>("user1").unwrap();
        owner.structured_or("user2", admin()).unwrap();
        owner.cell(&owner.int("flow2", -1).unwrap()).unwrap();
        let map1 = owner.map(&owner.int("map1", 0).unwrap()).unwrap();
        owner.map(&owner.int("map2", -1).unwrap()).unwrap();
        owner.list(&owner.int("list1", 0).unwrap()).unwrap();

        map1.lock().put("id1", 1).unwrap();
        map1.lock().put("id2", 2).unwrap();

        let all = owner.enumerate();
        assert_eq!(all.len(), 13);
        assert_eq!(all["i2"], Resolved::Value(Value::I32(-1)));
        assert_eq!(all["l1"], Resolved::Value(Value::I64(0)));
        assert_eq!(all["b2"], Resolved::Value(Value::Bool(true)));
        assert_eq!(all["s1"], Resolved::Null);
        assert_eq!(all["s2"], Resolved::Value(Value::from("")));
        assert_eq!(all["bytes2"], Resolved::Value(Value::Bytes(vec![0x1a])));
        assert_eq!(all["user1"], Resolved::Null);
        assert_eq!(
            all["user2"],
            Resolved::Structured(serde_json::json!({"id": 0, "name": "Admin"}))
        );
        assert_eq!(all["flow2"], Resolved::Value(Value::I32(-1)));
        assert_eq!(
            all["map1"],
            Resolved::Map(BTreeMap::from([
                ("id1".to_string(), Resolved::Value(Value::I32(1))),
                ("id2".to_string(), Resolved::Value(Value::I32(2))),
            ]))
        );
        assert_eq!(all["map2"], Resolved::Map(BTreeMap::new()));
        assert_eq!(all["list1"], Resolved::List(Vec::new()));
    }

    #[test]
    fn enumerate_expands_nested_scopes() {
        let owner = Owner::in_memory("test");
        let scores = owner.int("scores", 0).unwrap();
        owner.int("plain", 5).unwrap();
        scores.with_key("alice").unwrap().with_key("math").unwrap().set(90).unwrap();
        scores.with_key("alice").unwrap().with_key("art").unwrap().set(70).unwrap();
        scores.with_key("bob").unwrap().set(60).unwrap();

        let all = owner.enumerate();
        assert_eq!(all.len(), 2);
        let tree = &all["scores"];
        assert_eq!(
            tree.get("alice").and_then(|a| a.get("math")),
            Some(&Resolved::Value(Value::I32(90)))
        );
        assert_eq!(tree.get("alice").and_then(|a| a.get("art")),
            Some(&Resolved::Value(Value::I32(70)))
        );
        assert_eq!(tree.get("bob"), Some(&Resolved::Value(Value::I32(60))));
        assert_eq!(all["plain"], Resolved::Value(Value::I32(5)));
    }

    #[test]
    fn enumerate_list_field() {
        let owner = Owner::in_memory("test");
        let tags = owner.list(&owner.string_or("tags", "").unwrap()).unwrap();
        tags.lock().extend(["a".to_string(), "b".to_string()]).unwrap();
        assert_eq!(
            owner.resolve("tags"),
            Some(Resolved::List(vec![
                Resolved::Value(Value::from("a")),
                Resolved::Value(Value::from("b")),
            ]))
        );
        assert_eq!(owner.resolve("missing"), None);
    }

    #[test]
    fn enumerate_list_under_scope() {
        let owner = Owner::in_memory("test");
        let tags = owner.int("tags", 0).unwrap();
        let scoped = owner.list(&tags.with_key("a").unwrap()).unwrap();
        scoped.lock().extend([4, 5]).unwrap();

        let expected = Resolved::List(vec![
            Resolved::Value(Value::I32(4)),
            Resolved::Value(Value::I32(5)),
        ]);
        let all = owner.enumerate();
        assert_eq!(all.get("tags").and_then(|t| t.get("a")), Some(&expected));
    }

    #[test]
    fn stored_as_field_enumerates_under_its_name() {
        let owner = Owner::in_memory("test");
        let counter = owner.long("counter", 0).unwrap().stored_as("legacy_counter").unwrap();
        owner.declare(&counter);
        counter.set(4).unwrap();
        assert_eq!(owner.resolve("counter"), Some(Resolved::Value(Value::I64(4))));
    }

    // -----------------------------------------------------------------------
    // Reset and persistence
    // -----------------------------------------------------------------------

    #[test]
    fn clear_all_resets_every_kind() {
        let owner = Owner::in_memory("test");
        let i2 = owner.int("i2", -1).unwrap();
        let s1 = owner.string("s1").unwrap();
        let map1 = owner.map(&owner.int("map1", 0).unwrap()).unwrap();
        let list1 = owner.list(&owner.int("list1", 0).unwrap()).unwrap();
        let nested = owner.int("nested", 0).unwrap().with_key("a").unwrap();

        i2.set(6).unwrap();
        s1.set(Some("x".into())).unwrap();
        map1.lock().put("id1", 3).unwrap();
        list1.lock().extend([1, 2]).unwrap();
        nested.set(9).unwrap();

        owner.clear_all().unwrap();

        assert_eq!(i2.get(), -1);
        assert_eq!(s1.get(), None);
        assert_eq!(map1.lock().get("id1").unwrap(), 0);
        assert_eq!(map1.lock().len(), 0);
        assert!(list1.lock().is_empty());
        assert_eq!(nested.get(), 0);
    }

    #[test]
    fn file_backed_owner_persists() {
        let dir = TempDir::new().unwrap();
        let config = KvConfig::with_root(dir.path());
        {
            let owner = Owner::open(&config, "prefs").unwrap();
            owner.int("i1", 0).unwrap().set(6).unwrap();
            let map1 = owner.map(&owner.int("map1", 0).unwrap()).unwrap();
            map1.lock().put("id1", 1).unwrap();
        }

        let owner = Owner::open(&config, "prefs").unwrap();
        assert_eq!(owner.int("i1", 0).unwrap().get(), 6);
        let map1 = owner.map(&owner.int("map1", 0).unwrap()).unwrap();
        assert_eq!(map1.lock().keys(), set_of(&["id1"]));
    }

    #[test]
    fn invalid_store_id_is_rejected() {
        let dir = TempDir::new().unwrap();
        let config = KvConfig::with_root(dir.path());
        assert!(matches!(
            Owner::open(&config, "../escape"),
            Err(OwnerError::Store(_))
        ));
    }
}
