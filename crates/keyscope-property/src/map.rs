//! Map view over prefixed store keys.
//!
//! A map declared on property `p` stores each entry `k` at `p$k` and the set
//! of live keys at `p$key`. The index is the source of truth for membership:
//! an entry exists iff its key is in the index.
//!
//! Write ordering keeps the index a subset of what is readable:
//!
//! | Operation | First write | Second write |
//! |-----------|-------------|--------------|
//! | put       | child value | index        |
//! | remove    | index       | child value  |
//! | clear     | child values| index        |

use std::collections::{btree_map, BTreeMap, BTreeSet};
use std::fmt;
use std::sync::Arc;

use keyscope_store::KvStore;
use keyscope_types::{KeyPath, Value};
use tracing::debug;

use crate::codec::Codec;
use crate::error::PropertyResult;
use crate::property::Property;
use crate::scope;

/// A mutable map view persisted under one key prefix.
///
/// Reads go to the store on each call. The in-memory mirror backing
/// [`MapView::iter`] and [`MapView::entries`] is rebuilt from the store at the
/// start of every such call.
pub struct MapView<V> {
    store: Arc<dyn KvStore>,
    prefix: KeyPath,
    codec: Codec<V>,
    mirror: BTreeMap<String, V>,
}

impl<V: Clone + Send + Sync + 'static> MapView<V> {
    /// A view over the map stored under `property`'s key.
    pub fn new(property: &Property<V>) -> Self {
        let mut view = Self {
            store: Arc::clone(property.store()),
            prefix: property.path().clone(),
            codec: property.codec().clone(),
            mirror: BTreeMap::new(),
        };
        view.refresh();
        view
    }

    pub fn prefix(&self) -> &KeyPath {
        &self.prefix
    }

    /// Rebuild the mirror from the persisted index.
    pub fn refresh(&mut self) {
        self.mirror = self.to_map();
        debug!(prefix = %self.prefix, entries = self.mirror.len(), "map view refreshed");
    }

    fn index(&self) -> BTreeSet<String> {
        self.store
            .decode_string_set(&self.prefix.index_key())
            .unwrap_or_default()
    }

    /// Persist `index`, dropping the index key (and unlinking the prefix from
    /// its parents) when it is empty.
    fn write_index(&self, index: BTreeSet<String>) -> PropertyResult<()> {
        let index_key = self.prefix.index_key();
        if index.is_empty() {
            self.store.remove(&index_key)?;
            scope::unlink(self.store.as_ref(), &self.prefix)
        } else {
            self.store.set(&index_key, Value::StrSet(index))?;
            scope::link(self.store.as_ref(), &self.prefix)
        }
    }

    fn decode_child(&self, child_key: &str) -> V {
        self.codec.decode(self.store.get(child_key))
    }

    fn write_child(&self, child_key: &str, value: &V) -> PropertyResult<()> {
        match self.codec.encode(value)? {
            Some(raw) => self.store.set(child_key, raw)?,
            None => self.store.remove(child_key)?,
        }
        Ok(())
    }

    // ---------------------------------------------------------------
    // Reads
    // ---------------------------------------------------------------

    /// The persisted key set.
    pub fn keys(&self) -> BTreeSet<String> {
        self.index()
    }

    pub fn len(&self) -> usize {
        self.index().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.index().contains(key)
    }

    /// Decoded values of every indexed key, in ascending key order.
    pub fn values(&self) -> Vec<V> {
        self.to_map().into_values().collect()
    }

    /// The value for `key`, or `None` if the key is not in the index.
    pub fn find(&self, key: &str) -> PropertyResult<Option<V>> {
        let child_key = self.prefix.child_key(key)?;
        if !self.contains_key(key) {
            return Ok(None);
        }
        Ok(Some(self.decode_child(&child_key)))
    }

    /// The value for `key`, or the codec default if the key is not indexed.
    pub fn get(&self, key: &str) -> PropertyResult<V> {
        Ok(self.find(key)?.unwrap_or_else(|| self.codec.absent()))
    }

    /// Independent snapshot of every entry, decoded from the store.
    pub fn to_map(&self) -> BTreeMap<String, V> {
        self.index()
            .into_iter()
            .filter_map(|key| {
                let child_key = self.prefix.child_key(&key).ok()?;
                let value = self.decode_child(&child_key);
                Some((key, value))
            })
            .collect()
    }

    /// Refresh, then iterate the mirror in ascending key order.
    pub fn iter(&mut self) -> btree_map::Iter<'_, String, V> {
        self.refresh();
        self.mirror.iter()
    }

    // ---------------------------------------------------------------
    // Writes
    // ---------------------------------------------------------------

    /// Store `value` under `key`, returning the previous value if any.
    pub fn put(&mut self, key: impl Into<String>, value: V) -> PropertyResult<Option<V>> {
        let key = key.into();
        let child_key = self.prefix.child_key(&key)?;
        let mut index = self.index();
        let previous = index
            .contains(&key)
            .then(|| self.decode_child(&child_key));

        self.write_child(&child_key, &value)?;
        if index.insert(key.clone()) {
            self.write_index(index)?;
        }
        debug!(prefix = %self.prefix, key = %key, "map put");
        self.mirror.insert(key, value);
        Ok(previous)
    }

    /// Put every pair from `entries`.
    pub fn put_all<K, I>(&mut self, entries: I) -> PropertyResult<()>
    where
        K: Into<String>,
        I: IntoIterator<Item = (K, V)>,
    {
        entries
            .into_iter()
            .try_for_each(|(key, value)| self.put(key, value).map(drop))
    }

    /// Put only if `key` is absent; returns the existing value otherwise.
    pub fn put_if_absent(&mut self, key: impl Into<String>, value: V) -> PropertyResult<Option<V>> {
        let key = key.into();
        match self.find(&key)? {
            Some(existing) => Ok(Some(existing)),
            None => self.put(key, value),
        }
    }

    /// Remove `key`, returning its value if it was present.
    pub fn remove(&mut self, key: &str) -> PropertyResult<Option<V>> {
        let child_key = self.prefix.child_key(key)?;
        let mut index = self.index();
        if !index.remove(key) {
            self.mirror.remove(key);
            return Ok(None);
        }
        let previous = self.decode_child(&child_key);

        self.write_index(index)?;
        self.store.remove(&child_key)?;
        debug!(prefix = %self.prefix, key, "map remove");
        self.mirror.remove(key);
        Ok(Some(previous))
    }

    /// Remove every entry and the index key itself.
    pub fn clear(&mut self) -> PropertyResult<()> {
        let index = self.index();
        let child_keys = index
            .iter()
            .map(|key| self.prefix.child_key(key))
            .collect::<Result<Vec<_>, _>>()?;
        self.store.remove_many(&child_keys)?;
        self.write_index(BTreeSet::new())?;
        debug!(prefix = %self.prefix, removed = child_keys.len(), "map cleared");
        self.mirror.clear();
        Ok(())
    }

    /// Combine `value` into the entry for `key`.
    ///
    /// If the key is absent, `value` is stored as is. Otherwise `remap` is
    /// called with the old and new values; returning `None` removes the key.
    /// Returns the resulting value.
    pub fn merge<F>(&mut self, key: impl Into<String>, value: V, remap: F) -> PropertyResult<Option<V>>
    where
        F: FnOnce(V, V) -> Option<V>,
    {
        let key = key.into();
        match self.find(&key)? {
            None => {
                self.put(key, value.clone())?;
                Ok(Some(value))
            }
            Some(old) => match remap(old, value) {
                Some(merged) => {
                    self.put(key, merged.clone())?;
                    Ok(Some(merged))
                }
                None => {
                    self.remove(&key)?;
                    Ok(None)
                }
            },
        }
    }

    /// Replace the value of an existing key; returns the old value, or `None`
    /// (writing nothing) if the key is absent.
    pub fn replace(&mut self, key: &str, value: V) -> PropertyResult<Option<V>> {
        if !self.contains_key(key) {
            return Ok(None);
        }
        self.put(key, value)
    }

    /// Rewrite every entry through `f`.
    pub fn replace_all<F>(&mut self, mut f: F) -> PropertyResult<()>
    where
        F: FnMut(&str, V) -> V,
    {
        for (key, value) in self.to_map() {
            let updated = f(&key, value);
            self.put(key, updated)?;
        }
        Ok(())
    }

    /// Keep only the entries for which `keep` returns `true`.
    pub fn retain<F>(&mut self, mut keep: F) -> PropertyResult<()>
    where
        F: FnMut(&str, &V) -> bool,
    {
        self.remove_if(|key, value| !keep(key, value)).map(drop)
    }

    /// Remove every entry matching `predicate`; returns whether any was removed.
    pub fn remove_if<F>(&mut self, mut predicate: F) -> PropertyResult<bool>
    where
        F: FnMut(&str, &V) -> bool,
    {
        let doomed: Vec<String> = self
            .to_map()
            .into_iter()
            .filter(|(key, value)| predicate(key, value))
            .map(|(key, _)| key)
            .collect();
        for key in &doomed {
            self.remove(key)?;
        }
        Ok(!doomed.is_empty())
    }

    /// Refresh, then walk entries with the ability to rewrite or remove the
    /// current one.
    pub fn entries(&mut self) -> Entries<'_, V> {
        self.refresh();
        let keys: Vec<String> = self.mirror.keys().cloned().collect();
        Entries {
            map: self,
            keys: keys.into_iter(),
        }
    }
}

impl<V: Clone + PartialEq + Send + Sync + 'static> MapView<V> {
    /// Whether any entry holds `value`.
    pub fn contains_value(&self, value: &V) -> bool {
        self.to_map().values().any(|v| v == value)
    }

    /// Remove `key` only if it currently maps to `expected`.
    pub fn remove_if_eq(&mut self, key: &str, expected: &V) -> PropertyResult<bool> {
        match self.find(key)? {
            Some(current) if current == *expected => {
                self.remove(key)?;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    /// Replace `key` only if it currently maps to `expected`.
    pub fn replace_if_eq(&mut self, key: &str, expected: &V, value: V) -> PropertyResult<bool> {
        match self.find(key)? {
            Some(current) if current == *expected => {
                self.put(key, value)?;
                Ok(true)
            }
            _ => Ok(false),
        }
    }
}

impl<V: fmt::Debug> fmt::Debug for MapView<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MapView")
            .field("prefix", &self.prefix)
            .field("entries", &self.mirror)
            .finish()
    }
}

/// Cursor over a map's entries, yielding one mutable entry at a time.
pub struct Entries<'a, V> {
    map: &'a mut MapView<V>,
    keys: std::vec::IntoIter<String>,
}

impl<'a, V: Clone + Send + Sync + 'static> Entries<'a, V> {
    /// Advance to the next entry still present in the map.
    pub fn next_entry(&mut self) -> Option<EntryMut<'_, V>> {
        loop {
            let key = self.keys.next()?;
            if let Some(value) = self.map.mirror.get(&key).cloned() {
                return Some(EntryMut {
                    map: &mut *self.map,
                    key,
                    value,
                });
            }
        }
    }
}

/// One map entry reached through [`Entries`].
pub struct EntryMut<'a, V> {
    map: &'a mut MapView<V>,
    key: String,
    value: V,
}

impl<'a, V: Clone + Send + Sync + 'static> EntryMut<'a, V> {
    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn value(&self) -> &V {
        &self.value
    }

    /// Overwrite this entry's value, returning the old one.
    pub fn set_value(&mut self, value: V) -> PropertyResult<V> {
        self.map.put(self.key.clone(), value.clone())?;
        Ok(std::mem::replace(&mut self.value, value))
    }

    /// Remove this entry from the map.
    pub fn remove(self) -> PropertyResult<V> {
        self.map.remove(&self.key)?;
        Ok(self.value)
    }
}
