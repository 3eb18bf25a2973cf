//! List view over densely indexed store keys.
//!
//! A list declared on property `p` stores its length at `p$size` and element
//! `i` at `p$i` for `0 <= i < size`. Every structural mutation rewrites the
//! whole persisted representation: the new size, every element at its
//! (possibly shifted) index, then removal of the stale tail. Element keys are
//! therefore always gap-free. An empty list has no keys at all.

use std::cmp::Ordering;
use std::fmt;
use std::ops::Range;
use std::slice;
use std::sync::Arc;

use keyscope_store::KvStore;
use keyscope_types::{KeyPath, Value};
use tracing::debug;

use crate::codec::Codec;
use crate::error::{PropertyError, PropertyResult};
use crate::property::Property;
use crate::scope;

fn check_index(index: usize, len: usize) -> PropertyResult<()> {
    if index < len {
        Ok(())
    } else {
        Err(PropertyError::IndexOutOfRange { index, len })
    }
}

fn check_position(index: usize, len: usize) -> PropertyResult<()> {
    if index <= len {
        Ok(())
    } else {
        Err(PropertyError::IndexOutOfRange { index, len })
    }
}

/// A mutable list view persisted under one key prefix.
///
/// Positional reads go to the store. Mutations refresh the in-memory mirror
/// first, apply the change to it, then persist the mirror.
pub struct ListView<V> {
    store: Arc<dyn KvStore>,
    prefix: KeyPath,
    codec: Codec<V>,
    mirror: Vec<V>,
}

impl<V: Clone + Send + Sync + 'static> ListView<V> {
    /// A view over the list stored under `property`'s key.
    pub fn new(property: &Property<V>) -> Self {
        let mut view = Self {
            store: Arc::clone(property.store()),
            prefix: property.path().clone(),
            codec: property.codec().clone(),
            mirror: Vec::new(),
        };
        view.refresh();
        view
    }

    pub fn prefix(&self) -> &KeyPath {
        &self.prefix
    }

    /// Rebuild the mirror from the persisted elements.
    pub fn refresh(&mut self) {
        self.mirror = self.to_vec();
        debug!(prefix = %self.prefix, len = self.mirror.len(), "list view refreshed");
    }

    fn persisted_len(&self) -> usize {
        usize::try_from(self.store.decode_i32(&self.prefix.size_key(), 0)).unwrap_or(0)
    }

    fn decode_element(&self, index: usize) -> V {
        self.codec.decode(self.store.get(&self.prefix.element_key(index)))
    }

    fn write_element(&self, index: usize, value: &V) -> PropertyResult<()> {
        let key = self.prefix.element_key(index);
        match self.codec.encode(value)? {
            Some(raw) => self.store.set(&key, raw)?,
            None => self.store.remove(&key)?,
        }
        Ok(())
    }

    /// Rewrite size and every element from the mirror, then drop the tail.
    fn persist(&self) -> PropertyResult<()> {
        let old_len = self.persisted_len();
        let new_len = self.mirror.len();
        if new_len == 0 {
            return self.remove_persisted(old_len);
        }

        let size = i32::try_from(new_len).map_err(|_| PropertyError::IndexOutOfRange {
            index: new_len,
            len: i32::MAX as usize,
        })?;
        self.store.set(&self.prefix.size_key(), Value::I32(size))?;
        for (index, value) in self.mirror.iter().enumerate() {
            self.write_element(index, value)?;
        }
        if old_len > new_len {
            let stale: Vec<String> = (new_len..old_len)
                .map(|i| self.prefix.element_key(i))
                .collect();
            self.store.remove_many(&stale)?;
        }
        scope::link(self.store.as_ref(), &self.prefix)?;
        debug!(prefix = %self.prefix, old_len, new_len, "list persisted");
        Ok(())
    }

    fn remove_persisted(&self, old_len: usize) -> PropertyResult<()> {
        let mut keys: Vec<String> = (0..old_len).map(|i| self.prefix.element_key(i)).collect();
        keys.push(self.prefix.size_key());
        self.store.remove_many(&keys)?;
        scope::unlink(self.store.as_ref(), &self.prefix)
    }

    // ---------------------------------------------------------------
    // Reads
    // ---------------------------------------------------------------

    /// Persisted element count.
    pub fn len(&self) -> usize {
        self.persisted_len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Element at `index`, decoded from the store.
    pub fn get(&self, index: usize) -> PropertyResult<V> {
        check_index(index, self.len())?;
        Ok(self.decode_element(index))
    }

    /// Independent snapshot of every element.
    pub fn to_vec(&self) -> Vec<V> {
        (0..self.persisted_len())
            .map(|i| self.decode_element(i))
            .collect()
    }

    /// Refresh, then iterate the mirror front to back.
    pub fn iter(&mut self) -> slice::Iter<'_, V> {
        self.refresh();
        self.mirror.iter()
    }

    // ---------------------------------------------------------------
    // Writes
    // ---------------------------------------------------------------

    /// Replace the element at `index`, returning the old one.
    pub fn set(&mut self, index: usize, value: V) -> PropertyResult<V> {
        self.refresh();
        check_index(index, self.mirror.len())?;
        self.write_element(index, &value)?;
        Ok(std::mem::replace(&mut self.mirror[index], value))
    }

    /// Append `value`.
    pub fn push(&mut self, value: V) -> PropertyResult<()> {
        self.refresh();
        self.mirror.push(value);
        self.persist()
    }

    /// Insert `value` at `index`, shifting later elements right.
    pub fn insert(&mut self, index: usize, value: V) -> PropertyResult<()> {
        self.refresh();
        check_position(index, self.mirror.len())?;
        self.mirror.insert(index, value);
        self.persist()
    }

    /// Append every value; returns whether anything was added.
    pub fn extend<I: IntoIterator<Item = V>>(&mut self, values: I) -> PropertyResult<bool> {
        self.refresh();
        let before = self.mirror.len();
        self.mirror.extend(values);
        if self.mirror.len() == before {
            return Ok(false);
        }
        self.persist()?;
        Ok(true)
    }

    /// Insert every value starting at `index`; returns whether anything was
    /// inserted.
    pub fn insert_all<I: IntoIterator<Item = V>>(
        &mut self,
        index: usize,
        values: I,
    ) -> PropertyResult<bool> {
        self.refresh();
        check_position(index, self.mirror.len())?;
        let before = self.mirror.len();
        let tail = self.mirror.split_off(index);
        self.mirror.extend(values);
        self.mirror.extend(tail);
        if self.mirror.len() == before {
            return Ok(false);
        }
        self.persist()?;
        Ok(true)
    }

    /// Remove and return the element at `index`.
    pub fn remove_at(&mut self, index: usize) -> PropertyResult<V> {
        self.refresh();
        check_index(index, self.mirror.len())?;
        let removed = self.mirror.remove(index);
        self.persist()?;
        Ok(removed)
    }

    /// Remove every element matching `predicate`; returns whether any was
    /// removed.
    pub fn remove_if<F: FnMut(&V) -> bool>(&mut self, mut predicate: F) -> PropertyResult<bool> {
        self.refresh();
        let before = self.mirror.len();
        self.mirror.retain(|v| !predicate(v));
        if self.mirror.len() == before {
            return Ok(false);
        }
        self.persist()?;
        Ok(true)
    }

    /// Keep only elements matching `keep`; returns whether any was removed.
    pub fn retain<F: FnMut(&V) -> bool>(&mut self, mut keep: F) -> PropertyResult<bool> {
        self.remove_if(|v| !keep(v))
    }

    /// Remove every element and the size key.
    pub fn clear(&mut self) -> PropertyResult<()> {
        let old_len = self.persisted_len();
        self.remove_persisted(old_len)?;
        self.mirror.clear();
        debug!(prefix = %self.prefix, removed = old_len, "list cleared");
        Ok(())
    }

    /// Rewrite every element through `f`.
    pub fn replace_all<F: FnMut(V) -> V>(&mut self, f: F) -> PropertyResult<()> {
        self.refresh();
        let rewritten: Vec<V> = std::mem::take(&mut self.mirror).into_iter().map(f).collect();
        self.mirror = rewritten;
        self.persist()
    }

    /// Stable-sort the list with `compare`.
    pub fn sort_by<F>(&mut self, compare: F) -> PropertyResult<()>
    where
        F: FnMut(&V, &V) -> Ordering,
    {
        self.refresh();
        self.mirror.sort_by(compare);
        self.persist()
    }

    /// A bidirectional cursor positioned before the first element.
    pub fn cursor(&mut self) -> ListCursor<'_, V> {
        self.refresh();
        ListCursor {
            list: self,
            next: 0,
            last: None,
        }
    }

    /// A bidirectional cursor positioned before element `index`.
    pub fn cursor_at(&mut self, index: usize) -> PropertyResult<ListCursor<'_, V>> {
        self.refresh();
        check_position(index, self.mirror.len())?;
        Ok(ListCursor {
            list: self,
            next: index,
            last: None,
        })
    }

    /// A view of `range` whose mutations write through to this list.
    pub fn sub_list(&mut self, range: Range<usize>) -> PropertyResult<SubList<'_, V>> {
        self.refresh();
        let len = self.mirror.len();
        check_position(range.end, len)?;
        check_position(range.start, range.end)?;
        Ok(SubList {
            list: self,
            start: range.start,
            end: range.end,
        })
    }
}

impl<V: Clone + PartialEq + Send + Sync + 'static> ListView<V> {
    pub fn contains(&self, value: &V) -> bool {
        self.index_of(value).is_some()
    }

    pub fn index_of(&self, value: &V) -> Option<usize> {
        self.to_vec().iter().position(|v| v == value)
    }

    pub fn last_index_of(&self, value: &V) -> Option<usize> {
        self.to_vec().iter().rposition(|v| v == value)
    }

    /// Remove the first occurrence of `value`.
    pub fn remove_item(&mut self, value: &V) -> PropertyResult<bool> {
        self.refresh();
        let Some(index) = self.mirror.iter().position(|v| v == value) else {
            return Ok(false);
        };
        self.mirror.remove(index);
        self.persist()?;
        Ok(true)
    }

    /// Remove every element contained in `values`.
    pub fn remove_all(&mut self, values: &[V]) -> PropertyResult<bool> {
        self.remove_if(|v| values.contains(v))
    }

    /// Keep only elements contained in `values`.
    pub fn retain_all(&mut self, values: &[V]) -> PropertyResult<bool> {
        self.remove_if(|v| !values.contains(v))
    }
}

impl<V: fmt::Debug> fmt::Debug for ListView<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ListView")
            .field("prefix", &self.prefix)
            .field("elements", &self.mirror)
            .finish()
    }
}

/// Bidirectional cursor over a [`ListView`] supporting positional insert,
/// remove and replace.
///
/// `remove` and `set` act on the element most recently returned by `next`
/// or `previous`; an `insert` or `remove` clears that element.
pub struct ListCursor<'a, V> {
    list: &'a mut ListView<V>,
    next: usize,
    last: Option<usize>,
}

impl<'a, V: Clone + Send + Sync + 'static> ListCursor<'a, V> {
    pub fn has_next(&self) -> bool {
        self.next < self.list.mirror.len()
    }

    pub fn has_previous(&self) -> bool {
        self.next > 0
    }

    /// Index of the element `next` would return.
    pub fn next_index(&self) -> usize {
        self.next
    }

    /// Index of the element `previous` would return.
    pub fn previous_index(&self) -> Option<usize> {
        self.next.checked_sub(1)
    }

    pub fn next(&mut self) -> Option<V> {
        let value = self.list.mirror.get(self.next)?.clone();
        self.last = Some(self.next);
        self.next += 1;
        Some(value)
    }

    pub fn previous(&mut self) -> Option<V> {
        let index = self.next.checked_sub(1)?;
        let value = self.list.mirror[index].clone();
        self.next = index;
        self.last = Some(index);
        Some(value)
    }

    /// Remove the element last returned by `next`/`previous`.
    pub fn remove(&mut self) -> PropertyResult<V> {
        let index = self.last.take().ok_or(PropertyError::NoCurrentElement)?;
        let removed = self.list.mirror.remove(index);
        if index < self.next {
            self.next -= 1;
        }
        self.list.persist()?;
        Ok(removed)
    }

    /// Replace the element last returned by `next`/`previous`.
    pub fn set(&mut self, value: V) -> PropertyResult<V> {
        let index = self.last.ok_or(PropertyError::NoCurrentElement)?;
        self.list.write_element(index, &value)?;
        Ok(std::mem::replace(&mut self.list.mirror[index], value))
    }

    /// Insert before the element `next` would return.
    pub fn insert(&mut self, value: V) -> PropertyResult<()> {
        self.list.mirror.insert(self.next, value);
        self.next += 1;
        self.last = None;
        self.list.persist()
    }
}

/// A window `[start, end)` onto a [`ListView`].
///
/// Indices are relative to `start`. Structural changes resize the window
/// and persist the whole underlying list.
pub struct SubList<'a, V> {
    list: &'a mut ListView<V>,
    start: usize,
    end: usize,
}

impl<'a, V: Clone + Send + Sync + 'static> SubList<'a, V> {
    pub fn len(&self) -> usize {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }

    pub fn get(&self, index: usize) -> PropertyResult<V> {
        check_index(index, self.len())?;
        Ok(self.list.mirror[self.start + index].clone())
    }

    pub fn to_vec(&self) -> Vec<V> {
        self.list.mirror[self.start..self.end].to_vec()
    }

    pub fn set(&mut self, index: usize, value: V) -> PropertyResult<V> {
        check_index(index, self.len())?;
        let absolute = self.start + index;
        self.list.write_element(absolute, &value)?;
        Ok(std::mem::replace(&mut self.list.mirror[absolute], value))
    }

    /// Append at the end of the window.
    pub fn push(&mut self, value: V) -> PropertyResult<()> {
        self.list.mirror.insert(self.end, value);
        self.end += 1;
        self.list.persist()
    }

    pub fn insert(&mut self, index: usize, value: V) -> PropertyResult<()> {
        check_position(index, self.len())?;
        self.list.mirror.insert(self.start + index, value);
        self.end += 1;
        self.list.persist()
    }

    pub fn remove_at(&mut self, index: usize) -> PropertyResult<V> {
        check_index(index, self.len())?;
        let removed = self.list.mirror.remove(self.start + index);
        self.end -= 1;
        self.list.persist()?;
        Ok(removed)
    }

    /// Remove window elements matching `predicate`.
    pub fn remove_if<F: FnMut(&V) -> bool>(&mut self, mut predicate: F) -> PropertyResult<bool> {
        let tail = self.list.mirror.split_off(self.end);
        let window = self.list.mirror.split_off(self.start);
        self.list
            .mirror
            .extend(window.into_iter().filter(|v| !predicate(v)));
        let removed = self.end - self.list.mirror.len();
        self.end = self.list.mirror.len();
        self.list.mirror.extend(tail);
        if removed == 0 {
            return Ok(false);
        }
        self.list.persist()?;
        Ok(true)
    }

    /// Remove every element in the window.
    pub fn clear(&mut self) -> PropertyResult<()> {
        let tail = self.list.mirror.split_off(self.end);
        self.list.mirror.truncate(self.start);
        self.list.mirror.extend(tail);
        self.end = self.start;
        self.list.persist()
    }
}
