//! Parent-index maintenance for scoped keys.
//!
//! Every scoped key `p$s` is recorded as segment `s` in the index at `p$key`,
//! recursively up to the base, so that enumeration can discover nested
//! entries. Linking walks outward adding missing segments; unlinking walks
//! outward removing a segment once its child holds nothing, and drops an
//! index key when its set becomes empty.

use keyscope_store::KvStore;
use keyscope_types::{KeyPath, Value};
use tracing::debug;

use crate::error::PropertyResult;

/// Record every segment of `path` in its parent's index.
pub(crate) fn link(store: &dyn KvStore, path: &KeyPath) -> PropertyResult<()> {
    for (parent, segment) in path.ancestors() {
        let index_key = parent.index_key();
        let mut index = store.decode_string_set(&index_key).unwrap_or_default();
        if index.insert(segment.to_string()) {
            store.set(&index_key, Value::StrSet(index))?;
            debug!(index = %index_key, segment, "linked scope segment");
        }
    }
    Ok(())
}

/// Drop `path` from its parent's index if it no longer holds a value,
/// children or list elements, pruning emptied indices upward.
pub(crate) fn unlink(store: &dyn KvStore, path: &KeyPath) -> PropertyResult<()> {
    let mut child = path;
    while let (Some(parent), Some(segment)) = (child.parent(), child.segment()) {
        if store.contains(&child.resolve())
            || store.contains(&child.index_key())
            || store.contains(&child.size_key())
        {
            break;
        }
        let index_key = parent.index_key();
        let Some(mut index) = store.decode_string_set(&index_key) else {
            break;
        };
        if !index.remove(segment) {
            break;
        }
        debug!(index = %index_key, segment, "unlinked scope segment");
        if !index.is_empty() {
            store.set(&index_key, Value::StrSet(index))?;
            break;
        }
        store.remove(&index_key)?;
        child = parent;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use keyscope_store::MemoryStore;
    use std::collections::BTreeSet;

    fn set_of(items: &[&str]) -> BTreeSet<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn link_registers_every_level() {
        let store = MemoryStore::new();
        let path = KeyPath::base("tree").unwrap().scope("a").unwrap().scope("b").unwrap();
        link(&store, &path).unwrap();
        assert_eq!(store.decode_string_set("tree$key"), Some(set_of(&["a"])));
        assert_eq!(store.decode_string_set("tree$a$key"), Some(set_of(&["b"])));
    }

    #[test]
    fn link_base_is_a_no_op() {
        let store = MemoryStore::new();
        link(&store, &KeyPath::base("plain").unwrap()).unwrap();
        assert!(store.is_empty());
    }

    #[test]
    fn unlink_prunes_empty_indices_upward() {
        let store = MemoryStore::new();
        let path = KeyPath::base("tree").unwrap().scope("a").unwrap().scope("b").unwrap();
        link(&store, &path).unwrap();
        unlink(&store, &path).unwrap();
        assert!(store.is_empty());
    }

    #[test]
    fn unlink_keeps_siblings() {
        let store = MemoryStore::new();
        let a = KeyPath::base("tree").unwrap().scope("a").unwrap();
        let b = KeyPath::base("tree").unwrap().scope("b").unwrap();
        store.set(&b.resolve(), Value::I32(1)).unwrap();
        link(&store, &a).unwrap();
        link(&store, &b).unwrap();
        unlink(&store, &a).unwrap();
        assert_eq!(store.decode_string_set("tree$key"), Some(set_of(&["b"])));
    }

    #[test]
    fn unlink_stops_at_live_child() {
        let store = MemoryStore::new();
        let path = KeyPath::base("tree").unwrap().scope("a").unwrap();
        store.set("tree$a", Value::I32(3)).unwrap();
        link(&store, &path).unwrap();
        unlink(&store, &path).unwrap();
        assert_eq!(store.decode_string_set("tree$key"), Some(set_of(&["a"])));
    }

    #[test]
    fn unlink_stops_at_live_list() {
        let store = MemoryStore::new();
        let list = KeyPath::base("tree").unwrap().scope("a").unwrap();
        let sibling = list.scope("x").unwrap();
        store.set(&list.size_key(), Value::I32(2)).unwrap();
        store.set(&list.element_key(0), Value::I32(1)).unwrap();
        store.set(&list.element_key(1), Value::I32(2)).unwrap();
        link(&store, &list).unwrap();
        link(&store, &sibling).unwrap();

        unlink(&store, &sibling).unwrap();
        assert_eq!(store.decode_string_set("tree$key"), Some(set_of(&["a"])));
        assert_eq!(store.decode_string_set("tree$a$key"), None);
    }
}
