//! Namespace enumeration.
//!
//! Resolves declared fields to [`Resolved`] trees. A key whose index entry
//! (`<key>$key`) holds a non-empty set is treated as a nested structure and
//! expanded child by child. A key with no value of its own but a size
//! counter (`<key>$size`) is read as a list; anything else is decoded as a
//! leaf.

use std::collections::BTreeMap;

use keyscope_store::KvStore;
use keyscope_types::{key, Resolved};
use tracing::warn;

use crate::registry::{FieldDescriptor, FieldKind};

/// Resolve one declared field with its own codec.
pub fn resolve_field(store: &dyn KvStore, field: &FieldDescriptor) -> Resolved {
    let prefix = field.path().resolve();
    let leaf = |leaf_key: &str| field.resolve_leaf(store, leaf_key);
    match field.kind() {
        FieldKind::Map => Resolved::Map(resolve_children(store, &prefix, &leaf)),
        FieldKind::List => resolve_list(store, &prefix, &leaf),
        FieldKind::Scalar | FieldKind::Cell => resolve_node(store, &prefix, &leaf),
    }
}

/// Resolve whatever is stored under `base` without typed codecs.
///
/// Leaves are returned as raw store values. A key with no value of its own
/// but a size counter is read as a list.
pub fn walk(store: &dyn KvStore, base: &str) -> Resolved {
    let raw = |leaf_key: &str| Resolved::from(store.get(leaf_key));
    resolve_node(store, base, &raw)
}

fn resolve_node(store: &dyn KvStore, node: &str, leaf: &dyn Fn(&str) -> Resolved) -> Resolved {
    match store.decode_string_set(&key::index_key(node)) {
        Some(index) if !index.is_empty() => Resolved::Map(resolve_children(store, node, leaf)),
        _ if !store.contains(node) && store.contains(&key::size_key(node)) => {
            resolve_list(store, node, leaf)
        }
        _ => leaf(node),
    }
}

fn resolve_children(
    store: &dyn KvStore,
    prefix: &str,
    leaf: &dyn Fn(&str) -> Resolved,
) -> BTreeMap<String, Resolved> {
    let index = store
        .decode_string_set(&key::index_key(prefix))
        .unwrap_or_default();
    index
        .into_iter()
        .filter_map(|segment| match key::child_key(prefix, &segment) {
            Ok(child) => {
                let resolved = resolve_node(store, &child, leaf);
                Some((segment, resolved))
            }
            Err(e) => {
                warn!(prefix, segment = %segment, error = %e, "skipping invalid index segment");
                None
            }
        })
        .collect()
}

fn resolve_list(store: &dyn KvStore, prefix: &str, leaf: &dyn Fn(&str) -> Resolved) -> Resolved {
    let len = usize::try_from(store.decode_i32(&key::size_key(prefix), 0)).unwrap_or(0);
    Resolved::List((0..len).map(|i| leaf(&key::element_key(prefix, i))).collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use keyscope_store::MemoryStore;
    use keyscope_types::Value;
    use std::collections::BTreeSet;

    fn set_of(items: &[&str]) -> Value {
        Value::StrSet(items.iter().map(|s| s.to_string()).collect::<BTreeSet<_>>())
    }

    #[test]
    fn walk_plain_value() {
        let store = MemoryStore::new();
        store.set("i1", Value::I32(6)).unwrap();
        assert_eq!(walk(&store, "i1"), Resolved::Value(Value::I32(6)));
        assert_eq!(walk(&store, "missing"), Resolved::Null);
    }

    #[test]
    fn walk_nested_index() {
        let store = MemoryStore::new();
        store.set("tree$key", set_of(&["a", "b"])).unwrap();
        store.set("tree$a$key", set_of(&["x"])).unwrap();
        store.set("tree$a$x", Value::I32(1)).unwrap();
        store.set("tree$b", Value::from("leaf")).unwrap();

        let tree = walk(&store, "tree");
        assert_eq!(
            tree.get("a").and_then(|a| a.get("x")),
            Some(&Resolved::Value(Value::I32(1)))
        );
        assert_eq!(tree.get("b"), Some(&Resolved::Value(Value::from("leaf"))));
    }

    #[test]
    fn walk_list() {
        let store = MemoryStore::new();
        store.set("list$size", Value::I32(2)).unwrap();
        store.set("list$0", Value::I32(4)).unwrap();
        store.set("list$1", Value::I32(5)).unwrap();
        assert_eq!(
            walk(&store, "list"),
            Resolved::List(vec![Value::I32(4).into(), Value::I32(5).into()])
        );
    }

    #[test]
    fn walk_list_under_scope() {
        let store = MemoryStore::new();
        store.set("tree$key", set_of(&["a"])).unwrap();
        store.set("tree$a$size", Value::I32(1)).unwrap();
        store.set("tree$a$0", Value::from("x")).unwrap();
        assert_eq!(
            walk(&store, "tree").get("a"),
            Some(&Resolved::List(vec![Value::from("x").into()]))
        );
    }

    #[test]
    fn corrupt_index_segment_is_skipped() {
        let store = MemoryStore::new();
        store.set("tree$key", set_of(&["ok", "bad$seg"])).unwrap();
        store.set("tree$ok", Value::Bool(true)).unwrap();
        let tree = walk(&store, "tree");
        assert_eq!(tree.as_map().map(BTreeMap::len), Some(1));
    }
}
