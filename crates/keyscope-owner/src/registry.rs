//! Declared-field registry.
//!
//! Each owner records its declared properties here as they are created, so
//! enumeration walks an explicit list instead of discovering fields at run
//! time.

use std::fmt;
use std::slice;
use std::sync::Arc;

use keyscope_property::Property;
use keyscope_store::KvStore;
use keyscope_types::{KeyPath, Resolved};

/// How a declared field is laid out in the store.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum FieldKind {
    Scalar,
    Map,
    List,
    Cell,
}

impl fmt::Display for FieldKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Scalar => write!(f, "scalar"),
            Self::Map => write!(f, "map"),
            Self::List => write!(f, "list"),
            Self::Cell => write!(f, "cell"),
        }
    }
}

type LeafFn = dyn Fn(&dyn KvStore, &str) -> Resolved + Send + Sync;

/// One declared field: its name, layout, base key and leaf decoder.
#[derive(Clone)]
pub struct FieldDescriptor {
    name: String,
    kind: FieldKind,
    path: KeyPath,
    leaf: Arc<LeafFn>,
}

impl FieldDescriptor {
    pub fn for_property<V: Clone + Send + Sync + 'static>(
        property: &Property<V>,
        kind: FieldKind,
    ) -> Self {
        let codec = property.codec().clone();
        Self {
            name: property.name().to_string(),
            kind,
            path: property.path().clone(),
            leaf: Arc::new(move |store: &dyn KvStore, key: &str| {
                codec.resolve(&codec.decode(store.get(key)))
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> FieldKind {
        self.kind
    }

    pub fn path(&self) -> &KeyPath {
        &self.path
    }

    /// Decode the value at `key` with this field's codec.
    pub fn resolve_leaf(&self, store: &dyn KvStore, key: &str) -> Resolved {
        (self.leaf)(store, key)
    }
}

impl fmt::Debug for FieldDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FieldDescriptor")
            .field("name", &self.name)
            .field("kind", &self.kind)
            .field("path", &self.path)
            .finish()
    }
}

/// Declared fields in declaration order, unique by name.
#[derive(Clone, Debug, Default)]
pub struct Registry {
    fields: Vec<FieldDescriptor>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `descriptor`, replacing an earlier declaration of the same
    /// name. Redeclaring a map, list or cell field as a plain scalar keeps
    /// its collection kind.
    pub fn declare(&mut self, mut descriptor: FieldDescriptor) {
        match self.fields.iter_mut().find(|f| f.name == descriptor.name) {
            Some(existing) => {
                if descriptor.kind == FieldKind::Scalar {
                    descriptor.kind = existing.kind;
                }
                *existing = descriptor;
            }
            None => self.fields.push(descriptor),
        }
    }

    pub fn get(&self, name: &str) -> Option<&FieldDescriptor> {
        self.fields.iter().find(|f| f.name == name)
    }

    pub fn iter(&self) -> slice::Iter<'_, FieldDescriptor> {
        self.fields.iter()
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}
