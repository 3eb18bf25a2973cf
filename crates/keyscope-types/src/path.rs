//! Scope chains.
//!
//! A [`KeyPath`] is a linked chain of layers: the innermost layer is a base
//! name and every outer layer contributes one additional scope segment.
//! Resolving a path folds the chain into a single composite key, base first.

use std::fmt;
use std::sync::Arc;

use crate::error::KeyResult;
use crate::key::{self, DELIMITER};

#[derive(PartialEq, Eq, Hash)]
enum Layer {
    Base(String),
    Scope { parent: KeyPath, segment: String },
}

/// A base name plus zero or more scope segments.
///
/// Cloning is cheap: layers are shared between a path and the paths scoped
/// from it.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct KeyPath {
    layer: Arc<Layer>,
}

impl KeyPath {
    /// A path consisting of just a base name.
    pub fn base(name: impl Into<String>) -> KeyResult<Self> {
        let name = name.into();
        key::validate_base(&name)?;
        Ok(Self {
            layer: Arc::new(Layer::Base(name)),
        })
    }

    /// A new path with one more segment appended to this one.
    pub fn scope(&self, segment: impl Into<String>) -> KeyResult<Self> {
        let segment = segment.into();
        key::validate_segment(&segment)?;
        Ok(Self {
            layer: Arc::new(Layer::Scope {
                parent: self.clone(),
                segment,
            }),
        })
    }

    /// The base name at the root of the chain.
    pub fn base_name(&self) -> &str {
        let mut current = self;
        loop {
            match current.layer.as_ref() {
                Layer::Base(name) => return name,
                Layer::Scope { parent, .. } => current = parent,
            }
        }
    }

    /// The enclosing layer, or `None` for a bare base.
    pub fn parent(&self) -> Option<&KeyPath> {
        match self.layer.as_ref() {
            Layer::Base(_) => None,
            Layer::Scope { parent, .. } => Some(parent),
        }
    }

    /// The segment contributed by this layer, or `None` for a bare base.
    pub fn segment(&self) -> Option<&str> {
        match self.layer.as_ref() {
            Layer::Base(_) => None,
            Layer::Scope { segment, .. } => Some(segment),
        }
    }

    pub fn is_base(&self) -> bool {
        matches!(self.layer.as_ref(), Layer::Base(_))
    }

    /// Number of scope segments.
    pub fn depth(&self) -> usize {
        self.ancestors().count()
    }

    /// Scope segments, outermost property first and innermost key last.
    pub fn segments(&self) -> Vec<&str> {
        let mut segments: Vec<&str> = self.ancestors().map(|(_, segment)| segment).collect();
        segments.reverse();
        segments
    }

    /// Walk the chain from this layer outward to the base, yielding each
    /// `(parent, segment)` pair.
    pub fn ancestors(&self) -> Ancestors<'_> {
        Ancestors { current: self }
    }

    /// The composite key this path resolves to.
    pub fn resolve(&self) -> String {
        key::join(self.base_name(), self.segments())
    }

    /// Key of this prefix's key-set index.
    pub fn index_key(&self) -> String {
        key::index_key(&self.resolve())
    }

    /// Key of this prefix's list length counter.
    pub fn size_key(&self) -> String {
        key::size_key(&self.resolve())
    }

    /// Key of the child `segment` under this prefix.
    pub fn child_key(&self, segment: &str) -> KeyResult<String> {
        key::child_key(&self.resolve(), segment)
    }

    /// Key of list element `index` under this prefix.
    pub fn element_key(&self, index: usize) -> String {
        key::element_key(&self.resolve(), index)
    }
}

impl fmt::Display for KeyPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.base_name())?;
        for segment in self.segments() {
            write!(f, "{DELIMITER}{segment}")?;
        }
        Ok(())
    }
}

impl fmt::Debug for KeyPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("KeyPath").field(&self.resolve()).finish()
    }
}

/// Iterator over the `(parent, segment)` pairs of a [`KeyPath`].
pub struct Ancestors<'a> {
    current: &'a KeyPath,
}

impl<'a> Iterator for Ancestors<'a> {
    type Item = (&'a KeyPath, &'a str);

    fn next(&mut self) -> Option<Self::Item> {
        let current: &'a KeyPath = self.current;
        match current.layer.as_ref() {
            Layer::Base(_) => None,
            Layer::Scope { parent, segment } => {
                self.current = parent;
                Some((parent, segment.as_str()))
            }
        }
    }
}
