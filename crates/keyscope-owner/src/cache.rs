//! Memoized view handles.

use std::any::{self, Any};
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};

use crate::registry::FieldKind;

/// A view shared between every caller that asks an owner for the same field.
pub struct Shared<T> {
    inner: Arc<Mutex<T>>,
}

impl<T> Shared<T> {
    pub fn new(value: T) -> Self {
        Self {
            inner: Arc::new(Mutex::new(value)),
        }
    }

    /// Lock the view for exclusive use.
    pub fn lock(&self) -> MutexGuard<'_, T> {
        self.inner.lock().expect("lock poisoned")
    }

    /// Whether both handles refer to the same view.
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl<T> Clone for Shared<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T: fmt::Debug> fmt::Debug for Shared<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.inner.try_lock() {
            Ok(view) => f.debug_tuple("Shared").field(&*view).finish(),
            Err(_) => f.write_str("Shared(<locked>)"),
        }
    }
}

struct CachedView {
    kind: FieldKind,
    type_name: &'static str,
    handle: Box<dyn Any + Send + Sync>,
}

/// Describe a view for kind-mismatch errors, e.g. `map (Shared<MapView<i32>>)`.
pub(crate) fn describe<T>(kind: FieldKind) -> String {
    format!("{kind} ({})", any::type_name::<T>())
}

/// View handles keyed by resolved store key.
#[derive(Default)]
pub(crate) struct ViewCache {
    views: HashMap<String, CachedView>,
}

impl ViewCache {
    /// The cached handle for `key`: `None` if nothing is cached, `Err` with a
    /// description of the cached view if it has a different type.
    pub(crate) fn lookup<T: Clone + 'static>(&self, key: &str) -> Option<Result<T, String>> {
        let cached = self.views.get(key)?;
        Some(
            cached
                .handle
                .downcast_ref::<T>()
                .cloned()
                .ok_or_else(|| format!("{} ({})", cached.kind, cached.type_name)),
        )
    }

    pub(crate) fn insert<T: Send + Sync + 'static>(&mut self, key: String, kind: FieldKind, handle: T) {
        self.views.insert(
            key,
            CachedView {
                kind,
                type_name: any::type_name::<T>(),
                handle: Box::new(handle),
            },
        );
    }

    pub(crate) fn len(&self) -> usize {
        self.views.len()
    }
}
