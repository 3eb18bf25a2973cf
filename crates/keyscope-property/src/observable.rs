use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use tracing::debug;

use crate::error::PropertyResult;
use crate::property::Property;

type Observer<V> = Arc<dyn Fn(&V) + Send + Sync>;

/// Handle returned by [`ObservableCell::subscribe`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

/// A property whose writes are pushed to subscribers.
///
/// Observers run synchronously on the writing thread after the new value
/// has been persisted, in subscription order.
pub struct ObservableCell<V> {
    property: Property<V>,
    observers: Mutex<Vec<(SubscriptionId, Observer<V>)>>,
    next_id: AtomicU64,
}

impl<V: Clone + Send + Sync + 'static> ObservableCell<V> {
    pub fn new(property: Property<V>) -> Self {
        Self {
            property,
            observers: Mutex::new(Vec::new()),
            next_id: AtomicU64::new(0),
        }
    }

    pub fn property(&self) -> &Property<V> {
        &self.property
    }

    /// Current persisted value.
    pub fn get_value(&self) -> V {
        self.property.get()
    }

    /// Persist `value`, then notify every observer.
    pub fn set_value(&self, value: V) -> PropertyResult<()> {
        self.property.set(value.clone())?;
        self.notify(&value);
        Ok(())
    }

    /// Register `observer`; it is called with every subsequently written value.
    pub fn subscribe(&self, observer: impl Fn(&V) + Send + Sync + 'static) -> SubscriptionId {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.observers
            .lock()
            .expect("lock poisoned")
            .push((id, Arc::new(observer)));
        id
    }

    /// Remove a subscription. Returns `false` if it was not registered.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut observers = self.observers.lock().expect("lock poisoned");
        let before = observers.len();
        observers.retain(|(existing, _)| *existing != id);
        observers.len() != before
    }

    pub fn subscriber_count(&self) -> usize {
        self.observers.lock().expect("lock poisoned").len()
    }

    fn notify(&self, value: &V) {
        // Snapshot so observers may subscribe or unsubscribe re-entrantly.
        let observers: Vec<Observer<V>> = self
            .observers
            .lock()
            .expect("lock poisoned")
            .iter()
            .map(|(_, observer)| Arc::clone(observer))
            .collect();
        debug!(key = %self.property.key(), observers = observers.len(), "notifying observers");
        for observer in observers {
            observer(value);
        }
    }
}

impl<V: Clone + PartialEq + Send + Sync + 'static> ObservableCell<V> {
    /// Write `update` only if the current value equals `expected`.
    ///
    /// The read and write are not atomic with respect to other writers of
    /// the same key.
    pub fn compare_and_set(&self, expected: &V, update: V) -> PropertyResult<bool> {
        if self.get_value() != *expected {
            return Ok(false);
        }
        self.set_value(update)?;
        Ok(true)
    }
}

impl<V> fmt::Debug for ObservableCell<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ObservableCell")
            .field("property", &self.property)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::Codec;
    use keyscope_store::MemoryStore;

    fn cell(default: i32) -> ObservableCell<i32> {
        let store = Arc::new(MemoryStore::new());
        ObservableCell::new(Property::new(store, "live", Codec::scalar(default)).unwrap())
    }

    #[test]
    fn observers_see_persisted_writes() {
        let cell = cell(0);
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let id = cell.subscribe(move |v| sink.lock().unwrap().push(*v));

        cell.set_value(1).unwrap();
        cell.set_value(2).unwrap();
        assert!(cell.unsubscribe(id));
        assert!(!cell.unsubscribe(id));
        cell.set_value(3).unwrap();

        assert_eq!(*seen.lock().unwrap(), vec![1, 2]);
        assert_eq!(cell.get_value(), 3);
    }

    #[test]
    fn compare_and_set_checks_current_value() {
        let cell = cell(5);
        assert!(!cell.compare_and_set(&4, 9).unwrap());
        assert!(cell.compare_and_set(&5, 9).unwrap());
        assert_eq!(cell.get_value(), 9);
    }

    #[test]
    fn failed_write_does_not_notify() {
        let store = Arc::new(MemoryStore::new());
        let cell = ObservableCell::new(
            Property::new(store.clone(), "live", Codec::scalar(false)).unwrap(),
        );
        let calls = Arc::new(AtomicU64::new(0));
        let counter = Arc::clone(&calls);
        cell.subscribe(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        store.set_read_only(true);
        assert!(cell.set_value(true).is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert_eq!(cell.subscriber_count(), 1);
    }
}
