//! # keyscope-property
//!
//! Typed handles over a [`KvStore`](keyscope_store::KvStore).
//!
//! - [`Property`]: one scalar key with a default, optionally nested under a
//!   scope chain via [`Property::with_key`].
//! - [`MapView`]: a `String -> V` map persisted as prefixed child keys plus a
//!   key-set index.
//! - [`ListView`]: an ordered list persisted as dense element keys plus a
//!   size counter.
//! - [`ObservableCell`]: a property that pushes every write to subscribers.
//!
//! Values cross the store boundary through a [`Codec`].

pub mod codec;
pub mod error;
pub mod list;
pub mod map;
pub mod observable;
pub mod property;
mod scope;

pub use codec::{Codec, StoreValue};
pub use error::{PropertyError, PropertyResult};
pub use list::{ListCursor, ListView, SubList};
pub use map::{Entries, EntryMut, MapView};
pub use observable::{ObservableCell, SubscriptionId};
pub use property::Property;
