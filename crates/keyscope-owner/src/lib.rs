//! # keyscope-owner
//!
//! An [`Owner`] holds a set of declared properties over one store. It
//! provides:
//!
//! - declaration factories that record each field in a [`Registry`];
//! - map, list and observable-cell views memoized per field;
//! - namespace enumeration, resolving every declared field (including
//!   nested scopes) into a [`Resolved`](keyscope_types::Resolved) tree;
//! - `clear_all`, resetting every field to its default.

pub mod cache;
pub mod enumerate;
pub mod error;
pub mod owner;
pub mod registry;

pub use cache::Shared;
pub use enumerate::{resolve_field, walk};
pub use error::{OwnerError, OwnerResult};
pub use owner::Owner;
pub use registry::{FieldDescriptor, FieldKind, Registry};

pub use keyscope_property::{Codec, ListView, MapView, ObservableCell, Property};
pub use keyscope_store::{FileStore, KvConfig, KvStore, MemoryStore};
pub use keyscope_types::{Resolved, Value};
