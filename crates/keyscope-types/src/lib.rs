//! Foundation types for keyscope.
//!
//! keyscope layers typed, map- and list-shaped views over a flat scalar
//! key-value store. This crate holds the pieces every other crate agrees on:
//! the scalar [`Value`] model understood by stores, the composite-key scheme
//! that flattens nested structure into single string keys, and the
//! [`Resolved`] tree produced when a whole namespace is enumerated.
//!
//! # Key Types
//!
//! - [`Value`] -- A scalar value as persisted by a store
//! - [`KeyPath`] -- A base name plus a chain of scope segments
//! - [`Resolved`] -- A decoded value, possibly expanded into nested mappings
//! - [`KeyError`] -- Configuration errors detected while composing keys
//!
//! # Key Naming
//!
//! | stored entry            | key                 |
//! |-------------------------|---------------------|
//! | bare scalar             | `name`              |
//! | map entry / scope child | `name$child`        |
//! | key-set index           | `name$key`          |
//! | list element `i`        | `name$i`            |
//! | list length             | `name$size`         |

pub mod error;
pub mod key;
pub mod path;
pub mod resolved;
pub mod value;

pub use error::{KeyError, KeyResult};
pub use key::{compose_key, DELIMITER, INDEX_SEGMENT, SIZE_SEGMENT};
pub use path::KeyPath;
pub use resolved::Resolved;
pub use value::{Value, ValueKind};
