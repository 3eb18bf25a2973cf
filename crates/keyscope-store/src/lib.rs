//! Flat scalar key-value storage for keyscope.
//!
//! Stores address scalar [`Value`](keyscope_types::Value)s by a single string
//! key. They know nothing about maps, lists, or scopes; the property layer
//! builds those out of composite keys.
//!
//! # Storage Backends
//!
//! All backends implement the [`KvStore`] trait:
//!
//! - [`MemoryStore`] -- `HashMap`-based store for tests and embedding
//! - [`FileStore`] -- RAM table backed by a CRC-framed append-only log
//!
//! # Design Rules
//!
//! 1. Every single-key read and write is atomic; there are no cross-key
//!    transactions.
//! 2. Reads never fail. A missing key or a value of the wrong kind is
//!    reported as absent and resolved by the caller's default.
//! 3. Write failures are propagated to the caller and never retried.
//! 4. The file backend appends to its log before updating its table.

pub mod config;
pub mod error;
pub mod file;
pub mod memory;
pub mod traits;

pub use config::{KvConfig, LogLevel, SyncMode};
pub use error::{StoreError, StoreResult};
pub use file::FileStore;
pub use memory::MemoryStore;
pub use traits::KvStore;
