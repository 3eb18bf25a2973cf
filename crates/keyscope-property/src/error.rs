//! Error types for the property crate.

use keyscope_store::StoreError;
use keyscope_types::KeyError;

/// Errors that can occur while reading or writing properties and views.
#[derive(Debug, thiserror::Error)]
pub enum PropertyError {
    /// A key segment could not be composed into a store key.
    #[error("key error: {0}")]
    Key(#[from] KeyError),

    /// The store rejected a write.
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// A positional list operation outside `[0, len)` (or `[0, len]` for
    /// insertion).
    #[error("index {index} out of range for length {len}")]
    IndexOutOfRange { index: usize, len: usize },

    /// A cursor `remove`/`set` without a preceding `next`/`previous`.
    #[error("cursor has no current element")]
    NoCurrentElement,

    /// A structured value could not be encoded.
    #[error("codec error: {0}")]
    Codec(String),
}

/// Convenience alias for property results.
pub type PropertyResult<T> = Result<T, PropertyError>;
