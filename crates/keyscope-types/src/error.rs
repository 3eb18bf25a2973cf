use thiserror::Error;

/// Errors produced while composing store keys.
///
/// These are configuration errors: they are raised at the point a key is
/// composed and are never the result of stored data.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum KeyError {
    #[error("key segment {segment:?} contains the reserved delimiter '$'")]
    ReservedDelimiter { segment: String },

    #[error("key segment {segment:?} is reserved for the key-set index")]
    ReservedSegment { segment: String },

    #[error("base key must not be empty")]
    EmptyBase,
}

/// Convenience alias for key composition results.
pub type KeyResult<T> = Result<T, KeyError>;
