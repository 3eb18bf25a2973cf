use thiserror::Error;

#[derive(Debug, Error)]
pub enum OwnerError {
    #[error("property error: {0}")]
    Property(#[from] keyscope_property::PropertyError),

    #[error("store error: {0}")]
    Store(#[from] keyscope_store::StoreError),

    #[error("key error: {0}")]
    Key(#[from] keyscope_types::KeyError),

    /// A memoized view was requested with a different kind or element type
    /// than it was first created with.
    #[error("field {field} is memoized as {actual}, requested as {expected}")]
    KindMismatch {
        field: String,
        expected: String,
        actual: String,
    },
}

pub type OwnerResult<T> = Result<T, OwnerError>;
