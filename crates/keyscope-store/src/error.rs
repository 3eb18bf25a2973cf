/// Errors from store operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The store rejects writes.
    #[error("store is read-only")]
    ReadOnly,

    /// I/O error from the underlying storage backend.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization or deserialization failure.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// The configuration could not be loaded.
    #[error("invalid configuration: {0}")]
    Config(String),

    /// A store id that cannot name a store file.
    #[error("invalid store id: {0:?}")]
    InvalidId(String),
}

/// Result alias for store operations.
pub type StoreResult<T> = Result<T, StoreError>;
