use strand_types::{ObjectId, TypeError};

/// Errors from block and object store operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Load of an absent object id.
    #[error("object not found: {0}")]
    NotFound(ObjectId),

    /// Stored bytes no longer hash to the id they were loaded under.
    #[error("hash mismatch for {expected}: stored bytes hash to {computed}")]
    HashMismatch {
        expected: ObjectId,
        computed: ObjectId,
    },

    /// The block's tag or payload cannot be interpreted.
    #[error("corrupt object {id}: {reason}")]
    Corrupt { id: ObjectId, reason: String },

    /// Low-level wire decoding failure (no object id in scope).
    #[error("encoding error: {0}")]
    Encoding(#[from] TypeError),

    /// I/O error from the underlying storage backend.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result alias for store operations.
pub type StoreResult<T> = Result<T, StoreError>;
