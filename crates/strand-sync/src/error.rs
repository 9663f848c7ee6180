use strand_store::StoreError;
use strand_types::{ObjectId, TypeError};

/// Errors from replication receivers.
#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    /// The peer sent an object this branch never asked for.
    #[error("unexpected object from peer: {0}")]
    UnexpectedObject(ObjectId),

    /// Underlying object store failure.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// Malformed persisted receiver state.
    #[error("encoding error: {0}")]
    Encoding(#[from] TypeError),

    /// I/O failure persisting or loading receiver state.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result alias for replication operations.
pub type SyncResult<T> = Result<T, SyncError>;
