use strand_store::StoreError;

/// Errors from branch operations.
#[derive(Debug, thiserror::Error)]
pub enum BranchError {
    /// A commit tried to publish a version stamp outside the legal window
    /// for the committing user.
    #[error("version regression for user {user}: head is {current}, commit stamps {attempted}")]
    VersionRegression {
        user: String,
        current: u64,
        attempted: u64,
    },

    /// Underlying object store failure.
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Result alias for branch operations.
pub type BranchResult<T> = Result<T, BranchError>;
