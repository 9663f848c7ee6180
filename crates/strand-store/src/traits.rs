use strand_types::ObjectId;

use crate::error::StoreResult;
use crate::refcount::Refcount;

/// Content-addressed byte store keyed by [`ObjectId`].
///
/// All implementations must satisfy these invariants:
/// - Blocks are immutable once written; storing the same `(id, bytes)` pair
///   twice is a no-op (content addressing makes the pair deterministic).
/// - The store never interprets block contents.
/// - The refcount record of a block is persisted alongside the block; an
///   absent record reads as the zero record, and writing the zero record
///   deletes it.
/// - `remove` is only legal when the object layer's refcount logic
///   authorizes it; this layer is purely mechanical.
/// - All I/O errors are propagated, never silently ignored.
pub trait BlockStore: Send + Sync {
    /// Write a block under its content id. Idempotent for identical pairs.
    fn store(&self, id: &ObjectId, bytes: &[u8]) -> StoreResult<()>;

    /// Read a block's bytes. Fails with
    /// [`StoreError::NotFound`](crate::StoreError::NotFound) when absent.
    fn load(&self, id: &ObjectId) -> StoreResult<Vec<u8>>;

    /// Check whether a block exists.
    fn exists(&self, id: &ObjectId) -> StoreResult<bool>;

    /// Delete a block. Returns `true` if it existed.
    fn remove(&self, id: &ObjectId) -> StoreResult<bool>;

    /// Read a block's refcount record (zero when absent).
    fn read_refcount(&self, id: &ObjectId) -> StoreResult<Refcount>;

    /// Persist a block's refcount record; the zero record deletes it.
    fn write_refcount(&self, id: &ObjectId, rc: &Refcount) -> StoreResult<()>;
}
