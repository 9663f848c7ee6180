use std::sync::{Arc, RwLock};

use strand_crypto::Hasher;
use strand_types::ObjectId;
use tracing::debug;

use crate::block::Block;
use crate::directory::Directory;
use crate::error::{StoreError, StoreResult};
use crate::memory::InMemoryBlockStore;
use crate::object::{Blob, Object};
use crate::refcount::Refcount;
use crate::traits::BlockStore;

/// External veto on physical block deletion.
///
/// The object store owns refcounts but not every notion of liveness: a
/// branch index may still reach a block whose counters have dropped to
/// zero. A retainer lets that layer keep the bytes on disk; the counters
/// are decremented regardless, and the retained orphan is reclaimed by a
/// later sweep.
pub trait Retainer: Send + Sync {
    fn retains(&self, id: &ObjectId) -> bool;
}

/// Typed, refcounted layer over a [`BlockStore`].
///
/// `store` never touches refcounts; pinning is explicit. `recursive`
/// counters cascade: establishing the first recursive pin on an object
/// pins each child too (recursively), and releasing the last one unwinds
/// the same way, deleting blocks whose counters reach zero. See the crate
/// docs for the full discipline.
pub struct ObjectStore {
    blocks: Arc<dyn BlockStore>,
    retainer: RwLock<Option<Arc<dyn Retainer>>>,
}

impl ObjectStore {
    pub fn new(blocks: Arc<dyn BlockStore>) -> Self {
        Self {
            blocks,
            retainer: RwLock::new(None),
        }
    }

    /// An object store over a fresh in-memory backend, for tests and
    /// embedding.
    pub fn in_memory() -> Self {
        Self::new(Arc::new(InMemoryBlockStore::new()))
    }

    /// Install the deletion veto. At most one retainer is consulted.
    pub fn set_retainer(&self, retainer: Arc<dyn Retainer>) {
        *self.retainer.write().expect("lock poisoned") = Some(retainer);
    }

    // ------------------------------------------------------------------
    // Typed store/load
    // ------------------------------------------------------------------

    /// Write a block if absent and return its id. Refcounts are untouched.
    pub fn store_block(&self, block: &Block) -> StoreResult<ObjectId> {
        let id = block.calculate_id();
        if !self.blocks.exists(&id)? {
            self.blocks.store(&id, &block.encode())?;
        }
        Ok(id)
    }

    /// Serialize and write an object. Refcounts are untouched.
    pub fn store(&self, object: &Object) -> StoreResult<ObjectId> {
        self.store_block(&object.to_block())
    }

    /// Serialize and write a blob. Refcounts are untouched.
    pub fn store_blob(&self, blob: &Blob) -> StoreResult<ObjectId> {
        self.store_block(&blob.to_block())
    }

    /// Serialize and write a directory. Refcounts are untouched.
    pub fn store_directory(&self, dir: &Directory) -> StoreResult<ObjectId> {
        self.store_block(&dir.to_block())
    }

    pub fn exists(&self, id: &ObjectId) -> StoreResult<bool> {
        self.blocks.exists(id)
    }

    /// Load and verify a block, decoding it as whatever its tag says.
    ///
    /// Fails with [`StoreError::HashMismatch`] when the stored bytes no
    /// longer hash to `id`, and [`StoreError::Corrupt`] when the tag or
    /// payload cannot be interpreted.
    pub fn load_any(&self, id: &ObjectId) -> StoreResult<Object> {
        let bytes = self.blocks.load(id)?;
        let computed = Hasher::digest(&bytes);
        if computed != *id {
            return Err(StoreError::HashMismatch {
                expected: *id,
                computed,
            });
        }
        let block = Block::decode(&bytes).map_err(|e| StoreError::Corrupt {
            id: *id,
            reason: e.to_string(),
        })?;
        Object::from_block(&block).map_err(|e| StoreError::Corrupt {
            id: *id,
            reason: e.to_string(),
        })
    }

    pub fn load_directory(&self, id: &ObjectId) -> StoreResult<Directory> {
        match self.load_any(id)? {
            Object::Directory(dir) => Ok(dir),
            Object::Blob(_) => Err(StoreError::Corrupt {
                id: *id,
                reason: "expected directory, got blob".into(),
            }),
        }
    }

    pub fn load_blob(&self, id: &ObjectId) -> StoreResult<Blob> {
        match self.load_any(id)? {
            Object::Blob(blob) => Ok(blob),
            Object::Directory(_) => Err(StoreError::Corrupt {
                id: *id,
                reason: "expected blob, got directory".into(),
            }),
        }
    }

    // ------------------------------------------------------------------
    // Refcounts
    // ------------------------------------------------------------------

    /// The current refcount record of `id` (zero when absent).
    pub fn read_refcount(&self, id: &ObjectId) -> StoreResult<Refcount> {
        self.blocks.read_refcount(id)
    }

    /// An object is complete when it carries a recursive pin, which implies
    /// its entire subtree is present and pinned.
    pub fn is_complete(&self, id: &ObjectId) -> StoreResult<bool> {
        Ok(self.read_refcount(id)?.recursive > 0)
    }

    /// Pin the object alone, without its children.
    pub fn increment_direct(&self, id: &ObjectId) -> StoreResult<()> {
        let mut rc = self.read_refcount(id)?;
        rc.direct += 1;
        self.blocks.write_refcount(id, &rc)
    }

    /// Pin the object and, transitively, its children.
    ///
    /// Only the 0→1 transition cascades: each child gains one recursive
    /// count per ancestor pin established over it, so shared subtrees
    /// survive any one holder letting go.
    pub fn increment_recursive(&self, id: &ObjectId) -> StoreResult<()> {
        let mut rc = self.read_refcount(id)?;
        let first = rc.recursive == 0;
        rc.recursive += 1;
        self.blocks.write_refcount(id, &rc)?;
        if first {
            for child in self.load_any(id)?.children() {
                self.increment_recursive(&child)?;
            }
        }
        Ok(())
    }

    /// Atomically trade a direct pin for a recursive one, for an object
    /// whose subtree has just become complete.
    pub fn convert_direct_to_recursive(&self, id: &ObjectId) -> StoreResult<()> {
        let mut rc = self.read_refcount(id)?;
        assert!(rc.direct > 0, "refcount underflow (direct) for {id}");
        rc.direct -= 1;
        let first = rc.recursive == 0;
        rc.recursive += 1;
        self.blocks.write_refcount(id, &rc)?;
        if first {
            for child in self.load_any(id)?.children() {
                self.increment_recursive(&child)?;
            }
        }
        Ok(())
    }

    /// Release a direct pin; delete the block once both counters are zero.
    pub fn flat_remove(&self, id: &ObjectId) -> StoreResult<()> {
        let mut rc = self.read_refcount(id)?;
        assert!(rc.direct > 0, "refcount underflow (direct) for {id}");
        rc.direct -= 1;
        self.blocks.write_refcount(id, &rc)?;
        if rc.is_zero() {
            self.delete_block(id)?;
        }
        Ok(())
    }

    /// Release a recursive pin; on the last one, cascade into the children
    /// and delete every block whose counters reach zero.
    pub fn deep_remove(&self, id: &ObjectId) -> StoreResult<()> {
        let mut rc = self.read_refcount(id)?;
        assert!(rc.recursive > 0, "refcount underflow (recursive) for {id}");
        rc.recursive -= 1;
        if rc.recursive > 0 {
            return self.blocks.write_refcount(id, &rc);
        }
        // Last recursive pin: read the children out before the block can
        // disappear.
        let object = self.load_any(id)?;
        self.blocks.write_refcount(id, &rc)?;
        for child in object.children() {
            self.deep_remove(&child)?;
        }
        if rc.direct == 0 {
            self.delete_block(id)?;
        }
        Ok(())
    }

    /// Delete the block unless any pin -- refcount or retainer -- still holds
    /// it. Returns `true` if the block was deleted.
    pub fn remove_if_unpinned(&self, id: &ObjectId) -> StoreResult<bool> {
        if !self.read_refcount(id)?.is_zero() {
            return Ok(false);
        }
        self.delete_block(id)
    }

    fn delete_block(&self, id: &ObjectId) -> StoreResult<bool> {
        let retained = {
            let guard = self.retainer.read().expect("lock poisoned");
            guard.as_ref().map_or(false, |r| r.retains(id))
        };
        if retained {
            debug!(id = %id.short_hex(), "block retained externally, leaving orphan");
            return Ok(false);
        }
        debug!(id = %id.short_hex(), "deleting unreferenced block");
        self.blocks.remove(id)
    }
}

impl std::fmt::Debug for ObjectStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ObjectStore").finish_non_exhaustive()
    }
}
