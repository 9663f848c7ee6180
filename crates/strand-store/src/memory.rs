use std::collections::HashMap;
use std::sync::RwLock;

use strand_types::ObjectId;

use crate::error::{StoreError, StoreResult};
use crate::refcount::Refcount;
use crate::traits::BlockStore;

/// In-memory, HashMap-based block store.
///
/// Intended for tests and embedding. Blocks and refcount records are held
/// behind `RwLock`s for safe concurrent access.
pub struct InMemoryBlockStore {
    blocks: RwLock<HashMap<ObjectId, Vec<u8>>>,
    refcounts: RwLock<HashMap<ObjectId, Refcount>>,
}

impl InMemoryBlockStore {
    /// Create a new empty store.
    pub fn new() -> Self {
        Self {
            blocks: RwLock::new(HashMap::new()),
            refcounts: RwLock::new(HashMap::new()),
        }
    }

    /// Number of blocks currently stored.
    pub fn len(&self) -> usize {
        self.blocks.read().expect("lock poisoned").len()
    }

    /// Returns `true` if the store holds no blocks.
    pub fn is_empty(&self) -> bool {
        self.blocks.read().expect("lock poisoned").is_empty()
    }

    /// Sorted list of all stored block ids.
    pub fn all_ids(&self) -> Vec<ObjectId> {
        let map = self.blocks.read().expect("lock poisoned");
        let mut ids: Vec<ObjectId> = map.keys().copied().collect();
        ids.sort();
        ids
    }
}

impl Default for InMemoryBlockStore {
    fn default() -> Self {
        Self::new()
    }
}

impl BlockStore for InMemoryBlockStore {
    fn store(&self, id: &ObjectId, bytes: &[u8]) -> StoreResult<()> {
        let mut map = self.blocks.write().expect("lock poisoned");
        map.entry(*id).or_insert_with(|| bytes.to_vec());
        Ok(())
    }

    fn load(&self, id: &ObjectId) -> StoreResult<Vec<u8>> {
        let map = self.blocks.read().expect("lock poisoned");
        map.get(id).cloned().ok_or(StoreError::NotFound(*id))
    }

    fn exists(&self, id: &ObjectId) -> StoreResult<bool> {
        let map = self.blocks.read().expect("lock poisoned");
        Ok(map.contains_key(id))
    }

    fn remove(&self, id: &ObjectId) -> StoreResult<bool> {
        let mut map = self.blocks.write().expect("lock poisoned");
        Ok(map.remove(id).is_some())
    }

    fn read_refcount(&self, id: &ObjectId) -> StoreResult<Refcount> {
        let map = self.refcounts.read().expect("lock poisoned");
        Ok(map.get(id).copied().unwrap_or_default())
    }

    fn write_refcount(&self, id: &ObjectId, rc: &Refcount) -> StoreResult<()> {
        let mut map = self.refcounts.write().expect("lock poisoned");
        if rc.is_zero() {
            map.remove(id);
        } else {
            map.insert(*id, *rc);
        }
        Ok(())
    }
}

impl std::fmt::Debug for InMemoryBlockStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryBlockStore")
            .field("block_count", &self.len())
            .finish()
    }
}
