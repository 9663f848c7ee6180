use std::path::{Path, PathBuf};

use strand_types::ObjectId;

use crate::error::{StoreError, StoreResult};
use crate::fsutil;
use crate::refcount::Refcount;
use crate::traits::BlockStore;

/// Filesystem-backed block store.
///
/// Blocks live at `<root>/<hex(id)>`; the refcount record of a block lives
/// at the sibling path `<hex(id)>.rc` as two little-endian u64. All writes
/// go through temp-file + rename so a crash never leaves a torn block or
/// record.
pub struct FsBlockStore {
    root: PathBuf,
}

impl FsBlockStore {
    /// Open (creating if needed) a block store rooted at `root`.
    pub fn open(root: impl Into<PathBuf>) -> StoreResult<Self> {
        let root = root.into();
        std::fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    /// The directory blocks are stored under.
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn block_path(&self, id: &ObjectId) -> PathBuf {
        self.root.join(id.to_hex())
    }

    fn refcount_path(&self, id: &ObjectId) -> PathBuf {
        self.root.join(format!("{}.rc", id.to_hex()))
    }
}

impl BlockStore for FsBlockStore {
    fn store(&self, id: &ObjectId, bytes: &[u8]) -> StoreResult<()> {
        let path = self.block_path(id);
        if path.exists() {
            // Content addressing: same id, same bytes.
            return Ok(());
        }
        fsutil::atomic_write(&path, bytes)?;
        Ok(())
    }

    fn load(&self, id: &ObjectId) -> StoreResult<Vec<u8>> {
        fsutil::read_optional(&self.block_path(id))?.ok_or(StoreError::NotFound(*id))
    }

    fn exists(&self, id: &ObjectId) -> StoreResult<bool> {
        Ok(self.block_path(id).exists())
    }

    fn remove(&self, id: &ObjectId) -> StoreResult<bool> {
        Ok(fsutil::remove_optional(&self.block_path(id))?)
    }

    fn read_refcount(&self, id: &ObjectId) -> StoreResult<Refcount> {
        match fsutil::read_optional(&self.refcount_path(id))? {
            None => Ok(Refcount::zero()),
            Some(bytes) => Ok(Refcount::decode(&bytes)?),
        }
    }

    fn write_refcount(&self, id: &ObjectId, rc: &Refcount) -> StoreResult<()> {
        let path = self.refcount_path(id);
        if rc.is_zero() {
            fsutil::remove_optional(&path)?;
        } else {
            fsutil::atomic_write(&path, &rc.encode())?;
        }
        Ok(())
    }
}

impl std::fmt::Debug for FsBlockStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FsBlockStore")
            .field("root", &self.root)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(seed: u8) -> ObjectId {
        ObjectId::from_hash([seed; 32])
    }

    fn open_temp() -> (tempfile::TempDir, FsBlockStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = FsBlockStore::open(dir.path().join("objects")).unwrap();
        (dir, store)
    }

    #[test]
    fn store_and_load_round_trip() {
        let (_dir, store) = open_temp();
        store.store(&id(1), b"block bytes").unwrap();
        assert_eq!(store.load(&id(1)).unwrap(), b"block bytes");
    }

    #[test]
    fn block_file_is_named_by_hex_id() {
        let (_dir, store) = open_temp();
        store.store(&id(1), b"x").unwrap();
        assert!(store.root().join(id(1).to_hex()).exists());
    }

    #[test]
    fn load_missing_is_not_found() {
        let (_dir, store) = open_temp();
        assert!(matches!(store.load(&id(7)), Err(StoreError::NotFound(_))));
    }

    #[test]
    fn remove_deletes_file() {
        let (_dir, store) = open_temp();
        store.store(&id(1), b"x").unwrap();
        assert!(store.remove(&id(1)).unwrap());
        assert!(!store.exists(&id(1)).unwrap());
        assert!(!store.remove(&id(1)).unwrap());
    }

    #[test]
    fn refcount_record_lives_beside_block() {
        let (_dir, store) = open_temp();
        let rc = Refcount { direct: 2, recursive: 5 };
        store.write_refcount(&id(1), &rc).unwrap();

        let path = store.root().join(format!("{}.rc", id(1).to_hex()));
        assert!(path.exists());
        assert_eq!(std::fs::read(&path).unwrap().len(), Refcount::ENCODED_LEN);
        assert_eq!(store.read_refcount(&id(1)).unwrap(), rc);
    }

    #[test]
    fn zero_refcount_removes_record() {
        let (_dir, store) = open_temp();
        store
            .write_refcount(&id(1), &Refcount { direct: 1, recursive: 0 })
            .unwrap();
        store.write_refcount(&id(1), &Refcount::zero()).unwrap();
        let path = store.root().join(format!("{}.rc", id(1).to_hex()));
        assert!(!path.exists());
        assert_eq!(store.read_refcount(&id(1)).unwrap(), Refcount::zero());
    }

    #[test]
    fn reopen_sees_existing_blocks() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("objects");
        {
            let store = FsBlockStore::open(&path).unwrap();
            store.store(&id(1), b"persisted").unwrap();
        }
        let store = FsBlockStore::open(&path).unwrap();
        assert_eq!(store.load(&id(1)).unwrap(), b"persisted");
    }
}
