use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use strand_store::{fsutil, Blob, Block, Directory, ObjectStore};
use strand_types::{Commit, ObjectId, WireReader, WireWriter};
use tracing::debug;

use crate::error::{SyncError, SyncResult};
use crate::snapshot::Snapshot;

/// Receiver side of a peer's published commit.
///
/// Objects arrive one at a time, in whatever order the transport produces
/// them, and are sorted into three pools:
///
/// - `missing`: ids known to be needed (mapped to the parents waiting for
///   them) but not yet stored;
/// - `incomplete`: stored objects (pinned directly) mapped to their
///   not-yet-complete children;
/// - `complete`: stored objects whose entire subtree is present, pinned
///   recursively.
///
/// Completion propagates upward: when the last pending child of a parent
/// completes, the parent's direct pin is converted to a recursive one --
/// which then covers the children, so their own recursive pins are
/// released and the complete pool collapses toward the root. State is
/// persisted to `file_path` after every mutation.
pub struct RemoteBranch {
    store: Arc<ObjectStore>,
    file_path: PathBuf,
    commit: Commit,
    /// object → parents waiting for it.
    missing: BTreeMap<ObjectId, BTreeSet<ObjectId>>,
    /// object → its not-yet-complete children.
    incomplete: BTreeMap<ObjectId, BTreeSet<ObjectId>>,
    complete: BTreeSet<ObjectId>,
}

impl RemoteBranch {
    /// Start receiving `commit`. The root is the first missing object.
    pub fn create(
        commit: Commit,
        file_path: impl Into<PathBuf>,
        store: Arc<ObjectStore>,
    ) -> SyncResult<Self> {
        let mut branch = Self {
            store,
            file_path: file_path.into(),
            commit,
            missing: BTreeMap::new(),
            incomplete: BTreeMap::new(),
            complete: BTreeSet::new(),
        };
        branch.missing.insert(branch.commit.root_id, BTreeSet::new());
        branch.store_self()?;
        Ok(branch)
    }

    /// Reload a persisted receiver. Refcounts already reflect its pins.
    pub fn load(file_path: impl Into<PathBuf>, store: Arc<ObjectStore>) -> SyncResult<Self> {
        let file_path = file_path.into();
        let bytes = fsutil::read_optional(&file_path)?
            .ok_or_else(|| std::io::Error::from(std::io::ErrorKind::NotFound))?;
        let mut r = WireReader::new(&bytes);

        let commit = Commit::decode(&mut r)?;
        let missing = decode_id_map(&mut r)?;
        let incomplete = decode_id_map(&mut r)?;
        let complete = decode_id_set(&mut r)?;
        r.finish()?;

        Ok(Self {
            store,
            file_path,
            commit,
            missing,
            incomplete,
            complete,
        })
    }

    pub fn commit(&self) -> &Commit {
        &self.commit
    }

    /// Ids the branch still needs from the peer, in ascending order.
    pub fn missing_objects(&self) -> impl Iterator<Item = &ObjectId> {
        self.missing.keys()
    }

    /// Stored objects still waiting on children.
    pub fn incomplete_objects(&self) -> impl Iterator<Item = &ObjectId> {
        self.incomplete.keys()
    }

    /// Roots of fully present subtrees.
    pub fn complete_objects(&self) -> impl Iterator<Item = &ObjectId> {
        self.complete.iter()
    }

    /// The whole target subtree is present once nothing is missing or
    /// pending.
    pub fn is_complete(&self) -> bool {
        self.missing.is_empty() && self.incomplete.is_empty()
    }

    /// Receive a file object.
    pub fn insert_blob(&mut self, blob: &Blob) -> SyncResult<ObjectId> {
        self.insert_object(blob.to_block(), BTreeSet::new())
    }

    /// Receive a directory object.
    pub fn insert_directory(&mut self, dir: &Directory) -> SyncResult<ObjectId> {
        self.insert_object(dir.to_block(), dir.unique_children())
    }

    fn insert_object(&mut self, block: Block, children: BTreeSet<ObjectId>) -> SyncResult<ObjectId> {
        let id = block.calculate_id();
        if self.missing.remove(&id).is_none() {
            // Duplicate receipt of something already tracked (or already
            // fully present) is a no-op; anything else was never asked for.
            if self.incomplete.contains_key(&id)
                || self.complete.contains(&id)
                || self.store.is_complete(&id)?
            {
                return Ok(id);
            }
            return Err(SyncError::UnexpectedObject(id));
        }

        // Children whose subtrees are already complete locally are re-used,
        // not re-fetched. Present-but-incomplete ones stay pending.
        let mut pending = BTreeSet::new();
        for child in children {
            if !self.store.is_complete(&child)? {
                pending.insert(child);
            }
        }

        let stored = self.store.store_block(&block)?;
        debug_assert_eq!(stored, id);

        if pending.is_empty() {
            self.store.increment_recursive(&id)?;
            self.mark_complete(id)?;
        } else {
            for child in &pending {
                self.missing.entry(*child).or_default().insert(id);
            }
            self.store.increment_direct(&id)?;
            self.incomplete.insert(id, pending);
        }

        self.store_self()?;
        Ok(id)
    }

    /// Record `id` as a complete subtree root and ripple the completion
    /// upward through every parent whose pending set empties.
    fn mark_complete(&mut self, id: ObjectId) -> SyncResult<()> {
        debug!(id = %id.short_hex(), "remote object complete");
        self.complete.insert(id);

        // The fresh recursive pin on `id` covers its children; release the
        // independent pins any of them hold as members of the complete pool.
        for child in self.store.load_any(&id)?.children() {
            if self.complete.remove(&child) {
                self.store.deep_remove(&child)?;
            }
        }

        let mut promoted = Vec::new();
        for (parent, pending) in self.incomplete.iter_mut() {
            if pending.remove(&id) && pending.is_empty() {
                promoted.push(*parent);
            }
        }
        for parent in promoted {
            self.incomplete.remove(&parent);
            self.store.convert_direct_to_recursive(&parent)?;
            self.mark_complete(parent)?;
        }
        Ok(())
    }

    /// Supersede the in-flight commit: release every pin this branch holds
    /// and reseed with the new root.
    pub fn introduce_commit(&mut self, commit: Commit) -> SyncResult<()> {
        debug!(
            old = %self.commit.root_id.short_hex(),
            new = %commit.root_id.short_hex(),
            "introducing new commit"
        );
        self.commit = commit;

        // Missing objects never held a pin.
        self.missing.clear();
        let incomplete = std::mem::take(&mut self.incomplete);
        let complete = std::mem::take(&mut self.complete);

        for id in incomplete.keys() {
            self.store.flat_remove(id)?;
        }
        for id in &complete {
            self.store.deep_remove(id)?;
        }

        self.missing.insert(self.commit.root_id, BTreeSet::new());
        self.store_self()
    }

    /// Capture the branch's current progress as an independent [`Snapshot`]:
    /// complete subtree roots deeply, incomplete objects flatly. The
    /// snapshot then lives (and unwinds) on its own.
    pub fn create_snapshot(&self, snapshotdir: &Path) -> SyncResult<Snapshot> {
        let mut snapshot =
            Snapshot::create(snapshotdir, self.store.clone(), self.commit.clone())?;
        for id in &self.complete {
            snapshot.capture_full_object(*id)?;
        }
        for id in self.incomplete.keys() {
            snapshot.capture_flat_object(*id)?;
        }
        Ok(snapshot)
    }

    /// Cross-check the pools against the object store.
    pub fn sanity_check(&self) -> SyncResult<()> {
        for id in self.incomplete.keys() {
            assert!(self.store.exists(id)?, "incomplete object {id} not stored");
        }
        for id in &self.complete {
            assert!(
                self.store.is_complete(id)?,
                "complete object {id} not recursively pinned"
            );
        }
        Ok(())
    }

    /// Persist `commit ‖ missing ‖ incomplete ‖ complete`.
    fn store_self(&self) -> SyncResult<()> {
        let mut w = WireWriter::new();
        self.commit.encode(&mut w);
        encode_id_map(&mut w, &self.missing);
        encode_id_map(&mut w, &self.incomplete);
        w.put_u32(self.complete.len() as u32);
        for id in &self.complete {
            id.encode(&mut w);
        }
        fsutil::atomic_write(&self.file_path, &w.into_bytes())?;
        Ok(())
    }
}

impl std::fmt::Debug for RemoteBranch {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RemoteBranch")
            .field("commit", &self.commit)
            .field("missing", &self.missing.len())
            .field("incomplete", &self.incomplete.len())
            .field("complete", &self.complete.len())
            .finish()
    }
}

fn encode_id_map(w: &mut WireWriter, map: &BTreeMap<ObjectId, BTreeSet<ObjectId>>) {
    w.put_u32(map.len() as u32);
    for (id, ids) in map {
        id.encode(w);
        w.put_u32(ids.len() as u32);
        for other in ids {
            other.encode(w);
        }
    }
}

fn decode_id_map(
    r: &mut WireReader<'_>,
) -> Result<BTreeMap<ObjectId, BTreeSet<ObjectId>>, SyncError> {
    let count = r.get_u32()?;
    let mut map = BTreeMap::new();
    for _ in 0..count {
        let id = ObjectId::decode(r)?;
        map.insert(id, decode_id_set(r)?);
    }
    Ok(map)
}

fn decode_id_set(r: &mut WireReader<'_>) -> Result<BTreeSet<ObjectId>, SyncError> {
    let count = r.get_u32()?;
    let mut ids = BTreeSet::new();
    for _ in 0..count {
        ids.insert(ObjectId::decode(r)?);
    }
    Ok(ids)
}
