use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use strand_crypto::Hasher;
use strand_store::{fsutil, ObjectStore, StoreError};
use strand_types::{Commit, ObjectId, TypeError, WireReader, WireWriter};
use tracing::{debug, warn};

use crate::error::{SyncError, SyncResult};
use crate::name_tag::NameTag;

/// Lifecycle stage of one object within a snapshot.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum NodeType {
    /// Known to be needed, not yet stored.
    Missing = 0,
    /// Stored and pinned directly; some children still outstanding.
    Incomplete = 1,
    /// Stored with its whole subtree; pinned recursively. Terminal.
    Complete = 2,
}

impl Default for NodeType {
    fn default() -> Self {
        Self::Missing
    }
}

impl NodeType {
    fn from_byte(byte: u8) -> Result<Self, TypeError> {
        match byte {
            0 => Ok(Self::Missing),
            1 => Ok(Self::Incomplete),
            2 => Ok(Self::Complete),
            other => Err(TypeError::Malformed(format!(
                "unknown snapshot node type {other:#04x}"
            ))),
        }
    }
}

/// A node's children, partitioned by their current standing in the object
/// store at classification time.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
struct Children {
    missing: BTreeSet<ObjectId>,
    incomplete: BTreeSet<ObjectId>,
    complete: BTreeSet<ObjectId>,
}

impl Children {
    /// Nothing left to wait for.
    fn all_complete(&self) -> bool {
        self.missing.is_empty() && self.incomplete.is_empty()
    }
}

/// Graph bookkeeping for one object. Parents and children are held as id
/// sets -- the node map is the single owner and all traversal is by lookup,
/// so the bidirectional edges never form an ownership cycle.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
struct Node {
    node_type: NodeType,
    parents: BTreeSet<ObjectId>,
    children: Children,
}

/// Refcount-stable view of one commit while its objects arrive in
/// arbitrary order.
///
/// Every stored object tracked by the snapshot is pinned at all times:
/// directly while its subtree is incomplete, recursively once complete.
/// When a node completes, its recursive pin covers its children, so any
/// independent pins those children held are released and their nodes
/// elided -- after full delivery only the root node remains, holding
/// `recursive = 1`.
///
/// Dropping the snapshot (or calling [`forget`](Self::forget)) releases
/// every pin it established and deletes its state file. Cleanup is
/// best-effort: I/O failures are logged and skipped, never propagated.
pub struct Snapshot {
    id: ObjectId,
    commit: Commit,
    name_tag: NameTag,
    path: PathBuf,
    store: Arc<ObjectStore>,
    nodes: BTreeMap<ObjectId, Node>,
    forgotten: bool,
}

impl Snapshot {
    /// Start an empty snapshot of `commit`: a single `Missing` node for the
    /// root, persisted under a fresh random name tag.
    pub fn create(
        snapshotdir: &Path,
        store: Arc<ObjectStore>,
        commit: Commit,
    ) -> SyncResult<Self> {
        std::fs::create_dir_all(snapshotdir)?;
        let name_tag = NameTag::random();
        let path = snapshotdir.join(name_tag.to_hex());

        let mut nodes = BTreeMap::new();
        nodes.insert(commit.root_id, Node::default());

        let snapshot = Self {
            id: calculate_id(&commit),
            commit,
            name_tag,
            path,
            store,
            nodes,
            forgotten: false,
        };
        snapshot.store_self()?;
        Ok(snapshot)
    }

    /// Reload a persisted snapshot. Refcounts already reflect its pins, so
    /// nothing is re-applied.
    pub fn load(
        snapshotdir: &Path,
        name_tag: NameTag,
        store: Arc<ObjectStore>,
        commit: Commit,
    ) -> SyncResult<Self> {
        let path = snapshotdir.join(name_tag.to_hex());
        let bytes = fsutil::read_optional(&path)?
            .ok_or_else(|| StoreError::NotFound(commit.root_id))?;
        let nodes = decode_nodes(&bytes)?;
        Ok(Self {
            id: calculate_id(&commit),
            commit,
            name_tag,
            path,
            store,
            nodes,
            forgotten: false,
        })
    }

    /// Snapshot identity, derived from the commit it views.
    pub fn id(&self) -> &ObjectId {
        &self.id
    }

    pub fn commit(&self) -> &Commit {
        &self.commit
    }

    pub fn name_tag(&self) -> &NameTag {
        &self.name_tag
    }

    /// Number of objects currently tracked.
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// The tracked stage of `id`, if any.
    pub fn node_type_of(&self, id: &ObjectId) -> Option<NodeType> {
        self.nodes.get(id).map(|node| node.node_type)
    }

    /// Record the arrival of object `id` with the given child set. The
    /// block itself must already be in the object store.
    ///
    /// Children may arrive before any parent names them; duplicates are
    /// no-ops. Returns `true` if the snapshot's state changed.
    pub fn insert_object(&mut self, id: ObjectId, children: &BTreeSet<ObjectId>) -> SyncResult<bool> {
        if let Some(node) = self.nodes.get(&id) {
            if node.node_type != NodeType::Missing {
                return Ok(false);
            }
        } else if self.store.is_complete(&id)? {
            // An object nobody tracks and whose subtree is already complete
            // in the store needs no pin from us; parents will classify it.
            return Ok(false);
        }
        if !self.store.exists(&id)? {
            return Err(StoreError::NotFound(id).into());
        }

        let sorted = self.sort_children(children)?;
        for child in sorted.missing.iter().chain(&sorted.incomplete) {
            self.nodes.entry(*child).or_default().parents.insert(id);
        }

        let node = self.nodes.entry(id).or_default();
        let completed = sorted.all_complete();
        node.children = sorted;
        if completed {
            node.node_type = NodeType::Complete;
            self.store.increment_recursive(&id)?;
            self.on_node_completed(id)?;
        } else {
            node.node_type = NodeType::Incomplete;
            self.store.increment_direct(&id)?;
        }

        self.store_self()?;
        Ok(true)
    }

    /// Seed a node whose entire subtree is known to be present (used when a
    /// snapshot is taken of an already-complete branch).
    pub fn capture_full_object(&mut self, id: ObjectId) -> SyncResult<()> {
        let node = self.nodes.entry(id).or_default();
        if node.node_type != NodeType::Missing {
            return Ok(());
        }
        node.node_type = NodeType::Complete;
        self.store.increment_recursive(&id)?;
        self.store_self()
    }

    /// Seed a stored-but-incomplete node, discovering its children from the
    /// stored block.
    pub fn capture_flat_object(&mut self, id: ObjectId) -> SyncResult<()> {
        let children = self.store.load_any(&id)?.children();
        self.insert_object(id, &children)?;
        Ok(())
    }

    /// Classify each child by its current standing in the object store.
    fn sort_children(&self, children: &BTreeSet<ObjectId>) -> SyncResult<Children> {
        let mut sorted = Children::default();
        for child in children {
            if !self.store.exists(child)? {
                sorted.missing.insert(*child);
            } else if self.store.is_complete(child)? {
                sorted.complete.insert(*child);
            } else {
                sorted.incomplete.insert(*child);
            }
        }
        Ok(sorted)
    }

    /// Post-completion bookkeeping for a node that just turned `Complete`:
    /// its recursive pin now covers its children, so tracked complete
    /// children drop their own pins and leave the map; then every parent is
    /// told this child is done.
    fn on_node_completed(&mut self, id: ObjectId) -> SyncResult<()> {
        debug!(id = %id.short_hex(), "snapshot node complete");
        self.subsume_complete_children(&id)?;
        let parents: Vec<ObjectId> = self.nodes[&id].parents.iter().copied().collect();
        for parent in parents {
            self.notify_parent_that_child_completed(parent, id)?;
        }
        Ok(())
    }

    fn subsume_complete_children(&mut self, id: &ObjectId) -> SyncResult<()> {
        let complete: Vec<ObjectId> = self.nodes[id].children.complete.iter().copied().collect();
        for child in complete {
            if self.nodes.get(&child).map(|n| n.node_type) == Some(NodeType::Complete) {
                self.store.deep_remove(&child)?;
                self.nodes.remove(&child);
            }
        }
        Ok(())
    }

    fn notify_parent_that_child_completed(
        &mut self,
        parent_id: ObjectId,
        child_id: ObjectId,
    ) -> SyncResult<()> {
        let Some(parent) = self.nodes.get_mut(&parent_id) else {
            return Ok(());
        };
        if parent.node_type != NodeType::Incomplete {
            return Ok(());
        }

        let was_missing = parent.children.missing.remove(&child_id);
        let was_incomplete = !was_missing && parent.children.incomplete.remove(&child_id);
        assert!(
            was_missing || was_incomplete,
            "completed child {child_id} not pending under parent {parent_id}"
        );
        parent.children.complete.insert(child_id);

        if parent.children.all_complete() {
            parent.node_type = NodeType::Complete;
            self.store.convert_direct_to_recursive(&parent_id)?;
            self.on_node_completed(parent_id)?;
        }
        Ok(())
    }

    /// Duplicate this snapshot under a fresh name tag, re-establishing one
    /// pin per tracked node so the two views are mutually independent.
    pub fn try_clone(&self) -> SyncResult<Self> {
        let name_tag = NameTag::random();
        let path = self
            .path
            .parent()
            .expect("snapshot path has a parent directory")
            .join(name_tag.to_hex());

        let mut pinned: Vec<(ObjectId, NodeType)> = Vec::new();
        let result = (|| -> SyncResult<()> {
            for (id, node) in &self.nodes {
                match node.node_type {
                    NodeType::Complete => self.store.increment_recursive(id)?,
                    NodeType::Incomplete => self.store.increment_direct(id)?,
                    NodeType::Missing => continue,
                }
                pinned.push((*id, node.node_type));
            }
            Ok(())
        })();
        if let Err(e) = result {
            // Roll the partial pins back before surfacing the error.
            for (id, node_type) in pinned {
                let rollback = match node_type {
                    NodeType::Complete => self.store.deep_remove(&id),
                    NodeType::Incomplete => self.store.flat_remove(&id),
                    NodeType::Missing => Ok(()),
                };
                if let Err(e) = rollback {
                    warn!(id = %id.short_hex(), error = %e, "failed to roll back clone pin");
                }
            }
            return Err(e);
        }

        let clone = Self {
            id: self.id,
            commit: self.commit.clone(),
            name_tag,
            path,
            store: self.store.clone(),
            nodes: self.nodes.clone(),
            forgotten: false,
        };
        clone.store_self()?;
        Ok(clone)
    }

    /// Release every pin this snapshot holds and delete its state file.
    /// Idempotent; also runs on drop. Never propagates errors.
    pub fn forget(&mut self) {
        if self.forgotten {
            return;
        }
        self.forgotten = true;

        for (id, node) in std::mem::take(&mut self.nodes) {
            let released = match node.node_type {
                NodeType::Complete => self.store.deep_remove(&id),
                NodeType::Incomplete => self.store.flat_remove(&id),
                NodeType::Missing => Ok(()),
            };
            if let Err(e) = released {
                warn!(id = %id.short_hex(), error = %e, "failed to release snapshot pin");
            }
        }
        if let Err(e) = fsutil::remove_optional(&self.path) {
            warn!(path = %self.path.display(), error = %e, "failed to remove snapshot state");
        }
    }

    /// Cross-check the node map against the object store: incomplete nodes
    /// must be stored with a live pin, complete nodes recursively pinned,
    /// and every parent link must resolve.
    pub fn sanity_check(&self) -> SyncResult<()> {
        for (id, node) in &self.nodes {
            match node.node_type {
                NodeType::Missing => {}
                NodeType::Incomplete => {
                    assert!(self.store.exists(id)?, "incomplete node {id} not stored");
                    let rc = self.store.read_refcount(id)?;
                    assert!(!rc.is_zero(), "incomplete node {id} unpinned");
                }
                NodeType::Complete => {
                    assert!(self.store.is_complete(id)?, "complete node {id} not pinned");
                }
            }
            for parent in &node.parents {
                assert!(
                    self.nodes.contains_key(parent),
                    "dangling parent link {parent} on {id}"
                );
            }
        }
        Ok(())
    }

    /// Persist the node map to `<snapshotdir>/<hex(name_tag)>`.
    fn store_self(&self) -> SyncResult<()> {
        let mut w = WireWriter::new();
        w.put_u32(self.nodes.len() as u32);
        for (id, node) in &self.nodes {
            id.encode(&mut w);
            w.put_u8(node.node_type as u8);
            encode_id_set(&mut w, &node.parents);
            encode_id_set(&mut w, &node.children.missing);
            encode_id_set(&mut w, &node.children.incomplete);
            encode_id_set(&mut w, &node.children.complete);
        }
        fsutil::atomic_write(&self.path, &w.into_bytes())?;
        Ok(())
    }
}

impl Drop for Snapshot {
    fn drop(&mut self) {
        self.forget();
    }
}

impl std::fmt::Debug for Snapshot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Snapshot")
            .field("commit", &self.commit)
            .field("name_tag", &self.name_tag)
            .field("nodes", &self.nodes.len())
            .finish()
    }
}

fn calculate_id(commit: &Commit) -> ObjectId {
    let mut w = WireWriter::new();
    commit.encode(&mut w);
    let mut hasher = Hasher::new();
    hasher.update(b"Snapshot");
    hasher.update(&w.into_bytes());
    hasher.finalize()
}

fn encode_id_set(w: &mut WireWriter, ids: &BTreeSet<ObjectId>) {
    w.put_u32(ids.len() as u32);
    for id in ids {
        id.encode(w);
    }
}

fn decode_id_set(r: &mut WireReader<'_>) -> Result<BTreeSet<ObjectId>, TypeError> {
    let count = r.get_u32()?;
    let mut ids = BTreeSet::new();
    for _ in 0..count {
        ids.insert(ObjectId::decode(r)?);
    }
    Ok(ids)
}

fn decode_nodes(bytes: &[u8]) -> Result<BTreeMap<ObjectId, Node>, SyncError> {
    let mut r = WireReader::new(bytes);
    let count = r.get_u32()?;
    let mut nodes = BTreeMap::new();
    for _ in 0..count {
        let id = ObjectId::decode(&mut r)?;
        let node_type = NodeType::from_byte(r.get_u8()?)?;
        let parents = decode_id_set(&mut r)?;
        let missing = decode_id_set(&mut r)?;
        let incomplete = decode_id_set(&mut r)?;
        let complete = decode_id_set(&mut r)?;
        nodes.insert(
            id,
            Node {
                node_type,
                parents,
                children: Children { missing, incomplete, complete },
            },
        );
    }
    r.finish()?;
    Ok(nodes)
}
