use std::sync::{Arc, RwLock};

use strand_store::{Directory, Object, ObjectStore, StoreError};
use strand_types::{Commit, ObjectId, UserId, VersionVector, VersionedObject};
use tracing::debug;

use crate::error::{BranchError, BranchResult};
use crate::index::Index;

/// A user's rooted object graph.
///
/// The branch itself is lightweight: the authoritative state (head commit
/// and reachability edges) lives in the shared [`Index`]. All mutation goes
/// through a [`RootOp`], obtained with [`root_op`](Self::root_op); the
/// `&mut self` receiver makes the op the only open handle to this branch's
/// mutation path for its lifetime.
pub struct Branch {
    user: UserId,
    store: Arc<ObjectStore>,
    index: Arc<RwLock<Index>>,
}

impl Branch {
    /// Open `user`'s branch, creating it at an empty directory root if the
    /// index has no commit for them yet.
    pub fn load_or_create(
        user: UserId,
        store: Arc<ObjectStore>,
        index: Arc<RwLock<Index>>,
    ) -> BranchResult<Self> {
        {
            let mut index = index.write().expect("lock poisoned");
            if index.commit_of(&user).is_none() {
                let root_id = store.store_directory(&Directory::new())?;
                index.insert_edge(user, root_id, root_id);
                index.set_commit(user, Commit::new(root_id, VersionVector::new()));
                debug!(user = %user, root = %root_id.short_hex(), "created empty branch");
            }
        }
        Ok(Self { user, store, index })
    }

    pub fn user(&self) -> &UserId {
        &self.user
    }

    /// The branch's published head.
    pub fn head(&self) -> Commit {
        self.index
            .read()
            .expect("lock poisoned")
            .commit_of(&self.user)
            .expect("branch exists in index")
            .clone()
    }

    /// The branch's current version vector.
    pub fn version_vector(&self) -> VersionVector {
        self.head().versions
    }

    /// Begin a root mutation. Loads the root directory; mutations stay in
    /// memory until [`RootOp::commit`]. Dropping the op without committing
    /// leaves no trace in the index or the store.
    pub fn root_op(&mut self) -> BranchResult<RootOp<'_>> {
        let base = self.head();
        let tree = self.store.load_directory(&base.root_id)?;
        Ok(RootOp { branch: self, base, tree })
    }
}

impl std::fmt::Debug for Branch {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Branch").field("user", &self.user).finish()
    }
}

/// A short-lived transaction over a branch's root directory.
pub struct RootOp<'a> {
    branch: &'a mut Branch,
    base: Commit,
    tree: Directory,
}

impl RootOp<'_> {
    /// The in-memory tree being edited.
    pub fn tree(&self) -> &Directory {
        &self.tree
    }

    /// The commit this op is editing on top of.
    pub fn base(&self) -> &Commit {
        &self.base
    }

    /// Insert or replace the entry for `(name, user)`.
    pub fn insert(
        &mut self,
        name: impl Into<String>,
        user: UserId,
        object: VersionedObject,
    ) -> Option<VersionedObject> {
        self.tree.insert(name, user, object)
    }

    /// Remove the entry for `(name, user)`.
    pub fn remove(&mut self, name: &str, user: &UserId) -> Option<VersionedObject> {
        self.tree.remove(name, user)
    }

    /// Remove every user entry under `name`.
    pub fn remove_all(&mut self, name: &str) -> usize {
        self.tree.remove_all(name)
    }

    /// Publish the edited tree as the branch's new head.
    ///
    /// Returns `false` without writing anything when the tree is identical
    /// to the base root. Otherwise: the tree block is persisted, edges from
    /// the new root to each distinct child plus the root self-edge are
    /// inserted, the merged version vector is published, and only then is
    /// the old subtree unlinked -- descending exclusively along paths no
    /// other edge keeps alive.
    pub fn commit(self) -> BranchResult<bool> {
        let user = self.branch.user;
        let new_id = self.tree.calculate_id();
        if new_id == self.base.root_id {
            return Ok(false);
        }

        // Validate the published vector before touching any shared state,
        // so a rejected commit leaves no edges or blocks behind.
        let versions = merged_versions(&self.base.versions, &self.tree, &user)?;

        let saved = self.tree.save(&self.branch.store)?;
        assert_eq!(saved, new_id, "saved tree must hash to its computed id");

        {
            let mut index = self.branch.index.write().expect("lock poisoned");
            for child in self.tree.unique_children() {
                index.insert_edge(user, child, new_id);
            }
            index.insert_edge(user, new_id, new_id);
            index.set_commit(user, Commit::new(new_id, versions));
        }

        debug!(
            user = %user,
            old = %self.base.root_id.short_hex(),
            new = %new_id.short_hex(),
            "branch committed"
        );

        remove_recursive(
            &self.branch.store,
            &self.branch.index,
            &user,
            self.base.root_id,
            self.base.root_id,
        )?;
        Ok(true)
    }
}

/// Published vector for a commit: the union of the tree's entry stamps,
/// merged with the base vector bumped once for the committing user.
fn merged_versions(
    base: &VersionVector,
    tree: &Directory,
    user: &UserId,
) -> BranchResult<VersionVector> {
    let union = tree.version_vector_union();
    let mut target = base.clone();
    target.increment(*user);

    let attempted = union.version_of(user);
    if attempted > target.version_of(user) {
        return Err(BranchError::VersionRegression {
            user: user.short_hex(),
            current: base.version_of(user),
            attempted,
        });
    }
    Ok(union.merge(&target))
}

/// Unlink `id` (reached through `parent`) from `user`'s root and reclaim
/// whatever becomes unreachable.
///
/// The edge is removed first; if any other edge still names `id`, the walk
/// stops -- the object is retained by another root or an inner share point.
/// Otherwise the walk descends into the children before removing the block
/// itself, which only happens once the refcounts agree nobody else pins it.
/// The index lock is scoped to the edge step: block deletion may consult an
/// [`IndexRetainer`](crate::IndexRetainer) that takes its own read lock.
fn remove_recursive(
    store: &ObjectStore,
    index: &Arc<RwLock<Index>>,
    user: &UserId,
    id: ObjectId,
    parent: ObjectId,
) -> BranchResult<()> {
    {
        let mut index = index.write().expect("lock poisoned");
        index.remove_edge(user, &id, &parent);
        if index.someone_has(&id) {
            return Ok(());
        }
    }

    let object = match store.load_any(&id) {
        Ok(object) => object,
        // A partial replica may hold edges to children it never fetched.
        Err(StoreError::NotFound(_)) => return Ok(()),
        Err(e) => return Err(e.into()),
    };
    if let Object::Directory(dir) = &object {
        for child in dir.unique_children() {
            remove_recursive(store, index, user, child, id)?;
        }
    }
    store.remove_if_unpinned(&id)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use strand_store::Blob;

    struct Fixture {
        store: Arc<ObjectStore>,
        index: Arc<RwLock<Index>>,
        user: UserId,
    }

    impl Fixture {
        fn new() -> Self {
            Self {
                store: Arc::new(ObjectStore::in_memory()),
                index: Arc::new(RwLock::new(Index::new())),
                user: UserId::derive(b"local"),
            }
        }

        fn branch(&self) -> Branch {
            Branch::load_or_create(self.user, self.store.clone(), self.index.clone()).unwrap()
        }

        fn store_blob(&self, text: &str) -> ObjectId {
            self.store.store_blob(&Blob::new(text.as_bytes().to_vec())).unwrap()
        }

        fn versioned(&self, id: ObjectId, version: u64) -> VersionedObject {
            let mut versions = VersionVector::new();
            versions.set_version(self.user, version).unwrap();
            VersionedObject::new(id, versions)
        }

        fn has_edge(&self, child: &ObjectId, parent: &ObjectId) -> bool {
            self.index
                .read()
                .unwrap()
                .has_edge(&self.user, child, parent)
        }
    }

    #[test]
    fn fresh_branch_roots_an_empty_directory() {
        let fx = Fixture::new();
        let branch = fx.branch();
        let head = branch.head();

        assert_eq!(head.root_id, Directory::new().calculate_id());
        assert!(head.versions.is_empty());
        assert!(fx.has_edge(&head.root_id, &head.root_id));
        assert!(fx.store.exists(&head.root_id).unwrap());
    }

    #[test]
    fn empty_commit_is_a_noop() {
        let fx = Fixture::new();
        let mut branch = fx.branch();
        let head = branch.head();
        let edges_before = fx.index.read().unwrap().edge_count();

        let op = branch.root_op().unwrap();
        assert!(!op.commit().unwrap());

        assert_eq!(branch.head(), head);
        assert_eq!(fx.index.read().unwrap().edge_count(), edges_before);
    }

    #[test]
    fn single_file_add() {
        let fx = Fixture::new();
        let mut branch = fx.branch();
        let old_root = branch.head().root_id;
        let blob_id = fx.store_blob("contents of a");

        let mut op = branch.root_op().unwrap();
        op.insert("a", fx.user, fx.versioned(blob_id, 1));
        assert!(op.commit().unwrap());

        let head = branch.head();
        assert_ne!(head.root_id, old_root);
        assert_eq!(head.versions.version_of(&fx.user), 1);
        // New edges: child and self-edge.
        assert!(fx.has_edge(&blob_id, &head.root_id));
        assert!(fx.has_edge(&head.root_id, &head.root_id));
        // Old empty root was unlinked and reclaimed.
        assert!(!fx.has_edge(&old_root, &old_root));
        assert!(!fx.store.exists(&old_root).unwrap());
    }

    #[test]
    fn deleting_the_last_reference_reclaims_the_blob() {
        let fx = Fixture::new();
        let mut branch = fx.branch();
        let blob_id = fx.store_blob("shared blob");

        let mut op = branch.root_op().unwrap();
        op.insert("a", fx.user, fx.versioned(blob_id, 1));
        op.insert("b", fx.user, fx.versioned(blob_id, 1));
        op.commit().unwrap();
        let full_root = branch.head().root_id;

        let mut op = branch.root_op().unwrap();
        op.remove_all("a");
        op.remove_all("b");
        assert!(op.commit().unwrap());

        let head = branch.head();
        assert_eq!(head.root_id, Directory::new().calculate_id());
        // Both counts zero, no surviving edges: the blob is gone.
        assert!(!fx.store.exists(&blob_id).unwrap());
        assert!(!fx.store.exists(&full_root).unwrap());
        assert!(!fx.index.read().unwrap().someone_has(&blob_id));
        // The new (empty) root persists.
        assert!(fx.store.exists(&head.root_id).unwrap());
    }

    #[test]
    fn shared_child_survives_while_any_edge_remains() {
        let fx = Fixture::new();
        let mut branch = fx.branch();
        let keep = fx.store_blob("keep");
        let drop_ = fx.store_blob("drop");

        let mut op = branch.root_op().unwrap();
        op.insert("keep", fx.user, fx.versioned(keep, 1));
        op.insert("drop", fx.user, fx.versioned(drop_, 1));
        op.commit().unwrap();

        let mut op = branch.root_op().unwrap();
        op.remove_all("drop");
        op.commit().unwrap();

        // The kept blob moved to the new root's edge set; the dropped one
        // lost its last edge and was reclaimed.
        assert!(fx.store.exists(&keep).unwrap());
        assert!(!fx.store.exists(&drop_).unwrap());
        assert!(fx.has_edge(&keep, &branch.head().root_id));
    }

    #[test]
    fn version_vector_is_monotone_and_bumps_by_one() {
        let fx = Fixture::new();
        let mut branch = fx.branch();
        let mut previous = branch.version_vector();

        for round in 1..=3u64 {
            let blob_id = fx.store_blob(&format!("round {round}"));
            let mut op = branch.root_op().unwrap();
            op.insert(format!("file-{round}"), fx.user, fx.versioned(blob_id, round));
            assert!(op.commit().unwrap());

            let current = branch.version_vector();
            assert!(previous.happens_before(&current));
            assert_eq!(current.version_of(&fx.user), previous.version_of(&fx.user) + 1);
            previous = current;
        }
    }

    #[test]
    fn empty_tree_commit_still_bumps_the_local_counter() {
        let fx = Fixture::new();
        let mut branch = fx.branch();
        let blob_id = fx.store_blob("transient");

        let mut op = branch.root_op().unwrap();
        op.insert("f", fx.user, fx.versioned(blob_id, 1));
        op.commit().unwrap();

        let mut op = branch.root_op().unwrap();
        op.remove_all("f");
        op.commit().unwrap();

        // The union over the now-empty tree is empty; the bump comes from
        // the base vector.
        assert_eq!(branch.version_vector().version_of(&fx.user), 2);
    }

    #[test]
    fn overstamped_commit_is_rejected_without_side_effects() {
        let fx = Fixture::new();
        let mut branch = fx.branch();
        let blob_id = fx.store_blob("skip ahead");
        let edges_before = fx.index.read().unwrap().edge_count();
        let head_before = branch.head();

        let mut op = branch.root_op().unwrap();
        // Claims local version 5 on top of version 0.
        op.insert("f", fx.user, fx.versioned(blob_id, 5));
        let err = op.commit().unwrap_err();
        assert!(matches!(err, BranchError::VersionRegression { attempted: 5, .. }));

        assert_eq!(branch.head(), head_before);
        assert_eq!(fx.index.read().unwrap().edge_count(), edges_before);
    }

    #[test]
    fn dropping_a_root_op_changes_nothing() {
        let fx = Fixture::new();
        let mut branch = fx.branch();
        let blob_id = fx.store_blob("abandoned");
        let head_before = branch.head();
        let edges_before = fx.index.read().unwrap().edge_count();

        {
            let mut op = branch.root_op().unwrap();
            op.insert("f", fx.user, fx.versioned(blob_id, 1));
            // Dropped without commit.
        }

        assert_eq!(branch.head(), head_before);
        assert_eq!(fx.index.read().unwrap().edge_count(), edges_before);
    }

    #[test]
    fn two_users_share_an_index_and_a_child() {
        let fx = Fixture::new();
        let other_user = UserId::derive(b"other");
        let mut mine =
            Branch::load_or_create(fx.user, fx.store.clone(), fx.index.clone()).unwrap();
        let mut theirs =
            Branch::load_or_create(other_user, fx.store.clone(), fx.index.clone()).unwrap();

        let shared = fx.store_blob("shared across users");

        let mut op = mine.root_op().unwrap();
        op.insert("s", fx.user, fx.versioned(shared, 1));
        op.commit().unwrap();

        let mut op = theirs.root_op().unwrap();
        let mut versions = VersionVector::new();
        versions.set_version(other_user, 1).unwrap();
        op.insert("s", other_user, VersionedObject::new(shared, versions));
        op.commit().unwrap();

        // My branch drops the blob; the other user's edge keeps it.
        let mut op = mine.root_op().unwrap();
        op.remove_all("s");
        op.commit().unwrap();

        assert!(fx.store.exists(&shared).unwrap());
        assert!(fx.index.read().unwrap().someone_has(&shared));
    }
}
