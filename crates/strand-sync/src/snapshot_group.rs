use std::collections::BTreeMap;

use strand_crypto::Hasher;
use strand_types::{ObjectId, UserId};

use crate::snapshot::Snapshot;

/// One snapshot per user, bundled under a single group identity.
///
/// The id commits to the group's membership: it hashes the size and the
/// sorted `(user_id, snapshot_id)` pairs, so two groups over the same
/// per-user commits are interchangeable. Dropping the group forgets every
/// contained snapshot.
pub struct SnapshotGroup {
    id: ObjectId,
    snapshots: BTreeMap<UserId, Snapshot>,
}

impl SnapshotGroup {
    pub fn new(snapshots: BTreeMap<UserId, Snapshot>) -> Self {
        let id = calculate_id(&snapshots);
        Self { id, snapshots }
    }

    /// The group identity.
    pub fn id(&self) -> &ObjectId {
        &self.id
    }

    /// Number of snapshots in the group.
    pub fn len(&self) -> usize {
        self.snapshots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.snapshots.is_empty()
    }

    /// The snapshot held for `user`, if any.
    pub fn get(&self, user: &UserId) -> Option<&Snapshot> {
        self.snapshots.get(user)
    }

    /// Iterate snapshots in ascending user order.
    pub fn iter(&self) -> impl Iterator<Item = (&UserId, &Snapshot)> {
        self.snapshots.iter()
    }
}

impl std::fmt::Debug for SnapshotGroup {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SnapshotGroup")
            .field("id", &self.id)
            .field("snapshots", &self.snapshots.len())
            .finish()
    }
}

fn calculate_id(snapshots: &BTreeMap<UserId, Snapshot>) -> ObjectId {
    let mut hasher = Hasher::new();
    hasher.update(b"SnapshotGroup");
    hasher.update(&(snapshots.len() as u32).to_le_bytes());
    for (user, snapshot) in snapshots {
        hasher.update(user.as_bytes());
        hasher.update(snapshot.id().as_bytes());
    }
    hasher.finalize()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeSet;
    use std::sync::Arc;

    use strand_store::{Blob, ObjectStore};
    use strand_types::{Commit, VersionVector};

    fn snapshot_for(
        dir: &std::path::Path,
        store: &Arc<ObjectStore>,
        root: ObjectId,
    ) -> Snapshot {
        let commit = Commit::new(root, VersionVector::new());
        Snapshot::create(dir, store.clone(), commit).unwrap()
    }

    #[test]
    fn group_id_depends_on_membership_not_tags() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(ObjectStore::in_memory());
        let (u1, u2) = (UserId::derive(b"u1"), UserId::derive(b"u2"));
        let root = ObjectId::from_hash([1; 32]);

        let mut a = BTreeMap::new();
        a.insert(u1, snapshot_for(dir.path(), &store, root));
        a.insert(u2, snapshot_for(dir.path(), &store, root));
        let group_a = SnapshotGroup::new(a);

        // Same commits, fresh snapshots (fresh name tags): same id.
        let mut b = BTreeMap::new();
        b.insert(u1, snapshot_for(dir.path(), &store, root));
        b.insert(u2, snapshot_for(dir.path(), &store, root));
        let group_b = SnapshotGroup::new(b);

        assert_eq!(group_a.id(), group_b.id());
        assert_eq!(group_a.len(), 2);

        // A group over different membership differs.
        let mut c = BTreeMap::new();
        c.insert(u1, snapshot_for(dir.path(), &store, root));
        let group_c = SnapshotGroup::new(c);
        assert_ne!(group_a.id(), group_c.id());
    }

    #[test]
    fn dropping_the_group_forgets_every_snapshot() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(ObjectStore::in_memory());
        let user = UserId::derive(b"u");

        let blob = Blob::new(b"held by the group".to_vec());
        let root = store.store_blob(&blob).unwrap();

        let mut snapshot = snapshot_for(dir.path(), &store, root);
        snapshot.insert_object(root, &BTreeSet::new()).unwrap();
        assert!(store.is_complete(&root).unwrap());

        let mut members = BTreeMap::new();
        members.insert(user, snapshot);
        let group = SnapshotGroup::new(members);

        drop(group);
        assert!(!store.exists(&root).unwrap());
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }
}
