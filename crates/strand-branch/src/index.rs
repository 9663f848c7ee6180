use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, RwLock};

use serde::{Deserialize, Serialize};
use strand_store::Retainer;
use strand_types::{Commit, ObjectId, UserId};

/// Branch-wide reachability index.
///
/// Tracks each user's published head commit and the parent relation that
/// keeps objects alive: an edge `(user, child, parent)` means `child` is
/// reachable from `user`'s root through `parent`. Roots anchor themselves
/// with a self-edge. An object is live as long as *any* user's edge names
/// it as a child -- that is what [`someone_has`](Self::someone_has) answers,
/// and it is the only question branch GC asks before descending.
///
/// The index is shared between branches (wrap it in `Arc<RwLock<_>>`), but
/// only one user's `RootOp` mutates that user's edges at a time. To stop
/// refcount GC from deleting blocks the index still reaches, install an
/// [`IndexRetainer`] on the object store.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Index {
    commits: BTreeMap<UserId, Commit>,
    /// child → set of (user, parent) edges naming it.
    edges: BTreeMap<ObjectId, BTreeSet<(UserId, ObjectId)>>,
}

impl Index {
    /// Create an empty index.
    pub fn new() -> Self {
        Self::default()
    }

    /// The published head of `user`, if any.
    pub fn commit_of(&self, user: &UserId) -> Option<&Commit> {
        self.commits.get(user)
    }

    /// Publish `user`'s head.
    pub fn set_commit(&mut self, user: UserId, commit: Commit) {
        self.commits.insert(user, commit);
    }

    /// All published heads, in ascending user order.
    pub fn commits(&self) -> impl Iterator<Item = (&UserId, &Commit)> {
        self.commits.iter()
    }

    /// Record that `child` is reachable from `user`'s root through
    /// `parent`. Returns `false` if the edge already existed.
    pub fn insert_edge(&mut self, user: UserId, child: ObjectId, parent: ObjectId) -> bool {
        self.edges.entry(child).or_default().insert((user, parent))
    }

    /// Remove one edge. Returns `false` if it was not present.
    pub fn remove_edge(&mut self, user: &UserId, child: &ObjectId, parent: &ObjectId) -> bool {
        let Some(set) = self.edges.get_mut(child) else {
            return false;
        };
        let removed = set.remove(&(*user, *parent));
        if set.is_empty() {
            self.edges.remove(child);
        }
        removed
    }

    /// Returns `true` while any user's edge still names `obj` as a child.
    pub fn someone_has(&self, obj: &ObjectId) -> bool {
        self.edges.contains_key(obj)
    }

    /// Whether the exact edge `(user, child, parent)` exists.
    pub fn has_edge(&self, user: &UserId, child: &ObjectId, parent: &ObjectId) -> bool {
        self.edges
            .get(child)
            .is_some_and(|set| set.contains(&(*user, *parent)))
    }

    /// Total number of edges.
    pub fn edge_count(&self) -> usize {
        self.edges.values().map(|set| set.len()).sum()
    }
}

/// [`Retainer`] adapter: vetoes physical deletion of any block the index
/// still reaches, leaving it as an orphan for a later sweep.
pub struct IndexRetainer {
    index: Arc<RwLock<Index>>,
}

impl IndexRetainer {
    pub fn new(index: Arc<RwLock<Index>>) -> Self {
        Self { index }
    }
}

impl Retainer for IndexRetainer {
    fn retains(&self, id: &ObjectId) -> bool {
        self.index.read().expect("lock poisoned").someone_has(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user(seed: u8) -> UserId {
        UserId::derive(&[seed])
    }

    fn id(seed: u8) -> ObjectId {
        ObjectId::from_hash([seed; 32])
    }

    #[test]
    fn edges_insert_and_remove() {
        let mut index = Index::new();
        assert!(index.insert_edge(user(1), id(10), id(20)));
        assert!(!index.insert_edge(user(1), id(10), id(20))); // duplicate

        assert!(index.someone_has(&id(10)));
        assert!(index.has_edge(&user(1), &id(10), &id(20)));

        assert!(index.remove_edge(&user(1), &id(10), &id(20)));
        assert!(!index.someone_has(&id(10)));
        assert!(!index.remove_edge(&user(1), &id(10), &id(20)));
    }

    #[test]
    fn someone_has_sees_every_user() {
        let mut index = Index::new();
        index.insert_edge(user(1), id(10), id(20));
        index.insert_edge(user(2), id(10), id(30));

        index.remove_edge(&user(1), &id(10), &id(20));
        // User 2's edge still keeps the object alive.
        assert!(index.someone_has(&id(10)));

        index.remove_edge(&user(2), &id(10), &id(30));
        assert!(!index.someone_has(&id(10)));
    }

    #[test]
    fn commits_per_user() {
        let mut index = Index::new();
        let commit = Commit::new(id(1), Default::default());
        index.set_commit(user(1), commit.clone());

        assert_eq!(index.commit_of(&user(1)), Some(&commit));
        assert_eq!(index.commit_of(&user(2)), None);
        assert_eq!(index.commits().count(), 1);
    }

    #[test]
    fn retainer_reflects_index_state() {
        let index = Arc::new(RwLock::new(Index::new()));
        let retainer = IndexRetainer::new(index.clone());

        assert!(!retainer.retains(&id(5)));
        index.write().unwrap().insert_edge(user(1), id(5), id(6));
        assert!(retainer.retains(&id(5)));
    }
}
