use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use strand_types::{ObjectId, TypeError, UserId, VersionVector, VersionedObject, WireReader, WireWriter};

use crate::block::{Block, BlockTag};
use crate::error::StoreResult;
use crate::store::ObjectStore;

/// A directory tree node: name → (user → versioned object reference).
///
/// Each name maps to one entry *per user* so that concurrent edits of the
/// same name by different users coexist; a higher layer resolves them. Both
/// map levels are ordered, which makes the canonical encoding -- and
/// therefore the directory's id -- depend only on contents.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Directory {
    entries: BTreeMap<String, BTreeMap<UserId, VersionedObject>>,
}

impl Directory {
    /// Create an empty directory.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of names in the directory.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if the directory holds no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Insert or replace the entry for `(name, user)`; returns the replaced
    /// reference, if any.
    pub fn insert(
        &mut self,
        name: impl Into<String>,
        user: UserId,
        object: VersionedObject,
    ) -> Option<VersionedObject> {
        self.entries.entry(name.into()).or_default().insert(user, object)
    }

    /// All per-user versions recorded under `name`, in ascending user order.
    pub fn find(&self, name: &str) -> impl Iterator<Item = (&UserId, &VersionedObject)> {
        self.entries.get(name).into_iter().flatten()
    }

    /// The entry `(name, user)`, if present.
    pub fn get(&self, name: &str, user: &UserId) -> Option<&VersionedObject> {
        self.entries.get(name)?.get(user)
    }

    /// Remove the entry `(name, user)`; the name disappears once its last
    /// user entry is gone.
    pub fn remove(&mut self, name: &str, user: &UserId) -> Option<VersionedObject> {
        let users = self.entries.get_mut(name)?;
        let removed = users.remove(user);
        if users.is_empty() {
            self.entries.remove(name);
        }
        removed
    }

    /// Remove every user entry under `name`; returns how many were removed.
    pub fn remove_all(&mut self, name: &str) -> usize {
        self.entries.remove(name).map_or(0, |users| users.len())
    }

    /// Iterate all `(name, user, object)` triples in canonical order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &UserId, &VersionedObject)> {
        self.entries.iter().flat_map(|(name, users)| {
            users
                .iter()
                .map(move |(user, object)| (name.as_str(), user, object))
        })
    }

    /// The set of child ids, deduplicated: the same hash may appear under
    /// several names or users but pins its subtree only once.
    pub fn unique_children(&self) -> BTreeSet<ObjectId> {
        self.iter().map(|(_, _, object)| object.id).collect()
    }

    /// Visit each distinct child id once.
    pub fn for_each_unique_child(&self, mut f: impl FnMut(&ObjectId)) {
        for id in self.unique_children() {
            f(&id);
        }
    }

    /// Merge of every nested entry's version vector.
    pub fn version_vector_union(&self) -> VersionVector {
        self.iter().fold(VersionVector::new(), |acc, (_, _, object)| {
            acc.merge(&object.versions)
        })
    }

    /// Canonical payload: `u32` entry count, then per name (ascending) the
    /// length-prefixed name, `u32` user count, and per user (ascending) the
    /// user id, object id and version vector.
    pub fn encode_payload(&self) -> Vec<u8> {
        let mut w = WireWriter::new();
        w.put_u32(self.entries.len() as u32);
        for (name, users) in &self.entries {
            w.put_bytes(name.as_bytes());
            w.put_u32(users.len() as u32);
            for (user, object) in users {
                user.encode(&mut w);
                object.encode(&mut w);
            }
        }
        w.into_bytes()
    }

    pub fn decode_payload(bytes: &[u8]) -> Result<Self, TypeError> {
        let mut r = WireReader::new(bytes);
        let entry_count = r.get_u32()?;
        let mut entries = BTreeMap::new();
        for _ in 0..entry_count {
            let name = String::from_utf8(r.get_bytes()?.to_vec())
                .map_err(|_| TypeError::Malformed("non-utf8 entry name".into()))?;
            let user_count = r.get_u32()?;
            let mut users = BTreeMap::new();
            for _ in 0..user_count {
                let user = UserId::decode(&mut r)?;
                let object = VersionedObject::decode(&mut r)?;
                if users.insert(user, object).is_some() {
                    return Err(TypeError::Malformed(format!(
                        "duplicate user under entry {name:?}"
                    )));
                }
            }
            if users.is_empty() {
                return Err(TypeError::Malformed(format!("entry {name:?} has no users")));
            }
            if entries.insert(name, users).is_some() {
                return Err(TypeError::Malformed("duplicate entry name".into()));
            }
        }
        r.finish()?;
        Ok(Self { entries })
    }

    /// Wrap the canonical payload in a tagged block.
    pub fn to_block(&self) -> Block {
        Block::new(BlockTag::Directory, self.encode_payload())
    }

    /// The directory's content id.
    pub fn calculate_id(&self) -> ObjectId {
        self.to_block().calculate_id()
    }

    /// Persist the directory block; returns its id. Does not touch
    /// refcounts.
    pub fn save(&self, store: &ObjectStore) -> StoreResult<ObjectId> {
        store.store_block(&self.to_block())
    }
}
