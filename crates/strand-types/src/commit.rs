use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::TypeError;
use crate::object_id::ObjectId;
use crate::version_vector::VersionVector;
use crate::wire::{WireReader, WireWriter};

/// An object reference stamped with its author history.
///
/// The `id` is the content hash of the pointed-at subtree; `versions` is the
/// version vector of the history that produced it. Directory entries store
/// one `VersionedObject` per user so concurrent edits of the same name
/// coexist until a higher layer resolves them.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionedObject {
    pub id: ObjectId,
    pub versions: VersionVector,
}

impl VersionedObject {
    pub fn new(id: ObjectId, versions: VersionVector) -> Self {
        Self { id, versions }
    }

    /// Encoding: `object_id ‖ version_vector`.
    pub fn encode(&self, w: &mut WireWriter) {
        self.id.encode(w);
        self.versions.encode(w);
    }

    pub fn decode(r: &mut WireReader<'_>) -> Result<Self, TypeError> {
        let id = ObjectId::decode(r)?;
        let versions = VersionVector::decode(r)?;
        Ok(Self { id, versions })
    }
}

/// A branch's published head: the root directory id plus the version vector
/// of the snapshot it names.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Commit {
    pub root_id: ObjectId,
    pub versions: VersionVector,
}

impl Commit {
    pub fn new(root_id: ObjectId, versions: VersionVector) -> Self {
        Self { root_id, versions }
    }

    /// Encoding: `root_id ‖ version_vector`.
    pub fn encode(&self, w: &mut WireWriter) {
        self.root_id.encode(w);
        self.versions.encode(w);
    }

    pub fn decode(r: &mut WireReader<'_>) -> Result<Self, TypeError> {
        let root_id = ObjectId::decode(r)?;
        let versions = VersionVector::decode(r)?;
        Ok(Self { root_id, versions })
    }
}

impl fmt::Display for Commit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Commit({}, {})", self.root_id.short_hex(), self.versions)
    }
}
