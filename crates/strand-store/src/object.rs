use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use strand_types::{ObjectId, TypeError};

use crate::block::{Block, BlockTag};
use crate::directory::Directory;

/// Opaque file contents. A blob's id is the hash of its bytes under the
/// blob tag; blobs have no children.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Blob {
    pub data: Vec<u8>,
}

impl Blob {
    pub fn new(data: Vec<u8>) -> Self {
        Self { data }
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn to_block(&self) -> Block {
        Block::new(BlockTag::Blob, self.data.clone())
    }

    pub fn calculate_id(&self) -> ObjectId {
        self.to_block().calculate_id()
    }
}

/// Typed interpretation of a block: the closed sum of everything the store
/// can hold.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Object {
    Directory(Directory),
    Blob(Blob),
}

impl Object {
    pub fn tag(&self) -> BlockTag {
        match self {
            Self::Directory(_) => BlockTag::Directory,
            Self::Blob(_) => BlockTag::Blob,
        }
    }

    /// The distinct child ids this object references (empty for blobs).
    pub fn children(&self) -> BTreeSet<ObjectId> {
        match self {
            Self::Directory(dir) => dir.unique_children(),
            Self::Blob(_) => BTreeSet::new(),
        }
    }

    pub fn to_block(&self) -> Block {
        match self {
            Self::Directory(dir) => dir.to_block(),
            Self::Blob(blob) => blob.to_block(),
        }
    }

    pub fn from_block(block: &Block) -> Result<Self, TypeError> {
        match block.tag {
            BlockTag::Directory => Ok(Self::Directory(Directory::decode_payload(&block.payload)?)),
            BlockTag::Blob => Ok(Self::Blob(Blob::new(block.payload.clone()))),
        }
    }

    pub fn calculate_id(&self) -> ObjectId {
        self.to_block().calculate_id()
    }

    pub fn as_directory(&self) -> Option<&Directory> {
        match self {
            Self::Directory(dir) => Some(dir),
            Self::Blob(_) => None,
        }
    }

    pub fn as_blob(&self) -> Option<&Blob> {
        match self {
            Self::Blob(blob) => Some(blob),
            Self::Directory(_) => None,
        }
    }
}

impl From<Directory> for Object {
    fn from(dir: Directory) -> Self {
        Self::Directory(dir)
    }
}

impl From<Blob> for Object {
    fn from(blob: Blob) -> Self {
        Self::Blob(blob)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use strand_types::{UserId, VersionVector, VersionedObject};

    #[test]
    fn blob_block_round_trip() {
        let blob = Blob::new(b"file contents".to_vec());
        let obj = Object::from_block(&blob.to_block()).unwrap();
        assert_eq!(obj, Object::Blob(blob));
    }

    #[test]
    fn directory_block_round_trip() {
        let user = UserId::derive(b"u");
        let mut versions = VersionVector::new();
        versions.increment(user);
        let mut dir = Directory::new();
        dir.insert("f", user, VersionedObject::new(ObjectId::from_hash([1; 32]), versions));

        let obj = Object::from_block(&dir.to_block()).unwrap();
        assert_eq!(obj.calculate_id(), dir.calculate_id());
        assert_eq!(obj.as_directory().unwrap(), &dir);
    }

    #[test]
    fn blob_has_no_children() {
        assert!(Object::Blob(Blob::new(vec![1, 2])).children().is_empty());
    }

    #[test]
    fn empty_blob_and_empty_directory_differ() {
        let blob = Object::Blob(Blob::new(Vec::new()));
        let dir = Object::Directory(Directory::new());
        assert_ne!(blob.calculate_id(), dir.calculate_id());
    }
}
