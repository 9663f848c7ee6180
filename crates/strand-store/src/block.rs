use serde::{Deserialize, Serialize};
use strand_crypto::Hasher;
use strand_types::{ObjectId, TypeError};

/// The tag byte that opens every block on disk and in every hash.
///
/// The tag is part of the hashed bytes, so a directory and a blob with
/// identical payloads get different ids.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum BlockTag {
    Directory = 0x01,
    Blob = 0x02,
}

impl BlockTag {
    pub fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            0x01 => Some(Self::Directory),
            0x02 => Some(Self::Blob),
            _ => None,
        }
    }

    pub fn as_byte(self) -> u8 {
        self as u8
    }
}

impl std::fmt::Display for BlockTag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Directory => write!(f, "directory"),
            Self::Blob => write!(f, "blob"),
        }
    }
}

/// A raw tagged block: the unit the [`BlockStore`](crate::BlockStore)
/// holds. The store never interprets the payload.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Block {
    pub tag: BlockTag,
    pub payload: Vec<u8>,
}

impl Block {
    pub fn new(tag: BlockTag, payload: Vec<u8>) -> Self {
        Self { tag, payload }
    }

    /// The full on-disk form: `tag ‖ payload`.
    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(1 + self.payload.len());
        out.push(self.tag.as_byte());
        out.extend_from_slice(&self.payload);
        out
    }

    /// Split stored bytes back into tag and payload.
    pub fn decode(bytes: &[u8]) -> Result<Self, TypeError> {
        let (&tag_byte, payload) = bytes
            .split_first()
            .ok_or_else(|| TypeError::Malformed("empty block".into()))?;
        let tag = BlockTag::from_byte(tag_byte)
            .ok_or_else(|| TypeError::Malformed(format!("unknown block tag {tag_byte:#04x}")))?;
        Ok(Self::new(tag, payload.to_vec()))
    }

    /// The content id: SHA-256 over the full encoding, tag included.
    pub fn calculate_id(&self) -> ObjectId {
        let mut hasher = Hasher::new();
        hasher.update(&[self.tag.as_byte()]);
        hasher.update(&self.payload);
        hasher.finalize()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encode_decode_round_trip() {
        let block = Block::new(BlockTag::Blob, b"payload".to_vec());
        let decoded = Block::decode(&block.encode()).unwrap();
        assert_eq!(decoded, block);
    }

    #[test]
    fn id_covers_the_tag() {
        let dir = Block::new(BlockTag::Directory, b"same".to_vec());
        let blob = Block::new(BlockTag::Blob, b"same".to_vec());
        assert_ne!(dir.calculate_id(), blob.calculate_id());
    }

    #[test]
    fn id_matches_hash_of_encoding() {
        let block = Block::new(BlockTag::Blob, vec![2, 3, 4]);
        assert_eq!(block.calculate_id(), Hasher::digest(&block.encode()));
    }

    #[test]
    fn unknown_tag_rejected() {
        assert!(matches!(
            Block::decode(&[0x7f, 1, 2]),
            Err(TypeError::Malformed(_))
        ));
    }

    #[test]
    fn empty_input_rejected() {
        assert!(Block::decode(&[]).is_err());
    }
}
