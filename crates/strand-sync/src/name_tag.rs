use std::fmt;

use serde::{Deserialize, Serialize};
use strand_types::TypeError;

/// Random 16-byte label naming a snapshot's on-disk state file.
///
/// Name tags are not content-addressed -- two snapshots over the same commit
/// get distinct tags so their state files never collide.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NameTag([u8; 16]);

impl NameTag {
    pub const LEN: usize = 16;

    /// Draw a fresh random tag.
    pub fn random() -> Self {
        let mut bytes = [0u8; 16];
        strand_crypto::fill_nonblocking(&mut bytes);
        Self(bytes)
    }

    pub const fn from_raw(bytes: [u8; 16]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 16] {
        &self.0
    }

    /// Hex form, used as the state file name.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    pub fn from_hex(s: &str) -> Result<Self, TypeError> {
        let bytes = hex::decode(s).map_err(|e| TypeError::InvalidHex(e.to_string()))?;
        let arr: [u8; 16] = bytes
            .as_slice()
            .try_into()
            .map_err(|_| TypeError::InvalidLength {
                expected: 16,
                actual: bytes.len(),
            })?;
        Ok(Self(arr))
    }
}

impl fmt::Debug for NameTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "NameTag({})", self.to_hex())
    }
}

impl fmt::Display for NameTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn random_tags_are_distinct() {
        assert_ne!(NameTag::random(), NameTag::random());
    }

    #[test]
    fn hex_round_trip() {
        let tag = NameTag::random();
        assert_eq!(NameTag::from_hex(&tag.to_hex()).unwrap(), tag);
    }
}
