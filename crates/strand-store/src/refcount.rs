use serde::{Deserialize, Serialize};
use strand_types::{TypeError, WireReader, WireWriter};

/// Per-block reference record: two independent pin counters.
///
/// `direct` pins the block alone, independent of its children; it is held
/// while the block's subtree is still incomplete. `recursive` pins the
/// block and all transitive children. A block is eligible for deletion only
/// when both counters are zero. Once a subtree completes, its direct pin is
/// converted into a recursive one, so a fully replicated graph carries only
/// recursive counts.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Refcount {
    pub direct: u64,
    pub recursive: u64,
}

impl Refcount {
    pub const ENCODED_LEN: usize = 16;

    /// The zero record, equivalent to no record at all.
    pub fn zero() -> Self {
        Self::default()
    }

    /// Returns `true` when both counters are zero.
    pub fn is_zero(&self) -> bool {
        self.direct == 0 && self.recursive == 0
    }

    /// On-disk form: two little-endian u64, `direct` first.
    pub fn encode(&self) -> [u8; Self::ENCODED_LEN] {
        let mut w = WireWriter::new();
        w.put_u64(self.direct);
        w.put_u64(self.recursive);
        w.into_bytes().try_into().expect("fixed-size record")
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, TypeError> {
        let mut r = WireReader::new(bytes);
        let direct = r.get_u64()?;
        let recursive = r.get_u64()?;
        r.finish()?;
        Ok(Self { direct, recursive })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encode_decode_round_trip() {
        let rc = Refcount { direct: 3, recursive: 9 };
        assert_eq!(Refcount::decode(&rc.encode()).unwrap(), rc);
    }

    #[test]
    fn layout_is_direct_then_recursive_little_endian() {
        let rc = Refcount { direct: 1, recursive: 2 };
        let bytes = rc.encode();
        assert_eq!(&bytes[..8], &[1, 0, 0, 0, 0, 0, 0, 0]);
        assert_eq!(&bytes[8..], &[2, 0, 0, 0, 0, 0, 0, 0]);
    }

    #[test]
    fn zero_detection() {
        assert!(Refcount::zero().is_zero());
        assert!(!Refcount { direct: 1, recursive: 0 }.is_zero());
        assert!(!Refcount { direct: 0, recursive: 1 }.is_zero());
    }

    #[test]
    fn decode_rejects_wrong_length() {
        assert!(Refcount::decode(&[0u8; 15]).is_err());
        assert!(Refcount::decode(&[0u8; 17]).is_err());
    }
}
