use std::fmt;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::TypeError;
use crate::wire::{WireReader, WireWriter};

/// Persistent identity of a participating user.
///
/// A `UserId` is derived deterministically from seed material with SHA-256,
/// so the same material always produces the same identity. Users are the
/// keys of every [`VersionVector`](crate::VersionVector) and the owners of
/// branches; their ordering (byte-lexicographic) fixes the canonical
/// serialization order of per-user maps.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct UserId([u8; 32]);

impl UserId {
    pub const LEN: usize = 32;

    /// Derive a `UserId` from seed material (e.g. a device key).
    pub fn derive(material: &[u8]) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(b"strand-user-v1:");
        hasher.update(material);
        Self(hasher.finalize().into())
    }

    /// Create a random `UserId`, for tests and demos.
    pub fn ephemeral() -> Self {
        let mut seed = [0u8; 32];
        rand::Rng::fill(&mut rand::thread_rng(), &mut seed);
        Self::derive(&seed)
    }

    /// Create from a raw 32-byte value. Use [`derive`](Self::derive) for
    /// production identities.
    pub const fn from_raw(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// The raw 32-byte identity.
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Hex-encoded string representation.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Short identifier (first 8 hex characters), for logs.
    pub fn short_hex(&self) -> String {
        hex::encode(&self.0[..4])
    }

    /// Parse from a hex string (64 hex characters).
    pub fn from_hex(s: &str) -> Result<Self, TypeError> {
        let bytes = hex::decode(s).map_err(|e| TypeError::InvalidHex(e.to_string()))?;
        let arr: [u8; 32] = bytes
            .as_slice()
            .try_into()
            .map_err(|_| TypeError::InvalidLength {
                expected: 32,
                actual: bytes.len(),
            })?;
        Ok(Self(arr))
    }

    /// Append the raw 32 bytes to a wire buffer.
    pub fn encode(&self, w: &mut WireWriter) {
        w.put_raw(&self.0);
    }

    /// Read 32 raw bytes from a wire buffer.
    pub fn decode(r: &mut WireReader<'_>) -> Result<Self, TypeError> {
        Ok(Self(r.get_array::<32>()?))
    }
}

impl fmt::Debug for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "UserId({})", self.short_hex())
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.short_hex())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn derive_is_deterministic() {
        let a = UserId::derive(b"alice-device-key");
        let b = UserId::derive(b"alice-device-key");
        assert_eq!(a, b);
    }

    #[test]
    fn different_material_differs() {
        assert_ne!(UserId::derive(b"alice"), UserId::derive(b"bob"));
    }

    #[test]
    fn ephemeral_ids_are_distinct() {
        assert_ne!(UserId::ephemeral(), UserId::ephemeral());
    }

    #[test]
    fn hex_round_trip() {
        let id = UserId::derive(b"carol");
        assert_eq!(UserId::from_hex(&id.to_hex()).unwrap(), id);
    }
}
