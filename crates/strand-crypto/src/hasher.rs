use sha2::{Digest, Sha256};
use strand_types::ObjectId;

/// Incremental SHA-256 producing [`ObjectId`]s.
///
/// Object identity in strand is the SHA-256 of a block's canonical
/// encoding, tag byte included; the tag byte is what separates the hash
/// domains of the different object kinds. Callers feed the canonical bytes
/// through [`update`](Self::update) and close the computation with
/// [`finalize`](Self::finalize).
#[derive(Default)]
pub struct Hasher {
    inner: Sha256,
}

impl Hasher {
    /// Start a fresh hash computation.
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed bytes into the hash.
    pub fn update(&mut self, bytes: &[u8]) -> &mut Self {
        self.inner.update(bytes);
        self
    }

    /// Close the computation and return the resulting id.
    pub fn finalize(self) -> ObjectId {
        ObjectId::from_hash(self.inner.finalize().into())
    }

    /// One-shot hash of a byte slice.
    pub fn digest(bytes: &[u8]) -> ObjectId {
        let mut h = Self::new();
        h.update(bytes);
        h.finalize()
    }
}
