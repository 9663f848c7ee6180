use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::TypeError;
use crate::user_id::UserId;
use crate::wire::{WireReader, WireWriter};

/// Per-user logical clock.
///
/// Maps each [`UserId`] to a non-negative 64-bit counter; absent entries are
/// implicitly zero, and zero entries are never stored, so two vectors with
/// the same effective counters compare and serialize identically.
///
/// Vectors are partially ordered: `a.happens_before(b)` iff every counter of
/// `a` is `<=` the corresponding counter of `b`. Two vectors where neither
/// happens-before the other are concurrent; the entries they stamp surface
/// as conflicting versions and are resolved by a higher layer.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct VersionVector {
    versions: BTreeMap<UserId, u64>,
}

impl VersionVector {
    /// The empty (all-zero) vector.
    pub fn new() -> Self {
        Self::default()
    }

    /// The counter of `user` (zero when absent).
    pub fn version_of(&self, user: &UserId) -> u64 {
        self.versions.get(user).copied().unwrap_or(0)
    }

    /// Set the counter of `user`. Counters never decrease.
    pub fn set_version(&mut self, user: UserId, version: u64) -> Result<(), TypeError> {
        let current = self.version_of(&user);
        if version < current {
            return Err(TypeError::VersionRegression {
                user: user.short_hex(),
                current,
                attempted: version,
            });
        }
        if version > 0 {
            self.versions.insert(user, version);
        }
        Ok(())
    }

    /// Bump the counter of `user` by one.
    pub fn increment(&mut self, user: UserId) {
        *self.versions.entry(user).or_insert(0) += 1;
    }

    /// Pointwise maximum of `self` and `other`.
    pub fn merge(&self, other: &Self) -> Self {
        let mut out = self.clone();
        for (user, &version) in &other.versions {
            let slot = out.versions.entry(*user).or_insert(0);
            *slot = (*slot).max(version);
        }
        out
    }

    /// Pointwise `<=`: every counter of `self` is at most `other`'s.
    pub fn happens_before(&self, other: &Self) -> bool {
        self.versions
            .iter()
            .all(|(user, &version)| version <= other.version_of(user))
    }

    /// Neither vector happens-before the other.
    pub fn is_concurrent_with(&self, other: &Self) -> bool {
        !self.happens_before(other) && !other.happens_before(self)
    }

    /// Number of non-zero entries.
    pub fn len(&self) -> usize {
        self.versions.len()
    }

    /// Returns `true` if every counter is zero.
    pub fn is_empty(&self) -> bool {
        self.versions.is_empty()
    }

    /// Iterate entries in ascending user order.
    pub fn iter(&self) -> impl Iterator<Item = (&UserId, &u64)> {
        self.versions.iter()
    }

    /// Canonical encoding: `u32` count, then sorted `(user_id, u64)` pairs.
    pub fn encode(&self, w: &mut WireWriter) {
        w.put_u32(self.versions.len() as u32);
        for (user, &version) in &self.versions {
            user.encode(w);
            w.put_u64(version);
        }
    }

    pub fn decode(r: &mut WireReader<'_>) -> Result<Self, TypeError> {
        let count = r.get_u32()?;
        let mut versions = BTreeMap::new();
        for _ in 0..count {
            let user = UserId::decode(r)?;
            let version = r.get_u64()?;
            if version == 0 {
                return Err(TypeError::Malformed(
                    "zero counter in version vector".into(),
                ));
            }
            if versions.insert(user, version).is_some() {
                return Err(TypeError::Malformed(
                    "duplicate user in version vector".into(),
                ));
            }
        }
        Ok(Self { versions })
    }
}

impl fmt::Display for VersionVector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{")?;
        for (i, (user, version)) in self.versions.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{user}:{version}")?;
        }
        write!(f, "}}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user(seed: u8) -> UserId {
        UserId::derive(&[seed])
    }

    #[test]
    fn absent_entries_are_zero() {
        let vv = VersionVector::new();
        assert_eq!(vv.version_of(&user(1)), 0);
        assert!(vv.is_empty());
    }

    #[test]
    fn increment_and_read() {
        let u = user(1);
        let mut vv = VersionVector::new();
        vv.increment(u);
        vv.increment(u);
        assert_eq!(vv.version_of(&u), 2);
    }

    #[test]
    fn set_version_rejects_regression() {
        let u = user(1);
        let mut vv = VersionVector::new();
        vv.set_version(u, 5).unwrap();
        let err = vv.set_version(u, 4).unwrap_err();
        assert!(matches!(err, TypeError::VersionRegression { current: 5, attempted: 4, .. }));
        assert_eq!(vv.version_of(&u), 5);
    }

    #[test]
    fn merge_is_pointwise_max() {
        let (a, b) = (user(1), user(2));
        let mut left = VersionVector::new();
        left.set_version(a, 3).unwrap();
        let mut right = VersionVector::new();
        right.set_version(a, 1).unwrap();
        right.set_version(b, 7).unwrap();

        let merged = left.merge(&right);
        assert_eq!(merged.version_of(&a), 3);
        assert_eq!(merged.version_of(&b), 7);
        // Merge dominates both inputs.
        assert!(left.happens_before(&merged));
        assert!(right.happens_before(&merged));
    }

    #[test]
    fn partial_order() {
        let (a, b) = (user(1), user(2));
        let mut lo = VersionVector::new();
        lo.set_version(a, 1).unwrap();
        let mut hi = VersionVector::new();
        hi.set_version(a, 2).unwrap();
        hi.set_version(b, 1).unwrap();

        assert!(lo.happens_before(&hi));
        assert!(!hi.happens_before(&lo));
        assert!(VersionVector::new().happens_before(&lo));
    }

    #[test]
    fn concurrent_vectors_detected() {
        let (a, b) = (user(1), user(2));
        let mut left = VersionVector::new();
        left.set_version(a, 1).unwrap();
        let mut right = VersionVector::new();
        right.set_version(b, 1).unwrap();
        assert!(left.is_concurrent_with(&right));
        assert!(!left.is_concurrent_with(&left));
    }

    #[test]
    fn zero_set_keeps_vector_canonical() {
        let u = user(1);
        let mut vv = VersionVector::new();
        vv.set_version(u, 0).unwrap();
        assert!(vv.is_empty());
        assert_eq!(vv, VersionVector::new());
    }

    #[test]
    fn wire_round_trip() {
        let mut vv = VersionVector::new();
        vv.set_version(user(3), 9).unwrap();
        vv.set_version(user(1), 2).unwrap();

        let mut w = WireWriter::new();
        vv.encode(&mut w);
        let bytes = w.into_bytes();
        let mut r = WireReader::new(&bytes);
        let decoded = VersionVector::decode(&mut r).unwrap();
        r.finish().unwrap();
        assert_eq!(decoded, vv);
    }

    #[test]
    fn decode_rejects_duplicate_user() {
        let u = user(1);
        let mut w = WireWriter::new();
        w.put_u32(2);
        u.encode(&mut w);
        w.put_u64(1);
        u.encode(&mut w);
        w.put_u64(2);
        let bytes = w.into_bytes();
        let mut r = WireReader::new(&bytes);
        assert!(matches!(
            VersionVector::decode(&mut r),
            Err(TypeError::Malformed(_))
        ));
    }
}
