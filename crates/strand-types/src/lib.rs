//! Foundation types for the strand object store.
//!
//! This crate provides the identity and clock types shared by every other
//! strand crate, plus the little-endian wire codec used by the canonical
//! object encoding and the persistence formats.
//!
//! # Key Types
//!
//! - [`ObjectId`] -- 256-bit content-addressed identifier
//! - [`UserId`] -- persistent identity of a participating user
//! - [`VersionVector`] -- per-user logical clock with merge/compare
//! - [`VersionedObject`] -- an object reference stamped with its author history
//! - [`Commit`] -- a branch's published head: root id + version vector

pub mod commit;
pub mod error;
pub mod object_id;
pub mod user_id;
pub mod version_vector;
pub mod wire;

pub use commit::{Commit, VersionedObject};
pub use error::TypeError;
pub use object_id::ObjectId;
pub use user_id::UserId;
pub use version_vector::VersionVector;
pub use wire::{WireReader, WireWriter};
