//! Content-addressed block and object storage for strand.
//!
//! Every piece of replicated data -- file contents and directory listings --
//! is stored as an immutable block identified by the SHA-256 of its
//! canonical encoding. This crate provides both layers over those blocks:
//!
//! - the mechanical layer: [`BlockStore`] (backends: [`InMemoryBlockStore`],
//!   [`FsBlockStore`]) holding raw tagged bytes and the per-block
//!   [`Refcount`] record;
//! - the typed layer: [`ObjectStore`], which serializes and verifies
//!   [`Directory`] and [`Blob`] objects and enforces the two-counter
//!   reference discipline that keeps partially replicated graphs alive.
//!
//! # Refcount discipline
//!
//! Each block carries two counters. `direct` pins the block alone and is
//! used while its subtree is still being fetched; `recursive` pins the
//! block *and* its entire subtree. Incrementing `recursive` from zero
//! cascades into the children, and decrementing it to zero cascades back
//! out, so `recursive > 0` always implies the whole subtree is present and
//! pinned. A block is deleted only once both counters are zero and no
//! [`Retainer`] claims it.

pub mod block;
pub mod directory;
pub mod error;
pub mod fs;
pub mod fsutil;
pub mod memory;
pub mod object;
pub mod refcount;
pub mod store;
pub mod traits;

pub use block::{Block, BlockTag};
pub use directory::Directory;
pub use error::{StoreError, StoreResult};
pub use fs::FsBlockStore;
pub use memory::InMemoryBlockStore;
pub use object::{Blob, Object};
pub use refcount::Refcount;
pub use store::{ObjectStore, Retainer};
pub use traits::BlockStore;
