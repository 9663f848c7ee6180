//! Hash and randomness primitives for the strand object store.
//!
//! Everything that computes an [`ObjectId`](strand_types::ObjectId) goes
//! through [`Hasher`], and everything that needs unpredictable bytes (name
//! tags, ephemeral identities) goes through [`fill_nonblocking`], so the
//! rest of the workspace never touches a hash or RNG crate directly.

pub mod hasher;
pub mod rng;

pub use hasher::Hasher;
pub use rng::fill_nonblocking;
