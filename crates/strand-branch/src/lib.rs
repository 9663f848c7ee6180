//! Branch state and transactional root mutation for strand.
//!
//! A branch is a user's rooted object graph. The [`Index`] records, for
//! every user, the published head [`Commit`](strand_types::Commit) and the
//! `(user, child, parent)` edges that keep each live object reachable from
//! a root. A [`RootOp`] is a short-lived transaction over one user's root
//! directory: mutations happen in memory and [`RootOp::commit`] publishes
//! them with a write-before-erase discipline -- edges to the new tree are
//! inserted before any edge of the old tree is pruned, so a concurrent
//! reader never sees a live root missing a path to a reachable child.

pub mod branch;
pub mod error;
pub mod index;

pub use branch::{Branch, RootOp};
pub use error::{BranchError, BranchResult};
pub use index::{Index, IndexRetainer};
