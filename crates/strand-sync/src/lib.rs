//! Incremental replication receivers for strand.
//!
//! A peer publishes a commit; this crate materializes it locally while the
//! objects behind it arrive in arbitrary order over the transport:
//!
//! - [`RemoteBranch`] is the long-lived receiver for a peer's current head.
//!   It tracks which objects are still missing, which are stored but
//!   awaiting children, and which subtrees are complete, keeping refcounts
//!   correct at every intermediate point and unwinding cleanly when the
//!   peer moves on to a newer commit.
//! - [`Snapshot`] is a refcount-stable view of one specific commit: a
//!   per-object state machine ({missing → incomplete → complete}) whose
//!   pins migrate from direct to recursive as subtrees complete.
//!   [`SnapshotGroup`] bundles one snapshot per user under a group id.
//!
//! Both receivers persist their bookkeeping after every mutation so a crash
//! resumes from a consistent point.

pub mod error;
pub mod name_tag;
pub mod remote_branch;
pub mod snapshot;
pub mod snapshot_group;

pub use error::{SyncError, SyncResult};
pub use name_tag::NameTag;
pub use remote_branch::RemoteBranch;
pub use snapshot::{NodeType, Snapshot};
pub use snapshot_group::SnapshotGroup;
