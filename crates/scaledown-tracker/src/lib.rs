//! scaledown-tracker — bookkeeping for node deletions.
//!
//! Tracks which nodes are being deleted (per node group, split into empty
//! and drained deletions) and stores one terminal `NodeDeleteResult` per
//! node name.
//!
//! The `NodeDeletionTracker` is `Clone` + `Send` + `Sync` (backed by
//! `Arc<Mutex<_>>`) and can be shared between the scheduler, the batcher,
//! and the tasks they spawn.

pub mod tracker;

pub use tracker::NodeDeletionTracker;
