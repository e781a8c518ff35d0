//! scaledown-actuation — turns per-node deletion requests into node group
//! deletions.
//!
//! Drain workers call [`GroupDeletionScheduler::schedule_deletion`] once a
//! node is ready to go, or [`GroupDeletionScheduler::abort_node_deletion`]
//! when draining failed. Nodes of regular groups are forwarded to the
//! batcher one by one. Nodes of atomic groups are held until the whole
//! group is ready and then forwarded together; an abort of any member
//! fails the whole group.
//!
//! # Architecture
//!
//! ```text
//! GroupDeletionScheduler
//!   ├── per-group accumulators (group_id → Arc<Mutex<GroupAccumulator>>)
//!   ├── DeletionBatcher (fire-and-forget AddNodes)
//!   │     └── NodeDeletionBatcher (per-group buckets, tokio tasks)
//!   └── NodeDeletionTracker (results for aborted/rejected nodes)
//! ```

pub mod batcher;
pub mod error;
pub mod scheduler;

pub use batcher::{DeletionBatcher, NodeDeletionBatcher};
pub use error::{ActuationError, ActuationResult};
pub use scheduler::{GroupDeletionScheduler, GroupState, GroupStatus};
