//! Group deletion scheduler — accumulates atomic node groups.
//!
//! Every atomic group id gets a `GroupAccumulator` the first time one of
//! its nodes is scheduled:
//!
//! ```text
//! Accumulating --(len == target_size)--> Flushed   [terminal]
//! Accumulating --(abort of any member)--> Aborted  [terminal]
//! ```
//!
//! Once terminal, further nodes for the group are failed individually and
//! never reach the batcher. Locks are never held across batcher or tracker
//! calls.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tracing::{debug, error, info, warn};

use scaledown_core::{
    DeletionError, EvictionSettings, GroupId, NodeDeleteResult, NodeDeleteResultType, NodeGroup,
    NodeRef,
};
use scaledown_tracker::NodeDeletionTracker;

use crate::batcher::DeletionBatcher;

/// Lifecycle of an atomic group's accumulator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GroupState {
    Accumulating,
    Flushed,
    Aborted,
}

/// Point-in-time view of an accumulator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GroupStatus {
    pub state: GroupState,
    pub accumulated: usize,
    pub target_size: usize,
}

struct GroupAccumulator {
    target_size: usize,
    accumulated: Vec<NodeRef>,
    /// Set if any member was scheduled with drain.
    drain: bool,
    state: GroupState,
    /// Left by an abort for a group no node was ever scheduled for.
    /// Hidden from `group_status` until an atomic member arrives.
    tombstone: bool,
}

/// What happened to a node handed to an accumulator.
enum Admission {
    Held { accumulated: usize, target: usize },
    Flush { nodes: Vec<NodeRef>, drain: bool },
    Duplicate,
    Rejected(NodeDeleteResult),
}

impl GroupAccumulator {
    fn new(target_size: usize) -> Self {
        Self {
            target_size,
            accumulated: Vec::new(),
            drain: false,
            state: GroupState::Accumulating,
            tombstone: false,
        }
    }

    /// Tombstone for a group that was aborted before any member arrived.
    fn aborted() -> Self {
        Self {
            state: GroupState::Aborted,
            tombstone: true,
            ..Self::new(0)
        }
    }

    fn admit(&mut self, group_id: &str, node: NodeRef, drain: bool) -> Admission {
        self.tombstone = false;
        match self.state {
            GroupState::Aborted => Admission::Rejected(NodeDeleteResult::failed(
                NodeDeleteResultType::ErrorFailedToDelete,
                DeletionError::GroupAlreadyAborted {
                    group: group_id.to_string(),
                },
            )),
            GroupState::Flushed => Admission::Rejected(NodeDeleteResult::failed(
                NodeDeleteResultType::ErrorInternal,
                DeletionError::GroupAlreadyFlushed {
                    group: group_id.to_string(),
                },
            )),
            GroupState::Accumulating => {
                if self.accumulated.iter().any(|n| n.name == node.name) {
                    return Admission::Duplicate;
                }
                self.accumulated.push(node);
                self.drain |= drain;
                if self.accumulated.len() < self.target_size {
                    return Admission::Held {
                        accumulated: self.accumulated.len(),
                        target: self.target_size,
                    };
                }
                self.state = GroupState::Flushed;
                Admission::Flush {
                    nodes: std::mem::take(&mut self.accumulated),
                    drain: self.drain,
                }
            }
        }
    }

    /// Move to `Aborted`, handing back whatever was accumulated.
    fn abort(&mut self) -> Option<Vec<NodeRef>> {
        if self.state != GroupState::Accumulating {
            return None;
        }
        self.state = GroupState::Aborted;
        Some(std::mem::take(&mut self.accumulated))
    }
}

/// Turns per-node deletion requests into node group deletions.
///
/// Built once per scale-down pass (or [`reset`](Self::reset) between
/// passes). Both operations are safe to call from many workers at once and
/// never wait for a deletion to finish.
pub struct GroupDeletionScheduler {
    tracker: NodeDeletionTracker,
    batcher: Arc<dyn DeletionBatcher>,
    eviction: EvictionSettings,
    /// Active atomic groups: group_id → accumulator.
    groups: Mutex<HashMap<GroupId, Arc<Mutex<GroupAccumulator>>>>,
}

impl GroupDeletionScheduler {
    /// Create a new scheduler.
    ///
    /// `eviction` is carried for the evictor and not interpreted here.
    pub fn new(
        tracker: NodeDeletionTracker,
        batcher: Arc<dyn DeletionBatcher>,
        eviction: EvictionSettings,
    ) -> Self {
        Self {
            tracker,
            batcher,
            eviction,
            groups: Mutex::new(HashMap::new()),
        }
    }

    /// Schedule a drained (or empty) node for deletion.
    ///
    /// `group_size` is the number of nodes that make up a complete removal
    /// of an atomic group; the first call for a group fixes it.
    pub fn schedule_deletion(
        &self,
        node: NodeRef,
        group: Arc<dyn NodeGroup>,
        group_size: usize,
        drain: bool,
    ) {
        if !group.is_atomic() {
            debug!(group = %group.id(), node = %node.name, drain, "forwarding node to batcher");
            self.batcher.add_nodes(vec![node], group, drain);
            return;
        }

        let group_id = group.id().to_string();
        let node_name = node.name.clone();
        let accumulator = self.accumulator_for(&group_id, group_size);
        let admission = lock(&accumulator).admit(&group_id, node, drain);

        match admission {
            Admission::Held {
                accumulated,
                target,
            } => {
                debug!(group = %group_id, node = %node_name, accumulated, target, "node held until group is complete");
            }
            Admission::Flush { nodes, drain } => {
                info!(group = %group_id, nodes = nodes.len(), drain, "atomic node group complete, flushing");
                self.batcher.add_nodes(nodes, group, drain);
            }
            Admission::Duplicate => {
                warn!(group = %group_id, node = %node_name, "node already scheduled for this group, ignoring");
            }
            Admission::Rejected(result) => {
                if result.result_type == NodeDeleteResultType::ErrorInternal {
                    error!(group = %group_id, node = %node_name, "node scheduled after its group was flushed");
                } else {
                    warn!(group = %group_id, node = %node_name, "node scheduled after its group was aborted");
                }
                self.tracker.end_deletion(&group_id, &node_name, result);
            }
        }
    }

    /// Record a failed deletion for `node` and fail its atomic group.
    ///
    /// `result` is recorded for `node` whether or not it was ever scheduled.
    /// Nodes already accumulated for the group are failed along with it.
    pub fn abort_node_deletion(
        &self,
        node: &NodeRef,
        group_id: &str,
        drain: bool,
        reason: &str,
        result: NodeDeleteResult,
    ) {
        warn!(group = %group_id, node = %node.name, drain, %reason, "aborting node deletion");

        let accumulator = {
            let mut groups = lock(&self.groups);
            groups
                .entry(group_id.to_string())
                .or_insert_with(|| Arc::new(Mutex::new(GroupAccumulator::aborted())))
                .clone()
        };
        let siblings = lock(&accumulator).abort();

        self.tracker.end_deletion(group_id, &node.name, result);

        let Some(siblings) = siblings else {
            return;
        };
        let siblings: Vec<_> = siblings
            .into_iter()
            .filter(|s| s.name != node.name)
            .collect();
        if !siblings.is_empty() {
            warn!(group = %group_id, failed = siblings.len(), "scale down failed for node group as a whole");
        }
        for sibling in siblings {
            let result = NodeDeleteResult::failed(
                NodeDeleteResultType::ErrorFailedToDelete,
                DeletionError::GroupAborted {
                    group: group_id.to_string(),
                    reason: reason.to_string(),
                },
            );
            self.tracker.end_deletion(group_id, &sibling.name, result);
        }
    }

    /// Forget every group, ready for the next scale-down pass.
    pub fn reset(&self) {
        let cleared = {
            let mut groups = lock(&self.groups);
            let n = groups.len();
            groups.clear();
            n
        };
        let (empty, drained) = self.tracker.deletions_in_progress();
        info!(
            groups_cleared = cleared,
            pending_deletions = empty.len() + drained.len(),
            "group deletion scheduler reset"
        );
    }

    /// Current state of an atomic group, once one of its nodes has been
    /// scheduled. Aborts alone never make a group visible, so non-atomic
    /// groups always report `None`.
    pub fn group_status(&self, group_id: &str) -> Option<GroupStatus> {
        let accumulator = lock(&self.groups).get(group_id)?.clone();
        let acc = lock(&accumulator);
        if acc.tombstone {
            return None;
        }
        Some(GroupStatus {
            state: acc.state,
            accumulated: acc.accumulated.len(),
            target_size: acc.target_size,
        })
    }

    pub fn eviction_settings(&self) -> &EvictionSettings {
        &self.eviction
    }

    // ── Internal helpers ────────────────────────────────────────────

    fn accumulator_for(&self, group_id: &str, group_size: usize) -> Arc<Mutex<GroupAccumulator>> {
        let mut groups = lock(&self.groups);
        if let Some(existing) = groups.get(group_id) {
            return existing.clone();
        }
        let target = if group_size == 0 {
            warn!(group = %group_id, "atomic group scheduled with size 0, treating as 1");
            1
        } else {
            group_size
        };
        debug!(group = %group_id, target, "tracking atomic node group");
        let accumulator = Arc::new(Mutex::new(GroupAccumulator::new(target)));
        groups.insert(group_id.to_string(), accumulator.clone());
        accumulator
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
