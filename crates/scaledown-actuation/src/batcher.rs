//! Node deletion batcher — deletes nodes through their node group.
//!
//! With a zero `delete_interval` every `add_nodes` call is deleted right
//! away on its own task. Otherwise the first call for a group opens a
//! bucket; calls arriving within `delete_interval` join it, and the whole
//! bucket is deleted in one `NodeGroup::delete_nodes` call when the
//! interval expires.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::runtime::Handle;
use tracing::{debug, error, info, warn};

use scaledown_core::{
    DeletionError, GroupId, NodeDeleteResult, NodeDeleteResultType, NodeGroup, NodeName, NodeRef,
};
use scaledown_tracker::NodeDeletionTracker;

use crate::error::ActuationResult;

/// Accepts batches of nodes for deletion.
///
/// Implementations own the batch from here on: they must eventually record
/// one result per node in the deletion tracker. `add_nodes` must not block.
pub trait DeletionBatcher: Send + Sync {
    fn add_nodes(&self, nodes: Vec<NodeRef>, group: Arc<dyn NodeGroup>, drain: bool);
}

struct Bucket {
    group: Arc<dyn NodeGroup>,
    nodes: Vec<NodeRef>,
    drained: HashSet<NodeName>,
}

/// Deletes nodes on the tokio runtime and records outcomes.
pub struct NodeDeletionBatcher {
    tracker: NodeDeletionTracker,
    delete_interval: Duration,
    handle: Handle,
    /// Open buckets: group_id → nodes waiting for the interval to expire.
    buckets: Arc<Mutex<HashMap<GroupId, Bucket>>>,
}

impl NodeDeletionBatcher {
    /// Create a batcher on the current tokio runtime.
    pub fn new(tracker: NodeDeletionTracker, delete_interval: Duration) -> ActuationResult<Self> {
        Ok(Self::with_handle(tracker, delete_interval, Handle::try_current()?))
    }

    pub fn with_handle(
        tracker: NodeDeletionTracker,
        delete_interval: Duration,
        handle: Handle,
    ) -> Self {
        Self {
            tracker,
            delete_interval,
            handle,
            buckets: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Group ids with nodes waiting for their interval to expire.
    pub fn pending_groups(&self) -> Vec<GroupId> {
        let mut groups: Vec<_> = lock(&self.buckets).keys().cloned().collect();
        groups.sort();
        groups
    }

    /// Add nodes to the group's bucket. Returns true if the bucket is new.
    fn add_to_bucket(&self, nodes: Vec<NodeRef>, group: Arc<dyn NodeGroup>, drain: bool) -> bool {
        let mut buckets = lock(&self.buckets);
        let drained = drained_names(&nodes, drain);
        match buckets.get_mut(group.id()) {
            Some(bucket) => {
                bucket.nodes.extend(nodes);
                bucket.drained.extend(drained);
                debug!(group = %group.id(), pending = bucket.nodes.len(), "nodes joined deletion bucket");
                false
            }
            None => {
                debug!(group = %group.id(), pending = nodes.len(), "deletion bucket opened");
                buckets.insert(
                    group.id().to_string(),
                    Bucket {
                        group,
                        nodes,
                        drained,
                    },
                );
                true
            }
        }
    }
}

impl DeletionBatcher for NodeDeletionBatcher {
    fn add_nodes(&self, nodes: Vec<NodeRef>, group: Arc<dyn NodeGroup>, drain: bool) {
        if self.delete_interval.is_zero() {
            let drained = drained_names(&nodes, drain);
            self.handle
                .spawn(delete_and_record(self.tracker.clone(), group, nodes, drained));
            return;
        }

        let group_id = group.id().to_string();
        if !self.add_to_bucket(nodes, group, drain) {
            return;
        }

        let buckets = self.buckets.clone();
        let tracker = self.tracker.clone();
        let interval = self.delete_interval;
        self.handle.spawn(async move {
            tokio::time::sleep(interval).await;
            let bucket = lock(&buckets).remove(&group_id);
            match bucket {
                Some(bucket) => {
                    delete_and_record(tracker, bucket.group, bucket.nodes, bucket.drained).await
                }
                None => error!(group = %group_id, "node group is not present in the batcher"),
            }
        });
    }
}

/// Delete `nodes` in one call and record a result for each of them.
async fn delete_and_record(
    tracker: NodeDeletionTracker,
    group: Arc<dyn NodeGroup>,
    nodes: Vec<NodeRef>,
    drained: HashSet<NodeName>,
) {
    let group_id = group.id().to_string();
    let names: Vec<NodeName> = nodes.iter().map(|n| n.name.clone()).collect();

    match group.delete_nodes(nodes).await {
        Ok(()) => {
            info!(group = %group_id, nodes = names.len(), "nodes deleted");
            for name in &names {
                tracker.end_deletion(&group_id, name, NodeDeleteResult::ok());
            }
        }
        Err(e) => {
            error!(group = %group_id, nodes = names.len(), error = %e, "failed to delete nodes");
            for name in &names {
                warn!(group = %group_id, node = %name, drained = drained.contains(name), "scale down failed for node");
                let result = NodeDeleteResult::failed(
                    NodeDeleteResultType::ErrorFailedToDelete,
                    DeletionError::Cloud(e.to_string()),
                );
                tracker.end_deletion(&group_id, name, result);
            }
        }
    }
}

fn drained_names(nodes: &[NodeRef], drain: bool) -> HashSet<NodeName> {
    if drain {
        nodes.iter().map(|n| n.name.clone()).collect()
    } else {
        HashSet::new()
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
