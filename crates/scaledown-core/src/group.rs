//! Node group handles.
//!
//! `NodeGroup` is the capability the actuation layer needs from a cloud
//! provider's group: a stable id, whether its members must be removed
//! together, its current target size, and a way to delete members.
//! `StaticNodeGroup` is an in-memory implementation used for simulation
//! and tests.

use std::collections::BTreeSet;
use std::pin::Pin;
use std::sync::{Arc, Mutex, PoisonError};

use tracing::debug;

use crate::error::{NodeGroupError, NodeGroupResult};
use crate::types::{GroupId, NodeName, NodeRef};

/// Boxed future returned by asynchronous group operations.
pub type BoxFuture<T> = Pin<Box<dyn std::future::Future<Output = T> + Send>>;

/// A node group as seen by scale-down actuation.
pub trait NodeGroup: Send + Sync {
    /// Stable identity, used to key per-group state.
    fn id(&self) -> &str;

    /// Whether all members must be deleted in one operation.
    fn is_atomic(&self) -> bool;

    /// Current target size of the group.
    fn target_size(&self) -> NodeGroupResult<usize>;

    /// Delete the given members. Resolves once the provider accepted or
    /// rejected the whole call.
    fn delete_nodes(&self, nodes: Vec<NodeRef>) -> BoxFuture<NodeGroupResult<()>>;
}

#[derive(Debug)]
struct StaticGroupState {
    target_size: usize,
    members: BTreeSet<NodeName>,
    fail_deletes: bool,
    fail_target_size: bool,
}

/// In-memory node group with a fixed member list.
///
/// Deleting members shrinks the target size. Cloning shares state.
#[derive(Debug, Clone)]
pub struct StaticNodeGroup {
    id: GroupId,
    atomic: bool,
    state: Arc<Mutex<StaticGroupState>>,
}

impl StaticNodeGroup {
    /// Create a group whose target size equals its member count.
    pub fn new(id: impl Into<GroupId>, atomic: bool, members: Vec<NodeName>) -> Self {
        let members: BTreeSet<NodeName> = members.into_iter().collect();
        Self {
            id: id.into(),
            atomic,
            state: Arc::new(Mutex::new(StaticGroupState {
                target_size: members.len(),
                members,
                fail_deletes: false,
                fail_target_size: false,
            })),
        }
    }

    /// Create a group of `size` members named `{id}-node-{i}`.
    pub fn sized(id: impl Into<GroupId>, size: usize, atomic: bool) -> Self {
        let id = id.into();
        let members = (0..size).map(|i| member_name(&id, i)).collect();
        Self::new(id, atomic, members)
    }

    /// Make every subsequent `delete_nodes` call fail.
    pub fn with_failing_deletes(self) -> Self {
        self.lock().fail_deletes = true;
        self
    }

    /// Make every subsequent `target_size` call fail, as when the provider
    /// cannot be reached.
    pub fn with_failing_target_size(self) -> Self {
        self.lock().fail_target_size = true;
        self
    }

    /// Node reference for the member at `index`, following the
    /// `{id}-node-{i}` naming of [`StaticNodeGroup::sized`].
    pub fn node(&self, index: usize) -> NodeRef {
        NodeRef::new(member_name(&self.id, index))
    }

    /// Current members, sorted by name.
    pub fn members(&self) -> Vec<NodeName> {
        self.lock().members.iter().cloned().collect()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, StaticGroupState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Member naming used by sized groups.
pub fn member_name(group_id: &str, index: usize) -> NodeName {
    format!("{group_id}-node-{index}")
}

impl NodeGroup for StaticNodeGroup {
    fn id(&self) -> &str {
        &self.id
    }

    fn is_atomic(&self) -> bool {
        self.atomic
    }

    fn target_size(&self) -> NodeGroupResult<usize> {
        let state = self.lock();
        if state.fail_target_size {
            return Err(NodeGroupError::TargetSize {
                group: self.id.clone(),
                reason: "provider unavailable".to_string(),
            });
        }
        Ok(state.target_size)
    }

    fn delete_nodes(&self, nodes: Vec<NodeRef>) -> BoxFuture<NodeGroupResult<()>> {
        let id = self.id.clone();
        let state = self.state.clone();
        Box::pin(async move {
            let mut state = state.lock().unwrap_or_else(PoisonError::into_inner);
            if state.fail_deletes {
                return Err(NodeGroupError::DeleteFailed {
                    group: id,
                    reason: "deletes disabled for this group".to_string(),
                });
            }
            if let Some(missing) = nodes.iter().find(|n| !state.members.contains(&n.name)) {
                return Err(NodeGroupError::NodeNotInGroup {
                    group: id,
                    node: missing.name.clone(),
                });
            }
            for node in &nodes {
                state.members.remove(&node.name);
            }
            state.target_size = state.target_size.saturating_sub(nodes.len());
            debug!(group = %id, deleted = nodes.len(), target = state.target_size, "nodes removed from group");
            Ok(())
        })
    }
}
