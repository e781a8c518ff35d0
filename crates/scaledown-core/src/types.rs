//! Domain types shared by the scheduler, batcher, and tracker.
//!
//! A `NodeRef` identifies a node slated for removal, a `NodeGroupView`
//! groups such nodes by their owning node group, and a `NodeDeleteResult`
//! is the terminal outcome recorded for every node that enters actuation.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::group::NodeGroup;

/// Unique identifier for a node group.
pub type GroupId = String;

/// Unique name of a cluster node.
pub type NodeName = String;

// ── Nodes ─────────────────────────────────────────────────────────

/// A node ready for (or failing) deletion.
///
/// Only `name` carries identity. `pods` is the scheduling-time snapshot of
/// pods bound to the node, passed through for the benefit of downstream
/// collaborators.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct NodeRef {
    pub name: NodeName,
    #[serde(default)]
    pub pods: Vec<String>,
}

impl NodeRef {
    /// A node with no pods recorded.
    pub fn new(name: impl Into<NodeName>) -> Self {
        Self {
            name: name.into(),
            pods: Vec::new(),
        }
    }

    /// Attach a pod snapshot.
    pub fn with_pods(mut self, pods: Vec<String>) -> Self {
        self.pods = pods;
        self
    }
}

impl fmt::Display for NodeRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

/// A bucket of nodes from one group, scheduled together in one pass.
///
/// Several views for the same group may be handed to the scheduler over
/// the course of a pass; accumulation spans all of them.
#[derive(Clone)]
pub struct NodeGroupView {
    pub group: Arc<dyn NodeGroup>,
    pub nodes: Vec<NodeRef>,
}

impl NodeGroupView {
    pub fn new(group: Arc<dyn NodeGroup>, nodes: Vec<NodeRef>) -> Self {
        Self { group, nodes }
    }
}

impl fmt::Debug for NodeGroupView {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NodeGroupView")
            .field("group", &self.group.id())
            .field("nodes", &self.nodes)
            .finish()
    }
}

// ── Results ───────────────────────────────────────────────────────

/// Outcome category of a node deletion.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum NodeDeleteResultType {
    Ok,
    ErrorFailedToDelete,
    ErrorFailedToEvictPods,
    ErrorInternal,
}

/// Cause attached to a failed deletion result.
#[derive(Debug, Clone, Error, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DeletionError {
    /// A sibling in an atomic group was aborted before the group flushed.
    #[error("couldn't scale down other nodes in node group {group}: {reason}")]
    GroupAborted { group: GroupId, reason: String },

    /// The node arrived after its atomic group had already been aborted.
    #[error("scale down failed for node group {group} as a whole")]
    GroupAlreadyAborted { group: GroupId },

    /// The node arrived after its atomic group had already been flushed.
    #[error("node group {group} already flushed its deletion batch")]
    GroupAlreadyFlushed { group: GroupId },

    #[error("failed to drain node: {0}")]
    Drain(String),

    #[error("cloud provider failed to delete nodes: {0}")]
    Cloud(String),
}

/// Terminal outcome recorded for one node.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct NodeDeleteResult {
    pub result_type: NodeDeleteResultType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub err: Option<DeletionError>,
}

impl NodeDeleteResult {
    /// A successful deletion.
    pub fn ok() -> Self {
        Self {
            result_type: NodeDeleteResultType::Ok,
            err: None,
        }
    }

    /// A failed deletion with its cause.
    pub fn failed(result_type: NodeDeleteResultType, err: DeletionError) -> Self {
        Self {
            result_type,
            err: Some(err),
        }
    }

    pub fn is_ok(&self) -> bool {
        self.result_type == NodeDeleteResultType::Ok
    }
}
