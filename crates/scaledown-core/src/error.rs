//! Error types for node group handles and configuration.

use thiserror::Error;

/// Result type alias for node group operations.
pub type NodeGroupResult<T> = Result<T, NodeGroupError>;

/// Errors returned by a `NodeGroup`.
#[derive(Debug, Error)]
pub enum NodeGroupError {
    #[error("failed to get target size for node group {group}: {reason}")]
    TargetSize { group: String, reason: String },

    #[error("node {node} does not belong to node group {group}")]
    NodeNotInGroup { group: String, node: String },

    #[error("failed to delete nodes from node group {group}: {reason}")]
    DeleteFailed { group: String, reason: String },
}

/// Result type alias for configuration loading.
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Errors that can occur while loading `scaledown.toml`.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("failed to render config: {0}")]
    Render(#[from] toml::ser::Error),

    #[error("invalid duration for {field}: {value:?}")]
    InvalidDuration { field: &'static str, value: String },
}
