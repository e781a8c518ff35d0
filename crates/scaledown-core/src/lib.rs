//! scaledown-core — shared types for scale-down actuation.
//!
//! - **`types`** — node references, node group views, deletion results
//! - **`group`** — the `NodeGroup` capability and an in-memory implementation
//! - **`config`** — `scaledown.toml` parsing (eviction timings, batching)

pub mod config;
pub mod error;
pub mod group;
pub mod types;

pub use config::{EvictionSettings, ScaleDownConfig};
pub use error::{ConfigError, ConfigResult, NodeGroupError, NodeGroupResult};
pub use group::{BoxFuture, NodeGroup, StaticNodeGroup};
pub use types::*;
