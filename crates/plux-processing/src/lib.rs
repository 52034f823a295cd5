//! Plux-Processing: Node registry, configuration and execution
//!
//! Ties the source nodes and the scale transform together: configs name a
//! node by entry point, the registry builds it and the runner drives it.

pub mod config;
pub mod registry;
pub mod runner;
pub mod scale;

pub use config::NodeConfig;
pub use registry::{NodeEntry, NodeInstance, NodeRegistry, ENTRY_POINT_GROUP};
pub use runner::{NodeRunner, RunningNode, DEFAULT_QUEUE_CAPACITY};
pub use scale::{ScaleConfig, ScaleTransform};
