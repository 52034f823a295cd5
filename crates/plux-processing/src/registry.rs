//! Node registry
//!
//! Every node this workspace provides is registered here under its
//! entry-point name. Hosts discover nodes through [`NodeRegistry::names`]
//! and construct them from a [`NodeConfig`] with [`NodeRegistry::build`].

use crate::config::NodeConfig;
use crate::scale::{self, ScaleTransform};
use plux_core::{NodeDescriptor, PluxError, PluxResult, Producer, Transform};
use plux_sources::{biosignalsplux, muscleban, riot};
use plux_sources::{BiosignalsPlux, DeviceConnector, MuscleBan, Riot};
use std::sync::Arc;
use tracing::debug;

/// Plugin group the nodes are published under
pub const ENTRY_POINT_GROUP: &str = "livenodes.nodes";

/// A registered entry point
#[derive(Debug, Clone, Copy)]
pub struct NodeEntry {
    pub name: &'static str,
    pub descriptor: &'static NodeDescriptor,
}

/// A constructed node, ready to run
pub enum NodeInstance {
    Producer(Box<dyn Producer>),
    Transform(Box<dyn Transform>),
}

impl NodeInstance {
    pub fn descriptor(&self) -> &'static NodeDescriptor {
        match self {
            NodeInstance::Producer(node) => node.descriptor(),
            NodeInstance::Transform(node) => node.descriptor(),
        }
    }

    pub fn name(&self) -> &str {
        match self {
            NodeInstance::Producer(node) => node.name(),
            NodeInstance::Transform(node) => node.name(),
        }
    }
}

impl std::fmt::Debug for NodeInstance {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let kind = match self {
            NodeInstance::Producer(_) => "Producer",
            NodeInstance::Transform(_) => "Transform",
        };
        f.debug_struct(kind)
            .field("node", &self.descriptor().name)
            .field("name", &self.name())
            .finish()
    }
}

/// Entry points of the `livenodes.nodes` group
#[derive(Debug, Clone)]
pub struct NodeRegistry {
    entries: Vec<NodeEntry>,
}

impl Default for NodeRegistry {
    fn default() -> Self {
        Self {
            entries: vec![
                NodeEntry {
                    name: biosignalsplux::NODE_NAME,
                    descriptor: &biosignalsplux::DESCRIPTOR,
                },
                NodeEntry {
                    name: muscleban::NODE_NAME,
                    descriptor: &muscleban::DESCRIPTOR,
                },
                NodeEntry {
                    name: riot::NODE_NAME,
                    descriptor: &riot::DESCRIPTOR,
                },
                NodeEntry {
                    name: scale::NODE_NAME,
                    descriptor: &scale::DESCRIPTOR,
                },
            ],
        }
    }
}

impl NodeRegistry {
    pub fn group(&self) -> &'static str {
        ENTRY_POINT_GROUP
    }

    pub fn entries(&self) -> &[NodeEntry] {
        &self.entries
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.entries.iter().map(|entry| entry.name).collect()
    }

    pub fn descriptor(&self, name: &str) -> PluxResult<&'static NodeDescriptor> {
        self.entries
            .iter()
            .find(|entry| entry.name == name)
            .map(|entry| entry.descriptor)
            .ok_or_else(|| PluxError::UnknownNode {
                name: name.to_string(),
            })
    }

    /// Construct the node a config describes
    ///
    /// Device nodes open their hardware through `connector` once run.
    pub fn build(
        &self,
        config: &NodeConfig,
        connector: Arc<dyn DeviceConnector>,
    ) -> PluxResult<NodeInstance> {
        // Rejects configs for nodes this registry does not carry
        self.descriptor(config.node_name())?;
        debug!(node = config.node_name(), name = config.name(), "building node");

        let instance = match config {
            NodeConfig::BiosignalsPlux(c) => {
                NodeInstance::Producer(Box::new(BiosignalsPlux::new(c.clone(), connector)?))
            }
            NodeConfig::MuscleBan(c) => {
                NodeInstance::Producer(Box::new(MuscleBan::new(c.clone(), connector)?))
            }
            NodeConfig::Riot(c) => NodeInstance::Producer(Box::new(Riot::new(c.clone())?)),
            NodeConfig::Scale(c) => NodeInstance::Transform(Box::new(ScaleTransform::new(c.clone()))),
        };
        Ok(instance)
    }
}
