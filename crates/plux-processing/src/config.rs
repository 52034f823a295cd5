//! Node configuration files
//!
//! A config names the node by its entry point in the `node` field; the
//! remaining fields are that node's settings:
//!
//! ```json
//! { "node": "in_muscleban", "adr": "00:07:80:4D:2E:76", "freq": 1000 }
//! ```

use crate::scale::{self, ScaleConfig};
use plux_core::{PluxError, PluxResult};
use plux_sources::{biosignalsplux, muscleban, riot};
use plux_sources::{BiosignalsPluxConfig, MuscleBanConfig, RiotConfig};
use serde::{Deserialize, Serialize};

/// Settings for one node, tagged by entry-point name
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "node")]
pub enum NodeConfig {
    #[serde(rename = "in_biosignalsplux")]
    BiosignalsPlux(BiosignalsPluxConfig),
    #[serde(rename = "in_muscleban")]
    MuscleBan(MuscleBanConfig),
    #[serde(rename = "in_riot")]
    Riot(RiotConfig),
    #[serde(rename = "transform_plux_scale")]
    Scale(ScaleConfig),
}

impl NodeConfig {
    /// Entry-point name of the configured node
    pub fn node_name(&self) -> &'static str {
        match self {
            NodeConfig::BiosignalsPlux(_) => biosignalsplux::NODE_NAME,
            NodeConfig::MuscleBan(_) => muscleban::NODE_NAME,
            NodeConfig::Riot(_) => riot::NODE_NAME,
            NodeConfig::Scale(_) => scale::NODE_NAME,
        }
    }

    /// Instance name
    pub fn name(&self) -> &str {
        match self {
            NodeConfig::BiosignalsPlux(c) => &c.name,
            NodeConfig::MuscleBan(c) => &c.name,
            NodeConfig::Riot(c) => &c.name,
            NodeConfig::Scale(c) => &c.name,
        }
    }

    /// Example settings for a node, as offered by pipeline editors
    pub fn example(node: &str) -> PluxResult<Self> {
        match node {
            biosignalsplux::NODE_NAME => Ok(NodeConfig::BiosignalsPlux(BiosignalsPluxConfig::example())),
            muscleban::NODE_NAME => Ok(NodeConfig::MuscleBan(MuscleBanConfig::example())),
            riot::NODE_NAME => Ok(NodeConfig::Riot(RiotConfig::example())),
            scale::NODE_NAME => Ok(NodeConfig::Scale(ScaleConfig::example())),
            other => Err(PluxError::UnknownNode {
                name: other.to_string(),
            }),
        }
    }

    pub fn validate(&self) -> PluxResult<()> {
        match self {
            NodeConfig::BiosignalsPlux(c) => c.validate(),
            NodeConfig::MuscleBan(c) => c.validate(),
            NodeConfig::Riot(c) => c.validate(),
            NodeConfig::Scale(_) => Ok(()),
        }
    }

    /// Export configuration to JSON
    pub fn to_json(&self) -> PluxResult<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Import configuration from JSON
    pub fn from_json(json: &str) -> PluxResult<Self> {
        Ok(serde_json::from_str(json)?)
    }
}
