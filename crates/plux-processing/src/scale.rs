//! Raw-to-normalized scaling for plux data

use plux_core::{Batch, NodeCategory, NodeDescriptor, PluxResult, Port, Transform};
use serde::{Deserialize, Serialize};

/// Entry-point name
pub const NODE_NAME: &str = "transform_plux_scale";

static PORTS_IN: [Port; 1] = [Port::DATA];
static PORTS_OUT: [Port; 1] = [Port::DATA];

pub static DESCRIPTOR: NodeDescriptor = NodeDescriptor {
    name: NODE_NAME,
    category: NodeCategory::Transform,
    description: "Maps raw 16 bit plux values to [-1, 1)",
    ports_in: &PORTS_IN,
    ports_out: &PORTS_OUT,
};

fn default_name() -> String {
    "Plux Scale".to_string()
}

/// Settings of a scale node
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScaleConfig {
    #[serde(default = "default_name")]
    pub name: String,
}

impl Default for ScaleConfig {
    fn default() -> Self {
        Self {
            name: default_name(),
        }
    }
}

impl ScaleConfig {
    pub fn example() -> Self {
        Self::default()
    }
}

/// Elementwise `x / 2^15 - 1`
#[derive(Debug, Clone)]
pub struct ScaleTransform {
    config: ScaleConfig,
    processed: u64,
}

impl ScaleTransform {
    pub fn new(config: ScaleConfig) -> Self {
        Self { config, processed: 0 }
    }

    /// Batches scaled so far
    pub fn processed(&self) -> u64 {
        self.processed
    }
}

impl Default for ScaleTransform {
    fn default() -> Self {
        Self::new(ScaleConfig::default())
    }
}

impl Transform for ScaleTransform {
    fn descriptor(&self) -> &'static NodeDescriptor {
        &DESCRIPTOR
    }

    fn name(&self) -> &str {
        &self.config.name
    }

    fn process(&mut self, data: &Batch) -> PluxResult<Batch> {
        self.processed += 1;
        Ok(data.normalized())
    }
}
