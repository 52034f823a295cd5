//! Biosignalsplux hub data source
//!
//! Streams frames from a biosignalsplux hub: the first `channel_names.len()`
//! inputs of the hub are enabled and emitted as normalized batches.

use crate::device::{channel_mask, validate_hub_acquisition, AcquisitionConfig, ChannelSource, DeviceConnector};
use crate::session::{run_plux_session, SessionPlan};
use plux_core::{
    config_error, NodeCategory, NodeDescriptor, Outbox, PluxResult, Port, Producer, StopFlag,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::info;

/// Entry-point name
pub const NODE_NAME: &str = "in_biosignalsplux";

static PORTS_OUT: [Port; 3] = [Port::DATA, Port::CHANNEL_NAMES, Port::STATUS];

pub static DESCRIPTOR: NodeDescriptor = NodeDescriptor {
    name: NODE_NAME,
    category: NodeCategory::DataSource,
    description: "Feeds data frames from a biosignalsplux hub into the pipeline",
    ports_in: &[],
    ports_out: &PORTS_OUT,
};

fn default_n_bits() -> u8 {
    16
}

fn default_name() -> String {
    "Biosignalsplux".to_string()
}

fn default_emit_at_once() -> usize {
    1
}

/// Settings of a biosignalsplux node
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BiosignalsPluxConfig {
    /// Device address (MAC or vendor id)
    pub adr: String,
    /// Sampling frequency in Hz
    pub freq: u32,
    /// One name per enabled hub input, in port order
    #[serde(default)]
    pub channel_names: Vec<String>,
    #[serde(default = "default_n_bits")]
    pub n_bits: u8,
    #[serde(default = "default_name")]
    pub name: String,
    /// Frames per emitted batch
    #[serde(default = "default_emit_at_once")]
    pub emit_at_once: usize,
}

impl BiosignalsPluxConfig {
    pub fn new(adr: impl Into<String>, freq: u32, channel_names: Vec<String>) -> Self {
        Self {
            adr: adr.into(),
            freq,
            channel_names,
            n_bits: default_n_bits(),
            name: default_name(),
            emit_at_once: default_emit_at_once(),
        }
    }

    /// Settings shown as a template in pipeline editors
    pub fn example() -> Self {
        Self::new("mac address", 100, vec!["Channel 1".to_string()])
    }

    pub fn validate(&self) -> PluxResult<()> {
        if self.adr.is_empty() {
            return Err(config_error!("adr must not be empty"));
        }
        if self.emit_at_once == 0 {
            return Err(config_error!("emit_at_once must be at least 1"));
        }
        validate_hub_acquisition(self.channel_names.len(), self.freq, self.n_bits)
    }

    /// One hub source covering the named channels
    pub fn acquisition(&self) -> PluxResult<AcquisitionConfig> {
        let mask = channel_mask(self.channel_names.len())?;
        Ok(AcquisitionConfig {
            frequency: self.freq,
            sources: vec![ChannelSource::new(0, self.n_bits, mask)],
        })
    }
}

/// Biosignalsplux hub producer node
pub struct BiosignalsPlux {
    config: BiosignalsPluxConfig,
    connector: Arc<dyn DeviceConnector>,
}

impl BiosignalsPlux {
    pub fn new(config: BiosignalsPluxConfig, connector: Arc<dyn DeviceConnector>) -> PluxResult<Self> {
        config.validate()?;
        Ok(Self { config, connector })
    }

    pub fn config(&self) -> &BiosignalsPluxConfig {
        &self.config
    }

    fn plan(&self) -> PluxResult<SessionPlan> {
        Ok(SessionPlan {
            kind: "BiosignalsPluxHub",
            address: self.config.adr.clone(),
            channel_names: self.config.channel_names.clone(),
            acquisition: self.config.acquisition()?,
            emit_at_once: self.config.emit_at_once,
            battery_interval_frames: None,
            report_properties: false,
        })
    }
}

impl Producer for BiosignalsPlux {
    fn descriptor(&self) -> &'static NodeDescriptor {
        &DESCRIPTOR
    }

    fn name(&self) -> &str {
        &self.config.name
    }

    fn settings(&self) -> serde_json::Value {
        serde_json::json!({
            "adr": self.config.adr,
            "freq": self.config.freq,
            "n_bits": self.config.n_bits,
            "channel_names": self.config.channel_names,
        })
    }

    fn run_blocking(&mut self, outbox: Outbox, stop: StopFlag) -> PluxResult<()> {
        let plan = self.plan()?;
        let stats = run_plux_session(&plan, self.connector.as_ref(), outbox, stop)?;
        info!(node = %self.config.name, ?stats, "biosignalsplux session finished");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::simulated::{SimulatedConnector, SimulatedDeviceConfig};
    use plux_core::{Payload, PortKind};

    fn names(n: usize) -> Vec<String> {
        (1..=n).map(|i| format!("Channel {}", i)).collect()
    }

    #[test]
    fn test_config_defaults_from_json() {
        let config: BiosignalsPluxConfig =
            serde_json::from_str(r#"{"adr": "00:07:80:4D:2E:76", "freq": 1000}"#).unwrap();
        assert_eq!(config.n_bits, 16);
        assert_eq!(config.name, "Biosignalsplux");
        assert_eq!(config.emit_at_once, 1);
        assert!(config.channel_names.is_empty());
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_acquisition_mask_from_channel_names() {
        let config = BiosignalsPluxConfig::new("sim:hub", 1000, names(3));
        let acquisition = config.acquisition().unwrap();
        assert_eq!(acquisition.sources[0].ch_mask, 0x07);
        assert_eq!(acquisition.total_channels(), 3);
    }

    #[test]
    fn test_frequency_limit_for_channels() {
        let config = BiosignalsPluxConfig::new("sim:hub", 3000, names(6));
        assert!(config.validate().is_err());
        let config = BiosignalsPluxConfig::new("sim:hub", 2000, names(6));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_settings_shape() {
        let node = BiosignalsPlux::new(BiosignalsPluxConfig::example(), Arc::new(SimulatedConnector::default())).unwrap();
        let settings = node.settings();
        assert_eq!(settings["adr"], "mac address");
        assert_eq!(settings["freq"], 100);
        assert_eq!(settings["channel_names"][0], "Channel 1");
    }

    #[test]
    fn test_stream_until_stop() {
        let connector = SimulatedConnector::new(SimulatedDeviceConfig::default());
        let log = connector.log();
        let mut config = BiosignalsPluxConfig::new("sim:hub", 1000, names(2));
        config.emit_at_once = 4;
        let mut node = BiosignalsPlux::new(config, Arc::new(connector)).unwrap();

        let (outbox, mut receiver) = Outbox::channel(node.name(), 1024);
        let stop = StopFlag::new();
        stop.request_stop();
        node.run_blocking(outbox, stop).unwrap();

        let mut messages = Vec::new();
        while let Ok(message) = receiver.try_recv() {
            messages.push(message);
        }

        assert_eq!(
            messages[0].payload,
            Payload::Status("Connecting BiosignalsPluxHub: sim:hub".to_string())
        );
        assert_eq!(messages[1].port(), PortKind::ChannelNames);
        assert_eq!(
            messages[2].payload,
            Payload::Status("Connected BiosignalsPluxHub: sim:hub".to_string())
        );
        // One frame observed the stop flag; the partial buffer is not flushed
        assert!(messages.iter().all(|m| m.port() != PortKind::Data));
        assert_eq!(
            messages.last().unwrap().payload,
            Payload::Status("Stopped and closed BiosignalsPluxHub: sim:hub".to_string())
        );

        let entries = log.lock().unwrap();
        let tail: Vec<&str> = entries.iter().rev().take(2).map(String::as_str).collect();
        assert_eq!(tail, vec!["close", "stop"]);
    }

    #[test]
    fn test_batches_emitted_per_emit_at_once() {
        let connector = SimulatedConnector::new(SimulatedDeviceConfig {
            frame_limit: Some(10),
            ..Default::default()
        });
        let mut config = BiosignalsPluxConfig::new("sim:hub", 1000, names(2));
        config.emit_at_once = 4;
        let mut node = BiosignalsPlux::new(config, Arc::new(connector)).unwrap();

        let (outbox, mut receiver) = Outbox::channel(node.name(), 1024);
        node.run_blocking(outbox, StopFlag::new()).unwrap();

        let mut batches = Vec::new();
        while let Ok(message) = receiver.try_recv() {
            if let Payload::Data(batch) = message.payload {
                assert!(message.tick);
                batches.push(batch);
            }
        }

        assert_eq!(batches.len(), 2);
        for batch in &batches {
            assert_eq!(batch.shape(), (1, 4, 2));
            assert!(batch.view().iter().all(|v| (-1.0..1.0).contains(v)));
        }
    }

    #[test]
    fn test_start_failure_propagates() {
        let connector = SimulatedConnector::new(SimulatedDeviceConfig {
            fail_start: true,
            ..Default::default()
        });
        let log = connector.log();
        let mut node = BiosignalsPlux::new(
            BiosignalsPluxConfig::new("sim:hub", 1000, names(1)),
            Arc::new(connector),
        )
        .unwrap();

        let (outbox, _receiver) = Outbox::channel(node.name(), 64);
        assert!(node.run_blocking(outbox, StopFlag::new()).is_err());

        let entries = log.lock().unwrap();
        assert!(entries.iter().any(|e| e == "close"));
    }
}
