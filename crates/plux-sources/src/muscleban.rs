//! MuscleBAN wearable data source
//!
//! Streams one EMG channel and the 3-axis accelerometer plus magnetometer.
//! Unlike the hub, the battery level is reported on its own port.

use crate::device::{validate_resolution, AcquisitionConfig, ChannelSource, DeviceConnector};
use crate::session::{run_plux_session, SessionPlan};
use plux_core::{
    config_error, NodeCategory, NodeDescriptor, Outbox, PluxResult, Port, Producer, StopFlag,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::info;

/// Entry-point name
pub const NODE_NAME: &str = "in_muscleban";

/// Fixed channel layout: EMG on port 1, ACC + MAG on port 2
pub const MUSCLEBAN_CHANNELS: [&str; 7] =
    ["EMG1", "ACC_X", "ACC_Y", "ACC_Z", "MAG_X", "MAG_Y", "MAG_Z"];

/// Port of the EMG channel
pub const EMG_PORT: u8 = 1;
pub const EMG_MASK: u8 = 0x01;
/// Port of the accelerometer and magnetometer (11 on some hardware revisions)
pub const ACC_MAG_PORT: u8 = 2;
/// 3xACC + 3xMAG
pub const ACC_MAG_MASK: u8 = 0x3F;

/// Target number of emissions per second when `emit_at_once` is unset
pub const TARGET_EMISSIONS_PER_SEC: u32 = 100;

static PORTS_OUT: [Port; 4] = [Port::DATA, Port::CHANNEL_NAMES, Port::BATTERY, Port::STATUS];

pub static DESCRIPTOR: NodeDescriptor = NodeDescriptor {
    name: NODE_NAME,
    category: NodeCategory::DataSource,
    description: "Feeds EMG, accelerometer and magnetometer frames from a MuscleBAN into the pipeline",
    ports_in: &[],
    ports_out: &PORTS_OUT,
};

fn default_n_bits() -> u8 {
    16
}

fn default_name() -> String {
    "Biosignalsplux".to_string()
}

fn default_battery_interval_secs() -> u64 {
    120
}

/// Batch size that keeps emissions at about 100 per second
pub fn default_emit_at_once(freq: u32) -> usize {
    (freq / TARGET_EMISSIONS_PER_SEC).max(1) as usize
}

/// Settings of a MuscleBAN node
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MuscleBanConfig {
    /// Bluetooth MAC address
    pub adr: String,
    /// Sampling frequency in Hz
    pub freq: u32,
    #[serde(default = "default_n_bits")]
    pub n_bits: u8,
    #[serde(default = "default_name")]
    pub name: String,
    /// Frames per batch; derived from `freq` when unset
    #[serde(default)]
    pub emit_at_once: Option<usize>,
    /// Seconds of acquisition between battery readings
    #[serde(default = "default_battery_interval_secs")]
    pub battery_interval_secs: u64,
}

impl MuscleBanConfig {
    pub fn new(adr: impl Into<String>, freq: u32) -> Self {
        Self {
            adr: adr.into(),
            freq,
            n_bits: default_n_bits(),
            name: default_name(),
            emit_at_once: None,
            battery_interval_secs: default_battery_interval_secs(),
        }
    }

    pub fn example() -> Self {
        Self {
            emit_at_once: Some(5),
            ..Self::new("mac address", 100)
        }
    }

    /// `emit_at_once`, or `max(freq / 100, 1)` when unset
    pub fn effective_emit_at_once(&self) -> usize {
        self.emit_at_once
            .unwrap_or_else(|| default_emit_at_once(self.freq))
    }

    /// Frames between battery readings
    pub fn battery_interval_frames(&self) -> u64 {
        (self.freq as u64 * self.battery_interval_secs).max(1)
    }

    pub fn channel_names() -> Vec<String> {
        MUSCLEBAN_CHANNELS.iter().map(|name| name.to_string()).collect()
    }

    pub fn validate(&self) -> PluxResult<()> {
        if self.adr.is_empty() {
            return Err(config_error!("adr must not be empty"));
        }
        if self.freq == 0 {
            return Err(plux_core::PluxError::InvalidSamplingRate {
                rate: self.freq,
                valid_range: "greater than 0Hz".to_string(),
            });
        }
        if self.emit_at_once == Some(0) {
            return Err(config_error!("emit_at_once must be at least 1"));
        }
        validate_resolution(self.n_bits)
    }

    pub fn acquisition(&self) -> AcquisitionConfig {
        AcquisitionConfig {
            frequency: self.freq,
            sources: vec![
                ChannelSource::new(EMG_PORT, self.n_bits, EMG_MASK),
                ChannelSource::new(ACC_MAG_PORT, self.n_bits, ACC_MAG_MASK),
            ],
        }
    }
}

/// MuscleBAN producer node
pub struct MuscleBan {
    config: MuscleBanConfig,
    connector: Arc<dyn DeviceConnector>,
}

impl MuscleBan {
    pub fn new(mut config: MuscleBanConfig, connector: Arc<dyn DeviceConnector>) -> PluxResult<Self> {
        config.validate()?;
        config.emit_at_once = Some(config.effective_emit_at_once());
        Ok(Self { config, connector })
    }

    pub fn config(&self) -> &MuscleBanConfig {
        &self.config
    }

    fn plan(&self) -> SessionPlan {
        SessionPlan {
            kind: "MuscleBan",
            address: self.config.adr.clone(),
            channel_names: MuscleBanConfig::channel_names(),
            acquisition: self.config.acquisition(),
            emit_at_once: self.config.effective_emit_at_once(),
            battery_interval_frames: Some(self.config.battery_interval_frames()),
            report_properties: true,
        }
    }
}

impl Producer for MuscleBan {
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
            "emit_at_once": self.config.effective_emit_at_once(),
        })
    }

    fn run_blocking(&mut self, outbox: Outbox, stop: StopFlag) -> PluxResult<()> {
        let plan = self.plan();
        let stats = run_plux_session(&plan, self.connector.as_ref(), outbox, stop)?;
        info!(node = %self.config.name, ?stats, "muscleban session finished");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::simulated::{SimulatedConnector, SimulatedDeviceConfig};
    use plux_core::{Payload, PortKind};

    #[test]
    fn test_default_emit_at_once_from_frequency() {
        assert_eq!(MuscleBanConfig::new("sim:ban", 250).effective_emit_at_once(), 2);
        assert_eq!(MuscleBanConfig::new("sim:ban", 1000).effective_emit_at_once(), 10);
        assert_eq!(MuscleBanConfig::new("sim:ban", 50).effective_emit_at_once(), 1);

        let explicit = MuscleBanConfig {
            emit_at_once: Some(7),
            ..MuscleBanConfig::new("sim:ban", 1000)
        };
        assert_eq!(explicit.effective_emit_at_once(), 7);
    }

    #[test]
    fn test_settings_report_derived_batch_size() {
        let node = MuscleBan::new(
            MuscleBanConfig::new("sim:ban", 250),
            Arc::new(SimulatedConnector::default()),
        )
        .unwrap();
        assert_eq!(node.settings()["emit_at_once"], 2);
        assert_eq!(node.config().emit_at_once, Some(2));
    }

    #[test]
    fn test_fixed_sources() {
        let acquisition = MuscleBanConfig::new("sim:ban", 1000).acquisition();
        assert_eq!(acquisition.sources.len(), 2);
        assert_eq!(acquisition.sources[0].port, 1);
        assert_eq!(acquisition.sources[0].ch_mask, 0x01);
        assert_eq!(acquisition.sources[1].port, 2);
        assert_eq!(acquisition.sources[1].ch_mask, 0x3F);
        assert!(acquisition.sources.iter().all(|s| s.freq_divisor == 1 && s.n_bits == 16));
        assert_eq!(acquisition.total_channels(), MUSCLEBAN_CHANNELS.len());
    }

    #[test]
    fn test_battery_interval_scales_with_frequency() {
        let config = MuscleBanConfig::new("sim:ban", 500);
        assert_eq!(config.battery_interval_frames(), 60_000);
    }

    #[test]
    fn test_invalid_settings() {
        assert!(MuscleBanConfig::new("", 1000).validate().is_err());
        assert!(MuscleBanConfig::new("sim:ban", 0).validate().is_err());
        let zero_batch = MuscleBanConfig {
            emit_at_once: Some(0),
            ..MuscleBanConfig::new("sim:ban", 1000)
        };
        assert!(zero_batch.validate().is_err());
    }

    #[test]
    fn test_session_messages() {
        let connector = SimulatedConnector::new(SimulatedDeviceConfig {
            frame_limit: Some(20),
            battery: 64.0,
            ..Default::default()
        });
        let config = MuscleBanConfig {
            battery_interval_secs: 1,
            ..MuscleBanConfig::new("sim:ban", 10)
        };
        let mut node = MuscleBan::new(config, Arc::new(connector)).unwrap();

        let (outbox, mut receiver) = Outbox::channel(node.name(), 1024);
        node.run_blocking(outbox, StopFlag::new()).unwrap();

        let mut messages = Vec::new();
        while let Ok(message) = receiver.try_recv() {
            messages.push(message);
        }

        assert_eq!(
            messages[0].payload,
            Payload::Status("Connecting MuscleBan: sim:ban".to_string())
        );
        assert_eq!(messages[1].payload, Payload::Channels(MuscleBanConfig::channel_names()));
        assert_eq!(
            messages[2].payload,
            Payload::Status("Connected MuscleBan: sim:ban".to_string())
        );
        match &messages[3].payload {
            Payload::Status(status) => {
                assert!(status.starts_with("Looping MuscleBan: sim:ban\n"));
                assert!(status.contains("\n description: simulated plux device"));
            }
            other => panic!("expected properties status, got {:?}", other),
        }

        let battery: Vec<&Payload> = messages
            .iter()
            .filter(|m| m.port() == PortKind::Battery)
            .map(|m| &m.payload)
            .collect();
        assert_eq!(battery, vec![&Payload::Battery(64), &Payload::Battery(64)]);

        let batches: Vec<_> = messages
            .iter()
            .filter_map(|m| match &m.payload {
                Payload::Data(batch) => Some(batch.shape()),
                _ => None,
            })
            .collect();
        assert_eq!(batches, vec![(1, 1, 7); 20]);

        assert_eq!(
            messages.last().unwrap().payload,
            Payload::Status("Stopped and closed MuscleBan: sim:ban".to_string())
        );
    }

    #[test]
    fn test_connection_failure_is_not_retried() {
        let connector = SimulatedConnector::new(SimulatedDeviceConfig {
            fail_open: true,
            ..Default::default()
        });
        let log = connector.log();
        let mut node = MuscleBan::new(MuscleBanConfig::new("sim:ban", 1000), Arc::new(connector)).unwrap();

        let (outbox, _receiver) = Outbox::channel(node.name(), 64);
        assert!(node.run_blocking(outbox, StopFlag::new()).is_err());
        assert_eq!(log.lock().unwrap().len(), 1);
    }
}
