//! Simulated plux device for development without hardware
//!
//! Produces raw frames around mid-scale with a slow per-channel oscillation
//! and gaussian noise. Sequence gaps, frame limits and failures can be
//! scripted to exercise the adapters.

use crate::device::{AcquisitionConfig, DeviceConnector, DeviceHandle, DeviceQuery, FrameSink};
use plux_core::{Frame, PluxError, PluxResult};
use rand::{Rng, SeedableRng};
use rand_distr::{Distribution, Normal};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

/// Address prefix routed to the simulator
pub const SIMULATED_PREFIX: &str = "sim:";

/// Behaviour of simulated devices
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimulatedDeviceConfig {
    /// Random seed for reproducibility
    pub seed: u64,
    /// Noise standard deviation in raw units
    pub noise_std: f32,
    /// Oscillation amplitude in raw units
    pub amplitude: f32,
    /// End the loop on its own after this many frames
    pub frame_limit: Option<u64>,
    /// `(after_seq, skipped)`: after emitting `after_seq`, jump the counter
    pub gaps: Vec<(u64, u64)>,
    /// Reported battery level
    pub battery: f32,
    /// Sleep between frames to match the acquisition frequency
    pub realtime: bool,
    /// Fail `open` with a device error
    pub fail_open: bool,
    /// Fail `start` with a device error
    pub fail_start: bool,
}

impl Default for SimulatedDeviceConfig {
    fn default() -> Self {
        Self {
            seed: 42,
            noise_std: 200.0,
            amplitude: 4000.0,
            frame_limit: None,
            gaps: Vec::new(),
            battery: 87.0,
            realtime: false,
            fail_open: false,
            fail_start: false,
        }
    }
}

/// Lifecycle calls observed on simulated devices, shared for inspection
pub type DeviceLog = Arc<Mutex<Vec<String>>>;

/// Connector handing out [`SimulatedDevice`]s
#[derive(Debug, Clone, Default)]
pub struct SimulatedConnector {
    config: SimulatedDeviceConfig,
    log: DeviceLog,
}

impl SimulatedConnector {
    pub fn new(config: SimulatedDeviceConfig) -> Self {
        Self {
            config,
            log: DeviceLog::default(),
        }
    }

    /// Calls made on every device opened through this connector
    pub fn log(&self) -> DeviceLog {
        self.log.clone()
    }
}

impl DeviceConnector for SimulatedConnector {
    fn open(&self, address: &str) -> PluxResult<Box<dyn DeviceHandle>> {
        record(&self.log, format!("open {}", address));
        if self.config.fail_open {
            return Err(PluxError::device(address, "communication port does not exist"));
        }
        let device = SimulatedDevice::new(address, self.config.clone(), self.log.clone())?;
        Ok(Box::new(device))
    }
}

fn record(log: &DeviceLog, entry: String) {
    if let Ok(mut entries) = log.lock() {
        entries.push(entry);
    }
}

/// In-memory stand-in for a plux device handle
pub struct SimulatedDevice {
    address: String,
    config: SimulatedDeviceConfig,
    log: DeviceLog,
    rng: rand::rngs::StdRng,
    normal_dist: Normal<f32>,
    acquisition: Option<AcquisitionConfig>,
    seq: u64,
}

impl SimulatedDevice {
    pub fn new(address: &str, config: SimulatedDeviceConfig, log: DeviceLog) -> PluxResult<Self> {
        let rng = rand::rngs::StdRng::seed_from_u64(config.seed);
        let normal_dist = Normal::new(0.0, config.noise_std).map_err(|e| {
            PluxError::device(address, format!("invalid noise configuration: {}", e))
        })?;

        Ok(Self {
            address: address.to_string(),
            config,
            log,
            rng,
            normal_dist,
            acquisition: None,
            seq: 0,
        })
    }

    /// Generate one frame for the running acquisition
    fn next_frame(&mut self, acquisition: &AcquisitionConfig) -> Frame {
        let t = self.seq as f32 / acquisition.frequency.max(1) as f32;
        let mut frame = Vec::with_capacity(acquisition.total_channels());

        for source in &acquisition.sources {
            let mid = (1u32 << (source.n_bits.clamp(1, 16) - 1)) as f32;
            let max = ((1u32 << source.n_bits.clamp(1, 16)) - 1) as f32;
            let scale = mid / 32768.0;

            for ch in 0..source.active_channels() {
                let freq = 1.0 + ch as f32 * 0.5 + source.port as f32 * 0.25;
                let mut value = mid
                    + scale * self.config.amplitude * (2.0 * std::f32::consts::PI * freq * t).sin();
                value += scale * self.normal_dist.sample(&mut self.rng);
                // Occasional spike, like a motion artifact
                if self.rng.gen::<f32>() < 0.001 {
                    value += scale * self.config.amplitude * self.rng.gen_range(-1.0..1.0);
                }
                frame.push(value.clamp(0.0, max) as i32);
            }
        }

        Frame::new(self.seq, frame)
    }

    fn advance_seq(&mut self) {
        let skipped = self
            .config
            .gaps
            .iter()
            .find(|(after, _)| *after == self.seq)
            .map(|(_, skipped)| *skipped)
            .unwrap_or(0);
        self.seq += 1 + skipped;
    }
}

impl DeviceQuery for SimulatedDevice {
    fn battery(&mut self) -> PluxResult<f32> {
        Ok(self.config.battery)
    }

    fn properties(&mut self) -> PluxResult<BTreeMap<String, String>> {
        let mut properties = BTreeMap::new();
        properties.insert("description".to_string(), "simulated plux device".to_string());
        properties.insert("firmwareVersion".to_string(), "0x0000".to_string());
        properties.insert("path".to_string(), self.address.clone());
        Ok(properties)
    }
}

impl DeviceHandle for SimulatedDevice {
    fn address(&self) -> &str {
        &self.address
    }

    fn start(&mut self, config: &AcquisitionConfig) -> PluxResult<()> {
        record(&self.log, format!("start {}Hz {}ch", config.frequency, config.total_channels()));
        if self.config.fail_start {
            return Err(PluxError::device(&self.address, "failed to start acquisition"));
        }
        self.acquisition = Some(config.clone());
        self.seq = 0;
        Ok(())
    }

    fn run_loop(&mut self, sink: &mut dyn FrameSink) -> PluxResult<()> {
        let acquisition = self
            .acquisition
            .clone()
            .ok_or_else(|| PluxError::device(&self.address, "loop called before start"))?;
        record(&self.log, "loop".to_string());

        let period = Duration::from_secs_f64(1.0 / acquisition.frequency.max(1) as f64);
        let started = Instant::now();
        let mut delivered = 0u64;

        loop {
            if let Some(limit) = self.config.frame_limit {
                if delivered >= limit {
                    break;
                }
            }

            let frame = self.next_frame(&acquisition);
            delivered += 1;
            if sink.on_frame(frame.seq, &frame.data, self) {
                break;
            }
            self.advance_seq();

            if self.config.realtime {
                let due = period.mul_f64(delivered as f64);
                if let Some(wait) = due.checked_sub(started.elapsed()) {
                    std::thread::sleep(wait);
                }
            }
        }

        record(&self.log, format!("loop ended after {} frames", delivered));
        Ok(())
    }

    fn stop(&mut self) -> PluxResult<()> {
        record(&self.log, "stop".to_string());
        self.acquisition = None;
        Ok(())
    }

    fn close(&mut self) -> PluxResult<()> {
        record(&self.log, "close".to_string());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::ChannelSource;

    struct Collect {
        frames: Vec<(u64, Vec<i32>)>,
        stop_after: usize,
    }

    impl FrameSink for Collect {
        fn on_frame(&mut self, seq: u64, data: &[i32], _device: &mut dyn DeviceQuery) -> bool {
            self.frames.push((seq, data.to_vec()));
            self.frames.len() >= self.stop_after
        }
    }

    fn acquisition() -> AcquisitionConfig {
        AcquisitionConfig {
            frequency: 1000,
            sources: vec![ChannelSource::new(1, 16, 0x01), ChannelSource::new(2, 16, 0x3F)],
        }
    }

    #[test]
    fn test_frames_have_configured_width() {
        let connector = SimulatedConnector::default();
        let mut device = connector.open("sim:ban").unwrap();
        device.start(&acquisition()).unwrap();

        let mut sink = Collect { frames: Vec::new(), stop_after: 50 };
        device.run_loop(&mut sink).unwrap();

        assert_eq!(sink.frames.len(), 50);
        for (_, frame) in &sink.frames {
            assert_eq!(frame.len(), 7);
            assert!(frame.iter().all(|v| (0..=65535).contains(v)));
        }
    }

    #[test]
    fn test_scripted_gap() {
        let connector = SimulatedConnector::new(SimulatedDeviceConfig {
            gaps: vec![(2, 3)],
            ..Default::default()
        });
        let mut device = connector.open("sim:hub").unwrap();
        device.start(&acquisition()).unwrap();

        let mut sink = Collect { frames: Vec::new(), stop_after: 5 };
        device.run_loop(&mut sink).unwrap();

        let seqs: Vec<u64> = sink.frames.iter().map(|(seq, _)| *seq).collect();
        assert_eq!(seqs, vec![0, 1, 2, 6, 7]);
    }

    #[test]
    fn test_frame_limit_ends_loop() {
        let connector = SimulatedConnector::new(SimulatedDeviceConfig {
            frame_limit: Some(10),
            ..Default::default()
        });
        let mut device = connector.open("sim:hub").unwrap();
        device.start(&acquisition()).unwrap();

        let mut sink = Collect { frames: Vec::new(), stop_after: usize::MAX };
        device.run_loop(&mut sink).unwrap();
        assert_eq!(sink.frames.len(), 10);
    }

    #[test]
    fn test_loop_requires_start() {
        let mut device = SimulatedConnector::default().open("sim:hub").unwrap();
        let mut sink = Collect { frames: Vec::new(), stop_after: 1 };
        assert!(device.run_loop(&mut sink).is_err());
    }

    #[test]
    fn test_same_seed_same_frames() {
        let run = || {
            let mut device = SimulatedConnector::default().open("sim:hub").unwrap();
            device.start(&acquisition()).unwrap();
            let mut sink = Collect { frames: Vec::new(), stop_after: 20 };
            device.run_loop(&mut sink).unwrap();
            sink.frames
        };
        assert_eq!(run(), run());
    }

    #[test]
    fn test_lifecycle_logged() {
        let connector = SimulatedConnector::new(SimulatedDeviceConfig {
            frame_limit: Some(1),
            ..Default::default()
        });
        let mut device = connector.open("sim:hub").unwrap();
        device.start(&acquisition()).unwrap();
        let mut sink = Collect { frames: Vec::new(), stop_after: 1 };
        device.run_loop(&mut sink).unwrap();
        device.stop().unwrap();
        device.close().unwrap();

        let log = connector.log();
        let entries = log.lock().unwrap();
        assert_eq!(entries.first().map(String::as_str), Some("open sim:hub"));
        assert_eq!(entries.last().map(String::as_str), Some("close"));
        assert!(entries.iter().any(|e| e == "start 1000Hz 7ch"));
    }
}
