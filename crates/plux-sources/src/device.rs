//! Plux device SDK boundary
//!
//! The vendor SDK is reached only through these traits. A session opens a
//! handle through a [`DeviceConnector`], starts acquisition, hands a
//! [`FrameSink`] to the blocking loop and finally stops and closes the
//! handle. The loop keeps calling the sink until it returns `true`.

use plux_core::{PluxError, PluxResult};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;

/// Maximum channels on a biosignalsplux hub
pub const MAX_HUB_CHANNELS: usize = 8;

/// Supported resolutions in bits
pub const SUPPORTED_BITS: [u8; 2] = [8, 16];

/// Bit mask enabling the first `channels` inputs (1 → 0x01, 8 → 0xFF)
pub fn channel_mask(channels: usize) -> PluxResult<u8> {
    if channels == 0 || channels > MAX_HUB_CHANNELS {
        return Err(PluxError::InvalidChannelCount {
            count: channels,
            max: MAX_HUB_CHANNELS,
        });
    }
    Ok(((1u16 << channels) - 1) as u8)
}

/// Highest acquisition frequency the hub sustains for a channel count
pub fn max_frequency(channels: usize) -> Option<u32> {
    match channels {
        1 => Some(8000),
        2 => Some(5000),
        3 => Some(4000),
        4 | 5 => Some(3000),
        6..=8 => Some(2000),
        _ => None,
    }
}

/// Check frequency and resolution for a hub acquisition
pub fn validate_hub_acquisition(channels: usize, frequency: u32, n_bits: u8) -> PluxResult<()> {
    let max = max_frequency(channels).ok_or(PluxError::InvalidChannelCount {
        count: channels,
        max: MAX_HUB_CHANNELS,
    })?;

    if frequency == 0 || frequency > max {
        return Err(PluxError::InvalidSamplingRate {
            rate: frequency,
            valid_range: format!("1-{}Hz for {} channels", max, channels),
        });
    }

    validate_resolution(n_bits)
}

pub fn validate_resolution(n_bits: u8) -> PluxResult<()> {
    if SUPPORTED_BITS.contains(&n_bits) {
        Ok(())
    } else {
        Err(plux_core::config_error!(
            "n_bits must be one of {:?}, got {}",
            SUPPORTED_BITS,
            n_bits
        ))
    }
}

/// One hardware port streamed during acquisition
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelSource {
    /// Port number on the device
    pub port: u8,
    /// Subsampling factor relative to the base frequency
    pub freq_divisor: u32,
    /// Resolution in bits
    pub n_bits: u8,
    /// Bit mask of the channels streamed by this port
    pub ch_mask: u8,
}

impl ChannelSource {
    pub fn new(port: u8, n_bits: u8, ch_mask: u8) -> Self {
        Self {
            port,
            freq_divisor: 1,
            n_bits,
            ch_mask,
        }
    }

    /// Number of values this source contributes to each frame
    pub fn active_channels(&self) -> usize {
        self.ch_mask.count_ones() as usize
    }
}

/// Parameters for `DeviceHandle::start`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AcquisitionConfig {
    /// Base sampling frequency in Hz
    pub frequency: u32,
    pub sources: Vec<ChannelSource>,
}

impl AcquisitionConfig {
    /// Frame width across all sources
    pub fn total_channels(&self) -> usize {
        self.sources.iter().map(ChannelSource::active_channels).sum()
    }
}

/// Queries available while the device loop is running
pub trait DeviceQuery {
    /// Battery level in percent
    fn battery(&mut self) -> PluxResult<f32>;

    /// Device description (firmware, serial, ...)
    fn properties(&mut self) -> PluxResult<BTreeMap<String, String>>;
}

/// Receiver of raw frames from the device loop
pub trait FrameSink {
    /// Handle one frame; returning `true` ends the device loop
    fn on_frame(&mut self, seq: u64, data: &[i32], device: &mut dyn DeviceQuery) -> bool;
}

/// An open device session
pub trait DeviceHandle: DeviceQuery + Send {
    fn address(&self) -> &str;

    fn start(&mut self, config: &AcquisitionConfig) -> PluxResult<()>;

    /// Block delivering frames to `sink` until it asks to stop
    fn run_loop(&mut self, sink: &mut dyn FrameSink) -> PluxResult<()>;

    fn stop(&mut self) -> PluxResult<()>;

    fn close(&mut self) -> PluxResult<()>;
}

/// Factory for device handles
pub trait DeviceConnector: Send + Sync {
    fn open(&self, address: &str) -> PluxResult<Box<dyn DeviceHandle>>;
}

/// Connector used when no vendor SDK binding is linked in
#[derive(Debug, Clone, Copy, Default)]
pub struct UnboundConnector;

impl DeviceConnector for UnboundConnector {
    fn open(&self, address: &str) -> PluxResult<Box<dyn DeviceHandle>> {
        Err(PluxError::device(
            address,
            "no plux SDK binding available for hardware addresses",
        ))
    }
}

/// Routes addresses with a given prefix to one connector, everything else
/// to a fallback
pub struct PrefixRouter {
    prefix: String,
    matched: Arc<dyn DeviceConnector>,
    fallback: Arc<dyn DeviceConnector>,
}

impl PrefixRouter {
    pub fn new(
        prefix: impl Into<String>,
        matched: Arc<dyn DeviceConnector>,
        fallback: Arc<dyn DeviceConnector>,
    ) -> Self {
        Self {
            prefix: prefix.into(),
            matched,
            fallback,
        }
    }
}

impl DeviceConnector for PrefixRouter {
    fn open(&self, address: &str) -> PluxResult<Box<dyn DeviceHandle>> {
        if address.starts_with(&self.prefix) {
            self.matched.open(address)
        } else {
            self.fallback.open(address)
        }
    }
}
