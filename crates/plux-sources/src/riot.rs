//! RIoT sensor data source over OSC/UDP
//!
//! A RIoT board sends one OSC message per sample to `/{id}/raw` carrying
//! its 22 raw sensor values. Each message is scaled and emitted right away
//! as a `(1, 1, n)` batch.

use plux_core::{
    config_error, Batch, NodeCategory, NodeClock, NodeDescriptor, Outbox, PluxError, PluxResult,
    Port, Producer, StopFlag,
};
use rosc::{OscMessage, OscPacket, OscType};
use serde::{Deserialize, Serialize};
use std::io::ErrorKind;
use std::net::UdpSocket;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Entry-point name
pub const NODE_NAME: &str = "in_riot";

/// Channels in the order the RIoT firmware sends them
pub const RIOT_CHANNELS: [&str; 22] = [
    "ACC_X", "ACC_Y", "ACC_Z", "GYRO_X", "GYRO_Y", "GYRO_Z", "MAG_X", "MAG_Y", "MAG_Z", "TEMP",
    "IO", "A1", "A2", "C", "Q1", "Q2", "Q3", "Q4", "PITCH", "YAW", "ROLL", "HEAD",
];

/// Full-scale range per channel; values are scaled by `2 / range`
const RIOT_RANGES: [f64; 22] = [
    8.0, 8.0, 8.0, 2.0, 2.0, 2.0, 2.0, 2.0, 2.0, 1.0, 1.0, 1.0, 4095.0, 4095.0, 1.0, 1.0, 1.0,
    1.0, 180.0, 180.0, 180.0, 180.0,
];

/// Per-channel scale factors applied to raw RIoT values
pub fn riot_factors() -> [f64; 22] {
    RIOT_RANGES.map(|range| 2.0 / range)
}

static PORTS_OUT: [Port; 2] = [Port::DATA, Port::CHANNEL_NAMES];

pub static DESCRIPTOR: NodeDescriptor = NodeDescriptor {
    name: NODE_NAME,
    category: NodeCategory::DataSource,
    description: "Receives RIoT sensor frames over OSC/UDP",
    ports_in: &[],
    ports_out: &PORTS_OUT,
};

fn default_name() -> String {
    "RIoT".to_string()
}

fn default_listen_ip() -> String {
    "192.168.1.101".to_string()
}

fn default_listen_port() -> u16 {
    9000
}

fn default_read_timeout_ms() -> u64 {
    250
}

/// Settings of a RIoT node
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiotConfig {
    /// Device id used in the OSC address `/{id}/raw`
    #[serde(default)]
    pub id: u32,
    #[serde(default = "default_name")]
    pub name: String,
    #[serde(default = "default_listen_ip")]
    pub listen_ip: String,
    #[serde(default = "default_listen_port")]
    pub listen_port: u16,
    /// How long a socket read waits before the stop flag is checked again
    #[serde(default = "default_read_timeout_ms")]
    pub read_timeout_ms: u64,
}

impl Default for RiotConfig {
    fn default() -> Self {
        Self {
            id: 0,
            name: default_name(),
            listen_ip: default_listen_ip(),
            listen_port: default_listen_port(),
            read_timeout_ms: default_read_timeout_ms(),
        }
    }
}

impl RiotConfig {
    pub fn example() -> Self {
        Self {
            name: "Name".to_string(),
            ..Self::default()
        }
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.listen_ip, self.listen_port)
    }

    /// OSC address this device sends to
    pub fn osc_address(&self) -> String {
        format!("/{}/raw", self.id)
    }

    pub fn validate(&self) -> PluxResult<()> {
        if self.listen_ip.is_empty() {
            return Err(config_error!("listen_ip must not be empty"));
        }
        if self.read_timeout_ms == 0 {
            return Err(config_error!("read_timeout_ms must be at least 1"));
        }
        Ok(())
    }
}

/// Maps OSC messages for one device id to scaled batches
#[derive(Debug, Clone)]
pub struct RiotFrameHandler {
    address: String,
    factors: [f64; 22],
    rejected: u64,
}

impl RiotFrameHandler {
    pub fn new(id: u32) -> Self {
        Self {
            address: format!("/{}/raw", id),
            factors: riot_factors(),
            rejected: 0,
        }
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    /// Messages that matched the address but could not be scaled
    pub fn rejected(&self) -> u64 {
        self.rejected
    }

    /// Multiply each value by its channel factor
    pub fn scale(&self, values: &[f64]) -> PluxResult<Vec<f64>> {
        if values.len() > self.factors.len() {
            return Err(PluxError::Shape {
                reason: format!(
                    "RIoT payload has {} values, at most {} channels are known",
                    values.len(),
                    self.factors.len()
                ),
            });
        }
        Ok(values
            .iter()
            .zip(self.factors.iter())
            .map(|(value, factor)| value * factor)
            .collect())
    }

    /// Scaled batch for a matching message, `None` otherwise
    pub fn on_message(&mut self, message: &OscMessage) -> Option<Batch> {
        if message.addr != self.address {
            debug!(addr = %message.addr, "ignoring OSC address");
            return None;
        }

        let values = match numeric_args(&message.args) {
            Ok(values) => values,
            Err(e) => {
                self.rejected += 1;
                warn!(error = %e, "rejecting RIoT message");
                return None;
            }
        };

        match self.scale(&values) {
            Ok(scaled) => Some(Batch::single_sample(&scaled)),
            Err(e) => {
                self.rejected += 1;
                warn!(error = %e, "rejecting RIoT message");
                None
            }
        }
    }

    /// Handle a packet, descending into bundles
    pub fn on_packet(&mut self, packet: &OscPacket) -> Vec<Batch> {
        let mut batches = Vec::new();
        self.collect(packet, &mut batches);
        batches
    }

    fn collect(&mut self, packet: &OscPacket, batches: &mut Vec<Batch>) {
        match packet {
            OscPacket::Message(message) => {
                if let Some(batch) = self.on_message(message) {
                    batches.push(batch);
                }
            }
            OscPacket::Bundle(bundle) => {
                for inner in &bundle.content {
                    self.collect(inner, batches);
                }
            }
        }
    }
}

fn numeric_args(args: &[OscType]) -> PluxResult<Vec<f64>> {
    args.iter()
        .enumerate()
        .map(|(index, arg)| match arg {
            OscType::Float(v) => Ok(*v as f64),
            OscType::Double(v) => Ok(*v),
            OscType::Int(v) => Ok(*v as f64),
            OscType::Long(v) => Ok(*v as f64),
            other => Err(PluxError::Osc {
                reason: format!("argument {} is not numeric: {:?}", index, other),
            }),
        })
        .collect()
}

/// RIoT producer node
pub struct Riot {
    config: RiotConfig,
}

impl Riot {
    pub fn new(config: RiotConfig) -> PluxResult<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &RiotConfig {
        &self.config
    }

    pub fn channel_names() -> Vec<String> {
        RIOT_CHANNELS.iter().map(|name| name.to_string()).collect()
    }

    /// Serve on an already bound socket until stopped or the queue closes
    pub fn serve(&self, socket: &UdpSocket, outbox: &mut Outbox, stop: &StopFlag) -> PluxResult<NodeClock> {
        socket.set_read_timeout(Some(Duration::from_millis(self.config.read_timeout_ms)))?;

        let mut handler = RiotFrameHandler::new(self.config.id);
        let mut clock = NodeClock::new();
        let mut buf = [0u8; rosc::decoder::MTU];

        info!(addr = %handler.address(), "Serving");
        while !stop.is_stop_requested() && !outbox.is_closed() {
            let size = match socket.recv_from(&mut buf) {
                Ok((size, _peer)) => size,
                Err(e) if matches!(e.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut) => continue,
                Err(e) => return Err(e.into()),
            };

            let packet = match rosc::decoder::decode_udp(&buf[..size]) {
                Ok((_, packet)) => packet,
                Err(e) => {
                    warn!(error = ?e, size, "undecodable OSC datagram");
                    continue;
                }
            };

            for batch in handler.on_packet(&packet) {
                // A full queue drops this frame but never stalls the socket
                outbox.emit_data(batch);
                clock.tick();
            }
        }

        info!(ticks = clock.ticks(), rate_hz = clock.rate_hz(), rejected = handler.rejected(), "RIoT server stopped");
        Ok(clock)
    }
}

impl Producer for Riot {
    fn descriptor(&self) -> &'static NodeDescriptor {
        &DESCRIPTOR
    }

    fn name(&self) -> &str {
        &self.config.name
    }

    fn settings(&self) -> serde_json::Value {
        serde_json::json!({
            "name": self.config.name,
            "id": self.config.id,
            "listen_ip": self.config.listen_ip,
            "listen_port": self.config.listen_port,
        })
    }

    fn run_blocking(&mut self, mut outbox: Outbox, stop: StopFlag) -> PluxResult<()> {
        info!(node = %self.config.name, bind = %self.config.bind_address(), "Starting server");
        outbox.emit_channels(&Self::channel_names());

        let socket = UdpSocket::bind(self.config.bind_address())?;
        self.serve(&socket, &mut outbox, &stop)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use plux_core::{Payload, PortKind};
    use proptest::prelude::*;
    use rosc::{OscBundle, OscTime};

    fn raw_message(id: u32, values: &[f32]) -> OscMessage {
        OscMessage {
            addr: format!("/{}/raw", id),
            args: values.iter().map(|v| OscType::Float(*v)).collect(),
        }
    }

    #[test]
    fn test_factor_table() {
        let factors = riot_factors();
        assert_eq!(factors.len(), RIOT_CHANNELS.len());
        assert_eq!(factors[0], 0.25);
        assert_eq!(factors[3], 1.0);
        assert_eq!(factors[9], 2.0);
        assert_eq!(factors[12], 2.0 / 4095.0);
        assert_eq!(factors[21], 2.0 / 180.0);
    }

    #[test]
    fn test_scaled_single_sample() {
        let mut handler = RiotFrameHandler::new(3);
        let batch = handler.on_message(&raw_message(3, &[4.0, -8.0, 1.0])).unwrap();

        assert_eq!(batch.shape(), (1, 1, 3));
        assert_eq!(batch.sample(0, 0), Some(1.0));
        assert_eq!(batch.sample(0, 1), Some(-2.0));
        assert_eq!(batch.sample(0, 2), Some(0.25));
    }

    #[test]
    fn test_other_device_ignored() {
        let mut handler = RiotFrameHandler::new(0);
        assert!(handler.on_message(&raw_message(1, &[1.0])).is_none());
        assert_eq!(handler.rejected(), 0);
    }

    #[test]
    fn test_oversized_and_non_numeric_rejected() {
        let mut handler = RiotFrameHandler::new(0);
        assert!(handler.on_message(&raw_message(0, &[1.0; 23])).is_none());

        let text = OscMessage {
            addr: "/0/raw".to_string(),
            args: vec![OscType::Float(1.0), OscType::String("x".to_string())],
        };
        assert!(handler.on_message(&text).is_none());
        assert_eq!(handler.rejected(), 2);
    }

    #[test]
    fn test_mixed_numeric_types() {
        let mut handler = RiotFrameHandler::new(0);
        let message = OscMessage {
            addr: "/0/raw".to_string(),
            args: vec![OscType::Int(8), OscType::Long(-8), OscType::Double(2.0)],
        };
        let batch = handler.on_message(&message).unwrap();
        assert_eq!(batch.sample(0, 0), Some(2.0));
        assert_eq!(batch.sample(0, 1), Some(-2.0));
        assert_eq!(batch.sample(0, 2), Some(0.5));
    }

    #[test]
    fn test_bundle_flattened() {
        let mut handler = RiotFrameHandler::new(0);
        let bundle = OscPacket::Bundle(OscBundle {
            timetag: OscTime { seconds: 0, fractional: 1 },
            content: vec![
                OscPacket::Message(raw_message(0, &[1.0])),
                OscPacket::Message(raw_message(5, &[1.0])),
                OscPacket::Message(raw_message(0, &[2.0])),
            ],
        });
        assert_eq!(handler.on_packet(&bundle).len(), 2);
    }

    #[test]
    fn test_udp_round_trip_until_stop() {
        let receiver_socket = UdpSocket::bind("127.0.0.1:0").unwrap();
        let target = receiver_socket.local_addr().unwrap();
        let node = Riot::new(RiotConfig {
            id: 7,
            listen_ip: "127.0.0.1".to_string(),
            listen_port: target.port(),
            read_timeout_ms: 20,
            ..RiotConfig::default()
        })
        .unwrap();

        let (mut outbox, mut receiver) = Outbox::channel(node.name(), 64);
        let stop = StopFlag::new();
        let server_stop = stop.clone();
        let server = std::thread::spawn(move || {
            let clock = node.serve(&receiver_socket, &mut outbox, &server_stop);
            clock.map(|clock| clock.ticks())
        });

        let sender = UdpSocket::bind("127.0.0.1:0").unwrap();
        for id in [7u32, 8, 7] {
            let packet = OscPacket::Message(raw_message(id, &[8.0; 22]));
            let bytes = rosc::encoder::encode(&packet).unwrap();
            sender.send_to(&bytes, target).unwrap();
        }

        let mut batches = Vec::new();
        let deadline = std::time::Instant::now() + Duration::from_secs(5);
        while batches.len() < 2 && std::time::Instant::now() < deadline {
            match receiver.try_recv() {
                Ok(message) => {
                    assert_eq!(message.port(), PortKind::Data);
                    assert!(message.tick);
                    batches.push(message.payload);
                }
                Err(_) => std::thread::sleep(Duration::from_millis(5)),
            }
        }

        stop.request_stop();
        let ticks = server.join().unwrap().unwrap();
        assert_eq!(ticks, 2);
        assert_eq!(batches.len(), 2);
        match &batches[0] {
            Payload::Data(batch) => {
                assert_eq!(batch.shape(), (1, 1, 22));
                assert_eq!(batch.sample(0, 0), Some(2.0));
                assert_eq!(batch.sample(0, 12), Some(16.0 / 4095.0));
            }
            other => panic!("expected data, got {:?}", other),
        }
    }

    #[test]
    fn test_channel_names_emitted_before_serving() {
        let mut node = Riot::new(RiotConfig {
            listen_ip: "127.0.0.1".to_string(),
            listen_port: 0,
            read_timeout_ms: 10,
            ..RiotConfig::default()
        })
        .unwrap();
        let (outbox, mut receiver) = Outbox::channel(node.name(), 8);
        let stop = StopFlag::new();
        stop.request_stop();

        node.run_blocking(outbox, stop).unwrap();
        let message = receiver.try_recv().unwrap();
        assert_eq!(message.payload, Payload::Channels(Riot::channel_names()));
    }

    proptest! {
        #[test]
        fn prop_scaling_is_elementwise(values in proptest::collection::vec(-1.0e4f64..1.0e4, 0..=22)) {
            let handler = RiotFrameHandler::new(0);
            let factors = riot_factors();
            let scaled = handler.scale(&values).unwrap();
            prop_assert_eq!(scaled.len(), values.len());
            for (i, value) in values.iter().enumerate() {
                prop_assert_eq!(scaled[i], value * factors[i]);
            }
        }
    }
}
