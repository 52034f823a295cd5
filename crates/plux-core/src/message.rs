//! Ports, pipeline messages and the non-blocking outbox

use crate::batch::Batch;
use serde::{Deserialize, Serialize};
use std::fmt;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tracing::{trace, warn};

/// Kinds of values a port carries
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PortKind {
    /// 3-D numeric batches
    Data,
    /// Ordered list of channel names
    ChannelNames,
    /// Free-text lifecycle messages
    Status,
    /// Battery level in percent
    Battery,
}

impl PortKind {
    /// Key used when connecting ports in a pipeline graph
    pub fn key(&self) -> &'static str {
        match self {
            PortKind::Data => "data",
            PortKind::ChannelNames => "channels",
            PortKind::Status => "status",
            PortKind::Battery => "battery",
        }
    }
}

impl fmt::Display for PortKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

/// Named port declared by a node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Port {
    pub kind: PortKind,
    /// Human readable label
    pub label: &'static str,
}

impl Port {
    pub const DATA: Port = Port { kind: PortKind::Data, label: "Data" };
    pub const CHANNEL_NAMES: Port = Port { kind: PortKind::ChannelNames, label: "Channel Names" };
    pub const STATUS: Port = Port { kind: PortKind::Status, label: "Status" };
    pub const BATTERY: Port = Port { kind: PortKind::Battery, label: "Battery" };

    pub fn key(&self) -> &'static str {
        self.kind.key()
    }
}

/// Value carried by a message
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    Data(Batch),
    Channels(Vec<String>),
    Status(String),
    Battery(u8),
}

impl Payload {
    /// Port this payload is emitted on
    pub fn port(&self) -> PortKind {
        match self {
            Payload::Data(_) => PortKind::Data,
            Payload::Channels(_) => PortKind::ChannelNames,
            Payload::Status(_) => PortKind::Status,
            Payload::Battery(_) => PortKind::Battery,
        }
    }
}

/// One emission from a node into the pipeline queue
#[derive(Debug, Clone, PartialEq)]
pub struct NodeMessage {
    /// Name of the emitting node
    pub node: String,
    pub payload: Payload,
    /// Marks the end of a process cycle for downstream clocks
    pub tick: bool,
}

impl NodeMessage {
    pub fn port(&self) -> PortKind {
        self.payload.port()
    }
}

/// Result of a non-blocking emit
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmitOutcome {
    Delivered,
    /// Queue at capacity, message dropped
    QueueFull,
    /// Receiving side is gone
    Closed,
}

impl EmitOutcome {
    pub fn is_delivered(&self) -> bool {
        matches!(self, EmitOutcome::Delivered)
    }
}

/// Counters kept by an outbox
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct OutboxStats {
    pub delivered: u64,
    pub dropped: u64,
}

/// Sending half of a node's message queue
///
/// Emission never blocks: backpressure is the pipeline's business, the
/// producer only learns whether the message made it in.
#[derive(Debug)]
pub struct Outbox {
    node: String,
    sender: mpsc::Sender<NodeMessage>,
    stats: OutboxStats,
    closed: bool,
}

impl Outbox {
    pub fn new(node: impl Into<String>, sender: mpsc::Sender<NodeMessage>) -> Self {
        Self {
            node: node.into(),
            sender,
            stats: OutboxStats::default(),
            closed: false,
        }
    }

    /// Create an outbox together with its bounded receiving queue
    pub fn channel(
        node: impl Into<String>,
        capacity: usize,
    ) -> (Self, mpsc::Receiver<NodeMessage>) {
        let (sender, receiver) = mpsc::channel(capacity.max(1));
        (Self::new(node, sender), receiver)
    }

    /// Enqueue a payload without blocking
    pub fn emit(&mut self, payload: Payload, tick: bool) -> EmitOutcome {
        let port = payload.port();
        let message = NodeMessage {
            node: self.node.clone(),
            payload,
            tick,
        };

        match self.sender.try_send(message) {
            Ok(()) => {
                self.stats.delivered += 1;
                trace!(node = %self.node, %port, "message queued");
                EmitOutcome::Delivered
            }
            Err(TrySendError::Full(_)) => {
                self.stats.dropped += 1;
                warn!(node = %self.node, %port, dropped = self.stats.dropped, "pipeline queue full, message dropped");
                EmitOutcome::QueueFull
            }
            Err(TrySendError::Closed(_)) => {
                if !self.closed {
                    warn!(node = %self.node, %port, "pipeline queue closed");
                }
                self.closed = true;
                self.stats.dropped += 1;
                EmitOutcome::Closed
            }
        }
    }

    pub fn emit_data(&mut self, batch: Batch) -> EmitOutcome {
        self.emit(Payload::Data(batch), true)
    }

    pub fn emit_channels(&mut self, names: &[String]) -> EmitOutcome {
        self.emit(Payload::Channels(names.to_vec()), false)
    }

    pub fn emit_status(&mut self, status: impl Into<String>) -> EmitOutcome {
        self.emit(Payload::Status(status.into()), false)
    }

    pub fn emit_battery(&mut self, level: u8) -> EmitOutcome {
        self.emit(Payload::Battery(level), false)
    }

    /// True once an emit observed the receiver being dropped
    pub fn is_closed(&self) -> bool {
        self.closed || self.sender.is_closed()
    }

    pub fn stats(&self) -> OutboxStats {
        self.stats
    }

    pub fn node(&self) -> &str {
        &self.node
    }
}
