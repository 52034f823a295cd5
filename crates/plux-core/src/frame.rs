//! Raw device frames, sequence tracking and batch buffering

use serde::{Deserialize, Serialize};

/// One sample across all active channels, as delivered by a device
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Frame {
    /// Monotonically increasing sequence number assigned by the device
    pub seq: u64,
    /// Raw sample values, one per channel
    pub data: Vec<i32>,
}

impl Frame {
    pub fn new(seq: u64, data: Vec<i32>) -> Self {
        Self { seq, data }
    }

    /// Number of channels in this frame
    pub fn channel_count(&self) -> usize {
        self.data.len()
    }
}

/// Outcome of checking a sequence number against the last one seen
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SequenceCheck {
    /// At most one past the last seen frame
    InOrder,
    /// Sequence jumped ahead of the last seen frame
    Dropped {
        /// Gap between the last seen and the received sequence number
        count: u64,
    },
    /// Sequence went backwards (device restarted its counter)
    Rewound {
        /// Last sequence number seen before the jump back
        last_seen: u64,
        /// Sequence number that arrived
        got: u64,
    },
}

/// Tracks device sequence numbers to detect dropped frames
///
/// Starts with `last_seen = 0`. A frame more than one past `last_seen`
/// reports a gap of `seq - last_seen`; every frame then becomes the new
/// `last_seen`, so a gap is reported once.
#[derive(Debug, Clone, Default)]
pub struct SequenceTracker {
    last_seen: u64,
    total_dropped: u64,
}

impl SequenceTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a sequence number and report whether frames were lost
    pub fn observe(&mut self, seq: u64) -> SequenceCheck {
        let check = if self.last_seen.saturating_add(1) < seq {
            let count = seq - self.last_seen;
            self.total_dropped += count;
            SequenceCheck::Dropped { count }
        } else if seq < self.last_seen {
            SequenceCheck::Rewound {
                last_seen: self.last_seen,
                got: seq,
            }
        } else {
            SequenceCheck::InOrder
        };

        self.last_seen = seq;
        check
    }

    pub fn last_seen(&self) -> u64 {
        self.last_seen
    }

    /// Sum of all reported gaps
    pub fn total_dropped(&self) -> u64 {
        self.total_dropped
    }
}

/// Ordered, bounded buffer of raw frames awaiting emission
#[derive(Debug, Clone)]
pub struct FrameBuffer {
    frames: Vec<Vec<i32>>,
    emit_at_once: usize,
}

impl FrameBuffer {
    /// Create a buffer that drains every `emit_at_once` frames (minimum 1)
    pub fn new(emit_at_once: usize) -> Self {
        let emit_at_once = emit_at_once.max(1);
        Self {
            frames: Vec::with_capacity(emit_at_once),
            emit_at_once,
        }
    }

    /// Append a frame; returns the full buffer contents once the batch size
    /// is reached, leaving the buffer empty
    pub fn push(&mut self, data: Vec<i32>) -> Option<Vec<Vec<i32>>> {
        self.frames.push(data);

        if self.frames.len() >= self.emit_at_once {
            let drained = std::mem::replace(
                &mut self.frames,
                Vec::with_capacity(self.emit_at_once),
            );
            Some(drained)
        } else {
            None
        }
    }

    /// Frames currently waiting for the batch to fill
    pub fn pending(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    pub fn emit_at_once(&self) -> usize {
        self.emit_at_once
    }

    /// Discard buffered frames without emitting them
    pub fn clear(&mut self) {
        self.frames.clear();
    }
}
