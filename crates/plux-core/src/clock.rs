//! Emission clock and wall-clock timestamps
//!
//! Every data emission advances a node's clock so downstream consumers can
//! derive emission rates and latencies.

use core::fmt;
use serde::Serialize;
use std::time::{Instant, SystemTime, UNIX_EPOCH};

/// Wall-clock timestamp with nanosecond resolution
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[repr(transparent)]
pub struct PrecisionTimestamp {
    /// Nanoseconds since Unix epoch
    nanos: u64,
}

impl PrecisionTimestamp {
    #[inline]
    pub const fn from_nanos(nanos: u64) -> Self {
        Self { nanos }
    }

    #[inline]
    pub const fn from_millis(millis: u64) -> Self {
        Self {
            nanos: millis * 1_000_000,
        }
    }

    /// Current system time; clamps to zero if the clock is before the epoch
    pub fn now() -> Self {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| Self::from_nanos(d.as_nanos() as u64))
            .unwrap_or(Self::from_nanos(0))
    }

    #[inline]
    pub const fn as_nanos(&self) -> u64 {
        self.nanos
    }

    #[inline]
    pub const fn as_millis(&self) -> u64 {
        self.nanos / 1_000_000
    }

    #[inline]
    pub fn as_secs_f64(&self) -> f64 {
        self.nanos as f64 / 1_000_000_000.0
    }
}

impl fmt::Display for PrecisionTimestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let secs = self.nanos / 1_000_000_000;
        let subsec_nanos = self.nanos % 1_000_000_000;
        write!(f, "{}.{:09}", secs, subsec_nanos)
    }
}

/// Per-node tick counter
#[derive(Debug, Clone)]
pub struct NodeClock {
    ticks: u64,
    started: Instant,
    last_tick: Option<PrecisionTimestamp>,
}

impl NodeClock {
    pub fn new() -> Self {
        Self {
            ticks: 0,
            started: Instant::now(),
            last_tick: None,
        }
    }

    /// Advance the clock by one emission; returns the new tick count
    pub fn tick(&mut self) -> u64 {
        self.ticks += 1;
        self.last_tick = Some(PrecisionTimestamp::now());
        self.ticks
    }

    pub fn ticks(&self) -> u64 {
        self.ticks
    }

    pub fn last_tick(&self) -> Option<PrecisionTimestamp> {
        self.last_tick
    }

    /// Average ticks per second since the clock was created
    pub fn rate_hz(&self) -> f64 {
        let elapsed = self.started.elapsed().as_secs_f64();
        if elapsed > 0.0 {
            self.ticks as f64 / elapsed
        } else {
            0.0
        }
    }
}

impl Default for NodeClock {
    fn default() -> Self {
        Self::new()
    }
}
