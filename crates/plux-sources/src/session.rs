//! Frame handling and session lifecycle shared by plux device nodes

use crate::device::{AcquisitionConfig, DeviceConnector, DeviceHandle, DeviceQuery, FrameSink};
use plux_core::{
    Batch, FrameBuffer, Outbox, OutboxStats, PluxResult, SequenceCheck, SequenceTracker,
    SessionId, StopFlag,
};
use serde::Serialize;
use tracing::{debug, error, info, info_span, warn};

/// Counters reported when a session ends
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SessionStats {
    pub frames: u64,
    pub batches: u64,
    pub dropped_frames: u64,
    /// Frames left in the buffer when the loop ended (never emitted)
    pub pending_frames: usize,
    pub outbox: OutboxStats,
}

/// Stateful per-frame handler for a plux device loop
///
/// Detects sequence gaps, buffers frames until `emit_at_once` are
/// collected, emits normalized batches and tells the loop whether to stop.
pub struct PluxFrameSession {
    tracker: SequenceTracker,
    buffer: FrameBuffer,
    outbox: Outbox,
    stop: StopFlag,
    battery_interval: Option<u64>,
    frames: u64,
    batches: u64,
}

impl PluxFrameSession {
    pub fn new(outbox: Outbox, stop: StopFlag, emit_at_once: usize) -> Self {
        Self {
            tracker: SequenceTracker::new(),
            buffer: FrameBuffer::new(emit_at_once),
            outbox,
            stop,
            battery_interval: None,
            frames: 0,
            batches: 0,
        }
    }

    /// Query and emit the battery level every `interval_frames` sequence numbers
    pub fn with_battery_poll(mut self, interval_frames: u64) -> Self {
        self.battery_interval = Some(interval_frames.max(1));
        self
    }

    pub fn outbox_mut(&mut self) -> &mut Outbox {
        &mut self.outbox
    }

    pub fn stats(&self) -> SessionStats {
        SessionStats {
            frames: self.frames,
            batches: self.batches,
            dropped_frames: self.tracker.total_dropped(),
            pending_frames: self.buffer.pending(),
            outbox: self.outbox.stats(),
        }
    }

    fn poll_battery(&mut self, seq: u64, device: &mut dyn DeviceQuery) {
        let Some(interval) = self.battery_interval else {
            return;
        };
        if seq % interval != 0 {
            return;
        }

        match device.battery() {
            Ok(level) => {
                let level = level.clamp(0.0, 100.0) as u8;
                debug!(seq, level, "battery level");
                self.outbox.emit_battery(level);
            }
            Err(e) => warn!(seq, error = %e, "battery query failed"),
        }
    }

    fn flush(&mut self, frames: Vec<Vec<i32>>) {
        match Batch::from_frames(&frames) {
            Ok(batch) => {
                self.batches += 1;
                self.outbox.emit_data(batch.normalized());
            }
            Err(e) => error!(error = %e, frames = frames.len(), "discarding malformed batch"),
        }
    }
}

impl FrameSink for PluxFrameSession {
    fn on_frame(&mut self, seq: u64, data: &[i32], device: &mut dyn DeviceQuery) -> bool {
        self.frames += 1;

        match self.tracker.observe(seq) {
            SequenceCheck::InOrder => {}
            SequenceCheck::Dropped { count } => {
                warn!(seq, dropped = count, "Dropped {} frames", count);
            }
            SequenceCheck::Rewound { last_seen, got } => {
                warn!(last_seen, got, "sequence number went backwards");
            }
        }

        self.poll_battery(seq, device);

        if let Some(frames) = self.buffer.push(data.to_vec()) {
            self.flush(frames);
        }

        self.stop.is_stop_requested() || self.outbox.is_closed()
    }
}

/// Everything needed to run one device session
#[derive(Debug, Clone)]
pub struct SessionPlan {
    /// Device kind used in status messages, e.g. "MuscleBan"
    pub kind: &'static str,
    pub address: String,
    pub channel_names: Vec<String>,
    pub acquisition: AcquisitionConfig,
    pub emit_at_once: usize,
    pub battery_interval_frames: Option<u64>,
    /// Emit the device property listing once acquisition started
    pub report_properties: bool,
}

/// Run a device session from connect to close
///
/// Connection failures are not retried: the error is reported on the
/// status port and returned.
pub fn run_plux_session(
    plan: &SessionPlan,
    connector: &dyn DeviceConnector,
    outbox: Outbox,
    stop: StopFlag,
) -> PluxResult<SessionStats> {
    let session_id = SessionId::new();
    let span = info_span!("plux_session", kind = plan.kind, adr = %plan.address, session = %session_id);
    let _enter = span.enter();

    let mut session = PluxFrameSession::new(outbox, stop, plan.emit_at_once);
    if let Some(interval) = plan.battery_interval_frames {
        session = session.with_battery_poll(interval);
    }

    info!("Connecting {}: {}", plan.kind, plan.address);
    session
        .outbox_mut()
        .emit_status(format!("Connecting {}: {}", plan.kind, plan.address));
    session.outbox_mut().emit_channels(&plan.channel_names);

    let mut device = match connector.open(&plan.address) {
        Ok(device) => device,
        Err(e) => {
            report_failure(&mut session, plan, &e.to_string());
            return Err(e);
        }
    };

    session
        .outbox_mut()
        .emit_status(format!("Connected {}: {}", plan.kind, plan.address));

    let acquired = acquire(device.as_mut(), plan, &mut session);
    let released = release(device.as_mut());

    let stats = session.stats();
    if stats.pending_frames > 0 {
        debug!(pending = stats.pending_frames, "partial buffer left unsent");
    }

    match acquired.and(released) {
        Ok(()) => {
            info!(
                frames = stats.frames,
                batches = stats.batches,
                dropped = stats.dropped_frames,
                "Stopped and closed {}: {}",
                plan.kind,
                plan.address
            );
            session.outbox_mut().emit_status(format!(
                "Stopped and closed {}: {}",
                plan.kind, plan.address
            ));
            Ok(stats)
        }
        Err(e) => {
            report_failure(&mut session, plan, &e.to_string());
            Err(e)
        }
    }
}

fn acquire(
    device: &mut dyn DeviceHandle,
    plan: &SessionPlan,
    session: &mut PluxFrameSession,
) -> PluxResult<()> {
    device.start(&plan.acquisition)?;

    if plan.report_properties {
        let properties = device.properties()?;
        info!(?properties, "device properties");

        let mut status = format!("Looping {}: {}\n", plan.kind, plan.address);
        for (key, value) in &properties {
            status.push_str(&format!("\n {}: {}", key, value));
        }
        session.outbox_mut().emit_status(status);
    }

    device.run_loop(session)
}

/// Stop and close, attempting both even if stopping fails
fn release(device: &mut dyn DeviceHandle) -> PluxResult<()> {
    let stopped = device.stop();
    if let Err(e) = &stopped {
        warn!(error = %e, "device stop failed");
    }
    let closed = device.close();
    stopped.and(closed)
}

fn report_failure(session: &mut PluxFrameSession, plan: &SessionPlan, reason: &str) {
    error!(error = reason, "{} session failed", plan.kind);
    session
        .outbox_mut()
        .emit_status(format!("Error {}: {}: {}", plan.kind, plan.address, reason));
}
