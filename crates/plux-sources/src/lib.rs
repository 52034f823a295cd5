//! Plux-Sources: Data source nodes for plux devices
//!
//! Biosignalsplux hub, MuscleBAN and RIoT producers, the device abstraction
//! they acquire through, and a simulated device for running without hardware.
//! With the `plux-sdk` feature, hardware addresses are opened through the
//! vendor SDK loaded at runtime.

pub mod biosignalsplux;
pub mod device;
pub mod muscleban;
#[cfg(feature = "plux-sdk")]
pub mod plux_sdk;
pub mod riot;
pub mod session;
pub mod simulated;

pub use biosignalsplux::{BiosignalsPlux, BiosignalsPluxConfig};
pub use device::{
    AcquisitionConfig, ChannelSource, DeviceConnector, DeviceHandle, DeviceQuery, FrameSink,
    PrefixRouter, UnboundConnector,
};
pub use muscleban::{MuscleBan, MuscleBanConfig};
#[cfg(feature = "plux-sdk")]
pub use plux_sdk::{PluxSdkConnector, SDK_LIB_ENV};
pub use riot::{Riot, RiotConfig, RiotFrameHandler};
pub use session::{run_plux_session, PluxFrameSession, SessionPlan, SessionStats};
pub use simulated::{SimulatedConnector, SimulatedDeviceConfig, SIMULATED_PREFIX};
