//! Plux-Core: Foundation types for biosignal source nodes
//!
//! Frames, sequence tracking, buffering and the port/queue types shared by
//! every node in the workspace.

pub mod batch;
pub mod clock;
pub mod error;
pub mod frame;
pub mod message;
pub mod node;

pub use batch::*;
pub use clock::*;
pub use error::{PluxError, PluxResult};
pub use frame::*;
pub use message::*;
pub use node::*;
