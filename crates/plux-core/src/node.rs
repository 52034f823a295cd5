//! Node traits and the cooperative stop flag

use crate::batch::Batch;
use crate::error::PluxResult;
use crate::message::{Outbox, Port};
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use uuid::Uuid;

/// Identifier attached to one streaming session's log span
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SessionId(Uuid);

impl SessionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Cancellation token shared between a node thread and its owner
#[derive(Debug, Clone, Default)]
pub struct StopFlag {
    inner: Arc<AtomicBool>,
}

impl StopFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn request_stop(&self) {
        self.inner.store(true, Ordering::SeqCst);
    }

    pub fn is_stop_requested(&self) -> bool {
        self.inner.load(Ordering::SeqCst)
    }
}

/// Node categories used for grouping in pipeline editors
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum NodeCategory {
    #[serde(rename = "Data Source")]
    DataSource,
    Transform,
}

impl NodeCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            NodeCategory::DataSource => "Data Source",
            NodeCategory::Transform => "Transform",
        }
    }
}

/// Static description of a node: its entry-point name and ports
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NodeDescriptor {
    /// Entry-point name the node is registered under
    pub name: &'static str,
    pub category: NodeCategory,
    pub description: &'static str,
    pub ports_in: &'static [Port],
    pub ports_out: &'static [Port],
}

impl NodeDescriptor {
    /// Look up an output port by key
    pub fn output(&self, key: &str) -> Option<&Port> {
        self.ports_out.iter().find(|port| port.key() == key)
    }

    pub fn is_source(&self) -> bool {
        self.ports_in.is_empty()
    }
}

/// A node that produces messages from an external source
///
/// `run_blocking` owns the calling thread until the source ends or the
/// stop flag is observed.
pub trait Producer: Send {
    fn descriptor(&self) -> &'static NodeDescriptor;

    /// Instance name used on emitted messages and in logs
    fn name(&self) -> &str;

    /// Current settings, as they would be written to a pipeline file
    fn settings(&self) -> serde_json::Value;

    fn run_blocking(&mut self, outbox: Outbox, stop: StopFlag) -> PluxResult<()>;
}

/// A node that maps input data to output data
pub trait Transform: Send {
    fn descriptor(&self) -> &'static NodeDescriptor;

    fn name(&self) -> &str;

    /// Whether the inputs present are enough to run `process`
    fn should_process(&self, data: Option<&Batch>) -> bool {
        data.is_some()
    }

    fn process(&mut self, data: &Batch) -> PluxResult<Batch>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stop_flag_shared_between_clones() {
        let flag = StopFlag::new();
        let observer = flag.clone();
        assert!(!observer.is_stop_requested());

        flag.request_stop();
        assert!(observer.is_stop_requested());
    }

    #[test]
    fn test_stop_flag_across_threads() {
        let flag = StopFlag::new();
        let remote = flag.clone();
        std::thread::spawn(move || remote.request_stop())
            .join()
            .unwrap();
        assert!(flag.is_stop_requested());
    }

    #[test]
    fn test_descriptor_lookup() {
        static PORTS: [Port; 2] = [Port::DATA, Port::STATUS];
        let descriptor = NodeDescriptor {
            name: "test",
            category: NodeCategory::DataSource,
            description: "",
            ports_in: &[],
            ports_out: &PORTS,
        };

        assert!(descriptor.is_source());
        assert_eq!(descriptor.output("status"), Some(&Port::STATUS));
        assert!(descriptor.output("battery").is_none());
        assert_eq!(descriptor.category.as_str(), "Data Source");
    }
}
