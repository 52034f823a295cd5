//! Background execution of producer nodes
//!
//! Producers block on their device loop or socket, so each one gets a
//! dedicated thread from tokio's blocking pool. Messages come back over a
//! bounded channel; stopping is cooperative through the node's [`StopFlag`].

use plux_core::{NodeMessage, Outbox, PluxError, PluxResult, Producer, StopFlag};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{error, info};

/// Default capacity of a node's message queue
pub const DEFAULT_QUEUE_CAPACITY: usize = 256;

/// Handle to a producer running in the background
pub struct RunningNode {
    /// Messages emitted by the node
    pub messages: mpsc::Receiver<NodeMessage>,
    /// Shared with the node; set it to end the run
    pub stop: StopFlag,
    pub handle: JoinHandle<PluxResult<()>>,
    name: String,
}

impl RunningNode {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Request stop and wait for the node thread to finish
    pub async fn shutdown(self) -> PluxResult<()> {
        info!(node = %self.name, "Stopping node");
        self.stop.request_stop();
        self.join().await
    }

    /// Wait for the node to end on its own
    ///
    /// Unread messages are dropped, which closes the queue and ends the
    /// producer at its next emission.
    pub async fn join(self) -> PluxResult<()> {
        let RunningNode {
            messages,
            handle,
            name,
            ..
        } = self;
        drop(messages);

        let result = handle.await.map_err(|e| PluxError::Task {
            reason: e.to_string(),
        })?;
        if let Err(e) = &result {
            error!(node = %name, error = %e, "node ended with error");
        }
        result
    }
}

/// Spawns producers onto the blocking pool
pub struct NodeRunner;

impl NodeRunner {
    /// Start `producer` with a fresh queue of `queue_capacity` messages
    pub fn spawn(mut producer: Box<dyn Producer>, queue_capacity: usize) -> RunningNode {
        let name = producer.name().to_string();
        let (outbox, messages) = Outbox::channel(name.clone(), queue_capacity.max(1));
        let stop = StopFlag::new();
        let node_stop = stop.clone();

        info!(node = %name, kind = producer.descriptor().name, settings = %producer.settings(), "Starting node");
        let handle = tokio::task::spawn_blocking(move || producer.run_blocking(outbox, node_stop));

        RunningNode {
            messages,
            stop,
            handle,
            name,
        }
    }
}
