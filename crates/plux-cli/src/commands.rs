use crate::cli::{ExampleArgs, RunArgs, ValidateArgs};
use anyhow::{bail, Context, Result};
use plux_core::{NodeMessage, Payload};
use plux_processing::{NodeConfig, NodeInstance, NodeRegistry, NodeRunner};
use plux_sources::{
    DeviceConnector, PrefixRouter, SimulatedConnector, SimulatedDeviceConfig, UnboundConnector,
    SIMULATED_PREFIX,
};
use std::path::Path;
use std::sync::Arc;
use tracing::{info, warn};

/// Connector used by the CLI: `sim:` addresses get a real-time simulated
/// device, everything else goes to [`hardware_connector`]
pub fn default_connector() -> Arc<dyn DeviceConnector> {
    let simulated = SimulatedConnector::new(SimulatedDeviceConfig {
        realtime: true,
        ..Default::default()
    });
    Arc::new(PrefixRouter::new(
        SIMULATED_PREFIX,
        Arc::new(simulated),
        hardware_connector(),
    ))
}

/// Vendor SDK named by `PLUX_SDK_LIB`, or the unbound connector if it cannot be loaded
#[cfg(feature = "plux-sdk")]
pub fn hardware_connector() -> Arc<dyn DeviceConnector> {
    match plux_sources::PluxSdkConnector::from_env() {
        Ok(connector) => Arc::new(connector),
        Err(e) => {
            warn!(error = %e, "plux SDK unavailable, hardware addresses will not open");
            Arc::new(UnboundConnector)
        }
    }
}

#[cfg(not(feature = "plux-sdk"))]
pub fn hardware_connector() -> Arc<dyn DeviceConnector> {
    Arc::new(UnboundConnector)
}

pub fn list(registry: &NodeRegistry) {
    println!("{}:", registry.group());
    for entry in registry.entries() {
        let descriptor = entry.descriptor;
        let ports = |ports: &[plux_core::Port]| {
            ports.iter().map(|p| p.key()).collect::<Vec<_>>().join(", ")
        };
        println!("  {} [{}]", entry.name, descriptor.category.as_str());
        println!("      {}", descriptor.description);
        if !descriptor.ports_in.is_empty() {
            println!("      in:  {}", ports(descriptor.ports_in));
        }
        println!("      out: {}", ports(descriptor.ports_out));
    }
}

pub fn example(args: &ExampleArgs) -> Result<()> {
    let config = NodeConfig::example(&args.node)?;
    println!("{}", config.to_json()?);
    Ok(())
}

pub fn load_config(path: &Path) -> Result<NodeConfig> {
    let json = std::fs::read_to_string(path)
        .with_context(|| format!("reading {}", path.display()))?;
    let config = NodeConfig::from_json(&json)
        .with_context(|| format!("parsing {}", path.display()))?;
    config
        .validate()
        .with_context(|| format!("invalid settings in {}", path.display()))?;
    Ok(config)
}

pub fn validate(args: &ValidateArgs) -> Result<()> {
    let config = load_config(&args.config)?;
    println!("{}: {} ({}) is valid", args.config.display(), config.node_name(), config.name());
    Ok(())
}

pub async fn run(args: &RunArgs, registry: &NodeRegistry) -> Result<()> {
    let config = load_config(&args.config)?;
    let producer = match registry.build(&config, default_connector())? {
        NodeInstance::Producer(producer) => producer,
        NodeInstance::Transform(transform) => bail!(
            "{} is a transform and needs an upstream node; run a source node instead",
            transform.descriptor().name
        ),
    };

    let mut running = NodeRunner::spawn(producer, args.queue_capacity);
    let mut received = 0usize;
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    loop {
        tokio::select! {
            signal = &mut ctrl_c => {
                if let Err(e) = signal {
                    warn!(error = %e, "failed to listen for Ctrl-C");
                }
                info!("Ctrl-C received");
                break;
            }
            message = running.messages.recv() => {
                let Some(message) = message else { break };
                log_message(&message);
                received += 1;
                if args.max_messages.is_some_and(|max| received >= max) {
                    info!(received, "message limit reached");
                    break;
                }
            }
        }
    }

    running.shutdown().await.context("node failed")?;
    info!(received, "done");
    Ok(())
}

fn log_message(message: &NodeMessage) {
    let port = message.port().key();
    match &message.payload {
        Payload::Data(batch) => {
            info!(node = %message.node, port, shape = ?batch.shape(), tick = message.tick, "{}", summarize(batch))
        }
        Payload::Channels(names) => info!(node = %message.node, port, channels = ?names),
        Payload::Status(status) => info!(node = %message.node, port, "{}", status),
        Payload::Battery(level) => info!(node = %message.node, port, level = *level),
    }
}

/// First sample of a batch, for log output
fn summarize(batch: &plux_core::Batch) -> String {
    let first: Vec<String> = (0..batch.channel_count())
        .filter_map(|ch| batch.sample(0, ch))
        .map(|v| format!("{:.4}", v))
        .collect();
    format!("[{}]", first.join(", "))
}
