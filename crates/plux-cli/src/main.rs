//! plux-nodes: command line host for plux source nodes

mod cli;
mod commands;

use anyhow::Result;
use clap::Parser;
use cli::{Cli, Command};
use plux_processing::NodeRegistry;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_level = match cli.verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let registry = NodeRegistry::default();
    match &cli.command {
        Command::List => {
            commands::list(&registry);
            Ok(())
        }
        Command::Example(args) => commands::example(args),
        Command::Validate(args) => commands::validate(args),
        Command::Run(args) => commands::run(args, &registry).await,
    }
}
