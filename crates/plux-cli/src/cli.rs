use clap::{Args, Parser, Subcommand};
use plux_processing::DEFAULT_QUEUE_CAPACITY;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(
    name = "plux-nodes",
    version,
    about = "Run plux biosignal source nodes",
    long_about = "List, configure and run biosignalsplux, MuscleBAN and RIoT source nodes.\n\
                  Device addresses starting with 'sim:' use a simulated device."
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Increase verbosity (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// List registered nodes and their ports
    List,
    /// Print an example config for a node
    Example(ExampleArgs),
    /// Check a node config file
    Validate(ValidateArgs),
    /// Run a source node and log what it emits
    Run(RunArgs),
}

#[derive(Args, Debug)]
pub struct ExampleArgs {
    /// Entry-point name, e.g. in_muscleban
    pub node: String,
}

#[derive(Args, Debug)]
pub struct ValidateArgs {
    /// Node config (JSON)
    pub config: PathBuf,
}

#[derive(Args, Debug)]
pub struct RunArgs {
    /// Node config (JSON)
    pub config: PathBuf,

    /// Messages buffered before emissions are dropped
    #[arg(long, default_value_t = DEFAULT_QUEUE_CAPACITY)]
    pub queue_capacity: usize,

    /// Stop after this many messages
    #[arg(long)]
    pub max_messages: Option<usize>,
}
