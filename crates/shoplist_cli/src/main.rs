//! Shoplist CLI
//!
//! Runs replicas and edits shopping lists from the command line.
//!
//! # Commands
//!
//! - `node` - Run one replica until Ctrl-C
//! - `cluster` - Run a local cluster in this process and manage it from a prompt
//! - `nodes` - Print the membership view of a replica
//! - `list` - Create, fetch or delete a list
//! - `item` - Add, update or remove items

mod commands;
mod view;

use clap::{Parser, Subcommand};
use commands::{item::ItemCommand, list::ListCommand, node::NodeArgs, ConnectArgs};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// Shoplist command-line tools.
#[derive(Parser)]
#[command(name = "shoplist")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(global = true, short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run one replica until Ctrl-C
    Node(NodeArgs),

    /// Run a local cluster in this process, managed from a prompt
    Cluster {
        /// Number of shards
        #[arg(long, default_value_t = 2)]
        shards: u32,

        /// Replicas per shard
        #[arg(long, default_value_t = 3)]
        replicas: u32,

        /// Host to bind and advertise
        #[arg(long, default_value = "127.0.0.1")]
        host: String,

        /// First port to use; each node takes three consecutive ports.
        /// Ephemeral ports if omitted
        #[arg(long)]
        base_port: Option<u16>,

        /// Directory for data files; in-memory stores if omitted
        #[arg(long)]
        data_dir: Option<PathBuf>,
    },

    /// Print the membership view of a replica
    Nodes {
        /// Client endpoint of the replica (host:port)
        #[arg(short, long)]
        endpoint: String,

        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Create, fetch or delete a list
    List {
        #[command(flatten)]
        connect: ConnectArgs,

        #[command(subcommand)]
        action: ListCommand,
    },

    /// Add, update or remove items
    Item {
        #[command(flatten)]
        connect: ConnectArgs,

        #[command(subcommand)]
        action: ItemCommand,
    },

    /// Show version information
    Version,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let level = if cli.verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Node(args) => commands::node::run(&args)?,
        Commands::Cluster {
            shards,
            replicas,
            host,
            base_port,
            data_dir,
        } => commands::cluster::run(shards, replicas, &host, base_port, data_dir.as_deref())?,
        Commands::Nodes { endpoint, format } => commands::nodes::run(&endpoint, &format)?,
        Commands::List { connect, action } => commands::list::run(&connect, action)?,
        Commands::Item { connect, action } => commands::item::run(&connect, action)?,
        Commands::Version => {
            println!("Shoplist CLI v{}", env!("CARGO_PKG_VERSION"));
        }
    }

    Ok(())
}
