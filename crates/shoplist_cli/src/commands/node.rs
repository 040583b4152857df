//! Node command implementation.

use super::{nodes, wait_for_ctrl_c, CliResult};
use clap::Args;
use shoplist_node::{Node, NodeConfig};
use std::path::PathBuf;
use std::time::Duration;
use tracing::{info, warn};

/// Settings for one replica.
#[derive(Debug, Args)]
pub struct NodeArgs {
    /// Unique node id
    #[arg(long)]
    pub id: String,

    /// Host to bind and advertise
    #[arg(long, default_value = "127.0.0.1")]
    pub host: String,

    /// Shard owned by this node
    #[arg(long, default_value_t = 0)]
    pub shard: u32,

    /// Number of shards in the cluster
    #[arg(long, default_value_t = 1)]
    pub shards: u32,

    /// Client request/reply port (0 = ephemeral)
    #[arg(long, default_value_t = 0)]
    pub client_port: u16,

    /// Shard gossip pull port (0 = ephemeral)
    #[arg(long, default_value_t = 0)]
    pub gossip_port: u16,

    /// Discovery pull port (0 = ephemeral)
    #[arg(long, default_value_t = 0)]
    pub discovery_port: u16,

    /// Data file; in-memory store if omitted
    #[arg(long)]
    pub db: Option<PathBuf>,

    /// Client endpoint of a running replica to join through (repeatable)
    #[arg(long)]
    pub join: Vec<String>,

    /// Shard gossip interval in milliseconds
    #[arg(long, default_value_t = 500)]
    pub gossip_interval_ms: u64,

    /// Discovery gossip interval in milliseconds
    #[arg(long, default_value_t = 1_000)]
    pub discovery_interval_ms: u64,

    /// Silence after which a peer is evicted, in milliseconds
    #[arg(long, default_value_t = 10_000)]
    pub discovery_timeout_ms: u64,
}

impl NodeArgs {
    /// Maps the flags onto a node configuration, without peers.
    pub fn to_config(&self) -> NodeConfig {
        let mut config = NodeConfig::new(self.id.as_str(), self.shard, self.shards)
            .with_host(self.host.as_str())
            .with_ports(self.client_port, self.gossip_port, self.discovery_port)
            .with_gossip_interval(Duration::from_millis(self.gossip_interval_ms))
            .with_discovery_interval(Duration::from_millis(self.discovery_interval_ms))
            .with_discovery_timeout(Duration::from_millis(self.discovery_timeout_ms));
        if let Some(db) = &self.db {
            config = config.with_db_path(db.clone());
        }
        config
    }
}

/// Runs the node command.
pub fn run(args: &NodeArgs) -> CliResult<()> {
    let mut config = args.to_config();

    for endpoint in &args.join {
        match nodes::fetch(endpoint) {
            Ok(peers) => {
                info!(%endpoint, peers = peers.len(), "fetched membership from seed");
                config.initial_peers.extend(peers);
            }
            Err(e) => warn!(%endpoint, error = %e, "seed unreachable"),
        }
    }
    if !args.join.is_empty() && config.initial_peers.is_empty() {
        return Err("none of the --join endpoints answered".into());
    }

    let mut node = Node::new(config)?;
    node.start()?;

    let me = node.info();
    println!(
        "Node {} (shard {}) serving clients on {}, gossip :{}, discovery :{}",
        me.node_id,
        me.shard_id,
        node.client_addr(),
        me.gossip_pull_port,
        me.discovery_pull_port
    );
    println!("Press Ctrl-C to stop");

    wait_for_ctrl_c()?;
    info!(node_id = %node.id(), "shutting down");
    node.stop()?;
    Ok(())
}
