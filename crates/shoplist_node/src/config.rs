//! Configuration for a replica node.

use crate::error::{NodeError, NodeResult};
use shoplist_protocol::NodeInfo;
use std::path::PathBuf;
use std::time::Duration;

/// Configuration for one replica.
///
/// Ports set to `0` bind an ephemeral port; the ports actually bound are the
/// ones advertised to peers.
#[derive(Debug, Clone)]
pub struct NodeConfig {
    /// Unique replica id, also used as CRDT origin.
    pub node_id: String,
    /// Host to bind and advertise.
    pub host: String,
    /// Shard this replica owns.
    pub shard_id: u32,
    /// Fixed shard count of the cluster.
    pub num_shards: u32,
    /// Request/reply port for clients.
    pub client_port: u16,
    /// Pull port for shard anti-entropy gossip.
    pub gossip_pull_port: u16,
    /// Pull port for membership gossip.
    pub discovery_pull_port: u16,
    /// Data file. `None` keeps lists in memory.
    pub db_path: Option<PathBuf>,
    /// Mean interval between shard gossip rounds.
    pub gossip_interval: Duration,
    /// Mean interval between discovery rounds.
    pub discovery_interval: Duration,
    /// Silence after which a peer is evicted.
    pub discovery_timeout: Duration,
    /// Upper bound on how long the loop waits before checking its stop flag.
    pub poll_interval: Duration,
    /// Snapshot pushes after each client write.
    pub eager_fanout_rounds: u32,
    /// Frames buffered per outbound peer link before new ones are dropped.
    pub push_queue_capacity: usize,
    /// Pause before re-dialling a peer whose connection broke.
    pub reconnect_delay: Duration,
    /// Peers known at startup.
    pub initial_peers: Vec<NodeInfo>,
}

impl NodeConfig {
    /// Creates a configuration for `node_id` owning `shard_id` of `num_shards`.
    pub fn new(node_id: impl Into<String>, shard_id: u32, num_shards: u32) -> Self {
        Self {
            node_id: node_id.into(),
            host: "127.0.0.1".to_string(),
            shard_id,
            num_shards,
            client_port: 0,
            gossip_pull_port: 0,
            discovery_pull_port: 0,
            db_path: None,
            gossip_interval: Duration::from_millis(500),
            discovery_interval: Duration::from_secs(1),
            discovery_timeout: Duration::from_secs(10),
            poll_interval: Duration::from_millis(100),
            eager_fanout_rounds: 3,
            push_queue_capacity: 64,
            reconnect_delay: Duration::from_millis(200),
            initial_peers: Vec::new(),
        }
    }

    /// Sets the host to bind and advertise.
    pub fn with_host(mut self, host: impl Into<String>) -> Self {
        self.host = host.into();
        self
    }

    /// Sets the client, shard gossip and discovery ports.
    pub fn with_ports(mut self, client: u16, gossip_pull: u16, discovery_pull: u16) -> Self {
        self.client_port = client;
        self.gossip_pull_port = gossip_pull;
        self.discovery_pull_port = discovery_pull;
        self
    }

    /// Persists lists to `path`.
    pub fn with_db_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.db_path = Some(path.into());
        self
    }

    /// Sets the shard gossip interval.
    pub fn with_gossip_interval(mut self, interval: Duration) -> Self {
        self.gossip_interval = interval;
        self
    }

    /// Sets the discovery interval.
    pub fn with_discovery_interval(mut self, interval: Duration) -> Self {
        self.discovery_interval = interval;
        self
    }

    /// Sets the eviction timeout.
    pub fn with_discovery_timeout(mut self, timeout: Duration) -> Self {
        self.discovery_timeout = timeout;
        self
    }

    /// Sets the stop-flag poll interval.
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Sets the number of eager pushes after a client write.
    pub fn with_eager_fanout_rounds(mut self, rounds: u32) -> Self {
        self.eager_fanout_rounds = rounds;
        self
    }

    /// Sets the per-peer outbound queue capacity.
    pub fn with_push_queue_capacity(mut self, capacity: usize) -> Self {
        self.push_queue_capacity = capacity;
        self
    }

    /// Sets the reconnect delay for broken peer links.
    pub fn with_reconnect_delay(mut self, delay: Duration) -> Self {
        self.reconnect_delay = delay;
        self
    }

    /// Adds a peer known at startup.
    pub fn with_peer(mut self, peer: NodeInfo) -> Self {
        self.initial_peers.push(peer);
        self
    }

    /// Replaces the peers known at startup.
    pub fn with_peers(mut self, peers: Vec<NodeInfo>) -> Self {
        self.initial_peers = peers;
        self
    }

    /// Checks the configuration for values the node cannot run with.
    ///
    /// # Errors
    ///
    /// [`NodeError::InvalidConfig`] describing the first problem found.
    pub fn validate(&self) -> NodeResult<()> {
        if self.node_id.is_empty() {
            return Err(NodeError::invalid_config("node_id must not be empty"));
        }
        if self.host.is_empty() {
            return Err(NodeError::invalid_config("host must not be empty"));
        }
        if self.num_shards == 0 {
            return Err(NodeError::invalid_config("num_shards must be at least 1"));
        }
        if self.shard_id >= self.num_shards {
            return Err(NodeError::invalid_config(format!(
                "shard_id {} out of range for {} shards",
                self.shard_id, self.num_shards
            )));
        }

        let ports = [
            self.client_port,
            self.gossip_pull_port,
            self.discovery_pull_port,
        ];
        for (i, a) in ports.iter().enumerate() {
            if *a != 0 && ports[i + 1..].contains(a) {
                return Err(NodeError::invalid_config(format!(
                    "port {a} is assigned to more than one endpoint"
                )));
            }
        }

        for (name, value) in [
            ("gossip_interval", self.gossip_interval),
            ("discovery_interval", self.discovery_interval),
            ("poll_interval", self.poll_interval),
        ] {
            if value.is_zero() {
                return Err(NodeError::invalid_config(format!("{name} must be non-zero")));
            }
        }
        if self.discovery_timeout <= self.discovery_interval {
            return Err(NodeError::invalid_config(
                "discovery_timeout must exceed discovery_interval",
            ));
        }
        if self.push_queue_capacity == 0 {
            return Err(NodeError::invalid_config(
                "push_queue_capacity must be at least 1",
            ));
        }
        Ok(())
    }
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self::new("node-0", 0, 1)
    }
}
