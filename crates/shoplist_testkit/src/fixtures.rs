//! Test fixtures: stores, node configs and local clusters.

use shoplist_client::{ApiConfig, RetryConfig, ShoppingApi, TcpReplicaTransport};
use shoplist_node::{Node, NodeConfig, NodeResult};
use shoplist_storage::ListStore;
use std::path::PathBuf;
use std::thread;
use std::time::{Duration, Instant};
use tempfile::TempDir;

/// A file-backed list store with automatic cleanup.
pub struct TestStore {
    /// The store.
    pub store: ListStore,
    /// The temporary directory (kept alive to prevent cleanup).
    dir: TempDir,
}

impl TestStore {
    /// Creates a store in a fresh temporary directory.
    pub fn file() -> Self {
        let dir = TempDir::new().expect("Failed to create temp directory");
        let store = ListStore::open(&dir.path().join("lists.log")).expect("Failed to open store");
        Self { store, dir }
    }

    /// Path of the data file.
    pub fn path(&self) -> PathBuf {
        self.dir.path().join("lists.log")
    }
}

impl std::ops::Deref for TestStore {
    type Target = ListStore;

    fn deref(&self) -> &Self::Target {
        &self.store
    }
}

impl std::ops::DerefMut for TestStore {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.store
    }
}

/// Node configuration with short intervals, suited to tests.
pub fn fast_config(node_id: &str, shard_id: u32, num_shards: u32) -> NodeConfig {
    NodeConfig::new(node_id, shard_id, num_shards)
        .with_gossip_interval(Duration::from_millis(50))
        .with_discovery_interval(Duration::from_millis(50))
        .with_discovery_timeout(Duration::from_millis(1_000))
        .with_poll_interval(Duration::from_millis(20))
        .with_reconnect_delay(Duration::from_millis(20))
}

/// Polls `check` every 20ms until it returns true or `timeout` elapses.
///
/// Returns the last result of `check`.
pub fn wait_until<F>(timeout: Duration, mut check: F) -> bool
where
    F: FnMut() -> bool,
{
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if check() {
            return true;
        }
        thread::sleep(Duration::from_millis(20));
    }
    check()
}

/// Running nodes on loopback with ephemeral ports.
///
/// Node `s{shard}r{replica}` owns `shard`. Every node is seeded with the
/// first node, so membership spreads through discovery.
pub struct TestCluster {
    nodes: Vec<Node>,
    num_shards: u32,
}

impl TestCluster {
    /// Starts `num_shards * replicas` nodes with in-memory stores.
    pub fn start(num_shards: u32, replicas: u32) -> NodeResult<Self> {
        Self::start_with(num_shards, replicas, |config| config)
    }

    /// Starts a cluster, passing every node config through `customize`.
    pub fn start_with<F>(num_shards: u32, replicas: u32, customize: F) -> NodeResult<Self>
    where
        F: Fn(NodeConfig) -> NodeConfig,
    {
        let mut nodes: Vec<Node> = Vec::new();
        for shard in 0..num_shards {
            for replica in 0..replicas {
                let mut config = fast_config(&format!("s{shard}r{replica}"), shard, num_shards);
                if let Some(seed) = nodes.first() {
                    config = config.with_peer(seed.info().clone());
                }
                let mut node = Node::new(customize(config))?;
                node.start()?;
                nodes.push(node);
            }
        }
        Ok(Self { nodes, num_shards })
    }

    /// All nodes, in start order.
    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    /// Mutable access to the nodes, e.g. to stop one.
    pub fn nodes_mut(&mut self) -> &mut [Node] {
        &mut self.nodes
    }

    /// Nodes owning `shard`.
    pub fn shard(&self, shard: u32) -> Vec<&Node> {
        self.nodes.iter().filter(|n| n.shard_id() == shard).collect()
    }

    /// Client endpoints of every node.
    pub fn endpoints(&self) -> Vec<String> {
        self.nodes.iter().map(Node::client_addr).collect()
    }

    /// Number of shards.
    pub fn num_shards(&self) -> u32 {
        self.num_shards
    }

    /// API config seeded with every node.
    pub fn api_config(&self) -> ApiConfig {
        ApiConfig::new(self.endpoints(), self.num_shards).with_retry(
            RetryConfig::new(5)
                .with_initial_delay(Duration::from_millis(50))
                .with_max_delay(Duration::from_millis(500)),
        )
    }

    /// API talking TCP to this cluster.
    pub fn api(&self) -> ShoppingApi<TcpReplicaTransport> {
        ShoppingApi::connect(self.api_config()).expect("Failed to create API")
    }

    /// Stops every node.
    pub fn stop(&mut self) {
        for node in &mut self.nodes {
            let _ = node.stop();
        }
    }
}

impl Drop for TestCluster {
    fn drop(&mut self) {
        self.stop();
    }
}
