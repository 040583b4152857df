//! Shard routing.

use crate::error::{ClientError, ClientResult};
use crate::transport::ReplicaTransport;
use parking_lot::RwLock;
use rand::seq::SliceRandom;
use shoplist_crdt::now_millis;
use shoplist_protocol::{shard_for, Message, NodeInfo, OpType};
use std::collections::BTreeMap;
use tracing::{debug, warn};

/// Maps list uids to the client endpoints of their shard's replicas.
///
/// The view is built from `GET_NODES` replies. It is refreshed on demand,
/// typically after a `WRONG_SHARD` reply or when every known replica of a
/// shard failed.
#[derive(Debug)]
pub struct ShardRouter {
    seeds: Vec<String>,
    num_shards: u32,
    origin: String,
    shards: RwLock<BTreeMap<u32, Vec<String>>>,
}

impl ShardRouter {
    /// Creates a router with an empty membership view.
    pub fn new(seeds: Vec<String>, num_shards: u32, origin: impl Into<String>) -> Self {
        Self {
            seeds,
            num_shards: num_shards.max(1),
            origin: origin.into(),
            shards: RwLock::new(BTreeMap::new()),
        }
    }

    /// Shard owning `uid`.
    pub fn shard_of(&self, uid: &str) -> u32 {
        shard_for(uid, self.num_shards)
    }

    /// Number of shards in the cluster.
    pub fn num_shards(&self) -> u32 {
        self.num_shards
    }

    /// Client endpoints of the replicas owning `uid`, in random order.
    ///
    /// # Errors
    ///
    /// [`ClientError::NoReplica`] if no replica of the shard is known.
    pub fn replicas_for(&self, uid: &str) -> ClientResult<Vec<String>> {
        let shard = self.shard_of(uid);
        let mut endpoints = self
            .shards
            .read()
            .get(&shard)
            .cloned()
            .unwrap_or_default();
        if endpoints.is_empty() {
            return Err(ClientError::NoReplica { shard });
        }
        endpoints.shuffle(&mut rand::thread_rng());
        Ok(endpoints)
    }

    /// Every known client endpoint, all shards included.
    pub fn endpoints(&self) -> Vec<String> {
        self.shards.read().values().flatten().cloned().collect()
    }

    /// Replaces the view with `nodes`.
    pub fn update(&self, nodes: &[NodeInfo]) {
        let mut shards: BTreeMap<u32, Vec<String>> = BTreeMap::new();
        for node in nodes {
            let endpoints = shards.entry(node.shard_id).or_default();
            let addr = node.client_addr();
            if !endpoints.contains(&addr) {
                endpoints.push(addr);
            }
        }
        *self.shards.write() = shards;
    }

    /// Asks known endpoints, then seeds, for membership and rebuilds the view
    /// from the first answer.
    ///
    /// Returns the number of replicas in the new view.
    ///
    /// # Errors
    ///
    /// [`ClientError::SeedsUnreachable`] if no endpoint answered.
    pub fn refresh(&self, transport: &dyn ReplicaTransport) -> ClientResult<usize> {
        let mut candidates = self.endpoints();
        candidates.shuffle(&mut rand::thread_rng());
        for seed in &self.seeds {
            if !candidates.contains(seed) {
                candidates.push(seed.clone());
            }
        }

        for endpoint in &candidates {
            match transport.request(endpoint, &Message::get_nodes(&self.origin, now_millis())) {
                Ok(reply) if reply.op == OpType::NodesResponse => {
                    self.update(&reply.nodes);
                    debug!(%endpoint, replicas = reply.nodes.len(), "membership refreshed");
                    return Ok(reply.nodes.len());
                }
                Ok(reply) => {
                    warn!(%endpoint, op = ?reply.op, "unexpected reply to membership query");
                }
                Err(e) => {
                    debug!(%endpoint, error = %e, "membership query failed");
                }
            }
        }
        Err(ClientError::SeedsUnreachable)
    }
}
