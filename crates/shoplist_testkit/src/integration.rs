//! Deterministic multi-replica harness.
//!
//! [`ReplicaHarness`] runs several [`Replica`]s in one thread. Their pushes
//! land in per-replica outboxes and are only delivered when the test says
//! so, which makes gossip ordering, loss and partitions reproducible.

use bytes::Bytes;
use shoplist_model::ShoppingList;
use shoplist_node::{Channel, NodeConfig, PeerConnector, Replica};
use shoplist_protocol::frame::{decode_body, LENGTH_PREFIX_SIZE};
use shoplist_protocol::{Message, NodeInfo};
use shoplist_storage::ListStore;
use std::collections::HashSet;

/// A connector that records pushes instead of sending them.
#[derive(Debug, Default)]
pub struct MailboxConnector {
    links: HashSet<(Channel, String)>,
    outbox: Vec<(Channel, String, Bytes)>,
}

impl MailboxConnector {
    /// Takes every queued push.
    pub fn drain(&mut self) -> Vec<(Channel, String, Bytes)> {
        std::mem::take(&mut self.outbox)
    }

    /// Returns true if a link to `node_id` on `channel` is open.
    pub fn is_linked(&self, channel: Channel, node_id: &str) -> bool {
        self.links.contains(&(channel, node_id.to_string()))
    }
}

impl PeerConnector for MailboxConnector {
    fn connect(&mut self, channel: Channel, peer: &NodeInfo) {
        self.links.insert((channel, peer.node_id.clone()));
    }

    fn disconnect(&mut self, channel: Channel, node_id: &str) {
        self.links.remove(&(channel, node_id.to_string()));
    }

    fn push(&mut self, channel: Channel, node_id: &str, frame: Bytes) -> bool {
        if !self.is_linked(channel, node_id) {
            return false;
        }
        self.outbox.push((channel, node_id.to_string(), frame));
        true
    }
}

/// Replicas wired together through [`MailboxConnector`]s.
pub struct ReplicaHarness {
    replicas: Vec<Replica<MailboxConnector>>,
    partitioned: HashSet<(usize, usize)>,
    clock: u64,
}

impl ReplicaHarness {
    /// Creates `count` replicas of shard 0 in a one-shard cluster, each
    /// knowing all the others.
    pub fn new(count: usize) -> Self {
        let infos: Vec<NodeInfo> = (0..count)
            .map(|i| NodeInfo {
                node_id: format!("r{i}"),
                host: "sim".into(),
                shard_id: 0,
                client_port: 0,
                gossip_pull_port: 0,
                discovery_pull_port: 0,
                last_seen_ts: 0,
            })
            .collect();

        let clock = 1_000;
        let replicas = infos
            .iter()
            .map(|info| {
                let config = NodeConfig::new(info.node_id.clone(), 0, 1);
                let mut replica = Replica::new(
                    &config,
                    info.clone(),
                    ListStore::in_memory(),
                    MailboxConnector::default(),
                );
                replica.bootstrap(&infos, clock);
                replica
            })
            .collect();

        Self {
            replicas,
            partitioned: HashSet::new(),
            clock,
        }
    }

    /// Number of replicas.
    pub fn len(&self) -> usize {
        self.replicas.len()
    }

    /// Returns true if the harness has no replicas.
    pub fn is_empty(&self) -> bool {
        self.replicas.is_empty()
    }

    /// Replica `i`.
    pub fn replica(&self, i: usize) -> &Replica<MailboxConnector> {
        &self.replicas[i]
    }

    /// Sends a client request to replica `i` and returns its reply.
    pub fn client(&mut self, i: usize, request: Message) -> Message {
        self.clock += 1;
        self.replicas[i].handle_client(request, self.clock)
    }

    /// Runs one shard gossip round on every replica.
    pub fn gossip_round(&mut self) {
        self.clock += 1;
        for replica in &mut self.replicas {
            replica.shard_gossip_tick(self.clock);
        }
    }

    /// Drops all traffic between `a` and `b` until [`heal`](Self::heal).
    pub fn partition(&mut self, a: usize, b: usize) {
        self.partitioned.insert((a, b));
        self.partitioned.insert((b, a));
    }

    /// Removes all partitions.
    pub fn heal(&mut self) {
        self.partitioned.clear();
    }

    /// Delivers queued pushes until no replica has anything left to send.
    ///
    /// Returns the number of frames delivered.
    pub fn deliver_all(&mut self) -> usize {
        let mut delivered = 0;
        loop {
            let mut pending = Vec::new();
            for (from, replica) in self.replicas.iter_mut().enumerate() {
                for (channel, to, frame) in replica.connector_mut().drain() {
                    pending.push((from, channel, to, frame));
                }
            }
            if pending.is_empty() {
                return delivered;
            }

            for (from, channel, to, frame) in pending {
                let Some(target) = self.index_of(&to) else {
                    continue;
                };
                if self.partitioned.contains(&(from, target)) {
                    continue;
                }
                let Ok(msg) = decode_body(&frame[LENGTH_PREFIX_SIZE..]) else {
                    continue;
                };
                match channel {
                    Channel::Shard => {
                        self.replicas[target].handle_shard_gossip(&msg);
                    }
                    Channel::Discovery => self.replicas[target].handle_discovery(&msg),
                }
                delivered += 1;
            }
        }
    }

    /// Every replica's copy of list `uid`.
    pub fn copies(&self, uid: &str) -> Vec<Option<ShoppingList>> {
        self.replicas
            .iter()
            .map(|r| r.store().read(uid).ok().flatten())
            .collect()
    }

    fn index_of(&self, node_id: &str) -> Option<usize> {
        self.replicas.iter().position(|r| r.node_id() == node_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shoplist_protocol::OpType;

    #[test]
    fn replicas_know_each_other() {
        let harness = ReplicaHarness::new(3);
        for i in 0..3 {
            assert_eq!(harness.replica(i).known_nodes().len(), 3);
            assert_eq!(harness.replica(i).shard_peers().len(), 2);
        }
    }

    #[test]
    fn write_spreads_after_delivery() {
        let mut harness = ReplicaHarness::new(3);
        let reply = harness.client(0, Message::ensure_list("c", 1, ShoppingList::new("L", "x")));
        assert_eq!(reply.op, OpType::ListResponse);

        // Eager fanout queued pushes, nothing delivered yet
        assert!(harness.copies("L")[1].is_none());
        assert!(harness.deliver_all() > 0);
        assert!(harness.copies("L").iter().all(Option::is_some));
    }

    #[test]
    fn partition_blocks_delivery() {
        let mut harness = ReplicaHarness::new(2);
        harness.partition(0, 1);
        harness.client(0, Message::ensure_list("c", 1, ShoppingList::new("L", "x")));
        harness.deliver_all();
        assert!(harness.copies("L")[1].is_none());

        harness.heal();
        harness.gossip_round();
        harness.deliver_all();
        assert!(harness.copies("L")[1].is_some());
    }
}
