//! Request handling, anti-entropy and membership for one replica.
//!
//! [`Replica`] is the synchronous core of a node. The event loop feeds it
//! decoded messages and timer ticks; it reads and writes the [`ListStore`]
//! and pushes frames through a [`PeerConnector`]. Keeping it free of sockets
//! lets the whole protocol be exercised in unit tests.

use crate::config::NodeConfig;
use crate::peers::{Channel, PeerConnector};
use bytes::Bytes;
use shoplist_model::ShoppingList;
use shoplist_protocol::{encode_frame, shard_for, Message, NodeInfo, OpType, Request};
use shoplist_storage::ListStore;
use std::collections::{BTreeMap, HashSet};
use tracing::{debug, info, warn};

/// State and behavior of one replica.
pub struct Replica<C: PeerConnector> {
    info: NodeInfo,
    num_shards: u32,
    discovery_timeout_ms: u64,
    eager_fanout_rounds: u32,
    store: ListStore,
    known_nodes: BTreeMap<String, NodeInfo>,
    connected_shard: HashSet<String>,
    connected_discovery: HashSet<String>,
    connector: C,
}

impl<C: PeerConnector> Replica<C> {
    /// Creates a replica advertising `info`, seeded with itself as the only
    /// known node.
    pub fn new(config: &NodeConfig, info: NodeInfo, store: ListStore, connector: C) -> Self {
        let mut known_nodes = BTreeMap::new();
        known_nodes.insert(info.node_id.clone(), info.clone());
        Self {
            info,
            num_shards: config.num_shards,
            discovery_timeout_ms: duration_millis(config.discovery_timeout),
            eager_fanout_rounds: config.eager_fanout_rounds,
            store,
            known_nodes,
            connected_shard: HashSet::new(),
            connected_discovery: HashSet::new(),
            connector,
        }
    }

    /// This replica's id.
    pub fn node_id(&self) -> &str {
        &self.info.node_id
    }

    /// This replica's shard.
    pub fn shard_id(&self) -> u32 {
        self.info.shard_id
    }

    /// The local list store.
    pub fn store(&self) -> &ListStore {
        &self.store
    }

    /// Membership table, self included.
    pub fn known_nodes(&self) -> &BTreeMap<String, NodeInfo> {
        &self.known_nodes
    }

    /// Peers with an open shard gossip link.
    pub fn shard_peers(&self) -> &HashSet<String> {
        &self.connected_shard
    }

    /// Peers with an open discovery link.
    pub fn discovery_peers(&self) -> &HashSet<String> {
        &self.connected_discovery
    }

    /// The peer connector.
    pub fn connector(&self) -> &C {
        &self.connector
    }

    /// Mutable access to the peer connector.
    pub fn connector_mut(&mut self) -> &mut C {
        &mut self.connector
    }

    /// Merges the startup peers, then marks every known node as seen at
    /// `now` so none is evicted before it had a chance to gossip.
    pub fn bootstrap(&mut self, peers: &[NodeInfo], now: u64) {
        self.merge_nodes(peers);
        for node in self.known_nodes.values_mut() {
            node.last_seen_ts = now;
        }
        info!(
            node_id = %self.info.node_id,
            shard = self.info.shard_id,
            known = self.known_nodes.len(),
            "replica bootstrapped"
        );
    }

    // ------------------------------------------------------------------
    // Client endpoint
    // ------------------------------------------------------------------

    /// Serves one client request and returns the reply.
    ///
    /// Every request gets exactly one reply. Requests for lists owned by
    /// another shard are answered with [`OpType::WrongShard`] and change
    /// nothing.
    pub fn handle_client(&mut self, message: Message, now: u64) -> Message {
        let origin = self.info.node_id.clone();

        let request = match Request::try_from(message) {
            Ok(request) => request,
            Err(e) => {
                debug!(error = %e, "rejecting client message");
                return Message::error_response(&origin, now, e.to_string());
            }
        };

        if let Some(uid) = request.list_uid() {
            let owner = shard_for(uid, self.num_shards);
            if owner != self.info.shard_id {
                debug!(list = %uid, owner, "rejecting list from another shard");
                return Message::wrong_shard(&origin, now, uid, owner);
            }
        }

        match request {
            Request::GetNodes => {
                let nodes = self.known_nodes.values().cloned().collect();
                Message::nodes_response(&origin, now, nodes)
            }
            Request::GetList(uid) => match self.store.read(&uid) {
                Ok(Some(list)) => Message::list_response(true, &origin, now, list),
                Ok(None) => Message::list_response(false, &origin, now, ShoppingList::empty(uid)),
                Err(e) => storage_failure(&origin, now, &uid, &e),
            },
            Request::EnsureList(incoming) => match self.store.merge(&incoming) {
                Ok(merged) => {
                    debug!(list = %merged.uid(), items = merged.item_count(), "list ensured");
                    self.eager_fanout(now);
                    Message::list_response(true, &origin, now, merged)
                }
                Err(e) => storage_failure(&origin, now, incoming.uid(), &e),
            },
            Request::DeleteList(uid) => match self.store.delete(&uid) {
                Ok(existed) => {
                    debug!(list = %uid, existed, "list deleted");
                    self.eager_fanout(now);
                    Message::list_response(false, &origin, now, ShoppingList::empty(uid))
                }
                Err(e) => storage_failure(&origin, now, &uid, &e),
            },
        }
    }

    // ------------------------------------------------------------------
    // Shard gossip
    // ------------------------------------------------------------------

    /// Merges an anti-entropy batch into the store.
    ///
    /// Returns the number of lists merged. Messages of any other kind are
    /// ignored.
    pub fn handle_shard_gossip(&mut self, msg: &Message) -> usize {
        if msg.op != OpType::GossipLists {
            debug!(op = ?msg.op, from = %msg.origin, "ignoring non-gossip message on shard endpoint");
            return 0;
        }

        let mut merged = 0;
        for list in &msg.lists {
            match self.store.merge(list) {
                Ok(_) => merged += 1,
                Err(e) => warn!(list = %list.uid(), error = %e, "failed to merge gossiped list"),
            }
        }
        merged
    }

    /// Pushes the full local snapshot to every shard peer.
    ///
    /// Returns the number of peers the frame was queued for.
    pub fn shard_gossip_tick(&mut self, now: u64) -> usize {
        match self.snapshot_frame(now) {
            Some(frame) => self.push_shard(&frame),
            None => 0,
        }
    }

    fn eager_fanout(&mut self, now: u64) {
        if let Some(frame) = self.snapshot_frame(now) {
            for _ in 0..self.eager_fanout_rounds {
                self.push_shard(&frame);
            }
        }
    }

    fn snapshot_frame(&self, now: u64) -> Option<Bytes> {
        if self.connected_shard.is_empty() {
            return None;
        }
        let lists = match self.store.read_all() {
            Ok(lists) => lists,
            Err(e) => {
                warn!(error = %e, "failed to read snapshot for gossip");
                return None;
            }
        };
        let msg = Message::gossip_lists(&self.info.node_id, now, lists);
        match encode_frame(&msg) {
            Ok(frame) => Some(Bytes::from(frame)),
            Err(e) => {
                warn!(error = %e, "failed to encode gossip snapshot");
                None
            }
        }
    }

    fn push_shard(&mut self, frame: &Bytes) -> usize {
        let mut queued = 0;
        for peer in &self.connected_shard {
            if self.connector.push(Channel::Shard, peer, frame.clone()) {
                queued += 1;
            }
        }
        queued
    }

    // ------------------------------------------------------------------
    // Discovery
    // ------------------------------------------------------------------

    /// Merges a membership snapshot. Messages of any other kind are ignored.
    pub fn handle_discovery(&mut self, msg: &Message) {
        if msg.op != OpType::GossipNodes {
            debug!(op = ?msg.op, from = %msg.origin, "ignoring non-membership message on discovery endpoint");
            return;
        }
        self.merge_nodes(&msg.nodes);
    }

    /// Evicts silent peers, refreshes this replica's heartbeat and pushes the
    /// membership table to every discovery peer.
    ///
    /// Returns the ids of evicted peers.
    pub fn discovery_tick(&mut self, now: u64) -> Vec<String> {
        let evicted = self.evict_dead_nodes(now);

        self.info.last_seen_ts = now;
        self.known_nodes
            .insert(self.info.node_id.clone(), self.info.clone());

        if !self.connected_discovery.is_empty() {
            let nodes = self.known_nodes.values().cloned().collect();
            let msg = Message::gossip_nodes(&self.info.node_id, now, nodes);
            match encode_frame(&msg) {
                Ok(frame) => {
                    let frame = Bytes::from(frame);
                    for peer in &self.connected_discovery {
                        self.connector.push(Channel::Discovery, peer, frame.clone());
                    }
                }
                Err(e) => warn!(error = %e, "failed to encode membership snapshot"),
            }
        }
        evicted
    }

    /// Merges membership entries.
    ///
    /// Entries for this replica are skipped. An entry replaces the known one
    /// only if its heartbeat is strictly newer. New nodes get a discovery
    /// link, plus a shard link if they share this replica's shard.
    pub fn merge_nodes(&mut self, nodes: &[NodeInfo]) {
        for node in nodes {
            if node.node_id == self.info.node_id {
                continue;
            }

            match self.known_nodes.get(&node.node_id) {
                Some(known) if node.last_seen_ts <= known.last_seen_ts => {}
                Some(known) => {
                    let moved = known.host != node.host
                        || known.gossip_pull_port != node.gossip_pull_port
                        || known.discovery_pull_port != node.discovery_pull_port
                        || known.shard_id != node.shard_id;
                    self.known_nodes.insert(node.node_id.clone(), node.clone());
                    if moved {
                        debug!(peer = %node.node_id, "peer address changed, relinking");
                        self.unlink(&node.node_id);
                        self.link(node);
                    }
                }
                None => {
                    info!(peer = %node.node_id, shard = node.shard_id, "discovered node");
                    self.known_nodes.insert(node.node_id.clone(), node.clone());
                    self.link(node);
                }
            }
        }
    }

    fn evict_dead_nodes(&mut self, now: u64) -> Vec<String> {
        let dead: Vec<String> = self
            .known_nodes
            .values()
            .filter(|n| n.node_id != self.info.node_id)
            .filter(|n| now.saturating_sub(n.last_seen_ts) > self.discovery_timeout_ms)
            .map(|n| n.node_id.clone())
            .collect();

        for id in &dead {
            info!(peer = %id, "evicting silent node");
            self.unlink(id);
            self.known_nodes.remove(id);
        }
        dead
    }

    fn link(&mut self, node: &NodeInfo) {
        self.connector.connect(Channel::Discovery, node);
        self.connected_discovery.insert(node.node_id.clone());
        if node.shard_id == self.info.shard_id {
            self.connector.connect(Channel::Shard, node);
            self.connected_shard.insert(node.node_id.clone());
        }
    }

    fn unlink(&mut self, node_id: &str) {
        if self.connected_discovery.remove(node_id) {
            self.connector.disconnect(Channel::Discovery, node_id);
        }
        if self.connected_shard.remove(node_id) {
            self.connector.disconnect(Channel::Shard, node_id);
        }
    }
}

impl<C: PeerConnector> std::fmt::Debug for Replica<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Replica")
            .field("node_id", &self.info.node_id)
            .field("shard_id", &self.info.shard_id)
            .field("known_nodes", &self.known_nodes.len())
            .field("shard_peers", &self.connected_shard.len())
            .finish()
    }
}

fn storage_failure(
    origin: &str,
    now: u64,
    uid: &str,
    err: &shoplist_storage::StorageError,
) -> Message {
    warn!(list = %uid, error = %err, "storage failure while serving request");
    Message::error_response(origin, now, format!("storage failure on list {uid}: {err}"))
}

pub(crate) fn duration_millis(d: std::time::Duration) -> u64 {
    u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use shoplist_model::ShoppingItem;
    use shoplist_protocol::frame::decode_body;
    use std::time::Duration;

    #[derive(Default)]
    struct RecordingConnector {
        connects: Vec<(Channel, String)>,
        disconnects: Vec<(Channel, String)>,
        pushes: Vec<(Channel, String, Message)>,
    }

    impl RecordingConnector {
        fn pushes_on(&self, channel: Channel) -> Vec<&Message> {
            self.pushes
                .iter()
                .filter(|(c, _, _)| *c == channel)
                .map(|(_, _, m)| m)
                .collect()
        }
    }

    impl PeerConnector for RecordingConnector {
        fn connect(&mut self, channel: Channel, peer: &NodeInfo) {
            self.connects.push((channel, peer.node_id.clone()));
        }

        fn disconnect(&mut self, channel: Channel, node_id: &str) {
            self.disconnects.push((channel, node_id.to_string()));
        }

        fn push(&mut self, channel: Channel, node_id: &str, frame: Bytes) -> bool {
            let msg = decode_body(&frame[4..]).unwrap();
            self.pushes.push((channel, node_id.to_string(), msg));
            true
        }
    }

    fn node(id: &str, shard: u32, last_seen: u64) -> NodeInfo {
        NodeInfo {
            node_id: id.into(),
            host: "127.0.0.1".into(),
            shard_id: shard,
            client_port: 1,
            gossip_pull_port: 2,
            discovery_pull_port: 3,
            last_seen_ts: last_seen,
        }
    }

    fn replica(shard: u32, num_shards: u32) -> Replica<RecordingConnector> {
        let config = NodeConfig::new("me", shard, num_shards)
            .with_discovery_timeout(Duration::from_millis(1_000))
            .with_discovery_interval(Duration::from_millis(100));
        Replica::new(
            &config,
            node("me", shard, 0),
            ListStore::in_memory(),
            RecordingConnector::default(),
        )
    }

    fn uid_in_shard(shard: u32, num_shards: u32) -> String {
        (0..)
            .map(|i| format!("list-{i}"))
            .find(|uid| shard_for(uid, num_shards) == shard)
            .unwrap()
    }

    fn list_with_milk(uid: &str) -> ShoppingList {
        let mut list = ShoppingList::new(uid, "Groceries");
        list.add(ShoppingItem::new("milk", "Milk", "c1", 2, 0))
            .unwrap();
        list
    }

    #[test]
    fn starts_knowing_only_itself() {
        let r = replica(0, 1);
        assert_eq!(r.known_nodes().len(), 1);
        assert!(r.known_nodes().contains_key("me"));
        assert!(r.shard_peers().is_empty());
    }

    #[test]
    fn ensure_then_get() {
        let mut r = replica(0, 1);
        let reply = r.handle_client(Message::ensure_list("c1", 1, list_with_milk("L")), 10);
        assert_eq!(reply.op, OpType::ListResponse);
        assert_eq!(reply.origin, "me");
        assert_eq!(reply.first_list().unwrap().item_count(), 1);

        let reply = r.handle_client(Message::get_list("c1", 2, "L"), 11);
        assert_eq!(reply.op, OpType::ListResponse);
        let list = reply.into_first_list().unwrap();
        assert_eq!(list.get_item("milk").unwrap().desired_quantity(), 2);
    }

    #[test]
    fn ensure_replies_with_merged_state() {
        let mut r = replica(0, 1);
        r.handle_client(Message::ensure_list("c1", 1, list_with_milk("L")), 10);

        let mut other = ShoppingList::new("L", "Groceries");
        other
            .add(ShoppingItem::new("eggs", "Eggs", "c2", 12, 0))
            .unwrap();
        let reply = r.handle_client(Message::ensure_list("c2", 2, other), 11);

        let merged = reply.into_first_list().unwrap();
        assert!(merged.contains("milk"));
        assert!(merged.contains("eggs"));
    }

    #[test]
    fn get_missing_echoes_uid() {
        let mut r = replica(0, 1);
        let reply = r.handle_client(Message::get_list("c1", 1, "nope"), 5);
        assert_eq!(reply.op, OpType::NoListResponse);
        assert_eq!(reply.list_uid(), Some("nope"));
    }

    #[test]
    fn delete_is_hard() {
        let mut r = replica(0, 1);
        r.handle_client(Message::ensure_list("c1", 1, list_with_milk("L")), 10);
        let reply = r.handle_client(Message::delete_list("c1", 2, "L"), 11);
        assert_eq!(reply.op, OpType::NoListResponse);
        assert_eq!(r.store().read("L").unwrap(), None);

        // Deleting again still answers
        let reply = r.handle_client(Message::delete_list("c1", 3, "L"), 12);
        assert_eq!(reply.op, OpType::NoListResponse);
    }

    #[test]
    fn wrong_shard_changes_nothing() {
        let mut r = replica(0, 4);
        let foreign = uid_in_shard(2, 4);

        let reply = r.handle_client(
            Message::ensure_list("c1", 1, list_with_milk(&foreign)),
            10,
        );
        assert_eq!(reply.op, OpType::WrongShard);
        assert_eq!(reply.list_uid(), Some(foreign.as_str()));
        assert!(reply.detail.unwrap().contains("shard 2"));
        assert!(r.store().is_empty().unwrap());

        let reply = r.handle_client(Message::get_list("c1", 1, &foreign), 10);
        assert_eq!(reply.op, OpType::WrongShard);
    }

    #[test]
    fn get_nodes_ignores_sharding() {
        let mut r = replica(1, 4);
        r.merge_nodes(&[node("a", 0, 5)]);
        let reply = r.handle_client(Message::get_nodes("c1", 1), 10);
        assert_eq!(reply.op, OpType::NodesResponse);
        assert_eq!(reply.nodes.len(), 2);
    }

    #[test]
    fn malformed_requests_get_error_replies() {
        let mut r = replica(0, 1);

        let mut no_list = Message::get_list("c1", 1, "L");
        no_list.lists.clear();
        let reply = r.handle_client(no_list, 10);
        assert_eq!(reply.op, OpType::ErrorResponse);

        let reply = r.handle_client(Message::gossip_lists("c1", 1, Vec::new()), 10);
        assert_eq!(reply.op, OpType::ErrorResponse);
    }

    #[test]
    fn writes_fan_out_to_shard_peers() {
        let mut r = replica(0, 1);
        r.merge_nodes(&[node("peer", 0, 5)]);

        r.handle_client(Message::ensure_list("c1", 1, list_with_milk("L")), 10);
        let pushes = r.connector().pushes_on(Channel::Shard);
        assert_eq!(pushes.len(), 3);
        assert!(pushes
            .iter()
            .all(|m| m.op == OpType::GossipLists && m.lists.len() == 1));
    }

    #[test]
    fn no_fanout_without_peers() {
        let mut r = replica(0, 1);
        r.handle_client(Message::ensure_list("c1", 1, list_with_milk("L")), 10);
        assert_eq!(r.shard_gossip_tick(20), 0);
        assert!(r.connector().pushes.is_empty());
    }

    #[test]
    fn gossip_merges_lists() {
        let mut r = replica(0, 1);
        let batch = Message::gossip_lists(
            "peer",
            1,
            vec![list_with_milk("A"), list_with_milk("B")],
        );
        assert_eq!(r.handle_shard_gossip(&batch), 2);
        assert_eq!(r.store().len().unwrap(), 2);

        // Redelivery is harmless
        assert_eq!(r.handle_shard_gossip(&batch), 2);
        assert_eq!(r.store().len().unwrap(), 2);

        // Wrong kind on the gossip endpoint
        assert_eq!(r.handle_shard_gossip(&Message::get_nodes("x", 1)), 0);
    }

    #[test]
    fn discovery_links_new_nodes_by_shard() {
        let mut r = replica(0, 2);
        r.merge_nodes(&[node("same", 0, 5), node("other", 1, 5), node("me", 0, 99)]);

        assert_eq!(r.known_nodes().len(), 3);
        assert!(r.shard_peers().contains("same"));
        assert!(!r.shard_peers().contains("other"));
        assert!(r.discovery_peers().contains("other"));
        // Own entry is never overwritten from outside
        assert_eq!(r.known_nodes()["me"].last_seen_ts, 0);
    }

    #[test]
    fn discovery_keeps_newest_heartbeat() {
        let mut r = replica(0, 1);
        r.merge_nodes(&[node("a", 0, 10)]);
        r.merge_nodes(&[node("a", 0, 5)]);
        assert_eq!(r.known_nodes()["a"].last_seen_ts, 10);

        // Ties do not overwrite
        let mut tie = node("a", 0, 10);
        tie.client_port = 999;
        r.merge_nodes(&[tie]);
        assert_eq!(r.known_nodes()["a"].client_port, 1);

        r.merge_nodes(&[node("a", 0, 20)]);
        assert_eq!(r.known_nodes()["a"].last_seen_ts, 20);
        // Only one link per channel was opened
        assert_eq!(r.connector().connects.len(), 2);
    }

    #[test]
    fn moved_peer_is_relinked() {
        let mut r = replica(0, 1);
        r.merge_nodes(&[node("a", 0, 10)]);
        let mut moved = node("a", 0, 20);
        moved.gossip_pull_port = 4242;
        r.merge_nodes(&[moved]);

        assert_eq!(r.connector().disconnects.len(), 2);
        assert_eq!(r.connector().connects.len(), 4);
    }

    #[test]
    fn discovery_tick_evicts_and_heartbeats() {
        let mut r = replica(0, 1);
        r.merge_nodes(&[node("fresh", 0, 1_500), node("stale", 0, 100)]);

        let evicted = r.discovery_tick(2_000);
        assert_eq!(evicted, vec!["stale".to_string()]);
        assert!(!r.known_nodes().contains_key("stale"));
        assert!(!r.shard_peers().contains("stale"));
        assert!(r.connector().disconnects.contains(&(Channel::Shard, "stale".into())));

        assert_eq!(r.known_nodes()["me"].last_seen_ts, 2_000);
        let pushed = r.connector().pushes_on(Channel::Discovery);
        assert_eq!(pushed.len(), 1);
        assert_eq!(pushed[0].nodes.len(), 2);
    }

    #[test]
    fn eviction_boundary_is_exclusive() {
        let mut r = replica(0, 1);
        r.merge_nodes(&[node("edge", 0, 1_000)]);
        // Exactly the timeout: kept
        assert!(r.discovery_tick(2_000).is_empty());
        assert!(r.discovery_tick(2_001).contains(&"edge".to_string()));
    }

    #[test]
    fn self_is_never_evicted() {
        let mut r = replica(0, 1);
        assert!(r.discovery_tick(1_000_000).is_empty());
        assert!(r.known_nodes().contains_key("me"));
    }

    #[test]
    fn bootstrap_stamps_everyone() {
        let mut r = replica(0, 1);
        r.bootstrap(&[node("seed", 0, 0)], 5_000);
        assert_eq!(r.known_nodes()["seed"].last_seen_ts, 5_000);
        assert_eq!(r.known_nodes()["me"].last_seen_ts, 5_000);
        // Not evicted right away
        assert!(r.discovery_tick(5_500).is_empty());
    }
}
