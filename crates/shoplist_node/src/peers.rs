//! Outbound links to peer replicas.
//!
//! Each replica pushes to two kinds of peer endpoints: the shard gossip pull
//! port of replicas in its own shard and the discovery pull port of every
//! known replica. Pushes are fire-and-forget. A frame that cannot be queued
//! is dropped and the next gossip round carries the same state again.

use bytes::Bytes;
use shoplist_protocol::frame::write_raw_frame_async;
use shoplist_protocol::NodeInfo;
use std::collections::HashMap;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, trace};

/// Which pull endpoint of a peer a link targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Channel {
    /// Shard anti-entropy gossip.
    Shard,
    /// Membership gossip.
    Discovery,
}

impl Channel {
    /// Address of this channel's endpoint on `peer`.
    #[must_use]
    pub fn addr(self, peer: &NodeInfo) -> String {
        match self {
            Self::Shard => peer.gossip_addr(),
            Self::Discovery => peer.discovery_addr(),
        }
    }
}

/// Manages push links to peers.
///
/// Implementations must not block: they are called from the replica's event
/// loop while it holds the store.
pub trait PeerConnector {
    /// Opens (or replaces) the link to `peer` on `channel`.
    fn connect(&mut self, channel: Channel, peer: &NodeInfo);

    /// Closes the link to `node_id` on `channel`, if any.
    fn disconnect(&mut self, channel: Channel, node_id: &str);

    /// Queues an encoded frame for `node_id`.
    ///
    /// Returns `false` if the frame was dropped.
    fn push(&mut self, channel: Channel, node_id: &str, frame: Bytes) -> bool;
}

struct PeerLink {
    tx: mpsc::Sender<Bytes>,
    task: JoinHandle<()>,
}

/// TCP implementation of [`PeerConnector`].
///
/// Every link owns a bounded queue drained by a writer task that dials the
/// peer lazily and re-dials after `reconnect_delay` when the connection
/// breaks. Must be used from within a tokio runtime.
pub struct TcpPeerConnector {
    links: HashMap<(Channel, String), PeerLink>,
    queue_capacity: usize,
    reconnect_delay: Duration,
}

impl TcpPeerConnector {
    /// Creates a connector with the given per-link queue capacity.
    pub fn new(queue_capacity: usize, reconnect_delay: Duration) -> Self {
        Self {
            links: HashMap::new(),
            queue_capacity: queue_capacity.max(1),
            reconnect_delay,
        }
    }

    /// Number of open links.
    pub fn link_count(&self) -> usize {
        self.links.len()
    }
}

impl std::fmt::Debug for TcpPeerConnector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TcpPeerConnector")
            .field("links", &self.links.len())
            .field("queue_capacity", &self.queue_capacity)
            .finish()
    }
}

impl PeerConnector for TcpPeerConnector {
    fn connect(&mut self, channel: Channel, peer: &NodeInfo) {
        let (tx, rx) = mpsc::channel(self.queue_capacity);
        let addr = channel.addr(peer);
        debug!(peer = %peer.node_id, ?channel, %addr, "opening peer link");
        let task = tokio::spawn(drain_link(addr, rx, self.reconnect_delay));

        let key = (channel, peer.node_id.clone());
        if let Some(old) = self.links.insert(key, PeerLink { tx, task }) {
            old.task.abort();
        }
    }

    fn disconnect(&mut self, channel: Channel, node_id: &str) {
        if let Some(link) = self.links.remove(&(channel, node_id.to_string())) {
            debug!(peer = %node_id, ?channel, "closing peer link");
            link.task.abort();
        }
    }

    fn push(&mut self, channel: Channel, node_id: &str, frame: Bytes) -> bool {
        match self.links.get(&(channel, node_id.to_string())) {
            Some(link) => match link.tx.try_send(frame) {
                Ok(()) => true,
                Err(_) => {
                    trace!(peer = %node_id, ?channel, "peer queue full, frame dropped");
                    false
                }
            },
            None => false,
        }
    }
}

impl Drop for TcpPeerConnector {
    fn drop(&mut self) {
        for (_, link) in self.links.drain() {
            link.task.abort();
        }
    }
}

async fn drain_link(addr: String, mut rx: mpsc::Receiver<Bytes>, reconnect_delay: Duration) {
    let mut stream: Option<TcpStream> = None;

    while let Some(frame) = rx.recv().await {
        if stream.is_none() {
            match TcpStream::connect(&addr).await {
                Ok(s) => {
                    let _ = s.set_nodelay(true);
                    stream = Some(s);
                }
                Err(e) => {
                    trace!(%addr, error = %e, "peer unreachable");
                    tokio::time::sleep(reconnect_delay).await;
                    continue;
                }
            }
        }

        if let Some(s) = stream.as_mut() {
            if let Err(e) = write_raw_frame_async(s, &frame).await {
                trace!(%addr, error = %e, "peer write failed, reconnecting");
                stream = None;
                tokio::time::sleep(reconnect_delay).await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shoplist_protocol::{encode_frame, read_frame_async, Message, OpType};
    use tokio::net::TcpListener;

    fn peer_at(port: u16) -> NodeInfo {
        NodeInfo {
            node_id: "peer".into(),
            host: "127.0.0.1".into(),
            shard_id: 0,
            client_port: 0,
            gossip_pull_port: port,
            discovery_pull_port: port,
            last_seen_ts: 0,
        }
    }

    #[tokio::test]
    async fn pushed_frames_arrive_in_order() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        let mut connector = TcpPeerConnector::new(8, Duration::from_millis(10));
        connector.connect(Channel::Shard, &peer_at(port));

        for ts in 1..=3 {
            let frame = encode_frame(&Message::gossip_lists("n0", ts, Vec::new())).unwrap();
            assert!(connector.push(Channel::Shard, "peer", Bytes::from(frame)));
        }

        let (mut socket, _) = listener.accept().await.unwrap();
        for ts in 1..=3 {
            let msg = read_frame_async(&mut socket).await.unwrap().unwrap();
            assert_eq!(msg.op, OpType::GossipLists);
            assert_eq!(msg.ts, ts);
        }
    }

    #[tokio::test]
    async fn push_without_link_is_dropped() {
        let mut connector = TcpPeerConnector::new(8, Duration::from_millis(10));
        assert!(!connector.push(Channel::Discovery, "nobody", Bytes::from_static(b"x")));
    }

    #[tokio::test]
    async fn full_queue_drops_frames() {
        // Nothing listens on port 1, so the writer never drains
        let mut connector = TcpPeerConnector::new(1, Duration::from_secs(60));
        connector.connect(Channel::Shard, &peer_at(1));

        let mut accepted = 0;
        for _ in 0..10 {
            if connector.push(Channel::Shard, "peer", Bytes::from_static(b"x")) {
                accepted += 1;
            }
        }
        assert!(accepted < 10);
    }

    #[tokio::test]
    async fn disconnect_removes_link() {
        let mut connector = TcpPeerConnector::new(4, Duration::from_millis(10));
        connector.connect(Channel::Shard, &peer_at(1));
        connector.connect(Channel::Discovery, &peer_at(1));
        assert_eq!(connector.link_count(), 2);

        connector.disconnect(Channel::Shard, "peer");
        assert_eq!(connector.link_count(), 1);
        assert!(!connector.push(Channel::Shard, "peer", Bytes::from_static(b"x")));
    }
}
