//! Membership entries.

use serde::{Deserialize, Serialize};

/// Address and liveness information for one replica.
///
/// `last_seen_ts` is the heartbeat timestamp (epoch millis) stamped by the
/// replica itself; the entry with the larger timestamp wins on merge.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeInfo {
    /// Unique replica id.
    pub node_id: String,
    /// Host name or IP the replica listens on.
    pub host: String,
    /// Shard the replica owns.
    pub shard_id: u32,
    /// Request/reply port for clients.
    pub client_port: u16,
    /// Pull port for shard anti-entropy gossip.
    pub gossip_pull_port: u16,
    /// Pull port for membership gossip.
    pub discovery_pull_port: u16,
    /// Last heartbeat, epoch millis.
    #[serde(default)]
    pub last_seen_ts: u64,
}

impl NodeInfo {
    /// Address of the client endpoint.
    #[must_use]
    pub fn client_addr(&self) -> String {
        format!("{}:{}", self.host, self.client_port)
    }

    /// Address of the shard gossip endpoint.
    #[must_use]
    pub fn gossip_addr(&self) -> String {
        format!("{}:{}", self.host, self.gossip_pull_port)
    }

    /// Address of the discovery endpoint.
    #[must_use]
    pub fn discovery_addr(&self) -> String {
        format!("{}:{}", self.host, self.discovery_pull_port)
    }
}
