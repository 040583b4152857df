//! # Shoplist Node
//!
//! A replica of the shoplist store. Each node owns one shard and serves
//! three TCP endpoints:
//!
//! - **client**: request/reply for `ENSURE_LIST`, `DELETE_LIST`, `GET_LIST`
//!   and `GET_NODES`
//! - **shard gossip**: inbound full-snapshot pushes from replicas of the
//!   same shard, merged into the local store
//! - **discovery**: inbound membership snapshots from every replica
//!
//! All state lives on a single event loop thread. A [`Node`] wraps that
//! thread; [`Replica`] holds the protocol logic independently of sockets.
//!
//! ```rust,no_run
//! use shoplist_node::{Node, NodeConfig};
//!
//! let seed = Node::new(NodeConfig::new("n0", 0, 2))?;
//! let joiner = NodeConfig::new("n1", 0, 2).with_peer(seed.info().clone());
//! # Ok::<(), shoplist_node::NodeError>(())
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod config;
mod error;
mod event_loop;
mod node;
pub mod peers;
mod replica;

pub use config::NodeConfig;
pub use error::{NodeError, NodeResult};
pub use node::{Node, NodeState};
pub use peers::{Channel, PeerConnector, TcpPeerConnector};
pub use replica::Replica;
