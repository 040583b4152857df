//! Node lifecycle.

use crate::config::NodeConfig;
use crate::error::{NodeError, NodeResult};
use crate::event_loop::{self, Listeners};
use crate::peers::TcpPeerConnector;
use crate::replica::Replica;
use shoplist_crdt::now_millis;
use shoplist_protocol::NodeInfo;
use shoplist_storage::ListStore;
use std::net::TcpListener;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use tokio::sync::watch;
use tracing::{info, info_span, warn, Instrument};

/// Lifecycle state of a [`Node`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeState {
    /// Sockets bound and store open; not serving yet.
    Created,
    /// The event loop is running.
    Running,
    /// Stopped. A stopped node cannot be restarted.
    Stopped,
}

impl NodeState {
    /// Returns true if the event loop is running.
    #[must_use]
    pub fn is_running(&self) -> bool {
        matches!(self, Self::Running)
    }

    /// Returns true if the node has been stopped.
    #[must_use]
    pub fn is_stopped(&self) -> bool {
        matches!(self, Self::Stopped)
    }
}

/// One replica process: store, sockets and event loop thread.
///
/// # Example
///
/// ```rust,no_run
/// use shoplist_node::{Node, NodeConfig};
///
/// let mut node = Node::new(NodeConfig::new("n0", 0, 1))?;
/// node.start()?;
/// println!("serving clients on {}", node.client_addr());
/// node.stop()?;
/// # Ok::<(), shoplist_node::NodeError>(())
/// ```
pub struct Node {
    config: NodeConfig,
    info: NodeInfo,
    state: NodeState,
    running: Arc<AtomicBool>,
    shutdown: Option<watch::Sender<bool>>,
    thread: Option<JoinHandle<NodeResult<()>>>,
    pending: Option<(Listeners, ListStore)>,
}

impl Node {
    /// Validates `config`, opens the store and binds the three endpoints.
    ///
    /// # Errors
    ///
    /// Invalid configuration, a store that cannot be opened (including one
    /// locked by another process) or a port that cannot be bound.
    pub fn new(config: NodeConfig) -> NodeResult<Self> {
        config.validate()?;

        let store = match &config.db_path {
            Some(path) => ListStore::open(path)?,
            None => ListStore::in_memory(),
        };

        let listeners = Listeners {
            client: bind(&config.host, config.client_port)?,
            gossip: bind(&config.host, config.gossip_pull_port)?,
            discovery: bind(&config.host, config.discovery_pull_port)?,
        };

        let info = NodeInfo {
            node_id: config.node_id.clone(),
            host: config.host.clone(),
            shard_id: config.shard_id,
            client_port: listeners.client.local_addr()?.port(),
            gossip_pull_port: listeners.gossip.local_addr()?.port(),
            discovery_pull_port: listeners.discovery.local_addr()?.port(),
            last_seen_ts: now_millis(),
        };

        info!(
            node_id = %info.node_id,
            shard = info.shard_id,
            client = %info.client_addr(),
            gossip = %info.gossip_addr(),
            discovery = %info.discovery_addr(),
            "node created"
        );

        Ok(Self {
            config,
            info,
            state: NodeState::Created,
            running: Arc::new(AtomicBool::new(false)),
            shutdown: None,
            thread: None,
            pending: Some((listeners, store)),
        })
    }

    /// Spawns the event loop thread.
    ///
    /// # Errors
    ///
    /// [`NodeError::InvalidState`] unless the node is freshly created, or
    /// an I/O error if the thread cannot be spawned.
    pub fn start(&mut self) -> NodeResult<()> {
        if self.state != NodeState::Created {
            return Err(NodeError::InvalidState {
                state: self.state,
                operation: "start",
            });
        }
        let Some((listeners, store)) = self.pending.take() else {
            return Err(NodeError::InvalidState {
                state: self.state,
                operation: "start",
            });
        };

        let connector =
            TcpPeerConnector::new(self.config.push_queue_capacity, self.config.reconnect_delay);
        let replica = Replica::new(&self.config, self.info.clone(), store, connector);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let config = self.config.clone();
        let running = Arc::clone(&self.running);

        self.running.store(true, Ordering::Release);
        let spawned = thread::Builder::new()
            .name(format!("shoplist-{}", self.config.node_id))
            .spawn(move || -> NodeResult<()> {
                let runtime = tokio::runtime::Builder::new_current_thread()
                    .enable_all()
                    .build()?;
                let span = info_span!("node", node_id = %config.node_id, shard = config.shard_id);
                runtime.block_on(
                    event_loop::run(replica, listeners, config, shutdown_rx, running)
                        .instrument(span),
                )
            });

        match spawned {
            Ok(handle) => {
                self.thread = Some(handle);
                self.shutdown = Some(shutdown_tx);
                self.state = NodeState::Running;
                Ok(())
            }
            Err(e) => {
                self.running.store(false, Ordering::Release);
                self.state = NodeState::Stopped;
                Err(e.into())
            }
        }
    }

    /// Stops the event loop and waits for it to exit.
    ///
    /// Outbound links and sockets close with the loop. Stopping a node that
    /// never started releases its sockets and store; stopping twice is a
    /// no-op.
    ///
    /// # Errors
    ///
    /// An error the loop exited with, or [`NodeError::LoopPanicked`].
    pub fn stop(&mut self) -> NodeResult<()> {
        match self.state {
            NodeState::Stopped => Ok(()),
            NodeState::Created => {
                self.pending = None;
                self.state = NodeState::Stopped;
                Ok(())
            }
            NodeState::Running => {
                self.running.store(false, Ordering::Release);
                if let Some(tx) = self.shutdown.take() {
                    let _ = tx.send(true);
                }
                self.state = NodeState::Stopped;

                let result = match self.thread.take() {
                    Some(handle) => handle.join().unwrap_or(Err(NodeError::LoopPanicked)),
                    None => Ok(()),
                };
                info!(node_id = %self.info.node_id, "node stopped");
                result
            }
        }
    }

    /// Current lifecycle state.
    pub fn state(&self) -> NodeState {
        self.state
    }

    /// Returns true if the event loop is running.
    pub fn is_running(&self) -> bool {
        self.state.is_running()
    }

    /// Advertised membership entry, with the ports actually bound.
    pub fn info(&self) -> &NodeInfo {
        &self.info
    }

    /// Node id.
    pub fn id(&self) -> &str {
        &self.info.node_id
    }

    /// Shard owned by this node.
    pub fn shard_id(&self) -> u32 {
        self.info.shard_id
    }

    /// `host:port` of the client endpoint.
    pub fn client_addr(&self) -> String {
        self.info.client_addr()
    }

    /// The configuration the node was created with.
    pub fn config(&self) -> &NodeConfig {
        &self.config
    }
}

impl std::fmt::Debug for Node {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Node")
            .field("info", &self.info)
            .field("state", &self.state)
            .finish()
    }
}

impl Drop for Node {
    fn drop(&mut self) {
        if let Err(e) = self.stop() {
            warn!(node_id = %self.info.node_id, error = %e, "node did not stop cleanly");
        }
    }
}

fn bind(host: &str, port: u16) -> NodeResult<TcpListener> {
    let listener = TcpListener::bind((host, port))?;
    listener.set_nonblocking(true)?;
    Ok(listener)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn binds_ephemeral_ports() {
        let node = Node::new(NodeConfig::new("n0", 0, 1)).unwrap();
        let info = node.info();
        assert_ne!(info.client_port, 0);
        assert_ne!(info.gossip_pull_port, 0);
        assert_ne!(info.discovery_pull_port, 0);
        assert_eq!(node.state(), NodeState::Created);
    }

    #[test]
    fn lifecycle() {
        let mut node = Node::new(NodeConfig::new("n0", 0, 1)).unwrap();
        node.start().unwrap();
        assert!(node.is_running());

        let err = node.start().unwrap_err();
        assert!(matches!(
            err,
            NodeError::InvalidState {
                state: NodeState::Running,
                ..
            }
        ));

        node.stop().unwrap();
        assert!(node.state().is_stopped());
        node.stop().unwrap();

        assert!(matches!(
            node.start(),
            Err(NodeError::InvalidState {
                state: NodeState::Stopped,
                ..
            })
        ));
    }

    #[test]
    fn stop_before_start() {
        let mut node = Node::new(NodeConfig::new("n0", 0, 1)).unwrap();
        node.stop().unwrap();
        assert!(node.start().is_err());
    }

    #[test]
    fn invalid_config_is_rejected() {
        let err = Node::new(NodeConfig::new("n0", 3, 2)).unwrap_err();
        assert!(matches!(err, NodeError::InvalidConfig(_)));
    }

    #[test]
    fn port_in_use_is_an_error() {
        let first = Node::new(NodeConfig::new("a", 0, 1)).unwrap();
        let taken = first.info().client_port;
        let err = Node::new(NodeConfig::new("b", 0, 1).with_ports(taken, 0, 0)).unwrap_err();
        assert!(matches!(err, NodeError::Io(_)));
    }
}
