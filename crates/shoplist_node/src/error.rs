//! Error types for the replica node.

use crate::node::NodeState;
use std::io;
use thiserror::Error;

/// Result type for node operations.
pub type NodeResult<T> = Result<T, NodeError>;

/// Errors that can occur while configuring, starting or stopping a node.
///
/// Nothing that happens inside the running event loop surfaces here: bad
/// frames, storage failures on a request and unreachable peers are absorbed
/// there and reported to the caller of that request only.
#[derive(Debug, Error)]
pub enum NodeError {
    /// The configuration cannot be run.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// The operation is not allowed in the node's current state.
    #[error("cannot {operation} a node in state {state:?}")]
    InvalidState {
        /// State the node was in.
        state: NodeState,
        /// Rejected operation.
        operation: &'static str,
    },

    /// Opening the list store failed.
    #[error("storage error: {0}")]
    Storage(#[from] shoplist_storage::StorageError),

    /// Binding sockets or spawning the loop thread failed.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// The event loop thread panicked.
    #[error("event loop thread panicked")]
    LoopPanicked,
}

impl NodeError {
    /// Create an invalid configuration error.
    pub fn invalid_config(message: impl Into<String>) -> Self {
        Self::InvalidConfig(message.into())
    }
}
