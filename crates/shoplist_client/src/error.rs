//! Error types for the client.

use shoplist_protocol::ProtocolError;
use std::io;
use thiserror::Error;

/// Result type for client operations.
pub type ClientResult<T> = Result<T, ClientError>;

/// Errors that can occur while talking to replicas.
#[derive(Error, Debug)]
pub enum ClientError {
    /// Network or transport error.
    #[error("transport error: {message}")]
    Transport {
        /// Error message.
        message: String,
        /// Whether the operation can be retried.
        retryable: bool,
    },

    /// A replica did not answer in time.
    #[error("operation timed out")]
    Timeout,

    /// The replica does not own the list's shard.
    #[error("wrong shard for list {list}: {detail}")]
    WrongShard {
        /// Uid of the addressed list.
        list: String,
        /// Reason reported by the replica.
        detail: String,
    },

    /// No replica of the shard is known.
    #[error("no replica known for shard {shard}")]
    NoReplica {
        /// Shard that has no known replica.
        shard: u32,
    },

    /// None of the seed endpoints answered a membership query.
    #[error("no seed endpoint reachable")]
    SeedsUnreachable,

    /// The replica reported a failure serving the request.
    #[error("server error: {0}")]
    ServerError(String),

    /// The list does not exist on the replica or in the local cache.
    #[error("list {0} not found")]
    ListNotFound(String),

    /// The reply did not fit the request.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// A local precondition failed.
    #[error(transparent)]
    Model(#[from] shoplist_model::ModelError),

    /// The local cache failed.
    #[error("cache error: {0}")]
    Cache(#[from] shoplist_storage::StorageError),
}

impl ClientError {
    /// Creates a retryable transport error.
    pub fn transport_retryable(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
            retryable: true,
        }
    }

    /// Creates a non-retryable transport error.
    pub fn transport_fatal(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
            retryable: false,
        }
    }

    /// Returns true if this error can be retried.
    pub fn is_retryable(&self) -> bool {
        match self {
            ClientError::Transport { retryable, .. } => *retryable,
            ClientError::Timeout => true,
            ClientError::WrongShard { .. } => true,
            ClientError::NoReplica { .. } => true,
            ClientError::SeedsUnreachable => true,
            ClientError::ServerError(_) => true,
            _ => false,
        }
    }

    /// Returns true if the error means the list or item does not exist.
    pub fn is_not_found(&self) -> bool {
        match self {
            ClientError::ListNotFound(_) => true,
            ClientError::Model(e) => e.is_not_found(),
            _ => false,
        }
    }
}

impl From<io::Error> for ClientError {
    fn from(err: io::Error) -> Self {
        match err.kind() {
            io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut => ClientError::Timeout,
            _ => ClientError::transport_retryable(err.to_string()),
        }
    }
}

impl From<ProtocolError> for ClientError {
    fn from(err: ProtocolError) -> Self {
        match err {
            ProtocolError::Io(e) => e.into(),
            ProtocolError::Truncated => {
                ClientError::transport_retryable("connection closed mid-frame")
            }
            other @ ProtocolError::FrameTooLarge { .. } => {
                ClientError::transport_fatal(other.to_string())
            }
            other => ClientError::Protocol(other.to_string()),
        }
    }
}
