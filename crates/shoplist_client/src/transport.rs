//! Request/reply transport to replica client endpoints.

use crate::config::ClientConfig;
use crate::error::{ClientError, ClientResult};
use parking_lot::Mutex;
use shoplist_protocol::{read_frame, write_frame, Message};
use std::net::{TcpStream, ToSocketAddrs};
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{debug, trace};

/// A transport sends one request to a replica and waits for its reply.
///
/// This trait abstracts the network layer, allowing for different
/// implementations (TCP, in-process, mock for testing).
pub trait ReplicaTransport: Send + Sync {
    /// Sends `message` to the client endpoint `endpoint` (`host:port`) and
    /// returns the reply.
    fn request(&self, endpoint: &str, message: &Message) -> ClientResult<Message>;

    /// Drops any open connection.
    fn close(&self);
}

struct Connection {
    endpoint: String,
    stream: TcpStream,
}

/// Blocking TCP transport.
///
/// All callers share one connection guarded by a mutex, so at most one
/// request is in flight per transport. Any failure tears the connection
/// down before the error is returned; the next request reconnects.
pub struct TcpReplicaTransport {
    config: ClientConfig,
    conn: Mutex<Option<Connection>>,
}

impl TcpReplicaTransport {
    /// Creates a transport. No connection is opened until the first request.
    pub fn new(config: ClientConfig) -> Self {
        Self {
            config,
            conn: Mutex::new(None),
        }
    }

    /// Returns true if a connection is currently open.
    pub fn is_connected(&self) -> bool {
        self.conn.lock().is_some()
    }

    fn connect(&self, endpoint: &str) -> ClientResult<TcpStream> {
        let addrs = endpoint
            .to_socket_addrs()
            .map_err(|e| ClientError::transport_fatal(format!("bad endpoint {endpoint}: {e}")))?;

        let mut last_err = None;
        for addr in addrs {
            match TcpStream::connect_timeout(&addr, self.config.connect_timeout) {
                Ok(stream) => {
                    stream.set_read_timeout(Some(self.config.timeout))?;
                    stream.set_write_timeout(Some(self.config.timeout))?;
                    stream.set_nodelay(true)?;
                    debug!(%endpoint, "connected to replica");
                    return Ok(stream);
                }
                Err(e) => last_err = Some(e),
            }
        }
        Err(match last_err {
            Some(e) => e.into(),
            None => ClientError::transport_fatal(format!("endpoint {endpoint} resolved to nothing")),
        })
    }
}

impl Default for TcpReplicaTransport {
    fn default() -> Self {
        Self::new(ClientConfig::default())
    }
}

impl std::fmt::Debug for TcpReplicaTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TcpReplicaTransport")
            .field("config", &self.config)
            .field("connected", &self.is_connected())
            .finish()
    }
}

impl ReplicaTransport for TcpReplicaTransport {
    fn request(&self, endpoint: &str, message: &Message) -> ClientResult<Message> {
        let mut guard = self.conn.lock();

        if guard.as_ref().is_some_and(|c| c.endpoint != endpoint) {
            *guard = None;
        }
        if guard.is_none() {
            let stream = self.connect(endpoint)?;
            *guard = Some(Connection {
                endpoint: endpoint.to_string(),
                stream,
            });
        }
        let Some(conn) = guard.as_mut() else {
            return Err(ClientError::transport_retryable("connection unavailable"));
        };

        let result = write_frame(&mut conn.stream, message)
            .and_then(|()| read_frame(&mut conn.stream));

        match result {
            Ok(Some(reply)) => {
                trace!(%endpoint, op = ?reply.op, "reply received");
                Ok(reply)
            }
            Ok(None) => {
                *guard = None;
                Err(ClientError::transport_retryable(format!(
                    "{endpoint} closed the connection"
                )))
            }
            Err(e) => {
                debug!(%endpoint, error = %e, "request failed, resetting connection");
                *guard = None;
                Err(e.into())
            }
        }
    }

    fn close(&self) {
        *self.conn.lock() = None;
    }
}

type Handler = Box<dyn Fn(&str, &Message) -> ClientResult<Message> + Send + Sync>;

/// A mock transport for testing.
///
/// Replies come from a handler closure; every request is recorded.
pub struct MockTransport {
    connected: AtomicBool,
    handler: Mutex<Option<Handler>>,
    requests: Mutex<Vec<(String, Message)>>,
}

impl MockTransport {
    /// Creates a new mock transport with no handler.
    pub fn new() -> Self {
        Self {
            connected: AtomicBool::new(true),
            handler: Mutex::new(None),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Sets the function that answers requests.
    pub fn set_handler<F>(&self, handler: F)
    where
        F: Fn(&str, &Message) -> ClientResult<Message> + Send + Sync + 'static,
    {
        *self.handler.lock() = Some(Box::new(handler));
    }

    /// Sets the connected state. A disconnected mock fails every request
    /// with a retryable transport error.
    pub fn set_connected(&self, connected: bool) {
        self.connected.store(connected, Ordering::SeqCst);
    }

    /// Returns true unless disconnected.
    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    /// Requests seen so far, with their endpoints.
    pub fn requests(&self) -> Vec<(String, Message)> {
        self.requests.lock().clone()
    }

    /// Number of requests seen so far.
    pub fn request_count(&self) -> usize {
        self.requests.lock().len()
    }
}

impl Default for MockTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for MockTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockTransport")
            .field("connected", &self.is_connected())
            .field("requests", &self.request_count())
            .finish()
    }
}

impl ReplicaTransport for MockTransport {
    fn request(&self, endpoint: &str, message: &Message) -> ClientResult<Message> {
        self.requests
            .lock()
            .push((endpoint.to_string(), message.clone()));
        if !self.is_connected() {
            return Err(ClientError::transport_retryable("mock disconnected"));
        }
        match self.handler.lock().as_ref() {
            Some(handler) => handler(endpoint, message),
            None => Err(ClientError::Protocol("no mock handler set".into())),
        }
    }

    fn close(&self) {
        self.connected.store(false, Ordering::SeqCst);
    }
}
