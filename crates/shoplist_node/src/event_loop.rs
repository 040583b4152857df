//! The replica's single-threaded event loop.
//!
//! Socket tasks only decode and forward; every state change happens on the
//! loop task, one event at a time, so the replica needs no locking.

use crate::config::NodeConfig;
use crate::error::NodeResult;
use crate::peers::TcpPeerConnector;
use crate::replica::{duration_millis, Replica};
use rand::Rng;
use shoplist_crdt::now_millis;
use shoplist_protocol::{read_frame_async, write_frame_async, Message, ProtocolError};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, oneshot, watch};
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info, trace, warn};

const INBOUND_QUEUE: usize = 256;
const ACCEPT_BACKOFF: Duration = Duration::from_millis(50);

/// Bound but not yet serving sockets.
pub(crate) struct Listeners {
    pub client: std::net::TcpListener,
    pub gossip: std::net::TcpListener,
    pub discovery: std::net::TcpListener,
}

struct ClientRequest {
    message: Message,
    reply: oneshot::Sender<Message>,
}

/// Random interval in `[interval - interval/3, interval + interval/3]`.
pub(crate) fn jittered(interval: Duration) -> Duration {
    let base = i64::try_from(duration_millis(interval)).unwrap_or(i64::MAX);
    let spread = base / 3;
    if spread == 0 {
        return interval;
    }
    let offset = rand::thread_rng().gen_range(-spread..=spread);
    Duration::from_millis(u64::try_from((base + offset).max(1)).unwrap_or(1))
}

pub(crate) async fn run(
    mut replica: Replica<TcpPeerConnector>,
    listeners: Listeners,
    config: NodeConfig,
    mut shutdown: watch::Receiver<bool>,
    running: Arc<AtomicBool>,
) -> NodeResult<()> {
    let (client_tx, mut client_rx) = mpsc::channel(INBOUND_QUEUE);
    let (gossip_tx, mut gossip_rx) = mpsc::channel(INBOUND_QUEUE);
    let (discovery_tx, mut discovery_rx) = mpsc::channel(INBOUND_QUEUE);

    tokio::spawn(accept_clients(
        TcpListener::from_std(listeners.client)?,
        client_tx,
        config.node_id.clone(),
    ));
    tokio::spawn(accept_pushes(
        TcpListener::from_std(listeners.gossip)?,
        gossip_tx,
        "gossip",
    ));
    tokio::spawn(accept_pushes(
        TcpListener::from_std(listeners.discovery)?,
        discovery_tx,
        "discovery",
    ));

    replica.bootstrap(&config.initial_peers, now_millis());

    let mut gossip_at = Instant::now() + jittered(config.gossip_interval);
    let mut discovery_at = Instant::now() + jittered(config.discovery_interval);
    let mut poll = tokio::time::interval(config.poll_interval);
    poll.set_missed_tick_behavior(MissedTickBehavior::Delay);

    info!("event loop started");

    loop {
        tokio::select! {
            biased;

            _ = shutdown.changed() => break,

            Some(request) = client_rx.recv() => {
                let reply = replica.handle_client(request.message, now_millis());
                let _ = request.reply.send(reply);
            }

            Some(msg) = gossip_rx.recv() => {
                let merged = replica.handle_shard_gossip(&msg);
                trace!(from = %msg.origin, merged, "applied shard gossip");
            }

            Some(msg) = discovery_rx.recv() => {
                replica.handle_discovery(&msg);
            }

            _ = tokio::time::sleep_until(gossip_at) => {
                let peers = replica.shard_gossip_tick(now_millis());
                trace!(peers, "shard gossip round");
                gossip_at = Instant::now() + jittered(config.gossip_interval);
            }

            _ = tokio::time::sleep_until(discovery_at) => {
                let evicted = replica.discovery_tick(now_millis());
                if !evicted.is_empty() {
                    debug!(?evicted, "discovery round evicted nodes");
                }
                discovery_at = Instant::now() + jittered(config.discovery_interval);
            }

            _ = poll.tick() => {
                if !running.load(Ordering::Acquire) {
                    break;
                }
            }
        }
    }

    info!("event loop stopped");
    Ok(())
}

async fn accept_clients(listener: TcpListener, tx: mpsc::Sender<ClientRequest>, origin: String) {
    loop {
        match listener.accept().await {
            Ok((stream, peer)) => {
                tokio::spawn(serve_client(stream, peer, tx.clone(), origin.clone()));
            }
            Err(e) => {
                warn!(error = %e, "client accept failed");
                tokio::time::sleep(ACCEPT_BACKOFF).await;
            }
        }
    }
}

async fn serve_client(
    mut stream: TcpStream,
    peer: SocketAddr,
    tx: mpsc::Sender<ClientRequest>,
    origin: String,
) {
    let _ = stream.set_nodelay(true);
    loop {
        let message = match read_frame_async(&mut stream).await {
            Ok(Some(msg)) => msg,
            Ok(None) => return,
            // The frame boundary is intact, so the connection stays usable
            Err(ProtocolError::Codec(e)) => {
                debug!(%peer, error = %e, "malformed client request");
                let reply = Message::error_response(
                    &origin,
                    now_millis(),
                    format!("malformed request: {e}"),
                );
                if write_frame_async(&mut stream, &reply).await.is_err() {
                    return;
                }
                continue;
            }
            Err(e) => {
                debug!(%peer, error = %e, "closing client connection");
                return;
            }
        };

        let (reply_tx, reply_rx) = oneshot::channel();
        let request = ClientRequest {
            message,
            reply: reply_tx,
        };
        if tx.send(request).await.is_err() {
            return;
        }
        let Ok(reply) = reply_rx.await else {
            return;
        };
        if let Err(e) = write_frame_async(&mut stream, &reply).await {
            debug!(%peer, error = %e, "failed to write reply");
            return;
        }
    }
}

async fn accept_pushes(listener: TcpListener, tx: mpsc::Sender<Message>, endpoint: &'static str) {
    loop {
        match listener.accept().await {
            Ok((stream, peer)) => {
                tokio::spawn(read_pushes(stream, peer, tx.clone(), endpoint));
            }
            Err(e) => {
                warn!(endpoint, error = %e, "accept failed");
                tokio::time::sleep(ACCEPT_BACKOFF).await;
            }
        }
    }
}

async fn read_pushes(
    mut stream: TcpStream,
    peer: SocketAddr,
    tx: mpsc::Sender<Message>,
    endpoint: &'static str,
) {
    loop {
        match read_frame_async(&mut stream).await {
            Ok(Some(msg)) => {
                if tx.send(msg).await.is_err() {
                    return;
                }
            }
            Ok(None) => return,
            Err(ProtocolError::Codec(e)) => {
                debug!(endpoint, %peer, error = %e, "dropping malformed push");
            }
            Err(e) => {
                debug!(endpoint, %peer, error = %e, "closing push connection");
                return;
            }
        }
    }
}
