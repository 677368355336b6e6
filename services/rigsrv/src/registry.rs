//! Device connection registry
//!
//! Devices connect to the gateway over plain TCP. Each connection is keyed by
//! the peer IP (no port), which is also the device identity used by the
//! router. One task per connection reads inbound chunks in arrival order and
//! drains an outbound queue, so a peer's frames are never reordered.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use rig_protocol::{classify, decode_hex, to_hex};
use serde::Serialize;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::error::{Result, RigError};
use crate::router::DeviceRouter;

const READ_BUFFER_SIZE: usize = 1024;
const WRITE_QUEUE_SIZE: usize = 64;

/// Outbound side of the registry, as seen by the motor service and machines
#[async_trait]
pub trait FrameSink: Send + Sync {
    /// Send to the live connection of `peer`. With `as_hex` the payload is hex
    /// text decoded to raw bytes first; otherwise its UTF-8 bytes are sent.
    async fn send_to(&self, peer: &str, payload: &str, as_hex: bool) -> Result<()>;
}

struct ConnectionHandle {
    id: u64,
    remote_addr: SocketAddr,
    connected_at: DateTime<Utc>,
    tx: mpsc::Sender<Bytes>,
}

/// Snapshot of one live connection
#[derive(Debug, Clone, Serialize)]
pub struct PeerInfo {
    pub peer: String,
    pub remote_addr: String,
    pub connected_at: DateTime<Utc>,
}

pub struct ConnectionRegistry {
    connections: DashMap<String, ConnectionHandle>,
    router: Arc<DeviceRouter>,
    next_id: AtomicU64,
}

impl ConnectionRegistry {
    pub fn new(router: Arc<DeviceRouter>) -> Self {
        Self {
            connections: DashMap::new(),
            router,
            next_id: AtomicU64::new(1),
        }
    }

    /// Accept loop; returns when `cancel` fires
    pub async fn serve(self: Arc<Self>, listener: TcpListener, cancel: CancellationToken) {
        if let Ok(addr) = listener.local_addr() {
            info!("Device listener on {}", addr);
        }

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                accepted = listener.accept() => match accepted {
                    Ok((stream, addr)) => {
                        self.accept(stream, addr, cancel.child_token());
                    },
                    Err(e) => error!("Device accept: {}", e),
                },
            }
        }

        info!("Device listener stopped");
    }

    /// Register a new connection under its peer IP and spawn its task.
    ///
    /// A reconnecting device replaces its previous entry; the old connection
    /// task ends once its outbound queue is dropped.
    pub fn accept(
        self: &Arc<Self>,
        stream: TcpStream,
        remote_addr: SocketAddr,
        cancel: CancellationToken,
    ) -> String {
        let peer = remote_addr.ip().to_string();
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = mpsc::channel(WRITE_QUEUE_SIZE);

        let handle = ConnectionHandle {
            id,
            remote_addr,
            connected_at: Utc::now(),
            tx,
        };
        if let Some(old) = self.connections.insert(peer.clone(), handle) {
            warn!("Device {} reconnected, replacing #{}", peer, old.id);
        }
        info!("Device connected: {} (#{})", remote_addr, id);

        let registry = Arc::clone(self);
        let task_peer = peer.clone();
        tokio::spawn(async move {
            registry
                .run_connection(stream, &task_peer, id, rx, cancel)
                .await;
            registry.remove(&task_peer, id);
        });

        peer
    }

    async fn run_connection(
        &self,
        stream: TcpStream,
        peer: &str,
        id: u64,
        mut rx: mpsc::Receiver<Bytes>,
        cancel: CancellationToken,
    ) {
        let (mut reader, mut writer) = stream.into_split();
        let mut buf = vec![0u8; READ_BUFFER_SIZE];

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                outbound = rx.recv() => match outbound {
                    Some(bytes) => {
                        if let Err(e) = writer.write_all(&bytes).await {
                            error!("Device {} write: {}", peer, e);
                            break;
                        }
                    },
                    // Replaced by a newer connection
                    None => break,
                },
                read = reader.read(&mut buf) => match read {
                    Ok(0) => {
                        info!("Device disconnected: {} (#{})", peer, id);
                        break;
                    },
                    Ok(n) => self.on_receive(peer, &buf[..n]),
                    Err(e) => {
                        warn!("Device {} read: {}", peer, e);
                        break;
                    },
                },
            }
        }
    }

    /// Classify one inbound chunk and hand it to the router
    pub fn on_receive(&self, peer: &str, data: &[u8]) {
        let hex = to_hex(data);
        let kind = classify(&hex);
        let content = if kind.is_hex() {
            hex
        } else {
            String::from_utf8_lossy(data).into_owned()
        };
        debug!("Device {} rx: {}", peer, content);

        if let Err(e) = self.router.route(peer, kind.is_hex(), &content) {
            error!("Device {} frame dropped: {}", peer, e);
        }
    }

    /// Drop the entry for `peer` if it still belongs to connection `id`.
    ///
    /// Called when a connection task ends. A device that already reconnected
    /// keeps its newer entry.
    pub fn remove(&self, peer: &str, id: u64) -> bool {
        let removed = self
            .connections
            .remove_if(peer, |_, handle| handle.id == id)
            .is_some();
        if removed {
            debug!("Device {} (#{}) removed", peer, id);
        }
        removed
    }

    pub fn is_connected(&self, peer: &str) -> bool {
        self.connections.contains_key(peer)
    }

    pub fn peers(&self) -> Vec<PeerInfo> {
        let mut peers: Vec<PeerInfo> = self
            .connections
            .iter()
            .map(|entry| PeerInfo {
                peer: entry.key().clone(),
                remote_addr: entry.value().remote_addr.to_string(),
                connected_at: entry.value().connected_at,
            })
            .collect();
        peers.sort_by(|a, b| a.peer.cmp(&b.peer));
        peers
    }

    /// Send to every live connection, returning how many accepted the frame
    pub async fn broadcast(&self, payload: &str, as_hex: bool) -> Result<usize> {
        let bytes = encode_payload(payload, as_hex)?;
        let targets: Vec<(String, mpsc::Sender<Bytes>)> = self
            .connections
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().tx.clone()))
            .collect();

        let mut delivered = 0;
        for (peer, tx) in targets {
            match tx.send(bytes.clone()).await {
                Ok(()) => delivered += 1,
                Err(_) => warn!("Broadcast to {} failed: connection closed", peer),
            }
        }
        Ok(delivered)
    }
}

fn encode_payload(payload: &str, as_hex: bool) -> Result<Bytes> {
    if as_hex {
        Ok(Bytes::from(decode_hex(payload)?))
    } else {
        Ok(Bytes::copy_from_slice(payload.as_bytes()))
    }
}

#[async_trait]
impl FrameSink for ConnectionRegistry {
    async fn send_to(&self, peer: &str, payload: &str, as_hex: bool) -> Result<()> {
        let bytes = encode_payload(payload, as_hex)?;
        let tx = match self.connections.get(peer) {
            Some(handle) => handle.tx.clone(),
            None => {
                error!("No connection for {}, dropped: {}", peer, payload);
                return Err(RigError::NoSuchConnection(peer.to_string()));
            },
        };

        tx.send(bytes).await.map_err(|_| {
            error!("Connection to {} closed, dropped: {}", peer, payload);
            RigError::NoSuchConnection(peer.to_string())
        })
    }
}
