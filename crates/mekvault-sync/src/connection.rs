//! Per-peer connection bookkeeping.
//!
//! The connection table is session-local state, never persisted. After a
//! process restart every peer starts over from `Idle`; durable delivery is
//! the offline queue's job, not this table's.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock};

use tokio::task::JoinHandle;
use tracing::debug;

use mekvault_core::now_millis;

use crate::messages::PeerId;

/// Lifecycle of a peer connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Idle,
    Connecting,
    Connected,
    Disconnected,
}

/// Lifecycle of the data channel riding on a connection.
///
/// Tracked separately because the channel can lag the connection: a peer
/// can be `Connected` while its channel is still `Connecting`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataChannelState {
    Connecting,
    Open,
    Closed,
}

/// Bookkeeping for one peer connection.
#[derive(Debug, Clone)]
pub struct PeerConnection {
    pub peer_id: PeerId,
    pub state: ConnectionState,
    pub data_channel: DataChannelState,
    /// When the connection last reached `Connected` (Unix ms).
    pub connected_at: Option<i64>,
    /// Most recent round-trip time from ping/pong, in ms.
    pub rtt_ms: Option<i64>,
    pub bytes_sent: u64,
    pub bytes_received: u64,
}

impl PeerConnection {
    fn new(peer_id: PeerId) -> Self {
        Self {
            peer_id,
            state: ConnectionState::Idle,
            data_channel: DataChannelState::Connecting,
            connected_at: None,
            rtt_ms: None,
            bytes_sent: 0,
            bytes_received: 0,
        }
    }
}

/// Callback invoked when a peer's connection state changes.
pub type StateChangeCallback = Box<dyn Fn(&PeerId, ConnectionState) + Send + Sync>;

/// Session-local table of peer connections.
///
/// Thread-safe; cheap to share via `Arc`. Ping loop handles are owned here
/// so a disconnect always tears the loop down with the state change.
pub struct ConnectionTable {
    connections: RwLock<HashMap<PeerId, PeerConnection>>,
    callbacks: RwLock<Vec<StateChangeCallback>>,
    ping_tasks: Mutex<HashMap<PeerId, JoinHandle<()>>>,
}

impl ConnectionTable {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            connections: RwLock::new(HashMap::new()),
            callbacks: RwLock::new(Vec::new()),
            ping_tasks: Mutex::new(HashMap::new()),
        })
    }

    /// Register a callback for connection state changes.
    pub fn on_state_change(&self, callback: StateChangeCallback) {
        self.callbacks.write().unwrap().push(callback);
    }

    fn notify(&self, peer: &PeerId, state: ConnectionState) {
        for callback in self.callbacks.read().unwrap().iter() {
            callback(peer, state);
        }
    }

    /// Transition a peer's connection state, creating the entry if needed.
    pub fn set_state(&self, peer: &PeerId, state: ConnectionState) {
        {
            let mut connections = self.connections.write().unwrap();
            let entry = connections
                .entry(peer.clone())
                .or_insert_with(|| PeerConnection::new(peer.clone()));
            if entry.state == state {
                return;
            }
            entry.state = state;
            if state == ConnectionState::Connected {
                entry.connected_at = Some(now_millis());
            }
        }
        debug!(peer = %peer, ?state, "connection state changed");
        self.notify(peer, state);

        if state == ConnectionState::Disconnected {
            self.stop_ping_task(peer);
        }
    }

    /// Transition a peer's data channel state.
    pub fn set_data_channel(&self, peer: &PeerId, state: DataChannelState) {
        let mut connections = self.connections.write().unwrap();
        let entry = connections
            .entry(peer.clone())
            .or_insert_with(|| PeerConnection::new(peer.clone()));
        entry.data_channel = state;
    }

    /// A peer counts as connected only when the connection is `Connected`
    /// AND its data channel is `Open`.
    pub fn is_connected(&self, peer: &PeerId) -> bool {
        self.connections
            .read()
            .unwrap()
            .get(peer)
            .map(|c| {
                c.state == ConnectionState::Connected && c.data_channel == DataChannelState::Open
            })
            .unwrap_or(false)
    }

    /// Snapshot of one peer's connection, if tracked.
    pub fn get(&self, peer: &PeerId) -> Option<PeerConnection> {
        self.connections.read().unwrap().get(peer).cloned()
    }

    /// Peers currently passing [`is_connected`](Self::is_connected).
    pub fn connected_peers(&self) -> Vec<PeerId> {
        self.connections
            .read()
            .unwrap()
            .values()
            .filter(|c| {
                c.state == ConnectionState::Connected && c.data_channel == DataChannelState::Open
            })
            .map(|c| c.peer_id.clone())
            .collect()
    }

    /// Record a measured round-trip time.
    pub fn record_rtt(&self, peer: &PeerId, rtt_ms: i64) {
        if let Some(c) = self.connections.write().unwrap().get_mut(peer) {
            c.rtt_ms = Some(rtt_ms);
        }
    }

    pub fn add_bytes_sent(&self, peer: &PeerId, bytes: u64) {
        if let Some(c) = self.connections.write().unwrap().get_mut(peer) {
            c.bytes_sent += bytes;
        }
    }

    pub fn add_bytes_received(&self, peer: &PeerId, bytes: u64) {
        if let Some(c) = self.connections.write().unwrap().get_mut(peer) {
            c.bytes_received += bytes;
        }
    }

    /// Attach a ping loop to a peer, replacing (and aborting) any previous
    /// one. The table aborts it on disconnect.
    pub fn set_ping_task(&self, peer: &PeerId, handle: JoinHandle<()>) {
        let mut tasks = self.ping_tasks.lock().unwrap();
        if let Some(previous) = tasks.insert(peer.clone(), handle) {
            previous.abort();
        }
    }

    /// Abort and drop a peer's ping loop, if any.
    pub fn stop_ping_task(&self, peer: &PeerId) {
        if let Some(handle) = self.ping_tasks.lock().unwrap().remove(peer) {
            handle.abort();
        }
    }
}

impl Drop for ConnectionTable {
    fn drop(&mut self) {
        for (_, handle) in self.ping_tasks.lock().unwrap().drain() {
            handle.abort();
        }
    }
}
