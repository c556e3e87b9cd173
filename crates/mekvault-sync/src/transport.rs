//! Transport abstraction for the sync protocol.
//!
//! The transport delivers envelopes over an assumed reliable, ordered
//! channel per peer. What the channel actually is (WebRTC data channel,
//! WebSocket, a pair of test queues) is invisible to the protocol layer.

use async_trait::async_trait;

use crate::error::SyncError;
use crate::messages::{Envelope, PeerId};

/// Result type for transport operations.
pub type Result<T> = std::result::Result<T, SyncError>;

/// Transport trait for sending and receiving envelopes.
///
/// Implementations must be thread-safe (Send + Sync).
#[async_trait]
pub trait Transport: Send + Sync {
    /// Send an envelope to a specific peer.
    async fn send(&self, peer: &PeerId, envelope: Envelope) -> Result<()>;

    /// Receive the next envelope from any peer.
    ///
    /// Blocks until a message is available or an error occurs.
    async fn recv(&self) -> Result<(PeerId, Envelope)>;

    /// Receive with timeout.
    ///
    /// Returns None if the timeout expires before a message arrives.
    async fn recv_timeout(
        &self,
        timeout: std::time::Duration,
    ) -> Result<Option<(PeerId, Envelope)>>;

    /// Get the local peer's identity.
    fn local_peer_id(&self) -> PeerId;

    /// List peers the transport can currently reach.
    async fn reachable_peers(&self) -> Result<Vec<PeerId>>;

    /// Check whether a specific peer is reachable.
    async fn is_reachable(&self, peer: &PeerId) -> bool;
}

/// A simple in-memory transport for testing.
///
/// Uses channels to simulate message passing between peers.
pub mod memory {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Arc;
    use tokio::sync::{mpsc, RwLock};

    struct Routed {
        from: PeerId,
        envelope: Envelope,
    }

    /// Shared state for the memory transport network.
    pub struct MemoryNetwork {
        /// Sender channels for each peer.
        senders: RwLock<HashMap<PeerId, mpsc::Sender<Routed>>>,
    }

    impl MemoryNetwork {
        /// Create a new memory network.
        pub fn new() -> Arc<Self> {
            Arc::new(Self {
                senders: RwLock::new(HashMap::new()),
            })
        }

        /// Create a transport connected to this network.
        pub async fn create_transport(self: &Arc<Self>, peer_id: PeerId) -> MemoryTransport {
            let (tx, rx) = mpsc::channel(1000);

            self.senders.write().await.insert(peer_id.clone(), tx);

            MemoryTransport {
                peer_id,
                network: Arc::clone(self),
                receiver: RwLock::new(rx),
            }
        }

        /// Drop a peer from the network, making it unreachable.
        ///
        /// Simulates a peer going offline mid-session.
        pub async fn disconnect(&self, peer: &PeerId) {
            self.senders.write().await.remove(peer);
        }
    }

    /// In-memory transport implementation.
    pub struct MemoryTransport {
        peer_id: PeerId,
        network: Arc<MemoryNetwork>,
        receiver: RwLock<mpsc::Receiver<Routed>>,
    }

    #[async_trait]
    impl Transport for MemoryTransport {
        async fn send(&self, peer: &PeerId, envelope: Envelope) -> Result<()> {
            let senders = self.network.senders.read().await;
            let Some(sender) = senders.get(peer) else {
                return Err(SyncError::Transport(format!("peer {} not found", peer)));
            };
            sender
                .send(Routed {
                    from: self.peer_id.clone(),
                    envelope,
                })
                .await
                .map_err(|_| SyncError::Transport("peer disconnected".into()))
        }

        async fn recv(&self) -> Result<(PeerId, Envelope)> {
            let mut rx = self.receiver.write().await;
            match rx.recv().await {
                Some(routed) => Ok((routed.from, routed.envelope)),
                None => Err(SyncError::Transport("channel closed".into())),
            }
        }

        async fn recv_timeout(
            &self,
            timeout: std::time::Duration,
        ) -> Result<Option<(PeerId, Envelope)>> {
            let mut rx = self.receiver.write().await;
            match tokio::time::timeout(timeout, rx.recv()).await {
                Ok(Some(routed)) => Ok(Some((routed.from, routed.envelope))),
                Ok(None) => Err(SyncError::Transport("channel closed".into())),
                Err(_) => Ok(None), // Timeout
            }
        }

        fn local_peer_id(&self) -> PeerId {
            self.peer_id.clone()
        }

        async fn reachable_peers(&self) -> Result<Vec<PeerId>> {
            let senders = self.network.senders.read().await;
            Ok(senders
                .keys()
                .filter(|id| *id != &self.peer_id)
                .cloned()
                .collect())
        }

        async fn is_reachable(&self, peer: &PeerId) -> bool {
            let senders = self.network.senders.read().await;
            senders.contains_key(peer)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::memory::MemoryNetwork;
    use super::*;
    use crate::messages::SyncMessage;

    #[tokio::test]
    async fn test_memory_transport_send_recv() {
        let network = MemoryNetwork::new();

        let peer_a = PeerId::new("a");
        let peer_b = PeerId::new("b");

        let transport_a = network.create_transport(peer_a.clone()).await;
        let transport_b = network.create_transport(peer_b.clone()).await;

        let envelope = Envelope::new(peer_a.clone(), SyncMessage::Ping { timestamp: 1 });
        transport_a.send(&peer_b, envelope.clone()).await.unwrap();

        let (from, received) = transport_b.recv().await.unwrap();
        assert_eq!(from, peer_a);
        assert_eq!(received.message_id, envelope.message_id);
    }

    #[tokio::test]
    async fn test_send_to_unknown_peer_fails() {
        let network = MemoryNetwork::new();
        let transport = network.create_transport(PeerId::new("a")).await;

        let envelope = Envelope::new(PeerId::new("a"), SyncMessage::Ping { timestamp: 1 });
        let result = transport.send(&PeerId::new("ghost"), envelope).await;
        assert!(matches!(result, Err(SyncError::Transport(_))));
    }

    #[tokio::test]
    async fn test_recv_timeout_expires() {
        let network = MemoryNetwork::new();
        let transport = network.create_transport(PeerId::new("a")).await;

        let result = transport
            .recv_timeout(std::time::Duration::from_millis(10))
            .await
            .unwrap();
        assert!(result.is_none());
    }

    #[tokio::test]
    async fn test_disconnect_makes_unreachable() {
        let network = MemoryNetwork::new();
        let peer_b = PeerId::new("b");

        let transport_a = network.create_transport(PeerId::new("a")).await;
        let _transport_b = network.create_transport(peer_b.clone()).await;

        assert!(transport_a.is_reachable(&peer_b).await);
        network.disconnect(&peer_b).await;
        assert!(!transport_a.is_reachable(&peer_b).await);
    }
}
