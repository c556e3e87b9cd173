//! Store-and-forward queue for offline peers.
//!
//! Messages for unreachable peers are persisted and drained later, once the
//! peer's connection and data channel are both up. Status transitions live
//! in the store as conditional single-statement updates; this module owns
//! the flush policy and the background timers.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{debug, warn};

use mekvault_core::now_millis;
use mekvault_store::{NewQueuedMessage, QueuedMessage, Store};

use crate::connection::ConnectionTable;
use crate::error::Result;
use crate::messages::{Envelope, PeerId};
use crate::transport::Transport;

/// Delivery attempts before a message goes to `failed`.
pub const MAX_ATTEMPTS: u32 = 5;

/// Default message TTL: 7 days.
pub const DEFAULT_TTL_MS: i64 = 7 * 24 * 60 * 60 * 1000;

/// Tuning for the offline queue.
#[derive(Debug, Clone)]
pub struct QueueConfig {
    /// How long an undelivered message stays eligible.
    pub ttl_ms: i64,
    /// Delivery attempts before giving up.
    pub max_attempts: u32,
    /// Background flush period.
    pub flush_interval: Duration,
    /// Background expiry/cleanup period.
    pub cleanup_interval: Duration,
    /// How long terminal (sent/expired) rows are kept before deletion.
    pub cleanup_grace_ms: i64,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            ttl_ms: DEFAULT_TTL_MS,
            max_attempts: MAX_ATTEMPTS,
            flush_interval: Duration::from_secs(30),
            cleanup_interval: Duration::from_secs(300),
            cleanup_grace_ms: 24 * 60 * 60 * 1000,
        }
    }
}

/// Outcome of flushing one peer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FlushReport {
    pub sent: usize,
    pub failed: usize,
}

/// Handles for the background flush and cleanup loops.
///
/// The two timers start and stop as a pair.
pub struct QueueTimers {
    flush: JoinHandle<()>,
    cleanup: JoinHandle<()>,
}

impl QueueTimers {
    /// Stop both loops.
    pub fn stop(self) {
        self.flush.abort();
        self.cleanup.abort();
    }
}

impl Drop for QueueTimers {
    fn drop(&mut self) {
        self.flush.abort();
        self.cleanup.abort();
    }
}

/// The store-and-forward queue.
pub struct OfflineQueue<S: Store, T: Transport> {
    store: Arc<S>,
    transport: Arc<T>,
    connections: Arc<ConnectionTable>,
    config: QueueConfig,
}

impl<S: Store + 'static, T: Transport + 'static> OfflineQueue<S, T> {
    pub fn new(store: Arc<S>, transport: Arc<T>, connections: Arc<ConnectionTable>) -> Self {
        Self::with_config(store, transport, connections, QueueConfig::default())
    }

    pub fn with_config(
        store: Arc<S>,
        transport: Arc<T>,
        connections: Arc<ConnectionTable>,
        config: QueueConfig,
    ) -> Self {
        Self {
            store,
            transport,
            connections,
            config,
        }
    }

    /// Queue an envelope for later delivery to a peer.
    ///
    /// The TTL clock starts now; priority only affects drain order.
    pub async fn enqueue(
        &self,
        peer: &PeerId,
        envelope: &Envelope,
        priority: i32,
    ) -> Result<QueuedMessage> {
        let payload = envelope.to_json()?;
        let message = self
            .store
            .enqueue_message(NewQueuedMessage {
                target_peer_id: peer.0.clone(),
                message_type: envelope.message.type_str().to_string(),
                payload,
                expires_at: now_millis() + self.config.ttl_ms,
                priority,
            })
            .await?;
        debug!(peer = %peer, message_id = %message.id, priority, "message queued");
        Ok(message)
    }

    /// Flush pending messages for one peer.
    ///
    /// Sweeps expired messages first. Delivery only proceeds when the peer
    /// is connected with an open data channel; otherwise the messages stay
    /// pending and the report is empty.
    pub async fn flush_peer(&self, peer: &PeerId) -> Result<FlushReport> {
        self.store.expire_messages(now_millis()).await?;

        if !self.connections.is_connected(peer) {
            return Ok(FlushReport::default());
        }

        let mut report = FlushReport::default();
        // Ordered priority DESC, queued_at ASC by the store.
        for message in self.store.get_pending_for_peer(peer.as_str()).await? {
            // Another flusher may have claimed it between the read and here.
            if !self.store.mark_sending(&message.id).await? {
                continue;
            }

            match self.deliver(peer, &message).await {
                Ok(()) => {
                    self.store.mark_sent(&message.id).await?;
                    self.connections.add_bytes_sent(peer, message.size_bytes);
                    report.sent += 1;
                }
                Err(e) => {
                    warn!(peer = %peer, message_id = %message.id, error = %e, "delivery failed");
                    self.store
                        .mark_failed(&message.id, self.config.max_attempts)
                        .await?;
                    report.failed += 1;
                }
            }
        }

        if report.sent > 0 || report.failed > 0 {
            debug!(peer = %peer, sent = report.sent, failed = report.failed, "flush complete");
        }
        Ok(report)
    }

    async fn deliver(&self, peer: &PeerId, message: &QueuedMessage) -> Result<()> {
        let envelope = Envelope::from_json(&message.payload)?;
        self.transport.send(peer, envelope).await
    }

    /// Flush every peer with pending work.
    ///
    /// Peers are flushed independently; one peer's failure never blocks
    /// the others.
    pub async fn flush_all(&self) -> Result<Vec<(PeerId, FlushReport)>> {
        let mut reports = Vec::new();
        for peer_id in self.store.peers_with_pending().await? {
            let peer = PeerId::new(peer_id);
            match self.flush_peer(&peer).await {
                Ok(report) => reports.push((peer, report)),
                Err(e) => {
                    warn!(peer = %peer, error = %e, "flush failed for peer");
                    reports.push((peer, FlushReport::default()));
                }
            }
        }
        Ok(reports)
    }

    /// Expire overdue messages and delete terminal rows past the grace
    /// period. Returns (expired, deleted).
    pub async fn cleanup(&self) -> Result<(usize, usize)> {
        let now = now_millis();
        let expired = self.store.expire_messages(now).await?;
        let deleted = self
            .store
            .cleanup_messages(now - self.config.cleanup_grace_ms)
            .await?;
        if expired > 0 || deleted > 0 {
            debug!(expired, deleted, "queue cleanup");
        }
        Ok((expired, deleted))
    }

    /// Start the background flush and cleanup loops.
    pub fn start_timers(self: &Arc<Self>) -> QueueTimers {
        let queue = Arc::clone(self);
        let flush = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(queue.config.flush_interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                ticker.tick().await;
                if let Err(e) = queue.flush_all().await {
                    warn!(error = %e, "background flush failed");
                }
            }
        });

        let queue = Arc::clone(self);
        let cleanup = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(queue.config.cleanup_interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                ticker.tick().await;
                if let Err(e) = queue.cleanup().await {
                    warn!(error = %e, "background cleanup failed");
                }
            }
        });

        QueueTimers { flush, cleanup }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::{ConnectionState, DataChannelState};
    use crate::messages::SyncMessage;
    use crate::transport::memory::MemoryNetwork;
    use crate::transport::Transport as _;
    use mekvault_store::{MemoryStore, QueueStatus};

    struct Setup {
        queue: Arc<OfflineQueue<MemoryStore, crate::transport::memory::MemoryTransport>>,
        network: Arc<MemoryNetwork>,
        connections: Arc<ConnectionTable>,
        store: Arc<MemoryStore>,
    }

    async fn setup() -> Setup {
        let network = MemoryNetwork::new();
        let transport = Arc::new(network.create_transport(PeerId::new("local")).await);
        let store = Arc::new(MemoryStore::new());
        let connections = ConnectionTable::new();
        let queue = Arc::new(OfflineQueue::new(
            store.clone(),
            transport,
            connections.clone(),
        ));
        Setup {
            queue,
            network,
            connections,
            store,
        }
    }

    fn mark_connected(connections: &ConnectionTable, peer: &PeerId) {
        connections.set_state(peer, ConnectionState::Connected);
        connections.set_data_channel(peer, DataChannelState::Open);
    }

    fn ping_envelope() -> Envelope {
        Envelope::new(PeerId::new("local"), SyncMessage::Ping { timestamp: 1 })
    }

    #[tokio::test]
    async fn test_no_delivery_while_disconnected() {
        let s = setup().await;
        let peer = PeerId::new("p1");

        s.queue.enqueue(&peer, &ping_envelope(), 0).await.unwrap();
        let report = s.queue.flush_peer(&peer).await.unwrap();
        assert_eq!(report, FlushReport::default());

        // Still pending for when the peer comes back
        assert_eq!(s.store.get_pending_for_peer("p1").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_flush_delivers_in_priority_order() {
        let s = setup().await;
        let peer = PeerId::new("p1");
        let peer_transport = s.network.create_transport(peer.clone()).await;
        mark_connected(&s.connections, &peer);

        for priority in [1, 5, 1] {
            s.queue
                .enqueue(&peer, &ping_envelope(), priority)
                .await
                .unwrap();
        }

        let report = s.queue.flush_peer(&peer).await.unwrap();
        assert_eq!(report.sent, 3);
        assert_eq!(report.failed, 0);

        // All three arrive; the high-priority one first
        let mut received = Vec::new();
        for _ in 0..3 {
            let (_, envelope) = peer_transport.recv().await.unwrap();
            received.push(envelope);
        }
        assert_eq!(received.len(), 3);
        assert!(s.store.get_pending_for_peer("p1").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_unreachable_peer_counts_failures() {
        let s = setup().await;
        let peer = PeerId::new("p1");
        // Connected per the table, but the transport cannot reach it
        mark_connected(&s.connections, &peer);

        let queued = s.queue.enqueue(&peer, &ping_envelope(), 0).await.unwrap();

        for attempt in 1..=MAX_ATTEMPTS {
            let report = s.queue.flush_peer(&peer).await.unwrap();
            assert_eq!(report.failed, 1);

            let message = s.store.get_message(&queued.id).await.unwrap().unwrap();
            assert_eq!(message.attempts, attempt);
            if attempt < MAX_ATTEMPTS {
                assert_eq!(message.status, QueueStatus::Pending);
            } else {
                assert_eq!(message.status, QueueStatus::Failed);
            }
        }

        // Failed is terminal for flushing
        let report = s.queue.flush_peer(&peer).await.unwrap();
        assert_eq!(report, FlushReport::default());
    }

    #[tokio::test]
    async fn test_flush_all_isolates_peers() {
        let s = setup().await;
        let reachable = PeerId::new("up");
        let unreachable = PeerId::new("down");

        let _up_transport = s.network.create_transport(reachable.clone()).await;
        mark_connected(&s.connections, &reachable);
        mark_connected(&s.connections, &unreachable);

        s.queue
            .enqueue(&reachable, &ping_envelope(), 0)
            .await
            .unwrap();
        s.queue
            .enqueue(&unreachable, &ping_envelope(), 0)
            .await
            .unwrap();

        let reports = s.queue.flush_all().await.unwrap();
        assert_eq!(reports.len(), 2);

        let sent: usize = reports.iter().map(|(_, r)| r.sent).sum();
        let failed: usize = reports.iter().map(|(_, r)| r.failed).sum();
        assert_eq!(sent, 1);
        assert_eq!(failed, 1);
    }

    #[tokio::test]
    async fn test_expired_messages_swept_before_flush() {
        let s = setup().await;
        let peer = PeerId::new("p1");
        let _peer_transport = s.network.create_transport(peer.clone()).await;
        mark_connected(&s.connections, &peer);

        let config = QueueConfig {
            ttl_ms: -1, // already expired when enqueued
            ..QueueConfig::default()
        };
        let queue = OfflineQueue::with_config(
            s.store.clone(),
            Arc::new(s.network.create_transport(PeerId::new("local2")).await),
            s.connections.clone(),
            config,
        );

        let queued = queue.enqueue(&peer, &ping_envelope(), 0).await.unwrap();
        let report = queue.flush_peer(&peer).await.unwrap();
        assert_eq!(report, FlushReport::default());

        let message = s.store.get_message(&queued.id).await.unwrap().unwrap();
        assert_eq!(message.status, QueueStatus::Expired);
    }

    #[tokio::test]
    async fn test_timers_stop_as_pair() {
        let s = setup().await;
        let timers = s.queue.start_timers();
        timers.stop();
        // Nothing to assert beyond not hanging; abort is synchronous.
    }
}
