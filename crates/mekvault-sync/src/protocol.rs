//! The sync protocol session: handshake, pull replication, push, liveness.
//!
//! One `SyncSession` serves a local vault against any number of peers. It
//! owns the session-local sync cursors; durable state (change log,
//! conflicts, queue) lives entirely in the store.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::time::Instant;
use tracing::{debug, warn};

use mekvault_core::{now_millis, ContentType};
use mekvault_store::{ChangeLogEntry, NewChange, NewConflict, Store};

use crate::connection::ConnectionTable;
use crate::error::{Result, SyncError};
use crate::messages::{
    limits, Envelope, HandshakeData, PeerId, SyncErrorCode, SyncMessage, PROTOCOL_VERSION,
};
use crate::transport::Transport;

/// Tuning for a sync session.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// How long to wait for a peer's response before giving up.
    /// Requests are idempotent, so a timed-out sync can simply be retried.
    pub message_timeout: Duration,
    /// Page size for pull replication.
    pub page_limit: usize,
    /// Ping loop period.
    pub ping_interval: Duration,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            message_timeout: Duration::from_secs(30),
            page_limit: limits::MAX_CHANGES_PER_RESPONSE,
            ping_interval: Duration::from_secs(15),
        }
    }
}

/// What we advertise about ourselves during handshake.
#[derive(Debug, Clone)]
pub struct LocalIdentity {
    /// Our Ed25519 public key (hex).
    pub public_key: String,
    /// Our display name.
    pub display_name: String,
    /// Feature names we support.
    pub features: Vec<String>,
}

/// Counters from one `sync_with` run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncStats {
    /// Changes applied to the local log.
    pub applied: usize,
    /// Duplicates skipped (already had identical content).
    pub duplicates: usize,
    /// Conflicts recorded (remote change withheld).
    pub conflicts: usize,
    /// Pages pulled.
    pub pages: usize,
}

/// How one remote change was handled.
enum Applied {
    Applied,
    Duplicate,
    Conflict,
}

/// A sync protocol session over one transport.
pub struct SyncSession<S: Store, T: Transport> {
    store: Arc<S>,
    transport: Arc<T>,
    connections: Arc<ConnectionTable>,
    identity: LocalIdentity,
    config: SyncConfig,
    /// Per-peer pull cursors: the highest change-log version we have
    /// consumed from each peer. Session-local; reseeded by handshake.
    cursors: Mutex<HashMap<PeerId, u64>>,
}

impl<S: Store + 'static, T: Transport + 'static> SyncSession<S, T> {
    pub fn new(
        store: Arc<S>,
        transport: Arc<T>,
        connections: Arc<ConnectionTable>,
        identity: LocalIdentity,
    ) -> Self {
        Self::with_config(store, transport, connections, identity, SyncConfig::default())
    }

    pub fn with_config(
        store: Arc<S>,
        transport: Arc<T>,
        connections: Arc<ConnectionTable>,
        identity: LocalIdentity,
        config: SyncConfig,
    ) -> Self {
        Self {
            store,
            transport,
            connections,
            identity,
            config,
            cursors: Mutex::new(HashMap::new()),
        }
    }

    pub fn local_peer_id(&self) -> PeerId {
        self.transport.local_peer_id()
    }

    fn cursor(&self, peer: &PeerId) -> u64 {
        *self.cursors.lock().unwrap().get(peer).unwrap_or(&0)
    }

    fn set_cursor(&self, peer: &PeerId, version: u64) {
        self.cursors.lock().unwrap().insert(peer.clone(), version);
    }

    async fn handshake_data(&self, peer: &PeerId) -> HandshakeData {
        HandshakeData {
            protocol_version: PROTOCOL_VERSION,
            public_key: self.identity.public_key.clone(),
            display_name: self.identity.display_name.clone(),
            features: self.identity.features.clone(),
            last_sync_version: self.cursor(peer),
        }
    }

    async fn send(&self, peer: &PeerId, message: SyncMessage) -> Result<Envelope> {
        let envelope = Envelope::new(self.local_peer_id(), message);
        self.transport.send(peer, envelope.clone()).await?;
        Ok(envelope)
    }

    /// Wait for an envelope from `peer` matching `want`, handling all other
    /// traffic in the meantime. Times out per `SyncConfig::message_timeout`.
    async fn await_response<F>(&self, peer: &PeerId, want: F) -> Result<Envelope>
    where
        F: Fn(&SyncMessage) -> bool,
    {
        let deadline = Instant::now() + self.config.message_timeout;
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Err(SyncError::Timeout);
            }
            let Some((from, envelope)) = self.transport.recv_timeout(remaining).await? else {
                return Err(SyncError::Timeout);
            };

            if &from == peer {
                if let SyncMessage::Error { code, message } = &envelope.message {
                    return Err(SyncError::Peer {
                        code: code.to_string(),
                        message: message.clone(),
                    });
                }
                if want(&envelope.message) {
                    return Ok(envelope);
                }
            }
            // Not ours to await; process normally.
            self.handle_envelope(&from, envelope).await?;
        }
    }

    /// Initiate a handshake with a peer and wait for the ack.
    ///
    /// Returns the peer's advertised data. Their `last_sync_version` tells
    /// us where they will resume pulling from us.
    pub async fn handshake(&self, peer: &PeerId) -> Result<HandshakeData> {
        let data = self.handshake_data(peer).await;
        self.send(peer, SyncMessage::Handshake(data)).await?;

        let ack = self
            .await_response(peer, |m| matches!(m, SyncMessage::HandshakeAck(_)))
            .await?;
        let SyncMessage::HandshakeAck(theirs) = ack.message else {
            return Err(SyncError::InvalidMessage("expected handshake_ack".into()));
        };

        if theirs.protocol_version != PROTOCOL_VERSION {
            return Err(SyncError::VersionMismatch {
                ours: PROTOCOL_VERSION,
                theirs: theirs.protocol_version,
            });
        }
        debug!(peer = %peer, name = %theirs.display_name, "handshake complete");
        Ok(theirs)
    }

    /// Pull all changes from a peer, page by page, applying each.
    pub async fn sync_with(&self, peer: &PeerId) -> Result<SyncStats> {
        let mut stats = SyncStats::default();

        loop {
            let from_version = self.cursor(peer);
            self.send(
                peer,
                SyncMessage::SyncRequest {
                    from_version,
                    limit: self.config.page_limit,
                    content_types: None,
                },
            )
            .await?;

            let response = self
                .await_response(peer, |m| matches!(m, SyncMessage::SyncResponse { .. }))
                .await?;
            let SyncMessage::SyncResponse {
                changes,
                has_more,
                current_version,
            } = response.message
            else {
                return Err(SyncError::InvalidMessage("expected sync_response".into()));
            };

            stats.pages += 1;

            if changes.is_empty() {
                // Nothing matched past our cursor; trust the peer's head.
                self.set_cursor(peer, current_version.max(from_version));
                break;
            }

            let mut max_version = from_version;
            for change in &changes {
                max_version = max_version.max(change.version);
                match self.apply_remote_change(peer, change, None).await? {
                    Applied::Applied => stats.applied += 1,
                    Applied::Duplicate => stats.duplicates += 1,
                    Applied::Conflict => stats.conflicts += 1,
                }
            }
            self.set_cursor(peer, max_version);

            if !has_more {
                self.set_cursor(peer, current_version.max(max_version));
                break;
            }
        }

        debug!(
            peer = %peer,
            applied = stats.applied,
            conflicts = stats.conflicts,
            pages = stats.pages,
            "sync complete"
        );
        Ok(stats)
    }

    /// Push one local change to a peer.
    ///
    /// The peer answers with `change_ack`, which marks the entry synced
    /// when it flows back through [`handle_envelope`](Self::handle_envelope).
    pub async fn push_change(
        &self,
        peer: &PeerId,
        change: &ChangeLogEntry,
        content: Option<String>,
    ) -> Result<()> {
        self.send(
            peer,
            SyncMessage::Change {
                change: change.clone(),
                content,
            },
        )
        .await?;
        Ok(())
    }

    /// Measure round-trip time to a peer. Records it on the connection.
    pub async fn ping(&self, peer: &PeerId) -> Result<i64> {
        let sent_at = now_millis();
        self.send(peer, SyncMessage::Ping { timestamp: sent_at })
            .await?;

        let pong = self
            .await_response(
                peer,
                |m| matches!(m, SyncMessage::Pong { ping_timestamp, .. } if *ping_timestamp == sent_at),
            )
            .await?;
        let SyncMessage::Pong { ping_timestamp, .. } = pong.message else {
            return Err(SyncError::InvalidMessage("expected pong".into()));
        };

        let rtt = now_millis() - ping_timestamp;
        self.connections.record_rtt(peer, rtt);
        Ok(rtt)
    }

    /// Start the ping loop for a connected peer.
    ///
    /// The loop is registered with the connection table, which aborts it
    /// when the peer disconnects.
    pub fn start_ping_loop(self: &Arc<Self>, peer: PeerId) {
        let session = Arc::clone(self);
        let interval = self.config.ping_interval;
        let loop_peer = peer.clone();
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                ticker.tick().await;
                if let Err(e) = session.ping(&loop_peer).await {
                    warn!(peer = %loop_peer, error = %e, "ping failed");
                }
            }
        });
        self.connections.set_ping_task(&peer, handle);
    }

    /// Receive and handle a single envelope from any peer.
    ///
    /// Intended to be driven in a loop by the embedder.
    pub async fn serve_once(&self) -> Result<()> {
        let (from, envelope) = self.transport.recv().await?;
        self.handle_envelope(&from, envelope).await
    }

    /// Handle one inbound envelope, sending any response directly.
    pub async fn handle_envelope(&self, from: &PeerId, envelope: Envelope) -> Result<()> {
        if let Err(reason) = envelope.message.validate_limits() {
            self.send(
                from,
                SyncMessage::Error {
                    code: SyncErrorCode::InvalidMessage,
                    message: reason.to_string(),
                },
            )
            .await?;
            return Err(SyncError::InvalidMessage(reason.to_string()));
        }

        match envelope.message {
            SyncMessage::Handshake(theirs) => {
                if theirs.protocol_version != PROTOCOL_VERSION {
                    self.send(
                        from,
                        SyncMessage::Error {
                            code: SyncErrorCode::VersionMismatch,
                            message: format!("expected protocol v{}", PROTOCOL_VERSION),
                        },
                    )
                    .await?;
                    return Err(SyncError::VersionMismatch {
                        ours: PROTOCOL_VERSION,
                        theirs: theirs.protocol_version,
                    });
                }
                let ours = self.handshake_data(from).await;
                self.send(from, SyncMessage::HandshakeAck(ours)).await?;
            }

            SyncMessage::HandshakeAck(_) => {
                // Unsolicited ack; nothing to do.
            }

            SyncMessage::SyncRequest {
                from_version,
                limit,
                content_types,
            } => {
                let response = self
                    .build_sync_response(from_version, limit, content_types.as_deref())
                    .await?;
                self.send(from, response).await?;
            }

            SyncMessage::SyncResponse { .. } => {
                // Response with no request in flight; ignore.
            }

            SyncMessage::Change { change, content } => {
                self.apply_remote_change(from, &change, content.as_deref())
                    .await?;
                // Ack regardless of outcome: the sender's entry is
                // delivered even when we withheld it as a conflict.
                self.send(
                    from,
                    SyncMessage::ChangeAck {
                        change_id: change.id,
                    },
                )
                .await?;
            }

            SyncMessage::ChangeAck { change_id } => {
                self.store.mark_change_synced(&change_id).await?;
            }

            SyncMessage::Ping { timestamp } => {
                self.send(
                    from,
                    SyncMessage::Pong {
                        ping_timestamp: timestamp,
                        pong_timestamp: now_millis(),
                    },
                )
                .await?;
            }

            SyncMessage::Pong { ping_timestamp, .. } => {
                self.connections.record_rtt(from, now_millis() - ping_timestamp);
            }

            SyncMessage::Error { code, message } => {
                warn!(peer = %from, %code, message, "peer reported error");
            }
        }
        Ok(())
    }

    /// Build a sync_response page.
    ///
    /// Scans forward past filtered-out changes so a non-empty page is
    /// returned whenever matching changes remain; the requester's cursor
    /// therefore always advances while `has_more` is true.
    async fn build_sync_response(
        &self,
        from_version: u64,
        limit: usize,
        content_types: Option<&[ContentType]>,
    ) -> Result<SyncMessage> {
        let limit = limit.clamp(1, self.config.page_limit);
        let mut changes = Vec::new();
        let mut scan_from = from_version;
        let mut exhausted = false;

        while changes.len() < limit {
            let batch = self
                .store
                .get_changes_since(scan_from, self.config.page_limit)
                .await?;
            let batch_full = batch.len() == self.config.page_limit;
            let Some(last) = batch.last() else {
                exhausted = true;
                break;
            };
            scan_from = last.version;

            for change in batch {
                let matches = content_types
                    .map(|filter| filter.contains(&change.content_type))
                    .unwrap_or(true);
                if matches && changes.len() < limit {
                    changes.push(change);
                }
            }

            if !batch_full && changes.len() < limit {
                exhausted = true;
                break;
            }
        }

        Ok(SyncMessage::SyncResponse {
            changes,
            has_more: !exhausted,
            current_version: self.store.current_version().await?,
        })
    }

    /// Apply a change received from a peer.
    ///
    /// Divergence against an unsynced local change is recorded as a
    /// conflict and the remote change is withheld, never auto-applied.
    async fn apply_remote_change(
        &self,
        from: &PeerId,
        change: &ChangeLogEntry,
        content: Option<&str>,
    ) -> Result<Applied> {
        let local = self
            .store
            .latest_change_for_item(change.content_type, &change.item_id)
            .await?;

        if let Some(local) = local {
            if local.content_hash == change.content_hash {
                return Ok(Applied::Duplicate);
            }
            if !local.synced {
                let conflict = NewConflict {
                    content_type: change.content_type,
                    item_id: change.item_id.clone(),
                    item_name: item_name_from(change, content),
                    local_version: local.version,
                    local_hash: local.content_hash,
                    remote_version: change.version,
                    remote_hash: change.content_hash.clone(),
                    remote_peer_id: from.0.clone(),
                };
                self.store.record_conflict(conflict).await?;
                warn!(peer = %from, item_id = %change.item_id, "conflict recorded");
                return Ok(Applied::Conflict);
            }
        }

        let data = content
            .map(str::to_string)
            .or_else(|| change.data.clone());
        self.store
            .append_change(NewChange {
                change_type: change.change_type,
                content_type: change.content_type,
                item_id: change.item_id.clone(),
                content_hash: change.content_hash.clone(),
                data,
                source_id: Some(from.0.clone()),
            })
            .await?;
        Ok(Applied::Applied)
    }
}

/// Best-effort item name for a conflict record: the `name` field of the
/// inlined content if there is one, else the item id.
fn item_name_from(change: &ChangeLogEntry, content: Option<&str>) -> String {
    let raw = content.or(change.data.as_deref());
    raw.and_then(|json| serde_json::from_str::<serde_json::Value>(json).ok())
        .and_then(|v| v.get("name").and_then(|n| n.as_str()).map(String::from))
        .unwrap_or_else(|| change.item_id.clone())
}
