//! Peer-to-peer sync for mekvault.
//!
//! # Overview
//!
//! This crate moves the change log between vaults. It layers a small
//! JSON message protocol over a pluggable [`Transport`], tracks per-peer
//! connection state, and stores messages for offline peers in a durable
//! queue that drains when they come back.
//!
//! # Key Types
//!
//! - [`SyncSession`]: the protocol engine. Handshake, pull replication,
//!   change push/ack, ping/pong.
//! - [`Envelope`] / [`SyncMessage`]: the wire format.
//! - [`Transport`]: how envelopes actually move. [`memory`] provides an
//!   in-process implementation for tests.
//! - [`ConnectionTable`]: session-local connection and data-channel state,
//!   RTT, and traffic counters.
//! - [`OfflineQueue`]: store-and-forward delivery with retry, expiry, and
//!   background flush timers.
//!
//! # Usage
//!
//! ```no_run
//! # use std::sync::Arc;
//! # use mekvault_store::MemoryStore;
//! # use mekvault_sync::{ConnectionTable, LocalIdentity, PeerId, SyncSession};
//! # use mekvault_sync::transport::memory::MemoryNetwork;
//! # async fn demo() -> Result<(), Box<dyn std::error::Error>> {
//! let network = MemoryNetwork::new();
//! let transport = Arc::new(network.create_transport(PeerId::new("alice")).await);
//! let store = Arc::new(MemoryStore::new());
//! let session = SyncSession::new(
//!     store,
//!     transport,
//!     ConnectionTable::new(),
//!     LocalIdentity {
//!         public_key: "ab".repeat(32),
//!         display_name: "Alice".into(),
//!         features: vec!["sync".into()],
//!     },
//! );
//!
//! let bob = PeerId::new("bob");
//! session.handshake(&bob).await?;
//! let stats = session.sync_with(&bob).await?;
//! println!("applied {} changes", stats.applied);
//! # Ok(())
//! # }
//! ```
//!
//! # Design Notes
//!
//! Sync is pull-based: each side requests changes past its cursor and the
//! responder pages through its log. A remote change that collides with an
//! unsynced local edit is recorded as a conflict and withheld, never
//! auto-applied. Requests are idempotent, so timeouts are safe to retry.

pub mod connection;
pub mod error;
pub mod messages;
pub mod protocol;
pub mod queue;
pub mod transport;

pub use connection::{
    ConnectionState, ConnectionTable, DataChannelState, PeerConnection, StateChangeCallback,
};
pub use error::{Result, SyncError};
pub use messages::{
    limits, Envelope, HandshakeData, PeerId, SyncErrorCode, SyncMessage, PROTOCOL_VERSION,
};
pub use protocol::{LocalIdentity, SyncConfig, SyncSession, SyncStats};
pub use queue::{FlushReport, OfflineQueue, QueueConfig, QueueTimers};
pub use transport::{memory, Transport};
