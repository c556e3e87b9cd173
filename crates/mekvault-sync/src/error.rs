//! Error types for sync operations.

use thiserror::Error;

/// Errors that can occur during sync.
#[derive(Debug, Error)]
pub enum SyncError {
    /// A request did not receive its response within the configured timeout.
    #[error("timed out waiting for peer response")]
    Timeout,

    /// Peers disagree on the protocol version.
    #[error("protocol version mismatch: ours {ours}, theirs {theirs}")]
    VersionMismatch { ours: u32, theirs: u32 },

    /// A peer reported a protocol-level error.
    #[error("peer error [{code}]: {message}")]
    Peer { code: String, message: String },

    /// A message failed validation (limits, shape, unexpected type).
    #[error("invalid message: {0}")]
    InvalidMessage(String),

    /// Transport-level failure (peer unreachable, channel closed).
    #[error("transport error: {0}")]
    Transport(String),

    /// Envelope (de)serialization failure.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Underlying storage failure.
    #[error("store error: {0}")]
    Store(#[from] mekvault_store::StoreError),
}

/// Result type for sync operations.
pub type Result<T> = std::result::Result<T, SyncError>;
