//! Sync protocol message types.
//!
//! Every message crosses the wire inside an [`Envelope`], serialized as
//! JSON: `{type, message_id, sender_id, timestamp, payload}`. The `type`
//! and `payload` fields come from the adjacently-tagged [`SyncMessage`].

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use mekvault_core::{now_millis, ContentType};
use mekvault_store::ChangeLogEntry;

/// Unique identifier for a peer in the sync network.
///
/// Peers are identified by an opaque string, typically the identity id.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PeerId(pub String);

impl PeerId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for PeerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Current protocol version.
pub const PROTOCOL_VERSION: u32 = 1;

/// Message size limits.
pub mod limits {
    /// Max changes in a single sync_response page.
    pub const MAX_CHANGES_PER_RESPONSE: usize = 100;
    /// Max entries in a handshake feature list.
    pub const MAX_FEATURES: usize = 32;
    /// Max content-type filters in a sync_request.
    pub const MAX_CONTENT_TYPE_FILTERS: usize = 8;
}

/// The wire envelope wrapping every protocol message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Envelope {
    /// Unique id for this message (uuid).
    pub message_id: String,
    /// The sending peer.
    pub sender_id: PeerId,
    /// When the sender created the message (Unix ms).
    pub timestamp: i64,
    /// Message type and payload.
    #[serde(flatten)]
    pub message: SyncMessage,
}

impl Envelope {
    /// Wrap a message, assigning a fresh id and timestamp.
    pub fn new(sender_id: PeerId, message: SyncMessage) -> Self {
        Self {
            message_id: Uuid::new_v4().to_string(),
            sender_id,
            timestamp: now_millis(),
            message,
        }
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }

    pub fn from_json(json: &str) -> serde_json::Result<Self> {
        serde_json::from_str(json)
    }
}

/// Identity and capability data exchanged during handshake.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HandshakeData {
    /// Protocol version for compatibility checking.
    pub protocol_version: u32,
    /// Sender's Ed25519 public key (hex).
    pub public_key: String,
    /// Sender's display name.
    pub display_name: String,
    /// Supported feature names, for capability negotiation.
    pub features: Vec<String>,
    /// The sender's last known change-log version from this peer,
    /// enabling resumable sync in one round trip.
    pub last_sync_version: u64,
}

/// Sync protocol messages.
///
/// Serialized adjacently tagged so the envelope carries `type` and
/// `payload` as sibling fields.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
pub enum SyncMessage {
    /// Introduce yourself and your sync position.
    Handshake(HandshakeData),

    /// Reply to a handshake with the same data about ourselves.
    HandshakeAck(HandshakeData),

    /// Pull changes strictly after `from_version`.
    SyncRequest {
        from_version: u64,
        /// Page size; capped at [`limits::MAX_CHANGES_PER_RESPONSE`].
        limit: usize,
        /// Optional filter; `None` means all content types.
        content_types: Option<Vec<ContentType>>,
    },

    /// One page of changes.
    SyncResponse {
        changes: Vec<ChangeLogEntry>,
        /// More pages remain after this one.
        has_more: bool,
        /// The responder's current change-log version.
        current_version: u64,
    },

    /// Push notification of a single new change.
    Change {
        change: ChangeLogEntry,
        /// Optionally inlined content for small payloads.
        #[serde(skip_serializing_if = "Option::is_none")]
        content: Option<String>,
    },

    /// Acknowledge application of a pushed change.
    ChangeAck { change_id: String },

    /// Liveness probe.
    Ping { timestamp: i64 },

    /// Liveness reply; the requester computes `rtt = now - ping_timestamp`.
    Pong {
        ping_timestamp: i64,
        pong_timestamp: i64,
    },

    /// Protocol-level error report. Always framed as data, never a
    /// transport failure.
    Error { code: SyncErrorCode, message: String },
}

impl SyncMessage {
    /// Stable message type string, as it appears on the wire.
    pub const fn type_str(&self) -> &'static str {
        match self {
            SyncMessage::Handshake(_) => "handshake",
            SyncMessage::HandshakeAck(_) => "handshake_ack",
            SyncMessage::SyncRequest { .. } => "sync_request",
            SyncMessage::SyncResponse { .. } => "sync_response",
            SyncMessage::Change { .. } => "change",
            SyncMessage::ChangeAck { .. } => "change_ack",
            SyncMessage::Ping { .. } => "ping",
            SyncMessage::Pong { .. } => "pong",
            SyncMessage::Error { .. } => "error",
        }
    }

    /// Check if this message respects size limits.
    pub fn validate_limits(&self) -> Result<(), &'static str> {
        match self {
            SyncMessage::Handshake(data) | SyncMessage::HandshakeAck(data) => {
                if data.features.len() > limits::MAX_FEATURES {
                    return Err("too many features");
                }
            }
            SyncMessage::SyncRequest { content_types, .. } => {
                if let Some(filters) = content_types {
                    if filters.len() > limits::MAX_CONTENT_TYPE_FILTERS {
                        return Err("too many content type filters");
                    }
                }
            }
            SyncMessage::SyncResponse { changes, .. } => {
                if changes.len() > limits::MAX_CHANGES_PER_RESPONSE {
                    return Err("too many changes in response");
                }
            }
            _ => {}
        }
        Ok(())
    }
}

/// Error codes for protocol-level error messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncErrorCode {
    /// Unknown/unspecified error.
    Unknown,
    /// Protocol version mismatch.
    VersionMismatch,
    /// Message failed validation.
    InvalidMessage,
    /// Internal error on the peer.
    InternalError,
}

impl std::fmt::Display for SyncErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            SyncErrorCode::Unknown => "unknown",
            SyncErrorCode::VersionMismatch => "version_mismatch",
            SyncErrorCode::InvalidMessage => "invalid_message",
            SyncErrorCode::InternalError => "internal_error",
        };
        f.write_str(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_envelope_wire_shape() {
        let envelope = Envelope::new(
            PeerId::new("peer-a"),
            SyncMessage::Ping { timestamp: 12345 },
        );
        let json = envelope.to_json().unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();

        assert_eq!(value["type"], "ping");
        assert_eq!(value["sender_id"], "peer-a");
        assert_eq!(value["payload"]["timestamp"], 12345);
        assert!(value["message_id"].is_string());
    }

    #[test]
    fn test_envelope_roundtrip() {
        let envelope = Envelope::new(
            PeerId::new("peer-a"),
            SyncMessage::SyncRequest {
                from_version: 7,
                limit: 50,
                content_types: Some(vec![ContentType::Units, ContentType::Pilots]),
            },
        );
        let parsed = Envelope::from_json(&envelope.to_json().unwrap()).unwrap();

        assert_eq!(parsed.message_id, envelope.message_id);
        match parsed.message {
            SyncMessage::SyncRequest {
                from_version,
                limit,
                content_types,
            } => {
                assert_eq!(from_version, 7);
                assert_eq!(limit, 50);
                assert_eq!(content_types.unwrap().len(), 2);
            }
            other => panic!("unexpected message: {}", other.type_str()),
        }
    }

    #[test]
    fn test_error_is_data_not_failure() {
        let envelope = Envelope::new(
            PeerId::new("peer-b"),
            SyncMessage::Error {
                code: SyncErrorCode::VersionMismatch,
                message: "expected v1".into(),
            },
        );
        let json = envelope.to_json().unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["type"], "error");
        assert_eq!(value["payload"]["code"], "version_mismatch");
    }

    #[test]
    fn test_limits_enforced() {
        let msg = SyncMessage::Handshake(HandshakeData {
            protocol_version: PROTOCOL_VERSION,
            public_key: "00".repeat(32),
            display_name: "Ace".into(),
            features: (0..50).map(|i| format!("f{}", i)).collect(),
            last_sync_version: 0,
        });
        assert!(msg.validate_limits().is_err());

        let ok = SyncMessage::Ping { timestamp: 0 };
        assert!(ok.validate_limits().is_ok());
    }
}
