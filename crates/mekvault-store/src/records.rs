//! Persisted record types.
//!
//! These structs mirror the storage schema one-to-one; the column layout is
//! the wire contract for any reimplementation. Status and scope enums carry
//! their stable string forms, matching the CHECK constraints in the schema.

use mekvault_core::{ChangeType, ContentType};
use serde::{Deserialize, Serialize};

use crate::error::StoreError;

/// An entry in the append-only change log.
///
/// Entries are never mutated after insert except for the `synced` flag.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangeLogEntry {
    /// Row id (uuid string).
    pub id: String,
    /// What kind of mutation this records.
    pub change_type: ChangeType,
    /// Content type of the affected item.
    pub content_type: ContentType,
    /// The affected item's id.
    pub item_id: String,
    /// When the change happened (Unix ms).
    pub timestamp: i64,
    /// Globally unique, strictly increasing version.
    pub version: u64,
    /// Hash of the item content after the change.
    pub content_hash: String,
    /// Optional inlined content (JSON).
    pub data: Option<String>,
    /// Whether this entry has been acknowledged by a peer (local entries)
    /// or was received from one (remote entries insert as synced).
    pub synced: bool,
    /// Originating peer id; `None` for local changes.
    pub source_id: Option<String>,
}

/// Input for appending a change; id, timestamp, and version are assigned
/// by the store.
#[derive(Debug, Clone)]
pub struct NewChange {
    pub change_type: ChangeType,
    pub content_type: ContentType,
    pub item_id: String,
    pub content_hash: String,
    pub data: Option<String>,
    pub source_id: Option<String>,
}

/// How a sync conflict was (or will be) resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConflictResolution {
    Pending,
    Local,
    Remote,
    Merged,
    Forked,
}

impl ConflictResolution {
    /// Stable string form, matching the schema CHECK constraint.
    pub const fn as_str(&self) -> &'static str {
        match self {
            ConflictResolution::Pending => "pending",
            ConflictResolution::Local => "local",
            ConflictResolution::Remote => "remote",
            ConflictResolution::Merged => "merged",
            ConflictResolution::Forked => "forked",
        }
    }

    /// Parse from the stable string form.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(ConflictResolution::Pending),
            "local" => Some(ConflictResolution::Local),
            "remote" => Some(ConflictResolution::Remote),
            "merged" => Some(ConflictResolution::Merged),
            "forked" => Some(ConflictResolution::Forked),
            _ => None,
        }
    }
}

/// A detected divergence between local and remote histories for one item.
///
/// Created when a remote change targets an item with an unsynced local
/// change and a different content hash. Resolved exactly once.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncConflict {
    pub id: String,
    pub content_type: ContentType,
    pub item_id: String,
    pub item_name: String,
    pub local_version: u64,
    pub local_hash: String,
    pub remote_version: u64,
    pub remote_hash: String,
    pub remote_peer_id: String,
    pub detected_at: i64,
    pub resolution: ConflictResolution,
}

/// Input for recording a conflict; id, detection time, and `pending`
/// resolution are assigned by the store.
#[derive(Debug, Clone)]
pub struct NewConflict {
    pub content_type: ContentType,
    pub item_id: String,
    pub item_name: String,
    pub local_version: u64,
    pub local_hash: String,
    pub remote_version: u64,
    pub remote_hash: String,
    pub remote_peer_id: String,
}

/// Delivery status of a queued message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QueueStatus {
    Pending,
    Sending,
    Sent,
    Failed,
    Expired,
}

impl QueueStatus {
    /// Stable string form, matching the schema CHECK constraint.
    pub const fn as_str(&self) -> &'static str {
        match self {
            QueueStatus::Pending => "pending",
            QueueStatus::Sending => "sending",
            QueueStatus::Sent => "sent",
            QueueStatus::Failed => "failed",
            QueueStatus::Expired => "expired",
        }
    }

    /// Parse from the stable string form.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(QueueStatus::Pending),
            "sending" => Some(QueueStatus::Sending),
            "sent" => Some(QueueStatus::Sent),
            "failed" => Some(QueueStatus::Failed),
            "expired" => Some(QueueStatus::Expired),
            _ => None,
        }
    }
}

/// A store-and-forward message awaiting delivery to an offline peer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueuedMessage {
    pub id: String,
    pub target_peer_id: String,
    pub message_type: String,
    pub payload: String,
    pub queued_at: i64,
    pub expires_at: i64,
    pub attempts: u32,
    pub last_attempt_at: Option<i64>,
    pub status: QueueStatus,
    pub priority: i32,
    /// UTF-8 byte length of the payload, not character count.
    pub size_bytes: u64,
}

/// Input for enqueueing a message; id, queue time, size, and `pending`
/// status are assigned by the store.
#[derive(Debug, Clone)]
pub struct NewQueuedMessage {
    pub target_peer_id: String,
    pub message_type: String,
    pub payload: String,
    pub expires_at: i64,
    pub priority: i32,
}

/// What a share link grants access to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ShareScope {
    /// A single item.
    Item { id: String },
    /// A folder of items.
    Folder { id: String },
    /// Every item of one content type.
    Category { category: ContentType },
    /// The entire vault.
    All,
}

impl ShareScope {
    /// The `scope_type` column value.
    pub const fn type_str(&self) -> &'static str {
        match self {
            ShareScope::Item { .. } => "item",
            ShareScope::Folder { .. } => "folder",
            ShareScope::Category { .. } => "category",
            ShareScope::All => "all",
        }
    }

    /// The `scope_id` column value.
    pub fn scope_id(&self) -> Option<&str> {
        match self {
            ShareScope::Item { id } | ShareScope::Folder { id } => Some(id),
            _ => None,
        }
    }

    /// The `scope_category` column value.
    pub fn scope_category(&self) -> Option<ContentType> {
        match self {
            ShareScope::Category { category } => Some(*category),
            _ => None,
        }
    }

    /// Reassemble from the three scope columns.
    pub fn from_columns(
        scope_type: &str,
        scope_id: Option<String>,
        scope_category: Option<String>,
    ) -> Result<Self, StoreError> {
        match scope_type {
            "item" => Ok(ShareScope::Item {
                id: scope_id
                    .ok_or_else(|| StoreError::InvalidData("item scope without id".into()))?,
            }),
            "folder" => Ok(ShareScope::Folder {
                id: scope_id
                    .ok_or_else(|| StoreError::InvalidData("folder scope without id".into()))?,
            }),
            "category" => {
                let raw = scope_category.ok_or_else(|| {
                    StoreError::InvalidData("category scope without category".into())
                })?;
                let category = ContentType::parse(&raw).ok_or_else(|| {
                    StoreError::InvalidData(format!("unknown scope category: {}", raw))
                })?;
                Ok(ShareScope::Category { category })
            }
            "all" => Ok(ShareScope::All),
            other => Err(StoreError::InvalidData(format!(
                "unknown scope type: {}",
                other
            ))),
        }
    }
}

/// Access level a share link grants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PermissionLevel {
    Read,
    Write,
    Admin,
}

impl PermissionLevel {
    /// Stable string form, matching the schema CHECK constraint.
    pub const fn as_str(&self) -> &'static str {
        match self {
            PermissionLevel::Read => "read",
            PermissionLevel::Write => "write",
            PermissionLevel::Admin => "admin",
        }
    }

    /// Parse from the stable string form.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "read" => Some(PermissionLevel::Read),
            "write" => Some(PermissionLevel::Write),
            "admin" => Some(PermissionLevel::Admin),
            _ => None,
        }
    }
}

/// A capability-scoped, revocable, expiring share link.
///
/// `use_count` only ever increases; `is_active` is the only reversible flag.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShareLink {
    pub id: String,
    /// Unique bearer token (base64url, no padding).
    pub token: String,
    pub scope: ShareScope,
    pub level: PermissionLevel,
    /// `None` = never expires.
    pub expires_at: Option<i64>,
    /// `None` = unlimited uses.
    pub max_uses: Option<u32>,
    pub use_count: u32,
    pub created_at: i64,
    pub label: Option<String>,
    pub is_active: bool,
}

/// Outcome of an atomic share-link redemption.
///
/// The non-success variants are classified by a follow-up read after the
/// conditional update affected zero rows; they exist for error reporting
/// only and play no part in the atomicity argument.
#[derive(Debug, Clone, PartialEq)]
pub enum RedeemOutcome {
    /// The conditional increment succeeded; the returned link reflects the
    /// incremented use count.
    Redeemed(ShareLink),
    NotFound,
    Inactive,
    Expired,
    MaxUses,
}

/// A snapshot of one item's content at a specific per-item version.
///
/// Snapshots are append-only; rollback writes a new snapshot rather than
/// deleting any.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VersionSnapshot {
    pub id: String,
    pub item_id: String,
    pub content_type: ContentType,
    /// Monotonic per item (scoped by content type).
    pub version: u64,
    /// Serialized item content (JSON).
    pub content: String,
    pub content_hash: String,
    pub created_by: String,
    pub message: Option<String>,
    pub created_at: i64,
}

/// Input for saving a snapshot; id, version, and creation time are assigned
/// by the store.
#[derive(Debug, Clone)]
pub struct NewVersionSnapshot {
    pub item_id: String,
    pub content_type: ContentType,
    pub content: String,
    pub content_hash: String,
    pub created_by: String,
    pub message: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_queue_status_roundtrip() {
        for s in [
            QueueStatus::Pending,
            QueueStatus::Sending,
            QueueStatus::Sent,
            QueueStatus::Failed,
            QueueStatus::Expired,
        ] {
            assert_eq!(QueueStatus::parse(s.as_str()), Some(s));
        }
        assert_eq!(QueueStatus::parse("lost"), None);
    }

    #[test]
    fn test_resolution_roundtrip() {
        for r in [
            ConflictResolution::Pending,
            ConflictResolution::Local,
            ConflictResolution::Remote,
            ConflictResolution::Merged,
            ConflictResolution::Forked,
        ] {
            assert_eq!(ConflictResolution::parse(r.as_str()), Some(r));
        }
    }

    #[test]
    fn test_scope_columns_roundtrip() {
        let scopes = [
            ShareScope::Item { id: "unit-42".into() },
            ShareScope::Folder { id: "folder-1".into() },
            ShareScope::Category { category: ContentType::Pilots },
            ShareScope::All,
        ];
        for scope in scopes {
            let rebuilt = ShareScope::from_columns(
                scope.type_str(),
                scope.scope_id().map(String::from),
                scope.scope_category().map(|c| c.as_str().to_string()),
            )
            .unwrap();
            assert_eq!(rebuilt, scope);
        }
    }

    #[test]
    fn test_scope_missing_id_rejected() {
        assert!(ShareScope::from_columns("item", None, None).is_err());
        assert!(ShareScope::from_columns("category", None, None).is_err());
        assert!(ShareScope::from_columns("ring", None, None).is_err());
    }

    #[test]
    fn test_permission_ordering() {
        assert!(PermissionLevel::Read < PermissionLevel::Write);
        assert!(PermissionLevel::Write < PermissionLevel::Admin);
    }

    proptest::proptest! {
        /// Scope column encoding is lossless for any id string.
        #[test]
        fn prop_scope_columns_roundtrip(id in ".{1,64}", folder in proptest::bool::ANY) {
            let scope = if folder {
                ShareScope::Folder { id }
            } else {
                ShareScope::Item { id }
            };
            let rebuilt = ShareScope::from_columns(
                scope.type_str(),
                scope.scope_id().map(String::from),
                scope.scope_category().map(|c| c.as_str().to_string()),
            )
            .unwrap();
            proptest::prop_assert_eq!(rebuilt, scope);
        }
    }
}
