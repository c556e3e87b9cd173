//! In-memory implementation of the Store trait.
//!
//! This is primarily for testing. It has the same semantics as SQLite
//! but keeps everything in memory with no persistence.

use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;
use uuid::Uuid;

use mekvault_core::{now_millis, ContentType};

use crate::error::{Result, StoreError};
use crate::records::{
    ChangeLogEntry, ConflictResolution, NewChange, NewConflict, NewQueuedMessage,
    NewVersionSnapshot, QueueStatus, QueuedMessage, RedeemOutcome, ShareLink, SyncConflict,
    VersionSnapshot,
};
use crate::traits::Store;

/// In-memory store implementation.
///
/// All data is lost when the store is dropped. Thread-safe via RwLock;
/// every mutation takes the write lock for its whole read-modify-write,
/// which gives the same atomicity the SQLite statements do.
pub struct MemoryStore {
    inner: RwLock<MemoryStoreInner>,
}

#[derive(Default)]
struct MemoryStoreInner {
    /// Change log, ordered by version.
    changes: Vec<ChangeLogEntry>,

    /// Conflicts indexed by id.
    conflicts: Vec<SyncConflict>,

    /// Queued messages indexed by id.
    messages: HashMap<String, QueuedMessage>,

    /// Share links indexed by token.
    links: HashMap<String, ShareLink>,

    /// Version snapshots per (content_type, item_id), ordered by version.
    versions: HashMap<(ContentType, String), Vec<VersionSnapshot>>,
}

impl MemoryStore {
    /// Create a new empty in-memory store.
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(MemoryStoreInner::default()),
        }
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn append_change(&self, change: NewChange) -> Result<ChangeLogEntry> {
        let mut inner = self.inner.write().unwrap();

        let version = inner.changes.last().map(|c| c.version).unwrap_or(0) + 1;
        let entry = ChangeLogEntry {
            id: Uuid::new_v4().to_string(),
            change_type: change.change_type,
            content_type: change.content_type,
            item_id: change.item_id,
            timestamp: now_millis(),
            version,
            content_hash: change.content_hash,
            data: change.data,
            synced: change.source_id.is_some(),
            source_id: change.source_id,
        };
        inner.changes.push(entry.clone());
        Ok(entry)
    }

    async fn get_changes_since(&self, version: u64, limit: usize) -> Result<Vec<ChangeLogEntry>> {
        let inner = self.inner.read().unwrap();
        Ok(inner
            .changes
            .iter()
            .filter(|c| c.version > version)
            .take(limit)
            .cloned()
            .collect())
    }

    async fn current_version(&self) -> Result<u64> {
        let inner = self.inner.read().unwrap();
        Ok(inner.changes.last().map(|c| c.version).unwrap_or(0))
    }

    async fn latest_change_for_item(
        &self,
        content_type: ContentType,
        item_id: &str,
    ) -> Result<Option<ChangeLogEntry>> {
        let inner = self.inner.read().unwrap();
        Ok(inner
            .changes
            .iter()
            .rev()
            .find(|c| c.content_type == content_type && c.item_id == item_id)
            .cloned())
    }

    async fn mark_change_synced(&self, change_id: &str) -> Result<()> {
        let mut inner = self.inner.write().unwrap();
        if let Some(change) = inner.changes.iter_mut().find(|c| c.id == change_id) {
            change.synced = true;
        }
        Ok(())
    }

    async fn prune_synced_changes(&self, retain: usize) -> Result<usize> {
        let mut inner = self.inner.write().unwrap();

        let synced_versions: Vec<u64> = inner
            .changes
            .iter()
            .filter(|c| c.synced)
            .map(|c| c.version)
            .collect();
        if synced_versions.len() <= retain {
            return Ok(0);
        }
        let cutoff = if retain == 0 {
            u64::MAX
        } else {
            synced_versions[synced_versions.len() - retain]
        };

        let before = inner.changes.len();
        inner.changes.retain(|c| !c.synced || c.version >= cutoff);
        Ok(before - inner.changes.len())
    }

    async fn record_conflict(&self, conflict: NewConflict) -> Result<SyncConflict> {
        let mut inner = self.inner.write().unwrap();
        let record = SyncConflict {
            id: Uuid::new_v4().to_string(),
            content_type: conflict.content_type,
            item_id: conflict.item_id,
            item_name: conflict.item_name,
            local_version: conflict.local_version,
            local_hash: conflict.local_hash,
            remote_version: conflict.remote_version,
            remote_hash: conflict.remote_hash,
            remote_peer_id: conflict.remote_peer_id,
            detected_at: now_millis(),
            resolution: ConflictResolution::Pending,
        };
        inner.conflicts.push(record.clone());
        Ok(record)
    }

    async fn get_conflicts(&self, pending_only: bool) -> Result<Vec<SyncConflict>> {
        let inner = self.inner.read().unwrap();
        let mut conflicts: Vec<SyncConflict> = inner
            .conflicts
            .iter()
            .filter(|c| !pending_only || c.resolution == ConflictResolution::Pending)
            .cloned()
            .collect();
        conflicts.sort_by(|a, b| b.detected_at.cmp(&a.detected_at));
        Ok(conflicts)
    }

    async fn resolve_conflict(
        &self,
        conflict_id: &str,
        resolution: ConflictResolution,
    ) -> Result<bool> {
        if resolution == ConflictResolution::Pending {
            return Err(StoreError::InvalidData(
                "cannot resolve a conflict to pending".into(),
            ));
        }
        let mut inner = self.inner.write().unwrap();
        match inner.conflicts.iter_mut().find(|c| c.id == conflict_id) {
            Some(c) if c.resolution == ConflictResolution::Pending => {
                c.resolution = resolution;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn enqueue_message(&self, message: NewQueuedMessage) -> Result<QueuedMessage> {
        let mut inner = self.inner.write().unwrap();
        let size_bytes = message.payload.len() as u64;
        let record = QueuedMessage {
            id: Uuid::new_v4().to_string(),
            target_peer_id: message.target_peer_id,
            message_type: message.message_type,
            payload: message.payload,
            queued_at: now_millis(),
            expires_at: message.expires_at,
            attempts: 0,
            last_attempt_at: None,
            status: QueueStatus::Pending,
            priority: message.priority,
            size_bytes,
        };
        inner.messages.insert(record.id.clone(), record.clone());
        Ok(record)
    }

    async fn get_message(&self, id: &str) -> Result<Option<QueuedMessage>> {
        let inner = self.inner.read().unwrap();
        Ok(inner.messages.get(id).cloned())
    }

    async fn get_pending_for_peer(&self, peer_id: &str) -> Result<Vec<QueuedMessage>> {
        let inner = self.inner.read().unwrap();
        let mut pending: Vec<QueuedMessage> = inner
            .messages
            .values()
            .filter(|m| m.target_peer_id == peer_id && m.status == QueueStatus::Pending)
            .cloned()
            .collect();
        pending.sort_by(|a, b| {
            b.priority
                .cmp(&a.priority)
                .then(a.queued_at.cmp(&b.queued_at))
        });
        Ok(pending)
    }

    async fn peers_with_pending(&self) -> Result<Vec<String>> {
        let inner = self.inner.read().unwrap();
        let mut peers: Vec<String> = inner
            .messages
            .values()
            .filter(|m| m.status == QueueStatus::Pending)
            .map(|m| m.target_peer_id.clone())
            .collect();
        peers.sort();
        peers.dedup();
        Ok(peers)
    }

    async fn mark_sending(&self, id: &str) -> Result<bool> {
        let mut inner = self.inner.write().unwrap();
        match inner.messages.get_mut(id) {
            Some(m) if m.status == QueueStatus::Pending => {
                m.status = QueueStatus::Sending;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn mark_sent(&self, id: &str) -> Result<bool> {
        let mut inner = self.inner.write().unwrap();
        match inner.messages.get_mut(id) {
            Some(m) if m.status == QueueStatus::Sending => {
                m.status = QueueStatus::Sent;
                m.last_attempt_at = Some(now_millis());
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn mark_failed(&self, id: &str, max_attempts: u32) -> Result<bool> {
        let mut inner = self.inner.write().unwrap();
        match inner.messages.get_mut(id) {
            Some(m) if m.status == QueueStatus::Sending => {
                m.attempts += 1;
                m.last_attempt_at = Some(now_millis());
                m.status = if m.attempts >= max_attempts {
                    QueueStatus::Failed
                } else {
                    QueueStatus::Pending
                };
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn expire_messages(&self, now: i64) -> Result<usize> {
        let mut inner = self.inner.write().unwrap();
        let mut expired = 0;
        for m in inner.messages.values_mut() {
            if matches!(m.status, QueueStatus::Pending | QueueStatus::Failed) && m.expires_at <= now
            {
                m.status = QueueStatus::Expired;
                expired += 1;
            }
        }
        Ok(expired)
    }

    async fn cleanup_messages(&self, cutoff: i64) -> Result<usize> {
        let mut inner = self.inner.write().unwrap();
        let before = inner.messages.len();
        inner.messages.retain(|_, m| {
            !(matches!(m.status, QueueStatus::Sent | QueueStatus::Expired)
                && m.last_attempt_at.unwrap_or(m.queued_at) < cutoff)
        });
        Ok(before - inner.messages.len())
    }

    async fn insert_share_link(&self, link: &ShareLink) -> Result<()> {
        let mut inner = self.inner.write().unwrap();
        if inner.links.contains_key(&link.token) {
            return Err(StoreError::InvalidData(format!(
                "duplicate token: {}",
                link.token
            )));
        }
        inner.links.insert(link.token.clone(), link.clone());
        Ok(())
    }

    async fn get_share_link(&self, token: &str) -> Result<Option<ShareLink>> {
        let inner = self.inner.read().unwrap();
        Ok(inner.links.get(token).cloned())
    }

    async fn redeem_share_link(&self, token: &str, now: i64) -> Result<RedeemOutcome> {
        // The write lock is held across check and increment, matching the
        // single-statement atomicity of the SQLite path.
        let mut inner = self.inner.write().unwrap();
        let Some(link) = inner.links.get_mut(token) else {
            return Ok(RedeemOutcome::NotFound);
        };
        if !link.is_active {
            return Ok(RedeemOutcome::Inactive);
        }
        if link.expires_at.is_some_and(|e| e <= now) {
            return Ok(RedeemOutcome::Expired);
        }
        if link.max_uses.is_some_and(|max| link.use_count >= max) {
            return Ok(RedeemOutcome::MaxUses);
        }
        link.use_count += 1;
        Ok(RedeemOutcome::Redeemed(link.clone()))
    }

    async fn set_share_link_active(&self, id: &str, active: bool) -> Result<bool> {
        let mut inner = self.inner.write().unwrap();
        match inner.links.values_mut().find(|l| l.id == id) {
            Some(l) => {
                l.is_active = active;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn list_share_links(&self) -> Result<Vec<ShareLink>> {
        let inner = self.inner.read().unwrap();
        let mut links: Vec<ShareLink> = inner.links.values().cloned().collect();
        links.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(links)
    }

    async fn delete_expired_share_links(&self, now: i64) -> Result<usize> {
        let mut inner = self.inner.write().unwrap();
        let before = inner.links.len();
        inner
            .links
            .retain(|_, l| !l.expires_at.is_some_and(|e| e <= now));
        Ok(before - inner.links.len())
    }

    async fn insert_version(&self, snapshot: NewVersionSnapshot) -> Result<VersionSnapshot> {
        let mut inner = self.inner.write().unwrap();
        let key = (snapshot.content_type, snapshot.item_id.clone());
        let history = inner.versions.entry(key).or_default();
        let version = history.last().map(|v| v.version).unwrap_or(0) + 1;

        let record = VersionSnapshot {
            id: Uuid::new_v4().to_string(),
            item_id: snapshot.item_id,
            content_type: snapshot.content_type,
            version,
            content: snapshot.content,
            content_hash: snapshot.content_hash,
            created_by: snapshot.created_by,
            message: snapshot.message,
            created_at: now_millis(),
        };
        history.push(record.clone());
        Ok(record)
    }

    async fn get_latest_version(
        &self,
        content_type: ContentType,
        item_id: &str,
    ) -> Result<Option<VersionSnapshot>> {
        let inner = self.inner.read().unwrap();
        Ok(inner
            .versions
            .get(&(content_type, item_id.to_string()))
            .and_then(|h| h.last())
            .cloned())
    }

    async fn get_version(
        &self,
        content_type: ContentType,
        item_id: &str,
        version: u64,
    ) -> Result<Option<VersionSnapshot>> {
        let inner = self.inner.read().unwrap();
        Ok(inner
            .versions
            .get(&(content_type, item_id.to_string()))
            .and_then(|h| h.iter().find(|v| v.version == version))
            .cloned())
    }

    async fn list_versions(
        &self,
        content_type: ContentType,
        item_id: &str,
        limit: usize,
    ) -> Result<Vec<VersionSnapshot>> {
        let inner = self.inner.read().unwrap();
        Ok(inner
            .versions
            .get(&(content_type, item_id.to_string()))
            .map(|h| h.iter().rev().take(limit).cloned().collect())
            .unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mekvault_core::ChangeType;

    #[tokio::test]
    async fn test_memory_matches_sqlite_version_semantics() {
        let store = MemoryStore::new();

        let c1 = store
            .append_change(NewChange {
                change_type: ChangeType::Create,
                content_type: ContentType::Units,
                item_id: "a".into(),
                content_hash: "h1".into(),
                data: None,
                source_id: None,
            })
            .await
            .unwrap();
        let c2 = store
            .append_change(NewChange {
                change_type: ChangeType::Update,
                content_type: ContentType::Units,
                item_id: "a".into(),
                content_hash: "h2".into(),
                data: None,
                source_id: Some("peer-1".into()),
            })
            .await
            .unwrap();

        assert_eq!(c1.version, 1);
        assert!(!c1.synced);
        assert_eq!(c2.version, 2);
        assert!(c2.synced);

        let latest = store
            .latest_change_for_item(ContentType::Units, "a")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(latest.content_hash, "h2");
    }

    #[tokio::test]
    async fn test_memory_redeem_budget() {
        let store = MemoryStore::new();
        let link = ShareLink {
            id: "l1".into(),
            token: "tok".into(),
            scope: crate::records::ShareScope::All,
            level: crate::records::PermissionLevel::Read,
            expires_at: None,
            max_uses: Some(1),
            use_count: 0,
            created_at: now_millis(),
            label: None,
            is_active: true,
        };
        store.insert_share_link(&link).await.unwrap();

        let first = store.redeem_share_link("tok", now_millis()).await.unwrap();
        assert!(matches!(first, RedeemOutcome::Redeemed(_)));
        let second = store.redeem_share_link("tok", now_millis()).await.unwrap();
        assert_eq!(second, RedeemOutcome::MaxUses);
    }

    #[tokio::test]
    async fn test_memory_duplicate_token_rejected() {
        let store = MemoryStore::new();
        let link = ShareLink {
            id: "l1".into(),
            token: "tok".into(),
            scope: crate::records::ShareScope::All,
            level: crate::records::PermissionLevel::Read,
            expires_at: None,
            max_uses: None,
            use_count: 0,
            created_at: now_millis(),
            label: None,
            is_active: true,
        };
        store.insert_share_link(&link).await.unwrap();
        assert!(store.insert_share_link(&link).await.is_err());
    }
}
