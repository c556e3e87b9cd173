//! SQLite implementation of the Store trait.
//!
//! This is the primary storage backend for MekVault. It uses rusqlite with
//! bundled SQLite, wrapped in async via tokio::spawn_blocking.

use std::path::Path;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use rusqlite::{params, Connection, OptionalExtension};
use uuid::Uuid;

use mekvault_core::{now_millis, ChangeType, ContentType};

use crate::error::{Result, StoreError};
use crate::migration;
use crate::records::{
    ChangeLogEntry, ConflictResolution, NewChange, NewConflict, NewQueuedMessage,
    NewVersionSnapshot, QueueStatus, QueuedMessage, RedeemOutcome, ShareLink, ShareScope,
    SyncConflict, VersionSnapshot,
};
use crate::traits::Store;

/// SQLite-based store implementation.
///
/// Thread-safe via internal Mutex. All operations use spawn_blocking
/// to avoid blocking the async runtime.
pub struct SqliteStore {
    /// The SQLite connection, protected by a mutex.
    conn: Arc<Mutex<Connection>>,
}

impl SqliteStore {
    /// Open a SQLite database at the given path.
    ///
    /// Creates the file and runs migrations if it doesn't exist.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let mut conn = Connection::open(path)?;
        migration::migrate(&mut conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Open an in-memory SQLite database.
    ///
    /// Useful for testing.
    pub fn open_memory() -> Result<Self> {
        let mut conn = Connection::open_in_memory()?;
        migration::migrate(&mut conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Run a closure against the connection on a blocking thread.
    async fn blocking<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Connection) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let conn = self.conn.clone();
        tokio::task::spawn_blocking(move || {
            let conn = conn
                .lock()
                .map_err(|e| StoreError::Task(format!("mutex poisoned: {}", e)))?;
            f(&conn)
        })
        .await
        .map_err(|e| StoreError::Task(format!("spawn_blocking failed: {}", e)))?
    }
}

fn bad_col(name: &str) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(
        0,
        rusqlite::types::Type::Text,
        format!("invalid value in column {}", name).into(),
    )
}

// Row mapping helpers. These return rusqlite errors so they compose with
// query_row/query_map; enum parse failures surface as conversion failures.

fn row_to_change(row: &rusqlite::Row<'_>) -> rusqlite::Result<ChangeLogEntry> {
    let change_type: String = row.get("change_type")?;
    let content_type: String = row.get("content_type")?;
    Ok(ChangeLogEntry {
        id: row.get("id")?,
        change_type: ChangeType::parse(&change_type).ok_or_else(|| bad_col("change_type"))?,
        content_type: ContentType::parse(&content_type).ok_or_else(|| bad_col("content_type"))?,
        item_id: row.get("item_id")?,
        timestamp: row.get("timestamp")?,
        version: row.get::<_, i64>("version")? as u64,
        content_hash: row.get("content_hash")?,
        data: row.get("data")?,
        synced: row.get::<_, i64>("synced")? != 0,
        source_id: row.get("source_id")?,
    })
}

fn row_to_conflict(row: &rusqlite::Row<'_>) -> rusqlite::Result<SyncConflict> {
    let content_type: String = row.get("content_type")?;
    let resolution: String = row.get("resolution")?;
    Ok(SyncConflict {
        id: row.get("id")?,
        content_type: ContentType::parse(&content_type).ok_or_else(|| bad_col("content_type"))?,
        item_id: row.get("item_id")?,
        item_name: row.get("item_name")?,
        local_version: row.get::<_, i64>("local_version")? as u64,
        local_hash: row.get("local_hash")?,
        remote_version: row.get::<_, i64>("remote_version")? as u64,
        remote_hash: row.get("remote_hash")?,
        remote_peer_id: row.get("remote_peer_id")?,
        detected_at: row.get("detected_at")?,
        resolution: ConflictResolution::parse(&resolution).ok_or_else(|| bad_col("resolution"))?,
    })
}

fn row_to_message(row: &rusqlite::Row<'_>) -> rusqlite::Result<QueuedMessage> {
    let status: String = row.get("status")?;
    Ok(QueuedMessage {
        id: row.get("id")?,
        target_peer_id: row.get("target_peer_id")?,
        message_type: row.get("message_type")?,
        payload: row.get("payload")?,
        queued_at: row.get("queued_at")?,
        expires_at: row.get("expires_at")?,
        attempts: row.get::<_, i64>("attempts")? as u32,
        last_attempt_at: row.get("last_attempt_at")?,
        status: QueueStatus::parse(&status).ok_or_else(|| bad_col("status"))?,
        priority: row.get::<_, i64>("priority")? as i32,
        size_bytes: row.get::<_, i64>("size_bytes")? as u64,
    })
}

fn row_to_link(row: &rusqlite::Row<'_>) -> rusqlite::Result<ShareLink> {
    let scope_type: String = row.get("scope_type")?;
    let scope_id: Option<String> = row.get("scope_id")?;
    let scope_category: Option<String> = row.get("scope_category")?;
    let level: String = row.get("level")?;

    let scope = ShareScope::from_columns(&scope_type, scope_id, scope_category)
        .map_err(|_| bad_col("scope_type"))?;

    Ok(ShareLink {
        id: row.get("id")?,
        token: row.get("token")?,
        scope,
        level: crate::records::PermissionLevel::parse(&level).ok_or_else(|| bad_col("level"))?,
        expires_at: row.get("expires_at")?,
        max_uses: row.get::<_, Option<i64>>("max_uses")?.map(|v| v as u32),
        use_count: row.get::<_, i64>("use_count")? as u32,
        created_at: row.get("created_at")?,
        label: row.get("label")?,
        is_active: row.get::<_, i64>("is_active")? != 0,
    })
}

fn row_to_snapshot(row: &rusqlite::Row<'_>) -> rusqlite::Result<VersionSnapshot> {
    let content_type: String = row.get("content_type")?;
    Ok(VersionSnapshot {
        id: row.get("id")?,
        item_id: row.get("item_id")?,
        content_type: ContentType::parse(&content_type).ok_or_else(|| bad_col("content_type"))?,
        version: row.get::<_, i64>("version")? as u64,
        content: row.get("content")?,
        content_hash: row.get("content_hash")?,
        created_by: row.get("created_by")?,
        message: row.get("message")?,
        created_at: row.get("created_at")?,
    })
}

const CHANGE_COLS: &str =
    "id, change_type, content_type, item_id, timestamp, version, content_hash, data, synced, source_id";
const CONFLICT_COLS: &str =
    "id, content_type, item_id, item_name, local_version, local_hash, remote_version, remote_hash, remote_peer_id, detected_at, resolution";
const MESSAGE_COLS: &str =
    "id, target_peer_id, message_type, payload, queued_at, expires_at, attempts, last_attempt_at, status, priority, size_bytes";
const LINK_COLS: &str =
    "id, token, scope_type, scope_id, scope_category, level, expires_at, max_uses, use_count, created_at, label, is_active";
const SNAPSHOT_COLS: &str =
    "id, item_id, content_type, version, content, content_hash, created_by, message, created_at";

#[async_trait]
impl Store for SqliteStore {
    // ─────────────────────────────────────────────────────────────────────────
    // Change Log
    // ─────────────────────────────────────────────────────────────────────────

    async fn append_change(&self, change: NewChange) -> Result<ChangeLogEntry> {
        self.blocking(move |conn| {
            let id = Uuid::new_v4().to_string();
            let now = now_millis();
            let synced = change.source_id.is_some();

            // Version is assigned inside the INSERT itself. SQLite serializes
            // writers, so the scalar subquery and the insert are one atomic
            // step even under concurrent connections.
            conn.execute(
                "INSERT INTO vault_change_log
                    (id, change_type, content_type, item_id, timestamp, version,
                     content_hash, data, synced, source_id)
                 VALUES (?1, ?2, ?3, ?4, ?5,
                         (SELECT COALESCE(MAX(version), 0) + 1 FROM vault_change_log),
                         ?6, ?7, ?8, ?9)",
                params![
                    id,
                    change.change_type.as_str(),
                    change.content_type.as_str(),
                    change.item_id,
                    now,
                    change.content_hash,
                    change.data,
                    synced as i64,
                    change.source_id,
                ],
            )?;

            let entry = conn.query_row(
                &format!("SELECT {} FROM vault_change_log WHERE id = ?1", CHANGE_COLS),
                params![id],
                row_to_change,
            )?;
            Ok(entry)
        })
        .await
    }

    async fn get_changes_since(&self, version: u64, limit: usize) -> Result<Vec<ChangeLogEntry>> {
        self.blocking(move |conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {} FROM vault_change_log WHERE version > ?1 ORDER BY version LIMIT ?2",
                CHANGE_COLS
            ))?;
            let changes = stmt
                .query_map(params![version as i64, limit as i64], row_to_change)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(changes)
        })
        .await
    }

    async fn current_version(&self) -> Result<u64> {
        self.blocking(|conn| {
            let version: i64 = conn.query_row(
                "SELECT COALESCE(MAX(version), 0) FROM vault_change_log",
                [],
                |row| row.get(0),
            )?;
            Ok(version as u64)
        })
        .await
    }

    async fn latest_change_for_item(
        &self,
        content_type: ContentType,
        item_id: &str,
    ) -> Result<Option<ChangeLogEntry>> {
        let item_id = item_id.to_string();
        self.blocking(move |conn| {
            conn.query_row(
                &format!(
                    "SELECT {} FROM vault_change_log
                     WHERE content_type = ?1 AND item_id = ?2
                     ORDER BY version DESC LIMIT 1",
                    CHANGE_COLS
                ),
                params![content_type.as_str(), item_id],
                row_to_change,
            )
            .optional()
            .map_err(StoreError::from)
        })
        .await
    }

    async fn mark_change_synced(&self, change_id: &str) -> Result<()> {
        let change_id = change_id.to_string();
        self.blocking(move |conn| {
            conn.execute(
                "UPDATE vault_change_log SET synced = 1 WHERE id = ?1",
                params![change_id],
            )?;
            Ok(())
        })
        .await
    }

    async fn prune_synced_changes(&self, retain: usize) -> Result<usize> {
        self.blocking(move |conn| {
            // Unsynced entries are never pruned; they have not been
            // delivered to anyone yet.
            let deleted = conn.execute(
                "DELETE FROM vault_change_log
                 WHERE synced = 1 AND version NOT IN (
                     SELECT version FROM vault_change_log
                     WHERE synced = 1 ORDER BY version DESC LIMIT ?1
                 )",
                params![retain as i64],
            )?;
            Ok(deleted)
        })
        .await
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Conflicts
    // ─────────────────────────────────────────────────────────────────────────

    async fn record_conflict(&self, conflict: NewConflict) -> Result<SyncConflict> {
        self.blocking(move |conn| {
            let id = Uuid::new_v4().to_string();
            let now = now_millis();

            conn.execute(
                "INSERT INTO vault_sync_conflicts
                    (id, content_type, item_id, item_name, local_version, local_hash,
                     remote_version, remote_hash, remote_peer_id, detected_at, resolution)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, 'pending')",
                params![
                    id,
                    conflict.content_type.as_str(),
                    conflict.item_id,
                    conflict.item_name,
                    conflict.local_version as i64,
                    conflict.local_hash,
                    conflict.remote_version as i64,
                    conflict.remote_hash,
                    conflict.remote_peer_id,
                    now,
                ],
            )?;

            Ok(SyncConflict {
                id,
                content_type: conflict.content_type,
                item_id: conflict.item_id,
                item_name: conflict.item_name,
                local_version: conflict.local_version,
                local_hash: conflict.local_hash,
                remote_version: conflict.remote_version,
                remote_hash: conflict.remote_hash,
                remote_peer_id: conflict.remote_peer_id,
                detected_at: now,
                resolution: ConflictResolution::Pending,
            })
        })
        .await
    }

    async fn get_conflicts(&self, pending_only: bool) -> Result<Vec<SyncConflict>> {
        self.blocking(move |conn| {
            let sql = if pending_only {
                format!(
                    "SELECT {} FROM vault_sync_conflicts
                     WHERE resolution = 'pending' ORDER BY detected_at DESC",
                    CONFLICT_COLS
                )
            } else {
                format!(
                    "SELECT {} FROM vault_sync_conflicts ORDER BY detected_at DESC",
                    CONFLICT_COLS
                )
            };
            let mut stmt = conn.prepare(&sql)?;
            let conflicts = stmt
                .query_map([], row_to_conflict)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(conflicts)
        })
        .await
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
        let conflict_id = conflict_id.to_string();
        self.blocking(move |conn| {
            // The predicate makes resolution a one-shot transition.
            let updated = conn.execute(
                "UPDATE vault_sync_conflicts SET resolution = ?2
                 WHERE id = ?1 AND resolution = 'pending'",
                params![conflict_id, resolution.as_str()],
            )?;
            Ok(updated == 1)
        })
        .await
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Offline Queue
    // ─────────────────────────────────────────────────────────────────────────

    async fn enqueue_message(&self, message: NewQueuedMessage) -> Result<QueuedMessage> {
        self.blocking(move |conn| {
            let id = Uuid::new_v4().to_string();
            let now = now_millis();
            let size_bytes = message.payload.len() as u64;

            conn.execute(
                "INSERT INTO offline_queue
                    (id, target_peer_id, message_type, payload, queued_at, expires_at,
                     attempts, last_attempt_at, status, priority, size_bytes)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, 0, NULL, 'pending', ?7, ?8)",
                params![
                    id,
                    message.target_peer_id,
                    message.message_type,
                    message.payload,
                    now,
                    message.expires_at,
                    message.priority,
                    size_bytes as i64,
                ],
            )?;

            Ok(QueuedMessage {
                id,
                target_peer_id: message.target_peer_id,
                message_type: message.message_type,
                payload: message.payload,
                queued_at: now,
                expires_at: message.expires_at,
                attempts: 0,
                last_attempt_at: None,
                status: QueueStatus::Pending,
                priority: message.priority,
                size_bytes,
            })
        })
        .await
    }

    async fn get_message(&self, id: &str) -> Result<Option<QueuedMessage>> {
        let id = id.to_string();
        self.blocking(move |conn| {
            conn.query_row(
                &format!("SELECT {} FROM offline_queue WHERE id = ?1", MESSAGE_COLS),
                params![id],
                row_to_message,
            )
            .optional()
            .map_err(StoreError::from)
        })
        .await
    }

    async fn get_pending_for_peer(&self, peer_id: &str) -> Result<Vec<QueuedMessage>> {
        let peer_id = peer_id.to_string();
        self.blocking(move |conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {} FROM offline_queue
                 WHERE target_peer_id = ?1 AND status = 'pending'
                 ORDER BY priority DESC, queued_at ASC",
                MESSAGE_COLS
            ))?;
            let messages = stmt
                .query_map(params![peer_id], row_to_message)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(messages)
        })
        .await
    }

    async fn peers_with_pending(&self) -> Result<Vec<String>> {
        self.blocking(|conn| {
            let mut stmt = conn.prepare(
                "SELECT DISTINCT target_peer_id FROM offline_queue
                 WHERE status = 'pending' ORDER BY target_peer_id",
            )?;
            let peers = stmt
                .query_map([], |row| row.get(0))?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(peers)
        })
        .await
    }

    async fn mark_sending(&self, id: &str) -> Result<bool> {
        let id = id.to_string();
        self.blocking(move |conn| {
            let updated = conn.execute(
                "UPDATE offline_queue SET status = 'sending' WHERE id = ?1 AND status = 'pending'",
                params![id],
            )?;
            Ok(updated == 1)
        })
        .await
    }

    async fn mark_sent(&self, id: &str) -> Result<bool> {
        let id = id.to_string();
        self.blocking(move |conn| {
            let updated = conn.execute(
                "UPDATE offline_queue SET status = 'sent', last_attempt_at = ?2
                 WHERE id = ?1 AND status = 'sending'",
                params![id, now_millis()],
            )?;
            Ok(updated == 1)
        })
        .await
    }

    async fn mark_failed(&self, id: &str, max_attempts: u32) -> Result<bool> {
        let id = id.to_string();
        self.blocking(move |conn| {
            // Attempt count, timestamp, and the resulting status are decided
            // in one statement so two failure reports cannot interleave.
            let updated = conn.execute(
                "UPDATE offline_queue SET
                    attempts = attempts + 1,
                    last_attempt_at = ?2,
                    status = CASE WHEN attempts + 1 >= ?3 THEN 'failed' ELSE 'pending' END
                 WHERE id = ?1 AND status = 'sending'",
                params![id, now_millis(), max_attempts as i64],
            )?;
            Ok(updated == 1)
        })
        .await
    }

    async fn expire_messages(&self, now: i64) -> Result<usize> {
        self.blocking(move |conn| {
            let expired = conn.execute(
                "UPDATE offline_queue SET status = 'expired'
                 WHERE status IN ('pending', 'failed') AND expires_at <= ?1",
                params![now],
            )?;
            Ok(expired)
        })
        .await
    }

    async fn cleanup_messages(&self, cutoff: i64) -> Result<usize> {
        self.blocking(move |conn| {
            let deleted = conn.execute(
                "DELETE FROM offline_queue
                 WHERE status IN ('sent', 'expired')
                   AND COALESCE(last_attempt_at, queued_at) < ?1",
                params![cutoff],
            )?;
            Ok(deleted)
        })
        .await
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Share Links
    // ─────────────────────────────────────────────────────────────────────────

    async fn insert_share_link(&self, link: &ShareLink) -> Result<()> {
        let link = link.clone();
        self.blocking(move |conn| {
            conn.execute(
                "INSERT INTO vault_share_links
                    (id, token, scope_type, scope_id, scope_category, level,
                     expires_at, max_uses, use_count, created_at, label, is_active)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
                params![
                    link.id,
                    link.token,
                    link.scope.type_str(),
                    link.scope.scope_id(),
                    link.scope.scope_category().map(|c| c.as_str()),
                    link.level.as_str(),
                    link.expires_at,
                    link.max_uses.map(|v| v as i64),
                    link.use_count as i64,
                    link.created_at,
                    link.label,
                    link.is_active as i64,
                ],
            )?;
            Ok(())
        })
        .await
    }

    async fn get_share_link(&self, token: &str) -> Result<Option<ShareLink>> {
        let token = token.to_string();
        self.blocking(move |conn| {
            conn.query_row(
                &format!("SELECT {} FROM vault_share_links WHERE token = ?1", LINK_COLS),
                params![token],
                row_to_link,
            )
            .optional()
            .map_err(StoreError::from)
        })
        .await
    }

    async fn redeem_share_link(&self, token: &str, now: i64) -> Result<RedeemOutcome> {
        let token = token.to_string();
        self.blocking(move |conn| {
            // The conditional increment is the whole atomicity argument:
            // every guard lives in the WHERE clause, so N concurrent
            // redemptions of a link with one use left produce exactly one
            // affected row.
            let updated = conn.execute(
                "UPDATE vault_share_links SET use_count = use_count + 1
                 WHERE token = ?1
                   AND is_active = 1
                   AND (expires_at IS NULL OR expires_at > ?2)
                   AND (max_uses IS NULL OR use_count < max_uses)",
                params![token, now],
            )?;

            if updated == 1 {
                let link = conn.query_row(
                    &format!("SELECT {} FROM vault_share_links WHERE token = ?1", LINK_COLS),
                    params![token],
                    row_to_link,
                )?;
                return Ok(RedeemOutcome::Redeemed(link));
            }

            // Zero rows: classify why for error reporting. The link may have
            // changed between the update and this read; either way the
            // redemption did not happen.
            let link = conn
                .query_row(
                    &format!("SELECT {} FROM vault_share_links WHERE token = ?1", LINK_COLS),
                    params![token],
                    row_to_link,
                )
                .optional()?;

            let outcome = match link {
                None => RedeemOutcome::NotFound,
                Some(l) if !l.is_active => RedeemOutcome::Inactive,
                Some(l) if l.expires_at.is_some_and(|e| e <= now) => RedeemOutcome::Expired,
                Some(_) => RedeemOutcome::MaxUses,
            };
            Ok(outcome)
        })
        .await
    }

    async fn set_share_link_active(&self, id: &str, active: bool) -> Result<bool> {
        let id = id.to_string();
        self.blocking(move |conn| {
            let updated = conn.execute(
                "UPDATE vault_share_links SET is_active = ?2 WHERE id = ?1",
                params![id, active as i64],
            )?;
            Ok(updated == 1)
        })
        .await
    }

    async fn list_share_links(&self) -> Result<Vec<ShareLink>> {
        self.blocking(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {} FROM vault_share_links ORDER BY created_at DESC",
                LINK_COLS
            ))?;
            let links = stmt
                .query_map([], row_to_link)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(links)
        })
        .await
    }

    async fn delete_expired_share_links(&self, now: i64) -> Result<usize> {
        self.blocking(move |conn| {
            let deleted = conn.execute(
                "DELETE FROM vault_share_links WHERE expires_at IS NOT NULL AND expires_at <= ?1",
                params![now],
            )?;
            Ok(deleted)
        })
        .await
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Version History
    // ─────────────────────────────────────────────────────────────────────────

    async fn insert_version(&self, snapshot: NewVersionSnapshot) -> Result<VersionSnapshot> {
        self.blocking(move |conn| {
            let id = Uuid::new_v4().to_string();
            let now = now_millis();

            // Per-item version assigned in the INSERT, same pattern as the
            // change log. The UNIQUE constraint backstops it.
            conn.execute(
                "INSERT INTO vault_versions
                    (id, item_id, content_type, version, content, content_hash,
                     created_by, message, created_at)
                 VALUES (?1, ?2, ?3,
                         (SELECT COALESCE(MAX(version), 0) + 1 FROM vault_versions
                          WHERE content_type = ?3 AND item_id = ?2),
                         ?4, ?5, ?6, ?7, ?8)",
                params![
                    id,
                    snapshot.item_id,
                    snapshot.content_type.as_str(),
                    snapshot.content,
                    snapshot.content_hash,
                    snapshot.created_by,
                    snapshot.message,
                    now,
                ],
            )?;

            let saved = conn.query_row(
                &format!("SELECT {} FROM vault_versions WHERE id = ?1", SNAPSHOT_COLS),
                params![id],
                row_to_snapshot,
            )?;
            Ok(saved)
        })
        .await
    }

    async fn get_latest_version(
        &self,
        content_type: ContentType,
        item_id: &str,
    ) -> Result<Option<VersionSnapshot>> {
        let item_id = item_id.to_string();
        self.blocking(move |conn| {
            conn.query_row(
                &format!(
                    "SELECT {} FROM vault_versions
                     WHERE content_type = ?1 AND item_id = ?2
                     ORDER BY version DESC LIMIT 1",
                    SNAPSHOT_COLS
                ),
                params![content_type.as_str(), item_id],
                row_to_snapshot,
            )
            .optional()
            .map_err(StoreError::from)
        })
        .await
    }

    async fn get_version(
        &self,
        content_type: ContentType,
        item_id: &str,
        version: u64,
    ) -> Result<Option<VersionSnapshot>> {
        let item_id = item_id.to_string();
        self.blocking(move |conn| {
            conn.query_row(
                &format!(
                    "SELECT {} FROM vault_versions
                     WHERE content_type = ?1 AND item_id = ?2 AND version = ?3",
                    SNAPSHOT_COLS
                ),
                params![content_type.as_str(), item_id, version as i64],
                row_to_snapshot,
            )
            .optional()
            .map_err(StoreError::from)
        })
        .await
    }

    async fn list_versions(
        &self,
        content_type: ContentType,
        item_id: &str,
        limit: usize,
    ) -> Result<Vec<VersionSnapshot>> {
        let item_id = item_id.to_string();
        self.blocking(move |conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {} FROM vault_versions
                 WHERE content_type = ?1 AND item_id = ?2
                 ORDER BY version DESC LIMIT ?3",
                SNAPSHOT_COLS
            ))?;
            let versions = stmt
                .query_map(
                    params![content_type.as_str(), item_id, limit as i64],
                    row_to_snapshot,
                )?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(versions)
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::records::PermissionLevel;

    fn make_change(item_id: &str, hash: &str) -> NewChange {
        NewChange {
            change_type: ChangeType::Update,
            content_type: ContentType::Units,
            item_id: item_id.to_string(),
            content_hash: hash.to_string(),
            data: Some(r#"{"tonnage":100}"#.to_string()),
            source_id: None,
        }
    }

    fn make_link(token: &str, max_uses: Option<u32>, expires_at: Option<i64>) -> ShareLink {
        ShareLink {
            id: Uuid::new_v4().to_string(),
            token: token.to_string(),
            scope: ShareScope::Item { id: "unit-42".into() },
            level: PermissionLevel::Read,
            expires_at,
            max_uses,
            use_count: 0,
            created_at: now_millis(),
            label: None,
            is_active: true,
        }
    }

    #[tokio::test]
    async fn test_append_assigns_sequential_versions() {
        let store = SqliteStore::open_memory().unwrap();

        let c1 = store.append_change(make_change("a", "h1")).await.unwrap();
        let c2 = store.append_change(make_change("b", "h2")).await.unwrap();
        let c3 = store.append_change(make_change("a", "h3")).await.unwrap();

        assert_eq!(c1.version, 1);
        assert_eq!(c2.version, 2);
        assert_eq!(c3.version, 3);
        assert_eq!(store.current_version().await.unwrap(), 3);
    }

    #[tokio::test]
    async fn test_local_changes_unsynced_remote_synced() {
        let store = SqliteStore::open_memory().unwrap();

        let local = store.append_change(make_change("a", "h1")).await.unwrap();
        assert!(!local.synced);

        let mut remote = make_change("b", "h2");
        remote.source_id = Some("peer-1".to_string());
        let remote = store.append_change(remote).await.unwrap();
        assert!(remote.synced);
    }

    #[tokio::test]
    async fn test_get_changes_since_pagination() {
        let store = SqliteStore::open_memory().unwrap();
        for i in 0..5 {
            store
                .append_change(make_change(&format!("item-{}", i), "h"))
                .await
                .unwrap();
        }

        let page = store.get_changes_since(2, 2).await.unwrap();
        assert_eq!(page.len(), 2);
        assert_eq!(page[0].version, 3);
        assert_eq!(page[1].version, 4);

        let rest = store.get_changes_since(4, 100).await.unwrap();
        assert_eq!(rest.len(), 1);
        assert_eq!(rest[0].version, 5);
    }

    #[tokio::test]
    async fn test_prune_preserves_unsynced() {
        let store = SqliteStore::open_memory().unwrap();
        for i in 0..4 {
            let c = store
                .append_change(make_change(&format!("item-{}", i), "h"))
                .await
                .unwrap();
            if i < 3 {
                store.mark_change_synced(&c.id).await.unwrap();
            }
        }

        let deleted = store.prune_synced_changes(1).await.unwrap();
        assert_eq!(deleted, 2);

        // The unsynced entry and the newest synced entry survive
        let remaining = store.get_changes_since(0, 100).await.unwrap();
        assert_eq!(remaining.len(), 2);
        assert!(remaining.iter().any(|c| !c.synced));
    }

    #[tokio::test]
    async fn test_conflict_resolved_exactly_once() {
        let store = SqliteStore::open_memory().unwrap();
        let conflict = store
            .record_conflict(NewConflict {
                content_type: ContentType::Units,
                item_id: "unit-1".into(),
                item_name: "Atlas".into(),
                local_version: 5,
                local_hash: "lh".into(),
                remote_version: 7,
                remote_hash: "rh".into(),
                remote_peer_id: "peer-1".into(),
            })
            .await
            .unwrap();

        assert_eq!(conflict.resolution, ConflictResolution::Pending);
        assert_eq!(store.get_conflicts(true).await.unwrap().len(), 1);

        let first = store
            .resolve_conflict(&conflict.id, ConflictResolution::Local)
            .await
            .unwrap();
        assert!(first);

        let second = store
            .resolve_conflict(&conflict.id, ConflictResolution::Remote)
            .await
            .unwrap();
        assert!(!second);

        assert!(store.get_conflicts(true).await.unwrap().is_empty());
        let all = store.get_conflicts(false).await.unwrap();
        assert_eq!(all[0].resolution, ConflictResolution::Local);
    }

    #[tokio::test]
    async fn test_resolve_to_pending_rejected() {
        let store = SqliteStore::open_memory().unwrap();
        let result = store
            .resolve_conflict("nope", ConflictResolution::Pending)
            .await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_queue_priority_ordering() {
        let store = SqliteStore::open_memory().unwrap();
        let expires = now_millis() + 60_000;

        for (i, priority) in [1, 5, 1].iter().enumerate() {
            store
                .enqueue_message(NewQueuedMessage {
                    target_peer_id: "P1".into(),
                    message_type: "change".into(),
                    payload: format!("{{\"n\":{}}}", i),
                    expires_at: expires,
                    priority: *priority,
                })
                .await
                .unwrap();
        }

        let pending = store.get_pending_for_peer("P1").await.unwrap();
        let priorities: Vec<i32> = pending.iter().map(|m| m.priority).collect();
        assert_eq!(priorities, vec![5, 1, 1]);
        // Equal priorities keep queue order
        assert!(pending[1].queued_at <= pending[2].queued_at);
    }

    #[tokio::test]
    async fn test_queue_status_transitions() {
        let store = SqliteStore::open_memory().unwrap();
        let msg = store
            .enqueue_message(NewQueuedMessage {
                target_peer_id: "P1".into(),
                message_type: "change".into(),
                payload: "{}".into(),
                expires_at: now_millis() + 60_000,
                priority: 0,
            })
            .await
            .unwrap();

        // sent is only reachable from sending
        assert!(!store.mark_sent(&msg.id).await.unwrap());

        assert!(store.mark_sending(&msg.id).await.unwrap());
        // a message already in flight cannot be claimed again
        assert!(!store.mark_sending(&msg.id).await.unwrap());

        assert!(store.mark_sent(&msg.id).await.unwrap());
        let saved = store.get_message(&msg.id).await.unwrap().unwrap();
        assert_eq!(saved.status, QueueStatus::Sent);
    }

    #[tokio::test]
    async fn test_five_failures_reach_failed() {
        let store = SqliteStore::open_memory().unwrap();
        let msg = store
            .enqueue_message(NewQueuedMessage {
                target_peer_id: "P1".into(),
                message_type: "change".into(),
                payload: "{}".into(),
                expires_at: now_millis() + 60_000,
                priority: 0,
            })
            .await
            .unwrap();

        for attempt in 1..=5u32 {
            assert!(store.mark_sending(&msg.id).await.unwrap());
            assert!(store.mark_failed(&msg.id, 5).await.unwrap());

            let saved = store.get_message(&msg.id).await.unwrap().unwrap();
            assert_eq!(saved.attempts, attempt);
            if attempt < 5 {
                assert_eq!(saved.status, QueueStatus::Pending);
            } else {
                assert_eq!(saved.status, QueueStatus::Failed);
            }
        }
    }

    #[tokio::test]
    async fn test_expire_and_cleanup() {
        let store = SqliteStore::open_memory().unwrap();
        let now = now_millis();

        store
            .enqueue_message(NewQueuedMessage {
                target_peer_id: "P1".into(),
                message_type: "change".into(),
                payload: "{}".into(),
                expires_at: now - 1,
                priority: 0,
            })
            .await
            .unwrap();
        store
            .enqueue_message(NewQueuedMessage {
                target_peer_id: "P1".into(),
                message_type: "change".into(),
                payload: "{}".into(),
                expires_at: now + 60_000,
                priority: 0,
            })
            .await
            .unwrap();

        assert_eq!(store.expire_messages(now).await.unwrap(), 1);
        assert_eq!(store.get_pending_for_peer("P1").await.unwrap().len(), 1);

        // Terminal rows older than the cutoff are deleted
        assert_eq!(store.cleanup_messages(now + 1).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_payload_size_is_byte_length() {
        let store = SqliteStore::open_memory().unwrap();
        let msg = store
            .enqueue_message(NewQueuedMessage {
                target_peer_id: "P1".into(),
                message_type: "change".into(),
                payload: "héllo".into(), // 5 chars, 6 bytes
                expires_at: now_millis() + 60_000,
                priority: 0,
            })
            .await
            .unwrap();
        assert_eq!(msg.size_bytes, 6);
    }

    #[tokio::test]
    async fn test_redeem_decrements_budget_atomically() {
        let store = SqliteStore::open_memory().unwrap();
        let link = make_link("tok-max2", Some(2), None);
        store.insert_share_link(&link).await.unwrap();
        let now = now_millis();

        let first = store.redeem_share_link("tok-max2", now).await.unwrap();
        assert!(matches!(first, RedeemOutcome::Redeemed(ref l) if l.use_count == 1));

        let second = store.redeem_share_link("tok-max2", now).await.unwrap();
        assert!(matches!(second, RedeemOutcome::Redeemed(ref l) if l.use_count == 2));

        let third = store.redeem_share_link("tok-max2", now).await.unwrap();
        assert_eq!(third, RedeemOutcome::MaxUses);
    }

    #[tokio::test]
    async fn test_concurrent_redeem_single_winner() {
        let store = Arc::new(SqliteStore::open_memory().unwrap());
        let link = make_link("tok-once", Some(1), None);
        store.insert_share_link(&link).await.unwrap();
        let now = now_millis();

        let mut handles = Vec::new();
        for _ in 0..8 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                store.redeem_share_link("tok-once", now).await.unwrap()
            }));
        }

        let mut successes = 0;
        for handle in handles {
            if matches!(handle.await.unwrap(), RedeemOutcome::Redeemed(_)) {
                successes += 1;
            }
        }
        assert_eq!(successes, 1);
    }

    #[tokio::test]
    async fn test_redeem_classifies_failures() {
        let store = SqliteStore::open_memory().unwrap();
        let now = now_millis();

        assert_eq!(
            store.redeem_share_link("missing", now).await.unwrap(),
            RedeemOutcome::NotFound
        );

        let expired = make_link("tok-expired", None, Some(now - 1));
        store.insert_share_link(&expired).await.unwrap();
        assert_eq!(
            store.redeem_share_link("tok-expired", now).await.unwrap(),
            RedeemOutcome::Expired
        );

        let revoked = make_link("tok-revoked", None, None);
        store.insert_share_link(&revoked).await.unwrap();
        store
            .set_share_link_active(&revoked.id, false)
            .await
            .unwrap();
        assert_eq!(
            store.redeem_share_link("tok-revoked", now).await.unwrap(),
            RedeemOutcome::Inactive
        );
    }

    #[tokio::test]
    async fn test_version_counter_is_per_item() {
        let store = SqliteStore::open_memory().unwrap();

        let snap = |item: &str| NewVersionSnapshot {
            item_id: item.to_string(),
            content_type: ContentType::Pilots,
            content: r#"{"gunnery":3}"#.into(),
            content_hash: "h".into(),
            created_by: "me".into(),
            message: None,
        };

        let a1 = store.insert_version(snap("pilot-a")).await.unwrap();
        let a2 = store.insert_version(snap("pilot-a")).await.unwrap();
        let b1 = store.insert_version(snap("pilot-b")).await.unwrap();

        assert_eq!(a1.version, 1);
        assert_eq!(a2.version, 2);
        assert_eq!(b1.version, 1);

        let latest = store
            .get_latest_version(ContentType::Pilots, "pilot-a")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(latest.version, 2);

        let listed = store
            .list_versions(ContentType::Pilots, "pilot-a", 10)
            .await
            .unwrap();
        assert_eq!(listed.len(), 2);
        assert_eq!(listed[0].version, 2); // newest first
    }

    #[tokio::test]
    async fn test_data_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("vault.db");

        {
            let store = SqliteStore::open(&path).unwrap();
            store
                .append_change(NewChange {
                    change_type: ChangeType::Create,
                    content_type: ContentType::Units,
                    item_id: "u1".into(),
                    content_hash: "h1".into(),
                    data: None,
                    source_id: None,
                })
                .await
                .unwrap();
        }

        let reopened = SqliteStore::open(&path).unwrap();
        assert_eq!(reopened.current_version().await.unwrap(), 1);
        let changes = reopened.get_changes_since(0, 10).await.unwrap();
        assert_eq!(changes.len(), 1);
        assert_eq!(changes[0].item_id, "u1");
    }
}
