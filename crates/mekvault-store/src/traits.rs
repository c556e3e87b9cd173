//! Store trait: the abstract interface for vault persistence.
//!
//! This trait keeps the engine storage-agnostic. Implementations include
//! SQLite (primary) and in-memory (for tests).

use async_trait::async_trait;
use mekvault_core::ContentType;

use crate::error::Result;
use crate::records::{
    ChangeLogEntry, ConflictResolution, NewChange, NewConflict, NewQueuedMessage,
    NewVersionSnapshot, QueuedMessage, RedeemOutcome, ShareLink, SyncConflict, VersionSnapshot,
};

/// The Store trait: async interface for vault persistence.
///
/// All methods are async to support both sync (SQLite) and async backends.
/// For SQLite, we use `spawn_blocking` internally to avoid blocking the
/// runtime.
///
/// # Design Notes
///
/// - **Atomic sequence allocation**: change-log and per-item history
///   versions are assigned inside a single INSERT statement, never by a
///   separate read followed by a write.
/// - **Conditional status transitions**: queue status changes and share-link
///   redemption are single guarded UPDATE statements, safe under concurrent
///   callers.
/// - **Append-only logs**: change log and version history rows are never
///   updated after insert except the change log's `synced` flag.
#[async_trait]
pub trait Store: Send + Sync {
    // ─────────────────────────────────────────────────────────────────────────
    // Change Log Operations
    // ─────────────────────────────────────────────────────────────────────────

    /// Append a change, assigning the next global version atomically.
    ///
    /// Entries with a `source_id` (received from a peer) insert as already
    /// synced; local entries insert unsynced.
    async fn append_change(&self, change: NewChange) -> Result<ChangeLogEntry>;

    /// Get changes strictly after `version`, ordered by version, up to `limit`.
    async fn get_changes_since(&self, version: u64, limit: usize) -> Result<Vec<ChangeLogEntry>>;

    /// The highest assigned change-log version (0 if empty).
    async fn current_version(&self) -> Result<u64>;

    /// The most recent change for one item, if any.
    async fn latest_change_for_item(
        &self,
        content_type: ContentType,
        item_id: &str,
    ) -> Result<Option<ChangeLogEntry>>;

    /// Mark a local change as acknowledged by a peer.
    async fn mark_change_synced(&self, change_id: &str) -> Result<()>;

    /// Delete synced entries beyond the newest `retain`, preserving all
    /// unsynced history. Returns the number of rows deleted.
    async fn prune_synced_changes(&self, retain: usize) -> Result<usize>;

    // ─────────────────────────────────────────────────────────────────────────
    // Conflict Operations
    // ─────────────────────────────────────────────────────────────────────────

    /// Record a detected conflict in `pending` resolution.
    async fn record_conflict(&self, conflict: NewConflict) -> Result<SyncConflict>;

    /// List conflicts, optionally only unresolved ones.
    async fn get_conflicts(&self, pending_only: bool) -> Result<Vec<SyncConflict>>;

    /// Resolve a pending conflict. Returns `false` if the conflict does not
    /// exist or was already resolved (resolution happens exactly once).
    async fn resolve_conflict(
        &self,
        conflict_id: &str,
        resolution: ConflictResolution,
    ) -> Result<bool>;

    // ─────────────────────────────────────────────────────────────────────────
    // Offline Queue Operations
    // ─────────────────────────────────────────────────────────────────────────

    /// Enqueue a message for later delivery.
    async fn enqueue_message(&self, message: NewQueuedMessage) -> Result<QueuedMessage>;

    /// Get a queued message by id.
    async fn get_message(&self, id: &str) -> Result<Option<QueuedMessage>>;

    /// Pending messages for one peer, ordered `priority DESC, queued_at ASC`.
    async fn get_pending_for_peer(&self, peer_id: &str) -> Result<Vec<QueuedMessage>>;

    /// Distinct peers that have pending messages.
    async fn peers_with_pending(&self) -> Result<Vec<String>>;

    /// `pending → sending`. Returns `false` if the message was not pending.
    async fn mark_sending(&self, id: &str) -> Result<bool>;

    /// `sending → sent` (terminal). Returns `false` if not sending.
    async fn mark_sent(&self, id: &str) -> Result<bool>;

    /// `sending → pending` (attempts < `max_attempts`) or `→ failed`.
    /// Increments the attempt counter and stamps the attempt time in the
    /// same statement. Returns `false` if the message was not sending.
    async fn mark_failed(&self, id: &str, max_attempts: u32) -> Result<bool>;

    /// `pending|failed → expired` for every message whose TTL has passed.
    /// Returns the number of messages expired.
    async fn expire_messages(&self, now: i64) -> Result<usize>;

    /// Delete terminal (sent/expired) messages last touched before `cutoff`.
    /// Returns the number of rows deleted.
    async fn cleanup_messages(&self, cutoff: i64) -> Result<usize>;

    // ─────────────────────────────────────────────────────────────────────────
    // Share Link Operations
    // ─────────────────────────────────────────────────────────────────────────

    /// Insert a new share link.
    async fn insert_share_link(&self, link: &ShareLink) -> Result<()>;

    /// Look up a share link by token.
    async fn get_share_link(&self, token: &str) -> Result<Option<ShareLink>>;

    /// Atomically redeem a share link: one conditional `use_count + 1`
    /// update guarded by active/expiry/max-use predicates, so concurrent
    /// redemptions of a nearly-exhausted link cannot all succeed. A zero-row
    /// update is classified by a follow-up read for error reporting.
    async fn redeem_share_link(&self, token: &str, now: i64) -> Result<RedeemOutcome>;

    /// Activate or deactivate a link. Returns `false` if it does not exist.
    async fn set_share_link_active(&self, id: &str, active: bool) -> Result<bool>;

    /// List all share links, newest first.
    async fn list_share_links(&self) -> Result<Vec<ShareLink>>;

    /// Delete links that expired before `now`. Returns the number deleted.
    async fn delete_expired_share_links(&self, now: i64) -> Result<usize>;

    // ─────────────────────────────────────────────────────────────────────────
    // Version History Operations
    // ─────────────────────────────────────────────────────────────────────────

    /// Insert a snapshot, assigning the next per-item version atomically.
    async fn insert_version(&self, snapshot: NewVersionSnapshot) -> Result<VersionSnapshot>;

    /// The latest snapshot for an item, if any.
    async fn get_latest_version(
        &self,
        content_type: ContentType,
        item_id: &str,
    ) -> Result<Option<VersionSnapshot>>;

    /// A specific snapshot by per-item version number.
    async fn get_version(
        &self,
        content_type: ContentType,
        item_id: &str,
        version: u64,
    ) -> Result<Option<VersionSnapshot>>;

    /// Snapshots for an item, newest first, up to `limit`.
    async fn list_versions(
        &self,
        content_type: ContentType,
        item_id: &str,
        limit: usize,
    ) -> Result<Vec<VersionSnapshot>>;
}
