//! Database schema migrations for SQLite.
//!
//! We use a simple versioned migration system. Each migration is a SQL string
//! that transforms the schema from version N to N+1.

use rusqlite::Connection;

use crate::error::{Result, StoreError};

/// Current schema version.
pub const CURRENT_VERSION: u32 = 1;

/// Initialize or migrate the database schema.
///
/// This function is idempotent - it can be called multiple times safely.
pub fn migrate(conn: &mut Connection) -> Result<()> {
    // Create migrations table if it doesn't exist
    conn.execute(
        "CREATE TABLE IF NOT EXISTS schema_migrations (
            version INTEGER PRIMARY KEY,
            applied_at INTEGER NOT NULL
        )",
        [],
    )?;

    // Get current version
    let current: u32 = conn
        .query_row(
            "SELECT COALESCE(MAX(version), 0) FROM schema_migrations",
            [],
            |row| row.get(0),
        )
        .unwrap_or(0);

    // Apply migrations
    if current < CURRENT_VERSION {
        let tx = conn.transaction()?;

        for version in (current + 1)..=CURRENT_VERSION {
            apply_migration(&tx, version)?;

            tx.execute(
                "INSERT INTO schema_migrations (version, applied_at) VALUES (?1, ?2)",
                rusqlite::params![version, mekvault_core::now_millis()],
            )?;
        }

        tx.commit()?;
    }

    Ok(())
}

/// Apply a specific migration version.
fn apply_migration(conn: &Connection, version: u32) -> Result<()> {
    match version {
        1 => apply_v1(conn),
        _ => Err(StoreError::Migration(format!(
            "unknown migration version: {}",
            version
        ))),
    }
}

/// Migration v1: Initial schema.
///
/// Column layouts are a wire contract; changing them requires a new
/// migration, never an edit here.
fn apply_v1(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
        -- Append-only change log: one row per content mutation.
        -- `version` is globally unique and strictly increasing; `synced`
        -- is the only column ever updated after insert.
        CREATE TABLE vault_change_log (
            id TEXT PRIMARY KEY,              -- uuid
            change_type TEXT NOT NULL CHECK (change_type IN ('create','update','delete','move')),
            content_type TEXT NOT NULL CHECK (content_type IN ('units','pilots','forces','encounters')),
            item_id TEXT NOT NULL,
            timestamp INTEGER NOT NULL,       -- Unix ms
            version INTEGER NOT NULL UNIQUE,
            content_hash TEXT NOT NULL,
            data TEXT,                        -- optional inlined content (JSON)
            synced INTEGER NOT NULL DEFAULT 0 CHECK (synced IN (0,1)),
            source_id TEXT                    -- originating peer; NULL = local
        );

        -- Detected divergences awaiting explicit resolution.
        CREATE TABLE vault_sync_conflicts (
            id TEXT PRIMARY KEY,
            content_type TEXT NOT NULL CHECK (content_type IN ('units','pilots','forces','encounters')),
            item_id TEXT NOT NULL,
            item_name TEXT NOT NULL,
            local_version INTEGER NOT NULL,
            local_hash TEXT NOT NULL,
            remote_version INTEGER NOT NULL,
            remote_hash TEXT NOT NULL,
            remote_peer_id TEXT NOT NULL,
            detected_at INTEGER NOT NULL,
            resolution TEXT NOT NULL DEFAULT 'pending'
                CHECK (resolution IN ('pending','local','remote','merged','forked'))
        );

        -- Store-and-forward queue for offline peers.
        CREATE TABLE offline_queue (
            id TEXT PRIMARY KEY,
            target_peer_id TEXT NOT NULL,
            message_type TEXT NOT NULL,
            payload TEXT NOT NULL,
            queued_at INTEGER NOT NULL,
            expires_at INTEGER NOT NULL,
            attempts INTEGER NOT NULL DEFAULT 0,
            last_attempt_at INTEGER,
            status TEXT NOT NULL DEFAULT 'pending'
                CHECK (status IN ('pending','sending','sent','failed','expired')),
            priority INTEGER NOT NULL DEFAULT 0,
            size_bytes INTEGER NOT NULL       -- UTF-8 byte length of payload
        );

        -- Capability-scoped share links.
        CREATE TABLE vault_share_links (
            id TEXT PRIMARY KEY,
            token TEXT NOT NULL UNIQUE,
            scope_type TEXT NOT NULL CHECK (scope_type IN ('item','folder','category','all')),
            scope_id TEXT,
            scope_category TEXT CHECK (scope_category IN ('units','pilots','forces','encounters')),
            level TEXT NOT NULL CHECK (level IN ('read','write','admin')),
            expires_at INTEGER,               -- NULL = never expires
            max_uses INTEGER CHECK (max_uses > 0),  -- NULL = unlimited
            use_count INTEGER NOT NULL DEFAULT 0,
            created_at INTEGER NOT NULL,
            label TEXT,
            is_active INTEGER NOT NULL DEFAULT 1 CHECK (is_active IN (0,1))
        );

        -- Per-item version history: append-only snapshots.
        CREATE TABLE vault_versions (
            id TEXT PRIMARY KEY,
            item_id TEXT NOT NULL,
            content_type TEXT NOT NULL CHECK (content_type IN ('units','pilots','forces','encounters')),
            version INTEGER NOT NULL,         -- monotonic per (content_type, item_id)
            content TEXT NOT NULL,            -- serialized item content (JSON)
            content_hash TEXT NOT NULL,
            created_by TEXT NOT NULL,
            message TEXT,
            created_at INTEGER NOT NULL,

            UNIQUE(content_type, item_id, version)
        );

        -- Indexes for common queries
        CREATE INDEX idx_change_log_version ON vault_change_log(version);
        CREATE INDEX idx_change_log_item ON vault_change_log(content_type, item_id);
        CREATE INDEX idx_change_log_synced ON vault_change_log(synced);
        CREATE INDEX idx_conflicts_resolution ON vault_sync_conflicts(resolution);
        CREATE INDEX idx_queue_peer_status ON offline_queue(target_peer_id, status);
        CREATE INDEX idx_queue_expires ON offline_queue(expires_at);
        CREATE INDEX idx_versions_item ON vault_versions(content_type, item_id, version);
        "#,
    )?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_migration_creates_tables() {
        let mut conn = Connection::open_in_memory().unwrap();
        migrate(&mut conn).unwrap();

        // Verify tables exist
        let tables: Vec<String> = conn
            .prepare("SELECT name FROM sqlite_master WHERE type='table' ORDER BY name")
            .unwrap()
            .query_map([], |row| row.get(0))
            .unwrap()
            .collect::<std::result::Result<Vec<_>, _>>()
            .unwrap();

        assert!(tables.contains(&"vault_change_log".to_string()));
        assert!(tables.contains(&"vault_sync_conflicts".to_string()));
        assert!(tables.contains(&"offline_queue".to_string()));
        assert!(tables.contains(&"vault_share_links".to_string()));
        assert!(tables.contains(&"vault_versions".to_string()));
        assert!(tables.contains(&"schema_migrations".to_string()));
    }

    #[test]
    fn test_migration_idempotent() {
        let mut conn = Connection::open_in_memory().unwrap();
        migrate(&mut conn).unwrap();
        migrate(&mut conn).unwrap(); // Should not error
        migrate(&mut conn).unwrap(); // Still should not error

        // Verify version is 1
        let version: u32 = conn
            .query_row(
                "SELECT MAX(version) FROM schema_migrations",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(version, 1);
    }

    #[test]
    fn test_check_constraints_enforced() {
        let mut conn = Connection::open_in_memory().unwrap();
        migrate(&mut conn).unwrap();

        // Unknown queue status must be rejected
        let result = conn.execute(
            "INSERT INTO offline_queue
                (id, target_peer_id, message_type, payload, queued_at, expires_at, status, size_bytes)
             VALUES ('m1', 'p1', 'change', '{}', 0, 0, 'lost', 2)",
            [],
        );
        assert!(result.is_err());

        // Zero max_uses must be rejected
        let result = conn.execute(
            "INSERT INTO vault_share_links
                (id, token, scope_type, level, max_uses, created_at)
             VALUES ('l1', 't1', 'all', 'read', 0, 0)",
            [],
        );
        assert!(result.is_err());
    }
}
