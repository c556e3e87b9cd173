//! The vault facade: one handle wiring identity, store, sharing, history,
//! and sync together for embedders.

use std::sync::Arc;

use mekvault_core::{ChangeType, ContentHash, ContentType, VaultIdentity};
use mekvault_share::ShareLinkService;
use mekvault_store::{ChangeLogEntry, ConflictResolution, Store, SyncConflict};
use mekvault_sync::{ConnectionTable, LocalIdentity, SyncSession, Transport};

use crate::error::Result;
use crate::export::Exporter;
use crate::history::VersionHistory;
use crate::import::{ImportTarget, Importer};

/// One unlocked vault.
///
/// Cheap to share; everything heavyweight sits behind `Arc`s. The identity
/// holds the decrypted signing key, so a `Vault` must never outlive its
/// user session.
pub struct Vault<S: Store> {
    store: Arc<S>,
    identity: VaultIdentity,
}

impl<S: Store + 'static> Vault<S> {
    pub fn new(store: Arc<S>, identity: VaultIdentity) -> Self {
        Self { store, identity }
    }

    pub fn identity(&self) -> &VaultIdentity {
        &self.identity
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Change log
    // ─────────────────────────────────────────────────────────────────────────

    /// Record a local mutation. The content hash is computed here so every
    /// caller hashes the same way.
    pub async fn record_change(
        &self,
        change_type: ChangeType,
        content_type: ContentType,
        item_id: &str,
        content: Option<&str>,
    ) -> Result<ChangeLogEntry> {
        let content_hash = ContentHash::hash(content.unwrap_or("").as_bytes()).to_hex();
        let entry = self
            .store
            .append_change(mekvault_store::NewChange {
                change_type,
                content_type,
                item_id: item_id.to_string(),
                content_hash,
                data: content.map(str::to_string),
                source_id: None,
            })
            .await?;
        Ok(entry)
    }

    pub async fn changes_since(&self, version: u64, limit: usize) -> Result<Vec<ChangeLogEntry>> {
        Ok(self.store.get_changes_since(version, limit).await?)
    }

    pub async fn current_version(&self) -> Result<u64> {
        Ok(self.store.current_version().await?)
    }

    /// Prune synced change-log entries beyond the newest `retain`.
    pub async fn prune_changes(&self, retain: usize) -> Result<usize> {
        Ok(self.store.prune_synced_changes(retain).await?)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Conflicts
    // ─────────────────────────────────────────────────────────────────────────

    pub async fn pending_conflicts(&self) -> Result<Vec<SyncConflict>> {
        Ok(self.store.get_conflicts(true).await?)
    }

    /// Apply an operator's conflict decision. Returns `false` when the
    /// conflict was already resolved.
    pub async fn resolve_conflict(
        &self,
        conflict_id: &str,
        resolution: ConflictResolution,
    ) -> Result<bool> {
        Ok(self.store.resolve_conflict(conflict_id, resolution).await?)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Sub-services
    // ─────────────────────────────────────────────────────────────────────────

    /// Bundle exporter signing as this vault's identity.
    pub fn exporter(&self) -> Exporter<'_> {
        Exporter::new(&self.identity)
    }

    /// Bundle importer writing into `target`.
    pub fn importer<T: ImportTarget>(&self, target: Arc<T>) -> Importer<T> {
        Importer::new(target)
    }

    /// Share-link service over this vault's store.
    pub fn share_links(&self) -> ShareLinkService<S> {
        ShareLinkService::new(Arc::clone(&self.store))
    }

    /// Version history over this vault's store.
    pub fn history(&self) -> VersionHistory<S> {
        VersionHistory::new(Arc::clone(&self.store))
    }

    /// Build a sync session for this vault over `transport`.
    pub fn sync_session<T: Transport + 'static>(
        &self,
        transport: Arc<T>,
        connections: Arc<ConnectionTable>,
    ) -> SyncSession<S, T> {
        SyncSession::new(
            Arc::clone(&self.store),
            transport,
            connections,
            LocalIdentity {
                public_key: self.identity.keypair.public_key().to_hex(),
                display_name: self.identity.display_name.clone(),
                features: vec!["sync".to_string(), "share".to_string()],
            },
        )
    }
}
