//! MekVault: a vault sync and sharing engine.
//!
//! # Overview
//!
//! This crate is the embedder-facing facade over the engine's layers:
//!
//! - `mekvault-core`: identities, friend codes, signed bundles.
//! - `mekvault-store`: SQLite/in-memory persistence for the change log,
//!   conflicts, offline queue, share links, and version history.
//! - `mekvault-share`: capability-scoped share links.
//! - `mekvault-sync`: the P2P protocol, connections, and offline queue.
//!
//! # Key Types
//!
//! - [`Vault`]: one unlocked vault. Records changes, surfaces conflicts,
//!   and hands out the sub-services below.
//! - [`Exporter`] / [`Importer`]: signed bundle export and two-phase,
//!   conflict-aware import.
//! - [`VersionHistory`]: per-item snapshots, shallow diffs, rollback.
//!
//! # Usage
//!
//! ```no_run
//! # use std::sync::Arc;
//! # use mekvault::{Vault, ExportOptions};
//! # use mekvault_core::{ChangeType, ContentType, VaultIdentity, VaultItem};
//! # use mekvault_store::MemoryStore;
//! # async fn demo() -> Result<(), Box<dyn std::error::Error>> {
//! let (identity, _stored) = VaultIdentity::create("Ace", "hunter2")?;
//! let vault = Vault::new(Arc::new(MemoryStore::new()), identity);
//!
//! let item = VaultItem::new("Atlas AS7-D", serde_json::json!({"tonnage": 100}));
//! vault
//!     .record_change(
//!         ChangeType::Create,
//!         ContentType::Units,
//!         &item.id,
//!         Some(&item.data.to_string()),
//!     )
//!     .await?;
//!
//! let export = vault.exporter().export_units(&[item], ExportOptions::default())?;
//! println!("wrote {}", export.filename);
//! # Ok(())
//! # }
//! ```
//!
//! # Design Notes
//!
//! The facade adds no semantics of its own. Correctness-critical paths
//! (version assignment, share-link redemption, queue status transitions)
//! live in the store as single atomic statements; the facade only wires
//! layers together and fixes the content hashing convention.

pub mod error;
pub mod export;
pub mod history;
pub mod import;
pub mod vault;

pub use error::{Result, VaultError};
pub use export::{ExportOptions, ExportResult, Exporter};
pub use history::{
    diff_contents, ApplyContent, SaveOptions, VersionDiff, VersionHistory,
};
pub use import::{
    ConflictKind, ImportConflict, ImportOptions, ImportPreview, ImportReport, ImportResolution,
    ImportTarget, Importer,
};
pub use vault::Vault;

pub use mekvault_core as core;
pub use mekvault_share as share;
pub use mekvault_store as store;
pub use mekvault_sync as sync;
