//! # MekVault Store
//!
//! Storage abstraction for MekVault. Provides a trait-based interface for
//! vault persistence with SQLite and in-memory implementations.
//!
//! ## Overview
//!
//! The store module abstracts persistence behind the [`Store`] trait,
//! keeping the sync engine storage-agnostic. The primary implementation
//! is [`SqliteStore`], with [`MemoryStore`] for testing.
//!
//! ## Key Types
//!
//! - [`Store`] - The async trait for all storage operations
//! - [`SqliteStore`] - SQLite-based persistent storage
//! - [`MemoryStore`] - In-memory storage for tests
//! - [`ChangeLogEntry`] - One row of the append-only change log
//! - [`QueuedMessage`] - A store-and-forward message for an offline peer
//! - [`ShareLink`] - A capability-scoped share link
//! - [`VersionSnapshot`] - One entry of an item's version history
//!
//! ## Usage
//!
//! ```rust,no_run
//! use mekvault_store::{SqliteStore, Store};
//!
//! async fn example() {
//!     // Open a SQLite database
//!     let store = SqliteStore::open("vault.db").unwrap();
//!
//!     // Or use an in-memory database for testing
//!     let store = SqliteStore::open_memory().unwrap();
//!
//!     let version = store.current_version().await.unwrap();
//!     assert_eq!(version, 0);
//! }
//! ```
//!
//! ## Design Notes
//!
//! - **Atomic counters**: change-log and history versions are assigned
//!   inside the INSERT statement, never read-then-write
//! - **Guarded transitions**: queue status changes and share-link
//!   redemption are conditional single-statement updates
//! - **Append-only logs**: change log and version history rows are never
//!   rewritten once inserted

pub mod error;
pub mod memory;
pub mod migration;
pub mod records;
pub mod sqlite;
pub mod traits;

pub use error::{Result, StoreError};
pub use memory::MemoryStore;
pub use records::{
    ChangeLogEntry, ConflictResolution, NewChange, NewConflict, NewQueuedMessage,
    NewVersionSnapshot, PermissionLevel, QueueStatus, QueuedMessage, RedeemOutcome, ShareLink,
    ShareScope, SyncConflict, VersionSnapshot,
};
pub use sqlite::SqliteStore;
pub use traits::Store;
