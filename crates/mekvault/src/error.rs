//! Error types for vault-level operations.

use thiserror::Error;

/// Errors surfaced by the vault facade.
#[derive(Debug, Error)]
pub enum VaultError {
    /// Bundle signature verification failed and verification was required.
    #[error("bundle signature verification failed")]
    SignatureInvalid,

    /// The bundle's format version cannot be read by this build.
    #[error("unsupported bundle format version: {0}")]
    IncompatibleVersion(String),

    /// The bundle carries a different content type than the operation expects.
    #[error("content type mismatch: expected {expected}, bundle has {actual}")]
    ContentTypeMismatch {
        expected: mekvault_core::ContentType,
        actual: mekvault_core::ContentType,
    },

    /// A requested item or version does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// Invalid caller input.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// Identity, crypto, or bundle format failure.
    #[error(transparent)]
    Core(#[from] mekvault_core::CoreError),

    /// Persistence failure.
    #[error(transparent)]
    Store(#[from] mekvault_store::StoreError),

    /// Share-link failure.
    #[error(transparent)]
    Share(#[from] mekvault_share::ShareError),

    /// Sync-protocol failure.
    #[error(transparent)]
    Sync(#[from] mekvault_sync::SyncError),

    /// (De)serialization failure.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result type for vault operations.
pub type Result<T> = std::result::Result<T, VaultError>;
