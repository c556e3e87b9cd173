//! Error types for the core module.

use thiserror::Error;

/// Errors that can occur in core operations.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Public key bytes do not form a valid Ed25519 point.
    #[error("invalid public key")]
    InvalidPublicKey,

    /// Signature verification failed.
    #[error("invalid signature")]
    InvalidSignature,

    /// Friend code is malformed (wrong length or illegal symbol).
    #[error("invalid friend code: {0}")]
    InvalidFriendCode(String),

    /// Identity could not be unlocked (wrong password or corrupted ciphertext).
    ///
    /// The AEAD tag does not distinguish the two causes.
    #[error("unable to unlock identity: wrong password or corrupted data")]
    UnlockFailed,

    /// Key derivation parameters are out of range.
    #[error("invalid key derivation parameters: {0}")]
    InvalidKdfParams(String),

    /// Encryption failed.
    #[error("encryption error: {0}")]
    EncryptionError(String),

    /// Bundle payload is not valid JSON.
    #[error("bundle is not valid JSON: {0}")]
    NotJson(String),

    /// Bundle is structurally valid JSON but lacks a required field.
    #[error("bundle is missing required field: {0}")]
    MissingField(&'static str),

    /// Bundle format version is incompatible with this build.
    #[error("incompatible bundle version {found} (supported major: {supported})")]
    IncompatibleVersion { found: String, supported: u32 },

    /// Hex decoding failed.
    #[error("hex error: {0}")]
    Hex(#[from] hex::FromHexError),

    /// Serialization error.
    #[error("serialization error: {0}")]
    Serialization(String),
}

/// Result type for core operations.
pub type Result<T> = std::result::Result<T, CoreError>;
