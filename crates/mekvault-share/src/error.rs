//! Error types for share links.

use thiserror::Error;

/// Errors that can occur when creating or redeeming share links.
#[derive(Debug, Error)]
pub enum ShareError {
    /// Scope options failed validation (missing id, bad expiry, zero uses).
    #[error("invalid scope: {0}")]
    InvalidScope(String),

    /// No link exists for the token.
    #[error("share link not found")]
    NotFound,

    /// The link was deactivated.
    #[error("share link is inactive")]
    Inactive,

    /// The link's expiry time has passed.
    #[error("share link has expired")]
    Expired,

    /// The link's use budget is exhausted.
    #[error("share link has reached its maximum uses")]
    MaxUses,

    /// Underlying storage failure.
    #[error("store error: {0}")]
    Store(#[from] mekvault_store::StoreError),
}

impl ShareError {
    /// Stable error code for UI callers.
    pub const fn code(&self) -> &'static str {
        match self {
            ShareError::InvalidScope(_) => "INVALID_SCOPE",
            ShareError::NotFound => "NOT_FOUND",
            ShareError::Inactive => "INACTIVE",
            ShareError::Expired => "EXPIRED",
            ShareError::MaxUses => "MAX_USES",
            ShareError::Store(_) => "STORE_ERROR",
        }
    }
}

/// Result type for share link operations.
pub type Result<T> = std::result::Result<T, ShareError>;
