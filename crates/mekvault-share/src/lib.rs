//! # MekVault Share
//!
//! Capability-scoped share links for MekVault.
//!
//! ## Overview
//!
//! A share link is a bearer token granting scoped, leveled access to vault
//! content. Links can expire, carry a redemption budget, and be revoked.
//! Redemption is an atomic conditional increment in the store, so a link
//! with one use left yields exactly one successful redemption no matter
//! how many callers race for it.
//!
//! ## Key Types
//!
//! - [`ShareLinkService`] - create / redeem / revoke / list / cleanup
//! - [`CreateLinkOptions`] - scope, level, expiry, use budget
//! - [`ShareError`] - typed failures with stable UI error codes
//!
//! Scope and permission types ([`ShareScope`], [`PermissionLevel`]) are
//! re-exported from the store crate, where the persisted forms live.

pub mod error;
pub mod link;
pub mod service;
pub mod token;

pub use error::{Result, ShareError};
pub use link::CreateLinkOptions;
pub use service::ShareLinkService;
pub use token::{extract_token, generate_token, share_url, MIN_TOKEN_LEN, TOKEN_BYTES};

pub use mekvault_store::{PermissionLevel, ShareLink, ShareScope};
