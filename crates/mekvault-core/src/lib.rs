//! # MekVault Core
//!
//! Pure primitives for the MekVault sync & sharing engine: identities,
//! friend codes, and signed export bundles.
//!
//! This crate contains no I/O, no storage, no networking. It is pure
//! computation over cryptographic data structures.
//!
//! ## Key Types
//!
//! - [`VaultIdentity`] / [`StoredIdentity`] - signing identity, unlocked and at rest
//! - [`ShareableBundle`] - a signed, versioned export container
//! - [`ContentHash`] - Blake3 content address
//! - [`ContentType`] / [`ChangeType`] - domain discriminators
//!
//! ## Trust model
//!
//! Peers verify each other out-of-band via friend codes (80-bit public key
//! fingerprints); there is no certificate authority. Private keys are never
//! persisted unencrypted: see [`EncryptedSecret`].

pub mod bundle;
pub mod crypto;
pub mod error;
pub mod friendcode;
pub mod identity;
pub mod types;

pub use bundle::{
    create_bundle, is_version_compatible, parse_and_verify_bundle, parse_bundle, verify_bundle,
    BundleMetadata, BundleOptions, ShareableBundle, VerifiedBundle, BUNDLE_EXTENSION,
    BUNDLE_FORMAT_VERSION, BUNDLE_MIME_TYPE, SUPPORTED_MAJOR_VERSION,
};
pub use crypto::{
    Blake3Strategy, ContentHash, Ed25519PublicKey, Ed25519Signature, EncryptedSecret,
    HashStrategy, Keypair, DEFAULT_KDF_ITERATIONS, MIN_KDF_ITERATIONS,
};
pub use error::{CoreError, Result};
pub use friendcode::{
    decode_friend_code, encode_friend_code, friend_code_matches_public_key,
    FRIEND_CODE_PREFIX_LEN,
};
pub use identity::{verify_message, PublicIdentity, StoredIdentity, VaultIdentity};
pub use types::{now_millis, ChangeType, ContentType, VaultItem};
