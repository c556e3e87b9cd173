//! # MekVault Testkit
//!
//! Testing utilities for MekVault.
//!
//! ## Overview
//!
//! This crate provides:
//!
//! - **Fixtures**: unlocked identities, in-memory stores, and item/bundle
//!   factories for setting up test scenarios quickly.
//! - **Generators**: proptest strategies for property-based testing.
//!
//! ## Test Fixtures
//!
//! ```rust
//! use mekvault_core::ContentType;
//! use mekvault_testkit::fixtures::TestFixture;
//!
//! let fixture = TestFixture::new();
//! let bundle = fixture.make_bundle(
//!     ContentType::Units,
//!     &[fixture.make_unit("Atlas AS7-D", 100)],
//! );
//! assert!(mekvault_core::verify_bundle(&bundle));
//! ```
//!
//! ## Property Testing
//!
//! ```rust,ignore
//! use proptest::prelude::*;
//! use mekvault_testkit::generators;
//!
//! proptest! {
//!     #[test]
//!     fn friend_codes_are_stable(keypair in generators::keypair()) {
//!         let a = mekvault_core::encode_friend_code(&keypair.public_key());
//!         let b = mekvault_core::encode_friend_code(&keypair.public_key());
//!         prop_assert_eq!(a, b);
//!     }
//! }
//! ```

pub mod fixtures;
pub mod generators;

pub use fixtures::{sync_pair, TestFixture};
