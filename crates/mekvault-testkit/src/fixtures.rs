//! Test fixtures and helpers.
//!
//! Common setup code for integration tests.

use std::sync::Arc;

use mekvault_core::{
    create_bundle, encode_friend_code, now_millis, BundleOptions, ContentType, Keypair,
    ShareableBundle, VaultIdentity, VaultItem,
};
use mekvault_store::MemoryStore;
use mekvault_sync::PeerId;

/// A test fixture with an unlocked identity and an in-memory store.
pub struct TestFixture {
    pub identity: VaultIdentity,
    pub store: Arc<MemoryStore>,
}

impl TestFixture {
    /// Create a fixture with a random identity named "Ace".
    pub fn new() -> Self {
        Self::with_name("Ace")
    }

    /// Create a fixture with a random identity and the given name.
    pub fn with_name(name: &str) -> Self {
        let (identity, _) = VaultIdentity::create(name, "test-password")
            .expect("fixture identity creation");
        Self {
            identity,
            store: Arc::new(MemoryStore::new()),
        }
    }

    /// Create with a deterministic keypair from a seed. Useful when a test
    /// needs stable keys, friend codes, or signatures across runs.
    pub fn with_seed(name: &str, seed: [u8; 32]) -> Self {
        let keypair = Keypair::from_seed(&seed);
        let friend_code = encode_friend_code(&keypair.public_key());
        let identity = VaultIdentity {
            id: uuid::Uuid::new_v4().to_string(),
            display_name: name.to_string(),
            keypair,
            friend_code,
            created_at: now_millis(),
        };
        Self {
            identity,
            store: Arc::new(MemoryStore::new()),
        }
    }

    /// This fixture's peer id on a test network: the identity id.
    pub fn peer_id(&self) -> PeerId {
        PeerId::new(self.identity.id.clone())
    }

    /// A unit item with the given name and tonnage.
    pub fn make_unit(&self, name: &str, tonnage: u32) -> VaultItem {
        VaultItem::new(name, serde_json::json!({"tonnage": tonnage}))
    }

    /// A pilot item with the given name and skills.
    pub fn make_pilot(&self, name: &str, gunnery: u32, piloting: u32) -> VaultItem {
        VaultItem::new(
            name,
            serde_json::json!({"gunnery": gunnery, "piloting": piloting}),
        )
    }

    /// A signed bundle over the given items.
    pub fn make_bundle(&self, content_type: ContentType, items: &[VaultItem]) -> ShareableBundle {
        let (bundle, _) = create_bundle(content_type, items, &self.identity, BundleOptions::default())
            .expect("fixture bundle creation");
        bundle
    }

    /// A signed bundle serialized to its on-disk JSON form.
    pub fn make_bundle_json(&self, content_type: ContentType, items: &[VaultItem]) -> String {
        serde_json::to_string(&self.make_bundle(content_type, items))
            .expect("fixture bundle serialization")
    }
}

impl Default for TestFixture {
    fn default() -> Self {
        Self::new()
    }
}

/// Fixtures for a two-party sync scenario.
pub fn sync_pair() -> (TestFixture, TestFixture) {
    (TestFixture::with_name("Alice"), TestFixture::with_name("Bob"))
}
