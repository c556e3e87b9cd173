//! Proptest generators for property-based testing.

use proptest::prelude::*;

use mekvault_core::{ChangeType, ContentHash, ContentType, Keypair, VaultItem};
use mekvault_store::NewChange;

/// Generate a random keypair.
pub fn keypair() -> impl Strategy<Value = Keypair> {
    any::<[u8; 32]>().prop_map(|seed| Keypair::from_seed(&seed))
}

/// Generate a content type.
pub fn content_type() -> impl Strategy<Value = ContentType> {
    prop_oneof![
        Just(ContentType::Units),
        Just(ContentType::Pilots),
        Just(ContentType::Forces),
        Just(ContentType::Encounters),
    ]
}

/// Generate a change type.
pub fn change_type() -> impl Strategy<Value = ChangeType> {
    prop_oneof![
        Just(ChangeType::Create),
        Just(ChangeType::Update),
        Just(ChangeType::Delete),
        Just(ChangeType::Move),
    ]
}

/// Generate a plausible item display name.
pub fn item_name() -> impl Strategy<Value = String> {
    "[A-Z][a-z]{2,11}( [A-Z]{2,3}-[0-9][A-Z])?"
}

/// Generate a vault item with a small JSON payload.
pub fn vault_item() -> impl Strategy<Value = VaultItem> {
    (item_name(), 20u32..=100).prop_map(|(name, tonnage)| {
        VaultItem::new(name, serde_json::json!({"tonnage": tonnage}))
    })
}

/// Generate a content hash (hex) from arbitrary bytes.
pub fn content_hash() -> impl Strategy<Value = String> {
    prop::collection::vec(any::<u8>(), 0..64)
        .prop_map(|bytes| ContentHash::hash(&bytes).to_hex())
}

/// Generate a local (sourceless) new change for a bounded set of item ids,
/// so generated logs contain per-item histories rather than only singletons.
pub fn new_change() -> impl Strategy<Value = NewChange> {
    (change_type(), content_type(), 0u8..8, content_hash()).prop_map(
        |(change_type, content_type, item, content_hash)| NewChange {
            change_type,
            content_type,
            item_id: format!("item-{}", item),
            content_hash,
            data: None,
            source_id: None,
        },
    )
}

/// Generate a reasonable timestamp (Unix ms).
pub fn timestamp() -> impl Strategy<Value = i64> {
    0i64..=i64::MAX / 2
}
