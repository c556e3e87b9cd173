//! Shared domain types for MekVault.
//!
//! Content payloads are opaque to the sync engine; these types carry only
//! what the engine itself needs (ids, names, discriminators).

use serde::{Deserialize, Serialize};
use std::fmt;

/// The kind of content an item, change, or bundle refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContentType {
    /// A combat unit definition.
    Units,
    /// A pilot record.
    Pilots,
    /// A force: an ordered grouping of units and pilots.
    Forces,
    /// An encounter setup.
    Encounters,
}

impl ContentType {
    /// Stable string form, matching the persisted schema CHECK constraints.
    pub const fn as_str(&self) -> &'static str {
        match self {
            ContentType::Units => "units",
            ContentType::Pilots => "pilots",
            ContentType::Forces => "forces",
            ContentType::Encounters => "encounters",
        }
    }

    /// Parse from the stable string form.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "units" => Some(ContentType::Units),
            "pilots" => Some(ContentType::Pilots),
            "forces" => Some(ContentType::Forces),
            "encounters" => Some(ContentType::Encounters),
            _ => None,
        }
    }

    /// Singular noun, used in suggested bundle filenames.
    pub const fn singular(&self) -> &'static str {
        match self {
            ContentType::Units => "unit",
            ContentType::Pilots => "pilot",
            ContentType::Forces => "force",
            ContentType::Encounters => "encounter",
        }
    }
}

impl fmt::Display for ContentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The kind of mutation recorded in the change log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeType {
    Create,
    Update,
    Delete,
    Move,
}

impl ChangeType {
    /// Stable string form, matching the persisted schema CHECK constraints.
    pub const fn as_str(&self) -> &'static str {
        match self {
            ChangeType::Create => "create",
            ChangeType::Update => "update",
            ChangeType::Delete => "delete",
            ChangeType::Move => "move",
        }
    }

    /// Parse from the stable string form.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "create" => Some(ChangeType::Create),
            "update" => Some(ChangeType::Update),
            "delete" => Some(ChangeType::Delete),
            "move" => Some(ChangeType::Move),
            _ => None,
        }
    }
}

impl fmt::Display for ChangeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A user-owned content item as seen by the sync engine.
///
/// The `data` field is the domain payload and is never interpreted here
/// beyond serialization.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VaultItem {
    /// Stable item id (uuid string).
    pub id: String,
    /// Display name, used for soft conflict detection and filenames.
    pub name: String,
    /// Opaque domain payload.
    pub data: serde_json::Value,
}

impl VaultItem {
    /// Create an item with a fresh uuid.
    pub fn new(name: impl Into<String>, data: serde_json::Value) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            name: name.into(),
            data,
        }
    }
}

/// Get current time in milliseconds.
pub fn now_millis() -> i64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("time went backwards")
        .as_millis() as i64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_content_type_roundtrip() {
        for ct in [
            ContentType::Units,
            ContentType::Pilots,
            ContentType::Forces,
            ContentType::Encounters,
        ] {
            assert_eq!(ContentType::parse(ct.as_str()), Some(ct));
        }
        assert_eq!(ContentType::parse("mechs"), None);
    }

    #[test]
    fn test_change_type_roundtrip() {
        for ct in [
            ChangeType::Create,
            ChangeType::Update,
            ChangeType::Delete,
            ChangeType::Move,
        ] {
            assert_eq!(ChangeType::parse(ct.as_str()), Some(ct));
        }
    }

    #[test]
    fn test_vault_item_gets_unique_ids() {
        let a = VaultItem::new("Atlas", serde_json::json!({"tonnage": 100}));
        let b = VaultItem::new("Atlas", serde_json::json!({"tonnage": 100}));
        assert_ne!(a.id, b.id);
    }
}
