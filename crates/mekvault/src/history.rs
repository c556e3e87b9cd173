//! Per-item version history: snapshots, shallow diffs, rollback.
//!
//! History is append-only. Rollback never rewinds the log; it re-applies an
//! old snapshot's content and records that as a new version.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;

use mekvault_core::{ContentHash, ContentType};
use mekvault_store::{NewVersionSnapshot, Store, VersionSnapshot};

use crate::error::{Result, VaultError};

/// Options for saving a snapshot.
#[derive(Debug, Clone, Default)]
pub struct SaveOptions {
    /// Free-form message recorded with the snapshot.
    pub message: Option<String>,
    /// Skip the write when content is identical to the latest snapshot.
    pub skip_if_unchanged: bool,
}

/// Materializes snapshot content back into the live content store.
/// Injected so history stays independent of where items actually live.
#[async_trait]
pub trait ApplyContent: Send + Sync {
    async fn apply(&self, content_type: ContentType, item_id: &str, content: &str) -> Result<()>;
}

/// A shallow, single-level diff between two snapshots.
///
/// Nested objects that differ anywhere inside count as one whole-value
/// modification of their top-level key.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VersionDiff {
    /// Keys present only in the newer snapshot.
    pub additions: Vec<String>,
    /// Keys present only in the older snapshot.
    pub deletions: Vec<String>,
    /// Keys present in both with different serialized values.
    pub modifications: Vec<String>,
}

/// Version history over a store.
pub struct VersionHistory<S: Store> {
    store: Arc<S>,
}

impl<S: Store> VersionHistory<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    /// Save a snapshot of an item's content.
    ///
    /// Returns `None` without writing when `skip_if_unchanged` is set and
    /// the content hash matches the latest snapshot.
    pub async fn save_version(
        &self,
        content_type: ContentType,
        item_id: &str,
        content: &str,
        created_by: &str,
        options: SaveOptions,
    ) -> Result<Option<VersionSnapshot>> {
        let content_hash = ContentHash::hash(content.as_bytes()).to_hex();

        if options.skip_if_unchanged {
            let latest = self.store.get_latest_version(content_type, item_id).await?;
            if let Some(latest) = latest {
                if latest.content_hash == content_hash {
                    return Ok(None);
                }
            }
        }

        let snapshot = self
            .store
            .insert_version(NewVersionSnapshot {
                item_id: item_id.to_string(),
                content_type,
                content: content.to_string(),
                content_hash,
                created_by: created_by.to_string(),
                message: options.message,
            })
            .await?;
        Ok(Some(snapshot))
    }

    /// Snapshots for an item, newest first.
    pub async fn list_versions(
        &self,
        content_type: ContentType,
        item_id: &str,
        limit: usize,
    ) -> Result<Vec<VersionSnapshot>> {
        Ok(self.store.list_versions(content_type, item_id, limit).await?)
    }

    /// Diff two stored versions of an item, oldest as `from`.
    pub async fn diff_versions(
        &self,
        content_type: ContentType,
        item_id: &str,
        from: u64,
        to: u64,
    ) -> Result<VersionDiff> {
        let from_snapshot = self.require_version(content_type, item_id, from).await?;
        let to_snapshot = self.require_version(content_type, item_id, to).await?;
        Ok(diff_contents(&from_snapshot.content, &to_snapshot.content))
    }

    /// Diff the latest stored snapshot against live content.
    pub async fn diff_with_latest(
        &self,
        content_type: ContentType,
        item_id: &str,
        content: &str,
    ) -> Result<VersionDiff> {
        let latest = self
            .store
            .get_latest_version(content_type, item_id)
            .await?
            .ok_or_else(|| VaultError::NotFound(format!("no versions for {}", item_id)))?;
        Ok(diff_contents(&latest.content, content))
    }

    /// Roll an item back to an earlier version.
    ///
    /// Applies the target snapshot's content through `applier`, then records
    /// the restored content as a new snapshot. History is never truncated.
    pub async fn rollback_to_version<A: ApplyContent>(
        &self,
        content_type: ContentType,
        item_id: &str,
        version: u64,
        created_by: &str,
        applier: &A,
    ) -> Result<VersionSnapshot> {
        let target = self.require_version(content_type, item_id, version).await?;

        applier
            .apply(content_type, item_id, &target.content)
            .await?;

        let snapshot = self
            .store
            .insert_version(NewVersionSnapshot {
                item_id: item_id.to_string(),
                content_type,
                content: target.content.clone(),
                content_hash: target.content_hash.clone(),
                created_by: created_by.to_string(),
                message: Some(format!("Rolled back to version {}", version)),
            })
            .await?;
        Ok(snapshot)
    }

    async fn require_version(
        &self,
        content_type: ContentType,
        item_id: &str,
        version: u64,
    ) -> Result<VersionSnapshot> {
        self.store
            .get_version(content_type, item_id, version)
            .await?
            .ok_or_else(|| {
                VaultError::NotFound(format!("version {} of {}", version, item_id))
            })
    }
}

/// Shallow diff of two serialized contents.
pub fn diff_contents(from: &str, to: &str) -> VersionDiff {
    let from_keys = flat_keys(from);
    let to_keys = flat_keys(to);

    let mut diff = VersionDiff::default();
    for (key, value) in &to_keys {
        match from_keys.get(key) {
            None => diff.additions.push(key.clone()),
            Some(old) if old != value => diff.modifications.push(key.clone()),
            Some(_) => {}
        }
    }
    for key in from_keys.keys() {
        if !to_keys.contains_key(key) {
            diff.deletions.push(key.clone());
        }
    }
    diff
}

/// Top-level keys mapped to their serialized values. Content that is not a
/// JSON object collapses to a single empty key holding the whole value, so
/// scalar contents still diff meaningfully.
fn flat_keys(content: &str) -> BTreeMap<String, String> {
    let mut keys = BTreeMap::new();
    match serde_json::from_str::<serde_json::Value>(content) {
        Ok(serde_json::Value::Object(map)) => {
            for (key, value) in map {
                keys.insert(key, value.to_string());
            }
        }
        Ok(other) => {
            keys.insert(String::new(), other.to_string());
        }
        Err(_) => {
            keys.insert(String::new(), content.to_string());
        }
    }
    keys
}

#[cfg(test)]
mod tests {
    use super::*;
    use mekvault_store::MemoryStore;

    fn history() -> VersionHistory<MemoryStore> {
        VersionHistory::new(Arc::new(MemoryStore::new()))
    }

    #[tokio::test]
    async fn test_versions_increase_per_item() {
        let history = history();

        let v1 = history
            .save_version(
                ContentType::Units,
                "unit-1",
                r#"{"tonnage": 100}"#,
                "ace",
                SaveOptions::default(),
            )
            .await
            .unwrap()
            .unwrap();
        let v2 = history
            .save_version(
                ContentType::Units,
                "unit-1",
                r#"{"tonnage": 95}"#,
                "ace",
                SaveOptions::default(),
            )
            .await
            .unwrap()
            .unwrap();

        assert_eq!(v1.version, 1);
        assert_eq!(v2.version, 2);

        // A different item starts its own sequence.
        let other = history
            .save_version(
                ContentType::Units,
                "unit-2",
                r#"{}"#,
                "ace",
                SaveOptions::default(),
            )
            .await
            .unwrap()
            .unwrap();
        assert_eq!(other.version, 1);
    }

    #[tokio::test]
    async fn test_skip_if_unchanged() {
        let history = history();
        let options = SaveOptions {
            skip_if_unchanged: true,
            ..Default::default()
        };

        let first = history
            .save_version(ContentType::Pilots, "p1", r#"{"gunnery": 3}"#, "ace", options.clone())
            .await
            .unwrap();
        assert!(first.is_some());

        let second = history
            .save_version(ContentType::Pilots, "p1", r#"{"gunnery": 3}"#, "ace", options)
            .await
            .unwrap();
        assert!(second.is_none());

        let versions = history
            .list_versions(ContentType::Pilots, "p1", 10)
            .await
            .unwrap();
        assert_eq!(versions.len(), 1);
    }

    #[tokio::test]
    async fn test_shallow_diff() {
        let diff = diff_contents(
            r#"{"name": "Atlas", "tonnage": 100, "armor": {"head": 9}}"#,
            r#"{"name": "Atlas", "tonnage": 95, "armor": {"head": 8}, "quirks": []}"#,
        );

        assert_eq!(diff.additions, vec!["quirks"]);
        assert!(diff.deletions.is_empty());
        // Nested change surfaces as one whole-value modification.
        let mut modifications = diff.modifications.clone();
        modifications.sort();
        assert_eq!(modifications, vec!["armor", "tonnage"]);
    }

    #[tokio::test]
    async fn test_diff_non_object_content() {
        let diff = diff_contents("42", "43");
        assert_eq!(diff.modifications, vec![String::new()]);
        assert!(diff.additions.is_empty());
    }

    struct NullApplier;

    #[async_trait]
    impl ApplyContent for NullApplier {
        async fn apply(&self, _: ContentType, _: &str, _: &str) -> Result<()> {
            Ok(())
        }
    }

    struct FailingApplier;

    #[async_trait]
    impl ApplyContent for FailingApplier {
        async fn apply(&self, _: ContentType, _: &str, _: &str) -> Result<()> {
            Err(VaultError::InvalidInput("apply failed".into()))
        }
    }

    #[tokio::test]
    async fn test_rollback_appends_new_snapshot() {
        let history = history();
        for content in [r#"{"tonnage": 100}"#, r#"{"tonnage": 95}"#, r#"{"tonnage": 90}"#] {
            history
                .save_version(ContentType::Units, "u1", content, "ace", SaveOptions::default())
                .await
                .unwrap();
        }

        let restored = history
            .rollback_to_version(ContentType::Units, "u1", 1, "ace", &NullApplier)
            .await
            .unwrap();

        assert_eq!(restored.version, 4);
        assert_eq!(restored.content, r#"{"tonnage": 100}"#);
        assert_eq!(restored.message.as_deref(), Some("Rolled back to version 1"));

        let versions = history
            .list_versions(ContentType::Units, "u1", 10)
            .await
            .unwrap();
        assert_eq!(versions.len(), 4);
    }

    #[tokio::test]
    async fn test_rollback_apply_failure_writes_nothing() {
        let history = history();
        history
            .save_version(ContentType::Units, "u1", r#"{"a": 1}"#, "ace", SaveOptions::default())
            .await
            .unwrap();

        let result = history
            .rollback_to_version(ContentType::Units, "u1", 1, "ace", &FailingApplier)
            .await;
        assert!(result.is_err());

        let versions = history
            .list_versions(ContentType::Units, "u1", 10)
            .await
            .unwrap();
        assert_eq!(versions.len(), 1);
    }

    #[tokio::test]
    async fn test_rollback_to_missing_version() {
        let history = history();
        let err = history
            .rollback_to_version(ContentType::Units, "ghost", 3, "ace", &NullApplier)
            .await
            .unwrap_err();
        assert!(matches!(err, VaultError::NotFound(_)));
    }
}
