//! Two-phase bundle import with conflict detection.
//!
//! Phase one validates the bundle (structure, version, signature) and asks
//! the import target about id and name collisions. Phase two applies a
//! resolution per item. With unresolved conflicts and no default policy the
//! importer stops after phase one and returns the conflict list, importing
//! nothing; the caller can resubmit with resolutions filled in.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::warn;
use uuid::Uuid;

use mekvault_core::{
    parse_and_verify_bundle, BundleMetadata, ContentType, PublicIdentity, VaultItem,
};

use crate::error::{Result, VaultError};

/// Where imported items land. Injected so the importer stays independent
/// of the live content store.
#[async_trait]
pub trait ImportTarget: Send + Sync {
    /// Does an item with this exact id already exist?
    async fn exists(&self, content_type: ContentType, id: &str) -> Result<bool>;

    /// Is there an item with this display name but a different id?
    /// Returns the existing item's id if so.
    async fn find_name_conflict(
        &self,
        content_type: ContentType,
        name: &str,
    ) -> Result<Option<String>>;

    /// Persist one imported item, attributed to its bundle author.
    async fn save(
        &self,
        content_type: ContentType,
        item: &VaultItem,
        source: &PublicIdentity,
    ) -> Result<()>;
}

/// Why an item conflicts with existing content.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConflictKind {
    /// An item with the same id already exists.
    IdExists,
    /// An item with the same name but a different id exists.
    NameExists { existing_id: String },
}

/// One detected import conflict.
#[derive(Debug, Clone)]
pub struct ImportConflict {
    pub item_id: String,
    pub item_name: String,
    pub kind: ConflictKind,
}

/// Per-item resolution policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImportResolution {
    /// Leave the existing item alone; do not import.
    Skip,
    /// Overwrite the existing item.
    Replace,
    /// Import under a freshly generated id, leaving the existing item alone.
    KeepBoth,
}

/// Import options.
#[derive(Debug, Clone)]
pub struct ImportOptions {
    /// Reject the bundle when its signature does not verify.
    pub verify_signature: bool,
    /// Resolution per conflicting item id.
    pub resolutions: HashMap<String, ImportResolution>,
    /// Fallback when an item has a conflict but no entry in `resolutions`.
    /// `None` means "ask": unresolved conflicts stop the import.
    pub default_resolution: Option<ImportResolution>,
}

impl Default for ImportOptions {
    fn default() -> Self {
        Self {
            verify_signature: true,
            resolutions: HashMap::new(),
            default_resolution: None,
        }
    }
}

/// Outcome of an import run.
#[derive(Debug, Clone, Default)]
pub struct ImportReport {
    pub imported: usize,
    pub skipped: usize,
    pub replaced: usize,
    /// Conflicts left unresolved. Non-empty only when the import stopped
    /// at the preview step.
    pub conflicts: Vec<ImportConflict>,
    /// Old id to new id, for items imported via `KeepBoth`.
    pub id_remap: HashMap<String, String>,
    pub signature_valid: bool,
}

/// Bundle contents plus detected conflicts, before anything is written.
#[derive(Debug, Clone)]
pub struct ImportPreview {
    pub metadata: BundleMetadata,
    pub items: Vec<VaultItem>,
    pub signature_valid: bool,
    pub version_compatible: bool,
    pub conflicts: Vec<ImportConflict>,
}

/// Imports bundles into an [`ImportTarget`].
pub struct Importer<T: ImportTarget> {
    target: Arc<T>,
}

impl<T: ImportTarget> Importer<T> {
    pub fn new(target: Arc<T>) -> Self {
        Self { target }
    }

    /// Phase one only: parse, verify, and detect conflicts without writing.
    pub async fn preview(&self, raw: &str) -> Result<ImportPreview> {
        let verified = parse_and_verify_bundle(raw)?;
        let conflicts = self
            .detect_conflicts(verified.metadata.content_type, &verified.items)
            .await?;
        Ok(ImportPreview {
            metadata: verified.metadata,
            items: verified.items,
            signature_valid: verified.signature_valid,
            version_compatible: verified.version_compatible,
            conflicts,
        })
    }

    /// Run a full import.
    ///
    /// Fails fast on an unreadable version or (when verification is on) a
    /// bad signature. With unresolved conflicts and no default resolution,
    /// returns a report carrying the conflict list and zero writes.
    pub async fn import(&self, raw: &str, options: ImportOptions) -> Result<ImportReport> {
        let verified = parse_and_verify_bundle(raw)?;
        if !verified.version_compatible {
            return Err(VaultError::IncompatibleVersion(
                verified.metadata.version.clone(),
            ));
        }
        if options.verify_signature && !verified.signature_valid {
            return Err(VaultError::SignatureInvalid);
        }

        let content_type = verified.metadata.content_type;
        let conflicts = self.detect_conflicts(content_type, &verified.items).await?;

        let unresolved: Vec<ImportConflict> = conflicts
            .iter()
            .filter(|c| {
                !options.resolutions.contains_key(&c.item_id)
                    && options.default_resolution.is_none()
            })
            .cloned()
            .collect();
        if !unresolved.is_empty() {
            return Ok(ImportReport {
                conflicts: unresolved,
                signature_valid: verified.signature_valid,
                ..Default::default()
            });
        }

        let conflicting: HashMap<&str, &ImportConflict> = conflicts
            .iter()
            .map(|c| (c.item_id.as_str(), c))
            .collect();

        let mut report = ImportReport {
            signature_valid: verified.signature_valid,
            ..Default::default()
        };
        let author = &verified.metadata.author;

        for item in &verified.items {
            let Some(conflict) = conflicting.get(item.id.as_str()) else {
                // No conflict: plain save.
                self.save_item(content_type, item, author, &mut report, false)
                    .await;
                continue;
            };
            let resolution = options
                .resolutions
                .get(&item.id)
                .copied()
                .or(options.default_resolution)
                .unwrap_or(ImportResolution::Replace);

            match resolution {
                ImportResolution::Skip => report.skipped += 1,
                ImportResolution::Replace => {
                    let replacing = conflict.kind == ConflictKind::IdExists;
                    self.save_item(content_type, item, author, &mut report, replacing)
                        .await;
                }
                ImportResolution::KeepBoth => {
                    let mut copy = item.clone();
                    copy.id = Uuid::new_v4().to_string();
                    report.id_remap.insert(item.id.clone(), copy.id.clone());
                    self.save_item(content_type, &copy, author, &mut report, false)
                        .await;
                }
            }
        }

        Ok(report)
    }

    async fn detect_conflicts(
        &self,
        content_type: ContentType,
        items: &[VaultItem],
    ) -> Result<Vec<ImportConflict>> {
        let mut conflicts = Vec::new();
        for item in items {
            if self.target.exists(content_type, &item.id).await? {
                conflicts.push(ImportConflict {
                    item_id: item.id.clone(),
                    item_name: item.name.clone(),
                    kind: ConflictKind::IdExists,
                });
            } else if let Some(existing_id) = self
                .target
                .find_name_conflict(content_type, &item.name)
                .await?
            {
                conflicts.push(ImportConflict {
                    item_id: item.id.clone(),
                    item_name: item.name.clone(),
                    kind: ConflictKind::NameExists { existing_id },
                });
            }
        }
        Ok(conflicts)
    }

    /// Save one item, counting it as imported or replaced. A save failure
    /// downgrades the item to skipped; the batch carries on.
    async fn save_item(
        &self,
        content_type: ContentType,
        item: &VaultItem,
        author: &PublicIdentity,
        report: &mut ImportReport,
        replacing: bool,
    ) {
        match self.target.save(content_type, item, author).await {
            Ok(()) => {
                if replacing {
                    report.replaced += 1;
                } else {
                    report.imported += 1;
                }
            }
            Err(e) => {
                warn!(item_id = %item.id, name = %item.name, error = %e, "import save failed");
                report.skipped += 1;
            }
        }
    }
}
