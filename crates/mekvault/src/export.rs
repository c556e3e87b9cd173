//! Domain-facing export: one signed bundle per content type.
//!
//! Thin wrappers over bundle creation, plus the force-specific option to
//! strip nested unit/pilot payloads so cross-references stay shallow.

use mekvault_core::{
    create_bundle, BundleOptions, ContentType, ShareableBundle, VaultIdentity, VaultItem,
};

use crate::error::Result;

/// Options common to all exports.
#[derive(Debug, Clone, Default)]
pub struct ExportOptions {
    pub description: Option<String>,
    pub tags: Option<Vec<String>>,
    pub app_version: Option<String>,
}

impl From<ExportOptions> for BundleOptions {
    fn from(options: ExportOptions) -> Self {
        BundleOptions {
            description: options.description,
            tags: options.tags,
            app_version: options.app_version,
        }
    }
}

/// A signed bundle plus its suggested filename.
#[derive(Debug, Clone)]
pub struct ExportResult {
    pub bundle: ShareableBundle,
    pub filename: String,
}

/// Builds signed bundles on behalf of one identity.
pub struct Exporter<'a> {
    identity: &'a VaultIdentity,
}

impl<'a> Exporter<'a> {
    pub fn new(identity: &'a VaultIdentity) -> Self {
        Self { identity }
    }

    pub fn export_units(&self, items: &[VaultItem], options: ExportOptions) -> Result<ExportResult> {
        self.export(ContentType::Units, items, options)
    }

    pub fn export_pilots(
        &self,
        items: &[VaultItem],
        options: ExportOptions,
    ) -> Result<ExportResult> {
        self.export(ContentType::Pilots, items, options)
    }

    pub fn export_encounters(
        &self,
        items: &[VaultItem],
        options: ExportOptions,
    ) -> Result<ExportResult> {
        self.export(ContentType::Encounters, items, options)
    }

    /// Export forces. With `include_nested = false` the embedded unit and
    /// pilot entries are reduced to id/name references.
    pub fn export_forces(
        &self,
        items: &[VaultItem],
        include_nested: bool,
        options: ExportOptions,
    ) -> Result<ExportResult> {
        if include_nested {
            return self.export(ContentType::Forces, items, options);
        }
        let stripped: Vec<VaultItem> = items
            .iter()
            .map(|item| VaultItem {
                id: item.id.clone(),
                name: item.name.clone(),
                data: strip_nested(&item.data),
            })
            .collect();
        self.export(ContentType::Forces, &stripped, options)
    }

    fn export(
        &self,
        content_type: ContentType,
        items: &[VaultItem],
        options: ExportOptions,
    ) -> Result<ExportResult> {
        let (bundle, filename) = create_bundle(content_type, items, self.identity, options.into())?;
        Ok(ExportResult { bundle, filename })
    }
}

/// Replace each element of the top-level `units` and `pilots` arrays with
/// a shallow `{id, name}` reference. Everything else passes through.
fn strip_nested(data: &serde_json::Value) -> serde_json::Value {
    let Some(obj) = data.as_object() else {
        return data.clone();
    };
    let mut out = obj.clone();
    for key in ["units", "pilots"] {
        if let Some(entries) = out.get(key).and_then(|v| v.as_array()) {
            let refs: Vec<serde_json::Value> = entries
                .iter()
                .map(|entry| {
                    let mut reference = serde_json::Map::new();
                    for field in ["id", "name"] {
                        if let Some(value) = entry.get(field) {
                            reference.insert(field.to_string(), value.clone());
                        }
                    }
                    serde_json::Value::Object(reference)
                })
                .collect();
            out.insert(key.to_string(), serde_json::Value::Array(refs));
        }
    }
    serde_json::Value::Object(out)
}
