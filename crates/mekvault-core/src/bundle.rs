//! Signed export bundles.
//!
//! A bundle is an immutable, signed container for exported items:
//! `metadata` (including the author's public identity), a serialized item
//! `payload`, and an Ed25519 `signature` over `JSON(metadata) ‖ payload`.
//! The on-disk form is JSON with the `.mekbundle` extension.
//!
//! Parsing is structural-first: shape errors are reported before any
//! cryptography runs. Signature verification never throws; it yields a
//! boolean the caller must check, since an untrusted bundle may still be
//! inspectable for preview.

use serde::{Deserialize, Serialize};

use crate::crypto::Ed25519Signature;
use crate::error::{CoreError, Result};
use crate::identity::{PublicIdentity, VaultIdentity};
use crate::types::{now_millis, ContentType, VaultItem};

/// Current bundle format version.
pub const BUNDLE_FORMAT_VERSION: &str = "1.0.0";

/// Major version this build can read.
pub const SUPPORTED_MAJOR_VERSION: u32 = 1;

/// File extension for bundles.
pub const BUNDLE_EXTENSION: &str = "mekbundle";

/// MIME type for bundles.
pub const BUNDLE_MIME_TYPE: &str = "application/x-mekstation-bundle+json";

/// Bundle metadata. Field names follow the bundle file contract.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BundleMetadata {
    /// Bundle format version, e.g. "1.0.0".
    pub version: String,
    /// What kind of items the payload carries.
    pub content_type: ContentType,
    /// Number of items in the payload.
    pub item_count: usize,
    /// The signer's public identity.
    pub author: PublicIdentity,
    /// Creation time (Unix ms).
    pub created_at: i64,
    /// Optional free-form description.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Optional tags.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tags: Option<Vec<String>>,
    /// Version of the application that produced the bundle.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub app_version: Option<String>,
}

/// A signed, immutable export container.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShareableBundle {
    pub metadata: BundleMetadata,
    /// Serialized item array, opaque at this layer.
    pub payload: String,
    /// Hex-encoded Ed25519 signature over `JSON(metadata) ‖ payload`.
    pub signature: String,
}

/// Optional inputs to bundle creation.
#[derive(Debug, Clone, Default)]
pub struct BundleOptions {
    pub description: Option<String>,
    pub tags: Option<Vec<String>>,
    pub app_version: Option<String>,
}

/// Result of parsing and verifying a bundle.
#[derive(Debug, Clone)]
pub struct VerifiedBundle {
    pub metadata: BundleMetadata,
    /// The parsed items.
    pub items: Vec<VaultItem>,
    /// Whether the signature checks out against the embedded public key.
    /// Failure is a value, not an error: the caller decides what to trust.
    pub signature_valid: bool,
    /// Whether the bundle's major format version is readable by this build.
    pub version_compatible: bool,
}

/// Build and sign a bundle, returning it with a suggested filename.
pub fn create_bundle(
    content_type: ContentType,
    items: &[VaultItem],
    identity: &VaultIdentity,
    options: BundleOptions,
) -> Result<(ShareableBundle, String)> {
    let payload = serde_json::to_string(items)
        .map_err(|e| CoreError::Serialization(e.to_string()))?;

    let metadata = BundleMetadata {
        version: BUNDLE_FORMAT_VERSION.to_string(),
        content_type,
        item_count: items.len(),
        author: identity.public_identity(),
        created_at: now_millis(),
        description: options.description,
        tags: options.tags,
        app_version: options.app_version,
    };

    let signed = signed_content(&metadata, &payload)?;
    let signature = identity.sign_message(&signed).to_hex();

    let filename = suggest_filename(content_type, items, metadata.created_at);

    Ok((
        ShareableBundle {
            metadata,
            payload,
            signature,
        },
        filename,
    ))
}

/// Parse a bundle from JSON, validating structure only.
///
/// Distinguishes "not JSON at all" from "JSON missing a required field";
/// no cryptography is attempted here.
pub fn parse_bundle(raw: &str) -> Result<ShareableBundle> {
    let value: serde_json::Value =
        serde_json::from_str(raw).map_err(|e| CoreError::NotJson(e.to_string()))?;

    let obj = value.as_object().ok_or(CoreError::MissingField("metadata"))?;
    let metadata = obj
        .get("metadata")
        .and_then(|m| m.as_object())
        .ok_or(CoreError::MissingField("metadata"))?;
    if !obj.contains_key("payload") {
        return Err(CoreError::MissingField("payload"));
    }
    if !obj.contains_key("signature") {
        return Err(CoreError::MissingField("signature"));
    }

    for field in ["version", "contentType", "itemCount", "author", "createdAt"] {
        if !metadata.contains_key(field) {
            return Err(CoreError::MissingField(match field {
                "version" => "metadata.version",
                "contentType" => "metadata.contentType",
                "itemCount" => "metadata.itemCount",
                "author" => "metadata.author",
                _ => "metadata.createdAt",
            }));
        }
    }
    let author = metadata
        .get("author")
        .and_then(|a| a.as_object())
        .ok_or(CoreError::MissingField("metadata.author"))?;
    for field in ["displayName", "publicKey", "friendCode"] {
        if !author.contains_key(field) {
            return Err(CoreError::MissingField(match field {
                "displayName" => "metadata.author.displayName",
                "publicKey" => "metadata.author.publicKey",
                _ => "metadata.author.friendCode",
            }));
        }
    }

    serde_json::from_value(value).map_err(|e| CoreError::Serialization(e.to_string()))
}

/// Parse a bundle and verify its signature against the embedded public key.
///
/// Verification failure is returned as `signature_valid = false`, never as
/// an error. Version compatibility is checked independently of the
/// signature.
pub fn parse_and_verify_bundle(raw: &str) -> Result<VerifiedBundle> {
    let bundle = parse_bundle(raw)?;

    let signature_valid = verify_bundle(&bundle);
    let version_compatible = is_version_compatible(&bundle.metadata.version);

    let items: Vec<VaultItem> = serde_json::from_str(&bundle.payload)
        .map_err(|e| CoreError::NotJson(format!("payload: {}", e)))?;

    Ok(VerifiedBundle {
        metadata: bundle.metadata,
        items,
        signature_valid,
        version_compatible,
    })
}

/// Verify an already-parsed bundle's signature. Returns a boolean, not an error.
pub fn verify_bundle(bundle: &ShareableBundle) -> bool {
    let signed = match signed_content(&bundle.metadata, &bundle.payload) {
        Ok(s) => s,
        Err(_) => return false,
    };
    let signature = match Ed25519Signature::from_hex(&bundle.signature) {
        Ok(s) => s,
        Err(_) => return false,
    };
    crate::identity::verify_message(&bundle.metadata.author.public_key, &signed, &signature)
        .is_ok()
}

/// Check whether a bundle format version is readable by this build.
///
/// Compatibility is by major version only.
pub fn is_version_compatible(version: &str) -> bool {
    version
        .split('.')
        .next()
        .and_then(|major| major.parse::<u32>().ok())
        .map(|major| major == SUPPORTED_MAJOR_VERSION)
        .unwrap_or(false)
}

/// The exact string the bundle signature covers: `JSON(metadata) ‖ payload`.
fn signed_content(metadata: &BundleMetadata, payload: &str) -> Result<String> {
    let metadata_json = serde_json::to_string(metadata)
        .map_err(|e| CoreError::Serialization(e.to_string()))?;
    Ok(format!("{}{}", metadata_json, payload))
}

/// Suggest a filename: single item → its slugged name, otherwise
/// `{type}s-{count}`, both with the creation date appended.
fn suggest_filename(content_type: ContentType, items: &[VaultItem], created_at: i64) -> String {
    let date = format_date(created_at);
    let stem = if items.len() == 1 {
        slug(&items[0].name)
    } else {
        format!("{}s-{}", content_type.singular(), items.len())
    };
    format!("{}-{}.{}", stem, date, BUNDLE_EXTENSION)
}

/// Lowercase, alphanumeric-and-dash form of a name.
fn slug(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    let mut last_dash = true;
    for ch in name.chars() {
        if ch.is_ascii_alphanumeric() {
            out.push(ch.to_ascii_lowercase());
            last_dash = false;
        } else if !last_dash {
            out.push('-');
            last_dash = true;
        }
    }
    while out.ends_with('-') {
        out.pop();
    }
    if out.is_empty() {
        "bundle".to_string()
    } else {
        out
    }
}

/// Format a Unix-ms timestamp as `YYYY-MM-DD` (UTC).
fn format_date(millis: i64) -> String {
    // Civil-from-days conversion (Gregorian), days since 1970-01-01.
    let days = millis.div_euclid(86_400_000);
    let z = days + 719_468;
    let era = z.div_euclid(146_097);
    let doe = z.rem_euclid(146_097);
    let yoe = (doe - doe / 1460 + doe / 36_524 - doe / 146_096) / 365;
    let y = yoe + era * 400;
    let doy = doe - (365 * yoe + yoe / 4 - yoe / 100);
    let mp = (5 * doy + 2) / 153;
    let d = doy - (153 * mp + 2) / 5 + 1;
    let m = if mp < 10 { mp + 3 } else { mp - 9 };
    let y = if m <= 2 { y + 1 } else { y };
    format!("{:04}-{:02}-{:02}", y, m, d)
}
