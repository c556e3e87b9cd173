//! Share link creation options and scope validation.

use mekvault_store::{PermissionLevel, ShareScope};

use crate::error::{Result, ShareError};

/// Options for creating a share link.
#[derive(Debug, Clone)]
pub struct CreateLinkOptions {
    /// What the link grants access to.
    pub scope: ShareScope,
    /// Access level the link grants.
    pub level: PermissionLevel,
    /// Absolute expiry time (Unix ms); `None` = never expires.
    pub expires_at: Option<i64>,
    /// Redemption budget; `None` = unlimited.
    pub max_uses: Option<u32>,
    /// Optional human label shown in link listings.
    pub label: Option<String>,
}

impl CreateLinkOptions {
    /// A read-only link with no expiry or use limit.
    pub fn read(scope: ShareScope) -> Self {
        Self {
            scope,
            level: PermissionLevel::Read,
            expires_at: None,
            max_uses: None,
            label: None,
        }
    }

    pub fn with_expiry(mut self, expires_at: i64) -> Self {
        self.expires_at = Some(expires_at);
        self
    }

    pub fn with_max_uses(mut self, max_uses: u32) -> Self {
        self.max_uses = Some(max_uses);
        self
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    /// Validate the options before a link is created.
    pub fn validate(&self, now: i64) -> Result<()> {
        match &self.scope {
            ShareScope::Item { id } | ShareScope::Folder { id } => {
                if id.is_empty() {
                    return Err(ShareError::InvalidScope(format!(
                        "{} scope requires a non-empty id",
                        self.scope.type_str()
                    )));
                }
            }
            ShareScope::Category { .. } | ShareScope::All => {}
        }

        // Write access to the whole vault is not grantable via link; admin
        // is reserved for the vault owner entirely.
        if self.level == PermissionLevel::Admin {
            return Err(ShareError::InvalidScope(
                "admin level cannot be granted through a share link".into(),
            ));
        }
        if self.level == PermissionLevel::Write && matches!(self.scope, ShareScope::All) {
            return Err(ShareError::InvalidScope(
                "write level requires a narrower scope than the whole vault".into(),
            ));
        }

        if let Some(expires_at) = self.expires_at {
            if expires_at <= now {
                return Err(ShareError::InvalidScope(
                    "expiry must be in the future".into(),
                ));
            }
        }
        if self.max_uses == Some(0) {
            return Err(ShareError::InvalidScope("max_uses must be positive".into()));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mekvault_core::ContentType;

    #[test]
    fn test_item_scope_requires_id() {
        let options = CreateLinkOptions::read(ShareScope::Item { id: String::new() });
        assert!(options.validate(0).is_err());

        let options = CreateLinkOptions::read(ShareScope::Item { id: "unit-42".into() });
        assert!(options.validate(0).is_ok());
    }

    #[test]
    fn test_category_and_all_need_no_id() {
        let options = CreateLinkOptions::read(ShareScope::Category {
            category: ContentType::Forces,
        });
        assert!(options.validate(0).is_ok());
        assert!(CreateLinkOptions::read(ShareScope::All).validate(0).is_ok());
    }

    #[test]
    fn test_admin_level_rejected() {
        let mut options = CreateLinkOptions::read(ShareScope::Item { id: "u".into() });
        options.level = PermissionLevel::Admin;
        assert!(options.validate(0).is_err());
    }

    #[test]
    fn test_write_on_all_rejected() {
        let mut options = CreateLinkOptions::read(ShareScope::All);
        options.level = PermissionLevel::Write;
        assert!(options.validate(0).is_err());

        let mut options = CreateLinkOptions::read(ShareScope::Folder { id: "f".into() });
        options.level = PermissionLevel::Write;
        assert!(options.validate(0).is_ok());
    }

    #[test]
    fn test_expiry_must_be_future() {
        let options =
            CreateLinkOptions::read(ShareScope::All).with_expiry(1_000);
        assert!(options.validate(2_000).is_err());
        assert!(options.validate(500).is_ok());
    }

    #[test]
    fn test_zero_max_uses_rejected() {
        let options = CreateLinkOptions::read(ShareScope::All).with_max_uses(0);
        assert!(options.validate(0).is_err());
    }
}
