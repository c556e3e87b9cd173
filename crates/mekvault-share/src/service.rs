//! Share link lifecycle: create, redeem, revoke, list, cleanup.

use std::sync::Arc;

use tracing::{debug, warn};
use uuid::Uuid;

use mekvault_core::now_millis;
use mekvault_store::{RedeemOutcome, ShareLink, Store};

use crate::error::{Result, ShareError};
use crate::link::CreateLinkOptions;
use crate::token::{extract_token, generate_token, share_url};

/// Manages share links on top of a [`Store`].
///
/// Construct one per store; there is no global instance. All correctness
/// under concurrency comes from the store's atomic redemption, not from
/// anything held here.
pub struct ShareLinkService<S: Store> {
    store: Arc<S>,
}

impl<S: Store> ShareLinkService<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    /// Create a new share link. Returns the stored link and its URL.
    pub async fn create_link(&self, options: CreateLinkOptions) -> Result<(ShareLink, String)> {
        let now = now_millis();
        options.validate(now)?;

        let link = ShareLink {
            id: Uuid::new_v4().to_string(),
            token: generate_token(),
            scope: options.scope,
            level: options.level,
            expires_at: options.expires_at,
            max_uses: options.max_uses,
            use_count: 0,
            created_at: now,
            label: options.label,
            is_active: true,
        };
        self.store.insert_share_link(&link).await?;

        debug!(link_id = %link.id, scope = link.scope.type_str(), "share link created");
        let url = share_url(&link.token);
        Ok((link, url))
    }

    /// Redeem a link given any accepted URL/token form.
    ///
    /// On success the returned link reflects the incremented use count.
    /// Failures carry a stable error code (`NOT_FOUND`, `INACTIVE`,
    /// `EXPIRED`, `MAX_USES`) for UI callers.
    pub async fn redeem(&self, input: &str) -> Result<ShareLink> {
        let token = extract_token(input).ok_or(ShareError::NotFound)?;

        match self.store.redeem_share_link(&token, now_millis()).await? {
            RedeemOutcome::Redeemed(link) => {
                debug!(link_id = %link.id, use_count = link.use_count, "share link redeemed");
                Ok(link)
            }
            RedeemOutcome::NotFound => Err(ShareError::NotFound),
            RedeemOutcome::Inactive => Err(ShareError::Inactive),
            RedeemOutcome::Expired => Err(ShareError::Expired),
            RedeemOutcome::MaxUses => {
                warn!(token = %token, "redemption refused: use budget exhausted");
                Err(ShareError::MaxUses)
            }
        }
    }

    /// Deactivate a link. Returns `false` if no such link exists.
    ///
    /// Revocation is reversible via [`reactivate`](Self::reactivate); the
    /// use count is never reset.
    pub async fn revoke(&self, link_id: &str) -> Result<bool> {
        Ok(self.store.set_share_link_active(link_id, false).await?)
    }

    /// Reactivate a previously revoked link.
    pub async fn reactivate(&self, link_id: &str) -> Result<bool> {
        Ok(self.store.set_share_link_active(link_id, true).await?)
    }

    /// All links, newest first.
    pub async fn list(&self) -> Result<Vec<ShareLink>> {
        Ok(self.store.list_share_links().await?)
    }

    /// Delete links whose expiry has passed. Returns the number deleted.
    pub async fn cleanup_expired(&self) -> Result<usize> {
        let deleted = self.store.delete_expired_share_links(now_millis()).await?;
        if deleted > 0 {
            debug!(deleted, "expired share links removed");
        }
        Ok(deleted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mekvault_store::{MemoryStore, PermissionLevel, ShareScope};

    fn service() -> ShareLinkService<MemoryStore> {
        ShareLinkService::new(Arc::new(MemoryStore::new()))
    }

    #[tokio::test]
    async fn test_create_and_redeem_by_url() {
        let service = service();
        let (link, url) = service
            .create_link(CreateLinkOptions::read(ShareScope::Item { id: "unit-42".into() }))
            .await
            .unwrap();

        assert!(url.starts_with("mekstation://share/"));
        let redeemed = service.redeem(&url).await.unwrap();
        assert_eq!(redeemed.id, link.id);
        assert_eq!(redeemed.use_count, 1);
        assert_eq!(redeemed.level, PermissionLevel::Read);
    }

    #[tokio::test]
    async fn test_max_uses_enforced_with_code() {
        let service = service();
        let (_, url) = service
            .create_link(CreateLinkOptions::read(ShareScope::All).with_max_uses(2))
            .await
            .unwrap();

        service.redeem(&url).await.unwrap();
        service.redeem(&url).await.unwrap();

        let err = service.redeem(&url).await.unwrap_err();
        assert_eq!(err.code(), "MAX_USES");
    }

    #[tokio::test]
    async fn test_revoked_link_refused_then_reactivated() {
        let service = service();
        let (link, url) = service
            .create_link(CreateLinkOptions::read(ShareScope::All))
            .await
            .unwrap();

        assert!(service.revoke(&link.id).await.unwrap());
        let err = service.redeem(&url).await.unwrap_err();
        assert_eq!(err.code(), "INACTIVE");

        assert!(service.reactivate(&link.id).await.unwrap());
        assert!(service.redeem(&url).await.is_ok());
    }

    #[tokio::test]
    async fn test_unknown_token_not_found() {
        let service = service();
        let err = service
            .redeem("mekstation://share/AAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAA")
            .await
            .unwrap_err();
        assert_eq!(err.code(), "NOT_FOUND");

        // Unparseable input maps to the same code
        let err = service.redeem("nope").await.unwrap_err();
        assert_eq!(err.code(), "NOT_FOUND");
    }

    #[tokio::test]
    async fn test_invalid_options_rejected_before_insert() {
        let service = service();
        let result = service
            .create_link(CreateLinkOptions::read(ShareScope::Folder { id: String::new() }))
            .await;
        assert!(result.is_err());
        assert!(service.list().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_cleanup_removes_only_expired() {
        let service = service();
        let now = now_millis();

        service
            .create_link(CreateLinkOptions::read(ShareScope::All).with_expiry(now + 1))
            .await
            .unwrap();
        service
            .create_link(CreateLinkOptions::read(ShareScope::All).with_expiry(now + 60_000))
            .await
            .unwrap();
        service
            .create_link(CreateLinkOptions::read(ShareScope::All))
            .await
            .unwrap();

        // First link is expired once its timestamp passes
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        assert_eq!(service.cleanup_expired().await.unwrap(), 1);
        assert_eq!(service.list().await.unwrap().len(), 2);
    }
}
