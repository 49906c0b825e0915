//! Reading and replying to comments on published posts

use std::sync::Arc;
use tracing::info;

use super::analytics::PostSummary;
use super::tokens::TokenKeeper;
use crate::db::{Database, PostFilter};
use crate::error::{OmnicastError, Result};
use crate::platforms::PlatformRegistry;
use crate::types::{Comment, PlatformKind, TenantContext};

/// Longest reply accepted before it reaches a provider
const MAX_COMMENT_CHARS: usize = 8_000;

#[derive(Clone)]
pub struct EngageService {
    db: Arc<Database>,
    registry: Arc<PlatformRegistry>,
    tokens: TokenKeeper,
}

impl EngageService {
    pub fn new(db: Arc<Database>, registry: Arc<PlatformRegistry>, tokens: TokenKeeper) -> Self {
        Self {
            db,
            registry,
            tokens,
        }
    }

    /// Posts a tenant can engage with, newest first
    pub async fn list_posts(
        &self,
        tenant_id: &str,
        platform: Option<PlatformKind>,
    ) -> Result<Vec<PostSummary>> {
        let filter = PostFilter {
            platform,
            ..Default::default()
        };
        let posts = self.db.list_posts(tenant_id, &filter).await?;
        Ok(posts.into_iter().map(PostSummary::from).collect())
    }

    pub async fn comments(
        &self,
        tenant: &TenantContext,
        platform: PlatformKind,
        platform_post_id: &str,
    ) -> Result<Vec<Comment>> {
        self.ensure_owned(&tenant.tenant_id, platform, platform_post_id)
            .await?;
        let adapter = self.registry.get(platform)?;
        let credentials = self.tokens.credentials_for(tenant, platform).await?;
        adapter.fetch_comments(&credentials, platform_post_id).await
    }

    /// Reply on a post as the connected account
    ///
    /// # Errors
    ///
    /// Returns `InvalidInput` for an empty or oversized message and
    /// `NotFound` for a post the tenant did not publish through Omnicast.
    pub async fn comment(
        &self,
        tenant: &TenantContext,
        platform: PlatformKind,
        platform_post_id: &str,
        message: &str,
    ) -> Result<Comment> {
        let message = message.trim();
        if message.is_empty() {
            return Err(OmnicastError::InvalidInput(
                "Comment message cannot be empty".to_string(),
            ));
        }
        if message.chars().count() > MAX_COMMENT_CHARS {
            return Err(OmnicastError::InvalidInput(format!(
                "Comment message exceeds {} characters",
                MAX_COMMENT_CHARS
            )));
        }

        self.ensure_owned(&tenant.tenant_id, platform, platform_post_id)
            .await?;
        let adapter = self.registry.get(platform)?;
        let credentials = self.tokens.credentials_for(tenant, platform).await?;
        let comment = adapter
            .post_comment(&credentials, platform_post_id, message)
            .await?;

        info!(
            "Commented on {} post {} for tenant {}",
            platform, platform_post_id, tenant.tenant_id
        );
        Ok(comment)
    }

    async fn ensure_owned(
        &self,
        tenant_id: &str,
        platform: PlatformKind,
        platform_post_id: &str,
    ) -> Result<()> {
        self.db
            .find_by_platform_post_id(tenant_id, platform, platform_post_id)
            .await?
            .map(|_| ())
            .ok_or_else(|| {
                OmnicastError::NotFound(format!(
                    "No {} post {} for this account",
                    platform, platform_post_id
                ))
            })
    }
}
