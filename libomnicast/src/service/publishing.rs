//! Publishing orchestrator
//!
//! Validates a request, looks up (and if needed refreshes) the tenant's
//! stored credentials, uploads media once, hands the post to the platform
//! adapter and records the published post for analytics tracking.
//!
//! Multi-platform requests run the per-platform publishes concurrently, at
//! most `publishing.max_concurrency` at a time. One platform failing never
//! stops the others; results come back in request order. Media is only
//! uploaded once some platform is ready to take it, and is deleted again
//! when nothing ends up published.

use futures::stream::{self, StreamExt};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{error, info, warn};

use super::tokens::TokenKeeper;
use crate::credentials::PlatformCredentials;
use crate::db::Database;
use crate::error::{OmnicastError, PlatformError, Result};
use crate::media::MediaStore;
use crate::platforms::PlatformRegistry;
use crate::types::{
    extract_hashtags, MediaUpload, PlatformKind, PostType, PreparedMedia, PublishRequest,
    StoredPost, TenantContext,
};

/// Where and how to publish one post
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PublishTarget {
    pub platform: PlatformKind,
    pub post_type: PostType,
    #[serde(default)]
    pub page_id: Option<String>,
}

impl PublishTarget {
    /// Build a target from loosely formatted client input
    /// (`"FACEBOOK"`, `"post"`, an empty page id, ...)
    pub fn parse(platform: &str, post_type: &str, page_id: Option<&str>) -> Result<Self> {
        Ok(Self {
            platform: platform.parse()?,
            post_type: post_type.parse()?,
            page_id: page_id
                .map(str::trim)
                .filter(|p| !p.is_empty())
                .map(str::to_string),
        })
    }

    /// The target with a feed post type promoted to the attached file's kind
    pub fn for_media(&self, media: Option<&MediaUpload>) -> Self {
        Self {
            post_type: self.post_type.with_media(media.and_then(MediaUpload::kind)),
            ..self.clone()
        }
    }
}

/// A successful publish
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SinglePublishResult {
    /// Id of the stored post record
    pub post_id: String,
    pub platform: PlatformKind,
    pub platform_post_id: String,
    pub permalink: Option<String>,
}

/// A platform that could not be published to
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FailedPublish {
    pub platform: PlatformKind,
    pub post_type: PostType,
    pub error: String,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct MultiPublishResult {
    pub success: Vec<SinglePublishResult>,
    pub failed: Vec<FailedPublish>,
}

impl MultiPublishResult {
    pub fn all_succeeded(&self) -> bool {
        self.failed.is_empty() && !self.success.is_empty()
    }
}

#[derive(Clone)]
pub struct PublishingService {
    db: Arc<Database>,
    registry: Arc<PlatformRegistry>,
    media: Arc<dyn MediaStore>,
    tokens: TokenKeeper,
    max_concurrency: usize,
}

impl PublishingService {
    pub fn new(
        db: Arc<Database>,
        registry: Arc<PlatformRegistry>,
        media: Arc<dyn MediaStore>,
        tokens: TokenKeeper,
        max_concurrency: usize,
    ) -> Self {
        Self {
            db,
            registry,
            media,
            tokens,
            max_concurrency: max_concurrency.max(1),
        }
    }

    /// Publish to one platform
    ///
    /// # Errors
    ///
    /// Returns `InvalidInput` or `PlatformError::Validation` for requests the
    /// platform cannot take, `PlatformError::Authentication` when the
    /// platform is not connected, and the provider's error otherwise.
    pub async fn post_to_single_platform(
        &self,
        tenant: &TenantContext,
        target: &PublishTarget,
        content: &str,
        media: Option<MediaUpload>,
    ) -> Result<SinglePublishResult> {
        let media = media.as_ref();
        let target = target.for_media(media);
        self.precheck(&target, content, media)?;
        let credentials = self.tokens.credentials_for(tenant, target.platform).await?;

        let prepared = self.upload(tenant, media).await?;
        let outcome = self
            .publish_with(tenant, &target, &credentials, content, prepared.as_ref())
            .await;
        if let (Err(e), Some(prepared)) = (&outcome, &prepared) {
            if !matches!(e, OmnicastError::Unrecorded { .. }) {
                self.discard(prepared).await;
            }
        }
        outcome
    }

    /// Publish the same content to several platforms
    ///
    /// Only request-level problems (no targets, a media upload failure) are
    /// returned as errors; per-platform failures land in `failed`.
    pub async fn post_to_all_platforms(
        &self,
        tenant: &TenantContext,
        targets: &[PublishTarget],
        content: &str,
        media: Option<MediaUpload>,
    ) -> Result<MultiPublishResult> {
        if targets.is_empty() {
            return Err(OmnicastError::InvalidInput(
                "At least one platform must be selected".to_string(),
            ));
        }
        let media = media.as_ref();

        info!(
            "Publishing for tenant {} to {} platform(s), {} at a time",
            tenant.tenant_id,
            targets.len(),
            self.max_concurrency
        );

        let resolved: Vec<PublishTarget> = targets.iter().map(|t| t.for_media(media)).collect();
        let ready: Vec<(PublishTarget, Result<PlatformCredentials>)> =
            stream::iter(resolved)
                .map(|target| async move {
                    let credentials = match self.precheck(&target, content, media) {
                        Ok(()) => self.tokens.credentials_for(tenant, target.platform).await,
                        Err(e) => Err(e),
                    };
                    (target, credentials)
                })
                .buffered(self.max_concurrency)
                .collect()
                .await;

        let prepared = if ready.iter().any(|(_, credentials)| credentials.is_ok()) {
            self.upload(tenant, media).await?
        } else {
            None
        };
        let shared = prepared.as_ref();

        let outcomes: Vec<(PublishTarget, Result<SinglePublishResult>)> = stream::iter(ready)
            .map(|(target, credentials)| async move {
                let outcome = match credentials {
                    Ok(credentials) => {
                        self.publish_with(tenant, &target, &credentials, content, shared)
                            .await
                    }
                    Err(e) => Err(e),
                };
                (target, outcome)
            })
            .buffered(self.max_concurrency)
            .collect()
            .await;

        let mut result = MultiPublishResult::default();
        let mut live_without_record = false;
        for (target, outcome) in outcomes {
            match outcome {
                Ok(published) => result.success.push(published),
                Err(e) => {
                    warn!(
                        "Publishing to {} for tenant {} failed: {}",
                        target.platform, tenant.tenant_id, e
                    );
                    live_without_record |= matches!(e, OmnicastError::Unrecorded { .. });
                    result.failed.push(FailedPublish {
                        platform: target.platform,
                        post_type: target.post_type,
                        error: e.to_string(),
                    });
                }
            }
        }

        if let Some(prepared) = &prepared {
            if result.success.is_empty() && !live_without_record {
                self.discard(prepared).await;
            }
        }
        Ok(result)
    }

    /// Checks that need no network: adapter present, post type supported,
    /// media present when required, and something to publish
    fn precheck(
        &self,
        target: &PublishTarget,
        content: &str,
        media: Option<&MediaUpload>,
    ) -> Result<()> {
        let adapter = self.registry.get(target.platform)?;
        if !adapter.supported_post_types().contains(&target.post_type) {
            return Err(PlatformError::Validation(format!(
                "{} does not support {} posts",
                target.platform, target.post_type
            ))
            .into());
        }
        if target.post_type.requires_media() && media.is_none() {
            return Err(PlatformError::Validation(format!(
                "A {} post on {} requires an uploaded file",
                target.post_type, target.platform
            ))
            .into());
        }
        if !target.post_type.requires_media() && media.is_some() {
            return Err(PlatformError::Validation(format!(
                "A {} post on {} cannot carry the attached file",
                target.post_type, target.platform
            ))
            .into());
        }
        if content.trim().is_empty() && media.is_none() {
            return Err(OmnicastError::InvalidInput(
                "Content is required unless a file is attached".to_string(),
            ));
        }
        Ok(())
    }

    async fn upload(
        &self,
        tenant: &TenantContext,
        media: Option<&MediaUpload>,
    ) -> Result<Option<PreparedMedia>> {
        match media {
            Some(upload) => Ok(Some(self.media.put(&tenant.tenant_id, upload).await?)),
            None => Ok(None),
        }
    }

    /// Drop an upload no published post refers to
    async fn discard(&self, prepared: &PreparedMedia) {
        if let Err(e) = self.media.remove(prepared).await {
            warn!("Failed to remove unused media {}: {}", prepared.public_url, e);
        }
    }

    async fn publish_with(
        &self,
        tenant: &TenantContext,
        target: &PublishTarget,
        credentials: &PlatformCredentials,
        content: &str,
        media: Option<&PreparedMedia>,
    ) -> Result<SinglePublishResult> {
        let adapter = self.registry.get(target.platform)?;
        let request = PublishRequest {
            tenant_id: tenant.tenant_id.clone(),
            platform: target.platform,
            post_type: target.post_type,
            content: content.to_string(),
            page_id: target.page_id.clone(),
            media: media.cloned(),
            hashtags: extract_hashtags(content),
        };
        adapter.validate(&request)?;

        info!(
            "Publishing {} post to {} for tenant {}",
            target.post_type, target.platform, tenant.tenant_id
        );
        let published = adapter.publish(credentials, &request).await?;

        let stored = StoredPost::published(&request, &published);
        if let Err(e) = self.db.create_post(&stored).await {
            error!(
                "{} post {} for tenant {} is live but was not recorded: {}",
                target.platform, published.platform_post_id, tenant.tenant_id, e
            );
            return Err(OmnicastError::Unrecorded {
                platform: target.platform.to_string(),
                platform_post_id: published.platform_post_id,
                reason: e.to_string(),
            });
        }
        info!(
            "Published to {} as {} (post {})",
            target.platform, published.platform_post_id, stored.id
        );

        Ok(SinglePublishResult {
            post_id: stored.id,
            platform: target.platform,
            platform_post_id: published.platform_post_id,
            permalink: published.permalink,
        })
    }
}
