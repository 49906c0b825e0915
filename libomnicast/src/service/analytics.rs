//! On-demand analytics refresh and aggregation
//!
//! A post's analytics move `pending → synced` on a successful refresh and
//! `pending|synced → failed` on an error. A failed post is refreshed the
//! same way as any other; the last good document is kept until then.
//! The overview sums stored documents and never calls a provider.

use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{info, warn};

use super::tokens::TokenKeeper;
use crate::analytics::{calculate_engagement, clean_analytics_for_platform};
use crate::db::{Database, PostFilter};
use crate::error::{OmnicastError, Result};
use crate::platforms::PlatformRegistry;
use crate::types::{AnalyticsStatus, PlatformKind, StoredPost, TenantContext};

/// A stored post with its derived engagement
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PostSummary {
    #[serde(flatten)]
    pub post: StoredPost,
    pub engagement: i64,
}

impl From<StoredPost> for PostSummary {
    fn from(post: StoredPost) -> Self {
        let engagement = post
            .analytics
            .as_ref()
            .map(|a| calculate_engagement(post.platform, a, post.post_type))
            .unwrap_or(0);
        Self { post, engagement }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct StatusCounts {
    pub pending: usize,
    pub synced: usize,
    pub failed: usize,
}

impl StatusCounts {
    fn add(&mut self, status: AnalyticsStatus) {
        match status {
            AnalyticsStatus::Pending => self.pending += 1,
            AnalyticsStatus::Synced => self.synced += 1,
            AnalyticsStatus::Failed => self.failed += 1,
        }
    }
}

/// Metric sums for a set of posts
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricTotals {
    pub posts: usize,
    pub engagement: i64,
    pub metrics: BTreeMap<String, i64>,
    pub status: StatusCounts,
}

impl MetricTotals {
    fn add(&mut self, post: &StoredPost) {
        self.posts += 1;
        self.status.add(post.analytics_status);
        if let Some(analytics) = &post.analytics {
            for (name, value) in &analytics.metrics {
                *self.metrics.entry(name.clone()).or_insert(0) += value;
            }
            self.engagement += calculate_engagement(post.platform, analytics, post.post_type);
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalyticsOverview {
    pub total: MetricTotals,
    pub platforms: BTreeMap<PlatformKind, MetricTotals>,
}

#[derive(Clone)]
pub struct AnalyticsService {
    db: Arc<Database>,
    registry: Arc<PlatformRegistry>,
    tokens: TokenKeeper,
}

impl AnalyticsService {
    pub fn new(db: Arc<Database>, registry: Arc<PlatformRegistry>, tokens: TokenKeeper) -> Self {
        Self {
            db,
            registry,
            tokens,
        }
    }

    /// Re-fetch a post's metrics from its platform and store the cleaned
    /// document
    ///
    /// # Errors
    ///
    /// Returns `NotFound` for an unknown post. Provider and credential
    /// errors are recorded on the post (status `failed`) and returned.
    pub async fn refresh_post(&self, tenant: &TenantContext, post_id: &str) -> Result<PostSummary> {
        let post = self.load(&tenant.tenant_id, post_id).await?;

        match self.fetch(tenant, &post).await {
            Ok(analytics) => {
                self.db.record_analytics(&post.id, &analytics).await?;
                info!(
                    "Synced {} analytics for post {} ({} metrics)",
                    post.platform,
                    post.id,
                    analytics.metrics.len()
                );
            }
            Err(e) => {
                warn!(
                    "Analytics refresh for {} post {} failed: {}",
                    post.platform, post.id, e
                );
                self.db
                    .record_analytics_failure(&post.id, &e.to_string())
                    .await?;
                return Err(e);
            }
        }

        self.get_post(&tenant.tenant_id, post_id).await
    }

    async fn fetch(
        &self,
        tenant: &TenantContext,
        post: &StoredPost,
    ) -> Result<crate::analytics::PostAnalytics> {
        let adapter = self.registry.get(post.platform)?;
        let credentials = self.tokens.credentials_for(tenant, post.platform).await?;
        let raw = adapter.fetch_metrics(&credentials, post).await?;
        Ok(clean_analytics_for_platform(post.platform, &raw, post.post_type))
    }

    async fn load(&self, tenant_id: &str, post_id: &str) -> Result<StoredPost> {
        self.db
            .get_post(tenant_id, post_id)
            .await?
            .ok_or_else(|| OmnicastError::NotFound(format!("Post not found: {}", post_id)))
    }

    pub async fn get_post(&self, tenant_id: &str, post_id: &str) -> Result<PostSummary> {
        self.load(tenant_id, post_id).await.map(PostSummary::from)
    }

    pub async fn list_posts(&self, tenant_id: &str, filter: &PostFilter) -> Result<Vec<PostSummary>> {
        let posts = self.db.list_posts(tenant_id, filter).await?;
        Ok(posts.into_iter().map(PostSummary::from).collect())
    }

    /// Totals across every stored post, overall and per platform
    pub async fn overview(&self, tenant_id: &str) -> Result<AnalyticsOverview> {
        let posts = self.db.list_posts(tenant_id, &PostFilter::default()).await?;

        let mut overview = AnalyticsOverview::default();
        for post in &posts {
            overview.total.add(post);
            overview.platforms.entry(post.platform).or_default().add(post);
        }
        Ok(overview)
    }
}
