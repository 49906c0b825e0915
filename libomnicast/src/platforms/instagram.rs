//! Instagram professional accounts via Instagram Login and the Graph API
//!
//! Publishing is a three step flow: create a media container pointing at the
//! uploaded file, wait for Instagram to process it, then publish the
//! container.

use async_trait::async_trait;
use reqwest::Url;
use secrecy::ExposeSecret;
use serde_json::Value;

use crate::analytics::RawMetrics;
use crate::app_config::ResolvedAppConfig;
use crate::credentials::{InstagramCredentials, PlatformCredentials};
use crate::error::{OmnicastError, PlatformError, Result};
use crate::platforms::facebook::comment_from_graph;
use crate::platforms::http::{self, expires_at_from, metric_value, required_str};
use crate::platforms::polling::{poll_container, ContainerStatus, PollPolicy};
use crate::platforms::{validate_common, wrong_credentials, SocialPlatform};
use crate::types::{Comment, PlatformKind, PostType, PublishRequest, PublishedPost, StoredPost};

const PROVIDER: &str = "Instagram";
const SCOPES: &str = "instagram_business_basic,instagram_business_content_publish,instagram_business_manage_comments,instagram_business_manage_insights";
const CHARACTER_LIMIT: usize = 2_200;

/// Hosts the adapter talks to
#[derive(Debug, Clone)]
pub struct InstagramEndpoints {
    pub authorize: String,
    /// Short-lived token exchange
    pub token: String,
    /// Unversioned host for long-lived token exchange and refresh
    pub graph_root: String,
    /// Versioned Graph API base
    pub graph: String,
}

impl Default for InstagramEndpoints {
    fn default() -> Self {
        Self {
            authorize: "https://www.instagram.com/oauth/authorize".to_string(),
            token: "https://api.instagram.com/oauth/access_token".to_string(),
            graph_root: "https://graph.instagram.com".to_string(),
            graph: "https://graph.instagram.com/v21.0".to_string(),
        }
    }
}

impl InstagramEndpoints {
    /// Every endpoint served from one base URL
    pub fn single_host(base: &str) -> Self {
        let base = base.trim_end_matches('/');
        Self {
            authorize: format!("{}/oauth/authorize", base),
            token: format!("{}/oauth/access_token", base),
            graph_root: base.to_string(),
            graph: format!("{}/v21.0", base),
        }
    }
}

pub struct InstagramPlatform {
    client: reqwest::Client,
    poll: PollPolicy,
    endpoints: InstagramEndpoints,
}

impl InstagramPlatform {
    pub fn new(client: reqwest::Client, poll: PollPolicy) -> Self {
        Self::with_endpoints(client, poll, InstagramEndpoints::default())
    }

    pub fn with_endpoints(client: reqwest::Client, poll: PollPolicy, endpoints: InstagramEndpoints) -> Self {
        Self {
            client,
            poll,
            endpoints,
        }
    }

    fn credentials<'a>(&self, credentials: &'a PlatformCredentials) -> Result<&'a InstagramCredentials> {
        match credentials {
            PlatformCredentials::Instagram(c) => Ok(c),
            other => Err(wrong_credentials(PlatformKind::Instagram, other).into()),
        }
    }

    async fn graph_get(&self, path: &str, params: &[(&str, &str)], context: &str) -> Result<Value> {
        let request = self
            .client
            .get(format!("{}/{}", self.endpoints.graph, path))
            .query(params);
        http::send_json(request, PROVIDER, context).await
    }

    async fn graph_post(&self, path: &str, form: &[(&str, &str)], context: &str) -> Result<Value> {
        let request = self
            .client
            .post(format!("{}/{}", self.endpoints.graph, path))
            .form(form);
        http::send_json(request, PROVIDER, context).await
    }

    async fn root_get(&self, path: &str, params: &[(&str, &str)], context: &str) -> Result<Value> {
        let request = self
            .client
            .get(format!("{}/{}", self.endpoints.graph_root, path))
            .query(params);
        http::send_json(request, PROVIDER, context).await
    }

    /// Check a media container's processing state once
    async fn container_status(&self, container_id: &str, token: &str) -> Result<ContainerStatus> {
        let response = self
            .graph_get(
                container_id,
                &[("fields", "status_code,status"), ("access_token", token)],
                "container status",
            )
            .await?;
        let code = response
            .get("status_code")
            .and_then(Value::as_str)
            .unwrap_or("IN_PROGRESS");
        Ok(ContainerStatus::parse(
            code,
            response.get("status").and_then(Value::as_str),
        ))
    }

    async fn permalink(&self, media_id: &str, token: &str) -> Option<String> {
        match self
            .graph_get(media_id, &[("fields", "permalink"), ("access_token", token)], "permalink")
            .await
        {
            Ok(response) => response
                .get("permalink")
                .and_then(Value::as_str)
                .map(str::to_string),
            Err(e) => {
                tracing::debug!("Instagram permalink lookup failed for {}: {}", media_id, e);
                None
            }
        }
    }
}

#[async_trait]
impl SocialPlatform for InstagramPlatform {
    fn kind(&self) -> PlatformKind {
        PlatformKind::Instagram
    }

    fn authorization_url(&self, app: &ResolvedAppConfig, state: &str) -> Result<String> {
        let url = Url::parse_with_params(
            &self.endpoints.authorize,
            &[
                ("client_id", app.client_id.as_str()),
                ("redirect_uri", app.redirect_url.as_str()),
                ("response_type", "code"),
                ("scope", SCOPES),
                ("state", state),
            ],
        )
        .map_err(|e| OmnicastError::InvalidInput(format!("Instagram authorize URL: {}", e)))?;
        Ok(url.to_string())
    }

    async fn exchange_code(&self, app: &ResolvedAppConfig, code: &str) -> Result<PlatformCredentials> {
        let request = self.client.post(&self.endpoints.token).form(&[
            ("client_id", app.client_id.as_str()),
            ("client_secret", app.client_secret.expose_secret()),
            ("grant_type", "authorization_code"),
            ("redirect_uri", app.redirect_url.as_str()),
            ("code", code),
        ]);
        let short: Value = http::send_json(request, PROVIDER, "code exchange").await?;

        // Newer responses wrap the token in data[0]
        let short = short
            .pointer("/data/0")
            .cloned()
            .unwrap_or(short);
        let short_token = required_str(&short, "/access_token", PROVIDER, "code exchange")?;

        let now = chrono::Utc::now().timestamp();
        let long = self
            .root_get(
                "access_token",
                &[
                    ("grant_type", "ig_exchange_token"),
                    ("client_secret", app.client_secret.expose_secret()),
                    ("access_token", short_token.as_str()),
                ],
                "long-lived token exchange",
            )
            .await?;
        let access_token = required_str(&long, "/access_token", PROVIDER, "long-lived token exchange")?;

        let profile = self
            .graph_get(
                "me",
                &[("fields", "user_id,username"), ("access_token", access_token.as_str())],
                "profile lookup",
            )
            .await?;
        let user_id = required_str(&profile, "/user_id", PROVIDER, "profile lookup")
            .or_else(|_| required_str(&short, "/user_id", PROVIDER, "profile lookup"))?;

        tracing::info!("Connected Instagram account {}", user_id);
        Ok(PlatformCredentials::Instagram(InstagramCredentials {
            access_token,
            expires_at: expires_at_from(&long, now),
            user_id,
            username: profile
                .get("username")
                .and_then(Value::as_str)
                .map(str::to_string),
        }))
    }

    async fn refresh(
        &self,
        _app: &ResolvedAppConfig,
        credentials: &PlatformCredentials,
    ) -> Result<Option<PlatformCredentials>> {
        let ig = self.credentials(credentials)?;
        let now = chrono::Utc::now().timestamp();
        let response = self
            .root_get(
                "refresh_access_token",
                &[
                    ("grant_type", "ig_refresh_token"),
                    ("access_token", ig.access_token.as_str()),
                ],
                "token refresh",
            )
            .await?;

        Ok(Some(PlatformCredentials::Instagram(InstagramCredentials {
            access_token: required_str(&response, "/access_token", PROVIDER, "token refresh")?,
            expires_at: expires_at_from(&response, now),
            ..ig.clone()
        })))
    }

    fn validate(&self, request: &PublishRequest) -> Result<()> {
        if request.post_type == PostType::Text || request.media.is_none() {
            return Err(PlatformError::Validation(
                "Instagram posts need an image or video".to_string(),
            )
            .into());
        }
        validate_common(request, self.supported_post_types(), self.character_limit())
    }

    async fn publish(
        &self,
        credentials: &PlatformCredentials,
        request: &PublishRequest,
    ) -> Result<PublishedPost> {
        let ig = self.credentials(credentials)?;
        let media = request.media.as_ref().ok_or_else(|| {
            PlatformError::Validation("Instagram posts need an image or video".to_string())
        })?;
        let token = ig.access_token.as_str();

        let mut form: Vec<(&str, &str)> = vec![("caption", request.content.as_str()), ("access_token", token)];
        if request.post_type.is_video() {
            form.push(("media_type", "REELS"));
            form.push(("video_url", media.public_url.as_str()));
        } else {
            form.push(("image_url", media.public_url.as_str()));
        }

        let container = self
            .graph_post(&format!("{}/media", ig.user_id), &form, "container creation")
            .await?;
        let container_id = required_str(&container, "/id", PROVIDER, "container creation")?;
        tracing::debug!("Created Instagram container {}", container_id);

        let label = format!("Instagram container {}", container_id);
        let container_ref = container_id.as_str();
        poll_container(self.poll, &label, move |_| {
            self.container_status(container_ref, token)
        })
        .await?;

        let published = self
            .graph_post(
                &format!("{}/media_publish", ig.user_id),
                &[("creation_id", container_id.as_str()), ("access_token", token)],
                "media publish",
            )
            .await?;
        let media_id = required_str(&published, "/id", PROVIDER, "media publish")?;

        tracing::info!("Published Instagram media {} for {}", media_id, ig.user_id);
        Ok(PublishedPost {
            permalink: self.permalink(&media_id, token).await,
            platform_post_id: media_id,
            account_id: ig.user_id.clone(),
        })
    }

    async fn fetch_metrics(
        &self,
        credentials: &PlatformCredentials,
        post: &StoredPost,
    ) -> Result<RawMetrics> {
        let ig = self.credentials(credentials)?;
        let token = ig.access_token.as_str();
        let mut metrics = RawMetrics::new();

        let counts = self
            .graph_get(
                &post.platform_post_id,
                &[("fields", "like_count,comments_count"), ("access_token", token)],
                "media metrics",
            )
            .await?;
        for field in ["like_count", "comments_count"] {
            if let Some(value) = metric_value(&counts, &format!("/{}", field)) {
                metrics.insert(field.to_string(), value);
            }
        }

        let insight_metrics = if post.post_type.is_video() {
            "reach,saved,shares,views,ig_reels_aggregated_all_plays_count"
        } else {
            "reach,saved,shares,impressions"
        };
        match self
            .graph_get(
                &format!("{}/insights", post.platform_post_id),
                &[("metric", insight_metrics), ("access_token", token)],
                "media insights",
            )
            .await
        {
            Ok(insights) => {
                for entry in insights
                    .get("data")
                    .and_then(Value::as_array)
                    .into_iter()
                    .flatten()
                {
                    let Some(name) = entry.get("name").and_then(Value::as_str) else {
                        continue;
                    };
                    let value = metric_value(entry, "/values/0/value")
                        .or_else(|| metric_value(entry, "/total_value/value"));
                    if let Some(value) = value {
                        metrics.insert(name.to_string(), value);
                    }
                }
            }
            Err(e) => tracing::warn!(
                "Instagram insights unavailable for {}: {}",
                post.platform_post_id,
                e
            ),
        }

        Ok(metrics)
    }

    async fn fetch_comments(
        &self,
        credentials: &PlatformCredentials,
        platform_post_id: &str,
    ) -> Result<Vec<Comment>> {
        let ig = self.credentials(credentials)?;
        let response = self
            .graph_get(
                &format!("{}/comments", platform_post_id),
                &[
                    ("fields", "id,text,username,timestamp,like_count"),
                    ("access_token", ig.access_token.as_str()),
                ],
                "comment listing",
            )
            .await?;

        Ok(response
            .get("data")
            .and_then(Value::as_array)
            .map(|data| data.iter().filter_map(comment_from_graph).collect())
            .unwrap_or_default())
    }

    async fn post_comment(
        &self,
        credentials: &PlatformCredentials,
        platform_post_id: &str,
        message: &str,
    ) -> Result<Comment> {
        let ig = self.credentials(credentials)?;
        let response = self
            .graph_post(
                &format!("{}/comments", platform_post_id),
                &[("message", message), ("access_token", ig.access_token.as_str())],
                "comment",
            )
            .await?;

        Ok(Comment {
            id: required_str(&response, "/id", PROVIDER, "comment")?,
            author: ig.username.clone(),
            message: message.to_string(),
            created_at: Some(chrono::Utc::now().to_rfc3339()),
            like_count: Some(0),
        })
    }

    fn character_limit(&self) -> Option<usize> {
        Some(CHARACTER_LIMIT)
    }

    fn supported_post_types(&self) -> &'static [PostType] {
        &[PostType::Image, PostType::Video, PostType::Reel]
    }
}
