//! LinkedIn member shares via the UGC Posts API

use async_trait::async_trait;
use reqwest::{RequestBuilder, Url};
use secrecy::ExposeSecret;
use serde_json::{json, Value};

use crate::analytics::RawMetrics;
use crate::app_config::ResolvedAppConfig;
use crate::credentials::{LinkedInCredentials, PlatformCredentials};
use crate::error::{OmnicastError, PlatformError, Result};
use crate::platforms::http::{self, expires_at_from, metric_value, required_str};
use crate::platforms::{wrong_credentials, SocialPlatform};
use crate::types::{Comment, PlatformKind, PostType, PreparedMedia, PublishRequest, PublishedPost, StoredPost};

const PROVIDER: &str = "LinkedIn";
const SCOPES: &str = "openid profile email w_member_social";
const CHARACTER_LIMIT: usize = 3_000;

pub struct LinkedInPlatform {
    client: reqwest::Client,
    oauth_url: String,
    api_url: String,
}

impl LinkedInPlatform {
    pub fn new(client: reqwest::Client) -> Self {
        Self::with_base_urls(
            client,
            "https://www.linkedin.com/oauth/v2",
            "https://api.linkedin.com/v2",
        )
    }

    pub fn with_base_urls(
        client: reqwest::Client,
        oauth_url: impl Into<String>,
        api_url: impl Into<String>,
    ) -> Self {
        Self {
            client,
            oauth_url: oauth_url.into().trim_end_matches('/').to_string(),
            api_url: api_url.into().trim_end_matches('/').to_string(),
        }
    }

    fn credentials<'a>(&self, credentials: &'a PlatformCredentials) -> Result<&'a LinkedInCredentials> {
        match credentials {
            PlatformCredentials::LinkedIn(c) => Ok(c),
            other => Err(wrong_credentials(PlatformKind::LinkedIn, other).into()),
        }
    }

    fn api(&self, method: reqwest::Method, path: &str, token: &str) -> RequestBuilder {
        self.client
            .request(method, format!("{}/{}", self.api_url, path))
            .bearer_auth(token)
            .header("X-Restli-Protocol-Version", "2.0.0")
    }

    /// Run a token request and build credentials from it
    async fn token_grant(
        &self,
        form: &[(&str, &str)],
        context: &str,
        previous: Option<&LinkedInCredentials>,
    ) -> Result<LinkedInCredentials> {
        let now = chrono::Utc::now().timestamp();
        let request = self
            .client
            .post(format!("{}/accessToken", self.oauth_url))
            .form(form);
        let token: Value = http::send_json(request, PROVIDER, context).await?;
        let access_token = required_str(&token, "/access_token", PROVIDER, context)?;

        let refresh_token = token
            .get("refresh_token")
            .and_then(Value::as_str)
            .map(str::to_string)
            .or_else(|| previous.and_then(|p| p.refresh_token.clone()));
        let refresh_expires_at = metric_value(&token, "/refresh_token_expires_in")
            .map(|secs| now + secs)
            .or_else(|| previous.and_then(|p| p.refresh_expires_at));

        if let Some(previous) = previous {
            return Ok(LinkedInCredentials {
                access_token,
                expires_at: expires_at_from(&token, now),
                refresh_token,
                refresh_expires_at,
                ..previous.clone()
            });
        }

        let profile: Value = http::send_json(
            self.api(reqwest::Method::GET, "userinfo", &access_token),
            PROVIDER,
            "profile lookup",
        )
        .await?;

        Ok(LinkedInCredentials {
            expires_at: expires_at_from(&token, now),
            refresh_token,
            refresh_expires_at,
            member_id: required_str(&profile, "/sub", PROVIDER, "profile lookup")?,
            name: profile.get("name").and_then(Value::as_str).map(str::to_string),
            email: profile.get("email").and_then(Value::as_str).map(str::to_string),
            access_token,
        })
    }

    /// Register an image asset and upload its bytes; returns the asset URN
    async fn upload_image(&self, li: &LinkedInCredentials, media: &PreparedMedia) -> Result<String> {
        let register = json!({
            "registerUploadRequest": {
                "recipes": ["urn:li:digitalmediaRecipe:feedshare-image"],
                "owner": li.author_urn(),
                "serviceRelationships": [{
                    "relationshipType": "OWNER",
                    "identifier": "urn:li:userGeneratedContent"
                }]
            }
        });
        let registered: Value = http::send_json(
            self.api(
                reqwest::Method::POST,
                "assets?action=registerUpload",
                &li.access_token,
            )
            .json(&register),
            PROVIDER,
            "image registration",
        )
        .await?;

        let upload_url = required_str(
            &registered,
            "/value/uploadMechanism/com.linkedin.digitalmedia.uploading.MediaUploadHttpRequest/uploadUrl",
            PROVIDER,
            "image registration",
        )?;
        let asset = required_str(&registered, "/value/asset", PROVIDER, "image registration")?;

        let bytes = if media.bytes.is_empty() {
            http::send(self.client.get(&media.public_url), PROVIDER, "media download")
                .await?
                .bytes()
                .await
                .map_err(|e| http::map_transport_error(e, PROVIDER, "media download"))?
                .to_vec()
        } else {
            media.bytes.clone()
        };

        http::send(
            self.client
                .put(&upload_url)
                .bearer_auth(&li.access_token)
                .header(reqwest::header::CONTENT_TYPE, media.content_type.as_str())
                .body(bytes),
            PROVIDER,
            "image upload",
        )
        .await?;

        Ok(asset)
    }

    fn social_actions_path(post_urn: &str) -> String {
        format!("socialActions/{}", urlencoding::encode(post_urn))
    }
}

fn comment_from_element(value: &Value) -> Option<Comment> {
    let id = value
        .get("$URN")
        .or_else(|| value.get("id"))
        .and_then(Value::as_str)?
        .to_string();
    Some(Comment {
        id,
        author: value.get("actor").and_then(Value::as_str).map(str::to_string),
        message: value
            .pointer("/message/text")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string(),
        created_at: metric_value(value, "/created/time").and_then(|ms| {
            chrono::DateTime::from_timestamp_millis(ms).map(|t| t.to_rfc3339())
        }),
        like_count: metric_value(value, "/likesSummary/totalLikes"),
    })
}

#[async_trait]
impl SocialPlatform for LinkedInPlatform {
    fn kind(&self) -> PlatformKind {
        PlatformKind::LinkedIn
    }

    fn authorization_url(&self, app: &ResolvedAppConfig, state: &str) -> Result<String> {
        let url = Url::parse_with_params(
            &format!("{}/authorization", self.oauth_url),
            &[
                ("response_type", "code"),
                ("client_id", app.client_id.as_str()),
                ("redirect_uri", app.redirect_url.as_str()),
                ("state", state),
                ("scope", SCOPES),
            ],
        )
        .map_err(|e| OmnicastError::InvalidInput(format!("LinkedIn authorize URL: {}", e)))?;
        Ok(url.to_string())
    }

    async fn exchange_code(&self, app: &ResolvedAppConfig, code: &str) -> Result<PlatformCredentials> {
        let credentials = self
            .token_grant(
                &[
                    ("grant_type", "authorization_code"),
                    ("code", code),
                    ("redirect_uri", app.redirect_url.as_str()),
                    ("client_id", app.client_id.as_str()),
                    ("client_secret", app.client_secret.expose_secret()),
                ],
                "code exchange",
                None,
            )
            .await?;

        tracing::info!("Connected LinkedIn member {}", credentials.member_id);
        Ok(PlatformCredentials::LinkedIn(credentials))
    }

    async fn refresh(
        &self,
        app: &ResolvedAppConfig,
        credentials: &PlatformCredentials,
    ) -> Result<Option<PlatformCredentials>> {
        let li = self.credentials(credentials)?;
        let Some(refresh_token) = li.refresh_token.as_deref() else {
            return Ok(None);
        };

        let refreshed = self
            .token_grant(
                &[
                    ("grant_type", "refresh_token"),
                    ("refresh_token", refresh_token),
                    ("client_id", app.client_id.as_str()),
                    ("client_secret", app.client_secret.expose_secret()),
                ],
                "token refresh",
                Some(li),
            )
            .await?;
        Ok(Some(PlatformCredentials::LinkedIn(refreshed)))
    }

    async fn publish(
        &self,
        credentials: &PlatformCredentials,
        request: &PublishRequest,
    ) -> Result<PublishedPost> {
        let li = self.credentials(credentials)?;

        let (category, media) = match (&request.media, request.post_type) {
            (Some(media), PostType::Image) => {
                let asset = self.upload_image(li, media).await?;
                (
                    "IMAGE",
                    vec![json!({
                        "status": "READY",
                        "media": asset,
                        "title": {"text": ""}
                    })],
                )
            }
            (None, PostType::Text) => ("NONE", vec![]),
            (Some(_), PostType::Text) => {
                return Err(PlatformError::Validation(
                    "A LinkedIn text post cannot carry media".to_string(),
                )
                .into())
            }
            (None, PostType::Image) => {
                return Err(PlatformError::Validation(
                    "A LinkedIn image post requires an image".to_string(),
                )
                .into())
            }
            (_, other) => {
                return Err(PlatformError::Validation(format!(
                    "LinkedIn does not support {} posts",
                    other
                ))
                .into())
            }
        };

        let mut share = json!({
            "shareCommentary": {"text": request.content},
            "shareMediaCategory": category
        });
        if !media.is_empty() {
            share["media"] = Value::Array(media);
        }
        let body = json!({
            "author": li.author_urn(),
            "lifecycleState": "PUBLISHED",
            "specificContent": {"com.linkedin.ugc.ShareContent": share},
            "visibility": {"com.linkedin.ugc.MemberNetworkVisibility": "PUBLIC"}
        });

        let response = http::send(
            self.api(reqwest::Method::POST, "ugcPosts", &li.access_token)
                .json(&body),
            PROVIDER,
            "share publish",
        )
        .await?;

        let header_id = response
            .headers()
            .get("x-restli-id")
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let post_urn = match header_id {
            Some(id) => id,
            None => {
                let body: Value = response
                    .json()
                    .await
                    .map_err(|e| http::map_transport_error(e, PROVIDER, "share publish"))?;
                required_str(&body, "/id", PROVIDER, "share publish")?
            }
        };

        tracing::info!("Published LinkedIn share {} for {}", post_urn, li.member_id);
        Ok(PublishedPost {
            permalink: Some(format!("https://www.linkedin.com/feed/update/{}", post_urn)),
            platform_post_id: post_urn,
            account_id: li.member_id.clone(),
        })
    }

    async fn fetch_metrics(
        &self,
        credentials: &PlatformCredentials,
        post: &StoredPost,
    ) -> Result<RawMetrics> {
        let li = self.credentials(credentials)?;
        let summary: Value = http::send_json(
            self.api(
                reqwest::Method::GET,
                &Self::social_actions_path(&post.platform_post_id),
                &li.access_token,
            ),
            PROVIDER,
            "social actions",
        )
        .await?;

        let mut metrics = RawMetrics::new();
        if let Some(likes) = metric_value(&summary, "/likesSummary/totalLikes") {
            metrics.insert("likes".to_string(), likes);
        }
        let comments = metric_value(&summary, "/commentsSummary/aggregatedTotalComments")
            .or_else(|| metric_value(&summary, "/commentsSummary/totalFirstLevelComments"));
        if let Some(comments) = comments {
            metrics.insert("comments".to_string(), comments);
        }
        Ok(metrics)
    }

    async fn fetch_comments(
        &self,
        credentials: &PlatformCredentials,
        platform_post_id: &str,
    ) -> Result<Vec<Comment>> {
        let li = self.credentials(credentials)?;
        let response: Value = http::send_json(
            self.api(
                reqwest::Method::GET,
                &format!("{}/comments", Self::social_actions_path(platform_post_id)),
                &li.access_token,
            ),
            PROVIDER,
            "comment listing",
        )
        .await?;

        Ok(response
            .get("elements")
            .and_then(Value::as_array)
            .map(|elements| elements.iter().filter_map(comment_from_element).collect())
            .unwrap_or_default())
    }

    async fn post_comment(
        &self,
        credentials: &PlatformCredentials,
        platform_post_id: &str,
        message: &str,
    ) -> Result<Comment> {
        let li = self.credentials(credentials)?;
        let body = json!({
            "actor": li.author_urn(),
            "object": platform_post_id,
            "message": {"text": message}
        });
        let response: Value = http::send_json(
            self.api(
                reqwest::Method::POST,
                &format!("{}/comments", Self::social_actions_path(platform_post_id)),
                &li.access_token,
            )
            .json(&body),
            PROVIDER,
            "comment",
        )
        .await?;

        let mut comment = comment_from_element(&response).ok_or_else(|| {
            PlatformError::Posting("LinkedIn comment response is missing an id".to_string())
        })?;
        if comment.message.is_empty() {
            comment.message = message.to_string();
        }
        comment.author = li.name.clone().or(comment.author);
        Ok(comment)
    }

    fn character_limit(&self) -> Option<usize> {
        Some(CHARACTER_LIMIT)
    }

    fn supported_post_types(&self) -> &'static [PostType] {
        &[PostType::Text, PostType::Image]
    }
}
