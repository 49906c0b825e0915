//! Facebook Pages via the Graph API

use async_trait::async_trait;
use reqwest::Url;
use secrecy::ExposeSecret;
use serde_json::Value;

use crate::analytics::RawMetrics;
use crate::app_config::ResolvedAppConfig;
use crate::credentials::{FacebookCredentials, FacebookPage, PlatformCredentials};
use crate::error::{OmnicastError, PlatformError, Result};
use crate::platforms::http::{self, expires_at_from, metric_value, required_str};
use crate::platforms::{wrong_credentials, SocialPlatform};
use crate::types::{Comment, PlatformKind, PostType, PublishRequest, PublishedPost, StoredPost};

const PROVIDER: &str = "Facebook";
const GRAPH_URL: &str = "https://graph.facebook.com/v19.0";
const DIALOG_URL: &str = "https://www.facebook.com/v19.0/dialog/oauth";
const SCOPES: &str = "public_profile,pages_show_list,pages_read_engagement,pages_manage_posts,pages_manage_engagement,read_insights";

/// Facebook caps post text at 63,206 characters
const CHARACTER_LIMIT: usize = 63_206;

pub struct FacebookPlatform {
    client: reqwest::Client,
    graph_url: String,
    dialog_url: String,
}

impl FacebookPlatform {
    pub fn new(client: reqwest::Client) -> Self {
        Self::with_base_urls(client, GRAPH_URL, DIALOG_URL)
    }

    /// Point the adapter at another Graph API host
    pub fn with_base_urls(
        client: reqwest::Client,
        graph_url: impl Into<String>,
        dialog_url: impl Into<String>,
    ) -> Self {
        Self {
            client,
            graph_url: graph_url.into().trim_end_matches('/').to_string(),
            dialog_url: dialog_url.into(),
        }
    }

    fn credentials<'a>(&self, credentials: &'a PlatformCredentials) -> Result<&'a FacebookCredentials> {
        match credentials {
            PlatformCredentials::Facebook(c) => Ok(c),
            other => Err(wrong_credentials(PlatformKind::Facebook, other).into()),
        }
    }

    async fn get(&self, path: &str, params: &[(&str, &str)], context: &str) -> Result<Value> {
        let request = self
            .client
            .get(format!("{}/{}", self.graph_url, path))
            .query(params);
        http::send_json(request, PROVIDER, context).await
    }

    async fn post_form(&self, path: &str, form: &[(&str, &str)], context: &str) -> Result<Value> {
        let request = self
            .client
            .post(format!("{}/{}", self.graph_url, path))
            .form(form);
        http::send_json(request, PROVIDER, context).await
    }

    /// Swap a user token for a long-lived one
    async fn long_lived_token(&self, app: &ResolvedAppConfig, token: &str) -> Result<(String, Option<i64>)> {
        let now = chrono::Utc::now().timestamp();
        let response = self
            .get(
                "oauth/access_token",
                &[
                    ("grant_type", "fb_exchange_token"),
                    ("client_id", app.client_id.as_str()),
                    ("client_secret", app.client_secret.expose_secret()),
                    ("fb_exchange_token", token),
                ],
                "long-lived token exchange",
            )
            .await?;
        let access_token = required_str(&response, "/access_token", PROVIDER, "long-lived token exchange")?;
        Ok((access_token, expires_at_from(&response, now)))
    }

    /// Profile and managed pages for a user token
    async fn load_account(&self, token: &str, expires_at: Option<i64>) -> Result<FacebookCredentials> {
        let me = self
            .get("me", &[("fields", "id,name"), ("access_token", token)], "profile lookup")
            .await?;
        let accounts = self
            .get(
                "me/accounts",
                &[
                    ("fields", "id,name,access_token,category"),
                    ("limit", "100"),
                    ("access_token", token),
                ],
                "page lookup",
            )
            .await?;

        let pages = accounts
            .get("data")
            .and_then(Value::as_array)
            .map(|data| {
                data.iter()
                    .filter_map(|page| {
                        Some(FacebookPage {
                            id: page.get("id")?.as_str()?.to_string(),
                            name: page.get("name")?.as_str()?.to_string(),
                            access_token: page.get("access_token")?.as_str()?.to_string(),
                            category: page
                                .get("category")
                                .and_then(Value::as_str)
                                .map(str::to_string),
                        })
                    })
                    .collect::<Vec<_>>()
            })
            .unwrap_or_default();

        if pages.is_empty() {
            tracing::warn!("Facebook account connected without any manageable pages");
        }

        Ok(FacebookCredentials {
            user_access_token: token.to_string(),
            expires_at,
            user_id: required_str(&me, "/id", PROVIDER, "profile lookup")?,
            user_name: me.get("name").and_then(Value::as_str).map(str::to_string),
            pages,
        })
    }

    /// Page token for an object id of the form `{page_id}_{post_id}`, or a
    /// bare id published under one of the connected pages
    fn token_for<'a>(&self, fb: &'a FacebookCredentials, page_id: Option<&str>, object_id: &str) -> &'a str {
        let owner = page_id.or_else(|| object_id.split_once('_').map(|(page, _)| page));
        owner
            .and_then(|id| fb.page(Some(id)))
            .or_else(|| fb.page(None))
            .map(|page| page.access_token.as_str())
            .unwrap_or(&fb.user_access_token)
    }

    /// Impressions, reach and clicks from post insights
    async fn post_insights(&self, post_id: &str, token: &str, metrics: &mut RawMetrics) -> Result<()> {
        let insights = self
            .get(
                &format!("{}/insights", post_id),
                &[
                    ("metric", "post_impressions,post_impressions_unique,post_clicks"),
                    ("access_token", token),
                ],
                "insights",
            )
            .await?;
        collect_insights(&insights, metrics);
        Ok(())
    }
}

/// Fold a Graph insights `data[]` array into metrics by name
fn collect_insights(insights: &Value, metrics: &mut RawMetrics) {
    for entry in insights
        .get("data")
        .and_then(Value::as_array)
        .into_iter()
        .flatten()
    {
        let Some(name) = entry.get("name").and_then(Value::as_str) else {
            continue;
        };
        if let Some(value) = metric_value(entry, "/values/0/value") {
            metrics.insert(name.to_string(), value);
        }
    }
}

pub(crate) fn comment_from_graph(value: &Value) -> Option<Comment> {
    Some(Comment {
        id: value.get("id")?.as_str()?.to_string(),
        author: value
            .pointer("/from/name")
            .or_else(|| value.get("username"))
            .and_then(Value::as_str)
            .map(str::to_string),
        message: value
            .get("message")
            .or_else(|| value.get("text"))
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string(),
        created_at: value
            .get("created_time")
            .or_else(|| value.get("timestamp"))
            .and_then(Value::as_str)
            .map(str::to_string),
        like_count: metric_value(value, "/like_count"),
    })
}

#[async_trait]
impl SocialPlatform for FacebookPlatform {
    fn kind(&self) -> PlatformKind {
        PlatformKind::Facebook
    }

    fn authorization_url(&self, app: &ResolvedAppConfig, state: &str) -> Result<String> {
        let url = Url::parse_with_params(
            &self.dialog_url,
            &[
                ("client_id", app.client_id.as_str()),
                ("redirect_uri", app.redirect_url.as_str()),
                ("state", state),
                ("scope", SCOPES),
                ("response_type", "code"),
            ],
        )
        .map_err(|e| OmnicastError::InvalidInput(format!("Facebook authorize URL: {}", e)))?;
        Ok(url.to_string())
    }

    async fn exchange_code(&self, app: &ResolvedAppConfig, code: &str) -> Result<PlatformCredentials> {
        let short = self
            .get(
                "oauth/access_token",
                &[
                    ("client_id", app.client_id.as_str()),
                    ("client_secret", app.client_secret.expose_secret()),
                    ("redirect_uri", app.redirect_url.as_str()),
                    ("code", code),
                ],
                "code exchange",
            )
            .await?;
        let short_token = required_str(&short, "/access_token", PROVIDER, "code exchange")?;

        let (token, expires_at) = self.long_lived_token(app, &short_token).await?;
        let account = self.load_account(&token, expires_at).await?;

        tracing::info!(
            "Connected Facebook user {} with {} page(s)",
            account.user_id,
            account.pages.len()
        );
        Ok(PlatformCredentials::Facebook(account))
    }

    async fn refresh(
        &self,
        app: &ResolvedAppConfig,
        credentials: &PlatformCredentials,
    ) -> Result<Option<PlatformCredentials>> {
        let fb = self.credentials(credentials)?;
        let (token, expires_at) = self.long_lived_token(app, &fb.user_access_token).await?;
        let account = self.load_account(&token, expires_at).await?;
        Ok(Some(PlatformCredentials::Facebook(account)))
    }

    async fn publish(
        &self,
        credentials: &PlatformCredentials,
        request: &PublishRequest,
    ) -> Result<PublishedPost> {
        let fb = self.credentials(credentials)?;
        let page = fb.page(request.page_id.as_deref()).ok_or_else(|| {
            PlatformError::Validation(match &request.page_id {
                Some(id) => format!("Facebook page {} is not connected", id),
                None => "No Facebook page is connected".to_string(),
            })
        })?;
        let token = page.access_token.as_str();
        let content = request.content.as_str();

        let (response, id_field) = match (request.post_type, &request.media) {
            (PostType::Image, Some(media)) => (
                self.post_form(
                    &format!("{}/photos", page.id),
                    &[
                        ("url", media.public_url.as_str()),
                        ("caption", content),
                        ("access_token", token),
                    ],
                    "photo publish",
                )
                .await?,
                "/post_id",
            ),
            (PostType::Video | PostType::Reel, Some(media)) => (
                self.post_form(
                    &format!("{}/videos", page.id),
                    &[
                        ("file_url", media.public_url.as_str()),
                        ("description", content),
                        ("access_token", token),
                    ],
                    "video publish",
                )
                .await?,
                "/id",
            ),
            (PostType::Text, None) => (
                self.post_form(
                    &format!("{}/feed", page.id),
                    &[("message", content), ("access_token", token)],
                    "feed publish",
                )
                .await?,
                "/id",
            ),
            (post_type, media) => {
                return Err(PlatformError::Validation(match media {
                    Some(_) => format!("A Facebook {} post cannot carry media", post_type),
                    None => format!("A Facebook {} post requires media", post_type),
                })
                .into())
            }
        };

        let post_id = required_str(&response, id_field, PROVIDER, "publish")
            .or_else(|_| required_str(&response, "/id", PROVIDER, "publish"))?;

        tracing::info!("Published Facebook post {} on page {}", post_id, page.id);
        Ok(PublishedPost {
            permalink: Some(format!("https://www.facebook.com/{}", post_id)),
            platform_post_id: post_id,
            account_id: page.id.clone(),
        })
    }

    async fn fetch_metrics(
        &self,
        credentials: &PlatformCredentials,
        post: &StoredPost,
    ) -> Result<RawMetrics> {
        let fb = self.credentials(credentials)?;
        let token = self.token_for(fb, Some(&post.account_id), &post.platform_post_id);
        let mut metrics = RawMetrics::new();

        if post.post_type.is_video() {
            let video = self
                .get(
                    &post.platform_post_id,
                    &[
                        ("fields", "likes.summary(true).limit(0),comments.summary(true).limit(0)"),
                        ("access_token", token),
                    ],
                    "video metrics",
                )
                .await?;
            if let Some(likes) = metric_value(&video, "/likes/summary/total_count") {
                metrics.insert("likes".to_string(), likes);
            }
            if let Some(comments) = metric_value(&video, "/comments/summary/total_count") {
                metrics.insert("comments".to_string(), comments);
            }

            match self
                .get(
                    &format!("{}/video_insights", post.platform_post_id),
                    &[("metric", "total_video_views"), ("access_token", token)],
                    "video insights",
                )
                .await
            {
                Ok(insights) => collect_insights(&insights, &mut metrics),
                Err(e) => tracing::warn!("Facebook video insights unavailable: {}", e),
            }
            return Ok(metrics);
        }

        let summary = self
            .get(
                &post.platform_post_id,
                &[
                    (
                        "fields",
                        "reactions.summary(total_count).limit(0),comments.summary(total_count).limit(0),shares",
                    ),
                    ("access_token", token),
                ],
                "post metrics",
            )
            .await?;

        if let Some(reactions) = metric_value(&summary, "/reactions/summary/total_count") {
            metrics.insert("reactions".to_string(), reactions);
            metrics.insert("likes".to_string(), reactions);
        }
        if let Some(comments) = metric_value(&summary, "/comments/summary/total_count") {
            metrics.insert("comments".to_string(), comments);
        }
        metrics.insert(
            "shares".to_string(),
            metric_value(&summary, "/shares/count").unwrap_or(0),
        );

        // Insights need read_insights on the page; counts above stand alone
        if let Err(e) = self
            .post_insights(&post.platform_post_id, token, &mut metrics)
            .await
        {
            tracing::warn!("Facebook insights unavailable for {}: {}", post.platform_post_id, e);
        }

        Ok(metrics)
    }

    async fn fetch_comments(
        &self,
        credentials: &PlatformCredentials,
        platform_post_id: &str,
    ) -> Result<Vec<Comment>> {
        let fb = self.credentials(credentials)?;
        let token = self.token_for(fb, None, platform_post_id);
        let response = self
            .get(
                &format!("{}/comments", platform_post_id),
                &[
                    ("fields", "id,message,from,created_time,like_count"),
                    ("order", "reverse_chronological"),
                    ("access_token", token),
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
        let fb = self.credentials(credentials)?;
        let token = self.token_for(fb, None, platform_post_id);
        let response = self
            .post_form(
                &format!("{}/comments", platform_post_id),
                &[("message", message), ("access_token", token)],
                "comment",
            )
            .await?;

        Ok(Comment {
            id: required_str(&response, "/id", PROVIDER, "comment")?,
            author: self.token_owner_name(fb, platform_post_id),
            message: message.to_string(),
            created_at: Some(chrono::Utc::now().to_rfc3339()),
            like_count: Some(0),
        })
    }

    fn character_limit(&self) -> Option<usize> {
        Some(CHARACTER_LIMIT)
    }

    fn supported_post_types(&self) -> &'static [PostType] {
        &[PostType::Text, PostType::Image, PostType::Video, PostType::Reel]
    }
}

impl FacebookPlatform {
    fn token_owner_name(&self, fb: &FacebookCredentials, object_id: &str) -> Option<String> {
        object_id
            .split_once('_')
            .and_then(|(page, _)| fb.page(Some(page)))
            .or_else(|| fb.page(None))
            .map(|page| page.name.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app_config::ConfigSource;
    use secrecy::SecretString;

    fn app() -> ResolvedAppConfig {
        ResolvedAppConfig {
            client_id: "fb-app".to_string(),
            client_secret: SecretString::from("shh".to_string()),
            redirect_url: "https://api.example.com/facebook/callback".to_string(),
            source: ConfigSource::Environment,
        }
    }

    fn credentials() -> FacebookCredentials {
        FacebookCredentials {
            user_access_token: "user".to_string(),
            expires_at: None,
            user_id: "u".to_string(),
            user_name: None,
            pages: vec![
                FacebookPage {
                    id: "111".to_string(),
                    name: "Main".to_string(),
                    access_token: "main-token".to_string(),
                    category: None,
                },
                FacebookPage {
                    id: "222".to_string(),
                    name: "Side".to_string(),
                    access_token: "side-token".to_string(),
                    category: None,
                },
            ],
        }
    }

    #[test]
    fn test_authorization_url() {
        let platform = FacebookPlatform::new(reqwest::Client::new());
        let url = platform.authorization_url(&app(), "signed.state").unwrap();
        let parsed = Url::parse(&url).unwrap();
        let params: std::collections::HashMap<_, _> = parsed.query_pairs().into_owned().collect();

        assert!(url.starts_with(DIALOG_URL));
        assert_eq!(params["client_id"], "fb-app");
        assert_eq!(params["redirect_uri"], "https://api.example.com/facebook/callback");
        assert_eq!(params["state"], "signed.state");
        assert!(params["scope"].contains("pages_manage_posts"));
        assert!(!url.contains("shh"));
    }

    #[test]
    fn test_token_for_object_ids() {
        let platform = FacebookPlatform::new(reqwest::Client::new());
        let fb = credentials();
        assert_eq!(platform.token_for(&fb, None, "222_999"), "side-token");
        assert_eq!(platform.token_for(&fb, None, "999"), "main-token");
        assert_eq!(platform.token_for(&fb, Some("222"), "999"), "side-token");

        let no_pages = FacebookCredentials {
            pages: vec![],
            ..credentials()
        };
        assert_eq!(platform.token_for(&no_pages, None, "x"), "user");
    }

    #[test]
    fn test_collect_insights() {
        let insights = serde_json::json!({
            "data": [
                {"name": "post_impressions", "values": [{"value": 120}]},
                {"name": "post_clicks", "values": [{"value": 4}]},
                {"name": "broken"}
            ]
        });
        let mut metrics = RawMetrics::new();
        collect_insights(&insights, &mut metrics);
        assert_eq!(metrics.get("post_impressions"), Some(&120));
        assert_eq!(metrics.get("post_clicks"), Some(&4));
        assert!(!metrics.contains_key("broken"));
    }

    #[test]
    fn test_comment_from_graph() {
        let comment = comment_from_graph(&serde_json::json!({
            "id": "c1",
            "message": "Nice!",
            "from": {"name": "Ada"},
            "created_time": "2024-01-01T00:00:00+0000",
            "like_count": 2
        }))
        .unwrap();
        assert_eq!(comment.author.as_deref(), Some("Ada"));
        assert_eq!(comment.like_count, Some(2));
        assert!(comment_from_graph(&serde_json::json!({"message": "no id"})).is_none());
    }
}
