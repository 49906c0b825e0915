//! YouTube channels via the Data and Analytics APIs

use async_trait::async_trait;
use reqwest::header::{CONTENT_LENGTH, CONTENT_TYPE, LOCATION};
use reqwest::Url;
use secrecy::ExposeSecret;
use serde_json::{json, Value};

use crate::analytics::RawMetrics;
use crate::app_config::ResolvedAppConfig;
use crate::credentials::{PlatformCredentials, YouTubeCredentials};
use crate::error::{OmnicastError, PlatformError, Result};
use crate::platforms::http::{self, expires_at_from, metric_value, required_str};
use crate::platforms::{wrong_credentials, SocialPlatform};
use crate::types::{Comment, PlatformKind, PostType, PublishRequest, PublishedPost, StoredPost};

const PROVIDER: &str = "YouTube";
const SCOPES: &str = "https://www.googleapis.com/auth/youtube.upload https://www.googleapis.com/auth/youtube.readonly https://www.googleapis.com/auth/youtube.force-ssl https://www.googleapis.com/auth/yt-analytics.readonly";
/// Video descriptions are limited to 5,000 bytes; counted here in characters
const CHARACTER_LIMIT: usize = 5_000;
const TITLE_LIMIT: usize = 100;

#[derive(Debug, Clone)]
pub struct YouTubeEndpoints {
    pub authorize: String,
    pub token: String,
    pub api: String,
    pub upload: String,
    pub analytics: String,
}

impl Default for YouTubeEndpoints {
    fn default() -> Self {
        Self {
            authorize: "https://accounts.google.com/o/oauth2/v2/auth".to_string(),
            token: "https://oauth2.googleapis.com/token".to_string(),
            api: "https://www.googleapis.com/youtube/v3".to_string(),
            upload: "https://www.googleapis.com/upload/youtube/v3".to_string(),
            analytics: "https://youtubeanalytics.googleapis.com/v2".to_string(),
        }
    }
}

pub struct YouTubePlatform {
    client: reqwest::Client,
    endpoints: YouTubeEndpoints,
}

impl YouTubePlatform {
    pub fn new(client: reqwest::Client) -> Self {
        Self::with_endpoints(client, YouTubeEndpoints::default())
    }

    pub fn with_endpoints(client: reqwest::Client, endpoints: YouTubeEndpoints) -> Self {
        Self { client, endpoints }
    }

    fn credentials<'a>(&self, credentials: &'a PlatformCredentials) -> Result<&'a YouTubeCredentials> {
        match credentials {
            PlatformCredentials::YouTube(c) => Ok(c),
            other => Err(wrong_credentials(PlatformKind::YouTube, other).into()),
        }
    }

    async fn api_get(&self, path: &str, params: &[(&str, &str)], token: &str, context: &str) -> Result<Value> {
        let request = self
            .client
            .get(format!("{}/{}", self.endpoints.api, path))
            .query(params)
            .bearer_auth(token);
        http::send_json(request, PROVIDER, context).await
    }

    async fn token_request(&self, form: &[(&str, &str)], context: &str) -> Result<Value> {
        let request = self.client.post(&self.endpoints.token).form(form);
        http::send_json(request, PROVIDER, context).await
    }

    /// Watch time, subscribers gained and shares for one video
    async fn analytics_report(&self, token: &str, post: &StoredPost, metrics: &mut RawMetrics) -> Result<()> {
        let start = chrono::DateTime::from_timestamp(post.published_at, 0)
            .unwrap_or_default()
            .format("%Y-%m-%d")
            .to_string();
        let end = chrono::Utc::now().format("%Y-%m-%d").to_string();
        let filter = format!("video=={}", post.platform_post_id);

        let request = self
            .client
            .get(format!("{}/reports", self.endpoints.analytics))
            .query(&[
                ("ids", "channel==MINE"),
                ("startDate", start.as_str()),
                ("endDate", end.as_str()),
                ("metrics", "estimatedMinutesWatched,subscribersGained,shares"),
                ("filters", filter.as_str()),
            ])
            .bearer_auth(token);
        let report: Value = http::send_json(request, PROVIDER, "analytics report").await?;
        collect_report(&report, metrics);
        Ok(())
    }
}

/// Map a reports response's first row onto its column names
fn collect_report(report: &Value, metrics: &mut RawMetrics) {
    let Some(headers) = report.get("columnHeaders").and_then(Value::as_array) else {
        return;
    };
    let Some(row) = report.pointer("/rows/0").and_then(Value::as_array) else {
        return;
    };
    for (header, value) in headers.iter().zip(row) {
        let (Some(name), Some(value)) = (header.get("name").and_then(Value::as_str), value.as_f64()) else {
            continue;
        };
        metrics.insert(name.to_string(), value.round() as i64);
    }
}

/// First line of the content as the video title
fn video_title(content: &str, post_type: PostType) -> String {
    let first_line = content.lines().map(str::trim).find(|l| !l.is_empty()).unwrap_or("Untitled");
    let mut title: String = first_line.chars().take(TITLE_LIMIT).collect();
    if post_type == PostType::Reel && !title.to_lowercase().contains("#shorts") {
        let room = TITLE_LIMIT.saturating_sub(" #Shorts".len());
        title = title.chars().take(room).collect::<String>() + " #Shorts";
    }
    title
}

fn comment_from_thread(value: &Value) -> Option<Comment> {
    let top = value.pointer("/snippet/topLevelComment")?;
    let snippet = top.get("snippet")?;
    Some(Comment {
        id: top.get("id")?.as_str()?.to_string(),
        author: snippet
            .get("authorDisplayName")
            .and_then(Value::as_str)
            .map(str::to_string),
        message: snippet
            .get("textOriginal")
            .or_else(|| snippet.get("textDisplay"))
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string(),
        created_at: snippet
            .get("publishedAt")
            .and_then(Value::as_str)
            .map(str::to_string),
        like_count: metric_value(snippet, "/likeCount"),
    })
}

#[async_trait]
impl SocialPlatform for YouTubePlatform {
    fn kind(&self) -> PlatformKind {
        PlatformKind::YouTube
    }

    fn authorization_url(&self, app: &ResolvedAppConfig, state: &str) -> Result<String> {
        let url = Url::parse_with_params(
            &self.endpoints.authorize,
            &[
                ("client_id", app.client_id.as_str()),
                ("redirect_uri", app.redirect_url.as_str()),
                ("response_type", "code"),
                ("scope", SCOPES),
                ("access_type", "offline"),
                ("prompt", "consent"),
                ("include_granted_scopes", "true"),
                ("state", state),
            ],
        )
        .map_err(|e| OmnicastError::InvalidInput(format!("YouTube authorize URL: {}", e)))?;
        Ok(url.to_string())
    }

    async fn exchange_code(&self, app: &ResolvedAppConfig, code: &str) -> Result<PlatformCredentials> {
        let now = chrono::Utc::now().timestamp();
        let token = self
            .token_request(
                &[
                    ("grant_type", "authorization_code"),
                    ("code", code),
                    ("redirect_uri", app.redirect_url.as_str()),
                    ("client_id", app.client_id.as_str()),
                    ("client_secret", app.client_secret.expose_secret()),
                ],
                "code exchange",
            )
            .await?;
        let access_token = required_str(&token, "/access_token", PROVIDER, "code exchange")?;

        let channels = self
            .api_get(
                "channels",
                &[("part", "snippet"), ("mine", "true")],
                &access_token,
                "channel lookup",
            )
            .await?;
        let channel_id = required_str(&channels, "/items/0/id", PROVIDER, "channel lookup").map_err(|_| {
            PlatformError::Authentication("The Google account has no YouTube channel".to_string())
        })?;

        tracing::info!("Connected YouTube channel {}", channel_id);
        Ok(PlatformCredentials::YouTube(YouTubeCredentials {
            expires_at: expires_at_from(&token, now),
            refresh_token: token
                .get("refresh_token")
                .and_then(Value::as_str)
                .map(str::to_string),
            channel_title: channels
                .pointer("/items/0/snippet/title")
                .and_then(Value::as_str)
                .map(str::to_string),
            channel_id,
            access_token,
        }))
    }

    async fn refresh(
        &self,
        app: &ResolvedAppConfig,
        credentials: &PlatformCredentials,
    ) -> Result<Option<PlatformCredentials>> {
        let yt = self.credentials(credentials)?;
        let Some(refresh_token) = yt.refresh_token.as_deref() else {
            return Ok(None);
        };

        let now = chrono::Utc::now().timestamp();
        let token = self
            .token_request(
                &[
                    ("grant_type", "refresh_token"),
                    ("refresh_token", refresh_token),
                    ("client_id", app.client_id.as_str()),
                    ("client_secret", app.client_secret.expose_secret()),
                ],
                "token refresh",
            )
            .await?;

        Ok(Some(PlatformCredentials::YouTube(YouTubeCredentials {
            access_token: required_str(&token, "/access_token", PROVIDER, "token refresh")?,
            expires_at: expires_at_from(&token, now),
            ..yt.clone()
        })))
    }

    async fn publish(
        &self,
        credentials: &PlatformCredentials,
        request: &PublishRequest,
    ) -> Result<PublishedPost> {
        let yt = self.credentials(credentials)?;
        let media = request
            .media
            .as_ref()
            .filter(|m| m.kind == crate::types::MediaKind::Video)
            .ok_or_else(|| PlatformError::Validation("YouTube uploads need a video".to_string()))?;

        let metadata = json!({
            "snippet": {
                "title": video_title(&request.content, request.post_type),
                "description": request.content,
                "tags": request.hashtags,
            },
            "status": {
                "privacyStatus": "public",
                "selfDeclaredMadeForKids": false
            }
        });

        let session = http::send(
            self.client
                .post(format!("{}/videos", self.endpoints.upload))
                .query(&[("uploadType", "resumable"), ("part", "snippet,status")])
                .bearer_auth(&yt.access_token)
                .header("X-Upload-Content-Type", media.content_type.as_str())
                .header("X-Upload-Content-Length", media.bytes.len().to_string())
                .json(&metadata),
            PROVIDER,
            "upload session",
        )
        .await?;
        let upload_url = session
            .headers()
            .get(LOCATION)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
            .ok_or_else(|| {
                PlatformError::Posting("YouTube did not return an upload location".to_string())
            })?;

        let uploaded: Value = http::send_json(
            self.client
                .put(&upload_url)
                .bearer_auth(&yt.access_token)
                .header(CONTENT_TYPE, media.content_type.as_str())
                .header(CONTENT_LENGTH, media.bytes.len())
                .body(media.bytes.clone()),
            PROVIDER,
            "video upload",
        )
        .await?;
        let video_id = required_str(&uploaded, "/id", PROVIDER, "video upload")?;

        tracing::info!("Uploaded YouTube video {} to {}", video_id, yt.channel_id);
        Ok(PublishedPost {
            permalink: Some(format!("https://www.youtube.com/watch?v={}", video_id)),
            platform_post_id: video_id,
            account_id: yt.channel_id.clone(),
        })
    }

    async fn fetch_metrics(
        &self,
        credentials: &PlatformCredentials,
        post: &StoredPost,
    ) -> Result<RawMetrics> {
        let yt = self.credentials(credentials)?;
        let videos = self
            .api_get(
                "videos",
                &[("part", "statistics"), ("id", post.platform_post_id.as_str())],
                &yt.access_token,
                "video statistics",
            )
            .await?;
        let statistics = videos.pointer("/items/0/statistics").ok_or_else(|| {
            PlatformError::Posting(format!(
                "YouTube video {} was not found",
                post.platform_post_id
            ))
        })?;

        let mut metrics = RawMetrics::new();
        for field in ["viewCount", "likeCount", "commentCount"] {
            if let Some(value) = metric_value(statistics, &format!("/{}", field)) {
                metrics.insert(field.to_string(), value);
            }
        }

        if let Err(e) = self.analytics_report(&yt.access_token, post, &mut metrics).await {
            tracing::warn!(
                "YouTube analytics report unavailable for {}: {}",
                post.platform_post_id,
                e
            );
        }

        Ok(metrics)
    }

    async fn fetch_comments(
        &self,
        credentials: &PlatformCredentials,
        platform_post_id: &str,
    ) -> Result<Vec<Comment>> {
        let yt = self.credentials(credentials)?;
        let threads = self
            .api_get(
                "commentThreads",
                &[
                    ("part", "snippet"),
                    ("videoId", platform_post_id),
                    ("maxResults", "50"),
                    ("order", "time"),
                ],
                &yt.access_token,
                "comment listing",
            )
            .await?;

        Ok(threads
            .get("items")
            .and_then(Value::as_array)
            .map(|items| items.iter().filter_map(comment_from_thread).collect())
            .unwrap_or_default())
    }

    async fn post_comment(
        &self,
        credentials: &PlatformCredentials,
        platform_post_id: &str,
        message: &str,
    ) -> Result<Comment> {
        let yt = self.credentials(credentials)?;
        let body = json!({
            "snippet": {
                "videoId": platform_post_id,
                "topLevelComment": {"snippet": {"textOriginal": message}}
            }
        });
        let created: Value = http::send_json(
            self.client
                .post(format!("{}/commentThreads", self.endpoints.api))
                .query(&[("part", "snippet")])
                .bearer_auth(&yt.access_token)
                .json(&body),
            PROVIDER,
            "comment",
        )
        .await?;

        comment_from_thread(&created).ok_or_else(|| {
            PlatformError::Posting("YouTube comment response is missing an id".to_string()).into()
        })
    }

    fn character_limit(&self) -> Option<usize> {
        Some(CHARACTER_LIMIT)
    }

    fn supported_post_types(&self) -> &'static [PostType] {
        &[PostType::Video, PostType::Reel]
    }
}
