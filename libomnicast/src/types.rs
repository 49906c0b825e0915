//! Core types for Omnicast

use serde::{Deserialize, Serialize};
use std::str::FromStr;
use uuid::Uuid;

use crate::analytics::PostAnalytics;
use crate::error::{OmnicastError, Result};

/// Social platforms a tenant can connect
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlatformKind {
    Facebook,
    Instagram,
    #[serde(rename = "linkedin")]
    LinkedIn,
    #[serde(rename = "youtube")]
    YouTube,
}

impl PlatformKind {
    pub const ALL: [PlatformKind; 4] = [
        PlatformKind::Facebook,
        PlatformKind::Instagram,
        PlatformKind::LinkedIn,
        PlatformKind::YouTube,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Facebook => "facebook",
            Self::Instagram => "instagram",
            Self::LinkedIn => "linkedin",
            Self::YouTube => "youtube",
        }
    }

    pub fn as_upper(&self) -> &'static str {
        match self {
            Self::Facebook => "FACEBOOK",
            Self::Instagram => "INSTAGRAM",
            Self::LinkedIn => "LINKEDIN",
            Self::YouTube => "YOUTUBE",
        }
    }

    /// Key of the OAuth application used to connect this platform
    pub fn app_key(&self) -> &'static str {
        match self {
            Self::Facebook => "app/facebook",
            Self::Instagram => "app/instagram",
            Self::LinkedIn => "app/linkedin",
            Self::YouTube => "app/youtube",
        }
    }

    pub fn from_app_key(app_key: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|p| p.app_key() == app_key)
    }
}

impl FromStr for PlatformKind {
    type Err = OmnicastError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "facebook" | "fb" => Ok(Self::Facebook),
            "instagram" | "ig" => Ok(Self::Instagram),
            "linkedin" => Ok(Self::LinkedIn),
            "youtube" | "yt" => Ok(Self::YouTube),
            other => Err(OmnicastError::InvalidInput(format!(
                "Unsupported platform: '{}'. Valid options: facebook, instagram, linkedin, youtube",
                other
            ))),
        }
    }
}

impl std::fmt::Display for PlatformKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Shape of the content being published
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PostType {
    Text,
    Image,
    Video,
    Reel,
}

impl PostType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::Image => "image",
            Self::Video => "video",
            Self::Reel => "reel",
        }
    }

    pub fn is_video(&self) -> bool {
        matches!(self, Self::Video | Self::Reel)
    }

    pub fn requires_media(&self) -> bool {
        !matches!(self, Self::Text)
    }

    /// A feed post (`text`, `post`) that carries a file becomes an image or
    /// video post; explicit media types are left alone
    pub fn with_media(self, kind: Option<MediaKind>) -> Self {
        match (self, kind) {
            (Self::Text, Some(MediaKind::Image)) => Self::Image,
            (Self::Text, Some(MediaKind::Video)) => Self::Video,
            (other, _) => other,
        }
    }
}

impl FromStr for PostType {
    type Err = OmnicastError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "text" | "post" | "status" => Ok(Self::Text),
            "image" | "photo" => Ok(Self::Image),
            "video" => Ok(Self::Video),
            "reel" | "reels" | "short" => Ok(Self::Reel),
            other => Err(OmnicastError::InvalidInput(format!(
                "Unsupported post type: '{}'. Valid options: text, image, video, reel",
                other
            ))),
        }
    }
}

impl std::fmt::Display for PostType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The tenant on whose behalf an operation runs
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TenantContext {
    pub tenant_id: String,
    pub user_id: String,
    pub reseller_id: Option<String>,
}

impl TenantContext {
    /// Tenant whose id is the acting user's id
    pub fn for_user(user_id: impl Into<String>, reseller_id: Option<String>) -> Self {
        let user_id = user_id.into();
        Self {
            tenant_id: user_id.clone(),
            user_id,
            reseller_id,
        }
    }
}

/// Broad category of an uploaded file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    Image,
    Video,
}

impl MediaKind {
    pub fn from_content_type(content_type: &str) -> Option<Self> {
        let lower = content_type.to_lowercase();
        if lower.starts_with("image/") {
            Some(Self::Image)
        } else if lower.starts_with("video/") {
            Some(Self::Video)
        } else {
            None
        }
    }
}

/// A media file supplied by the client alongside a publish request
#[derive(Debug, Clone)]
pub struct MediaUpload {
    pub file_name: String,
    pub content_type: String,
    pub bytes: Vec<u8>,
}

impl MediaUpload {
    /// Declared content type, or a guess from the file name when the client
    /// sent none or a generic one
    pub fn effective_content_type(&self) -> String {
        let declared = self.content_type.trim();
        if declared.is_empty() || declared == "application/octet-stream" {
            mime_guess::from_path(&self.file_name)
                .first_or_octet_stream()
                .to_string()
        } else {
            declared.to_lowercase()
        }
    }

    pub fn kind(&self) -> Option<MediaKind> {
        MediaKind::from_content_type(&self.effective_content_type())
    }
}

/// A media file after it has been written to object storage
#[derive(Debug, Clone)]
pub struct PreparedMedia {
    pub public_url: String,
    pub content_type: String,
    pub kind: MediaKind,
    pub bytes: Vec<u8>,
}

/// Everything an adapter needs to publish one post
#[derive(Debug, Clone)]
pub struct PublishRequest {
    pub tenant_id: String,
    pub platform: PlatformKind,
    pub post_type: PostType,
    pub content: String,
    /// Facebook page to publish to; first connected page when absent
    pub page_id: Option<String>,
    pub media: Option<PreparedMedia>,
    pub hashtags: Vec<String>,
}

/// Identifiers returned by a provider after a successful publish
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublishedPost {
    /// Provider-native post id (video id for video platforms)
    pub platform_post_id: String,
    /// Page, profile or channel the post was published under
    pub account_id: String,
    pub permalink: Option<String>,
}

/// Lifecycle of a post's analytics sub-document
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AnalyticsStatus {
    Pending,
    Synced,
    Failed,
}

impl AnalyticsStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Synced => "synced",
            Self::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "synced" => Self::Synced,
            "failed" => Self::Failed,
            _ => Self::Pending,
        }
    }
}

/// A post published through Omnicast, tracked for analytics
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredPost {
    pub id: String,
    pub tenant_id: String,
    pub platform: PlatformKind,
    pub post_type: PostType,
    pub platform_post_id: String,
    pub account_id: String,
    pub content: String,
    pub media_url: Option<String>,
    pub permalink: Option<String>,
    pub hashtags: Vec<String>,
    pub published_at: i64,
    pub analytics: Option<PostAnalytics>,
    pub analytics_status: AnalyticsStatus,
    pub analytics_error: Option<String>,
}

impl StoredPost {
    /// Record for a freshly published post, analytics still pending
    pub fn published(request: &PublishRequest, published: &PublishedPost) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            tenant_id: request.tenant_id.clone(),
            platform: request.platform,
            post_type: request.post_type,
            platform_post_id: published.platform_post_id.clone(),
            account_id: published.account_id.clone(),
            content: request.content.clone(),
            media_url: request.media.as_ref().map(|m| m.public_url.clone()),
            permalink: published.permalink.clone(),
            hashtags: request.hashtags.clone(),
            published_at: chrono::Utc::now().timestamp(),
            analytics: None,
            analytics_status: AnalyticsStatus::Pending,
            analytics_error: None,
        }
    }
}

/// A comment on a published post
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Comment {
    pub id: String,
    pub author: Option<String>,
    pub message: String,
    pub created_at: Option<String>,
    pub like_count: Option<i64>,
}

/// Extract `#hashtags` from post content, lowercased and de-duplicated in
/// order of first appearance.
pub fn extract_hashtags(content: &str) -> Vec<String> {
    let mut tags: Vec<String> = Vec::new();
    for word in content.split_whitespace() {
        let Some(rest) = word.strip_prefix('#') else {
            continue;
        };
        let tag: String = rest
            .chars()
            .take_while(|c| c.is_alphanumeric() || *c == '_')
            .collect::<String>()
            .to_lowercase();
        if !tag.is_empty() && !tags.contains(&tag) {
            tags.push(tag);
        }
    }
    tags
}
