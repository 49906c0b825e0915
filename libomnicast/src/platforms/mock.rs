//! Mock platform implementation for testing
//!
//! A configurable [`SocialPlatform`] that can stand in for any provider. It
//! simulates successes, failures and latency, and counts calls so
//! orchestration tests can check what was attempted without credentials or
//! network access.

use async_trait::async_trait;
use reqwest::Url;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::sleep;

use crate::analytics::RawMetrics;
use crate::app_config::ResolvedAppConfig;
use crate::credentials::{
    FacebookCredentials, FacebookPage, InstagramCredentials, LinkedInCredentials,
    PlatformCredentials, YouTubeCredentials,
};
use crate::error::{OmnicastError, PlatformError, Result};
use crate::platforms::{validate_common, wrong_credentials, SocialPlatform};
use crate::types::{Comment, PlatformKind, PostType, PublishRequest, PublishedPost, StoredPost};

/// Configuration for mock platform behavior
#[derive(Debug, Clone)]
pub struct MockConfig {
    /// Platform the mock registers as
    pub kind: PlatformKind,

    /// Whether code exchange should succeed
    pub auth_succeeds: bool,

    /// Error returned by `publish`, if it should fail
    pub publish_error: Option<PlatformError>,

    /// Error returned by `fetch_metrics`, if it should fail
    pub metrics_error: Option<PlatformError>,

    /// Metrics returned by `fetch_metrics`
    pub metrics: RawMetrics,

    /// Whether `refresh` issues a new token
    pub refreshable: bool,

    /// Delay before completing operations (simulates network latency)
    pub delay: Duration,

    pub character_limit: Option<usize>,

    pub supported_post_types: &'static [PostType],

    pub publish_calls: Arc<AtomicUsize>,
    pub refresh_calls: Arc<AtomicUsize>,
    pub metrics_calls: Arc<AtomicUsize>,

    /// Requests that were published (for verification)
    pub published: Arc<Mutex<Vec<PublishRequest>>>,

    /// Comments on every post, in insertion order
    pub comments: Arc<Mutex<Vec<(String, Comment)>>>,
}

const ALL_POST_TYPES: &[PostType] = &[PostType::Text, PostType::Image, PostType::Video, PostType::Reel];

impl Default for MockConfig {
    fn default() -> Self {
        Self {
            kind: PlatformKind::Facebook,
            auth_succeeds: true,
            publish_error: None,
            metrics_error: None,
            metrics: RawMetrics::new(),
            refreshable: true,
            delay: Duration::from_millis(0),
            character_limit: None,
            supported_post_types: ALL_POST_TYPES,
            publish_calls: Arc::new(AtomicUsize::new(0)),
            refresh_calls: Arc::new(AtomicUsize::new(0)),
            metrics_calls: Arc::new(AtomicUsize::new(0)),
            published: Arc::new(Mutex::new(Vec::new())),
            comments: Arc::new(Mutex::new(Vec::new())),
        }
    }
}

/// Stored credentials of the right variant for `kind`
pub fn mock_credentials(kind: PlatformKind, access_token: &str, expires_at: Option<i64>) -> PlatformCredentials {
    let account = format!("mock-{}-account", kind);
    match kind {
        PlatformKind::Facebook => PlatformCredentials::Facebook(FacebookCredentials {
            user_access_token: access_token.to_string(),
            expires_at,
            user_id: account,
            user_name: Some("Mock User".to_string()),
            pages: vec![FacebookPage {
                id: "mock-page".to_string(),
                name: "Mock Page".to_string(),
                access_token: format!("{}-page", access_token),
                category: None,
            }],
        }),
        PlatformKind::Instagram => PlatformCredentials::Instagram(InstagramCredentials {
            access_token: access_token.to_string(),
            expires_at,
            user_id: account,
            username: Some("mock".to_string()),
        }),
        PlatformKind::LinkedIn => PlatformCredentials::LinkedIn(LinkedInCredentials {
            access_token: access_token.to_string(),
            expires_at,
            refresh_token: Some("mock-refresh".to_string()),
            refresh_expires_at: None,
            member_id: account,
            name: Some("Mock Member".to_string()),
            email: None,
        }),
        PlatformKind::YouTube => PlatformCredentials::YouTube(YouTubeCredentials {
            access_token: access_token.to_string(),
            expires_at,
            refresh_token: Some("mock-refresh".to_string()),
            channel_id: account,
            channel_title: Some("Mock Channel".to_string()),
        }),
    }
}

/// Mock platform for testing
pub struct MockPlatform {
    config: MockConfig,
}

impl MockPlatform {
    pub fn new(config: MockConfig) -> Self {
        Self { config }
    }

    /// A mock that always succeeds
    pub fn success(kind: PlatformKind) -> Self {
        Self::new(MockConfig {
            kind,
            ..Default::default()
        })
    }

    /// A mock whose publishes fail with `error`
    pub fn publish_failure(kind: PlatformKind, error: PlatformError) -> Self {
        Self::new(MockConfig {
            kind,
            publish_error: Some(error),
            ..Default::default()
        })
    }

    /// A mock that rejects authorization codes
    pub fn auth_failure(kind: PlatformKind) -> Self {
        Self::new(MockConfig {
            kind,
            auth_succeeds: false,
            ..Default::default()
        })
    }

    pub fn with_delay(kind: PlatformKind, delay: Duration) -> Self {
        Self::new(MockConfig {
            kind,
            delay,
            ..Default::default()
        })
    }

    pub fn with_metrics(kind: PlatformKind, metrics: RawMetrics) -> Self {
        Self::new(MockConfig {
            kind,
            metrics,
            ..Default::default()
        })
    }

    /// Shared handle to the configuration, for reading counters after the
    /// platform has been moved into a registry
    pub fn config(&self) -> MockConfig {
        self.config.clone()
    }

    pub fn publish_call_count(&self) -> usize {
        self.config.publish_calls.load(Ordering::SeqCst)
    }

    pub fn refresh_call_count(&self) -> usize {
        self.config.refresh_calls.load(Ordering::SeqCst)
    }

    pub async fn published(&self) -> Vec<PublishRequest> {
        self.config.published.lock().await.clone()
    }

    async fn simulate_latency(&self) {
        if !self.config.delay.is_zero() {
            sleep(self.config.delay).await;
        }
    }

    fn check_credentials(&self, credentials: &PlatformCredentials) -> Result<()> {
        if credentials.platform() != self.config.kind {
            return Err(wrong_credentials(self.config.kind, credentials).into());
        }
        Ok(())
    }
}

#[async_trait]
impl SocialPlatform for MockPlatform {
    fn kind(&self) -> PlatformKind {
        self.config.kind
    }

    fn authorization_url(&self, app: &ResolvedAppConfig, state: &str) -> Result<String> {
        let url = Url::parse_with_params(
            &format!("https://mock.invalid/{}/authorize", self.config.kind),
            &[
                ("client_id", app.client_id.as_str()),
                ("redirect_uri", app.redirect_url.as_str()),
                ("state", state),
            ],
        )
        .map_err(|e| OmnicastError::InvalidInput(e.to_string()))?;
        Ok(url.to_string())
    }

    async fn exchange_code(&self, _app: &ResolvedAppConfig, code: &str) -> Result<PlatformCredentials> {
        self.simulate_latency().await;
        if !self.config.auth_succeeds {
            return Err(PlatformError::Authentication("Mock code exchange rejected".to_string()).into());
        }
        let expires_at = chrono::Utc::now().timestamp() + 3600;
        Ok(mock_credentials(
            self.config.kind,
            &format!("token-{}", code),
            Some(expires_at),
        ))
    }

    async fn refresh(
        &self,
        _app: &ResolvedAppConfig,
        credentials: &PlatformCredentials,
    ) -> Result<Option<PlatformCredentials>> {
        self.check_credentials(credentials)?;
        self.config.refresh_calls.fetch_add(1, Ordering::SeqCst);
        if !self.config.refreshable {
            return Ok(None);
        }
        let expires_at = chrono::Utc::now().timestamp() + 3600;
        Ok(Some(mock_credentials(
            self.config.kind,
            &format!("{}-refreshed", credentials.access_token()),
            Some(expires_at),
        )))
    }

    fn validate(&self, request: &PublishRequest) -> Result<()> {
        validate_common(request, self.config.supported_post_types, self.config.character_limit)
    }

    async fn publish(
        &self,
        credentials: &PlatformCredentials,
        request: &PublishRequest,
    ) -> Result<PublishedPost> {
        self.config.publish_calls.fetch_add(1, Ordering::SeqCst);
        self.check_credentials(credentials)?;
        self.simulate_latency().await;

        if let Some(error) = &self.config.publish_error {
            return Err(error.clone().into());
        }

        self.config.published.lock().await.push(request.clone());
        let post_id = format!("{}-mock-{}", self.config.kind, uuid::Uuid::new_v4());
        Ok(PublishedPost {
            permalink: Some(format!("https://mock.invalid/{}", post_id)),
            platform_post_id: post_id,
            account_id: credentials.account_id().to_string(),
        })
    }

    async fn fetch_metrics(
        &self,
        credentials: &PlatformCredentials,
        _post: &StoredPost,
    ) -> Result<RawMetrics> {
        self.config.metrics_calls.fetch_add(1, Ordering::SeqCst);
        self.check_credentials(credentials)?;
        self.simulate_latency().await;
        match &self.config.metrics_error {
            Some(error) => Err(error.clone().into()),
            None => Ok(self.config.metrics.clone()),
        }
    }

    async fn fetch_comments(
        &self,
        credentials: &PlatformCredentials,
        platform_post_id: &str,
    ) -> Result<Vec<Comment>> {
        self.check_credentials(credentials)?;
        Ok(self
            .config
            .comments
            .lock()
            .await
            .iter()
            .filter(|(post, _)| post == platform_post_id)
            .map(|(_, comment)| comment.clone())
            .collect())
    }

    async fn post_comment(
        &self,
        credentials: &PlatformCredentials,
        platform_post_id: &str,
        message: &str,
    ) -> Result<Comment> {
        self.check_credentials(credentials)?;
        let comment = Comment {
            id: uuid::Uuid::new_v4().to_string(),
            author: Some(credentials.account_label()),
            message: message.to_string(),
            created_at: Some(chrono::Utc::now().to_rfc3339()),
            like_count: Some(0),
        };
        self.config
            .comments
            .lock()
            .await
            .push((platform_post_id.to_string(), comment.clone()));
        Ok(comment)
    }

    fn character_limit(&self) -> Option<usize> {
        self.config.character_limit
    }

    fn supported_post_types(&self) -> &'static [PostType] {
        self.config.supported_post_types
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn text_request(kind: PlatformKind, content: &str) -> PublishRequest {
        PublishRequest {
            tenant_id: "t1".to_string(),
            platform: kind,
            post_type: PostType::Text,
            content: content.to_string(),
            page_id: None,
            media: None,
            hashtags: vec![],
        }
    }

    #[tokio::test]
    async fn test_mock_success() {
        let platform = MockPlatform::success(PlatformKind::LinkedIn);
        let creds = mock_credentials(PlatformKind::LinkedIn, "tok", None);

        let published = platform
            .publish(&creds, &text_request(PlatformKind::LinkedIn, "Hello"))
            .await
            .unwrap();
        assert!(published.platform_post_id.starts_with("linkedin-mock-"));
        assert_eq!(published.account_id, "mock-linkedin-account");
        assert_eq!(platform.publish_call_count(), 1);

        let posted = platform.published().await;
        assert_eq!(posted.len(), 1);
        assert_eq!(posted[0].content, "Hello");
    }

    #[tokio::test]
    async fn test_mock_publish_failure() {
        let platform = MockPlatform::publish_failure(
            PlatformKind::Facebook,
            PlatformError::Network("connection reset".to_string()),
        );
        let creds = mock_credentials(PlatformKind::Facebook, "tok", None);

        let err = platform
            .publish(&creds, &text_request(PlatformKind::Facebook, "Hello"))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("connection reset"));
        assert_eq!(platform.publish_call_count(), 1);
        assert!(platform.published().await.is_empty());
    }

    #[tokio::test]
    async fn test_mock_rejects_other_platform_credentials() {
        let platform = MockPlatform::success(PlatformKind::YouTube);
        let creds = mock_credentials(PlatformKind::Instagram, "tok", None);
        let err = platform
            .publish(&creds, &text_request(PlatformKind::YouTube, "x"))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("Expected youtube credentials"));
    }

    #[tokio::test]
    async fn test_mock_with_delay() {
        let platform = MockPlatform::with_delay(PlatformKind::Instagram, Duration::from_millis(50));
        let creds = mock_credentials(PlatformKind::Instagram, "tok", None);

        let start = std::time::Instant::now();
        platform.fetch_metrics(&creds, &dummy_post()).await.unwrap();
        assert!(start.elapsed() >= Duration::from_millis(50));
    }

    #[tokio::test]
    async fn test_mock_refresh_and_exchange() {
        let platform = MockPlatform::success(PlatformKind::YouTube);
        let app = ResolvedAppConfig {
            client_id: "id".to_string(),
            client_secret: secrecy::SecretString::from("secret".to_string()),
            redirect_url: "https://cb".to_string(),
            source: crate::app_config::ConfigSource::Environment,
        };

        let creds = platform.exchange_code(&app, "abc").await.unwrap();
        assert_eq!(creds.access_token(), "token-abc");

        let refreshed = platform.refresh(&app, &creds).await.unwrap().unwrap();
        assert_eq!(refreshed.access_token(), "token-abc-refreshed");
        assert_eq!(platform.refresh_call_count(), 1);

        let failing = MockPlatform::auth_failure(PlatformKind::YouTube);
        assert!(failing.exchange_code(&app, "abc").await.is_err());
    }

    #[tokio::test]
    async fn test_mock_comments_are_scoped_to_post() {
        let platform = MockPlatform::success(PlatformKind::Facebook);
        let creds = mock_credentials(PlatformKind::Facebook, "tok", None);

        platform.post_comment(&creds, "p1", "first").await.unwrap();
        platform.post_comment(&creds, "p2", "other").await.unwrap();

        let comments = platform.fetch_comments(&creds, "p1").await.unwrap();
        assert_eq!(comments.len(), 1);
        assert_eq!(comments[0].message, "first");
    }

    #[test]
    fn test_mock_character_limit() {
        let platform = MockPlatform::new(MockConfig {
            kind: PlatformKind::LinkedIn,
            character_limit: Some(10),
            ..Default::default()
        });
        assert!(platform.validate(&text_request(PlatformKind::LinkedIn, "Short")).is_ok());
        assert!(platform
            .validate(&text_request(PlatformKind::LinkedIn, "This is way too long"))
            .is_err());
    }

    fn dummy_post() -> StoredPost {
        let request = text_request(PlatformKind::Instagram, "x");
        StoredPost::published(
            &request,
            &PublishedPost {
                platform_post_id: "p".to_string(),
                account_id: "a".to_string(),
                permalink: None,
            },
        )
    }
}
