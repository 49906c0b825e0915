//! Platform abstraction and implementations
//!
//! Each social network is reached through a [`SocialPlatform`] adapter that
//! knows how to run that provider's OAuth flow, publish content, and read
//! engagement back. Adapters are looked up by [`PlatformKind`] in a
//! [`PlatformRegistry`] instead of branching on the platform name.
//!
//! # Examples
//!
//! ```no_run
//! use libomnicast::config::PublishingConfig;
//! use libomnicast::platforms::PlatformRegistry;
//! use libomnicast::types::PlatformKind;
//!
//! # fn example() -> libomnicast::Result<()> {
//! let registry = PlatformRegistry::with_defaults(&PublishingConfig::default())?;
//! let instagram = registry.get(PlatformKind::Instagram)?;
//!
//! if let Some(limit) = instagram.character_limit() {
//!     println!("Instagram captions are limited to {} characters", limit);
//! }
//! # Ok(())
//! # }
//! ```

use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::Arc;

use crate::analytics::RawMetrics;
use crate::app_config::ResolvedAppConfig;
use crate::config::PublishingConfig;
use crate::credentials::PlatformCredentials;
use crate::error::{PlatformError, Result};
use crate::types::{Comment, MediaKind, PlatformKind, PostType, PublishRequest, PublishedPost, StoredPost};

pub mod facebook;
pub mod http;
pub mod instagram;
pub mod linkedin;
pub mod polling;
pub mod youtube;

// Mock platform is available for all builds (not just tests) to support integration tests
pub mod mock;

/// Capability interface implemented once per social network
///
/// The OAuth methods receive the resolved application credentials for the
/// tenant's reseller; the content methods receive the tenant's stored
/// [`PlatformCredentials`] for this platform.
#[async_trait]
pub trait SocialPlatform: Send + Sync {
    fn kind(&self) -> PlatformKind;

    /// Provider URL the user's browser is sent to, carrying `state`
    fn authorization_url(&self, app: &ResolvedAppConfig, state: &str) -> Result<String>;

    /// Exchange an authorization code for stored credentials
    ///
    /// Includes any long-lived token exchange and the profile/page lookups
    /// needed to fill in the credential variant.
    ///
    /// # Errors
    ///
    /// Returns `PlatformError::Authentication` if the provider rejects the
    /// code, or `PlatformError::Network` if it cannot be reached.
    async fn exchange_code(&self, app: &ResolvedAppConfig, code: &str) -> Result<PlatformCredentials>;

    /// Renew an expiring token set
    ///
    /// Returns `Ok(None)` when the provider offers no way to refresh these
    /// credentials (for example a LinkedIn grant without a refresh token).
    async fn refresh(
        &self,
        app: &ResolvedAppConfig,
        credentials: &PlatformCredentials,
    ) -> Result<Option<PlatformCredentials>>;

    /// Check a request against this platform's content rules
    ///
    /// # Errors
    ///
    /// Returns `PlatformError::Validation` if the content fails validation
    fn validate(&self, request: &PublishRequest) -> Result<()> {
        validate_common(request, self.supported_post_types(), self.character_limit())
    }

    /// Publish a post; media has already been uploaded to object storage
    async fn publish(
        &self,
        credentials: &PlatformCredentials,
        request: &PublishRequest,
    ) -> Result<PublishedPost>;

    /// Current engagement for a published post, under provider field names
    async fn fetch_metrics(
        &self,
        credentials: &PlatformCredentials,
        post: &StoredPost,
    ) -> Result<RawMetrics>;

    async fn fetch_comments(
        &self,
        credentials: &PlatformCredentials,
        platform_post_id: &str,
    ) -> Result<Vec<Comment>>;

    async fn post_comment(
        &self,
        credentials: &PlatformCredentials,
        platform_post_id: &str,
        message: &str,
    ) -> Result<Comment>;

    /// Maximum caption/body length, if the platform enforces one
    fn character_limit(&self) -> Option<usize>;

    fn supported_post_types(&self) -> &'static [PostType];
}

/// Rules every platform shares: supported post type, media presence and
/// kind, non-empty content for text posts, and the character limit.
pub fn validate_common(
    request: &PublishRequest,
    supported: &[PostType],
    character_limit: Option<usize>,
) -> Result<()> {
    let platform = request.platform;

    if !supported.contains(&request.post_type) {
        return Err(PlatformError::Validation(format!(
            "{} does not support {} posts",
            platform, request.post_type
        ))
        .into());
    }

    match (&request.media, request.post_type) {
        (None, post_type) if post_type.requires_media() => {
            return Err(PlatformError::Validation(format!(
                "A {} post on {} requires an uploaded file",
                post_type, platform
            ))
            .into());
        }
        (Some(_), PostType::Text) => {
            return Err(PlatformError::Validation(format!(
                "A text post on {} cannot carry media",
                platform
            ))
            .into());
        }
        (Some(media), post_type) => {
            let expected = if post_type.is_video() {
                MediaKind::Video
            } else {
                MediaKind::Image
            };
            if media.kind != expected {
                return Err(PlatformError::Validation(format!(
                    "A {} post needs a {:?} file, got {}",
                    post_type, expected, media.content_type
                ))
                .into());
            }
        }
        _ => {}
    }

    if request.content.trim().is_empty() && request.media.is_none() {
        return Err(PlatformError::Validation("Content cannot be empty".to_string()).into());
    }

    if let Some(limit) = character_limit {
        let length = request.content.chars().count();
        if length > limit {
            return Err(PlatformError::Validation(format!(
                "Content is {} characters; {} allows at most {}",
                length, platform, limit
            ))
            .into());
        }
    }

    Ok(())
}

/// Error for credentials of another platform handed to an adapter
pub(crate) fn wrong_credentials(expected: PlatformKind, got: &PlatformCredentials) -> PlatformError {
    PlatformError::Authentication(format!(
        "Expected {} credentials, found {}",
        expected,
        got.platform()
    ))
}

/// Adapters keyed by platform
#[derive(Clone, Default)]
pub struct PlatformRegistry {
    adapters: BTreeMap<PlatformKind, Arc<dyn SocialPlatform>>,
}

impl PlatformRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the real Facebook, Instagram, LinkedIn and YouTube adapters
    pub fn with_defaults(config: &PublishingConfig) -> Result<Self> {
        let client = http::build_client(std::time::Duration::from_secs(
            config.request_timeout_secs,
        ))?;
        let poll = polling::PollPolicy::from(config);

        let mut registry = Self::new();
        registry.register(Arc::new(facebook::FacebookPlatform::new(client.clone())));
        registry.register(Arc::new(instagram::InstagramPlatform::new(client.clone(), poll)));
        registry.register(Arc::new(linkedin::LinkedInPlatform::new(client.clone())));
        registry.register(Arc::new(youtube::YouTubePlatform::new(client)));
        Ok(registry)
    }

    /// Add or replace the adapter for its platform
    pub fn register(&mut self, adapter: Arc<dyn SocialPlatform>) {
        self.adapters.insert(adapter.kind(), adapter);
    }

    pub fn get(&self, kind: PlatformKind) -> Result<Arc<dyn SocialPlatform>> {
        self.adapters.get(&kind).cloned().ok_or_else(|| {
            PlatformError::NotImplemented(format!("No adapter registered for {}", kind)).into()
        })
    }

    pub fn kinds(&self) -> Vec<PlatformKind> {
        self.adapters.keys().copied().collect()
    }
}
