//! Service layer for Omnicast
//!
//! Business logic shared by the HTTP server and the admin CLI.
//!
//! # Architecture
//!
//! `OmnicastService` is a facade that owns the shared resources (database,
//! platform registry, media store, app config resolver) and hands out the
//! specialised sub-services:
//!
//! - `OAuthService`: authorize redirects, callbacks and connections
//! - `PublishingService`: single and multi-platform publishing
//! - `AnalyticsService`: on-demand metric refresh and overview totals
//! - `EngageService`: comments on published posts
//!
//! # Example
//!
//! ```no_run
//! use libomnicast::service::OmnicastService;
//! use libomnicast::service::publishing::PublishTarget;
//! use libomnicast::types::TenantContext;
//!
//! # async fn example() -> libomnicast::Result<()> {
//! let service = OmnicastService::new().await?;
//! let tenant = TenantContext::for_user("user-1", None);
//! let target = PublishTarget::parse("linkedin", "text", None)?;
//!
//! let result = service
//!     .publishing()
//!     .post_to_single_platform(&tenant, &target, "Hello #rust", None)
//!     .await?;
//! println!("Published as {}", result.platform_post_id);
//! # Ok(())
//! # }
//! ```

pub mod analytics;
pub mod engage;
pub mod oauth;
pub mod publishing;
pub mod tokens;

use std::sync::Arc;

use self::analytics::AnalyticsService;
use self::engage::EngageService;
use self::oauth::OAuthService;
use self::publishing::PublishingService;
use self::tokens::TokenKeeper;
use crate::app_config::{AppConfigRepository, AppConfigResolver, EnvDefaults};
use crate::credentials::CredentialStore;
use crate::media::{LocalMediaStore, MediaStore};
use crate::oauth_state::StateSigner;
use crate::platforms::PlatformRegistry;
use crate::{Config, Database, Result};

/// Main service facade that coordinates all sub-services
///
/// All sub-services share the same `Arc<Database>` and
/// `Arc<PlatformRegistry>`.
pub struct OmnicastService {
    config: Arc<Config>,
    db: Arc<Database>,
    resolver: AppConfigResolver,
    registry: Arc<PlatformRegistry>,
    oauth: OAuthService,
    publishing: PublishingService,
    analytics: AnalyticsService,
    engage: EngageService,
}

impl OmnicastService {
    /// Create a service from the configuration at the default location
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration cannot be loaded or the
    /// database cannot be opened and migrated.
    pub async fn new() -> Result<Self> {
        let config = Config::load()?;
        Self::from_config(config).await
    }

    /// Create a service with the real platform adapters and local media
    /// storage described by `config`
    pub async fn from_config(config: Config) -> Result<Self> {
        let db = Database::new(&config.database.path).await?;
        let registry = PlatformRegistry::with_defaults(&config.publishing)?;
        let media = LocalMediaStore::new(
            config.media.expand_dir(),
            config.media.public_base_url.clone(),
        );
        Self::with_parts(config, db, registry, Arc::new(media), EnvDefaults::from_env())
    }

    /// Assemble a service from explicit parts, e.g. an in-memory database
    /// and mock adapters
    pub fn with_parts(
        config: Config,
        db: Database,
        registry: PlatformRegistry,
        media: Arc<dyn MediaStore>,
        defaults: EnvDefaults,
    ) -> Result<Self> {
        let signer = match config.security.state_secret() {
            Ok(secret) => StateSigner::new(secret, config.security.state_ttl_secs)?,
            Err(_) => {
                tracing::warn!(
                    "No OAuth state secret configured; using a per-process key, so \
                     authorization links stop working after a restart"
                );
                StateSigner::new(rand::random::<[u8; 32]>(), config.security.state_ttl_secs)?
            }
        };

        let db = Arc::new(db);
        let registry = Arc::new(registry);
        let config = Arc::new(config);
        let credentials: Arc<dyn CredentialStore> = db.clone();
        let repository: Arc<dyn AppConfigRepository> = db.clone();
        let resolver = AppConfigResolver::new(repository, defaults);

        let tokens = TokenKeeper::new(
            Arc::clone(&credentials),
            resolver.clone(),
            Arc::clone(&registry),
            config.publishing.refresh_margin_secs,
        );
        let oauth = OAuthService::new(
            Arc::new(signer),
            resolver.clone(),
            Arc::clone(&registry),
            credentials,
        );
        let publishing = PublishingService::new(
            Arc::clone(&db),
            Arc::clone(&registry),
            media,
            tokens.clone(),
            config.publishing.max_concurrency,
        );
        let analytics = AnalyticsService::new(Arc::clone(&db), Arc::clone(&registry), tokens.clone());
        let engage = EngageService::new(Arc::clone(&db), Arc::clone(&registry), tokens);

        Ok(Self {
            config,
            db,
            resolver,
            registry,
            oauth,
            publishing,
            analytics,
            engage,
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Access the database directly, e.g. for app config rows and
    /// credential listings
    pub fn database(&self) -> &Database {
        &self.db
    }

    pub fn resolver(&self) -> &AppConfigResolver {
        &self.resolver
    }

    pub fn registry(&self) -> &PlatformRegistry {
        &self.registry
    }

    pub fn oauth(&self) -> &OAuthService {
        &self.oauth
    }

    pub fn publishing(&self) -> &PublishingService {
        &self.publishing
    }

    pub fn analytics(&self) -> &AnalyticsService {
        &self.analytics
    }

    pub fn engage(&self) -> &EngageService {
        &self.engage
    }
}
