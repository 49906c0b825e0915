//! Omnicast - multi-tenant social media publishing
//!
//! This library provides the core of Omnicast: connecting tenants' Facebook,
//! Instagram, LinkedIn and YouTube accounts over OAuth, publishing to one or
//! many of them, and tracking per-post analytics and comments.

pub mod analytics;
pub mod app_config;
pub mod config;
pub mod credentials;
pub mod db;
pub mod error;
pub mod logging;
pub mod media;
pub mod oauth_state;
pub mod platforms;
pub mod service;
pub mod types;

// Re-export commonly used types
pub use analytics::PostAnalytics;
pub use app_config::{AppConfigRecord, AppConfigRepository, AppConfigResolver, EnvDefaults};
pub use config::Config;
pub use credentials::{Credential, CredentialStore, PlatformCredentials};
pub use db::{Database, PostFilter};
pub use error::{OmnicastError, Result};
pub use service::OmnicastService;
pub use types::{PlatformKind, PostType, StoredPost, TenantContext};
