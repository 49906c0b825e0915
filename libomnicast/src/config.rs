//! Configuration management for Omnicast

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{ConfigError, Result};
use crate::logging::LogFormat;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub security: SecurityConfig,
    #[serde(default)]
    pub media: MediaConfig,
    #[serde(default)]
    pub publishing: PublishingConfig,
    #[serde(default)]
    pub logging: LoggingSection,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Socket address the HTTP server binds to
    pub bind: String,
    /// Externally reachable base URL of this server
    pub public_url: String,
    /// Base URL of the tenant-facing frontend
    pub frontend_url: String,
    /// Frontend page OAuth callbacks redirect back to
    pub integrations_path: String,
    /// Upper bound for multipart publish requests
    pub max_upload_mb: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1:8080".to_string(),
            public_url: "http://localhost:8080".to_string(),
            frontend_url: "http://localhost:3000".to_string(),
            integrations_path: "/integrations".to_string(),
            max_upload_mb: 512,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub path: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: "~/.local/share/omnicast/omnicast.db".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SecurityConfig {
    /// HMAC key for OAuth state payloads
    pub state_secret: Option<String>,
    /// HS256 key for session JWTs (bearer header and legacy cookie)
    pub session_secret: Option<String>,
    /// Maximum age of an OAuth state payload
    pub state_ttl_secs: i64,
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            state_secret: None,
            session_secret: None,
            state_ttl_secs: 600,
        }
    }
}

impl SecurityConfig {
    /// State signing key, preferring `OMNICAST_STATE_SECRET`.
    pub fn state_secret(&self) -> Result<String> {
        secret_from_env_or("OMNICAST_STATE_SECRET", self.state_secret.as_deref())
            .ok_or_else(|| ConfigError::MissingField("security.state_secret".to_string()).into())
    }

    /// Session verification key, preferring `OMNICAST_SESSION_SECRET`.
    pub fn session_secret(&self) -> Option<String> {
        secret_from_env_or("OMNICAST_SESSION_SECRET", self.session_secret.as_deref())
    }
}

fn secret_from_env_or(var: &str, configured: Option<&str>) -> Option<String> {
    std::env::var(var)
        .ok()
        .filter(|s| !s.is_empty())
        .or_else(|| configured.filter(|s| !s.is_empty()).map(str::to_string))
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MediaConfig {
    /// Directory uploaded media is written to
    pub dir: String,
    /// Public URL prefix providers fetch uploaded media from
    pub public_base_url: String,
}

impl Default for MediaConfig {
    fn default() -> Self {
        Self {
            dir: "~/.local/share/omnicast/media".to_string(),
            public_base_url: "http://localhost:8080/media".to_string(),
        }
    }
}

impl MediaConfig {
    pub fn expand_dir(&self) -> PathBuf {
        PathBuf::from(shellexpand::tilde(&self.dir).to_string())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PublishingConfig {
    /// Seconds between media container status checks
    pub poll_interval_secs: u64,
    /// Status checks before a media container is declared stuck
    pub max_poll_attempts: u32,
    /// Platforms published to at once by a multi-platform request
    pub max_concurrency: usize,
    /// Timeout applied to every provider HTTP request
    pub request_timeout_secs: u64,
    /// Stored tokens expiring within this window are refreshed before use
    pub refresh_margin_secs: i64,
}

impl Default for PublishingConfig {
    fn default() -> Self {
        Self {
            poll_interval_secs: 10,
            max_poll_attempts: 30,
            max_concurrency: 4,
            request_timeout_secs: 120,
            refresh_margin_secs: 300,
        }
    }
}

impl PublishingConfig {
    pub fn poll_interval(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.poll_interval_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSection {
    pub format: LogFormat,
    pub level: String,
}

impl Default for LoggingSection {
    fn default() -> Self {
        Self {
            format: LogFormat::Text,
            level: "info".to_string(),
        }
    }
}

impl Config {
    /// Load configuration from the default location.
    ///
    /// A missing file at the default location yields the built-in defaults;
    /// an explicit `OMNICAST_CONFIG` path must exist.
    pub fn load() -> Result<Self> {
        let explicit = std::env::var("OMNICAST_CONFIG").is_ok();
        let config_path = resolve_config_path()?;
        if !explicit && !config_path.exists() {
            tracing::debug!(
                "No config file at {}, using defaults",
                config_path.display()
            );
            return Ok(Self::default());
        }
        Self::load_from_path(&config_path)
    }

    /// Load configuration from a specific path
    pub fn load_from_path(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(ConfigError::ReadError)?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        let config: Config = toml::from_str(content).map_err(ConfigError::ParseError)?;
        Ok(config)
    }

    /// Redirect target for OAuth callbacks, with one query parameter.
    pub fn integrations_redirect(&self, key: &str, value: &str) -> String {
        format!(
            "{}{}?{}={}",
            self.server.frontend_url.trim_end_matches('/'),
            self.server.integrations_path,
            key,
            urlencoding::encode(value)
        )
    }
}

/// Resolve the configuration file path following XDG Base Directory spec
pub fn resolve_config_path() -> Result<PathBuf> {
    if let Ok(path) = std::env::var("OMNICAST_CONFIG") {
        return Ok(PathBuf::from(shellexpand::tilde(&path).to_string()));
    }

    let config_dir = dirs::config_dir()
        .ok_or_else(|| ConfigError::MissingField("config directory".to_string()))?;

    Ok(config_dir.join("omnicast").join("config.toml"))
}
