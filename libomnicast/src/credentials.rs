//! Connected platform accounts
//!
//! Each tenant has at most one credential per platform. The token set stored
//! for a platform is a [`PlatformCredentials`] variant carrying that
//! provider's own token and profile fields, serialized as JSON with a
//! `platform` tag.
//!
//! # Architecture
//!
//! - `CredentialStore` trait: common interface for credential persistence
//! - `Database`: SQLite backend; upserts on `(tenant_id, platform)` so
//!   repeated OAuth callbacks never create a second row
//!
//! # Example
//!
//! ```no_run
//! use libomnicast::credentials::{Credential, CredentialStore, InstagramCredentials, PlatformCredentials};
//! use libomnicast::db::Database;
//!
//! # async fn example() -> libomnicast::Result<()> {
//! let db = Database::in_memory().await?;
//! let blob = PlatformCredentials::Instagram(InstagramCredentials {
//!     access_token: "IGQV...".to_string(),
//!     expires_at: None,
//!     user_id: "17841400000000000".to_string(),
//!     username: Some("acme".to_string()),
//! });
//! db.upsert(&Credential::new("tenant-1", "user-1", blob)).await?;
//! # Ok(())
//! # }
//! ```

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sqlx::sqlite::SqliteRow;
use sqlx::Row;

use crate::db::Database;
use crate::error::{DbError, OmnicastError, Result};
use crate::types::PlatformKind;

/// A Facebook page the connected user manages
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FacebookPage {
    pub id: String,
    pub name: String,
    /// Page access token used to publish as the page
    pub access_token: String,
    #[serde(default)]
    pub category: Option<String>,
}

impl std::fmt::Debug for FacebookPage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FacebookPage")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("access_token", &"[REDACTED]")
            .finish()
    }
}

#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FacebookCredentials {
    /// Long-lived user token
    pub user_access_token: String,
    pub expires_at: Option<i64>,
    pub user_id: String,
    #[serde(default)]
    pub user_name: Option<String>,
    #[serde(default)]
    pub pages: Vec<FacebookPage>,
}

impl FacebookCredentials {
    /// The requested page, or the first connected page when none is named
    pub fn page(&self, page_id: Option<&str>) -> Option<&FacebookPage> {
        match page_id {
            Some(id) => self.pages.iter().find(|p| p.id == id),
            None => self.pages.first(),
        }
    }
}

#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InstagramCredentials {
    /// Long-lived Instagram user token
    pub access_token: String,
    pub expires_at: Option<i64>,
    pub user_id: String,
    #[serde(default)]
    pub username: Option<String>,
}

#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LinkedInCredentials {
    pub access_token: String,
    pub expires_at: Option<i64>,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub refresh_expires_at: Option<i64>,
    /// OpenID subject, used as `urn:li:person:{member_id}`
    pub member_id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
}

impl LinkedInCredentials {
    pub fn author_urn(&self) -> String {
        format!("urn:li:person:{}", self.member_id)
    }
}

#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct YouTubeCredentials {
    pub access_token: String,
    pub expires_at: Option<i64>,
    #[serde(default)]
    pub refresh_token: Option<String>,
    pub channel_id: String,
    #[serde(default)]
    pub channel_title: Option<String>,
}

/// Token set stored for one connected platform account
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "platform", rename_all = "lowercase")]
pub enum PlatformCredentials {
    Facebook(FacebookCredentials),
    Instagram(InstagramCredentials),
    #[serde(rename = "linkedin")]
    LinkedIn(LinkedInCredentials),
    #[serde(rename = "youtube")]
    YouTube(YouTubeCredentials),
}

impl PlatformCredentials {
    pub fn platform(&self) -> PlatformKind {
        match self {
            Self::Facebook(_) => PlatformKind::Facebook,
            Self::Instagram(_) => PlatformKind::Instagram,
            Self::LinkedIn(_) => PlatformKind::LinkedIn,
            Self::YouTube(_) => PlatformKind::YouTube,
        }
    }

    /// User-level access token
    pub fn access_token(&self) -> &str {
        match self {
            Self::Facebook(c) => &c.user_access_token,
            Self::Instagram(c) => &c.access_token,
            Self::LinkedIn(c) => &c.access_token,
            Self::YouTube(c) => &c.access_token,
        }
    }

    pub fn refresh_token(&self) -> Option<&str> {
        match self {
            Self::LinkedIn(c) => c.refresh_token.as_deref(),
            Self::YouTube(c) => c.refresh_token.as_deref(),
            Self::Facebook(_) | Self::Instagram(_) => None,
        }
    }

    /// Unix timestamp the access token expires at, if the provider said
    pub fn expires_at(&self) -> Option<i64> {
        match self {
            Self::Facebook(c) => c.expires_at,
            Self::Instagram(c) => c.expires_at,
            Self::LinkedIn(c) => c.expires_at,
            Self::YouTube(c) => c.expires_at,
        }
    }

    /// Whether the token expires within `margin_secs` of `now`.
    ///
    /// Tokens without a known expiry never need a refresh.
    pub fn needs_refresh(&self, now: i64, margin_secs: i64) -> bool {
        self.expires_at()
            .map(|expires_at| expires_at - margin_secs <= now)
            .unwrap_or(false)
    }

    /// Provider id of the connected user, profile or channel
    pub fn account_id(&self) -> &str {
        match self {
            Self::Facebook(c) => &c.user_id,
            Self::Instagram(c) => &c.user_id,
            Self::LinkedIn(c) => &c.member_id,
            Self::YouTube(c) => &c.channel_id,
        }
    }

    /// Human-readable account name, falling back to the account id
    pub fn account_label(&self) -> String {
        let label = match self {
            Self::Facebook(c) => c.user_name.as_deref(),
            Self::Instagram(c) => c.username.as_deref(),
            Self::LinkedIn(c) => c.name.as_deref(),
            Self::YouTube(c) => c.channel_title.as_deref(),
        };
        label.unwrap_or(self.account_id()).to_string()
    }
}

// Tokens never show up in logs
impl std::fmt::Debug for PlatformCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut debug = f.debug_struct("PlatformCredentials");
        debug
            .field("platform", &self.platform())
            .field("account_id", &self.account_id())
            .field("access_token", &"[REDACTED]")
            .field("expires_at", &self.expires_at());
        if let Self::Facebook(c) = self {
            debug.field("pages", &c.pages);
        }
        debug.finish()
    }
}

/// A stored connection between a tenant and a platform account
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credential {
    pub tenant_id: String,
    pub platform: PlatformKind,
    pub credentials: PlatformCredentials,
    /// User who completed the OAuth flow
    pub created_by: String,
    pub created_at: i64,
    pub updated_at: i64,
}

impl Credential {
    pub fn new(
        tenant_id: impl Into<String>,
        created_by: impl Into<String>,
        credentials: PlatformCredentials,
    ) -> Self {
        let now = chrono::Utc::now().timestamp();
        Self {
            tenant_id: tenant_id.into(),
            platform: credentials.platform(),
            credentials,
            created_by: created_by.into(),
            created_at: now,
            updated_at: now,
        }
    }
}

/// Persistence interface for connected accounts
#[async_trait]
pub trait CredentialStore: Send + Sync {
    /// Insert or replace the credential for `(tenant_id, platform)`
    ///
    /// # Errors
    ///
    /// Returns `OmnicastError::InvalidInput` if `credential.platform` does not
    /// match the variant of `credential.credentials`.
    async fn upsert(&self, credential: &Credential) -> Result<()>;

    async fn get(&self, tenant_id: &str, platform: PlatformKind) -> Result<Option<Credential>>;

    /// All of a tenant's connections, ordered by platform
    async fn list(&self, tenant_id: &str) -> Result<Vec<Credential>>;

    /// Remove a connection; returns whether one existed
    async fn delete(&self, tenant_id: &str, platform: PlatformKind) -> Result<bool>;

    fn backend_name(&self) -> &str;
}

#[async_trait]
impl CredentialStore for Database {
    async fn upsert(&self, credential: &Credential) -> Result<()> {
        if credential.platform != credential.credentials.platform() {
            return Err(OmnicastError::InvalidInput(format!(
                "Credentials for {} cannot be stored as {}",
                credential.credentials.platform(),
                credential.platform
            )));
        }

        let blob = serde_json::to_string(&credential.credentials)
            .map_err(|e| DbError::Corrupt(format!("credentials: {}", e)))?;

        sqlx::query(
            r#"
            INSERT INTO credentials (tenant_id, platform, credentials, created_by, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?)
            ON CONFLICT(tenant_id, platform) DO UPDATE SET
                credentials = excluded.credentials,
                created_by = excluded.created_by,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(&credential.tenant_id)
        .bind(credential.platform.as_str())
        .bind(blob)
        .bind(&credential.created_by)
        .bind(credential.created_at)
        .bind(credential.updated_at)
        .execute(self.pool())
        .await
        .map_err(DbError::SqlxError)?;

        tracing::debug!(
            "Stored {} credentials for tenant {}",
            credential.platform,
            credential.tenant_id
        );
        Ok(())
    }

    async fn get(&self, tenant_id: &str, platform: PlatformKind) -> Result<Option<Credential>> {
        let row = sqlx::query(
            r#"
            SELECT * FROM credentials WHERE tenant_id = ? AND platform = ?
            "#,
        )
        .bind(tenant_id)
        .bind(platform.as_str())
        .fetch_optional(self.pool())
        .await
        .map_err(DbError::SqlxError)?;

        row.as_ref().map(credential_from_row).transpose()
    }

    async fn list(&self, tenant_id: &str) -> Result<Vec<Credential>> {
        let rows = sqlx::query(
            r#"
            SELECT * FROM credentials WHERE tenant_id = ? ORDER BY platform
            "#,
        )
        .bind(tenant_id)
        .fetch_all(self.pool())
        .await
        .map_err(DbError::SqlxError)?;

        rows.iter().map(credential_from_row).collect()
    }

    async fn delete(&self, tenant_id: &str, platform: PlatformKind) -> Result<bool> {
        let result = sqlx::query(
            r#"
            DELETE FROM credentials WHERE tenant_id = ? AND platform = ?
            "#,
        )
        .bind(tenant_id)
        .bind(platform.as_str())
        .execute(self.pool())
        .await
        .map_err(DbError::SqlxError)?;

        Ok(result.rows_affected() > 0)
    }

    fn backend_name(&self) -> &str {
        "sqlite"
    }
}

fn credential_from_row(row: &SqliteRow) -> Result<Credential> {
    let platform_str: String = row.get("platform");
    let blob: String = row.get("credentials");

    let platform = platform_str
        .parse::<PlatformKind>()
        .map_err(|_| DbError::Corrupt(format!("unknown platform '{}'", platform_str)))?;
    let credentials: PlatformCredentials = serde_json::from_str(&blob)
        .map_err(|e| DbError::Corrupt(format!("{} credentials: {}", platform, e)))?;

    if credentials.platform() != platform {
        return Err(DbError::Corrupt(format!(
            "{} row holds {} credentials",
            platform,
            credentials.platform()
        ))
        .into());
    }

    Ok(Credential {
        tenant_id: row.get("tenant_id"),
        platform,
        credentials,
        created_by: row.get("created_by"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    })
}
