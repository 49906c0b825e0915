//! OAuth application credentials
//!
//! Every platform connection runs through an OAuth application identified by
//! an app key such as `app/instagram`. Resellers may register their own
//! application for a key; everyone else uses the operator's defaults taken
//! from the environment.

use async_trait::async_trait;
use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use sqlx::sqlite::SqliteRow;
use sqlx::Row;
use std::collections::HashMap;
use std::sync::Arc;

use crate::db::Database;
use crate::error::{DbError, OmnicastError, Result};
use crate::types::PlatformKind;

/// A reseller-scoped OAuth application row
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppConfigRecord {
    pub app_name: String,
    pub reseller_id: String,
    pub client_id: String,
    #[serde(skip_serializing, default)]
    pub client_secret: String,
    pub redirect_url: String,
    #[serde(default)]
    pub created_at: i64,
    #[serde(default)]
    pub updated_at: i64,
}

impl AppConfigRecord {
    pub fn new(
        app_name: impl Into<String>,
        reseller_id: impl Into<String>,
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
        redirect_url: impl Into<String>,
    ) -> Self {
        let now = chrono::Utc::now().timestamp();
        Self {
            app_name: app_name.into(),
            reseller_id: reseller_id.into(),
            client_id: client_id.into(),
            client_secret: client_secret.into(),
            redirect_url: redirect_url.into(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Whether the row carries everything an OAuth flow needs
    pub fn is_complete(&self) -> bool {
        !self.client_id.trim().is_empty()
            && !self.client_secret.trim().is_empty()
            && !self.redirect_url.trim().is_empty()
    }
}

/// Persistence interface for reseller app configs
#[async_trait]
pub trait AppConfigRepository: Send + Sync {
    async fn find(&self, app_name: &str, reseller_id: &str) -> Result<Option<AppConfigRecord>>;

    /// Insert or replace the row for `(app_name, reseller_id)`
    async fn upsert(&self, record: &AppConfigRecord) -> Result<()>;

    /// All rows, or only one reseller's
    async fn list(&self, reseller_id: Option<&str>) -> Result<Vec<AppConfigRecord>>;

    async fn delete(&self, app_name: &str, reseller_id: &str) -> Result<bool>;
}

#[async_trait]
impl AppConfigRepository for Database {
    async fn find(&self, app_name: &str, reseller_id: &str) -> Result<Option<AppConfigRecord>> {
        let row = sqlx::query(
            r#"
            SELECT * FROM app_configs WHERE app_name = ? AND reseller_id = ?
            "#,
        )
        .bind(app_name)
        .bind(reseller_id)
        .fetch_optional(self.pool())
        .await
        .map_err(DbError::SqlxError)?;

        Ok(row.as_ref().map(record_from_row))
    }

    async fn upsert(&self, record: &AppConfigRecord) -> Result<()> {
        if PlatformKind::from_app_key(&record.app_name).is_none() {
            return Err(OmnicastError::InvalidInput(format!(
                "Unknown app '{}'",
                record.app_name
            )));
        }
        if record.reseller_id.trim().is_empty() {
            return Err(OmnicastError::InvalidInput(
                "Reseller id cannot be empty".to_string(),
            ));
        }

        sqlx::query(
            r#"
            INSERT INTO app_configs (app_name, reseller_id, client_id, client_secret, redirect_url, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(app_name, reseller_id) DO UPDATE SET
                client_id = excluded.client_id,
                client_secret = excluded.client_secret,
                redirect_url = excluded.redirect_url,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(&record.app_name)
        .bind(&record.reseller_id)
        .bind(&record.client_id)
        .bind(&record.client_secret)
        .bind(&record.redirect_url)
        .bind(record.created_at)
        .bind(record.updated_at)
        .execute(self.pool())
        .await
        .map_err(DbError::SqlxError)?;

        Ok(())
    }

    async fn list(&self, reseller_id: Option<&str>) -> Result<Vec<AppConfigRecord>> {
        let rows = match reseller_id {
            Some(reseller_id) => {
                sqlx::query(
                    r#"
                    SELECT * FROM app_configs WHERE reseller_id = ? ORDER BY app_name
                    "#,
                )
                .bind(reseller_id)
                .fetch_all(self.pool())
                .await
            }
            None => {
                sqlx::query(
                    r#"
                    SELECT * FROM app_configs ORDER BY reseller_id, app_name
                    "#,
                )
                .fetch_all(self.pool())
                .await
            }
        }
        .map_err(DbError::SqlxError)?;

        Ok(rows.iter().map(record_from_row).collect())
    }

    async fn delete(&self, app_name: &str, reseller_id: &str) -> Result<bool> {
        let result = sqlx::query(
            r#"
            DELETE FROM app_configs WHERE app_name = ? AND reseller_id = ?
            "#,
        )
        .bind(app_name)
        .bind(reseller_id)
        .execute(self.pool())
        .await
        .map_err(DbError::SqlxError)?;

        Ok(result.rows_affected() > 0)
    }
}

fn record_from_row(row: &SqliteRow) -> AppConfigRecord {
    AppConfigRecord {
        app_name: row.get("app_name"),
        reseller_id: row.get("reseller_id"),
        client_id: row.get("client_id"),
        client_secret: row.get("client_secret"),
        redirect_url: row.get("redirect_url"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    }
}

/// Operator-wide OAuth applications read from `<PLATFORM>_CLIENT_ID`,
/// `<PLATFORM>_CLIENT_SECRET` and `<PLATFORM>_REDIRECT_URL`.
#[derive(Debug, Clone, Default)]
pub struct EnvDefaults {
    vars: HashMap<String, String>,
}

impl EnvDefaults {
    /// Capture the relevant variables from the process environment
    pub fn from_env() -> Self {
        let vars = PlatformKind::ALL
            .iter()
            .flat_map(|platform| Self::var_names(*platform))
            .filter_map(|name| std::env::var(&name).ok().map(|value| (name, value)))
            .collect();
        Self { vars }
    }

    /// Build from explicit `NAME=value` pairs
    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            vars: pairs
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }

    fn var_names(platform: PlatformKind) -> [String; 3] {
        let prefix = platform.as_upper();
        [
            format!("{}_CLIENT_ID", prefix),
            format!("{}_CLIENT_SECRET", prefix),
            format!("{}_REDIRECT_URL", prefix),
        ]
    }

    fn value(&self, name: &str) -> Option<&str> {
        self.vars
            .get(name)
            .map(|v| v.trim())
            .filter(|v| !v.is_empty())
    }

    /// Complete default credentials for a platform, if configured
    pub fn for_platform(&self, platform: PlatformKind) -> Option<(String, String, String)> {
        let [id, secret, redirect] = Self::var_names(platform);
        Some((
            self.value(&id)?.to_string(),
            self.value(&secret)?.to_string(),
            self.value(&redirect)?.to_string(),
        ))
    }
}

/// Where resolved credentials came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConfigSource {
    Reseller,
    Environment,
}

/// Client credentials to run an OAuth flow with
#[derive(Debug)]
pub struct ResolvedAppConfig {
    pub client_id: String,
    pub client_secret: SecretString,
    pub redirect_url: String,
    pub source: ConfigSource,
}

/// Picks the OAuth application for an app key and reseller
#[derive(Clone)]
pub struct AppConfigResolver {
    repository: Arc<dyn AppConfigRepository>,
    defaults: EnvDefaults,
}

impl AppConfigResolver {
    pub fn new(repository: Arc<dyn AppConfigRepository>, defaults: EnvDefaults) -> Self {
        Self {
            repository,
            defaults,
        }
    }

    /// Resolve credentials for `app_key`.
    ///
    /// A complete reseller row wins over the environment defaults. Returns
    /// `Ok(None)` when neither source has complete credentials, which callers
    /// treat as "OAuth not configured".
    pub async fn resolve(
        &self,
        app_key: &str,
        reseller_id: Option<&str>,
    ) -> Result<Option<ResolvedAppConfig>> {
        let Some(platform) = PlatformKind::from_app_key(app_key) else {
            return Err(OmnicastError::InvalidInput(format!(
                "Unknown app '{}'",
                app_key
            )));
        };

        if let Some(reseller_id) = reseller_id.filter(|r| !r.is_empty()) {
            match self.repository.find(app_key, reseller_id).await? {
                Some(record) if record.is_complete() => {
                    tracing::debug!("Using reseller {} config for {}", reseller_id, app_key);
                    return Ok(Some(ResolvedAppConfig {
                        client_id: record.client_id,
                        client_secret: SecretString::from(record.client_secret),
                        redirect_url: record.redirect_url,
                        source: ConfigSource::Reseller,
                    }));
                }
                Some(_) => {
                    tracing::warn!(
                        "Reseller {} config for {} is incomplete, falling back to defaults",
                        reseller_id,
                        app_key
                    );
                }
                None => {}
            }
        }

        Ok(self
            .defaults
            .for_platform(platform)
            .map(|(client_id, client_secret, redirect_url)| ResolvedAppConfig {
                client_id,
                client_secret: SecretString::from(client_secret),
                redirect_url,
                source: ConfigSource::Environment,
            }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use secrecy::ExposeSecret;

    fn instagram_env() -> EnvDefaults {
        EnvDefaults::from_pairs([
            ("INSTAGRAM_CLIENT_ID", "env-id"),
            ("INSTAGRAM_CLIENT_SECRET", "env-secret"),
            ("INSTAGRAM_REDIRECT_URL", "https://api.example.com/instagram/callback"),
        ])
    }

    async fn resolver_with(defaults: EnvDefaults) -> (Database, AppConfigResolver) {
        let db = Database::in_memory().await.unwrap();
        let resolver = AppConfigResolver::new(Arc::new(db.clone()), defaults);
        (db, resolver)
    }

    #[tokio::test]
    async fn test_reseller_row_wins_over_environment() {
        let (db, resolver) = resolver_with(instagram_env()).await;
        AppConfigRepository::upsert(
            &db,
            &AppConfigRecord::new(
                "app/instagram",
                "r1",
                "reseller-id",
                "reseller-secret",
                "https://r1.example.com/cb",
            ),
        )
        .await
        .unwrap();

        let resolved = resolver
            .resolve("app/instagram", Some("r1"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(resolved.source, ConfigSource::Reseller);
        assert_eq!(resolved.client_id, "reseller-id");
        assert_eq!(resolved.client_secret.expose_secret(), "reseller-secret");

        // Another reseller falls back to the defaults
        let other = resolver
            .resolve("app/instagram", Some("r2"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(other.source, ConfigSource::Environment);
        assert_eq!(other.client_id, "env-id");
    }

    #[tokio::test]
    async fn test_incomplete_reseller_row_falls_back() {
        let (db, resolver) = resolver_with(instagram_env()).await;
        AppConfigRepository::upsert(
            &db,
            &AppConfigRecord::new("app/instagram", "r1", "reseller-id", "", "https://cb"),
        )
        .await
        .unwrap();

        let resolved = resolver
            .resolve("app/instagram", Some("r1"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(resolved.source, ConfigSource::Environment);
    }

    #[tokio::test]
    async fn test_nothing_configured_resolves_to_none() {
        let (_db, resolver) = resolver_with(instagram_env()).await;
        assert!(resolver
            .resolve("app/youtube", Some("r1"))
            .await
            .unwrap()
            .is_none());

        let partial = EnvDefaults::from_pairs([("YOUTUBE_CLIENT_ID", "id")]);
        let (_db, resolver) = resolver_with(partial).await;
        assert!(resolver.resolve("app/youtube", None).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_unknown_app_key_is_invalid() {
        let (_db, resolver) = resolver_with(EnvDefaults::default()).await;
        let err = resolver.resolve("app/tiktok", None).await.unwrap_err();
        assert!(matches!(err, OmnicastError::InvalidInput(_)));
    }

    #[tokio::test]
    async fn test_upsert_replaces_row_and_lists_per_reseller() {
        let db = Database::in_memory().await.unwrap();
        for secret in ["one", "two"] {
            AppConfigRepository::upsert(
                &db,
                &AppConfigRecord::new("app/linkedin", "r1", "id", secret, "https://cb"),
            )
            .await
            .unwrap();
        }
        AppConfigRepository::upsert(
            &db,
            &AppConfigRecord::new("app/linkedin", "r2", "id", "x", "https://cb"),
        )
        .await
        .unwrap();

        let r1 = AppConfigRepository::list(&db, Some("r1")).await.unwrap();
        assert_eq!(r1.len(), 1);
        assert_eq!(r1[0].client_secret, "two");
        assert_eq!(AppConfigRepository::list(&db, None).await.unwrap().len(), 2);

        assert!(AppConfigRepository::delete(&db, "app/linkedin", "r1")
            .await
            .unwrap());
        assert!(AppConfigRepository::find(&db, "app/linkedin", "r1")
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_upsert_rejects_unknown_app() {
        let db = Database::in_memory().await.unwrap();
        let err = AppConfigRepository::upsert(
            &db,
            &AppConfigRecord::new("app/tiktok", "r1", "id", "secret", "https://cb"),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, OmnicastError::InvalidInput(_)));
    }

    #[test]
    fn test_record_serialization_hides_secret() {
        let record = AppConfigRecord::new("app/facebook", "r1", "id", "secret", "https://cb");
        let json = serde_json::to_value(&record).unwrap();
        assert!(json.get("clientSecret").is_none());
        assert_eq!(json["clientId"], "id");
    }
}
