//! Database operations for Omnicast

use sqlx::sqlite::{SqlitePool, SqlitePoolOptions, SqliteRow};
use sqlx::Row;
use std::path::Path;

use crate::analytics::PostAnalytics;
use crate::error::{DbError, Result};
use crate::types::{AnalyticsStatus, PlatformKind, PostType, StoredPost};

/// Filters for listing a tenant's posts
#[derive(Debug, Clone, Default)]
pub struct PostFilter {
    pub platform: Option<PlatformKind>,
    pub status: Option<AnalyticsStatus>,
    pub since: Option<i64>,
    pub until: Option<i64>,
    pub search: Option<String>,
    pub limit: Option<usize>,
    pub offset: Option<usize>,
}

#[derive(Clone)]
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    /// Open (creating if needed) the database at `db_path` and run migrations
    pub async fn new(db_path: &str) -> Result<Self> {
        let expanded_path = shellexpand::tilde(db_path).to_string();
        let path = Path::new(&expanded_path);

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(DbError::IoError)?;
        }

        // Forward slashes work for SQLite URLs on every platform
        let db_url = format!("sqlite://{}?mode=rwc", expanded_path.replace('\\', "/"));

        let pool = SqlitePool::connect(&db_url)
            .await
            .map_err(DbError::SqlxError)?;

        Self::migrate(pool).await
    }

    /// Private in-memory database; a single connection keeps it alive
    pub async fn in_memory() -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect("sqlite::memory:")
            .await
            .map_err(DbError::SqlxError)?;

        Self::migrate(pool).await
    }

    async fn migrate(pool: SqlitePool) -> Result<Self> {
        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .map_err(DbError::MigrationError)?;

        Ok(Self { pool })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Insert a freshly published post
    pub async fn create_post(&self, post: &StoredPost) -> Result<()> {
        let hashtags = serde_json::to_string(&post.hashtags)
            .map_err(|e| DbError::Corrupt(format!("hashtags: {}", e)))?;
        let analytics = encode_analytics(post.analytics.as_ref())?;

        sqlx::query(
            r#"
            INSERT INTO posts (
                id, tenant_id, platform, post_type, platform_post_id, account_id,
                content, media_url, permalink, hashtags, published_at,
                analytics, analytics_status, analytics_error
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&post.id)
        .bind(&post.tenant_id)
        .bind(post.platform.as_str())
        .bind(post.post_type.as_str())
        .bind(&post.platform_post_id)
        .bind(&post.account_id)
        .bind(&post.content)
        .bind(&post.media_url)
        .bind(&post.permalink)
        .bind(hashtags)
        .bind(post.published_at)
        .bind(analytics)
        .bind(post.analytics_status.as_str())
        .bind(&post.analytics_error)
        .execute(&self.pool)
        .await
        .map_err(DbError::SqlxError)?;

        Ok(())
    }

    /// Get a tenant's post by its Omnicast id
    pub async fn get_post(&self, tenant_id: &str, post_id: &str) -> Result<Option<StoredPost>> {
        let row = sqlx::query(
            r#"
            SELECT * FROM posts WHERE tenant_id = ? AND id = ?
            "#,
        )
        .bind(tenant_id)
        .bind(post_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(DbError::SqlxError)?;

        row.as_ref().map(post_from_row).transpose()
    }

    /// Find a tenant's post by the provider-native id
    pub async fn find_by_platform_post_id(
        &self,
        tenant_id: &str,
        platform: PlatformKind,
        platform_post_id: &str,
    ) -> Result<Option<StoredPost>> {
        let row = sqlx::query(
            r#"
            SELECT * FROM posts
            WHERE tenant_id = ? AND platform = ? AND platform_post_id = ?
            "#,
        )
        .bind(tenant_id)
        .bind(platform.as_str())
        .bind(platform_post_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(DbError::SqlxError)?;

        row.as_ref().map(post_from_row).transpose()
    }

    /// List a tenant's posts, newest first
    pub async fn list_posts(&self, tenant_id: &str, filter: &PostFilter) -> Result<Vec<StoredPost>> {
        let mut where_clauses = vec!["tenant_id = ?"];

        if filter.platform.is_some() {
            where_clauses.push("platform = ?");
        }
        if filter.status.is_some() {
            where_clauses.push("analytics_status = ?");
        }
        if filter.since.is_some() {
            where_clauses.push("published_at >= ?");
        }
        if filter.until.is_some() {
            where_clauses.push("published_at <= ?");
        }
        if filter.search.is_some() {
            where_clauses.push("content LIKE ? ESCAPE '\\'");
        }

        let query_str = format!(
            r#"
            SELECT * FROM posts
            WHERE {}
            ORDER BY published_at DESC, id
            LIMIT ? OFFSET ?
            "#,
            where_clauses.join(" AND ")
        );

        // Bind in the same order as the WHERE clauses
        let mut query = sqlx::query(&query_str).bind(tenant_id);
        if let Some(platform) = filter.platform {
            query = query.bind(platform.as_str());
        }
        if let Some(status) = filter.status {
            query = query.bind(status.as_str());
        }
        if let Some(since) = filter.since {
            query = query.bind(since);
        }
        if let Some(until) = filter.until {
            query = query.bind(until);
        }
        if let Some(search) = &filter.search {
            query = query.bind(format!("%{}%", escape_like(search)));
        }
        // SQLite treats a negative LIMIT as unbounded
        let limit = filter.limit.map(|l| l as i64).unwrap_or(-1);
        query = query.bind(limit).bind(filter.offset.unwrap_or(0) as i64);

        let rows = query
            .fetch_all(&self.pool)
            .await
            .map_err(DbError::SqlxError)?;

        rows.iter().map(post_from_row).collect()
    }

    /// Store a refreshed analytics document and mark the post synced
    pub async fn record_analytics(&self, post_id: &str, analytics: &PostAnalytics) -> Result<()> {
        let encoded = encode_analytics(Some(analytics))?;

        sqlx::query(
            r#"
            UPDATE posts
            SET analytics = ?, analytics_status = 'synced', analytics_error = NULL
            WHERE id = ?
            "#,
        )
        .bind(encoded)
        .bind(post_id)
        .execute(&self.pool)
        .await
        .map_err(DbError::SqlxError)?;

        Ok(())
    }

    /// Mark an analytics refresh as failed, keeping the last good document
    pub async fn record_analytics_failure(&self, post_id: &str, error: &str) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE posts SET analytics_status = 'failed', analytics_error = ? WHERE id = ?
            "#,
        )
        .bind(error)
        .bind(post_id)
        .execute(&self.pool)
        .await
        .map_err(DbError::SqlxError)?;

        Ok(())
    }
}

fn encode_analytics(analytics: Option<&PostAnalytics>) -> Result<Option<String>> {
    analytics
        .map(|a| {
            serde_json::to_string(a).map_err(|e| DbError::Corrupt(format!("analytics: {}", e)).into())
        })
        .transpose()
}

fn post_from_row(row: &SqliteRow) -> Result<StoredPost> {
    let platform: String = row.get("platform");
    let post_type: String = row.get("post_type");
    let hashtags: String = row.get("hashtags");
    let analytics: Option<String> = row.get("analytics");
    let status: String = row.get("analytics_status");

    Ok(StoredPost {
        id: row.get("id"),
        tenant_id: row.get("tenant_id"),
        platform: platform
            .parse::<PlatformKind>()
            .map_err(|_| DbError::Corrupt(format!("unknown platform '{}'", platform)))?,
        post_type: post_type
            .parse::<PostType>()
            .map_err(|_| DbError::Corrupt(format!("unknown post type '{}'", post_type)))?,
        platform_post_id: row.get("platform_post_id"),
        account_id: row.get("account_id"),
        content: row.get("content"),
        media_url: row.get("media_url"),
        permalink: row.get("permalink"),
        hashtags: serde_json::from_str(&hashtags)
            .map_err(|e| DbError::Corrupt(format!("hashtags: {}", e)))?,
        published_at: row.get("published_at"),
        analytics: analytics
            .map(|a| serde_json::from_str::<PostAnalytics>(&a))
            .transpose()
            .map_err(|e| DbError::Corrupt(format!("analytics: {}", e)))?,
        analytics_status: AnalyticsStatus::parse(&status),
        analytics_error: row.get("analytics_error"),
    })
}

/// Match `%`, `_` and `\` literally inside a `LIKE ... ESCAPE` pattern
fn escape_like(term: &str) -> String {
    let mut escaped = String::with_capacity(term.len());
    for c in term.chars() {
        if matches!(c, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}
