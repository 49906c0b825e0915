use axum::{
    extract::{Path, Query, State},
    Json,
};
use libomnicast::types::AnalyticsStatus;
use libomnicast::{PlatformKind, PostFilter};
use serde::Deserialize;

use crate::auth::SessionUser;
use crate::error::ApiErr;
use crate::AppState;

const MAX_PAGE_SIZE: usize = 200;

#[derive(Debug, Default, Deserialize)]
pub struct PostQuery {
    pub platform: Option<String>,
    pub status: Option<String>,
    pub since: Option<i64>,
    pub until: Option<i64>,
    pub search: Option<String>,
    pub limit: Option<usize>,
    pub offset: Option<usize>,
}

impl PostQuery {
    fn into_filter(self) -> Result<PostFilter, ApiErr> {
        let platform = match self.platform.as_deref().filter(|p| !p.is_empty()) {
            Some(p) => Some(p.parse::<PlatformKind>()?),
            None => None,
        };
        let status = match self.status.as_deref().filter(|s| !s.is_empty()) {
            Some(s @ ("pending" | "synced" | "failed")) => Some(AnalyticsStatus::parse(s)),
            Some(other) => {
                return Err(ApiErr::bad_request(format!(
                    "Unknown status '{}'. Valid options: pending, synced, failed",
                    other
                )))
            }
            None => None,
        };
        Ok(PostFilter {
            platform,
            status,
            since: self.since,
            until: self.until,
            search: self.search.filter(|s| !s.trim().is_empty()),
            limit: Some(self.limit.unwrap_or(50).min(MAX_PAGE_SIZE)),
            offset: self.offset,
        })
    }
}

/// `GET /analytics/overview`
pub async fn overview(
    State(state): State<AppState>,
    user: SessionUser,
) -> Result<Json<serde_json::Value>, ApiErr> {
    let overview = state.service.analytics().overview(&user.user_id).await?;
    Ok(Json(serde_json::json!({
        "success": true,
        "result": overview,
    })))
}

/// `GET /analytics/posts`
pub async fn list_posts(
    State(state): State<AppState>,
    user: SessionUser,
    Query(query): Query<PostQuery>,
) -> Result<Json<serde_json::Value>, ApiErr> {
    let filter = query.into_filter()?;
    let posts = state
        .service
        .analytics()
        .list_posts(&user.user_id, &filter)
        .await?;
    Ok(Json(serde_json::json!({
        "success": true,
        "result": posts,
    })))
}

/// `GET /analytics/posts/{postId}`
pub async fn get_post(
    State(state): State<AppState>,
    user: SessionUser,
    Path(post_id): Path<String>,
) -> Result<Json<serde_json::Value>, ApiErr> {
    let post = state
        .service
        .analytics()
        .get_post(&user.user_id, &post_id)
        .await?;
    Ok(Json(serde_json::json!({
        "success": true,
        "result": post,
    })))
}

/// `POST /analytics/posts/{postId}/refresh`
pub async fn refresh_post(
    State(state): State<AppState>,
    user: SessionUser,
    Path(post_id): Path<String>,
) -> Result<Json<serde_json::Value>, ApiErr> {
    let post = state
        .service
        .analytics()
        .refresh_post(&user.tenant(), &post_id)
        .await
        .map_err(|e| ApiErr::from(e).context("Failed to refresh analytics"))?;
    Ok(Json(serde_json::json!({
        "success": true,
        "message": "Analytics refreshed",
        "result": post,
    })))
}
