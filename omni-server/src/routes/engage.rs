use axum::{
    extract::{Path, Query, State},
    Json,
};
use libomnicast::PlatformKind;
use serde::Deserialize;

use crate::auth::SessionUser;
use crate::error::ApiErr;
use crate::AppState;

#[derive(Debug, Default, Deserialize)]
pub struct EngagePostsQuery {
    pub platform: Option<String>,
}

/// `GET /engage/posts`
pub async fn list_posts(
    State(state): State<AppState>,
    user: SessionUser,
    Query(query): Query<EngagePostsQuery>,
) -> Result<Json<serde_json::Value>, ApiErr> {
    let platform = match query.platform.as_deref().filter(|p| !p.is_empty()) {
        Some(p) => Some(p.parse::<PlatformKind>()?),
        None => None,
    };
    let posts = state
        .service
        .engage()
        .list_posts(&user.user_id, platform)
        .await?;
    Ok(Json(serde_json::json!({
        "success": true,
        "result": posts,
    })))
}

/// `GET /engage/comments/{platform}/{postId}`
pub async fn comments(
    State(state): State<AppState>,
    user: SessionUser,
    Path((platform, post_id)): Path<(String, String)>,
) -> Result<Json<serde_json::Value>, ApiErr> {
    let platform: PlatformKind = platform.parse()?;
    let comments = state
        .service
        .engage()
        .comments(&user.tenant(), platform, &post_id)
        .await
        .map_err(|e| ApiErr::from(e).context("Failed to load comments"))?;
    Ok(Json(serde_json::json!({
        "success": true,
        "result": comments,
    })))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommentBody {
    pub platform: String,
    #[serde(alias = "post_id")]
    pub post_id: String,
    #[serde(default)]
    pub message: String,
}

/// `POST /engage/comment`
pub async fn comment(
    State(state): State<AppState>,
    user: SessionUser,
    Json(body): Json<CommentBody>,
) -> Result<Json<serde_json::Value>, ApiErr> {
    let platform: PlatformKind = body.platform.parse()?;
    let comment = state
        .service
        .engage()
        .comment(&user.tenant(), platform, &body.post_id, &body.message)
        .await
        .map_err(|e| ApiErr::from(e).context("Failed to post comment"))?;
    Ok(Json(serde_json::json!({
        "success": true,
        "message": "Comment posted",
        "result": comment,
    })))
}
