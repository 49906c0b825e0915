use axum::{
    extract::{Path, Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use libomnicast::PlatformKind;
use serde::Deserialize;

use crate::auth::SessionUser;
use crate::error::ApiErr;
use crate::AppState;

fn found(location: &str) -> Response {
    (StatusCode::FOUND, [(header::LOCATION, location.to_string())]).into_response()
}

fn platform_from(path: &str) -> Result<PlatformKind, ApiErr> {
    path.parse().map_err(ApiErr::from)
}

/// `GET /{platform}/auth` - redirect to the provider's consent page
pub async fn authorize(
    State(state): State<AppState>,
    user: SessionUser,
    Path(platform): Path<String>,
) -> Result<Response, ApiErr> {
    let platform = platform_from(&platform)?;
    let url = state
        .service
        .oauth()
        .authorization_url(platform, &user.tenant())
        .await
        .map_err(|e| ApiErr::from(e).context(format!("Cannot connect {}", platform)))?;
    Ok(found(&url))
}

#[derive(Debug, Deserialize)]
pub struct CallbackParams {
    pub code: Option<String>,
    pub state: Option<String>,
    pub error: Option<String>,
}

/// `GET /{platform}/callback` - always redirects back to the frontend
pub async fn callback(
    State(state): State<AppState>,
    Path(platform): Path<String>,
    Query(params): Query<CallbackParams>,
) -> Result<Response, ApiErr> {
    let platform = platform_from(&platform)?;
    let config = state.service.config();

    if let Some(provider_error) = &params.error {
        tracing::warn!("{} authorization was not granted: {}", platform, provider_error);
    }

    let location = match state
        .service
        .oauth()
        .handle_callback(platform, params.code.as_deref(), params.state.as_deref())
        .await
    {
        Ok(account) => {
            tracing::info!(
                "Tenant {} connected {} ({})",
                account.tenant_id,
                platform,
                account.account_label
            );
            config.integrations_redirect("connected", platform.as_str())
        }
        Err(e) => {
            tracing::warn!("{} callback failed: {}", platform, e);
            config.integrations_redirect("error", e.query_value())
        }
    };
    Ok(found(&location))
}

/// `DELETE /{platform}/connection`
pub async fn disconnect(
    State(state): State<AppState>,
    user: SessionUser,
    Path(platform): Path<String>,
) -> Result<Json<serde_json::Value>, ApiErr> {
    let platform = platform_from(&platform)?;
    let removed = state
        .service
        .oauth()
        .disconnect(&user.user_id, platform)
        .await?;
    if !removed {
        return Err(ApiErr::not_found(format!("{} is not connected", platform)));
    }
    Ok(Json(serde_json::json!({
        "success": true,
        "message": format!("Disconnected {}", platform),
    })))
}

/// `GET /integrations` - the tenant's connected accounts, without tokens
pub async fn connections(
    State(state): State<AppState>,
    user: SessionUser,
) -> Result<Json<serde_json::Value>, ApiErr> {
    let connections = state.service.oauth().connections(&user.user_id).await?;
    Ok(Json(serde_json::json!({
        "success": true,
        "result": connections,
    })))
}
