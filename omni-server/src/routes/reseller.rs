//! Reseller-owned OAuth applications
//!
//! Client secrets are write-only: `AppConfigRecord` never serializes them.

use axum::{
    extract::{Path, Query, State},
    Json,
};
use libomnicast::{AppConfigRecord, AppConfigRepository, PlatformKind};
use serde::Deserialize;

use crate::auth::SessionUser;
use crate::error::ApiErr;
use crate::AppState;

const MANAGER_ROLES: &[&str] = &["reseller", "admin"];

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResellerQuery {
    /// Admins may act on another reseller's rows
    pub reseller_id: Option<String>,
}

/// The reseller whose rows the caller manages
fn reseller_scope(user: &SessionUser, query: &ResellerQuery) -> Result<String, ApiErr> {
    if !user.has_role(MANAGER_ROLES) {
        return Err(ApiErr::forbidden("Reseller or admin role required"));
    }
    let requested = query.reseller_id.as_deref().filter(|r| !r.is_empty());
    match requested {
        Some(other) if user.has_role(&["admin"]) => Ok(other.to_string()),
        Some(other) if user.reseller_id.as_deref() != Some(other) => {
            Err(ApiErr::forbidden("Cannot manage another reseller's apps"))
        }
        _ => Ok(user
            .reseller_id
            .clone()
            .unwrap_or_else(|| user.user_id.clone())),
    }
}

fn app_key(app: &str) -> Result<&'static str, ApiErr> {
    let platform: PlatformKind = app
        .strip_prefix("app/")
        .unwrap_or(app)
        .parse()?;
    Ok(platform.app_key())
}

/// `GET /reseller/app-configs`
pub async fn list(
    State(state): State<AppState>,
    user: SessionUser,
    Query(query): Query<ResellerQuery>,
) -> Result<Json<serde_json::Value>, ApiErr> {
    let reseller_id = reseller_scope(&user, &query)?;
    let rows = AppConfigRepository::list(state.service.database(), Some(&reseller_id)).await?;
    Ok(Json(serde_json::json!({
        "success": true,
        "result": rows,
    })))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppConfigBody {
    pub client_id: String,
    pub client_secret: String,
    pub redirect_url: String,
}

/// `PUT /reseller/app-configs/{app}`
pub async fn upsert(
    State(state): State<AppState>,
    user: SessionUser,
    Path(app): Path<String>,
    Query(query): Query<ResellerQuery>,
    Json(body): Json<AppConfigBody>,
) -> Result<Json<serde_json::Value>, ApiErr> {
    let reseller_id = reseller_scope(&user, &query)?;
    let app_name = app_key(&app)?;
    let db = state.service.database();

    let mut record = AppConfigRecord::new(
        app_name,
        reseller_id.as_str(),
        body.client_id.trim(),
        body.client_secret.trim(),
        body.redirect_url.trim(),
    );
    if !record.is_complete() {
        return Err(ApiErr::bad_request(
            "clientId, clientSecret and redirectUrl are required",
        ));
    }
    if let Some(existing) = db.find(app_name, &reseller_id).await? {
        record.created_at = existing.created_at;
    }
    AppConfigRepository::upsert(db, &record).await?;

    tracing::info!("Reseller {} updated {}", reseller_id, app_name);
    Ok(Json(serde_json::json!({
        "success": true,
        "message": format!("Saved {}", app_name),
        "result": record,
    })))
}

/// `DELETE /reseller/app-configs/{app}`
pub async fn delete(
    State(state): State<AppState>,
    user: SessionUser,
    Path(app): Path<String>,
    Query(query): Query<ResellerQuery>,
) -> Result<Json<serde_json::Value>, ApiErr> {
    let reseller_id = reseller_scope(&user, &query)?;
    let app_name = app_key(&app)?;
    let removed = AppConfigRepository::delete(state.service.database(), app_name, &reseller_id).await?;
    if !removed {
        return Err(ApiErr::not_found(format!("No {} config for this reseller", app_name)));
    }
    Ok(Json(serde_json::json!({
        "success": true,
        "message": format!("Deleted {}", app_name),
    })))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user(role: Option<&str>, reseller: Option<&str>) -> SessionUser {
        SessionUser {
            user_id: "user-1".to_string(),
            role: role.map(str::to_string),
            reseller_id: reseller.map(str::to_string),
        }
    }

    #[test]
    fn test_reseller_scope() {
        let query = ResellerQuery::default();
        assert!(reseller_scope(&user(None, None), &query).is_err());
        assert!(reseller_scope(&user(Some("member"), Some("r1")), &query).is_err());
        assert_eq!(reseller_scope(&user(Some("reseller"), Some("r1")), &query).unwrap(), "r1");
        assert_eq!(reseller_scope(&user(Some("Reseller"), None), &query).unwrap(), "user-1");

        let other = ResellerQuery {
            reseller_id: Some("r2".to_string()),
        };
        assert!(reseller_scope(&user(Some("reseller"), Some("r1")), &other).is_err());
        assert_eq!(reseller_scope(&user(Some("admin"), None), &other).unwrap(), "r2");
    }

    #[test]
    fn test_app_key_accepts_names_and_keys() {
        assert_eq!(app_key("facebook").unwrap(), "app/facebook");
        assert_eq!(app_key("app/youtube").unwrap(), "app/youtube");
        assert!(app_key("app/myspace").is_err());
    }
}
