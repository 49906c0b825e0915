//! Session extraction
//!
//! A request is authenticated by, in order:
//! 1. `Authorization: Bearer <jwt>` signed with the session secret
//! 2. `x-user-id` / `x-user-role` / `x-reseller-id` headers set by the gateway
//! 3. the legacy `automation` cookie carrying the same JWT

use axum::{extract::FromRequestParts, http::request::Parts};
use axum_extra::extract::cookie::CookieJar;
use jsonwebtoken::{decode, DecodingKey, Validation};
use libomnicast::TenantContext;
use serde::Deserialize;

use crate::error::ApiErr;
use crate::AppState;

pub const SESSION_COOKIE: &str = "automation";

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Claims {
    pub sub: String,
    #[serde(default)]
    pub role: Option<String>,
    #[serde(default, alias = "reseller_id")]
    pub reseller_id: Option<String>,
    pub exp: usize,
}

/// The authenticated caller
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionUser {
    pub user_id: String,
    pub role: Option<String>,
    pub reseller_id: Option<String>,
}

impl SessionUser {
    /// Tenants are keyed by the acting user
    pub fn tenant(&self) -> TenantContext {
        TenantContext::for_user(&self.user_id, self.reseller_id.clone())
    }

    pub fn has_role(&self, roles: &[&str]) -> bool {
        self.role
            .as_deref()
            .map(|role| roles.iter().any(|r| r.eq_ignore_ascii_case(role)))
            .unwrap_or(false)
    }
}

impl From<Claims> for SessionUser {
    fn from(claims: Claims) -> Self {
        Self {
            user_id: claims.sub,
            role: claims.role,
            reseller_id: claims.reseller_id.filter(|r| !r.is_empty()),
        }
    }
}

fn verify(token: &str, key: &DecodingKey) -> Option<SessionUser> {
    match decode::<Claims>(token, key, &Validation::default()) {
        Ok(data) => Some(data.claims.into()),
        Err(e) => {
            tracing::debug!(error = ?e, "rejected session token");
            None
        }
    }
}

fn header<'a>(parts: &'a Parts, name: &str) -> Option<&'a str> {
    parts
        .headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
}

impl FromRequestParts<AppState> for SessionUser {
    type Rejection = ApiErr;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let key = state.session_key.as_deref();

        if let (Some(token), Some(key)) = (
            header(parts, "authorization").and_then(|v| v.strip_prefix("Bearer ")),
            key,
        ) {
            if let Some(user) = verify(token.trim(), key) {
                return Ok(user);
            }
        }

        if let Some(user_id) = header(parts, "x-user-id") {
            return Ok(SessionUser {
                user_id: user_id.to_string(),
                role: header(parts, "x-user-role").map(str::to_string),
                reseller_id: header(parts, "x-reseller-id").map(str::to_string),
            });
        }

        if let Some(key) = key {
            let jar = CookieJar::from_headers(&parts.headers);
            if let Some(user) = jar
                .get(SESSION_COOKIE)
                .and_then(|cookie| verify(cookie.value(), key))
            {
                return Ok(user);
            }
        }

        Err(ApiErr::unauthorized("No valid session"))
    }
}
