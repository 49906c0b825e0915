//! OAuth connect flow: authorize redirect, callback, disconnect
//!
//! The callback is the only entry point a provider calls directly, so its
//! failures are reported as a [`CallbackError`] whose
//! [`query_value`](CallbackError::query_value) is appended to the frontend
//! redirect instead of being returned as an HTTP error.

use serde::Serialize;
use std::sync::Arc;
use thiserror::Error;
use tracing::{info, warn};

use crate::app_config::AppConfigResolver;
use crate::credentials::{Credential, CredentialStore};
use crate::error::{PlatformError, Result};
use crate::oauth_state::{OAuthState, StateError, StateSigner};
use crate::platforms::PlatformRegistry;
use crate::types::{PlatformKind, TenantContext};

/// Why an OAuth callback could not connect an account
#[derive(Error, Debug)]
pub enum CallbackError {
    #[error("authorization code missing from callback")]
    MissingCode,

    #[error("invalid OAuth state: {0}")]
    InvalidState(#[from] StateError),

    #[error("OAuth application not configured: {0}")]
    ConfigError(String),

    #[error("OAuth exchange failed: {0}")]
    OAuthFailed(String),
}

impl CallbackError {
    /// Value of the `error` query parameter on the frontend redirect
    pub fn query_value(&self) -> &'static str {
        match self {
            CallbackError::MissingCode => "missing_code",
            CallbackError::InvalidState(_) => "invalid_state",
            CallbackError::ConfigError(_) => "config_error",
            CallbackError::OAuthFailed(_) => "oauth_failed",
        }
    }
}

/// Account linked by a successful callback
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectedAccount {
    pub tenant_id: String,
    pub platform: PlatformKind,
    pub account_id: String,
    pub account_label: String,
}

/// One of a tenant's connections, without tokens
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionSummary {
    pub platform: PlatformKind,
    pub account_id: String,
    pub account_label: String,
    pub expires_at: Option<i64>,
    pub connected_by: String,
    pub connected_at: i64,
    pub updated_at: i64,
}

impl From<&Credential> for ConnectionSummary {
    fn from(credential: &Credential) -> Self {
        Self {
            platform: credential.platform,
            account_id: credential.credentials.account_id().to_string(),
            account_label: credential.credentials.account_label(),
            expires_at: credential.credentials.expires_at(),
            connected_by: credential.created_by.clone(),
            connected_at: credential.created_at,
            updated_at: credential.updated_at,
        }
    }
}

#[derive(Clone)]
pub struct OAuthService {
    signer: Arc<StateSigner>,
    resolver: AppConfigResolver,
    registry: Arc<PlatformRegistry>,
    store: Arc<dyn CredentialStore>,
}

impl OAuthService {
    pub fn new(
        signer: Arc<StateSigner>,
        resolver: AppConfigResolver,
        registry: Arc<PlatformRegistry>,
        store: Arc<dyn CredentialStore>,
    ) -> Self {
        Self {
            signer,
            resolver,
            registry,
            store,
        }
    }

    /// Provider URL to redirect the tenant's browser to
    ///
    /// # Errors
    ///
    /// Returns `PlatformError::NotConfigured` when neither the tenant's
    /// reseller nor the environment supplies client credentials.
    pub async fn authorization_url(
        &self,
        platform: PlatformKind,
        tenant: &TenantContext,
    ) -> Result<String> {
        let app = self
            .resolver
            .resolve(platform.app_key(), tenant.reseller_id.as_deref())
            .await?
            .ok_or_else(|| {
                PlatformError::NotConfigured(format!(
                    "No OAuth application configured for {}",
                    platform.app_key()
                ))
            })?;

        let state = self
            .signer
            .encode(&OAuthState::new(tenant, platform, chrono::Utc::now().timestamp()));
        let adapter = self.registry.get(platform)?;
        adapter.authorization_url(&app, &state)
    }

    /// Complete the flow the provider redirected back from
    pub async fn handle_callback(
        &self,
        platform: PlatformKind,
        code: Option<&str>,
        state: Option<&str>,
    ) -> std::result::Result<ConnectedAccount, CallbackError> {
        let code = code
            .map(str::trim)
            .filter(|c| !c.is_empty())
            .ok_or(CallbackError::MissingCode)?;
        let state = self
            .signer
            .decode(state.unwrap_or_default(), chrono::Utc::now().timestamp())?;
        if state.platform != platform {
            warn!(
                "{} callback received a state issued for {}",
                platform, state.platform
            );
            return Err(StateError::WrongPlatform(state.platform).into());
        }
        let tenant = state.tenant();

        let app = self
            .resolver
            .resolve(platform.app_key(), tenant.reseller_id.as_deref())
            .await
            .map_err(|e| CallbackError::ConfigError(e.to_string()))?
            .ok_or_else(|| {
                CallbackError::ConfigError(format!("{} has no client credentials", platform.app_key()))
            })?;
        let adapter = self
            .registry
            .get(platform)
            .map_err(|e| CallbackError::ConfigError(e.to_string()))?;

        let credentials = adapter.exchange_code(&app, code).await.map_err(|e| {
            warn!("{} code exchange for tenant {} failed: {}", platform, tenant.tenant_id, e);
            CallbackError::OAuthFailed(e.to_string())
        })?;

        let credential = Credential::new(&tenant.tenant_id, &tenant.user_id, credentials);
        self.store
            .upsert(&credential)
            .await
            .map_err(|e| CallbackError::OAuthFailed(e.to_string()))?;

        info!(
            "Connected {} account {} for tenant {}",
            platform,
            credential.credentials.account_id(),
            tenant.tenant_id
        );
        Ok(ConnectedAccount {
            tenant_id: tenant.tenant_id,
            platform,
            account_id: credential.credentials.account_id().to_string(),
            account_label: credential.credentials.account_label(),
        })
    }

    /// Remove a connection; returns whether one existed
    pub async fn disconnect(&self, tenant_id: &str, platform: PlatformKind) -> Result<bool> {
        let removed = self.store.delete(tenant_id, platform).await?;
        if removed {
            info!("Disconnected {} for tenant {}", platform, tenant_id);
        }
        Ok(removed)
    }

    pub async fn connections(&self, tenant_id: &str) -> Result<Vec<ConnectionSummary>> {
        let credentials = self.store.list(tenant_id).await?;
        Ok(credentials.iter().map(ConnectionSummary::from).collect())
    }
}
