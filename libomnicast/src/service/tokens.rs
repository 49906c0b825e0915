//! Stored credentials, refreshed before use when they are about to expire

use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::app_config::AppConfigResolver;
use crate::credentials::{Credential, CredentialStore, PlatformCredentials};
use crate::error::{PlatformError, Result};
use crate::platforms::PlatformRegistry;
use crate::types::{PlatformKind, TenantContext};

/// Hands out a tenant's platform credentials, renewing expiring tokens
#[derive(Clone)]
pub struct TokenKeeper {
    store: Arc<dyn CredentialStore>,
    resolver: AppConfigResolver,
    registry: Arc<PlatformRegistry>,
    refresh_margin_secs: i64,
}

impl TokenKeeper {
    pub fn new(
        store: Arc<dyn CredentialStore>,
        resolver: AppConfigResolver,
        registry: Arc<PlatformRegistry>,
        refresh_margin_secs: i64,
    ) -> Self {
        Self {
            store,
            resolver,
            registry,
            refresh_margin_secs,
        }
    }

    /// Credentials for `platform`, refreshed if they expire within the margin.
    ///
    /// A failed refresh falls back to the stored token while it is still
    /// valid; an expired token that cannot be renewed is an authentication
    /// error.
    ///
    /// # Errors
    ///
    /// Returns `PlatformError::Authentication` if the tenant has not
    /// connected the platform.
    pub async fn credentials_for(
        &self,
        tenant: &TenantContext,
        platform: PlatformKind,
    ) -> Result<PlatformCredentials> {
        let stored = self
            .store
            .get(&tenant.tenant_id, platform)
            .await?
            .ok_or_else(|| {
                PlatformError::Authentication(format!(
                    "No {} account connected. Connect it from the integrations page first.",
                    platform
                ))
            })?;

        let now = chrono::Utc::now().timestamp();
        if !stored.credentials.needs_refresh(now, self.refresh_margin_secs) {
            return Ok(stored.credentials);
        }

        debug!(
            "{} token for tenant {} expires soon, refreshing",
            platform, tenant.tenant_id
        );
        match self.refresh(tenant, &stored).await {
            Ok(Some(refreshed)) => Ok(refreshed),
            Ok(None) => usable_or_expired(stored.credentials, now, platform),
            Err(e) => {
                warn!(
                    "Refreshing {} token for tenant {} failed: {}",
                    platform, tenant.tenant_id, e
                );
                usable_or_expired(stored.credentials, now, platform)
            }
        }
    }

    async fn refresh(
        &self,
        tenant: &TenantContext,
        stored: &Credential,
    ) -> Result<Option<PlatformCredentials>> {
        let Some(app) = self
            .resolver
            .resolve(stored.platform.app_key(), tenant.reseller_id.as_deref())
            .await?
        else {
            return Ok(None);
        };

        let adapter = self.registry.get(stored.platform)?;
        let Some(refreshed) = adapter.refresh(&app, &stored.credentials).await? else {
            return Ok(None);
        };

        let mut updated = stored.clone();
        updated.credentials = refreshed.clone();
        updated.updated_at = chrono::Utc::now().timestamp();
        self.store.upsert(&updated).await?;

        info!(
            "Refreshed {} token for tenant {}",
            stored.platform, tenant.tenant_id
        );
        Ok(Some(refreshed))
    }
}

fn usable_or_expired(
    credentials: PlatformCredentials,
    now: i64,
    platform: PlatformKind,
) -> Result<PlatformCredentials> {
    match credentials.expires_at() {
        Some(expires_at) if expires_at <= now => Err(PlatformError::Authentication(format!(
            "The {} token has expired. Reconnect the account.",
            platform
        ))
        .into()),
        _ => Ok(credentials),
    }
}
