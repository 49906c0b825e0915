//! Signed OAuth `state` parameter
//!
//! The state carries the tenant through the provider redirect. It is
//! `base64url(json) "." base64url(hmac_sha256(json))` and expires after a
//! configurable TTL, so a callback can only complete a flow this server
//! started recently.

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use thiserror::Error;

use crate::error::{ConfigError, OmnicastError, Result};
use crate::types::{PlatformKind, TenantContext};

type HmacSha256 = Hmac<Sha256>;

/// Payload round-tripped through the provider
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OAuthState {
    /// Platform whose authorize redirect issued this state
    pub platform: PlatformKind,
    pub tenant_id: String,
    pub reseller_id: Option<String>,
    pub user_id: String,
    pub issued_at: i64,
    pub nonce: String,
}

impl OAuthState {
    pub fn new(tenant: &TenantContext, platform: PlatformKind, issued_at: i64) -> Self {
        let nonce: [u8; 16] = rand::random();
        Self {
            platform,
            tenant_id: tenant.tenant_id.clone(),
            reseller_id: tenant.reseller_id.clone(),
            user_id: tenant.user_id.clone(),
            issued_at,
            nonce: URL_SAFE_NO_PAD.encode(nonce),
        }
    }

    pub fn tenant(&self) -> TenantContext {
        TenantContext {
            tenant_id: self.tenant_id.clone(),
            user_id: self.user_id.clone(),
            reseller_id: self.reseller_id.clone(),
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StateError {
    #[error("state is malformed")]
    Malformed,

    #[error("state signature does not match")]
    BadSignature,

    #[error("state expired")]
    Expired,

    #[error("state was issued for {0}")]
    WrongPlatform(PlatformKind),
}

/// Signs and verifies [`OAuthState`] values
#[derive(Clone)]
pub struct StateSigner {
    mac: HmacSha256,
    ttl_secs: i64,
}

impl std::fmt::Debug for StateSigner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StateSigner")
            .field("ttl_secs", &self.ttl_secs)
            .finish_non_exhaustive()
    }
}

impl StateSigner {
    pub fn new(secret: impl AsRef<[u8]>, ttl_secs: i64) -> Result<Self> {
        let secret = secret.as_ref();
        if secret.is_empty() {
            return Err(ConfigError::MissingField("security.state_secret".to_string()).into());
        }
        let mac = HmacSha256::new_from_slice(secret)
            .map_err(|e| OmnicastError::InvalidInput(format!("state secret: {}", e)))?;
        Ok(Self { mac, ttl_secs })
    }

    pub fn encode(&self, state: &OAuthState) -> String {
        // Serializing a struct of strings and integers cannot fail
        let json = serde_json::to_vec(state).unwrap_or_default();
        let mut mac = self.mac.clone();
        mac.update(&json);
        let signature = mac.finalize().into_bytes();

        format!(
            "{}.{}",
            URL_SAFE_NO_PAD.encode(&json),
            URL_SAFE_NO_PAD.encode(signature)
        )
    }

    /// Verify the signature and age of an encoded state
    pub fn decode(&self, encoded: &str, now: i64) -> std::result::Result<OAuthState, StateError> {
        let (payload, signature) = encoded.split_once('.').ok_or(StateError::Malformed)?;
        let json = URL_SAFE_NO_PAD
            .decode(payload)
            .map_err(|_| StateError::Malformed)?;
        let signature = URL_SAFE_NO_PAD
            .decode(signature)
            .map_err(|_| StateError::Malformed)?;

        let mut mac = self.mac.clone();
        mac.update(&json);
        mac.verify_slice(&signature)
            .map_err(|_| StateError::BadSignature)?;

        let state: OAuthState = serde_json::from_slice(&json).map_err(|_| StateError::Malformed)?;

        if now - state.issued_at > self.ttl_secs || state.issued_at - now > 60 {
            return Err(StateError::Expired);
        }

        Ok(state)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tenant() -> TenantContext {
        TenantContext::for_user("user-1", Some("reseller-9".to_string()))
    }

    #[test]
    fn test_state_round_trip() {
        let signer = StateSigner::new("secret", 600).unwrap();
        let state = OAuthState::new(&tenant(), PlatformKind::LinkedIn, 1_000);
        let encoded = signer.encode(&state);

        let decoded = signer.decode(&encoded, 1_100).unwrap();
        assert_eq!(decoded, state);
        assert_eq!(decoded.tenant(), tenant());
    }

    #[test]
    fn test_nonces_differ() {
        let a = OAuthState::new(&tenant(), PlatformKind::LinkedIn, 0);
        let b = OAuthState::new(&tenant(), PlatformKind::LinkedIn, 0);
        assert_ne!(a.nonce, b.nonce);
    }

    #[test]
    fn test_tampered_payload_is_rejected() {
        let signer = StateSigner::new("secret", 600).unwrap();
        let encoded = signer.encode(&OAuthState::new(&tenant(), PlatformKind::LinkedIn, 1_000));
        let (_, signature) = encoded.split_once('.').unwrap();

        let mut forged = OAuthState::new(&tenant(), PlatformKind::LinkedIn, 1_000);
        forged.tenant_id = "someone-else".to_string();
        let forged_payload = URL_SAFE_NO_PAD.encode(serde_json::to_vec(&forged).unwrap());

        let err = signer
            .decode(&format!("{}.{}", forged_payload, signature), 1_000)
            .unwrap_err();
        assert_eq!(err, StateError::BadSignature);
    }

    #[test]
    fn test_other_key_is_rejected() {
        let encoded = StateSigner::new("secret", 600).unwrap().encode(&OAuthState::new(&tenant(), PlatformKind::LinkedIn, 0));
        let err = StateSigner::new("other", 600).unwrap()
            .decode(&encoded, 0)
            .unwrap_err();
        assert_eq!(err, StateError::BadSignature);
    }

    #[test]
    fn test_expired_state_is_rejected() {
        let signer = StateSigner::new("secret", 600).unwrap();
        let encoded = signer.encode(&OAuthState::new(&tenant(), PlatformKind::LinkedIn, 1_000));
        assert!(signer.decode(&encoded, 1_600).is_ok());
        assert_eq!(signer.decode(&encoded, 1_601).unwrap_err(), StateError::Expired);
    }

    #[test]
    fn test_empty_secret_is_a_config_error() {
        let err = StateSigner::new("", 600).unwrap_err();
        assert!(err.is_not_configured());
    }

    #[test]
    fn test_unsigned_legacy_state_is_malformed() {
        let signer = StateSigner::new("secret", 600).unwrap();
        let legacy = URL_SAFE_NO_PAD.encode(r#"{"tenantId":"t","resellerId":null}"#);
        assert_eq!(signer.decode(&legacy, 0).unwrap_err(), StateError::Malformed);
        assert_eq!(signer.decode("a.b.c", 0).unwrap_err(), StateError::Malformed);
    }
}
