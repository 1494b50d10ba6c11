//! Credential leasing
//!
//! The endpoint authenticates with a short-lived bearer token fetched from
//! the authentication backend (`GET /token?identity=<id>`). This module owns
//! the current lease: the token, when it was obtained, and when the proactive
//! renewal should run. Exactly one lease is live per endpoint; obtaining a
//! new one replaces the old.
//!
//! The renewal *timer* is not here — it is the controller's named `refresh`
//! slot, which is cancelled and re-armed in one step whenever a lease is
//! obtained, so a replacement can never leave two timers live or a gap with
//! none while a call is active.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::debug;

use crate::error::{ClientError, ClientResult};

/// Wire format of `GET /token?identity=<id>`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenResponse {
    /// The bearer token; its absence is a fatal fetch error
    #[serde(default)]
    pub token: Option<String>,
}

/// Authentication backend collaborator
#[async_trait]
pub trait TokenFetcher: Send + Sync {
    /// Fetch a credential for the given identity
    async fn fetch_token(&self, identity: &str) -> ClientResult<TokenResponse>;
}

/// A live credential plus its renewal schedule
#[derive(Debug, Clone)]
pub struct CredentialLease {
    /// Opaque bearer token
    pub token: String,
    /// When the token was fetched
    pub obtained_at: DateTime<Utc>,
    /// When the proactive renewal should run
    pub renew_at: DateTime<Utc>,
}

/// Owns the current credential lease for the endpoint
pub struct TokenLeaseManager {
    fetcher: Arc<dyn TokenFetcher>,
    credential_ttl: Duration,
    refresh_lead: Duration,
    lease: RwLock<Option<CredentialLease>>,
}

impl TokenLeaseManager {
    /// Create a manager over an authentication backend
    ///
    /// `credential_ttl` is the assumed natural lifetime of a fetched token;
    /// `refresh_lead` is how far before expiry the renewal runs.
    pub fn new(fetcher: Arc<dyn TokenFetcher>, credential_ttl: Duration, refresh_lead: Duration) -> Self {
        Self {
            fetcher,
            credential_ttl,
            refresh_lead,
            lease: RwLock::new(None),
        }
    }

    /// Fetch a fresh credential and install it as the current lease
    ///
    /// A response without a token (or with an empty one) is a fatal fetch
    /// error. The previous lease, if any, is replaced.
    pub async fn obtain(&self, identity: &str) -> ClientResult<CredentialLease> {
        let response = self
            .fetcher
            .fetch_token(identity)
            .await
            .map_err(|e| ClientError::AuthFetchFailed {
                reason: e.to_string(),
            })?;

        let token = match response.token {
            Some(token) if !token.is_empty() => token,
            _ => {
                return Err(ClientError::AuthFetchFailed {
                    reason: "response contained no token".to_string(),
                })
            }
        };

        let obtained_at = Utc::now();
        let renew_in = chrono::Duration::from_std(self.refresh_delay())
            .unwrap_or_else(|_| chrono::Duration::zero());
        let lease = CredentialLease {
            token,
            obtained_at,
            renew_at: obtained_at + renew_in,
        };

        debug!(renew_at = %lease.renew_at, "Obtained credential lease");
        *self.lease.write().await = Some(lease.clone());
        Ok(lease)
    }

    /// Delay from lease acquisition until the proactive renewal
    pub fn refresh_delay(&self) -> Duration {
        self.credential_ttl.saturating_sub(self.refresh_lead)
    }

    /// The current lease, if one is installed
    pub async fn current(&self) -> Option<CredentialLease> {
        self.lease.read().await.clone()
    }

    /// Drop the current lease
    pub async fn clear(&self) {
        *self.lease.write().await = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct StaticFetcher {
        response: ClientResult<TokenResponse>,
    }

    #[async_trait]
    impl TokenFetcher for StaticFetcher {
        async fn fetch_token(&self, _identity: &str) -> ClientResult<TokenResponse> {
            self.response.clone()
        }
    }

    fn manager(response: ClientResult<TokenResponse>) -> TokenLeaseManager {
        TokenLeaseManager::new(
            Arc::new(StaticFetcher { response }),
            Duration::from_secs(24 * 60 * 60),
            Duration::from_secs(20 * 60),
        )
    }

    #[test]
    fn token_wire_format_tolerates_absent_token() {
        let present: TokenResponse = serde_json::from_str(r#"{"token":"eyJhbGciOi"}"#).unwrap();
        assert_eq!(present.token.as_deref(), Some("eyJhbGciOi"));

        let absent: TokenResponse = serde_json::from_str("{}").unwrap();
        assert!(absent.token.is_none());
    }

    #[tokio::test]
    async fn obtain_installs_a_lease_with_renewal_lead() {
        let manager = manager(Ok(TokenResponse {
            token: Some("jwt".to_string()),
        }));

        let lease = manager.obtain("agent:42").await.unwrap();
        assert_eq!(lease.token, "jwt");
        let scheduled = (lease.renew_at - lease.obtained_at)
            .to_std()
            .unwrap();
        assert_eq!(scheduled, Duration::from_secs(24 * 60 * 60 - 20 * 60));
        assert!(manager.current().await.is_some());
    }

    #[tokio::test]
    async fn missing_token_is_a_fatal_fetch_error() {
        let absent = manager(Ok(TokenResponse { token: None }));
        assert!(matches!(
            absent.obtain("agent:42").await,
            Err(ClientError::AuthFetchFailed { .. })
        ));

        let empty = manager(Ok(TokenResponse {
            token: Some(String::new()),
        }));
        assert!(matches!(
            empty.obtain("agent:42").await,
            Err(ClientError::AuthFetchFailed { .. })
        ));
        assert!(empty.current().await.is_none());
    }

    #[tokio::test]
    async fn fetch_errors_map_to_auth_fetch_failed() {
        let manager = manager(Err(ClientError::NetworkError {
            reason: "dns".to_string(),
        }));
        let err = manager.obtain("agent:42").await.unwrap_err();
        assert!(matches!(err, ClientError::AuthFetchFailed { .. }));
        assert!(err.is_recoverable());
    }

    #[tokio::test]
    async fn obtaining_replaces_the_previous_lease() {
        let manager = manager(Ok(TokenResponse {
            token: Some("jwt-2".to_string()),
        }));
        manager.obtain("agent:42").await.unwrap();
        let second = manager.obtain("agent:42").await.unwrap();
        assert_eq!(manager.current().await.unwrap().token, second.token);
        manager.clear().await;
        assert!(manager.current().await.is_none());
    }
}
