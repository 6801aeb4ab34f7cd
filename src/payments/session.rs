//! Gateway bearer-token lifecycle
//!
//! Tokens are cached per payment-method external id and terminal, see
//! [`token_key`]; the test and production terminals of one method never share
//! a token. Each key owns an async mutex held for the whole check-then-refresh
//! sequence, so concurrent callers for the same key share one in-flight
//! authentication or refresh while other keys proceed independently.
//!
//! ```text
//! Unauthenticated --authenticate--> Authenticated --access expiry--> AccessExpired
//!        ^                                ^                               |
//!        |                                +--------refresh ok-------------+
//!        +---------------refresh failed / refresh expired-----------------+
//! ```

use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex, PoisonError};
use tracing::{debug, info, warn};

use crate::models::TerminalCredentials;
use crate::payments::error::{GatewayError, GatewayResult};
use crate::payments::types::GatewayToken;

/// Issues tokens for a terminal
#[async_trait]
pub trait TokenAuthority: Send + Sync {
    /// Password grant with the terminal credentials
    async fn authenticate(&self, credentials: &TerminalCredentials) -> GatewayResult<GatewayToken>;

    async fn refresh(
        &self,
        credentials: &TerminalCredentials,
        refresh_token: &str,
    ) -> GatewayResult<GatewayToken>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenState {
    Unauthenticated,
    Authenticated,
    AccessExpired,
}

type TokenSlot = Arc<tokio::sync::Mutex<Option<GatewayToken>>>;

/// Session key for a payment method used through a given terminal
pub fn token_key(method_external_id: &str, credentials: &TerminalCredentials) -> String {
    format!("{}:{}", method_external_id, credentials.terminal)
}

#[derive(Default)]
pub struct GatewaySession {
    slots: Mutex<HashMap<String, TokenSlot>>,
}

impl GatewaySession {
    pub fn new() -> Self {
        Self::default()
    }

    fn slot(&self, key: &str) -> TokenSlot {
        let mut slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
        slots.entry(key.to_string()).or_default().clone()
    }

    pub async fn state(&self, key: &str) -> TokenState {
        let slot = self.slot(key);
        let guard = slot.lock().await;
        let now = Utc::now();
        match guard.as_ref() {
            Some(token) if token.access_valid_at(now) => TokenState::Authenticated,
            Some(token) if token.refresh_valid_at(now) => TokenState::AccessExpired,
            _ => TokenState::Unauthenticated,
        }
    }

    pub async fn set_token(&self, key: &str, token: GatewayToken) {
        let slot = self.slot(key);
        *slot.lock().await = Some(token);
    }

    pub async fn invalidate(&self, key: &str) {
        let slot = self.slot(key);
        *slot.lock().await = None;
    }

    /// Marks the access token as expired if it is still the cached one; the
    /// refresh token stays usable
    pub async fn expire_access(&self, key: &str, rejected_access_token: &str) {
        let slot = self.slot(key);
        let mut guard = slot.lock().await;
        if let Some(token) = guard.as_mut() {
            if token.access_token == rejected_access_token {
                token.access_expires_at = Utc::now();
            }
        }
    }

    /// Cached token for the key, refreshing it when only the access token has
    /// expired. `None` means the caller has to authenticate from credentials.
    pub async fn get_token(
        &self,
        key: &str,
        authority: &dyn TokenAuthority,
        credentials: &TerminalCredentials,
    ) -> Option<GatewayToken> {
        let slot = self.slot(key);
        let mut guard = slot.lock().await;
        Self::current_or_refreshed(key, &mut guard, authority, credentials).await
    }

    /// Valid token for the key, authenticating with the terminal password when
    /// nothing usable is cached
    pub async fn token_or_authenticate(
        &self,
        key: &str,
        authority: &dyn TokenAuthority,
        credentials: &TerminalCredentials,
    ) -> GatewayResult<GatewayToken> {
        let slot = self.slot(key);
        let mut guard = slot.lock().await;
        if let Some(token) = Self::current_or_refreshed(key, &mut guard, authority, credentials).await
        {
            return Ok(token);
        }

        let token = authority.authenticate(credentials).await.map_err(|e| {
            warn!(key = %key, error = %e, "Gateway authentication failed");
            match e {
                GatewayError::AuthenticateFailed { .. } => e,
                other => GatewayError::AuthenticateFailed {
                    message: other.to_string(),
                },
            }
        })?;
        info!(key = %key, "Gateway session authenticated");
        *guard = Some(token.clone());
        Ok(token)
    }

    /// Runs `call` with a valid access token. A `GatewayError::Unauthorized`
    /// answer expires the access token and the call is retried exactly once.
    pub async fn with_token<T, F, Fut>(
        &self,
        key: &str,
        authority: &dyn TokenAuthority,
        credentials: &TerminalCredentials,
        call: F,
    ) -> GatewayResult<T>
    where
        F: Fn(String) -> Fut,
        Fut: Future<Output = GatewayResult<T>>,
    {
        let token = self.token_or_authenticate(key, authority, credentials).await?;
        match call(token.access_token.clone()).await {
            Err(GatewayError::Unauthorized) => {
                warn!(key = %key, "Gateway rejected access token, retrying once");
                self.expire_access(key, &token.access_token).await;
                let token = self.token_or_authenticate(key, authority, credentials).await?;
                call(token.access_token).await
            }
            other => other,
        }
    }

    async fn current_or_refreshed(
        key: &str,
        cached: &mut Option<GatewayToken>,
        authority: &dyn TokenAuthority,
        credentials: &TerminalCredentials,
    ) -> Option<GatewayToken> {
        let now = Utc::now();
        let token = cached.as_ref()?;

        if token.access_valid_at(now) {
            return Some(token.clone());
        }
        if !token.refresh_valid_at(now) {
            debug!(key = %key, "Gateway tokens expired");
            *cached = None;
            return None;
        }

        match authority.refresh(credentials, &token.refresh_token).await {
            Ok(fresh) => {
                debug!(key = %key, "Gateway access token refreshed");
                *cached = Some(fresh.clone());
                Some(fresh)
            }
            Err(e) => {
                warn!(key = %key, error = %e, "Gateway token refresh failed");
                *cached = None;
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct CountingAuthority {
        authenticated: AtomicUsize,
        refreshed: AtomicUsize,
        refresh_fails: bool,
    }

    #[async_trait]
    impl TokenAuthority for CountingAuthority {
        async fn authenticate(
            &self,
            _credentials: &TerminalCredentials,
        ) -> GatewayResult<GatewayToken> {
            let n = self.authenticated.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(std::time::Duration::from_millis(20)).await;
            Ok(GatewayToken::issued_now(format!("access-{}", n), "refresh", 300, 3600))
        }

        async fn refresh(
            &self,
            _credentials: &TerminalCredentials,
            _refresh_token: &str,
        ) -> GatewayResult<GatewayToken> {
            self.refreshed.fetch_add(1, Ordering::SeqCst);
            if self.refresh_fails {
                return Err(GatewayError::AuthenticateFailed {
                    message: "refresh rejected".to_string(),
                });
            }
            Ok(GatewayToken::issued_now("refreshed", "refresh-2", 300, 3600))
        }
    }

    fn expired_access() -> GatewayToken {
        let now = Utc::now();
        GatewayToken {
            access_token: "stale".to_string(),
            refresh_token: "refresh".to_string(),
            access_expires_at: now - Duration::seconds(1),
            refresh_expires_at: now + Duration::seconds(600),
        }
    }

    #[tokio::test]
    async fn test_get_token_refreshes_expired_access() {
        let session = GatewaySession::new();
        let authority = CountingAuthority::default();
        let creds = TerminalCredentials::default();

        session.set_token("BANKCARD", expired_access()).await;
        assert_eq!(session.state("BANKCARD").await, TokenState::AccessExpired);

        let token = session.get_token("BANKCARD", &authority, &creds).await.unwrap();
        assert_eq!(token.access_token, "refreshed");
        assert_eq!(session.state("BANKCARD").await, TokenState::Authenticated);
    }

    #[tokio::test]
    async fn test_failed_refresh_returns_none() {
        let session = GatewaySession::new();
        let authority = CountingAuthority {
            refresh_fails: true,
            ..Default::default()
        };
        let creds = TerminalCredentials::default();

        session.set_token("BANKCARD", expired_access()).await;
        assert!(session.get_token("BANKCARD", &authority, &creds).await.is_none());
        assert_eq!(session.state("BANKCARD").await, TokenState::Unauthenticated);
    }

    #[tokio::test]
    async fn test_concurrent_callers_share_one_authentication() {
        let session = Arc::new(GatewaySession::new());
        let authority = Arc::new(CountingAuthority::default());

        let mut handles = Vec::new();
        for _ in 0..8 {
            let session = session.clone();
            let authority = authority.clone();
            handles.push(tokio::spawn(async move {
                session
                    .token_or_authenticate("BANKCARD", authority.as_ref(), &TerminalCredentials::default())
                    .await
                    .unwrap()
            }));
        }
        for handle in handles {
            assert_eq!(handle.await.unwrap().access_token, "access-0");
        }
        assert_eq!(authority.authenticated.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_terminals_of_one_method_hold_separate_tokens() {
        let session = GatewaySession::new();
        let authority = CountingAuthority::default();
        let test_terminal = TerminalCredentials {
            terminal: "T-TEST".to_string(),
            ..Default::default()
        };
        let production_terminal = TerminalCredentials {
            terminal: "T-PROD".to_string(),
            ..Default::default()
        };
        let test_key = token_key("BANKCARD", &test_terminal);
        let production_key = token_key("BANKCARD", &production_terminal);
        assert_ne!(test_key, production_key);

        let first = session
            .token_or_authenticate(&test_key, &authority, &test_terminal)
            .await
            .unwrap();
        let second = session
            .token_or_authenticate(&production_key, &authority, &production_terminal)
            .await
            .unwrap();

        assert_ne!(first.access_token, second.access_token);
        assert_eq!(authority.authenticated.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_unauthorized_call_is_retried_once() {
        let session = GatewaySession::new();
        let authority = CountingAuthority::default();
        let creds = TerminalCredentials::default();
        let calls = AtomicUsize::new(0);

        let result: GatewayResult<String> = session
            .with_token("BANKCARD", &authority, &creds, |token| {
                let attempt = calls.fetch_add(1, Ordering::SeqCst);
                async move {
                    if attempt == 0 {
                        Err(GatewayError::Unauthorized)
                    } else {
                        Ok(token)
                    }
                }
            })
            .await;

        assert_eq!(result.unwrap(), "refreshed");
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(authority.refreshed.load(Ordering::SeqCst), 1);
    }
}
