//! Gmail OAuth2 session
//!
//! Holds the client credentials and refresh token for one connected
//! account, hands out access tokens (refreshing them when close to expiry)
//! and revokes tokens. The interactive consent flow is the caller's job.

use std::sync::Mutex;

use chrono::Utc;
use log::{debug, info};
use serde::Deserialize;
use ureq::Agent;

use super::client::{provider_error_from_body, transport_error};
use crate::config::GmailCredentials;
use crate::error::{ProviderError, ProviderResult};

/// Access token with its expiry (unix seconds)
#[derive(Debug, Clone)]
struct CachedToken {
    access_token: String,
    expires_at: i64,
}

impl CachedToken {
    fn expires_within(&self, secs: i64) -> bool {
        self.expires_at <= Utc::now().timestamp() + secs
    }
}

/// Token response from Google
#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: Option<i64>,
}

/// OAuth2 token management for one Gmail connection
pub struct GmailAuth {
    credentials: GmailCredentials,
    refresh_token: String,
    agent: Agent,
    cached: Mutex<Option<CachedToken>>,
}

impl GmailAuth {
    const TOKEN_URL: &'static str = "https://oauth2.googleapis.com/token";
    const REVOKE_URL: &'static str = "https://oauth2.googleapis.com/revoke";

    /// Tokens are refreshed this many seconds before they expire
    const EXPIRY_BUFFER_SECS: i64 = 300;

    pub fn new(credentials: GmailCredentials, refresh_token: impl Into<String>, agent: Agent) -> Self {
        Self {
            credentials,
            refresh_token: refresh_token.into(),
            agent,
            cached: Mutex::new(None),
        }
    }

    /// Get a valid access token, refreshing if the cached one is near expiry
    ///
    /// The cache lock is held across the refresh, so concurrent callers
    /// wait for one refresh instead of each issuing their own.
    pub fn get_access_token(&self) -> ProviderResult<String> {
        let mut cached = self.cached.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        if let Some(token) = cached.as_ref()
            && !token.expires_within(Self::EXPIRY_BUFFER_SECS)
        {
            return Ok(token.access_token.clone());
        }

        let token = self.refresh_access_token()?;
        let access_token = token.access_token.clone();
        *cached = Some(token);
        Ok(access_token)
    }

    /// Exchange the refresh token for a new access token
    fn refresh_access_token(&self) -> ProviderResult<CachedToken> {
        debug!("Refreshing Gmail access token");
        let mut response = self
            .agent
            .post(Self::TOKEN_URL)
            .send_form([
                ("client_id", self.credentials.client_id.as_str()),
                ("client_secret", self.credentials.client_secret.as_str()),
                ("refresh_token", self.refresh_token.as_str()),
                ("grant_type", "refresh_token"),
            ])
            .map_err(transport_error)?;

        let status = response.status().as_u16();
        if !(200..300).contains(&status) {
            let body = response.body_mut().read_to_string().unwrap_or_default();
            return Err(provider_error_from_body(status, &body));
        }

        let token: TokenResponse = response
            .body_mut()
            .read_json()
            .map_err(|e| ProviderError::malformed(format!("Failed to parse token response: {}", e)))?;

        Ok(CachedToken {
            access_token: token.access_token,
            expires_at: Utc::now().timestamp() + token.expires_in.unwrap_or(3600),
        })
    }

    /// Revoke a refresh or access token
    ///
    /// Returns `Ok(false)` when the endpoint rejects the token (already
    /// revoked or unknown); only transport failures are errors.
    pub fn revoke(&self, token: &str) -> ProviderResult<bool> {
        let response = self
            .agent
            .post(Self::REVOKE_URL)
            .send_form([("token", token)])
            .map_err(transport_error)?;

        let revoked = response.status().is_success();
        info!("Token revocation {}", if revoked { "succeeded" } else { "was refused" });
        if revoked && let Ok(mut guard) = self.cached.lock() {
            *guard = None;
        }
        Ok(revoked)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::thread;

    use super::*;

    fn auth_with_token(expires_in: i64) -> GmailAuth {
        let credentials = GmailCredentials {
            client_id: "id".into(),
            client_secret: "secret".into(),
        };
        let auth = GmailAuth::new(credentials, "refresh", Agent::new_with_defaults());
        *auth.cached.lock().unwrap() = Some(CachedToken {
            access_token: "cached-token".into(),
            expires_at: Utc::now().timestamp() + expires_in,
        });
        auth
    }

    #[test]
    fn test_expiry_buffer() {
        let now = Utc::now().timestamp();
        let token = |expires_at| CachedToken {
            access_token: String::new(),
            expires_at,
        };
        assert!(token(now + 60).expires_within(GmailAuth::EXPIRY_BUFFER_SECS));
        assert!(!token(now + 3600).expires_within(GmailAuth::EXPIRY_BUFFER_SECS));
    }

    #[test]
    fn test_concurrent_callers_share_cached_token() {
        let auth = Arc::new(auth_with_token(3600));
        let handles: Vec<_> = (0..15)
            .map(|_| {
                let auth = auth.clone();
                thread::spawn(move || auth.get_access_token().unwrap())
            })
            .collect();
        for handle in handles {
            assert_eq!(handle.join().unwrap(), "cached-token");
        }
    }
}
