//! Usage: OAuth2 credentials from configuration and the cached access-token provider.

pub(crate) mod token_exchange;

use crate::shared::error::AppResult;
use crate::shared::time::now_unix_seconds;
use token_exchange::{refresh_access_token, OAuthTokenSet, TokenRefreshRequest};
use tokio::sync::Mutex;
use tokio::time::Duration;

pub(crate) const GOOGLE_AUTH_URL: &str = "https://accounts.google.com/o/oauth2/v2/auth";
pub(crate) const GOOGLE_TOKEN_URL: &str = "https://oauth2.googleapis.com/token";
pub(crate) const SHEETS_SCOPE: &str = "https://www.googleapis.com/auth/spreadsheets";

const ENV_CLIENT_ID: &str = "SHEETLINK_CLIENT_ID";
const ENV_CLIENT_SECRET: &str = "SHEETLINK_CLIENT_SECRET";
const ENV_REFRESH_TOKEN: &str = "SHEETLINK_REFRESH_TOKEN";

/// Refresh slightly ahead of expiry so in-flight requests never carry a stale token.
const ACCESS_TOKEN_REFRESH_LEAD_SECS: i64 = 60;
const REFRESH_LINEAR_RETRY_MAX_ATTEMPTS: u32 = 3;
const REFRESH_LINEAR_RETRY_BASE_DELAY_SECS: u64 = 2;

/// OAuth2 client credentials plus the long-lived refresh token.
#[derive(Debug, Clone)]
pub struct Credentials {
    pub client_id: String,
    pub client_secret: String,
    pub refresh_token: String,
}

fn require_env(key: &'static str) -> AppResult<String> {
    std::env::var(key)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .ok_or_else(|| format!("SEC_INVALID_INPUT: missing or empty env var {key}").into())
}

impl Credentials {
    /// Read `SHEETLINK_CLIENT_ID` / `SHEETLINK_CLIENT_SECRET` /
    /// `SHEETLINK_REFRESH_TOKEN` from the environment.
    pub fn from_env() -> AppResult<Self> {
        Ok(Self {
            client_id: require_env(ENV_CLIENT_ID)?,
            client_secret: require_env(ENV_CLIENT_SECRET)?,
            refresh_token: require_env(ENV_REFRESH_TOKEN)?,
        })
    }

    /// Client id/secret only, for the interactive login flow (no refresh token yet).
    pub fn client_from_env() -> AppResult<(String, String)> {
        Ok((require_env(ENV_CLIENT_ID)?, require_env(ENV_CLIENT_SECRET)?))
    }
}

#[derive(Debug, Clone)]
struct CachedAccessToken {
    access_token: String,
    expires_at: Option<i64>,
}

/// Exchanges the refresh token for short-lived access tokens and caches the
/// result until it nears expiry.
#[derive(Debug)]
pub struct TokenProvider {
    credentials: Credentials,
    token_url: String,
    cached: Mutex<Option<CachedAccessToken>>,
}

pub(crate) fn should_refresh_now(
    expires_at: Option<i64>,
    refresh_lead_s: i64,
    now_unix: i64,
) -> bool {
    let Some(expiry) = expires_at else {
        return false;
    };
    let lead = refresh_lead_s.max(0);
    expiry.saturating_sub(lead) <= now_unix
}

impl TokenProvider {
    pub fn new(credentials: Credentials) -> Self {
        Self {
            credentials,
            token_url: GOOGLE_TOKEN_URL.to_string(),
            cached: Mutex::new(None),
        }
    }

    /// Redirect the token endpoint (tests only). Drops any cached token.
    pub(crate) fn with_token_url(self, token_url: &str) -> AppResult<Self> {
        let token_url = token_url.trim();
        reqwest::Url::parse(token_url)
            .map_err(|e| format!("SEC_INVALID_INPUT: invalid token url: {e}"))?;
        Ok(Self {
            credentials: self.credentials,
            token_url: token_url.to_string(),
            cached: Mutex::new(None),
        })
    }

    /// Return a fresh access token, refreshing through the token endpoint when
    /// the cached one is missing or inside the refresh lead window.
    pub async fn access_token(&self, client: &reqwest::Client) -> AppResult<String> {
        let mut cached = self.cached.lock().await;
        let now = now_unix_seconds();
        if let Some(token) = cached.as_ref() {
            if !should_refresh_now(token.expires_at, ACCESS_TOKEN_REFRESH_LEAD_SECS, now) {
                return Ok(token.access_token.clone());
            }
        }

        let tokens = self
            .refresh_with_linear_retry(client, REFRESH_LINEAR_RETRY_MAX_ATTEMPTS)
            .await?;
        let access_token = tokens.access_token.clone();
        *cached = Some(CachedAccessToken {
            access_token: tokens.access_token,
            expires_at: tokens.expires_at,
        });
        Ok(access_token)
    }

    async fn refresh_with_linear_retry(
        &self,
        client: &reqwest::Client,
        max_attempts: u32,
    ) -> AppResult<OAuthTokenSet> {
        let request = TokenRefreshRequest {
            token_uri: self.token_url.clone(),
            client_id: self.credentials.client_id.clone(),
            client_secret: Some(self.credentials.client_secret.clone()),
            refresh_token: self.credentials.refresh_token.clone(),
        };

        let max_attempts = max_attempts.max(1);
        for attempt in 1..=max_attempts {
            match refresh_access_token(client, &request).await {
                Ok(tokens) => return Ok(tokens),
                // Re-auth errors will not heal on retry.
                Err(err) if err.code() == "AUTH_RELOGIN_REQUIRED" => return Err(err),
                Err(err) if attempt < max_attempts => {
                    let delay_secs = REFRESH_LINEAR_RETRY_BASE_DELAY_SECS * attempt as u64;
                    tracing::warn!(
                        attempt = attempt,
                        max_attempts = max_attempts,
                        delay_secs = delay_secs,
                        "access token refresh failed; retrying: {}",
                        err
                    );
                    tokio::time::sleep(Duration::from_secs(delay_secs)).await;
                }
                Err(err) => return Err(err),
            }
        }

        unreachable!("max_attempts is always >= 1, so the loop always returns")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn should_refresh_now_handles_unknown_expiry() {
        assert!(!should_refresh_now(None, 60, 1000));
    }

    #[test]
    fn should_refresh_now_respects_refresh_lead_window() {
        assert!(!should_refresh_now(Some(2000), 60, 1900));
        assert!(should_refresh_now(Some(2000), 60, 1940));
        assert!(should_refresh_now(Some(2000), 60, 2500));
    }

    #[test]
    fn negative_lead_is_clamped_to_zero() {
        assert!(!should_refresh_now(Some(2000), -10, 1999));
        assert!(should_refresh_now(Some(2000), -10, 2000));
    }
}
