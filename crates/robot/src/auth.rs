//! OAuth2 access token for the enterprise robot API.
//!
//! A token is only trusted within the run that fetched it: every run calls
//! [`TokenManager::acquire`] once and lends the result to each item.

use std::time::Duration;

use {
    chrono::{DateTime, Utc},
    dingbot_config::EnterpriseRobotCredentials,
    secrecy::{ExposeSecret, Secret},
    serde::{Deserialize, Serialize},
    tracing::{Instrument, debug, info_span},
};

use crate::error::{Error, Result};

/// Platform default lifetime when `expireIn` is missing.
const DEFAULT_TTL_SECS: u64 = 7200;

/// A bearer token for the enterprise API.
#[derive(Clone)]
pub struct AccessToken {
    value: Secret<String>,
    acquired_at: DateTime<Utc>,
    expires_in: Duration,
}

impl AccessToken {
    #[must_use]
    pub fn new(value: impl Into<String>, expires_in: Duration) -> Self {
        Self {
            value: Secret::new(value.into()),
            acquired_at: Utc::now(),
            expires_in,
        }
    }

    #[must_use]
    pub fn expose(&self) -> &str {
        self.value.expose_secret()
    }

    #[must_use]
    pub fn acquired_at(&self) -> DateTime<Utc> {
        self.acquired_at
    }

    /// Lifetime the platform reported at acquisition.
    #[must_use]
    pub fn expires_in(&self) -> Duration {
        self.expires_in
    }
}

impl std::fmt::Debug for AccessToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AccessToken")
            .field("value", &"[REDACTED]")
            .field("acquired_at", &self.acquired_at)
            .field("expires_in", &self.expires_in)
            .finish()
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct TokenRequest<'a> {
    app_key: &'a str,
    app_secret: &'a str,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TokenResponse {
    #[serde(default)]
    access_token: Option<String>,
    #[serde(default)]
    expire_in: Option<u64>,
}

/// Fetches enterprise access tokens. Holds no token itself.
pub struct TokenManager {
    http: reqwest::Client,
    token_url: String,
    app_key: String,
    app_secret: Secret<String>,
    region_id: String,
}

impl TokenManager {
    #[must_use]
    pub fn new(
        http: reqwest::Client,
        api_base_url: &str,
        credentials: &EnterpriseRobotCredentials,
    ) -> Self {
        Self {
            http,
            token_url: format!(
                "{}/v1.0/oauth2/accessToken",
                api_base_url.trim_end_matches('/')
            ),
            app_key: credentials.access_key_id.clone(),
            app_secret: credentials.access_key_secret.clone(),
            region_id: credentials.region_id.clone(),
        }
    }

    /// Fetch a new token from the OAuth2 endpoint.
    pub async fn acquire(&self) -> Result<AccessToken> {
        let span = info_span!("token_request", region_id = %self.region_id);
        self.fetch().instrument(span).await
    }

    async fn fetch(&self) -> Result<AccessToken> {
        let resp = self
            .http
            .post(&self.token_url)
            .json(&TokenRequest {
                app_key: &self.app_key,
                app_secret: self.app_secret.expose_secret(),
            })
            .send()
            .await
            .map_err(|e| Error::transport("access token request", e))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            return Err(Error::auth(format!("HTTP {status}: {body}")));
        }

        let body: TokenResponse = resp
            .json()
            .await
            .map_err(|e| Error::auth(format!("unreadable token response: {e}")))?;
        let value = body
            .access_token
            .filter(|t| !t.is_empty())
            .ok_or_else(|| Error::auth("response carried no accessToken"))?;
        let ttl = body.expire_in.unwrap_or(DEFAULT_TTL_SECS);
        debug!(expire_in = ttl, "access token acquired");
        Ok(AccessToken::new(value, Duration::from_secs(ttl)))
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use {super::*, mockito::Matcher, serde_json::json};

    fn manager(server: &mockito::Server) -> TokenManager {
        TokenManager::new(
            reqwest::Client::new(),
            &server.url(),
            &EnterpriseRobotCredentials::new("dingrobot", "app-key", "app-secret"),
        )
    }

    #[tokio::test]
    async fn acquire_posts_app_credentials() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/v1.0/oauth2/accessToken")
            .match_body(Matcher::Json(json!({"appKey": "app-key", "appSecret": "app-secret"})))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(json!({"accessToken": "tok-1", "expireIn": 7200}).to_string())
            .create_async()
            .await;

        let token = manager(&server).acquire().await.unwrap();
        assert_eq!(token.expose(), "tok-1");
        assert!(token.acquired_at() <= Utc::now());
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn every_acquire_fetches() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/v1.0/oauth2/accessToken")
            .with_status(200)
            .with_body(json!({"accessToken": "tok-1", "expireIn": 7200}).to_string())
            .expect(2)
            .create_async()
            .await;

        let tokens = manager(&server);
        tokens.acquire().await.unwrap();
        tokens.acquire().await.unwrap();
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn missing_expire_in_uses_platform_default() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/v1.0/oauth2/accessToken")
            .with_status(200)
            .with_body(json!({"accessToken": "tok"}).to_string())
            .create_async()
            .await;

        let token = manager(&server).acquire().await.unwrap();
        assert_eq!(token.expires_in(), Duration::from_secs(7200));
    }

    #[tokio::test]
    async fn rejection_is_auth_error() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/v1.0/oauth2/accessToken")
            .with_status(400)
            .with_body(r#"{"code":"invalidClientSecret"}"#)
            .create_async()
            .await;

        let err = manager(&server).acquire().await.unwrap_err();
        assert!(matches!(err, Error::Auth { .. }));
        assert!(err.to_string().contains("invalidClientSecret"));
    }

    #[tokio::test]
    async fn missing_token_field_is_auth_error() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/v1.0/oauth2/accessToken")
            .with_status(200)
            .with_body(json!({"expireIn": 7200}).to_string())
            .create_async()
            .await;

        let err = manager(&server).acquire().await.unwrap_err();
        assert!(matches!(err, Error::Auth { .. }));
    }

    #[test]
    fn debug_hides_value() {
        let token = AccessToken::new("super-secret", Duration::from_secs(60));
        assert!(!format!("{token:?}").contains("super-secret"));
    }
}
