//! Auth module: refreshable bearer token cache.
//!
//!   get_token()
//!        ↓ cached token and now < expiry → reuse
//!        ↓ otherwise POST credentials to the auth endpoint
//!   { "access_token": "...", "expires_in": 3600 }
//!        ↓ expiry = fetch time + expires_in − 60s
//!   cached until the early-refresh deadline
//!
//! Properties:
//! - One cache per client; never shared across worker processes
//! - No internal retry: a failed fetch abandons the caller's tick
//! - A 401 from the endpoint lets the client drop the token early
//! - Token text is zeroized when replaced or dropped, and never logged whole

use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{error, info};
use zeroize::Zeroize;

use crate::config::AuthConfig;
use crate::transport::{HttpRequest, Transport, TransportError};

pub const DEFAULT_EXPIRES_IN_SECS: u64 = 3600;
/// Tokens are refreshed this long before their literal expiry.
pub const REFRESH_MARGIN: Duration = Duration::from_secs(60);
pub const AUTH_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("auth endpoint unreachable: {0}")]
    Transport(#[from] TransportError),
    #[error("auth endpoint returned {status}: {body}")]
    Rejected { status: u16, body: String },
    #[error("auth response is not usable: {0}")]
    MalformedResponse(String),
}

// ── Token ───────────────────────────────────────────────────────────

#[derive(Clone)]
pub struct Token {
    value: String,
    /// Monotonic refresh deadline.
    expiry: Instant,
    /// Wall-clock equivalent of `expiry`, for logs.
    expires_at: DateTime<Utc>,
}

impl Token {
    pub fn new(value: impl Into<String>, lifetime: Duration) -> Self {
        let expiry = Instant::now() + lifetime;
        let expires_at = Utc::now()
            + chrono::Duration::from_std(lifetime).unwrap_or_else(|_| chrono::Duration::zero());
        Self {
            value: value.into(),
            expiry,
            expires_at,
        }
    }

    pub fn value(&self) -> &str {
        &self.value
    }

    pub fn is_valid_at(&self, now: Instant) -> bool {
        now < self.expiry
    }

    pub fn is_valid(&self) -> bool {
        self.is_valid_at(Instant::now())
    }

    pub fn expires_at(&self) -> DateTime<Utc> {
        self.expires_at
    }

    /// `Authorization` header value.
    pub fn bearer(&self) -> String {
        format!("Bearer {}", self.value)
    }

    /// Loggable form: "abcd...wxyz".
    pub fn obfuscated(&self) -> String {
        obfuscate(&self.value)
    }
}

impl fmt::Debug for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Token")
            .field("value", &self.obfuscated())
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

impl Drop for Token {
    fn drop(&mut self) {
        self.value.zeroize();
    }
}

/// Obfuscate a secret for display: "abc123def456" → "abc1...f456"
pub fn obfuscate(secret: &str) -> String {
    let chars: Vec<char> = secret.chars().collect();
    if chars.len() <= 8 {
        let head: String = chars.iter().take(chars.len().min(4) / 2).collect();
        return format!("{head}...");
    }
    let head: String = chars[..4].iter().collect();
    let tail: String = chars[chars.len() - 4..].iter().collect();
    format!("{head}...{tail}")
}

// ── Cache ───────────────────────────────────────────────────────────

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    expires_in: Option<u64>,
}

pub struct TokenCache {
    auth: AuthConfig,
    transport: Arc<dyn Transport>,
    token: Option<Token>,
}

impl TokenCache {
    pub fn new(auth: AuthConfig, transport: Arc<dyn Transport>) -> Self {
        Self {
            auth,
            transport,
            token: None,
        }
    }

    /// Return the cached token, fetching a new one if it is missing or past
    /// its refresh deadline.
    pub async fn get_token(&mut self) -> Result<Token, AuthError> {
        if let Some(token) = &self.token {
            if token.is_valid() {
                return Ok(token.clone());
            }
        }

        info!(auth_url = %self.auth.url, "Issuing a new token");
        let token = self.fetch_token().await?;
        self.token = Some(token.clone());
        Ok(token)
    }

    /// Forget the cached token so the next call fetches a fresh one.
    pub fn invalidate(&mut self) {
        if self.token.take().is_some() {
            info!("Cached token invalidated");
        }
    }

    pub fn cached(&self) -> Option<&Token> {
        self.token.as_ref()
    }

    async fn fetch_token(&self) -> Result<Token, AuthError> {
        let req = HttpRequest::post_json(&self.auth.url, self.auth.credentials.clone(), AUTH_TIMEOUT);
        let resp = self.transport.send(&req).await.map_err(|e| {
            error!(error = %e, "Failed to reach auth endpoint");
            AuthError::from(e)
        })?;

        if resp.status != 200 {
            error!(status = resp.status, body = %resp.body, "Failed to fetch token");
            return Err(AuthError::Rejected {
                status: resp.status,
                body: resp.body,
            });
        }

        let parsed: TokenResponse = serde_json::from_str(&resp.body)
            .map_err(|e| AuthError::MalformedResponse(e.to_string()))?;
        if parsed.access_token.is_empty() {
            return Err(AuthError::MalformedResponse("access_token is empty".into()));
        }

        let expires_in = Duration::from_secs(parsed.expires_in.unwrap_or(DEFAULT_EXPIRES_IN_SECS));
        let token = Token::new(parsed.access_token, expires_in.saturating_sub(REFRESH_MARGIN));

        info!(
            token = %token.obfuscated(),
            expires_at = %token.expires_at().to_rfc3339(),
            "Token refreshed successfully"
        );
        Ok(token)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::testing::ScriptedTransport;
    use serde_json::json;

    const AUTH_URL: &str = "http://auth.local/token";

    fn cache(transport: &Arc<ScriptedTransport>) -> TokenCache {
        let auth = AuthConfig {
            url: AUTH_URL.into(),
            credentials: json!({"client_id": "svc", "secret": "s3cr3t"}),
        };
        TokenCache::new(auth, transport.clone())
    }

    #[tokio::test(start_paused = true)]
    async fn test_token_reused_until_refresh_margin() {
        let transport = Arc::new(ScriptedTransport::new());
        transport
            .respond(AUTH_URL, 200, r#"{"access_token": "first-token-0001", "expires_in": 3600}"#)
            .respond(AUTH_URL, 200, r#"{"access_token": "second-token-002", "expires_in": 3600}"#);
        let mut tokens = cache(&transport);

        assert_eq!(tokens.get_token().await.unwrap().value(), "first-token-0001");

        tokio::time::advance(Duration::from_secs(3539)).await;
        assert_eq!(tokens.get_token().await.unwrap().value(), "first-token-0001");
        assert_eq!(transport.requests_to(AUTH_URL).len(), 1);

        tokio::time::advance(Duration::from_secs(2)).await;
        assert_eq!(tokens.get_token().await.unwrap().value(), "second-token-002");
        assert_eq!(transport.requests_to(AUTH_URL).len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_expires_in_defaults_to_an_hour() {
        let transport = Arc::new(ScriptedTransport::new());
        transport.respond_always(AUTH_URL, 200, r#"{"access_token": "tok"}"#);
        let mut tokens = cache(&transport);

        tokens.get_token().await.unwrap();
        tokio::time::advance(Duration::from_secs(3539)).await;
        assert!(tokens.cached().unwrap().is_valid());
        tokio::time::advance(Duration::from_secs(1)).await;
        assert!(!tokens.cached().unwrap().is_valid());
    }

    #[tokio::test(start_paused = true)]
    async fn test_credentials_are_posted_as_json() {
        let transport = Arc::new(ScriptedTransport::new());
        transport.respond(AUTH_URL, 200, r#"{"access_token": "tok"}"#);
        let mut tokens = cache(&transport);
        tokens.get_token().await.unwrap();

        let sent = &transport.requests_to(AUTH_URL)[0].request;
        assert_eq!(sent.method, crate::config::HttpMethod::Post);
        assert_eq!(sent.body, Some(json!({"client_id": "svc", "secret": "s3cr3t"})));
        assert_eq!(sent.timeout, AUTH_TIMEOUT);
    }

    #[tokio::test(start_paused = true)]
    async fn test_non_200_is_rejected() {
        let transport = Arc::new(ScriptedTransport::new());
        transport.respond(AUTH_URL, 401, "bad credentials");
        let mut tokens = cache(&transport);

        let err = tokens.get_token().await.unwrap_err();
        assert!(matches!(err, AuthError::Rejected { status: 401, .. }));
        assert!(tokens.cached().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_missing_access_token_is_malformed() {
        let transport = Arc::new(ScriptedTransport::new());
        transport
            .respond(AUTH_URL, 200, r#"{"token": "wrong-field"}"#)
            .respond(AUTH_URL, 200, r#"{"access_token": ""}"#);
        let mut tokens = cache(&transport);

        assert!(matches!(tokens.get_token().await, Err(AuthError::MalformedResponse(_))));
        assert!(matches!(tokens.get_token().await, Err(AuthError::MalformedResponse(_))));
    }

    #[tokio::test(start_paused = true)]
    async fn test_transport_failure_is_not_retried() {
        let transport = Arc::new(ScriptedTransport::new());
        transport.fail(AUTH_URL, TransportError::Connect("refused".into()));
        let mut tokens = cache(&transport);

        assert!(matches!(tokens.get_token().await, Err(AuthError::Transport(_))));
        assert_eq!(transport.requests_to(AUTH_URL).len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_invalidate_forces_refresh() {
        let transport = Arc::new(ScriptedTransport::new());
        transport.respond_always(AUTH_URL, 200, r#"{"access_token": "tok"}"#);
        let mut tokens = cache(&transport);

        tokens.get_token().await.unwrap();
        tokens.invalidate();
        tokens.get_token().await.unwrap();
        assert_eq!(transport.requests_to(AUTH_URL).len(), 2);
    }

    #[test]
    fn test_obfuscate() {
        assert_eq!(obfuscate("abcdefghijklmnop"), "abcd...mnop");
        assert_eq!(obfuscate("short"), "sh...");
        assert!(!format!("{:?}", Token::new("abcdefghijklmnop", Duration::from_secs(1))).contains("efgh"));
    }
}
