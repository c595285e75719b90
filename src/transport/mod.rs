//! HTTP transport seam: "send a request, get status + body, or fail".
//!
//! The polling client and the token cache never touch reqwest directly.
//! They build an [`HttpRequest`] and hand it to a [`Transport`]; the
//! retry layer only ever sees an [`HttpResponse`] or a [`TransportError`].

use async_trait::async_trait;
use serde_json::Value;
use std::collections::BTreeMap;
use std::time::Duration;

use crate::config::HttpMethod;

pub mod http_client;

#[cfg(test)]
pub(crate) mod testing;

pub use http_client::ReqwestTransport;

// ── Core Types ──────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
pub struct HttpRequest {
    pub method: HttpMethod,
    pub url: String,
    pub headers: BTreeMap<String, String>,
    /// JSON body; `None` sends no body.
    pub body: Option<Value>,
    /// Upper bound for this single attempt, connect through body read.
    pub timeout: Duration,
}

impl HttpRequest {
    pub fn get(url: impl Into<String>, timeout: Duration) -> Self {
        Self {
            method: HttpMethod::Get,
            url: url.into(),
            headers: BTreeMap::new(),
            body: None,
            timeout,
        }
    }

    pub fn post_json(url: impl Into<String>, body: Value, timeout: Duration) -> Self {
        Self {
            method: HttpMethod::Post,
            url: url.into(),
            headers: BTreeMap::new(),
            body: Some(body),
            timeout,
        }
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    pub status: u16,
    pub body: String,
}

impl HttpResponse {
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    /// Connection refused, DNS failure, TLS handshake failure.
    #[error("could not connect: {0}")]
    Connect(String),
    #[error("request timed out after {0:?}")]
    Timeout(Duration),
    /// The request never left the process (bad header, bad URL).
    #[error("request could not be built: {0}")]
    InvalidRequest(String),
    #[error("transport failure: {0}")]
    Other(String),
}

impl TransportError {
    /// Only timeouts are worth another attempt within the same tick.
    pub fn is_retryable(&self) -> bool {
        matches!(self, TransportError::Timeout(_))
    }

    pub fn is_connect(&self) -> bool {
        matches!(self, TransportError::Connect(_))
    }
}

// ── Transport Trait ─────────────────────────────────────────────────

/// The HTTP capability. One implementation talks to the network; tests
/// plug in a scripted one.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, req: &HttpRequest) -> Result<HttpResponse, TransportError>;
}
