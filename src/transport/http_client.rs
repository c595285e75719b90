//! reqwest-backed transport.

use async_trait::async_trait;

use super::{HttpRequest, HttpResponse, Transport, TransportError};
use crate::config::HttpMethod;

pub struct ReqwestTransport {
    client: reqwest::Client,
}

impl ReqwestTransport {
    pub fn new() -> Result<Self, TransportError> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("apifleet/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| TransportError::Other(e.to_string()))?;
        Ok(Self { client })
    }

    /// Reuse an existing client (shared connection pool, custom TLS).
    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Transport for ReqwestTransport {
    async fn send(&self, req: &HttpRequest) -> Result<HttpResponse, TransportError> {
        let mut builder = match req.method {
            HttpMethod::Get => self.client.get(&req.url),
            HttpMethod::Post => self.client.post(&req.url),
        };
        for (name, value) in &req.headers {
            builder = builder.header(name, value);
        }
        if let Some(body) = &req.body {
            builder = builder.json(body);
        }

        let resp = builder
            .timeout(req.timeout)
            .send()
            .await
            .map_err(|e| classify_error(e, req))?;

        let status = resp.status().as_u16();
        let body = resp.text().await.map_err(|e| classify_error(e, req))?;
        Ok(HttpResponse { status, body })
    }
}

fn classify_error(err: reqwest::Error, req: &HttpRequest) -> TransportError {
    if err.is_timeout() {
        TransportError::Timeout(req.timeout)
    } else if err.is_connect() {
        TransportError::Connect(err.to_string())
    } else if err.is_builder() {
        TransportError::InvalidRequest(err.to_string())
    } else {
        TransportError::Other(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_connection_refused_is_connect_error() {
        // Bind then drop to get a port nothing listens on.
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let client = reqwest::Client::builder().no_proxy().build().unwrap();
        let transport = ReqwestTransport::with_client(client);
        let req = HttpRequest::get(format!("http://127.0.0.1:{port}/"), Duration::from_secs(2));
        let err = transport.send(&req).await.unwrap_err();
        assert!(err.is_connect(), "expected connect error, got {err:?}");
    }

    #[tokio::test]
    async fn test_invalid_url_is_not_retryable() {
        let transport = ReqwestTransport::new().unwrap();
        let req = HttpRequest::get("not a url", Duration::from_secs(1));
        let err = transport.send(&req).await.unwrap_err();
        assert!(!err.is_retryable());
        assert!(!err.is_connect());
    }
}
