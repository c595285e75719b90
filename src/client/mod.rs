//! Polling client: one endpoint, one schedule, one worker process.
//!
//! ```text
//!   Idle ──tick──► Authenticating ──► Calling ──► Evaluating ──► Idle
//!     │             (token clients)   (retries)    (one log line)
//!     └── max runtime / stop request / connect failure ──► ShuttingDown ──► Terminated
//! ```
//!
//! Ticks never overlap: a tick's whole retry sequence, backoff sleeps
//! included, completes before the schedule is consulted again. Stop
//! requests are only observed between ticks.

use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::auth::TokenCache;
use crate::config::{AuthConfig, ClientConfig, ConfigError, HttpMethod};
use crate::retry::{Backoff, CallOutcome, RetryPolicy, MAX_ATTEMPTS};
use crate::transport::{HttpRequest, Transport, TransportError};

pub mod schedule;

use schedule::{NextTick, Ticker};

/// Upper bound for one HTTP attempt.
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);
/// Pause after a tick fails in an unexpected way.
pub const TICK_ERROR_BACKOFF: Duration = Duration::from_secs(5);
const LOG_EXCERPT_CHARS: usize = 500;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientState {
    Idle,
    Authenticating,
    Calling,
    Evaluating,
    ShuttingDown,
    Terminated,
}

/// Why a client stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Shutdown {
    MaxRuntime,
    StopRequested,
    ConnectFailure,
}

#[derive(Debug, Clone, PartialEq)]
pub enum TickOutcome {
    /// Token fetch failed; no call was made.
    AuthFailed,
    Completed { outcome: CallOutcome, attempts: u32 },
}

/// A tick that failed outside the call-outcome taxonomy.
#[derive(Debug, thiserror::Error)]
pub enum TickError {
    #[error("request could not be built: {0}")]
    InvalidRequest(String),
}

pub struct PollingClient {
    name: String,
    config: ClientConfig,
    transport: Arc<dyn Transport>,
    tokens: Option<TokenCache>,
    retry: RetryPolicy,
    request_timeout: Duration,
    state: ClientState,
}

impl PollingClient {
    pub fn new(
        name: impl Into<String>,
        config: ClientConfig,
        auth: Option<AuthConfig>,
        transport: Arc<dyn Transport>,
    ) -> Result<Self, ConfigError> {
        let name = name.into();
        let tokens = if config.use_token_manager {
            let auth = auth.ok_or_else(|| ConfigError::MissingAuth(name.clone()))?;
            Some(TokenCache::new(auth, Arc::clone(&transport)))
        } else {
            None
        };
        let retry = match config.retry_jitter() {
            Some(jitter) => RetryPolicy::new(MAX_ATTEMPTS, Backoff::default().with_jitter(jitter)),
            None => RetryPolicy::default(),
        };
        info!(client = %name, use_token_manager = config.use_token_manager, "Client initialized");

        Ok(Self {
            name,
            config,
            transport,
            tokens,
            retry,
            request_timeout: REQUEST_TIMEOUT,
            state: ClientState::Idle,
        })
    }

    pub fn state(&self) -> ClientState {
        self.state
    }

    // ── Schedule Loop ───────────────────────────────────────────────

    /// Run ticks until the runtime bound passes, `stop` fires, or a
    /// connection failure disables the client.
    pub async fn run(&mut self, stop: CancellationToken) -> Shutdown {
        let mut ticker = Ticker::new(Instant::now(), self.config.interval(), self.config.max_runtime());
        info!(
            client = %self.name,
            interval_secs = self.config.interval,
            max_runtime_secs = self.config.max_runtime.unwrap_or(0),
            "Client started"
        );

        let reason = loop {
            self.state = ClientState::Idle;

            let slot = match ticker.next_tick(Instant::now()) {
                NextTick::At(slot) => slot,
                NextTick::RuntimeExhausted(limit) => {
                    tokio::select! {
                        biased;
                        _ = stop.cancelled() => break Shutdown::StopRequested,
                        _ = tokio::time::sleep_until(limit) => {}
                    }
                    info!(client = %self.name, "Max runtime reached! Shutting down...");
                    break Shutdown::MaxRuntime;
                }
            };

            tokio::select! {
                biased;
                _ = stop.cancelled() => break Shutdown::StopRequested,
                _ = tokio::time::sleep_until(slot) => {}
            }
            ticker.fired();

            match self.tick().await {
                Ok(TickOutcome::Completed {
                    outcome: CallOutcome::TransportError(TransportError::Connect(_)),
                    ..
                }) if self.config.disable_on_connect_failure => break Shutdown::ConnectFailure,
                Ok(_) => {}
                Err(e) => {
                    error!(client = %self.name, error = %e, "Error in run loop — backing off");
                    tokio::select! {
                        biased;
                        _ = stop.cancelled() => break Shutdown::StopRequested,
                        _ = tokio::time::sleep(TICK_ERROR_BACKOFF) => {}
                    }
                }
            }
        };

        self.state = ClientState::ShuttingDown;
        info!(client = %self.name, reason = ?reason, "Client shutting down");
        self.tokens = None;
        self.state = ClientState::Terminated;
        reason
    }

    // ── Single Tick ─────────────────────────────────────────────────

    /// Authenticate if configured, call the endpoint under the retry
    /// policy, and log exactly one outcome line.
    pub async fn tick(&mut self) -> Result<TickOutcome, TickError> {
        let mut headers = self.config.headers.clone();

        if let Some(tokens) = self.tokens.as_mut() {
            self.state = ClientState::Authenticating;
            match tokens.get_token().await {
                Ok(token) => {
                    debug!(client = %self.name, token = %token.obfuscated(), "Attached bearer token");
                    headers.retain(|key, _| !key.eq_ignore_ascii_case("authorization"));
                    headers.insert("Authorization".into(), token.bearer());
                }
                Err(e) => {
                    self.state = ClientState::Evaluating;
                    error!(client = %self.name, error = %e, "Token fetch failed — tick abandoned");
                    return Ok(TickOutcome::AuthFailed);
                }
            }
        }

        let request = HttpRequest {
            method: self.config.method,
            url: self.config.url.clone(),
            headers,
            body: match self.config.method {
                HttpMethod::Post => Some(self.config.payload_or_empty()),
                HttpMethod::Get => None,
            },
            timeout: self.request_timeout,
        };

        self.state = ClientState::Calling;
        let transport = Arc::clone(&self.transport);
        let request = &request;
        let (outcome, attempts) = self
            .retry
            .execute_counted(|attempt| {
                let transport = Arc::clone(&transport);
                async move {
                    debug!(attempt, method = %request.method, url = %request.url, "Sending request");
                    CallOutcome::from_result(transport.send(request).await)
                }
            })
            .await;

        self.state = ClientState::Evaluating;
        if let CallOutcome::TransportError(TransportError::InvalidRequest(reason)) = &outcome {
            return Err(TickError::InvalidRequest(reason.clone()));
        }

        self.report(&outcome, attempts);
        if outcome.status() == Some(401) {
            if let Some(tokens) = self.tokens.as_mut() {
                tokens.invalidate();
            }
        }

        Ok(TickOutcome::Completed { outcome, attempts })
    }

    fn report(&self, outcome: &CallOutcome, attempts: u32) {
        let client = self.name.as_str();
        match outcome {
            CallOutcome::Success(data) => {
                let summary = data.to_string();
                info!(client, attempts, response = %excerpt(&summary), "Success");
            }
            CallOutcome::ClientError { status, body } => {
                warn!(client, status, body = %excerpt(body), "Client error — not retried");
            }
            CallOutcome::ServerError { status, body } => {
                error!(client, status, attempts, body = %excerpt(body), "Server error — retries exhausted");
            }
            CallOutcome::TransportError(TransportError::Timeout(after)) => {
                error!(client, attempts, timeout_ms = after.as_millis() as u64, "API request timed out");
            }
            CallOutcome::TransportError(TransportError::Connect(reason)) => {
                if self.config.disable_on_connect_failure {
                    error!(client, error = %reason, "Network error — could not connect to API; client will not be invoked again");
                } else {
                    error!(client, error = %reason, "Network error — could not connect to API; retrying at next tick");
                }
            }
            CallOutcome::TransportError(err) => {
                error!(client, error = %err, "Transport failure");
            }
            CallOutcome::MalformedResponse { body } => {
                error!(client, body = %excerpt(body), "Invalid JSON response");
            }
        }
    }
}

/// Trim long bodies for logging without splitting a UTF-8 character.
fn excerpt(text: &str) -> &str {
    match text.char_indices().nth(LOG_EXCERPT_CHARS) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}
