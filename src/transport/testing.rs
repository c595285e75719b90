//! Scripted transport for unit tests.
//!
//! Responses are queued per URL; once a URL's queue is drained its
//! fallback answers every further request. Unknown URLs fail with a
//! connect error. Every request is recorded with the (tokio) instant it
//! was sent so tests running on paused time can assert exact schedules.

use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::time::Duration;
use tokio::time::Instant;

use super::{HttpRequest, HttpResponse, Transport, TransportError};

type Reply = Result<HttpResponse, TransportError>;

#[derive(Default)]
struct Route {
    queue: VecDeque<Reply>,
    fallback: Option<Reply>,
}

#[derive(Debug, Clone)]
pub(crate) struct Recorded {
    pub request: HttpRequest,
    pub at: Instant,
}

#[derive(Default)]
pub(crate) struct ScriptedTransport {
    routes: Mutex<HashMap<String, Route>>,
    log: Mutex<Vec<Recorded>>,
    latency: Duration,
}

impl ScriptedTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every request takes this long before answering.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    pub fn respond(&self, url: &str, status: u16, body: &str) -> &Self {
        self.push(url, Ok(HttpResponse::new(status, body)))
    }

    pub fn fail(&self, url: &str, err: TransportError) -> &Self {
        self.push(url, Err(err))
    }

    pub fn respond_always(&self, url: &str, status: u16, body: &str) -> &Self {
        self.set_fallback(url, Ok(HttpResponse::new(status, body)))
    }

    pub fn fail_always(&self, url: &str, err: TransportError) -> &Self {
        self.set_fallback(url, Err(err))
    }

    /// Requests sent to `url`, oldest first.
    pub fn requests_to(&self, url: &str) -> Vec<Recorded> {
        self.log
            .lock()
            .unwrap()
            .iter()
            .filter(|r| r.request.url == url)
            .cloned()
            .collect()
    }

    /// Offsets from `origin` at which `url` was called.
    pub fn call_offsets(&self, url: &str, origin: Instant) -> Vec<Duration> {
        self.requests_to(url)
            .into_iter()
            .map(|r| r.at.duration_since(origin))
            .collect()
    }

    fn push(&self, url: &str, reply: Reply) -> &Self {
        self.routes
            .lock()
            .unwrap()
            .entry(url.to_string())
            .or_default()
            .queue
            .push_back(reply);
        self
    }

    fn set_fallback(&self, url: &str, reply: Reply) -> &Self {
        self.routes
            .lock()
            .unwrap()
            .entry(url.to_string())
            .or_default()
            .fallback = Some(reply);
        self
    }

    fn next_reply(&self, url: &str) -> Reply {
        let mut routes = self.routes.lock().unwrap();
        match routes.get_mut(url) {
            Some(route) => match route.queue.pop_front() {
                Some(reply) => reply,
                None => route
                    .fallback
                    .clone()
                    .unwrap_or_else(|| Err(TransportError::Connect(format!("script exhausted for {url}")))),
            },
            None => Err(TransportError::Connect(format!("no route to {url}"))),
        }
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn send(&self, req: &HttpRequest) -> Result<HttpResponse, TransportError> {
        self.log.lock().unwrap().push(Recorded {
            request: req.clone(),
            at: Instant::now(),
        });
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        self.next_reply(&req.url)
    }
}
