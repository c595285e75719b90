//! apifleet: a supervised fleet of interval HTTP polling clients.
//!
//! The orchestrator reads a fleet configuration and launches one worker
//! process per enabled client. Each worker runs a [`client::PollingClient`]
//! that calls its endpoint on a fixed interval, retries transient failures
//! with bounded exponential backoff, and optionally authenticates through a
//! refreshable bearer token.

pub mod auth;
pub mod client;
pub mod config;
pub mod logging;
pub mod orchestrator;
pub mod retry;
pub mod signal;
pub mod transport;
