//! Fleet configuration: typed view of `config.json`.
//!
//! ```text
//! {
//!   "max_runtime": 120,
//!   "log_to_console": true,
//!   "auth": { "url": "https://auth.example/token", "credentials": { ... } },
//!   "clients": {
//!     "orders": { "url": "...", "method": "GET", "interval": 10, ... }
//!   }
//! }
//! ```
//!
//! Everything here is immutable after load. The orchestrator hands each
//! worker its own [`ClientConfig`] plus the shared [`AuthConfig`], both
//! re-encoded as JSON on the worker command line.

use serde::de::{self, Deserializer, MapAccess, Visitor};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

pub const DEFAULT_INTERVAL_SECS: u64 = 15;
pub const DEFAULT_SHUTDOWN_TIMEOUT_SECS: u64 = 60;
pub const DEFAULT_LOG_FILE: &str = "app.log";

// ── Errors ──────────────────────────────────────────────────────────

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse configuration")]
    Parse(#[from] serde_json::Error),
    #[error("client '{client}': {reason}")]
    InvalidClient { client: String, reason: String },
    #[error("auth section: {0}")]
    InvalidAuth(String),
    #[error("client '{0}' uses the token manager but no auth section is configured")]
    MissingAuth(String),
    #[error("client configuration for '{0}' is missing")]
    MissingClient(String),
}

// ── HTTP Method ─────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HttpMethod {
    #[default]
    Get,
    Post,
}

impl FromStr for HttpMethod {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "GET" => Ok(HttpMethod::Get),
            "POST" => Ok(HttpMethod::Post),
            other => Err(format!("unsupported HTTP method '{other}' (expected GET or POST)")),
        }
    }
}

// Config files in the wild use "get", "Get" and "GET" interchangeably.
impl<'de> Deserialize<'de> for HttpMethod {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(de::Error::custom)
    }
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HttpMethod::Get => f.write_str("GET"),
            HttpMethod::Post => f.write_str("POST"),
        }
    }
}

// ── Client ──────────────────────────────────────────────────────────

/// One polled endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Checked by [`ClientConfig::validate`], so disabled drafts may omit it.
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub method: HttpMethod,
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
    /// Request body, sent only with POST.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<Value>,
    /// Seconds between ticks.
    #[serde(default = "default_interval")]
    pub interval: u64,
    #[serde(default)]
    pub use_token_manager: bool,
    #[serde(default)]
    pub disabled: bool,
    /// Seconds of total runtime before the client stops itself. `0` or
    /// absent means "inherit the fleet value".
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_runtime: Option<u64>,
    /// Stop scheduling ticks after a connection-level failure.
    #[serde(default)]
    pub disable_on_connect_failure: bool,
    /// Upper bound in milliseconds of the random extra added to each
    /// retry backoff.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retry_jitter_ms: Option<u64>,
}

fn default_interval() -> u64 {
    DEFAULT_INTERVAL_SECS
}

impl ClientConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval)
    }

    /// Runtime bound, or `None` when the client runs until stopped.
    pub fn max_runtime(&self) -> Option<Duration> {
        self.max_runtime
            .filter(|secs| *secs > 0)
            .map(Duration::from_secs)
    }

    pub fn retry_jitter(&self) -> Option<Duration> {
        self.retry_jitter_ms
            .filter(|ms| *ms > 0)
            .map(Duration::from_millis)
    }

    /// Body for a POST; an empty JSON object when no payload is configured.
    pub fn payload_or_empty(&self) -> Value {
        self.payload
            .clone()
            .unwrap_or_else(|| Value::Object(Default::default()))
    }

    pub fn validate(&self, name: &str) -> Result<(), ConfigError> {
        let invalid = |reason: String| ConfigError::InvalidClient {
            client: name.to_string(),
            reason,
        };

        if self.url.trim().is_empty() {
            return Err(invalid("url is empty".into()));
        }
        reqwest::Url::parse(&self.url)
            .map_err(|e| invalid(format!("url '{}' is not valid: {e}", self.url)))?;

        if self.interval == 0 {
            return Err(invalid("interval must be a positive number of seconds".into()));
        }

        for (key, value) in &self.headers {
            http::HeaderName::from_bytes(key.as_bytes())
                .map_err(|_| invalid(format!("header name '{key}' is not valid")))?;
            http::HeaderValue::from_str(value)
                .map_err(|_| invalid(format!("header '{key}' has a value that cannot be sent")))?;
        }

        Ok(())
    }
}

/// A named client, in configuration-file order.
#[derive(Debug, Clone, PartialEq)]
pub struct ClientEntry {
    pub name: String,
    pub config: ClientConfig,
}

// ── Auth ────────────────────────────────────────────────────────────

/// Token endpoint shared by every client with `use_token_manager`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuthConfig {
    pub url: String,
    /// Posted verbatim as the JSON request body.
    #[serde(default)]
    pub credentials: Value,
}

impl AuthConfig {
    /// Decode the worker's auth argument. `{}` and `null` mean "no auth".
    pub fn from_worker_arg(raw: &str) -> Result<Option<Self>, ConfigError> {
        let value: Value = serde_json::from_str(raw)?;
        auth_from_value(value).map_err(ConfigError::Parse)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        reqwest::Url::parse(&self.url)
            .map_err(|e| ConfigError::InvalidAuth(format!("url '{}' is not valid: {e}", self.url)))?;
        Ok(())
    }
}

fn auth_from_value(value: Value) -> Result<Option<AuthConfig>, serde_json::Error> {
    match value {
        Value::Null => Ok(None),
        Value::Object(ref map) if map.is_empty() => Ok(None),
        other => serde_json::from_value(other).map(Some),
    }
}

fn optional_auth<'de, D>(deserializer: D) -> Result<Option<AuthConfig>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Value::deserialize(deserializer)?;
    auth_from_value(raw).map_err(de::Error::custom)
}

// ── Fleet ───────────────────────────────────────────────────────────

#[derive(Debug, Clone, Deserialize)]
pub struct FleetConfig {
    /// Seconds each client may run; `0` disables the bound.
    #[serde(default)]
    pub max_runtime: u64,
    #[serde(default = "default_log_to_console")]
    pub log_to_console: bool,
    /// Seconds the orchestrator waits for workers after a stop request
    /// before killing them.
    #[serde(default = "default_shutdown_timeout")]
    pub shutdown_timeout: u64,
    #[serde(default, deserialize_with = "optional_auth")]
    pub auth: Option<AuthConfig>,
    #[serde(deserialize_with = "ordered_clients")]
    pub clients: Vec<ClientEntry>,
}

fn default_log_to_console() -> bool {
    true
}

fn default_shutdown_timeout() -> u64 {
    DEFAULT_SHUTDOWN_TIMEOUT_SECS
}

/// Collects `clients` as a list so file order survives deserialization.
fn ordered_clients<'de, D>(deserializer: D) -> Result<Vec<ClientEntry>, D::Error>
where
    D: Deserializer<'de>,
{
    struct ClientsVisitor;

    impl<'de> Visitor<'de> for ClientsVisitor {
        type Value = Vec<ClientEntry>;

        fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.write_str("a map of client name to client configuration")
        }

        fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> Result<Self::Value, A::Error> {
            let mut clients: Vec<ClientEntry> = Vec::with_capacity(map.size_hint().unwrap_or(0));
            while let Some((name, config)) = map.next_entry::<String, ClientConfig>()? {
                if clients.iter().any(|c| c.name == name) {
                    return Err(de::Error::custom(format!("duplicate client name '{name}'")));
                }
                clients.push(ClientEntry { name, config });
            }
            Ok(clients)
        }
    }

    deserializer.deserialize_map(ClientsVisitor)
}

impl FleetConfig {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        raw.parse()
    }

    /// Disabled entries are not validated; they may be half-written drafts.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if let Some(auth) = &self.auth {
            auth.validate()?;
        }
        for entry in self.enabled_clients() {
            entry.config.validate(&entry.name)?;
            if entry.config.use_token_manager && self.auth.is_none() {
                return Err(ConfigError::MissingAuth(entry.name.clone()));
            }
        }
        Ok(())
    }

    pub fn enabled_clients(&self) -> impl Iterator<Item = &ClientEntry> {
        self.clients.iter().filter(|c| !c.config.disabled)
    }

    /// The config a worker is started with: the entry itself, with the
    /// fleet-wide runtime bound filled in unless the entry overrides it.
    pub fn worker_config(&self, entry: &ClientEntry) -> ClientConfig {
        let mut config = entry.config.clone();
        if config.max_runtime.unwrap_or(0) == 0 && self.max_runtime > 0 {
            config.max_runtime = Some(self.max_runtime);
        }
        config
    }

    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.shutdown_timeout)
    }

    /// File sink for the whole fleet, or `None` for console logging.
    pub fn log_file(&self) -> Option<PathBuf> {
        if self.log_to_console {
            None
        } else {
            Some(PathBuf::from(DEFAULT_LOG_FILE))
        }
    }
}

impl FromStr for FleetConfig {
    type Err = ConfigError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let config: FleetConfig = serde_json::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }
}

// ── Worker Boundary ─────────────────────────────────────────────────

/// Decode the `<client-json> <auth-json>` worker arguments.
pub fn parse_worker_args(
    name: &str,
    client_json: &str,
    auth_json: &str,
) -> Result<(ClientConfig, Option<AuthConfig>), ConfigError> {
    let raw: Value = serde_json::from_str(client_json)?;
    let is_empty = match &raw {
        Value::Null => true,
        Value::Object(map) => map.is_empty(),
        _ => false,
    };
    if is_empty {
        return Err(ConfigError::MissingClient(name.to_string()));
    }

    let client: ClientConfig = serde_json::from_value(raw)?;
    client.validate(name)?;

    let auth = AuthConfig::from_worker_arg(auth_json)?;
    if let Some(auth) = &auth {
        auth.validate()?;
    }
    if client.use_token_manager && auth.is_none() {
        return Err(ConfigError::MissingAuth(name.to_string()));
    }

    Ok((client, auth))
}
