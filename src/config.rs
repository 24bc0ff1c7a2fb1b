//! Client configuration.
//!
//! `Config` collects everything the client needs up front: credentials, the
//! device address, retry policy, and where the session cookie cache lives.
//! It is immutable once handed to `RestClient::connect`.

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

/// Session cookie cache file name, placed in the user's home directory
/// (or the system temp directory when no home is available).
const COOKIE_FILE: &str = ".pslcookie";

/// Default device API port.
const DEFAULT_PORT: u16 = 8080;

/// Default device API version tag.
const DEFAULT_VERSION: &str = "v1.1";

/// Default number of connection attempts per request.
const DEFAULT_RETRIES: u32 = 10;

/// HTTP request timeout in seconds.
/// 30s allows for slow device responses while failing fast enough to retry.
const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Callback invoked with a human-readable message on each failed
/// connection attempt.
pub type LogSink = Arc<dyn Fn(&str) + Send + Sync>;

/// Transport scheme for the device API.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Scheme {
    #[default]
    Http,
    Https,
}

impl fmt::Display for Scheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scheme::Http => write!(f, "http"),
            Scheme::Https => write!(f, "https"),
        }
    }
}

/// Immutable client configuration.
///
/// Built with [`Config::new`] plus chained setters:
///
/// ```
/// use pslrest::{Config, Scheme};
///
/// let config = Config::new("admin", "mypass", "192.168.0.123")
///     .scheme(Scheme::Https)
///     .port(8443)
///     .retries(3);
/// ```
#[derive(Clone)]
pub struct Config {
    pub(crate) username: String,
    pub(crate) password: String,
    pub(crate) host: String,
    pub(crate) port: u16,
    pub(crate) scheme: Scheme,
    pub(crate) version: String,
    pub(crate) retries: u32,
    pub(crate) backoff_unit: Duration,
    pub(crate) timeout: Duration,
    pub(crate) cookie_path: PathBuf,
    pub(crate) log: Option<LogSink>,
}

impl Config {
    /// Create a configuration for the given credentials and host, with
    /// default port, scheme, API version, and retry policy.
    pub fn new(
        username: impl Into<String>,
        password: impl Into<String>,
        host: impl Into<String>,
    ) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
            host: host.into(),
            port: DEFAULT_PORT,
            scheme: Scheme::default(),
            version: DEFAULT_VERSION.to_string(),
            retries: DEFAULT_RETRIES,
            backoff_unit: Duration::from_secs(1),
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            cookie_path: default_cookie_path(),
            log: None,
        }
    }

    /// Device API port (default 8080).
    pub fn port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Transport scheme (default http).
    pub fn scheme(mut self, scheme: Scheme) -> Self {
        self.scheme = scheme;
        self
    }

    /// API version tag (default "v1.1").
    pub fn version(mut self, version: impl Into<String>) -> Self {
        self.version = version.into();
        self
    }

    /// Connection attempts per request (default 10, floor of 1).
    pub fn retries(mut self, retries: u32) -> Self {
        self.retries = retries.max(1);
        self
    }

    /// Base backoff interval between connection attempts (default 1s).
    /// The sleep doubles each attempt, capped at 16 units.
    pub fn backoff_unit(mut self, unit: Duration) -> Self {
        self.backoff_unit = unit;
        self
    }

    /// Per-attempt transport timeout (default 30s). A timed-out attempt
    /// counts as a connection failure and is retried.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Where the session cookie cache is stored
    /// (default `<home-or-tempdir>/.pslcookie`).
    pub fn cookie_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.cookie_path = path.into();
        self
    }

    /// Sink for human-readable retry messages.
    pub fn log_sink(mut self, sink: LogSink) -> Self {
        self.log = Some(sink);
        self
    }

    /// Fixed URL prefix all request paths are appended to.
    pub(crate) fn base_url(&self) -> String {
        format!(
            "{}://{}:{}/api/{}/managed-devices",
            self.scheme, self.host, self.port, self.version
        )
    }
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("scheme", &self.scheme)
            .field("version", &self.version)
            .field("retries", &self.retries)
            .field("backoff_unit", &self.backoff_unit)
            .field("timeout", &self.timeout)
            .field("cookie_path", &self.cookie_path)
            .field("log", &self.log.as_ref().map(|_| "<sink>"))
            .finish()
    }
}

/// Default location of the session cookie cache: the user's home directory,
/// falling back to the system temp directory.
pub fn default_cookie_path() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join(COOKIE_FILE)
}
