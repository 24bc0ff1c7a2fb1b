//! Session-managing client for the Perle RESTful device management API.
//!
//! The client authenticates once, caches the server-issued session cookies
//! on disk so later process invocations can skip the login round trip,
//! retries transient connection failures with exponential backoff, and
//! re-authenticates transparently when the server reports an expired or
//! missing session. Callers just issue `get`/`put`/`post` and interpret
//! the response.
//!
//! ```no_run
//! use pslrest::{Config, RestClient};
//!
//! # async fn example() -> Result<(), pslrest::ApiError> {
//! let config = Config::new("admin", "mypass", "192.168.0.123").retries(3);
//! let mut client = RestClient::connect(config).await?;
//!
//! let clock: serde_json::Value = client.get("/system/general/clock").await?.json()?;
//! println!("api clock: {}", clock["clock"]);
//! # Ok(())
//! # }
//! ```

pub mod api;
pub mod auth;
pub mod config;

pub use api::{ApiError, ApiResponse, RestClient};
pub use auth::SessionStore;
pub use config::{default_cookie_path, Config, LogSink, Scheme};
