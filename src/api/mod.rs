//! REST API client for the Perle device management API.
//!
//! `RestClient` wraps every request in the session lifecycle: the cookie
//! credential is attached automatically, connection failures are retried
//! with exponential backoff, and a session-invalid response triggers one
//! transparent re-login before the request is reissued.

pub mod client;
pub mod error;

pub use client::{ApiResponse, RestClient};
pub use error::ApiError;
