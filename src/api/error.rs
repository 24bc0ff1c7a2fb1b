use thiserror::Error;

/// Failures surfaced by the client, distinct enough for callers to tell
/// "the network was flaky" from "the credentials are wrong" from "the
/// server rejected us twice".
#[derive(Error, Debug)]
pub enum ApiError {
    /// Invalid call arguments, detected before any network attempt.
    #[error("invalid request: {0}")]
    Configuration(String),

    /// Connection-level failure after exhausting the retry budget.
    #[error("connection failed after {attempts} attempt(s): {source}")]
    Transport {
        attempts: u32,
        #[source]
        source: reqwest::Error,
    },

    /// The device rejected the login credentials.
    #[error("invalid login")]
    Authentication,

    /// A request still looked session-invalid after re-authenticating once.
    /// Carries the response body for diagnosis.
    #[error("request rejected after re-authentication: {0}")]
    Session(String),

    /// Failed to write or delete the session cache file.
    #[error("session store error: {0}")]
    Store(#[from] std::io::Error),

    /// Response body could not be decoded as the requested type.
    #[error("failed to decode response body: {0}")]
    Decode(#[from] serde_json::Error),
}
