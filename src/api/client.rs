//! Authenticated request engine for the device management API.
//!
//! Every request goes through the same lifecycle: build the URL from the
//! fixed prefix, attach the current session cookies, retry connection
//! failures with exponential backoff, and on a session-invalid response
//! log in again and reissue the request exactly once. Responses come back
//! buffered and otherwise untouched; interpreting the payload is the
//! caller's business.

use std::collections::BTreeMap;

use reqwest::header::{self, HeaderMap};
use reqwest::{Client, Method, StatusCode};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, warn};

use crate::auth::SessionStore;
use crate::config::Config;

use super::ApiError;

/// Backoff between connection attempts doubles each time, capped at this
/// many backoff units.
const BACKOFF_CAP_UNITS: u32 = 16;

/// Response body markers the device uses to report a missing or expired
/// session alongside plain 401s.
const MISSING_AUTH_MARKER: &[u8] = b"Missing authorization";
const NOT_AUTHORIZED_MARKER: &[u8] = b"User is not authorized";

#[derive(Serialize)]
struct LoginRequest<'a> {
    username: &'a str,
    password: &'a str,
}

/// A fully buffered HTTP response.
///
/// The engine has to read the body to classify session-invalid responses,
/// so the caller receives status, headers, and body as plain data instead
/// of a live connection.
#[derive(Debug, Clone)]
pub struct ApiResponse {
    status: StatusCode,
    headers: HeaderMap,
    body: Vec<u8>,
}

impl ApiResponse {
    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn body(&self) -> &[u8] {
        &self.body
    }

    /// Body as text, with invalid UTF-8 replaced.
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    /// Decode the body as JSON.
    pub fn json<T: DeserializeOwned>(&self) -> Result<T, ApiError> {
        Ok(serde_json::from_slice(&self.body)?)
    }

    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }
}

/// Session-managing client for the device management API.
///
/// Created with [`RestClient::connect`], which reuses a cached session when
/// one exists and logs in otherwise. Methods take `&mut self` because a
/// re-authentication replaces the in-memory credential; callers needing
/// shared access must serialize it externally.
#[derive(Debug)]
pub struct RestClient {
    http: Client,
    base_url: String,
    session: SessionStore,
    config: Config,
}

impl RestClient {
    /// Build the client and make sure a session credential is in hand:
    /// either loaded from the cookie cache or obtained by logging in.
    pub async fn connect(config: Config) -> Result<Self, ApiError> {
        let http = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|err| ApiError::Configuration(format!("failed to build HTTP client: {err}")))?;

        let base_url = config.base_url();
        let session = SessionStore::open(config.cookie_path.clone());

        let mut client = Self {
            http,
            base_url,
            session,
            config,
        };
        if !client.session.has_credential() {
            client.login().await?;
        }
        Ok(client)
    }

    /// Perform a GET.
    pub async fn get(&mut self, path: &str) -> Result<ApiResponse, ApiError> {
        self.execute(Method::GET, path, None).await
    }

    /// Perform a PUT. `command` must be a JSON object.
    pub async fn put(&mut self, path: &str, command: &Value) -> Result<ApiResponse, ApiError> {
        require_object(command)?;
        self.execute(Method::PUT, path, Some(command)).await
    }

    /// Perform a POST. `command` must be a JSON object.
    pub async fn post(&mut self, path: &str, command: &Value) -> Result<ApiResponse, ApiError> {
        require_object(command)?;
        self.execute(Method::POST, path, Some(command)).await
    }

    /// Log in to the device, replacing any current session.
    ///
    /// This is done automatically as needed; callers normally never invoke
    /// it. The request goes straight to the transport, never through
    /// [`execute`](Self::execute), so a rejected login cannot recurse into
    /// another login.
    pub async fn login(&mut self) -> Result<(), ApiError> {
        // A failed login must not leave a stale credential behind.
        self.session.clear()?;

        let credentials = LoginRequest {
            username: &self.config.username,
            password: &self.config.password,
        };
        let response = self
            .http
            .post(format!("{}/login", self.base_url))
            .json(&credentials)
            .send()
            .await
            .map_err(|source| ApiError::Transport {
                attempts: 1,
                source,
            })?;

        if !response.status().is_success() {
            warn!(status = %response.status(), "device rejected login");
            return Err(ApiError::Authentication);
        }

        let cookies = extract_cookies(response.headers());
        debug!(cookies = cookies.len(), "login succeeded");
        self.session.establish(cookies)?;
        Ok(())
    }

    /// Run one logical request: retry loop, session-invalid detection, and
    /// a single re-authentication cycle.
    async fn execute(
        &mut self,
        method: Method,
        path: &str,
        body: Option<&Value>,
    ) -> Result<ApiResponse, ApiError> {
        let url = format!("{}{}", self.base_url, path);
        let total = self.config.retries;
        let backoff_cap = self.config.backoff_unit * BACKOFF_CAP_UNITS;
        let mut backoff = self.config.backoff_unit;
        let mut attempt = 0u32;

        let response = loop {
            attempt += 1;
            match self.dispatch(method.clone(), &url, body).await {
                Ok(response) => break response,
                Err(err) => {
                    warn!(url = %url, attempt, total, error = %err, "connection failed");
                    self.notify(&format!(
                        "Connection failed - retrying ({attempt} of {total}): {err}"
                    ));
                    if attempt >= total {
                        return Err(ApiError::Transport {
                            attempts: total,
                            source: err,
                        });
                    }
                    tokio::time::sleep(backoff).await;
                    backoff = (backoff * 2).min(backoff_cap);
                }
            }
        };

        if !session_invalid(&response) {
            return Ok(response);
        }

        // The session the device just rejected may simply have expired;
        // log in again and reissue the request, once.
        debug!(url = %url, "session rejected, re-authenticating");
        self.login().await?;

        let retried = self
            .dispatch(method, &url, body)
            .await
            .map_err(|source| ApiError::Transport {
                attempts: 1,
                source,
            })?;
        if session_invalid(&retried) {
            return Err(ApiError::Session(retried.text()));
        }
        Ok(retried)
    }

    /// One transport attempt: send the request with the current session
    /// cookies attached and buffer the response.
    async fn dispatch(
        &self,
        method: Method,
        url: &str,
        body: Option<&Value>,
    ) -> Result<ApiResponse, reqwest::Error> {
        let mut request = self.http.request(method, url);
        if let Some(cookie) = self.session.cookie_header() {
            request = request.header(header::COOKIE, cookie);
        }
        if let Some(body) = body {
            request = request.json(body);
        }

        let response = request.send().await?;
        let status = response.status();
        let headers = response.headers().clone();
        let body = response.bytes().await?.to_vec();
        Ok(ApiResponse {
            status,
            headers,
            body,
        })
    }

    fn notify(&self, message: &str) {
        if let Some(ref sink) = self.config.log {
            sink(message);
        }
    }
}

/// Whether the device reported a missing or expired session. Exactly three
/// signals count: a 401 status, or either authorization marker in the raw
/// body.
fn session_invalid(response: &ApiResponse) -> bool {
    response.status() == StatusCode::UNAUTHORIZED
        || contains(response.body(), MISSING_AUTH_MARKER)
        || contains(response.body(), NOT_AUTHORIZED_MARKER)
}

fn contains(haystack: &[u8], needle: &[u8]) -> bool {
    haystack
        .windows(needle.len())
        .any(|window| window == needle)
}

/// Collect `Set-Cookie` headers into a name/value jar. Attributes after the
/// first `;` (Path, HttpOnly, ...) are dropped; only the pair matters for
/// replaying the session.
fn extract_cookies(headers: &HeaderMap) -> BTreeMap<String, String> {
    let mut cookies = BTreeMap::new();
    for value in headers.get_all(header::SET_COOKIE) {
        let Ok(raw) = value.to_str() else { continue };
        let pair = raw.split(';').next().unwrap_or_default();
        if let Some((name, value)) = pair.split_once('=') {
            cookies.insert(name.trim().to_string(), value.trim().to_string());
        }
    }
    cookies
}

fn require_object(command: &Value) -> Result<(), ApiError> {
    if command.is_object() {
        Ok(())
    } else {
        Err(ApiError::Configuration(format!(
            "command payload must be a JSON object, got {}",
            json_type_name(command)
        )))
    }
}

fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn response(status: u16, body: &str) -> ApiResponse {
        ApiResponse {
            status: StatusCode::from_u16(status).unwrap(),
            headers: HeaderMap::new(),
            body: body.as_bytes().to_vec(),
        }
    }

    #[test]
    fn status_401_is_session_invalid() {
        assert!(session_invalid(&response(401, "")));
        assert!(session_invalid(&response(401, "{\"anything\":true}")));
    }

    #[test]
    fn body_markers_are_session_invalid_regardless_of_status() {
        assert!(session_invalid(&response(
            200,
            "{\"error\":\"Missing authorization header\"}"
        )));
        assert!(session_invalid(&response(
            403,
            "User is not authorized to access this resource"
        )));
    }

    #[test]
    fn ordinary_responses_are_not_session_invalid() {
        assert!(!session_invalid(&response(200, "{\"clock\":\"12:00\"}")));
        assert!(!session_invalid(&response(404, "not found")));
        assert!(!session_invalid(&response(500, "internal error")));
    }

    #[test]
    fn require_object_rejects_non_mappings() {
        assert!(require_object(&json!({"show": "show clock"})).is_ok());
        assert!(require_object(&json!({})).is_ok());

        for bad in [json!("string"), json!(42), json!([1, 2]), json!(null), json!(true)] {
            let err = require_object(&bad).unwrap_err();
            assert!(matches!(err, ApiError::Configuration(_)), "{bad} accepted");
        }
    }

    #[test]
    fn extract_cookies_drops_attributes() {
        let mut headers = HeaderMap::new();
        headers.append(
            header::SET_COOKIE,
            "sid=abc123; Path=/; HttpOnly".parse().unwrap(),
        );
        headers.append(header::SET_COOKIE, "token=xyz".parse().unwrap());

        let cookies = extract_cookies(&headers);
        assert_eq!(cookies.len(), 2);
        assert_eq!(cookies["sid"], "abc123");
        assert_eq!(cookies["token"], "xyz");
    }

    #[test]
    fn extract_cookies_ignores_malformed_headers() {
        let mut headers = HeaderMap::new();
        headers.append(header::SET_COOKIE, "no-equals-sign".parse().unwrap());
        assert!(extract_cookies(&headers).is_empty());
    }

    #[test]
    fn response_json_decodes_body() {
        let parsed: Value = response(200, "{\"clock\":\"12:00\"}").json().unwrap();
        assert_eq!(parsed["clock"], "12:00");

        let err = response(200, "not json").json::<Value>().unwrap_err();
        assert!(matches!(err, ApiError::Decode(_)));
    }
}
