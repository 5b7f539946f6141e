//! REST client for the console backend.
//!
//! Performs one authenticated request at a time and normalizes the backend's
//! response conventions:
//! - success bodies may be wrapped in a `{"data": ...}` envelope, which is unwrapped
//! - `204 No Content` (or any empty success body) is [`ApiResponse::Empty`]
//! - failures carry a human-readable message from a JSON `message` field or the raw body
//!
//! The client never retries. Retry policy belongs to the caller.

mod resources;

use std::time::Duration;

use reqwest::header::{AUTHORIZATION, CONTENT_TYPE};
use reqwest::{Client, Method, StatusCode};
use serde::de::DeserializeOwned;
use serde_json::Value;

pub use resources::supports;

/// Default per-request timeout.
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Uniform failure of a single REST request.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RequestError {
    /// The request never produced a response (unreachable, reset, timeout).
    #[error("request to {path} failed: {message}")]
    Transport { path: String, message: String },

    /// A response arrived but its body could not be decoded.
    #[error("invalid response from {path}: {message}")]
    Decode { path: String, message: String },

    /// The server answered with a non-success status.
    #[error("{message} (HTTP {status})")]
    Status { status: u16, message: String },
}

impl RequestError {
    /// HTTP status, when the server answered.
    pub fn status(&self) -> Option<u16> {
        match self {
            RequestError::Status { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Whether this is a 401/403 rejection.
    pub fn is_unauthorized(&self) -> bool {
        matches!(self.status(), Some(401) | Some(403))
    }

    /// Whether the request failed before any response arrived.
    pub fn is_transport(&self) -> bool {
        matches!(self, RequestError::Transport { .. })
    }

    /// Message suitable for inline display next to a form.
    pub fn message(&self) -> &str {
        match self {
            RequestError::Transport { message, .. }
            | RequestError::Decode { message, .. }
            | RequestError::Status { message, .. } => message,
        }
    }
}

/// Successful outcome of a request.
#[derive(Debug, Clone, PartialEq)]
pub enum ApiResponse {
    /// Success with no body (e.g. `204 No Content`).
    Empty,
    /// Decoded JSON, with any `{"data": ...}` envelope already removed.
    Json(Value),
}

impl ApiResponse {
    /// Decode the payload into `T`.
    pub fn decode<T: DeserializeOwned>(self, path: &str) -> Result<T, RequestError> {
        let value = match self {
            ApiResponse::Empty => Value::Null,
            ApiResponse::Json(value) => value,
        };
        serde_json::from_value(value).map_err(|e| RequestError::Decode {
            path: path.to_string(),
            message: e.to_string(),
        })
    }

    /// Decode a collection; an empty body or `null` payload is an empty list.
    pub fn decode_list<T: DeserializeOwned>(self, path: &str) -> Result<Vec<T>, RequestError> {
        match self {
            ApiResponse::Empty | ApiResponse::Json(Value::Null) => Ok(Vec::new()),
            other => other.decode(path),
        }
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, ApiResponse::Empty)
    }
}

/// HTTP client bound to one backend base URL.
#[derive(Debug, Clone)]
pub struct ApiClient {
    client: Client,
    base_url: String,
}

impl ApiClient {
    /// Create a client for `base_url` (e.g. `http://localhost:8000`).
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, RequestError> {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| RequestError::Transport {
                path: base_url.clone(),
                message: e.to_string(),
            })?;
        Ok(Self { client, base_url })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Absolute URL for an API path.
    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Perform one request.
    ///
    /// `body` is sent as JSON when present; `token` is attached as a bearer
    /// credential when present.
    pub async fn request(
        &self,
        method: Method,
        path: &str,
        body: Option<&Value>,
        token: Option<&str>,
    ) -> Result<ApiResponse, RequestError> {
        let mut builder = self
            .client
            .request(method.clone(), self.url(path))
            .header(CONTENT_TYPE, "application/json");
        if let Some(token) = token {
            builder = builder.header(AUTHORIZATION, format!("Bearer {}", token));
        }
        if let Some(body) = body {
            builder = builder.json(body);
        }

        tracing::debug!(%method, path, "api request");
        let response = builder.send().await.map_err(|e| RequestError::Transport {
            path: path.to_string(),
            message: e.to_string(),
        })?;

        let status = response.status();
        let text = response.text().await.map_err(|e| RequestError::Transport {
            path: path.to_string(),
            message: e.to_string(),
        })?;

        interpret_response(path, status, &text)
    }

    /// `GET` a path and decode it as a collection.
    pub async fn get_list<T: DeserializeOwned>(
        &self,
        path: &str,
        token: Option<&str>,
    ) -> Result<Vec<T>, RequestError> {
        self.request(Method::GET, path, None, token)
            .await?
            .decode_list(path)
    }
}

/// Turn a status and raw body into the uniform result.
fn interpret_response(
    path: &str,
    status: StatusCode,
    text: &str,
) -> Result<ApiResponse, RequestError> {
    if !status.is_success() {
        return Err(RequestError::Status {
            status: status.as_u16(),
            message: error_message(status, text),
        });
    }

    if status == StatusCode::NO_CONTENT || text.trim().is_empty() {
        return Ok(ApiResponse::Empty);
    }

    let value: Value = serde_json::from_str(text).map_err(|e| RequestError::Decode {
        path: path.to_string(),
        message: e.to_string(),
    })?;

    Ok(ApiResponse::Json(unwrap_envelope(value)))
}

/// Strip a `{"data": ...}` envelope if present.
fn unwrap_envelope(value: Value) -> Value {
    match value {
        Value::Object(mut map) if map.contains_key("data") => {
            map.remove("data").unwrap_or(Value::Null)
        }
        other => other,
    }
}

/// Pick the most useful message out of a failure body.
fn error_message(status: StatusCode, text: &str) -> String {
    let from_json = serde_json::from_str::<Value>(text).ok().and_then(|v| {
        v.get("message")
            .or_else(|| v.get("error"))
            .and_then(|m| m.as_str())
            .map(str::to_owned)
    });

    match from_json {
        Some(message) if !message.is_empty() => message,
        _ if !text.trim().is_empty() => text.trim().to_string(),
        _ => status
            .canonical_reason()
            .unwrap_or("request failed")
            .to_string(),
    }
}
