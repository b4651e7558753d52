//! Single-shot HTTP calls against the generation backend.
//!
//! [`HttpTransport`] is the seam every higher-level component talks
//! through. [`ReqwestTransport`] is the production implementation; tests
//! substitute a scripted one. No retries happen at this layer.

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use clipforge_core::config::ClientConfig;
use clipforge_core::error::CoreError;
use serde_json::Value;

/// Result of a backend call: payload, or one of the [`ClientError`] kinds.
pub type Outcome<T> = Result<T, ClientError>;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// The request never produced a usable response.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    /// No response arrived within the per-call timeout.
    #[error("request timed out after {0:?}")]
    Timeout(Duration),

    /// TCP/TLS/DNS failure before the request was sent.
    #[error("connection failed: {0}")]
    Connect(String),

    /// Any other failure while sending or reading the request.
    #[error("request failed: {0}")]
    Request(String),

    /// A response arrived but its body is not the expected JSON envelope.
    #[error("malformed response body: {0}")]
    MalformedBody(String),
}

/// Errors surfaced by every client operation.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ClientError {
    /// Rejected locally; nothing was sent.
    #[error(transparent)]
    Validation(#[from] CoreError),

    /// The backend answered and explicitly refused the request.
    #[error("backend rejected request ({code}): {message}")]
    App {
        /// HTTP status code of the rejecting response.
        code: u16,
        message: String,
    },

    #[error(transparent)]
    Transport(#[from] TransportError),
}

// ---------------------------------------------------------------------------
// Request description
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Get => "GET",
            Self::Post => "POST",
        })
    }
}

/// A single file sent as a multipart form field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilePart {
    pub field: String,
    pub file_name: String,
    pub mime: String,
    pub bytes: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum RequestBody {
    Empty,
    Json(Value),
    File(FilePart),
}

/// Everything a transport needs to issue one call.
#[derive(Debug, Clone, PartialEq)]
pub struct ApiRequest {
    pub method: Method,
    /// Path relative to the configured base URL, starting with `/`.
    pub path: String,
    pub body: RequestBody,
    pub timeout: Duration,
}

impl ApiRequest {
    /// Describe a call. The timeout must be non-zero.
    pub fn new(
        method: Method,
        path: impl Into<String>,
        body: RequestBody,
        timeout: Duration,
    ) -> Result<Self, CoreError> {
        if timeout.is_zero() {
            return Err(CoreError::Validation("request timeout must be positive".into()));
        }
        Ok(Self {
            method,
            path: path.into(),
            body,
            timeout,
        })
    }

    pub fn get(path: impl Into<String>, timeout: Duration) -> Result<Self, CoreError> {
        Self::new(Method::Get, path, RequestBody::Empty, timeout)
    }

    pub fn post_json(
        path: impl Into<String>,
        body: Value,
        timeout: Duration,
    ) -> Result<Self, CoreError> {
        Self::new(Method::Post, path, RequestBody::Json(body), timeout)
    }

    pub fn post_file(
        path: impl Into<String>,
        part: FilePart,
        timeout: Duration,
    ) -> Result<Self, CoreError> {
        Self::new(Method::Post, path, RequestBody::File(part), timeout)
    }
}

// ---------------------------------------------------------------------------
// Transport seam
// ---------------------------------------------------------------------------

/// Issues one request and classifies the response.
#[async_trait]
pub trait HttpTransport: Send + Sync {
    async fn call(&self, request: ApiRequest) -> Outcome<Value>;
}

/// Classify a raw response into an [`Outcome`].
///
/// The backend wraps every answer in a JSON object carrying a boolean
/// `success` marker:
///
/// - 2xx with `success: true` -> `Ok(body)`
/// - `success: false`, or any non-2xx JSON object -> [`ClientError::App`]
/// - anything that is not such an object -> [`TransportError::MalformedBody`]
pub fn interpret_body(status: u16, body: &[u8]) -> Outcome<Value> {
    let value: Value = serde_json::from_slice(body)
        .map_err(|e| TransportError::MalformedBody(format!("HTTP {status}: {e}")))?;

    let is_success_status = (200..300).contains(&status);
    match value.get("success").and_then(Value::as_bool) {
        Some(true) if is_success_status => Ok(value),
        Some(_) => Err(app_error(status, &value)),
        None if !is_success_status && value.is_object() => Err(app_error(status, &value)),
        None => Err(TransportError::MalformedBody(format!(
            "HTTP {status}: response has no success marker"
        ))
        .into()),
    }
}

fn app_error(status: u16, body: &Value) -> ClientError {
    let message = body
        .get("message")
        .or_else(|| body.get("detail"))
        .and_then(Value::as_str)
        .filter(|m| !m.is_empty())
        .unwrap_or("request rejected by backend")
        .to_string();
    ClientError::App {
        code: status,
        message,
    }
}

// ---------------------------------------------------------------------------
// reqwest implementation
// ---------------------------------------------------------------------------

/// [`HttpTransport`] backed by a pooled [`reqwest::Client`].
pub struct ReqwestTransport {
    client: reqwest::Client,
    base_url: String,
    auth_token: Option<String>,
}

impl ReqwestTransport {
    /// Create a transport for the configured backend.
    pub fn new(config: &ClientConfig) -> Self {
        Self::with_client(reqwest::Client::new(), config)
    }

    /// Create a transport reusing an existing [`reqwest::Client`]
    /// (useful for sharing one connection pool across sessions).
    pub fn with_client(client: reqwest::Client, config: &ClientConfig) -> Self {
        Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            auth_token: config.auth_token.clone(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }
}

impl ReqwestTransport {
    /// Translate an [`ApiRequest`] into a ready-to-send builder.
    ///
    /// Applies the per-call timeout and bearer auth. Fails with
    /// [`ClientError::Validation`] when the request cannot be encoded;
    /// nothing has been sent at that point.
    fn build(&self, request: ApiRequest) -> Outcome<reqwest::RequestBuilder> {
        let ApiRequest {
            method,
            path,
            body,
            timeout,
        } = request;

        let url = self.url(&path);
        let mut builder = match method {
            Method::Get => self.client.get(&url),
            Method::Post => self.client.post(&url),
        }
        .timeout(timeout);

        if let Some(token) = &self.auth_token {
            builder = builder.bearer_auth(token);
        }

        Ok(match body {
            RequestBody::Empty => builder,
            RequestBody::Json(json) => builder.json(&json),
            RequestBody::File(FilePart {
                field,
                file_name,
                mime,
                bytes,
            }) => {
                let part = reqwest::multipart::Part::bytes(bytes)
                    .file_name(file_name)
                    .mime_str(&mime)
                    .map_err(|e| {
                        CoreError::Validation(format!("invalid MIME type '{mime}': {e}"))
                    })?;
                builder.multipart(reqwest::multipart::Form::new().part(field, part))
            }
        })
    }
}

#[async_trait]
impl HttpTransport for ReqwestTransport {
    async fn call(&self, request: ApiRequest) -> Outcome<Value> {
        let timeout = request.timeout;
        tracing::debug!(
            method = %request.method,
            path = %request.path,
            timeout_ms = timeout.as_millis() as u64,
            "Calling backend",
        );

        let response = self
            .build(request)?
            .send()
            .await
            .map_err(|e| classify_reqwest_error(&e, timeout))?;
        let status = response.status().as_u16();
        let bytes = response
            .bytes()
            .await
            .map_err(|e| classify_reqwest_error(&e, timeout))?;

        interpret_body(status, &bytes)
    }
}

fn classify_reqwest_error(error: &reqwest::Error, timeout: Duration) -> TransportError {
    if error.is_timeout() {
        TransportError::Timeout(timeout)
    } else if error.is_connect() {
        TransportError::Connect(error.to_string())
    } else if error.is_decode() || error.is_body() {
        TransportError::MalformedBody(error.to_string())
    } else {
        TransportError::Request(error.to_string())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
