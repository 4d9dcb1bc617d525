//! Base HTTP client shared by the domain clients.
//!
//! Builds URLs from the configured base URL, injects the `Authorization`
//! header and returns the status and body of every call unmodified. Each
//! call is exactly one round trip: no retries, no caching, and no timeout
//! beyond the transport defaults.

use crate::models::{SchemaError, Validate};
use regex::Regex;
use reqwest::{Client, Method, RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::sync::LazyLock;
use thiserror::Error;
use tracing::debug;

/// Maximum length for error body in error messages.
const MAX_ERROR_BODY_LEN: usize = 256;

/// Regex pattern for PASETO tokens (v1..v4, local or public purpose).
static PASETO_PATTERN: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"v[1-4]\.(?:local|public)\.[A-Za-z0-9_\-]+(?:\.[A-Za-z0-9_\-]+)?").ok());

/// Regex pattern for `"token": "..."` JSON members.
static TOKEN_FIELD_PATTERN: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r#""token"\s*:\s*"[^"]*""#).ok());

/// Sanitize a response body before it is quoted in an error.
///
/// Token fields are redacted first, then bare PASETO tokens, then the result
/// is truncated to `MAX_ERROR_BODY_LEN` bytes on a character boundary.
pub fn sanitize_error_body(body: &str) -> String {
    let mut sanitized = body.to_string();

    if let Some(pattern) = TOKEN_FIELD_PATTERN.as_ref() {
        sanitized = pattern
            .replace_all(&sanitized, r#""token":"[REDACTED]""#)
            .into_owned();
    }
    if let Some(pattern) = PASETO_PATTERN.as_ref() {
        sanitized = pattern
            .replace_all(&sanitized, "[TOKEN_REDACTED]")
            .into_owned();
    }

    if sanitized.len() > MAX_ERROR_BODY_LEN {
        let mut cut = MAX_ERROR_BODY_LEN;
        while !sanitized.is_char_boundary(cut) {
            cut -= 1;
        }
        sanitized.truncate(cut);
        sanitized.push_str("...[truncated]");
    }

    sanitized
}

/// HTTP client errors.
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("HTTP request failed: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error("Unexpected status {status} (expected {expected}): {body}")]
    UnexpectedStatus {
        status: u16,
        expected: u16,
        body: String,
    },

    #[error("JSON deserialization failed: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("Response schema mismatch: {0}")]
    SchemaError(#[from] SchemaError),
}

/// Per-call authorization override.
#[derive(Clone, PartialEq, Eq)]
pub enum Auth {
    /// Send no `Authorization` header.
    Anonymous,

    /// Send this value verbatim as the `Authorization` header.
    Token(String),
}

impl std::fmt::Debug for Auth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Auth::Anonymous => f.write_str("Anonymous"),
            Auth::Token(_) => f.write_str("Token([REDACTED])"),
        }
    }
}

/// Status and body of a completed call.
#[derive(Debug, Clone)]
pub struct ApiResponse {
    status: StatusCode,
    body: String,
}

impl ApiResponse {
    pub fn new(status: StatusCode, body: impl Into<String>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    /// Raw response body.
    pub fn text(&self) -> &str {
        &self.body
    }

    /// Deserialize the body as JSON.
    pub fn json<T: DeserializeOwned>(&self) -> Result<T, ClientError> {
        Ok(serde_json::from_str(&self.body)?)
    }

    /// Deserialize and validate the body into a typed model.
    pub fn model<T: DeserializeOwned + Validate>(&self) -> Result<T, ClientError> {
        let value: T = self.json()?;
        value.validate()?;
        Ok(value)
    }

    /// Fail unless the status matches `expected`.
    pub fn expect_status(self, expected: StatusCode) -> Result<Self, ClientError> {
        if self.status != expected {
            return Err(ClientError::UnexpectedStatus {
                status: self.status.as_u16(),
                expected: expected.as_u16(),
                body: sanitize_error_body(&self.body),
            });
        }
        Ok(self)
    }
}

/// Base client bound to a service URL and an optional default token.
#[derive(Clone)]
pub struct HttpClient {
    base_url: String,
    token: Option<String>,
    http_client: Client,
}

impl std::fmt::Debug for HttpClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpClient")
            .field("base_url", &self.base_url)
            .field("token", &self.token.as_ref().map(|_| "[REDACTED]"))
            .finish()
    }
}

impl HttpClient {
    /// Create an unauthenticated client.
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            token: None,
            http_client: Client::new(),
        }
    }

    /// Create a client that sends `token` by default.
    pub fn with_token(base_url: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            token: Some(token.into()),
            ..Self::new(base_url)
        }
    }

    /// Get the base URL.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Whether a default token is bound.
    pub fn is_authenticated(&self) -> bool {
        self.token.is_some()
    }

    /// Join the base URL and a relative path.
    pub fn url(&self, path: &str) -> String {
        format!(
            "{}/{}",
            self.base_url.trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    }

    /// `GET {base}/{path}` with optional query parameters.
    pub async fn get(
        &self,
        path: &str,
        params: Option<&[(&str, String)]>,
        auth: Option<&Auth>,
    ) -> Result<ApiResponse, ClientError> {
        let mut request = self.request(Method::GET, &self.url(path), auth);
        if let Some(params) = params {
            request = request.query(params);
        }
        self.send(request, Method::GET, path).await
    }

    /// `POST {base}/{path}` with a JSON body.
    pub async fn post<B: Serialize + ?Sized>(
        &self,
        path: &str,
        body: &B,
        auth: Option<&Auth>,
    ) -> Result<ApiResponse, ClientError> {
        let request = self.request(Method::POST, &self.url(path), auth).json(body);
        self.send(request, Method::POST, path).await
    }

    /// `PUT {base}/{path}/{id}` with a JSON body.
    pub async fn put<B: Serialize + ?Sized>(
        &self,
        path: &str,
        id: i64,
        body: &B,
        auth: Option<&Auth>,
    ) -> Result<ApiResponse, ClientError> {
        let path = format!("{}/{}", path.trim_end_matches('/'), id);
        let request = self.request(Method::PUT, &self.url(&path), auth).json(body);
        self.send(request, Method::PUT, &path).await
    }

    /// `DELETE {base}/{path}/{id}`.
    pub async fn delete(
        &self,
        path: &str,
        id: i64,
        auth: Option<&Auth>,
    ) -> Result<ApiResponse, ClientError> {
        let path = format!("{}/{}", path.trim_end_matches('/'), id);
        let request = self.request(Method::DELETE, &self.url(&path), auth);
        self.send(request, Method::DELETE, &path).await
    }

    /// Build a request with the effective `Authorization` header.
    ///
    /// An explicit override wins; otherwise the bound token is sent, if any.
    fn request(&self, method: Method, url: &str, auth: Option<&Auth>) -> RequestBuilder {
        let request = self.http_client.request(method, url);

        let header = match auth {
            Some(Auth::Anonymous) => None,
            Some(Auth::Token(token)) => Some(token.as_str()),
            None => self.token.as_deref(),
        };

        match header {
            Some(value) => request.header("Authorization", value),
            None => request,
        }
    }

    async fn send(
        &self,
        request: RequestBuilder,
        method: Method,
        path: &str,
    ) -> Result<ApiResponse, ClientError> {
        let response = request.send().await?;
        let status = response.status();
        let body = response.text().await?;

        debug!(%method, path, status = status.as_u16(), "Service call completed");

        Ok(ApiResponse { status, body })
    }
}
