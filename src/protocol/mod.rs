//! Per-call request options and the recorded response.

use std::borrow::Cow;
use std::time::Duration;

use reqwest::header::{HeaderMap, CONTENT_TYPE};
use reqwest::Method;
use serde::de::DeserializeOwned;
use serde_json::Value;
use uuid::Uuid;

use crate::errors::ApiError;

// ============================================================================
// REQUEST
// ============================================================================

/// Body sent with a request.
#[derive(Debug, Clone, PartialEq)]
pub enum RequestBody {
    /// Serialized as JSON with `Content-Type: application/json`.
    Json(Value),
    /// URL-encoded form fields.
    Form(Vec<(String, String)>),
    /// Raw text, sent as-is.
    Text(String),
    /// Single-file multipart form.
    File(FilePart),
}

impl RequestBody {
    /// Short printable form for logs.
    pub(crate) fn preview(&self) -> String {
        match self {
            Self::Json(value) => value.to_string(),
            Self::Form(fields) => fields
                .iter()
                .map(|(k, v)| format!("{k}={v}"))
                .collect::<Vec<_>>()
                .join("&"),
            Self::Text(text) => text.clone(),
            Self::File(part) => format!(
                "<multipart {}={} ({} bytes, {})>",
                part.field,
                part.file_name,
                part.bytes.len(),
                part.mime
            ),
        }
    }
}

/// A file carried in a multipart upload.
#[derive(Debug, Clone, PartialEq)]
pub struct FilePart {
    pub field: String,
    pub file_name: String,
    pub mime: String,
    pub bytes: Vec<u8>,
}

/// Per-call overrides. Every `None` falls back to the client configuration.
///
/// ```ignore
/// let options = RequestOptions::new()
///     .expect_status(400)
///     .schema(json!({ "type": "object" }))
///     .header("x-trace", "abc");
/// client.get("/breeds/invalid_id", options).await?;
/// ```
#[derive(Debug, Clone, Default)]
pub struct RequestOptions {
    /// Merged over the client's default headers; same name wins.
    pub headers: Vec<(String, String)>,
    pub query: Vec<(String, String)>,
    pub body: Option<RequestBody>,
    /// Explicit schema; takes precedence over the default table.
    pub schema: Option<Value>,
    pub expected_status: Option<u16>,
    pub assert_status: Option<bool>,
    pub assert_time: Option<bool>,
    pub validate: Option<bool>,
    pub timeout: Option<Duration>,
    pub log_info: Option<bool>,
}

impl RequestOptions {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    #[must_use]
    pub fn query(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((name.into(), value.into()));
        self
    }

    #[must_use]
    pub fn json(mut self, body: Value) -> Self {
        self.body = Some(RequestBody::Json(body));
        self
    }

    #[must_use]
    pub fn form(mut self, fields: Vec<(String, String)>) -> Self {
        self.body = Some(RequestBody::Form(fields));
        self
    }

    #[must_use]
    pub fn text(mut self, body: impl Into<String>) -> Self {
        self.body = Some(RequestBody::Text(body.into()));
        self
    }

    #[must_use]
    pub fn schema(mut self, schema: Value) -> Self {
        self.schema = Some(schema);
        self
    }

    #[must_use]
    pub fn expect_status(mut self, status: u16) -> Self {
        self.expected_status = Some(status);
        self
    }

    #[must_use]
    pub fn assert_status(mut self, enabled: bool) -> Self {
        self.assert_status = Some(enabled);
        self
    }

    #[must_use]
    pub fn assert_time(mut self, enabled: bool) -> Self {
        self.assert_time = Some(enabled);
        self
    }

    #[must_use]
    pub fn validate(mut self, enabled: bool) -> Self {
        self.validate = Some(enabled);
        self
    }

    #[must_use]
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    #[must_use]
    pub fn log_info(mut self, enabled: bool) -> Self {
        self.log_info = Some(enabled);
        self
    }
}

// ============================================================================
// RESPONSE
// ============================================================================

/// Everything recorded about one completed call.
#[derive(Debug, Clone)]
pub struct ApiResponse {
    request_id: Uuid,
    method: Method,
    url: String,
    final_url: String,
    status: u16,
    elapsed: Duration,
    headers: HeaderMap,
    body: Vec<u8>,
    history: Vec<String>,
    cookies: Vec<(String, String)>,
}

/// Raw pieces an [`ApiResponse`] is assembled from.
#[derive(Debug)]
pub(crate) struct ResponseParts {
    pub request_id: Uuid,
    pub method: Method,
    pub url: String,
    pub final_url: String,
    pub status: u16,
    pub elapsed: Duration,
    pub headers: HeaderMap,
    pub body: Vec<u8>,
    pub history: Vec<String>,
    pub cookies: Vec<(String, String)>,
}

impl ApiResponse {
    pub(crate) fn from_parts(parts: ResponseParts) -> Self {
        Self {
            request_id: parts.request_id,
            method: parts.method,
            url: parts.url,
            final_url: parts.final_url,
            status: parts.status,
            elapsed: parts.elapsed,
            headers: parts.headers,
            body: parts.body,
            history: parts.history,
            cookies: parts.cookies,
        }
    }

    /// Identifier shared by the log lines and attachments of this call.
    pub fn request_id(&self) -> Uuid {
        self.request_id
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    /// URL as built from the client configuration.
    pub fn url(&self) -> &str {
        &self.url
    }

    /// URL after following redirects.
    pub fn final_url(&self) -> &str {
        &self.final_url
    }

    pub fn status(&self) -> u16 {
        self.status
    }

    pub fn elapsed(&self) -> Duration {
        self.elapsed
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    pub fn content_type(&self) -> Option<&str> {
        self.headers.get(CONTENT_TYPE).and_then(|v| v.to_str().ok())
    }

    pub fn body(&self) -> &[u8] {
        &self.body
    }

    pub fn text(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.body)
    }

    /// Deserializes the body.
    pub fn json<T: DeserializeOwned>(&self) -> Result<T, ApiError> {
        serde_json::from_slice(&self.body).map_err(|e| ApiError::InvalidJson { reason: e.to_string() })
    }

    /// URLs visited before the final one, in order.
    pub fn history(&self) -> &[String] {
        &self.history
    }

    /// Cookies set by the final response.
    pub fn cookies(&self) -> &[(String, String)] {
        &self.cookies
    }

    pub fn cookie(&self, name: &str) -> Option<&str> {
        self.cookies
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.as_str())
    }
}

#[cfg(test)]
pub(crate) mod fixtures {
    use super::*;
    use reqwest::header::HeaderValue;

    /// Minimal response for validator and report tests.
    pub(crate) fn response(status: u16, content_type: Option<&str>, body: &[u8]) -> ApiResponse {
        let mut headers = HeaderMap::new();
        if let Some(ct) = content_type {
            headers.insert(CONTENT_TYPE, HeaderValue::from_str(ct).unwrap());
        }
        ApiResponse::from_parts(ResponseParts {
            request_id: Uuid::new_v4(),
            method: Method::GET,
            url: "https://api.example.com/items".to_string(),
            final_url: "https://api.example.com/items".to_string(),
            status,
            elapsed: Duration::from_millis(120),
            headers,
            body: body.to_vec(),
            history: vec![],
            cookies: vec![("session".to_string(), "abc".to_string())],
        })
    }
}
