//! # Relatório por Chamada
//!
//! Cada chamada deixa um rastro legível:
//!
//! - logs estruturados (método, URL, headers, corpo truncado, status)
//! - anexo **"Response Info"**: JSON com URL final, redirects, cookies,
//!   headers e corpo
//! - anexo **"cURL Request"**: comando `curl` equivalente
//! - anexo **"Redirect Request"** para cada redirect seguido
//!
//! Os anexos vão para um [`ReportSink`]. O padrão ([`TracingSink`]) só
//! emite eventos `debug`; [`MemorySink`] guarda tudo para inspeção.

use std::borrow::Cow;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Mutex, PoisonError};

use reqwest::header::HeaderMap;
use reqwest::Url;
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, info};
use uuid::Uuid;

use crate::client::PreparedRequest;
use crate::config::{Auth, CallSettings, ClientConfig};
use crate::protocol::{ApiResponse, RequestBody};

pub const RESPONSE_INFO: &str = "Response Info";
pub const CURL_REQUEST: &str = "cURL Request";
pub const REDIRECT_REQUEST: &str = "Redirect Request";

/// Header names whose values never reach logs or transcripts.
pub const SENSITIVE_HEADERS: &[&str] = &["authorization", "proxy-authorization", "cookie", "x-api-key"];

/// JSON keys and form fields whose values never reach logs or transcripts.
pub const SENSITIVE_FIELDS: &[&str] = &[
    "password",
    "secret",
    "client_secret",
    "api_key",
    "access_token",
    "refresh_token",
];

/// Body previews in log lines are cut to this many characters.
pub const LOG_BODY_LIMIT: usize = 200;

// ============================================================================
// SINKS
// ============================================================================

/// Receives named text attachments produced by each call.
pub trait ReportSink: fmt::Debug + Send + Sync {
    fn attach(&self, name: &str, content: &str);
}

/// Emits attachments as `debug` events.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl ReportSink for TracingSink {
    fn attach(&self, name: &str, content: &str) {
        debug!(attachment = name, "{}", content);
    }
}

/// One collected attachment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attachment {
    pub name: String,
    pub content: String,
}

/// Keeps every attachment in memory.
#[derive(Debug, Default)]
pub struct MemorySink {
    entries: Mutex<Vec<Attachment>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn attachments(&self) -> Vec<Attachment> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    /// Contents of every attachment called `name`, oldest first.
    pub fn named(&self, name: &str) -> Vec<String> {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|a| a.name == name)
            .map(|a| a.content.clone())
            .collect()
    }

    pub fn clear(&self) {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner).clear();
    }
}

impl ReportSink for MemorySink {
    fn attach(&self, name: &str, content: &str) {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(Attachment {
                name: name.to_string(),
                content: content.to_string(),
            });
    }
}

// ============================================================================
// RESPONSE INFO
// ============================================================================

/// Serializable summary of one exchange.
#[derive(Debug, Serialize)]
pub struct ResponseInfo {
    pub request_id: Uuid,
    pub timestamp: String,
    pub url: String,
    pub final_url: String,
    pub method: String,
    pub status_code: u16,
    /// Seconds.
    pub response_time: f64,
    pub history_redirects: Vec<String>,
    pub cookies: BTreeMap<String, String>,
    pub headers: BTreeMap<String, String>,
    pub body: String,
}

impl ResponseInfo {
    pub fn from_response(response: &ApiResponse) -> Self {
        Self {
            request_id: response.request_id(),
            timestamp: chrono::Utc::now().to_rfc3339(),
            url: response.url().to_string(),
            final_url: response.final_url().to_string(),
            method: response.method().to_string(),
            status_code: response.status(),
            response_time: response.elapsed().as_secs_f64(),
            history_redirects: response.history().to_vec(),
            cookies: response.cookies().iter().cloned().collect(),
            headers: header_map_entries(response.headers()).into_iter().collect(),
            body: response.text().into_owned(),
        }
    }

    pub fn to_pretty_json(&self) -> String {
        serde_json::to_string_pretty(self).unwrap_or_else(|e| format!("<unserializable response info: {e}>"))
    }
}

// ============================================================================
// CURL
// ============================================================================

/// Shell command reproducing `request`. Secrets are masked.
pub(crate) fn curl_command(request: &PreparedRequest, auth: &Auth) -> String {
    let mut parts = vec!["curl".to_string()];

    if request.method == reqwest::Method::HEAD {
        parts.push("--head".to_string());
    } else if request.method != reqwest::Method::GET {
        parts.push(format!("-X {}", request.method));
    }

    for (name, value) in redact(&request.headers) {
        parts.push(format!("-H {}", shell_quote(&format!("{name}: {value}"))));
    }

    if request.applies_auth() {
        match auth {
            Auth::None => {}
            Auth::Basic { username, .. } => parts.push(format!("-u {}", shell_quote(&format!("{username}:***")))),
            Auth::Bearer(_) => parts.push(format!("-H {}", shell_quote("Authorization: Bearer ***"))),
        }
    }

    let body = request.body.as_ref().map(redact_body);
    match body.as_deref() {
        None => {}
        Some(RequestBody::Json(value)) => {
            if !request.has_header("content-type") {
                parts.push(format!("-H {}", shell_quote("Content-Type: application/json")));
            }
            parts.push(format!("-d {}", shell_quote(&value.to_string())));
        }
        Some(RequestBody::Form(fields)) => {
            for (k, v) in fields {
                parts.push(format!("--data-urlencode {}", shell_quote(&format!("{k}={v}"))));
            }
        }
        Some(RequestBody::Text(text)) => parts.push(format!("-d {}", shell_quote(text))),
        Some(RequestBody::File(part)) => parts.push(format!(
            "-F {}",
            shell_quote(&format!("{}=@{};type={}", part.field, part.file_name, part.mime))
        )),
    }

    parts.push(shell_quote(request.url.as_str()));
    parts.join(" ")
}

fn shell_quote(raw: &str) -> String {
    format!("'{}'", raw.replace('\'', "'\\''"))
}

// ============================================================================
// LOGGING
// ============================================================================

/// Copies `headers`, masking [`SENSITIVE_HEADERS`].
pub fn redact(headers: &[(String, String)]) -> Vec<(String, String)> {
    headers
        .iter()
        .map(|(name, value)| {
            if is_sensitive(name) {
                (name.clone(), "***".to_string())
            } else {
                (name.clone(), value.clone())
            }
        })
        .collect()
}

pub(crate) fn is_sensitive(name: &str) -> bool {
    SENSITIVE_HEADERS.iter().any(|s| s.eq_ignore_ascii_case(name))
}

/// Masks [`SENSITIVE_FIELDS`] in JSON bodies (at any depth) and form bodies.
/// Text and multipart bodies are returned as they are.
pub fn redact_body(body: &RequestBody) -> Cow<'_, RequestBody> {
    match body {
        RequestBody::Json(value) => Cow::Owned(RequestBody::Json(redact_json(value))),
        RequestBody::Form(fields) => Cow::Owned(RequestBody::Form(
            fields
                .iter()
                .map(|(k, v)| {
                    let v = if is_sensitive_field(k) { "***".to_string() } else { v.clone() };
                    (k.clone(), v)
                })
                .collect(),
        )),
        other => Cow::Borrowed(other),
    }
}

fn redact_json(value: &Value) -> Value {
    match value {
        Value::Object(map) => Value::Object(
            map.iter()
                .map(|(k, v)| {
                    let v = if is_sensitive_field(k) {
                        Value::String("***".to_string())
                    } else {
                        redact_json(v)
                    };
                    (k.clone(), v)
                })
                .collect(),
        ),
        Value::Array(items) => Value::Array(items.iter().map(redact_json).collect()),
        other => other.clone(),
    }
}

fn is_sensitive_field(name: &str) -> bool {
    SENSITIVE_FIELDS.iter().any(|s| s.eq_ignore_ascii_case(name))
}

/// Cuts `text` to `limit` characters, appending `...` when cut.
pub fn truncate(text: &str, limit: usize) -> String {
    match text.char_indices().nth(limit) {
        Some((idx, _)) => format!("{}...", &text[..idx]),
        None => text.to_string(),
    }
}

fn header_map_entries(headers: &HeaderMap) -> Vec<(String, String)> {
    headers
        .iter()
        .map(|(name, value)| {
            (
                name.as_str().to_string(),
                String::from_utf8_lossy(value.as_bytes()).into_owned(),
            )
        })
        .collect()
}

fn format_headers(headers: &[(String, String)]) -> String {
    headers
        .iter()
        .map(|(k, v)| format!("{k}: {v}"))
        .collect::<Vec<_>>()
        .join(", ")
}

/// Logs and attaches one completed exchange. `last` is the request that
/// produced the final response.
pub(crate) fn record_exchange(
    config: &ClientConfig,
    call: &CallSettings,
    last: &PreparedRequest,
    response: &ApiResponse,
) {
    if call.log_info {
        let request_body = last
            .body
            .as_ref()
            .map(|b| truncate(&redact_body(b).preview(), LOG_BODY_LIMIT))
            .unwrap_or_default();
        info!(
            request_id = %response.request_id(),
            method = %last.method,
            url = %last.url,
            headers = %format_headers(&redact(&last.headers)),
            body = %request_body,
            "Request sent"
        );
        info!(
            request_id = %response.request_id(),
            status = response.status(),
            elapsed_ms = response.elapsed().as_millis() as u64,
            headers = %format_headers(&redact(&header_map_entries(response.headers()))),
            body = %truncate(&response.text(), LOG_BODY_LIMIT),
            "Response received"
        );
    }

    config
        .sink
        .attach(RESPONSE_INFO, &ResponseInfo::from_response(response).to_pretty_json());
    config.sink.attach(CURL_REQUEST, &curl_command(last, &config.auth));
}

/// Logs and attaches a redirect hop about to be followed.
pub(crate) fn record_redirect(config: &ClientConfig, hop: &PreparedRequest, status: u16, next: &Url) {
    info!(request_id = %hop.request_id, status, from = %hop.url, "Redirected to: {}", next);
    config.sink.attach(REDIRECT_REQUEST, &curl_command(hop, &config.auth));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{fixtures, FilePart};
    use reqwest::Method;
    use serde_json::{json, Value};

    fn prepared(method: Method, headers: &[(&str, &str)], body: Option<RequestBody>) -> PreparedRequest {
        PreparedRequest {
            request_id: Uuid::new_v4(),
            method,
            url: Url::parse("https://api.example.com/v1/items?limit=5").unwrap(),
            headers: headers
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
            body,
            send_auth: true,
        }
    }

    #[test]
    fn test_curl_get_has_no_method_flag() {
        let request = prepared(Method::GET, &[("accept", "application/json")], None);
        assert_eq!(
            curl_command(&request, &Auth::None),
            "curl -H 'accept: application/json' 'https://api.example.com/v1/items?limit=5'"
        );
    }

    #[test]
    fn test_curl_post_json_adds_content_type() {
        let request = prepared(Method::POST, &[], Some(RequestBody::Json(json!({ "name": "O'Neil" }))));
        let curl = curl_command(&request, &Auth::None);
        assert!(curl.starts_with("curl -X POST"));
        assert!(curl.contains("-H 'Content-Type: application/json'"));
        assert!(curl.contains(r#"-d '{"name":"O'\''Neil"}'"#));
    }

    #[test]
    fn test_curl_masks_secrets() {
        let request = prepared(Method::GET, &[("x-api-key", "live-key")], None);
        let curl = curl_command(
            &request,
            &Auth::Basic {
                username: "admin".into(),
                password: "hunter2".into(),
            },
        );
        assert!(curl.contains("-H 'x-api-key: ***'"));
        assert!(curl.contains("-u 'admin:***'"));
        assert!(!curl.contains("live-key"));
        assert!(!curl.contains("hunter2"));
    }

    #[test]
    fn test_curl_masks_password_fields() {
        let login = prepared(
            Method::POST,
            &[],
            Some(RequestBody::Json(json!({
                "username": "qa",
                "password": "hunter2",
                "profile": { "Client_Secret": "s3", "tags": ["a"] }
            }))),
        );
        let curl = curl_command(&login, &Auth::None);
        assert!(curl.contains(r#""password":"***""#));
        assert!(curl.contains(r#""Client_Secret":"***""#));
        assert!(curl.contains(r#""username":"qa""#));
        assert!(!curl.contains("hunter2"));
        assert!(!curl.contains("s3"));

        let form = prepared(
            Method::POST,
            &[],
            Some(RequestBody::Form(vec![
                ("username".into(), "qa".into()),
                ("password".into(), "hunter2".into()),
            ])),
        );
        let curl = curl_command(&form, &Auth::None);
        assert!(curl.contains("--data-urlencode 'password=***'"));
        assert!(curl.contains("--data-urlencode 'username=qa'"));
    }

    #[test]
    fn test_redact_body_leaves_text_untouched() {
        let text = RequestBody::Text("password=plain".into());
        assert!(matches!(redact_body(&text), Cow::Borrowed(_)));
    }

    #[test]
    fn test_curl_multipart_and_head() {
        let part = FilePart {
            field: "file".into(),
            file_name: "dog.png".into(),
            mime: "image/png".into(),
            bytes: vec![1, 2, 3],
        };
        let upload = prepared(Method::POST, &[], Some(RequestBody::File(part)));
        assert!(curl_command(&upload, &Auth::None).contains("-F 'file=@dog.png;type=image/png'"));

        let head = prepared(Method::HEAD, &[], None);
        assert!(curl_command(&head, &Auth::None).starts_with("curl --head"));
    }

    #[test]
    fn test_truncate_respects_char_boundaries() {
        assert_eq!(truncate("short", 10), "short");
        assert_eq!(truncate("abcdef", 3), "abc...");
        assert_eq!(truncate("ãéîõü", 2), "ãé...");
    }

    #[test]
    fn test_redact_is_case_insensitive() {
        let headers = vec![
            ("Authorization".to_string(), "Bearer x".to_string()),
            ("Accept".to_string(), "*/*".to_string()),
        ];
        let redacted = redact(&headers);
        assert_eq!(redacted[0].1, "***");
        assert_eq!(redacted[1].1, "*/*");
    }

    #[test]
    fn test_response_info_json() {
        let response = fixtures::response(201, Some("application/json"), br#"{"ok":true}"#);
        let info: Value = serde_json::from_str(&ResponseInfo::from_response(&response).to_pretty_json()).unwrap();

        assert_eq!(info["status_code"], 201);
        assert_eq!(info["method"], "GET");
        assert_eq!(info["cookies"]["session"], "abc");
        assert_eq!(info["headers"]["content-type"], "application/json");
        assert_eq!(info["body"], r#"{"ok":true}"#);
        assert!(info["history_redirects"].as_array().unwrap().is_empty());
    }

    #[test]
    fn test_record_exchange_attaches_info_and_curl() {
        let sink = std::sync::Arc::new(MemorySink::new());
        let config = ClientConfig {
            sink: sink.clone(),
            ..ClientConfig::for_host("api.example.com")
        };
        let call = config.resolve(&Default::default());
        let request = prepared(Method::GET, &[], None);
        let response = fixtures::response(200, Some("application/json"), b"{}");

        record_exchange(&config, &call, &request, &response);

        assert_eq!(sink.named(RESPONSE_INFO).len(), 1);
        assert_eq!(sink.named(CURL_REQUEST).len(), 1);
        assert!(sink.named(REDIRECT_REQUEST).is_empty());

        sink.clear();
        assert!(sink.attachments().is_empty());
    }
}
