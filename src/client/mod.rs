//! # Clientes HTTP
//!
//! Duas variantes com o mesmo contrato:
//!
//! - [`AsyncApiClient`]: sobre `reqwest::Client`, para uso com tokio
//! - [`ApiClient`]: sobre `reqwest::blocking::Client`
//!
//! Ambas montam a URL a partir da configuração, mesclam headers, seguem
//! redirects manualmente (registrando o histórico), medem o tempo de
//! resposta e executam os validadores. Um cliente é compartilhável entre
//! tarefas; overrides por chamada nunca alteram o estado compartilhado.

pub mod asynchronous;
pub mod blocking;

use std::fmt::Write as _;
use std::path::Path;
use std::time::{Duration, Instant};

use reqwest::header::{HeaderMap, HeaderName, HeaderValue, LOCATION};
use reqwest::{Identity, Method, StatusCode, Url};
use serde_json::Value;
use tracing::warn;
use uuid::Uuid;

pub use asynchronous::AsyncApiClient;
pub use blocking::ApiClient;

use crate::config::{Auth, ClientConfig};
use crate::errors::ApiError;
use crate::protocol::{ApiResponse, FilePart, RequestBody, RequestOptions, ResponseParts};
use crate::report;

// ============================================================================
// URL & HEADERS
// ============================================================================

/// Builds `scheme://host[:port]/[prefix/]path?query`.
///
/// Any scheme already present in the configured host is dropped in favour
/// of `config.scheme`. Slashes between the pieces never double up.
pub fn build_url(config: &ClientConfig, path: &str, query: &[(String, String)]) -> Result<Url, ApiError> {
    let host = config
        .base_url
        .as_deref()
        .map(str::trim)
        .filter(|h| !h.is_empty())
        .ok_or_else(|| ApiError::missing("BASE_URL"))?;
    let host = host.split_once("://").map_or(host, |(_, rest)| rest);
    let (authority, host_path) = host.split_once('/').unwrap_or((host, ""));

    let mut base = format!("{}://{}", config.scheme, authority);
    if let Some(port) = config.port {
        let _ = write!(base, ":{port}");
    }
    base.push('/');
    for segment in [host_path, config.endpoint_prefix.as_str()] {
        let segment = segment.trim_matches('/');
        if !segment.is_empty() {
            base.push_str(segment);
            base.push('/');
        }
    }

    let invalid = |url: &str, reason: String| ApiError::InvalidUrl {
        url: url.to_string(),
        reason,
    };
    let base_url = Url::parse(&base).map_err(|e| invalid(&base, e.to_string()))?;
    let mut url = base_url
        .join(path.trim_start_matches('/'))
        .map_err(|e| invalid(path, e.to_string()))?;

    if !query.is_empty() {
        url.query_pairs_mut()
            .extend_pairs(query.iter().map(|(k, v)| (k.as_str(), v.as_str())));
    }
    Ok(url)
}

/// Overlays `overrides` on `defaults`. Names compare case-insensitively and
/// an override replaces every default value of that name.
pub fn merge_headers(defaults: &[(String, String)], overrides: &[(String, String)]) -> Vec<(String, String)> {
    let mut merged: Vec<(String, String)> = defaults
        .iter()
        .filter(|(name, _)| !overrides.iter().any(|(o, _)| o.eq_ignore_ascii_case(name)))
        .cloned()
        .collect();
    merged.extend(overrides.iter().cloned());
    merged
}

// ============================================================================
// PREPARED REQUEST
// ============================================================================

/// One concrete hop: method, absolute URL, merged headers and body.
#[derive(Debug, Clone)]
pub(crate) struct PreparedRequest {
    pub request_id: Uuid,
    pub method: Method,
    pub url: Url,
    pub headers: Vec<(String, String)>,
    pub body: Option<RequestBody>,
    /// Cleared once a redirect leaves the original origin.
    pub send_auth: bool,
}

impl PreparedRequest {
    pub(crate) fn new(
        config: &ClientConfig,
        method: Method,
        path: &str,
        options: &RequestOptions,
    ) -> Result<Self, ApiError> {
        let prepared = Self {
            request_id: Uuid::new_v4(),
            method,
            url: build_url(config, path, &options.query)?,
            headers: merge_headers(&config.headers, &options.headers),
            body: options.body.clone(),
            send_auth: true,
        };
        prepared.header_map()?;
        Ok(prepared)
    }

    pub(crate) fn header_map(&self) -> Result<HeaderMap, ApiError> {
        let mut map = HeaderMap::with_capacity(self.headers.len());
        for (name, value) in &self.headers {
            let invalid = |reason: String| ApiError::InvalidHeader {
                name: name.clone(),
                reason,
            };
            let header_name = HeaderName::from_bytes(name.as_bytes()).map_err(|e| invalid(e.to_string()))?;
            let header_value = HeaderValue::from_str(value).map_err(|e| invalid(e.to_string()))?;
            map.append(header_name, header_value);
        }
        Ok(map)
    }

    pub(crate) fn has_header(&self, name: &str) -> bool {
        self.headers.iter().any(|(n, _)| n.eq_ignore_ascii_case(name))
    }

    /// Configured auth is applied unless an explicit `Authorization`
    /// header is present or a redirect crossed origins.
    pub(crate) fn applies_auth(&self) -> bool {
        self.send_auth && !self.has_header("authorization")
    }

    /// Next hop for a redirect response, or `None` when `status` is not a
    /// followable redirect.
    ///
    /// - 301/302: POST becomes GET without body, other methods are kept
    /// - 303: everything but HEAD becomes GET without body
    /// - 307/308: method and body are kept
    ///
    /// Leaving the origin strips credential headers and configured auth.
    pub(crate) fn follow(&self, status: u16, location: Option<&str>) -> Option<Self> {
        let location = location?;
        let (method, keep_body) = match status {
            301 | 302 if self.method == Method::POST => (Method::GET, false),
            301 | 302 => (self.method.clone(), true),
            303 if self.method == Method::HEAD => (Method::HEAD, false),
            303 => (Method::GET, false),
            307 | 308 => (self.method.clone(), true),
            _ => return None,
        };
        let url = self.url.join(location).ok()?;
        let same_origin = url.origin() == self.url.origin();

        let mut headers = self.headers.clone();
        if !keep_body {
            headers.retain(|(n, _)| !n.eq_ignore_ascii_case("content-type") && !n.eq_ignore_ascii_case("content-length"));
        }
        if !same_origin {
            headers.retain(|(n, _)| !report::is_sensitive(n));
        }

        Some(Self {
            request_id: self.request_id,
            method,
            url,
            headers,
            body: if keep_body { self.body.clone() } else { None },
            send_auth: self.send_auth && same_origin,
        })
    }

    /// Adds configured auth (when [`applies_auth`](Self::applies_auth))
    /// and the body to `builder`.
    pub(crate) fn apply<B: HopBuilder>(&self, builder: B, auth: &Auth) -> Result<B, ApiError> {
        let builder = match auth {
            _ if !self.applies_auth() => builder,
            Auth::None => builder,
            Auth::Basic { username, password } => builder.with_basic_auth(username, password),
            Auth::Bearer(token) => builder.with_bearer(token),
        };
        match &self.body {
            None => Ok(builder),
            Some(RequestBody::Json(value)) => Ok(builder.with_json(value)),
            Some(RequestBody::Form(fields)) => Ok(builder.with_form(fields)),
            Some(RequestBody::Text(text)) => Ok(builder.with_text(text)),
            Some(RequestBody::File(part)) => builder.with_file(part),
        }
    }
}

/// What [`PreparedRequest::apply`] needs from the async and blocking
/// `reqwest` request builders.
pub(crate) trait HopBuilder: Sized {
    fn with_basic_auth(self, username: &str, password: &str) -> Self;
    fn with_bearer(self, token: &str) -> Self;
    fn with_json(self, value: &Value) -> Self;
    fn with_form(self, fields: &[(String, String)]) -> Self;
    fn with_text(self, text: &str) -> Self;
    fn with_file(self, part: &FilePart) -> Result<Self, ApiError>;
}

pub(crate) fn invalid_mime(source: reqwest::Error) -> ApiError {
    ApiError::InvalidHeader {
        name: "content-type".to_string(),
        reason: source.to_string(),
    }
}

// ============================================================================
// SHARED PLUMBING
// ============================================================================

/// What led to the final response of a redirect chain.
pub(crate) struct Trail {
    pub method: Method,
    pub url: String,
    pub last: PreparedRequest,
    pub history: Vec<String>,
    pub started: Instant,
}

/// Status line, headers and cookies captured before the body is consumed.
pub(crate) struct ResponseHead {
    pub status: u16,
    pub final_url: String,
    pub headers: HeaderMap,
    pub cookies: Vec<(String, String)>,
}

impl ResponseHead {
    pub(crate) fn new<'a>(
        status: StatusCode,
        url: &Url,
        headers: &HeaderMap,
        cookies: impl Iterator<Item = reqwest::cookie::Cookie<'a>>,
    ) -> Self {
        Self {
            status: status.as_u16(),
            final_url: url.to_string(),
            headers: headers.clone(),
            cookies: cookies
                .map(|c| (c.name().to_string(), c.value().to_string()))
                .collect(),
        }
    }
}

impl Trail {
    pub(crate) fn start(first: PreparedRequest) -> Self {
        Self {
            method: first.method.clone(),
            url: first.url.to_string(),
            last: first,
            history: Vec::new(),
            started: Instant::now(),
        }
    }

    /// Moves to the redirect target of a `status`/`headers` response.
    /// Returns `false` when the response is final, and fails once
    /// `max_redirects` hops are used up.
    pub(crate) fn advance(&mut self, config: &ClientConfig, status: StatusCode, headers: &HeaderMap) -> Result<bool, ApiError> {
        if config.max_redirects == 0 {
            return Ok(false);
        }
        let status = status.as_u16();
        let location = headers.get(LOCATION).and_then(|v| v.to_str().ok());
        let Some(next) = self.last.follow(status, location) else {
            return Ok(false);
        };
        if self.history.len() >= config.max_redirects {
            return Err(ApiError::TooManyRedirects {
                method: self.method.to_string(),
                url: self.url.clone(),
                max: config.max_redirects,
            });
        }
        report::record_redirect(config, &self.last, status, &next.url);
        self.history.push(self.last.url.to_string());
        self.last = next;
        Ok(true)
    }

    pub(crate) fn assemble(self, head: ResponseHead, body: Vec<u8>, elapsed: Duration) -> (ApiResponse, PreparedRequest) {
        let response = ApiResponse::from_parts(ResponseParts {
            request_id: self.last.request_id,
            method: self.method,
            url: self.url,
            final_url: head.final_url,
            status: head.status,
            elapsed,
            headers: head.headers,
            body,
            history: self.history,
            cookies: head.cookies,
        });
        (response, self.last)
    }
}

pub(crate) fn transport(request: &PreparedRequest, source: reqwest::Error) -> ApiError {
    ApiError::Transport {
        method: request.method.to_string(),
        url: request.url.to_string(),
        source,
    }
}

/// Removes a download target left incomplete by a failed transfer.
pub(crate) fn discard_partial(path: &Path) {
    if let Err(e) = std::fs::remove_file(path) {
        warn!(path = %path.display(), error = %e, "Failed to remove partial download");
    }
}

/// Reads a PEM bundle holding the client certificate and its key.
pub(crate) fn load_identity(path: Option<&Path>) -> Result<Option<Identity>, ApiError> {
    let Some(path) = path else {
        return Ok(None);
    };
    let invalid = |reason: String| ApiError::InvalidCertificate {
        path: path.to_path_buf(),
        reason,
    };
    let pem = std::fs::read(path).map_err(|e| invalid(e.to_string()))?;
    let identity = Identity::from_pem(&pem).map_err(|e| invalid(e.to_string()))?;
    Ok(Some(identity))
}

/// Multipart part for `file_path`, MIME type guessed from the extension.
pub(crate) fn file_part(field: &str, file_path: &Path, bytes: Vec<u8>) -> FilePart {
    FilePart {
        field: field.to_string(),
        file_name: file_path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "upload".to_string()),
        mime: mime_guess::from_path(file_path)
            .first_or_octet_stream()
            .essence_str()
            .to_string(),
        bytes,
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use std::net::SocketAddr;
    use std::sync::Arc;

    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;
    use wiremock::MockServer;

    use crate::config::ClientConfig;
    use crate::report::MemorySink;

    /// Plain-HTTP config pointing at a mock server.
    pub(crate) fn config_for(server: &MockServer) -> (ClientConfig, Arc<MemorySink>) {
        let sink = Arc::new(MemorySink::new());
        let config = ClientConfig {
            scheme: "http".to_string(),
            sink: sink.clone(),
            ..ClientConfig::for_host(server.address().to_string())
        };
        (config, sink)
    }

    /// Raw HTTP server that promises a 1000-byte body, sends 7 bytes and
    /// hangs up.
    pub(crate) async fn truncated_body_server() -> SocketAddr {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            while let Ok((mut socket, _)) = listener.accept().await {
                let mut request = [0u8; 4096];
                let _ = socket.read(&mut request).await;
                let _ = socket
                    .write_all(
                        b"HTTP/1.1 200 OK\r\n\
                          Content-Type: application/octet-stream\r\n\
                          Content-Length: 1000\r\n\r\npartial",
                    )
                    .await;
                let _ = socket.shutdown().await;
            }
        });
        addr
    }

    pub(crate) fn image_schema() -> serde_json::Value {
        serde_json::from_str(include_str!("../../schemas/image_200.json")).unwrap()
    }

    pub(crate) fn image_body() -> serde_json::Value {
        serde_json::json!({
            "id": "6euYVVE_u",
            "url": "https://cdn2.thedogapi.com/images/6euYVVE_u.jpg",
            "width": 1080,
            "height": 1080,
            "breeds": []
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn pairs(items: &[(&str, &str)]) -> Vec<(String, String)> {
        items.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
    }

    fn config(host: &str, prefix: &str) -> ClientConfig {
        ClientConfig {
            endpoint_prefix: prefix.to_string(),
            ..ClientConfig::for_host(host)
        }
    }

    #[test]
    fn test_build_url_joins_without_double_slashes() {
        let config = config("api.thedogapi.com/", "/v1/");
        for path in ["images/search", "/images/search", "//images/search"] {
            let url = build_url(&config, path, &[]).unwrap();
            assert_eq!(url.as_str(), "https://api.thedogapi.com/v1/images/search");
        }
    }

    #[test]
    fn test_build_url_replaces_scheme_and_adds_port() {
        let config = ClientConfig {
            scheme: "http".to_string(),
            port: Some(8080),
            ..ClientConfig::for_host("https://localhost")
        };
        let url = build_url(&config, "/health", &[]).unwrap();
        assert_eq!(url.as_str(), "http://localhost:8080/health");
    }

    #[test]
    fn test_build_url_keeps_host_path_and_query() {
        let config = config("example.com/api", "v2");
        let url = build_url(&config, "items", &pairs(&[("q", "a b"), ("limit", "5")])).unwrap();
        assert_eq!(url.as_str(), "https://example.com/api/v2/items?q=a+b&limit=5");
    }

    #[test]
    fn test_build_url_without_host() {
        let config = ClientConfig::default();
        let err = build_url(&config, "/x", &[]).unwrap_err();
        assert!(matches!(err, ApiError::MissingSetting { name } if name == "BASE_URL"));
    }

    #[test]
    fn test_build_url_rejects_bad_host() {
        let config = ClientConfig::for_host("exa mple.com");
        assert!(matches!(build_url(&config, "/", &[]), Err(ApiError::InvalidUrl { .. })));
    }

    #[test]
    fn test_merge_headers_override_wins_case_insensitively() {
        let merged = merge_headers(
            &pairs(&[("Accept", "application/json"), ("X-Team", "qa")]),
            &pairs(&[("accept", "text/plain"), ("X-Trace", "1")]),
        );
        assert_eq!(
            merged,
            pairs(&[("X-Team", "qa"), ("accept", "text/plain"), ("X-Trace", "1")])
        );
    }

    #[test]
    fn test_merge_headers_leaves_inputs_untouched() {
        let defaults = pairs(&[("a", "1")]);
        let overrides = pairs(&[("b", "2")]);
        let merged = merge_headers(&defaults, &overrides);
        assert_eq!(merged.len(), 2);
        assert_eq!(defaults, pairs(&[("a", "1")]));
    }

    #[test]
    fn test_prepare_rejects_invalid_header() {
        let config = ClientConfig::for_host("example.com");
        let options = RequestOptions::new().header("bad header", "x");
        let err = PreparedRequest::new(&config, Method::GET, "/", &options).unwrap_err();
        assert!(matches!(err, ApiError::InvalidHeader { .. }));
    }

    fn post_with_auth() -> PreparedRequest {
        let config = ClientConfig::for_host("api.example.com");
        let options = RequestOptions::new()
            .header("Authorization", "Bearer t")
            .header("Content-Type", "application/json")
            .json(json!({ "a": 1 }));
        PreparedRequest::new(&config, Method::POST, "/start", &options).unwrap()
    }

    #[test]
    fn test_follow_302_post_becomes_get() {
        let next = post_with_auth().follow(302, Some("/next")).unwrap();
        assert_eq!(next.method, Method::GET);
        assert!(next.body.is_none());
        assert!(!next.has_header("content-type"));
        assert_eq!(next.url.as_str(), "https://api.example.com/next");
        assert!(next.has_header("authorization"));
    }

    #[test]
    fn test_follow_307_keeps_method_and_body() {
        let next = post_with_auth().follow(307, Some("https://api.example.com/again")).unwrap();
        assert_eq!(next.method, Method::POST);
        assert!(next.body.is_some());
    }

    #[test]
    fn test_follow_cross_origin_drops_credentials() {
        let next = post_with_auth().follow(308, Some("https://other.example.org/x")).unwrap();
        assert!(!next.has_header("authorization"));
        assert!(!next.send_auth);
    }

    #[test]
    fn test_follow_ignores_non_redirects() {
        let request = post_with_auth();
        assert!(request.follow(200, Some("/x")).is_none());
        assert!(request.follow(304, Some("/x")).is_none());
        assert!(request.follow(302, None).is_none());
    }

    #[test]
    fn test_explicit_authorization_disables_configured_auth() {
        let request = post_with_auth();
        assert!(!request.applies_auth());
    }

    #[test]
    fn test_file_part_guesses_mime() {
        let part = file_part("file", Path::new("/tmp/dog.png"), vec![1]);
        assert_eq!(part.file_name, "dog.png");
        assert_eq!(part.mime, "image/png");

        let unknown = file_part("file", Path::new("blob.unknownext"), vec![]);
        assert_eq!(unknown.mime, "application/octet-stream");
    }

    #[test]
    fn test_missing_certificate_file() {
        let err = load_identity(Some(Path::new("/nonexistent/client.pem"))).unwrap_err();
        assert!(matches!(err, ApiError::InvalidCertificate { .. }));
        assert!(load_identity(None).unwrap().is_none());
    }
}
