//! # Configuração do Cliente
//!
//! Dois níveis:
//!
//! - [`Settings`]: lido uma vez do ambiente (host, porta, TLS, tetos de
//!   tempo, credenciais das identidades).
//! - [`ClientConfig`]: configuração imutável de um cliente. Cada chamada
//!   resolve seus overrides num [`CallSettings`] local, sem tocar no
//!   config compartilhado.
//!
//! ## Variáveis de ambiente
//!
//! | Variável                 | Padrão        |
//! |--------------------------|---------------|
//! | `BASE_URL`               | (obrigatória) |
//! | `PORT`                   | -             |
//! | `API_SCHEME`             | `https`       |
//! | `ENDPOINT_PREFIX`        | -             |
//! | `VERIFY_SSL_CERTIFICATE` | `true`        |
//! | `CERTIFICATE_PATH`       | -             |
//! | `REQUEST_TIMEOUT`        | `30` (s)      |
//! | `MAX_RESPONSE_TIME`      | `10` (s)      |
//! | `USERNAME_ADMIN` / `PASSWORD_ADMIN` | - |
//! | `USERNAME_USER` / `PASSWORD_USER`   | - |
//! | `API_KEY`                | -             |
//! | `LOGIN_PATH`             | `/auth/login` |
//! | `SCHEMAS_DIR`            | -             |

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use crate::errors::ApiError;
use crate::protocol::RequestOptions;
use crate::report::{ReportSink, TracingSink};
use crate::schemas::SchemaStore;
use crate::validation::DEFAULT_MAX_RESPONSE_TIME;

pub const DEFAULT_SCHEME: &str = "https";
/// Transport timeout. Kept above the response-time ceiling so a slow
/// response fails the time assertion instead of the transport.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);
pub const DEFAULT_EXPECTED_STATUS: u16 = 200;
pub const DEFAULT_MAX_REDIRECTS: usize = 10;
pub const DEFAULT_LOGIN_PATH: &str = "/auth/login";

// ============================================================================
// AUTH
// ============================================================================

/// Session-level credentials applied to every request.
#[derive(Clone, Default, PartialEq, Eq)]
pub enum Auth {
    #[default]
    None,
    Basic {
        username: String,
        password: String,
    },
    Bearer(String),
}

impl fmt::Debug for Auth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::None => write!(f, "None"),
            Self::Basic { username, .. } => write!(f, "Basic({username}:***)"),
            Self::Bearer(_) => write!(f, "Bearer(***)"),
        }
    }
}

// ============================================================================
// CLIENT CONFIG
// ============================================================================

/// Immutable configuration of one client instance.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Host name, e.g. `api.thedogapi.com`. Required to build URLs.
    pub base_url: Option<String>,
    pub scheme: String,
    pub port: Option<u16>,
    /// Path segment inserted between the host and every request path.
    pub endpoint_prefix: String,
    pub headers: Vec<(String, String)>,
    pub auth: Auth,
    pub verify_tls: bool,
    /// PEM file holding the client certificate and its private key.
    pub client_cert: Option<PathBuf>,
    pub timeout: Duration,
    pub expected_status: u16,
    pub assert_status: bool,
    pub validate: bool,
    pub assert_time: bool,
    pub max_response_time: Duration,
    pub log_info: bool,
    /// `0` disables redirect following.
    pub max_redirects: usize,
    pub schemas: Arc<SchemaStore>,
    pub sink: Arc<dyn ReportSink>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: None,
            scheme: DEFAULT_SCHEME.to_string(),
            port: None,
            endpoint_prefix: String::new(),
            headers: Vec::new(),
            auth: Auth::None,
            verify_tls: true,
            client_cert: None,
            timeout: DEFAULT_TIMEOUT,
            expected_status: DEFAULT_EXPECTED_STATUS,
            assert_status: true,
            validate: true,
            assert_time: true,
            max_response_time: DEFAULT_MAX_RESPONSE_TIME,
            log_info: true,
            max_redirects: DEFAULT_MAX_REDIRECTS,
            schemas: Arc::new(SchemaStore::builtin()),
            sink: Arc::new(TracingSink),
        }
    }
}

impl ClientConfig {
    /// Default configuration pointed at `host`.
    pub fn for_host(host: impl Into<String>) -> Self {
        Self {
            base_url: Some(host.into()),
            ..Default::default()
        }
    }

    #[must_use]
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Effective settings for one call. Never mutates `self`.
    pub fn resolve(&self, options: &RequestOptions) -> CallSettings {
        CallSettings {
            expected_status: options.expected_status.unwrap_or(self.expected_status),
            assert_status: options.assert_status.unwrap_or(self.assert_status),
            assert_time: options.assert_time.unwrap_or(self.assert_time),
            validate: options.validate.unwrap_or(self.validate),
            timeout: options.timeout.unwrap_or(self.timeout),
            log_info: options.log_info.unwrap_or(self.log_info),
            max_response_time: self.max_response_time,
        }
    }
}

/// Settings in force for a single call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CallSettings {
    pub expected_status: u16,
    pub assert_status: bool,
    pub assert_time: bool,
    pub validate: bool,
    pub timeout: Duration,
    pub log_info: bool,
    pub max_response_time: Duration,
}

// ============================================================================
// SETTINGS (AMBIENTE)
// ============================================================================

/// Username/password pair for one identity class.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"***")
            .finish()
    }
}

/// Process-level settings, read once at start-up.
#[derive(Clone)]
pub struct Settings {
    pub base_url: Option<String>,
    pub scheme: String,
    pub port: Option<u16>,
    pub endpoint_prefix: String,
    pub verify_tls: bool,
    pub client_cert: Option<PathBuf>,
    pub timeout: Duration,
    pub max_response_time: Duration,
    pub admin_username: Option<String>,
    pub admin_password: Option<String>,
    pub user_username: Option<String>,
    pub user_password: Option<String>,
    pub api_key: Option<String>,
    pub login_path: String,
    pub schemas_dir: Option<PathBuf>,
}

impl fmt::Debug for Settings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Settings")
            .field("base_url", &self.base_url)
            .field("scheme", &self.scheme)
            .field("port", &self.port)
            .field("endpoint_prefix", &self.endpoint_prefix)
            .field("verify_tls", &self.verify_tls)
            .field("client_cert", &self.client_cert)
            .field("timeout", &self.timeout)
            .field("max_response_time", &self.max_response_time)
            .field("admin_username", &self.admin_username)
            .field("user_username", &self.user_username)
            .field("api_key", &self.api_key.as_ref().map(|_| "***"))
            .field("login_path", &self.login_path)
            .field("schemas_dir", &self.schemas_dir)
            .finish_non_exhaustive()
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            base_url: None,
            scheme: DEFAULT_SCHEME.to_string(),
            port: None,
            endpoint_prefix: String::new(),
            verify_tls: true,
            client_cert: None,
            timeout: DEFAULT_TIMEOUT,
            max_response_time: DEFAULT_MAX_RESPONSE_TIME,
            admin_username: None,
            admin_password: None,
            user_username: None,
            user_password: None,
            api_key: None,
            login_path: DEFAULT_LOGIN_PATH.to_string(),
            schemas_dir: None,
        }
    }
}

impl Settings {
    /// Reads settings from the process environment.
    pub fn from_env() -> Result<Self, ApiError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Reads settings through `lookup`. Empty values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ApiError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let mut settings = Self::default();

        settings.base_url = get("BASE_URL");
        if let Some(scheme) = get("API_SCHEME") {
            settings.scheme = scheme;
        }
        if let Some(port) = get("PORT") {
            settings.port = Some(port.trim().parse().map_err(|_| invalid("PORT", &port))?);
        }
        if let Some(prefix) = get("ENDPOINT_PREFIX") {
            settings.endpoint_prefix = prefix;
        }
        if let Some(verify) = get("VERIFY_SSL_CERTIFICATE") {
            settings.verify_tls = parse_bool("VERIFY_SSL_CERTIFICATE", &verify)?;
        }
        settings.client_cert = get("CERTIFICATE_PATH").map(PathBuf::from);
        if let Some(timeout) = get("REQUEST_TIMEOUT") {
            settings.timeout = parse_seconds("REQUEST_TIMEOUT", &timeout)?;
        }
        if let Some(ceiling) = get("MAX_RESPONSE_TIME") {
            settings.max_response_time = parse_seconds("MAX_RESPONSE_TIME", &ceiling)?;
        }
        settings.admin_username = get("USERNAME_ADMIN");
        settings.admin_password = get("PASSWORD_ADMIN");
        settings.user_username = get("USERNAME_USER");
        settings.user_password = get("PASSWORD_USER");
        settings.api_key = get("API_KEY");
        if let Some(path) = get("LOGIN_PATH") {
            settings.login_path = path;
        }
        settings.schemas_dir = get("SCHEMAS_DIR").map(PathBuf::from);

        Ok(settings)
    }

    /// Privileged identity credentials.
    pub fn admin_credentials(&self) -> Result<Credentials, ApiError> {
        credentials(
            (&self.admin_username, "USERNAME_ADMIN"),
            (&self.admin_password, "PASSWORD_ADMIN"),
        )
    }

    /// Regular identity credentials.
    pub fn user_credentials(&self) -> Result<Credentials, ApiError> {
        credentials(
            (&self.user_username, "USERNAME_USER"),
            (&self.user_password, "PASSWORD_USER"),
        )
    }

    pub fn api_key(&self) -> Result<&str, ApiError> {
        self.api_key.as_deref().ok_or_else(|| ApiError::missing("API_KEY"))
    }

    /// Base client configuration, without any identity applied.
    pub fn client_config(&self) -> Result<ClientConfig, ApiError> {
        let mut schemas = SchemaStore::builtin();
        if let Some(dir) = &self.schemas_dir {
            schemas = schemas.load_dir(dir)?;
        }

        Ok(ClientConfig {
            base_url: self.base_url.clone(),
            scheme: self.scheme.clone(),
            port: self.port,
            endpoint_prefix: self.endpoint_prefix.clone(),
            verify_tls: self.verify_tls,
            client_cert: self.client_cert.clone(),
            timeout: self.timeout,
            max_response_time: self.max_response_time,
            schemas: Arc::new(schemas),
            ..Default::default()
        })
    }
}

fn credentials(
    username: (&Option<String>, &str),
    password: (&Option<String>, &str),
) -> Result<Credentials, ApiError> {
    let user = username.0.clone().ok_or_else(|| ApiError::missing(username.1))?;
    let pass = password.0.clone().ok_or_else(|| ApiError::missing(password.1))?;
    Ok(Credentials {
        username: user,
        password: pass,
    })
}

fn invalid(name: &str, value: &str) -> ApiError {
    ApiError::InvalidSetting {
        name: name.to_string(),
        value: value.to_string(),
    }
}

fn parse_bool(name: &str, value: &str) -> Result<bool, ApiError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(invalid(name, value)),
    }
}

fn parse_seconds(name: &str, value: &str) -> Result<Duration, ApiError> {
    let secs: f64 = value.trim().parse().map_err(|_| invalid(name, value))?;
    if !secs.is_finite() || secs <= 0.0 {
        return Err(invalid(name, value));
    }
    Duration::try_from_secs_f64(secs).map_err(|_| invalid(name, value))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_client_config_defaults() {
        let config = ClientConfig::default();
        assert_eq!(config.scheme, "https");
        assert_eq!(config.expected_status, 200);
        assert!(config.assert_status);
        assert!(config.validate);
        assert!(config.assert_time);
        assert!(config.verify_tls);
        assert_eq!(config.timeout, Duration::from_secs(30));
        assert_eq!(config.max_response_time, Duration::from_secs(10));
        assert!(config.timeout > config.max_response_time);
        assert!(config.schemas.contains(400));
    }

    #[test]
    fn test_resolve_falls_back_to_config() {
        let config = ClientConfig {
            expected_status: 201,
            assert_time: false,
            ..ClientConfig::for_host("api.example.com")
        };
        let call = config.resolve(&RequestOptions::new());

        assert_eq!(call.expected_status, 201);
        assert!(call.assert_status);
        assert!(!call.assert_time);
        assert!(call.validate);
        assert_eq!(call.timeout, config.timeout);
    }

    #[test]
    fn test_resolve_prefers_call_overrides() {
        let config = ClientConfig::for_host("api.example.com");
        let options = RequestOptions::new()
            .expect_status(400)
            .assert_status(false)
            .assert_time(false)
            .validate(false)
            .timeout(Duration::from_secs(2))
            .log_info(false);
        let call = config.resolve(&options);

        assert_eq!(call.expected_status, 400);
        assert!(!call.assert_status);
        assert!(!call.assert_time);
        assert!(!call.validate);
        assert!(!call.log_info);
        assert_eq!(call.timeout, Duration::from_secs(2));
        // Config itself is untouched.
        assert_eq!(config.expected_status, 200);
    }

    #[test]
    fn test_auth_debug_hides_secrets() {
        let auth = Auth::Basic {
            username: "admin".into(),
            password: "hunter2".into(),
        };
        let printed = format!("{auth:?}");
        assert!(printed.contains("admin"));
        assert!(!printed.contains("hunter2"));
        assert!(!format!("{:?}", Auth::Bearer("tok".into())).contains("tok"));
    }

    #[test]
    fn test_settings_from_lookup() {
        let settings = Settings::from_lookup(lookup(&[
            ("BASE_URL", "api.thedogapi.com/v1"),
            ("PORT", "8443"),
            ("VERIFY_SSL_CERTIFICATE", "false"),
            ("REQUEST_TIMEOUT", "2.5"),
            ("MAX_RESPONSE_TIME", "3"),
            ("USERNAME_ADMIN", "root"),
            ("PASSWORD_ADMIN", "s3cret"),
            ("API_KEY", "key-123"),
        ]))
        .unwrap();

        assert_eq!(settings.base_url.as_deref(), Some("api.thedogapi.com/v1"));
        assert_eq!(settings.port, Some(8443));
        assert!(!settings.verify_tls);
        assert_eq!(settings.timeout, Duration::from_millis(2500));
        assert_eq!(settings.max_response_time, Duration::from_secs(3));
        assert_eq!(settings.admin_credentials().unwrap().username, "root");
        assert_eq!(settings.api_key().unwrap(), "key-123");
        assert_eq!(settings.login_path, "/auth/login");
    }

    #[test]
    fn test_settings_empty_values_are_unset() {
        let settings = Settings::from_lookup(lookup(&[("PORT", ""), ("BASE_URL", "  ")])).unwrap();
        assert_eq!(settings.port, None);
        assert_eq!(settings.base_url, None);
    }

    #[test]
    fn test_settings_invalid_values() {
        let err = Settings::from_lookup(lookup(&[("PORT", "eighty")])).unwrap_err();
        assert!(matches!(err, ApiError::InvalidSetting { name, .. } if name == "PORT"));

        let err = Settings::from_lookup(lookup(&[("VERIFY_SSL_CERTIFICATE", "maybe")])).unwrap_err();
        assert!(matches!(err, ApiError::InvalidSetting { name, .. } if name == "VERIFY_SSL_CERTIFICATE"));

        let err = Settings::from_lookup(lookup(&[("MAX_RESPONSE_TIME", "-1")])).unwrap_err();
        assert!(matches!(err, ApiError::InvalidSetting { name, .. } if name == "MAX_RESPONSE_TIME"));

        for name in ["MAX_RESPONSE_TIME", "REQUEST_TIMEOUT"] {
            let err = Settings::from_lookup(lookup(&[(name, "1e20")])).unwrap_err();
            assert!(matches!(err, ApiError::InvalidSetting { name: n, .. } if n == name));
        }
    }

    #[test]
    fn test_missing_credentials_name_the_variable() {
        let settings = Settings::from_lookup(lookup(&[("USERNAME_USER", "bob")])).unwrap();
        let err = settings.user_credentials().unwrap_err();
        assert!(matches!(err, ApiError::MissingSetting { name } if name == "PASSWORD_USER"));

        let err = settings.api_key().unwrap_err();
        assert!(matches!(err, ApiError::MissingSetting { name } if name == "API_KEY"));
    }

    #[test]
    fn test_settings_debug_hides_secrets() {
        let settings = Settings::from_lookup(lookup(&[
            ("PASSWORD_ADMIN", "topsecret"),
            ("API_KEY", "key-123"),
        ]))
        .unwrap();
        let printed = format!("{settings:?}");
        assert!(!printed.contains("topsecret"));
        assert!(!printed.contains("key-123"));
    }

    #[test]
    fn test_client_config_from_settings() {
        let settings = Settings::from_lookup(lookup(&[
            ("BASE_URL", "api.example.com"),
            ("ENDPOINT_PREFIX", "/v1"),
            ("MAX_RESPONSE_TIME", "4"),
        ]))
        .unwrap();
        let config = settings.client_config().unwrap();

        assert_eq!(config.base_url.as_deref(), Some("api.example.com"));
        assert_eq!(config.endpoint_prefix, "/v1");
        assert_eq!(config.max_response_time, Duration::from_secs(4));
        assert!(config.schemas.contains(404));
    }
}
