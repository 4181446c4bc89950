//! # Identidades
//!
//! Três classes de acesso, cada uma produzindo um cliente pronto:
//!
//! | Identidade  | Como autentica                                        |
//! |-------------|-------------------------------------------------------|
//! | `Admin`     | HTTP basic com `USERNAME_ADMIN` / `PASSWORD_ADMIN`    |
//! | `User`      | POST JSON no `LOGIN_PATH`; o cookie de sessão fica no cookie store do cliente |
//! | `Anonymous` | header `x-api-key` com `API_KEY`                      |
//!
//! Credencial ausente falha com `MissingSetting` antes de qualquer request.

use std::fmt;
use std::str::FromStr;

use serde_json::{json, Value};
use tracing::info;

use crate::client::{ApiClient, AsyncApiClient};
use crate::config::{Auth, ClientConfig, Credentials, Settings};
use crate::errors::ApiError;
use crate::protocol::RequestOptions;

pub const API_KEY_HEADER: &str = "x-api-key";

/// Access class a client acts as.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Identity {
    Admin,
    User,
    Anonymous,
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Admin => write!(f, "admin"),
            Self::User => write!(f, "user"),
            Self::Anonymous => write!(f, "anonymous"),
        }
    }
}

impl FromStr for Identity {
    type Err = ApiError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "admin" => Ok(Self::Admin),
            "user" => Ok(Self::User),
            "anonymous" | "anon" => Ok(Self::Anonymous),
            other => Err(ApiError::InvalidSetting {
                name: "identity".to_string(),
                value: other.to_string(),
            }),
        }
    }
}

/// Client configuration for `identity`. For [`Identity::User`] the login
/// itself happens in [`open`] / [`open_async`].
pub fn identity_config(settings: &Settings, identity: Identity) -> Result<ClientConfig, ApiError> {
    let config = settings.client_config()?;
    match identity {
        Identity::Admin => {
            let Credentials { username, password } = settings.admin_credentials()?;
            Ok(ClientConfig {
                auth: Auth::Basic { username, password },
                ..config
            })
        }
        Identity::User => {
            settings.user_credentials()?;
            Ok(config)
        }
        Identity::Anonymous => Ok(config.header(API_KEY_HEADER, settings.api_key()?)),
    }
}

/// JSON body posted to the login path.
pub fn login_body(credentials: &Credentials) -> Value {
    json!({
        "username": credentials.username,
        "password": credentials.password,
    })
}

/// Blocking client acting as `identity`, already logged in when needed.
pub fn open(settings: &Settings, identity: Identity) -> Result<ApiClient, ApiError> {
    let client = ApiClient::new(identity_config(settings, identity)?)?;
    if identity == Identity::User {
        let credentials = settings.user_credentials()?;
        client.post(&settings.login_path, login_options(&credentials))?;
        info!(identity = %identity, "Logged in");
    }
    Ok(client)
}

/// Async client acting as `identity`, already logged in when needed.
pub async fn open_async(settings: &Settings, identity: Identity) -> Result<AsyncApiClient, ApiError> {
    let client = AsyncApiClient::new(identity_config(settings, identity)?)?;
    if identity == Identity::User {
        let credentials = settings.user_credentials()?;
        client.post(&settings.login_path, login_options(&credentials)).await?;
        info!(identity = %identity, "Logged in");
    }
    Ok(client)
}

/// The password is masked in the log line and transcript by
/// [`redact_body`](crate::report::redact_body).
fn login_options(credentials: &Credentials) -> RequestOptions {
    RequestOptions::new().json(login_body(credentials))
}
