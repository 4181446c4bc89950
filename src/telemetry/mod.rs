//! # Logging
//!
//! Instala o subscriber do `tracing` usado pelos clientes e pela CLI.
//!
//! O filtro vem de `RUST_LOG` quando definido; senão, das diretivas em
//! [`LoggingConfig`] (por padrão `info`, ou o valor de `LOG_LEVEL`).
//!
//! ```ignore
//! init_logging(LoggingConfig::from_env())?;
//! ```
//!
//! Os clientes emitem, por chamada:
//!
//! - `info`: request enviado e response recebido (headers redigidos,
//!   corpo truncado), redirects seguidos
//! - `warn`: validações desligadas, schema padrão ausente, tempo excedido
//! - `error`: status fora da faixa, schema incompatível
//! - `debug`: anexos do [`TracingSink`](crate::report::TracingSink)

use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

/// Subscriber options.
#[derive(Debug, Clone)]
pub struct LoggingConfig {
    /// `EnvFilter` directives used when `RUST_LOG` is unset.
    pub directives: String,
    pub ansi: bool,
    /// Print the event target (module path) on each line.
    pub with_target: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            directives: "info".to_string(),
            ansi: true,
            with_target: false,
        }
    }
}

impl LoggingConfig {
    /// Reads `LOG_LEVEL` (any `EnvFilter` directive, e.g. `debug` or
    /// `apicheck=trace,reqwest=warn`).
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Ok(level) = std::env::var("LOG_LEVEL") {
            if !level.trim().is_empty() {
                config.directives = level.trim().to_string();
            }
        }
        config
    }
}

/// Installs the global subscriber. Returns `Ok(false)` when one was already
/// installed, leaving it in place.
pub fn init_logging(config: LoggingConfig) -> anyhow::Result<bool> {
    let env_filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(&config.directives)?,
    };

    let installed = tracing_subscriber::registry()
        .with(env_filter)
        .with(
            tracing_subscriber::fmt::layer()
                .compact()
                .with_ansi(config.ansi)
                .with_target(config.with_target),
        )
        .try_init()
        .is_ok();

    if installed {
        tracing::debug!(directives = %config.directives, "Logging inicializado");
    }
    Ok(installed)
}
