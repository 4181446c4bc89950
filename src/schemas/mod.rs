//! # Tabela de Schemas Padrão
//!
//! Mapeia status HTTP para o schema JSON usado quando o teste não
//! fornece um schema explícito. A tabela é montada uma vez (built-ins,
//! registros manuais e arquivos `<status>.json`) e depois compartilhada
//! somente para leitura via `Arc<SchemaStore>`.
//!
//! ```ignore
//! let store = SchemaStore::builtin()
//!     .with_schema(418, json!({ "type": "object" }))
//!     .load_dir("schemas/defaults")?;
//! let config = ClientConfig { schemas: Arc::new(store), ..Default::default() };
//! ```

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use serde_json::{json, Value};
use tracing::debug;

use crate::errors::ApiError;

/// Status codes that get the generic error schema out of the box.
pub const BUILTIN_ERROR_STATUSES: &[u16] = &[400, 401, 403, 404, 405, 409, 422, 429, 500, 502, 503];

/// Read-only registry of fallback schemas keyed by exact status code.
#[derive(Debug, Clone, Default)]
pub struct SchemaStore {
    schemas: BTreeMap<u16, Value>,
}

impl SchemaStore {
    /// Empty table: every 4xx/5xx without an explicit schema is skipped.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Table pre-filled with [`error_schema`] for [`BUILTIN_ERROR_STATUSES`].
    pub fn builtin() -> Self {
        let schemas = BUILTIN_ERROR_STATUSES
            .iter()
            .map(|&status| (status, error_schema(status)))
            .collect();
        Self { schemas }
    }

    /// Registers (or replaces) the schema for `status`.
    #[must_use]
    pub fn with_schema(mut self, status: u16, schema: Value) -> Self {
        self.schemas.insert(status, schema);
        self
    }

    /// Loads every `<status>.json` file in `dir`. Files whose stem is not a
    /// status code are ignored.
    pub fn load_dir(mut self, dir: impl AsRef<Path>) -> Result<Self, ApiError> {
        let dir = dir.as_ref();
        let entries = fs::read_dir(dir).map_err(|e| ApiError::SchemaFile {
            path: dir.to_path_buf(),
            reason: e.to_string(),
        })?;

        for entry in entries {
            let path = entry
                .map_err(|e| ApiError::SchemaFile {
                    path: dir.to_path_buf(),
                    reason: e.to_string(),
                })?
                .path();

            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let Some(status) = path
                .file_stem()
                .and_then(|s| s.to_str())
                .and_then(|s| s.parse::<u16>().ok())
            else {
                continue;
            };

            let schema = load_schema_file(&path)?;
            debug!(status, path = %path.display(), "Default schema loaded");
            self.schemas.insert(status, schema);
        }

        Ok(self)
    }

    /// Schema registered for exactly `status`, if any.
    pub fn get(&self, status: u16) -> Option<&Value> {
        self.schemas.get(&status)
    }

    pub fn contains(&self, status: u16) -> bool {
        self.schemas.contains_key(&status)
    }

    /// Registered status codes in ascending order.
    pub fn statuses(&self) -> impl Iterator<Item = u16> + '_ {
        self.schemas.keys().copied()
    }

    pub fn len(&self) -> usize {
        self.schemas.len()
    }

    pub fn is_empty(&self) -> bool {
        self.schemas.is_empty()
    }
}

/// Reads a JSON schema document from disk.
pub fn load_schema_file(path: impl AsRef<Path>) -> Result<Value, ApiError> {
    let path = path.as_ref();
    let raw = fs::read_to_string(path).map_err(|e| ApiError::SchemaFile {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })?;
    serde_json::from_str(&raw).map_err(|e| ApiError::SchemaFile {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })
}

/// Generic error body: an object carrying at least `message` or `error`.
pub fn error_schema(status: u16) -> Value {
    json!({
        "title": format!("Default schema for {status} responses"),
        "type": "object",
        "properties": {
            "message": { "type": "string" },
            "error": { "type": ["string", "object"] },
            "status": { "type": "integer" },
            "code": { "type": ["integer", "string"] },
            "details": {}
        },
        "anyOf": [
            { "required": ["message"] },
            { "required": ["error"] }
        ]
    })
}
