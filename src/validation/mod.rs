//! # Validação de Respostas
//!
//! Três validadores sem estado, executados nesta ordem depois de cada
//! chamada:
//!
//! 1. **status**: código dentro de [100, 599] e igual ao esperado
//! 2. **schema**: Content-Type JSON, corpo parseável e aderente ao schema
//! 3. **time**: tempo de resposta abaixo do teto
//!
//! Cada um pode ser desligado por chamada (exceto a checagem de faixa do
//! status, que sempre roda). Qualquer falha interrompe a chamada com um
//! `ApiError` de assertion.

pub mod schema;
pub mod status;
pub mod time;

use serde_json::Value;

pub use schema::{is_json_content_type, match_schema, SchemaValidator};
pub use status::{validate_status, STATUS_RANGE};
pub use time::{validate_time, DEFAULT_MAX_RESPONSE_TIME};

use crate::config::CallSettings;
use crate::errors::ApiError;
use crate::protocol::ApiResponse;
use crate::schemas::SchemaStore;

/// Runs status, schema and time validation against one response.
pub fn validate_all(
    response: &ApiResponse,
    call: &CallSettings,
    schemas: &SchemaStore,
    explicit: Option<&Value>,
) -> Result<(), ApiError> {
    validate_status(response.status(), call.expected_status, call.assert_status)?;
    SchemaValidator::new(schemas).validate_response(response, explicit, call.validate)?;
    validate_time(response.elapsed(), call.assert_time, call.max_response_time)?;
    Ok(())
}
