//! Response body validation: content type, JSON parsing and schema match.

use jsonschema::JSONSchema;
use serde_json::Value;
use tracing::{debug, error, info, warn};

use crate::errors::ApiError;
use crate::protocol::ApiResponse;
use crate::schemas::SchemaStore;

/// Validates response bodies against explicit or default schemas.
///
/// Holds only a borrowed, read-only schema table, so one validator can be
/// shared freely between concurrent calls.
#[derive(Debug, Clone, Copy)]
pub struct SchemaValidator<'a> {
    store: &'a SchemaStore,
}

impl<'a> SchemaValidator<'a> {
    pub fn new(store: &'a SchemaStore) -> Self {
        Self { store }
    }

    /// Shortcut for [`SchemaValidator::validate`] on a recorded response.
    pub fn validate_response(
        &self,
        response: &ApiResponse,
        explicit: Option<&Value>,
        enabled: bool,
    ) -> Result<(), ApiError> {
        self.validate(
            response.status(),
            response.content_type(),
            response.body(),
            explicit,
            enabled,
        )
    }

    /// Checks one response body.
    ///
    /// Order: content type, JSON parse, then the status-family rules
    /// (204 must be empty, other 2xx only with an explicit schema,
    /// 4xx/5xx explicit schema or the default for that exact code).
    pub fn validate(
        &self,
        status: u16,
        content_type: Option<&str>,
        body: &[u8],
        explicit: Option<&Value>,
        enabled: bool,
    ) -> Result<(), ApiError> {
        if !enabled {
            warn!(status, "Response validation is disabled. Skipping validation...");
            return Ok(());
        }

        check_content_type(content_type, body)?;

        let parsed = if body.is_empty() {
            None
        } else {
            Some(
                serde_json::from_slice::<Value>(body)
                    .map_err(|e| ApiError::InvalidJson { reason: e.to_string() })?,
            )
        };
        let instance = parsed.unwrap_or(Value::Null);

        match status {
            204 => {
                if !body.is_empty() {
                    return Err(ApiError::UnexpectedBody { length: body.len() });
                }
                Ok(())
            }
            200..=299 => match explicit {
                Some(schema) => {
                    debug!(status, "Validating response 2xx");
                    match_schema(&instance, schema)
                }
                None => Ok(()),
            },
            400..=599 => {
                if let Some(schema) = explicit {
                    debug!(status, "Validating response {}xx", status / 100);
                    return match_schema(&instance, schema);
                }
                match self.store.get(status) {
                    Some(schema) => {
                        debug!(status, "Validating response {} with default schema", status);
                        match_schema(&instance, schema)
                    }
                    None => {
                        warn!(status, "No default schema found for status code {}...", status);
                        Ok(())
                    }
                }
            }
            _ => {
                debug!(status, "No schema rules for this status family");
                Ok(())
            }
        }
    }
}

/// True for `application/json` and any `+json` structured syntax suffix.
pub fn is_json_content_type(content_type: &str) -> bool {
    let essence = content_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase();
    essence == "application/json" || essence.ends_with("+json")
}

fn check_content_type(content_type: Option<&str>, body: &[u8]) -> Result<(), ApiError> {
    match content_type {
        Some(ct) if is_json_content_type(ct) => Ok(()),
        Some(ct) => Err(ApiError::ContentType {
            content_type: ct.to_string(),
        }),
        // Nothing declared and nothing sent.
        None if body.is_empty() => Ok(()),
        None => Err(ApiError::ContentType {
            content_type: "<missing>".to_string(),
        }),
    }
}

/// Validates `instance` against `schema`, reporting every violation.
pub fn match_schema(instance: &Value, schema: &Value) -> Result<(), ApiError> {
    info!(schema = %schema, "Validating response with schema");

    let compiled = JSONSchema::compile(schema).map_err(|e| ApiError::InvalidSchema {
        reason: e.to_string(),
    })?;

    if let Err(errors) = compiled.validate(instance) {
        let message = errors
            .map(|e| {
                let path = e.instance_path.to_string();
                if path.is_empty() {
                    e.to_string()
                } else {
                    format!("{e} (at {path})")
                }
            })
            .collect::<Vec<_>>()
            .join("; ");
        error!(%message, "Schema validation error");
        return Err(ApiError::SchemaMismatch { message });
    }

    Ok(())
}
