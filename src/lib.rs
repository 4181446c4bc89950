//! # apicheck
//!
//! Camada de cliente HTTP para testes de API: monta requests a partir da
//! configuração, executa a chamada (sync ou async), valida status, corpo
//! (JSON Schema) e tempo de resposta, e registra um relatório por chamada
//! (logs estruturados, transcrição cURL, resumo JSON).
//!
//! ```ignore
//! use apicheck::{AsyncApiClient, ClientConfig, RequestOptions};
//!
//! let client = AsyncApiClient::new(ClientConfig::for_host("api.thedogapi.com/v1"))?;
//! let response = client
//!     .get("/breeds/invalid_id", RequestOptions::new().expect_status(400))
//!     .await?;
//! ```

pub mod client;
pub mod config;
pub mod errors;
pub mod protocol;
pub mod report;
pub mod schemas;
pub mod sessions;
pub mod telemetry;
pub mod validation;

pub use client::{build_url, merge_headers, ApiClient, AsyncApiClient};
pub use config::{Auth, CallSettings, ClientConfig, Credentials, Settings};
pub use errors::{ApiError, ErrorCategory, ErrorCode};
pub use protocol::{ApiResponse, FilePart, RequestBody, RequestOptions};
pub use report::{MemorySink, ReportSink, TracingSink};
pub use schemas::SchemaStore;
pub use sessions::Identity;
