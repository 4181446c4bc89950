//! # Códigos de Erro e o tipo `ApiError`
//!
//! Toda falha do cliente vira um `ApiError`, e todo `ApiError` tem um
//! código estruturado que pode ser pesquisado ou filtrado em CI.
//!
//! ## Categorias
//!
//! | Faixa  | Categoria        | Descrição                                  |
//! |--------|------------------|--------------------------------------------|
//! | E1xxx  | Configuração     | Setting ausente, URL/header/schema inválido |
//! | E2xxx  | Transporte       | Conexão, timeout, redirects, arquivos       |
//! | E3xxx  | Conteúdo         | Content-Type, JSON, schema da resposta      |
//! | E4xxx  | Assertion        | Status ou tempo de resposta                 |
//! | E5xxx  | Interno          | Status fora de [100, 599]                   |
//!
//! Erros das categorias Conteúdo, Assertion e Interno são falhas de
//! assertion: o contrato da API foi violado e o teste deve falhar no
//! ponto da chamada. Erros de transporte e configuração não são.
//!
//! ```text
//! [E4001] Expected status 200, got 404
//! ```

use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

// ============================================================================
// CÓDIGO DE ERRO
// ============================================================================

/// Código de erro estruturado: o primeiro dígito é a categoria,
/// os três últimos identificam o erro.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ErrorCode(u16);

impl ErrorCode {
    // E1xxx: configuração

    /// Setting obrigatório ausente (ex.: `BASE_URL`).
    pub const MISSING_SETTING: Self = Self(1001);
    /// Setting presente mas com valor inválido.
    pub const INVALID_SETTING: Self = Self(1002);
    /// URL montada a partir da configuração não é válida.
    pub const INVALID_URL: Self = Self(1003);
    /// Nome ou valor de header inválido.
    pub const INVALID_HEADER: Self = Self(1004);
    /// Certificado de cliente ilegível ou inválido.
    pub const INVALID_CERTIFICATE: Self = Self(1005);
    /// O cliente HTTP subjacente não pôde ser construído.
    pub const CLIENT_BUILD: Self = Self(1006);
    /// Schema explícito não compila.
    pub const INVALID_SCHEMA: Self = Self(1007);
    /// Arquivo de schema não pôde ser carregado.
    pub const SCHEMA_FILE: Self = Self(1008);

    // E2xxx: transporte

    /// Timeout da requisição.
    pub const HTTP_TIMEOUT: Self = Self(2001);
    /// Falha de conexão (DNS, recusa, TLS).
    pub const HTTP_CONNECTION_ERROR: Self = Self(2002);
    /// Outras falhas do cliente HTTP.
    pub const HTTP_REQUEST_ERROR: Self = Self(2003);
    /// Limite de redirects excedido.
    pub const TOO_MANY_REDIRECTS: Self = Self(2004);
    /// Erro de I/O em arquivo local (upload/download).
    pub const FILE_IO: Self = Self(2005);
    /// Download respondeu com status que não é 2xx.
    pub const DOWNLOAD_FAILED: Self = Self(2006);

    // E3xxx: conteúdo da resposta

    /// Content-Type não é JSON.
    pub const CONTENT_TYPE: Self = Self(3001);
    /// Corpo não é JSON válido.
    pub const INVALID_JSON: Self = Self(3002);
    /// Resposta 204 com corpo.
    pub const UNEXPECTED_BODY: Self = Self(3003);
    /// Corpo não bate com o schema.
    pub const SCHEMA_MISMATCH: Self = Self(3004);

    // E4xxx: assertions

    /// Status diferente do esperado.
    pub const STATUS_MISMATCH: Self = Self(4001);
    /// Tempo de resposta acima do teto.
    pub const RESPONSE_TIME_EXCEEDED: Self = Self(4002);

    // E5xxx: interno

    /// Status fora de [100, 599]: bug na camada de transporte.
    pub const INVALID_STATUS_RANGE: Self = Self(5001);

    /// Retorna o código numérico.
    pub fn code(&self) -> u16 {
        self.0
    }

    /// Código formatado com prefixo "E", ex.: `E4001`.
    pub fn formatted(&self) -> String {
        format!("E{:04}", self.0)
    }

    /// Categoria derivada do primeiro dígito.
    pub fn category(&self) -> ErrorCategory {
        match self.0 / 1000 {
            1 => ErrorCategory::Configuration,
            2 => ErrorCategory::Transport,
            3 => ErrorCategory::Content,
            4 => ErrorCategory::Assertion,
            5 => ErrorCategory::Internal,
            _ => ErrorCategory::Unknown,
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.formatted())
    }
}

/// Categoria de erro baseada no primeiro dígito do código.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Configuration,
    Transport,
    Content,
    Assertion,
    Internal,
    Unknown,
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Configuration => write!(f, "Configuração"),
            Self::Transport => write!(f, "Transporte"),
            Self::Content => write!(f, "Conteúdo"),
            Self::Assertion => write!(f, "Assertion"),
            Self::Internal => write!(f, "Interno"),
            Self::Unknown => write!(f, "Desconhecido"),
        }
    }
}

// ============================================================================
// API ERROR
// ============================================================================

/// Every failure the client can surface.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Required setting '{name}' is not set")]
    MissingSetting { name: String },

    #[error("Setting '{name}' has invalid value '{value}'")]
    InvalidSetting { name: String, value: String },

    #[error("Invalid URL '{url}': {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("Invalid header '{name}': {reason}")]
    InvalidHeader { name: String, reason: String },

    #[error("Invalid client certificate {path:?}: {reason}")]
    InvalidCertificate { path: PathBuf, reason: String },

    #[error("Failed to build HTTP client: {source}")]
    ClientBuild {
        #[source]
        source: reqwest::Error,
    },

    #[error("Invalid JSON schema: {reason}")]
    InvalidSchema { reason: String },

    #[error("Failed to load schema file {path:?}: {reason}")]
    SchemaFile { path: PathBuf, reason: String },

    #[error("{method} {url} failed: {source}")]
    Transport {
        method: String,
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("{method} {url} exceeded {max} redirects")]
    TooManyRedirects {
        method: String,
        url: String,
        max: usize,
    },

    #[error("File operation on {path:?} failed: {source}")]
    FileIo {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to download file: status {status}")]
    DownloadFailed { status: u16 },

    #[error("Unexpected Content-Type: {content_type}")]
    ContentType { content_type: String },

    #[error("Response content is not valid JSON: {reason}")]
    InvalidJson { reason: String },

    #[error("Expected no content for 204 response, but got {length} bytes")]
    UnexpectedBody { length: usize },

    #[error("Schema validation error: {message}")]
    SchemaMismatch { message: String },

    #[error("Expected status {expected}, got {actual}")]
    StatusMismatch { expected: u16, actual: u16 },

    #[error("Response time exceeded: {:.2} seconds (limit {:.2})", elapsed.as_secs_f64(), ceiling.as_secs_f64())]
    ResponseTimeExceeded { elapsed: Duration, ceiling: Duration },

    #[error("Invalid HTTP status code: {status}. Must be between 100 and 599.")]
    InvalidStatusRange { status: u16 },
}

impl ApiError {
    /// Structured code for this error.
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::MissingSetting { .. } => ErrorCode::MISSING_SETTING,
            Self::InvalidSetting { .. } => ErrorCode::INVALID_SETTING,
            Self::InvalidUrl { .. } => ErrorCode::INVALID_URL,
            Self::InvalidHeader { .. } => ErrorCode::INVALID_HEADER,
            Self::InvalidCertificate { .. } => ErrorCode::INVALID_CERTIFICATE,
            Self::ClientBuild { .. } => ErrorCode::CLIENT_BUILD,
            Self::InvalidSchema { .. } => ErrorCode::INVALID_SCHEMA,
            Self::SchemaFile { .. } => ErrorCode::SCHEMA_FILE,
            Self::Transport { source, .. } => {
                if source.is_timeout() {
                    ErrorCode::HTTP_TIMEOUT
                } else if source.is_connect() {
                    ErrorCode::HTTP_CONNECTION_ERROR
                } else {
                    ErrorCode::HTTP_REQUEST_ERROR
                }
            }
            Self::TooManyRedirects { .. } => ErrorCode::TOO_MANY_REDIRECTS,
            Self::FileIo { .. } => ErrorCode::FILE_IO,
            Self::DownloadFailed { .. } => ErrorCode::DOWNLOAD_FAILED,
            Self::ContentType { .. } => ErrorCode::CONTENT_TYPE,
            Self::InvalidJson { .. } => ErrorCode::INVALID_JSON,
            Self::UnexpectedBody { .. } => ErrorCode::UNEXPECTED_BODY,
            Self::SchemaMismatch { .. } => ErrorCode::SCHEMA_MISMATCH,
            Self::StatusMismatch { .. } => ErrorCode::STATUS_MISMATCH,
            Self::ResponseTimeExceeded { .. } => ErrorCode::RESPONSE_TIME_EXCEEDED,
            Self::InvalidStatusRange { .. } => ErrorCode::INVALID_STATUS_RANGE,
        }
    }

    pub fn category(&self) -> ErrorCategory {
        self.code().category()
    }

    /// True when the API broke its contract (content, assertion or
    /// status-range failures), as opposed to transport or setup problems.
    pub fn is_assertion_failure(&self) -> bool {
        matches!(
            self.category(),
            ErrorCategory::Content | ErrorCategory::Assertion | ErrorCategory::Internal
        )
    }

    /// True when the request never produced a response.
    pub fn is_transport(&self) -> bool {
        self.category() == ErrorCategory::Transport
    }

    /// Message prefixed with the structured code.
    pub fn user_message(&self) -> String {
        format!("[{}] {}", self.code(), self)
    }

    pub(crate) fn missing(name: &str) -> Self {
        Self::MissingSetting {
            name: name.to_string(),
        }
    }

    pub(crate) fn file_io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::FileIo {
            path: path.into(),
            source,
        }
    }
}
