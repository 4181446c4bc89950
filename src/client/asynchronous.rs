//! Async client over `reqwest::Client`.

use std::path::Path;

use reqwest::multipart::{Form, Part};
use reqwest::redirect::Policy;
use reqwest::{Client, Method, RequestBuilder, Response};
use serde_json::Value;
use tokio::fs::File;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};

use super::{file_part, invalid_mime, load_identity, transport, HopBuilder, PreparedRequest, ResponseHead, Trail};
use crate::config::{CallSettings, ClientConfig};
use crate::errors::ApiError;
use crate::protocol::{ApiResponse, FilePart, RequestBody, RequestOptions};
use crate::report;
use crate::validation::{validate_all, validate_status, validate_time};

/// Validating API client for async code.
///
/// Cheap to share behind an `Arc`: every call resolves its own settings
/// and the connection pool and cookie jar are internally synchronized.
#[derive(Debug)]
pub struct AsyncApiClient {
    config: ClientConfig,
    http: Client,
}

impl AsyncApiClient {
    pub fn new(config: ClientConfig) -> Result<Self, ApiError> {
        let mut builder = Client::builder()
            .use_rustls_tls()
            .timeout(config.timeout)
            .redirect(Policy::none())
            .cookie_store(true)
            .danger_accept_invalid_certs(!config.verify_tls);
        if let Some(identity) = load_identity(config.client_cert.as_deref())? {
            builder = builder.identity(identity);
        }
        let http = builder.build().map_err(|source| ApiError::ClientBuild { source })?;

        debug!(
            base_url = ?config.base_url,
            verify_tls = config.verify_tls,
            "Async client created"
        );
        Ok(Self { config, http })
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub async fn get(&self, path: &str, options: RequestOptions) -> Result<ApiResponse, ApiError> {
        self.request(Method::GET, path, options).await
    }

    pub async fn post(&self, path: &str, options: RequestOptions) -> Result<ApiResponse, ApiError> {
        self.request(Method::POST, path, options).await
    }

    pub async fn put(&self, path: &str, options: RequestOptions) -> Result<ApiResponse, ApiError> {
        self.request(Method::PUT, path, options).await
    }

    pub async fn patch(&self, path: &str, options: RequestOptions) -> Result<ApiResponse, ApiError> {
        self.request(Method::PATCH, path, options).await
    }

    pub async fn delete(&self, path: &str, options: RequestOptions) -> Result<ApiResponse, ApiError> {
        self.request(Method::DELETE, path, options).await
    }

    pub async fn head(&self, path: &str, options: RequestOptions) -> Result<ApiResponse, ApiError> {
        self.request(Method::HEAD, path, options).await
    }

    pub async fn options(&self, path: &str, options: RequestOptions) -> Result<ApiResponse, ApiError> {
        self.request(Method::OPTIONS, path, options).await
    }

    /// Sends one request, follows redirects and runs status, schema and
    /// time validation on the final response.
    #[tracing::instrument(name = "api_call", skip_all, fields(method = %method, path = %path))]
    pub async fn request(&self, method: Method, path: &str, options: RequestOptions) -> Result<ApiResponse, ApiError> {
        let call = self.config.resolve(&options);
        let prepared = PreparedRequest::new(&self.config, method, path, &options)?;

        let (response, trail) = self.dispatch(prepared, &call).await?;
        let head = head_of(&response);
        let body = response
            .bytes()
            .await
            .map_err(|source| transport(&trail.last, source))?
            .to_vec();
        let elapsed = trail.started.elapsed();
        let (record, last) = trail.assemble(head, body, elapsed);

        report::record_exchange(&self.config, &call, &last, &record);
        validate_all(&record, &call, &self.config.schemas, options.schema.as_ref())?;
        Ok(record)
    }

    /// Streams a GET response body into `save_to`.
    ///
    /// Status and response time are validated; the body is not parsed. Any
    /// non-2xx status fails before the file is created.
    #[tracing::instrument(name = "api_download", skip_all, fields(path = %path))]
    pub async fn download_file(
        &self,
        path: &str,
        save_to: impl AsRef<Path>,
        options: RequestOptions,
    ) -> Result<ApiResponse, ApiError> {
        let save_to = save_to.as_ref();
        let call = self.config.resolve(&options);
        let prepared = PreparedRequest::new(&self.config, Method::GET, path, &options)?;

        let (mut response, trail) = self.dispatch(prepared, &call).await?;
        let head = head_of(&response);
        let elapsed = trail.started.elapsed();
        let (record, last) = trail.assemble(head, Vec::new(), elapsed);
        report::record_exchange(&self.config, &call, &last, &record);

        validate_status(record.status(), call.expected_status, call.assert_status)?;
        if !(200..300).contains(&record.status()) {
            return Err(ApiError::DownloadFailed {
                status: record.status(),
            });
        }

        let mut file = File::create(save_to)
            .await
            .map_err(|e| ApiError::file_io(save_to, e))?;
        let written = match stream_into(&mut response, &mut file, save_to, &last).await {
            Ok(written) => written,
            Err(e) => {
                drop(file);
                if let Err(remove) = tokio::fs::remove_file(save_to).await {
                    warn!(path = %save_to.display(), error = %remove, "Failed to remove partial download");
                }
                return Err(e);
            }
        };
        info!(path = %save_to.display(), bytes = written, "File downloaded and saved");

        validate_time(record.elapsed(), call.assert_time, call.max_response_time)?;
        Ok(record)
    }

    /// POSTs `file_path` as a single-part multipart form under `field`.
    pub async fn upload_file(
        &self,
        path: &str,
        field: &str,
        file_path: impl AsRef<Path>,
        options: RequestOptions,
    ) -> Result<ApiResponse, ApiError> {
        let file_path = file_path.as_ref();
        let bytes = tokio::fs::read(file_path)
            .await
            .map_err(|e| ApiError::file_io(file_path, e))?;
        let options = RequestOptions {
            body: Some(RequestBody::File(file_part(field, file_path, bytes))),
            ..options
        };
        self.request(Method::POST, path, options).await
    }

    /// Releases the connection pool and cookie jar.
    pub fn close(self) {
        info!("Session closed.");
    }

    async fn dispatch(&self, prepared: PreparedRequest, call: &CallSettings) -> Result<(Response, Trail), ApiError> {
        let mut trail = Trail::start(prepared);
        loop {
            let response = self
                .build(&trail.last, call)?
                .send()
                .await
                .map_err(|source| transport(&trail.last, source))?;
            if !trail.advance(&self.config, response.status(), response.headers())? {
                return Ok((response, trail));
            }
        }
    }

    fn build(&self, hop: &PreparedRequest, call: &CallSettings) -> Result<RequestBuilder, ApiError> {
        let builder = self
            .http
            .request(hop.method.clone(), hop.url.clone())
            .headers(hop.header_map()?)
            .timeout(call.timeout);
        hop.apply(builder, &self.config.auth)
    }
}

impl HopBuilder for RequestBuilder {
    fn with_basic_auth(self, username: &str, password: &str) -> Self {
        self.basic_auth(username, Some(password))
    }

    fn with_bearer(self, token: &str) -> Self {
        self.bearer_auth(token)
    }

    fn with_json(self, value: &Value) -> Self {
        self.json(value)
    }

    fn with_form(self, fields: &[(String, String)]) -> Self {
        self.form(fields)
    }

    fn with_text(self, text: &str) -> Self {
        self.body(text.to_string())
    }

    fn with_file(self, part: &FilePart) -> Result<Self, ApiError> {
        let file = Part::bytes(part.bytes.clone())
            .file_name(part.file_name.clone())
            .mime_str(&part.mime)
            .map_err(invalid_mime)?;
        Ok(self.multipart(Form::new().part(part.field.clone(), file)))
    }
}

fn head_of(response: &Response) -> ResponseHead {
    ResponseHead::new(response.status(), response.url(), response.headers(), response.cookies())
}

async fn stream_into(
    response: &mut Response,
    file: &mut File,
    save_to: &Path,
    last: &PreparedRequest,
) -> Result<u64, ApiError> {
    let mut written = 0u64;
    while let Some(chunk) = response.chunk().await.map_err(|source| transport(last, source))? {
        file.write_all(&chunk).await.map_err(|e| ApiError::file_io(save_to, e))?;
        written += chunk.len() as u64;
    }
    file.flush().await.map_err(|e| ApiError::file_io(save_to, e))?;
    Ok(written)
}
