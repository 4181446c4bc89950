//! Blocking client over `reqwest::blocking::Client`.
//!
//! Must not be created or used from inside an async context; wrap calls in
//! `tokio::task::spawn_blocking` when mixing with tokio.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use reqwest::blocking::multipart::{Form, Part};
use reqwest::blocking::{Client, RequestBuilder, Response};
use reqwest::redirect::Policy;
use reqwest::Method;
use serde_json::Value;
use tracing::{debug, info};

use super::{
    discard_partial, file_part, invalid_mime, load_identity, transport, HopBuilder, PreparedRequest, ResponseHead,
    Trail,
};
use crate::config::{CallSettings, ClientConfig};
use crate::errors::ApiError;
use crate::protocol::{ApiResponse, FilePart, RequestBody, RequestOptions};
use crate::report;
use crate::validation::{validate_all, validate_status, validate_time};

/// Validating API client for synchronous code.
#[derive(Debug)]
pub struct ApiClient {
    config: ClientConfig,
    http: Client,
}

impl ApiClient {
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

        debug!(base_url = ?config.base_url, verify_tls = config.verify_tls, "Client created");
        Ok(Self { config, http })
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn get(&self, path: &str, options: RequestOptions) -> Result<ApiResponse, ApiError> {
        self.request(Method::GET, path, options)
    }

    pub fn post(&self, path: &str, options: RequestOptions) -> Result<ApiResponse, ApiError> {
        self.request(Method::POST, path, options)
    }

    pub fn put(&self, path: &str, options: RequestOptions) -> Result<ApiResponse, ApiError> {
        self.request(Method::PUT, path, options)
    }

    pub fn patch(&self, path: &str, options: RequestOptions) -> Result<ApiResponse, ApiError> {
        self.request(Method::PATCH, path, options)
    }

    pub fn delete(&self, path: &str, options: RequestOptions) -> Result<ApiResponse, ApiError> {
        self.request(Method::DELETE, path, options)
    }

    pub fn head(&self, path: &str, options: RequestOptions) -> Result<ApiResponse, ApiError> {
        self.request(Method::HEAD, path, options)
    }

    pub fn options(&self, path: &str, options: RequestOptions) -> Result<ApiResponse, ApiError> {
        self.request(Method::OPTIONS, path, options)
    }

    #[tracing::instrument(name = "api_call", skip_all, fields(method = %method, path = %path))]
    pub fn request(&self, method: Method, path: &str, options: RequestOptions) -> Result<ApiResponse, ApiError> {
        let call = self.config.resolve(&options);
        let prepared = PreparedRequest::new(&self.config, method, path, &options)?;

        let (response, trail) = self.dispatch(prepared, &call)?;
        let head = head_of(&response);
        let body = response
            .bytes()
            .map_err(|source| transport(&trail.last, source))?
            .to_vec();
        let elapsed = trail.started.elapsed();
        let (record, last) = trail.assemble(head, body, elapsed);

        report::record_exchange(&self.config, &call, &last, &record);
        validate_all(&record, &call, &self.config.schemas, options.schema.as_ref())?;
        Ok(record)
    }

    /// See [`AsyncApiClient::download_file`](super::AsyncApiClient::download_file).
    #[tracing::instrument(name = "api_download", skip_all, fields(path = %path))]
    pub fn download_file(
        &self,
        path: &str,
        save_to: impl AsRef<Path>,
        options: RequestOptions,
    ) -> Result<ApiResponse, ApiError> {
        let save_to = save_to.as_ref();
        let call = self.config.resolve(&options);
        let prepared = PreparedRequest::new(&self.config, Method::GET, path, &options)?;

        let (mut response, trail) = self.dispatch(prepared, &call)?;
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

        let file = File::create(save_to).map_err(|e| ApiError::file_io(save_to, e))?;
        let mut writer = BufWriter::new(file);
        let copied = response
            .copy_to(&mut writer)
            .map_err(|source| transport(&last, source))
            .and_then(|written| {
                writer.flush().map_err(|e| ApiError::file_io(save_to, e))?;
                Ok(written)
            });
        let written = match copied {
            Ok(written) => written,
            Err(e) => {
                drop(writer);
                discard_partial(save_to);
                return Err(e);
            }
        };
        info!(path = %save_to.display(), bytes = written, "File downloaded and saved");

        validate_time(record.elapsed(), call.assert_time, call.max_response_time)?;
        Ok(record)
    }

    pub fn upload_file(
        &self,
        path: &str,
        field: &str,
        file_path: impl AsRef<Path>,
        options: RequestOptions,
    ) -> Result<ApiResponse, ApiError> {
        let file_path = file_path.as_ref();
        let bytes = std::fs::read(file_path).map_err(|e| ApiError::file_io(file_path, e))?;
        let options = RequestOptions {
            body: Some(RequestBody::File(file_part(field, file_path, bytes))),
            ..options
        };
        self.request(Method::POST, path, options)
    }

    pub fn close(self) {
        info!("Session closed.");
    }

    fn dispatch(&self, prepared: PreparedRequest, call: &CallSettings) -> Result<(Response, Trail), ApiError> {
        let mut trail = Trail::start(prepared);
        loop {
            let response = self
                .build(&trail.last, call)?
                .send()
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
