use std::{
    future::Future,
    pin::Pin,
    sync::Arc,
    time::{Duration, Instant},
};

use bytes::Bytes;
use reqwest::header::HeaderValue;
use reqwest::multipart::{Form, Part};
use reqwest::{Client as ReqwestClient, Method, RequestBuilder};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::{debug, warn};

use crate::error::{ProbeError, ProbeErrorKind, ProbeResult};

pub type HttpBytes = Bytes;
pub type TransportFuture<T> = Pin<Box<dyn Future<Output = T> + Send + 'static>>;

pub const CONTENT_TYPE_JSON: &str = "application/json";

/// Single file field of a `multipart/form-data` body.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FormFile {
    pub field: String,
    pub file_name: String,
    pub content_type: String,
    pub bytes: HttpBytes,
}

/// Outbound exchange. `body` and `form` are exclusive; a form wins.
#[derive(Clone, Debug)]
pub struct HttpRequest {
    pub method: Method,
    pub url: String,
    pub headers: Vec<(String, HttpBytes)>,
    pub body: Option<HttpBytes>,
    pub form: Option<FormFile>,
    pub timeout: Option<Duration>,
}

impl HttpRequest {
    pub fn new(method: Method, url: impl Into<String>) -> Self {
        Self {
            method,
            url: url.into(),
            headers: Vec::new(),
            body: None,
            form: None,
            timeout: None,
        }
    }

    pub fn get(url: impl Into<String>) -> Self {
        Self::new(Method::GET, url)
    }

    pub fn post(url: impl Into<String>) -> Self {
        Self::new(Method::POST, url)
    }

    pub fn with_header(mut self, key: impl Into<String>, value: impl Into<HttpBytes>) -> Self {
        self.headers.push((key.into(), value.into()));
        self
    }

    pub fn with_body(mut self, body: impl Into<HttpBytes>) -> Self {
        self.body = Some(body.into());
        self
    }

    pub fn with_form(mut self, file: FormFile) -> Self {
        self.form = Some(file);
        self
    }

    /// Applies `timeout` only when one is set.
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        if timeout.is_some() {
            self.timeout = timeout;
        }
        self
    }

    pub fn header(&self, key: &str) -> Option<&[u8]> {
        self.headers
            .iter()
            .find(|(name, _)| name.eq_ignore_ascii_case(key))
            .map(|(_, value)| value.as_ref())
    }
}

#[derive(Clone, Debug)]
pub struct HttpResponse {
    pub status: u16,
    pub body: HttpBytes,
    pub elapsed: Duration,
}

impl HttpResponse {
    pub fn status(&self) -> u16 {
        self.status
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn body(&self) -> &[u8] {
        &self.body
    }

    pub fn json<T: DeserializeOwned>(&self) -> ProbeResult<T> {
        Ok(sonic_rs::from_slice(&self.body)?)
    }
}

/// Performs one HTTP exchange. Implementations must not retry.
pub trait Transport: Send + Sync {
    fn execute(&self, request: HttpRequest) -> TransportFuture<ProbeResult<HttpResponse>>;
}

#[derive(Clone)]
pub struct Client {
    transport: Arc<dyn Transport>,
}

impl Client {
    pub fn new() -> Self {
        Self::with_transport(ReqwestTransport::default())
    }

    pub fn with_transport<T>(transport: T) -> Self
    where
        T: Transport + 'static,
    {
        Self {
            transport: Arc::new(transport),
        }
    }

    pub async fn execute(&self, request: HttpRequest) -> ProbeResult<HttpResponse> {
        debug!(method = %request.method, url = %request.url, "sending request");
        let response = self.transport.execute(request).await?;
        debug!(
            status = response.status,
            bytes = response.body.len(),
            elapsed_ms = response.elapsed.as_millis() as u64,
            "response received"
        );
        Ok(response)
    }

    /// Like [`Client::execute`], but a non-2xx status becomes a `Rejected` error.
    pub async fn execute_checked(&self, request: HttpRequest) -> ProbeResult<HttpResponse> {
        let response = self.execute(request).await?;
        if !response.is_success() {
            warn!(status = response.status, "service rejected request");
            return Err(ProbeError::rejected(response.status, response.body()));
        }
        Ok(response)
    }

    pub async fn execute_json_checked<T>(&self, request: HttpRequest) -> ProbeResult<T>
    where
        T: DeserializeOwned,
    {
        self.execute_checked(request).await?.json::<T>()
    }

    /// Builds a JSON POST request without sending it.
    pub fn post_json<T: Serialize>(
        &self,
        url: impl Into<String>,
        payload: &T,
    ) -> ProbeResult<HttpRequest> {
        let body = sonic_rs::to_vec(payload)?;
        Ok(HttpRequest::post(url)
            .with_header("content-type", CONTENT_TYPE_JSON)
            .with_body(body))
    }
}

impl Default for Client {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Clone, Debug, Default)]
pub struct ReqwestTransport {
    client: ReqwestClient,
}

impl ReqwestTransport {
    fn build(&self, request: HttpRequest) -> ProbeResult<RequestBuilder> {
        let mut builder = self.client.request(request.method, &request.url);
        for (key, value) in request.headers {
            let value = HeaderValue::from_bytes(&value)
                .map_err(|err| ProbeError::internal(format!("header {key}: {err}")))?;
            builder = builder.header(key, value);
        }
        builder = match (request.form, request.body) {
            (Some(file), _) => {
                let part = Part::bytes(file.bytes.to_vec())
                    .file_name(file.file_name)
                    .mime_str(&file.content_type)
                    .map_err(|err| ProbeError::from_reqwest(err, ProbeErrorKind::Internal))?;
                builder.multipart(Form::new().part(file.field, part))
            }
            (None, Some(body)) => builder.body(body),
            (None, None) => builder,
        };
        if let Some(timeout) = request.timeout {
            builder = builder.timeout(timeout);
        }
        Ok(builder)
    }
}

impl Transport for ReqwestTransport {
    fn execute(&self, request: HttpRequest) -> TransportFuture<ProbeResult<HttpResponse>> {
        let builder = self.build(request);
        Box::pin(async move {
            let started = Instant::now();
            let response = builder?
                .send()
                .await
                .map_err(|err| ProbeError::from_reqwest(err, ProbeErrorKind::Send))?;
            let status = response.status().as_u16();
            let body = response
                .bytes()
                .await
                .map_err(|err| ProbeError::from_reqwest(err, ProbeErrorKind::Receive))?;
            Ok(HttpResponse {
                status,
                body,
                elapsed: started.elapsed(),
            })
        })
    }
}
