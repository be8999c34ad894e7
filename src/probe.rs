//! Single-shot probe against an image prediction service.
//!
//! A run builds one random [`ImagePayload`], POSTs it to the configured
//! endpoint exactly once, and hands back the decoded response. Nothing is
//! retried and nothing is printed here; the caller decides where the
//! [`ProbeOutcome`] goes.

use std::collections::HashMap;
use std::io::Write;
use std::path::Path;
use std::time::Duration;

use reqwest::Url;
use serde::Deserialize;
use sonic_rs::Value;
use tracing::{debug, info};

use crate::error::{ProbeError, ProbeErrorKind, ProbeResult};
use crate::payload::ImagePayload;
use crate::transport::{Client, FormFile, HttpBytes, HttpRequest};

pub const DEFAULT_ENDPOINT: &str = "http://localhost:8080/predict";
pub const HEALTH_PATH: &str = "/health";
pub const UPLOAD_PATH: &str = "/predict/image";
/// Form field the upload endpoint reads the file from.
pub const UPLOAD_FIELD: &str = "image";

/// Response shape of the reference prediction service. Only used to describe
/// a response, never to validate one.
#[derive(Clone, Debug, PartialEq, Deserialize)]
pub struct Prediction {
    pub class: String,
    pub confidence: f32,
    #[serde(default)]
    pub predictions: HashMap<String, f32>,
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
pub struct HealthStatus {
    pub status: String,
}

impl HealthStatus {
    pub fn is_healthy(&self) -> bool {
        self.status == "healthy"
    }
}

#[derive(Clone, Debug)]
pub struct ProbeOutcome {
    pub status: u16,
    pub body: HttpBytes,
    pub value: Value,
    pub elapsed: Duration,
}

impl ProbeOutcome {
    /// Writes the body as the service sent it, followed by a single newline.
    pub fn write_to<W: Write>(&self, mut out: W) -> ProbeResult<()> {
        out.write_all(self.body.trim_ascii_end())?;
        out.write_all(b"\n")?;
        out.flush()?;
        Ok(())
    }

    pub fn prediction(&self) -> Option<Prediction> {
        sonic_rs::from_slice(&self.body).ok()
    }
}

#[derive(Clone)]
pub struct Probe {
    client: Client,
    endpoint: String,
    timeout: Option<Duration>,
    seed: Option<u64>,
}

impl Probe {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            endpoint: endpoint.into(),
            timeout: None,
            seed: None,
        }
    }

    pub fn with_client(mut self, client: Client) -> Self {
        self.client = client;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    pub fn payload(&self) -> ImagePayload {
        match self.seed {
            Some(seed) => ImagePayload::seeded(seed),
            None => ImagePayload::random(),
        }
    }

    pub async fn run(&self) -> ProbeResult<ProbeOutcome> {
        let payload = self.payload();
        self.send(&payload).await
    }

    pub async fn send(&self, payload: &ImagePayload) -> ProbeResult<ProbeOutcome> {
        let url = self.endpoint_url()?;
        info!(endpoint = %url, pixels = payload.len(), "posting probe image");

        let request = self
            .client
            .post_json(url.as_str(), payload)?
            .with_timeout(self.timeout);
        self.exchange(request).await
    }

    /// Uploads an image file as the `image` form field of `/predict/image`.
    pub async fn upload(&self, path: impl AsRef<Path>) -> ProbeResult<ProbeOutcome> {
        let path = path.as_ref();
        let url = self.resolve(UPLOAD_PATH)?;
        let bytes = tokio::fs::read(path).await.map_err(|err| {
            ProbeError::new(
                ProbeErrorKind::Io,
                None,
                format!("{}: {err}", path.display()),
            )
        })?;
        let file = FormFile {
            field: UPLOAD_FIELD.to_string(),
            file_name: path
                .file_name()
                .map(|name| name.to_string_lossy().into_owned())
                .unwrap_or_else(|| "image".to_string()),
            content_type: image_content_type(path).to_string(),
            bytes: bytes.into(),
        };
        info!(
            endpoint = %url,
            file = %file.file_name,
            bytes = file.bytes.len(),
            "uploading image"
        );

        let request = HttpRequest::post(url.as_str())
            .with_form(file)
            .with_timeout(self.timeout);
        self.exchange(request).await
    }

    /// GET `/health` on the endpoint's host.
    pub async fn health(&self) -> ProbeResult<HealthStatus> {
        let url = self.resolve(HEALTH_PATH)?;
        info!(url = %url, "checking service health");

        let request = HttpRequest::get(url.as_str()).with_timeout(self.timeout);
        let status: HealthStatus = self.client.execute_json_checked(request).await?;
        info!(status = %status.status, "health answered");
        Ok(status)
    }

    async fn exchange(&self, request: HttpRequest) -> ProbeResult<ProbeOutcome> {
        let response = self.client.execute_checked(request).await?;
        let value: Value = response.json()?;

        let outcome = ProbeOutcome {
            status: response.status,
            body: response.body,
            value,
            elapsed: response.elapsed,
        };
        info!(
            status = outcome.status,
            elapsed_ms = outcome.elapsed.as_millis() as u64,
            "probe answered"
        );
        match outcome.prediction() {
            Some(prediction) => info!(
                class = %prediction.class,
                confidence = prediction.confidence,
                "prediction"
            ),
            None => debug!("response does not look like a prediction"),
        }
        Ok(outcome)
    }

    fn endpoint_url(&self) -> ProbeResult<Url> {
        Url::parse(&self.endpoint).map_err(|err| ProbeError::invalid_url(&self.endpoint, err))
    }

    /// `path` on the endpoint's origin.
    fn resolve(&self, path: &str) -> ProbeResult<Url> {
        self.endpoint_url()?
            .join(path)
            .map_err(|err| ProbeError::invalid_url(&self.endpoint, err))
    }
}

/// The service decodes JPEG and PNG; anything else is sent as opaque bytes.
fn image_content_type(path: &Path) -> &'static str {
    let extension = path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(str::to_ascii_lowercase);
    match extension.as_deref() {
        Some("jpg" | "jpeg") => "image/jpeg",
        Some("png") => "image/png",
        _ => "application/octet-stream",
    }
}

impl Default for Probe {
    fn default() -> Self {
        Self::new(DEFAULT_ENDPOINT)
    }
}

/// Sends one random image to `endpoint` and returns the decoded JSON answer.
pub async fn run_probe(endpoint: &str) -> ProbeResult<Value> {
    Probe::new(endpoint).run().await.map(|outcome| outcome.value)
}
