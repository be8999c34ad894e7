//! Smoke-test client for an image prediction service, built on a minimal
//! reqwest wrapper with an in-memory mock transport for deterministic tests.

pub mod config;
pub mod error;
pub mod logging;
pub mod mock;
pub mod payload;
pub mod probe;
pub mod transport;

pub use reqwest::Method;

pub use config::{ENDPOINT_ENV, ProbeArgs};
pub use error::{ProbeError, ProbeErrorKind, ProbeResult};
pub use mock::{
    MockBehavior, MockBehaviorPlan, MockResponse, MockTransport, MockTransportSnapshot,
    TransportState,
};
pub use payload::{IMAGE_LEN, IMAGE_SIDE, ImagePayload};
pub use probe::{
    DEFAULT_ENDPOINT, HEALTH_PATH, HealthStatus, Prediction, Probe, ProbeOutcome, UPLOAD_FIELD,
    UPLOAD_PATH, run_probe,
};
pub use transport::{
    Client, FormFile, HttpBytes, HttpRequest, HttpResponse, ReqwestTransport, Transport,
    TransportFuture,
};
