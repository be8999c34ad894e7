use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::Router;
use axum::extract::{Multipart, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use bytes::Bytes;
use clap::Parser;
use predict_probe::{IMAGE_LEN, ImagePayload, Probe, ProbeArgs, ProbeErrorKind, run_probe};
use sonic_rs::json;
use tokio::net::TcpListener;
use tokio::time::sleep;

const CAT: &str = r#"{"class": "cat", "confidence": 0.93}"#;

#[derive(Clone, Default)]
struct AppState {
    received: Arc<Mutex<Vec<Bytes>>>,
}

impl AppState {
    fn received(&self) -> Vec<Bytes> {
        self.received.lock().expect("state lock").clone()
    }
}

#[tokio::test]
async fn e2e_predict_returns_service_json() {
    let server = TestServer::start().await;

    let value = run_probe(&server.url("/predict"))
        .await
        .expect("test server should answer");
    assert_eq!(value, json!({"class": "cat", "confidence": 0.93}));

    let received = server.state.received();
    assert_eq!(received.len(), 1);
    let payload: ImagePayload =
        sonic_rs::from_slice(&received[0]).expect("server got an image payload");
    assert_eq!(payload.len(), IMAGE_LEN);
    assert!(payload.pixels().iter().all(|p| (0.0..1.0).contains(p)));
}

#[tokio::test]
async fn e2e_output_is_body_as_sent() {
    let server = TestServer::start().await;

    let outcome = Probe::new(server.url("/predict"))
        .run()
        .await
        .expect("test server should answer");
    let mut out = Vec::new();
    outcome.write_to(&mut out).expect("write to vec");
    assert_eq!(out, format!("{CAT}\n").into_bytes());
}

#[tokio::test]
async fn e2e_server_error_is_rejected_with_status() {
    let server = TestServer::start().await;

    let err = run_probe(&server.url("/broken"))
        .await
        .expect_err("500 should fail");
    assert_eq!(err.kind(), ProbeErrorKind::Rejected);
    assert_eq!(err.status(), Some(500));
}

#[tokio::test]
async fn e2e_unreachable_service_is_a_connect_error() {
    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind spare port");
    let addr = listener.local_addr().expect("local addr");
    drop(listener);

    let err = run_probe(&format!("http://{addr}/predict"))
        .await
        .expect_err("closed port should refuse");
    assert_eq!(err.kind(), ProbeErrorKind::Connect);
}

#[tokio::test]
async fn e2e_configured_timeout_triggers() {
    let server = TestServer::start().await;

    let err = Probe::new(server.url("/slow"))
        .with_timeout(Duration::from_millis(200))
        .run()
        .await
        .expect_err("slow handler should time out");
    assert_eq!(err.kind(), ProbeErrorKind::Timeout);
}

#[tokio::test]
async fn e2e_health_reports_healthy() {
    let server = TestServer::start().await;

    let status = Probe::new(server.url("/predict"))
        .health()
        .await
        .expect("health should succeed");
    assert!(status.is_healthy());
}

#[tokio::test]
async fn e2e_each_run_sends_a_fresh_image() {
    let server = TestServer::start().await;
    let probe = Probe::new(server.url("/predict"));

    probe.run().await.expect("first run");
    probe.run().await.expect("second run");

    let received = server.state.received();
    assert_eq!(received.len(), 2);
    assert_ne!(received[0], received[1]);
}

#[tokio::test]
async fn e2e_image_flag_uploads_multipart_file() {
    let server = TestServer::start().await;
    let png = b"\x89PNG\r\n\x1a\ne2e-pixels";
    let path = std::env::temp_dir().join(format!("{}-e2e-face.png", std::process::id()));
    std::fs::write(&path, png).expect("temp image is writable");

    let args = ProbeArgs::try_parse_from([
        "predict-probe",
        "--endpoint",
        server.url("/predict").as_str(),
        "--image",
        path.to_str().expect("temp dir is utf8"),
    ])
    .expect("flags parse");
    let mut out = Vec::new();
    let result = args.execute(&mut out).await;
    let _ = std::fs::remove_file(&path);

    result.expect("upload should succeed");
    assert_eq!(out, format!("{CAT}\n").into_bytes());
    assert_eq!(server.state.received(), vec![Bytes::from_static(png)]);
}

#[tokio::test]
async fn e2e_upload_without_image_extension_is_rejected() {
    let server = TestServer::start().await;
    let path = std::env::temp_dir().join(format!("{}-e2e-face.bin", std::process::id()));
    std::fs::write(&path, b"not an image").expect("temp file is writable");

    let err = Probe::new(server.url("/predict"))
        .upload(&path)
        .await
        .expect_err("octet-stream should be refused");
    let _ = std::fs::remove_file(&path);

    assert_eq!(err.kind(), ProbeErrorKind::Rejected);
    assert_eq!(err.status(), Some(400));
    assert!(err.message.contains("Unsupported image"));
}

struct TestServer {
    base_url: String,
    state: AppState,
    task: tokio::task::JoinHandle<()>,
}

impl TestServer {
    async fn start() -> Self {
        let state = AppState::default();
        let app = Router::new()
            .route("/predict", post(predict_handler))
            .route("/predict/image", post(upload_handler))
            .route("/broken", post(broken_handler))
            .route("/slow", post(slow_handler))
            .route("/health", get(health_handler))
            .with_state(state.clone());

        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind test listener");
        let addr = listener.local_addr().expect("local addr");
        let base_url = format!("http://{}", addr);

        let task = tokio::spawn(async move {
            let _ = axum::serve(listener, app).await;
        });

        Self {
            base_url,
            state,
            task,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.task.abort();
    }
}

async fn predict_handler(State(state): State<AppState>, body: Bytes) -> (StatusCode, &'static str) {
    let valid = sonic_rs::from_slice::<HashMap<String, Vec<f32>>>(&body)
        .map(|fields| fields.get("image").map(Vec::len) == Some(IMAGE_LEN))
        .unwrap_or(false);
    state.received.lock().expect("state lock").push(body);
    if valid {
        (StatusCode::OK, CAT)
    } else {
        (StatusCode::BAD_REQUEST, "Invalid JSON")
    }
}

async fn upload_handler(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> (StatusCode, &'static str) {
    while let Ok(Some(field)) = multipart.next_field().await {
        if field.name() != Some("image") {
            continue;
        }
        let accepted = matches!(field.content_type(), Some("image/png" | "image/jpeg"));
        let Ok(bytes) = field.bytes().await else {
            break;
        };
        if !accepted {
            return (StatusCode::BAD_REQUEST, "Unsupported image");
        }
        state.received.lock().expect("state lock").push(bytes);
        return (StatusCode::OK, CAT);
    }
    (StatusCode::BAD_REQUEST, "No image file provided")
}

async fn broken_handler() -> (StatusCode, &'static str) {
    (StatusCode::INTERNAL_SERVER_ERROR, "")
}

async fn slow_handler() -> (StatusCode, &'static str) {
    sleep(Duration::from_millis(2500)).await;
    (StatusCode::OK, CAT)
}

async fn health_handler() -> (StatusCode, &'static str) {
    (StatusCode::OK, r#"{"status":"healthy"}"#)
}
