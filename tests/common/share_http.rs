use std::sync::Arc;

use axum::{
    body::Body,
    http::{Method, Request},
    response::Response,
    Router,
};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use http_body_util::BodyExt;

use foldershare::common::config::ServerSettings;
use foldershare::server::{create_router, AppState};
use foldershare::share::ShareService;

const BOUNDARY: &str = "----FolderShareBoundary9XcQ2pLm";

//=============
// App Factory
//=============
pub fn create_test_app(service: ShareService) -> (Router, Arc<ShareService>) {
    create_test_app_with(service, &ServerSettings::default())
}

pub fn create_test_app_with(
    service: ShareService,
    settings: &ServerSettings,
) -> (Router, Arc<ShareService>) {
    let share = Arc::new(service);
    let app = create_router(AppState::new(Arc::clone(&share)), settings);
    (app, share)
}

//==================
// Request Builders
//==================
pub fn basic(password: &str) -> String {
    format!("Basic {}", STANDARD.encode(format!("visitor:{password}")))
}

pub fn get(uri: &str, password: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder().method(Method::GET).uri(uri);
    if let Some(password) = password {
        builder = builder.header("Authorization", basic(password));
    }
    builder.body(Body::empty()).expect("Failed to build request")
}

pub fn preflight(uri: &str, origin: &str) -> Request<Body> {
    Request::builder()
        .method(Method::OPTIONS)
        .uri(uri)
        .header("Origin", origin)
        .header("Access-Control-Request-Method", "GET")
        .header("Access-Control-Request-Headers", "authorization")
        .body(Body::empty())
        .expect("Failed to build preflight request")
}

pub fn build_setup_request(folder: &str, space: f64, password: &str) -> Request<Body> {
    let json = serde_json::json!({ "folder": folder, "space": space, "password": password });
    Request::builder()
        .method(Method::POST)
        .uri("/api/setup")
        .header("content-type", "application/json")
        .body(Body::from(
            serde_json::to_vec(&json).expect("Failed to serialize JSON"),
        ))
        .expect("Failed to build setup request")
}

pub fn build_upload_request(
    target_dir: Option<&str>,
    filename: &str,
    contents: &[u8],
    password: &str,
) -> Request<Body> {
    let mut body = Vec::new();

    if let Some(dir) = target_dir {
        body.extend_from_slice(format!("--{BOUNDARY}\r\n").as_bytes());
        body.extend_from_slice(b"Content-Disposition: form-data; name=\"path\"\r\n\r\n");
        body.extend_from_slice(dir.as_bytes());
        body.extend_from_slice(b"\r\n");
    }

    body.extend_from_slice(format!("--{BOUNDARY}\r\n").as_bytes());
    body.extend_from_slice(
        format!("Content-Disposition: form-data; name=\"file\"; filename=\"{filename}\"\r\n")
            .as_bytes(),
    );
    body.extend_from_slice(b"Content-Type: application/octet-stream\r\n\r\n");
    body.extend_from_slice(contents);
    body.extend_from_slice(b"\r\n");
    body.extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());

    Request::builder()
        .method(Method::POST)
        .uri("/api/upload")
        .header(
            "content-type",
            format!("multipart/form-data; boundary={BOUNDARY}"),
        )
        .header("Authorization", basic(password))
        .body(Body::from(body))
        .expect("Failed to build multipart request")
}

//==================
// Response Helpers
//==================
pub async fn body_bytes(response: Response) -> Vec<u8> {
    response
        .into_body()
        .collect()
        .await
        .expect("Failed to read body")
        .to_bytes()
        .to_vec()
}

pub async fn body_json(response: Response) -> serde_json::Value {
    serde_json::from_slice(&body_bytes(response).await).expect("Response is not JSON")
}
