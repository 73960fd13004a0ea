mod common;

use axum::http::{header, StatusCode};
use common::share_http::{
    body_bytes, body_json, build_setup_request, build_upload_request, create_test_app,
    create_test_app_with, get, preflight,
};
use common::{local_service, path_str, setup_temp_dir, write_file};
use foldershare::common::config::{ServerSettings, SymlinkPolicy};
use tower::ServiceExt;

const PASSWORD: &str = "hunter22";

async fn configured_app(dir: &tempfile::TempDir) -> axum::Router {
    let (app, _share) = create_test_app(local_service(SymlinkPolicy::Reject));
    let response = app
        .clone()
        .oneshot(build_setup_request(path_str(dir.path()), 1.0, PASSWORD))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    app
}

#[tokio::test]
async fn health_is_public() {
    let (app, _) = create_test_app(local_service(SymlinkPolicy::Reject));
    let response = app.oneshot(get("/health", None)).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_bytes(response).await, b"OK");
}

#[tokio::test]
async fn setup_returns_url() {
    let dir = setup_temp_dir();
    let (app, _) = create_test_app(local_service(SymlinkPolicy::Reject));

    let response = app
        .oneshot(build_setup_request(path_str(dir.path()), 1.0, PASSWORD))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["url"], "http://127.0.0.1:8123");
}

#[tokio::test]
async fn setup_errors_are_json() {
    let dir = setup_temp_dir();
    let (app, _) = create_test_app(local_service(SymlinkPolicy::Reject));
    let missing = dir.path().join("missing");

    let response = app
        .oneshot(build_setup_request(path_str(&missing), 1.0, PASSWORD))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let json = body_json(response).await;
    assert_eq!(json["error"], "Selected folder does not exist on server");
}

#[tokio::test]
async fn unconfigured_wins_over_missing_credentials() {
    let (app, _) = create_test_app(local_service(SymlinkPolicy::Reject));

    let response = app.oneshot(get("/api/files", None)).await.unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let json = body_json(response).await;
    assert!(json["error"].as_str().unwrap().contains("not configured"));
}

#[tokio::test]
async fn wrong_or_missing_password_is_challenged() {
    let dir = setup_temp_dir();
    let app = configured_app(&dir).await;

    for password in [None, Some("wrong")] {
        let response = app
            .clone()
            .oneshot(get("/api/files", password))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert!(response
            .headers()
            .get(header::WWW_AUTHENTICATE)
            .is_some());
    }
}

#[tokio::test]
async fn files_listing_is_json() {
    let dir = setup_temp_dir();
    write_file(dir.path(), "docs/readme.md", 12);
    write_file(dir.path(), "photo.png", 30);
    let app = configured_app(&dir).await;

    let response = app
        .clone()
        .oneshot(get("/api/files", Some(PASSWORD)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;

    assert_eq!(json["path"], "");
    let items = json["items"].as_array().unwrap();
    assert_eq!(items[0]["name"], "docs");
    assert_eq!(items[0]["is_dir"], true);
    assert_eq!(items[0]["kind"], "folder");
    assert_eq!(items[1]["name"], "photo.png");
    assert_eq!(items[1]["kind"], "image");
    assert_eq!(json["storage"]["used"], 42);

    let response = app
        .oneshot(get("/api/files?path=docs", Some(PASSWORD)))
        .await
        .unwrap();
    let json = body_json(response).await;
    assert_eq!(json["breadcrumbs"][0]["path"], "docs");
    assert_eq!(json["items"][0]["path"], "docs/readme.md");
}

#[tokio::test]
async fn traversal_is_bad_request() {
    let dir = setup_temp_dir();
    let app = configured_app(&dir).await;

    for uri in [
        "/api/files?path=..",
        "/api/files?path=%2e%2e%2f%2e%2e",
        "/api/download/..%2f..%2fetc%2fpasswd",
        "/api/preview/%2e%2e/secret.txt",
    ] {
        let response = app.clone().oneshot(get(uri, Some(PASSWORD))).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST, "{uri}");
        let json = body_json(response).await;
        assert_eq!(json["error"], "Invalid path", "{uri}");
    }
}

#[tokio::test]
async fn download_streams_as_attachment() {
    let dir = setup_temp_dir();
    std::fs::write(dir.path().join("notes.txt"), b"hello share").unwrap();
    let app = configured_app(&dir).await;

    let response = app
        .oneshot(get("/api/download/notes.txt", Some(PASSWORD)))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let headers = response.headers();
    assert_eq!(headers[header::CONTENT_LENGTH], "11");
    assert_eq!(headers[header::CONTENT_TYPE], "text/plain; charset=utf-8");
    assert!(headers[header::CONTENT_DISPOSITION]
        .to_str()
        .unwrap()
        .starts_with("attachment; filename=\"notes.txt\""));
    assert_eq!(body_bytes(response).await, b"hello share");
}

#[tokio::test]
async fn preview_is_inline() {
    let dir = setup_temp_dir();
    write_file(dir.path(), "img/cat.png", 8);
    let app = configured_app(&dir).await;

    let response = app
        .oneshot(get("/api/preview/img/cat.png", Some(PASSWORD)))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()[header::CONTENT_TYPE], "image/png");
    assert!(response.headers()[header::CONTENT_DISPOSITION]
        .to_str()
        .unwrap()
        .starts_with("inline;"));
}

#[tokio::test]
async fn missing_download_is_not_found() {
    let dir = setup_temp_dir();
    write_file(dir.path(), "folder/a.txt", 1);
    let app = configured_app(&dir).await;

    for uri in ["/api/download/nope.txt", "/api/download/folder"] {
        let response = app.clone().oneshot(get(uri, Some(PASSWORD))).await.unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND, "{uri}");
    }
}

#[tokio::test]
async fn multipart_upload_lands_in_target_folder() {
    let dir = setup_temp_dir();
    std::fs::create_dir(dir.path().join("inbox")).unwrap();
    let app = configured_app(&dir).await;

    let response = app
        .clone()
        .oneshot(build_upload_request(Some("inbox"), "report.csv", b"a,b\n1,2\n", PASSWORD))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["filename"], "report.csv");
    assert_eq!(json["path"], "inbox/report.csv");
    assert_eq!(
        std::fs::read(dir.path().join("inbox/report.csv")).unwrap(),
        b"a,b\n1,2\n"
    );

    let response = app
        .oneshot(build_upload_request(None, "root.txt", b"x", PASSWORD))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert!(dir.path().join("root.txt").exists());
}

#[tokio::test]
async fn upload_rejects_unsafe_name_and_bad_password() {
    let dir = setup_temp_dir();
    let app = configured_app(&dir).await;

    let response = app
        .clone()
        .oneshot(build_upload_request(None, "..", b"x", PASSWORD))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let response = app
        .oneshot(build_upload_request(None, "ok.txt", b"x", "wrong"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert!(!dir.path().join("ok.txt").exists());
}

#[tokio::test]
async fn status_reflects_configuration() {
    let dir = setup_temp_dir();
    let (app, _) = create_test_app(local_service(SymlinkPolicy::Reject));

    let json = body_json(app.clone().oneshot(get("/api/status", None)).await.unwrap()).await;
    assert_eq!(json["configured"], false);
    assert!(json["url"].is_null());

    app.clone()
        .oneshot(build_setup_request(path_str(dir.path()), 1.0, PASSWORD))
        .await
        .unwrap();

    let json = body_json(app.oneshot(get("/api/status", None)).await.unwrap()).await;
    assert_eq!(json["configured"], true);
    assert_eq!(json["url"], "http://127.0.0.1:8123");
    assert!(json["tunnel"].is_null());
}

//======
// CORS
//======
#[tokio::test]
async fn preflight_from_any_origin_is_allowed_by_default() {
    let (app, _) = create_test_app(local_service(SymlinkPolicy::Reject));

    let response = app
        .oneshot(preflight("/api/files", "http://localhost:3000"))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let headers = response.headers();
    assert_eq!(headers[header::ACCESS_CONTROL_ALLOW_ORIGIN], "*");
    assert!(headers.get(header::ACCESS_CONTROL_ALLOW_CREDENTIALS).is_none());
    let allowed = headers[header::ACCESS_CONTROL_ALLOW_HEADERS]
        .to_str()
        .unwrap()
        .to_ascii_lowercase();
    assert!(allowed.contains("authorization"));
}

#[tokio::test]
async fn explicit_origins_get_credentials_and_others_get_nothing() {
    let settings = ServerSettings {
        cors_origins: vec!["http://localhost:3000".to_string()],
        ..ServerSettings::default()
    };
    let (app, _) = create_test_app_with(local_service(SymlinkPolicy::Reject), &settings);

    let response = app
        .clone()
        .oneshot(preflight("/api/files", "http://localhost:3000"))
        .await
        .unwrap();
    let headers = response.headers();
    assert_eq!(
        headers[header::ACCESS_CONTROL_ALLOW_ORIGIN],
        "http://localhost:3000"
    );
    assert_eq!(headers[header::ACCESS_CONTROL_ALLOW_CREDENTIALS], "true");

    let response = app
        .oneshot(preflight("/api/files", "https://elsewhere.example"))
        .await
        .unwrap();
    assert!(response
        .headers()
        .get(header::ACCESS_CONTROL_ALLOW_ORIGIN)
        .is_none());
}

#[tokio::test]
async fn empty_origin_list_sends_no_cors_headers() {
    let settings = ServerSettings {
        cors_origins: Vec::new(),
        ..ServerSettings::default()
    };
    let (app, _) = create_test_app_with(local_service(SymlinkPolicy::Reject), &settings);

    let mut request = get("/health", None);
    request
        .headers_mut()
        .insert(header::ORIGIN, "http://localhost:3000".parse().unwrap());
    let response = app.oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert!(response
        .headers()
        .get(header::ACCESS_CONTROL_ALLOW_ORIGIN)
        .is_none());
}
