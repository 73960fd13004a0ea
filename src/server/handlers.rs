//! HTTP handlers: thin translation between requests and `ShareService`.

use anyhow::Context;
use axum::body::Body;
use axum::extract::{Path, Query, State};
use axum::http::header::{CONTENT_DISPOSITION, CONTENT_LENGTH, CONTENT_TYPE};
use axum::response::Response;
use axum::Json;
use axum_typed_multipart::{FieldData, TryFromMultipart, TypedMultipart};
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use tokio_util::io::ReaderStream;

use crate::common::AppError;
use crate::server::auth::AuthorizedShare;
use crate::server::state::AppState;
use crate::share::catalog::Listing;
use crate::share::{FileDownload, ShareStatus};

#[derive(Debug, Deserialize)]
pub struct SetupRequest {
    pub folder: String,
    /// Reserved space in GB.
    pub space: f64,
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct SetupResponse {
    pub url: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct FilesQuery {
    #[serde(default)]
    pub path: String,
}

/// Multipart payload for a single file upload.
#[derive(TryFromMultipart)]
pub struct UploadRequest {
    // bounded by the router's body limit
    #[form_data(limit = "unlimited")]
    pub file: FieldData<Bytes>,
    /// Target folder relative to the root; the root when absent.
    pub path: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct UploadResponse {
    pub message: String,
    pub filename: String,
    pub path: String,
}

pub async fn setup(
    State(state): State<AppState>,
    Json(req): Json<SetupRequest>,
) -> Result<Json<SetupResponse>, AppError> {
    tracing::debug!(folder = %req.folder, space = req.space, "setup");
    let outcome = state
        .share
        .setup(&req.folder, req.space, &req.password)
        .await?;
    Ok(Json(SetupResponse {
        url: outcome.public_url,
    }))
}

pub async fn status(State(state): State<AppState>) -> Json<ShareStatus> {
    Json(state.share.status())
}

pub async fn list_files(
    AuthorizedShare(share): AuthorizedShare,
    State(state): State<AppState>,
    Query(query): Query<FilesQuery>,
) -> Result<Json<Listing>, AppError> {
    let listing = state.share.list_files(&share, &query.path).await?;
    Ok(Json(listing))
}

pub async fn download(
    AuthorizedShare(share): AuthorizedShare,
    State(state): State<AppState>,
    Path(path): Path<String>,
) -> Result<Response, AppError> {
    let file = state.share.download(&share, &path).await?;
    stream_file(file).await
}

pub async fn preview(
    AuthorizedShare(share): AuthorizedShare,
    State(state): State<AppState>,
    Path(path): Path<String>,
) -> Result<Response, AppError> {
    let file = state.share.preview(&share, &path).await?;
    stream_file(file).await
}

pub async fn upload(
    AuthorizedShare(share): AuthorizedShare,
    State(state): State<AppState>,
    TypedMultipart(req): TypedMultipart<UploadRequest>,
) -> Result<Json<UploadResponse>, AppError> {
    let filename = req
        .file
        .metadata
        .file_name
        .clone()
        .filter(|name| !name.is_empty())
        .ok_or_else(|| AppError::BadRequest("Uploaded file has no name".to_string()))?;

    let outcome = state
        .share
        .upload(&share, req.path.as_deref(), &filename, req.file.contents)
        .await?;

    Ok(Json(UploadResponse {
        message: "File uploaded".to_string(),
        filename: outcome.filename,
        path: outcome.path,
    }))
}

async fn stream_file(file: FileDownload) -> Result<Response, AppError> {
    let handle = match tokio::fs::File::open(&file.path).await {
        Ok(handle) => handle,
        // removed between lookup and open
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
            return Err(AppError::NotFound("File not found".to_string()));
        }
        Err(err) => return Err(anyhow::Error::new(err).context("Failed to open file").into()),
    };

    let response = Response::builder()
        .header(CONTENT_TYPE, file.content_type)
        .header(CONTENT_LENGTH, file.size)
        .header(
            CONTENT_DISPOSITION,
            content_disposition(file.disposition.as_str(), &file.file_name),
        )
        .body(Body::from_stream(ReaderStream::new(handle)))
        .context("Failed to build file response")?;

    Ok(response)
}

/// `<kind>; filename="<ascii>"; filename*=UTF-8''<pct-encoded>`
fn content_disposition(kind: &str, file_name: &str) -> String {
    let fallback: String = file_name
        .chars()
        .map(|c| {
            if (c.is_ascii_graphic() && c != '"' && c != '\\') || c == ' ' {
                c
            } else {
                '_'
            }
        })
        .collect();

    let encoded = urlencoding::encode(file_name);

    format!("{kind}; filename=\"{fallback}\"; filename*=UTF-8''{encoded}")
}
