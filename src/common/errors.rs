//! Service-level error taxonomy and its HTTP mapping.

use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use thiserror::Error;

use crate::share::catalog::CatalogError;
use crate::utils::security::PathValidationError;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("Server not configured. Call /api/setup first.")]
    NotConfigured,

    #[error("Invalid authentication credentials")]
    Unauthorized,

    // never carries the offending path: it may describe locations outside the root
    #[error("Invalid path")]
    InvalidPath,

    #[error("{0}")]
    NotFound(String),

    #[error("Uploading this file would exceed reserved space ({used} of {reserved} bytes used, {requested} requested)")]
    QuotaExceeded { used: u64, reserved: u64, requested: u64 },

    #[error("Insufficient disk space for requested reservation ({available} bytes free, {requested} requested)")]
    InsufficientSpace { available: u64, requested: u64 },

    #[error("Selected folder does not exist on server")]
    NotAFolder,

    #[error("{0}")]
    TunnelUnavailable(String),

    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    Conflict(String),

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl AppError {
    pub fn status(&self) -> StatusCode {
        match self {
            AppError::NotConfigured
            | AppError::InvalidPath
            | AppError::QuotaExceeded { .. }
            | AppError::InsufficientSpace { .. }
            | AppError::NotAFolder
            | AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::Unauthorized => StatusCode::UNAUTHORIZED,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Conflict(_) => StatusCode::CONFLICT,
            AppError::TunnelUnavailable(_) => StatusCode::BAD_GATEWAY,
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<PathValidationError> for AppError {
    fn from(err: PathValidationError) -> Self {
        match err {
            PathValidationError::RootUnavailable(detail) => {
                tracing::warn!("Shared folder is unavailable: {}", detail);
                AppError::NotFound("Shared folder is no longer available".to_string())
            }
            other => {
                tracing::debug!("Rejected client path: {}", other);
                AppError::InvalidPath
            }
        }
    }
}

impl From<CatalogError> for AppError {
    fn from(err: CatalogError) -> Self {
        match err {
            CatalogError::InvalidPath(err) => err.into(),
            CatalogError::NotFound(msg) => AppError::NotFound(msg),
            CatalogError::Io(err) => {
                AppError::Internal(anyhow::Error::new(err).context("Failed to read folder"))
            }
            CatalogError::Internal(err) => AppError::Internal(err),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();

        let message = match &self {
            // include the whole context chain so the failure is diagnosable from the body
            AppError::Internal(err) => {
                tracing::error!("Internal error: {:#}", err);
                format!("{err:#}")
            }
            other => {
                tracing::debug!(status = status.as_u16(), "Request rejected: {}", other);
                other.to_string()
            }
        };

        let body = Json(json!({ "error": message }));

        if matches!(self, AppError::Unauthorized) {
            return (
                status,
                [(header::WWW_AUTHENTICATE, "Basic realm=\"foldershare\"")],
                body,
            )
                .into_response();
        }

        (status, body).into_response()
    }
}
