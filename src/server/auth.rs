//! HTTP Basic credential extraction and share gating.
//!
//! Only the password matters; the username is accepted and ignored.

use async_trait::async_trait;
use axum::extract::FromRequestParts;
use axum::http::header::AUTHORIZATION;
use axum::http::request::Parts;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use std::sync::Arc;

use crate::common::AppError;
use crate::server::state::AppState;
use crate::share::ActiveShare;

/// Password taken from `Authorization: Basic <base64(user:password)>`.
pub struct BasicAuth(pub String);

#[async_trait]
impl<S: Send + Sync> FromRequestParts<S> for BasicAuth {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let header = parts
            .headers
            .get(AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .ok_or(AppError::Unauthorized)?;

        parse_basic(header).map(BasicAuth).ok_or(AppError::Unauthorized)
    }
}

/// Share snapshot whose credential matched the request.
///
/// Runs before any body extractor, so unauthenticated uploads are refused
/// without reading the payload.
pub struct AuthorizedShare(pub Arc<ActiveShare>);

#[async_trait]
impl FromRequestParts<AppState> for AuthorizedShare {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        // NotConfigured wins over a missing or wrong password
        state.share.current()?;
        let BasicAuth(password) = BasicAuth::from_request_parts(parts, state).await?;
        let share = state.share.authenticate(&password).await?;
        Ok(AuthorizedShare(share))
    }
}

fn parse_basic(header: &str) -> Option<String> {
    let (scheme, encoded) = header.trim().split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("basic") {
        return None;
    }

    let decoded = STANDARD.decode(encoded.trim()).ok()?;
    let decoded = String::from_utf8(decoded).ok()?;
    // passwords may contain ':', usernames may not
    let (_user, password) = decoded.split_once(':')?;
    Some(password.to_string())
}
