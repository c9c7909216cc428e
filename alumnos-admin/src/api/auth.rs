//! Authentication middleware and session endpoints
//!
//! Protected routes require `Authorization: Bearer <token>`. The SSE
//! endpoint also accepts `?access_token=<token>` because browser
//! `EventSource` cannot set headers.

use axum::{
    extract::{Query, Request, State},
    http::{header, StatusCode},
    middleware::Next,
    response::Response,
    Extension,
};
use serde::{Deserialize, Serialize};
use tracing::debug;
use uuid::Uuid;

use alumnos_common::api::types::{CredentialsRequest, SessionResponse};

use crate::error::{ApiError, ApiResult};
use crate::extract::Json;
use crate::session::Session;
use crate::AppState;

/// The only route that takes its token from the query string
pub const EVENTS_PATH: &str = "/api/auth/events";

#[derive(Debug, Deserialize)]
struct TokenQuery {
    access_token: Option<String>,
}

/// Resolve the bearer token into a [`Session`] request extension
///
/// Responds 401 when the token is missing, unknown or expired.
pub async fn auth_middleware(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> ApiResult<Response> {
    let token = bearer_token(&request)
        .or_else(|| query_token(&request))
        .ok_or_else(|| ApiError::Unauthorized("Missing bearer token".to_string()))?;

    let session = state
        .sessions
        .get_session(&token)
        .await?
        .ok_or_else(|| ApiError::Unauthorized("Session expired or invalid".to_string()))?;

    debug!("{} {} as {}", request.method(), request.uri().path(), session.user.email);
    request.extensions_mut().insert(session);
    Ok(next.run(request).await)
}

fn bearer_token(request: &Request) -> Option<String> {
    request
        .headers()
        .get(header::AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty())
}

fn query_token(request: &Request) -> Option<String> {
    if request.uri().path() != EVENTS_PATH {
        return None;
    }
    Query::<TokenQuery>::try_from_uri(request.uri())
        .ok()?
        .0
        .access_token
        .filter(|t| !t.is_empty())
}

/// Current user as reported by GET /api/auth/session
#[derive(Debug, Serialize)]
pub struct SessionInfo {
    pub user_id: Uuid,
    pub email: String,
    pub expires_at: chrono::DateTime<chrono::Utc>,
}

/// POST /api/auth/signup
pub async fn sign_up(
    State(state): State<AppState>,
    Json(body): Json<CredentialsRequest>,
) -> ApiResult<(StatusCode, Json<SessionResponse>)> {
    let session = state.sessions.sign_up(&body.email, &body.password).await?;
    Ok((StatusCode::CREATED, Json(session.to_response())))
}

/// POST /api/auth/signin
pub async fn sign_in(
    State(state): State<AppState>,
    Json(body): Json<CredentialsRequest>,
) -> ApiResult<Json<SessionResponse>> {
    let session = state.sessions.sign_in(&body.email, &body.password).await?;
    Ok(Json(session.to_response()))
}

/// POST /api/auth/signout
pub async fn sign_out(
    State(state): State<AppState>,
    Extension(session): Extension<Session>,
) -> ApiResult<StatusCode> {
    state.sessions.sign_out(&session.token).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// GET /api/auth/session
pub async fn get_session(Extension(session): Extension<Session>) -> Json<SessionInfo> {
    Json(SessionInfo {
        user_id: session.user.id,
        email: session.user.email,
        expires_at: session.expires_at,
    })
}

/// POST /api/auth/refresh
pub async fn refresh(
    State(state): State<AppState>,
    Extension(session): Extension<Session>,
) -> ApiResult<Json<SessionResponse>> {
    let refreshed = state.sessions.refresh(&session.token).await?;
    Ok(Json(refreshed.to_response()))
}
