//! HTTP API handlers for alumnos-admin

pub mod alumnos;
pub mod auth;
pub mod buildinfo;
pub mod familiares;
pub mod grados;
pub mod health;
pub mod sse;
pub mod stats;

pub use auth::auth_middleware;
pub use buildinfo::get_build_info;
pub use health::health_routes;
pub use sse::session_events;
pub use stats::get_stats;

use crate::error::ApiError;
use axum::http::Uri;

/// Fallback for unknown paths
pub async fn not_found(uri: Uri) -> ApiError {
    ApiError::NotFound(format!("No route for {}", uri.path()))
}
