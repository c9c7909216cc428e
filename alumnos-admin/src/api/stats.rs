//! Dashboard statistics endpoint

use axum::{extract::State, Json};

use crate::error::ApiResult;
use crate::services::stats::{self, DashboardStats};
use crate::AppState;

/// GET /api/estadisticas
pub async fn get_stats(State(state): State<AppState>) -> ApiResult<Json<DashboardStats>> {
    Ok(Json(stats::dashboard_stats(&state.db).await?))
}
