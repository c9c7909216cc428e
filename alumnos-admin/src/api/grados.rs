//! Grade endpoints

use axum::{extract::State, http::StatusCode};
use uuid::Uuid;

use alumnos_common::db::Grado;

use crate::error::{ApiError, ApiResult};
use crate::extract::{Json, Path};
use crate::services::grados::{self, GradoInput, GradoResumen};
use crate::AppState;

/// GET /api/grados
pub async fn list_grados(State(state): State<AppState>) -> ApiResult<Json<Vec<GradoResumen>>> {
    Ok(Json(grados::list_grados(&state.db).await?))
}

/// GET /api/grados/:id
pub async fn get_grado(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<Grado>> {
    grados::get_grado(&state.db, id)
        .await?
        .map(Json)
        .ok_or_else(|| ApiError::NotFound(format!("Grado {}", id)))
}

/// POST /api/grados
pub async fn create_grado(
    State(state): State<AppState>,
    Json(body): Json<GradoInput>,
) -> ApiResult<(StatusCode, Json<Grado>)> {
    let grado = grados::create_grado(&state.db, body).await?;
    Ok((StatusCode::CREATED, Json(grado)))
}

/// PUT /api/grados/:id
pub async fn update_grado(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(body): Json<GradoInput>,
) -> ApiResult<Json<Grado>> {
    Ok(Json(grados::update_grado(&state.db, id, body).await?))
}

/// DELETE /api/grados/:id
///
/// 409 while any student is assigned to the grade.
pub async fn delete_grado(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<StatusCode> {
    grados::delete_grado(&state.db, id).await?;
    Ok(StatusCode::NO_CONTENT)
}
