//! Family member and expense endpoints

use axum::{extract::State, http::StatusCode};
use uuid::Uuid;

use alumnos_common::db::Gasto;

use crate::error::{ApiError, ApiResult};
use crate::extract::{Json, Path, Query};
use crate::pagination::{Page, PageRequest};
use crate::services::familiares::{
    self, FamiliarDetail, FamiliarFilter, FamiliarListItem, FamiliarResumen, FamiliarUpdate,
    GastoInput, NewFamiliar,
};
use crate::AppState;

/// GET /api/familiares
pub async fn list_familiares(
    State(state): State<AppState>,
    Query(filter): Query<FamiliarFilter>,
    Query(page): Query<PageRequest>,
) -> ApiResult<Json<Page<FamiliarListItem>>> {
    Ok(Json(familiares::list_familiares(&state.db, &filter, page).await?))
}

/// GET /api/familiares/:id
pub async fn get_familiar(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<FamiliarDetail>> {
    familiares::get_familiar_detail(&state.db, id)
        .await?
        .map(Json)
        .ok_or_else(|| not_found(id))
}

/// POST /api/familiares
pub async fn create_familiar(
    State(state): State<AppState>,
    Json(body): Json<NewFamiliar>,
) -> ApiResult<(StatusCode, Json<FamiliarDetail>)> {
    let detail = familiares::create_familiar(&state.db, body).await?;
    Ok((StatusCode::CREATED, Json(detail)))
}

/// PUT /api/familiares/:id
pub async fn update_familiar(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(body): Json<FamiliarUpdate>,
) -> ApiResult<Json<FamiliarDetail>> {
    Ok(Json(familiares::update_familiar(&state.db, id, body).await?))
}

/// DELETE /api/familiares/:id
///
/// Also removes its gastos and student links.
pub async fn delete_familiar(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<StatusCode> {
    familiares::delete_familiar(&state.db, id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// GET /api/familiares/:id/gastos
pub async fn list_gastos(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<Vec<Gasto>>> {
    if familiares::get_familiar(&state.db, id).await?.is_none() {
        return Err(not_found(id));
    }
    Ok(Json(familiares::list_gastos(&state.db, id).await?))
}

/// POST /api/familiares/:id/gastos
pub async fn add_gasto(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(body): Json<GastoInput>,
) -> ApiResult<(StatusCode, Json<Gasto>)> {
    let gasto = familiares::add_gasto(&state.db, id, body).await?;
    Ok((StatusCode::CREATED, Json(gasto)))
}

/// DELETE /api/familiares/:id/gastos/:gasto_id
pub async fn delete_gasto(
    State(state): State<AppState>,
    Path((id, gasto_id)): Path<(Uuid, Uuid)>,
) -> ApiResult<StatusCode> {
    familiares::delete_gasto(&state.db, id, gasto_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// GET /api/familiares/:id/resumen
pub async fn get_summary(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<FamiliarResumen>> {
    familiares::familiar_summary(&state.db, id)
        .await?
        .map(Json)
        .ok_or_else(|| not_found(id))
}

fn not_found(id: Uuid) -> ApiError {
    ApiError::NotFound(format!("Familiar {}", id))
}
