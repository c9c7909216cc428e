//! Student endpoints

use axum::{
    extract::State,
    http::{header, StatusCode},
    response::{IntoResponse, Response},
};
use serde::Deserialize;
use uuid::Uuid;

use alumnos_common::db::Familiar;

use crate::error::{ApiError, ApiResult};
use crate::extract::{Json, Path, Query};
use crate::pagination::{Page, PageRequest};
use crate::services::alumnos::{
    self, AlumnoDetail, AlumnoFilter, AlumnoListItem, AlumnoUpdate, NewAlumno,
};
use crate::services::report::{self, AlumnoReport};
use crate::AppState;

/// GET /api/alumnos
pub async fn list_alumnos(
    State(state): State<AppState>,
    Query(filter): Query<AlumnoFilter>,
    Query(page): Query<PageRequest>,
) -> ApiResult<Json<Page<AlumnoListItem>>> {
    Ok(Json(alumnos::list_alumnos(&state.db, &filter, page).await?))
}

/// GET /api/alumnos/:id
pub async fn get_alumno(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<AlumnoDetail>> {
    alumnos::get_alumno(&state.db, id)
        .await?
        .map(Json)
        .ok_or_else(|| not_found(id))
}

/// POST /api/alumnos
///
/// A new student must be linked to at least one familiar.
pub async fn create_alumno(
    State(state): State<AppState>,
    Json(body): Json<NewAlumno>,
) -> ApiResult<(StatusCode, Json<AlumnoDetail>)> {
    if body.familiares_ids.is_empty() {
        return Err(ApiError::BadRequest(
            "familiares_ids must name at least one familiar".to_string(),
        ));
    }
    let detail = alumnos::create_alumno(&state.db, body).await?;
    Ok((StatusCode::CREATED, Json(detail)))
}

/// PUT /api/alumnos/:id
pub async fn update_alumno(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(body): Json<AlumnoUpdate>,
) -> ApiResult<Json<AlumnoDetail>> {
    Ok(Json(alumnos::update_alumno(&state.db, id, body).await?))
}

/// DELETE /api/alumnos/:id
pub async fn delete_alumno(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<StatusCode> {
    alumnos::delete_alumno(&state.db, id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// GET /api/alumnos/:id/familiares
pub async fn list_familiares_of_alumno(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<Vec<Familiar>>> {
    ensure_exists(&state, id).await?;
    Ok(Json(alumnos::alumno_familiares(&state.db, id).await?))
}

#[derive(Debug, Deserialize)]
pub struct FamiliaresIds {
    pub familiares_ids: Vec<Uuid>,
}

/// POST /api/alumnos/:id/familiares
pub async fn add_familiares(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(body): Json<FamiliaresIds>,
) -> ApiResult<Json<Vec<Familiar>>> {
    let linked = alumnos::add_familiares_to_alumno(&state.db, id, &body.familiares_ids).await?;
    Ok(Json(linked))
}

/// DELETE /api/alumnos/:id/familiares
pub async fn remove_all_familiares(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<serde_json::Value>> {
    ensure_exists(&state, id).await?;
    let removed = alumnos::remove_familiares_from_alumno(&state.db, id, None).await?;
    Ok(Json(serde_json::json!({ "removed": removed })))
}

/// DELETE /api/alumnos/:id/familiares/:familiar_id
pub async fn remove_familiar(
    State(state): State<AppState>,
    Path((id, familiar_id)): Path<(Uuid, Uuid)>,
) -> ApiResult<StatusCode> {
    let removed =
        alumnos::remove_familiares_from_alumno(&state.db, id, Some(&[familiar_id])).await?;
    if removed == 0 {
        return Err(ApiError::NotFound(format!(
            "Familiar {} is not linked to alumno {}",
            familiar_id, id
        )));
    }
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Debug, Default, Deserialize)]
pub struct ReportQuery {
    /// `json` (default) or `texto`
    #[serde(default)]
    pub formato: Option<String>,
}

/// GET /api/alumnos/:id/reporte
pub async fn get_report(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Query(query): Query<ReportQuery>,
) -> ApiResult<Response> {
    let report: AlumnoReport = report::alumno_report(&state.db, id)
        .await?
        .ok_or_else(|| not_found(id))?;

    match query.formato.as_deref() {
        None | Some("json") => Ok(Json(report).into_response()),
        Some("texto") => Ok((
            [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
            report::render_text(&report),
        )
            .into_response()),
        Some(other) => Err(ApiError::BadRequest(format!(
            "Unknown report format '{}' (expected json or texto)",
            other
        ))),
    }
}

async fn ensure_exists(state: &AppState, id: Uuid) -> ApiResult<()> {
    if alumnos::alumno_exists(&state.db, id).await? {
        Ok(())
    } else {
        Err(not_found(id))
    }
}

fn not_found(id: Uuid) -> ApiError {
    ApiError::NotFound(format!("Alumno {}", id))
}
