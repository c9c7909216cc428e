//! alumnos-admin library - student and family records service
//!
//! JSON API over the records database. Every `/api` route except sign up,
//! sign in and build info requires a bearer session token.

use axum::Router;
use sqlx::SqlitePool;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

pub mod api;
pub mod error;
pub mod extract;
pub mod pagination;
pub mod services;
pub mod session;

use session::SessionContext;

/// Application state shared across HTTP handlers
#[derive(Clone)]
pub struct AppState {
    /// Database connection pool
    pub db: SqlitePool,
    /// Accounts, sessions and session-change events
    pub sessions: SessionContext,
}

impl AppState {
    pub fn new(db: SqlitePool, sessions: SessionContext) -> Self {
        Self { db, sessions }
    }
}

/// Build application router
pub fn build_router(state: AppState) -> Router {
    use axum::middleware;
    use axum::routing::{delete, get, post};

    // Protected routes (require a session)
    let protected = Router::new()
        .route("/api/auth/signout", post(api::auth::sign_out))
        .route("/api/auth/session", get(api::auth::get_session))
        .route("/api/auth/refresh", post(api::auth::refresh))
        .route(api::auth::EVENTS_PATH, get(api::session_events))
        .route(
            "/api/alumnos",
            get(api::alumnos::list_alumnos).post(api::alumnos::create_alumno),
        )
        .route(
            "/api/alumnos/:id",
            get(api::alumnos::get_alumno)
                .put(api::alumnos::update_alumno)
                .delete(api::alumnos::delete_alumno),
        )
        .route(
            "/api/alumnos/:id/familiares",
            get(api::alumnos::list_familiares_of_alumno)
                .post(api::alumnos::add_familiares)
                .delete(api::alumnos::remove_all_familiares),
        )
        .route(
            "/api/alumnos/:id/familiares/:familiar_id",
            delete(api::alumnos::remove_familiar),
        )
        .route("/api/alumnos/:id/reporte", get(api::alumnos::get_report))
        .route(
            "/api/familiares",
            get(api::familiares::list_familiares).post(api::familiares::create_familiar),
        )
        .route(
            "/api/familiares/:id",
            get(api::familiares::get_familiar)
                .put(api::familiares::update_familiar)
                .delete(api::familiares::delete_familiar),
        )
        .route(
            "/api/familiares/:id/gastos",
            get(api::familiares::list_gastos).post(api::familiares::add_gasto),
        )
        .route(
            "/api/familiares/:id/gastos/:gasto_id",
            delete(api::familiares::delete_gasto),
        )
        .route("/api/familiares/:id/resumen", get(api::familiares::get_summary))
        .route(
            "/api/grados",
            get(api::grados::list_grados).post(api::grados::create_grado),
        )
        .route(
            "/api/grados/:id",
            get(api::grados::get_grado)
                .put(api::grados::update_grado)
                .delete(api::grados::delete_grado),
        )
        .route("/api/estadisticas", get(api::get_stats))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            api::auth_middleware,
        ));

    // Public routes (no authentication)
    let public = Router::new()
        .route("/api/auth/signup", post(api::auth::sign_up))
        .route("/api/auth/signin", post(api::auth::sign_in))
        .route("/api/buildinfo", get(api::get_build_info))
        .merge(api::health_routes());

    Router::new()
        .merge(protected)
        .merge(public)
        .fallback(api::not_found)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
