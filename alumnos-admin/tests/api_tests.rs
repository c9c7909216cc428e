//! Integration tests for alumnos-admin API endpoints
//!
//! Tests cover:
//! - Health, build info and unknown-path handling
//! - Student CRUD and the student <-> familiar association
//! - Familiar cascade delete, gastos and summaries
//! - Guarded grade deletion
//! - Reports, statistics and pagination

use alumnos_admin::session::SessionContext;
use alumnos_admin::{build_router, AppState};
use alumnos_common::db::init_memory_database;
use axum::{
    body::Body,
    http::{header, Request, StatusCode},
};
use serde_json::{json, Value};
use std::time::Duration;
use tower::util::ServiceExt; // for `oneshot` method

/// Test helper: app over a fresh in-memory database plus a signed-in token
async fn setup_app() -> (axum::Router, String) {
    let db = init_memory_database().await.expect("Should open in-memory database");
    let sessions = SessionContext::new(db.clone(), Duration::from_secs(3600)).unwrap();
    let app = build_router(AppState::new(db, sessions));

    let (status, body) = send(
        &app,
        "POST",
        "/api/auth/signup",
        None,
        Some(json!({"email": "admin@example.org", "password": "s3cret-pass"})),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    let token = body["access_token"].as_str().unwrap().to_string();

    (app, token)
}

/// Test helper: send a request and decode the JSON body (`Null` when empty)
async fn send(
    app: &axum::Router,
    method: &str,
    uri: &str,
    token: Option<&str>,
    body: Option<Value>,
) -> (StatusCode, Value) {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
    }
    let request = match body {
        Some(body) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("Should read body");
    let json = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).expect("Should parse JSON")
    };
    (status, json)
}

async fn create_familiar(app: &axum::Router, token: &str, body: Value) -> String {
    let (status, json) = send(app, "POST", "/api/familiares", Some(token), Some(body)).await;
    assert_eq!(status, StatusCode::CREATED, "{}", json);
    json["id"].as_str().unwrap().to_string()
}

// =============================================================================
// Public endpoints
// =============================================================================

#[tokio::test]
async fn test_health_endpoint_no_auth_required() {
    let (app, _) = setup_app().await;

    let (status, body) = send(&app, "GET", "/health", None, None).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
    assert_eq!(body["module"], "alumnos-admin");
    assert_eq!(body["database"], "ok");
    assert!(body["version"].is_string());
}

#[tokio::test]
async fn test_buildinfo_no_auth_required() {
    let (app, _) = setup_app().await;

    let (status, body) = send(&app, "GET", "/api/buildinfo", None, None).await;

    assert_eq!(status, StatusCode::OK);
    assert!(body["git_hash"].is_string());
    assert!(body["build_profile"].is_string());
}

#[tokio::test]
async fn test_unknown_path_is_json_404() {
    let (app, _) = setup_app().await;

    let (status, body) = send(&app, "GET", "/api/nothing-here", None, None).await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"]["code"], "NOT_FOUND");
}

#[tokio::test]
async fn test_malformed_id_is_json_400() {
    let (app, token) = setup_app().await;

    for uri in ["/api/alumnos/not-a-uuid", "/api/familiares/123", "/api/grados/x"] {
        let (status, body) = send(&app, "GET", uri, Some(&token), None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "{}", uri);
        assert_eq!(body["error"]["code"], "BAD_REQUEST", "{}", uri);
    }

    let (_, body) = send(&app, "GET", "/api/alumnos/not-a-uuid", Some(&token), None).await;
    assert!(body["error"]["message"].as_str().unwrap().contains("UUID"));
}

#[tokio::test]
async fn test_malformed_body_is_json_400() {
    let (app, token) = setup_app().await;

    let request = Request::builder()
        .method("POST")
        .uri("/api/grados")
        .header(header::AUTHORIZATION, format!("Bearer {}", token))
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from("{\"nombre\": "))
        .unwrap();
    let response = app.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let body: Value = serde_json::from_slice(&bytes).expect("Error body should be JSON");
    assert_eq!(body["error"]["code"], "BAD_REQUEST");

    // Well-formed JSON with the wrong shape
    let (status, body) = send(
        &app,
        "POST",
        "/api/familiares",
        Some(&token),
        Some(json!({"nombre": 42})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "BAD_REQUEST");

    let (status, body) = send(&app, "GET", "/api/alumnos?sort=nope", Some(&token), None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "BAD_REQUEST");
}

// =============================================================================
// Students and associations
// =============================================================================

#[tokio::test]
async fn test_maria_juan_scenario() {
    let (app, token) = setup_app().await;
    let maria = create_familiar(
        &app,
        &token,
        json!({"nombre": "Maria", "ingreso_mensual": 5000.0}),
    )
    .await;

    let (status, juan) = send(
        &app,
        "POST",
        "/api/alumnos",
        Some(&token),
        Some(json!({"nombre": "Juan", "familiares_ids": [maria]})),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    let juan_uri = format!("/api/alumnos/{}", juan["id"].as_str().unwrap());

    let (status, detail) = send(&app, "GET", &juan_uri, Some(&token), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(detail["familiares"].as_array().unwrap().len(), 1);
    assert_eq!(detail["familiares"][0]["nombre"], "Maria");

    let (status, _) = send(
        &app,
        "DELETE",
        &format!("/api/familiares/{}", maria),
        Some(&token),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (status, detail) = send(&app, "GET", &juan_uri, Some(&token), None).await;
    assert_eq!(status, StatusCode::OK);
    assert!(detail["familiares"].as_array().unwrap().is_empty());

    let (status, _) = send(
        &app,
        "GET",
        &format!("/api/familiares/{}", maria),
        Some(&token),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_create_alumno_requires_a_familiar() {
    let (app, token) = setup_app().await;

    let (status, body) = send(
        &app,
        "POST",
        "/api/alumnos",
        Some(&token),
        Some(json!({"nombre": "Juan", "familiares_ids": []})),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "BAD_REQUEST");
}

#[tokio::test]
async fn test_unknown_familiar_rolls_back_student() {
    let (app, token) = setup_app().await;

    let (status, _) = send(
        &app,
        "POST",
        "/api/alumnos",
        Some(&token),
        Some(json!({"nombre": "Juan", "familiares_ids": ["6f1c2a4e-0000-4000-8000-000000000000"]})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, list) = send(&app, "GET", "/api/alumnos", Some(&token), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(list["total"], 0);
}

#[tokio::test]
async fn test_update_association_set() {
    let (app, token) = setup_app().await;
    let maria = create_familiar(&app, &token, json!({"nombre": "Maria"})).await;
    let jose = create_familiar(&app, &token, json!({"nombre": "Jose"})).await;
    let (_, juan) = send(
        &app,
        "POST",
        "/api/alumnos",
        Some(&token),
        Some(json!({"nombre": "Juan", "familiares_ids": [maria]})),
    )
    .await;
    let juan_id = juan["id"].as_str().unwrap();

    for _ in 0..2 {
        let (status, detail) = send(
            &app,
            "PUT",
            &format!("/api/alumnos/{}", juan_id),
            Some(&token),
            Some(json!({"nombre": "Juan", "estado": "egresado", "familiares_ids": [jose]})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(detail["estado"], "egresado");
        assert_eq!(detail["familiares"].as_array().unwrap().len(), 1);
        assert_eq!(detail["familiares"][0]["id"], jose.as_str());
    }

    let (status, linked) = send(
        &app,
        "POST",
        &format!("/api/alumnos/{}/familiares", juan_id),
        Some(&token),
        Some(json!({"familiares_ids": [maria, jose]})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(linked.as_array().unwrap().len(), 2);

    let (status, _) = send(
        &app,
        "DELETE",
        &format!("/api/alumnos/{}/familiares/{}", juan_id, maria),
        Some(&token),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (status, removed) = send(
        &app,
        "DELETE",
        &format!("/api/alumnos/{}/familiares", juan_id),
        Some(&token),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(removed["removed"], 1);
}

#[tokio::test]
async fn test_delete_alumno() {
    let (app, token) = setup_app().await;
    let maria = create_familiar(&app, &token, json!({"nombre": "Maria"})).await;
    let (_, juan) = send(
        &app,
        "POST",
        "/api/alumnos",
        Some(&token),
        Some(json!({"nombre": "Juan", "familiares_ids": [maria]})),
    )
    .await;
    let uri = format!("/api/alumnos/{}", juan["id"].as_str().unwrap());

    let (status, _) = send(&app, "DELETE", &uri, Some(&token), None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (status, _) = send(&app, "GET", &uri, Some(&token), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    let (status, _) = send(&app, "DELETE", &uri, Some(&token), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_list_pagination_and_search() {
    let (app, token) = setup_app().await;
    let maria = create_familiar(&app, &token, json!({"nombre": "Maria"})).await;
    for nombre in ["Ana", "Beto", "Carla", "Dario", "Elena"] {
        let (status, _) = send(
            &app,
            "POST",
            "/api/alumnos",
            Some(&token),
            Some(json!({"nombre": nombre, "familiares_ids": [maria]})),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
    }

    let (status, page) = send(
        &app,
        "GET",
        "/api/alumnos?page=2&page_size=2&sort=nombre&order=desc",
        Some(&token),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(page["total"], 5);
    assert_eq!(page["total_pages"], 3);
    assert_eq!(page["page"], 2);
    assert_eq!(page["items"][0]["nombre"], "Carla");

    let (_, found) = send(&app, "GET", "/api/alumnos?search=ele", Some(&token), None).await;
    assert_eq!(found["total"], 1);
    assert_eq!(found["items"][0]["nombre"], "Elena");
    assert_eq!(found["items"][0]["familiares_count"], 1);
}

#[tokio::test]
async fn test_report_json_and_text() {
    let (app, token) = setup_app().await;
    let maria = create_familiar(
        &app,
        &token,
        json!({
            "nombre": "Maria",
            "ingreso_mensual": 3000.0,
            "gastos": [{"nombre": "Alquiler", "monto": 1000.0}]
        }),
    )
    .await;
    let (_, juan) = send(
        &app,
        "POST",
        "/api/alumnos",
        Some(&token),
        Some(json!({"nombre": "Juan", "familiares_ids": [maria]})),
    )
    .await;
    let uri = format!("/api/alumnos/{}/reporte", juan["id"].as_str().unwrap());

    let (status, report) = send(&app, "GET", &uri, Some(&token), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(report["hogar"]["integrantes"], 2);
    assert_eq!(report["hogar"]["ingreso_per_capita"], 1500.0);
    assert_eq!(report["familiares"][0]["balance"], 2000.0);

    let request = Request::builder()
        .uri(format!("{}?formato=texto", uri))
        .header(header::AUTHORIZATION, format!("Bearer {}", token))
        .body(Body::empty())
        .unwrap();
    let response = app.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert!(response.headers()[header::CONTENT_TYPE]
        .to_str()
        .unwrap()
        .starts_with("text/plain"));
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    assert!(String::from_utf8_lossy(&bytes).contains("RESUMEN DEL HOGAR"));

    let (status, _) = send(&app, "GET", &format!("{}?formato=pdf", uri), Some(&token), None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

// =============================================================================
// Familiares and gastos
// =============================================================================

#[tokio::test]
async fn test_gastos_and_summary() {
    let (app, token) = setup_app().await;
    let maria = create_familiar(
        &app,
        &token,
        json!({"nombre": "Maria", "ingreso_mensual": 5000.0}),
    )
    .await;
    let gastos_uri = format!("/api/familiares/{}/gastos", maria);

    let (status, gasto) = send(
        &app,
        "POST",
        &gastos_uri,
        Some(&token),
        Some(json!({"nombre": "Luz", "monto": 250.5})),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);

    let (status, bad) = send(
        &app,
        "POST",
        &gastos_uri,
        Some(&token),
        Some(json!({"nombre": "Agua", "monto": -3.0})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(bad["error"]["message"].as_str().unwrap().contains("monto"));

    let (_, resumen) = send(
        &app,
        "GET",
        &format!("/api/familiares/{}/resumen", maria),
        Some(&token),
        None,
    )
    .await;
    assert_eq!(resumen["gastos_count"], 1);
    assert_eq!(resumen["balance"], 4749.5);

    let (status, _) = send(
        &app,
        "DELETE",
        &format!("{}/{}", gastos_uri, gasto["id"].as_str().unwrap()),
        Some(&token),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (_, gastos) = send(&app, "GET", &gastos_uri, Some(&token), None).await;
    assert!(gastos.as_array().unwrap().is_empty());
}

// =============================================================================
// Grados and statistics
// =============================================================================

#[tokio::test]
async fn test_grado_with_students_cannot_be_deleted() {
    let (app, token) = setup_app().await;
    let (status, grado) = send(
        &app,
        "POST",
        "/api/grados",
        Some(&token),
        Some(json!({"nombre": "Primero"})),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    let grado_id = grado["id"].as_str().unwrap().to_string();

    let (status, _) = send(
        &app,
        "POST",
        "/api/grados",
        Some(&token),
        Some(json!({"nombre": "primero"})),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);

    let maria = create_familiar(&app, &token, json!({"nombre": "Maria"})).await;
    send(
        &app,
        "POST",
        "/api/alumnos",
        Some(&token),
        Some(json!({"nombre": "Juan", "id_grado": grado_id, "familiares_ids": [maria]})),
    )
    .await;

    let uri = format!("/api/grados/{}", grado_id);
    let (status, body) = send(&app, "DELETE", &uri, Some(&token), None).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert!(body["error"]["message"].as_str().unwrap().contains("1 student(s)"));

    let (status, _) = send(&app, "GET", &uri, Some(&token), None).await;
    assert_eq!(status, StatusCode::OK);

    let (_, grados) = send(&app, "GET", "/api/grados", Some(&token), None).await;
    assert_eq!(grados[0]["alumnos_count"], 1);
}

#[tokio::test]
async fn test_estadisticas() {
    let (app, token) = setup_app().await;
    create_familiar(&app, &token, json!({"nombre": "Maria", "ingreso_mensual": 4000.0})).await;
    create_familiar(&app, &token, json!({"nombre": "Jose", "ingreso_mensual": 2000.0})).await;

    let (status, stats) = send(&app, "GET", "/api/estadisticas", Some(&token), None).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(stats["total_familiares"], 2);
    assert_eq!(stats["total_alumnos"], 0);
    assert_eq!(stats["promedio_ingreso_familiar"], 3000.0);
}

// =============================================================================
// On-disk database
// =============================================================================

#[tokio::test]
async fn test_records_survive_restart() {
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("alumnos.db");

    let db = alumnos_common::db::init_database(&db_path).await.unwrap();
    let sessions = SessionContext::new(db.clone(), Duration::from_secs(3600)).unwrap();
    let app = build_router(AppState::new(db.clone(), sessions));
    let (_, signup) = send(
        &app,
        "POST",
        "/api/auth/signup",
        None,
        Some(json!({"email": "admin@example.org", "password": "s3cret-pass"})),
    )
    .await;
    let token = signup["access_token"].as_str().unwrap().to_string();
    create_familiar(&app, &token, json!({"nombre": "Maria"})).await;
    db.close().await;

    let db = alumnos_common::db::init_database(&db_path).await.unwrap();
    let sessions = SessionContext::new(db.clone(), Duration::from_secs(3600)).unwrap();
    let app = build_router(AppState::new(db, sessions));

    let (status, list) = send(&app, "GET", "/api/familiares", Some(&token), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(list["total"], 1);
    assert_eq!(list["items"][0]["nombre"], "Maria");
}
