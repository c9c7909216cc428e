//! Grade (grado) operations
//!
//! Deletion is guarded in a single statement: the row only goes away when
//! no student references it, so there is no window between check and
//! delete.

use super::{backend_error, qualified, require_name};
use alumnos_common::db::{Grado, GRADO_COLUMNS};
use alumnos_common::{time, uuid_utils, Error, Result};
use serde::{Deserialize, Serialize};
use sqlx::{Row, SqlitePool};
use tracing::info;
use uuid::Uuid;

/// Create / update payload
#[derive(Debug, Clone, Deserialize)]
pub struct GradoInput {
    pub nombre: String,
}

/// Grade with the number of students assigned to it
#[derive(Debug, Clone, Serialize)]
pub struct GradoResumen {
    #[serde(flatten)]
    pub grado: Grado,
    pub alumnos_count: i64,
}

/// List every grade ordered by name
pub async fn list_grados(pool: &SqlitePool) -> Result<Vec<GradoResumen>> {
    let sql = format!(
        "SELECT {}, (SELECT COUNT(*) FROM alumno a WHERE a.id_grado = g.id) AS alumnos_count
         FROM grado g
         ORDER BY g.nombre COLLATE NOCASE ASC",
        qualified(GRADO_COLUMNS, "g")
    );
    let rows = sqlx::query(&sql)
        .fetch_all(pool)
        .await
        .map_err(backend_error("list grados"))?;

    rows.iter()
        .map(|row| -> Result<GradoResumen> {
            Ok(GradoResumen {
                grado: Grado::from_row(row)?,
                alumnos_count: row.try_get("alumnos_count")?,
            })
        })
        .collect()
}

/// Load one grade; `None` when the id does not exist
pub async fn get_grado(pool: &SqlitePool, id: Uuid) -> Result<Option<Grado>> {
    let row = sqlx::query(&format!("SELECT {} FROM grado WHERE id = ?", GRADO_COLUMNS))
        .bind(id.to_string())
        .fetch_optional(pool)
        .await
        .map_err(backend_error("get grado"))?;

    row.as_ref().map(Grado::from_row).transpose()
}

pub async fn create_grado(pool: &SqlitePool, input: GradoInput) -> Result<Grado> {
    let nombre = require_name("nombre", &input.nombre)?;
    let grado = Grado {
        id: uuid_utils::generate(),
        nombre,
        created_at: time::now_rfc3339(),
    };

    sqlx::query("INSERT INTO grado (id, nombre, created_at) VALUES (?, ?, ?)")
        .bind(grado.id.to_string())
        .bind(&grado.nombre)
        .bind(&grado.created_at)
        .execute(pool)
        .await
        .map_err(backend_error("insert grado"))
        .map_err(|e| duplicate_name(e, &grado.nombre))?;

    info!("Created grado {} ({})", grado.nombre, grado.id);
    Ok(grado)
}

pub async fn update_grado(pool: &SqlitePool, id: Uuid, input: GradoInput) -> Result<Grado> {
    let nombre = require_name("nombre", &input.nombre)?;

    let result = sqlx::query("UPDATE grado SET nombre = ? WHERE id = ?")
        .bind(&nombre)
        .bind(id.to_string())
        .execute(pool)
        .await
        .map_err(backend_error("update grado"))
        .map_err(|e| duplicate_name(e, &nombre))?;

    if result.rows_affected() == 0 {
        return Err(Error::NotFound(format!("Grado {}", id)));
    }

    get_grado(pool, id)
        .await?
        .ok_or_else(|| Error::NotFound(format!("Grado {}", id)))
}

/// Delete a grade that no student references
///
/// Fails with `Conflict` naming the number of assigned students, or
/// `NotFound` when the id does not exist. Either way nothing changes.
pub async fn delete_grado(pool: &SqlitePool, id: Uuid) -> Result<()> {
    let id_text = id.to_string();
    let result = sqlx::query(
        "DELETE FROM grado
         WHERE id = ?
           AND NOT EXISTS (SELECT 1 FROM alumno WHERE id_grado = ?)",
    )
    .bind(&id_text)
    .bind(&id_text)
    .execute(pool)
    .await
    .map_err(backend_error("delete grado"))?;

    if result.rows_affected() == 1 {
        info!("Deleted grado {}", id);
        return Ok(());
    }

    let grado = get_grado(pool, id)
        .await?
        .ok_or_else(|| Error::NotFound(format!("Grado {}", id)))?;

    let alumnos: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM alumno WHERE id_grado = ?")
        .bind(&id_text)
        .fetch_one(pool)
        .await
        .map_err(backend_error("count alumnos by grado"))?;

    Err(Error::Conflict(format!(
        "Cannot delete grado '{}': {} student(s) are assigned to it",
        grado.nombre, alumnos
    )))
}

fn duplicate_name(err: Error, nombre: &str) -> Error {
    if err.is_unique_violation() {
        Error::Conflict(format!("Grado '{}' already exists", nombre))
    } else {
        err
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alumnos_common::db::init_memory_database;

    async fn insert_alumno_in(pool: &SqlitePool, id_grado: Uuid) {
        sqlx::query(
            "INSERT INTO alumno (id, nombre, id_grado, created_at, updated_at)
             VALUES (?, 'Juan', ?, 'now', 'now')",
        )
        .bind(Uuid::new_v4().to_string())
        .bind(id_grado.to_string())
        .execute(pool)
        .await
        .unwrap();
    }

    #[tokio::test]
    async fn test_create_and_list() {
        let pool = init_memory_database().await.unwrap();
        let segundo = create_grado(&pool, GradoInput { nombre: "Segundo".into() }).await.unwrap();
        create_grado(&pool, GradoInput { nombre: "  Primero ".into() }).await.unwrap();
        insert_alumno_in(&pool, segundo.id).await;

        let grados = list_grados(&pool).await.unwrap();

        assert_eq!(grados.len(), 2);
        assert_eq!(grados[0].grado.nombre, "Primero");
        assert_eq!(grados[0].alumnos_count, 0);
        assert_eq!(grados[1].alumnos_count, 1);
    }

    #[tokio::test]
    async fn test_duplicate_name_is_conflict() {
        let pool = init_memory_database().await.unwrap();
        create_grado(&pool, GradoInput { nombre: "Primero".into() }).await.unwrap();

        let err = create_grado(&pool, GradoInput { nombre: "primero".into() })
            .await
            .unwrap_err();

        assert!(matches!(err, Error::Conflict(_)));
    }

    #[tokio::test]
    async fn test_blank_name_rejected() {
        let pool = init_memory_database().await.unwrap();
        let err = create_grado(&pool, GradoInput { nombre: "   ".into() }).await.unwrap_err();
        assert!(matches!(err, Error::InvalidInput(_)));
    }

    #[tokio::test]
    async fn test_update_missing_is_not_found() {
        let pool = init_memory_database().await.unwrap();
        let err = update_grado(&pool, Uuid::new_v4(), GradoInput { nombre: "X".into() })
            .await
            .unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
    }

    #[tokio::test]
    async fn test_delete_unreferenced_grado() {
        let pool = init_memory_database().await.unwrap();
        let grado = create_grado(&pool, GradoInput { nombre: "Tercero".into() }).await.unwrap();

        delete_grado(&pool, grado.id).await.unwrap();

        assert!(get_grado(&pool, grado.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_delete_grado_with_students_fails_and_keeps_rows() {
        let pool = init_memory_database().await.unwrap();
        let grado = create_grado(&pool, GradoInput { nombre: "Cuarto".into() }).await.unwrap();
        insert_alumno_in(&pool, grado.id).await;
        insert_alumno_in(&pool, grado.id).await;

        let err = delete_grado(&pool, grado.id).await.unwrap_err();

        match err {
            Error::Conflict(msg) => {
                assert!(msg.contains("Cuarto"));
                assert!(msg.contains("2 student(s)"));
            }
            other => panic!("expected conflict, got {:?}", other),
        }
        assert!(get_grado(&pool, grado.id).await.unwrap().is_some());
        let alumnos: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM alumno")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(alumnos, 2);
    }

    #[tokio::test]
    async fn test_delete_missing_grado_is_not_found() {
        let pool = init_memory_database().await.unwrap();
        let err = delete_grado(&pool, Uuid::new_v4()).await.unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
    }
}
