//! Student (alumno) operations and the student <-> familiar association
//!
//! Student rows and their `alumnoxfamiliar` links are always written in the
//! same transaction. A link to a familiar that does not exist fails the
//! foreign key, which aborts the transaction and surfaces as
//! `InvalidInput`.

use super::{
    backend_error, like_pattern, non_blank, qualified, require_name, SortOrder, LIKE_ESCAPE,
};
use crate::pagination::{calculate_pagination, Page, PageRequest};
use alumnos_common::db::{
    Alumno, Familiar, Grado, ALUMNO_COLUMNS, FAMILIAR_COLUMNS, GRADO_COLUMNS,
};
use alumnos_common::{time, uuid_utils, Error, Result};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use sqlx::{QueryBuilder, Row, Sqlite, SqliteConnection, SqlitePool};
use tracing::{debug, info};
use uuid::Uuid;

/// Enrollment status given to students created without one
pub const DEFAULT_ESTADO: &str = "activo";

/// Editable student fields
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AlumnoData {
    pub nombre: String,
    #[serde(default)]
    pub apellido: String,
    #[serde(default)]
    pub documento: Option<String>,
    #[serde(default)]
    pub fecha_nacimiento: Option<NaiveDate>,
    #[serde(default)]
    pub genero: Option<String>,
    #[serde(default)]
    pub direccion: Option<String>,
    #[serde(default)]
    pub telefono: Option<String>,
    #[serde(default)]
    pub fecha_ingreso: Option<NaiveDate>,
    #[serde(default)]
    pub motivo_ingreso: Option<String>,
    #[serde(default)]
    pub estado: Option<String>,
    #[serde(default)]
    pub id_grado: Option<Uuid>,
    #[serde(default)]
    pub id_familiar: Option<Uuid>,
}

struct ValidAlumno {
    nombre: String,
    apellido: String,
    documento: Option<String>,
    fecha_nacimiento: Option<NaiveDate>,
    genero: Option<String>,
    direccion: Option<String>,
    telefono: Option<String>,
    fecha_ingreso: Option<NaiveDate>,
    motivo_ingreso: Option<String>,
    estado: String,
    id_grado: Option<String>,
    id_familiar: Option<String>,
}

impl AlumnoData {
    fn validated(self) -> Result<ValidAlumno> {
        Ok(ValidAlumno {
            nombre: require_name("nombre", &self.nombre)?,
            apellido: self.apellido.trim().to_string(),
            documento: non_blank(self.documento),
            fecha_nacimiento: self.fecha_nacimiento,
            genero: non_blank(self.genero),
            direccion: non_blank(self.direccion),
            telefono: non_blank(self.telefono),
            fecha_ingreso: self.fecha_ingreso,
            motivo_ingreso: non_blank(self.motivo_ingreso),
            estado: non_blank(self.estado).unwrap_or_else(|| DEFAULT_ESTADO.to_string()),
            id_grado: self.id_grado.map(|id| id.to_string()),
            id_familiar: self.id_familiar.map(|id| id.to_string()),
        })
    }
}

/// Create payload
#[derive(Debug, Clone, Deserialize)]
pub struct NewAlumno {
    #[serde(flatten)]
    pub data: AlumnoData,
    #[serde(default)]
    pub familiares_ids: Vec<Uuid>,
}

/// Update payload; `familiares_ids: Some(..)` replaces the association set
#[derive(Debug, Clone, Deserialize)]
pub struct AlumnoUpdate {
    #[serde(flatten)]
    pub data: AlumnoData,
    #[serde(default)]
    pub familiares_ids: Option<Vec<Uuid>>,
}

#[derive(Debug, Clone, Copy, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlumnoSort {
    #[default]
    Apellido,
    Nombre,
    FechaNacimiento,
    FechaIngreso,
    Estado,
    Grado,
    CreatedAt,
}

impl AlumnoSort {
    fn column(self) -> &'static str {
        match self {
            AlumnoSort::Apellido => "a.apellido COLLATE NOCASE",
            AlumnoSort::Nombre => "a.nombre COLLATE NOCASE",
            AlumnoSort::FechaNacimiento => "a.fecha_nacimiento",
            AlumnoSort::FechaIngreso => "a.fecha_ingreso",
            AlumnoSort::Estado => "a.estado COLLATE NOCASE",
            AlumnoSort::Grado => "g.nombre COLLATE NOCASE",
            AlumnoSort::CreatedAt => "a.created_at",
        }
    }
}

/// Student list filter
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AlumnoFilter {
    /// Matches nombre, apellido or documento
    #[serde(default)]
    pub search: Option<String>,
    #[serde(default)]
    pub id_grado: Option<Uuid>,
    #[serde(default)]
    pub estado: Option<String>,
    /// Only students linked to this familiar
    #[serde(default)]
    pub id_familiar: Option<Uuid>,
    #[serde(default)]
    pub sort: AlumnoSort,
    #[serde(default)]
    pub order: SortOrder,
}

#[derive(Debug, Clone, Serialize)]
pub struct AlumnoListItem {
    #[serde(flatten)]
    pub alumno: Alumno,
    pub grado_nombre: Option<String>,
    pub familiares_count: i64,
}

/// Student with grade, linked familiares and current age
#[derive(Debug, Clone, Serialize)]
pub struct AlumnoDetail {
    #[serde(flatten)]
    pub alumno: Alumno,
    pub grado: Option<Grado>,
    pub familiares: Vec<Familiar>,
    pub edad: Option<u32>,
}

fn push_filters(qb: &mut QueryBuilder<'_, Sqlite>, filter: &AlumnoFilter) {
    qb.push(" WHERE 1 = 1");
    if let Some(pattern) = like_pattern(filter.search.as_deref()) {
        qb.push(" AND (a.nombre LIKE ")
            .push_bind(pattern.clone())
            .push(LIKE_ESCAPE)
            .push(" OR a.apellido LIKE ")
            .push_bind(pattern.clone())
            .push(LIKE_ESCAPE)
            .push(" OR a.documento LIKE ")
            .push_bind(pattern)
            .push(LIKE_ESCAPE)
            .push(")");
    }
    if let Some(id_grado) = filter.id_grado {
        qb.push(" AND a.id_grado = ").push_bind(id_grado.to_string());
    }
    if let Some(estado) = non_blank(filter.estado.clone()) {
        qb.push(" AND a.estado = ").push_bind(estado).push(" COLLATE NOCASE");
    }
    if let Some(id_familiar) = filter.id_familiar {
        qb.push(" AND a.id IN (SELECT id_alumno FROM alumnoxfamiliar WHERE id_familiar = ")
            .push_bind(id_familiar.to_string())
            .push(")");
    }
}

/// Filtered, sorted, paginated student list
pub async fn list_alumnos(
    pool: &SqlitePool,
    filter: &AlumnoFilter,
    page: PageRequest,
) -> Result<Page<AlumnoListItem>> {
    let mut count = QueryBuilder::<Sqlite>::new("SELECT COUNT(*) FROM alumno a");
    push_filters(&mut count, filter);
    let total: i64 = count
        .build_query_scalar()
        .fetch_one(pool)
        .await
        .map_err(backend_error("count alumnos"))?;

    let p = calculate_pagination(total, page.page, page.page_size);

    let mut select = QueryBuilder::<Sqlite>::new(format!(
        "SELECT {}, g.nombre AS grado_nombre,
                (SELECT COUNT(*) FROM alumnoxfamiliar x WHERE x.id_alumno = a.id) AS familiares_count
         FROM alumno a
         LEFT JOIN grado g ON g.id = a.id_grado",
        qualified(ALUMNO_COLUMNS, "a")
    ));
    push_filters(&mut select, filter);
    select
        .push(format!(
            " ORDER BY {} {}, a.id ASC LIMIT ",
            filter.sort.column(),
            filter.order.as_sql()
        ))
        .push_bind(p.page_size)
        .push(" OFFSET ")
        .push_bind(p.offset);

    let rows = select
        .build()
        .fetch_all(pool)
        .await
        .map_err(backend_error("list alumnos"))?;

    let items = rows
        .iter()
        .map(|row| -> Result<AlumnoListItem> {
            Ok(AlumnoListItem {
                alumno: Alumno::from_row(row)?,
                grado_nombre: row.try_get("grado_nombre")?,
                familiares_count: row.try_get("familiares_count")?,
            })
        })
        .collect::<Result<Vec<_>>>()?;

    Ok(Page::new(items, total, p))
}

async fn find_alumno(pool: &SqlitePool, id: Uuid) -> Result<Option<Alumno>> {
    let row = sqlx::query(&format!("SELECT {} FROM alumno WHERE id = ?", ALUMNO_COLUMNS))
        .bind(id.to_string())
        .fetch_optional(pool)
        .await
        .map_err(backend_error("get alumno"))?;

    row.as_ref().map(Alumno::from_row).transpose()
}

pub async fn alumno_exists(pool: &SqlitePool, id: Uuid) -> Result<bool> {
    sqlx::query_scalar("SELECT EXISTS (SELECT 1 FROM alumno WHERE id = ?)")
        .bind(id.to_string())
        .fetch_one(pool)
        .await
        .map_err(backend_error("check alumno"))
}

/// Student detail; `None` when the id does not exist
pub async fn get_alumno(pool: &SqlitePool, id: Uuid) -> Result<Option<AlumnoDetail>> {
    let Some(alumno) = find_alumno(pool, id).await? else {
        return Ok(None);
    };

    let grado = match alumno.id_grado {
        Some(id_grado) => {
            let row = sqlx::query(&format!("SELECT {} FROM grado WHERE id = ?", GRADO_COLUMNS))
                .bind(id_grado.to_string())
                .fetch_optional(pool)
                .await
                .map_err(backend_error("get grado of alumno"))?;
            row.as_ref().map(Grado::from_row).transpose()?
        }
        None => None,
    };

    let familiares = alumno_familiares(pool, id).await?;
    let edad = alumno
        .fecha_nacimiento
        .and_then(|birth| time::age_on(birth, time::today()));

    Ok(Some(AlumnoDetail {
        alumno,
        grado,
        familiares,
        edad,
    }))
}

/// Familiares linked to a student, by surname
pub async fn alumno_familiares(pool: &SqlitePool, id: Uuid) -> Result<Vec<Familiar>> {
    let rows = sqlx::query(&format!(
        "SELECT {} FROM familiar f
         JOIN alumnoxfamiliar x ON x.id_familiar = f.id
         WHERE x.id_alumno = ?
         ORDER BY f.apellido COLLATE NOCASE, f.nombre COLLATE NOCASE, f.id",
        qualified(FAMILIAR_COLUMNS, "f")
    ))
    .bind(id.to_string())
    .fetch_all(pool)
    .await
    .map_err(backend_error("list familiares of alumno"))?;

    rows.iter().map(Familiar::from_row).collect()
}

/// Insert a student and its familiar links in one transaction
pub async fn create_alumno(pool: &SqlitePool, input: NewAlumno) -> Result<AlumnoDetail> {
    let data = input.data.validated()?;
    let id = uuid_utils::generate();
    let now = time::now_rfc3339();

    let mut tx = pool.begin().await.map_err(backend_error("begin create alumno"))?;

    sqlx::query(
        "INSERT INTO alumno (id, nombre, apellido, documento, fecha_nacimiento, genero, direccion,
                             telefono, fecha_ingreso, motivo_ingreso, estado, id_grado,
                             id_familiar, created_at, updated_at)
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(id.to_string())
    .bind(&data.nombre)
    .bind(&data.apellido)
    .bind(&data.documento)
    .bind(data.fecha_nacimiento)
    .bind(&data.genero)
    .bind(&data.direccion)
    .bind(&data.telefono)
    .bind(data.fecha_ingreso)
    .bind(&data.motivo_ingreso)
    .bind(&data.estado)
    .bind(&data.id_grado)
    .bind(&data.id_familiar)
    .bind(&now)
    .bind(&now)
    .execute(&mut *tx)
    .await
    .map_err(backend_error("insert alumno"))
    .map_err(|e| unknown_reference(e, "grado or familiar"))?;

    let linked = link_familiares(&mut tx, id, &input.familiares_ids).await?;

    tx.commit().await.map_err(backend_error("commit create alumno"))?;
    info!("Created alumno {} linked to {} familiar(es)", id, linked);

    get_alumno(pool, id)
        .await?
        .ok_or_else(|| Error::Internal(format!("Alumno {} vanished after insert", id)))
}

/// Update a student; replaces its familiar links when `familiares_ids` is present
pub async fn update_alumno(pool: &SqlitePool, id: Uuid, input: AlumnoUpdate) -> Result<AlumnoDetail> {
    let data = input.data.validated()?;
    let mut tx = pool.begin().await.map_err(backend_error("begin update alumno"))?;

    let result = sqlx::query(
        "UPDATE alumno
         SET nombre = ?, apellido = ?, documento = ?, fecha_nacimiento = ?, genero = ?,
             direccion = ?, telefono = ?, fecha_ingreso = ?, motivo_ingreso = ?, estado = ?,
             id_grado = ?, id_familiar = ?, updated_at = ?
         WHERE id = ?",
    )
    .bind(&data.nombre)
    .bind(&data.apellido)
    .bind(&data.documento)
    .bind(data.fecha_nacimiento)
    .bind(&data.genero)
    .bind(&data.direccion)
    .bind(&data.telefono)
    .bind(data.fecha_ingreso)
    .bind(&data.motivo_ingreso)
    .bind(&data.estado)
    .bind(&data.id_grado)
    .bind(&data.id_familiar)
    .bind(time::now_rfc3339())
    .bind(id.to_string())
    .execute(&mut *tx)
    .await
    .map_err(backend_error("update alumno"))
    .map_err(|e| unknown_reference(e, "grado or familiar"))?;

    if result.rows_affected() == 0 {
        return Err(Error::NotFound(format!("Alumno {}", id)));
    }

    if let Some(ids) = &input.familiares_ids {
        sqlx::query("DELETE FROM alumnoxfamiliar WHERE id_alumno = ?")
            .bind(id.to_string())
            .execute(&mut *tx)
            .await
            .map_err(backend_error("clear associations of alumno"))?;
        link_familiares(&mut tx, id, ids).await?;
    }

    tx.commit().await.map_err(backend_error("commit update alumno"))?;
    info!("Updated alumno {}", id);

    get_alumno(pool, id)
        .await?
        .ok_or_else(|| Error::NotFound(format!("Alumno {}", id)))
}

/// Delete a student and its familiar links
pub async fn delete_alumno(pool: &SqlitePool, id: Uuid) -> Result<()> {
    let id_text = id.to_string();
    let mut tx = pool.begin().await.map_err(backend_error("begin delete alumno"))?;

    sqlx::query("DELETE FROM alumnoxfamiliar WHERE id_alumno = ?")
        .bind(&id_text)
        .execute(&mut *tx)
        .await
        .map_err(backend_error("delete associations of alumno"))?;

    let deleted = sqlx::query("DELETE FROM alumno WHERE id = ?")
        .bind(&id_text)
        .execute(&mut *tx)
        .await
        .map_err(backend_error("delete alumno"))?;

    if deleted.rows_affected() == 0 {
        return Err(Error::NotFound(format!("Alumno {}", id)));
    }

    tx.commit().await.map_err(backend_error("commit delete alumno"))?;
    info!("Deleted alumno {}", id);
    Ok(())
}

/// Link familiares to a student, skipping pairs that already exist
pub async fn add_familiares_to_alumno(
    pool: &SqlitePool,
    id: Uuid,
    familiares_ids: &[Uuid],
) -> Result<Vec<Familiar>> {
    if !alumno_exists(pool, id).await? {
        return Err(Error::NotFound(format!("Alumno {}", id)));
    }

    let mut tx = pool.begin().await.map_err(backend_error("begin link familiares"))?;
    let linked = link_familiares(&mut tx, id, familiares_ids).await?;
    tx.commit().await.map_err(backend_error("commit link familiares"))?;
    debug!("Linked {} new familiar(es) to alumno {}", linked, id);

    alumno_familiares(pool, id).await
}

/// Unlink familiares from a student
///
/// With `None` every link of the student goes; otherwise only the listed
/// familiares. Returns the number of links removed.
pub async fn remove_familiares_from_alumno(
    pool: &SqlitePool,
    id: Uuid,
    familiares_ids: Option<&[Uuid]>,
) -> Result<u64> {
    let mut qb = QueryBuilder::<Sqlite>::new("DELETE FROM alumnoxfamiliar WHERE id_alumno = ");
    qb.push_bind(id.to_string());

    if let Some(ids) = familiares_ids {
        if ids.is_empty() {
            return Ok(0);
        }
        qb.push(" AND id_familiar IN (");
        let mut separated = qb.separated(", ");
        for familiar in ids {
            separated.push_bind(familiar.to_string());
        }
        separated.push_unseparated(")");
    }

    let result = qb
        .build()
        .execute(pool)
        .await
        .map_err(backend_error("remove associations of alumno"))?;

    debug!("Removed {} association(s) of alumno {}", result.rows_affected(), id);
    Ok(result.rows_affected())
}

/// Insert one join row per id; returns how many were new
async fn link_familiares(
    conn: &mut SqliteConnection,
    id_alumno: Uuid,
    familiares_ids: &[Uuid],
) -> Result<u64> {
    let now = time::now_rfc3339();
    let mut inserted = 0;

    for id_familiar in familiares_ids {
        let result = sqlx::query(
            "INSERT OR IGNORE INTO alumnoxfamiliar (id_alumno, id_familiar, created_at)
             VALUES (?, ?, ?)",
        )
        .bind(id_alumno.to_string())
        .bind(id_familiar.to_string())
        .bind(&now)
        .execute(&mut *conn)
        .await
        .map_err(backend_error("insert association"))
        .map_err(|e| unknown_reference(e, &format!("familiar {}", id_familiar)))?;

        inserted += result.rows_affected();
    }

    Ok(inserted)
}

fn unknown_reference(err: Error, target: &str) -> Error {
    if err.is_foreign_key_violation() {
        Error::InvalidInput(format!("Unknown {}: {}", target, err))
    } else {
        err
    }
}
