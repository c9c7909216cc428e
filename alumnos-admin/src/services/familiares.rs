//! Family member (familiar) and expense (gasto) operations
//!
//! A familiar owns its gastos. Deleting a familiar removes, in one
//! transaction and in this order: its gastos, its student associations,
//! any student's primary-familiar reference to it, and finally the row.

use super::{
    backend_error, like_pattern, non_blank, qualified, require_amount, require_name, SortOrder,
    LIKE_ESCAPE,
};
use crate::pagination::{calculate_pagination, Page, PageRequest};
use alumnos_common::db::{Alumno, Familiar, Gasto, ALUMNO_COLUMNS, FAMILIAR_COLUMNS, GASTO_COLUMNS};
use alumnos_common::{time, uuid_utils, Error, Result};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use sqlx::{QueryBuilder, Row, Sqlite, SqliteConnection, SqlitePool};
use tracing::{debug, info};
use uuid::Uuid;

/// Editable familiar fields
#[derive(Debug, Clone, Default, Deserialize)]
pub struct FamiliarData {
    pub nombre: String,
    #[serde(default)]
    pub apellido: String,
    #[serde(default)]
    pub documento: Option<String>,
    #[serde(default)]
    pub fecha_nacimiento: Option<NaiveDate>,
    #[serde(default)]
    pub parentesco: Option<String>,
    #[serde(default)]
    pub telefono: Option<String>,
    #[serde(default)]
    pub ocupacion: Option<String>,
    #[serde(default)]
    pub ingreso_mensual: f64,
}

impl FamiliarData {
    fn validated(self) -> Result<Self> {
        Ok(Self {
            nombre: require_name("nombre", &self.nombre)?,
            apellido: self.apellido.trim().to_string(),
            documento: non_blank(self.documento),
            fecha_nacimiento: self.fecha_nacimiento,
            parentesco: non_blank(self.parentesco),
            telefono: non_blank(self.telefono),
            ocupacion: non_blank(self.ocupacion),
            ingreso_mensual: require_amount("ingreso_mensual", self.ingreso_mensual)?,
        })
    }
}

/// Expense payload
#[derive(Debug, Clone, Deserialize)]
pub struct GastoInput {
    pub nombre: String,
    pub monto: f64,
}

impl GastoInput {
    fn validated(self) -> Result<Self> {
        Ok(Self {
            nombre: require_name("gasto.nombre", &self.nombre)?,
            monto: require_amount("gasto.monto", self.monto)?,
        })
    }
}

/// Create payload: familiar plus its initial expenses
#[derive(Debug, Clone, Deserialize)]
pub struct NewFamiliar {
    #[serde(flatten)]
    pub data: FamiliarData,
    #[serde(default)]
    pub gastos: Vec<GastoInput>,
}

/// Update payload; `gastos: Some(..)` replaces the whole expense list
#[derive(Debug, Clone, Deserialize)]
pub struct FamiliarUpdate {
    #[serde(flatten)]
    pub data: FamiliarData,
    #[serde(default)]
    pub gastos: Option<Vec<GastoInput>>,
}

/// Sortable columns for familiar lists
#[derive(Debug, Clone, Copy, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FamiliarSort {
    #[default]
    Apellido,
    Nombre,
    IngresoMensual,
    CreatedAt,
}

impl FamiliarSort {
    fn column(self) -> &'static str {
        match self {
            FamiliarSort::Apellido => "f.apellido COLLATE NOCASE",
            FamiliarSort::Nombre => "f.nombre COLLATE NOCASE",
            FamiliarSort::IngresoMensual => "f.ingreso_mensual",
            FamiliarSort::CreatedAt => "f.created_at",
        }
    }
}

/// Familiar list filter
#[derive(Debug, Clone, Default, Deserialize)]
pub struct FamiliarFilter {
    /// Matches nombre, apellido or documento
    #[serde(default)]
    pub search: Option<String>,
    /// Only familiares linked to this student
    #[serde(default)]
    pub id_alumno: Option<Uuid>,
    #[serde(default)]
    pub sort: FamiliarSort,
    #[serde(default)]
    pub order: SortOrder,
}

/// List row with expense total and number of linked students
#[derive(Debug, Clone, Serialize)]
pub struct FamiliarListItem {
    #[serde(flatten)]
    pub familiar: Familiar,
    pub total_gastos: f64,
    pub alumnos_count: i64,
}

/// Student as seen from a familiar
#[derive(Debug, Clone, Serialize)]
pub struct AlumnoRef {
    pub id: Uuid,
    pub nombre_completo: String,
    pub estado: String,
}

/// Familiar with expenses, linked students and balance
#[derive(Debug, Clone, Serialize)]
pub struct FamiliarDetail {
    #[serde(flatten)]
    pub familiar: Familiar,
    pub gastos: Vec<Gasto>,
    pub alumnos: Vec<AlumnoRef>,
    pub total_gastos: f64,
    /// ingreso_mensual - total_gastos
    pub balance: f64,
}

/// Financial summary of one familiar
#[derive(Debug, Clone, Serialize)]
pub struct FamiliarResumen {
    pub id: Uuid,
    pub nombre_completo: String,
    pub ingreso_mensual: f64,
    pub gastos_count: i64,
    pub total_gastos: f64,
    pub balance: f64,
}

fn push_filters(qb: &mut QueryBuilder<'_, Sqlite>, filter: &FamiliarFilter) {
    qb.push(" WHERE 1 = 1");
    if let Some(pattern) = like_pattern(filter.search.as_deref()) {
        qb.push(" AND (f.nombre LIKE ")
            .push_bind(pattern.clone())
            .push(LIKE_ESCAPE)
            .push(" OR f.apellido LIKE ")
            .push_bind(pattern.clone())
            .push(LIKE_ESCAPE)
            .push(" OR f.documento LIKE ")
            .push_bind(pattern)
            .push(LIKE_ESCAPE)
            .push(")");
    }
    if let Some(id_alumno) = filter.id_alumno {
        qb.push(" AND f.id IN (SELECT id_familiar FROM alumnoxfamiliar WHERE id_alumno = ")
            .push_bind(id_alumno.to_string())
            .push(")");
    }
}

/// Filtered, sorted, paginated familiar list
pub async fn list_familiares(
    pool: &SqlitePool,
    filter: &FamiliarFilter,
    page: PageRequest,
) -> Result<Page<FamiliarListItem>> {
    let mut count = QueryBuilder::<Sqlite>::new("SELECT COUNT(*) FROM familiar f");
    push_filters(&mut count, filter);
    let total: i64 = count
        .build_query_scalar()
        .fetch_one(pool)
        .await
        .map_err(backend_error("count familiares"))?;

    let p = calculate_pagination(total, page.page, page.page_size);

    let mut select = QueryBuilder::<Sqlite>::new(format!(
        "SELECT {},
                (SELECT COALESCE(SUM(monto), 0.0) FROM gasto g WHERE g.id_familiar = f.id) AS total_gastos,
                (SELECT COUNT(*) FROM alumnoxfamiliar x WHERE x.id_familiar = f.id) AS alumnos_count
         FROM familiar f",
        qualified(FAMILIAR_COLUMNS, "f")
    ));
    push_filters(&mut select, filter);
    select
        .push(format!(
            " ORDER BY {} {}, f.id ASC LIMIT ",
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
        .map_err(backend_error("list familiares"))?;

    let items = rows
        .iter()
        .map(|row| -> Result<FamiliarListItem> {
            Ok(FamiliarListItem {
                familiar: Familiar::from_row(row)?,
                total_gastos: row.try_get("total_gastos")?,
                alumnos_count: row.try_get("alumnos_count")?,
            })
        })
        .collect::<Result<Vec<_>>>()?;

    Ok(Page::new(items, total, p))
}

/// Load a familiar row; `None` when the id does not exist
pub async fn get_familiar(pool: &SqlitePool, id: Uuid) -> Result<Option<Familiar>> {
    let row = sqlx::query(&format!("SELECT {} FROM familiar WHERE id = ?", FAMILIAR_COLUMNS))
        .bind(id.to_string())
        .fetch_optional(pool)
        .await
        .map_err(backend_error("get familiar"))?;

    row.as_ref().map(Familiar::from_row).transpose()
}

/// Familiar with gastos and linked students
pub async fn get_familiar_detail(pool: &SqlitePool, id: Uuid) -> Result<Option<FamiliarDetail>> {
    let Some(familiar) = get_familiar(pool, id).await? else {
        return Ok(None);
    };

    let gastos = list_gastos(pool, id).await?;

    let rows = sqlx::query(&format!(
        "SELECT {} FROM alumno a
         JOIN alumnoxfamiliar x ON x.id_alumno = a.id
         WHERE x.id_familiar = ?
         ORDER BY a.apellido COLLATE NOCASE, a.nombre COLLATE NOCASE",
        qualified(ALUMNO_COLUMNS, "a")
    ))
    .bind(id.to_string())
    .fetch_all(pool)
    .await
    .map_err(backend_error("list alumnos of familiar"))?;

    let alumnos = rows
        .iter()
        .map(|row| {
            Alumno::from_row(row).map(|a| AlumnoRef {
                id: a.id,
                nombre_completo: a.nombre_completo(),
                estado: a.estado,
            })
        })
        .collect::<Result<Vec<_>>>()?;

    let total_gastos: f64 = gastos.iter().map(|g| g.monto).sum();
    let balance = familiar.ingreso_mensual - total_gastos;

    Ok(Some(FamiliarDetail {
        familiar,
        gastos,
        alumnos,
        total_gastos,
        balance,
    }))
}

/// Expenses of one familiar, oldest first
pub async fn list_gastos(pool: &SqlitePool, id_familiar: Uuid) -> Result<Vec<Gasto>> {
    let rows = sqlx::query(&format!(
        "SELECT {} FROM gasto WHERE id_familiar = ? ORDER BY created_at, id",
        GASTO_COLUMNS
    ))
    .bind(id_familiar.to_string())
    .fetch_all(pool)
    .await
    .map_err(backend_error("list gastos"))?;

    rows.iter().map(Gasto::from_row).collect()
}

/// Insert a familiar and its initial gastos in one transaction
pub async fn create_familiar(pool: &SqlitePool, input: NewFamiliar) -> Result<FamiliarDetail> {
    let data = input.data.validated()?;
    let gastos = input
        .gastos
        .into_iter()
        .map(GastoInput::validated)
        .collect::<Result<Vec<_>>>()?;

    let id = uuid_utils::generate();
    let now = time::now_rfc3339();

    let mut tx = pool.begin().await.map_err(backend_error("begin create familiar"))?;

    sqlx::query(
        "INSERT INTO familiar (id, nombre, apellido, documento, fecha_nacimiento, parentesco,
                               telefono, ocupacion, ingreso_mensual, created_at, updated_at)
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(id.to_string())
    .bind(&data.nombre)
    .bind(&data.apellido)
    .bind(&data.documento)
    .bind(data.fecha_nacimiento)
    .bind(&data.parentesco)
    .bind(&data.telefono)
    .bind(&data.ocupacion)
    .bind(data.ingreso_mensual)
    .bind(&now)
    .bind(&now)
    .execute(&mut *tx)
    .await
    .map_err(backend_error("insert familiar"))?;

    for gasto in &gastos {
        insert_gasto(&mut tx, id, gasto).await?;
    }

    tx.commit().await.map_err(backend_error("commit create familiar"))?;
    info!("Created familiar {} with {} gasto(s)", id, gastos.len());

    get_familiar_detail(pool, id)
        .await?
        .ok_or_else(|| Error::Internal(format!("Familiar {} vanished after insert", id)))
}

/// Update a familiar; replaces its gastos when `gastos` is present
pub async fn update_familiar(
    pool: &SqlitePool,
    id: Uuid,
    input: FamiliarUpdate,
) -> Result<FamiliarDetail> {
    let data = input.data.validated()?;
    let gastos = input
        .gastos
        .map(|list| {
            list.into_iter()
                .map(GastoInput::validated)
                .collect::<Result<Vec<_>>>()
        })
        .transpose()?;

    let mut tx = pool.begin().await.map_err(backend_error("begin update familiar"))?;

    let result = sqlx::query(
        "UPDATE familiar
         SET nombre = ?, apellido = ?, documento = ?, fecha_nacimiento = ?, parentesco = ?,
             telefono = ?, ocupacion = ?, ingreso_mensual = ?, updated_at = ?
         WHERE id = ?",
    )
    .bind(&data.nombre)
    .bind(&data.apellido)
    .bind(&data.documento)
    .bind(data.fecha_nacimiento)
    .bind(&data.parentesco)
    .bind(&data.telefono)
    .bind(&data.ocupacion)
    .bind(data.ingreso_mensual)
    .bind(time::now_rfc3339())
    .bind(id.to_string())
    .execute(&mut *tx)
    .await
    .map_err(backend_error("update familiar"))?;

    if result.rows_affected() == 0 {
        return Err(Error::NotFound(format!("Familiar {}", id)));
    }

    if let Some(gastos) = &gastos {
        sqlx::query("DELETE FROM gasto WHERE id_familiar = ?")
            .bind(id.to_string())
            .execute(&mut *tx)
            .await
            .map_err(backend_error("clear gastos"))?;
        for gasto in gastos {
            insert_gasto(&mut tx, id, gasto).await?;
        }
    }

    tx.commit().await.map_err(backend_error("commit update familiar"))?;
    info!("Updated familiar {}", id);

    get_familiar_detail(pool, id)
        .await?
        .ok_or_else(|| Error::NotFound(format!("Familiar {}", id)))
}

/// Delete a familiar and everything that depends on it
pub async fn delete_familiar(pool: &SqlitePool, id: Uuid) -> Result<()> {
    let id_text = id.to_string();
    let mut tx = pool.begin().await.map_err(backend_error("begin delete familiar"))?;

    let gastos = sqlx::query("DELETE FROM gasto WHERE id_familiar = ?")
        .bind(&id_text)
        .execute(&mut *tx)
        .await
        .map_err(backend_error("delete gastos of familiar"))?;

    let links = sqlx::query("DELETE FROM alumnoxfamiliar WHERE id_familiar = ?")
        .bind(&id_text)
        .execute(&mut *tx)
        .await
        .map_err(backend_error("delete associations of familiar"))?;

    sqlx::query("UPDATE alumno SET id_familiar = NULL WHERE id_familiar = ?")
        .bind(&id_text)
        .execute(&mut *tx)
        .await
        .map_err(backend_error("clear primary familiar references"))?;

    let deleted = sqlx::query("DELETE FROM familiar WHERE id = ?")
        .bind(&id_text)
        .execute(&mut *tx)
        .await
        .map_err(backend_error("delete familiar"))?;

    if deleted.rows_affected() == 0 {
        // Dropping the transaction rolls back the dependent deletes
        return Err(Error::NotFound(format!("Familiar {}", id)));
    }

    tx.commit().await.map_err(backend_error("commit delete familiar"))?;
    info!(
        "Deleted familiar {} ({} gasto(s), {} association(s))",
        id,
        gastos.rows_affected(),
        links.rows_affected()
    );
    Ok(())
}

/// Add one expense to an existing familiar
pub async fn add_gasto(pool: &SqlitePool, id_familiar: Uuid, input: GastoInput) -> Result<Gasto> {
    let input = input.validated()?;
    if get_familiar(pool, id_familiar).await?.is_none() {
        return Err(Error::NotFound(format!("Familiar {}", id_familiar)));
    }

    let mut conn = pool.acquire().await.map_err(backend_error("acquire connection"))?;
    insert_gasto(&mut conn, id_familiar, &input).await
}

/// Remove one expense from a familiar
pub async fn delete_gasto(pool: &SqlitePool, id_familiar: Uuid, id_gasto: Uuid) -> Result<()> {
    let result = sqlx::query("DELETE FROM gasto WHERE id = ? AND id_familiar = ?")
        .bind(id_gasto.to_string())
        .bind(id_familiar.to_string())
        .execute(pool)
        .await
        .map_err(backend_error("delete gasto"))?;

    if result.rows_affected() == 0 {
        return Err(Error::NotFound(format!(
            "Gasto {} of familiar {}",
            id_gasto, id_familiar
        )));
    }
    debug!("Deleted gasto {} of familiar {}", id_gasto, id_familiar);
    Ok(())
}

/// Income, expense total and balance of one familiar
pub async fn familiar_summary(pool: &SqlitePool, id: Uuid) -> Result<Option<FamiliarResumen>> {
    let Some(familiar) = get_familiar(pool, id).await? else {
        return Ok(None);
    };

    let row = sqlx::query(
        "SELECT COUNT(*) AS gastos_count, COALESCE(SUM(monto), 0.0) AS total_gastos
         FROM gasto WHERE id_familiar = ?",
    )
    .bind(id.to_string())
    .fetch_one(pool)
    .await
    .map_err(backend_error("summarize gastos"))?;

    let total_gastos: f64 = row.try_get("total_gastos")?;

    Ok(Some(FamiliarResumen {
        id,
        nombre_completo: familiar.nombre_completo(),
        ingreso_mensual: familiar.ingreso_mensual,
        gastos_count: row.try_get("gastos_count")?,
        total_gastos,
        balance: familiar.ingreso_mensual - total_gastos,
    }))
}

async fn insert_gasto(
    conn: &mut SqliteConnection,
    id_familiar: Uuid,
    input: &GastoInput,
) -> Result<Gasto> {
    let gasto = Gasto {
        id: uuid_utils::generate(),
        id_familiar,
        nombre: input.nombre.clone(),
        monto: input.monto,
        created_at: time::now_rfc3339(),
    };

    sqlx::query(
        "INSERT INTO gasto (id, id_familiar, nombre, monto, created_at) VALUES (?, ?, ?, ?, ?)",
    )
    .bind(gasto.id.to_string())
    .bind(gasto.id_familiar.to_string())
    .bind(&gasto.nombre)
    .bind(gasto.monto)
    .bind(&gasto.created_at)
    .execute(&mut *conn)
    .await
    .map_err(backend_error("insert gasto"))?;

    Ok(gasto)
}
