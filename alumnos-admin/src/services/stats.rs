//! Dashboard aggregates

use super::backend_error;
use alumnos_common::uuid_utils::parse_optional_column;
use alumnos_common::{time, Result};
use chrono::NaiveDate;
use serde::Serialize;
use sqlx::{Row, SqlitePool};
use uuid::Uuid;

#[derive(Debug, Clone, Serialize)]
pub struct EstadoCount {
    pub estado: String,
    pub count: i64,
}

/// Students per grade; `id_grado: None` counts students without a grade
#[derive(Debug, Clone, Serialize)]
pub struct GradoCount {
    pub id_grado: Option<Uuid>,
    pub grado: Option<String>,
    pub count: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct DashboardStats {
    pub total_alumnos: i64,
    pub total_familiares: i64,
    pub total_grados: i64,
    pub alumnos_por_estado: Vec<EstadoCount>,
    pub alumnos_por_grado: Vec<GradoCount>,
    /// Mean `ingreso_mensual` over all familiares
    pub promedio_ingreso_familiar: f64,
    /// Mean of each familiar's expense total (familiares without gastos count as 0)
    pub promedio_gastos_familiar: f64,
    /// Mean age of students with a known birth date
    pub edad_promedio: Option<f64>,
}

pub async fn dashboard_stats(pool: &SqlitePool) -> Result<DashboardStats> {
    let totals = sqlx::query(
        "SELECT (SELECT COUNT(*) FROM alumno) AS alumnos,
                (SELECT COUNT(*) FROM familiar) AS familiares,
                (SELECT COUNT(*) FROM grado) AS grados,
                (SELECT COALESCE(AVG(ingreso_mensual), 0.0) FROM familiar) AS ingreso,
                (SELECT COALESCE(AVG(total), 0.0) FROM (
                    SELECT (SELECT COALESCE(SUM(g.monto), 0.0) FROM gasto g
                            WHERE g.id_familiar = f.id) AS total
                    FROM familiar f
                )) AS gastos",
    )
    .fetch_one(pool)
    .await
    .map_err(backend_error("dashboard totals"))?;

    let alumnos_por_estado = sqlx::query(
        "SELECT estado, COUNT(*) AS count FROM alumno
         GROUP BY estado COLLATE NOCASE
         ORDER BY count DESC, estado",
    )
    .fetch_all(pool)
    .await
    .map_err(backend_error("alumnos per estado"))?
    .iter()
    .map(|row| -> Result<EstadoCount> {
        Ok(EstadoCount {
            estado: row.try_get("estado")?,
            count: row.try_get("count")?,
        })
    })
    .collect::<Result<Vec<_>>>()?;

    let alumnos_por_grado = sqlx::query(
        "SELECT a.id_grado, g.nombre, COUNT(*) AS count
         FROM alumno a
         LEFT JOIN grado g ON g.id = a.id_grado
         GROUP BY a.id_grado
         ORDER BY g.nombre IS NULL, g.nombre COLLATE NOCASE",
    )
    .fetch_all(pool)
    .await
    .map_err(backend_error("alumnos per grado"))?
    .iter()
    .map(|row| -> Result<GradoCount> {
        Ok(GradoCount {
            id_grado: parse_optional_column("id_grado", row.try_get("id_grado")?)?,
            grado: row.try_get("nombre")?,
            count: row.try_get("count")?,
        })
    })
    .collect::<Result<Vec<_>>>()?;

    let births: Vec<NaiveDate> =
        sqlx::query_scalar("SELECT fecha_nacimiento FROM alumno WHERE fecha_nacimiento IS NOT NULL")
            .fetch_all(pool)
            .await
            .map_err(backend_error("alumno birth dates"))?;

    Ok(DashboardStats {
        total_alumnos: totals.try_get("alumnos")?,
        total_familiares: totals.try_get("familiares")?,
        total_grados: totals.try_get("grados")?,
        alumnos_por_estado,
        alumnos_por_grado,
        promedio_ingreso_familiar: totals.try_get("ingreso")?,
        promedio_gastos_familiar: totals.try_get("gastos")?,
        edad_promedio: average_age(&births, time::today()),
    })
}

fn average_age(births: &[NaiveDate], on: NaiveDate) -> Option<f64> {
    let ages: Vec<u32> = births.iter().filter_map(|b| time::age_on(*b, on)).collect();
    if ages.is_empty() {
        return None;
    }
    Some(ages.iter().map(|a| f64::from(*a)).sum::<f64>() / ages.len() as f64)
}
