//! Per-student report
//!
//! Personal, academic and household financial data in one document. The
//! household is the student plus every linked familiar.

use super::{alumnos, familiares};
use alumnos_common::db::{Alumno, Gasto, Grado};
use alumnos_common::{time, Result};
use serde::Serialize;
use sqlx::SqlitePool;
use std::fmt;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize)]
pub struct FamiliarFinanzas {
    pub id: Uuid,
    pub nombre_completo: String,
    pub parentesco: Option<String>,
    pub ocupacion: Option<String>,
    pub ingreso_mensual: f64,
    pub gastos: Vec<Gasto>,
    pub total_gastos: f64,
    pub balance: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct Hogar {
    /// Linked familiares plus the student
    pub integrantes: usize,
    pub ingreso_total: f64,
    pub gastos_total: f64,
    pub balance: f64,
    pub ingreso_per_capita: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct AlumnoReport {
    pub generado_en: String,
    pub alumno: Alumno,
    pub edad: Option<u32>,
    pub grado: Option<Grado>,
    pub familiares: Vec<FamiliarFinanzas>,
    pub hogar: Hogar,
}

/// Build the report; `None` when the student does not exist
pub async fn alumno_report(pool: &SqlitePool, id: Uuid) -> Result<Option<AlumnoReport>> {
    let Some(detail) = alumnos::get_alumno(pool, id).await? else {
        return Ok(None);
    };

    let mut finanzas = Vec::with_capacity(detail.familiares.len());
    for familiar in detail.familiares {
        let gastos = familiares::list_gastos(pool, familiar.id).await?;
        let total_gastos: f64 = gastos.iter().map(|g| g.monto).sum();
        finanzas.push(FamiliarFinanzas {
            id: familiar.id,
            nombre_completo: familiar.nombre_completo(),
            parentesco: familiar.parentesco,
            ocupacion: familiar.ocupacion,
            ingreso_mensual: familiar.ingreso_mensual,
            gastos,
            total_gastos,
            balance: familiar.ingreso_mensual - total_gastos,
        });
    }

    let hogar = household(&finanzas);

    Ok(Some(AlumnoReport {
        generado_en: time::now_rfc3339(),
        alumno: detail.alumno,
        edad: detail.edad,
        grado: detail.grado,
        familiares: finanzas,
        hogar,
    }))
}

fn household(familiares: &[FamiliarFinanzas]) -> Hogar {
    let integrantes = familiares.len() + 1;
    let ingreso_total: f64 = familiares.iter().map(|f| f.ingreso_mensual).sum();
    let gastos_total: f64 = familiares.iter().map(|f| f.total_gastos).sum();

    Hogar {
        integrantes,
        ingreso_total,
        gastos_total,
        balance: ingreso_total - gastos_total,
        ingreso_per_capita: ingreso_total / integrantes as f64,
    }
}

/// Plain-text rendering for printing
pub fn render_text(report: &AlumnoReport) -> String {
    report.to_string()
}

impl fmt::Display for AlumnoReport {
    fn fmt(&self, out: &mut fmt::Formatter<'_>) -> fmt::Result {
        write_report(out, self)
    }
}

fn write_report(out: &mut fmt::Formatter<'_>, report: &AlumnoReport) -> fmt::Result {
    let a = &report.alumno;
    let or_dash = |v: &Option<String>| v.clone().unwrap_or_else(|| "-".to_string());
    let date_or_dash = |v: Option<chrono::NaiveDate>| {
        v.map(|d| d.format("%d/%m/%Y").to_string())
            .unwrap_or_else(|| "-".to_string())
    };

    writeln!(out, "REPORTE DE ALUMNO")?;
    writeln!(out, "Generado: {}", report.generado_en)?;
    writeln!(out)?;
    writeln!(out, "DATOS PERSONALES")?;
    writeln!(out, "  Nombre: {}", a.nombre_completo())?;
    writeln!(out, "  Documento: {}", or_dash(&a.documento))?;
    writeln!(out, "  Fecha de nacimiento: {}", date_or_dash(a.fecha_nacimiento))?;
    if let Some(edad) = report.edad {
        writeln!(out, "  Edad: {}", edad)?;
    }
    writeln!(out, "  Genero: {}", or_dash(&a.genero))?;
    writeln!(out, "  Direccion: {}", or_dash(&a.direccion))?;
    writeln!(out, "  Telefono: {}", or_dash(&a.telefono))?;
    writeln!(out)?;
    writeln!(out, "DATOS ACADEMICOS")?;
    writeln!(
        out,
        "  Grado: {}",
        report.grado.as_ref().map(|g| g.nombre.as_str()).unwrap_or("-")
    )?;
    writeln!(out, "  Estado: {}", a.estado)?;
    writeln!(out, "  Fecha de ingreso: {}", date_or_dash(a.fecha_ingreso))?;
    writeln!(out, "  Motivo de ingreso: {}", or_dash(&a.motivo_ingreso))?;
    writeln!(out)?;
    writeln!(out, "GRUPO FAMILIAR")?;
    if report.familiares.is_empty() {
        writeln!(out, "  (sin familiares asociados)")?;
    }
    for f in &report.familiares {
        writeln!(
            out,
            "  {} ({}) - {}",
            f.nombre_completo,
            or_dash(&f.parentesco),
            or_dash(&f.ocupacion)
        )?;
        writeln!(out, "    Ingreso mensual: {:.2}", f.ingreso_mensual)?;
        for g in &f.gastos {
            writeln!(out, "    Gasto {}: {:.2}", g.nombre, g.monto)?;
        }
        writeln!(out, "    Balance: {:.2}", f.balance)?;
    }
    writeln!(out)?;
    let h = &report.hogar;
    writeln!(out, "RESUMEN DEL HOGAR")?;
    writeln!(out, "  Integrantes: {}", h.integrantes)?;
    writeln!(out, "  Ingreso total: {:.2}", h.ingreso_total)?;
    writeln!(out, "  Gastos totales: {:.2}", h.gastos_total)?;
    writeln!(out, "  Balance: {:.2}", h.balance)?;
    writeln!(out, "  Ingreso per capita: {:.2}", h.ingreso_per_capita)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::alumnos::{AlumnoData, NewAlumno};
    use crate::services::familiares::{FamiliarData, GastoInput, NewFamiliar};

    async fn familiar(pool: &SqlitePool, nombre: &str, ingreso: f64, gastos: Vec<GastoInput>) -> Uuid {
        familiares::create_familiar(
            pool,
            NewFamiliar {
                data: FamiliarData {
                    nombre: nombre.into(),
                    ingreso_mensual: ingreso,
                    ..FamiliarData::default()
                },
                gastos,
            },
        )
        .await
        .unwrap()
        .familiar
        .id
    }

    #[tokio::test]
    async fn test_household_totals() {
        let pool = alumnos_common::db::init_memory_database().await.unwrap();
        let maria = familiar(
            &pool,
            "Maria",
            5000.0,
            vec![GastoInput { nombre: "Alquiler".into(), monto: 1500.0 }],
        )
        .await;
        let jose = familiar(&pool, "Jose", 1000.0, vec![]).await;
        let id = alumnos::create_alumno(
            &pool,
            NewAlumno {
                data: AlumnoData {
                    nombre: "Juan".into(),
                    ..AlumnoData::default()
                },
                familiares_ids: vec![maria, jose],
            },
        )
        .await
        .unwrap()
        .alumno
        .id;

        let report = alumno_report(&pool, id).await.unwrap().unwrap();

        assert_eq!(report.familiares.len(), 2);
        assert_eq!(report.hogar.integrantes, 3);
        assert_eq!(report.hogar.ingreso_total, 6000.0);
        assert_eq!(report.hogar.gastos_total, 1500.0);
        assert_eq!(report.hogar.balance, 4500.0);
        assert_eq!(report.hogar.ingreso_per_capita, 2000.0);

        let text = render_text(&report);
        assert!(text.contains("Juan"));
        assert!(text.contains("Gasto Alquiler: 1500.00"));
        assert!(text.contains("Ingreso per capita: 2000.00"));
    }

    #[tokio::test]
    async fn test_missing_alumno() {
        let pool = alumnos_common::db::init_memory_database().await.unwrap();
        assert!(alumno_report(&pool, Uuid::new_v4()).await.unwrap().is_none());
    }

    #[test]
    fn test_household_without_familiares() {
        let hogar = household(&[]);
        assert_eq!(hogar.integrantes, 1);
        assert_eq!(hogar.ingreso_per_capita, 0.0);
    }
}
