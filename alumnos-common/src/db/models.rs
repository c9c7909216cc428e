//! Database models
//!
//! One struct per table. Ids are UUIDs stored as TEXT, dates as ISO-8601
//! TEXT, timestamps as RFC 3339 TEXT.

use crate::uuid_utils::{parse_column, parse_optional_column};
use crate::Result;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use sqlx::sqlite::SqliteRow;
use sqlx::Row;
use uuid::Uuid;

/// Column list matching [`Grado::from_row`]
pub const GRADO_COLUMNS: &str = "id, nombre, created_at";

/// Column list matching [`Familiar::from_row`]
pub const FAMILIAR_COLUMNS: &str = "id, nombre, apellido, documento, fecha_nacimiento, parentesco, \
     telefono, ocupacion, ingreso_mensual, created_at, updated_at";

/// Column list matching [`Gasto::from_row`]
pub const GASTO_COLUMNS: &str = "id, id_familiar, nombre, monto, created_at";

/// Column list matching [`Alumno::from_row`]
pub const ALUMNO_COLUMNS: &str = "id, nombre, apellido, documento, fecha_nacimiento, genero, \
     direccion, telefono, fecha_ingreso, motivo_ingreso, estado, id_grado, id_familiar, \
     created_at, updated_at";

/// Academic grade / level
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Grado {
    pub id: Uuid,
    pub nombre: String,
    pub created_at: String,
}

impl Grado {
    pub fn from_row(row: &SqliteRow) -> Result<Self> {
        Ok(Self {
            id: parse_column("id", &row.try_get::<String, _>("id")?)?,
            nombre: row.try_get("nombre")?,
            created_at: row.try_get("created_at")?,
        })
    }
}

/// Family member
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Familiar {
    pub id: Uuid,
    pub nombre: String,
    pub apellido: String,
    pub documento: Option<String>,
    pub fecha_nacimiento: Option<NaiveDate>,
    /// Relationship to the students it is linked to (madre, tío, ...)
    pub parentesco: Option<String>,
    pub telefono: Option<String>,
    pub ocupacion: Option<String>,
    pub ingreso_mensual: f64,
    pub created_at: String,
    pub updated_at: String,
}

impl Familiar {
    pub fn from_row(row: &SqliteRow) -> Result<Self> {
        Ok(Self {
            id: parse_column("id", &row.try_get::<String, _>("id")?)?,
            nombre: row.try_get("nombre")?,
            apellido: row.try_get("apellido")?,
            documento: row.try_get("documento")?,
            fecha_nacimiento: row.try_get("fecha_nacimiento")?,
            parentesco: row.try_get("parentesco")?,
            telefono: row.try_get("telefono")?,
            ocupacion: row.try_get("ocupacion")?,
            ingreso_mensual: row.try_get("ingreso_mensual")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }

    pub fn nombre_completo(&self) -> String {
        join_name(&self.nombre, &self.apellido)
    }
}

/// Named monthly expense owned by a family member
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Gasto {
    pub id: Uuid,
    pub id_familiar: Uuid,
    pub nombre: String,
    pub monto: f64,
    pub created_at: String,
}

impl Gasto {
    pub fn from_row(row: &SqliteRow) -> Result<Self> {
        Ok(Self {
            id: parse_column("id", &row.try_get::<String, _>("id")?)?,
            id_familiar: parse_column("id_familiar", &row.try_get::<String, _>("id_familiar")?)?,
            nombre: row.try_get("nombre")?,
            monto: row.try_get("monto")?,
            created_at: row.try_get("created_at")?,
        })
    }
}

/// Student
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Alumno {
    pub id: Uuid,
    pub nombre: String,
    pub apellido: String,
    pub documento: Option<String>,
    pub fecha_nacimiento: Option<NaiveDate>,
    pub genero: Option<String>,
    pub direccion: Option<String>,
    pub telefono: Option<String>,
    pub fecha_ingreso: Option<NaiveDate>,
    pub motivo_ingreso: Option<String>,
    /// Free-text enrollment status
    pub estado: String,
    pub id_grado: Option<Uuid>,
    /// Primary family member, if one was chosen
    pub id_familiar: Option<Uuid>,
    pub created_at: String,
    pub updated_at: String,
}

impl Alumno {
    pub fn from_row(row: &SqliteRow) -> Result<Self> {
        Ok(Self {
            id: parse_column("id", &row.try_get::<String, _>("id")?)?,
            nombre: row.try_get("nombre")?,
            apellido: row.try_get("apellido")?,
            documento: row.try_get("documento")?,
            fecha_nacimiento: row.try_get("fecha_nacimiento")?,
            genero: row.try_get("genero")?,
            direccion: row.try_get("direccion")?,
            telefono: row.try_get("telefono")?,
            fecha_ingreso: row.try_get("fecha_ingreso")?,
            motivo_ingreso: row.try_get("motivo_ingreso")?,
            estado: row.try_get("estado")?,
            id_grado: parse_optional_column("id_grado", row.try_get("id_grado")?)?,
            id_familiar: parse_optional_column("id_familiar", row.try_get("id_familiar")?)?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }

    pub fn nombre_completo(&self) -> String {
        join_name(&self.nombre, &self.apellido)
    }
}

/// Console user (credentials are never serialized)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub id: Uuid,
    pub email: String,
    pub created_at: String,
}

impl User {
    pub fn from_row(row: &SqliteRow) -> Result<Self> {
        Ok(Self {
            id: parse_column("id", &row.try_get::<String, _>("id")?)?,
            email: row.try_get("email")?,
            created_at: row.try_get("created_at")?,
        })
    }
}

fn join_name(nombre: &str, apellido: &str) -> String {
    if apellido.is_empty() {
        nombre.to_string()
    } else {
        format!("{} {}", nombre, apellido)
    }
}
