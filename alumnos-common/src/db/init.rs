//! Database initialization
//!
//! Creates the database file and every table on first run. All statements
//! are idempotent, so opening an existing database is safe.
//!
//! The record tables carry foreign keys but no `ON DELETE CASCADE`:
//! dependents are removed explicitly, in order, by the services.

use crate::Result;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::SqlitePool;
use std::path::Path;
use std::str::FromStr;
use tracing::info;

/// Initialize database connection and create tables if needed
pub async fn init_database(db_path: &Path) -> Result<SqlitePool> {
    let newly_created = !db_path.exists();

    if let Some(parent) = db_path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }

    let options = SqliteConnectOptions::from_str(&format!("sqlite://{}", db_path.display()))?
        .create_if_missing(true)
        .foreign_keys(true)
        .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
        .busy_timeout(std::time::Duration::from_millis(5000));

    let pool = SqlitePoolOptions::new()
        .max_connections(10)
        .connect_with(options)
        .await?;

    if newly_created {
        info!("Initialized new database: {}", db_path.display());
    } else {
        info!("Opened existing database: {}", db_path.display());
    }

    create_schema(&pool).await?;
    crate::db::migrations::run_migrations(&pool).await?;

    Ok(pool)
}

/// Open a private in-memory database with the full schema
///
/// Limited to one connection: every pooled connection to `:memory:` would
/// otherwise see its own empty database.
pub async fn init_memory_database() -> Result<SqlitePool> {
    let options = SqliteConnectOptions::from_str("sqlite::memory:")?.foreign_keys(true);

    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .idle_timeout(None)
        .max_lifetime(None)
        .connect_with(options)
        .await?;

    create_schema(&pool).await?;
    crate::db::migrations::run_migrations(&pool).await?;

    Ok(pool)
}

/// Create every table (idempotent)
pub async fn create_schema(pool: &SqlitePool) -> Result<()> {
    create_schema_version_table(pool).await?;
    create_users_table(pool).await?;
    create_sessions_table(pool).await?;

    create_grado_table(pool).await?;
    create_familiar_table(pool).await?;
    create_gasto_table(pool).await?;
    create_alumno_table(pool).await?;

    // Linking table
    create_alumnoxfamiliar_table(pool).await?;

    Ok(())
}

async fn create_schema_version_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS schema_version (
            version INTEGER PRIMARY KEY,
            applied_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

async fn create_users_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS users (
            id TEXT PRIMARY KEY,
            email TEXT NOT NULL UNIQUE COLLATE NOCASE,
            password_hash TEXT NOT NULL,
            created_at TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

/// Sessions expire at `expires_at` (Unix seconds)
async fn create_sessions_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS sessions (
            token TEXT PRIMARY KEY,
            user_id TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
            created_at TEXT NOT NULL,
            expires_at INTEGER NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

async fn create_grado_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS grado (
            id TEXT PRIMARY KEY,
            nombre TEXT NOT NULL UNIQUE COLLATE NOCASE,
            created_at TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

async fn create_familiar_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS familiar (
            id TEXT PRIMARY KEY,
            nombre TEXT NOT NULL,
            apellido TEXT NOT NULL DEFAULT '',
            documento TEXT,
            fecha_nacimiento TEXT,
            parentesco TEXT,
            telefono TEXT,
            ocupacion TEXT,
            ingreso_mensual REAL NOT NULL DEFAULT 0.0,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

async fn create_gasto_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS gasto (
            id TEXT PRIMARY KEY,
            id_familiar TEXT NOT NULL REFERENCES familiar(id),
            nombre TEXT NOT NULL,
            monto REAL NOT NULL,
            created_at TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

/// `id_grado` is RESTRICT so a referenced grade can never disappear
async fn create_alumno_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS alumno (
            id TEXT PRIMARY KEY,
            nombre TEXT NOT NULL,
            apellido TEXT NOT NULL DEFAULT '',
            documento TEXT,
            fecha_nacimiento TEXT,
            genero TEXT,
            direccion TEXT,
            telefono TEXT,
            fecha_ingreso TEXT,
            motivo_ingreso TEXT,
            estado TEXT NOT NULL DEFAULT 'activo',
            id_grado TEXT REFERENCES grado(id) ON DELETE RESTRICT,
            id_familiar TEXT REFERENCES familiar(id),
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

async fn create_alumnoxfamiliar_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS alumnoxfamiliar (
            id_alumno TEXT NOT NULL REFERENCES alumno(id),
            id_familiar TEXT NOT NULL REFERENCES familiar(id),
            created_at TEXT NOT NULL,
            PRIMARY KEY (id_alumno, id_familiar)
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}
