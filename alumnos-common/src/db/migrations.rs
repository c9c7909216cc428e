//! Database schema migrations
//!
//! Versioned, idempotent migrations tracked in the `schema_version` table.
//! Tables themselves are created with `CREATE TABLE IF NOT EXISTS` in
//! [`crate::db::init`]; migrations carry everything that has to happen
//! exactly once on top of that.
//!
//! Never modify an existing migration; add a new one and bump
//! `CURRENT_SCHEMA_VERSION`.

use crate::Result;
use sqlx::SqlitePool;
use tracing::{info, warn};

/// Current schema version
const CURRENT_SCHEMA_VERSION: i32 = 2;

/// Get current schema version from database
///
/// Returns 0 if schema_version table doesn't exist or has no rows
pub async fn get_schema_version(pool: &SqlitePool) -> Result<i32> {
    let table_exists: bool = sqlx::query_scalar(
        r#"
        SELECT EXISTS(
            SELECT 1 FROM sqlite_master
            WHERE type='table' AND name='schema_version'
        )
        "#,
    )
    .fetch_one(pool)
    .await?;

    if !table_exists {
        return Ok(0);
    }

    let version: Option<i32> =
        sqlx::query_scalar("SELECT version FROM schema_version ORDER BY version DESC LIMIT 1")
            .fetch_optional(pool)
            .await?;

    Ok(version.unwrap_or(0))
}

async fn set_schema_version(pool: &SqlitePool, version: i32) -> Result<()> {
    sqlx::query("INSERT INTO schema_version (version) VALUES (?)")
        .bind(version)
        .execute(pool)
        .await?;

    Ok(())
}

/// Run all pending migrations
pub async fn run_migrations(pool: &SqlitePool) -> Result<()> {
    let current_version = get_schema_version(pool).await?;

    if current_version == CURRENT_SCHEMA_VERSION {
        info!("Database schema is up to date (v{})", current_version);
        return Ok(());
    }

    if current_version > CURRENT_SCHEMA_VERSION {
        warn!(
            "Database schema version ({}) is newer than code version ({})",
            current_version, CURRENT_SCHEMA_VERSION
        );
        return Ok(());
    }

    info!(
        "Running database migrations: v{} -> v{}",
        current_version, CURRENT_SCHEMA_VERSION
    );

    if current_version < 1 {
        migrate_v1(pool).await?;
        set_schema_version(pool, 1).await?;
        info!("Migration v1 completed");
    }

    if current_version < 2 {
        migrate_v2(pool).await?;
        set_schema_version(pool, 2).await?;
        info!("Migration v2 completed");
    }

    Ok(())
}

/// v1: lookup indexes for the association and expense tables
async fn migrate_v1(pool: &SqlitePool) -> Result<()> {
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_axf_familiar ON alumnoxfamiliar(id_familiar)")
        .execute(pool)
        .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_gasto_familiar ON gasto(id_familiar)")
        .execute(pool)
        .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_alumno_grado ON alumno(id_grado)")
        .execute(pool)
        .await?;
    Ok(())
}

/// v2: session expiry index used by the expired-session sweep
async fn migrate_v2(pool: &SqlitePool) -> Result<()> {
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_sessions_expires ON sessions(expires_at)")
        .execute(pool)
        .await?;
    Ok(())
}
