//! alumnos-admin - student and family records service
//!
//! Serves the JSON API over the records database. Configuration comes from
//! the command line, `ALUMNOS_*` environment variables, a TOML file and
//! built-in defaults, in that order.

use alumnos_admin::session::SessionContext;
use alumnos_admin::{build_router, AppState};
use alumnos_common::config::{AdminConfig, CliOverrides, ENV_CONFIG_FILE};
use alumnos_common::db::init_database;
use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;
use tokio::signal;
use tracing::{error, info, warn};

/// How often expired sessions are swept
const SESSION_SWEEP_INTERVAL: Duration = Duration::from_secs(300);

#[derive(Parser, Debug)]
#[command(name = "alumnos-admin")]
#[command(about = "Student and family records service", long_about = None)]
#[command(version)]
struct Args {
    /// TOML configuration file
    #[arg(short, long, env = ENV_CONFIG_FILE)]
    config: Option<PathBuf>,

    /// SQLite database file
    #[arg(short, long)]
    database: Option<PathBuf>,

    /// Address to bind
    #[arg(long)]
    host: Option<String>,

    /// Port to listen on
    #[arg(short, long)]
    port: Option<u16>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long)]
    log_level: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let cli = CliOverrides {
        config_file: args.config,
        database_path: args.database,
        host: args.host,
        port: args.port,
        log_level: args.log_level,
    };

    // Log level comes from the resolved configuration
    let config = AdminConfig::resolve(&cli);
    let log_level = match &config {
        Ok(c) => c.log_level.clone(),
        Err(_) => "info".to_string(),
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&log_level)),
        )
        .init();

    info!(
        "Starting alumnos-admin v{} [{}] built {} ({})",
        env!("CARGO_PKG_VERSION"),
        env!("GIT_HASH"),
        env!("BUILD_TIMESTAMP"),
        env!("BUILD_PROFILE")
    );

    let config = config.context("Failed to resolve configuration")?;
    config.log_source();
    info!("Database path: {}", config.database_path.display());

    let pool = match init_database(&config.database_path).await {
        Ok(pool) => {
            info!("✓ Database ready");
            pool
        }
        Err(e) => {
            error!("Failed to open database: {}", e);
            return Err(e.into());
        }
    };

    let sessions = SessionContext::new(pool.clone(), config.session_ttl)
        .context("Failed to create session context")?;
    let purged = sessions.purge_expired().await?;
    info!(
        "Session lifetime {}s ({} stale session(s) removed)",
        config.session_ttl.as_secs(),
        purged
    );
    spawn_session_sweeper(sessions.clone());

    let app = build_router(AppState::new(pool, sessions));

    let addr = config.bind_address();
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;
    info!("alumnos-admin listening on http://{}", addr);
    info!("Health check: http://{}/health", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    info!("Server shutdown complete");
    Ok(())
}

/// Periodically remove expired sessions so their owners get `SessionExpired`
fn spawn_session_sweeper(sessions: SessionContext) {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(SESSION_SWEEP_INTERVAL);
        ticker.tick().await;
        loop {
            ticker.tick().await;
            if let Err(e) = sessions.purge_expired().await {
                warn!("Session sweep failed: {}", e);
            }
        }
    });
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, shutting down");
        },
        _ = terminate => {
            info!("Received terminate signal, shutting down");
        },
    }
}
