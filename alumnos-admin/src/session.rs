//! Session context
//!
//! Owns user accounts and bearer-token sessions. Every change to a session
//! (sign in, refresh, sign out, expiry) is broadcast on the context's
//! [`EventBus`], which is how the SSE endpoint learns about them.

use alumnos_common::api::auth::{
    generate_session_token, hash_password, validate_credentials, verify_password,
};
use alumnos_common::api::types::SessionResponse;
use alumnos_common::db::User;
use alumnos_common::events::{EventBus, SessionEvent};
use alumnos_common::uuid_utils::{self, parse_column};
use alumnos_common::{time, Error, Result};
use chrono::{DateTime, Utc};
use sqlx::{Row, SqlitePool};
use tokio::sync::broadcast;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Event channel capacity
const EVENT_CAPACITY: usize = 64;

/// An authenticated user and its bearer token
#[derive(Debug, Clone)]
pub struct Session {
    pub token: String,
    pub user: User,
    pub expires_at: DateTime<Utc>,
}

impl Session {
    pub fn user_id(&self) -> Uuid {
        self.user.id
    }

    pub fn to_response(&self) -> SessionResponse {
        SessionResponse {
            access_token: self.token.clone(),
            user_id: self.user.id,
            email: self.user.email.clone(),
            expires_at: self.expires_at,
        }
    }
}

/// Session store plus change notifications
#[derive(Debug, Clone)]
pub struct SessionContext {
    db: SqlitePool,
    ttl: chrono::Duration,
    events: EventBus,
}

impl SessionContext {
    pub fn new(db: SqlitePool, ttl: std::time::Duration) -> Result<Self> {
        let ttl = chrono::Duration::from_std(ttl)
            .map_err(|e| Error::Config(format!("Session lifetime out of range: {}", e)))?;
        Ok(Self {
            db,
            ttl,
            events: EventBus::new(EVENT_CAPACITY),
        })
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    /// Register a new account and open its first session
    pub async fn sign_up(&self, email: &str, password: &str) -> Result<Session> {
        validate_credentials(email, password).map_err(|e| Error::InvalidInput(e.to_string()))?;

        let email = email.trim().to_string();
        let password_hash =
            hash_password(password).map_err(|e| Error::Internal(e.to_string()))?;
        let user = User {
            id: uuid_utils::generate(),
            email: email.clone(),
            created_at: time::now_rfc3339(),
        };

        sqlx::query(
            "INSERT INTO users (id, email, password_hash, created_at)
             VALUES (?, ?, ?, ?)",
        )
        .bind(user.id.to_string())
        .bind(&user.email)
        .bind(&password_hash)
        .bind(&user.created_at)
        .execute(&self.db)
        .await
        .map_err(Error::from)
        .map_err(|e| {
            if e.is_unique_violation() {
                Error::Conflict(format!("An account for {} already exists", email))
            } else {
                e
            }
        })?;

        info!("Registered user {} ({})", user.email, user.id);
        self.open_session(user).await
    }

    /// Check credentials and open a session
    pub async fn sign_in(&self, email: &str, password: &str) -> Result<Session> {
        let row = sqlx::query(
            "SELECT id, email, password_hash, created_at
             FROM users WHERE email = ?",
        )
        .bind(email.trim())
        .fetch_optional(&self.db)
        .await?;

        let Some(row) = row else {
            warn!("Sign in refused: unknown email {}", email.trim());
            return Err(invalid_credentials());
        };

        let hash: String = row.try_get("password_hash")?;
        if !verify_password(password, &hash) {
            warn!("Sign in refused: wrong password for {}", email.trim());
            return Err(invalid_credentials());
        }

        self.open_session(User::from_row(&row)?).await
    }

    /// Resolve a bearer token
    ///
    /// Returns `None` for unknown tokens. An expired token is deleted, a
    /// `SessionExpired` event is emitted and `None` is returned.
    pub async fn get_session(&self, token: &str) -> Result<Option<Session>> {
        let row = sqlx::query(
            "SELECT s.expires_at, u.id, u.email, u.created_at
             FROM sessions s JOIN users u ON u.id = s.user_id
             WHERE s.token = ?",
        )
        .bind(token)
        .fetch_optional(&self.db)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };

        let user = User::from_row(&row)?;
        let expires_at = from_unix(row.try_get("expires_at")?)?;

        if expires_at <= time::now() {
            sqlx::query("DELETE FROM sessions WHERE token = ?")
                .bind(token)
                .execute(&self.db)
                .await?;
            debug!("Session of {} expired", user.email);
            self.events.emit_lossy(SessionEvent::SessionExpired {
                user_id: user.id,
                timestamp: time::now(),
            });
            return Ok(None);
        }

        Ok(Some(Session {
            token: token.to_string(),
            user,
            expires_at,
        }))
    }

    /// Replace a live session with a fresh token and expiry
    pub async fn refresh(&self, token: &str) -> Result<Session> {
        let current = self
            .get_session(token)
            .await?
            .ok_or_else(|| Error::Unauthorized("Session expired or invalid".to_string()))?;

        let new_token = generate_session_token();
        let now = time::now();
        let expires_at = now + self.ttl;

        let mut tx = self.db.begin().await?;
        sqlx::query("DELETE FROM sessions WHERE token = ?")
            .bind(token)
            .execute(&mut *tx)
            .await?;
        sqlx::query(
            "INSERT INTO sessions (token, user_id, created_at, expires_at) VALUES (?, ?, ?, ?)",
        )
        .bind(&new_token)
        .bind(current.user.id.to_string())
        .bind(now.to_rfc3339())
        .bind(expires_at.timestamp())
        .execute(&mut *tx)
        .await?;
        tx.commit().await?;

        debug!("Refreshed session of {}", current.user.email);
        self.events.emit_lossy(SessionEvent::TokenRefreshed {
            user_id: current.user.id,
            expires_at,
            timestamp: now,
        });

        Ok(Session {
            token: new_token,
            user: current.user,
            expires_at,
        })
    }

    /// End a session; returns false when the token was unknown
    pub async fn sign_out(&self, token: &str) -> Result<bool> {
        let user_id: Option<String> =
            sqlx::query_scalar("DELETE FROM sessions WHERE token = ? RETURNING user_id")
                .bind(token)
                .fetch_optional(&self.db)
                .await?;

        let Some(user_id) = user_id else {
            return Ok(false);
        };

        let user_id = parse_column("user_id", &user_id)?;
        info!("User {} signed out", user_id);
        self.events.emit_lossy(SessionEvent::SignedOut {
            user_id,
            timestamp: time::now(),
        });
        Ok(true)
    }

    /// Delete every expired session, emitting `SessionExpired` for each
    pub async fn purge_expired(&self) -> Result<u64> {
        let expired: Vec<String> = sqlx::query_scalar(
            "DELETE FROM sessions WHERE expires_at <= ? RETURNING user_id",
        )
        .bind(time::now().timestamp())
        .fetch_all(&self.db)
        .await?;

        let now = time::now();
        for user_id in &expired {
            let user_id = parse_column("user_id", user_id)?;
            self.events.emit_lossy(SessionEvent::SessionExpired {
                user_id,
                timestamp: now,
            });
        }

        if !expired.is_empty() {
            info!("Purged {} expired session(s)", expired.len());
        }
        Ok(expired.len() as u64)
    }

    async fn open_session(&self, user: User) -> Result<Session> {
        let token = generate_session_token();
        let now = time::now();
        let expires_at = now + self.ttl;

        sqlx::query(
            "INSERT INTO sessions (token, user_id, created_at, expires_at) VALUES (?, ?, ?, ?)",
        )
        .bind(&token)
        .bind(user.id.to_string())
        .bind(now.to_rfc3339())
        .bind(expires_at.timestamp())
        .execute(&self.db)
        .await?;

        info!("User {} signed in", user.email);
        self.events.emit_lossy(SessionEvent::SignedIn {
            user_id: user.id,
            email: user.email.clone(),
            expires_at,
            timestamp: now,
        });

        Ok(Session {
            token,
            user,
            expires_at,
        })
    }
}

fn invalid_credentials() -> Error {
    Error::Unauthorized("Invalid email or password".to_string())
}

fn from_unix(secs: i64) -> Result<DateTime<Utc>> {
    DateTime::from_timestamp(secs, 0)
        .ok_or_else(|| Error::Internal(format!("Session expiry out of range: {}", secs)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use alumnos_common::db::init_memory_database;
    use std::time::Duration;

    async fn context() -> SessionContext {
        let pool = init_memory_database().await.unwrap();
        SessionContext::new(pool, Duration::from_secs(3600)).unwrap()
    }

    #[tokio::test]
    async fn test_sign_up_then_sign_in() {
        let ctx = context().await;
        let first = ctx.sign_up("admin@example.org", "s3cret-pass").await.unwrap();

        let second = ctx.sign_in("ADMIN@example.org", "s3cret-pass").await.unwrap();

        assert_eq!(first.user.id, second.user.id);
        assert_ne!(first.token, second.token);
        let resolved = ctx.get_session(&second.token).await.unwrap().unwrap();
        assert_eq!(resolved.user.email, "admin@example.org");
    }

    #[tokio::test]
    async fn test_duplicate_sign_up_is_conflict() {
        let ctx = context().await;
        ctx.sign_up("admin@example.org", "s3cret-pass").await.unwrap();

        let err = ctx.sign_up("admin@example.org", "other-pass").await.unwrap_err();

        assert!(matches!(err, Error::Conflict(_)));
    }

    #[tokio::test]
    async fn test_weak_password_rejected() {
        let ctx = context().await;
        let err = ctx.sign_up("admin@example.org", "short").await.unwrap_err();
        assert!(matches!(err, Error::InvalidInput(_)));
    }

    #[tokio::test]
    async fn test_wrong_password_unauthorized() {
        let ctx = context().await;
        ctx.sign_up("admin@example.org", "s3cret-pass").await.unwrap();

        let wrong = ctx.sign_in("admin@example.org", "wrong-pass").await.unwrap_err();
        let unknown = ctx.sign_in("nobody@example.org", "s3cret-pass").await.unwrap_err();

        assert!(matches!(wrong, Error::Unauthorized(_)));
        assert!(matches!(unknown, Error::Unauthorized(_)));
    }

    #[tokio::test]
    async fn test_sign_out_revokes_token() {
        let ctx = context().await;
        let session = ctx.sign_up("admin@example.org", "s3cret-pass").await.unwrap();
        let mut rx = ctx.subscribe();

        assert!(ctx.sign_out(&session.token).await.unwrap());
        assert!(!ctx.sign_out(&session.token).await.unwrap());
        assert!(ctx.get_session(&session.token).await.unwrap().is_none());

        let event = rx.recv().await.unwrap();
        assert_eq!(event.event_type(), "SignedOut");
        assert_eq!(event.user_id(), session.user.id);
    }

    #[tokio::test]
    async fn test_refresh_rotates_token() {
        let ctx = context().await;
        let session = ctx.sign_up("admin@example.org", "s3cret-pass").await.unwrap();

        let refreshed = ctx.refresh(&session.token).await.unwrap();

        assert_ne!(refreshed.token, session.token);
        assert!(ctx.get_session(&session.token).await.unwrap().is_none());
        assert!(ctx.get_session(&refreshed.token).await.unwrap().is_some());
        assert!(matches!(
            ctx.refresh(&session.token).await.unwrap_err(),
            Error::Unauthorized(_)
        ));
    }

    #[tokio::test]
    async fn test_expired_session_is_removed() {
        let ctx = context().await;
        let session = ctx.sign_up("admin@example.org", "s3cret-pass").await.unwrap();
        sqlx::query("UPDATE sessions SET expires_at = 0")
            .execute(&ctx.db)
            .await
            .unwrap();
        let mut rx = ctx.subscribe();

        assert!(ctx.get_session(&session.token).await.unwrap().is_none());

        let event = rx.recv().await.unwrap();
        assert_eq!(event.event_type(), "SessionExpired");
    }

    #[tokio::test]
    async fn test_purge_expired() {
        let ctx = context().await;
        let old = ctx.sign_up("old@example.org", "s3cret-pass").await.unwrap();
        let live = ctx.sign_up("live@example.org", "s3cret-pass").await.unwrap();
        sqlx::query("UPDATE sessions SET expires_at = 0 WHERE token = ?")
            .bind(&old.token)
            .execute(&ctx.db)
            .await
            .unwrap();

        assert_eq!(ctx.purge_expired().await.unwrap(), 1);
        assert!(ctx.get_session(&live.token).await.unwrap().is_some());
        assert_eq!(ctx.purge_expired().await.unwrap(), 0);
    }
}
