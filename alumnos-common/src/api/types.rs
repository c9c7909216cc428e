//! Shared API request/response types
//!
//! Types used for authentication requests and error responses.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ========================================
// Authentication Types
// ========================================

/// Email + password body for sign up and sign in
///
/// # Examples
///
/// ```
/// use alumnos_common::api::types::CredentialsRequest;
///
/// let request: CredentialsRequest =
///     serde_json::from_str(r#"{"email": "admin@example.org", "password": "s3cret-pass"}"#).unwrap();
/// assert_eq!(request.email, "admin@example.org");
/// ```
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CredentialsRequest {
    pub email: String,
    pub password: String,
}

/// Active session as returned to clients
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SessionResponse {
    /// Bearer token for the `Authorization` header
    pub access_token: String,
    pub user_id: Uuid,
    pub email: String,
    pub expires_at: DateTime<Utc>,
}

// ========================================
// Tests
// ========================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_response_serialization() {
        let response = SessionResponse {
            access_token: "abc123".to_string(),
            user_id: Uuid::nil(),
            email: "admin@example.org".to_string(),
            expires_at: DateTime::from_timestamp(1_730_000_000, 0).unwrap(),
        };

        let json = serde_json::to_string(&response).unwrap();
        assert!(json.contains("abc123"));
        assert!(json.contains("2024-10-27"));
    }
}
