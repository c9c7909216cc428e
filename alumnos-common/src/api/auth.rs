//! Password hashing and session token generation
//!
//! # Scheme
//!
//! - Passwords are stored as Argon2id PHC strings; the salt travels inside
//!   the string
//! - Session tokens are 32 random bytes, hex encoded (64 chars)
//!
//! # Pure Functions
//!
//! This module contains ONLY pure functions.
//! Storage lives in the admin service's session context.

use argon2::password_hash::{
    rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString,
};
use argon2::Argon2;
use rand::RngCore;

/// Minimum accepted password length
pub const MIN_PASSWORD_LEN: usize = 8;

// ========================================
// Error Types
// ========================================

/// Credential validation errors
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthError {
    /// Email missing or malformed
    InvalidEmail(String),

    /// Password shorter than [`MIN_PASSWORD_LEN`]
    WeakPassword,

    /// The password hasher itself failed
    Hashing(String),
}

impl std::fmt::Display for AuthError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AuthError::InvalidEmail(email) => write!(f, "Invalid email address: {}", email),
            AuthError::WeakPassword => write!(
                f,
                "Password must be at least {} characters",
                MIN_PASSWORD_LEN
            ),
            AuthError::Hashing(msg) => write!(f, "Password hashing failed: {}", msg),
        }
    }
}

impl std::error::Error for AuthError {}

// ========================================
// Credential Validation
// ========================================

/// Validate sign-up credentials
///
/// # Examples
///
/// ```
/// use alumnos_common::api::auth::validate_credentials;
///
/// assert!(validate_credentials("admin@example.org", "s3cret-pass").is_ok());
/// assert!(validate_credentials("not-an-email", "s3cret-pass").is_err());
/// assert!(validate_credentials("admin@example.org", "short").is_err());
/// ```
pub fn validate_credentials(email: &str, password: &str) -> Result<(), AuthError> {
    let email = email.trim();
    let valid_email = match email.split_once('@') {
        Some((local, domain)) => {
            !local.is_empty() && domain.contains('.') && !domain.starts_with('.') && !domain.ends_with('.')
        }
        None => false,
    };
    if !valid_email || email.chars().any(char::is_whitespace) {
        return Err(AuthError::InvalidEmail(email.to_string()));
    }

    if password.chars().count() < MIN_PASSWORD_LEN {
        return Err(AuthError::WeakPassword);
    }

    Ok(())
}

// ========================================
// Hashing
// ========================================

/// Generate a random session token (64 hex chars)
pub fn generate_session_token() -> String {
    random_hex(32)
}

/// Hash a password into a self-describing PHC string
///
/// # Examples
///
/// ```
/// use alumnos_common::api::auth::{hash_password, verify_password};
///
/// let hash = hash_password("correct horse").unwrap();
/// assert!(hash.starts_with("$argon2id$"));
/// assert!(verify_password("correct horse", &hash));
/// ```
pub fn hash_password(password: &str) -> Result<String, AuthError> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| AuthError::Hashing(e.to_string()))
}

/// Verify a password against a stored PHC string
///
/// A stored value that does not parse never verifies.
pub fn verify_password(password: &str, stored_hash: &str) -> bool {
    match PasswordHash::new(stored_hash) {
        Ok(parsed) => Argon2::default()
            .verify_password(password.as_bytes(), &parsed)
            .is_ok(),
        Err(_) => false,
    }
}

fn random_hex(len: usize) -> String {
    let mut bytes = vec![0u8; len];
    rand::thread_rng().fill_bytes(&mut bytes);
    bytes.iter().map(|b| format!("{:02x}", b)).collect()
}

// ========================================
// Tests
// ========================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_verify_password_roundtrip() {
        let hash = hash_password("hunter2-long").unwrap();
        assert!(verify_password("hunter2-long", &hash));
        assert!(!verify_password("hunter3-long", &hash));
    }

    #[test]
    fn test_each_hash_gets_its_own_salt() {
        let a = hash_password("same-password").unwrap();
        let b = hash_password("same-password").unwrap();
        assert_ne!(a, b);
        assert!(verify_password("same-password", &a));
        assert!(verify_password("same-password", &b));
    }

    #[test]
    fn test_unparseable_hash_never_verifies() {
        assert!(!verify_password("anything", ""));
        assert!(!verify_password("anything", "5e884898da28047151d0e56f8dc6292773603d0d"));
    }

    #[test]
    fn test_token_format() {
        let token = generate_session_token();
        assert_eq!(token.len(), 64);
        assert!(token.chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(token, generate_session_token());
    }

    #[test]
    fn test_invalid_emails() {
        for email in ["", "@example.org", "admin@", "admin@example", "ad min@example.org", "admin@.org"] {
            assert!(
                matches!(validate_credentials(email, "long-enough"), Err(AuthError::InvalidEmail(_))),
                "{} should be rejected",
                email
            );
        }
    }

    #[test]
    fn test_weak_password() {
        assert_eq!(
            validate_credentials("admin@example.org", "1234567"),
            Err(AuthError::WeakPassword)
        );
    }
}
