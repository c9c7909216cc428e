//! API module for shared authentication functionality
//!
//! # Design Principle
//!
//! This module contains ONLY:
//! - Pure functions (no HTTP framework dependencies)
//! - Shared request/response types
//!
//! The admin service wraps these with Axum handlers and middleware.

pub mod auth;
pub mod types;

pub use auth::{
    generate_session_token, hash_password, validate_credentials, verify_password, AuthError,
};
pub use types::{CredentialsRequest, SessionResponse};
