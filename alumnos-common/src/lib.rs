//! # Alumnos Common Library
//!
//! Shared code for the Alumnos record-keeping service:
//! - Database schema, models and connection setup
//! - Password hashing and session token helpers
//! - Session-change events and SSE streaming
//! - Configuration loading
//! - Utility functions

pub mod api;
pub mod config;
pub mod db;
pub mod error;
pub mod events;
pub mod sse;
pub mod time;
pub mod uuid_utils;

pub use error::{Error, Result};
