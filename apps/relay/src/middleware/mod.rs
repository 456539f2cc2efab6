//! Middleware components for the relay
//!
//! This module provides authentication extractors for Axum handlers:
//! - `AuthUser`: Requires a valid bearer token, returns 401 if missing/invalid

pub mod auth;

pub use auth::{extract_bearer_token, AuthRejection, AuthUser};
