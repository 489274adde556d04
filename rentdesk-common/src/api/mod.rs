//! Shared HTTP API functionality
//!
//! Pure functions and database operations only; the axum wrappers live in
//! `rentdesk-admin`.

pub mod auth;

pub use auth::{
    calculate_signature, initialize_shared_secret, load_shared_secret, validate_signature,
    validate_timestamp, ApiAuthError,
};
