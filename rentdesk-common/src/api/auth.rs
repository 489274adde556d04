//! Signed admin identity
//!
//! Identity itself is established by the hosted auth provider in front of
//! the dashboard. What reaches this service is the admin id plus a request
//! signature proving the caller holds the shared secret:
//!
//! - `x-admin-id`: admin row id
//! - `x-timestamp`: Unix epoch milliseconds
//! - `x-signature`: hex SHA-256 of
//!   `"{admin_id}\n{timestamp}\n{METHOD}\n{path}"` followed by the shared
//!   secret as a decimal string
//!
//! A shared secret of `0` disables signature checking; the admin id is still
//! required so the admin gate can resolve a role.
//!
//! # Pure Functions
//!
//! Only pure functions and database operations live here. The axum
//! middleware wrapping them is in the admin service.

use sha2::{Digest, Sha256};
use sqlx::SqlitePool;
use std::time::{SystemTime, UNIX_EPOCH};
use thiserror::Error;

pub const ADMIN_ID_HEADER: &str = "x-admin-id";
pub const TIMESTAMP_HEADER: &str = "x-timestamp";
pub const SIGNATURE_HEADER: &str = "x-signature";

/// Settings key holding the shared secret
pub const SHARED_SECRET_KEY: &str = "api_shared_secret";

/// Authentication error types
#[derive(Debug, Clone, Error, PartialEq)]
pub enum ApiAuthError {
    /// Timestamp outside acceptable window
    #[error("Invalid timestamp: {reason}")]
    InvalidTimestamp {
        timestamp: i64,
        now: i64,
        reason: String,
    },

    /// Signature does not match calculated value
    #[error("Invalid signature")]
    InvalidSignature { provided: String, calculated: String },

    /// Required header missing or unreadable
    #[error("Missing or malformed header: {0}")]
    MissingHeader(&'static str),

    /// Database error loading shared secret
    #[error("Database error: {0}")]
    DatabaseError(String),
}

// ========================================
// Shared Secret Management
// ========================================

/// Load shared secret from settings, generating one on first run
pub async fn load_shared_secret(db: &SqlitePool) -> Result<i64, ApiAuthError> {
    let result: Option<Option<String>> =
        sqlx::query_scalar("SELECT value FROM settings WHERE key = ?")
            .bind(SHARED_SECRET_KEY)
            .fetch_optional(db)
            .await
            .map_err(|e| ApiAuthError::DatabaseError(e.to_string()))?;

    match result.flatten() {
        Some(value) => value
            .trim()
            .parse::<i64>()
            .map_err(|e| ApiAuthError::DatabaseError(format!("Invalid i64: {}", e))),
        None => initialize_shared_secret(db).await,
    }
}

/// Generate and store a random non-zero secret
pub async fn initialize_shared_secret(db: &SqlitePool) -> Result<i64, ApiAuthError> {
    use rand::Rng;

    let mut rng = rand::thread_rng();
    let secret: i64 = loop {
        let val = rng.gen::<i64>();
        if val != 0 {
            break val;
        }
    };

    sqlx::query("INSERT OR REPLACE INTO settings (key, value) VALUES (?, ?)")
        .bind(SHARED_SECRET_KEY)
        .bind(secret.to_string())
        .execute(db)
        .await
        .map_err(|e| ApiAuthError::DatabaseError(e.to_string()))?;

    Ok(secret)
}

// ========================================
// Timestamp Validation
// ========================================

/// Current Unix time in milliseconds
pub fn now_millis() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}

/// Reject timestamps more than `max_skew_ms` away from `now` in either direction
pub fn validate_timestamp(timestamp: i64, now: i64, max_skew_ms: i64) -> Result<(), ApiAuthError> {
    // Widened so extreme header values cannot overflow
    let diff = i128::from(now) - i128::from(timestamp);
    let max_skew = i128::from(max_skew_ms);

    if diff > max_skew {
        return Err(ApiAuthError::InvalidTimestamp {
            timestamp,
            now,
            reason: format!("Timestamp {}ms too old (max {}ms)", diff, max_skew_ms),
        });
    }

    if -diff > max_skew {
        return Err(ApiAuthError::InvalidTimestamp {
            timestamp,
            now,
            reason: format!("Timestamp {}ms in future (max {}ms)", -diff, max_skew_ms),
        });
    }

    Ok(())
}

// ========================================
// Signature Calculation and Validation
// ========================================

/// Canonical string covered by the signature
pub fn signing_payload(admin_id: &str, timestamp: i64, method: &str, path: &str) -> String {
    format!(
        "{}\n{}\n{}\n{}",
        admin_id,
        timestamp,
        method.to_ascii_uppercase(),
        path
    )
}

/// Hex SHA-256 of the payload with the secret appended
///
/// # Examples
///
/// ```
/// use rentdesk_common::api::auth::calculate_signature;
///
/// let sig = calculate_signature("admin-1", 1730000000000, "POST", "/api/cars", 42);
/// assert_eq!(sig.len(), 64);
/// ```
pub fn calculate_signature(
    admin_id: &str,
    timestamp: i64,
    method: &str,
    path: &str,
    shared_secret: i64,
) -> String {
    let mut hasher = Sha256::new();
    hasher.update(signing_payload(admin_id, timestamp, method, path).as_bytes());
    hasher.update(shared_secret.to_string().as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Validate a provided signature
pub fn validate_signature(
    provided: &str,
    admin_id: &str,
    timestamp: i64,
    method: &str,
    path: &str,
    shared_secret: i64,
) -> Result<(), ApiAuthError> {
    let calculated = calculate_signature(admin_id, timestamp, method, path, shared_secret);

    if !provided.eq_ignore_ascii_case(&calculated) {
        return Err(ApiAuthError::InvalidSignature {
            provided: provided.to_string(),
            calculated,
        });
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const NOW: i64 = 1_730_000_000_000;

    #[test]
    fn test_timestamp_window() {
        assert!(validate_timestamp(NOW, NOW, 1000).is_ok());
        assert!(validate_timestamp(NOW - 1000, NOW, 1000).is_ok());
        assert!(validate_timestamp(NOW + 1000, NOW, 1000).is_ok());
        assert!(validate_timestamp(NOW - 1001, NOW, 1000).is_err());
        assert!(validate_timestamp(NOW + 1001, NOW, 1000).is_err());
    }

    #[test]
    fn test_extreme_timestamps_rejected() {
        assert!(matches!(
            validate_timestamp(i64::MIN, NOW, 300_000),
            Err(ApiAuthError::InvalidTimestamp { .. })
        ));
        assert!(matches!(
            validate_timestamp(i64::MAX, NOW, 300_000),
            Err(ApiAuthError::InvalidTimestamp { .. })
        ));
        assert!(validate_timestamp(i64::MAX, -1, i64::MAX).is_err());
    }

    #[test]
    fn test_signature_deterministic() {
        let a = calculate_signature("admin-1", NOW, "post", "/api/cars", 42);
        let b = calculate_signature("admin-1", NOW, "POST", "/api/cars", 42);
        assert_eq!(a, b);
        assert_eq!(a.len(), 64);
        assert!(a.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_signature_covers_every_field() {
        let base = calculate_signature("admin-1", NOW, "POST", "/api/cars", 42);
        assert_ne!(base, calculate_signature("admin-2", NOW, "POST", "/api/cars", 42));
        assert_ne!(base, calculate_signature("admin-1", NOW + 1, "POST", "/api/cars", 42));
        assert_ne!(base, calculate_signature("admin-1", NOW, "DELETE", "/api/cars", 42));
        assert_ne!(base, calculate_signature("admin-1", NOW, "POST", "/api/catalog", 42));
        assert_ne!(base, calculate_signature("admin-1", NOW, "POST", "/api/cars", 43));
    }

    #[test]
    fn test_validate_signature() {
        let sig = calculate_signature("admin-1", NOW, "GET", "/api/admins", 7);
        assert!(validate_signature(&sig, "admin-1", NOW, "GET", "/api/admins", 7).is_ok());
        assert!(validate_signature(&sig.to_uppercase(), "admin-1", NOW, "GET", "/api/admins", 7).is_ok());
        assert!(matches!(
            validate_signature("00", "admin-1", NOW, "GET", "/api/admins", 7),
            Err(ApiAuthError::InvalidSignature { .. })
        ));
    }
}
