//! Admin gate middleware
//!
//! Verifies the signed identity headers, resolves the admin row and attaches
//! an [`AdminSession`] to the request. Handlers that mutate call
//! [`AdminSession::require_mutation`].

use axum::{
    extract::{Request, State},
    http::HeaderMap,
    middleware::Next,
    response::{IntoResponse, Response},
};
use rentdesk_common::api::auth::{
    now_millis, validate_signature, validate_timestamp, ApiAuthError, ADMIN_ID_HEADER,
    SIGNATURE_HEADER, TIMESTAMP_HEADER,
};
use rentdesk_common::db::{AdminUser, Role};
use tracing::warn;

use crate::{db, ApiError, AppState};

/// Authenticated admin attached to every gated request
#[derive(Debug, Clone)]
pub struct AdminSession {
    pub admin: AdminUser,
}

impl AdminSession {
    pub fn id(&self) -> &str {
        &self.admin.id
    }

    pub fn role(&self) -> Role {
        self.admin.role
    }

    /// Admin gate for mutations: `admin` or `superadmin`
    pub fn require_mutation(&self) -> Result<(), ApiError> {
        if self.admin.role.can_mutate() {
            Ok(())
        } else {
            Err(ApiError::Forbidden(format!(
                "Role '{}' cannot modify data",
                self.admin.role
            )))
        }
    }

    pub fn require_superadmin(&self) -> Result<(), ApiError> {
        if self.admin.role == Role::Superadmin {
            Ok(())
        } else {
            Err(ApiError::Forbidden("Superadmin role required".to_string()))
        }
    }
}

/// Authentication middleware
///
/// Returns 401 when the identity is missing, stale, wrongly signed or
/// unknown. `/health` and event ingestion do not pass through here.
pub async fn auth_middleware(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, AuthError> {
    let headers = request.headers();
    let admin_id = header_str(headers, ADMIN_ID_HEADER)
        .filter(|v| !v.is_empty())
        .ok_or(AuthError::Rejected(ApiAuthError::MissingHeader(ADMIN_ID_HEADER)))?
        .to_string();

    // Secret = 0 disables signature checking; identity is still required
    if state.shared_secret != 0 {
        let timestamp = header_str(headers, TIMESTAMP_HEADER)
            .and_then(|v| v.parse::<i64>().ok())
            .ok_or(AuthError::Rejected(ApiAuthError::MissingHeader(TIMESTAMP_HEADER)))?;
        let signature = header_str(headers, SIGNATURE_HEADER)
            .ok_or(AuthError::Rejected(ApiAuthError::MissingHeader(SIGNATURE_HEADER)))?;

        validate_timestamp(timestamp, now_millis(), state.max_skew_ms)
            .map_err(AuthError::Rejected)?;

        validate_signature(
            signature,
            &admin_id,
            timestamp,
            request.method().as_str(),
            request.uri().path(),
            state.shared_secret,
        )
        .map_err(|e| {
            if let ApiAuthError::InvalidSignature { provided, calculated } = &e {
                warn!(
                    "Signature validation failed for {}: provided={}, calculated={}",
                    admin_id, provided, calculated
                );
            }
            AuthError::Rejected(e)
        })?;
    }

    let admin = db::load_admin(&state.db, &admin_id)
        .await
        .map_err(|e| AuthError::Internal(e.to_string()))?
        .ok_or_else(|| {
            warn!("Request from unknown admin id {}", admin_id);
            AuthError::UnknownAdmin
        })?;

    request.extensions_mut().insert(AdminSession { admin });

    Ok(next.run(request).await)
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok()).map(str::trim)
}

/// Authentication error types for HTTP responses
#[derive(Debug)]
pub enum AuthError {
    Rejected(ApiAuthError),
    UnknownAdmin,
    Internal(String),
}

impl From<AuthError> for ApiError {
    fn from(err: AuthError) -> Self {
        match err {
            AuthError::Rejected(e) => ApiError::Unauthorized(e.to_string()),
            AuthError::UnknownAdmin => ApiError::Unauthorized("Unknown admin".to_string()),
            AuthError::Internal(msg) => ApiError::Internal(format!("Authentication error: {}", msg)),
        }
    }
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        ApiError::from(self).into_response()
    }
}
