//! Admin management
//!
//! Superadmin rows are never deleted here, and only a superadmin may grant
//! or revoke the superadmin role.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Extension, Json,
};
use rentdesk_common::audit::{self, AuditEntry};
use rentdesk_common::db::{db_now, db_timestamp, new_id, AdminUser, Role};
use serde::Deserialize;
use tracing::info;

use super::auth::AdminSession;
use crate::{db, ApiError, ApiResult, AppState};

const TABLE: &str = "admin_users";

#[derive(Debug, Deserialize)]
pub struct CreateAdminRequest {
    pub email: String,
    pub display_name: String,
    pub role: Role,
}

#[derive(Debug, Deserialize)]
pub struct UpdateRoleRequest {
    pub role: Role,
}

/// GET /api/admins
pub async fn list_admins(State(state): State<AppState>) -> ApiResult<Json<Vec<AdminUser>>> {
    let admins = sqlx::query_as::<_, AdminUser>(
        "SELECT id, email, display_name, role, created_at FROM admin_users ORDER BY created_at, email",
    )
    .fetch_all(&state.db)
    .await?;

    Ok(Json(admins))
}

/// POST /api/admins
pub async fn create_admin(
    State(state): State<AppState>,
    Extension(session): Extension<AdminSession>,
    Json(req): Json<CreateAdminRequest>,
) -> ApiResult<(StatusCode, Json<AdminUser>)> {
    session.require_mutation()?;
    if req.role == Role::Superadmin {
        session.require_superadmin()?;
    }

    let email = req.email.trim().to_ascii_lowercase();
    if !is_plausible_email(&email) {
        return Err(ApiError::BadRequest(format!("Invalid email: {}", req.email)));
    }
    let display_name = req.display_name.trim();
    if display_name.is_empty() {
        return Err(ApiError::BadRequest("Display name is required".to_string()));
    }

    let admin = AdminUser {
        id: new_id(),
        email,
        display_name: display_name.to_string(),
        role: req.role,
        created_at: db_now(),
    };

    let mut tx = state.db.begin().await?;
    sqlx::query(
        "INSERT INTO admin_users (id, email, display_name, role, created_at) VALUES (?, ?, ?, ?, ?)",
    )
    .bind(&admin.id)
    .bind(&admin.email)
    .bind(&admin.display_name)
    .bind(admin.role)
    .bind(db_timestamp(admin.created_at))
    .execute(&mut *tx)
    .await?;

    let entry = AuditEntry::insert(TABLE, &admin.id, session.id(), &admin)?;
    audit::record(&mut tx, &entry, admin.created_at).await?;
    tx.commit().await?;

    info!("{} created {} admin {}", session.id(), admin.role, admin.email);
    Ok((StatusCode::CREATED, Json(admin)))
}

/// PATCH /api/admins/:id/role
pub async fn update_admin_role(
    State(state): State<AppState>,
    Extension(session): Extension<AdminSession>,
    Path(id): Path<String>,
    Json(req): Json<UpdateRoleRequest>,
) -> ApiResult<Json<AdminUser>> {
    session.require_mutation()?;

    let mut tx = state.db.begin().await?;
    let before = db::load_admin(&mut *tx, &id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("Admin {}", id)))?;

    if before.role == req.role {
        return Ok(Json(before));
    }

    if before.role == Role::Superadmin || req.role == Role::Superadmin {
        session.require_superadmin()?;
    }

    if before.role == Role::Superadmin {
        let superadmins: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM admin_users WHERE role = 'superadmin'")
                .fetch_one(&mut *tx)
                .await?;
        if superadmins <= 1 {
            return Err(ApiError::Conflict(
                "Cannot demote the last superadmin".to_string(),
            ));
        }
    }

    sqlx::query("UPDATE admin_users SET role = ? WHERE id = ?")
        .bind(req.role)
        .bind(&id)
        .execute(&mut *tx)
        .await?;

    let after = AdminUser {
        role: req.role,
        ..before.clone()
    };
    let entry = AuditEntry::update(TABLE, &id, session.id(), &before, &after)?;
    audit::record(&mut tx, &entry, db_now()).await?;
    tx.commit().await?;

    info!(
        "{} changed role of {} from {} to {}",
        session.id(),
        after.email,
        before.role,
        after.role
    );
    Ok(Json(after))
}

/// DELETE /api/admins/:id
pub async fn delete_admin(
    State(state): State<AppState>,
    Extension(session): Extension<AdminSession>,
    Path(id): Path<String>,
) -> ApiResult<StatusCode> {
    session.require_mutation()?;

    let mut tx = state.db.begin().await?;
    let before = db::load_admin(&mut *tx, &id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("Admin {}", id)))?;

    if before.role == Role::Superadmin {
        return Err(ApiError::Forbidden(
            "Superadmin accounts cannot be deleted".to_string(),
        ));
    }
    if before.id == session.id() {
        return Err(ApiError::Conflict("Admins cannot delete themselves".to_string()));
    }

    sqlx::query("DELETE FROM admin_users WHERE id = ?")
        .bind(&id)
        .execute(&mut *tx)
        .await?;

    let entry = AuditEntry::delete(TABLE, &id, session.id(), &before)?;
    audit::record(&mut tx, &entry, db_now()).await?;
    tx.commit().await?;

    info!("{} deleted admin {}", session.id(), before.email);
    Ok(StatusCode::NO_CONTENT)
}

/// `local@domain.tld` with no whitespace
fn is_plausible_email(email: &str) -> bool {
    match email.split_once('@') {
        Some((local, domain)) => {
            !local.is_empty()
                && domain.contains('.')
                && !domain.starts_with('.')
                && !domain.ends_with('.')
                && !domain.contains('@')
                && !email.chars().any(char::is_whitespace)
        }
        None => false,
    }
}
