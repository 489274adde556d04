//! Customer blacklist endpoints

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Extension, Json,
};
use rentdesk_common::audit::{self, AuditEntry};
use rentdesk_common::blacklist::{find_match, normalize_identifier};
use rentdesk_common::db::{db_now, db_timestamp, new_id, BlacklistEntry};
use serde::{Deserialize, Serialize};
use tracing::info;

use super::auth::AdminSession;
use crate::{ApiError, ApiResult, AppState};

const TABLE: &str = "blacklist";

#[derive(Debug, Deserialize)]
pub struct CreateBlacklistRequest {
    pub identifier: String,
    #[serde(default)]
    pub reason: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct CheckQuery {
    pub identifier: String,
}

#[derive(Debug, Serialize)]
pub struct CheckResponse {
    pub identifier: String,
    pub normalized: String,
    pub blacklisted: bool,
    pub entry: Option<BlacklistEntry>,
}

/// POST /api/blacklist
pub async fn create_blacklist_entry(
    State(state): State<AppState>,
    Extension(session): Extension<AdminSession>,
    Json(req): Json<CreateBlacklistRequest>,
) -> ApiResult<(StatusCode, Json<BlacklistEntry>)> {
    session.require_mutation()?;

    let identifier = req.identifier.trim();
    let normalized = normalize_identifier(identifier);
    if normalized.is_empty() {
        return Err(ApiError::BadRequest("Identifier is required".to_string()));
    }

    let entry = BlacklistEntry {
        id: new_id(),
        identifier: identifier.to_string(),
        identifier_normalized: normalized,
        reason: req
            .reason
            .map(|r| r.trim().to_string())
            .filter(|r| !r.is_empty()),
        created_at: db_now(),
    };

    let mut tx = state.db.begin().await?;
    // Unique index on identifier_normalized turns duplicates into 409
    sqlx::query(
        "INSERT INTO blacklist (id, identifier, identifier_normalized, reason, created_at)
         VALUES (?, ?, ?, ?, ?)",
    )
    .bind(&entry.id)
    .bind(&entry.identifier)
    .bind(&entry.identifier_normalized)
    .bind(&entry.reason)
    .bind(db_timestamp(entry.created_at))
    .execute(&mut *tx)
    .await?;

    let audit_entry = AuditEntry::insert(TABLE, &entry.id, session.id(), &entry)?;
    audit::record(&mut tx, &audit_entry, entry.created_at).await?;
    tx.commit().await?;

    info!("{} blacklisted {}", session.id(), entry.identifier_normalized);
    Ok((StatusCode::CREATED, Json(entry)))
}

/// DELETE /api/blacklist/:id
pub async fn delete_blacklist_entry(
    State(state): State<AppState>,
    Extension(session): Extension<AdminSession>,
    Path(id): Path<String>,
) -> ApiResult<StatusCode> {
    session.require_mutation()?;

    let mut tx = state.db.begin().await?;
    let before = sqlx::query_as::<_, BlacklistEntry>(
        "SELECT id, identifier, identifier_normalized, reason, created_at FROM blacklist WHERE id = ?",
    )
    .bind(&id)
    .fetch_optional(&mut *tx)
    .await?
    .ok_or_else(|| ApiError::NotFound(format!("Blacklist entry {}", id)))?;

    sqlx::query("DELETE FROM blacklist WHERE id = ?")
        .bind(&id)
        .execute(&mut *tx)
        .await?;

    let entry = AuditEntry::delete(TABLE, &id, session.id(), &before)?;
    audit::record(&mut tx, &entry, db_now()).await?;
    tx.commit().await?;

    info!("{} removed {} from blacklist", session.id(), before.identifier_normalized);
    Ok(StatusCode::NO_CONTENT)
}

/// GET /api/blacklist/check?identifier=
pub async fn check_blacklist(
    State(state): State<AppState>,
    Query(query): Query<CheckQuery>,
) -> ApiResult<Json<CheckResponse>> {
    let entry = find_match(&state.db, &query.identifier).await?;

    Ok(Json(CheckResponse {
        normalized: normalize_identifier(&query.identifier),
        identifier: query.identifier,
        blacklisted: entry.is_some(),
        entry,
    }))
}
