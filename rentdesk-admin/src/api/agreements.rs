//! Rental agreements
//!
//! Price edits are written to the audit log with full before/after
//! snapshots; the revenue dashboard reads price adjustments back from there.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Extension, Json,
};
use chrono::{DateTime, Utc};
use rentdesk_common::audit::{self, AuditEntry};
use rentdesk_common::blacklist;
use rentdesk_common::db::{db_now, db_timestamp, new_id, Agreement, AgreementStatus, CarStatus};
use rentdesk_common::revenue::{AGREEMENTS_TABLE, MAX_PRICE};
use serde::Deserialize;
use sqlx::SqliteConnection;
use tracing::{info, warn};

use super::auth::AdminSession;
use crate::{db, ApiError, ApiResult, AppState};

#[derive(Debug, Deserialize)]
pub struct CreateAgreementRequest {
    pub car_id: String,
    pub customer_name: String,
    pub customer_identifier: String,
    #[serde(default)]
    pub customer_phone: Option<String>,
    pub start_at: DateTime<Utc>,
    pub end_at: DateTime<Utc>,
    pub price: i64,
    #[serde(default)]
    pub status: Option<AgreementStatus>,
}

/// Partial agreement update; absent fields are left alone
#[derive(Debug, Default, Deserialize)]
pub struct UpdateAgreementRequest {
    pub customer_name: Option<String>,
    pub customer_phone: Option<String>,
    pub start_at: Option<DateTime<Utc>>,
    pub end_at: Option<DateTime<Utc>>,
    pub price: Option<i64>,
    pub status: Option<AgreementStatus>,
}

/// POST /api/agreements
pub async fn create_agreement(
    State(state): State<AppState>,
    Extension(session): Extension<AdminSession>,
    Json(req): Json<CreateAgreementRequest>,
) -> ApiResult<(StatusCode, Json<Agreement>)> {
    session.require_mutation()?;

    let customer_name = req.customer_name.trim();
    let customer_identifier = req.customer_identifier.trim();
    if customer_name.is_empty() || customer_identifier.is_empty() {
        return Err(ApiError::BadRequest(
            "Customer name and identifier are required".to_string(),
        ));
    }
    validate_terms(req.start_at, req.end_at, req.price)?;

    let status = req.status.unwrap_or(AgreementStatus::Pending);
    if matches!(status, AgreementStatus::Cancelled | AgreementStatus::Completed) {
        return Err(ApiError::BadRequest(format!(
            "A new agreement cannot start as {:?}",
            status
        )));
    }

    if let Some(entry) = blacklist::find_match(&state.db, customer_identifier).await? {
        warn!(
            "Refused agreement for blacklisted identifier {} (entry {})",
            customer_identifier, entry.id
        );
        return Err(ApiError::Conflict(format!(
            "Customer is blacklisted: {}",
            entry.reason.as_deref().unwrap_or("no reason recorded")
        )));
    }

    let mut tx = state.db.begin().await?;
    let car = db::load_car(&mut *tx, &req.car_id)
        .await?
        .ok_or_else(|| ApiError::BadRequest(format!("Unknown car id: {}", req.car_id)))?;
    if car.status == CarStatus::Retired {
        return Err(ApiError::BadRequest(format!("Car {} is retired", car.plate)));
    }
    check_overlap(&mut tx, &car.id, None, req.start_at, req.end_at).await?;

    let now = db_now();
    let agreement = Agreement {
        id: new_id(),
        car_id: car.id,
        customer_name: customer_name.to_string(),
        customer_identifier: customer_identifier.to_string(),
        customer_phone: clean_optional(req.customer_phone),
        start_at: req.start_at,
        end_at: req.end_at,
        price: req.price,
        status,
        created_at: now,
        updated_at: now,
    };

    sqlx::query(
        r#"
        INSERT INTO agreements
            (id, car_id, customer_name, customer_identifier, customer_identifier_normalized,
             customer_phone, start_at, end_at, price, status, created_at, updated_at)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&agreement.id)
    .bind(&agreement.car_id)
    .bind(&agreement.customer_name)
    .bind(&agreement.customer_identifier)
    .bind(blacklist::normalize_identifier(&agreement.customer_identifier))
    .bind(&agreement.customer_phone)
    .bind(db_timestamp(agreement.start_at))
    .bind(db_timestamp(agreement.end_at))
    .bind(agreement.price)
    .bind(agreement.status)
    .bind(db_timestamp(agreement.created_at))
    .bind(db_timestamp(agreement.updated_at))
    .execute(&mut *tx)
    .await?;

    let entry = AuditEntry::insert(AGREEMENTS_TABLE, &agreement.id, session.id(), &agreement)?;
    audit::record(&mut tx, &entry, now).await?;
    tx.commit().await?;

    info!(
        "Agreement {} booked on car {} for {}",
        agreement.id, car.plate, agreement.price
    );
    Ok((StatusCode::CREATED, Json(agreement)))
}

/// PATCH /api/agreements/:id
pub async fn update_agreement(
    State(state): State<AppState>,
    Extension(session): Extension<AdminSession>,
    Path(id): Path<String>,
    Json(req): Json<UpdateAgreementRequest>,
) -> ApiResult<Json<Agreement>> {
    session.require_mutation()?;

    let mut tx = state.db.begin().await?;
    let before = db::load_agreement(&mut *tx, &id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("Agreement {}", id)))?;

    if before.status.is_cancelled() {
        return Err(ApiError::Conflict(format!("Agreement {} is cancelled", id)));
    }

    let mut after = before.clone();
    if let Some(name) = &req.customer_name {
        let name = name.trim();
        if name.is_empty() {
            return Err(ApiError::BadRequest("Customer name cannot be empty".to_string()));
        }
        after.customer_name = name.to_string();
    }
    if req.customer_phone.is_some() {
        after.customer_phone = clean_optional(req.customer_phone);
    }
    if let Some(start_at) = req.start_at {
        after.start_at = start_at;
    }
    if let Some(end_at) = req.end_at {
        after.end_at = end_at;
    }
    if let Some(price) = req.price {
        after.price = price;
    }
    if let Some(status) = req.status {
        if status.is_cancelled() {
            return Err(ApiError::BadRequest(
                "Use POST /api/agreements/:id/cancel to cancel".to_string(),
            ));
        }
        after.status = status;
    }
    validate_terms(after.start_at, after.end_at, after.price)?;

    if after.start_at != before.start_at || after.end_at != before.end_at {
        check_overlap(&mut tx, &after.car_id, Some(&id), after.start_at, after.end_at).await?;
    }

    after.updated_at = db_now();
    write_agreement(&mut tx, &after).await?;

    let entry = AuditEntry::update(AGREEMENTS_TABLE, &id, session.id(), &before, &after)?;
    audit::record(&mut tx, &entry, after.updated_at).await?;
    tx.commit().await?;

    if after.price != before.price {
        info!(
            "Agreement {} price changed {} -> {} by {}",
            id,
            before.price,
            after.price,
            session.id()
        );
    }
    Ok(Json(after))
}

/// POST /api/agreements/:id/cancel
pub async fn cancel_agreement(
    State(state): State<AppState>,
    Extension(session): Extension<AdminSession>,
    Path(id): Path<String>,
) -> ApiResult<Json<Agreement>> {
    session.require_mutation()?;

    let mut tx = state.db.begin().await?;
    let before = db::load_agreement(&mut *tx, &id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("Agreement {}", id)))?;

    match before.status {
        AgreementStatus::Cancelled => {
            return Err(ApiError::Conflict(format!("Agreement {} is already cancelled", id)))
        }
        AgreementStatus::Completed => {
            return Err(ApiError::Conflict(format!("Agreement {} is completed", id)))
        }
        _ => {}
    }

    let after = Agreement {
        status: AgreementStatus::Cancelled,
        updated_at: db_now(),
        ..before.clone()
    };
    write_agreement(&mut tx, &after).await?;

    let entry = AuditEntry::update(AGREEMENTS_TABLE, &id, session.id(), &before, &after)?;
    audit::record(&mut tx, &entry, after.updated_at).await?;
    tx.commit().await?;

    info!("{} cancelled agreement {}", session.id(), id);
    Ok(Json(after))
}

fn validate_terms(start_at: DateTime<Utc>, end_at: DateTime<Utc>, price: i64) -> ApiResult<()> {
    if end_at <= start_at {
        return Err(ApiError::BadRequest(format!(
            "Agreement must end after it starts ({} .. {})",
            start_at.to_rfc3339(),
            end_at.to_rfc3339()
        )));
    }
    if price < 0 {
        return Err(ApiError::BadRequest(format!("Price cannot be negative, got {}", price)));
    }
    if price > MAX_PRICE {
        return Err(ApiError::BadRequest(format!(
            "Price {} exceeds the maximum of {}",
            price, MAX_PRICE
        )));
    }
    Ok(())
}

/// Reject a booking whose range intersects another live booking on the same car
async fn check_overlap(
    conn: &mut SqliteConnection,
    car_id: &str,
    exclude_id: Option<&str>,
    start_at: DateTime<Utc>,
    end_at: DateTime<Utc>,
) -> ApiResult<()> {
    let clash: Option<String> = sqlx::query_scalar(
        "SELECT id FROM agreements
         WHERE car_id = ?1
           AND (?2 IS NULL OR id <> ?2)
           AND status NOT IN ('cancelled', 'completed')
           AND start_at < ?4 AND end_at > ?3
         LIMIT 1",
    )
    .bind(car_id)
    .bind(exclude_id)
    .bind(db_timestamp(start_at))
    .bind(db_timestamp(end_at))
    .fetch_optional(conn)
    .await?;

    match clash {
        Some(other) => Err(ApiError::Conflict(format!(
            "Car is already booked by agreement {} in that period",
            other
        ))),
        None => Ok(()),
    }
}

async fn write_agreement(conn: &mut SqliteConnection, agreement: &Agreement) -> ApiResult<()> {
    sqlx::query(
        r#"
        UPDATE agreements
        SET customer_name = ?, customer_phone = ?, start_at = ?, end_at = ?,
            price = ?, status = ?, updated_at = ?
        WHERE id = ?
        "#,
    )
    .bind(&agreement.customer_name)
    .bind(&agreement.customer_phone)
    .bind(db_timestamp(agreement.start_at))
    .bind(db_timestamp(agreement.end_at))
    .bind(agreement.price)
    .bind(agreement.status)
    .bind(db_timestamp(agreement.updated_at))
    .bind(&agreement.id)
    .execute(conn)
    .await?;

    Ok(())
}

fn clean_optional(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}
