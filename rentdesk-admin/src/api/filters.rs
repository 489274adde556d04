//! Predefined operational filters
//!
//! Cars due for maintenance and agreements due for return. The look-ahead
//! defaults come from the `settings` table.

use axum::{
    extract::{Query, State},
    Json,
};
use chrono::{DateTime, Duration, Utc};
use rentdesk_common::db::{db_now, db_timestamp, get_setting_i64, Agreement, Car};
use serde::{Deserialize, Serialize};

use crate::pagination::{calculate_pagination, default_page, PAGE_SIZE};
use crate::{ApiError, ApiResult, AppState};

pub const MAINTENANCE_DUE_DAYS_KEY: &str = "maintenance_due_days";
pub const RETURNS_DUE_DAYS_KEY: &str = "returns_due_days";

const DEFAULT_MAINTENANCE_DUE_DAYS: i64 = 7;
const DEFAULT_RETURNS_DUE_DAYS: i64 = 3;
const MAX_WITHIN_DAYS: i64 = 3650;

#[derive(Debug, Deserialize)]
pub struct DueQuery {
    pub within_days: Option<i64>,
    #[serde(default = "default_page")]
    pub page: i64,
}

/// Filter response with results and metadata
#[derive(Debug, Serialize)]
pub struct FilterResponse<T> {
    pub filter_name: String,
    pub description: String,
    pub as_of: DateTime<Utc>,
    pub horizon: DateTime<Utc>,
    pub total_results: i64,
    pub page: i64,
    pub page_size: i64,
    pub total_pages: i64,
    pub results: Vec<T>,
}

/// GET /api/filters/maintenance-due?within_days=N
///
/// Non-retired cars whose next maintenance is at or before now + N days,
/// overdue ones included.
pub async fn maintenance_due(
    State(state): State<AppState>,
    Query(query): Query<DueQuery>,
) -> ApiResult<Json<FilterResponse<Car>>> {
    let days = resolve_days(
        &state,
        query.within_days,
        MAINTENANCE_DUE_DAYS_KEY,
        DEFAULT_MAINTENANCE_DUE_DAYS,
    )
    .await?;
    let now = db_now();
    let horizon = now + Duration::days(days);

    let total_results: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM cars
         WHERE status <> 'retired' AND next_maintenance_at IS NOT NULL AND next_maintenance_at <= ?",
    )
    .bind(db_timestamp(horizon))
    .fetch_one(&state.db)
    .await?;

    let p = calculate_pagination(total_results, query.page);

    let cars = sqlx::query_as::<_, Car>(
        "SELECT id, plate, catalog_id, status, mileage_km, next_maintenance_at, created_at, updated_at
         FROM cars
         WHERE status <> 'retired' AND next_maintenance_at IS NOT NULL AND next_maintenance_at <= ?
         ORDER BY next_maintenance_at, plate
         LIMIT ? OFFSET ?",
    )
    .bind(db_timestamp(horizon))
    .bind(PAGE_SIZE)
    .bind(p.offset)
    .fetch_all(&state.db)
    .await?;

    Ok(Json(FilterResponse {
        filter_name: "maintenance-due".to_string(),
        description: format!("Cars due for maintenance within {} day(s)", days),
        as_of: now,
        horizon,
        total_results,
        page: p.page,
        page_size: PAGE_SIZE,
        total_pages: p.total_pages,
        results: cars,
    }))
}

/// GET /api/filters/returns-due?within_days=N
///
/// Confirmed or active agreements ending between now and now + N days.
pub async fn returns_due(
    State(state): State<AppState>,
    Query(query): Query<DueQuery>,
) -> ApiResult<Json<FilterResponse<Agreement>>> {
    let days = resolve_days(
        &state,
        query.within_days,
        RETURNS_DUE_DAYS_KEY,
        DEFAULT_RETURNS_DUE_DAYS,
    )
    .await?;
    let now = db_now();
    let horizon = now + Duration::days(days);

    let total_results: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM agreements
         WHERE status IN ('confirmed', 'active') AND end_at >= ? AND end_at <= ?",
    )
    .bind(db_timestamp(now))
    .bind(db_timestamp(horizon))
    .fetch_one(&state.db)
    .await?;

    let p = calculate_pagination(total_results, query.page);

    let agreements = sqlx::query_as::<_, Agreement>(
        "SELECT id, car_id, customer_name, customer_identifier, customer_phone,
                start_at, end_at, price, status, created_at, updated_at
         FROM agreements
         WHERE status IN ('confirmed', 'active') AND end_at >= ? AND end_at <= ?
         ORDER BY end_at
         LIMIT ? OFFSET ?",
    )
    .bind(db_timestamp(now))
    .bind(db_timestamp(horizon))
    .bind(PAGE_SIZE)
    .bind(p.offset)
    .fetch_all(&state.db)
    .await?;

    Ok(Json(FilterResponse {
        filter_name: "returns-due".to_string(),
        description: format!("Agreements ending within {} day(s)", days),
        as_of: now,
        horizon,
        total_results,
        page: p.page,
        page_size: PAGE_SIZE,
        total_pages: p.total_pages,
        results: agreements,
    }))
}

async fn resolve_days(
    state: &AppState,
    requested: Option<i64>,
    setting_key: &str,
    default: i64,
) -> ApiResult<i64> {
    let days = match requested {
        Some(days) => days,
        None => get_setting_i64(&state.db, setting_key, default).await?,
    };
    if !(0..=MAX_WITHIN_DAYS).contains(&days) {
        return Err(ApiError::BadRequest(format!(
            "within_days must be between 0 and {}, got {}",
            MAX_WITHIN_DAYS, days
        )));
    }
    Ok(days)
}
