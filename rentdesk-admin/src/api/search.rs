//! Free-text search over agreements and cars

use axum::{
    extract::{Query, State},
    Json,
};
use rentdesk_common::blacklist::normalize_identifier;
use rentdesk_common::db::{Agreement, Car};
use serde::Deserialize;

use crate::pagination::{calculate_pagination, default_page, Page, PAGE_SIZE};
use crate::{ApiError, ApiResult, AppState};

#[derive(Debug, Deserialize)]
pub struct SearchQuery {
    pub q: String,
    #[serde(default = "default_page")]
    pub page: i64,
}

/// GET /api/search/agreements?q=
///
/// Matches customer name or phone by substring, or the customer identifier
/// exactly after normalization (`A12-3456` finds `a123456`).
pub async fn search_agreements(
    State(state): State<AppState>,
    Query(query): Query<SearchQuery>,
) -> ApiResult<Json<Page<Agreement>>> {
    let term = require_term(&query.q)?;
    let pattern = like_pattern(term);
    let normalized = normalize_identifier(term);

    let where_clause = "customer_name LIKE ?1 ESCAPE '\\'
         OR customer_phone LIKE ?1 ESCAPE '\\'
         OR (?2 <> '' AND customer_identifier_normalized = ?2)";

    let total: i64 = sqlx::query_scalar(&format!(
        "SELECT COUNT(*) FROM agreements WHERE {}",
        where_clause
    ))
    .bind(&pattern)
    .bind(&normalized)
    .fetch_one(&state.db)
    .await?;

    let p = calculate_pagination(total, query.page);

    let rows = sqlx::query_as::<_, Agreement>(&format!(
        "SELECT id, car_id, customer_name, customer_identifier, customer_phone,
                start_at, end_at, price, status, created_at, updated_at
         FROM agreements
         WHERE {}
         ORDER BY created_at DESC
         LIMIT ?3 OFFSET ?4",
        where_clause
    ))
    .bind(&pattern)
    .bind(&normalized)
    .bind(PAGE_SIZE)
    .bind(p.offset)
    .fetch_all(&state.db)
    .await?;

    Ok(Json(Page::new(total, p, rows)))
}

/// GET /api/search/cars?q=
///
/// Substring match on the plate, case-insensitive.
pub async fn search_cars(
    State(state): State<AppState>,
    Query(query): Query<SearchQuery>,
) -> ApiResult<Json<Page<Car>>> {
    let term = require_term(&query.q)?;
    let pattern = like_pattern(&term.to_uppercase());

    let total: i64 =
        sqlx::query_scalar("SELECT COUNT(*) FROM cars WHERE plate LIKE ?1 ESCAPE '\\'")
            .bind(&pattern)
            .fetch_one(&state.db)
            .await?;

    let p = calculate_pagination(total, query.page);

    let rows = sqlx::query_as::<_, Car>(
        "SELECT id, plate, catalog_id, status, mileage_km, next_maintenance_at, created_at, updated_at
         FROM cars
         WHERE plate LIKE ?1 ESCAPE '\\'
         ORDER BY plate
         LIMIT ?2 OFFSET ?3",
    )
    .bind(&pattern)
    .bind(PAGE_SIZE)
    .bind(p.offset)
    .fetch_all(&state.db)
    .await?;

    Ok(Json(Page::new(total, p, rows)))
}

fn require_term(raw: &str) -> ApiResult<&str> {
    let term = raw.trim();
    if term.is_empty() {
        Err(ApiError::BadRequest("Search term 'q' is required".to_string()))
    } else {
        Ok(term)
    }
}

/// `%term%` with LIKE wildcards in `term` escaped
fn like_pattern(term: &str) -> String {
    let mut pattern = String::with_capacity(term.len() + 2);
    pattern.push('%');
    for c in term.chars() {
        if matches!(c, '%' | '_' | '\\') {
            pattern.push('\\');
        }
        pattern.push(c);
    }
    pattern.push('%');
    pattern
}
