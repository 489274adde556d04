//! Revenue dashboard
//!
//! Booking revenue comes from the agreements table, adjustment revenue from
//! the price changes recorded in the audit log. All windows are evaluated in
//! the configured business timezone.

use axum::{
    extract::{Query, State},
    Json,
};
use chrono::{DateTime, NaiveDate, Utc};
use rentdesk_common::audit::load_price_adjustments;
use rentdesk_common::db::{db_now, Agreement};
use rentdesk_common::revenue::{
    bucketize, summarize, PriceAdjustment, RevenueAgreement, RevenueBucket, RevenueSummary,
};
use rentdesk_common::{BusinessTz, Period};
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use tracing::debug;

use crate::{ApiError, ApiResult, AppState};

#[derive(Debug, Deserialize)]
pub struct SummaryQuery {
    /// Evaluate as of this instant instead of the current time
    pub now: Option<String>,
}

/// `?period=&from=&to=` shared by the revenue and traffic series
#[derive(Debug, Deserialize)]
pub struct SeriesQuery {
    pub period: String,
    pub from: String,
    pub to: Option<String>,
}

/// Parsed series range
#[derive(Debug, Clone, Copy)]
pub struct SeriesRange {
    pub period: Period,
    pub from: DateTime<Utc>,
    pub to: DateTime<Utc>,
}

impl SeriesQuery {
    pub fn resolve(&self, tz: &BusinessTz) -> ApiResult<SeriesRange> {
        let period: Period = self.period.parse()?;
        let from = parse_instant(&self.from, tz)?;
        let to = match &self.to {
            Some(raw) => parse_instant(raw, tz)?,
            None => db_now(),
        };
        if from > to {
            return Err(ApiError::BadRequest(format!(
                "'from' ({}) is after 'to' ({})",
                self.from,
                self.to.as_deref().unwrap_or("now")
            )));
        }
        Ok(SeriesRange { period, from, to })
    }
}

#[derive(Debug, Serialize)]
pub struct RevenueSeriesResponse {
    pub period: Period,
    pub from: DateTime<Utc>,
    pub to: DateTime<Utc>,
    pub business_utc_offset_hours: i32,
    pub buckets: Vec<RevenueBucket>,
}

/// GET /api/dashboard/revenue?now=
pub async fn revenue_summary(
    State(state): State<AppState>,
    Query(query): Query<SummaryQuery>,
) -> ApiResult<Json<RevenueSummary>> {
    let now = match &query.now {
        Some(raw) => parse_instant(raw, &state.business_tz)?,
        None => db_now(),
    };

    let (agreements, adjustments) = load_revenue_inputs(&state.db).await?;
    debug!(
        agreements = agreements.len(),
        adjustments = adjustments.len(),
        "Computing revenue summary"
    );

    Ok(Json(summarize(
        &agreements,
        &adjustments,
        &state.business_tz,
        now,
    )))
}

/// GET /api/dashboard/revenue/series?period=&from=&to=
pub async fn revenue_series(
    State(state): State<AppState>,
    Query(query): Query<SeriesQuery>,
) -> ApiResult<Json<RevenueSeriesResponse>> {
    let range = query.resolve(&state.business_tz)?;
    let (agreements, adjustments) = load_revenue_inputs(&state.db).await?;

    let buckets = bucketize(
        &agreements,
        &adjustments,
        &state.business_tz,
        range.period,
        range.from,
        range.to,
    )?;

    Ok(Json(RevenueSeriesResponse {
        period: range.period,
        from: range.from,
        to: range.to,
        business_utc_offset_hours: state.business_tz.offset_hours(),
        buckets,
    }))
}

async fn load_revenue_inputs(
    pool: &SqlitePool,
) -> ApiResult<(Vec<RevenueAgreement>, Vec<PriceAdjustment>)> {
    let agreements = sqlx::query_as::<_, Agreement>(
        "SELECT id, car_id, customer_name, customer_identifier, customer_phone,
                start_at, end_at, price, status, created_at, updated_at
         FROM agreements WHERE status <> 'cancelled'",
    )
    .fetch_all(pool)
    .await?;

    let adjustments = load_price_adjustments(pool).await?;

    Ok((
        agreements.iter().map(RevenueAgreement::from).collect(),
        adjustments,
    ))
}

/// RFC 3339 instant, or a bare `YYYY-MM-DD` read as business-local midnight
pub fn parse_instant(raw: &str, tz: &BusinessTz) -> ApiResult<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(instant) = DateTime::parse_from_rfc3339(raw) {
        return Ok(instant.with_timezone(&Utc));
    }
    if let Ok(date) = NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
        return Ok(tz.midnight(date));
    }
    Err(ApiError::BadRequest(format!("Invalid timestamp: {}", raw)))
}
