//! Site traffic analytics
//!
//! The public site posts page views, clicks and conversions to
//! `/api/events` without signing; the dashboard reads them back bucketed
//! on the same calendar as the revenue series.

use axum::{
    extract::{Query, State},
    http::StatusCode,
    Json,
};
use chrono::{DateTime, Utc};
use rentdesk_common::db::{db_now, db_timestamp, new_id, EventType, SiteEvent};
use rentdesk_common::revenue::{bucket_index, empty_buckets};
use rentdesk_common::Period;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use super::dashboard::SeriesQuery;
use crate::{ApiError, ApiResult, AppState};

const MAX_PATH_LEN: usize = 2048;
const MAX_SESSION_ID_LEN: usize = 128;

#[derive(Debug, Deserialize)]
pub struct IngestEventRequest {
    pub event_type: String,
    pub path: String,
    #[serde(default)]
    pub session_id: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct TrafficBucket {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub page_views: i64,
    pub clicks: i64,
    pub conversions: i64,
    pub unique_sessions: i64,
}

#[derive(Debug, Serialize)]
pub struct TrafficSeriesResponse {
    pub period: Period,
    pub from: DateTime<Utc>,
    pub to: DateTime<Utc>,
    pub business_utc_offset_hours: i32,
    pub buckets: Vec<TrafficBucket>,
}

/// POST /api/events
///
/// Events are timestamped on arrival; client clocks are not trusted.
pub async fn ingest_event(
    State(state): State<AppState>,
    Json(req): Json<IngestEventRequest>,
) -> ApiResult<StatusCode> {
    let event_type: EventType = req.event_type.parse()?;

    if !req.path.starts_with('/') || req.path.len() > MAX_PATH_LEN {
        return Err(ApiError::BadRequest(format!(
            "Path must start with '/' and be at most {} bytes",
            MAX_PATH_LEN
        )));
    }
    let session_id = req
        .session_id
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty());
    if session_id
        .as_ref()
        .is_some_and(|s| s.len() > MAX_SESSION_ID_LEN)
    {
        return Err(ApiError::BadRequest("Session id too long".to_string()));
    }

    let event = SiteEvent {
        id: new_id(),
        event_type,
        path: req.path,
        session_id,
        occurred_at: db_now(),
    };

    sqlx::query(
        "INSERT INTO site_events (id, event_type, path, session_id, occurred_at) VALUES (?, ?, ?, ?, ?)",
    )
    .bind(&event.id)
    .bind(event.event_type)
    .bind(&event.path)
    .bind(&event.session_id)
    .bind(db_timestamp(event.occurred_at))
    .execute(&state.db)
    .await?;

    Ok(StatusCode::ACCEPTED)
}

/// GET /api/analytics/traffic?period=&from=&to=
pub async fn traffic_series(
    State(state): State<AppState>,
    Query(query): Query<SeriesQuery>,
) -> ApiResult<Json<TrafficSeriesResponse>> {
    let range = query.resolve(&state.business_tz)?;
    let bounds = empty_buckets(&state.business_tz, range.period, range.from, range.to)?;

    let mut buckets: Vec<TrafficBucket> = bounds
        .iter()
        .map(|&(start, end)| TrafficBucket {
            start,
            end,
            page_views: 0,
            clicks: 0,
            conversions: 0,
            unique_sessions: 0,
        })
        .collect();

    if let (Some(first), Some(last)) = (bounds.first(), bounds.last()) {
        let events = sqlx::query_as::<_, SiteEvent>(
            "SELECT id, event_type, path, session_id, occurred_at
             FROM site_events
             WHERE occurred_at >= ? AND occurred_at < ?",
        )
        .bind(db_timestamp(first.0))
        .bind(db_timestamp(last.1))
        .fetch_all(&state.db)
        .await?;

        let mut sessions: Vec<HashSet<String>> = vec![HashSet::new(); buckets.len()];
        let span = |b: &(DateTime<Utc>, DateTime<Utc>)| *b;

        for event in events {
            let Some(i) = bucket_index(&bounds, span, event.occurred_at) else {
                continue;
            };
            match event.event_type {
                EventType::PageView => buckets[i].page_views += 1,
                EventType::Click => buckets[i].clicks += 1,
                EventType::Conversion => buckets[i].conversions += 1,
            }
            if let Some(session_id) = event.session_id {
                sessions[i].insert(session_id);
            }
        }

        for (bucket, seen) in buckets.iter_mut().zip(&sessions) {
            bucket.unique_sessions = seen.len() as i64;
        }
    }

    Ok(Json(TrafficSeriesResponse {
        period: range.period,
        from: range.from,
        to: range.to,
        business_utc_offset_hours: state.business_tz.offset_hours(),
        buckets,
    }))
}
