//! Marketing landing pages

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Extension, Json,
};
use rentdesk_common::audit::{self, AuditEntry};
use rentdesk_common::db::{db_now, db_timestamp, new_id, LandingPage};
use serde::Deserialize;

use super::auth::AdminSession;
use crate::{ApiError, ApiResult, AppState};

const TABLE: &str = "landing_pages";
const MAX_SLUG_LEN: usize = 80;

#[derive(Debug, Deserialize)]
pub struct CreateLandingPageRequest {
    pub slug: String,
    pub title: String,
    #[serde(default)]
    pub body: String,
    #[serde(default)]
    pub published: bool,
}

#[derive(Debug, Default, Deserialize)]
pub struct UpdateLandingPageRequest {
    pub title: Option<String>,
    pub body: Option<String>,
    pub published: Option<bool>,
}

/// POST /api/landing-pages
pub async fn create_landing_page(
    State(state): State<AppState>,
    Extension(session): Extension<AdminSession>,
    Json(req): Json<CreateLandingPageRequest>,
) -> ApiResult<(StatusCode, Json<LandingPage>)> {
    session.require_mutation()?;

    validate_slug(&req.slug)?;
    let title = req.title.trim();
    if title.is_empty() {
        return Err(ApiError::BadRequest("Title is required".to_string()));
    }

    let now = db_now();
    let page = LandingPage {
        id: new_id(),
        slug: req.slug,
        title: title.to_string(),
        body: req.body,
        published: req.published,
        created_at: now,
        updated_at: now,
    };

    let mut tx = state.db.begin().await?;
    sqlx::query(
        "INSERT INTO landing_pages (id, slug, title, body, published, created_at, updated_at)
         VALUES (?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(&page.id)
    .bind(&page.slug)
    .bind(&page.title)
    .bind(&page.body)
    .bind(page.published)
    .bind(db_timestamp(page.created_at))
    .bind(db_timestamp(page.updated_at))
    .execute(&mut *tx)
    .await?;

    let entry = AuditEntry::insert(TABLE, &page.id, session.id(), &page)?;
    audit::record(&mut tx, &entry, now).await?;
    tx.commit().await?;

    Ok((StatusCode::CREATED, Json(page)))
}

/// PATCH /api/landing-pages/:id
pub async fn update_landing_page(
    State(state): State<AppState>,
    Extension(session): Extension<AdminSession>,
    Path(id): Path<String>,
    Json(req): Json<UpdateLandingPageRequest>,
) -> ApiResult<Json<LandingPage>> {
    session.require_mutation()?;

    let mut tx = state.db.begin().await?;
    let before = sqlx::query_as::<_, LandingPage>(
        "SELECT id, slug, title, body, published, created_at, updated_at
         FROM landing_pages WHERE id = ?",
    )
    .bind(&id)
    .fetch_optional(&mut *tx)
    .await?
    .ok_or_else(|| ApiError::NotFound(format!("Landing page {}", id)))?;

    let mut after = before.clone();
    if let Some(title) = &req.title {
        let title = title.trim();
        if title.is_empty() {
            return Err(ApiError::BadRequest("Title cannot be empty".to_string()));
        }
        after.title = title.to_string();
    }
    if let Some(body) = req.body {
        after.body = body;
    }
    if let Some(published) = req.published {
        after.published = published;
    }
    after.updated_at = db_now();

    sqlx::query(
        "UPDATE landing_pages SET title = ?, body = ?, published = ?, updated_at = ? WHERE id = ?",
    )
    .bind(&after.title)
    .bind(&after.body)
    .bind(after.published)
    .bind(db_timestamp(after.updated_at))
    .bind(&id)
    .execute(&mut *tx)
    .await?;

    let entry = AuditEntry::update(TABLE, &id, session.id(), &before, &after)?;
    audit::record(&mut tx, &entry, after.updated_at).await?;
    tx.commit().await?;

    Ok(Json(after))
}

/// `[a-z0-9-]{1,80}` without a leading or trailing dash
fn validate_slug(slug: &str) -> ApiResult<()> {
    let valid = !slug.is_empty()
        && slug.len() <= MAX_SLUG_LEN
        && slug
            .bytes()
            .all(|b| b.is_ascii_lowercase() || b.is_ascii_digit() || b == b'-')
        && !slug.starts_with('-')
        && !slug.ends_with('-');

    if valid {
        Ok(())
    } else {
        Err(ApiError::BadRequest(format!("Invalid slug: {:?}", slug)))
    }
}
