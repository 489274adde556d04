//! Audit log browsing

use axum::{
    extract::{Query, State},
    Json,
};
use rentdesk_common::audit::{self, AuditFilter};
use rentdesk_common::db::AuditLog;
use serde::Deserialize;

use crate::pagination::{calculate_pagination, default_page, Page, PAGE_SIZE};
use crate::{ApiResult, AppState};

#[derive(Debug, Deserialize)]
pub struct AuditLogQuery {
    pub table: Option<String>,
    pub record_id: Option<String>,
    #[serde(default = "default_page")]
    pub page: i64,
}

/// GET /api/audit-logs?table=&record_id=&page=
///
/// Newest first.
pub async fn list_audit_logs(
    State(state): State<AppState>,
    Query(query): Query<AuditLogQuery>,
) -> ApiResult<Json<Page<AuditLog>>> {
    let filter = AuditFilter {
        table_name: query.table.filter(|t| !t.is_empty()),
        record_id: query.record_id.filter(|r| !r.is_empty()),
    };

    let total = audit::count(&state.db, &filter).await?;
    let p = calculate_pagination(total, query.page);
    let rows = audit::list(&state.db, &filter, PAGE_SIZE, p.offset).await?;

    Ok(Json(Page::new(total, p, rows)))
}
