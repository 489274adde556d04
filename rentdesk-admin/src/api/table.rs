//! Read-only table browser with pagination and sorting
//!
//! Serves generic listing for every data table so the dashboard needs no
//! per-table list endpoints.

use axum::{
    extract::{Path, Query, State},
    Json,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use sqlx::sqlite::SqliteRow;
use sqlx::{Column, Row, ValueRef};

use crate::pagination::{calculate_pagination, default_page, PAGE_SIZE};
use crate::{ApiError, ApiResult, AppState};

/// Tables exposed by the browser. `settings` holds the signing secret and
/// is never listed.
pub const BROWSABLE_TABLES: &[&str] = &[
    "admin_users",
    "catalog",
    "cars",
    "agreements",
    "blacklist",
    "landing_pages",
    "site_events",
    "audit_logs",
];

/// Query parameters for table viewing
#[derive(Debug, Deserialize)]
pub struct TableQuery {
    #[serde(default = "default_page")]
    pub page: i64,

    /// Column to sort by
    pub sort: Option<String>,

    /// "asc" or "desc"
    #[serde(default = "default_order")]
    pub order: String,
}

fn default_order() -> String {
    "asc".to_string()
}

#[derive(Debug, Serialize)]
pub struct TableDataResponse {
    pub table_name: String,
    pub total_rows: i64,
    pub page: i64,
    pub page_size: i64,
    pub total_pages: i64,
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Value>>,
}

/// GET /api/table/:name
pub async fn get_table_data(
    State(state): State<AppState>,
    Path(table_name): Path<String>,
    Query(query): Query<TableQuery>,
) -> ApiResult<Json<TableDataResponse>> {
    // Names are interpolated into SQL below; only whitelisted tables pass
    if !BROWSABLE_TABLES.contains(&table_name.as_str()) {
        return Err(ApiError::BadRequest(format!("Invalid table name: {}", table_name)));
    }

    let total_rows: i64 = sqlx::query_scalar(&format!("SELECT COUNT(*) FROM {}", table_name))
        .fetch_one(&state.db)
        .await?;

    let p = calculate_pagination(total_rows, query.page);
    let columns = get_table_columns(&state, &table_name).await?;

    let mut sql = format!("SELECT * FROM {}", table_name);

    if let Some(sort_column) = &query.sort {
        if !columns.contains(sort_column) {
            return Err(ApiError::BadRequest(format!("Invalid column: {}", sort_column)));
        }

        let order = if query.order.eq_ignore_ascii_case("desc") {
            "DESC"
        } else {
            "ASC"
        };

        sql.push_str(&format!(" ORDER BY {} {}", sort_column, order));
    } else {
        sql.push_str(" ORDER BY rowid");
    }

    sql.push_str(&format!(" LIMIT {} OFFSET {}", PAGE_SIZE, p.offset));

    let rows = sqlx::query(&sql).fetch_all(&state.db).await?;

    let columns = match rows.first() {
        Some(first_row) => first_row
            .columns()
            .iter()
            .map(|col| col.name().to_string())
            .collect(),
        None => columns,
    };

    Ok(Json(TableDataResponse {
        table_name,
        total_rows,
        page: p.page,
        page_size: PAGE_SIZE,
        total_pages: p.total_pages,
        columns,
        rows: rows.iter().map(row_to_json).collect(),
    }))
}

/// Convert one SQLite row to a list of JSON scalars
fn row_to_json(row: &SqliteRow) -> Vec<Value> {
    (0..row.len())
        .map(|i| {
            let is_null = row.try_get_raw(i).map(|v| v.is_null()).unwrap_or(true);
            if is_null {
                return Value::Null;
            }
            row.try_get::<i64, _>(i)
                .map(|v| json!(v))
                .or_else(|_| row.try_get::<f64, _>(i).map(|v| json!(v)))
                .or_else(|_| row.try_get::<String, _>(i).map(Value::String))
                .unwrap_or(Value::Null)
        })
        .collect()
}

/// Column names for a table, in schema order
async fn get_table_columns(state: &AppState, table_name: &str) -> ApiResult<Vec<String>> {
    let rows = sqlx::query(&format!("PRAGMA table_info({})", table_name))
        .fetch_all(&state.db)
        .await?;

    // PRAGMA table_info returns: (cid, name, type, notnull, dflt_value, pk)
    Ok(rows.iter().map(|row| row.get::<String, _>(1)).collect())
}
