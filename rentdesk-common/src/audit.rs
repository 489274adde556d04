//! Append-only audit log
//!
//! Every mutation writes one row with the before/after JSON snapshot of the
//! affected record, inside the same transaction as the mutation itself.

use crate::db::models::{AuditAction, AuditLog};
use crate::db::{db_timestamp, new_id};
use crate::revenue::{price_adjustments_from_logs, PriceAdjustment, AGREEMENTS_TABLE};
use crate::Result;
use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::{SqliteConnection, SqlitePool};

/// One audit row to append
#[derive(Debug, Clone)]
pub struct AuditEntry {
    pub table_name: &'static str,
    pub record_id: String,
    pub action: AuditAction,
    pub actor_id: Option<String>,
    pub before: Option<serde_json::Value>,
    pub after: Option<serde_json::Value>,
}

impl AuditEntry {
    pub fn insert<T: Serialize>(
        table_name: &'static str,
        record_id: &str,
        actor_id: &str,
        after: &T,
    ) -> Result<Self> {
        Ok(Self {
            table_name,
            record_id: record_id.to_string(),
            action: AuditAction::Insert,
            actor_id: Some(actor_id.to_string()),
            before: None,
            after: Some(serde_json::to_value(after)?),
        })
    }

    pub fn update<T: Serialize>(
        table_name: &'static str,
        record_id: &str,
        actor_id: &str,
        before: &T,
        after: &T,
    ) -> Result<Self> {
        Ok(Self {
            table_name,
            record_id: record_id.to_string(),
            action: AuditAction::Update,
            actor_id: Some(actor_id.to_string()),
            before: Some(serde_json::to_value(before)?),
            after: Some(serde_json::to_value(after)?),
        })
    }

    pub fn delete<T: Serialize>(
        table_name: &'static str,
        record_id: &str,
        actor_id: &str,
        before: &T,
    ) -> Result<Self> {
        Ok(Self {
            table_name,
            record_id: record_id.to_string(),
            action: AuditAction::Delete,
            actor_id: Some(actor_id.to_string()),
            before: Some(serde_json::to_value(before)?),
            after: None,
        })
    }
}

/// Append `entry`; pass `&mut *tx` to join the caller's transaction
pub async fn record(
    conn: &mut SqliteConnection,
    entry: &AuditEntry,
    at: DateTime<Utc>,
) -> Result<String> {
    let id = new_id();
    let before = entry.before.as_ref().map(|v| v.to_string());
    let after = entry.after.as_ref().map(|v| v.to_string());

    sqlx::query(
        r#"
        INSERT INTO audit_logs
            (id, table_name, record_id, action, actor_id, before_json, after_json, created_at)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&id)
    .bind(entry.table_name)
    .bind(&entry.record_id)
    .bind(entry.action)
    .bind(&entry.actor_id)
    .bind(before)
    .bind(after)
    .bind(db_timestamp(at))
    .execute(&mut *conn)
    .await?;

    tracing::debug!(
        table = entry.table_name,
        record_id = %entry.record_id,
        action = ?entry.action,
        "Audit row recorded"
    );

    Ok(id)
}

/// Optional filters for listing audit rows
#[derive(Debug, Clone, Default)]
pub struct AuditFilter {
    pub table_name: Option<String>,
    pub record_id: Option<String>,
}

/// Count rows matching `filter`
pub async fn count(pool: &SqlitePool, filter: &AuditFilter) -> Result<i64> {
    let total: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM audit_logs
         WHERE (?1 IS NULL OR table_name = ?1) AND (?2 IS NULL OR record_id = ?2)",
    )
    .bind(&filter.table_name)
    .bind(&filter.record_id)
    .fetch_one(pool)
    .await?;

    Ok(total)
}

/// Rows matching `filter`, newest first
pub async fn list(
    pool: &SqlitePool,
    filter: &AuditFilter,
    limit: i64,
    offset: i64,
) -> Result<Vec<AuditLog>> {
    let rows = sqlx::query_as::<_, AuditLog>(
        "SELECT id, table_name, record_id, action, actor_id, before_json, after_json, created_at
         FROM audit_logs
         WHERE (?1 IS NULL OR table_name = ?1) AND (?2 IS NULL OR record_id = ?2)
         ORDER BY created_at DESC, rowid DESC
         LIMIT ?3 OFFSET ?4",
    )
    .bind(&filter.table_name)
    .bind(&filter.record_id)
    .bind(limit)
    .bind(offset)
    .fetch_all(pool)
    .await?;

    Ok(rows)
}

/// Price changes recorded on agreements
pub async fn load_price_adjustments(pool: &SqlitePool) -> Result<Vec<PriceAdjustment>> {
    let logs = sqlx::query_as::<_, AuditLog>(
        "SELECT id, table_name, record_id, action, actor_id, before_json, after_json, created_at
         FROM audit_logs
         WHERE table_name = ? AND action = 'update'
         ORDER BY created_at",
    )
    .bind(AGREEMENTS_TABLE)
    .fetch_all(pool)
    .await?;

    Ok(price_adjustments_from_logs(&logs))
}
