//! Database schema migrations
//!
//! Versioned, idempotent schema upgrades tracked in `schema_version`.
//!
//! # Migration Guidelines
//!
//! 1. **Never modify existing migrations** - databases in the field already ran them
//! 2. **Always add new migrations** - one function per schema change
//! 3. **Check before altering** - every step must be safe to run twice
//! 4. **Use ALTER TABLE** - prefer it over DROP/CREATE to preserve data

use crate::blacklist::normalize_identifier;
use crate::Result;
use sqlx::SqlitePool;
use tracing::{info, warn};

/// Current schema version
///
/// **IMPORTANT:** Increment this when adding new migrations
pub const CURRENT_SCHEMA_VERSION: i32 = 3;

/// Get current schema version from database
///
/// Returns 0 if schema_version table doesn't exist or has no rows
pub async fn get_schema_version(pool: &SqlitePool) -> Result<i32> {
    let table_exists: bool = sqlx::query_scalar(
        r#"
        SELECT EXISTS(
            SELECT 1 FROM sqlite_master
            WHERE type='table' AND name='schema_version'
        )
        "#,
    )
    .fetch_one(pool)
    .await?;

    if !table_exists {
        return Ok(0);
    }

    let version: Option<i32> =
        sqlx::query_scalar("SELECT version FROM schema_version ORDER BY version DESC LIMIT 1")
            .fetch_optional(pool)
            .await?;

    Ok(version.unwrap_or(0))
}

async fn set_schema_version(pool: &SqlitePool, version: i32) -> Result<()> {
    sqlx::query("INSERT OR IGNORE INTO schema_version (version) VALUES (?)")
        .bind(version)
        .execute(pool)
        .await?;

    Ok(())
}

/// Run all pending migrations
pub async fn run_migrations(pool: &SqlitePool) -> Result<()> {
    let current_version = get_schema_version(pool).await?;

    if current_version == CURRENT_SCHEMA_VERSION {
        info!("Database schema is up to date (v{})", current_version);
        return Ok(());
    }

    if current_version > CURRENT_SCHEMA_VERSION {
        warn!(
            "Database schema version ({}) is newer than code version ({})",
            current_version, CURRENT_SCHEMA_VERSION
        );
        return Ok(());
    }

    info!(
        "Running database migrations: v{} -> v{}",
        current_version, CURRENT_SCHEMA_VERSION
    );

    if current_version < 1 {
        migrate_v1(pool).await?;
        set_schema_version(pool, 1).await?;
        info!("✓ Migration v1 completed");
    }

    if current_version < 2 {
        migrate_v2(pool).await?;
        set_schema_version(pool, 2).await?;
        info!("✓ Migration v2 completed");
    }

    if current_version < 3 {
        migrate_v3(pool).await?;
        set_schema_version(pool, 3).await?;
        info!("✓ Migration v3 completed");
    }

    Ok(())
}

/// Migration v1: indexes for dashboard and audit queries
async fn migrate_v1(pool: &SqlitePool) -> Result<()> {
    for statement in [
        "CREATE INDEX IF NOT EXISTS idx_agreements_created_at ON agreements(created_at)",
        "CREATE INDEX IF NOT EXISTS idx_agreements_end_at ON agreements(end_at)",
        "CREATE INDEX IF NOT EXISTS idx_audit_logs_record ON audit_logs(table_name, record_id)",
        "CREATE INDEX IF NOT EXISTS idx_audit_logs_created_at ON audit_logs(created_at)",
        "CREATE INDEX IF NOT EXISTS idx_site_events_occurred_at ON site_events(occurred_at)",
    ] {
        sqlx::query(statement).execute(pool).await?;
    }

    info!("Migration v1: Created dashboard indexes");
    Ok(())
}

/// Migration v2: add `customer_phone` to agreements created before it existed
async fn migrate_v2(pool: &SqlitePool) -> Result<()> {
    let has_column: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM pragma_table_info('agreements') WHERE name = 'customer_phone'",
    )
    .fetch_one(pool)
    .await?;

    if has_column == 0 {
        sqlx::query("ALTER TABLE agreements ADD COLUMN customer_phone TEXT")
            .execute(pool)
            .await?;
        info!("Migration v2: Added customer_phone to agreements table");
    }

    Ok(())
}

/// Migration v3: store the normalized customer identifier for search
///
/// Backfilled in Rust so existing rows use exactly `normalize_identifier`.
async fn migrate_v3(pool: &SqlitePool) -> Result<()> {
    let has_column: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM pragma_table_info('agreements') WHERE name = 'customer_identifier_normalized'",
    )
    .fetch_one(pool)
    .await?;

    if has_column == 0 {
        sqlx::query("ALTER TABLE agreements ADD COLUMN customer_identifier_normalized TEXT")
            .execute(pool)
            .await?;
        info!("Migration v3: Added customer_identifier_normalized to agreements table");
    }

    let pending: Vec<(String, String)> = sqlx::query_as(
        "SELECT id, customer_identifier FROM agreements WHERE customer_identifier_normalized IS NULL",
    )
    .fetch_all(pool)
    .await?;

    let mut tx = pool.begin().await?;
    for (id, identifier) in &pending {
        sqlx::query("UPDATE agreements SET customer_identifier_normalized = ? WHERE id = ?")
            .bind(normalize_identifier(identifier))
            .bind(id)
            .execute(&mut *tx)
            .await?;
    }
    tx.commit().await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_agreements_identifier_normalized
         ON agreements(customer_identifier_normalized)",
    )
    .execute(pool)
    .await?;

    if !pending.is_empty() {
        info!("Migration v3: Normalized {} customer identifiers", pending.len());
    }
    Ok(())
}
