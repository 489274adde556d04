//! Database access layer for rentdesk-admin
//!
//! Row loaders shared by several handlers, plus first-run bootstrap.

use rentdesk_common::audit::{self, AuditEntry};
use rentdesk_common::db::{db_now, db_timestamp, new_id, AdminUser, Agreement, Car, Role};
use rentdesk_common::{Error, Result};
use sqlx::{SqliteExecutor, SqlitePool};
use tracing::info;

pub use rentdesk_common::db::init_database;

/// Actor recorded in the audit log for command-line bootstrap
pub const BOOTSTRAP_ACTOR: &str = "bootstrap";

pub async fn load_admin<'e>(exec: impl SqliteExecutor<'e>, id: &str) -> Result<Option<AdminUser>> {
    let admin = sqlx::query_as::<_, AdminUser>(
        "SELECT id, email, display_name, role, created_at FROM admin_users WHERE id = ?",
    )
    .bind(id)
    .fetch_optional(exec)
    .await?;

    Ok(admin)
}

pub async fn load_car<'e>(exec: impl SqliteExecutor<'e>, id: &str) -> Result<Option<Car>> {
    let car = sqlx::query_as::<_, Car>(
        "SELECT id, plate, catalog_id, status, mileage_km, next_maintenance_at, created_at, updated_at
         FROM cars WHERE id = ?",
    )
    .bind(id)
    .fetch_optional(exec)
    .await?;

    Ok(car)
}

pub async fn load_agreement<'e>(exec: impl SqliteExecutor<'e>, id: &str) -> Result<Option<Agreement>> {
    let agreement = sqlx::query_as::<_, Agreement>(
        "SELECT id, car_id, customer_name, customer_identifier, customer_phone,
                start_at, end_at, price, status, created_at, updated_at
         FROM agreements WHERE id = ?",
    )
    .bind(id)
    .fetch_optional(exec)
    .await?;

    Ok(agreement)
}

pub async fn catalog_exists<'e>(exec: impl SqliteExecutor<'e>, id: &str) -> Result<bool> {
    let exists: bool = sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM catalog WHERE id = ?)")
        .bind(id)
        .fetch_one(exec)
        .await?;

    Ok(exists)
}

/// Create a superadmin from the command line.
///
/// The admin gate needs at least one admin row before anyone can sign in,
/// so this path bypasses it.
pub async fn bootstrap_superadmin(
    pool: &SqlitePool,
    email: &str,
    display_name: &str,
) -> Result<AdminUser> {
    let email = email.trim().to_ascii_lowercase();
    if !email.contains('@') {
        return Err(Error::InvalidInput(format!("Invalid email: {}", email)));
    }
    if display_name.trim().is_empty() {
        return Err(Error::InvalidInput("Display name is required".to_string()));
    }

    let admin = AdminUser {
        id: new_id(),
        email,
        display_name: display_name.trim().to_string(),
        role: Role::Superadmin,
        created_at: db_now(),
    };

    let mut tx = pool.begin().await?;
    sqlx::query(
        "INSERT INTO admin_users (id, email, display_name, role, created_at) VALUES (?, ?, ?, ?, ?)",
    )
    .bind(&admin.id)
    .bind(&admin.email)
    .bind(&admin.display_name)
    .bind(admin.role)
    .bind(db_timestamp(admin.created_at))
    .execute(&mut *tx)
    .await?;

    let entry = AuditEntry::insert("admin_users", &admin.id, BOOTSTRAP_ACTOR, &admin)?;
    audit::record(&mut tx, &entry, admin.created_at).await?;
    tx.commit().await?;

    info!("Created superadmin {} ({})", admin.email, admin.id);
    Ok(admin)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_bootstrap_superadmin() {
        let dir = tempfile::tempdir().unwrap();
        let pool = init_database(&dir.path().join("test.db")).await.unwrap();

        let admin = bootstrap_superadmin(&pool, " Owner@Example.com ", "Owner").await.unwrap();
        assert_eq!(admin.email, "owner@example.com");
        assert_eq!(admin.role, Role::Superadmin);

        let loaded = load_admin(&pool, &admin.id).await.unwrap().unwrap();
        assert_eq!(loaded.role, Role::Superadmin);

        let audit_rows: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM audit_logs WHERE record_id = ?")
            .bind(&admin.id)
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(audit_rows, 1);
    }

    #[tokio::test]
    async fn test_bootstrap_rejects_bad_email() {
        let dir = tempfile::tempdir().unwrap();
        let pool = init_database(&dir.path().join("test.db")).await.unwrap();

        let result = bootstrap_superadmin(&pool, "not-an-email", "Owner").await;
        assert!(matches!(result, Err(Error::InvalidInput(_))));
    }
}
