//! Database initialization, migrations and default settings

use rentdesk_common::db::{
    get_schema_version, get_setting_i64, init_database, run_migrations, CURRENT_SCHEMA_VERSION,
};

#[tokio::test]
async fn test_database_creation_when_missing() {
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("sub").join("rentdesk.db");

    let result = init_database(&db_path).await;

    assert!(result.is_ok(), "Database initialization failed: {:?}", result.err());
    assert!(db_path.exists(), "Database file was not created");
}

#[tokio::test]
async fn test_database_opens_existing() {
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("rentdesk.db");

    let pool1 = init_database(&db_path).await.unwrap();
    sqlx::query("INSERT INTO settings (key, value) VALUES ('marker', '1')")
        .execute(&pool1)
        .await
        .unwrap();
    drop(pool1);

    let pool2 = init_database(&db_path).await.unwrap();
    assert_eq!(get_setting_i64(&pool2, "marker", 0).await.unwrap(), 1);
}

#[tokio::test]
async fn test_default_settings_initialized() {
    let dir = tempfile::tempdir().unwrap();
    let pool = init_database(&dir.path().join("rentdesk.db")).await.unwrap();

    assert_eq!(get_setting_i64(&pool, "maintenance_due_days", 0).await.unwrap(), 7);
    assert_eq!(get_setting_i64(&pool, "returns_due_days", 0).await.unwrap(), 3);
    assert_eq!(get_setting_i64(&pool, "not_a_setting", 42).await.unwrap(), 42);
}

#[tokio::test]
async fn test_null_setting_is_repaired() {
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("rentdesk.db");

    let pool = init_database(&db_path).await.unwrap();
    sqlx::query("UPDATE settings SET value = NULL WHERE key = 'returns_due_days'")
        .execute(&pool)
        .await
        .unwrap();
    drop(pool);

    let pool = init_database(&db_path).await.unwrap();
    assert_eq!(get_setting_i64(&pool, "returns_due_days", 0).await.unwrap(), 3);
}

#[tokio::test]
async fn test_migrations_idempotent() {
    let dir = tempfile::tempdir().unwrap();
    let pool = init_database(&dir.path().join("rentdesk.db")).await.unwrap();

    assert_eq!(get_schema_version(&pool).await.unwrap(), CURRENT_SCHEMA_VERSION);
    run_migrations(&pool).await.unwrap();
    assert_eq!(get_schema_version(&pool).await.unwrap(), CURRENT_SCHEMA_VERSION);
}

#[tokio::test]
async fn test_foreign_keys_enforced() {
    let dir = tempfile::tempdir().unwrap();
    let pool = init_database(&dir.path().join("rentdesk.db")).await.unwrap();

    let result = sqlx::query(
        "INSERT INTO cars (id, plate, catalog_id, status, mileage_km, created_at, updated_at)
         VALUES ('c1', 'X-1', 'missing', 'available', 0, '2024-01-01T00:00:00.000Z', '2024-01-01T00:00:00.000Z')",
    )
    .execute(&pool)
    .await;

    let err = result.expect_err("Dangling catalog_id must be rejected");
    assert!(err
        .as_database_error()
        .map(|e| e.is_foreign_key_violation())
        .unwrap_or(false));
}

#[tokio::test]
async fn test_check_constraints() {
    let dir = tempfile::tempdir().unwrap();
    let pool = init_database(&dir.path().join("rentdesk.db")).await.unwrap();

    let result = sqlx::query(
        "INSERT INTO admin_users (id, email, display_name, role, created_at)
         VALUES ('a1', 'x@y.z', 'X', 'owner', '2024-01-01T00:00:00.000Z')",
    )
    .execute(&pool)
    .await;

    assert!(result.is_err());
}

#[tokio::test]
async fn test_identifier_backfill_uses_rust_normalization() {
    let dir = tempfile::tempdir().unwrap();
    let pool = init_database(&dir.path().join("rentdesk.db")).await.unwrap();
    let ts = "2024-01-01T00:00:00.000Z";

    sqlx::query("INSERT INTO catalog (id, brand, model, seats, daily_rate, created_at) VALUES ('k1', 'Toyota', 'Yaris', 5, 1200, ?)")
        .bind(ts)
        .execute(&pool)
        .await
        .unwrap();
    sqlx::query(
        "INSERT INTO cars (id, plate, catalog_id, status, mileage_km, created_at, updated_at)
         VALUES ('c1', 'RDA-0001', 'k1', 'available', 0, ?1, ?1)",
    )
    .bind(ts)
    .execute(&pool)
    .await
    .unwrap();
    // A row written before the normalized column was populated
    sqlx::query(
        "INSERT INTO agreements
            (id, car_id, customer_name, customer_identifier, start_at, end_at, price, status, created_at, updated_at)
         VALUES ('a1', 'c1', 'Chen', 'b77\t-12.34', ?1, ?1, 1000, 'pending', ?1, ?1)",
    )
    .bind(ts)
    .execute(&pool)
    .await
    .unwrap();
    sqlx::query("DELETE FROM schema_version WHERE version >= 3")
        .execute(&pool)
        .await
        .unwrap();

    run_migrations(&pool).await.unwrap();

    let normalized: Option<String> = sqlx::query_scalar(
        "SELECT customer_identifier_normalized FROM agreements WHERE id = 'a1'",
    )
    .fetch_one(&pool)
    .await
    .unwrap();
    assert_eq!(normalized.as_deref(), Some("B771234"));
    assert_eq!(get_schema_version(&pool).await.unwrap(), CURRENT_SCHEMA_VERSION);
}
