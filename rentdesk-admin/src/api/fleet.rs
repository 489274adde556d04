//! Vehicle catalog and fleet
//!
//! Every car references an existing catalog row. Cars are never hard
//! deleted; `DELETE /api/cars/:id` retires them.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Extension, Json,
};
use chrono::{DateTime, Utc};
use rentdesk_common::audit::{self, AuditEntry};
use rentdesk_common::db::{db_now, db_timestamp, new_id, Car, CarStatus, CatalogEntry};
use serde::{Deserialize, Deserializer};
use sqlx::SqliteConnection;
use tracing::info;

use super::auth::AdminSession;
use crate::{db, ApiError, ApiResult, AppState};

#[derive(Debug, Deserialize)]
pub struct CreateCatalogRequest {
    pub brand: String,
    pub model: String,
    pub seats: i64,
    pub daily_rate: i64,
}

#[derive(Debug, Deserialize)]
pub struct CreateCarRequest {
    pub plate: String,
    pub catalog_id: String,
    #[serde(default)]
    pub status: Option<CarStatus>,
    #[serde(default)]
    pub mileage_km: i64,
    #[serde(default)]
    pub next_maintenance_at: Option<DateTime<Utc>>,
}

/// Partial car update; absent fields are left alone
#[derive(Debug, Default, Deserialize)]
pub struct UpdateCarRequest {
    pub plate: Option<String>,
    pub catalog_id: Option<String>,
    pub status: Option<CarStatus>,
    pub mileage_km: Option<i64>,
    /// `null` clears the schedule
    #[serde(default, deserialize_with = "deserialize_some")]
    pub next_maintenance_at: Option<Option<DateTime<Utc>>>,
}

/// Distinguish an explicit `null` from an absent field
fn deserialize_some<'de, T, D>(deserializer: D) -> Result<Option<T>, D::Error>
where
    T: Deserialize<'de>,
    D: Deserializer<'de>,
{
    Deserialize::deserialize(deserializer).map(Some)
}

/// POST /api/catalog
pub async fn create_catalog_entry(
    State(state): State<AppState>,
    Extension(session): Extension<AdminSession>,
    Json(req): Json<CreateCatalogRequest>,
) -> ApiResult<(StatusCode, Json<CatalogEntry>)> {
    session.require_mutation()?;

    let brand = req.brand.trim();
    let model = req.model.trim();
    if brand.is_empty() || model.is_empty() {
        return Err(ApiError::BadRequest("Brand and model are required".to_string()));
    }
    if req.seats <= 0 {
        return Err(ApiError::BadRequest(format!("Seats must be positive, got {}", req.seats)));
    }
    if req.daily_rate < 0 {
        return Err(ApiError::BadRequest(format!(
            "Daily rate cannot be negative, got {}",
            req.daily_rate
        )));
    }

    let entry = CatalogEntry {
        id: new_id(),
        brand: brand.to_string(),
        model: model.to_string(),
        seats: req.seats,
        daily_rate: req.daily_rate,
        created_at: db_now(),
    };

    let mut tx = state.db.begin().await?;
    sqlx::query(
        "INSERT INTO catalog (id, brand, model, seats, daily_rate, created_at) VALUES (?, ?, ?, ?, ?, ?)",
    )
    .bind(&entry.id)
    .bind(&entry.brand)
    .bind(&entry.model)
    .bind(entry.seats)
    .bind(entry.daily_rate)
    .bind(db_timestamp(entry.created_at))
    .execute(&mut *tx)
    .await?;

    let audit_entry = AuditEntry::insert("catalog", &entry.id, session.id(), &entry)?;
    audit::record(&mut tx, &audit_entry, entry.created_at).await?;
    tx.commit().await?;

    info!("Catalog entry {} {} created ({})", entry.brand, entry.model, entry.id);
    Ok((StatusCode::CREATED, Json(entry)))
}

/// POST /api/cars
pub async fn create_car(
    State(state): State<AppState>,
    Extension(session): Extension<AdminSession>,
    Json(req): Json<CreateCarRequest>,
) -> ApiResult<(StatusCode, Json<Car>)> {
    session.require_mutation()?;

    let plate = normalize_plate(&req.plate)?;
    let status = req.status.unwrap_or(CarStatus::Available);
    if status == CarStatus::Retired {
        return Err(ApiError::BadRequest("A new car cannot be retired".to_string()));
    }
    if req.mileage_km < 0 {
        return Err(ApiError::BadRequest("Mileage cannot be negative".to_string()));
    }

    let mut tx = state.db.begin().await?;
    require_catalog(&mut tx, &req.catalog_id).await?;

    let now = db_now();
    let car = Car {
        id: new_id(),
        plate,
        catalog_id: req.catalog_id,
        status,
        mileage_km: req.mileage_km,
        next_maintenance_at: req.next_maintenance_at,
        created_at: now,
        updated_at: now,
    };

    sqlx::query(
        r#"
        INSERT INTO cars
            (id, plate, catalog_id, status, mileage_km, next_maintenance_at, created_at, updated_at)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&car.id)
    .bind(&car.plate)
    .bind(&car.catalog_id)
    .bind(car.status)
    .bind(car.mileage_km)
    .bind(car.next_maintenance_at.map(db_timestamp))
    .bind(db_timestamp(car.created_at))
    .bind(db_timestamp(car.updated_at))
    .execute(&mut *tx)
    .await?;

    let entry = AuditEntry::insert("cars", &car.id, session.id(), &car)?;
    audit::record(&mut tx, &entry, now).await?;
    tx.commit().await?;

    info!("Car {} added to fleet ({})", car.plate, car.id);
    Ok((StatusCode::CREATED, Json(car)))
}

/// PATCH /api/cars/:id
pub async fn update_car(
    State(state): State<AppState>,
    Extension(session): Extension<AdminSession>,
    Path(id): Path<String>,
    Json(req): Json<UpdateCarRequest>,
) -> ApiResult<Json<Car>> {
    session.require_mutation()?;

    let mut tx = state.db.begin().await?;
    let before = db::load_car(&mut *tx, &id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("Car {}", id)))?;

    if before.status == CarStatus::Retired {
        return Err(ApiError::Conflict(format!("Car {} is retired", before.plate)));
    }

    let mut after = before.clone();
    if let Some(plate) = &req.plate {
        after.plate = normalize_plate(plate)?;
    }
    if let Some(catalog_id) = req.catalog_id {
        if catalog_id != before.catalog_id {
            require_catalog(&mut tx, &catalog_id).await?;
        }
        after.catalog_id = catalog_id;
    }
    if let Some(status) = req.status {
        if status == CarStatus::Retired {
            return Err(ApiError::BadRequest(
                "Use DELETE /api/cars/:id to retire a car".to_string(),
            ));
        }
        after.status = status;
    }
    if let Some(mileage_km) = req.mileage_km {
        if mileage_km < before.mileage_km {
            return Err(ApiError::BadRequest(format!(
                "Mileage cannot decrease ({} -> {})",
                before.mileage_km, mileage_km
            )));
        }
        after.mileage_km = mileage_km;
    }
    if let Some(next_maintenance_at) = req.next_maintenance_at {
        after.next_maintenance_at = next_maintenance_at;
    }
    after.updated_at = db_now();

    write_car(&mut tx, &after).await?;

    let entry = AuditEntry::update("cars", &id, session.id(), &before, &after)?;
    audit::record(&mut tx, &entry, after.updated_at).await?;
    tx.commit().await?;

    Ok(Json(after))
}

/// DELETE /api/cars/:id
///
/// Soft delete: the row stays so agreements keep their reference.
pub async fn retire_car(
    State(state): State<AppState>,
    Extension(session): Extension<AdminSession>,
    Path(id): Path<String>,
) -> ApiResult<Json<Car>> {
    session.require_mutation()?;

    let mut tx = state.db.begin().await?;
    let before = db::load_car(&mut *tx, &id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("Car {}", id)))?;

    if before.status == CarStatus::Retired {
        return Err(ApiError::Conflict(format!("Car {} is already retired", before.plate)));
    }

    let now = db_now();
    let open_agreements: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM agreements
         WHERE car_id = ? AND status IN ('pending', 'confirmed', 'active') AND end_at >= ?",
    )
    .bind(&id)
    .bind(db_timestamp(now))
    .fetch_one(&mut *tx)
    .await?;
    if open_agreements > 0 {
        return Err(ApiError::Conflict(format!(
            "Car {} has {} open agreement(s)",
            before.plate, open_agreements
        )));
    }

    let after = Car {
        status: CarStatus::Retired,
        updated_at: now,
        ..before.clone()
    };
    write_car(&mut tx, &after).await?;

    let entry = AuditEntry::update("cars", &id, session.id(), &before, &after)?;
    audit::record(&mut tx, &entry, now).await?;
    tx.commit().await?;

    info!("{} retired car {}", session.id(), after.plate);
    Ok(Json(after))
}

async fn write_car(conn: &mut SqliteConnection, car: &Car) -> ApiResult<()> {
    sqlx::query(
        r#"
        UPDATE cars
        SET plate = ?, catalog_id = ?, status = ?, mileage_km = ?,
            next_maintenance_at = ?, updated_at = ?
        WHERE id = ?
        "#,
    )
    .bind(&car.plate)
    .bind(&car.catalog_id)
    .bind(car.status)
    .bind(car.mileage_km)
    .bind(car.next_maintenance_at.map(db_timestamp))
    .bind(db_timestamp(car.updated_at))
    .bind(&car.id)
    .execute(conn)
    .await?;

    Ok(())
}

/// A car may only point at an existing catalog row
async fn require_catalog(conn: &mut SqliteConnection, catalog_id: &str) -> ApiResult<()> {
    if db::catalog_exists(conn, catalog_id).await? {
        Ok(())
    } else {
        Err(ApiError::BadRequest(format!("Unknown catalog id: {}", catalog_id)))
    }
}

/// Plates are stored trimmed and uppercase
fn normalize_plate(raw: &str) -> ApiResult<String> {
    let plate: String = raw.trim().to_uppercase();
    if plate.is_empty() {
        return Err(ApiError::BadRequest("Plate is required".to_string()));
    }
    Ok(plate)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_plate() {
        assert_eq!(normalize_plate("  abc-1234 ").unwrap(), "ABC-1234");
        assert!(normalize_plate("   ").is_err());
    }

    #[test]
    fn test_update_request_null_vs_absent() {
        let absent: UpdateCarRequest = serde_json::from_str(r#"{"mileage_km": 10}"#).unwrap();
        assert!(absent.next_maintenance_at.is_none());

        let cleared: UpdateCarRequest =
            serde_json::from_str(r#"{"next_maintenance_at": null}"#).unwrap();
        assert_eq!(cleared.next_maintenance_at, Some(None));

        let set: UpdateCarRequest =
            serde_json::from_str(r#"{"next_maintenance_at": "2024-05-01T00:00:00Z"}"#).unwrap();
        assert!(matches!(set.next_maintenance_at, Some(Some(_))));
    }
}
