//! rentdesk-admin library - car-rental administration API
//!
//! JSON endpoints behind the admin dashboard: fleet, agreements, blacklist,
//! admin management, marketing pages, traffic analytics and revenue.

use axum::Router;
use rentdesk_common::config::DEFAULT_REQUEST_MAX_SKEW_MS;
use rentdesk_common::BusinessTz;
use sqlx::SqlitePool;

pub mod api;
pub mod db;
pub mod error;
pub mod pagination;

pub use error::{ApiError, ApiResult};

/// Application state shared across HTTP handlers
#[derive(Clone)]
pub struct AppState {
    /// Database connection pool
    pub db: SqlitePool,
    /// Request-signing secret; 0 disables signature checks
    pub shared_secret: i64,
    /// Timezone for revenue and traffic windows
    pub business_tz: BusinessTz,
    /// Accepted clock skew for signed requests
    pub max_skew_ms: i64,
}

impl AppState {
    /// Create new application state with the default business timezone
    pub fn new(db: SqlitePool, shared_secret: i64) -> Self {
        Self {
            db,
            shared_secret,
            business_tz: BusinessTz::default(),
            max_skew_ms: DEFAULT_REQUEST_MAX_SKEW_MS,
        }
    }

    pub fn with_business_tz(mut self, business_tz: BusinessTz) -> Self {
        self.business_tz = business_tz;
        self
    }

    pub fn with_max_skew_ms(mut self, max_skew_ms: i64) -> Self {
        self.max_skew_ms = max_skew_ms;
        self
    }
}

/// Build application router
///
/// Everything under `/api` passes the admin gate except event ingestion,
/// which the public site calls anonymously.
pub fn build_router(state: AppState) -> Router {
    use axum::middleware;
    use axum::routing::{delete, get, patch, post};
    use tower_http::cors::{Any, CorsLayer};
    use tower_http::trace::TraceLayer;

    let protected = Router::new()
        .route("/api/buildinfo", get(api::get_build_info))
        .route("/api/table/:name", get(api::get_table_data))
        .route("/api/admins", get(api::list_admins).post(api::create_admin))
        .route("/api/admins/:id", delete(api::delete_admin))
        .route("/api/admins/:id/role", patch(api::update_admin_role))
        .route("/api/catalog", post(api::create_catalog_entry))
        .route("/api/cars", post(api::create_car))
        .route("/api/cars/:id", patch(api::update_car).delete(api::retire_car))
        .route("/api/agreements", post(api::create_agreement))
        .route("/api/agreements/:id", patch(api::update_agreement))
        .route("/api/agreements/:id/cancel", post(api::cancel_agreement))
        .route("/api/blacklist", post(api::create_blacklist_entry))
        .route("/api/blacklist/check", get(api::check_blacklist))
        .route("/api/blacklist/:id", delete(api::delete_blacklist_entry))
        .route("/api/landing-pages", post(api::create_landing_page))
        .route("/api/landing-pages/:id", patch(api::update_landing_page))
        .route("/api/dashboard/revenue", get(api::revenue_summary))
        .route("/api/dashboard/revenue/series", get(api::revenue_series))
        .route("/api/analytics/traffic", get(api::traffic_series))
        .route("/api/audit-logs", get(api::list_audit_logs))
        .route("/api/filters/maintenance-due", get(api::maintenance_due))
        .route("/api/filters/returns-due", get(api::returns_due))
        .route("/api/search/agreements", get(api::search_agreements))
        .route("/api/search/cars", get(api::search_cars))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            api::auth_middleware,
        ));

    let public = Router::new()
        .route("/api/events", post(api::ingest_event))
        .merge(api::health_routes());

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .merge(protected)
        .merge(public)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
