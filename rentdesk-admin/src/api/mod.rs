//! HTTP API handlers for rentdesk-admin

pub mod admins;
pub mod agreements;
pub mod analytics;
pub mod audit_logs;
pub mod auth;
pub mod blacklist;
pub mod buildinfo;
pub mod dashboard;
pub mod filters;
pub mod fleet;
pub mod health;
pub mod landing_pages;
pub mod search;
pub mod table;

pub use admins::{create_admin, delete_admin, list_admins, update_admin_role};
pub use agreements::{cancel_agreement, create_agreement, update_agreement};
pub use analytics::{ingest_event, traffic_series};
pub use audit_logs::list_audit_logs;
pub use auth::{auth_middleware, AdminSession};
pub use blacklist::{check_blacklist, create_blacklist_entry, delete_blacklist_entry};
pub use buildinfo::get_build_info;
pub use dashboard::{revenue_series, revenue_summary};
pub use filters::{maintenance_due, returns_due};
pub use fleet::{create_car, create_catalog_entry, retire_car, update_car};
pub use health::health_routes;
pub use landing_pages::{create_landing_page, update_landing_page};
pub use search::{search_agreements, search_cars};
pub use table::get_table_data;
