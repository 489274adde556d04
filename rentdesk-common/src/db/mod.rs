//! Database models, schema and helpers

pub mod init;
pub mod migrations;
pub mod models;

pub use init::*;
pub use migrations::*;
pub use models::*;

use chrono::{DateTime, SecondsFormat, SubsecRound, Utc};

/// Canonical timestamp text stored in every TEXT timestamp column.
///
/// Fixed width and `Z`-suffixed so string comparison in SQL orders
/// chronologically.
pub fn db_timestamp(instant: DateTime<Utc>) -> String {
    instant.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Current instant at the precision stored in the database
pub fn db_now() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(3)
}

/// Fresh row identifier
pub fn new_id() -> String {
    uuid::Uuid::new_v4().to_string()
}
