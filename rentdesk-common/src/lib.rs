//! # RentDesk Common Library
//!
//! Shared code for the RentDesk administration service:
//! - Database models, schema and migrations
//! - Configuration resolution
//! - Business timezone windows
//! - Revenue aggregation
//! - Blacklist matching
//! - Audit log and signed admin identity

pub mod api;
pub mod audit;
pub mod blacklist;
pub mod business_time;
pub mod config;
pub mod db;
pub mod error;
pub mod revenue;

pub use business_time::{BusinessTz, Period};
pub use error::{Error, Result};
