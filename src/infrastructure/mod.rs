//! Infrastructure layer module
//!
//! Adapters and external integrations:
//! - Task stores (`SQLite` with sqlx, in-memory fallback)
//! - Configuration management
//! - Logging infrastructure
//! - Host metrics via sysinfo
//!
//! Infrastructure implementations satisfy the port traits defined in the domain layer.

pub mod config;
pub mod database;
pub mod logging;
pub mod system_metrics;

pub use database::DatabaseError;
pub use system_metrics::SystemMetricsSource;
