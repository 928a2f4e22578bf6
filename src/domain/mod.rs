//! Domain layer for the orchestration core
//!
//! This module contains core business logic, domain models and the port
//! traits implemented by infrastructure adapters.

pub mod errors;
pub mod models;
pub mod ports;

pub use errors::{DomainError, DomainResult};
