//! Turf Booking Database Layer
//!
//! This crate provides storage for the reservation engine. It includes:
//!
//! - Connection pool management and migrations with sqlx
//! - PostgreSQL implementations of every port defined in turf-core
//! - An in-memory store with the same atomicity guarantees, used by tests
//!   and single-process deployments

pub mod memory;
pub mod pool;
pub mod repositories;

pub use memory::MemoryStore;
pub use pool::{create_pool, run_migrations};
pub use repositories::*;

// Re-export commonly used types
pub use sqlx::{PgPool, Postgres, Transaction};
pub use turf_core::{AppError, AppResult};
