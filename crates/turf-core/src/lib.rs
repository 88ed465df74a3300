//! Turf Booking Core Library
//!
//! This crate provides the foundational types, ports, and error handling
//! for the turf reservation engine. It includes:
//!
//! - Domain models (Resource, Reservation, PaymentRecord, Review)
//! - Storage and gateway ports implemented by `turf-db` and callers
//! - A closed error enumeration grouped by error kind
//! - Clock abstraction and application configuration

pub mod clock;
pub mod config;
pub mod error;
pub mod models;
pub mod traits;

pub use clock::{Clock, FixedClock, SystemClock};
pub use config::{AppConfig, BookingConfig};
pub use error::{AppError, ErrorKind};

/// Result type alias using AppError
pub type AppResult<T> = Result<T, AppError>;
