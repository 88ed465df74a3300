//! Unified error handling for the reservation engine
//!
//! Every failure the engine can report is a variant of [`AppError`]. Variants
//! are grouped into a small set of [`ErrorKind`]s so callers (an HTTP layer,
//! a CLI, a job runner) can decide on retry and presentation without matching
//! every variant.

use crate::models::ReservationStatus;
use chrono::{NaiveDate, NaiveTime};
use std::fmt;
use thiserror::Error;
use uuid::Uuid;

/// Coarse classification of [`AppError`] variants
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Request values are malformed or out of range
    Validation,
    /// The request collides with existing state
    Conflict,
    /// A referenced entity does not exist (or is not bookable)
    NotFound,
    /// The caller does not own the entity
    Authorization,
    /// The entity is in a state that forbids the operation
    State,
    /// The payment gateway failed or timed out
    External,
    /// Storage, configuration or other infrastructure failure
    Internal,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorKind::Validation => write!(f, "VALIDATION"),
            ErrorKind::Conflict => write!(f, "CONFLICT"),
            ErrorKind::NotFound => write!(f, "NOT_FOUND"),
            ErrorKind::Authorization => write!(f, "AUTHORIZATION"),
            ErrorKind::State => write!(f, "STATE"),
            ErrorKind::External => write!(f, "EXTERNAL"),
            ErrorKind::Internal => write!(f, "INTERNAL"),
        }
    }
}

/// Main application error type
///
/// All errors in the engine are converted to this type.
#[derive(Error, Debug)]
pub enum AppError {
    // ==================== Validation Errors ====================
    #[error("Cannot book for past date {0}")]
    InvalidDate(NaiveDate),

    #[error("Invalid time slot: start {start} must be before end {end}")]
    InvalidInterval { start: NaiveTime, end: NaiveTime },

    #[error("Booking {start}-{end} is outside operating hours {opening}-{closing}")]
    OutsideOperatingHours {
        start: NaiveTime,
        end: NaiveTime,
        opening: NaiveTime,
        closing: NaiveTime,
    },

    #[error("Rating must be between 1 and 5, got {0}")]
    InvalidRating(i32),

    #[error("Validation error: {0}")]
    Validation(String),

    // ==================== Conflict Errors ====================
    #[error("Time slot {start}-{end} on {date} is already booked")]
    SlotTaken {
        date: NaiveDate,
        start: NaiveTime,
        end: NaiveTime,
    },

    #[error("Requester {requester_id} has already reviewed resource {resource_id}")]
    DuplicateReview { requester_id: i64, resource_id: i64 },

    // ==================== Not Found Errors ====================
    #[error("Resource {0} does not exist or is not active")]
    ResourceUnavailable(i64),

    #[error("Reservation not found: {0}")]
    ReservationNotFound(Uuid),

    #[error("Review not found: {0}")]
    ReviewNotFound(Uuid),

    #[error("Payment record not found: {0}")]
    PaymentNotFound(Uuid),

    // ==================== Authorization Errors ====================
    #[error("Requester {requester_id} does not own {entity}")]
    NotOwner { requester_id: i64, entity: String },

    // ==================== State Errors ====================
    #[error("Illegal transition from {from} to {to}")]
    IllegalTransition {
        from: ReservationStatus,
        to: ReservationStatus,
    },

    #[error("Reservation {0} is already confirmed")]
    AlreadyConfirmed(Uuid),

    #[error("Reservation {id} is already {status}")]
    AlreadyTerminal { id: Uuid, status: ReservationStatus },

    #[error("Cannot cancel reservation less than {window_minutes} minutes before start time")]
    CancellationWindowClosed { window_minutes: i64 },

    #[error("Not eligible to review: {0}")]
    NotEligible(String),

    // ==================== External Service Errors ====================
    #[error("Payment gateway error: {0}")]
    Gateway(String),

    #[error("Payment gateway timed out after {0}s")]
    GatewayTimeout(u64),

    // ==================== Internal Errors ====================
    #[error("Database error: {0}")]
    Database(String),

    #[error("Database pool error: {0}")]
    Pool(String),

    #[error("Transaction failed: {0}")]
    Transaction(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    /// Returns the kind this error belongs to
    pub fn kind(&self) -> ErrorKind {
        match self {
            AppError::InvalidDate(_)
            | AppError::InvalidInterval { .. }
            | AppError::OutsideOperatingHours { .. }
            | AppError::InvalidRating(_)
            | AppError::Validation(_) => ErrorKind::Validation,

            AppError::SlotTaken { .. } | AppError::DuplicateReview { .. } => ErrorKind::Conflict,

            AppError::ResourceUnavailable(_)
            | AppError::ReservationNotFound(_)
            | AppError::ReviewNotFound(_)
            | AppError::PaymentNotFound(_) => ErrorKind::NotFound,

            AppError::NotOwner { .. } => ErrorKind::Authorization,

            AppError::IllegalTransition { .. }
            | AppError::AlreadyConfirmed(_)
            | AppError::AlreadyTerminal { .. }
            | AppError::CancellationWindowClosed { .. }
            | AppError::NotEligible(_) => ErrorKind::State,

            AppError::Gateway(_) | AppError::GatewayTimeout(_) => ErrorKind::External,

            AppError::Database(_)
            | AppError::Pool(_)
            | AppError::Transaction(_)
            | AppError::Config(_)
            | AppError::Serialization(_)
            | AppError::Internal(_) => ErrorKind::Internal,
        }
    }

    /// Returns the stable error code for API responses
    pub fn error_code(&self) -> &'static str {
        match self {
            AppError::InvalidDate(_) => "invalid_date",
            AppError::InvalidInterval { .. } => "invalid_interval",
            AppError::OutsideOperatingHours { .. } => "outside_operating_hours",
            AppError::InvalidRating(_) => "invalid_rating",
            AppError::Validation(_) => "validation_error",
            AppError::SlotTaken { .. } => "slot_taken",
            AppError::DuplicateReview { .. } => "duplicate_review",
            AppError::ResourceUnavailable(_) => "resource_unavailable",
            AppError::ReservationNotFound(_) => "reservation_not_found",
            AppError::ReviewNotFound(_) => "review_not_found",
            AppError::PaymentNotFound(_) => "payment_not_found",
            AppError::NotOwner { .. } => "not_owner",
            AppError::IllegalTransition { .. } => "illegal_transition",
            AppError::AlreadyConfirmed(_) => "already_confirmed",
            AppError::AlreadyTerminal { .. } => "already_terminal",
            AppError::CancellationWindowClosed { .. } => "cancellation_window_closed",
            AppError::NotEligible(_) => "not_eligible",
            AppError::Gateway(_) => "gateway_error",
            AppError::GatewayTimeout(_) => "gateway_timeout",
            AppError::Database(_) => "database_error",
            AppError::Pool(_) => "pool_error",
            AppError::Transaction(_) => "transaction_error",
            AppError::Config(_) => "config_error",
            AppError::Serialization(_) => "serialization_error",
            AppError::Internal(_) => "internal_error",
        }
    }
}

// ==================== From implementations ====================

impl From<sqlx::Error> for AppError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed => AppError::Pool(err.to_string()),
            other => AppError::Database(other.to_string()),
        }
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::Serialization(err.to_string())
    }
}

impl From<config::ConfigError> for AppError {
    fn from(err: config::ConfigError) -> Self {
        AppError::Config(err.to_string())
    }
}

impl From<validator::ValidationErrors> for AppError {
    fn from(err: validator::ValidationErrors) -> Self {
        AppError::Validation(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_kinds() {
        let date = NaiveDate::from_ymd_opt(2026, 1, 1).unwrap();
        let t = NaiveTime::from_hms_opt(9, 0, 0).unwrap();

        assert_eq!(AppError::InvalidDate(date).kind(), ErrorKind::Validation);
        assert_eq!(
            AppError::SlotTaken {
                date,
                start: t,
                end: t
            }
            .kind(),
            ErrorKind::Conflict
        );
        assert_eq!(AppError::ResourceUnavailable(1).kind(), ErrorKind::NotFound);
        assert_eq!(
            AppError::NotOwner {
                requester_id: 1,
                entity: "reservation".to_string()
            }
            .kind(),
            ErrorKind::Authorization
        );
        assert_eq!(
            AppError::CancellationWindowClosed { window_minutes: 120 }.kind(),
            ErrorKind::State
        );
        assert_eq!(AppError::GatewayTimeout(10).kind(), ErrorKind::External);
        assert_eq!(
            AppError::Database("boom".to_string()).kind(),
            ErrorKind::Internal
        );
    }

    #[test]
    fn test_error_codes() {
        assert_eq!(
            AppError::IllegalTransition {
                from: ReservationStatus::Cancelled,
                to: ReservationStatus::Confirmed,
            }
            .error_code(),
            "illegal_transition"
        );
        assert_eq!(
            AppError::AlreadyConfirmed(Uuid::nil()).error_code(),
            "already_confirmed"
        );
        assert_eq!(AppError::InvalidRating(7).error_code(), "invalid_rating");
    }
}
