//! Storage and gateway ports
//!
//! The engine only talks to the outside world through these traits.
//! `turf-db` provides PostgreSQL and in-memory implementations.

use crate::error::AppError;
use crate::models::{
    PaymentMethod, PaymentRecord, PaymentStatus, RatingSummary, Reservation, ReservationStatus,
    Resource, Review, TimeSlot,
};
use async_trait::async_trait;
use chrono::{NaiveDate, NaiveDateTime};
use rust_decimal::Decimal;
use serde_json::Value;
use uuid::Uuid;

/// Generic repository trait for CRUD operations
#[async_trait]
pub trait Repository<T, ID>: Send + Sync {
    /// Find entity by ID
    async fn find_by_id(&self, id: ID) -> Result<Option<T>, AppError>;

    /// Create a new entity
    async fn create(&self, entity: &T) -> Result<T, AppError>;

    /// Update an existing entity
    async fn update(&self, entity: &T) -> Result<T, AppError>;

    /// Delete entity by ID
    async fn delete(&self, id: ID) -> Result<bool, AppError>;
}

/// Read access to the resource catalog, plus the aggregate rating write
#[async_trait]
pub trait ResourceCatalog: Send + Sync {
    /// Find resource by ID
    async fn get_resource(&self, id: i64) -> Result<Option<Resource>, AppError>;

    /// Recompute both aggregate rating fields from the stored reviews
    ///
    /// Reading the reviews and writing the aggregate is one atomic step per
    /// resource, so the last write always reflects every committed review.
    /// Returns `AppError::ResourceUnavailable` for an unknown resource.
    async fn recompute_rating(&self, id: i64) -> Result<RatingSummary, AppError>;
}

/// Reservation storage with the atomic operations the engine relies on
#[async_trait]
pub trait ReservationRepository: Send + Sync {
    /// Find reservation by ID
    async fn find_by_id(&self, id: Uuid) -> Result<Option<Reservation>, AppError>;

    /// Insert `reservation` unless a blocking reservation overlaps it
    ///
    /// The overlap check and the insert run in one transaction scope that is
    /// serialized per resource. Returns `AppError::SlotTaken` on overlap.
    async fn insert_if_slot_free(&self, reservation: &Reservation)
        -> Result<Reservation, AppError>;

    /// PENDING/CONFIRMED reservations overlapping `slot`
    async fn find_conflicting(
        &self,
        resource_id: i64,
        date: NaiveDate,
        slot: TimeSlot,
    ) -> Result<Vec<Reservation>, AppError>;

    /// Set status to `new` only if it currently equals `expected`
    ///
    /// Returns `None` when the stored status differs (or the row is gone).
    async fn compare_and_set_status(
        &self,
        id: Uuid,
        expected: ReservationStatus,
        new: ReservationStatus,
    ) -> Result<Option<Reservation>, AppError>;

    /// All reservations of a requester, newest first
    async fn find_by_requester(&self, requester_id: i64) -> Result<Vec<Reservation>, AppError>;

    /// PENDING/CONFIRMED reservations of a resource on a date, by start time
    async fn find_active_for_date(
        &self,
        resource_id: i64,
        date: NaiveDate,
    ) -> Result<Vec<Reservation>, AppError>;

    /// CONFIRMED reservations whose end is at or before `now`
    async fn find_confirmed_ended_before(
        &self,
        now: NaiveDateTime,
    ) -> Result<Vec<Reservation>, AppError>;
}

/// Payment record storage
#[async_trait]
pub trait PaymentRepository: Send + Sync {
    /// Persist a new record
    async fn create(&self, record: &PaymentRecord) -> Result<PaymentRecord, AppError>;

    /// All records of a reservation, oldest first
    async fn find_by_reservation(
        &self,
        reservation_id: Uuid,
    ) -> Result<Vec<PaymentRecord>, AppError>;

    /// Set status (and gateway payload) only if it currently equals `expected`
    async fn compare_and_set_status(
        &self,
        id: Uuid,
        expected: PaymentStatus,
        new: PaymentStatus,
        gateway_response: Option<Value>,
    ) -> Result<Option<PaymentRecord>, AppError>;

    /// Append `refund` and flip `original_id` from SUCCESS to REFUNDED atomically
    ///
    /// Returns `None`, writing nothing, if the original is no longer SUCCESS.
    async fn record_refund(
        &self,
        original_id: Uuid,
        refund: &PaymentRecord,
    ) -> Result<Option<PaymentRecord>, AppError>;
}

/// Review storage
#[async_trait]
pub trait ReviewRepository: Repository<Review, Uuid> {
    /// All reviews of a resource
    async fn find_by_resource(&self, resource_id: i64) -> Result<Vec<Review>, AppError>;

    /// Check if the requester has already reviewed the resource
    async fn exists_for(&self, requester_id: i64, resource_id: i64) -> Result<bool, AppError>;
}

/// Payment gateway adapter contract
///
/// `Ok(true)` is a settled charge, `Ok(false)` a decline. `Err` is a
/// transport failure and is treated the same as a decline.
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    async fn attempt(
        &self,
        amount: Decimal,
        method: PaymentMethod,
        details: &str,
    ) -> Result<bool, AppError>;
}
