//! Business logic services for turf booking
//!
//! This crate holds the reservation admission and lifecycle logic on top of
//! the storage ports defined in `turf-core`.
//!
//! # Architecture
//!
//! - Services are generic over the storage ports and hold them in `Arc`
//! - Atomicity comes from the ports (`insert_if_slot_free`,
//!   `compare_and_set_status`, `record_refund`, `recompute_rating`);
//!   services hold no locks of their own
//! - All operations are instrumented with tracing
//!
//! # Services
//!
//! - `ConflictDetector` - Half-open overlap checks and free-slot listing
//! - `ReservationEngine` - Creation, confirmation, cancellation, completion
//! - `PaymentCoordinator` - Gateway charge and refund workflow
//! - `RatingAggregator` - Review admission and per-resource rating recompute

pub mod conflict;
pub mod payment;
pub mod rating;
pub mod reservation_engine;

pub use conflict::ConflictDetector;
pub use payment::{PaymentCoordinator, PaymentLedger};
pub use rating::RatingAggregator;
pub use reservation_engine::ReservationEngine;

/// Business logic constants
pub mod constants {
    /// Re-reads allowed when a status compare-and-set loses a race
    pub const MAX_TRANSITION_ATTEMPTS: usize = 3;
}
