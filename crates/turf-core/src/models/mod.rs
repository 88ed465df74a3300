//! Domain models for turf booking
//!
//! This module contains all the core domain models used by the reservation engine.

pub mod payment;
pub mod reservation;
pub mod resource;
pub mod review;

pub use payment::{PaymentMethod, PaymentRecord, PaymentStatus};
pub use reservation::{Reservation, ReservationRequest, ReservationStatus, TimeSlot};
pub use resource::{RatingSummary, Resource};
pub use review::{Review, ReviewRequest};
