//! Repository implementations
//!
//! Concrete PostgreSQL implementations of the storage ports defined in
//! turf-core, using sqlx.

pub mod payment_repo;
pub mod reservation_repo;
pub mod resource_repo;
pub mod review_repo;

pub use payment_repo::PgPaymentRepository;
pub use reservation_repo::PgReservationRepository;
pub use resource_repo::PgResourceCatalog;
pub use review_repo::PgReviewRepository;
