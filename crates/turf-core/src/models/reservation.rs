//! Reservation models
//!
//! A reservation claims a resource for a half-open `[start, end)` interval on
//! one date. Lifecycle:
//! 1. Created PENDING by the engine
//! 2. CONFIRMED once a payment succeeds
//! 3. CANCELLED by its requester, or COMPLETED after the slot has elapsed

use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;
use validator::Validate;

use crate::error::AppError;

/// Reservation status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReservationStatus {
    /// Created, awaiting payment; already blocks the slot
    #[default]
    Pending,
    /// Paid
    Confirmed,
    /// Cancelled by the requester
    Cancelled,
    /// Slot has elapsed
    Completed,
}

impl fmt::Display for ReservationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ReservationStatus {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "PENDING" => Ok(ReservationStatus::Pending),
            "CONFIRMED" => Ok(ReservationStatus::Confirmed),
            "CANCELLED" => Ok(ReservationStatus::Cancelled),
            "COMPLETED" => Ok(ReservationStatus::Completed),
            other => Err(AppError::Serialization(format!(
                "unknown reservation status: {}",
                other
            ))),
        }
    }
}

impl ReservationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReservationStatus::Pending => "PENDING",
            ReservationStatus::Confirmed => "CONFIRMED",
            ReservationStatus::Cancelled => "CANCELLED",
            ReservationStatus::Completed => "COMPLETED",
        }
    }

    /// Statuses that hold the slot against other reservations
    pub const BLOCKING: [ReservationStatus; 2] =
        [ReservationStatus::Pending, ReservationStatus::Confirmed];

    /// Check if this status occupies the slot
    pub fn blocks_slot(&self) -> bool {
        Self::BLOCKING.contains(self)
    }

    /// Check if no further transition is possible
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ReservationStatus::Cancelled | ReservationStatus::Completed
        )
    }

    /// Edges of the lifecycle state machine
    pub fn can_transition_to(&self, next: ReservationStatus) -> bool {
        use ReservationStatus::*;
        matches!(
            (*self, next),
            (Pending, Confirmed) | (Pending, Cancelled) | (Confirmed, Cancelled) | (Confirmed, Completed)
        )
    }
}

/// Half-open time interval `[start, end)` within one day
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TimeSlot {
    pub start: NaiveTime,
    pub end: NaiveTime,
}

impl TimeSlot {
    /// Build a slot, rejecting empty or inverted intervals
    pub fn new(start: NaiveTime, end: NaiveTime) -> Result<Self, AppError> {
        if start >= end {
            return Err(AppError::InvalidInterval { start, end });
        }
        Ok(Self { start, end })
    }

    /// Half-open overlap: touching edges do not overlap
    #[inline]
    pub fn overlaps(&self, other: &TimeSlot) -> bool {
        self.start < other.end && self.end > other.start
    }

    pub fn duration_minutes(&self) -> i64 {
        (self.end - self.start).num_minutes()
    }

    /// Price of this slot at `price_per_hour`, rounded to cents
    pub fn price(&self, price_per_hour: Decimal) -> Decimal {
        (price_per_hour * Decimal::from(self.duration_minutes()) / Decimal::from(60))
            .round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
    }
}

impl fmt::Display for TimeSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}-{}",
            self.start.format("%H:%M"),
            self.end.format("%H:%M")
        )
    }
}

/// Booking request as submitted by a requester
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct ReservationRequest {
    pub requester_id: i64,
    pub resource_id: i64,
    pub date: NaiveDate,
    pub start: NaiveTime,
    pub end: NaiveTime,

    #[validate(range(min = 1, max = 50, message = "Player count must be between 1 and 50"))]
    #[serde(default = "default_player_count")]
    pub player_count: u32,

    #[validate(length(max = 500, message = "Note must be at most 500 characters"))]
    pub note: Option<String>,
}

fn default_player_count() -> u32 {
    1
}

/// Reservation entity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reservation {
    /// Unique identifier
    pub id: Uuid,

    /// Reserved resource
    pub resource_id: i64,

    /// Requester who owns the reservation
    pub requester_id: i64,

    /// Day of play
    pub date: NaiveDate,

    /// Start of play (inclusive)
    pub start_time: NaiveTime,

    /// End of play (exclusive)
    pub end_time: NaiveTime,

    pub player_count: u32,

    /// Hourly price × duration, fixed at creation
    pub total_amount: Decimal,

    /// Current status
    pub status: ReservationStatus,

    /// Free-text note from the requester
    pub note: Option<String>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Reservation {
    /// Create a new PENDING reservation from a validated request
    pub fn new(request: &ReservationRequest, total_amount: Decimal) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            resource_id: request.resource_id,
            requester_id: request.requester_id,
            date: request.date,
            start_time: request.start,
            end_time: request.end,
            player_count: request.player_count,
            total_amount,
            status: ReservationStatus::Pending,
            note: request.note.clone(),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn slot(&self) -> TimeSlot {
        TimeSlot {
            start: self.start_time,
            end: self.end_time,
        }
    }

    pub fn starts_at(&self) -> NaiveDateTime {
        self.date.and_time(self.start_time)
    }

    pub fn ends_at(&self) -> NaiveDateTime {
        self.date.and_time(self.end_time)
    }

    /// Check if this reservation blocks `slot` on `resource_id`/`date`
    pub fn conflicts_with(&self, resource_id: i64, date: NaiveDate, slot: &TimeSlot) -> bool {
        self.resource_id == resource_id
            && self.date == date
            && self.status.blocks_slot()
            && self.slot().overlaps(slot)
    }

    pub fn is_owned_by(&self, requester_id: i64) -> bool {
        self.requester_id == requester_id
    }
}
