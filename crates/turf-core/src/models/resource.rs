//! Bookable resource (turf) as seen by the engine
//!
//! The catalog owns these records. The engine reads the booking-relevant
//! fields and the rating aggregator is the only writer of the aggregate.

use chrono::NaiveTime;
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};

/// Booking-relevant view of a catalog resource
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Resource {
    /// Catalog identifier
    pub id: i64,

    /// Display name
    pub name: String,

    /// Inactive resources cannot be booked
    pub is_active: bool,

    /// Price charged per hour of play
    pub price_per_hour: Decimal,

    /// First bookable instant of the day
    pub opening_time: NaiveTime,

    /// Last bookable instant of the day
    pub closing_time: NaiveTime,

    /// Mean review rating, 2 dp
    pub rating: Decimal,

    /// Number of reviews behind `rating`
    pub total_reviews: i64,
}

impl Resource {
    /// Create an active resource with no reviews
    pub fn new(
        id: i64,
        name: impl Into<String>,
        price_per_hour: Decimal,
        opening_time: NaiveTime,
        closing_time: NaiveTime,
    ) -> Self {
        Self {
            id,
            name: name.into(),
            is_active: true,
            price_per_hour,
            opening_time,
            closing_time,
            rating: Decimal::ZERO,
            total_reviews: 0,
        }
    }

    /// Whether `[start, end)` lies inside the operating window
    pub fn is_within_hours(&self, start: NaiveTime, end: NaiveTime) -> bool {
        start >= self.opening_time && end <= self.closing_time
    }

    pub fn rating_summary(&self) -> RatingSummary {
        RatingSummary {
            average: self.rating,
            count: self.total_reviews,
        }
    }
}

/// Aggregate rating fields, always written together
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct RatingSummary {
    pub average: Decimal,
    pub count: i64,
}

/// Decimal places kept on aggregate ratings
pub const RATING_DECIMAL_PLACES: u32 = 2;

impl RatingSummary {
    /// Mean rating rounded half-up to 2 dp plus count; zero with no ratings
    pub fn from_ratings(ratings: impl Iterator<Item = i32>) -> Self {
        let (sum, count) = ratings.fold((0_i64, 0_i64), |(sum, count), r| {
            (sum + i64::from(r), count + 1)
        });
        if count == 0 {
            return Self::default();
        }

        let average = (Decimal::from(sum) / Decimal::from(count))
            .round_dp_with_strategy(RATING_DECIMAL_PLACES, RoundingStrategy::MidpointAwayFromZero);
        Self { average, count }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn hm(h: u32, m: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(h, m, 0).unwrap()
    }

    #[test]
    fn test_operating_window_is_inclusive_at_edges() {
        let turf = Resource::new(1, "Arena", dec!(500), hm(6, 0), hm(23, 0));

        assert!(turf.is_within_hours(hm(6, 0), hm(7, 0)));
        assert!(turf.is_within_hours(hm(22, 0), hm(23, 0)));
        assert!(!turf.is_within_hours(hm(5, 0), hm(6, 0)));
        assert!(!turf.is_within_hours(hm(22, 30), hm(23, 30)));
    }

    #[test]
    fn test_summary_from_ratings() {
        let summary = RatingSummary::from_ratings([4, 5, 3].into_iter());
        assert_eq!(summary.average, dec!(4.00));
        assert_eq!(summary.count, 3);

        assert_eq!(RatingSummary::from_ratings([4, 5].into_iter()).average, dec!(4.50));
    }

    #[test]
    fn test_summary_rounds_half_up() {
        // 14 / 3 = 4.666..
        assert_eq!(RatingSummary::from_ratings([5, 5, 4].into_iter()).average, dec!(4.67));
        // 13 / 8 = 1.625
        let ratings = [1, 1, 1, 1, 2, 2, 2, 3];
        assert_eq!(RatingSummary::from_ratings(ratings.into_iter()).average, dec!(1.63));
    }

    #[test]
    fn test_summary_of_nothing_is_zero() {
        let summary = RatingSummary::from_ratings(std::iter::empty());
        assert_eq!(summary, RatingSummary::default());
        assert_eq!(summary.average, Decimal::ZERO);
    }

    #[test]
    fn test_new_resource_has_empty_rating() {
        let turf = Resource::new(1, "Arena", dec!(500), hm(6, 0), hm(23, 0));
        assert_eq!(turf.rating_summary(), RatingSummary::default());
    }
}
