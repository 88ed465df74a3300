//! Conflict detector
//!
//! Two slots `[s1, e1)` and `[s2, e2)` conflict iff `s1 < e2 && e1 > s2`.
//! Only PENDING and CONFIRMED reservations take part. The reads here are
//! advisory; admission itself re-checks inside
//! `ReservationRepository::insert_if_slot_free`.

use chrono::{Duration, NaiveDate, NaiveTime};
use std::sync::Arc;
use tracing::{debug, instrument};
use turf_core::{
    models::{Reservation, Resource, TimeSlot},
    traits::ReservationRepository,
    AppResult,
};

/// Overlap queries against the reservation store
pub struct ConflictDetector<R: ReservationRepository> {
    reservations: Arc<R>,
}

impl<R: ReservationRepository> Clone for ConflictDetector<R> {
    fn clone(&self) -> Self {
        Self {
            reservations: Arc::clone(&self.reservations),
        }
    }
}

impl<R: ReservationRepository> ConflictDetector<R> {
    pub fn new(reservations: Arc<R>) -> Self {
        Self { reservations }
    }

    /// Check whether any blocking reservation overlaps `[start, end)`
    ///
    /// # Errors
    ///
    /// Returns `InvalidInterval` if `start >= end`.
    #[instrument(skip(self))]
    pub async fn has_conflict(
        &self,
        resource_id: i64,
        date: NaiveDate,
        start: NaiveTime,
        end: NaiveTime,
    ) -> AppResult<bool> {
        let conflicts = self.conflicts(resource_id, date, start, end).await?;
        debug!(
            "Turf {} on {} {}-{}: {} conflicts",
            resource_id,
            date,
            start,
            end,
            conflicts.len()
        );
        Ok(!conflicts.is_empty())
    }

    /// Blocking reservations overlapping `[start, end)`, by start time
    pub async fn conflicts(
        &self,
        resource_id: i64,
        date: NaiveDate,
        start: NaiveTime,
        end: NaiveTime,
    ) -> AppResult<Vec<Reservation>> {
        let slot = TimeSlot::new(start, end)?;
        self.reservations
            .find_conflicting(resource_id, date, slot)
            .await
    }

    /// Fixed-length slots of `resource` on `date` not overlapping any
    /// blocking reservation
    ///
    /// Slots starting at or before `not_after` are dropped; pass the
    /// current time of day when `date` is today.
    #[instrument(skip(self, resource), fields(resource_id = resource.id))]
    pub async fn free_slots(
        &self,
        resource: &Resource,
        date: NaiveDate,
        slot_length: Duration,
        not_after: Option<NaiveTime>,
    ) -> AppResult<Vec<TimeSlot>> {
        let taken: Vec<TimeSlot> = self
            .reservations
            .find_active_for_date(resource.id, date)
            .await?
            .iter()
            .map(Reservation::slot)
            .collect();

        Ok(partition_free(
            resource.opening_time,
            resource.closing_time,
            slot_length,
            &taken,
            not_after,
        ))
    }
}

/// Cut `[opening, closing)` into back-to-back slots of `length` and keep the
/// ones that overlap nothing in `taken`
fn partition_free(
    opening: NaiveTime,
    closing: NaiveTime,
    length: Duration,
    taken: &[TimeSlot],
    not_after: Option<NaiveTime>,
) -> Vec<TimeSlot> {
    let mut free = Vec::new();
    if length <= Duration::zero() {
        return free;
    }

    let mut start = opening;
    loop {
        let (end, wrapped) = start.overflowing_add_signed(length);
        if wrapped != 0 || end > closing || end <= start {
            break;
        }

        let candidate = TimeSlot { start, end };
        let started = not_after.is_some_and(|now| start <= now);
        if !started && !taken.iter().any(|t| t.overlaps(&candidate)) {
            free.push(candidate);
        }
        start = end;
    }
    free
}

#[cfg(test)]
mod tests {
    use super::*;

    fn t(h: u32, m: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(h, m, 0).unwrap()
    }

    fn slot(s: NaiveTime, e: NaiveTime) -> TimeSlot {
        TimeSlot::new(s, e).unwrap()
    }

    #[test]
    fn test_partition_skips_taken_slots() {
        let taken = vec![slot(t(7, 30), t(8, 30))];
        let free = partition_free(t(6, 0), t(10, 0), Duration::hours(1), &taken, None);

        assert_eq!(
            free,
            vec![slot(t(6, 0), t(7, 0)), slot(t(9, 0), t(10, 0))]
        );
    }

    #[test]
    fn test_partition_drops_trailing_partial_slot() {
        let free = partition_free(t(6, 0), t(8, 30), Duration::hours(1), &[], None);
        assert_eq!(free.len(), 2);
        assert_eq!(free[1].end, t(8, 0));
    }

    #[test]
    fn test_partition_drops_started_slots() {
        let free = partition_free(t(6, 0), t(10, 0), Duration::hours(1), &[], Some(t(7, 0)));
        assert_eq!(
            free,
            vec![slot(t(8, 0), t(9, 0)), slot(t(9, 0), t(10, 0))]
        );
    }

    #[test]
    fn test_partition_stops_at_midnight() {
        let free = partition_free(t(22, 0), t(23, 59), Duration::hours(1), &[], None);
        assert_eq!(free, vec![slot(t(22, 0), t(23, 0))]);
    }
}
