//! Reservation lifecycle engine
//!
//! Admits new reservations and drives them through
//! PENDING → CONFIRMED → COMPLETED, with CANCELLED reachable from both
//! non-terminal states:
//! - Create: validate, price and insert under the per-resource slot check
//! - Confirm: after a settled payment
//! - Cancel: by the owner, outside the cancellation window, with refund
//! - Complete: once the slot has elapsed
//!
//! Every status write is a compare-and-set on the expected prior status.

use chrono::{Duration, NaiveDate, NaiveTime};
use std::sync::Arc;
use tracing::{debug, error, info, instrument, warn};
use turf_core::{
    models::{Reservation, ReservationRequest, ReservationStatus, Resource, TimeSlot},
    traits::{PaymentRepository, ReservationRepository, ResourceCatalog},
    AppError, AppResult, BookingConfig, Clock,
};
use uuid::Uuid;
use validator::Validate;

use crate::conflict::ConflictDetector;
use crate::constants::MAX_TRANSITION_ATTEMPTS;
use crate::payment::PaymentLedger;

/// Reservation lifecycle engine
///
/// Owns reservations once created. Payment records are written through
/// the [`PaymentLedger`] it shares with the payment coordinator.
pub struct ReservationEngine<C, R, P>
where
    C: ResourceCatalog,
    R: ReservationRepository,
    P: PaymentRepository,
{
    catalog: Arc<C>,
    reservations: Arc<R>,
    detector: ConflictDetector<R>,
    ledger: PaymentLedger<P>,
    clock: Arc<dyn Clock>,
    config: BookingConfig,
}

impl<C, R, P> ReservationEngine<C, R, P>
where
    C: ResourceCatalog,
    R: ReservationRepository,
    P: PaymentRepository,
{
    /// Create a new reservation engine
    pub fn new(
        catalog: Arc<C>,
        reservations: Arc<R>,
        payments: Arc<P>,
        clock: Arc<dyn Clock>,
        config: BookingConfig,
    ) -> Self {
        Self {
            catalog,
            detector: ConflictDetector::new(Arc::clone(&reservations)),
            reservations,
            ledger: PaymentLedger::new(payments),
            clock,
            config,
        }
    }

    pub fn config(&self) -> &BookingConfig {
        &self.config
    }

    pub fn ledger(&self) -> &PaymentLedger<P> {
        &self.ledger
    }

    /// Look up a reservation
    pub async fn get_reservation(&self, id: Uuid) -> AppResult<Reservation> {
        self.reservations
            .find_by_id(id)
            .await?
            .ok_or(AppError::ReservationNotFound(id))
    }

    async fn bookable_resource(&self, resource_id: i64) -> AppResult<Resource> {
        self.catalog
            .get_resource(resource_id)
            .await?
            .filter(|r| r.is_active)
            .ok_or(AppError::ResourceUnavailable(resource_id))
    }

    /// Create a PENDING reservation
    ///
    /// Checks run in order: request shape, resource bookable, date not in
    /// the past, start before end, inside operating hours, slot free. The
    /// slot check and insert are one atomic step in the repository.
    ///
    /// # Errors
    ///
    /// `Validation`, `ResourceUnavailable`, `InvalidDate`,
    /// `InvalidInterval`, `OutsideOperatingHours` or `SlotTaken`.
    #[instrument(skip(self, request), fields(
        requester_id = request.requester_id,
        resource_id = request.resource_id,
        date = %request.date
    ))]
    pub async fn create_reservation(&self, request: ReservationRequest) -> AppResult<Reservation> {
        request.validate()?;

        let resource = self.bookable_resource(request.resource_id).await?;

        if request.date < self.clock.today() {
            return Err(AppError::InvalidDate(request.date));
        }

        let slot = TimeSlot::new(request.start, request.end)?;

        if !resource.is_within_hours(slot.start, slot.end) {
            return Err(AppError::OutsideOperatingHours {
                start: slot.start,
                end: slot.end,
                opening: resource.opening_time,
                closing: resource.closing_time,
            });
        }

        let total_amount = slot.price(resource.price_per_hour);
        let reservation = self
            .reservations
            .insert_if_slot_free(&Reservation::new(&request, total_amount))
            .await?;

        info!(
            "Created reservation {} for turf {} on {} {} ({})",
            reservation.id, reservation.resource_id, reservation.date, slot, total_amount
        );

        Ok(reservation)
    }

    /// Move a PENDING reservation to CONFIRMED
    ///
    /// # Errors
    ///
    /// `AlreadyConfirmed` if already confirmed, `IllegalTransition` from a
    /// terminal state.
    #[instrument(skip(self))]
    pub async fn confirm_reservation(&self, id: Uuid) -> AppResult<Reservation> {
        let confirmed = self
            .transition(id, ReservationStatus::Confirmed, |r| {
                if r.status == ReservationStatus::Confirmed {
                    return Err(AppError::AlreadyConfirmed(r.id));
                }
                Ok(())
            })
            .await?;

        info!("Confirmed reservation {}", id);
        Ok(confirmed)
    }

    /// Cancel a reservation on behalf of its owner and refund settled charges
    ///
    /// Refund failures are logged and never undo the cancellation.
    ///
    /// # Errors
    ///
    /// `NotOwner`, `AlreadyTerminal` or `CancellationWindowClosed`.
    #[instrument(skip(self))]
    pub async fn cancel_reservation(&self, id: Uuid, requester_id: i64) -> AppResult<Reservation> {
        let now = self.clock.now();
        let window = Duration::minutes(self.config.cancellation_window_minutes);

        let cancelled = self
            .transition(id, ReservationStatus::Cancelled, |r| {
                if !r.is_owned_by(requester_id) {
                    return Err(AppError::NotOwner {
                        requester_id,
                        entity: format!("reservation {}", r.id),
                    });
                }
                if r.status.is_terminal() {
                    return Err(AppError::AlreadyTerminal {
                        id: r.id,
                        status: r.status,
                    });
                }
                if r.date == now.date() && r.starts_at() - now < window {
                    return Err(AppError::CancellationWindowClosed {
                        window_minutes: self.config.cancellation_window_minutes,
                    });
                }
                Ok(())
            })
            .await?;

        info!("Cancelled reservation {} by user {}", id, requester_id);

        match self.ledger.refund(id).await {
            Ok(refunds) if refunds.is_empty() => debug!("Reservation {} had no settled payment", id),
            Ok(refunds) => info!("Issued {} refunds for reservation {}", refunds.len(), id),
            Err(e) => error!("Refund failed for cancelled reservation {}: {}", id, e),
        }

        Ok(cancelled)
    }

    /// Move a CONFIRMED reservation to COMPLETED
    ///
    /// # Errors
    ///
    /// `IllegalTransition` from any other status.
    #[instrument(skip(self))]
    pub async fn complete_reservation(&self, id: Uuid) -> AppResult<Reservation> {
        let completed = self
            .transition(id, ReservationStatus::Completed, |_| Ok(()))
            .await?;

        info!("Completed reservation {}", id);
        Ok(completed)
    }

    /// Complete every CONFIRMED reservation whose slot has ended
    ///
    /// Returns how many were completed. Reservations cancelled between the
    /// scan and the write are skipped.
    #[instrument(skip(self))]
    pub async fn complete_elapsed(&self) -> AppResult<usize> {
        let now = self.clock.now();
        let elapsed = self.reservations.find_confirmed_ended_before(now).await?;

        let mut completed = 0;
        for reservation in &elapsed {
            let updated = self
                .reservations
                .compare_and_set_status(
                    reservation.id,
                    ReservationStatus::Confirmed,
                    ReservationStatus::Completed,
                )
                .await?;
            match updated {
                Some(_) => completed += 1,
                None => debug!("Reservation {} changed before completion", reservation.id),
            }
        }

        if completed > 0 {
            info!("Completed {} elapsed reservations", completed);
        }
        Ok(completed)
    }

    /// Check if `[start, end)` is free on the resource; read only
    #[instrument(skip(self))]
    pub async fn is_slot_available(
        &self,
        resource_id: i64,
        date: NaiveDate,
        start: NaiveTime,
        end: NaiveTime,
    ) -> AppResult<bool> {
        let conflict = self
            .detector
            .has_conflict(resource_id, date, start, end)
            .await?;
        Ok(!conflict)
    }

    /// Free fixed-length slots of a bookable resource on `date`
    ///
    /// Slots already started are left out when `date` is today.
    #[instrument(skip(self))]
    pub async fn available_slots(
        &self,
        resource_id: i64,
        date: NaiveDate,
    ) -> AppResult<Vec<TimeSlot>> {
        let resource = self.bookable_resource(resource_id).await?;

        let now = self.clock.now();
        if date < now.date() {
            return Ok(Vec::new());
        }
        let not_after = (date == now.date()).then(|| now.time());

        self.detector
            .free_slots(
                &resource,
                date,
                Duration::minutes(self.config.slot_length_minutes),
                not_after,
            )
            .await
    }

    /// All reservations of a requester, newest first
    pub async fn reservations_for_requester(&self, requester_id: i64) -> AppResult<Vec<Reservation>> {
        self.reservations.find_by_requester(requester_id).await
    }

    /// PENDING/CONFIRMED reservations of a requester from today on
    pub async fn upcoming_reservations(&self, requester_id: i64) -> AppResult<Vec<Reservation>> {
        let today = self.clock.today();
        let mut upcoming: Vec<Reservation> = self
            .reservations
            .find_by_requester(requester_id)
            .await?
            .into_iter()
            .filter(|r| r.status.blocks_slot() && r.date >= today)
            .collect();
        upcoming.sort_by_key(|r| r.starts_at());
        Ok(upcoming)
    }

    /// PENDING/CONFIRMED reservations of a resource on `date`, by start time
    pub async fn reservations_for_resource_on(
        &self,
        resource_id: i64,
        date: NaiveDate,
    ) -> AppResult<Vec<Reservation>> {
        self.reservations.find_active_for_date(resource_id, date).await
    }

    /// Compare-and-set `id` to `to`, re-reading on a lost race
    ///
    /// `guard` sees the current reservation and may reject it with a
    /// domain error; a generic `IllegalTransition` check follows it.
    async fn transition<F>(&self, id: Uuid, to: ReservationStatus, guard: F) -> AppResult<Reservation>
    where
        F: Fn(&Reservation) -> AppResult<()>,
    {
        for _ in 0..MAX_TRANSITION_ATTEMPTS {
            let current = self.get_reservation(id).await?;

            guard(&current)?;
            if !current.status.can_transition_to(to) {
                return Err(AppError::IllegalTransition {
                    from: current.status,
                    to,
                });
            }

            if let Some(updated) = self
                .reservations
                .compare_and_set_status(id, current.status, to)
                .await?
            {
                return Ok(updated);
            }

            warn!(
                "Reservation {} left {} concurrently, retrying {}",
                id, current.status, to
            );
        }

        Err(AppError::Internal(format!(
            "reservation {} kept changing while moving to {}",
            id, to
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use turf_core::FixedClock;
    use turf_db::MemoryStore;

    fn t(h: u32, m: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(h, m, 0).unwrap()
    }

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 6, 1).unwrap()
    }

    fn engine() -> ReservationEngine<MemoryStore, MemoryStore, MemoryStore> {
        let store = Arc::new(MemoryStore::new());
        store.insert_resource(Resource::new(1, "Arena", dec!(500.00), t(6, 0), t(23, 0)));
        let clock = Arc::new(FixedClock::at(today(), t(12, 0)));
        ReservationEngine::new(
            Arc::clone(&store),
            Arc::clone(&store),
            store,
            clock,
            BookingConfig::default(),
        )
    }

    fn request(date: NaiveDate, start: NaiveTime, end: NaiveTime) -> ReservationRequest {
        ReservationRequest {
            requester_id: 7,
            resource_id: 1,
            date,
            start,
            end,
            player_count: 10,
            note: None,
        }
    }

    #[tokio::test]
    async fn test_checks_run_in_order() {
        let engine = engine();
        let yesterday = today().pred_opt().unwrap();

        // Past date with inverted interval reports the date first
        let err = engine
            .create_reservation(request(yesterday, t(10, 0), t(9, 0)))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::InvalidDate(_)));

        // Inverted interval outside hours reports the interval first
        let err = engine
            .create_reservation(request(today(), t(5, 0), t(4, 0)))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::InvalidInterval { .. }));

        let mut unknown = request(yesterday, t(10, 0), t(11, 0));
        unknown.resource_id = 99;
        let err = engine.create_reservation(unknown).await.unwrap_err();
        assert!(matches!(err, AppError::ResourceUnavailable(99)));
    }

    #[tokio::test]
    async fn test_request_shape_validated() {
        let engine = engine();
        let mut req = request(today(), t(18, 0), t(19, 0));
        req.player_count = 0;

        let err = engine.create_reservation(req).await.unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
    }

    #[tokio::test]
    async fn test_same_day_booking_allowed() {
        let engine = engine();
        let r = engine
            .create_reservation(request(today(), t(18, 0), t(19, 30)))
            .await
            .unwrap();
        assert_eq!(r.status, ReservationStatus::Pending);
        assert_eq!(r.total_amount, dec!(750.00));
    }

    #[tokio::test]
    async fn test_transition_rules() {
        let engine = engine();
        let r = engine
            .create_reservation(request(today(), t(18, 0), t(19, 0)))
            .await
            .unwrap();

        let err = engine.complete_reservation(r.id).await.unwrap_err();
        assert!(matches!(
            err,
            AppError::IllegalTransition {
                from: ReservationStatus::Pending,
                to: ReservationStatus::Completed
            }
        ));

        engine.confirm_reservation(r.id).await.unwrap();
        let err = engine.confirm_reservation(r.id).await.unwrap_err();
        assert!(matches!(err, AppError::AlreadyConfirmed(_)));

        let done = engine.complete_reservation(r.id).await.unwrap();
        assert_eq!(done.status, ReservationStatus::Completed);

        let err = engine.confirm_reservation(r.id).await.unwrap_err();
        assert!(matches!(err, AppError::IllegalTransition { .. }));
    }

    #[tokio::test]
    async fn test_unknown_reservation() {
        let engine = engine();
        let id = Uuid::new_v4();
        let err = engine.confirm_reservation(id).await.unwrap_err();
        assert!(matches!(err, AppError::ReservationNotFound(missing) if missing == id));
    }
}
