//! In-memory storage
//!
//! A single `MemoryStore` implements every storage port. Reservations are
//! sharded per resource, so check-then-insert on one turf never waits on
//! another; the other tables sit behind one mutex each. Every compound
//! operation (check-then-insert, compare-and-set, refund flip plus append,
//! rating recompute) completes under the lock it needs, matching the row
//! locks and transactions of the PostgreSQL repositories.

use async_trait::async_trait;
use chrono::{NaiveDate, NaiveDateTime, Utc};
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;
use turf_core::{
    models::{
        PaymentRecord, PaymentStatus, RatingSummary, Reservation, ReservationStatus, Resource,
        Review, TimeSlot,
    },
    traits::{PaymentRepository, Repository, ReservationRepository, ResourceCatalog, ReviewRepository},
    AppError, AppResult,
};
use uuid::Uuid;

/// Reservations of one resource; its lock serializes check-then-insert
type Shard = Arc<Mutex<Vec<Reservation>>>;

/// Storage backed by process memory
#[derive(Default)]
pub struct MemoryStore {
    resources: Mutex<HashMap<i64, Resource>>,
    shards: Mutex<HashMap<i64, Shard>>,
    /// Reservation id to owning resource
    index: Mutex<HashMap<Uuid, i64>>,
    payments: Mutex<Vec<PaymentRecord>>,
    reviews: Mutex<HashMap<Uuid, Review>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace a catalog entry
    pub fn insert_resource(&self, resource: Resource) {
        self.resources.lock().insert(resource.id, resource);
    }

    fn shard(&self, resource_id: i64) -> Shard {
        Arc::clone(self.shards.lock().entry(resource_id).or_default())
    }

    fn shard_of(&self, id: Uuid) -> Option<Shard> {
        let resource_id = *self.index.lock().get(&id)?;
        Some(self.shard(resource_id))
    }

    fn all_shards(&self) -> Vec<Shard> {
        self.shards.lock().values().cloned().collect()
    }

    fn collect_where(&self, keep: impl Fn(&Reservation) -> bool) -> Vec<Reservation> {
        self.all_shards()
            .iter()
            .flat_map(|shard| {
                shard
                    .lock()
                    .iter()
                    .filter(|&r| keep(r))
                    .cloned()
                    .collect::<Vec<_>>()
            })
            .collect()
    }
}

#[async_trait]
impl ResourceCatalog for MemoryStore {
    async fn get_resource(&self, id: i64) -> AppResult<Option<Resource>> {
        Ok(self.resources.lock().get(&id).cloned())
    }

    async fn recompute_rating(&self, id: i64) -> AppResult<RatingSummary> {
        // Reviews stay locked until the aggregate is written
        let reviews = self.reviews.lock();
        let summary = RatingSummary::from_ratings(
            reviews
                .values()
                .filter(|r| r.resource_id == id)
                .map(|r| r.rating),
        );

        let mut resources = self.resources.lock();
        let resource = resources
            .get_mut(&id)
            .ok_or(AppError::ResourceUnavailable(id))?;
        resource.rating = summary.average;
        resource.total_reviews = summary.count;
        Ok(summary)
    }
}

#[async_trait]
impl ReservationRepository for MemoryStore {
    async fn find_by_id(&self, id: Uuid) -> AppResult<Option<Reservation>> {
        let Some(shard) = self.shard_of(id) else {
            return Ok(None);
        };
        let found = shard.lock().iter().find(|r| r.id == id).cloned();
        Ok(found)
    }

    async fn insert_if_slot_free(&self, reservation: &Reservation) -> AppResult<Reservation> {
        if !self.resources.lock().contains_key(&reservation.resource_id) {
            return Err(AppError::ResourceUnavailable(reservation.resource_id));
        }

        let slot = reservation.slot();
        let shard = self.shard(reservation.resource_id);
        let mut reservations = shard.lock();
        let taken = reservations
            .iter()
            .any(|r| r.conflicts_with(reservation.resource_id, reservation.date, &slot));
        if taken {
            debug!("Slot {} on {} already taken", slot, reservation.date);
            return Err(AppError::SlotTaken {
                date: reservation.date,
                start: reservation.start_time,
                end: reservation.end_time,
            });
        }

        reservations.push(reservation.clone());
        self.index
            .lock()
            .insert(reservation.id, reservation.resource_id);
        Ok(reservation.clone())
    }

    async fn find_conflicting(
        &self,
        resource_id: i64,
        date: NaiveDate,
        slot: TimeSlot,
    ) -> AppResult<Vec<Reservation>> {
        let mut found: Vec<Reservation> = self
            .shard(resource_id)
            .lock()
            .iter()
            .filter(|r| r.conflicts_with(resource_id, date, &slot))
            .cloned()
            .collect();
        found.sort_by_key(|r| r.start_time);
        Ok(found)
    }

    async fn compare_and_set_status(
        &self,
        id: Uuid,
        expected: ReservationStatus,
        new: ReservationStatus,
    ) -> AppResult<Option<Reservation>> {
        let Some(shard) = self.shard_of(id) else {
            return Ok(None);
        };
        let mut reservations = shard.lock();
        match reservations.iter_mut().find(|r| r.id == id) {
            Some(r) if r.status == expected => {
                r.status = new;
                r.updated_at = Utc::now();
                Ok(Some(r.clone()))
            }
            _ => Ok(None),
        }
    }

    async fn find_by_requester(&self, requester_id: i64) -> AppResult<Vec<Reservation>> {
        let mut found = self.collect_where(|r| r.requester_id == requester_id);
        found.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(found)
    }

    async fn find_active_for_date(
        &self,
        resource_id: i64,
        date: NaiveDate,
    ) -> AppResult<Vec<Reservation>> {
        let mut found: Vec<Reservation> = self
            .shard(resource_id)
            .lock()
            .iter()
            .filter(|r| r.date == date && r.status.blocks_slot())
            .cloned()
            .collect();
        found.sort_by_key(|r| r.start_time);
        Ok(found)
    }

    async fn find_confirmed_ended_before(
        &self,
        now: NaiveDateTime,
    ) -> AppResult<Vec<Reservation>> {
        let mut found = self
            .collect_where(|r| r.status == ReservationStatus::Confirmed && r.ends_at() <= now);
        found.sort_by_key(|r| r.ends_at());
        Ok(found)
    }
}

#[async_trait]
impl PaymentRepository for MemoryStore {
    async fn create(&self, record: &PaymentRecord) -> AppResult<PaymentRecord> {
        self.payments.lock().push(record.clone());
        Ok(record.clone())
    }

    async fn find_by_reservation(&self, reservation_id: Uuid) -> AppResult<Vec<PaymentRecord>> {
        Ok(self
            .payments
            .lock()
            .iter()
            .filter(|p| p.reservation_id == reservation_id)
            .cloned()
            .collect())
    }

    async fn compare_and_set_status(
        &self,
        id: Uuid,
        expected: PaymentStatus,
        new: PaymentStatus,
        gateway_response: Option<Value>,
    ) -> AppResult<Option<PaymentRecord>> {
        let mut payments = self.payments.lock();
        match payments.iter_mut().find(|p| p.id == id) {
            Some(p) if p.status == expected => {
                p.status = new;
                if gateway_response.is_some() {
                    p.gateway_response = gateway_response;
                }
                Ok(Some(p.clone()))
            }
            _ => Ok(None),
        }
    }

    async fn record_refund(
        &self,
        original_id: Uuid,
        refund: &PaymentRecord,
    ) -> AppResult<Option<PaymentRecord>> {
        let mut payments = self.payments.lock();
        let Some(original) = payments
            .iter_mut()
            .find(|p| p.id == original_id && p.is_refundable())
        else {
            return Ok(None);
        };
        original.status = PaymentStatus::Refunded;

        let mut refund = refund.clone();
        refund.refund_of = Some(original_id);
        payments.push(refund.clone());
        Ok(Some(refund))
    }
}

#[async_trait]
impl Repository<Review, Uuid> for MemoryStore {
    async fn find_by_id(&self, id: Uuid) -> AppResult<Option<Review>> {
        Ok(self.reviews.lock().get(&id).cloned())
    }

    async fn create(&self, entity: &Review) -> AppResult<Review> {
        let mut reviews = self.reviews.lock();
        let duplicate = reviews.values().any(|r| {
            r.requester_id == entity.requester_id && r.resource_id == entity.resource_id
        });
        if duplicate {
            return Err(AppError::DuplicateReview {
                requester_id: entity.requester_id,
                resource_id: entity.resource_id,
            });
        }
        reviews.insert(entity.id, entity.clone());
        Ok(entity.clone())
    }

    async fn update(&self, entity: &Review) -> AppResult<Review> {
        let mut reviews = self.reviews.lock();
        let stored = reviews
            .get_mut(&entity.id)
            .ok_or(AppError::ReviewNotFound(entity.id))?;
        stored.rating = entity.rating;
        stored.text = entity.text.clone();
        stored.updated_at = Utc::now();
        Ok(stored.clone())
    }

    async fn delete(&self, id: Uuid) -> AppResult<bool> {
        Ok(self.reviews.lock().remove(&id).is_some())
    }
}

#[async_trait]
impl ReviewRepository for MemoryStore {
    async fn find_by_resource(&self, resource_id: i64) -> AppResult<Vec<Review>> {
        Ok(self
            .reviews
            .lock()
            .values()
            .filter(|r| r.resource_id == resource_id)
            .cloned()
            .collect())
    }

    async fn exists_for(&self, requester_id: i64, resource_id: i64) -> AppResult<bool> {
        Ok(self
            .reviews
            .lock()
            .values()
            .any(|r| r.requester_id == requester_id && r.resource_id == resource_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveTime;
    use rust_decimal_macros::dec;
    use turf_core::models::{PaymentMethod, ReservationRequest, ReviewRequest};

    fn t(h: u32, m: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(h, m, 0).unwrap()
    }

    fn date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 6, 1).unwrap()
    }

    fn store() -> MemoryStore {
        let store = MemoryStore::new();
        store.insert_resource(Resource::new(1, "Arena", dec!(500.00), t(6, 0), t(23, 0)));
        store
    }

    fn reservation(start: NaiveTime, end: NaiveTime) -> Reservation {
        let request = ReservationRequest {
            requester_id: 7,
            resource_id: 1,
            date: date(),
            start,
            end,
            player_count: 10,
            note: None,
        };
        Reservation::new(&request, dec!(500.00))
    }

    #[tokio::test]
    async fn test_overlap_rejected_adjacent_allowed() {
        let store = store();
        store
            .insert_if_slot_free(&reservation(t(18, 0), t(19, 0)))
            .await
            .unwrap();

        let err = store
            .insert_if_slot_free(&reservation(t(18, 30), t(19, 30)))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::SlotTaken { .. }));

        assert!(store
            .insert_if_slot_free(&reservation(t(19, 0), t(20, 0)))
            .await
            .is_ok());
    }

    #[tokio::test]
    async fn test_cancelled_reservation_frees_slot() {
        let store = store();
        let first = store
            .insert_if_slot_free(&reservation(t(18, 0), t(19, 0)))
            .await
            .unwrap();
        ReservationRepository::compare_and_set_status(
            &store,
            first.id,
            ReservationStatus::Pending,
            ReservationStatus::Cancelled,
        )
        .await
        .unwrap()
        .unwrap();

        assert!(store
            .insert_if_slot_free(&reservation(t(18, 0), t(19, 0)))
            .await
            .is_ok());
    }

    #[tokio::test]
    async fn test_unknown_resource_rejected() {
        let store = MemoryStore::new();
        let err = store
            .insert_if_slot_free(&reservation(t(18, 0), t(19, 0)))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::ResourceUnavailable(1)));
    }

    #[tokio::test]
    async fn test_compare_and_set_requires_expected_status() {
        let store = store();
        let r = store
            .insert_if_slot_free(&reservation(t(8, 0), t(9, 0)))
            .await
            .unwrap();

        let miss = ReservationRepository::compare_and_set_status(
            &store,
            r.id,
            ReservationStatus::Confirmed,
            ReservationStatus::Completed,
        )
        .await
        .unwrap();
        assert!(miss.is_none());

        let hit = ReservationRepository::compare_and_set_status(
            &store,
            r.id,
            ReservationStatus::Pending,
            ReservationStatus::Confirmed,
        )
        .await
        .unwrap();
        assert_eq!(hit.unwrap().status, ReservationStatus::Confirmed);
    }

    #[tokio::test]
    async fn test_concurrent_inserts_admit_one() {
        let store = Arc::new(store());

        let attempts = (0..16).map(|_| {
            let store = Arc::clone(&store);
            tokio::spawn(async move {
                store
                    .insert_if_slot_free(&reservation(t(18, 0), t(19, 0)))
                    .await
            })
        });
        let results = futures::future::join_all(attempts).await;

        let admitted = results
            .into_iter()
            .filter(|r| matches!(r, Ok(Ok(_))))
            .count();
        assert_eq!(admitted, 1);
    }

    #[tokio::test]
    async fn test_refund_recorded_once() {
        let store = store();
        let mut charge = PaymentRecord::charge(Uuid::new_v4(), dec!(500.00), PaymentMethod::Upi);
        charge.status = PaymentStatus::Success;
        PaymentRepository::create(&store, &charge).await.unwrap();

        let first = store
            .record_refund(charge.id, &charge.refund_for())
            .await
            .unwrap();
        assert!(first.is_some());

        let second = store
            .record_refund(charge.id, &charge.refund_for())
            .await
            .unwrap();
        assert!(second.is_none());

        let history = store.find_by_reservation(charge.reservation_id).await.unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].status, PaymentStatus::Refunded);
        assert_eq!(history[1].amount, dec!(-500.00));
    }

    #[tokio::test]
    async fn test_duplicate_review_rejected() {
        let store = store();
        let request = ReviewRequest {
            requester_id: 7,
            resource_id: 1,
            reservation_id: None,
            rating: 4,
            text: None,
        };
        Repository::create(&store, &Review::new(&request)).await.unwrap();

        let err = Repository::create(&store, &Review::new(&request))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::DuplicateReview { .. }));
        assert!(store.exists_for(7, 1).await.unwrap());
    }

    #[tokio::test]
    async fn test_resources_do_not_share_insert_lock() {
        let store = store();
        store.insert_resource(Resource::new(2, "Annex", dec!(400.00), t(6, 0), t(23, 0)));

        // Turf 1 mid check-then-insert
        let busy = store.shard(1);
        let _held = busy.lock();

        let mut elsewhere = reservation(t(18, 0), t(19, 0));
        elsewhere.resource_id = 2;
        store.insert_if_slot_free(&elsewhere).await.unwrap();

        let found = ReservationRepository::find_by_id(&store, elsewhere.id)
            .await
            .unwrap();
        assert_eq!(found.unwrap().resource_id, 2);
    }

    #[tokio::test]
    async fn test_listings_span_resources() {
        let store = store();
        store.insert_resource(Resource::new(2, "Annex", dec!(400.00), t(6, 0), t(23, 0)));
        let mut elsewhere = reservation(t(18, 0), t(19, 0));
        elsewhere.resource_id = 2;
        store.insert_if_slot_free(&elsewhere).await.unwrap();
        store
            .insert_if_slot_free(&reservation(t(18, 0), t(19, 0)))
            .await
            .unwrap();

        assert_eq!(store.find_by_requester(7).await.unwrap().len(), 2);
        assert_eq!(store.find_active_for_date(1, date()).await.unwrap().len(), 1);
        let missing = ReservationRepository::find_by_id(&store, Uuid::new_v4())
            .await
            .unwrap();
        assert!(missing.is_none());
    }

    #[tokio::test]
    async fn test_recompute_rating_from_stored_reviews() {
        let store = store();
        for (requester_id, rating) in [(1, 4), (2, 5)] {
            let request = ReviewRequest {
                requester_id,
                resource_id: 1,
                reservation_id: None,
                rating,
                text: None,
            };
            Repository::create(&store, &Review::new(&request)).await.unwrap();
        }

        let summary = store.recompute_rating(1).await.unwrap();
        assert_eq!(summary, RatingSummary { average: dec!(4.50), count: 2 });
        let stored = store.get_resource(1).await.unwrap().unwrap();
        assert_eq!(stored.rating_summary(), summary);

        let err = store.recompute_rating(404).await.unwrap_err();
        assert!(matches!(err, AppError::ResourceUnavailable(404)));
    }
}
