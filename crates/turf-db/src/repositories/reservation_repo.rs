//! Reservation repository implementation
//!
//! Provides PostgreSQL-backed storage for reservations. Creation locks the
//! turf row for the duration of the overlap check and insert, so concurrent
//! bookings of one turf are serialized while different turfs proceed in
//! parallel.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use rust_decimal::Decimal;
use sqlx::PgPool;
use tracing::{debug, error, instrument, warn};
use turf_core::{
    models::{Reservation, ReservationStatus, TimeSlot},
    traits::ReservationRepository,
    AppError, AppResult,
};
use uuid::Uuid;

/// PostgreSQL implementation of ReservationRepository
#[derive(Clone)]
pub struct PgReservationRepository {
    pool: PgPool,
}

impl PgReservationRepository {
    /// Create a new reservation repository
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    fn collect(rows: Vec<ReservationRow>) -> AppResult<Vec<Reservation>> {
        rows.into_iter().map(Reservation::try_from).collect()
    }
}

#[async_trait]
impl ReservationRepository for PgReservationRepository {
    #[instrument(skip(self))]
    async fn find_by_id(&self, id: Uuid) -> AppResult<Option<Reservation>> {
        debug!("Finding reservation by id: {}", id);

        let row = sqlx::query_as::<sqlx::Postgres, ReservationRow>(
            r#"
            SELECT
                id, turf_id, user_id, booking_date, start_time, end_time,
                player_count, total_amount, status, note, created_at, updated_at
            FROM bookings
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            error!("Database error finding reservation {}: {}", id, e);
            AppError::Database(format!("Failed to find reservation: {}", e))
        })?;

        row.map(Reservation::try_from).transpose()
    }

    #[instrument(skip(self, reservation), fields(resource_id = reservation.resource_id, date = %reservation.date))]
    async fn insert_if_slot_free(&self, reservation: &Reservation) -> AppResult<Reservation> {
        debug!(
            "Inserting reservation {} for slot {}",
            reservation.id,
            reservation.slot()
        );

        // Start transaction
        let mut tx = self.pool.begin().await.map_err(|e| {
            error!("Failed to start transaction: {}", e);
            AppError::Transaction(format!("Failed to start transaction: {}", e))
        })?;

        // Lock turf row; serializes creations on this turf
        let locked: Option<(i64,)> = sqlx::query_as(
            r#"
            SELECT id
            FROM turfs
            WHERE id = $1
            FOR UPDATE
            "#,
        )
        .bind(reservation.resource_id)
        .fetch_optional(&mut *tx)
        .await
        .map_err(|e| {
            error!("Failed to lock turf: {}", e);
            AppError::Database(format!("Failed to lock turf: {}", e))
        })?;

        if locked.is_none() {
            return Err(AppError::ResourceUnavailable(reservation.resource_id));
        }

        let (overlapping,): (i64,) = sqlx::query_as(
            r#"
            SELECT COUNT(*)
            FROM bookings
            WHERE turf_id = $1
                AND booking_date = $2
                AND status IN ('PENDING', 'CONFIRMED')
                AND start_time < $4
                AND end_time > $3
            "#,
        )
        .bind(reservation.resource_id)
        .bind(reservation.date)
        .bind(reservation.start_time)
        .bind(reservation.end_time)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| {
            error!("Failed to check slot conflicts: {}", e);
            AppError::Database(format!("Failed to check slot conflicts: {}", e))
        })?;

        if overlapping > 0 {
            warn!(
                "Slot {} on {} already taken for turf {}",
                reservation.slot(),
                reservation.date,
                reservation.resource_id
            );
            // Dropping the transaction rolls it back
            return Err(AppError::SlotTaken {
                date: reservation.date,
                start: reservation.start_time,
                end: reservation.end_time,
            });
        }

        let row = sqlx::query_as::<sqlx::Postgres, ReservationRow>(
            r#"
            INSERT INTO bookings (
                id, turf_id, user_id, booking_date, start_time, end_time,
                player_count, total_amount, status, note, created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
            RETURNING
                id, turf_id, user_id, booking_date, start_time, end_time,
                player_count, total_amount, status, note, created_at, updated_at
            "#,
        )
        .bind(reservation.id)
        .bind(reservation.resource_id)
        .bind(reservation.requester_id)
        .bind(reservation.date)
        .bind(reservation.start_time)
        .bind(reservation.end_time)
        .bind(reservation.player_count as i32)
        .bind(reservation.total_amount)
        .bind(reservation.status.as_str())
        .bind(&reservation.note)
        .bind(reservation.created_at)
        .bind(reservation.updated_at)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| {
            error!("Failed to create reservation: {}", e);
            AppError::Database(format!("Failed to create reservation: {}", e))
        })?;

        // Commit transaction
        tx.commit().await.map_err(|e| {
            error!("Failed to commit transaction: {}", e);
            AppError::Transaction(format!("Failed to commit transaction: {}", e))
        })?;

        row.try_into()
    }

    #[instrument(skip(self))]
    async fn find_conflicting(
        &self,
        resource_id: i64,
        date: NaiveDate,
        slot: TimeSlot,
    ) -> AppResult<Vec<Reservation>> {
        debug!(
            "Finding conflicts for turf {} on {} at {}",
            resource_id, date, slot
        );

        let rows = sqlx::query_as::<sqlx::Postgres, ReservationRow>(
            r#"
            SELECT
                id, turf_id, user_id, booking_date, start_time, end_time,
                player_count, total_amount, status, note, created_at, updated_at
            FROM bookings
            WHERE turf_id = $1
                AND booking_date = $2
                AND status IN ('PENDING', 'CONFIRMED')
                AND start_time < $4
                AND end_time > $3
            ORDER BY start_time
            "#,
        )
        .bind(resource_id)
        .bind(date)
        .bind(slot.start)
        .bind(slot.end)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            error!("Database error finding conflicting reservations: {}", e);
            AppError::Database(format!("Failed to find conflicting reservations: {}", e))
        })?;

        Self::collect(rows)
    }

    #[instrument(skip(self))]
    async fn compare_and_set_status(
        &self,
        id: Uuid,
        expected: ReservationStatus,
        new: ReservationStatus,
    ) -> AppResult<Option<Reservation>> {
        debug!("Updating reservation {} status {} -> {}", id, expected, new);

        let row = sqlx::query_as::<sqlx::Postgres, ReservationRow>(
            r#"
            UPDATE bookings
            SET status = $3,
                updated_at = NOW()
            WHERE id = $1
                AND status = $2
            RETURNING
                id, turf_id, user_id, booking_date, start_time, end_time,
                player_count, total_amount, status, note, created_at, updated_at
            "#,
        )
        .bind(id)
        .bind(expected.as_str())
        .bind(new.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            error!("Database error updating reservation status: {}", e);
            AppError::Database(format!("Failed to update reservation status: {}", e))
        })?;

        row.map(Reservation::try_from).transpose()
    }

    #[instrument(skip(self))]
    async fn find_by_requester(&self, requester_id: i64) -> AppResult<Vec<Reservation>> {
        debug!("Finding reservations for user: {}", requester_id);

        let rows = sqlx::query_as::<sqlx::Postgres, ReservationRow>(
            r#"
            SELECT
                id, turf_id, user_id, booking_date, start_time, end_time,
                player_count, total_amount, status, note, created_at, updated_at
            FROM bookings
            WHERE user_id = $1
            ORDER BY created_at DESC
            "#,
        )
        .bind(requester_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            error!("Database error finding user reservations: {}", e);
            AppError::Database(format!("Failed to find user reservations: {}", e))
        })?;

        Self::collect(rows)
    }

    #[instrument(skip(self))]
    async fn find_active_for_date(
        &self,
        resource_id: i64,
        date: NaiveDate,
    ) -> AppResult<Vec<Reservation>> {
        debug!("Finding active reservations for turf {} on {}", resource_id, date);

        let rows = sqlx::query_as::<sqlx::Postgres, ReservationRow>(
            r#"
            SELECT
                id, turf_id, user_id, booking_date, start_time, end_time,
                player_count, total_amount, status, note, created_at, updated_at
            FROM bookings
            WHERE turf_id = $1
                AND booking_date = $2
                AND status IN ('PENDING', 'CONFIRMED')
            ORDER BY start_time
            "#,
        )
        .bind(resource_id)
        .bind(date)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            error!("Database error finding turf reservations: {}", e);
            AppError::Database(format!("Failed to find turf reservations: {}", e))
        })?;

        Self::collect(rows)
    }

    #[instrument(skip(self))]
    async fn find_confirmed_ended_before(
        &self,
        now: NaiveDateTime,
    ) -> AppResult<Vec<Reservation>> {
        debug!("Finding confirmed reservations ended before {}", now);

        let rows = sqlx::query_as::<sqlx::Postgres, ReservationRow>(
            r#"
            SELECT
                id, turf_id, user_id, booking_date, start_time, end_time,
                player_count, total_amount, status, note, created_at, updated_at
            FROM bookings
            WHERE status = 'CONFIRMED'
                AND (booking_date + end_time) <= $1
            ORDER BY booking_date, end_time
            "#,
        )
        .bind(now)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            error!("Database error finding elapsed reservations: {}", e);
            AppError::Database(format!("Failed to find elapsed reservations: {}", e))
        })?;

        Self::collect(rows)
    }
}

/// Helper struct for mapping database rows
#[derive(Debug, sqlx::FromRow)]
struct ReservationRow {
    id: Uuid,
    turf_id: i64,
    user_id: i64,
    booking_date: NaiveDate,
    start_time: NaiveTime,
    end_time: NaiveTime,
    player_count: i32,
    total_amount: Decimal,
    status: String,
    note: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<ReservationRow> for Reservation {
    type Error = AppError;

    fn try_from(row: ReservationRow) -> Result<Self, Self::Error> {
        Ok(Self {
            id: row.id,
            resource_id: row.turf_id,
            requester_id: row.user_id,
            date: row.booking_date,
            start_time: row.start_time,
            end_time: row.end_time,
            player_count: u32::try_from(row.player_count).map_err(|_| {
                AppError::Serialization(format!("negative player count on booking {}", row.id))
            })?,
            total_amount: row.total_amount,
            status: row.status.parse()?,
            note: row.note,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::test_support::{seed_turf, test_pool};
    use rust_decimal_macros::dec;
    use turf_core::models::ReservationRequest;

    fn row(status: &str, player_count: i32) -> ReservationRow {
        ReservationRow {
            id: Uuid::new_v4(),
            turf_id: 3,
            user_id: 9,
            booking_date: NaiveDate::from_ymd_opt(2026, 6, 1).unwrap(),
            start_time: NaiveTime::from_hms_opt(18, 0, 0).unwrap(),
            end_time: NaiveTime::from_hms_opt(19, 30, 0).unwrap(),
            player_count,
            total_amount: dec!(750.00),
            status: status.to_string(),
            note: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn test_row_conversion() {
        let reservation = Reservation::try_from(row("CONFIRMED", 10)).unwrap();
        assert_eq!(reservation.status, ReservationStatus::Confirmed);
        assert_eq!(reservation.resource_id, 3);
        assert_eq!(reservation.requester_id, 9);
        assert_eq!(reservation.slot().duration_minutes(), 90);
    }

    #[test]
    fn test_row_conversion_rejects_bad_data() {
        assert!(Reservation::try_from(row("EXPIRED", 10)).is_err());
        assert!(Reservation::try_from(row("PENDING", -1)).is_err());
    }

    fn booking(turf_id: i64, start: (u32, u32), end: (u32, u32)) -> Reservation {
        let request = ReservationRequest {
            requester_id: 9,
            resource_id: turf_id,
            date: NaiveDate::from_ymd_opt(2030, 1, 15).unwrap(),
            start: NaiveTime::from_hms_opt(start.0, start.1, 0).unwrap(),
            end: NaiveTime::from_hms_opt(end.0, end.1, 0).unwrap(),
            player_count: 10,
            note: None,
        };
        Reservation::new(&request, dec!(500.00))
    }

    #[tokio::test]
    #[ignore] // Requires database
    async fn test_insert_rejects_overlap_allows_touching() {
        let pool = test_pool().await;
        let turf = seed_turf(&pool, dec!(500.00)).await;
        let repo = PgReservationRepository::new(pool);

        repo.insert_if_slot_free(&booking(turf, (9, 0), (11, 0)))
            .await
            .unwrap();

        let err = repo
            .insert_if_slot_free(&booking(turf, (10, 0), (12, 0)))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::SlotTaken { .. }));

        repo.insert_if_slot_free(&booking(turf, (11, 0), (12, 0)))
            .await
            .unwrap();
        repo.insert_if_slot_free(&booking(turf, (8, 0), (9, 0)))
            .await
            .unwrap();

        let date = NaiveDate::from_ymd_opt(2030, 1, 15).unwrap();
        let active = repo.find_active_for_date(turf, date).await.unwrap();
        assert_eq!(active.len(), 3);
    }

    #[tokio::test]
    #[ignore] // Requires database
    async fn test_insert_unknown_turf() {
        let repo = PgReservationRepository::new(test_pool().await);
        let err = repo
            .insert_if_slot_free(&booking(-1, (9, 0), (10, 0)))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::ResourceUnavailable(-1)));
    }

    #[tokio::test]
    #[ignore] // Requires database
    async fn test_compare_and_set_miss_leaves_row() {
        let pool = test_pool().await;
        let turf = seed_turf(&pool, dec!(500.00)).await;
        let repo = PgReservationRepository::new(pool);
        let stored = repo
            .insert_if_slot_free(&booking(turf, (9, 0), (10, 0)))
            .await
            .unwrap();

        let miss = repo
            .compare_and_set_status(
                stored.id,
                ReservationStatus::Confirmed,
                ReservationStatus::Completed,
            )
            .await
            .unwrap();
        assert!(miss.is_none());
        let reread = repo.find_by_id(stored.id).await.unwrap().unwrap();
        assert_eq!(reread.status, ReservationStatus::Pending);

        let hit = repo
            .compare_and_set_status(
                stored.id,
                ReservationStatus::Pending,
                ReservationStatus::Cancelled,
            )
            .await
            .unwrap();
        assert_eq!(hit.unwrap().status, ReservationStatus::Cancelled);

        // Cancelled rows no longer block the slot
        repo.insert_if_slot_free(&booking(turf, (9, 0), (10, 0)))
            .await
            .unwrap();
    }

    #[tokio::test]
    #[ignore] // Requires database
    async fn test_concurrent_inserts_admit_one() {
        let pool = test_pool().await;
        let turf = seed_turf(&pool, dec!(500.00)).await;
        let repo = PgReservationRepository::new(pool);

        let attempts = (0..8).map(|_| {
            let repo = repo.clone();
            tokio::spawn(async move {
                repo.insert_if_slot_free(&booking(turf, (18, 0), (19, 0)))
                    .await
            })
        });
        let admitted = futures::future::join_all(attempts)
            .await
            .into_iter()
            .filter(|r| matches!(r, Ok(Ok(_))))
            .count();
        assert_eq!(admitted, 1);
    }
}
