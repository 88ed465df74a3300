//! Payment record repository implementation
//!
//! Transactions are append-only. The only update paths are the gateway
//! outcome on a PENDING record and the SUCCESS → REFUNDED flip, which is
//! written in the same database transaction as its refund record.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde_json::Value;
use sqlx::PgPool;
use tracing::{debug, error, info, instrument};
use turf_core::{
    models::{PaymentRecord, PaymentStatus},
    traits::PaymentRepository,
    AppError, AppResult,
};
use uuid::Uuid;

/// PostgreSQL implementation of PaymentRepository
#[derive(Clone)]
pub struct PgPaymentRepository {
    pool: PgPool,
}

impl PgPaymentRepository {
    /// Create a new payment repository
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl PaymentRepository for PgPaymentRepository {
    #[instrument(skip(self, record), fields(reference = %record.reference))]
    async fn create(&self, record: &PaymentRecord) -> AppResult<PaymentRecord> {
        debug!("Creating transaction for booking {}", record.reservation_id);

        let row = sqlx::query_as::<sqlx::Postgres, PaymentRow>(
            r#"
            INSERT INTO transactions (
                id, booking_id, reference, amount, payment_method,
                payment_status, gateway_response, refund_of, created_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            RETURNING
                id, booking_id, reference, amount, payment_method,
                payment_status, gateway_response, refund_of, created_at
            "#,
        )
        .bind(record.id)
        .bind(record.reservation_id)
        .bind(&record.reference)
        .bind(record.amount)
        .bind(record.method.as_str())
        .bind(record.status.as_str())
        .bind(&record.gateway_response)
        .bind(record.refund_of)
        .bind(record.created_at)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| {
            error!("Database error creating transaction: {}", e);
            AppError::Database(format!("Failed to create transaction: {}", e))
        })?;

        row.try_into()
    }

    #[instrument(skip(self))]
    async fn find_by_reservation(&self, reservation_id: Uuid) -> AppResult<Vec<PaymentRecord>> {
        debug!("Finding transactions for booking: {}", reservation_id);

        let rows = sqlx::query_as::<sqlx::Postgres, PaymentRow>(
            r#"
            SELECT
                id, booking_id, reference, amount, payment_method,
                payment_status, gateway_response, refund_of, created_at
            FROM transactions
            WHERE booking_id = $1
            ORDER BY created_at, reference
            "#,
        )
        .bind(reservation_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            error!("Database error finding booking transactions: {}", e);
            AppError::Database(format!("Failed to find booking transactions: {}", e))
        })?;

        rows.into_iter().map(PaymentRecord::try_from).collect()
    }

    #[instrument(skip(self, gateway_response))]
    async fn compare_and_set_status(
        &self,
        id: Uuid,
        expected: PaymentStatus,
        new: PaymentStatus,
        gateway_response: Option<Value>,
    ) -> AppResult<Option<PaymentRecord>> {
        debug!("Updating transaction {} status {} -> {}", id, expected, new);

        let row = sqlx::query_as::<sqlx::Postgres, PaymentRow>(
            r#"
            UPDATE transactions
            SET payment_status = $3,
                gateway_response = COALESCE($4, gateway_response)
            WHERE id = $1
                AND payment_status = $2
            RETURNING
                id, booking_id, reference, amount, payment_method,
                payment_status, gateway_response, refund_of, created_at
            "#,
        )
        .bind(id)
        .bind(expected.as_str())
        .bind(new.as_str())
        .bind(gateway_response)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            error!("Database error updating transaction status: {}", e);
            AppError::Database(format!("Failed to update transaction status: {}", e))
        })?;

        row.map(PaymentRecord::try_from).transpose()
    }

    #[instrument(skip(self, refund), fields(refund_reference = %refund.reference))]
    async fn record_refund(
        &self,
        original_id: Uuid,
        refund: &PaymentRecord,
    ) -> AppResult<Option<PaymentRecord>> {
        debug!("Recording refund of transaction {}", original_id);

        // Start transaction
        let mut tx = self.pool.begin().await.map_err(|e| {
            error!("Failed to start transaction: {}", e);
            AppError::Transaction(format!("Failed to start transaction: {}", e))
        })?;

        let flipped: Option<(Uuid,)> = sqlx::query_as(
            r#"
            UPDATE transactions
            SET payment_status = 'REFUNDED'
            WHERE id = $1
                AND payment_status = 'SUCCESS'
                AND refund_of IS NULL
            RETURNING id
            "#,
        )
        .bind(original_id)
        .fetch_optional(&mut *tx)
        .await
        .map_err(|e| {
            error!("Failed to mark transaction refunded: {}", e);
            AppError::Database(format!("Failed to mark transaction refunded: {}", e))
        })?;

        if flipped.is_none() {
            debug!("Transaction {} is not refundable, skipping", original_id);
            return Ok(None);
        }

        let row = sqlx::query_as::<sqlx::Postgres, PaymentRow>(
            r#"
            INSERT INTO transactions (
                id, booking_id, reference, amount, payment_method,
                payment_status, gateway_response, refund_of, created_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            RETURNING
                id, booking_id, reference, amount, payment_method,
                payment_status, gateway_response, refund_of, created_at
            "#,
        )
        .bind(refund.id)
        .bind(refund.reservation_id)
        .bind(&refund.reference)
        .bind(refund.amount)
        .bind(refund.method.as_str())
        .bind(refund.status.as_str())
        .bind(&refund.gateway_response)
        .bind(original_id)
        .bind(refund.created_at)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| {
            error!("Failed to insert refund transaction: {}", e);
            AppError::Database(format!("Failed to insert refund transaction: {}", e))
        })?;

        // Commit transaction
        tx.commit().await.map_err(|e| {
            error!("Failed to commit transaction: {}", e);
            AppError::Transaction(format!("Failed to commit transaction: {}", e))
        })?;

        info!(
            "Refund {} recorded for transaction {} ({})",
            refund.reference, original_id, refund.amount
        );

        row.try_into().map(Some)
    }
}

/// Helper struct for mapping database rows
#[derive(Debug, sqlx::FromRow)]
struct PaymentRow {
    id: Uuid,
    booking_id: Uuid,
    reference: String,
    amount: Decimal,
    payment_method: String,
    payment_status: String,
    gateway_response: Option<Value>,
    refund_of: Option<Uuid>,
    created_at: DateTime<Utc>,
}

impl TryFrom<PaymentRow> for PaymentRecord {
    type Error = AppError;

    fn try_from(row: PaymentRow) -> Result<Self, Self::Error> {
        Ok(Self {
            id: row.id,
            reservation_id: row.booking_id,
            reference: row.reference,
            amount: row.amount,
            method: row.payment_method.parse()?,
            status: row.payment_status.parse()?,
            gateway_response: row.gateway_response,
            refund_of: row.refund_of,
            created_at: row.created_at,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::test_support::{seed_turf, test_pool};
    use crate::repositories::PgReservationRepository;
    use chrono::{NaiveDate, NaiveTime};
    use rust_decimal_macros::dec;
    use turf_core::models::{PaymentMethod, Reservation, ReservationRequest};
    use turf_core::traits::ReservationRepository;

    async fn settled_charge(pool: &PgPool) -> (PgPaymentRepository, PaymentRecord) {
        let turf = seed_turf(pool, dec!(500.00)).await;
        let request = ReservationRequest {
            requester_id: 9,
            resource_id: turf,
            date: NaiveDate::from_ymd_opt(2030, 1, 15).unwrap(),
            start: NaiveTime::from_hms_opt(9, 0, 0).unwrap(),
            end: NaiveTime::from_hms_opt(10, 0, 0).unwrap(),
            player_count: 10,
            note: None,
        };
        let booking = PgReservationRepository::new(pool.clone())
            .insert_if_slot_free(&Reservation::new(&request, dec!(500.00)))
            .await
            .unwrap();

        let repo = PgPaymentRepository::new(pool.clone());
        let pending = repo
            .create(&PaymentRecord::charge(booking.id, dec!(500.00), PaymentMethod::Upi))
            .await
            .unwrap();
        let settled = repo
            .compare_and_set_status(
                pending.id,
                PaymentStatus::Pending,
                PaymentStatus::Success,
                Some(serde_json::json!({ "status": "success" })),
            )
            .await
            .unwrap()
            .unwrap();
        (repo, settled)
    }

    #[tokio::test]
    #[ignore] // Requires database
    async fn test_settle_is_compare_and_set() {
        let pool = test_pool().await;
        let (repo, settled) = settled_charge(&pool).await;
        assert_eq!(settled.gateway_response.as_ref().unwrap()["status"], "success");

        let again = repo
            .compare_and_set_status(
                settled.id,
                PaymentStatus::Pending,
                PaymentStatus::Failed,
                None,
            )
            .await
            .unwrap();
        assert!(again.is_none());
    }

    #[tokio::test]
    #[ignore] // Requires database
    async fn test_record_refund_once() {
        let pool = test_pool().await;
        let (repo, charge) = settled_charge(&pool).await;

        let refund = repo
            .record_refund(charge.id, &charge.refund_for())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(refund.amount, dec!(-500.00));
        assert_eq!(refund.refund_of, Some(charge.id));

        let second = repo
            .record_refund(charge.id, &charge.refund_for())
            .await
            .unwrap();
        assert!(second.is_none());

        let history = repo.find_by_reservation(charge.reservation_id).await.unwrap();
        assert_eq!(history.len(), 2);
        let original = history.iter().find(|p| p.id == charge.id).unwrap();
        assert_eq!(original.status, PaymentStatus::Refunded);
    }
}
