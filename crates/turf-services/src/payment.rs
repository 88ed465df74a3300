//! Payment and refund coordination
//!
//! A charge writes a PENDING record, calls the gateway under a timeout and
//! settles the record to SUCCESS or FAILED. Gateway failures never escape
//! as errors; they become FAILED records and the reservation stays PENDING.
//! Refunds append a negated SUCCESS record and flip the original to
//! REFUNDED in one storage write.

use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;
use tracing::{error, info, instrument, warn};
use turf_core::{
    models::{PaymentMethod, PaymentRecord, PaymentStatus, ReservationStatus},
    traits::{PaymentGateway, PaymentRepository, ReservationRepository, ResourceCatalog},
    AppError, AppResult,
};
use uuid::Uuid;

use crate::reservation_engine::ReservationEngine;

/// Payment history and refunds of reservations
pub struct PaymentLedger<P: PaymentRepository> {
    payments: Arc<P>,
}

impl<P: PaymentRepository> Clone for PaymentLedger<P> {
    fn clone(&self) -> Self {
        Self {
            payments: Arc::clone(&self.payments),
        }
    }
}

impl<P: PaymentRepository> PaymentLedger<P> {
    pub fn new(payments: Arc<P>) -> Self {
        Self { payments }
    }

    pub(crate) fn store(&self) -> &Arc<P> {
        &self.payments
    }

    /// All payment records of a reservation, oldest first
    pub async fn payments_for(&self, reservation_id: Uuid) -> AppResult<Vec<PaymentRecord>> {
        self.payments.find_by_reservation(reservation_id).await
    }

    /// Reverse every settled original charge of a reservation
    ///
    /// Returns the refund records written. A reservation with no settled
    /// charge yields an empty list.
    #[instrument(skip(self))]
    pub async fn refund(&self, reservation_id: Uuid) -> AppResult<Vec<PaymentRecord>> {
        let history = self.payments.find_by_reservation(reservation_id).await?;

        let mut refunds = Vec::new();
        for original in history.iter().filter(|p| p.is_refundable()) {
            match self
                .payments
                .record_refund(original.id, &original.refund_for())
                .await?
            {
                Some(refund) => {
                    info!(
                        "Refunded {} ({}) for reservation {}",
                        original.reference, original.amount, reservation_id
                    );
                    refunds.push(refund);
                }
                // Refunded concurrently
                None => warn!("Payment {} no longer refundable", original.reference),
            }
        }

        Ok(refunds)
    }
}

/// Drives a charge through the gateway and into the reservation lifecycle
pub struct PaymentCoordinator<C, R, P, G>
where
    C: ResourceCatalog,
    R: ReservationRepository,
    P: PaymentRepository,
    G: PaymentGateway,
{
    engine: Arc<ReservationEngine<C, R, P>>,
    payments: Arc<P>,
    gateway: Arc<G>,
    gateway_timeout: Duration,
}

impl<C, R, P, G> PaymentCoordinator<C, R, P, G>
where
    C: ResourceCatalog,
    R: ReservationRepository,
    P: PaymentRepository,
    G: PaymentGateway,
{
    /// Create a coordinator writing through the engine's payment store; the
    /// gateway timeout comes from the engine's booking configuration
    pub fn new(engine: Arc<ReservationEngine<C, R, P>>, gateway: Arc<G>) -> Self {
        let gateway_timeout = Duration::from_secs(engine.config().gateway_timeout_secs);
        let payments = Arc::clone(engine.ledger().store());
        Self {
            engine,
            payments,
            gateway,
            gateway_timeout,
        }
    }

    /// Charge the reservation's total amount and confirm it on success
    ///
    /// # Returns
    ///
    /// The settled payment record: SUCCESS with the reservation CONFIRMED,
    /// or FAILED with the reservation left PENDING.
    ///
    /// # Errors
    ///
    /// - `ReservationNotFound` if the reservation does not exist
    /// - `AlreadyConfirmed` / `IllegalTransition` if it is not PENDING.
    ///   When the state changes while the gateway call is in flight, the
    ///   fresh charge is refunded before the error is returned.
    #[instrument(skip(self, details))]
    pub async fn charge(
        &self,
        reservation_id: Uuid,
        method: PaymentMethod,
        details: &str,
    ) -> AppResult<PaymentRecord> {
        let reservation = self.engine.get_reservation(reservation_id).await?;
        match reservation.status {
            ReservationStatus::Pending => {}
            ReservationStatus::Confirmed => {
                return Err(AppError::AlreadyConfirmed(reservation_id));
            }
            from => {
                return Err(AppError::IllegalTransition {
                    from,
                    to: ReservationStatus::Confirmed,
                });
            }
        }

        let record = self
            .payments
            .create(&PaymentRecord::charge(
                reservation_id,
                reservation.total_amount,
                method,
            ))
            .await?;

        info!(
            "Charging {} via {} for reservation {} ({})",
            record.amount, method, reservation_id, record.reference
        );

        let outcome = match timeout(
            self.gateway_timeout,
            self.gateway.attempt(record.amount, method, details),
        )
        .await
        {
            Ok(Ok(settled)) => Ok(settled),
            Ok(Err(e)) => Err(e),
            Err(_) => Err(AppError::GatewayTimeout(self.gateway_timeout.as_secs())),
        };

        let (status, response) = match outcome {
            Ok(true) => (
                PaymentStatus::Success,
                json!({ "status": "success", "transaction_id": record.reference }),
            ),
            Ok(false) => (
                PaymentStatus::Failed,
                json!({ "status": "failed", "reason": "declined" }),
            ),
            Err(e) => {
                error!("Gateway error charging {}: {}", record.reference, e);
                (
                    PaymentStatus::Failed,
                    json!({ "status": "error", "message": e.to_string() }),
                )
            }
        };

        let settled = self
            .payments
            .compare_and_set_status(record.id, PaymentStatus::Pending, status, Some(response))
            .await?
            .ok_or(AppError::PaymentNotFound(record.id))?;

        if settled.status == PaymentStatus::Failed {
            warn!(
                "Payment {} failed; reservation {} stays PENDING",
                settled.reference, reservation_id
            );
            return Ok(settled);
        }

        if let Err(e) = self.engine.confirm_reservation(reservation_id).await {
            warn!(
                "Reservation {} changed during payment {}: {}; refunding",
                reservation_id, settled.reference, e
            );
            self.payments
                .record_refund(settled.id, &settled.refund_for())
                .await?;
            return Err(e);
        }

        info!(
            "Payment {} settled; reservation {} confirmed",
            settled.reference, reservation_id
        );
        Ok(settled)
    }

    /// Refund every settled charge of an existing reservation
    #[instrument(skip(self))]
    pub async fn refund(&self, reservation_id: Uuid) -> AppResult<Vec<PaymentRecord>> {
        self.engine.get_reservation(reservation_id).await?;
        self.engine.ledger().refund(reservation_id).await
    }
}
