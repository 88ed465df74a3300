//! Payment record models
//!
//! Payment records form an append-only history per reservation. The only
//! in-place change is the SUCCESS → REFUNDED flip on an original charge, made
//! in the same write that appends its refund record.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::error::AppError;

/// Payment method chosen by the requester
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentMethod {
    CreditCard,
    DebitCard,
    Upi,
    NetBanking,
    Wallet,
}

impl PaymentMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentMethod::CreditCard => "CREDIT_CARD",
            PaymentMethod::DebitCard => "DEBIT_CARD",
            PaymentMethod::Upi => "UPI",
            PaymentMethod::NetBanking => "NET_BANKING",
            PaymentMethod::Wallet => "WALLET",
        }
    }
}

impl fmt::Display for PaymentMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PaymentMethod {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "CREDIT_CARD" => Ok(PaymentMethod::CreditCard),
            "DEBIT_CARD" => Ok(PaymentMethod::DebitCard),
            "UPI" => Ok(PaymentMethod::Upi),
            "NET_BANKING" => Ok(PaymentMethod::NetBanking),
            "WALLET" => Ok(PaymentMethod::Wallet),
            other => Err(AppError::Serialization(format!(
                "unknown payment method: {}",
                other
            ))),
        }
    }
}

/// Payment status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentStatus {
    /// Gateway call in flight
    #[default]
    Pending,
    Success,
    Failed,
    /// Original charge that has been reversed by a refund record
    Refunded,
}

impl PaymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::Pending => "PENDING",
            PaymentStatus::Success => "SUCCESS",
            PaymentStatus::Failed => "FAILED",
            PaymentStatus::Refunded => "REFUNDED",
        }
    }
}

impl fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PaymentStatus {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "PENDING" => Ok(PaymentStatus::Pending),
            "SUCCESS" => Ok(PaymentStatus::Success),
            "FAILED" => Ok(PaymentStatus::Failed),
            "REFUNDED" => Ok(PaymentStatus::Refunded),
            other => Err(AppError::Serialization(format!(
                "unknown payment status: {}",
                other
            ))),
        }
    }
}

/// Payment record entity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaymentRecord {
    /// Unique identifier
    pub id: Uuid,

    /// Reservation this payment belongs to
    pub reservation_id: Uuid,

    /// Human-readable reference (`TXN_<millis>_<hex>`)
    pub reference: String,

    /// Signed amount; negative for refunds
    pub amount: Decimal,

    pub method: PaymentMethod,

    pub status: PaymentStatus,

    /// Opaque gateway payload
    pub gateway_response: Option<Value>,

    /// Original charge this record reverses
    pub refund_of: Option<Uuid>,

    pub created_at: DateTime<Utc>,
}

impl PaymentRecord {
    /// Create a PENDING charge for `amount`
    pub fn charge(reservation_id: Uuid, amount: Decimal, method: PaymentMethod) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            reservation_id,
            reference: generate_reference(now),
            amount,
            method,
            status: PaymentStatus::Pending,
            gateway_response: None,
            refund_of: None,
            created_at: now,
        }
    }

    /// Create the SUCCESS record that reverses this charge
    pub fn refund_for(&self) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            reservation_id: self.reservation_id,
            reference: generate_reference(now),
            amount: -self.amount,
            method: self.method,
            status: PaymentStatus::Success,
            gateway_response: Some(json!({
                "status": "refunded",
                "original_transaction": self.reference,
            })),
            refund_of: Some(self.id),
            created_at: now,
        }
    }

    /// Check if this record is a refund
    pub fn is_refund(&self) -> bool {
        self.refund_of.is_some()
    }

    /// Check if this is a settled original charge that can still be refunded
    pub fn is_refundable(&self) -> bool {
        self.status == PaymentStatus::Success && !self.is_refund()
    }
}

/// Build a `TXN_<millis>_<8 hex>` reference
fn generate_reference(at: DateTime<Utc>) -> String {
    let suffix = Uuid::new_v4().simple().to_string()[..8].to_uppercase();
    format!("TXN_{}_{}", at.timestamp_millis(), suffix)
}
