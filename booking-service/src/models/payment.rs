use super::{PageRequest, ReservationStatus, UnknownVariant};
use chrono::{DateTime, Utc};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use service_core::error::AppError;
use sqlx::FromRow;
use std::str::FromStr;
use thiserror::Error;
use uuid::Uuid;

/// Payment lifecycle.
///
/// ```text
/// PENDING -> COMPLETED -> REFUNDED
/// PENDING -> FAILED
/// PENDING -> CANCELLED
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentStatus {
    Pending,
    Completed,
    Failed,
    Cancelled,
    Refunded,
}

impl PaymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::Pending => "PENDING",
            PaymentStatus::Completed => "COMPLETED",
            PaymentStatus::Failed => "FAILED",
            PaymentStatus::Cancelled => "CANCELLED",
            PaymentStatus::Refunded => "REFUNDED",
        }
    }

    pub fn can_transition_to(self, next: PaymentStatus) -> bool {
        use PaymentStatus::*;
        matches!(
            (self, next),
            (Pending, Completed) | (Pending, Failed) | (Pending, Cancelled) | (Completed, Refunded)
        )
    }

    /// Reservation status implied by a payment entering this status.
    pub fn reservation_effect(self) -> Option<ReservationStatus> {
        match self {
            PaymentStatus::Completed => Some(ReservationStatus::Confirmed),
            PaymentStatus::Failed | PaymentStatus::Cancelled | PaymentStatus::Refunded => {
                Some(ReservationStatus::Cancelled)
            }
            PaymentStatus::Pending => None,
        }
    }
}

impl FromStr for PaymentStatus {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PENDING" => Ok(PaymentStatus::Pending),
            "COMPLETED" => Ok(PaymentStatus::Completed),
            "FAILED" => Ok(PaymentStatus::Failed),
            "CANCELLED" => Ok(PaymentStatus::Cancelled),
            "REFUNDED" => Ok(PaymentStatus::Refunded),
            other => Err(UnknownVariant::new("payment status", other)),
        }
    }
}

impl TryFrom<String> for PaymentStatus {
    type Error = UnknownVariant;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

#[derive(Debug, Clone, Serialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Payment {
    pub id: Uuid,
    pub user_id: Uuid,
    pub reservation_id: Option<Uuid>,
    pub amount: Decimal,
    pub currency: String,
    #[sqlx(try_from = "String")]
    pub status: PaymentStatus,
    pub gateway_reference: Option<String>,
    pub metadata: Value,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Payment {
    pub fn metadata_value(&self, key: &str) -> Option<&Value> {
        self.metadata.get(key)
    }

    /// Running total refunded so far, in minor units.
    pub fn refunded_minor_units(&self) -> i64 {
        self.metadata_value("partialRefundAmount")
            .and_then(Value::as_i64)
            .unwrap_or(0)
    }
}

#[derive(Debug, Clone)]
pub struct CreatePayment {
    pub user_id: Uuid,
    pub reservation_id: Option<Uuid>,
    pub amount: Decimal,
    pub currency: String,
    pub gateway_reference: Option<String>,
    pub metadata: Value,
}

#[derive(Debug, Clone, Default)]
pub struct ListPaymentsFilter {
    pub user_id: Option<Uuid>,
    pub venue_owner_id: Option<Uuid>,
    pub status: Option<PaymentStatus>,
    pub reservation_id: Option<Uuid>,
    pub page: PageRequest,
}

/// Gateway callback that caused a transition; its id is the idempotency key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessedEvent {
    pub event_id: String,
    pub event_type: String,
}

/// One atomic change to a payment and its reservation.
///
/// `from == to` is a metadata-only update guarded by the current status.
#[derive(Debug, Clone)]
pub struct PaymentTransition {
    pub payment_id: Uuid,
    pub from: PaymentStatus,
    pub to: PaymentStatus,
    pub metadata: Map<String, Value>,
    pub reservation_status: Option<ReservationStatus>,
    pub event: Option<ProcessedEvent>,
}

impl PaymentTransition {
    /// Like [`PaymentTransition::new`] but rejects moves the lifecycle forbids.
    /// Staying in the current status is always allowed.
    pub fn checked(payment: &Payment, to: PaymentStatus) -> Result<Self, TransitionError> {
        if to != payment.status && !payment.status.can_transition_to(to) {
            return Err(TransitionError {
                from: payment.status,
                to,
            });
        }
        Ok(Self::new(payment, to))
    }

    pub fn new(payment: &Payment, to: PaymentStatus) -> Self {
        Self {
            payment_id: payment.id,
            from: payment.status,
            to,
            metadata: Map::new(),
            reservation_status: to.reservation_effect().filter(|_| to != payment.status),
            event: None,
        }
    }

    pub fn with_metadata(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.metadata.insert(key.to_string(), value.into());
        self
    }

    pub fn with_event(mut self, event: ProcessedEvent) -> Self {
        self.event = Some(event);
        self
    }

    pub fn is_status_change(&self) -> bool {
        self.from != self.to
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("payment cannot move from {} to {}", from.as_str(), to.as_str())]
pub struct TransitionError {
    pub from: PaymentStatus,
    pub to: PaymentStatus,
}

impl From<TransitionError> for AppError {
    fn from(err: TransitionError) -> Self {
        AppError::BadRequest(anyhow::Error::new(err))
    }
}

#[derive(Debug, Clone)]
pub enum TransitionOutcome {
    Applied(Payment),
    /// The triggering event id was already recorded.
    AlreadyProcessed,
    /// The payment left `from` before the update ran.
    StatusChanged(PaymentStatus),
}

/// Convert a major-unit amount to the gateway's smallest currency unit.
pub fn to_minor_units(amount: Decimal) -> Option<i64> {
    (amount * Decimal::ONE_HUNDRED)
        .round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero)
        .to_i64()
}

pub fn from_minor_units(amount: i64) -> Decimal {
    Decimal::new(amount, 2)
}
