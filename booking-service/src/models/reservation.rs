use super::{PageRequest, UnknownVariant};
use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use std::str::FromStr;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReservationStatus {
    Pending,
    Confirmed,
    Cancelled,
    Completed,
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

    pub fn can_transition_to(self, next: ReservationStatus) -> bool {
        use ReservationStatus::*;
        matches!(
            (self, next),
            (Pending, Confirmed) | (Pending, Cancelled) | (Confirmed, Cancelled) | (Confirmed, Completed)
        )
    }

    /// Statuses a payment outcome may move a reservation out of. A failed or
    /// fully refunded payment cancels any reservation not already cancelled,
    /// including a completed stay.
    pub fn payment_driven_sources(target: ReservationStatus) -> Vec<ReservationStatus> {
        use ReservationStatus::*;
        [Pending, Confirmed, Cancelled, Completed]
            .into_iter()
            .filter(|s| match target {
                Cancelled => *s != Cancelled,
                _ => s.can_transition_to(target),
            })
            .collect()
    }

    pub fn accepts_payment_effect(self, target: ReservationStatus) -> bool {
        Self::payment_driven_sources(target).contains(&self)
    }
}

impl FromStr for ReservationStatus {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PENDING" => Ok(ReservationStatus::Pending),
            "CONFIRMED" => Ok(ReservationStatus::Confirmed),
            "CANCELLED" => Ok(ReservationStatus::Cancelled),
            "COMPLETED" => Ok(ReservationStatus::Completed),
            other => Err(UnknownVariant::new("reservation status", other)),
        }
    }
}

impl TryFrom<String> for ReservationStatus {
    type Error = UnknownVariant;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

#[derive(Debug, Clone, Serialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Reservation {
    pub id: Uuid,
    pub user_id: Uuid,
    pub venue_id: Uuid,
    pub service_id: Uuid,
    pub check_in: NaiveDate,
    pub check_out: NaiveDate,
    pub guests: i32,
    #[sqlx(try_from = "String")]
    pub status: ReservationStatus,
    pub total_amount: Decimal,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Reservation {
    /// Number of nights booked; a same-day stay counts as one.
    pub fn nights(&self) -> i64 {
        nights_between(self.check_in, self.check_out)
    }
}

pub fn nights_between(check_in: NaiveDate, check_out: NaiveDate) -> i64 {
    (check_out - check_in).num_days().max(1)
}

/// Total for a stay: nightly price times nights.
pub fn quote_total(price: Decimal, check_in: NaiveDate, check_out: NaiveDate) -> Decimal {
    price * Decimal::from(nights_between(check_in, check_out))
}

#[derive(Debug, Clone)]
pub struct CreateReservation {
    pub user_id: Uuid,
    pub venue_id: Uuid,
    pub service_id: Uuid,
    pub check_in: NaiveDate,
    pub check_out: NaiveDate,
    pub guests: i32,
    pub total_amount: Decimal,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct ListReservationsFilter {
    pub user_id: Option<Uuid>,
    pub venue_owner_id: Option<Uuid>,
    pub status: Option<ReservationStatus>,
    pub page: PageRequest,
}
