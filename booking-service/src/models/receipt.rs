//! Receipt model for booking-service.

use super::{PageRequest, UnknownVariant};
use chrono::{DateTime, Utc};
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use std::str::FromStr;
use uuid::Uuid;

/// Fixed tax rate included in every payment amount (16%).
pub const TAX_RATE: Decimal = Decimal::from_parts(16, 0, 0, false, 2);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReceiptStatus {
    Pending,
    Verified,
    Rejected,
    Regenerated,
}

impl ReceiptStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReceiptStatus::Pending => "PENDING",
            ReceiptStatus::Verified => "VERIFIED",
            ReceiptStatus::Rejected => "REJECTED",
            ReceiptStatus::Regenerated => "REGENERATED",
        }
    }
}

impl FromStr for ReceiptStatus {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PENDING" => Ok(ReceiptStatus::Pending),
            "VERIFIED" => Ok(ReceiptStatus::Verified),
            "REJECTED" => Ok(ReceiptStatus::Rejected),
            "REGENERATED" => Ok(ReceiptStatus::Regenerated),
            other => Err(UnknownVariant::new("receipt status", other)),
        }
    }
}

impl TryFrom<String> for ReceiptStatus {
    type Error = UnknownVariant;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

/// Split of a tax-inclusive total into subtotal and tax.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TaxBreakdown {
    pub subtotal: Decimal,
    pub tax_amount: Decimal,
    pub tax_rate: Decimal,
    pub total: Decimal,
}

impl TaxBreakdown {
    /// Subtotal is rounded to cents and tax takes the remainder, so
    /// `subtotal + tax_amount == total` holds exactly.
    pub fn from_total(total: Decimal) -> Self {
        let subtotal = (total / (Decimal::ONE + TAX_RATE))
            .round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero);
        Self {
            subtotal,
            tax_amount: total - subtotal,
            tax_rate: TAX_RATE,
            total,
        }
    }
}

#[derive(Debug, Clone, Serialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Receipt {
    pub id: Uuid,
    pub receipt_number: String,
    pub payment_id: Uuid,
    pub user_id: Uuid,
    pub subtotal: Decimal,
    pub tax_amount: Decimal,
    pub tax_rate: Decimal,
    pub total: Decimal,
    pub currency: String,
    #[sqlx(try_from = "String")]
    pub status: ReceiptStatus,
    pub notes: Option<String>,
    pub issued_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Input for issuing a receipt against a completed payment.
#[derive(Debug, Clone)]
pub struct CreateReceipt {
    pub receipt_number: String,
    pub payment_id: Uuid,
    pub user_id: Uuid,
    pub breakdown: TaxBreakdown,
    pub currency: String,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct UpdateReceipt {
    pub status: Option<ReceiptStatus>,
    pub notes: Option<String>,
    /// Replaces amounts and re-stamps `issued_at`.
    pub breakdown: Option<TaxBreakdown>,
}

#[derive(Debug, Clone, Default)]
pub struct ListReceiptsFilter {
    pub user_id: Option<Uuid>,
    pub venue_owner_id: Option<Uuid>,
    pub status: Option<ReceiptStatus>,
    pub page: PageRequest,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tax_rate_is_sixteen_percent() {
        assert_eq!(TAX_RATE.to_string(), "0.16");
    }

    #[test]
    fn breakdown_of_round_total() {
        let breakdown = TaxBreakdown::from_total(Decimal::new(11600, 2));
        assert_eq!(breakdown.subtotal, Decimal::new(10000, 2));
        assert_eq!(breakdown.tax_amount, Decimal::new(1600, 2));
    }

    #[test]
    fn parts_always_sum_to_total() {
        for cents in [1_i64, 99, 500, 1234, 50000, 99999, 123457] {
            let total = Decimal::new(cents, 2);
            let breakdown = TaxBreakdown::from_total(total);
            assert_eq!(breakdown.subtotal + breakdown.tax_amount, total, "total {total}");
            assert!(breakdown.tax_amount >= Decimal::ZERO);
        }
    }
}
