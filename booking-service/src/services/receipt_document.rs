//! Printable receipt documents.

use crate::models::{Payment, Receipt, Reservation, User, Venue};
use askama::Template;
use rust_decimal::Decimal;
use service_core::error::AppError;

#[derive(Debug, Template)]
#[template(path = "receipt.html")]
pub struct ReceiptDocument {
    pub receipt_number: String,
    pub issued_on: String,
    pub status: &'static str,
    pub customer_name: String,
    pub customer_email: String,
    pub venue_name: Option<String>,
    pub service_name: Option<String>,
    pub stay: Option<String>,
    pub subtotal: String,
    pub tax_rate_percent: String,
    pub tax_amount: String,
    pub total: String,
    pub currency: String,
    pub payment_id: String,
    pub payment_reference: Option<String>,
    pub notes: Option<String>,
}

impl ReceiptDocument {
    pub fn new(
        receipt: &Receipt,
        payment: &Payment,
        customer: &User,
        reservation: Option<&Reservation>,
        venue: Option<&Venue>,
        service_name: Option<String>,
    ) -> Self {
        Self {
            receipt_number: receipt.receipt_number.clone(),
            issued_on: receipt.issued_at.format("%Y-%m-%d").to_string(),
            status: receipt.status.as_str(),
            customer_name: customer.name.clone(),
            customer_email: customer.email.clone(),
            venue_name: venue.map(|v| v.name.clone()),
            service_name,
            stay: reservation.map(|r| {
                format!(
                    "{} to {}, {} night(s), {} guest(s)",
                    r.check_in,
                    r.check_out,
                    r.nights(),
                    r.guests
                )
            }),
            subtotal: money(receipt.subtotal),
            tax_rate_percent: (receipt.tax_rate * Decimal::ONE_HUNDRED)
                .normalize()
                .to_string(),
            tax_amount: money(receipt.tax_amount),
            total: money(receipt.total),
            currency: receipt.currency.to_uppercase(),
            payment_id: payment.id.to_string(),
            payment_reference: payment.gateway_reference.clone(),
            notes: receipt.notes.clone(),
        }
    }

    pub fn filename(&self) -> String {
        format!("{}.html", self.receipt_number)
    }

    pub fn to_html(&self) -> Result<String, AppError> {
        self.render()
            .map_err(|e| AppError::InternalError(anyhow::anyhow!("Failed to render receipt: {}", e)))
    }
}

fn money(amount: Decimal) -> String {
    format!("{:.2}", amount)
}
