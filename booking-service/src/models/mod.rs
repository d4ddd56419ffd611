//! Domain models for booking-service.

mod notification;
mod pagination;
mod payment;
mod receipt;
mod reservation;
mod service;
mod user;
mod venue;

pub use notification::{
    CreateNotification, ListNotificationsFilter, Notification, NotificationAudience,
    NotificationKind, NotificationStats,
};
pub use pagination::{Page, PageRequest};
pub use payment::{
    from_minor_units, to_minor_units, CreatePayment, ListPaymentsFilter, Payment, PaymentStatus,
    PaymentTransition, ProcessedEvent, TransitionError, TransitionOutcome,
};
pub use receipt::{
    CreateReceipt, ListReceiptsFilter, Receipt, ReceiptStatus, TaxBreakdown, UpdateReceipt,
    TAX_RATE,
};
pub use reservation::{
    nights_between, quote_total, CreateReservation, ListReservationsFilter, Reservation,
    ReservationStatus,
};
pub use service::{CreateService, ListServicesFilter, Service, UpdateService};
pub use user::{CreateUser, ListUsersFilter, Role, UpdateUser, User};
pub use venue::{CreateVenue, ListVenuesFilter, UpdateVenue, Venue};

use thiserror::Error;

/// A stored enum column held a value this build does not know.
#[derive(Debug, Error)]
#[error("unknown {kind} value: {value}")]
pub struct UnknownVariant {
    pub kind: &'static str,
    pub value: String,
}

impl UnknownVariant {
    pub(crate) fn new(kind: &'static str, value: &str) -> Self {
        Self {
            kind,
            value: value.to_string(),
        }
    }
}
