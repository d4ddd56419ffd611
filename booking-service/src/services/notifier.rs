//! User and admin notifications that follow payment transitions.
//!
//! Every send goes through a [`DeliveryPolicy`]. Reconciliation uses
//! [`DeliveryPolicy::BestEffort`]: a failed email or notification record is
//! logged and counted, never retried, and never undoes the payment change.

use crate::models::{
    CreateNotification, Notification, NotificationAudience, NotificationKind, Payment,
    Reservation, User, Venue,
};
use crate::services::email::{EmailMessage, EmailProvider};
use crate::services::metrics::record_email;
use crate::services::repository::BookingStore;
use service_core::error::AppError;
use std::sync::Arc;
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryPolicy {
    /// Log and count failures, then continue.
    BestEffort,
    /// Surface the first failure to the caller.
    Strict,
}

impl DeliveryPolicy {
    fn absorb(self, step: &'static str, err: AppError) -> Result<(), AppError> {
        match self {
            DeliveryPolicy::BestEffort => {
                warn!(step = step, error = %err, "Notification step failed, continuing");
                Ok(())
            }
            DeliveryPolicy::Strict => Err(err),
        }
    }
}

/// Who and what a payment notification is about.
struct PaymentContext {
    user: User,
    reservation: Option<Reservation>,
    venue: Option<Venue>,
    service_name: Option<String>,
}

#[derive(Clone)]
pub struct Notifier {
    store: Arc<dyn BookingStore>,
    email: Arc<dyn EmailProvider>,
    public_base_url: String,
}

impl Notifier {
    pub fn new(
        store: Arc<dyn BookingStore>,
        email: Arc<dyn EmailProvider>,
        public_base_url: String,
    ) -> Self {
        Self {
            store,
            email,
            public_base_url,
        }
    }

    /// Payment and reservation confirmation for the payer, plus an admin
    /// notice for the venue.
    pub async fn payment_completed(
        &self,
        payment: &Payment,
        policy: DeliveryPolicy,
    ) -> Result<(), AppError> {
        let ctx = match self.context(payment).await {
            Ok(ctx) => ctx,
            Err(e) => return policy.absorb("load_context", e),
        };

        let amount = format!("{} {}", payment.amount, payment.currency.to_uppercase());

        let payment_email = EmailMessage {
            to: ctx.user.email.clone(),
            subject: "Payment confirmed".to_string(),
            body_text: format!(
                "Hi {},\n\nWe received your payment of {}.\nPayment reference: {}\n\nView your bookings: {}/reservations",
                ctx.user.name, amount, payment.id, self.public_base_url
            ),
            body_html: None,
        };
        let email_sent = self.deliver("payment_confirmation", &payment_email, policy).await?;

        if let Some(ref reservation) = ctx.reservation {
            let venue_name = ctx
                .venue
                .as_ref()
                .map(|v| v.name.as_str())
                .unwrap_or("your venue");
            let reservation_email = EmailMessage {
                to: ctx.user.email.clone(),
                subject: format!("Reservation confirmed at {}", venue_name),
                body_text: format!(
                    "Hi {},\n\nYour reservation{} at {} is confirmed.\nCheck-in: {}\nCheck-out: {}\nGuests: {}\nTotal: {}\n",
                    ctx.user.name,
                    ctx.service_name
                        .as_deref()
                        .map(|s| format!(" for {}", s))
                        .unwrap_or_default(),
                    venue_name,
                    reservation.check_in,
                    reservation.check_out,
                    reservation.guests,
                    amount
                ),
                body_html: None,
            };
            self.deliver("reservation_confirmation", &reservation_email, policy)
                .await?;
        }

        let record = CreateNotification {
            audience: NotificationAudience::User,
            user_id: Some(ctx.user.id),
            venue_id: ctx.venue.as_ref().map(|v| v.id),
            kind: NotificationKind::PaymentConfirmed,
            title: "Payment confirmed".to_string(),
            message: format!("Your payment of {} was received.", amount),
            email_sent,
        };
        self.record(&record, policy).await?;

        if let (Some(reservation), Some(venue)) = (&ctx.reservation, &ctx.venue) {
            let admin_record = CreateNotification {
                audience: NotificationAudience::Admin,
                user_id: Some(ctx.user.id),
                venue_id: Some(venue.id),
                kind: NotificationKind::ReservationConfirmed,
                title: "New confirmed reservation".to_string(),
                message: format!(
                    "{} paid {} for {} to {} at {}.",
                    ctx.user.name, amount, reservation.check_in, reservation.check_out, venue.name
                ),
                email_sent: false,
            };
            self.record(&admin_record, policy).await?;
        }

        Ok(())
    }

    pub async fn payment_failed(
        &self,
        payment: &Payment,
        reason: Option<&str>,
        policy: DeliveryPolicy,
    ) -> Result<(), AppError> {
        let ctx = match self.context(payment).await {
            Ok(ctx) => ctx,
            Err(e) => return policy.absorb("load_context", e),
        };

        let reason = reason.unwrap_or("The payment could not be completed");
        let cancelled = if ctx.reservation.is_some() {
            " Your reservation has been cancelled."
        } else {
            ""
        };

        let email = EmailMessage {
            to: ctx.user.email.clone(),
            subject: "Payment failed".to_string(),
            body_text: format!(
                "Hi {},\n\nYour payment of {} {} failed: {}.{}\n",
                ctx.user.name,
                payment.amount,
                payment.currency.to_uppercase(),
                reason,
                cancelled
            ),
            body_html: None,
        };
        let email_sent = self.deliver("payment_failed", &email, policy).await?;

        let record = CreateNotification {
            audience: NotificationAudience::User,
            user_id: Some(ctx.user.id),
            venue_id: ctx.venue.as_ref().map(|v| v.id),
            kind: NotificationKind::PaymentFailed,
            title: "Payment failed".to_string(),
            message: format!("{}.{}", reason, cancelled),
            email_sent,
        };
        self.record(&record, policy).await?;

        Ok(())
    }

    pub async fn payment_refunded(
        &self,
        payment: &Payment,
        policy: DeliveryPolicy,
    ) -> Result<(), AppError> {
        let ctx = match self.context(payment).await {
            Ok(ctx) => ctx,
            Err(e) => return policy.absorb("load_context", e),
        };

        let amount = format!("{} {}", payment.amount, payment.currency.to_uppercase());

        let email = EmailMessage {
            to: ctx.user.email.clone(),
            subject: "Payment refunded".to_string(),
            body_text: format!(
                "Hi {},\n\nYour payment of {} has been refunded in full and the reservation cancelled.\n",
                ctx.user.name, amount
            ),
            body_html: None,
        };
        let email_sent = self.deliver("payment_refunded", &email, policy).await?;

        let record = CreateNotification {
            audience: NotificationAudience::User,
            user_id: Some(ctx.user.id),
            venue_id: ctx.venue.as_ref().map(|v| v.id),
            kind: NotificationKind::PaymentRefunded,
            title: "Payment refunded".to_string(),
            message: format!("{} was refunded and the reservation cancelled.", amount),
            email_sent,
        };
        self.record(&record, policy).await?;

        Ok(())
    }

    /// Create a user notification, optionally mirrored by email.
    pub async fn notify_user(
        &self,
        user: &User,
        kind: NotificationKind,
        title: &str,
        message: &str,
        send_email: bool,
        policy: DeliveryPolicy,
    ) -> Result<Notification, AppError> {
        let email_sent = if send_email {
            let email = EmailMessage {
                to: user.email.clone(),
                subject: title.to_string(),
                body_text: message.to_string(),
                body_html: None,
            };
            self.deliver(kind.as_str(), &email, policy).await?
        } else {
            false
        };

        self.store
            .create_notification(&CreateNotification {
                audience: NotificationAudience::User,
                user_id: Some(user.id),
                venue_id: None,
                kind,
                title: title.to_string(),
                message: message.to_string(),
                email_sent,
            })
            .await
    }

    async fn context(&self, payment: &Payment) -> Result<PaymentContext, AppError> {
        let user = self
            .store
            .get_user(payment.user_id)
            .await?
            .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Payer not found")))?;

        let reservation = match payment.reservation_id {
            Some(id) => self.store.get_reservation(id).await?,
            None => None,
        };

        let (venue, service_name) = match reservation {
            Some(ref r) => (
                self.store.get_venue(r.venue_id).await?,
                self.store.get_service(r.service_id).await?.map(|s| s.name),
            ),
            None => (None, None),
        };

        Ok(PaymentContext {
            user,
            reservation,
            venue,
            service_name,
        })
    }

    /// Returns whether the email went out.
    async fn deliver(
        &self,
        kind: &'static str,
        email: &EmailMessage,
        policy: DeliveryPolicy,
    ) -> Result<bool, AppError> {
        match self.email.send(email).await {
            Ok(response) => {
                record_email(kind, "sent");
                info!(kind = kind, provider_id = ?response.provider_id, "Notification email sent");
                Ok(true)
            }
            Err(e) => {
                record_email(kind, "failed");
                policy
                    .absorb(kind, AppError::EmailError(e.to_string()))
                    .map(|_| false)
            }
        }
    }

    async fn record(
        &self,
        input: &CreateNotification,
        policy: DeliveryPolicy,
    ) -> Result<(), AppError> {
        match self.store.create_notification(input).await {
            Ok(notification) => {
                info!(notification_id = %notification.id, kind = notification.kind.as_str(), "Notification recorded");
                Ok(())
            }
            Err(e) => policy.absorb("record_notification", e),
        }
    }
}
