//! Applies verified gateway callbacks to local payments and reservations.

use crate::models::{
    Payment, PaymentStatus, PaymentTransition, ProcessedEvent, TransitionOutcome,
};
use crate::services::metrics::record_webhook_event;
use crate::services::notifier::{DeliveryPolicy, Notifier};
use crate::services::repository::BookingStore;
use crate::services::stripe::{EventKind, GatewayEvent, SignatureError, StripeClient};
use chrono::Utc;
use serde::Serialize;
use service_core::error::AppError;
use std::sync::Arc;
use tracing::{error, info, instrument, warn};

/// What a verified event did to local state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReconcileOutcome {
    /// Status (and reservation) updated.
    Applied,
    /// Metadata-only annotation of a partial refund.
    PartialRefundRecorded,
    /// This event id was handled before.
    AlreadyProcessed,
    /// The payment already holds the target status.
    AlreadyInState,
    /// The lifecycle does not allow the requested move.
    InvalidTransition,
    /// A concurrent update moved the payment first.
    Superseded,
    PaymentNotFound,
    Ignored,
    Failed,
}

impl ReconcileOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReconcileOutcome::Applied => "applied",
            ReconcileOutcome::PartialRefundRecorded => "partial_refund_recorded",
            ReconcileOutcome::AlreadyProcessed => "already_processed",
            ReconcileOutcome::AlreadyInState => "already_in_state",
            ReconcileOutcome::InvalidTransition => "invalid_transition",
            ReconcileOutcome::Superseded => "superseded",
            ReconcileOutcome::PaymentNotFound => "payment_not_found",
            ReconcileOutcome::Ignored => "ignored",
            ReconcileOutcome::Failed => "failed",
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AckData {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub event_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub event_id: Option<String>,
    pub outcome: ReconcileOutcome,
}

/// Body returned to the gateway for every verified callback.
#[derive(Debug, Clone, Serialize)]
pub struct WebhookAck {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub data: AckData,
}

impl WebhookAck {
    fn processed(event: &GatewayEvent, outcome: ReconcileOutcome) -> Self {
        Self {
            success: true,
            message: Some("Webhook processed".to_string()),
            error: None,
            data: AckData {
                event_type: Some(event.event_type.clone()),
                event_id: Some(event.id.clone()),
                outcome,
            },
        }
    }

    fn failed(event: Option<&GatewayEvent>, error: String) -> Self {
        Self {
            success: false,
            message: None,
            error: Some(error),
            data: AckData {
                event_type: event.map(|e| e.event_type.clone()),
                event_id: event.map(|e| e.id.clone()),
                outcome: ReconcileOutcome::Failed,
            },
        }
    }
}

#[derive(Clone)]
pub struct PaymentReconciler {
    store: Arc<dyn BookingStore>,
    stripe: StripeClient,
    notifier: Notifier,
}

impl PaymentReconciler {
    pub fn new(store: Arc<dyn BookingStore>, stripe: StripeClient, notifier: Notifier) -> Self {
        Self {
            store,
            stripe,
            notifier,
        }
    }

    /// Verify, parse and apply one gateway callback.
    ///
    /// Only a signature failure is an `Err`; once verified, every event is
    /// acknowledged and processing errors are reported in the ack body.
    #[instrument(skip_all, fields(payload_len = raw_payload.len()))]
    pub async fn handle_gateway_event(
        &self,
        raw_payload: &[u8],
        signature_header: Option<&str>,
    ) -> Result<WebhookAck, SignatureError> {
        if let Err(e) = self
            .stripe
            .verify_webhook_signature(raw_payload, signature_header)
        {
            record_webhook_event("unverified", "rejected");
            warn!(error = %e, "Rejected webhook");
            return Err(e);
        }

        let event = match StripeClient::parse_event(raw_payload) {
            Ok(event) => event,
            Err(e) => {
                record_webhook_event("unparsed", ReconcileOutcome::Failed.as_str());
                warn!(error = %e, "Verified webhook with malformed payload");
                return Ok(WebhookAck::failed(None, "Invalid webhook payload".to_string()));
            }
        };

        info!(event_id = %event.id, event_type = %event.event_type, "Processing webhook");

        let ack = match self.dispatch(&event).await {
            Ok(outcome) => WebhookAck::processed(&event, outcome),
            Err(e) => {
                error!(event_id = %event.id, error = %e, "Webhook processing failed");
                WebhookAck::failed(Some(&event), e.to_string())
            }
        };

        record_webhook_event(&event.event_type, ack.data.outcome.as_str());

        Ok(ack)
    }

    async fn dispatch(&self, event: &GatewayEvent) -> Result<ReconcileOutcome, AppError> {
        match event.kind() {
            EventKind::PaymentSucceeded => self.payment_succeeded(event).await,
            EventKind::PaymentFailed | EventKind::PaymentCanceled => {
                self.payment_failed(event).await
            }
            EventKind::ChargeRefunded => self.charge_refunded(event).await,
            EventKind::Unhandled => {
                info!(event_type = %event.event_type, "Ignoring unhandled webhook event");
                Ok(ReconcileOutcome::Ignored)
            }
        }
    }

    async fn payment_succeeded(&self, event: &GatewayEvent) -> Result<ReconcileOutcome, AppError> {
        let intent = event.payment_intent().map_err(invalid_object)?;

        let Some(payment) = self.find_payment(&[intent.id.as_str()]).await? else {
            return Ok(ReconcileOutcome::PaymentNotFound);
        };

        if payment.status == PaymentStatus::Completed {
            info!(payment_id = %payment.id, "Payment already completed");
            return Ok(ReconcileOutcome::AlreadyInState);
        }

        let Some(transition) = checked(&payment, PaymentStatus::Completed) else {
            return Ok(ReconcileOutcome::InvalidTransition);
        };
        let transition = transition
            .with_metadata(
                "gatewayStatus",
                intent.status.unwrap_or_else(|| "succeeded".to_string()),
            )
            .with_metadata("processedAt", Utc::now().to_rfc3339())
            .with_event(processed(event));

        let outcome = self.apply(&transition).await?;
        if let TransitionOutcome::Applied(ref updated) = outcome {
            self.notifier
                .payment_completed(updated, DeliveryPolicy::BestEffort)
                .await?;
        }

        Ok(reconcile_outcome(outcome))
    }

    async fn payment_failed(&self, event: &GatewayEvent) -> Result<ReconcileOutcome, AppError> {
        let intent = event.payment_intent().map_err(invalid_object)?;

        let Some(payment) = self.find_payment(&[intent.id.as_str()]).await? else {
            return Ok(ReconcileOutcome::PaymentNotFound);
        };

        if payment.status == PaymentStatus::Failed {
            return Ok(ReconcileOutcome::AlreadyInState);
        }

        let Some(transition) = checked(&payment, PaymentStatus::Failed) else {
            return Ok(ReconcileOutcome::InvalidTransition);
        };

        let reason = match event.kind() {
            EventKind::PaymentCanceled => Some(
                intent
                    .cancellation_reason
                    .clone()
                    .map(|r| format!("Payment was cancelled ({})", r))
                    .unwrap_or_else(|| "Payment was cancelled".to_string()),
            ),
            _ => intent
                .last_payment_error
                .as_ref()
                .and_then(|e| e.message.clone()),
        };

        let mut transition = transition
            .with_metadata("failedAt", Utc::now().to_rfc3339())
            .with_event(processed(event));
        if let Some(ref reason) = reason {
            transition = transition.with_metadata("failureMessage", reason.clone());
        }
        if let Some(code) = intent.last_payment_error.as_ref().and_then(|e| e.code.clone()) {
            transition = transition.with_metadata("failureCode", code);
        }

        let outcome = self.apply(&transition).await?;
        if let TransitionOutcome::Applied(ref updated) = outcome {
            self.notifier
                .payment_failed(updated, reason.as_deref(), DeliveryPolicy::BestEffort)
                .await?;
        }

        Ok(reconcile_outcome(outcome))
    }

    async fn charge_refunded(&self, event: &GatewayEvent) -> Result<ReconcileOutcome, AppError> {
        let charge = event.charge().map_err(invalid_object)?;

        let mut references = Vec::with_capacity(2);
        if let Some(ref intent) = charge.payment_intent {
            references.push(intent.as_str());
        }
        references.push(charge.id.as_str());

        let Some(payment) = self.find_payment(&references).await? else {
            return Ok(ReconcileOutcome::PaymentNotFound);
        };

        let full_refund = charge.amount_refunded >= charge.amount;

        if full_refund {
            if payment.status == PaymentStatus::Refunded {
                return Ok(ReconcileOutcome::AlreadyInState);
            }
            let Some(transition) = checked(&payment, PaymentStatus::Refunded) else {
                return Ok(ReconcileOutcome::InvalidTransition);
            };
            let transition = transition
                .with_metadata("refundedAt", Utc::now().to_rfc3339())
                .with_metadata("refundedAmount", charge.amount_refunded)
                .with_event(processed(event));

            let outcome = self.apply(&transition).await?;
            if let TransitionOutcome::Applied(ref updated) = outcome {
                self.notifier
                    .payment_refunded(updated, DeliveryPolicy::BestEffort)
                    .await?;
            }
            return Ok(reconcile_outcome(outcome));
        }

        if payment.status != PaymentStatus::Completed {
            warn!(
                payment_id = %payment.id,
                status = payment.status.as_str(),
                "Partial refund for a payment that is not completed"
            );
            return Ok(ReconcileOutcome::InvalidTransition);
        }

        let transition = PaymentTransition::new(&payment, PaymentStatus::Completed)
            .with_metadata("partialRefundAmount", charge.amount_refunded)
            .with_metadata("partialRefundAt", Utc::now().to_rfc3339())
            .with_event(processed(event));

        match self.apply(&transition).await? {
            TransitionOutcome::Applied(_) => {
                info!(
                    payment_id = %payment.id,
                    amount_refunded = charge.amount_refunded,
                    "Partial refund recorded"
                );
                Ok(ReconcileOutcome::PartialRefundRecorded)
            }
            other => Ok(reconcile_outcome(other)),
        }
    }

    /// First payment matching any of `references`.
    async fn find_payment(&self, references: &[&str]) -> Result<Option<Payment>, AppError> {
        for reference in references {
            if let Some(payment) = self.store.get_payment_by_gateway_reference(reference).await? {
                return Ok(Some(payment));
            }
        }
        info!(references = ?references, "No local payment for gateway reference");
        Ok(None)
    }

    async fn apply(&self, transition: &PaymentTransition) -> Result<TransitionOutcome, AppError> {
        self.store.apply_payment_transition(transition).await
    }
}

fn checked(payment: &Payment, to: PaymentStatus) -> Option<PaymentTransition> {
    match PaymentTransition::checked(payment, to) {
        Ok(transition) => Some(transition),
        Err(e) => {
            warn!(payment_id = %payment.id, error = %e, "Ignoring event that breaks the payment lifecycle");
            None
        }
    }
}

fn processed(event: &GatewayEvent) -> ProcessedEvent {
    ProcessedEvent {
        event_id: event.id.clone(),
        event_type: event.event_type.clone(),
    }
}

fn reconcile_outcome(outcome: TransitionOutcome) -> ReconcileOutcome {
    match outcome {
        TransitionOutcome::Applied(_) => ReconcileOutcome::Applied,
        TransitionOutcome::AlreadyProcessed => ReconcileOutcome::AlreadyProcessed,
        TransitionOutcome::StatusChanged(_) => ReconcileOutcome::Superseded,
    }
}

fn invalid_object(err: serde_json::Error) -> AppError {
    AppError::BadRequest(anyhow::anyhow!("Invalid event object: {}", err))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::stripe::EventData;

    fn event() -> GatewayEvent {
        GatewayEvent {
            id: "evt_1".to_string(),
            event_type: "payment_intent.succeeded".to_string(),
            data: EventData {
                object: serde_json::json!({"id": "pi_1"}),
            },
        }
    }

    #[test]
    fn processed_ack_shape() {
        let ack = WebhookAck::processed(&event(), ReconcileOutcome::Applied);
        let json = serde_json::to_value(&ack).unwrap();

        assert_eq!(json["success"], true);
        assert_eq!(json["data"]["eventType"], "payment_intent.succeeded");
        assert_eq!(json["data"]["eventId"], "evt_1");
        assert_eq!(json["data"]["outcome"], "APPLIED");
        assert!(json.get("error").is_none());
    }

    #[test]
    fn failed_ack_keeps_event_type() {
        let ack = WebhookAck::failed(Some(&event()), "Database error".to_string());
        let json = serde_json::to_value(&ack).unwrap();

        assert_eq!(json["success"], false);
        assert_eq!(json["error"], "Database error");
        assert_eq!(json["data"]["eventType"], "payment_intent.succeeded");
    }

    #[test]
    fn transition_outcomes_map() {
        assert_eq!(
            reconcile_outcome(TransitionOutcome::AlreadyProcessed),
            ReconcileOutcome::AlreadyProcessed
        );
        assert_eq!(
            reconcile_outcome(TransitionOutcome::StatusChanged(PaymentStatus::Failed)),
            ReconcileOutcome::Superseded
        );
    }
}
