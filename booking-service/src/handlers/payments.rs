//! Payment checkout, queries and owner/admin actions.
//!
//! Gateway callbacks are handled in [`super::webhook`]; these routes only
//! start payments and ask the gateway to cancel or refund them.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use chrono::Utc;
use rust_decimal::Decimal;
use serde_json::json;
use service_core::error::AppError;
use uuid::Uuid;

use super::{not_found, payment_venue_owner};
use crate::{
    dtos::{
        page_request, ApiResponse, CheckoutRequest, CheckoutResponse, PaymentAction,
        PaymentListQuery, UpdatePaymentRequest,
    },
    middleware::AuthUser,
    models::{
        from_minor_units, to_minor_units, CreatePayment, ListPaymentsFilter, Payment, PaymentStatus,
        PaymentTransition, ReservationStatus, TransitionOutcome,
    },
    policy::Resource,
    services::DeliveryPolicy,
    startup::AppState,
};

pub async fn list_payments(
    State(state): State<AppState>,
    auth: AuthUser,
    Query(query): Query<PaymentListQuery>,
) -> Result<Json<ApiResponse<Vec<Payment>>>, AppError> {
    let scope = auth.scope(Resource::Payment).ensure_allowed()?;

    let filter = ListPaymentsFilter {
        user_id: scope.user_filter(),
        venue_owner_id: scope.venue_owner_filter(),
        status: query.status,
        reservation_id: query.reservation_id,
        page: page_request(query.page, query.limit),
    };

    let page = state.store.list_payments(&filter).await?;
    Ok(Json(ApiResponse::paginated(page)))
}

/// Start paying for one of the caller's PENDING reservations.
pub async fn checkout(
    State(state): State<AppState>,
    auth: AuthUser,
    Json(payload): Json<CheckoutRequest>,
) -> Result<(StatusCode, Json<ApiResponse<CheckoutResponse>>), AppError> {
    let reservation = state
        .store
        .get_reservation(payload.reservation_id)
        .await?
        .filter(|r| r.user_id == auth.user_id)
        .ok_or_else(|| not_found("Reservation"))?;

    if reservation.status != ReservationStatus::Pending {
        return Err(AppError::BadRequest(anyhow::anyhow!(
            "Only pending reservations can be paid"
        )));
    }

    let pending = state
        .store
        .list_payments(&ListPaymentsFilter {
            reservation_id: Some(reservation.id),
            status: Some(PaymentStatus::Pending),
            ..Default::default()
        })
        .await?;
    if pending.total > 0 {
        return Err(AppError::Conflict(anyhow::anyhow!(
            "A pending payment already exists for this reservation"
        )));
    }

    let amount = to_minor_units(reservation.total_amount)
        .filter(|minor| *minor > 0)
        .ok_or_else(|| AppError::BadRequest(anyhow::anyhow!("Invalid reservation amount")))?;
    let currency = state.stripe.currency().to_string();

    let intent = state
        .stripe
        .create_payment_intent(
            amount,
            &currency,
            &[
                ("reservation_id", reservation.id.to_string()),
                ("user_id", auth.user_id.to_string()),
            ],
        )
        .await?;

    let payment = state
        .store
        .create_payment(&CreatePayment {
            user_id: auth.user_id,
            reservation_id: Some(reservation.id),
            amount: reservation.total_amount,
            currency,
            gateway_reference: Some(intent.id.clone()),
            metadata: json!({ "gatewayStatus": intent.status }),
        })
        .await?;

    tracing::info!(
        payment_id = %payment.id,
        reservation_id = %reservation.id,
        payment_intent = %intent.id,
        "Checkout started"
    );

    Ok((
        StatusCode::CREATED,
        Json(ApiResponse::ok(CheckoutResponse {
            payment,
            client_secret: intent.client_secret,
        })),
    ))
}

pub async fn get_payment(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(payment_id): Path<Uuid>,
) -> Result<Json<ApiResponse<Payment>>, AppError> {
    let (payment, _) = visible_payment(&state, &auth, payment_id).await?;
    Ok(Json(ApiResponse::ok(payment)))
}

/// `cancel` a PENDING payment (payer or venue admin) or `refund` a
/// COMPLETED one (venue admin).
pub async fn update_payment(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(payment_id): Path<Uuid>,
    Json(payload): Json<UpdatePaymentRequest>,
) -> Result<Json<ApiResponse<Payment>>, AppError> {
    let (payment, manages) = visible_payment(&state, &auth, payment_id).await?;

    let updated = match payload.action {
        PaymentAction::Cancel => cancel(&state, &auth, payment, manages, payload.reason).await?,
        PaymentAction::Refund => {
            if !manages {
                return Err(AppError::Forbidden(anyhow::anyhow!(
                    "Only venue administrators can refund payments"
                )));
            }
            refund(&state, payment, payload.amount, payload.reason).await?
        }
    };

    Ok(Json(ApiResponse::ok(updated)))
}

async fn cancel(
    state: &AppState,
    auth: &AuthUser,
    payment: Payment,
    manages: bool,
    reason: Option<String>,
) -> Result<Payment, AppError> {
    if payment.user_id != auth.user_id && !manages {
        return Err(AppError::Forbidden(anyhow::anyhow!(
            "You cannot cancel this payment"
        )));
    }

    let transition = PaymentTransition::checked(&payment, PaymentStatus::Cancelled)?;

    if let Some(ref intent_id) = payment.gateway_reference {
        state.stripe.cancel_payment_intent(intent_id).await?;
    }

    let mut transition = transition
        .with_metadata("cancelledAt", Utc::now().to_rfc3339())
        .with_metadata("cancelledBy", auth.user_id.to_string());
    if let Some(reason) = reason {
        transition = transition.with_metadata("cancelReason", reason);
    }

    let updated = applied(state.store.apply_payment_transition(&transition).await?)?;
    tracing::info!(payment_id = %updated.id, "Payment cancelled");
    Ok(updated)
}

async fn refund(
    state: &AppState,
    payment: Payment,
    amount: Option<Decimal>,
    reason: Option<String>,
) -> Result<Payment, AppError> {
    if payment.status != PaymentStatus::Completed {
        return Err(AppError::BadRequest(anyhow::anyhow!(
            "Only completed payments can be refunded"
        )));
    }

    let intent_id = payment.gateway_reference.clone().ok_or_else(|| {
        AppError::BadRequest(anyhow::anyhow!("Payment has no gateway reference"))
    })?;

    let total = to_minor_units(payment.amount)
        .ok_or_else(|| AppError::BadRequest(anyhow::anyhow!("Invalid payment amount")))?;
    let already_refunded = payment.refunded_minor_units();
    let remaining = total - already_refunded;

    let minor = match amount {
        Some(amount) => to_minor_units(amount)
            .ok_or_else(|| AppError::BadRequest(anyhow::anyhow!("Invalid refund amount")))?,
        None => remaining,
    };
    if minor <= 0 || minor > remaining {
        return Err(AppError::BadRequest(anyhow::anyhow!(
            "Refund amount must be between 0 and {}",
            from_minor_units(remaining)
        )));
    }
    let full = minor == remaining;

    let gateway_refund = state
        .stripe
        .create_refund(&intent_id, if full { None } else { Some(minor) })
        .await?;
    let refunded_total = already_refunded + gateway_refund.amount;

    let transition = if full {
        PaymentTransition::checked(&payment, PaymentStatus::Refunded)?
            .with_metadata("refundedAt", Utc::now().to_rfc3339())
            .with_metadata("refundedAmount", refunded_total)
    } else {
        PaymentTransition::new(&payment, PaymentStatus::Completed)
            .with_metadata("partialRefundAmount", refunded_total)
            .with_metadata("partialRefundAt", Utc::now().to_rfc3339())
    };
    let mut transition = transition.with_metadata("refundId", gateway_refund.id.clone());
    if let Some(reason) = reason {
        transition = transition.with_metadata("refundReason", reason);
    }

    let updated = applied(state.store.apply_payment_transition(&transition).await?)?;

    tracing::info!(
        payment_id = %updated.id,
        refund_id = %gateway_refund.id,
        full = full,
        "Refund issued"
    );

    if full {
        state
            .notifier
            .payment_refunded(&updated, DeliveryPolicy::BestEffort)
            .await?;
    }

    Ok(updated)
}

fn applied(outcome: TransitionOutcome) -> Result<Payment, AppError> {
    match outcome {
        TransitionOutcome::Applied(payment) => Ok(payment),
        TransitionOutcome::StatusChanged(current) => Err(AppError::Conflict(anyhow::anyhow!(
            "Payment status changed to {} while processing",
            current.as_str()
        ))),
        TransitionOutcome::AlreadyProcessed => Err(AppError::Conflict(anyhow::anyhow!(
            "Payment update was already processed"
        ))),
    }
}

/// The payment if the caller may see it, plus whether they administer its
/// venue.
async fn visible_payment(
    state: &AppState,
    auth: &AuthUser,
    payment_id: Uuid,
) -> Result<(Payment, bool), AppError> {
    let scope = auth.scope(Resource::Payment).ensure_allowed()?;
    let payment = state
        .store
        .get_payment(payment_id)
        .await?
        .ok_or_else(|| not_found("Payment"))?;

    let owner = payment_venue_owner(state, &payment).await?;

    if !scope.permits(payment.user_id, owner) {
        return Err(not_found("Payment"));
    }

    let manages = auth.role.is_admin() && scope.permits(Uuid::nil(), owner);
    Ok((payment, manages))
}
