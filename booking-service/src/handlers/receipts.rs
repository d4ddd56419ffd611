use axum::{
    extract::{Path, Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use chrono::Utc;
use service_core::error::AppError;
use uuid::Uuid;
use validator::Validate;

use super::{not_found, payment_venue_owner};
use crate::{
    dtos::{page_request, ApiResponse, CreateReceiptRequest, ReceiptListQuery, UpdateReceiptRequest},
    middleware::AuthUser,
    models::{
        CreateReceipt, ListReceiptsFilter, Payment, PaymentStatus, Receipt, ReceiptStatus,
        TaxBreakdown, UpdateReceipt,
    },
    policy::Resource,
    services::ReceiptDocument,
    startup::AppState,
    utils::generate_receipt_number,
};

pub async fn list_receipts(
    State(state): State<AppState>,
    auth: AuthUser,
    Query(query): Query<ReceiptListQuery>,
) -> Result<Json<ApiResponse<Vec<Receipt>>>, AppError> {
    let scope = auth.scope(Resource::Receipt).ensure_allowed()?;

    let filter = ListReceiptsFilter {
        user_id: scope.user_filter(),
        venue_owner_id: scope.venue_owner_filter(),
        status: query.status,
        page: page_request(query.page, query.limit),
    };

    let page = state.store.list_receipts(&filter).await?;
    Ok(Json(ApiResponse::paginated(page)))
}

/// Issue the receipt for a COMPLETED payment; one per payment.
pub async fn create_receipt(
    State(state): State<AppState>,
    auth: AuthUser,
    Json(payload): Json<CreateReceiptRequest>,
) -> Result<(StatusCode, Json<ApiResponse<Receipt>>), AppError> {
    payload.validate()?;
    let scope = auth.scope(Resource::Receipt).ensure_allowed()?;

    let payment = state
        .store
        .get_payment(payload.payment_id)
        .await?
        .ok_or_else(|| not_found("Payment"))?;
    let owner = payment_venue_owner(&state, &payment).await?;
    if !scope.permits(payment.user_id, owner) {
        return Err(not_found("Payment"));
    }

    if payment.status != PaymentStatus::Completed {
        return Err(AppError::BadRequest(anyhow::anyhow!(
            "Receipts can only be issued for completed payments"
        )));
    }

    if state.store.get_receipt_by_payment(payment.id).await?.is_some() {
        return Err(AppError::Conflict(anyhow::anyhow!(
            "Receipt already exists for this payment"
        )));
    }

    let receipt = state
        .store
        .create_receipt(&CreateReceipt {
            receipt_number: generate_receipt_number(Utc::now().date_naive()),
            payment_id: payment.id,
            user_id: payment.user_id,
            breakdown: TaxBreakdown::from_total(payment.amount),
            currency: payment.currency.clone(),
            notes: payload.notes,
        })
        .await?;

    tracing::info!(
        receipt_id = %receipt.id,
        receipt_number = %receipt.receipt_number,
        payment_id = %payment.id,
        "Receipt issued"
    );

    Ok((StatusCode::CREATED, Json(ApiResponse::ok(receipt))))
}

pub async fn get_receipt(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(receipt_id): Path<Uuid>,
) -> Result<Json<ApiResponse<Receipt>>, AppError> {
    let (receipt, _) = visible_receipt(&state, &auth, receipt_id).await?;
    Ok(Json(ApiResponse::ok(receipt)))
}

/// Venue admins verify or reject receipts and annotate them.
pub async fn update_receipt(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(receipt_id): Path<Uuid>,
    Json(payload): Json<UpdateReceiptRequest>,
) -> Result<Json<ApiResponse<Receipt>>, AppError> {
    payload.validate()?;
    if !auth.role.is_admin() {
        return Err(AppError::Forbidden(anyhow::anyhow!(
            "Only administrators can update receipts"
        )));
    }

    if let Some(status) = payload.status {
        if !matches!(status, ReceiptStatus::Verified | ReceiptStatus::Rejected) {
            return Err(AppError::BadRequest(anyhow::anyhow!(
                "Receipt status can only be set to VERIFIED or REJECTED"
            )));
        }
    }

    let (receipt, _) = visible_receipt(&state, &auth, receipt_id).await?;

    let updated = state
        .store
        .update_receipt(
            receipt.id,
            &UpdateReceipt {
                status: payload.status,
                notes: payload.notes,
                breakdown: None,
            },
        )
        .await?
        .ok_or_else(|| not_found("Receipt"))?;

    Ok(Json(ApiResponse::ok(updated)))
}

/// The receipt as an HTML attachment.
pub async fn download_receipt(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(receipt_id): Path<Uuid>,
) -> Result<Response, AppError> {
    let (receipt, payment) = visible_receipt(&state, &auth, receipt_id).await?;
    let document = build_document(&state, &receipt, &payment).await?;
    attachment(&document)
}

/// Recompute the amounts from the payment and return the fresh document.
pub async fn regenerate_receipt(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(receipt_id): Path<Uuid>,
) -> Result<Response, AppError> {
    let (receipt, payment) = visible_receipt(&state, &auth, receipt_id).await?;

    let regenerated = state
        .store
        .update_receipt(
            receipt.id,
            &UpdateReceipt {
                status: Some(ReceiptStatus::Regenerated),
                notes: None,
                breakdown: Some(TaxBreakdown::from_total(payment.amount)),
            },
        )
        .await?
        .ok_or_else(|| not_found("Receipt"))?;

    tracing::info!(receipt_id = %receipt_id, "Receipt regenerated");

    let document = build_document(&state, &regenerated, &payment).await?;
    attachment(&document)
}

async fn build_document(
    state: &AppState,
    receipt: &Receipt,
    payment: &Payment,
) -> Result<ReceiptDocument, AppError> {
    let customer = state
        .store
        .get_user(receipt.user_id)
        .await?
        .ok_or_else(|| not_found("Customer"))?;

    let reservation = match payment.reservation_id {
        Some(id) => state.store.get_reservation(id).await?,
        None => None,
    };
    let (venue, service_name) = match reservation {
        Some(ref r) => (
            state.store.get_venue(r.venue_id).await?,
            state.store.get_service(r.service_id).await?.map(|s| s.name),
        ),
        None => (None, None),
    };

    Ok(ReceiptDocument::new(
        receipt,
        payment,
        &customer,
        reservation.as_ref(),
        venue.as_ref(),
        service_name,
    ))
}

fn attachment(document: &ReceiptDocument) -> Result<Response, AppError> {
    let html = document.to_html()?;
    Ok((
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, "text/html; charset=utf-8".to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{}\"", document.filename()),
            ),
        ],
        html,
    )
        .into_response())
}

async fn visible_receipt(
    state: &AppState,
    auth: &AuthUser,
    receipt_id: Uuid,
) -> Result<(Receipt, Payment), AppError> {
    let scope = auth.scope(Resource::Receipt).ensure_allowed()?;
    let receipt = state
        .store
        .get_receipt(receipt_id)
        .await?
        .ok_or_else(|| not_found("Receipt"))?;
    let payment = state
        .store
        .get_payment(receipt.payment_id)
        .await?
        .ok_or_else(|| not_found("Payment"))?;

    let owner = payment_venue_owner(state, &payment).await?;
    if !scope.permits(receipt.user_id, owner) {
        return Err(not_found("Receipt"));
    }
    Ok((receipt, payment))
}
