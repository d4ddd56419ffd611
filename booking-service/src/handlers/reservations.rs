use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use service_core::error::AppError;
use uuid::Uuid;
use validator::Validate;

use super::{not_found, venue_owner};
use crate::{
    dtos::{
        page_request, ApiResponse, CreateReservationRequest, ReservationListQuery,
        UpdateReservationRequest,
    },
    middleware::AuthUser,
    models::{quote_total, CreateReservation, ListReservationsFilter, Reservation, ReservationStatus},
    policy::Resource,
    startup::AppState,
};

pub async fn list_reservations(
    State(state): State<AppState>,
    auth: AuthUser,
    Query(query): Query<ReservationListQuery>,
) -> Result<Json<ApiResponse<Vec<Reservation>>>, AppError> {
    let scope = auth.scope(Resource::Reservation).ensure_allowed()?;

    let filter = ListReservationsFilter {
        user_id: scope.user_filter(),
        venue_owner_id: scope.venue_owner_filter(),
        status: query.status,
        page: page_request(query.page, query.limit),
    };

    let page = state.store.list_reservations(&filter).await?;
    Ok(Json(ApiResponse::paginated(page)))
}

pub async fn get_reservation(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(reservation_id): Path<Uuid>,
) -> Result<Json<ApiResponse<Reservation>>, AppError> {
    let reservation = visible_reservation(&state, &auth, reservation_id).await?;
    Ok(Json(ApiResponse::ok(reservation)))
}

/// Book a service for the caller; the total is quoted from the nightly price.
pub async fn create_reservation(
    State(state): State<AppState>,
    auth: AuthUser,
    Json(payload): Json<CreateReservationRequest>,
) -> Result<(StatusCode, Json<ApiResponse<Reservation>>), AppError> {
    payload.validate()?;

    if payload.check_out < payload.check_in {
        return Err(AppError::BadRequest(anyhow::anyhow!(
            "Check-out must not be before check-in"
        )));
    }

    let service = state
        .store
        .get_service(payload.service_id)
        .await?
        .filter(|s| s.is_active)
        .ok_or_else(|| not_found("Service"))?;

    let venue = state
        .store
        .get_venue(service.venue_id)
        .await?
        .filter(|v| v.is_active)
        .ok_or_else(|| not_found("Venue"))?;

    if payload.guests > service.capacity {
        return Err(AppError::BadRequest(anyhow::anyhow!(
            "Guests exceed service capacity of {}",
            service.capacity
        )));
    }

    let reservation = state
        .store
        .create_reservation(&CreateReservation {
            user_id: auth.user_id,
            venue_id: venue.id,
            service_id: service.id,
            check_in: payload.check_in,
            check_out: payload.check_out,
            guests: payload.guests,
            total_amount: quote_total(service.price, payload.check_in, payload.check_out),
            notes: payload.notes,
        })
        .await?;

    tracing::info!(
        reservation_id = %reservation.id,
        service_id = %service.id,
        total = %reservation.total_amount,
        "Reservation created"
    );

    Ok((StatusCode::CREATED, Json(ApiResponse::ok(reservation))))
}

/// Guests may cancel their own bookings; venue admins may also confirm and
/// complete them.
pub async fn update_reservation(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(reservation_id): Path<Uuid>,
    Json(payload): Json<UpdateReservationRequest>,
) -> Result<Json<ApiResponse<Reservation>>, AppError> {
    let reservation = visible_reservation(&state, &auth, reservation_id).await?;
    let target = payload.status;

    let is_guest = reservation.user_id == auth.user_id;
    let owner = venue_owner(&state, reservation.venue_id).await?;
    let manages = auth.role.is_admin()
        && auth
            .scope(Resource::Reservation)
            .permits(reservation.user_id, owner);

    let allowed = manages || (is_guest && target == ReservationStatus::Cancelled);
    if !allowed {
        return Err(AppError::Forbidden(anyhow::anyhow!(
            "You cannot set this reservation to {}",
            target.as_str()
        )));
    }

    if !reservation.status.can_transition_to(target) {
        return Err(AppError::BadRequest(anyhow::anyhow!(
            "Reservation cannot move from {} to {}",
            reservation.status.as_str(),
            target.as_str()
        )));
    }

    let updated = state
        .store
        .update_reservation_status(reservation.id, reservation.status, target)
        .await?
        .ok_or_else(|| {
            AppError::Conflict(anyhow::anyhow!(
                "Reservation was modified concurrently, retry"
            ))
        })?;

    Ok(Json(ApiResponse::ok(updated)))
}

async fn visible_reservation(
    state: &AppState,
    auth: &AuthUser,
    reservation_id: Uuid,
) -> Result<Reservation, AppError> {
    let scope = auth.scope(Resource::Reservation).ensure_allowed()?;
    let reservation = state
        .store
        .get_reservation(reservation_id)
        .await?
        .ok_or_else(|| not_found("Reservation"))?;

    let owner = venue_owner(state, reservation.venue_id).await?;
    if !scope.permits(reservation.user_id, owner) {
        return Err(not_found("Reservation"));
    }
    Ok(reservation)
}
