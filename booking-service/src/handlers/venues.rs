use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use service_core::error::AppError;
use uuid::Uuid;
use validator::Validate;

use super::not_found;
use crate::{
    dtos::{page_request, ApiResponse, VenueListQuery},
    middleware::AuthUser,
    models::{CreateVenue, ListVenuesFilter, Role, UpdateVenue, Venue},
    policy::Resource,
    startup::AppState,
};

/// Active venues for everyone; admins also see their inactive ones.
pub async fn list_venues(
    State(state): State<AppState>,
    auth: AuthUser,
    Query(query): Query<VenueListQuery>,
) -> Result<Json<ApiResponse<Vec<Venue>>>, AppError> {
    let manages = |owner: Option<Uuid>| match auth.role {
        Role::SuperAdmin => true,
        Role::Admin => owner == Some(auth.user_id),
        Role::User => false,
    };

    let filter = ListVenuesFilter {
        owner_id: query.owner_id,
        city: query.city,
        active_only: !manages(query.owner_id),
        page: page_request(query.page, query.limit),
    };

    let page = state.store.list_venues(&filter).await?;
    Ok(Json(ApiResponse::paginated(page)))
}

pub async fn get_venue(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(venue_id): Path<Uuid>,
) -> Result<Json<ApiResponse<Venue>>, AppError> {
    let venue = state
        .store
        .get_venue(venue_id)
        .await?
        .ok_or_else(|| not_found("Venue"))?;

    if !venue.is_active
        && !auth
            .scope(Resource::Venue)
            .permits(venue.owner_id, Some(venue.owner_id))
    {
        return Err(not_found("Venue"));
    }

    Ok(Json(ApiResponse::ok(venue)))
}

pub async fn create_venue(
    State(state): State<AppState>,
    auth: AuthUser,
    Json(payload): Json<CreateVenue>,
) -> Result<(StatusCode, Json<ApiResponse<Venue>>), AppError> {
    auth.scope(Resource::Venue).ensure_allowed()?;
    payload.validate()?;

    let owner_id = match payload.owner_id {
        Some(owner_id) if owner_id != auth.user_id => {
            auth.require_role(&[Role::SuperAdmin])?;
            let owner = state
                .store
                .get_user(owner_id)
                .await?
                .ok_or_else(|| not_found("Owner"))?;
            if !owner.role.is_admin() {
                return Err(AppError::BadRequest(anyhow::anyhow!(
                    "Venue owner must be an admin"
                )));
            }
            owner.id
        }
        _ => auth.user_id,
    };

    let venue = state.store.create_venue(owner_id, &payload).await?;

    tracing::info!(venue_id = %venue.id, owner_id = %owner_id, "Venue created");

    Ok((StatusCode::CREATED, Json(ApiResponse::ok(venue))))
}

pub async fn update_venue(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(venue_id): Path<Uuid>,
    Json(payload): Json<UpdateVenue>,
) -> Result<Json<ApiResponse<Venue>>, AppError> {
    payload.validate()?;
    let venue = owned_venue(&state, &auth, venue_id).await?;

    let updated = state
        .store
        .update_venue(venue.id, &payload)
        .await?
        .ok_or_else(|| not_found("Venue"))?;

    tracing::info!(venue_id = %venue_id, "Venue updated");

    Ok(Json(ApiResponse::ok(updated)))
}

/// Soft delete.
pub async fn delete_venue(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(venue_id): Path<Uuid>,
) -> Result<Json<ApiResponse<()>>, AppError> {
    let venue = owned_venue(&state, &auth, venue_id).await?;

    if !state.store.deactivate_venue(venue.id).await? {
        return Err(not_found("Venue"));
    }

    tracing::info!(venue_id = %venue_id, "Venue deactivated");

    Ok(Json(ApiResponse::message("Venue deleted")))
}

async fn owned_venue(state: &AppState, auth: &AuthUser, venue_id: Uuid) -> Result<Venue, AppError> {
    let scope = auth.scope(Resource::Venue).ensure_allowed()?;
    let venue = state
        .store
        .get_venue(venue_id)
        .await?
        .ok_or_else(|| not_found("Venue"))?;
    scope.check(venue.owner_id, Some(venue.owner_id))?;
    Ok(venue)
}
