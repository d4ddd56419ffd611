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
    dtos::{page_request, ApiResponse, ServiceListQuery},
    middleware::AuthUser,
    models::{CreateService, ListServicesFilter, Service, UpdateService},
    policy::{AccessScope, Resource},
    startup::AppState,
};

pub async fn list_services(
    State(state): State<AppState>,
    auth: AuthUser,
    Query(query): Query<ServiceListQuery>,
) -> Result<Json<ApiResponse<Vec<Service>>>, AppError> {
    let active_only = match (auth.scope(Resource::Service), query.venue_id) {
        (AccessScope::All, _) => false,
        (AccessScope::OwnedVenues(owner), Some(venue_id)) => {
            venue_owner(&state, venue_id).await? != Some(owner)
        }
        _ => true,
    };

    let filter = ListServicesFilter {
        venue_id: query.venue_id,
        venue_owner_id: None,
        active_only,
        page: page_request(query.page, query.limit),
    };

    let page = state.store.list_services(&filter).await?;
    Ok(Json(ApiResponse::paginated(page)))
}

pub async fn get_service(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(service_id): Path<Uuid>,
) -> Result<Json<ApiResponse<Service>>, AppError> {
    let service = state
        .store
        .get_service(service_id)
        .await?
        .ok_or_else(|| not_found("Service"))?;

    if !service.is_active {
        let owner = venue_owner(&state, service.venue_id).await?;
        if !auth
            .scope(Resource::Service)
            .permits(owner.unwrap_or_default(), owner)
        {
            return Err(not_found("Service"));
        }
    }

    Ok(Json(ApiResponse::ok(service)))
}

pub async fn create_service(
    State(state): State<AppState>,
    auth: AuthUser,
    Json(payload): Json<CreateService>,
) -> Result<(StatusCode, Json<ApiResponse<Service>>), AppError> {
    let scope = auth.scope(Resource::Service).ensure_allowed()?;
    payload.validate()?;
    ensure_price(&payload.price)?;

    let owner = venue_owner(&state, payload.venue_id)
        .await?
        .ok_or_else(|| not_found("Venue"))?;
    scope.check(owner, Some(owner))?;

    let service = state.store.create_service(&payload).await?;

    tracing::info!(service_id = %service.id, venue_id = %service.venue_id, "Service created");

    Ok((StatusCode::CREATED, Json(ApiResponse::ok(service))))
}

pub async fn update_service(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(service_id): Path<Uuid>,
    Json(payload): Json<UpdateService>,
) -> Result<Json<ApiResponse<Service>>, AppError> {
    payload.validate()?;
    if let Some(ref price) = payload.price {
        ensure_price(price)?;
    }
    let service = managed_service(&state, &auth, service_id).await?;

    let updated = state
        .store
        .update_service(service.id, &payload)
        .await?
        .ok_or_else(|| not_found("Service"))?;

    tracing::info!(service_id = %service_id, "Service updated");

    Ok(Json(ApiResponse::ok(updated)))
}

/// Soft delete.
pub async fn delete_service(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(service_id): Path<Uuid>,
) -> Result<Json<ApiResponse<()>>, AppError> {
    let service = managed_service(&state, &auth, service_id).await?;

    if !state.store.deactivate_service(service.id).await? {
        return Err(not_found("Service"));
    }

    tracing::info!(service_id = %service_id, "Service deactivated");

    Ok(Json(ApiResponse::message("Service deleted")))
}

async fn managed_service(
    state: &AppState,
    auth: &AuthUser,
    service_id: Uuid,
) -> Result<Service, AppError> {
    let scope = auth.scope(Resource::Service).ensure_allowed()?;
    let service = state
        .store
        .get_service(service_id)
        .await?
        .ok_or_else(|| not_found("Service"))?;
    let owner = venue_owner(state, service.venue_id).await?;
    scope.check(owner.unwrap_or_default(), owner)?;
    Ok(service)
}

fn ensure_price(price: &rust_decimal::Decimal) -> Result<(), AppError> {
    if price.is_sign_negative() || price.is_zero() {
        return Err(AppError::BadRequest(anyhow::anyhow!(
            "Price must be greater than zero"
        )));
    }
    Ok(())
}
