//! HTTP handlers for booking-service.

pub mod admin;
pub mod auth;
pub mod notifications;
pub mod payments;
pub mod receipts;
pub mod reservations;
pub mod services;
pub mod venues;
pub mod webhook;

use crate::models::Payment;
use crate::services::get_metrics;
use crate::startup::AppState;
use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use serde_json::json;
use service_core::error::AppError;
use uuid::Uuid;

/// Health check endpoint for Docker/K8s liveness probes.
pub async fn health_check() -> impl IntoResponse {
    (
        StatusCode::OK,
        Json(json!({
            "status": "ok",
            "service": "booking-service",
            "version": env!("CARGO_PKG_VERSION")
        })),
    )
}

/// Readiness check endpoint for K8s readiness probes.
pub async fn readiness_check(State(state): State<AppState>) -> impl IntoResponse {
    let Some(db) = state.db else {
        return (StatusCode::OK, Json(json!({ "status": "ready" })));
    };

    match db.health_check().await {
        Ok(_) => (StatusCode::OK, Json(json!({ "status": "ready" }))),
        Err(e) => (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({ "status": "unavailable", "error": e.to_string() })),
        ),
    }
}

/// Prometheus metrics endpoint.
pub async fn metrics_endpoint() -> impl IntoResponse {
    (
        StatusCode::OK,
        [("content-type", "text/plain; charset=utf-8")],
        get_metrics(),
    )
}

fn not_found(what: &str) -> AppError {
    AppError::NotFound(anyhow::anyhow!("{} not found", what))
}

/// Owner of the venue, if it still exists.
async fn venue_owner(state: &AppState, venue_id: Uuid) -> Result<Option<Uuid>, AppError> {
    Ok(state.store.get_venue(venue_id).await?.map(|v| v.owner_id))
}

/// Owner of the venue a payment's reservation belongs to.
async fn payment_venue_owner(state: &AppState, payment: &Payment) -> Result<Option<Uuid>, AppError> {
    let Some(reservation_id) = payment.reservation_id else {
        return Ok(None);
    };
    match state.store.get_reservation(reservation_id).await? {
        Some(reservation) => venue_owner(state, reservation.venue_id).await,
        None => Ok(None),
    }
}
