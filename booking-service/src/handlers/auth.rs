//! Account registration and login.

use axum::{extract::State, http::StatusCode, Json};
use service_core::error::AppError;
use validator::Validate;

use crate::{
    dtos::{ApiResponse, AuthResponse, LoginRequest, RegisterRequest},
    models::{CreateUser, Role},
    startup::AppState,
    utils::{hash_password, verify_password, Password},
};

/// Register a USER account and return a bearer token.
pub async fn register(
    State(state): State<AppState>,
    Json(req): Json<RegisterRequest>,
) -> Result<(StatusCode, Json<ApiResponse<AuthResponse>>), AppError> {
    req.validate()?;

    let email = req.email.trim().to_lowercase();
    if state.store.get_user_by_email(&email).await?.is_some() {
        return Err(AppError::Conflict(anyhow::anyhow!(
            "Email already registered"
        )));
    }

    let password_hash = hash_password(&Password::new(req.password))?;

    let user = state
        .store
        .create_user(&CreateUser {
            email,
            name: req.name.trim().to_string(),
            password_hash,
            role: Role::User,
        })
        .await?;

    tracing::info!(user_id = %user.id, "User registered");

    let token = state.jwt.token_response(&user)?;

    Ok((
        StatusCode::CREATED,
        Json(ApiResponse::ok(AuthResponse { user, token }).with_message("Registration successful")),
    ))
}

pub async fn login(
    State(state): State<AppState>,
    Json(req): Json<LoginRequest>,
) -> Result<Json<ApiResponse<AuthResponse>>, AppError> {
    req.validate()?;

    let invalid = || AppError::Unauthorized(anyhow::anyhow!("Invalid email or password"));

    let user = state
        .store
        .get_user_by_email(&req.email.trim().to_lowercase())
        .await?
        .ok_or_else(invalid)?;

    verify_password(&Password::new(req.password), &user.password_hash).map_err(|_| invalid())?;

    if !user.is_active {
        return Err(AppError::Forbidden(anyhow::anyhow!("Account is disabled")));
    }

    tracing::info!(user_id = %user.id, "User logged in");

    let token = state.jwt.token_response(&user)?;

    Ok(Json(ApiResponse::ok(AuthResponse { user, token })))
}
