//! Administration: venue notices and user management.

use axum::{
    extract::{Path, Query, State},
    Json,
};
use service_core::error::AppError;
use uuid::Uuid;

use super::not_found;
use crate::{
    dtos::{page_request, ApiResponse, MarkReadRequest, MarkReadResponse, NotificationListQuery, UserListQuery},
    middleware::AuthUser,
    models::{
        ListNotificationsFilter, ListUsersFilter, Notification, NotificationAudience,
        NotificationStats, UpdateUser, User,
    },
    policy::Resource,
    startup::AppState,
};

/// Admin-audience notices the caller may see: everything for SUPER_ADMIN,
/// notices for owned venues for ADMIN.
fn admin_filter(auth: &AuthUser) -> Result<ListNotificationsFilter, AppError> {
    let scope = auth.scope(Resource::AdminNotification).ensure_allowed()?;
    let mut filter = ListNotificationsFilter::new(NotificationAudience::Admin);
    filter.venue_owner_id = scope.venue_owner_filter();
    Ok(filter)
}

pub async fn list_admin_notifications(
    State(state): State<AppState>,
    auth: AuthUser,
    Query(query): Query<NotificationListQuery>,
) -> Result<Json<ApiResponse<Vec<Notification>>>, AppError> {
    let mut filter = admin_filter(&auth)?;
    filter.unread_only = query.unread;
    filter.kind = query.kind;
    filter.page = page_request(query.page, query.limit);

    let page = state.store.list_notifications(&filter).await?;
    Ok(Json(ApiResponse::paginated(page)))
}

pub async fn mark_admin_notifications_read(
    State(state): State<AppState>,
    auth: AuthUser,
    payload: Option<Json<MarkReadRequest>>,
) -> Result<Json<ApiResponse<MarkReadResponse>>, AppError> {
    let mut filter = admin_filter(&auth)?;
    filter.ids = payload.and_then(|Json(body)| body.ids);

    let updated = state.store.mark_notifications_read(&filter).await?;
    Ok(Json(ApiResponse::ok(MarkReadResponse { updated })))
}

pub async fn notification_stats(
    State(state): State<AppState>,
    auth: AuthUser,
) -> Result<Json<ApiResponse<NotificationStats>>, AppError> {
    let filter = admin_filter(&auth)?;
    let stats = state.store.notification_stats(&filter).await?;
    Ok(Json(ApiResponse::ok(stats)))
}

pub async fn list_users(
    State(state): State<AppState>,
    auth: AuthUser,
    Query(query): Query<UserListQuery>,
) -> Result<Json<ApiResponse<Vec<User>>>, AppError> {
    auth.scope(Resource::User).ensure_allowed()?;

    let filter = ListUsersFilter {
        role: query.role,
        active_only: query.active_only,
        page: page_request(query.page, query.limit),
    };

    let page = state.store.list_users(&filter).await?;
    Ok(Json(ApiResponse::paginated(page)))
}

/// Change a user's name, role or active flag.
pub async fn update_user(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(user_id): Path<Uuid>,
    Json(payload): Json<UpdateUser>,
) -> Result<Json<ApiResponse<User>>, AppError> {
    auth.scope(Resource::User).ensure_allowed()?;

    if user_id == auth.user_id && (payload.role.is_some() || payload.is_active == Some(false)) {
        return Err(AppError::BadRequest(anyhow::anyhow!(
            "You cannot change your own role or deactivate yourself"
        )));
    }

    let user = state
        .store
        .update_user(user_id, &payload)
        .await?
        .ok_or_else(|| not_found("User"))?;

    tracing::info!(
        user_id = %user.id,
        role = user.role.as_str(),
        is_active = user.is_active,
        updated_by = %auth.user_id,
        "User updated"
    );

    Ok(Json(ApiResponse::ok(user)))
}
