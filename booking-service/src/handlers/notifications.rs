//! The caller's own notification inbox.

use axum::{
    extract::{Query, State},
    http::StatusCode,
    Json,
};
use service_core::error::AppError;
use validator::Validate;

use super::not_found;
use crate::{
    dtos::{
        page_request, ApiResponse, CreateNotificationRequest, MarkReadRequest, MarkReadResponse,
        NotificationListQuery,
    },
    middleware::AuthUser,
    models::{ListNotificationsFilter, Notification, NotificationAudience, NotificationKind, Role},
    policy::Resource,
    services::DeliveryPolicy,
    startup::AppState,
};

fn inbox_filter(auth: &AuthUser) -> Result<ListNotificationsFilter, AppError> {
    let scope = auth.scope(Resource::Notification).ensure_allowed()?;
    let mut filter = ListNotificationsFilter::new(NotificationAudience::User);
    filter.user_id = scope.user_filter();
    Ok(filter)
}

pub async fn list_notifications(
    State(state): State<AppState>,
    auth: AuthUser,
    Query(query): Query<NotificationListQuery>,
) -> Result<Json<ApiResponse<Vec<Notification>>>, AppError> {
    let mut filter = inbox_filter(&auth)?;
    filter.unread_only = query.unread;
    filter.kind = query.kind;
    filter.page = page_request(query.page, query.limit);

    let page = state.store.list_notifications(&filter).await?;
    Ok(Json(ApiResponse::paginated(page)))
}

/// Administrators message a user directly, optionally by email too.
pub async fn create_notification(
    State(state): State<AppState>,
    auth: AuthUser,
    Json(payload): Json<CreateNotificationRequest>,
) -> Result<(StatusCode, Json<ApiResponse<Notification>>), AppError> {
    auth.require_role(&[Role::Admin, Role::SuperAdmin])?;
    payload.validate()?;

    let recipient = state
        .store
        .get_user(payload.user_id)
        .await?
        .filter(|u| u.is_active)
        .ok_or_else(|| not_found("User"))?;

    let notification = state
        .notifier
        .notify_user(
            &recipient,
            payload.kind.unwrap_or(NotificationKind::System),
            &payload.title,
            &payload.message,
            payload.send_email,
            DeliveryPolicy::BestEffort,
        )
        .await?;

    tracing::info!(
        notification_id = %notification.id,
        recipient = %recipient.id,
        sender = %auth.user_id,
        email_sent = notification.email_sent,
        "Notification created"
    );

    Ok((StatusCode::CREATED, Json(ApiResponse::ok(notification))))
}

/// Mark the listed notifications, or the whole inbox, as read.
pub async fn mark_read(
    State(state): State<AppState>,
    auth: AuthUser,
    payload: Option<Json<MarkReadRequest>>,
) -> Result<Json<ApiResponse<MarkReadResponse>>, AppError> {
    let mut filter = inbox_filter(&auth)?;
    filter.ids = payload.and_then(|Json(body)| body.ids);

    let updated = state.store.mark_notifications_read(&filter).await?;
    Ok(Json(ApiResponse::ok(MarkReadResponse { updated })))
}
