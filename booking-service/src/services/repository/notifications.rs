use super::NotificationRepository;
use crate::models::{
    CreateNotification, ListNotificationsFilter, Notification, NotificationStats, Page,
};
use crate::services::database::{count_to_total, Database};
use crate::services::metrics::DB_QUERY_DURATION;
use async_trait::async_trait;
use service_core::error::AppError;
use sqlx::FromRow;
use tracing::{info, instrument};
use uuid::Uuid;

#[derive(FromRow)]
struct StatsRow {
    total: i64,
    unread: i64,
    email_sent: i64,
    last_7_days: i64,
}

#[derive(FromRow)]
struct KindCount {
    kind: String,
    count: i64,
}

#[async_trait]
impl NotificationRepository for Database {
    #[instrument(skip(self, input), fields(audience = input.audience.as_str(), kind = input.kind.as_str()))]
    async fn create_notification(
        &self,
        input: &CreateNotification,
    ) -> Result<Notification, AppError> {
        let notification = sqlx::query_as::<_, Notification>(
            r#"
            INSERT INTO notifications (id, audience, user_id, venue_id, kind, title, message, email_sent)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            RETURNING id, audience, user_id, venue_id, kind, title, message, is_read, email_sent, created_at
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(input.audience.as_str())
        .bind(input.user_id)
        .bind(input.venue_id)
        .bind(input.kind.as_str())
        .bind(&input.title)
        .bind(&input.message)
        .bind(input.email_sent)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to create notification: {}", e))
        })?;

        info!(notification_id = %notification.id, "Notification created");

        Ok(notification)
    }

    #[instrument(skip(self, filter), fields(audience = filter.audience.as_str()))]
    async fn list_notifications(
        &self,
        filter: &ListNotificationsFilter,
    ) -> Result<Page<Notification>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["list_notifications"])
            .start_timer();

        let kind = filter.kind.map(|k| k.as_str());

        let notifications = sqlx::query_as::<_, Notification>(
            r#"
            SELECT n.id, n.audience, n.user_id, n.venue_id, n.kind, n.title, n.message, n.is_read, n.email_sent, n.created_at
            FROM notifications n
            WHERE n.audience = $1
              AND ($2::uuid IS NULL OR n.user_id = $2)
              AND ($3::uuid IS NULL OR n.venue_id IN (SELECT id FROM venues WHERE owner_id = $3))
              AND ($4::bool = FALSE OR n.is_read = FALSE)
              AND ($5::varchar IS NULL OR n.kind = $5)
            ORDER BY n.created_at DESC
            LIMIT $6 OFFSET $7
            "#,
        )
        .bind(filter.audience.as_str())
        .bind(filter.user_id)
        .bind(filter.venue_owner_id)
        .bind(filter.unread_only)
        .bind(kind)
        .bind(filter.page.limit())
        .bind(filter.page.offset())
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to list notifications: {}", e))
        })?;

        let total: i64 = sqlx::query_scalar(
            r#"
            SELECT COUNT(*)
            FROM notifications n
            WHERE n.audience = $1
              AND ($2::uuid IS NULL OR n.user_id = $2)
              AND ($3::uuid IS NULL OR n.venue_id IN (SELECT id FROM venues WHERE owner_id = $3))
              AND ($4::bool = FALSE OR n.is_read = FALSE)
              AND ($5::varchar IS NULL OR n.kind = $5)
            "#,
        )
        .bind(filter.audience.as_str())
        .bind(filter.user_id)
        .bind(filter.venue_owner_id)
        .bind(filter.unread_only)
        .bind(kind)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to count notifications: {}", e))
        })?;

        timer.observe_duration();

        Ok(Page::new(notifications, count_to_total(total), filter.page))
    }

    #[instrument(skip(self, filter), fields(audience = filter.audience.as_str()))]
    async fn mark_notifications_read(
        &self,
        filter: &ListNotificationsFilter,
    ) -> Result<u64, AppError> {
        let result = sqlx::query(
            r#"
            UPDATE notifications n
            SET is_read = TRUE
            WHERE n.audience = $1
              AND n.is_read = FALSE
              AND ($2::uuid IS NULL OR n.user_id = $2)
              AND ($3::uuid IS NULL OR n.venue_id IN (SELECT id FROM venues WHERE owner_id = $3))
              AND ($4::uuid[] IS NULL OR n.id = ANY($4))
            "#,
        )
        .bind(filter.audience.as_str())
        .bind(filter.user_id)
        .bind(filter.venue_owner_id)
        .bind(filter.ids.as_deref())
        .execute(&self.pool)
        .await
        .map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to mark notifications read: {}", e))
        })?;

        let updated = result.rows_affected();
        info!(updated = updated, "Notifications marked as read");

        Ok(updated)
    }

    #[instrument(skip(self, filter), fields(audience = filter.audience.as_str()))]
    async fn notification_stats(
        &self,
        filter: &ListNotificationsFilter,
    ) -> Result<NotificationStats, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["notification_stats"])
            .start_timer();

        let row = sqlx::query_as::<_, StatsRow>(
            r#"
            SELECT COUNT(*) AS total,
                   COUNT(*) FILTER (WHERE n.is_read = FALSE) AS unread,
                   COUNT(*) FILTER (WHERE n.email_sent = TRUE) AS email_sent,
                   COUNT(*) FILTER (WHERE n.created_at >= NOW() - INTERVAL '7 days') AS last_7_days
            FROM notifications n
            WHERE n.audience = $1
              AND ($2::uuid IS NULL OR n.user_id = $2)
              AND ($3::uuid IS NULL OR n.venue_id IN (SELECT id FROM venues WHERE owner_id = $3))
            "#,
        )
        .bind(filter.audience.as_str())
        .bind(filter.user_id)
        .bind(filter.venue_owner_id)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to compute notification stats: {}", e))
        })?;

        let kinds = sqlx::query_as::<_, KindCount>(
            r#"
            SELECT n.kind, COUNT(*) AS count
            FROM notifications n
            WHERE n.audience = $1
              AND ($2::uuid IS NULL OR n.user_id = $2)
              AND ($3::uuid IS NULL OR n.venue_id IN (SELECT id FROM venues WHERE owner_id = $3))
            GROUP BY n.kind
            "#,
        )
        .bind(filter.audience.as_str())
        .bind(filter.user_id)
        .bind(filter.venue_owner_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to group notifications: {}", e))
        })?;

        timer.observe_duration();

        let total = count_to_total(row.total);
        let unread = count_to_total(row.unread);

        Ok(NotificationStats {
            total,
            unread,
            read: total.saturating_sub(unread),
            email_sent: count_to_total(row.email_sent),
            by_kind: kinds
                .into_iter()
                .map(|k| (k.kind, count_to_total(k.count)))
                .collect(),
            last_7_days: count_to_total(row.last_7_days),
        })
    }
}
