use super::PaymentRepository;
use crate::models::{
    CreatePayment, ListPaymentsFilter, Page, Payment, PaymentStatus, PaymentTransition,
    ReservationStatus, TransitionOutcome,
};
use crate::services::database::{count_to_total, Database};
use crate::services::metrics::{record_transition, DB_QUERY_DURATION};
use async_trait::async_trait;
use service_core::error::AppError;
use sqlx::types::Json;
use tracing::{info, instrument, warn};
use uuid::Uuid;

/// Statuses a reservation may move to `target` from when a payment drives it.
/// Cancellation on a failed or fully refunded payment applies from any live state.
fn reservation_sources(target: ReservationStatus) -> Vec<String> {
    ReservationStatus::payment_driven_sources(target)
        .into_iter()
        .map(|s| s.as_str().to_string())
        .collect()
}

#[async_trait]
impl PaymentRepository for Database {
    #[instrument(skip(self, input), fields(user_id = %input.user_id, amount = %input.amount))]
    async fn create_payment(&self, input: &CreatePayment) -> Result<Payment, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["create_payment"])
            .start_timer();

        let payment = sqlx::query_as::<_, Payment>(
            r#"
            INSERT INTO payments (id, user_id, reservation_id, amount, currency, status, gateway_reference, metadata)
            VALUES ($1, $2, $3, $4, $5, 'PENDING', $6, $7)
            RETURNING id, user_id, reservation_id, amount, currency, status, gateway_reference, metadata, created_at, updated_at
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(input.user_id)
        .bind(input.reservation_id)
        .bind(input.amount)
        .bind(&input.currency)
        .bind(input.gateway_reference.as_deref())
        .bind(&input.metadata)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| match e {
            sqlx::Error::Database(ref db_err) if db_err.is_unique_violation() => {
                AppError::Conflict(anyhow::anyhow!(
                    "A payment already exists for this gateway reference"
                ))
            }
            _ => AppError::DatabaseError(anyhow::anyhow!("Failed to create payment: {}", e)),
        })?;

        timer.observe_duration();

        info!(
            payment_id = %payment.id,
            gateway_reference = ?payment.gateway_reference,
            "Payment created"
        );

        Ok(payment)
    }

    #[instrument(skip(self))]
    async fn get_payment(&self, payment_id: Uuid) -> Result<Option<Payment>, AppError> {
        let payment = sqlx::query_as::<_, Payment>(
            r#"
            SELECT id, user_id, reservation_id, amount, currency, status, gateway_reference, metadata, created_at, updated_at
            FROM payments
            WHERE id = $1
            "#,
        )
        .bind(payment_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to get payment: {}", e)))?;

        Ok(payment)
    }

    #[instrument(skip(self))]
    async fn get_payment_by_gateway_reference(
        &self,
        reference: &str,
    ) -> Result<Option<Payment>, AppError> {
        let payment = sqlx::query_as::<_, Payment>(
            r#"
            SELECT id, user_id, reservation_id, amount, currency, status, gateway_reference, metadata, created_at, updated_at
            FROM payments
            WHERE gateway_reference = $1
            "#,
        )
        .bind(reference)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to get payment: {}", e)))?;

        Ok(payment)
    }

    #[instrument(skip(self, filter))]
    async fn list_payments(&self, filter: &ListPaymentsFilter) -> Result<Page<Payment>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["list_payments"])
            .start_timer();

        let status = filter.status.map(|s| s.as_str());

        let payments = sqlx::query_as::<_, Payment>(
            r#"
            SELECT p.id, p.user_id, p.reservation_id, p.amount, p.currency, p.status, p.gateway_reference, p.metadata, p.created_at, p.updated_at
            FROM payments p
            WHERE ($1::uuid IS NULL OR p.user_id = $1)
              AND ($2::uuid IS NULL OR EXISTS (
                    SELECT 1 FROM reservations r
                    JOIN venues v ON v.id = r.venue_id
                    WHERE r.id = p.reservation_id AND v.owner_id = $2))
              AND ($3::varchar IS NULL OR p.status = $3)
              AND ($4::uuid IS NULL OR p.reservation_id = $4)
            ORDER BY p.created_at DESC
            LIMIT $5 OFFSET $6
            "#,
        )
        .bind(filter.user_id)
        .bind(filter.venue_owner_id)
        .bind(status)
        .bind(filter.reservation_id)
        .bind(filter.page.limit())
        .bind(filter.page.offset())
        .fetch_all(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to list payments: {}", e)))?;

        let total: i64 = sqlx::query_scalar(
            r#"
            SELECT COUNT(*)
            FROM payments p
            WHERE ($1::uuid IS NULL OR p.user_id = $1)
              AND ($2::uuid IS NULL OR EXISTS (
                    SELECT 1 FROM reservations r
                    JOIN venues v ON v.id = r.venue_id
                    WHERE r.id = p.reservation_id AND v.owner_id = $2))
              AND ($3::varchar IS NULL OR p.status = $3)
              AND ($4::uuid IS NULL OR p.reservation_id = $4)
            "#,
        )
        .bind(filter.user_id)
        .bind(filter.venue_owner_id)
        .bind(status)
        .bind(filter.reservation_id)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to count payments: {}", e))
        })?;

        timer.observe_duration();

        Ok(Page::new(payments, count_to_total(total), filter.page))
    }

    #[instrument(
        skip(self, transition),
        fields(
            payment_id = %transition.payment_id,
            from = transition.from.as_str(),
            to = transition.to.as_str()
        )
    )]
    async fn apply_payment_transition(
        &self,
        transition: &PaymentTransition,
    ) -> Result<TransitionOutcome, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["apply_payment_transition"])
            .start_timer();

        let mut tx = self.pool.begin().await.map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to begin transaction: {}", e))
        })?;

        if let Some(ref event) = transition.event {
            let recorded = sqlx::query(
                r#"
                INSERT INTO processed_webhook_events (event_id, event_type, payment_id)
                VALUES ($1, $2, $3)
                ON CONFLICT (event_id) DO NOTHING
                "#,
            )
            .bind(&event.event_id)
            .bind(&event.event_type)
            .bind(transition.payment_id)
            .execute(&mut *tx)
            .await
            .map_err(|e| {
                AppError::DatabaseError(anyhow::anyhow!("Failed to record event: {}", e))
            })?;

            if recorded.rows_affected() == 0 {
                tx.rollback().await.ok();
                timer.observe_duration();
                info!(event_id = %event.event_id, "Gateway event already processed");
                return Ok(TransitionOutcome::AlreadyProcessed);
            }
        }

        let updated = sqlx::query_as::<_, Payment>(
            r#"
            UPDATE payments
            SET status = $3,
                metadata = metadata || $4::jsonb,
                updated_at = NOW()
            WHERE id = $1 AND status = $2
            RETURNING id, user_id, reservation_id, amount, currency, status, gateway_reference, metadata, created_at, updated_at
            "#,
        )
        .bind(transition.payment_id)
        .bind(transition.from.as_str())
        .bind(transition.to.as_str())
        .bind(Json(&transition.metadata))
        .fetch_optional(&mut *tx)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to update payment: {}", e)))?;

        let Some(payment) = updated else {
            tx.rollback().await.ok();
            let current: Option<String> =
                sqlx::query_scalar("SELECT status FROM payments WHERE id = $1")
                    .bind(transition.payment_id)
                    .fetch_optional(&self.pool)
                    .await
                    .map_err(|e| {
                        AppError::DatabaseError(anyhow::anyhow!("Failed to read payment: {}", e))
                    })?;
            timer.observe_duration();

            let current = current
                .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Payment not found")))?
                .parse::<PaymentStatus>()
                .map_err(|e| AppError::DatabaseError(anyhow::Error::new(e)))?;
            warn!(current = current.as_str(), "Payment status changed concurrently");
            return Ok(TransitionOutcome::StatusChanged(current));
        };

        if let (Some(target), Some(reservation_id)) =
            (transition.reservation_status, payment.reservation_id)
        {
            let result = sqlx::query(
                r#"
                UPDATE reservations
                SET status = $2, updated_at = NOW()
                WHERE id = $1 AND status = ANY($3)
                "#,
            )
            .bind(reservation_id)
            .bind(target.as_str())
            .bind(reservation_sources(target))
            .execute(&mut *tx)
            .await
            .map_err(|e| {
                AppError::DatabaseError(anyhow::anyhow!("Failed to update reservation: {}", e))
            })?;

            if result.rows_affected() == 0 {
                warn!(
                    reservation_id = %reservation_id,
                    target = target.as_str(),
                    "Reservation not in a state that allows this transition"
                );
            }
        }

        tx.commit().await.map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to commit transaction: {}", e))
        })?;

        timer.observe_duration();

        if transition.is_status_change() {
            record_transition(transition.from.as_str(), transition.to.as_str());
        }

        info!(status = payment.status.as_str(), "Payment transition applied");

        Ok(TransitionOutcome::Applied(payment))
    }
}
