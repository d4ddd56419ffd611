use super::ReservationRepository;
use crate::models::{
    CreateReservation, ListReservationsFilter, Page, Reservation, ReservationStatus,
};
use crate::services::database::{count_to_total, Database};
use crate::services::metrics::DB_QUERY_DURATION;
use async_trait::async_trait;
use service_core::error::AppError;
use tracing::{info, instrument};
use uuid::Uuid;

#[async_trait]
impl ReservationRepository for Database {
    #[instrument(skip(self, input), fields(user_id = %input.user_id, service_id = %input.service_id))]
    async fn create_reservation(
        &self,
        input: &CreateReservation,
    ) -> Result<Reservation, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["create_reservation"])
            .start_timer();

        let reservation = sqlx::query_as::<_, Reservation>(
            r#"
            INSERT INTO reservations (id, user_id, venue_id, service_id, check_in, check_out, guests, status, total_amount, notes)
            VALUES ($1, $2, $3, $4, $5, $6, $7, 'PENDING', $8, $9)
            RETURNING id, user_id, venue_id, service_id, check_in, check_out, guests, status, total_amount, notes, created_at, updated_at
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(input.user_id)
        .bind(input.venue_id)
        .bind(input.service_id)
        .bind(input.check_in)
        .bind(input.check_out)
        .bind(input.guests)
        .bind(input.total_amount)
        .bind(input.notes.as_deref())
        .fetch_one(&self.pool)
        .await
        .map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to create reservation: {}", e))
        })?;

        timer.observe_duration();

        info!(
            reservation_id = %reservation.id,
            total_amount = %reservation.total_amount,
            "Reservation created"
        );

        Ok(reservation)
    }

    #[instrument(skip(self))]
    async fn get_reservation(&self, reservation_id: Uuid) -> Result<Option<Reservation>, AppError> {
        let reservation = sqlx::query_as::<_, Reservation>(
            r#"
            SELECT id, user_id, venue_id, service_id, check_in, check_out, guests, status, total_amount, notes, created_at, updated_at
            FROM reservations
            WHERE id = $1
            "#,
        )
        .bind(reservation_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to get reservation: {}", e))
        })?;

        Ok(reservation)
    }

    #[instrument(skip(self, filter))]
    async fn list_reservations(
        &self,
        filter: &ListReservationsFilter,
    ) -> Result<Page<Reservation>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["list_reservations"])
            .start_timer();

        let status = filter.status.map(|s| s.as_str());

        let reservations = sqlx::query_as::<_, Reservation>(
            r#"
            SELECT r.id, r.user_id, r.venue_id, r.service_id, r.check_in, r.check_out, r.guests, r.status, r.total_amount, r.notes, r.created_at, r.updated_at
            FROM reservations r
            JOIN venues v ON v.id = r.venue_id
            WHERE ($1::uuid IS NULL OR r.user_id = $1)
              AND ($2::uuid IS NULL OR v.owner_id = $2)
              AND ($3::varchar IS NULL OR r.status = $3)
            ORDER BY r.created_at DESC
            LIMIT $4 OFFSET $5
            "#,
        )
        .bind(filter.user_id)
        .bind(filter.venue_owner_id)
        .bind(status)
        .bind(filter.page.limit())
        .bind(filter.page.offset())
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to list reservations: {}", e))
        })?;

        let total: i64 = sqlx::query_scalar(
            r#"
            SELECT COUNT(*)
            FROM reservations r
            JOIN venues v ON v.id = r.venue_id
            WHERE ($1::uuid IS NULL OR r.user_id = $1)
              AND ($2::uuid IS NULL OR v.owner_id = $2)
              AND ($3::varchar IS NULL OR r.status = $3)
            "#,
        )
        .bind(filter.user_id)
        .bind(filter.venue_owner_id)
        .bind(status)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to count reservations: {}", e))
        })?;

        timer.observe_duration();

        Ok(Page::new(reservations, count_to_total(total), filter.page))
    }

    #[instrument(skip(self))]
    async fn update_reservation_status(
        &self,
        reservation_id: Uuid,
        from: ReservationStatus,
        to: ReservationStatus,
    ) -> Result<Option<Reservation>, AppError> {
        let reservation = sqlx::query_as::<_, Reservation>(
            r#"
            UPDATE reservations
            SET status = $3, updated_at = NOW()
            WHERE id = $1 AND status = $2
            RETURNING id, user_id, venue_id, service_id, check_in, check_out, guests, status, total_amount, notes, created_at, updated_at
            "#,
        )
        .bind(reservation_id)
        .bind(from.as_str())
        .bind(to.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to update reservation: {}", e))
        })?;

        if reservation.is_some() {
            info!(
                reservation_id = %reservation_id,
                from = from.as_str(),
                to = to.as_str(),
                "Reservation status updated"
            );
        }

        Ok(reservation)
    }
}
