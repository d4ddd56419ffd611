//! Venues and the services they offer.

use super::{ServiceRepository, VenueRepository};
use crate::models::{
    CreateService, CreateVenue, ListServicesFilter, ListVenuesFilter, Page, Service,
    UpdateService, UpdateVenue, Venue,
};
use crate::services::database::{count_to_total, Database};
use crate::services::metrics::DB_QUERY_DURATION;
use async_trait::async_trait;
use service_core::error::AppError;
use tracing::{info, instrument};
use uuid::Uuid;

#[async_trait]
impl VenueRepository for Database {
    #[instrument(skip(self, input), fields(owner_id = %owner_id))]
    async fn create_venue(&self, owner_id: Uuid, input: &CreateVenue) -> Result<Venue, AppError> {
        let venue = sqlx::query_as::<_, Venue>(
            r#"
            INSERT INTO venues (id, owner_id, name, address, city, description)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING id, owner_id, name, address, city, description, is_active, created_at, updated_at
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(owner_id)
        .bind(&input.name)
        .bind(&input.address)
        .bind(&input.city)
        .bind(input.description.as_deref())
        .fetch_one(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to create venue: {}", e)))?;

        info!(venue_id = %venue.id, name = %venue.name, "Venue created");

        Ok(venue)
    }

    #[instrument(skip(self))]
    async fn get_venue(&self, venue_id: Uuid) -> Result<Option<Venue>, AppError> {
        let venue = sqlx::query_as::<_, Venue>(
            r#"
            SELECT id, owner_id, name, address, city, description, is_active, created_at, updated_at
            FROM venues
            WHERE id = $1
            "#,
        )
        .bind(venue_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to get venue: {}", e)))?;

        Ok(venue)
    }

    #[instrument(skip(self, filter))]
    async fn list_venues(&self, filter: &ListVenuesFilter) -> Result<Page<Venue>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["list_venues"])
            .start_timer();

        let venues = sqlx::query_as::<_, Venue>(
            r#"
            SELECT id, owner_id, name, address, city, description, is_active, created_at, updated_at
            FROM venues
            WHERE ($1::uuid IS NULL OR owner_id = $1)
              AND ($2::varchar IS NULL OR LOWER(city) = LOWER($2))
              AND ($3::bool = FALSE OR is_active = TRUE)
            ORDER BY name
            LIMIT $4 OFFSET $5
            "#,
        )
        .bind(filter.owner_id)
        .bind(filter.city.as_deref())
        .bind(filter.active_only)
        .bind(filter.page.limit())
        .bind(filter.page.offset())
        .fetch_all(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to list venues: {}", e)))?;

        let total: i64 = sqlx::query_scalar(
            r#"
            SELECT COUNT(*)
            FROM venues
            WHERE ($1::uuid IS NULL OR owner_id = $1)
              AND ($2::varchar IS NULL OR LOWER(city) = LOWER($2))
              AND ($3::bool = FALSE OR is_active = TRUE)
            "#,
        )
        .bind(filter.owner_id)
        .bind(filter.city.as_deref())
        .bind(filter.active_only)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to count venues: {}", e)))?;

        timer.observe_duration();

        Ok(Page::new(venues, count_to_total(total), filter.page))
    }

    #[instrument(skip(self, input))]
    async fn update_venue(
        &self,
        venue_id: Uuid,
        input: &UpdateVenue,
    ) -> Result<Option<Venue>, AppError> {
        let venue = sqlx::query_as::<_, Venue>(
            r#"
            UPDATE venues
            SET name = COALESCE($2, name),
                address = COALESCE($3, address),
                city = COALESCE($4, city),
                description = COALESCE($5, description),
                is_active = COALESCE($6, is_active),
                updated_at = NOW()
            WHERE id = $1
            RETURNING id, owner_id, name, address, city, description, is_active, created_at, updated_at
            "#,
        )
        .bind(venue_id)
        .bind(input.name.as_deref())
        .bind(input.address.as_deref())
        .bind(input.city.as_deref())
        .bind(input.description.as_deref())
        .bind(input.is_active)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to update venue: {}", e)))?;

        Ok(venue)
    }

    #[instrument(skip(self))]
    async fn deactivate_venue(&self, venue_id: Uuid) -> Result<bool, AppError> {
        let mut tx = self.pool.begin().await.map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to begin transaction: {}", e))
        })?;

        let result = sqlx::query(
            "UPDATE venues SET is_active = FALSE, updated_at = NOW() WHERE id = $1 AND is_active",
        )
        .bind(venue_id)
        .execute(&mut *tx)
        .await
        .map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to deactivate venue: {}", e))
        })?;

        if result.rows_affected() == 0 {
            tx.rollback().await.ok();
            return Ok(false);
        }

        sqlx::query(
            "UPDATE services SET is_active = FALSE, updated_at = NOW() WHERE venue_id = $1 AND is_active",
        )
        .bind(venue_id)
        .execute(&mut *tx)
        .await
        .map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to deactivate services: {}", e))
        })?;

        tx.commit().await.map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to commit transaction: {}", e))
        })?;

        info!(venue_id = %venue_id, "Venue deactivated");

        Ok(true)
    }
}

#[async_trait]
impl ServiceRepository for Database {
    #[instrument(skip(self, input), fields(venue_id = %input.venue_id))]
    async fn create_service(&self, input: &CreateService) -> Result<Service, AppError> {
        let service = sqlx::query_as::<_, Service>(
            r#"
            INSERT INTO services (id, venue_id, name, description, price, capacity)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING id, venue_id, name, description, price, capacity, is_active, created_at, updated_at
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(input.venue_id)
        .bind(&input.name)
        .bind(input.description.as_deref())
        .bind(input.price)
        .bind(input.capacity)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to create service: {}", e))
        })?;

        info!(service_id = %service.id, name = %service.name, "Service created");

        Ok(service)
    }

    #[instrument(skip(self))]
    async fn get_service(&self, service_id: Uuid) -> Result<Option<Service>, AppError> {
        let service = sqlx::query_as::<_, Service>(
            r#"
            SELECT id, venue_id, name, description, price, capacity, is_active, created_at, updated_at
            FROM services
            WHERE id = $1
            "#,
        )
        .bind(service_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to get service: {}", e)))?;

        Ok(service)
    }

    #[instrument(skip(self, filter))]
    async fn list_services(&self, filter: &ListServicesFilter) -> Result<Page<Service>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["list_services"])
            .start_timer();

        let services = sqlx::query_as::<_, Service>(
            r#"
            SELECT s.id, s.venue_id, s.name, s.description, s.price, s.capacity, s.is_active, s.created_at, s.updated_at
            FROM services s
            JOIN venues v ON v.id = s.venue_id
            WHERE ($1::uuid IS NULL OR s.venue_id = $1)
              AND ($2::uuid IS NULL OR v.owner_id = $2)
              AND ($3::bool = FALSE OR (s.is_active = TRUE AND v.is_active = TRUE))
            ORDER BY s.name
            LIMIT $4 OFFSET $5
            "#,
        )
        .bind(filter.venue_id)
        .bind(filter.venue_owner_id)
        .bind(filter.active_only)
        .bind(filter.page.limit())
        .bind(filter.page.offset())
        .fetch_all(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to list services: {}", e)))?;

        let total: i64 = sqlx::query_scalar(
            r#"
            SELECT COUNT(*)
            FROM services s
            JOIN venues v ON v.id = s.venue_id
            WHERE ($1::uuid IS NULL OR s.venue_id = $1)
              AND ($2::uuid IS NULL OR v.owner_id = $2)
              AND ($3::bool = FALSE OR (s.is_active = TRUE AND v.is_active = TRUE))
            "#,
        )
        .bind(filter.venue_id)
        .bind(filter.venue_owner_id)
        .bind(filter.active_only)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to count services: {}", e))
        })?;

        timer.observe_duration();

        Ok(Page::new(services, count_to_total(total), filter.page))
    }

    #[instrument(skip(self, input))]
    async fn update_service(
        &self,
        service_id: Uuid,
        input: &UpdateService,
    ) -> Result<Option<Service>, AppError> {
        let service = sqlx::query_as::<_, Service>(
            r#"
            UPDATE services
            SET name = COALESCE($2, name),
                description = COALESCE($3, description),
                price = COALESCE($4, price),
                capacity = COALESCE($5, capacity),
                is_active = COALESCE($6, is_active),
                updated_at = NOW()
            WHERE id = $1
            RETURNING id, venue_id, name, description, price, capacity, is_active, created_at, updated_at
            "#,
        )
        .bind(service_id)
        .bind(input.name.as_deref())
        .bind(input.description.as_deref())
        .bind(input.price)
        .bind(input.capacity)
        .bind(input.is_active)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to update service: {}", e))
        })?;

        Ok(service)
    }

    #[instrument(skip(self))]
    async fn deactivate_service(&self, service_id: Uuid) -> Result<bool, AppError> {
        let result = sqlx::query(
            "UPDATE services SET is_active = FALSE, updated_at = NOW() WHERE id = $1 AND is_active",
        )
        .bind(service_id)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to deactivate service: {}", e))
        })?;

        Ok(result.rows_affected() > 0)
    }
}
