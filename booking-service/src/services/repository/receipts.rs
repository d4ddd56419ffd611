use super::ReceiptRepository;
use crate::models::{CreateReceipt, ListReceiptsFilter, Page, Receipt, UpdateReceipt};
use crate::services::database::{count_to_total, Database};
use crate::services::metrics::DB_QUERY_DURATION;
use async_trait::async_trait;
use service_core::error::AppError;
use tracing::{info, instrument};
use uuid::Uuid;

#[async_trait]
impl ReceiptRepository for Database {
    #[instrument(skip(self, input), fields(payment_id = %input.payment_id))]
    async fn create_receipt(&self, input: &CreateReceipt) -> Result<Receipt, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["create_receipt"])
            .start_timer();

        let receipt = sqlx::query_as::<_, Receipt>(
            r#"
            INSERT INTO receipts (id, receipt_number, payment_id, user_id, subtotal, tax_amount, tax_rate, total, currency, notes)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            RETURNING id, receipt_number, payment_id, user_id, subtotal, tax_amount, tax_rate, total, currency, status, notes, issued_at, created_at, updated_at
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(&input.receipt_number)
        .bind(input.payment_id)
        .bind(input.user_id)
        .bind(input.breakdown.subtotal)
        .bind(input.breakdown.tax_amount)
        .bind(input.breakdown.tax_rate)
        .bind(input.breakdown.total)
        .bind(&input.currency)
        .bind(input.notes.as_deref())
        .fetch_one(&self.pool)
        .await
        .map_err(|e| match e {
            sqlx::Error::Database(ref db_err) if db_err.is_unique_violation() => {
                AppError::Conflict(anyhow::anyhow!("Receipt already exists for this payment"))
            }
            _ => AppError::DatabaseError(anyhow::anyhow!("Failed to create receipt: {}", e)),
        })?;

        timer.observe_duration();

        info!(
            receipt_id = %receipt.id,
            receipt_number = %receipt.receipt_number,
            total = %receipt.total,
            "Receipt issued"
        );

        Ok(receipt)
    }

    #[instrument(skip(self))]
    async fn get_receipt(&self, receipt_id: Uuid) -> Result<Option<Receipt>, AppError> {
        let receipt = sqlx::query_as::<_, Receipt>(
            r#"
            SELECT id, receipt_number, payment_id, user_id, subtotal, tax_amount, tax_rate, total, currency, status, notes, issued_at, created_at, updated_at
            FROM receipts
            WHERE id = $1
            "#,
        )
        .bind(receipt_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to get receipt: {}", e)))?;

        Ok(receipt)
    }

    #[instrument(skip(self))]
    async fn get_receipt_by_payment(&self, payment_id: Uuid) -> Result<Option<Receipt>, AppError> {
        let receipt = sqlx::query_as::<_, Receipt>(
            r#"
            SELECT id, receipt_number, payment_id, user_id, subtotal, tax_amount, tax_rate, total, currency, status, notes, issued_at, created_at, updated_at
            FROM receipts
            WHERE payment_id = $1
            "#,
        )
        .bind(payment_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to get receipt: {}", e)))?;

        Ok(receipt)
    }

    #[instrument(skip(self, filter))]
    async fn list_receipts(&self, filter: &ListReceiptsFilter) -> Result<Page<Receipt>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["list_receipts"])
            .start_timer();

        let status = filter.status.map(|s| s.as_str());

        let receipts = sqlx::query_as::<_, Receipt>(
            r#"
            SELECT rc.id, rc.receipt_number, rc.payment_id, rc.user_id, rc.subtotal, rc.tax_amount, rc.tax_rate, rc.total, rc.currency, rc.status, rc.notes, rc.issued_at, rc.created_at, rc.updated_at
            FROM receipts rc
            WHERE ($1::uuid IS NULL OR rc.user_id = $1)
              AND ($2::uuid IS NULL OR EXISTS (
                    SELECT 1 FROM payments p
                    JOIN reservations r ON r.id = p.reservation_id
                    JOIN venues v ON v.id = r.venue_id
                    WHERE p.id = rc.payment_id AND v.owner_id = $2))
              AND ($3::varchar IS NULL OR rc.status = $3)
            ORDER BY rc.issued_at DESC
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
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to list receipts: {}", e)))?;

        let total: i64 = sqlx::query_scalar(
            r#"
            SELECT COUNT(*)
            FROM receipts rc
            WHERE ($1::uuid IS NULL OR rc.user_id = $1)
              AND ($2::uuid IS NULL OR EXISTS (
                    SELECT 1 FROM payments p
                    JOIN reservations r ON r.id = p.reservation_id
                    JOIN venues v ON v.id = r.venue_id
                    WHERE p.id = rc.payment_id AND v.owner_id = $2))
              AND ($3::varchar IS NULL OR rc.status = $3)
            "#,
        )
        .bind(filter.user_id)
        .bind(filter.venue_owner_id)
        .bind(status)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to count receipts: {}", e))
        })?;

        timer.observe_duration();

        Ok(Page::new(receipts, count_to_total(total), filter.page))
    }

    #[instrument(skip(self, input))]
    async fn update_receipt(
        &self,
        receipt_id: Uuid,
        input: &UpdateReceipt,
    ) -> Result<Option<Receipt>, AppError> {
        let breakdown = input.breakdown.as_ref();

        let receipt = sqlx::query_as::<_, Receipt>(
            r#"
            UPDATE receipts
            SET status = COALESCE($2, status),
                notes = COALESCE($3, notes),
                subtotal = COALESCE($4, subtotal),
                tax_amount = COALESCE($5, tax_amount),
                tax_rate = COALESCE($6, tax_rate),
                total = COALESCE($7, total),
                issued_at = CASE WHEN $4::numeric IS NULL THEN issued_at ELSE NOW() END,
                updated_at = NOW()
            WHERE id = $1
            RETURNING id, receipt_number, payment_id, user_id, subtotal, tax_amount, tax_rate, total, currency, status, notes, issued_at, created_at, updated_at
            "#,
        )
        .bind(receipt_id)
        .bind(input.status.map(|s| s.as_str()))
        .bind(input.notes.as_deref())
        .bind(breakdown.map(|b| b.subtotal))
        .bind(breakdown.map(|b| b.tax_amount))
        .bind(breakdown.map(|b| b.tax_rate))
        .bind(breakdown.map(|b| b.total))
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to update receipt: {}", e)))?;

        if let Some(ref receipt) = receipt {
            info!(
                receipt_id = %receipt.id,
                status = receipt.status.as_str(),
                "Receipt updated"
            );
        }

        Ok(receipt)
    }
}
