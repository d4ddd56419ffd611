//! Repository facades over the booking entities.
//!
//! Handlers and the reconciliation flow depend on these traits rather than
//! on a concrete pool; [`crate::services::Database`] implements them for
//! PostgreSQL.

mod catalog;
mod notifications;
mod payments;
mod receipts;
mod reservations;
mod users;

use crate::models::{
    CreateNotification, CreatePayment, CreateReceipt, CreateReservation, CreateService,
    CreateUser, CreateVenue, ListNotificationsFilter, ListPaymentsFilter, ListReceiptsFilter,
    ListReservationsFilter, ListServicesFilter, ListUsersFilter, ListVenuesFilter, Notification,
    NotificationStats, Page, Payment, PaymentTransition, Receipt, Reservation, ReservationStatus,
    Service, TransitionOutcome, UpdateReceipt, UpdateService, UpdateUser, UpdateVenue, User,
    Venue,
};
use async_trait::async_trait;
use service_core::error::AppError;
use uuid::Uuid;

#[async_trait]
pub trait UserRepository: Send + Sync {
    async fn create_user(&self, input: &CreateUser) -> Result<User, AppError>;
    async fn get_user(&self, user_id: Uuid) -> Result<Option<User>, AppError>;
    async fn get_user_by_email(&self, email: &str) -> Result<Option<User>, AppError>;
    async fn list_users(&self, filter: &ListUsersFilter) -> Result<Page<User>, AppError>;
    async fn update_user(&self, user_id: Uuid, input: &UpdateUser)
        -> Result<Option<User>, AppError>;
}

#[async_trait]
pub trait VenueRepository: Send + Sync {
    async fn create_venue(&self, owner_id: Uuid, input: &CreateVenue) -> Result<Venue, AppError>;
    async fn get_venue(&self, venue_id: Uuid) -> Result<Option<Venue>, AppError>;
    async fn list_venues(&self, filter: &ListVenuesFilter) -> Result<Page<Venue>, AppError>;
    async fn update_venue(
        &self,
        venue_id: Uuid,
        input: &UpdateVenue,
    ) -> Result<Option<Venue>, AppError>;
    /// Soft delete: the venue and its services stop being bookable.
    async fn deactivate_venue(&self, venue_id: Uuid) -> Result<bool, AppError>;
}

#[async_trait]
pub trait ServiceRepository: Send + Sync {
    async fn create_service(&self, input: &CreateService) -> Result<Service, AppError>;
    async fn get_service(&self, service_id: Uuid) -> Result<Option<Service>, AppError>;
    async fn list_services(&self, filter: &ListServicesFilter) -> Result<Page<Service>, AppError>;
    async fn update_service(
        &self,
        service_id: Uuid,
        input: &UpdateService,
    ) -> Result<Option<Service>, AppError>;
    async fn deactivate_service(&self, service_id: Uuid) -> Result<bool, AppError>;
}

#[async_trait]
pub trait ReservationRepository: Send + Sync {
    async fn create_reservation(&self, input: &CreateReservation)
        -> Result<Reservation, AppError>;
    async fn get_reservation(&self, reservation_id: Uuid) -> Result<Option<Reservation>, AppError>;
    async fn list_reservations(
        &self,
        filter: &ListReservationsFilter,
    ) -> Result<Page<Reservation>, AppError>;
    /// Guarded update: only applies while the reservation is still `from`.
    async fn update_reservation_status(
        &self,
        reservation_id: Uuid,
        from: ReservationStatus,
        to: ReservationStatus,
    ) -> Result<Option<Reservation>, AppError>;
}

#[async_trait]
pub trait PaymentRepository: Send + Sync {
    async fn create_payment(&self, input: &CreatePayment) -> Result<Payment, AppError>;
    async fn get_payment(&self, payment_id: Uuid) -> Result<Option<Payment>, AppError>;
    async fn get_payment_by_gateway_reference(
        &self,
        reference: &str,
    ) -> Result<Option<Payment>, AppError>;
    async fn list_payments(&self, filter: &ListPaymentsFilter) -> Result<Page<Payment>, AppError>;
    /// Apply a payment transition and its reservation effect atomically.
    async fn apply_payment_transition(
        &self,
        transition: &PaymentTransition,
    ) -> Result<TransitionOutcome, AppError>;
}

#[async_trait]
pub trait ReceiptRepository: Send + Sync {
    async fn create_receipt(&self, input: &CreateReceipt) -> Result<Receipt, AppError>;
    async fn get_receipt(&self, receipt_id: Uuid) -> Result<Option<Receipt>, AppError>;
    async fn get_receipt_by_payment(&self, payment_id: Uuid) -> Result<Option<Receipt>, AppError>;
    async fn list_receipts(&self, filter: &ListReceiptsFilter) -> Result<Page<Receipt>, AppError>;
    async fn update_receipt(
        &self,
        receipt_id: Uuid,
        input: &UpdateReceipt,
    ) -> Result<Option<Receipt>, AppError>;
}

#[async_trait]
pub trait NotificationRepository: Send + Sync {
    async fn create_notification(
        &self,
        input: &CreateNotification,
    ) -> Result<Notification, AppError>;
    async fn list_notifications(
        &self,
        filter: &ListNotificationsFilter,
    ) -> Result<Page<Notification>, AppError>;
    /// Marks every unread match of `filter` (narrowed by `filter.ids`) as read.
    async fn mark_notifications_read(
        &self,
        filter: &ListNotificationsFilter,
    ) -> Result<u64, AppError>;
    async fn notification_stats(
        &self,
        filter: &ListNotificationsFilter,
    ) -> Result<NotificationStats, AppError>;
}

/// Everything the HTTP layer and reconciliation need from storage.
pub trait BookingStore:
    UserRepository
    + VenueRepository
    + ServiceRepository
    + ReservationRepository
    + PaymentRepository
    + ReceiptRepository
    + NotificationRepository
{
}

impl<T> BookingStore for T where
    T: UserRepository
        + VenueRepository
        + ServiceRepository
        + ReservationRepository
        + PaymentRepository
        + ReceiptRepository
        + NotificationRepository
{
}
