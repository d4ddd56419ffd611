#![allow(dead_code)]

use async_trait::async_trait;
use booking_service::config::{
    BookingConfig, DatabaseConfig, JwtConfig, SmtpConfig, StripeConfig,
};
use booking_service::models::{
    CreateNotification, CreatePayment, CreateReceipt, CreateReservation, CreateService,
    CreateUser, CreateVenue, ListNotificationsFilter, ListPaymentsFilter, ListReceiptsFilter,
    ListReservationsFilter, ListServicesFilter, ListUsersFilter, ListVenuesFilter, Notification,
    NotificationStats, Page, PageRequest, Payment, PaymentStatus, PaymentTransition, Receipt,
    Reservation, ReservationStatus, Role, Service, TransitionOutcome, UpdateReceipt,
    UpdateService, UpdateUser, UpdateVenue, User, Venue,
};
use booking_service::services::repository::{
    BookingStore, NotificationRepository, PaymentRepository, ReceiptRepository,
    ReservationRepository, ServiceRepository, UserRepository, VenueRepository,
};
use booking_service::services::stripe::{sign_payload, SIGNATURE_HEADER};
use booking_service::services::{EmailProvider, MockEmailProvider};
use booking_service::startup::{AppState, Application};
use chrono::{Duration, NaiveDate, Utc};
use rust_decimal::Decimal;
use secrecy::Secret;
use serde_json::{json, Value};
use service_core::config::Config as CoreConfig;
use service_core::error::AppError;
use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use uuid::Uuid;
use wiremock::MockServer;

pub const WEBHOOK_SECRET: &str = "whsec_test_secret";

/// Keeps every entity in memory with the same filtering, guarding and
/// uniqueness rules as the PostgreSQL store.
#[derive(Default)]
pub struct InMemoryStore {
    tables: Mutex<Tables>,
}

#[derive(Default)]
struct Tables {
    users: Vec<User>,
    venues: Vec<Venue>,
    services: Vec<Service>,
    reservations: Vec<Reservation>,
    payments: Vec<Payment>,
    receipts: Vec<Receipt>,
    notifications: Vec<Notification>,
    processed_events: HashSet<String>,
}

impl Tables {
    fn venue_owner(&self, venue_id: Uuid) -> Option<Uuid> {
        self.venues
            .iter()
            .find(|v| v.id == venue_id)
            .map(|v| v.owner_id)
    }

    fn payment_venue_owner(&self, payment: &Payment) -> Option<Uuid> {
        let reservation_id = payment.reservation_id?;
        let reservation = self.reservations.iter().find(|r| r.id == reservation_id)?;
        self.venue_owner(reservation.venue_id)
    }

    fn notification_matches(&self, n: &Notification, filter: &ListNotificationsFilter) -> bool {
        n.audience == filter.audience
            && filter.user_id.map_or(true, |id| n.user_id == Some(id))
            && filter.venue_owner_id.map_or(true, |owner| {
                n.venue_id
                    .and_then(|venue_id| self.venue_owner(venue_id))
                    .map_or(false, |o| o == owner)
            })
    }
}

fn paginate<T: Clone>(items: Vec<T>, request: PageRequest) -> Page<T> {
    let total = items.len() as u64;
    let page = items
        .into_iter()
        .skip(request.offset() as usize)
        .take(request.limit() as usize)
        .collect();
    Page::new(page, total, request)
}

fn newest_first<T, F: Fn(&T) -> chrono::DateTime<Utc>>(items: &mut [T], key: F) {
    items.sort_by_key(|item| std::cmp::Reverse(key(item)));
}

fn conflict(message: &str) -> AppError {
    AppError::Conflict(anyhow::anyhow!(message.to_string()))
}

impl InMemoryStore {
    fn lock(&self) -> std::sync::MutexGuard<'_, Tables> {
        self.tables.lock().unwrap()
    }

    pub fn payment(&self, id: Uuid) -> Payment {
        self.lock()
            .payments
            .iter()
            .find(|p| p.id == id)
            .cloned()
            .unwrap()
    }

    pub fn reservation(&self, id: Uuid) -> Reservation {
        self.lock()
            .reservations
            .iter()
            .find(|r| r.id == id)
            .cloned()
            .unwrap()
    }

    pub fn notifications(&self) -> Vec<Notification> {
        self.lock().notifications.clone()
    }

    pub fn processed_event_count(&self) -> usize {
        self.lock().processed_events.len()
    }
}

#[async_trait]
impl UserRepository for InMemoryStore {
    async fn create_user(&self, input: &CreateUser) -> Result<User, AppError> {
        let mut tables = self.lock();
        if tables.users.iter().any(|u| u.email == input.email) {
            return Err(conflict("A user with this email already exists"));
        }
        let now = Utc::now();
        let user = User {
            id: Uuid::new_v4(),
            email: input.email.clone(),
            name: input.name.clone(),
            password_hash: input.password_hash.clone(),
            role: input.role,
            is_active: true,
            created_at: now,
            updated_at: now,
        };
        tables.users.push(user.clone());
        Ok(user)
    }

    async fn get_user(&self, user_id: Uuid) -> Result<Option<User>, AppError> {
        Ok(self.lock().users.iter().find(|u| u.id == user_id).cloned())
    }

    async fn get_user_by_email(&self, email: &str) -> Result<Option<User>, AppError> {
        Ok(self.lock().users.iter().find(|u| u.email == email).cloned())
    }

    async fn list_users(&self, filter: &ListUsersFilter) -> Result<Page<User>, AppError> {
        let mut users: Vec<User> = self
            .lock()
            .users
            .iter()
            .filter(|u| filter.role.map_or(true, |r| u.role == r))
            .filter(|u| !filter.active_only || u.is_active)
            .cloned()
            .collect();
        newest_first(&mut users, |u| u.created_at);
        Ok(paginate(users, filter.page))
    }

    async fn update_user(
        &self,
        user_id: Uuid,
        input: &UpdateUser,
    ) -> Result<Option<User>, AppError> {
        let mut tables = self.lock();
        let Some(user) = tables.users.iter_mut().find(|u| u.id == user_id) else {
            return Ok(None);
        };
        if let Some(ref name) = input.name {
            user.name = name.clone();
        }
        if let Some(role) = input.role {
            user.role = role;
        }
        if let Some(active) = input.is_active {
            user.is_active = active;
        }
        user.updated_at = Utc::now();
        Ok(Some(user.clone()))
    }
}

#[async_trait]
impl VenueRepository for InMemoryStore {
    async fn create_venue(&self, owner_id: Uuid, input: &CreateVenue) -> Result<Venue, AppError> {
        let now = Utc::now();
        let venue = Venue {
            id: Uuid::new_v4(),
            owner_id,
            name: input.name.clone(),
            address: input.address.clone(),
            city: input.city.clone(),
            description: input.description.clone(),
            is_active: true,
            created_at: now,
            updated_at: now,
        };
        self.lock().venues.push(venue.clone());
        Ok(venue)
    }

    async fn get_venue(&self, venue_id: Uuid) -> Result<Option<Venue>, AppError> {
        Ok(self.lock().venues.iter().find(|v| v.id == venue_id).cloned())
    }

    async fn list_venues(&self, filter: &ListVenuesFilter) -> Result<Page<Venue>, AppError> {
        let mut venues: Vec<Venue> = self
            .lock()
            .venues
            .iter()
            .filter(|v| filter.owner_id.map_or(true, |o| v.owner_id == o))
            .filter(|v| {
                filter
                    .city
                    .as_ref()
                    .map_or(true, |c| v.city.eq_ignore_ascii_case(c))
            })
            .filter(|v| !filter.active_only || v.is_active)
            .cloned()
            .collect();
        venues.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(paginate(venues, filter.page))
    }

    async fn update_venue(
        &self,
        venue_id: Uuid,
        input: &UpdateVenue,
    ) -> Result<Option<Venue>, AppError> {
        let mut tables = self.lock();
        let Some(venue) = tables.venues.iter_mut().find(|v| v.id == venue_id) else {
            return Ok(None);
        };
        if let Some(ref name) = input.name {
            venue.name = name.clone();
        }
        if let Some(ref address) = input.address {
            venue.address = address.clone();
        }
        if let Some(ref city) = input.city {
            venue.city = city.clone();
        }
        if let Some(ref description) = input.description {
            venue.description = Some(description.clone());
        }
        if let Some(active) = input.is_active {
            venue.is_active = active;
        }
        venue.updated_at = Utc::now();
        Ok(Some(venue.clone()))
    }

    async fn deactivate_venue(&self, venue_id: Uuid) -> Result<bool, AppError> {
        let mut tables = self.lock();
        let Some(venue) = tables
            .venues
            .iter_mut()
            .find(|v| v.id == venue_id && v.is_active)
        else {
            return Ok(false);
        };
        venue.is_active = false;
        for service in tables.services.iter_mut().filter(|s| s.venue_id == venue_id) {
            service.is_active = false;
        }
        Ok(true)
    }
}

#[async_trait]
impl ServiceRepository for InMemoryStore {
    async fn create_service(&self, input: &CreateService) -> Result<Service, AppError> {
        let now = Utc::now();
        let service = Service {
            id: Uuid::new_v4(),
            venue_id: input.venue_id,
            name: input.name.clone(),
            description: input.description.clone(),
            price: input.price,
            capacity: input.capacity,
            is_active: true,
            created_at: now,
            updated_at: now,
        };
        self.lock().services.push(service.clone());
        Ok(service)
    }

    async fn get_service(&self, service_id: Uuid) -> Result<Option<Service>, AppError> {
        Ok(self
            .lock()
            .services
            .iter()
            .find(|s| s.id == service_id)
            .cloned())
    }

    async fn list_services(&self, filter: &ListServicesFilter) -> Result<Page<Service>, AppError> {
        let tables = self.lock();
        let venue_active = |venue_id: Uuid| {
            tables
                .venues
                .iter()
                .any(|v| v.id == venue_id && v.is_active)
        };
        let mut services: Vec<Service> = tables
            .services
            .iter()
            .filter(|s| filter.venue_id.map_or(true, |v| s.venue_id == v))
            .filter(|s| {
                filter
                    .venue_owner_id
                    .map_or(true, |o| tables.venue_owner(s.venue_id) == Some(o))
            })
            .filter(|s| !filter.active_only || (s.is_active && venue_active(s.venue_id)))
            .cloned()
            .collect();
        services.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(paginate(services, filter.page))
    }

    async fn update_service(
        &self,
        service_id: Uuid,
        input: &UpdateService,
    ) -> Result<Option<Service>, AppError> {
        let mut tables = self.lock();
        let Some(service) = tables.services.iter_mut().find(|s| s.id == service_id) else {
            return Ok(None);
        };
        if let Some(ref name) = input.name {
            service.name = name.clone();
        }
        if let Some(ref description) = input.description {
            service.description = Some(description.clone());
        }
        if let Some(price) = input.price {
            service.price = price;
        }
        if let Some(capacity) = input.capacity {
            service.capacity = capacity;
        }
        if let Some(active) = input.is_active {
            service.is_active = active;
        }
        service.updated_at = Utc::now();
        Ok(Some(service.clone()))
    }

    async fn deactivate_service(&self, service_id: Uuid) -> Result<bool, AppError> {
        let mut tables = self.lock();
        match tables
            .services
            .iter_mut()
            .find(|s| s.id == service_id && s.is_active)
        {
            Some(service) => {
                service.is_active = false;
                Ok(true)
            }
            None => Ok(false),
        }
    }
}

#[async_trait]
impl ReservationRepository for InMemoryStore {
    async fn create_reservation(
        &self,
        input: &CreateReservation,
    ) -> Result<Reservation, AppError> {
        let now = Utc::now();
        let reservation = Reservation {
            id: Uuid::new_v4(),
            user_id: input.user_id,
            venue_id: input.venue_id,
            service_id: input.service_id,
            check_in: input.check_in,
            check_out: input.check_out,
            guests: input.guests,
            status: ReservationStatus::Pending,
            total_amount: input.total_amount,
            notes: input.notes.clone(),
            created_at: now,
            updated_at: now,
        };
        self.lock().reservations.push(reservation.clone());
        Ok(reservation)
    }

    async fn get_reservation(
        &self,
        reservation_id: Uuid,
    ) -> Result<Option<Reservation>, AppError> {
        Ok(self
            .lock()
            .reservations
            .iter()
            .find(|r| r.id == reservation_id)
            .cloned())
    }

    async fn list_reservations(
        &self,
        filter: &ListReservationsFilter,
    ) -> Result<Page<Reservation>, AppError> {
        let tables = self.lock();
        let mut reservations: Vec<Reservation> = tables
            .reservations
            .iter()
            .filter(|r| filter.user_id.map_or(true, |u| r.user_id == u))
            .filter(|r| {
                filter
                    .venue_owner_id
                    .map_or(true, |o| tables.venue_owner(r.venue_id) == Some(o))
            })
            .filter(|r| filter.status.map_or(true, |s| r.status == s))
            .cloned()
            .collect();
        newest_first(&mut reservations, |r| r.created_at);
        Ok(paginate(reservations, filter.page))
    }

    async fn update_reservation_status(
        &self,
        reservation_id: Uuid,
        from: ReservationStatus,
        to: ReservationStatus,
    ) -> Result<Option<Reservation>, AppError> {
        let mut tables = self.lock();
        match tables
            .reservations
            .iter_mut()
            .find(|r| r.id == reservation_id && r.status == from)
        {
            Some(reservation) => {
                reservation.status = to;
                reservation.updated_at = Utc::now();
                Ok(Some(reservation.clone()))
            }
            None => Ok(None),
        }
    }
}

#[async_trait]
impl PaymentRepository for InMemoryStore {
    async fn create_payment(&self, input: &CreatePayment) -> Result<Payment, AppError> {
        let mut tables = self.lock();
        if input.gateway_reference.is_some()
            && tables
                .payments
                .iter()
                .any(|p| p.gateway_reference == input.gateway_reference)
        {
            return Err(conflict("A payment already exists for this gateway reference"));
        }
        let now = Utc::now();
        let payment = Payment {
            id: Uuid::new_v4(),
            user_id: input.user_id,
            reservation_id: input.reservation_id,
            amount: input.amount,
            currency: input.currency.clone(),
            status: PaymentStatus::Pending,
            gateway_reference: input.gateway_reference.clone(),
            metadata: input.metadata.clone(),
            created_at: now,
            updated_at: now,
        };
        tables.payments.push(payment.clone());
        Ok(payment)
    }

    async fn get_payment(&self, payment_id: Uuid) -> Result<Option<Payment>, AppError> {
        Ok(self
            .lock()
            .payments
            .iter()
            .find(|p| p.id == payment_id)
            .cloned())
    }

    async fn get_payment_by_gateway_reference(
        &self,
        reference: &str,
    ) -> Result<Option<Payment>, AppError> {
        Ok(self
            .lock()
            .payments
            .iter()
            .find(|p| p.gateway_reference.as_deref() == Some(reference))
            .cloned())
    }

    async fn list_payments(&self, filter: &ListPaymentsFilter) -> Result<Page<Payment>, AppError> {
        let tables = self.lock();
        let mut payments: Vec<Payment> = tables
            .payments
            .iter()
            .filter(|p| filter.user_id.map_or(true, |u| p.user_id == u))
            .filter(|p| {
                filter
                    .venue_owner_id
                    .map_or(true, |o| tables.payment_venue_owner(p) == Some(o))
            })
            .filter(|p| filter.status.map_or(true, |s| p.status == s))
            .filter(|p| {
                filter
                    .reservation_id
                    .map_or(true, |r| p.reservation_id == Some(r))
            })
            .cloned()
            .collect();
        newest_first(&mut payments, |p| p.created_at);
        Ok(paginate(payments, filter.page))
    }

    async fn apply_payment_transition(
        &self,
        transition: &PaymentTransition,
    ) -> Result<TransitionOutcome, AppError> {
        let mut tables = self.lock();

        if let Some(ref event) = transition.event {
            if tables.processed_events.contains(&event.event_id) {
                return Ok(TransitionOutcome::AlreadyProcessed);
            }
        }

        let Some(index) = tables
            .payments
            .iter()
            .position(|p| p.id == transition.payment_id)
        else {
            return Err(AppError::NotFound(anyhow::anyhow!("Payment not found")));
        };

        let current = tables.payments[index].status;
        if current != transition.from {
            return Ok(TransitionOutcome::StatusChanged(current));
        }

        if let Some(ref event) = transition.event {
            tables.processed_events.insert(event.event_id.clone());
        }

        let payment = &mut tables.payments[index];
        payment.status = transition.to;
        if let Value::Object(ref mut map) = payment.metadata {
            for (key, value) in &transition.metadata {
                map.insert(key.clone(), value.clone());
            }
        }
        payment.updated_at = Utc::now();
        let payment = payment.clone();

        if let (Some(target), Some(reservation_id)) =
            (transition.reservation_status, payment.reservation_id)
        {
            if let Some(reservation) = tables
                .reservations
                .iter_mut()
                .find(|r| r.id == reservation_id && r.status.accepts_payment_effect(target))
            {
                reservation.status = target;
                reservation.updated_at = Utc::now();
            }
        }

        Ok(TransitionOutcome::Applied(payment))
    }
}

#[async_trait]
impl ReceiptRepository for InMemoryStore {
    async fn create_receipt(&self, input: &CreateReceipt) -> Result<Receipt, AppError> {
        let mut tables = self.lock();
        if tables.receipts.iter().any(|r| r.payment_id == input.payment_id) {
            return Err(conflict("Receipt already exists for this payment"));
        }
        let now = Utc::now();
        let receipt = Receipt {
            id: Uuid::new_v4(),
            receipt_number: input.receipt_number.clone(),
            payment_id: input.payment_id,
            user_id: input.user_id,
            subtotal: input.breakdown.subtotal,
            tax_amount: input.breakdown.tax_amount,
            tax_rate: input.breakdown.tax_rate,
            total: input.breakdown.total,
            currency: input.currency.clone(),
            status: booking_service::models::ReceiptStatus::Pending,
            notes: input.notes.clone(),
            issued_at: now,
            created_at: now,
            updated_at: now,
        };
        tables.receipts.push(receipt.clone());
        Ok(receipt)
    }

    async fn get_receipt(&self, receipt_id: Uuid) -> Result<Option<Receipt>, AppError> {
        Ok(self
            .lock()
            .receipts
            .iter()
            .find(|r| r.id == receipt_id)
            .cloned())
    }

    async fn get_receipt_by_payment(&self, payment_id: Uuid) -> Result<Option<Receipt>, AppError> {
        Ok(self
            .lock()
            .receipts
            .iter()
            .find(|r| r.payment_id == payment_id)
            .cloned())
    }

    async fn list_receipts(&self, filter: &ListReceiptsFilter) -> Result<Page<Receipt>, AppError> {
        let tables = self.lock();
        let mut receipts: Vec<Receipt> = tables
            .receipts
            .iter()
            .filter(|r| filter.user_id.map_or(true, |u| r.user_id == u))
            .filter(|r| {
                filter.venue_owner_id.map_or(true, |o| {
                    tables
                        .payments
                        .iter()
                        .find(|p| p.id == r.payment_id)
                        .and_then(|p| tables.payment_venue_owner(p))
                        == Some(o)
                })
            })
            .filter(|r| filter.status.map_or(true, |s| r.status == s))
            .cloned()
            .collect();
        newest_first(&mut receipts, |r| r.issued_at);
        Ok(paginate(receipts, filter.page))
    }

    async fn update_receipt(
        &self,
        receipt_id: Uuid,
        input: &UpdateReceipt,
    ) -> Result<Option<Receipt>, AppError> {
        let mut tables = self.lock();
        let Some(receipt) = tables.receipts.iter_mut().find(|r| r.id == receipt_id) else {
            return Ok(None);
        };
        if let Some(status) = input.status {
            receipt.status = status;
        }
        if let Some(ref notes) = input.notes {
            receipt.notes = Some(notes.clone());
        }
        if let Some(breakdown) = input.breakdown {
            receipt.subtotal = breakdown.subtotal;
            receipt.tax_amount = breakdown.tax_amount;
            receipt.tax_rate = breakdown.tax_rate;
            receipt.total = breakdown.total;
            receipt.issued_at = Utc::now();
        }
        receipt.updated_at = Utc::now();
        Ok(Some(receipt.clone()))
    }
}

#[async_trait]
impl NotificationRepository for InMemoryStore {
    async fn create_notification(
        &self,
        input: &CreateNotification,
    ) -> Result<Notification, AppError> {
        let notification = Notification {
            id: Uuid::new_v4(),
            audience: input.audience,
            user_id: input.user_id,
            venue_id: input.venue_id,
            kind: input.kind,
            title: input.title.clone(),
            message: input.message.clone(),
            is_read: false,
            email_sent: input.email_sent,
            created_at: Utc::now(),
        };
        self.lock().notifications.push(notification.clone());
        Ok(notification)
    }

    async fn list_notifications(
        &self,
        filter: &ListNotificationsFilter,
    ) -> Result<Page<Notification>, AppError> {
        let tables = self.lock();
        let mut notifications: Vec<Notification> = tables
            .notifications
            .iter()
            .filter(|n| tables.notification_matches(n, filter))
            .filter(|n| !filter.unread_only || !n.is_read)
            .filter(|n| filter.kind.map_or(true, |k| n.kind == k))
            .cloned()
            .collect();
        newest_first(&mut notifications, |n| n.created_at);
        Ok(paginate(notifications, filter.page))
    }

    async fn mark_notifications_read(
        &self,
        filter: &ListNotificationsFilter,
    ) -> Result<u64, AppError> {
        let mut tables = self.lock();
        let ids: Vec<Uuid> = tables
            .notifications
            .iter()
            .filter(|n| !n.is_read && tables.notification_matches(n, filter))
            .filter(|n| filter.ids.as_ref().map_or(true, |ids| ids.contains(&n.id)))
            .map(|n| n.id)
            .collect();
        for n in tables.notifications.iter_mut() {
            if ids.contains(&n.id) {
                n.is_read = true;
            }
        }
        Ok(ids.len() as u64)
    }

    async fn notification_stats(
        &self,
        filter: &ListNotificationsFilter,
    ) -> Result<NotificationStats, AppError> {
        let tables = self.lock();
        let week_ago = Utc::now() - Duration::days(7);
        let mut stats = NotificationStats::default();
        for n in tables
            .notifications
            .iter()
            .filter(|n| tables.notification_matches(n, filter))
        {
            stats.total += 1;
            if !n.is_read {
                stats.unread += 1;
            }
            if n.email_sent {
                stats.email_sent += 1;
            }
            if n.created_at >= week_ago {
                stats.last_7_days += 1;
            }
            *stats.by_kind.entry(n.kind.as_str().to_string()).or_default() += 1;
        }
        stats.read = stats.total - stats.unread;
        Ok(stats)
    }
}

pub fn test_config(stripe_base_url: &str) -> BookingConfig {
    BookingConfig {
        common: CoreConfig {
            port: 0,
            environment: "test".to_string(),
        },
        service_name: "booking-service-test".to_string(),
        log_level: "debug".to_string(),
        otlp_endpoint: None,
        public_base_url: "http://localhost:3000".to_string(),
        allowed_origins: Vec::new(),
        database: DatabaseConfig {
            url: Secret::new("postgres://unused".to_string()),
            max_connections: 1,
            min_connections: 0,
        },
        stripe: StripeConfig {
            secret_key: Secret::new("sk_test_123".to_string()),
            webhook_secret: Secret::new(WEBHOOK_SECRET.to_string()),
            api_base_url: stripe_base_url.to_string(),
            webhook_tolerance_seconds: 300,
            currency: "usd".to_string(),
        },
        jwt: JwtConfig {
            secret: Secret::new("test-jwt-secret".to_string()),
            expiry_minutes: 60,
        },
        smtp: SmtpConfig {
            host: "localhost".to_string(),
            port: 2525,
            user: String::new(),
            password: Secret::new(String::new()),
            from_email: "noreply@example.com".to_string(),
            from_name: "Bookings".to_string(),
            enabled: false,
        },
    }
}

pub struct TestApp {
    pub address: String,
    pub store: Arc<InMemoryStore>,
    pub email: Arc<MockEmailProvider>,
    pub stripe: MockServer,
    pub state: AppState,
    pub client: reqwest::Client,
}

pub struct Seeded {
    pub guest: User,
    pub guest_token: String,
    pub admin: User,
    pub admin_token: String,
    pub venue: Venue,
    pub service: Service,
}

impl TestApp {
    pub async fn spawn() -> Self {
        Self::spawn_with_email(true).await
    }

    /// `email_enabled = false` makes every email send fail.
    pub async fn spawn_with_email(email_enabled: bool) -> Self {
        let stripe = MockServer::start().await;
        let store = Arc::new(InMemoryStore::default());
        let email = Arc::new(MockEmailProvider::new(email_enabled));

        let state = AppState::new(
            test_config(&format!("{}/v1", stripe.uri())),
            store.clone() as Arc<dyn BookingStore>,
            None,
            email.clone() as Arc<dyn EmailProvider>,
        );

        let app = Application::with_state(state.clone(), 0)
            .await
            .expect("Failed to build test application");
        let address = format!("http://127.0.0.1:{}", app.http_port());

        tokio::spawn(async move {
            app.run_until_stopped().await.ok();
        });

        let client = reqwest::Client::new();
        for _ in 0..50 {
            if client.get(format!("{}/health", address)).send().await.is_ok() {
                break;
            }
            tokio::time::sleep(tokio::time::Duration::from_millis(20)).await;
        }

        TestApp {
            address,
            store,
            email,
            stripe,
            state,
            client,
        }
    }

    pub async fn create_user(&self, email: &str, role: Role) -> (User, String) {
        let user = self
            .store
            .create_user(&CreateUser {
                email: email.to_string(),
                name: email.split('@').next().unwrap_or("user").to_string(),
                password_hash: "unused".to_string(),
                role,
            })
            .await
            .unwrap();
        let token = self.state.jwt.generate_access_token(&user).unwrap();
        (user, token)
    }

    /// A guest, a venue admin, one venue and one service at 100.00 per night.
    pub async fn seed(&self) -> Seeded {
        let (guest, guest_token) = self.create_user("guest@example.com", Role::User).await;
        let (admin, admin_token) = self.create_user("owner@example.com", Role::Admin).await;

        let venue = self
            .store
            .create_venue(
                admin.id,
                &CreateVenue {
                    owner_id: None,
                    name: "Lakeside Lodge".to_string(),
                    address: "1 Shore Road".to_string(),
                    city: "Nairobi".to_string(),
                    description: None,
                },
            )
            .await
            .unwrap();

        let service = self
            .store
            .create_service(&CreateService {
                venue_id: venue.id,
                name: "Double Room".to_string(),
                description: None,
                price: Decimal::new(10000, 2),
                capacity: 2,
            })
            .await
            .unwrap();

        Seeded {
            guest,
            guest_token,
            admin,
            admin_token,
            venue,
            service,
        }
    }

    pub async fn reservation(&self, seeded: &Seeded, user_id: Uuid) -> Reservation {
        let check_in = NaiveDate::from_ymd_opt(2025, 6, 1).unwrap();
        self.store
            .create_reservation(&CreateReservation {
                user_id,
                venue_id: seeded.venue.id,
                service_id: seeded.service.id,
                check_in,
                check_out: check_in + Duration::days(5),
                guests: 2,
                total_amount: Decimal::new(50000, 2),
                notes: None,
            })
            .await
            .unwrap()
    }

    /// A PENDING payment for a fresh reservation, with `intent_id` as its
    /// gateway reference.
    pub async fn pending_payment(&self, seeded: &Seeded, intent_id: &str) -> Payment {
        let reservation = self.reservation(seeded, seeded.guest.id).await;
        self.store
            .create_payment(&CreatePayment {
                user_id: seeded.guest.id,
                reservation_id: Some(reservation.id),
                amount: reservation.total_amount,
                currency: "usd".to_string(),
                gateway_reference: Some(intent_id.to_string()),
                metadata: json!({}),
            })
            .await
            .unwrap()
    }

    /// Force a payment into `status`, as the gateway flow would have.
    pub async fn set_payment_status(&self, payment: &Payment, status: PaymentStatus) -> Payment {
        let outcome = self
            .store
            .apply_payment_transition(&PaymentTransition::new(payment, status))
            .await
            .unwrap();
        match outcome {
            TransitionOutcome::Applied(payment) => payment,
            other => panic!("unexpected outcome {:?}", other),
        }
    }

    pub async fn post_webhook(&self, event: &Value) -> reqwest::Response {
        let body = serde_json::to_vec(event).unwrap();
        let header = sign_payload(WEBHOOK_SECRET, Utc::now().timestamp(), &body).unwrap();
        self.client
            .post(format!("{}/api/payments/webhook", self.address))
            .header(SIGNATURE_HEADER, header)
            .header("content-type", "application/json")
            .body(body)
            .send()
            .await
            .expect("Failed to execute request")
    }

    pub async fn get(&self, path: &str, token: &str) -> reqwest::Response {
        self.client
            .get(format!("{}{}", self.address, path))
            .bearer_auth(token)
            .send()
            .await
            .expect("Failed to execute request")
    }

    pub async fn post(&self, path: &str, token: &str, body: &Value) -> reqwest::Response {
        self.client
            .post(format!("{}{}", self.address, path))
            .bearer_auth(token)
            .json(body)
            .send()
            .await
            .expect("Failed to execute request")
    }

    pub async fn patch(&self, path: &str, token: &str, body: &Value) -> reqwest::Response {
        self.client
            .patch(format!("{}{}", self.address, path))
            .bearer_auth(token)
            .json(body)
            .send()
            .await
            .expect("Failed to execute request")
    }
}

pub fn intent_event(event_id: &str, event_type: &str, intent_id: &str) -> Value {
    json!({
        "id": event_id,
        "type": event_type,
        "data": {
            "object": {
                "id": intent_id,
                "object": "payment_intent",
                "amount": 50000,
                "status": "succeeded",
                "last_payment_error": { "message": "Your card was declined.", "code": "card_declined" }
            }
        }
    })
}

pub fn refund_event(event_id: &str, intent_id: &str, amount: i64, refunded: i64) -> Value {
    json!({
        "id": event_id,
        "type": "charge.refunded",
        "data": {
            "object": {
                "id": format!("ch_{}", intent_id),
                "object": "charge",
                "payment_intent": intent_id,
                "amount": amount,
                "amount_refunded": refunded
            }
        }
    })
}
