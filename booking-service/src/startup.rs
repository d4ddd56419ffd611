//! Application startup and lifecycle management.

use crate::config::BookingConfig;
use crate::handlers;
use crate::middleware::auth_middleware;
use crate::services::{
    BookingStore, Database, EmailProvider, JwtService, Notifier, PaymentReconciler, SmtpProvider,
    StripeClient,
};
use axum::{
    http::{header, HeaderValue, Method},
    middleware::{from_fn, from_fn_with_state},
    routing::{get, patch, post},
    Router,
};
use secrecy::ExposeSecret;
use service_core::error::AppError;
use service_core::middleware::{
    metrics::metrics_middleware,
    security_headers::security_headers_middleware,
    tracing::{make_request_span, request_id_middleware},
};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<BookingConfig>,
    pub store: Arc<dyn BookingStore>,
    /// Present when backed by PostgreSQL; used by the readiness probe.
    pub db: Option<Database>,
    pub stripe: StripeClient,
    pub jwt: JwtService,
    pub notifier: Notifier,
    pub reconciler: PaymentReconciler,
}

impl AppState {
    pub fn new(
        config: BookingConfig,
        store: Arc<dyn BookingStore>,
        db: Option<Database>,
        email: Arc<dyn EmailProvider>,
    ) -> Self {
        let stripe = StripeClient::new(config.stripe.clone());
        if stripe.is_configured() {
            tracing::info!("Stripe client initialized");
        } else {
            tracing::warn!("Stripe secret key not configured - checkout and refunds are disabled");
        }

        let jwt = JwtService::new(&config.jwt);
        let notifier = Notifier::new(store.clone(), email, config.public_base_url.clone());
        let reconciler = PaymentReconciler::new(store.clone(), stripe.clone(), notifier.clone());

        Self {
            config: Arc::new(config),
            store,
            db,
            stripe,
            jwt,
            notifier,
            reconciler,
        }
    }
}

/// Build the full HTTP router for `state`.
pub fn router(state: AppState) -> Router {
    let public_routes = Router::new()
        .route("/health", get(handlers::health_check))
        .route("/ready", get(handlers::readiness_check))
        .route("/metrics", get(handlers::metrics_endpoint))
        .route("/api/auth/register", post(handlers::auth::register))
        .route("/api/auth/login", post(handlers::auth::login))
        .route("/api/payments/webhook", post(handlers::webhook::stripe_webhook));

    let protected_routes = Router::new()
        .route(
            "/api/venues",
            get(handlers::venues::list_venues).post(handlers::venues::create_venue),
        )
        .route(
            "/api/venues/:id",
            get(handlers::venues::get_venue)
                .patch(handlers::venues::update_venue)
                .delete(handlers::venues::delete_venue),
        )
        .route(
            "/api/services",
            get(handlers::services::list_services).post(handlers::services::create_service),
        )
        .route(
            "/api/services/:id",
            get(handlers::services::get_service)
                .patch(handlers::services::update_service)
                .delete(handlers::services::delete_service),
        )
        .route(
            "/api/reservations",
            get(handlers::reservations::list_reservations)
                .post(handlers::reservations::create_reservation),
        )
        .route(
            "/api/reservations/:id",
            get(handlers::reservations::get_reservation)
                .patch(handlers::reservations::update_reservation),
        )
        .route(
            "/api/payments",
            get(handlers::payments::list_payments).post(handlers::payments::checkout),
        )
        .route(
            "/api/payments/:id",
            get(handlers::payments::get_payment).patch(handlers::payments::update_payment),
        )
        .route(
            "/api/receipts",
            get(handlers::receipts::list_receipts).post(handlers::receipts::create_receipt),
        )
        .route(
            "/api/receipts/:id",
            get(handlers::receipts::get_receipt).patch(handlers::receipts::update_receipt),
        )
        .route(
            "/api/receipts/:id/download",
            get(handlers::receipts::download_receipt).post(handlers::receipts::regenerate_receipt),
        )
        .route(
            "/api/notifications",
            get(handlers::notifications::list_notifications)
                .post(handlers::notifications::create_notification)
                .patch(handlers::notifications::mark_read),
        )
        .route(
            "/api/admin/notifications",
            get(handlers::admin::list_admin_notifications)
                .patch(handlers::admin::mark_admin_notifications_read),
        )
        .route(
            "/api/admin/notifications/stats",
            get(handlers::admin::notification_stats),
        )
        .route("/api/admin/users", get(handlers::admin::list_users))
        .route("/api/admin/users/:id", patch(handlers::admin::update_user))
        .layer(from_fn_with_state(state.clone(), auth_middleware));

    let cors = cors_layer(&state.config.allowed_origins);

    Router::new()
        .merge(public_routes)
        .merge(protected_routes)
        .with_state(state)
        .layer(from_fn(metrics_middleware))
        .layer(TraceLayer::new_for_http().make_span_with(make_request_span))
        .layer(from_fn(request_id_middleware))
        .layer(from_fn(security_headers_middleware))
        .layer(cors)
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    let layer = CorsLayer::new()
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PATCH,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE]);

    if origins.is_empty() {
        return layer.allow_origin(Any);
    }

    let origins: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| match origin.parse::<HeaderValue>() {
            Ok(value) => Some(value),
            Err(e) => {
                tracing::error!(origin = %origin, error = %e, "Ignoring invalid CORS origin");
                None
            }
        })
        .collect();

    layer.allow_origin(origins)
}

/// Application container for managing server lifecycle.
pub struct Application {
    http_port: u16,
    http_listener: TcpListener,
    state: AppState,
}

impl Application {
    /// Connect to PostgreSQL, run migrations and bind the HTTP listener.
    pub async fn build(config: BookingConfig) -> Result<Self, AppError> {
        let db = Database::new(
            config.database.url.expose_secret(),
            config.database.max_connections,
            config.database.min_connections,
        )
        .await?;
        db.run_migrations().await?;

        let email: Arc<dyn EmailProvider> =
            Arc::new(SmtpProvider::new(config.smtp.clone()).map_err(|e| {
                tracing::error!("Failed to initialize SMTP provider: {}", e);
                AppError::ConfigError(anyhow::anyhow!("SMTP provider error: {}", e))
            })?);
        if !email.is_enabled() {
            tracing::warn!("SMTP disabled - notification emails will not be sent");
        }

        let port = config.common.port;
        let store: Arc<dyn BookingStore> = Arc::new(db.clone());
        let state = AppState::new(config, store, Some(db), email);

        Self::with_state(state, port).await
    }

    /// Bind the HTTP listener for a prepared state (port 0 = random port for testing).
    pub async fn with_state(state: AppState, port: u16) -> Result<Self, AppError> {
        let http_addr = SocketAddr::from(([0, 0, 0, 0], port));
        let http_listener = TcpListener::bind(http_addr).await.map_err(|e| {
            tracing::error!("Failed to bind HTTP listener to {}: {}", http_addr, e);
            AppError::from(e)
        })?;
        let http_port = http_listener.local_addr()?.port();

        tracing::info!("Booking service: HTTP on port {}", http_port);

        Ok(Self {
            http_port,
            http_listener,
            state,
        })
    }

    /// Get the HTTP port the server is listening on.
    pub fn http_port(&self) -> u16 {
        self.http_port
    }

    pub fn state(&self) -> AppState {
        self.state.clone()
    }

    /// Run the application until stopped.
    pub async fn run_until_stopped(self) -> std::io::Result<()> {
        let app = router(self.state);

        axum::serve(self.http_listener, app).await.map_err(|e| {
            tracing::error!("HTTP server error: {}", e);
            std::io::Error::other(format!("HTTP server error: {}", e))
        })
    }
}
