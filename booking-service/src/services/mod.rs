pub mod database;
pub mod email;
pub mod jwt;
pub mod metrics;
pub mod notifier;
pub mod receipt_document;
pub mod reconciliation;
pub mod repository;
pub mod stripe;

pub use database::Database;
pub use email::{EmailProvider, MockEmailProvider, SmtpProvider};
pub use jwt::JwtService;
pub use metrics::{get_metrics, init_metrics};
pub use notifier::{DeliveryPolicy, Notifier};
pub use receipt_document::ReceiptDocument;
pub use reconciliation::{PaymentReconciler, ReconcileOutcome, WebhookAck};
pub use repository::BookingStore;
pub use stripe::StripeClient;
