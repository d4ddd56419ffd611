//! Stripe payment gateway client.
//!
//! Covers the PaymentIntents and Refunds APIs used at checkout and for
//! admin refunds, and verification/parsing of webhook callbacks.

use crate::config::StripeConfig;
use chrono::Utc;
use hmac::{Hmac, Mac};
use reqwest::Client;
use secrecy::ExposeSecret;
use serde::Deserialize;
use serde_json::Value;
use service_core::error::AppError;
use sha2::Sha256;
use subtle::ConstantTimeEq;
use thiserror::Error;

type HmacSha256 = Hmac<Sha256>;

/// Header carrying the webhook signature.
pub const SIGNATURE_HEADER: &str = "stripe-signature";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum SignatureError {
    #[error("Webhook signature is required")]
    Missing,
    #[error("Invalid webhook signature")]
    Invalid,
}

#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("Payment gateway credentials not configured")]
    NotConfigured,
    #[error("{message}")]
    Api {
        status: u16,
        code: Option<String>,
        message: String,
    },
    #[error("Payment gateway request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("Unexpected payment gateway response: {0}")]
    Decode(#[from] serde_json::Error),
}

impl From<GatewayError> for AppError {
    fn from(err: GatewayError) -> Self {
        match err {
            GatewayError::Api { message, .. } => AppError::BadRequest(anyhow::anyhow!(message)),
            GatewayError::NotConfigured => AppError::ServiceUnavailable,
            other => AppError::BadGateway(other.to_string()),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct PaymentIntent {
    pub id: String,
    /// Amount in the smallest currency unit.
    pub amount: i64,
    pub currency: String,
    pub status: String,
    pub client_secret: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Refund {
    pub id: String,
    pub amount: i64,
    pub status: Option<String>,
    pub payment_intent: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    error: ApiErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ApiErrorDetail {
    code: Option<String>,
    message: Option<String>,
}

/// A verified webhook callback.
#[derive(Debug, Clone, Deserialize)]
pub struct GatewayEvent {
    pub id: String,
    #[serde(rename = "type")]
    pub event_type: String,
    pub data: EventData,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EventData {
    pub object: Value,
}

/// Event types the reconciliation flow acts on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    PaymentSucceeded,
    PaymentFailed,
    PaymentCanceled,
    ChargeRefunded,
    Unhandled,
}

impl EventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::PaymentSucceeded => "payment_succeeded",
            EventKind::PaymentFailed => "payment_failed",
            EventKind::PaymentCanceled => "payment_canceled",
            EventKind::ChargeRefunded => "charge_refunded",
            EventKind::Unhandled => "unhandled",
        }
    }
}

/// `data.object` of a `payment_intent.*` event.
#[derive(Debug, Clone, Deserialize)]
pub struct PaymentIntentObject {
    pub id: String,
    #[serde(default)]
    pub amount: Option<i64>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub last_payment_error: Option<LastPaymentError>,
    #[serde(default)]
    pub cancellation_reason: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LastPaymentError {
    pub message: Option<String>,
    pub code: Option<String>,
}

/// `data.object` of a `charge.refunded` event.
#[derive(Debug, Clone, Deserialize)]
pub struct ChargeObject {
    pub id: String,
    pub payment_intent: Option<String>,
    pub amount: i64,
    pub amount_refunded: i64,
}

impl GatewayEvent {
    pub fn kind(&self) -> EventKind {
        match self.event_type.as_str() {
            "payment_intent.succeeded" | "payment_succeeded" => EventKind::PaymentSucceeded,
            "payment_intent.payment_failed" | "payment_failed" => EventKind::PaymentFailed,
            "payment_intent.canceled" | "payment_canceled" => EventKind::PaymentCanceled,
            "charge.refunded" | "charge_refunded" => EventKind::ChargeRefunded,
            _ => EventKind::Unhandled,
        }
    }

    pub fn payment_intent(&self) -> Result<PaymentIntentObject, serde_json::Error> {
        PaymentIntentObject::deserialize(&self.data.object)
    }

    pub fn charge(&self) -> Result<ChargeObject, serde_json::Error> {
        ChargeObject::deserialize(&self.data.object)
    }
}

/// Stripe client for interacting with the Stripe API.
#[derive(Clone)]
pub struct StripeClient {
    client: Client,
    config: StripeConfig,
}

impl StripeClient {
    pub fn new(config: StripeConfig) -> Self {
        Self {
            client: Client::new(),
            config,
        }
    }

    pub fn is_configured(&self) -> bool {
        !self.config.secret_key.expose_secret().is_empty()
    }

    pub fn currency(&self) -> &str {
        &self.config.currency
    }

    /// Create a payment intent for `amount` minor units.
    pub async fn create_payment_intent(
        &self,
        amount: i64,
        currency: &str,
        metadata: &[(&str, String)],
    ) -> Result<PaymentIntent, GatewayError> {
        let mut form = vec![
            ("amount".to_string(), amount.to_string()),
            ("currency".to_string(), currency.to_lowercase()),
            (
                "automatic_payment_methods[enabled]".to_string(),
                "true".to_string(),
            ),
        ];
        form.extend(
            metadata
                .iter()
                .map(|(key, value)| (format!("metadata[{key}]"), value.clone())),
        );

        let intent: PaymentIntent = self.post("payment_intents", &form).await?;

        tracing::info!(
            payment_intent = %intent.id,
            amount = intent.amount,
            currency = %intent.currency,
            "Stripe payment intent created"
        );

        Ok(intent)
    }

    pub async fn cancel_payment_intent(&self, intent_id: &str) -> Result<PaymentIntent, GatewayError> {
        let intent: PaymentIntent = self
            .post(&format!("payment_intents/{intent_id}/cancel"), &[])
            .await?;

        tracing::info!(payment_intent = %intent.id, "Stripe payment intent cancelled");

        Ok(intent)
    }

    /// Refund a payment intent; `amount` of `None` refunds the full charge.
    pub async fn create_refund(
        &self,
        intent_id: &str,
        amount: Option<i64>,
    ) -> Result<Refund, GatewayError> {
        let mut form = vec![("payment_intent".to_string(), intent_id.to_string())];
        if let Some(amount) = amount {
            form.push(("amount".to_string(), amount.to_string()));
        }

        let refund: Refund = self.post("refunds", &form).await?;

        tracing::info!(
            refund_id = %refund.id,
            payment_intent = %intent_id,
            amount = refund.amount,
            "Stripe refund created"
        );

        Ok(refund)
    }

    async fn post<T: serde::de::DeserializeOwned>(
        &self,
        path: &str,
        form: &[(String, String)],
    ) -> Result<T, GatewayError> {
        if !self.is_configured() {
            return Err(GatewayError::NotConfigured);
        }

        let url = format!("{}/{}", self.config.api_base_url.trim_end_matches('/'), path);

        let response = self
            .client
            .post(&url)
            .bearer_auth(self.config.secret_key.expose_secret())
            .form(form)
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;

        tracing::debug!(status = %status, path = %path, "Stripe API response");

        if status.is_success() {
            return Ok(serde_json::from_str(&body)?);
        }

        let (code, message) = match serde_json::from_str::<ApiErrorBody>(&body) {
            Ok(parsed) => (
                parsed.error.code,
                parsed
                    .error
                    .message
                    .unwrap_or_else(|| format!("Stripe request failed with status {status}")),
            ),
            Err(_) => (None, format!("Stripe request failed with status {status}")),
        };

        tracing::error!(status = %status, code = ?code, message = %message, "Stripe API error");

        Err(GatewayError::Api {
            status: status.as_u16(),
            code,
            message,
        })
    }

    /// Verify the signature header against the raw body at the current time.
    pub fn verify_webhook_signature(
        &self,
        payload: &[u8],
        header: Option<&str>,
    ) -> Result<(), SignatureError> {
        self.verify_webhook_signature_at(payload, header, Utc::now().timestamp())
    }

    /// Header format: `t=<unix>,v1=<hex>[,v1=<hex>...]`; the signed content
    /// is `"{t}.{payload}"`.
    pub fn verify_webhook_signature_at(
        &self,
        payload: &[u8],
        header: Option<&str>,
        now: i64,
    ) -> Result<(), SignatureError> {
        let header = header
            .map(str::trim)
            .filter(|h| !h.is_empty())
            .ok_or(SignatureError::Missing)?;

        let mut timestamp = None;
        let mut candidates = Vec::new();
        for part in header.split(',') {
            match part.trim().split_once('=') {
                Some(("t", value)) => timestamp = value.parse::<i64>().ok(),
                Some(("v1", value)) => candidates.push(value),
                _ => {}
            }
        }

        let timestamp = timestamp.ok_or(SignatureError::Invalid)?;
        if candidates.is_empty() {
            return Err(SignatureError::Invalid);
        }

        if (now - timestamp).abs() > self.config.webhook_tolerance_seconds {
            tracing::warn!(timestamp = timestamp, now = now, "Webhook timestamp outside tolerance");
            return Err(SignatureError::Invalid);
        }

        let expected = signature_bytes(
            self.config.webhook_secret.expose_secret(),
            timestamp,
            payload,
        )?;

        let matched = candidates.iter().any(|candidate| {
            hex::decode(candidate)
                .map(|bytes| bool::from(bytes.as_slice().ct_eq(expected.as_slice())))
                .unwrap_or(false)
        });

        if matched {
            Ok(())
        } else {
            tracing::warn!("Webhook signature verification failed");
            Err(SignatureError::Invalid)
        }
    }

    /// Parse a verified webhook body.
    pub fn parse_event(payload: &[u8]) -> Result<GatewayEvent, serde_json::Error> {
        serde_json::from_slice(payload)
    }
}

fn signature_bytes(secret: &str, timestamp: i64, payload: &[u8]) -> Result<Vec<u8>, SignatureError> {
    let mut mac =
        HmacSha256::new_from_slice(secret.as_bytes()).map_err(|_| SignatureError::Invalid)?;
    mac.update(timestamp.to_string().as_bytes());
    mac.update(b".");
    mac.update(payload);
    Ok(mac.finalize().into_bytes().to_vec())
}

/// Build a `stripe-signature` header value for `payload`.
pub fn sign_payload(secret: &str, timestamp: i64, payload: &[u8]) -> Result<String, SignatureError> {
    let signature = signature_bytes(secret, timestamp, payload)?;
    Ok(format!("t={},v1={}", timestamp, hex::encode(signature)))
}
