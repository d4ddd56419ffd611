//! Configuration module for booking-service.

use secrecy::Secret;
use service_core::config as core_config;
use service_core::error::AppError;
use std::env;

#[derive(Debug, Clone)]
pub struct BookingConfig {
    pub common: core_config::Config,
    pub service_name: String,
    pub log_level: String,
    pub otlp_endpoint: Option<String>,
    pub public_base_url: String,
    /// CORS origins; empty allows any origin.
    pub allowed_origins: Vec<String>,
    pub database: DatabaseConfig,
    pub stripe: StripeConfig,
    pub jwt: JwtConfig,
    pub smtp: SmtpConfig,
}

#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub url: Secret<String>,
    pub max_connections: u32,
    pub min_connections: u32,
}

#[derive(Debug, Clone)]
pub struct StripeConfig {
    pub secret_key: Secret<String>,
    pub webhook_secret: Secret<String>,
    pub api_base_url: String,
    /// Maximum accepted age of a webhook signature timestamp.
    pub webhook_tolerance_seconds: i64,
    pub currency: String,
}

#[derive(Debug, Clone)]
pub struct JwtConfig {
    pub secret: Secret<String>,
    pub expiry_minutes: i64,
}

#[derive(Debug, Clone)]
pub struct SmtpConfig {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: Secret<String>,
    pub from_email: String,
    pub from_name: String,
    pub enabled: bool,
}

impl BookingConfig {
    pub fn from_env() -> Result<Self, AppError> {
        let common = core_config::Config::load()?;
        let is_prod = env::var("ENVIRONMENT").unwrap_or_else(|_| common.environment.clone())
            == "prod";

        Ok(Self {
            common,
            service_name: env::var("SERVICE_NAME")
                .unwrap_or_else(|_| "booking-service".to_string()),
            log_level: env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
            otlp_endpoint: env::var("OTLP_ENDPOINT").ok().filter(|s| !s.is_empty()),
            public_base_url: get_env("PUBLIC_BASE_URL", Some("http://localhost:3000"), is_prod)?,
            allowed_origins: env::var("CORS_ALLOWED_ORIGINS")
                .map(|v| {
                    v.split(',')
                        .map(|s| s.trim().to_string())
                        .filter(|s| !s.is_empty())
                        .collect()
                })
                .unwrap_or_default(),
            database: DatabaseConfig {
                url: Secret::new(env::var("DATABASE_URL").map_err(|_| {
                    AppError::ConfigError(anyhow::anyhow!("DATABASE_URL is required"))
                })?),
                max_connections: parse_env("DATABASE_MAX_CONNECTIONS", 10),
                min_connections: parse_env("DATABASE_MIN_CONNECTIONS", 2),
            },
            stripe: StripeConfig {
                secret_key: Secret::new(get_env("STRIPE_SECRET_KEY", Some(""), is_prod)?),
                webhook_secret: Secret::new(get_secret_env(
                    "STRIPE_WEBHOOK_SECRET",
                    Some("whsec_dev"),
                    is_prod,
                )?),
                api_base_url: env::var("STRIPE_API_BASE_URL")
                    .unwrap_or_else(|_| "https://api.stripe.com/v1".to_string()),
                webhook_tolerance_seconds: parse_env("STRIPE_WEBHOOK_TOLERANCE_SECONDS", 300),
                currency: env::var("STRIPE_CURRENCY").unwrap_or_else(|_| "usd".to_string()),
            },
            jwt: JwtConfig {
                secret: Secret::new(get_secret_env("JWT_SECRET", Some("dev-jwt-secret"), is_prod)?),
                expiry_minutes: parse_env("JWT_EXPIRY_MINUTES", 60 * 24),
            },
            smtp: SmtpConfig {
                host: get_env("SMTP_HOST", Some("smtp.gmail.com"), is_prod)?,
                port: parse_env("SMTP_PORT", 587),
                user: get_env("SMTP_USER", Some(""), is_prod)?,
                password: Secret::new(get_env("SMTP_PASSWORD", Some(""), is_prod)?),
                from_email: get_env("SMTP_FROM_EMAIL", Some("noreply@example.com"), is_prod)?,
                from_name: env::var("SMTP_FROM_NAME").unwrap_or_else(|_| "Bookings".to_string()),
                enabled: parse_env("SMTP_ENABLED", false),
            },
        })
    }
}

fn parse_env<T: std::str::FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(default)
}

fn get_env(key: &str, default: Option<&str>, is_prod: bool) -> Result<String, AppError> {
    match env::var(key) {
        Ok(val) => Ok(val),
        Err(_) => {
            if is_prod {
                Err(AppError::ConfigError(anyhow::anyhow!(
                    "{} is required in production but not set",
                    key
                )))
            } else if let Some(def) = default {
                Ok(def.to_string())
            } else {
                Err(AppError::ConfigError(anyhow::anyhow!(
                    "{} is required but not set",
                    key
                )))
            }
        }
    }
}

/// Like [`get_env`] but rejects an empty value in production.
fn get_secret_env(key: &str, default: Option<&str>, is_prod: bool) -> Result<String, AppError> {
    let value = get_env(key, default, is_prod)?;
    if is_prod && value.trim().is_empty() {
        return Err(AppError::ConfigError(anyhow::anyhow!(
            "{} must not be empty in production",
            key
        )));
    }
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn get_env_uses_default_outside_production() {
        let value = get_env("BOOKING_TEST_UNSET_KEY", Some("fallback"), false).unwrap();
        assert_eq!(value, "fallback");
    }

    #[test]
    fn get_env_requires_value_in_production() {
        let err = get_env("BOOKING_TEST_UNSET_KEY", Some("fallback"), true).unwrap_err();
        assert!(err.to_string().contains("required in production"));
    }

    #[test]
    fn empty_signing_secret_is_rejected_in_production() {
        env::set_var("BOOKING_TEST_EMPTY_SECRET", "");

        let err = get_secret_env("BOOKING_TEST_EMPTY_SECRET", Some("whsec_dev"), true).unwrap_err();
        assert!(err.to_string().contains("must not be empty in production"));

        let dev = get_secret_env("BOOKING_TEST_EMPTY_SECRET", Some("whsec_dev"), false).unwrap();
        assert_eq!(dev, "");

        env::remove_var("BOOKING_TEST_EMPTY_SECRET");
    }

    #[test]
    fn parse_env_falls_back_on_missing_key() {
        assert_eq!(parse_env("BOOKING_TEST_UNSET_NUMBER", 42_u32), 42);
    }
}
