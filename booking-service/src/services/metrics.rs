//! Prometheus metrics for booking-service.
//!
//! HTTP metrics go through the `metrics` recorder installed by
//! [`init_metrics`]; domain counters live in the default `prometheus`
//! registry and are appended by [`get_metrics`].

use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use once_cell::sync::Lazy;
use prometheus::{
    register_counter_vec, register_histogram_vec, CounterVec, Encoder, HistogramVec, TextEncoder,
};
use std::sync::OnceLock;

pub static METRICS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Gateway callbacks by event type and outcome.
pub static WEBHOOK_EVENTS_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "booking_webhook_events_total",
        "Total gateway webhook events by type and outcome",
        &["event_type", "outcome"]
    )
    .expect("Failed to register webhook_events_total")
});

/// Applied payment status transitions.
pub static PAYMENT_TRANSITIONS_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "booking_payment_transitions_total",
        "Total payment status transitions",
        &["from", "to"]
    )
    .expect("Failed to register payment_transitions_total")
});

/// Email deliveries by template kind and outcome.
pub static EMAILS_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "booking_emails_total",
        "Total notification emails by kind and outcome",
        &["kind", "outcome"] // sent, failed, skipped
    )
    .expect("Failed to register emails_total")
});

/// Database query duration histogram.
pub static DB_QUERY_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    register_histogram_vec!(
        "booking_db_query_duration_seconds",
        "Database query duration in seconds",
        &["operation"],
        vec![0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0]
    )
    .expect("Failed to register db_query_duration")
});

/// Install the HTTP metrics recorder. Safe to call more than once.
pub fn init_metrics() {
    if METRICS_HANDLE.get().is_some() {
        return;
    }

    match PrometheusBuilder::new().install_recorder() {
        Ok(handle) => {
            let _ = METRICS_HANDLE.set(handle);
        }
        Err(e) => {
            tracing::warn!(error = %e, "Prometheus recorder already installed");
        }
    }
}

pub fn get_metrics() -> String {
    let mut output = METRICS_HANDLE
        .get()
        .map(|handle| handle.render())
        .unwrap_or_default();

    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    encoder.encode(&metric_families, &mut buffer).ok();
    if let Ok(custom_metrics) = String::from_utf8(buffer) {
        output.push_str(&custom_metrics);
    }

    output
}

pub fn record_webhook_event(event_type: &str, outcome: &str) {
    WEBHOOK_EVENTS_TOTAL
        .with_label_values(&[event_type, outcome])
        .inc();
}

pub fn record_transition(from: &str, to: &str) {
    PAYMENT_TRANSITIONS_TOTAL.with_label_values(&[from, to]).inc();
}

pub fn record_email(kind: &str, outcome: &str) {
    EMAILS_TOTAL.with_label_values(&[kind, outcome]).inc();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn domain_counters_render_without_recorder() {
        record_webhook_event("charge.refunded", "applied");
        let output = get_metrics();
        assert!(output.contains("booking_webhook_events_total"));
    }
}
