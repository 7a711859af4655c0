//! Prometheus metrics for utility-billing-service.

use once_cell::sync::Lazy;
use prometheus::{
    register_counter_vec, register_histogram_vec, CounterVec, Encoder, HistogramVec, TextEncoder,
};

/// Counter for HTTP requests by method, route and status.
pub static HTTP_REQUESTS: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "utility_billing_http_requests_total",
        "Total number of HTTP requests",
        &["method", "route", "status"]
    )
    .expect("Failed to register HTTP_REQUESTS")
});

/// Histogram for row store call duration by operation.
pub static STORE_CALL_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    register_histogram_vec!(
        "utility_billing_store_call_duration_seconds",
        "Row store call duration in seconds",
        &["operation"],
        vec![0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0]
    )
    .expect("Failed to register STORE_CALL_DURATION")
});

/// Counter for payment operations by outcome.
pub static PAYMENTS_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "utility_billing_payments_total",
        "Total number of payment operations",
        &["operation", "outcome"]
    )
    .expect("Failed to register PAYMENTS_TOTAL")
});

/// Counter for ticket operations.
pub static TICKETS_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "utility_billing_tickets_total",
        "Total number of ticket operations",
        &["action", "outcome"]
    )
    .expect("Failed to register TICKETS_TOTAL")
});

/// Counter for errors by taxonomy kind.
pub static ERRORS: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "utility_billing_errors_total",
        "Total number of errors",
        &["kind"]
    )
    .expect("Failed to register ERRORS")
});

/// Initialize all metrics (forces lazy initialization).
pub fn init_metrics() {
    Lazy::force(&HTTP_REQUESTS);
    Lazy::force(&STORE_CALL_DURATION);
    Lazy::force(&PAYMENTS_TOTAL);
    Lazy::force(&TICKETS_TOTAL);
    Lazy::force(&ERRORS);
}

/// Get all metrics as Prometheus text format.
pub fn get_metrics() -> String {
    let encoder = TextEncoder::new();
    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&prometheus::gather(), &mut buffer) {
        tracing::warn!(error = %e, "Failed to encode metrics");
    }
    String::from_utf8_lossy(&buffer).into_owned()
}

pub fn record_http_request(method: &str, route: &str, status: u16) {
    HTTP_REQUESTS
        .with_label_values(&[method, route, &status.to_string()])
        .inc();
}

pub fn record_store_call(operation: &str, duration_secs: f64) {
    STORE_CALL_DURATION
        .with_label_values(&[operation])
        .observe(duration_secs);
}

pub fn record_payment(operation: &str, outcome: &str) {
    PAYMENTS_TOTAL.with_label_values(&[operation, outcome]).inc();
}

pub fn record_ticket(action: &str, outcome: &str) {
    TICKETS_TOTAL.with_label_values(&[action, outcome]).inc();
}

pub fn record_error(kind: &str) {
    ERRORS.with_label_values(&[kind]).inc();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recorded_metrics_are_exported() {
        init_metrics();
        record_payment("submit", "ok");
        record_error("ConflictError");

        let text = get_metrics();
        assert!(text.contains("utility_billing_payments_total"));
        assert!(text.contains("ConflictError"));
    }
}
