//! Prometheus metrics for accounting-service.

use once_cell::sync::Lazy;
use prometheus::{
    register_counter_vec, register_histogram_vec, register_int_counter, CounterVec, HistogramVec,
    IntCounter, TextEncoder,
};

/// Database query duration histogram.
pub static DB_QUERY_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    register_histogram_vec!(
        "accounting_db_query_duration_seconds",
        "Database query duration in seconds",
        &["operation"],
        vec![0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0]
    )
    .expect("Failed to register db_query_duration")
});

/// Work-order state changes by target stage and operation.
pub static TRANSITIONS_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "accounting_transitions_total",
        "Total number of work-order billing state changes",
        &["stage", "operation"] // advance, link, correction
    )
    .expect("Failed to register transitions_total")
});

/// Billing document counter by kind.
pub static DOCUMENTS_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "accounting_documents_total",
        "Total number of billing documents by kind",
        &["kind"]
    )
    .expect("Failed to register documents_total")
});

/// Payment counter by method.
pub static PAYMENTS_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "accounting_payments_total",
        "Total number of payments by method",
        &["method"]
    )
    .expect("Failed to register payments_total")
});

/// Documents left waiting for reconciliation.
pub static PARTIAL_FAILURES_TOTAL: Lazy<IntCounter> = Lazy::new(|| {
    register_int_counter!(
        "accounting_partial_failures_total",
        "Billing documents created with work orders left unlinked"
    )
    .expect("Failed to register partial_failures_total")
});

/// Error counter for alerting.
pub static ERRORS_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "accounting_errors_total",
        "Total number of errors by type",
        &["error_type"]
    )
    .expect("Failed to register errors_total")
});

/// Billed amount counter by document kind.
pub static DOCUMENT_AMOUNT_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "accounting_document_amount_total",
        "Total billed amount by document kind",
        &["kind"]
    )
    .expect("Failed to register document_amount_total")
});

/// Collected amount counter by payment method.
pub static PAYMENT_AMOUNT_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "accounting_payment_amount_total",
        "Total collected amount by payment method",
        &["method"]
    )
    .expect("Failed to register payment_amount_total")
});

/// Initialize all metrics (forces lazy initialization).
pub fn init_metrics() {
    Lazy::force(&DB_QUERY_DURATION);
    Lazy::force(&TRANSITIONS_TOTAL);
    Lazy::force(&DOCUMENTS_TOTAL);
    Lazy::force(&PAYMENTS_TOTAL);
    Lazy::force(&PARTIAL_FAILURES_TOTAL);
    Lazy::force(&ERRORS_TOTAL);
    Lazy::force(&DOCUMENT_AMOUNT_TOTAL);
    Lazy::force(&PAYMENT_AMOUNT_TOTAL);
}

/// Count an error returned by a core operation.
pub fn record_error(err: &service_core::error::AppError) {
    ERRORS_TOTAL.with_label_values(&[err.error_type()]).inc();
}

/// Get metrics in Prometheus text format.
pub fn get_metrics() -> String {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    encoder
        .encode_to_string(&metric_families)
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use service_core::error::AppError;

    #[test]
    fn recorded_errors_show_up_in_the_exposition() {
        init_metrics();
        record_error(&AppError::Conflict(anyhow::anyhow!("already linked")));

        let text = get_metrics();
        assert!(text.contains("accounting_errors_total{error_type=\"conflict\"}"));
        assert!(text.contains("accounting_partial_failures_total"));
    }
}
