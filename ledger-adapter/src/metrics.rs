//! Adapter metrics

use prometheus::{
    register_counter_vec, register_histogram_vec, register_int_counter, CounterVec, HistogramVec,
    IntCounter,
};

lazy_static::lazy_static! {
    pub static ref LEDGER_REQUESTS_TOTAL: CounterVec = register_counter_vec!(
        "ledger_requests_total",
        "Total ledger HTTP requests",
        &["operation", "outcome"]
    )
    .unwrap();

    pub static ref LEDGER_REQUEST_DURATION: HistogramVec = register_histogram_vec!(
        "ledger_request_duration_seconds",
        "Ledger HTTP request duration, retries included",
        &["operation"]
    )
    .unwrap();

    pub static ref LEDGER_REQUEST_RETRIES_TOTAL: CounterVec = register_counter_vec!(
        "ledger_request_retries_total",
        "Transport-level retries per operation",
        &["operation"]
    )
    .unwrap();

    pub static ref STREAM_RECONNECTS_TOTAL: IntCounter = register_int_counter!(
        "ledger_stream_reconnects_total",
        "Notification stream (re)connection attempts"
    )
    .unwrap();

    pub static ref NOTIFICATIONS_TOTAL: CounterVec = register_counter_vec!(
        "ledger_notifications_total",
        "Inbound notification frames by declared type",
        &["type"]
    )
    .unwrap();
}
