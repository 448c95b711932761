//! Metrics collection and exposition.
//!
//! # Metrics
//! - `resource_acquires_total` (counter): acquires by resource, outcome
//! - `shutdown_triggers_total` (counter): termination triggers by kind
//! - `forced_exits_total` (counter): non-graceful exits by reason

use metrics::counter;
use metrics_exporter_prometheus::PrometheusBuilder;
use serde_json::json;
use std::net::SocketAddr;

use crate::observability::logging::{err_field, fields, Logger};

/// Install the Prometheus exporter on the given address.
///
/// Must run inside the Tokio runtime; the exporter spawns its own server.
pub fn init_metrics(addr: SocketAddr, logger: &Logger) {
    let builder = PrometheusBuilder::new().with_http_listener(addr);
    match builder.install() {
        Ok(()) => logger.info_with(
            "Metrics exporter listening",
            fields(json!({ "address": addr.to_string() })),
        ),
        Err(e) => logger.error_with("Failed to start metrics exporter", err_field(&e)),
    }
}

/// Record the outcome of a resource acquire.
///
/// `outcome` is one of "hit", "initialized", "conflict", "init-error".
pub fn record_acquire(resource: &'static str, outcome: &'static str) {
    counter!("resource_acquires_total", "resource" => resource, "outcome" => outcome).increment(1);
}

/// Record a termination trigger by kind ("signal" or "fault").
pub fn record_shutdown_trigger(kind: &'static str) {
    counter!("shutdown_triggers_total", "kind" => kind).increment(1);
}

/// Record a forced, non-graceful exit.
///
/// `reason` is one of "deadline", "escalation", "cleanup-error".
pub fn record_forced_exit(reason: &'static str) {
    counter!("forced_exits_total", "reason" => reason).increment(1);
}
