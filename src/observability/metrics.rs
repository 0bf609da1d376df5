//! Metrics collection and exposition.
//!
//! # Metrics
//! - `wsgate_sessions_total` (counter): bridges started
//! - `wsgate_sessions_active` (gauge): bridges currently running
//! - `wsgate_session_duration_seconds` (histogram): bridge lifetime
//! - `wsgate_upgrade_rejections_total` (counter): rejected upgrades by reason
//! - `wsgate_escalations_total` (counter): termination outcomes by final state

use std::net::SocketAddr;
use std::time::Instant;

use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;

/// Start the Prometheus scrape endpoint.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics endpoint listening"),
        Err(e) => tracing::error!(address = %addr, error = %e, "Failed to install metrics exporter"),
    }
}

pub fn record_session_started() {
    counter!("wsgate_sessions_total").increment(1);
    gauge!("wsgate_sessions_active").increment(1.0);
}

pub fn record_session_finished(started: Instant) {
    gauge!("wsgate_sessions_active").decrement(1.0);
    histogram!("wsgate_session_duration_seconds").record(started.elapsed().as_secs_f64());
}

pub fn record_rejection(reason: &'static str) {
    counter!("wsgate_upgrade_rejections_total", "reason" => reason).increment(1);
}

pub fn record_escalation(final_state: &'static str) {
    counter!("wsgate_escalations_total", "final_state" => final_state).increment(1);
}
