//! Metrics collection and exposition.
//!
//! # Metrics
//! - `topology_route_specs_published_total` (counter): route specs enqueued
//! - `topology_load_failures_total` (counter): failed read + flatten attempts
//! - `topology_reconnects_total` (counter): watch cycles ended by a fault
//! - `topology_watcher_state` (gauge): 0=disconnected, 1=connecting,
//!   2=watching, 3=stopped
//! - `topology_routes` (gauge): entries in the last published route spec

use std::net::SocketAddr;

use metrics_exporter_prometheus::PrometheusBuilder;

use crate::watcher::state::WatcherState;

/// Start the Prometheus scrape endpoint.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics endpoint listening"),
        Err(e) => tracing::error!(address = %addr, error = %e, "Failed to start metrics endpoint"),
    }
}

pub fn record_route_spec_published(routes: usize) {
    metrics::counter!("topology_route_specs_published_total").increment(1);
    metrics::gauge!("topology_routes").set(routes as f64);
}

pub fn record_load_failure() {
    metrics::counter!("topology_load_failures_total").increment(1);
}

pub fn record_reconnect() {
    metrics::counter!("topology_reconnects_total").increment(1);
}

pub fn record_state(state: WatcherState) {
    metrics::gauge!("topology_watcher_state").set(f64::from(state as u8));
}
