//! Metrics collection and exposition.
//!
//! # Metrics
//! - `gateway_requests_total` (counter): requests by protocol, status
//! - `gateway_request_duration_seconds` (histogram): latency by protocol
//! - `gateway_altsvc_advertised_total` (counter): responses carrying Alt-Svc
//! - `gateway_altsvc_frames_total` (counter): ALTSVC frame attempts by outcome
//! - `gateway_connections_rejected_total` (counter): connections refused before dispatch
//! - `gateway_endpoints` (gauge): endpoints per lifecycle state
//!
//! Without an installed recorder every call is a no-op.

use std::net::SocketAddr;
use std::time::Instant;

use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;

use crate::altsvc::FrameOutcome;
use crate::protocol::ProtocolVersion;

/// Install the Prometheus recorder and its HTTP scrape listener.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Prometheus exporter listening"),
        Err(e) => tracing::error!(address = %addr, error = %e, "Failed to install Prometheus exporter"),
    }
}

pub fn record_request(protocol: ProtocolVersion, status: u16, start: Instant) {
    let protocol = protocol.as_str();
    counter!("gateway_requests_total", "protocol" => protocol, "status" => status.to_string())
        .increment(1);
    histogram!("gateway_request_duration_seconds", "protocol" => protocol)
        .record(start.elapsed().as_secs_f64());
}

pub fn record_advertisement(protocol: ProtocolVersion) {
    counter!("gateway_altsvc_advertised_total", "protocol" => protocol.as_str()).increment(1);
}

pub fn record_altsvc_frame(outcome: FrameOutcome) {
    counter!("gateway_altsvc_frames_total", "outcome" => outcome.as_str()).increment(1);
}

pub fn record_rejected(reason: &'static str) {
    counter!("gateway_connections_rejected_total", "reason" => reason).increment(1);
}

pub fn record_endpoints(binding: usize, bound: usize, draining: usize) {
    gauge!("gateway_endpoints", "state" => "binding").set(binding as f64);
    gauge!("gateway_endpoints", "state" => "bound").set(bound as f64);
    gauge!("gateway_endpoints", "state" => "draining").set(draining as f64);
}
