//! Prometheus Metrics Module
//!
//! Counters for captured DNS traffic and gauges for the mapping cache.

use lazy_static::lazy_static;
use prometheus::{
    register_histogram, register_int_counter, register_int_counter_vec, register_int_gauge,
    Encoder, Histogram, IntCounter, IntCounterVec, IntGauge, TextEncoder,
};

lazy_static! {
    /// Captured packets that could not be decoded, were UDP pings, or were
    /// responses without questions
    pub static ref INVALID_PACKETS_IN: IntCounter = register_int_counter!(
        "domainwatch_invalid_packets_in_total",
        "Count of the number of invalid DNS packets seen"
    ).unwrap();

    pub static ref NON_QUERY_PACKETS_IN: IntCounter = register_int_counter!(
        "domainwatch_non_query_packets_in_total",
        "Count of the number of non-query DNS packets seen"
    ).unwrap();

    pub static ref REQ_PACKETS_IN: IntCounter = register_int_counter!(
        "domainwatch_req_packets_in_total",
        "Count of the number of DNS request packets seen"
    ).unwrap();

    pub static ref RESP_PACKETS_IN: IntCounter = register_int_counter!(
        "domainwatch_resp_packets_in_total",
        "Count of the number of DNS response packets seen"
    ).unwrap();

    /// Records dropped while learning, by reason
    pub static ref RECORDS_IGNORED: IntCounterVec = register_int_counter_vec!(
        "domainwatch_records_ignored_total",
        "DNS records that were not learned from",
        &["reason"]
    ).unwrap();

    pub static ref MAPPINGS: IntGauge = register_int_gauge!(
        "domainwatch_mappings",
        "Current number of name to value mappings"
    ).unwrap();

    pub static ref GC_DELETED: IntCounter = register_int_counter!(
        "domainwatch_gc_deleted_total",
        "Names reclaimed by garbage collection"
    ).unwrap();

    pub static ref DNS_LATENCY: Histogram = register_histogram!(
        "domainwatch_dns_latency_seconds",
        "Time between a DNS request and its response",
        vec![0.0005, 0.001, 0.0025, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5]
    ).unwrap();
}

/// Renders every registered metric in the Prometheus text format.
pub fn gather() -> String {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();

    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        log::warn!("Failed to encode metrics: {}", e);
        return String::new();
    }

    String::from_utf8(buffer).unwrap_or_default()
}
