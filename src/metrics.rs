//! Prometheus metrics registry and instruments.
//!
//! Instruments are usable before `init_metrics` is called; registration only
//! makes them visible through [`REGISTRY`].

use std::time::Duration;

use lazy_static::lazy_static;
use prometheus::{HistogramOpts, IntCounterVec, IntGaugeVec, Opts, Registry};

lazy_static! {
    /// Global Prometheus registry
    pub static ref REGISTRY: Registry = Registry::new();

    // Federation Metrics
    pub static ref FEDERATION_REQUESTS_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("fedifetch_federation_requests_total", "Total number of federation requests"),
        &["direction", "status"]
    ).expect("metric can be created");
    pub static ref FEDERATION_REQUEST_DURATION_SECONDS: prometheus::HistogramVec = prometheus::HistogramVec::new(
        HistogramOpts::new(
            "fedifetch_federation_request_duration_seconds",
            "Federation request duration in seconds"
        ).buckets(vec![0.01, 0.05, 0.1, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0]),
        &["direction"]
    ).expect("metric can be created");

    // Signature Metrics
    pub static ref SIGNATURES_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("fedifetch_signatures_total", "Total number of HTTP signature operations"),
        &["operation", "outcome"]
    ).expect("metric can be created");
    pub static ref SIGNATURE_REJECTIONS_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("fedifetch_signature_rejections_total", "Rejected signatures by reason"),
        &["reason"]
    ).expect("metric can be created");

    // Cache Metrics
    pub static ref CACHE_HITS_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("fedifetch_cache_hits_total", "Total number of cache hits"),
        &["cache_name"]
    ).expect("metric can be created");
    pub static ref CACHE_MISSES_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("fedifetch_cache_misses_total", "Total number of cache misses"),
        &["cache_name"]
    ).expect("metric can be created");
    pub static ref CACHE_SIZE: IntGaugeVec = IntGaugeVec::new(
        Opts::new("fedifetch_cache_size", "Current number of items in cache"),
        &["cache_name"]
    ).expect("metric can be created");

    // Triple Store Metrics
    pub static ref TRIPLE_OPERATIONS_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("fedifetch_triple_operations_total", "Total number of triple store operations"),
        &["operation", "backend"]
    ).expect("metric can be created");
    pub static ref DB_QUERY_DURATION_SECONDS: prometheus::HistogramVec = prometheus::HistogramVec::new(
        HistogramOpts::new(
            "fedifetch_db_query_duration_seconds",
            "Database query duration in seconds"
        ).buckets(vec![0.0001, 0.0005, 0.001, 0.005, 0.01, 0.05, 0.1, 0.5, 1.0]),
        &["operation"]
    ).expect("metric can be created");

    // Error Metrics
    pub static ref ERRORS_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("fedifetch_errors_total", "Total number of errors"),
        &["error_type"]
    ).expect("metric can be created");
}

/// Record one outbound fetch and its latency.
pub fn observe_fetch(status: &str, elapsed: Duration) {
    FEDERATION_REQUESTS_TOTAL
        .with_label_values(&["outbound", status])
        .inc();
    FEDERATION_REQUEST_DURATION_SECONDS
        .with_label_values(&["outbound"])
        .observe(elapsed.as_secs_f64());
}

/// Record a database query latency.
pub fn observe_db_query(operation: &str, elapsed: Duration) {
    DB_QUERY_DURATION_SECONDS
        .with_label_values(&[operation])
        .observe(elapsed.as_secs_f64());
}

/// Initialize metrics registry.
pub fn init_metrics() {
    REGISTRY
        .register(Box::new(FEDERATION_REQUESTS_TOTAL.clone()))
        .expect("FEDERATION_REQUESTS_TOTAL can be registered");
    REGISTRY
        .register(Box::new(FEDERATION_REQUEST_DURATION_SECONDS.clone()))
        .expect("FEDERATION_REQUEST_DURATION_SECONDS can be registered");
    REGISTRY
        .register(Box::new(SIGNATURES_TOTAL.clone()))
        .expect("SIGNATURES_TOTAL can be registered");
    REGISTRY
        .register(Box::new(SIGNATURE_REJECTIONS_TOTAL.clone()))
        .expect("SIGNATURE_REJECTIONS_TOTAL can be registered");
    REGISTRY
        .register(Box::new(CACHE_HITS_TOTAL.clone()))
        .expect("CACHE_HITS_TOTAL can be registered");
    REGISTRY
        .register(Box::new(CACHE_MISSES_TOTAL.clone()))
        .expect("CACHE_MISSES_TOTAL can be registered");
    REGISTRY
        .register(Box::new(CACHE_SIZE.clone()))
        .expect("CACHE_SIZE can be registered");
    REGISTRY
        .register(Box::new(TRIPLE_OPERATIONS_TOTAL.clone()))
        .expect("TRIPLE_OPERATIONS_TOTAL can be registered");
    REGISTRY
        .register(Box::new(DB_QUERY_DURATION_SECONDS.clone()))
        .expect("DB_QUERY_DURATION_SECONDS can be registered");
    REGISTRY
        .register(Box::new(ERRORS_TOTAL.clone()))
        .expect("ERRORS_TOTAL can be registered");

    tracing::info!("Metrics registry initialized");
}
