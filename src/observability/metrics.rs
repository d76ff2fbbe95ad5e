use axum::{extract::MatchedPath, extract::Request, middleware::Next, response::Response};
use once_cell::sync::Lazy;
use prometheus::{
    register_histogram_vec, register_int_counter_vec, HistogramVec, IntCounterVec, TextEncoder,
};
use std::time::Instant;

// Metrics registry
static HTTP_REQUESTS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "http_requests_total",
        "Total number of HTTP requests",
        &["method", "path", "status"]
    )
    .expect("http_requests_total registers once")
});

static HTTP_REQUEST_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    register_histogram_vec!(
        "http_request_duration_seconds",
        "HTTP request latency in seconds",
        &["method", "path"],
        vec![0.001, 0.005, 0.010, 0.050, 0.100, 0.500, 1.0, 5.0, 30.0]
    )
    .expect("http_request_duration_seconds registers once")
});

static TENANT_RESOLUTIONS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "tenant_resolutions_total",
        "Tenant resolution attempts by outcome",
        &["outcome"]
    )
    .expect("tenant_resolutions_total registers once")
});

static WORKSPACE_PROVISIONS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "workspace_provisions_total",
        "Workspace provisioning attempts by outcome",
        &["outcome"]
    )
    .expect("workspace_provisions_total registers once")
});

static QUERY_EXECUTIONS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "query_executions_total",
        "Query engine runs by outcome",
        &["outcome"]
    )
    .expect("query_executions_total registers once")
});

static QUERY_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    register_histogram_vec!(
        "query_duration_seconds",
        "Query engine wall-clock time in seconds",
        &["outcome"],
        vec![0.1, 0.5, 1.0, 5.0, 15.0, 30.0, 60.0, 120.0, 300.0]
    )
    .expect("query_duration_seconds registers once")
});

static BILLING_EVENTS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "billing_events_total",
        "Billing webhook deliveries by outcome",
        &["outcome"]
    )
    .expect("billing_events_total registers once")
});

pub struct MetricsRecorder;

impl MetricsRecorder {
    pub fn record_http_request(method: &str, path: &str, status: u16) {
        HTTP_REQUESTS_TOTAL
            .with_label_values(&[method, path, &status.to_string()])
            .inc();
    }

    pub fn record_http_duration(method: &str, path: &str, duration: f64) {
        HTTP_REQUEST_DURATION
            .with_label_values(&[method, path])
            .observe(duration);
    }

    /// `outcome`: resolved, unknown, malformed
    pub fn record_tenant_resolution(outcome: &str) {
        TENANT_RESOLUTIONS_TOTAL.with_label_values(&[outcome]).inc();
    }

    pub fn record_workspace_provision(outcome: &str) {
        WORKSPACE_PROVISIONS_TOTAL.with_label_values(&[outcome]).inc();
    }

    pub fn record_query_execution(outcome: &str, duration: f64) {
        QUERY_EXECUTIONS_TOTAL.with_label_values(&[outcome]).inc();
        QUERY_DURATION.with_label_values(&[outcome]).observe(duration);
    }

    pub fn record_billing_event(outcome: &str) {
        BILLING_EVENTS_TOTAL.with_label_values(&[outcome]).inc();
    }

    /// Export all metrics in Prometheus format
    pub fn export() -> Result<String, prometheus::Error> {
        let encoder = TextEncoder::new();
        let metric_families = prometheus::gather();
        encoder.encode_to_string(&metric_families)
    }
}

/// Request counter and latency histogram, labelled by route template
pub async fn track_http_metrics(request: Request, next: Next) -> Response {
    let method = request.method().to_string();
    let path = request
        .extensions()
        .get::<MatchedPath>()
        .map(|p| p.as_str().to_string())
        .unwrap_or_else(|| "unmatched".to_string());

    let start = Instant::now();
    let response = next.run(request).await;

    MetricsRecorder::record_http_request(&method, &path, response.status().as_u16());
    MetricsRecorder::record_http_duration(&method, &path, start.elapsed().as_secs_f64());

    response
}
