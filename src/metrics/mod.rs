use crate::error::{ProxyError, Result};
use axum::{
    extract::State,
    http::{header, StatusCode},
    response::IntoResponse,
};
use metrics::{counter, describe_counter, describe_histogram, histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info};

/// Metrics service for collecting and exposing Prometheus metrics
#[derive(Clone)]
pub struct MetricsService {
    handle: Arc<PrometheusHandle>,
}

impl MetricsService {
    /// Install the global Prometheus recorder
    pub fn new() -> Result<Self> {
        let handle = PrometheusBuilder::new().install_recorder().map_err(|e| {
            ProxyError::Internal(format!("Failed to install metrics recorder: {}", e))
        })?;

        Self::register_metrics();

        info!("Metrics service initialized successfully");

        Ok(Self {
            handle: Arc::new(handle),
        })
    }

    fn register_metrics() {
        describe_counter!(
            "auth_proxy_requests_total",
            "Total number of requests handled by the auth proxy"
        );
        describe_histogram!(
            "auth_proxy_request_duration_seconds",
            "End-to-end proxy latencies in seconds, up to upstream response headers"
        );
        describe_counter!(
            "auth_proxy_upstream_failures_total",
            "Upstream calls that failed at the transport level"
        );
        describe_counter!(
            "auth_proxy_guard_redirects_total",
            "Requests redirected to the login page for lack of a session"
        );

        debug!("All metrics registered with descriptions");
    }

    /// Render metrics in Prometheus format
    pub fn render(&self) -> String {
        self.handle.render()
    }
}

/// Metrics endpoint handler
pub async fn metrics_handler(State(service): State<MetricsService>) -> impl IntoResponse {
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        service.render(),
    )
}

/// Record a proxied request
pub fn record_request(method: &str, path: &str, status: u16, duration: f64) {
    let labels = [
        ("method", method.to_string()),
        ("path", sanitize_path(path)),
        ("status", status.to_string()),
    ];

    counter!("auth_proxy_requests_total", &labels).increment(1);
    histogram!("auth_proxy_request_duration_seconds", &labels).record(duration);
}

/// Record a transport-level upstream failure (`timeout`, `connect`, `request`)
pub fn record_upstream_failure(kind: &'static str) {
    counter!("auth_proxy_upstream_failures_total", "kind" => kind).increment(1);
}

/// Record a session guard redirect
pub fn record_guard_redirect(pattern: &str) {
    counter!("auth_proxy_guard_redirects_total", "pattern" => pattern.to_string()).increment(1);
}

/// Sanitize path for metrics to avoid cardinality explosion
fn sanitize_path(path: &str) -> String {
    path.split('/')
        .map(|seg| if is_likely_id(seg) { ":id" } else { seg })
        .collect::<Vec<_>>()
        .join("/")
}

/// Check if a path segment is likely an ID or token (numeric, UUID, opaque string)
fn is_likely_id(segment: &str) -> bool {
    if segment.is_empty() {
        return false;
    }

    if segment.chars().all(|c| c.is_ascii_digit()) {
        return true;
    }

    if segment.len() >= 32 && segment.contains('-') {
        return segment.chars().all(|c| c.is_ascii_hexdigit() || c == '-');
    }

    // Verification tokens and the like: long, mixed letters and digits
    segment.len() > 10
        && segment.chars().all(|c| c.is_ascii_alphanumeric())
        && segment.chars().any(|c| c.is_ascii_digit())
        && segment.chars().any(|c| c.is_ascii_alphabetic())
}

/// Timer for measuring request duration
pub struct Timer {
    start: Instant,
    method: String,
    path: String,
}

impl Timer {
    pub fn new(method: String, path: String) -> Self {
        Self {
            start: Instant::now(),
            method,
            path,
        }
    }

    /// Record the elapsed time with the given status code
    pub fn record(self, status: u16) {
        record_request(&self.method, &self.path, status, self.elapsed());
    }

    /// Elapsed time in seconds
    pub fn elapsed(&self) -> f64 {
        self.start.elapsed().as_secs_f64()
    }
}
