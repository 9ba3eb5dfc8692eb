//! Metrics catalog for the telemetry forwarder.
//!
//! Thin wrappers over the `metrics` macros using standard Prometheus naming
//! conventions. The recorder is installed once at startup and rendered by
//! the HTTP server at `GET /metrics`.

use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use once_cell::sync::OnceCell;
use tracing::{info, warn};

/// Enum representing all metric names used in the system
/// This eliminates magic strings and provides compile-time safety
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MetricName {
    // Ingress metrics
    IngestRequests,
    IngestRejectedEmpty,

    // Normalize metrics
    NormalizeRecords,

    // Auth metrics
    AuthTokenSuccess,
    AuthTokenError,
    AuthCacheHits,

    // Delivery metrics
    DeliverySuccess,
    DeliveryError,
    DeliveryDuration,
}

impl MetricName {
    /// Get the metric name as a string
    pub fn as_str(&self) -> &'static str {
        match self {
            // Ingress metrics
            MetricName::IngestRequests => "fwd_ingest_requests_total",
            MetricName::IngestRejectedEmpty => "fwd_ingest_rejected_empty_total",

            // Normalize metrics
            MetricName::NormalizeRecords => "fwd_normalize_records_total",

            // Auth metrics
            MetricName::AuthTokenSuccess => "fwd_auth_token_success_total",
            MetricName::AuthTokenError => "fwd_auth_token_error_total",
            MetricName::AuthCacheHits => "fwd_auth_cache_hits_total",

            // Delivery metrics
            MetricName::DeliverySuccess => "fwd_delivery_success_total",
            MetricName::DeliveryError => "fwd_delivery_error_total",
            MetricName::DeliveryDuration => "fwd_delivery_duration_seconds",
        }
    }
}

static METRICS_HANDLE: OnceCell<PrometheusHandle> = OnceCell::new();

/// Initialize the metrics system. Safe to call more than once; only the
/// first call installs the recorder. A failed install is logged and the
/// process keeps running without metrics.
pub fn init() {
    if METRICS_HANDLE.get().is_some() {
        return;
    }

    match PrometheusBuilder::new().install_recorder() {
        Ok(handle) => {
            METRICS_HANDLE.set(handle).ok();
            info!("Metrics system initialized");
        }
        Err(e) => warn!("Failed to install Prometheus recorder: {}", e),
    }
}

/// Render the current metrics in Prometheus text exposition format.
pub fn render() -> String {
    METRICS_HANDLE
        .get()
        .map(|handle| handle.render())
        .unwrap_or_default()
}

// ============================================================================
// Ingress Metrics
// ============================================================================

pub mod ingest {
    use super::MetricName;

    /// Record a received ingest request
    pub fn request_received() {
        ::metrics::counter!(MetricName::IngestRequests.as_str()).increment(1);
    }

    /// Record an empty-body rejection
    pub fn rejected_empty() {
        ::metrics::counter!(MetricName::IngestRejectedEmpty.as_str()).increment(1);
    }
}

// ============================================================================
// Normalize Metrics
// ============================================================================

pub mod normalize {
    use super::MetricName;

    /// Record a normalized record, labeled by the transform that produced it
    pub fn record_normalized(transform: &'static str) {
        ::metrics::counter!(MetricName::NormalizeRecords.as_str(), "transform" => transform)
            .increment(1);
    }
}

// ============================================================================
// Auth Metrics
// ============================================================================

pub mod auth {
    use super::MetricName;

    /// Record a successful token resolution
    pub fn token_success() {
        ::metrics::counter!(MetricName::AuthTokenSuccess.as_str()).increment(1);
    }

    /// Record a failed token resolution
    pub fn token_error() {
        ::metrics::counter!(MetricName::AuthTokenError.as_str()).increment(1);
    }

    /// Record a token served from the cache
    pub fn cache_hit() {
        ::metrics::counter!(MetricName::AuthCacheHits.as_str()).increment(1);
    }
}

// ============================================================================
// Delivery Metrics
// ============================================================================

pub mod delivery {
    use super::MetricName;

    /// Record a delivered record, labeled by the upstream status
    pub fn success(status: u16) {
        ::metrics::counter!(MetricName::DeliverySuccess.as_str(), "status" => status.to_string())
            .increment(1);
    }

    /// Record a failed delivery attempt, labeled by the upstream status
    pub fn error(status: u16) {
        ::metrics::counter!(MetricName::DeliveryError.as_str(), "status" => status.to_string())
            .increment(1);
    }

    /// Record end-to-end delivery duration
    pub fn duration(secs: f64) {
        ::metrics::histogram!(MetricName::DeliveryDuration.as_str()).record(secs);
    }
}
