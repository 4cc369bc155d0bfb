//! Prometheus instrumentation for the inference path.
//!
//! - `registry` - family registry with idempotent `get_or_insert`
//! - `instruments` - atomic counters, gauges and histograms
//!
//! [`InferenceMetrics`] binds the four instruments the server exports.

mod instruments;
mod registry;

pub use instruments::{Counter, CounterVec, Desc, Gauge, GaugeVec, Histogram, HistogramVec};
pub use registry::{Family, Registry};

use std::sync::Arc;
use thiserror::Error;
use tracing::warn;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum MetricsError {
    #[error("invalid metric name: {0:?}")]
    InvalidName(String),

    #[error("metric {name} is already registered as a {existing}, not a {requested}")]
    KindMismatch {
        name: String,
        existing: &'static str,
        requested: &'static str,
    },

    #[error("metric {name} has labels {expected:?}, got {found:?}")]
    LabelMismatch {
        name: String,
        expected: Vec<String>,
        found: Vec<String>,
    },
}

pub const REQUESTS_TOTAL: &str = "inference_requests_total";
pub const REQUEST_DURATION: &str = "inference_request_duration_seconds";
pub const ACTIVE_REQUESTS: &str = "inference_active_requests";
pub const MODEL_LOADED: &str = "model_loaded";

/// Latency histogram bucket bounds in seconds.
pub const LATENCY_BUCKETS: [f64; 8] = [0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5];

/// Outcome label on `inference_requests_total`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestStatus {
    Success,
    Error,
}

impl RequestStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            RequestStatus::Success => "success",
            RequestStatus::Error => "error",
        }
    }
}

/// Instruments recorded by the inference handler.
#[derive(Debug, Clone)]
pub struct InferenceMetrics {
    registry: Arc<Registry>,
    requests_total: Arc<CounterVec>,
    request_duration: Arc<HistogramVec>,
    active_requests: Arc<Gauge>,
    model_loaded: Arc<GaugeVec>,
}

impl InferenceMetrics {
    /// Register (or look up) the inference instruments in `registry`.
    ///
    /// Safe to call repeatedly against the same registry.
    pub fn register(registry: Arc<Registry>) -> Result<Self, MetricsError> {
        let requests_total = registry.counter_vec(
            REQUESTS_TOTAL,
            "Total inference requests",
            &["model", "status"],
        )?;
        let request_duration = registry.histogram_vec(
            REQUEST_DURATION,
            "Inference latency in seconds",
            &["model"],
            &LATENCY_BUCKETS,
        )?;
        let active_requests = registry
            .gauge_vec(
                ACTIVE_REQUESTS,
                "Currently active inference requests",
                &[],
            )?
            .with_label_values(&[])?;
        let model_loaded = registry.gauge_vec(
            MODEL_LOADED,
            "Whether model is loaded (1=yes 0=no)",
            &["model"],
        )?;

        Ok(Self {
            registry,
            requests_total,
            request_duration,
            active_requests,
            model_loaded,
        })
    }

    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    pub fn increment_request_count(&self, model: &str, status: RequestStatus) {
        match self
            .requests_total
            .with_label_values(&[model, status.as_str()])
        {
            Ok(counter) => counter.inc(),
            Err(e) => warn!("dropping request count sample: {}", e),
        }
    }

    pub fn request_count(&self, model: &str, status: RequestStatus) -> u64 {
        self.requests_total
            .find(&[model, status.as_str()])
            .map(|c| c.get())
            .unwrap_or(0)
    }

    pub fn observe_latency(&self, model: &str, seconds: f64) {
        match self.request_duration.with_label_values(&[model]) {
            Ok(histogram) => histogram.observe(seconds),
            Err(e) => warn!("dropping latency sample: {}", e),
        }
    }

    pub fn latency_count(&self, model: &str) -> u64 {
        self.request_duration
            .find(&[model])
            .map(|h| h.count())
            .unwrap_or(0)
    }

    /// Count one in-flight request until the returned guard is dropped.
    pub fn track_active(&self) -> ActiveRequestGuard {
        ActiveRequestGuard::new(Arc::clone(&self.active_requests))
    }

    pub fn active_requests(&self) -> i64 {
        self.active_requests.get()
    }

    pub fn set_model_loaded(&self, model: &str, loaded: bool) {
        match self.model_loaded.with_label_values(&[model]) {
            Ok(gauge) => gauge.set(i64::from(loaded)),
            Err(e) => warn!("dropping model_loaded sample: {}", e),
        }
    }

    /// Prometheus text exposition of the whole registry.
    pub fn render(&self) -> String {
        self.registry.render()
    }
}

/// Holds one unit of `inference_active_requests`.
///
/// Released on drop, so early returns, panics and cancelled futures all
/// decrement the gauge.
#[derive(Debug)]
#[must_use = "the request stops counting as active when the guard is dropped"]
pub struct ActiveRequestGuard {
    gauge: Arc<Gauge>,
}

impl ActiveRequestGuard {
    fn new(gauge: Arc<Gauge>) -> Self {
        gauge.inc();
        Self { gauge }
    }
}

impl Drop for ActiveRequestGuard {
    fn drop(&mut self) {
        self.gauge.dec();
    }
}
