// Process-wide Prometheus metrics, registered once at startup

use prometheus::{Histogram, HistogramOpts, IntCounterVec, Opts, Registry, TextEncoder};

use crate::core::errors::ServiceError;

/// Metric handles plus the registry they are exported from
pub struct Metrics {
    registry: Registry,
    admission_rejections: IntCounterVec,
    identity_operations: IntCounterVec,
    password_hash_seconds: Histogram,
}

impl Metrics {
    pub fn new() -> Result<Self, ServiceError> {
        let registry = Registry::new();

        let admission_rejections = IntCounterVec::new(
            Opts::new(
                "admission_rejections_total",
                "Requests rejected by an admission gatekeeper",
            ),
            &["gate"],
        )
        .map_err(metric_error)?;

        let identity_operations = IntCounterVec::new(
            Opts::new(
                "identity_operations_total",
                "Identity lifecycle operations by outcome",
            ),
            &["operation", "outcome"],
        )
        .map_err(metric_error)?;

        let password_hash_seconds = Histogram::with_opts(
            HistogramOpts::new("password_hash_seconds", "Time spent deriving password hashes")
                .buckets(vec![0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5]),
        )
        .map_err(metric_error)?;

        registry
            .register(Box::new(admission_rejections.clone()))
            .map_err(metric_error)?;
        registry
            .register(Box::new(identity_operations.clone()))
            .map_err(metric_error)?;
        registry
            .register(Box::new(password_hash_seconds.clone()))
            .map_err(metric_error)?;

        Ok(Self {
            registry,
            admission_rejections,
            identity_operations,
            password_hash_seconds,
        })
    }

    pub fn record_rejection(&self, gate: &str) {
        self.admission_rejections.with_label_values(&[gate]).inc();
    }

    pub fn record_operation(&self, operation: &str, outcome: &str) {
        self.identity_operations
            .with_label_values(&[operation, outcome])
            .inc();
    }

    pub fn observe_password_hash(&self, seconds: f64) {
        self.password_hash_seconds.observe(seconds);
    }

    pub fn rejection_count(&self, gate: &str) -> u64 {
        self.admission_rejections.with_label_values(&[gate]).get()
    }

    pub fn operation_count(&self, operation: &str, outcome: &str) -> u64 {
        self.identity_operations
            .with_label_values(&[operation, outcome])
            .get()
    }

    /// Text exposition format for GET /metrics
    pub fn render(&self) -> Result<String, ServiceError> {
        TextEncoder::new()
            .encode_to_string(&self.registry.gather())
            .map_err(metric_error)
    }
}

fn metric_error(err: prometheus::Error) -> ServiceError {
    ServiceError::Internal(format!("metrics: {}", err))
}
