//! Health server for Kubernetes probes and Prometheus metrics.
//!
//! Provides:
//! - `/healthz` - Liveness probe (always returns 200 if server is running)
//! - `/readyz` - Readiness probe (returns 200 while the controller is running)
//! - `/metrics` - Prometheus metrics endpoint

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    Router,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
};
use prometheus_client::encoding::text::encode;
use prometheus_client::encoding::{EncodeLabel, EncodeLabelSet, LabelSetEncoder};
use prometheus_client::metrics::counter::Counter;
use prometheus_client::metrics::family::Family;
use prometheus_client::metrics::gauge::Gauge;
use prometheus_client::metrics::histogram::{Histogram, exponential_buckets};
use prometheus_client::registry::Registry;
use tokio::sync::RwLock;
use tracing::info;

/// Labels for per-operation outcome metrics
#[derive(Clone, Debug, Hash, PartialEq, Eq)]
pub struct OperationLabels {
    pub operation: String,
    pub outcome: String,
}

impl EncodeLabelSet for OperationLabels {
    fn encode(&self, encoder: &mut LabelSetEncoder<'_>) -> Result<(), std::fmt::Error> {
        ("operation", self.operation.as_str()).encode(encoder.encode_label())?;
        ("outcome", self.outcome.as_str()).encode(encoder.encode_label())?;
        Ok(())
    }
}

/// Labels for per-operation duration metrics
#[derive(Clone, Debug, Hash, PartialEq, Eq)]
pub struct DurationLabels {
    pub operation: String,
}

impl EncodeLabelSet for DurationLabels {
    fn encode(&self, encoder: &mut LabelSetEncoder<'_>) -> Result<(), std::fmt::Error> {
        ("operation", self.operation.as_str()).encode(encoder.encode_label())?;
        Ok(())
    }
}

/// Labels for reconciliation pass metrics (cluster family + trigger)
#[derive(Clone, Debug, Hash, PartialEq, Eq)]
pub struct ReconcileLabels {
    pub family: String,
    pub trigger: String,
}

impl EncodeLabelSet for ReconcileLabels {
    fn encode(&self, encoder: &mut LabelSetEncoder<'_>) -> Result<(), std::fmt::Error> {
        ("family", self.family.as_str()).encode(encoder.encode_label())?;
        ("trigger", self.trigger.as_str()).encode(encoder.encode_label())?;
        Ok(())
    }
}

/// Labels for chain outcome metrics
#[derive(Clone, Debug, Hash, PartialEq, Eq)]
pub struct ChainLabels {
    pub chain: String,
    pub outcome: String,
}

impl EncodeLabelSet for ChainLabels {
    fn encode(&self, encoder: &mut LabelSetEncoder<'_>) -> Result<(), std::fmt::Error> {
        ("chain", self.chain.as_str()).encode(encoder.encode_label())?;
        ("outcome", self.outcome.as_str()).encode(encoder.encode_label())?;
        Ok(())
    }
}

/// Shared metrics for the operator
pub struct Metrics {
    /// Lifecycle operations by kind and outcome
    pub operations_total: Family<OperationLabels, Counter>,
    /// Lifecycle operation duration histogram
    pub operation_duration_seconds: Family<DurationLabels, Histogram>,
    /// Reconciliation passes by family and trigger
    pub reconciliations_total: Family<ReconcileLabels, Counter>,
    /// Watches re-established after closing
    pub watch_restarts_total: Counter,
    /// Finished chains by kind and outcome
    pub chains_total: Family<ChainLabels, Counter>,
    /// Start of the latest reconciliation pass (Unix epoch seconds)
    pub last_reconcile_timestamp_seconds: Gauge,
    /// Prometheus registry
    registry: Registry,
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

impl Metrics {
    /// Create a new metrics instance with registered metrics
    pub fn new() -> Self {
        let mut registry = Registry::default();

        let operations_total = Family::<OperationLabels, Counter>::default();
        registry.register(
            "kafkaoperator_operations",
            "Total number of cluster lifecycle operations",
            operations_total.clone(),
        );

        let operation_duration_seconds =
            Family::<DurationLabels, Histogram>::new_with_constructor(|| {
                Histogram::new(exponential_buckets(0.001, 2.0, 15))
            });
        registry.register(
            "kafkaoperator_operation_duration_seconds",
            "Duration of cluster lifecycle operations in seconds",
            operation_duration_seconds.clone(),
        );

        let reconciliations_total = Family::<ReconcileLabels, Counter>::default();
        registry.register(
            "kafkaoperator_reconciliations",
            "Total number of reconciliation passes",
            reconciliations_total.clone(),
        );

        let watch_restarts_total = Counter::default();
        registry.register(
            "kafkaoperator_watch_restarts",
            "Total number of ConfigMap watches re-established after closing",
            watch_restarts_total.clone(),
        );

        let chains_total = Family::<ChainLabels, Counter>::default();
        registry.register(
            "kafkaoperator_chains",
            "Total number of finished operation chains",
            chains_total.clone(),
        );

        let last_reconcile_timestamp_seconds = Gauge::default();
        registry.register(
            "kafkaoperator_last_reconcile_timestamp_seconds",
            "Start time of the latest reconciliation pass as a Unix timestamp",
            last_reconcile_timestamp_seconds.clone(),
        );

        Self {
            operations_total,
            operation_duration_seconds,
            reconciliations_total,
            watch_restarts_total,
            chains_total,
            last_reconcile_timestamp_seconds,
            registry,
        }
    }

    /// Record a finished lifecycle operation
    ///
    /// `outcome` is `success`, `failure` (the next pass may succeed) or
    /// `rejected` (the document must change first).
    pub fn record_operation(&self, operation: &str, outcome: &str, duration_secs: f64) {
        let labels = OperationLabels {
            operation: operation.to_string(),
            outcome: outcome.to_string(),
        };
        self.operations_total.get_or_create(&labels).inc();
        self.operation_duration_seconds
            .get_or_create(&DurationLabels {
                operation: operation.to_string(),
            })
            .observe(duration_secs);
    }

    /// Record a reconciliation pass
    pub fn record_reconciliation(&self, family: &str, trigger: &str) {
        let labels = ReconcileLabels {
            family: family.to_string(),
            trigger: trigger.to_string(),
        };
        self.reconciliations_total.get_or_create(&labels).inc();
    }

    /// Record a re-established watch
    pub fn record_watch_restart(&self) {
        self.watch_restarts_total.inc();
    }

    /// Record a finished chain
    pub fn record_chain(&self, chain: &str, outcome: &str) {
        let labels = ChainLabels {
            chain: chain.to_string(),
            outcome: outcome.to_string(),
        };
        self.chains_total.get_or_create(&labels).inc();
    }

    /// Encode metrics to Prometheus text format
    pub fn encode(&self) -> String {
        let mut buffer = String::new();
        if encode(&mut buffer, &self.registry).is_err() {
            tracing::error!("Failed to encode metrics");
            return "# Error encoding metrics".to_string();
        }
        buffer
    }
}

/// Shared state for the health server
pub struct HealthState {
    /// Whether the controller is running
    ready: RwLock<bool>,
    /// Metrics registry
    pub metrics: Metrics,
}

impl Default for HealthState {
    fn default() -> Self {
        Self::new()
    }
}

impl HealthState {
    /// Create a new health state (starts as not ready)
    pub fn new() -> Self {
        Self {
            ready: RwLock::new(false),
            metrics: Metrics::new(),
        }
    }

    /// Mark the operator as ready or not ready
    pub async fn set_ready(&self, ready: bool) {
        *self.ready.write().await = ready;
    }

    /// Check if the operator is ready
    pub async fn is_ready(&self) -> bool {
        *self.ready.read().await
    }

    /// Stamp the start of a reconciliation pass
    pub fn touch_reconcile(&self) {
        let now = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| i64::try_from(d.as_secs()).unwrap_or(i64::MAX))
            .unwrap_or_default();
        self.metrics.last_reconcile_timestamp_seconds.set(now);
    }

    /// Start of the latest reconciliation pass (Unix epoch seconds), 0 if none
    pub fn last_reconcile(&self) -> i64 {
        self.metrics.last_reconcile_timestamp_seconds.get()
    }
}

/// Liveness probe handler
///
/// Returns 200 OK if the process is alive.
async fn healthz() -> impl IntoResponse {
    (StatusCode::OK, "ok")
}

/// Readiness probe handler
///
/// Returns 200 OK while the controller is running, 503 otherwise.
async fn readyz(State(state): State<Arc<HealthState>>) -> Response {
    if state.is_ready().await {
        (StatusCode::OK, "ready").into_response()
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "not ready").into_response()
    }
}

/// Metrics handler
async fn metrics_handler(State(state): State<Arc<HealthState>>) -> impl IntoResponse {
    let body = state.metrics.encode();
    (
        StatusCode::OK,
        [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
        body,
    )
}

/// Create the health server router
pub fn create_router(state: Arc<HealthState>) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        .route("/metrics", get(metrics_handler))
        .with_state(state)
}

/// Run the health server on `addr`
pub async fn run_health_server(
    state: Arc<HealthState>,
    addr: SocketAddr,
) -> Result<(), std::io::Error> {
    let app = create_router(state);

    info!(addr = %addr, "Starting health server");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
