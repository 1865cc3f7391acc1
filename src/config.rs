//! Command-line and environment configuration.
//!
//! Every flag has an environment variable fallback so the operator can be
//! configured from a Deployment manifest alone.

use std::net::SocketAddr;
use std::time::Duration;

use clap::{ArgAction, Parser};

use crate::controller::ControllerConfig;
use crate::labels::{DEFAULT_SELECTOR, LabelPredicate};

/// Kubernetes operator for ZooKeeper, Kafka and Kafka Connect clusters
/// declared as labeled ConfigMaps.
#[derive(Parser, Debug, Clone)]
#[command(name = "kafka-cluster-operator")]
#[command(version)]
pub struct OperatorConfig {
    /// Namespace to watch for cluster ConfigMaps
    #[arg(long, env = "WATCH_NAMESPACE", default_value = "default")]
    pub namespace: String,

    /// Labels identifying cluster ConfigMaps, as `k1=v1,k2=v2`
    #[arg(long, env = "CONFIGMAP_LABELS", default_value = DEFAULT_SELECTOR, value_parser = LabelPredicate::parse)]
    pub labels: LabelPredicate,

    /// Seconds between periodic reconciliation passes
    #[arg(long, env = "RECONCILE_INTERVAL_SECS", default_value_t = 120, value_parser = clap::value_parser!(u64).range(1..))]
    pub reconcile_interval_secs: u64,

    /// Seconds to wait for one cluster operation
    #[arg(long, env = "OPERATION_TIMEOUT_SECS", default_value_t = 120, value_parser = clap::value_parser!(u64).range(1..))]
    pub operation_timeout_secs: u64,

    /// Maximum number of concurrently running cluster operations
    #[arg(long, env = "WORKER_POOL_SIZE", default_value_t = 5, value_parser = clap::value_parser!(u64).range(1..=64))]
    pub worker_pool_size: u64,

    /// Health, readiness and metrics server address
    #[arg(long, env = "HEALTH_ADDR", default_value = "0.0.0.0:8080")]
    pub health_addr: SocketAddr,

    /// Enable leader election for high availability
    #[arg(long, env = "LEADER_ELECTION", default_value_t = true, action = ArgAction::Set)]
    pub leader_election: bool,

    /// Name of the leader election Lease
    #[arg(long, env = "LEASE_NAME", default_value = "kafka-cluster-operator-leader")]
    pub lease_name: String,

    /// Emit logs as JSON
    #[arg(long, env = "LOG_JSON", default_value_t = true, action = ArgAction::Set)]
    pub log_json: bool,
}

impl OperatorConfig {
    /// Settings for the controller library.
    pub fn controller_config(&self) -> ControllerConfig {
        ControllerConfig::new(&self.namespace, self.labels.clone())
            .with_reconcile_interval(Duration::from_secs(self.reconcile_interval_secs))
            .with_operation_timeout(Duration::from_secs(self.operation_timeout_secs))
            .with_worker_pool_size(usize::try_from(self.worker_pool_size).unwrap_or(1))
    }

    /// Whether the health server starts before the controller.
    ///
    /// A standby replica waiting for the Lease has no controller yet but must
    /// still answer liveness probes. Without leader election the probes are
    /// served only once the initial watch is established.
    pub fn serve_health_before_start(&self) -> bool {
        self.leader_election
    }
}
