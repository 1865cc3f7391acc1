//! Shared context for the controller.
//!
//! The Context struct holds the state shared by the event loop,
//! reconciliation passes and chains: the gateway, the controller's scope
//! and the executor that runs operations.

use std::sync::Arc;
use std::time::Duration;

use crate::controller::chain::ChainRunner;
use crate::controller::executor::{DEFAULT_POOL_SIZE, DEFAULT_TASK_TIMEOUT, OperationExecutor};
use crate::gateway::ClusterGateway;
use crate::health::HealthState;
use crate::labels::LabelPredicate;

/// Default interval between periodic reconciliation passes
pub const DEFAULT_RECONCILE_INTERVAL: Duration = Duration::from_secs(120);

/// Settings for one controller instance.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ControllerConfig {
    /// Namespace watched and written to
    pub namespace: String,
    /// Labels every owned ConfigMap carries
    pub selector: LabelPredicate,
    /// Interval between periodic reconciliation passes
    pub reconcile_interval: Duration,
    /// Time to wait for one operation, and for a watch to open
    pub operation_timeout: Duration,
    /// Maximum number of concurrently running operations
    pub worker_pool_size: usize,
}

impl ControllerConfig {
    /// Configuration with default timings.
    pub fn new(namespace: &str, selector: LabelPredicate) -> Self {
        Self {
            namespace: namespace.to_string(),
            selector,
            reconcile_interval: DEFAULT_RECONCILE_INTERVAL,
            operation_timeout: DEFAULT_TASK_TIMEOUT,
            worker_pool_size: DEFAULT_POOL_SIZE,
        }
    }

    pub fn with_reconcile_interval(mut self, interval: Duration) -> Self {
        self.reconcile_interval = interval;
        self
    }

    pub fn with_operation_timeout(mut self, timeout: Duration) -> Self {
        self.operation_timeout = timeout;
        self
    }

    pub fn with_worker_pool_size(mut self, size: usize) -> Self {
        self.worker_pool_size = size;
        self
    }
}

/// Shared context for the controller
#[derive(Clone)]
pub struct Context {
    /// Orchestration gateway
    pub gateway: Arc<dyn ClusterGateway>,
    /// Controller settings
    pub config: ControllerConfig,
    /// Chain runner backed by the operation executor
    pub runner: ChainRunner,
    /// Optional health state for metrics and readiness
    pub health_state: Option<Arc<HealthState>>,
}

impl Context {
    /// Create a new context
    pub fn new(
        gateway: Arc<dyn ClusterGateway>,
        config: ControllerConfig,
        health_state: Option<Arc<HealthState>>,
    ) -> Self {
        let executor = OperationExecutor::new(
            gateway.clone(),
            config.worker_pool_size,
            config.operation_timeout,
        )
        .with_health_state(health_state.clone());
        Self {
            gateway,
            runner: ChainRunner::new(executor, health_state.clone()),
            config,
            health_state,
        }
    }
}
