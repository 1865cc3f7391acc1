//! Bounded operation executor.
//!
//! Operations run on their own tokio tasks behind a semaphore of
//! `pool_size` slots. An operation waits for a free slot, then the caller
//! waits at most `task_timeout` for it to finish. A task that overruns
//! keeps running, and keeps its slot, until it finishes on its own.

use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tracing::{debug, error, warn};

use crate::controller::error::{Error, Result};
use crate::controller::operations::Operation;
use crate::gateway::ClusterGateway;
use crate::health::HealthState;

/// Default number of concurrently running operations
pub const DEFAULT_POOL_SIZE: usize = 5;

/// Default time to wait for one operation
pub const DEFAULT_TASK_TIMEOUT: Duration = Duration::from_secs(120);

/// Runs lifecycle operations with bounded concurrency and a timeout.
#[derive(Clone)]
pub struct OperationExecutor {
    gateway: Arc<dyn ClusterGateway>,
    permits: Arc<Semaphore>,
    task_timeout: Duration,
    health_state: Option<Arc<HealthState>>,
}

impl OperationExecutor {
    pub fn new(gateway: Arc<dyn ClusterGateway>, pool_size: usize, task_timeout: Duration) -> Self {
        Self {
            gateway,
            permits: Arc::new(Semaphore::new(pool_size.max(1))),
            task_timeout,
            health_state: None,
        }
    }

    /// Attach health state for per-operation metrics.
    pub fn with_health_state(mut self, health_state: Option<Arc<HealthState>>) -> Self {
        self.health_state = health_state;
        self
    }

    pub fn task_timeout(&self) -> Duration {
        self.task_timeout
    }

    /// Run `operation` and wait for its result.
    ///
    /// The timeout starts once a slot is held, so an operation queued
    /// behind busy slots is never reported as timed out before it starts.
    pub async fn run(&self, operation: Operation) -> Result<()> {
        let label = operation.label();
        let description = operation.to_string();
        let started = Instant::now();

        let result = run_bounded(self.permits.clone(), self.task_timeout, &description, {
            let gateway = self.gateway.clone();
            async move { operation.execute(gateway.as_ref()).await }
        })
        .await;

        let outcome = match &result {
            Ok(()) => {
                debug!(operation = %description, "Operation succeeded");
                "success"
            }
            Err(e) if e.is_retryable() => {
                warn!(operation = %description, error = %e, "Operation failed");
                "failure"
            }
            Err(e) => {
                error!(
                    operation = %description,
                    error = %e,
                    "Operation rejected, the document must change before it can succeed"
                );
                "rejected"
            }
        };
        if let Some(ref health) = self.health_state {
            health
                .metrics
                .record_operation(&label, outcome, started.elapsed().as_secs_f64());
        }
        result
    }

    /// Run `operation` in the background and hand its result to `callback`.
    ///
    /// The callback is called exactly once, from the spawned task.
    pub fn execute<F>(&self, operation: Operation, callback: F) -> JoinHandle<()>
    where
        F: FnOnce(Result<()>) + Send + 'static,
    {
        let executor = self.clone();
        tokio::spawn(async move {
            let result = executor.run(operation).await;
            callback(result);
        })
    }
}

/// Take a slot from `permits`, spawn `work` holding it and wait up to
/// `timeout` for the result.
pub(crate) async fn run_bounded<F>(
    permits: Arc<Semaphore>,
    timeout: Duration,
    description: &str,
    work: F,
) -> Result<()>
where
    F: Future<Output = Result<()>> + Send + 'static,
{
    let permit = permits
        .acquire_owned()
        .await
        .map_err(|_| Error::TaskFailed("executor closed".to_string()))?;
    let task = tokio::spawn(async move {
        let _permit = permit;
        work.await
    });

    match tokio::time::timeout(timeout, task).await {
        Ok(Ok(result)) => result,
        Ok(Err(join_error)) => Err(Error::TaskFailed(join_error.to_string())),
        Err(_) => Err(Error::Timeout {
            operation: description.to_string(),
            after: timeout,
        }),
    }
}
