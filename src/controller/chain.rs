//! Operation chains.
//!
//! A chain is the ordered list of operations that adds, updates or deletes
//! one cluster. For a Kafka cluster the ZooKeeper ensemble comes up before
//! the brokers and goes down after them:
//!
//! | Chain | Steps | Next step runs |
//! |-------|-------|----------------|
//! | add | create-zookeeper, create-kafka | only if the previous step succeeded |
//! | update | update-zookeeper, update-kafka | always |
//! | delete | delete-kafka, delete-zookeeper | only if the previous step succeeded |
//!
//! Kafka Connect chains have a single step.
//!
//! Progress through a chain is an explicit state machine ([`ChainProgress`])
//! so the gating policy can be tested without running anything.

use std::fmt;
use std::sync::Arc;

use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::controller::executor::OperationExecutor;
use crate::controller::operations::{Operation, OperationKind};
use crate::health::HealthState;
use crate::model::{ClusterRole, ClusterType};

/// What a chain does to its cluster.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ChainKind {
    Add,
    Update,
    Delete,
}

impl fmt::Display for ChainKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChainKind::Add => write!(f, "add"),
            ChainKind::Update => write!(f, "update"),
            ChainKind::Delete => write!(f, "delete"),
        }
    }
}

/// Whether a step depends on the previous step's success.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StepGate {
    /// Abort the chain when a step fails.
    OnSuccess,
    /// Run every step regardless of earlier failures.
    Always,
}

/// The ordered operations that add, update or delete one cluster.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Chain {
    pub kind: ChainKind,
    pub cluster_type: ClusterType,
    pub namespace: String,
    pub name: String,
}

impl fmt::Display for Chain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}/{}", self.label(), self.namespace, self.name)
    }
}

impl Chain {
    pub fn new(kind: ChainKind, cluster_type: ClusterType, namespace: &str, name: &str) -> Self {
        Self {
            kind,
            cluster_type,
            namespace: namespace.to_string(),
            name: name.to_string(),
        }
    }

    /// Short name without the target, e.g. `add-kafka`.
    pub fn label(&self) -> String {
        format!("{}-{}", self.kind, self.cluster_type)
    }

    pub fn gate(&self) -> StepGate {
        match self.kind {
            ChainKind::Add | ChainKind::Delete => StepGate::OnSuccess,
            // Updates are independent patches; a failed ZooKeeper update
            // does not block the broker update.
            ChainKind::Update => StepGate::Always,
        }
    }

    /// The chain's operations, in execution order.
    pub fn steps(&self) -> Vec<Operation> {
        let roles: &[ClusterRole] = match (self.cluster_type, self.kind) {
            (ClusterType::Kafka, ChainKind::Add | ChainKind::Update) => {
                &[ClusterRole::Zookeeper, ClusterRole::Kafka]
            }
            (ClusterType::Kafka, ChainKind::Delete) => &[ClusterRole::Kafka, ClusterRole::Zookeeper],
            (ClusterType::KafkaConnect, _) => &[ClusterRole::KafkaConnect],
        };
        let kind = match self.kind {
            ChainKind::Add => OperationKind::Create,
            ChainKind::Update => OperationKind::Update,
            ChainKind::Delete => OperationKind::Delete,
        };
        roles
            .iter()
            .map(|role| Operation::new(kind, *role, &self.namespace, &self.name))
            .collect()
    }
}

/// Where a chain is in its execution.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ChainProgress {
    Pending,
    /// Running the step at index `step`; `failures` earlier steps failed.
    InProgress { step: usize, failures: usize },
    /// Every step succeeded.
    Succeeded,
    /// Every step ran but at least one failed.
    CompletedWithFailures { failures: usize },
    /// The step at `at_step` failed and the remaining steps were skipped.
    Aborted { at_step: usize },
}

impl ChainProgress {
    /// Begin a chain of `total` steps.
    pub fn start(self, total: usize) -> Self {
        match self {
            ChainProgress::Pending if total == 0 => ChainProgress::Succeeded,
            ChainProgress::Pending => ChainProgress::InProgress {
                step: 0,
                failures: 0,
            },
            other => other,
        }
    }

    /// Record the current step's outcome and move on.
    ///
    /// Has no effect outside `InProgress`.
    pub fn step_finished(self, succeeded: bool, total: usize, gate: StepGate) -> Self {
        let ChainProgress::InProgress { step, failures } = self else {
            return self;
        };
        let failures = if succeeded { failures } else { failures + 1 };

        if !succeeded && gate == StepGate::OnSuccess {
            return ChainProgress::Aborted { at_step: step };
        }
        if step + 1 < total {
            return ChainProgress::InProgress {
                step: step + 1,
                failures,
            };
        }
        if failures == 0 {
            ChainProgress::Succeeded
        } else {
            ChainProgress::CompletedWithFailures { failures }
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(
            self,
            ChainProgress::Pending | ChainProgress::InProgress { .. }
        )
    }

    /// Index of the step to run next, if any.
    pub fn current_step(&self) -> Option<usize> {
        match self {
            ChainProgress::InProgress { step, .. } => Some(*step),
            _ => None,
        }
    }

    /// Metric label for a terminal state.
    pub fn outcome(&self) -> &'static str {
        match self {
            ChainProgress::Pending => "pending",
            ChainProgress::InProgress { .. } => "in-progress",
            ChainProgress::Succeeded => "succeeded",
            ChainProgress::CompletedWithFailures { .. } => "completed-with-failures",
            ChainProgress::Aborted { .. } => "aborted",
        }
    }
}

/// Drives chains through the executor.
#[derive(Clone)]
pub struct ChainRunner {
    executor: OperationExecutor,
    health_state: Option<Arc<HealthState>>,
}

impl ChainRunner {
    pub fn new(executor: OperationExecutor, health_state: Option<Arc<HealthState>>) -> Self {
        Self {
            executor,
            health_state,
        }
    }

    /// Run `chain` to a terminal state.
    pub async fn run(&self, chain: Chain) -> ChainProgress {
        let steps = chain.steps();
        let gate = chain.gate();
        let mut progress = ChainProgress::Pending.start(steps.len());
        info!(chain = %chain, steps = steps.len(), "Starting chain");

        while let Some(index) = progress.current_step() {
            let Some(operation) = steps.get(index).cloned() else {
                break;
            };
            let description = operation.to_string();
            let result = self.executor.run(operation).await;
            if let Err(ref e) = result {
                error!(chain = %chain, operation = %description, error = %e, "Chain step failed");
            }
            progress = progress.step_finished(result.is_ok(), steps.len(), gate);
        }

        match progress {
            ChainProgress::Succeeded => info!(chain = %chain, "Chain succeeded"),
            ChainProgress::Aborted { at_step } => {
                warn!(chain = %chain, at_step, "Chain aborted, remaining steps skipped")
            }
            _ => warn!(chain = %chain, outcome = progress.outcome(), "Chain finished with failures"),
        }
        if let Some(ref health) = self.health_state {
            health
                .metrics
                .record_chain(&chain.label(), progress.outcome());
        }
        progress
    }

    /// Run `chain` on its own task.
    pub fn spawn(&self, chain: Chain) -> JoinHandle<ChainProgress> {
        let runner = self.clone();
        tokio::spawn(async move { runner.run(chain).await })
    }
}
