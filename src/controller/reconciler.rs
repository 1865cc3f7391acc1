//! Reconciliation passes.
//!
//! A pass compares, per cluster family, the desired-state ConfigMaps with
//! the live workloads and starts a chain for every difference:
//!
//! - document without instances: add
//! - document with instances: update
//! - instances without a document: delete
//!
//! Instances are grouped by their `kafka-operator.io/cluster` label, so a
//! Kafka cluster's ZooKeeper and broker StatefulSets count once.

use std::collections::BTreeSet;
use std::fmt;
use std::future::Future;
use std::sync::Arc;

use k8s_openapi::api::core::v1::ConfigMap;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::controller::chain::{Chain, ChainKind, ChainProgress};
use crate::controller::context::Context;
use crate::controller::error::{Error, Result};
use crate::gateway::{ClusterObject, ObjectKind};
use crate::labels::{CLUSTER_LABEL, TYPE_LABEL};
use crate::model::ClusterType;

/// Why a reconciliation pass runs.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ReconcileTrigger {
    /// First timer tick after start
    Startup,
    /// Later timer ticks
    Periodic,
    /// The watch reported an error
    WatchError,
    /// The watch closed and was replaced
    WatchClosed,
}

impl ReconcileTrigger {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReconcileTrigger::Startup => "startup",
            ReconcileTrigger::Periodic => "periodic",
            ReconcileTrigger::WatchError => "watch-error",
            ReconcileTrigger::WatchClosed => "watch-closed",
        }
    }
}

impl fmt::Display for ReconcileTrigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Workload kind whose instances represent a family's clusters.
pub fn instance_kind(cluster_type: ClusterType) -> ObjectKind {
    match cluster_type {
        ClusterType::Kafka => ObjectKind::StatefulSet,
        ClusterType::KafkaConnect => ObjectKind::Deployment,
    }
}

/// Desired and live cluster names of one family at one point in time.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ReconciliationSnapshot {
    pub documents: BTreeSet<String>,
    pub instances: BTreeSet<String>,
}

impl ReconciliationSnapshot {
    /// Build a snapshot from listed documents and instances.
    ///
    /// Instances without a cluster label are skipped with a warning.
    pub fn new(documents: &[ConfigMap], instances: &[ClusterObject]) -> Self {
        let documents = documents
            .iter()
            .filter_map(|cm| cm.metadata.name.clone())
            .collect();
        let instances = instances
            .iter()
            .filter_map(|object| match object.label(CLUSTER_LABEL) {
                Some(cluster) => Some(cluster.to_string()),
                None => {
                    warn!(
                        kind = %object.kind(),
                        name = %object.name(),
                        "Instance has no {} label, ignoring", CLUSTER_LABEL
                    );
                    None
                }
            })
            .collect();
        Self {
            documents,
            instances,
        }
    }

    /// Split the names into add, update and delete sets.
    pub fn partition(&self) -> ReconcilePlan {
        ReconcilePlan {
            add: self
                .documents
                .difference(&self.instances)
                .cloned()
                .collect(),
            update: self
                .documents
                .intersection(&self.instances)
                .cloned()
                .collect(),
            delete: self
                .instances
                .difference(&self.documents)
                .cloned()
                .collect(),
        }
    }
}

/// Cluster names to add, update and delete.
///
/// The three sets are disjoint and together cover every document and
/// instance name of the snapshot.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ReconcilePlan {
    pub add: BTreeSet<String>,
    pub update: BTreeSet<String>,
    pub delete: BTreeSet<String>,
}

impl ReconcilePlan {
    pub fn is_empty(&self) -> bool {
        self.add.is_empty() && self.update.is_empty() && self.delete.is_empty()
    }

    /// Chains that carry out the plan: adds, then deletes, then updates.
    pub fn chains(&self, cluster_type: ClusterType, namespace: &str) -> Vec<Chain> {
        let add = self
            .add
            .iter()
            .map(|name| Chain::new(ChainKind::Add, cluster_type, namespace, name));
        let delete = self
            .delete
            .iter()
            .map(|name| Chain::new(ChainKind::Delete, cluster_type, namespace, name));
        let update = self
            .update
            .iter()
            .map(|name| Chain::new(ChainKind::Update, cluster_type, namespace, name));
        add.chain(delete).chain(update).collect()
    }
}

/// Result of one family's pass: the plan and the chains it started.
pub struct FamilyPass {
    pub plan: ReconcilePlan,
    pub chains: Vec<JoinHandle<ChainProgress>>,
}

/// Await a gateway read for at most the operation timeout.
async fn bounded<T>(
    ctx: &Context,
    operation: &str,
    read: impl Future<Output = Result<T>>,
) -> Result<T> {
    let after = ctx.config.operation_timeout;
    tokio::time::timeout(after, read)
        .await
        .map_err(|_| Error::Timeout {
            operation: operation.to_string(),
            after,
        })?
}

/// Run one family's pass: list, partition and start chains.
pub async fn reconcile_family(
    ctx: &Context,
    cluster_type: ClusterType,
    trigger: ReconcileTrigger,
) -> Result<FamilyPass> {
    let namespace = &ctx.config.namespace;
    let selector = ctx
        .config
        .selector
        .with(TYPE_LABEL, cluster_type.label_value())?;

    if let Some(ref health) = ctx.health_state {
        health
            .metrics
            .record_reconciliation(cluster_type.label_value(), trigger.as_str());
    }

    let documents = bounded(ctx, "list documents", async {
        ctx.gateway.list_documents(namespace, &selector).await
    })
    .await?;
    let instances = bounded(ctx, "list instances", async {
        ctx.gateway
            .list_instances(namespace, instance_kind(cluster_type), &selector)
            .await
    })
    .await?;

    let plan = ReconciliationSnapshot::new(&documents, &instances).partition();
    if plan.is_empty() {
        debug!(family = %cluster_type, trigger = %trigger, "Nothing to reconcile");
    } else {
        info!(
            family = %cluster_type,
            trigger = %trigger,
            add = ?plan.add,
            update = ?plan.update,
            delete = ?plan.delete,
            "Reconciling clusters"
        );
    }

    let chains = plan
        .chains(cluster_type, namespace)
        .into_iter()
        .map(|chain| ctx.runner.spawn(chain))
        .collect();
    Ok(FamilyPass { plan, chains })
}

/// Run a pass for every family. A failing family does not stop the others.
pub async fn reconcile_all(ctx: Arc<Context>, trigger: ReconcileTrigger) -> Vec<FamilyPass> {
    if let Some(ref health) = ctx.health_state {
        health.touch_reconcile();
    }
    let mut passes = Vec::new();
    for cluster_type in ClusterType::ALL {
        match reconcile_family(&ctx, cluster_type, trigger).await {
            Ok(pass) => passes.push(pass),
            Err(e) => error!(
                family = %cluster_type,
                trigger = %trigger,
                error = %e,
                "Reconciliation pass failed"
            ),
        }
    }
    passes
}
