//! Cluster lifecycle operations.
//!
//! Nine primitive operations: create, update and delete for each of the
//! ZooKeeper, Kafka and Kafka Connect roles. Each is idempotent so that
//! overlapping chains for the same cluster converge.

use std::fmt;

use k8s_openapi::api::core::v1::ConfigMap;
use kube::ResourceExt;
use tracing::{debug, info};

use crate::controller::error::{Error, Result};
use crate::gateway::{ClusterGateway, ObjectKind};
use crate::labels::{CLUSTER_LABEL, LabelPredicate, ROLE_LABEL};
use crate::model::ClusterRole;
use crate::resources::{self, DELETE_CLAIM_ANNOTATION, merge_patch};

/// What an operation does to a role's objects.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum OperationKind {
    Create,
    Update,
    Delete,
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OperationKind::Create => write!(f, "create"),
            OperationKind::Update => write!(f, "update"),
            OperationKind::Delete => write!(f, "delete"),
        }
    }
}

/// One lifecycle operation on one role of one cluster.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Operation {
    pub kind: OperationKind,
    pub role: ClusterRole,
    pub namespace: String,
    /// Cluster name, the same as the desired-state ConfigMap's name.
    pub name: String,
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}/{}", self.label(), self.namespace, self.name)
    }
}

impl Operation {
    pub fn new(kind: OperationKind, role: ClusterRole, namespace: &str, name: &str) -> Self {
        Self {
            kind,
            role,
            namespace: namespace.to_string(),
            name: name.to_string(),
        }
    }

    pub fn create(role: ClusterRole, namespace: &str, name: &str) -> Self {
        Self::new(OperationKind::Create, role, namespace, name)
    }

    pub fn update(role: ClusterRole, namespace: &str, name: &str) -> Self {
        Self::new(OperationKind::Update, role, namespace, name)
    }

    pub fn delete(role: ClusterRole, namespace: &str, name: &str) -> Self {
        Self::new(OperationKind::Delete, role, namespace, name)
    }

    /// Short name without the target, e.g. `create-zookeeper`.
    pub fn label(&self) -> String {
        format!("{}-{}", self.kind, self.role)
    }

    /// Run the operation against `gateway`.
    pub async fn execute(&self, gateway: &dyn ClusterGateway) -> Result<()> {
        match self.kind {
            OperationKind::Create => self.create_objects(gateway).await,
            OperationKind::Update => self.update_objects(gateway).await,
            OperationKind::Delete => self.delete_objects(gateway).await,
        }
    }

    async fn create_objects(&self, gateway: &dyn ClusterGateway) -> Result<()> {
        let document = self.document(gateway).await?;
        for object in resources::build(self.role, &self.namespace, &document)? {
            gateway.create(&object).await?;
        }
        info!(operation = %self, "Created cluster objects");
        Ok(())
    }

    async fn update_objects(&self, gateway: &dyn ClusterGateway) -> Result<()> {
        let document = self.document(gateway).await?;
        let mut patched = 0;
        for desired in resources::build(self.role, &self.namespace, &document)? {
            let kind = desired.kind();
            let name = desired.name();
            match gateway.get(&self.namespace, kind, &name).await? {
                None => {
                    debug!(kind = %kind, name = %name, "Object missing, creating");
                    gateway.create(&desired).await?;
                    patched += 1;
                }
                Some(live) => {
                    if let Some(patch) = merge_patch(&live, &desired) {
                        debug!(kind = %kind, name = %name, "Patching object");
                        gateway.patch(&self.namespace, kind, &name, &patch).await?;
                        patched += 1;
                    }
                }
            }
        }
        info!(operation = %self, changed = patched, "Updated cluster objects");
        Ok(())
    }

    async fn delete_objects(&self, gateway: &dyn ClusterGateway) -> Result<()> {
        let refs = resources::object_refs(self.role, &self.name);

        // The claim policy lives on the StatefulSet, so read it before the
        // StatefulSet goes away.
        let mut delete_claims = false;
        if let Some((ObjectKind::StatefulSet, workload)) = refs.first() {
            if let Some(live) = gateway
                .get(&self.namespace, ObjectKind::StatefulSet, workload)
                .await?
            {
                delete_claims = live.annotation(DELETE_CLAIM_ANNOTATION) == Some("true");
            }
        }

        for (kind, name) in &refs {
            gateway.delete(&self.namespace, *kind, name).await?;
        }

        if delete_claims {
            let selector = LabelPredicate::from_pairs(&[
                CLUSTER_LABEL,
                &self.name,
                ROLE_LABEL,
                self.role.as_str(),
            ])?;
            let claims = gateway
                .list_instances(&self.namespace, ObjectKind::PersistentVolumeClaim, &selector)
                .await?;
            for claim in claims {
                gateway
                    .delete(
                        &self.namespace,
                        ObjectKind::PersistentVolumeClaim,
                        &claim.name(),
                    )
                    .await?;
            }
        }

        info!(operation = %self, delete_claims, "Deleted cluster objects");
        Ok(())
    }

    async fn document(&self, gateway: &dyn ClusterGateway) -> Result<ConfigMap> {
        let document = gateway
            .get_document(&self.namespace, &self.name)
            .await?
            .ok_or_else(|| Error::MissingDocument {
                namespace: self.namespace.clone(),
                name: self.name.clone(),
            })?;
        debug!(operation = %self, document = %document.name_any(), "Read cluster document");
        Ok(document)
    }
}
